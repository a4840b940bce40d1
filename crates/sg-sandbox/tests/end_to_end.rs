// end_to_end.rs — Scripts' view of the sandbox: registry, gate and
// capability contexts wired together the way a runtime session uses them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration as StdDuration;

use chrono::Duration;
use sg_capability::{CapabilityManager, CapabilityToken, Constraint, ManagerConfig};
use sg_registry::{AttributeRegistry, AttributeRule, ClassManifest, RegistryError, TypeKind};
use sg_sandbox::{guard, AccessPlan, Gate, GateError, HostObject, ModuleDecl, NativeFunction, Value};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn gate_with(registry: AttributeRegistry, config: ManagerConfig) -> Gate {
    init_tracing();
    Gate::new(Arc::new(registry), Arc::new(CapabilityManager::new(config)))
}

fn default_gate() -> Gate {
    gate_with(AttributeRegistry::with_builtins(), ManagerConfig::default())
}

struct HttpClient {
    base_url: String,
}

impl HostObject for HttpClient {
    fn class_name(&self) -> &str {
        "HttpClient"
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "base_url" => Some(Value::from(self.base_url.as_str())),
            _ => None,
        }
    }

    fn has_method(&self, name: &str) -> bool {
        matches!(name, "get" | "close")
    }

    fn call_method(&self, name: &str, args: &[Value]) -> Result<Value, GateError> {
        match (name, args) {
            ("get", [Value::Str(path)]) => Ok(Value::from(format!("{}{}", self.base_url, path))),
            ("close", []) => Ok(Value::Null),
            _ => Err(GateError::Host(format!("bad call to HttpClient.{}", name))),
        }
    }
}

const HTTP_MANIFEST: &str = r#"
[[class]]
name = "HttpClient"

[[class.attribute]]
name = "base_url"
kind = "field"

[[class.attribute]]
name = "get"
kind = "method"
requires = ["net:fetch"]
description = "HTTP GET"
"#;

#[test]
fn pattern_find_all_through_the_gate() {
    let gate = default_gate();
    let pattern = Value::pattern(r"\d").unwrap();
    let result = gate
        .access(&pattern, "findAll", Some(&["a1 b2".into()]))
        .unwrap();
    assert_eq!(result, Value::List(vec!["1".into(), "2".into()]));
}

#[test]
fn dunder_access_stays_denied_after_registration_attempt() {
    let mut registry = AttributeRegistry::with_builtins();
    let err = registry
        .register_builtin(TypeKind::Str, AttributeRule::field("__class__", "escape hatch"))
        .unwrap_err();
    assert!(matches!(err, RegistryError::RegistrationConflict { .. }));

    let gate = gate_with(registry, ManagerConfig::default());
    let err = gate.get_attr(&Value::from("x"), "__class__").unwrap_err();
    assert_eq!(
        err,
        GateError::AccessDenied {
            type_name: "str".into(),
            attribute: "__class__".into(),
        }
    );
}

#[test]
fn denylist_outranks_existing_registrations() {
    let mut registry = AttributeRegistry::with_builtins();
    registry.deny_name("upper");
    let gate = gate_with(registry, ManagerConfig::default());
    assert!(gate.get_attr(&Value::from("x"), "upper").is_err());
    assert!(gate.get_attr(&Value::from("x"), "lower").is_ok());
}

#[test]
fn guarded_calculation_requires_execute_capability() {
    let gate = default_gate();
    let manager = Arc::clone(gate.manager());
    let math = ModuleDecl::new("math").with_capability("execute:calculations");
    let add = math
        .guard(Arc::clone(&manager), "add", Vec::<String>::new(), |args: &[Value]| {
            let sum = args.iter().filter_map(Value::as_int).sum::<i64>();
            Ok(Value::Int(sum))
        })
        .into_value();

    let err = gate.call(&add, &[Value::Int(1), Value::Int(2)]).unwrap_err();
    assert_eq!(
        err,
        GateError::CapabilityMissing {
            capability: "execute:calculations".into(),
            target: "math.add".into(),
        }
    );

    let result = manager.with_capability_context(
        "calc-session",
        [CapabilityToken::unrestricted("execute:calculations")],
        |_| gate.call(&add, &[Value::Int(1), Value::Int(2)]),
    );
    assert_eq!(result.unwrap().unwrap(), Value::Int(3));

    // Scope has ended; the grant is gone again.
    assert!(gate.call(&add, &[Value::Int(1)]).is_err());
}

#[test]
fn default_deny_without_active_context() {
    let gate = default_gate();
    assert!(gate.manager().active_context().is_none());
    assert!(!gate.manager().has_capability("file:read"));

    let read = guard(Arc::clone(gate.manager()), "read_file", ["file:read"], |_: &[Value]| {
        Ok(Value::from("contents"))
    });
    assert!(read.check().is_err());
}

#[test]
fn host_class_from_manifest() {
    let mut registry = AttributeRegistry::with_builtins();
    let manifest = ClassManifest::from_toml_str(HTTP_MANIFEST).unwrap();
    assert_eq!(manifest.apply(&mut registry).unwrap(), 2);
    let gate = gate_with(registry, ManagerConfig::default());

    let client = Value::object(HttpClient {
        base_url: "https://example.test".into(),
    });

    assert_eq!(
        gate.get_attr(&client, "base_url").unwrap(),
        Value::from("https://example.test")
    );
    // Implemented by the host but not declared: unreachable.
    assert!(!gate.has_attr(&client, "close"));
    assert!(matches!(
        gate.call_method(&client, "get", &["/a".into()]),
        Err(GateError::CapabilityMissing { .. })
    ));

    let _scope = gate
        .manager()
        .capability_context("fetcher", [CapabilityToken::unrestricted("net:fetch")])
        .unwrap();
    assert_eq!(
        gate.call_method(&client, "get", &["/a".into()]).unwrap(),
        Value::from("https://example.test/a")
    );
}

#[test]
fn nested_scopes_restore_in_order() {
    let gate = default_gate();
    let manager = gate.manager();

    let outer = manager
        .capability_context("outer", [CapabilityToken::unrestricted("file:read")])
        .unwrap();
    let outer_id = outer.context().id();
    {
        let _inner = manager
            .capability_context("inner", [CapabilityToken::unrestricted("file:write")])
            .unwrap();
        assert!(manager.has_capability("file:read"));
        assert!(manager.has_capability("file:write"));
    }
    assert_eq!(manager.active_context().map(|ctx| ctx.id()), Some(outer_id));
    assert!(manager.has_capability("file:read"));
    assert!(!manager.has_capability("file:write"));

    drop(outer);
    assert!(manager.active_context().is_none());
    assert_eq!(manager.context_count(), 0);
}

#[test]
fn exhaustion_is_visible_to_the_next_check() {
    let gate = default_gate();
    let manager = gate.manager();
    let token = manager.issue_token("db:write", Constraint::unrestricted().with_max_usage(1));
    let _scope = manager.capability_context("db", [token]).unwrap();

    assert!(manager.has_capability("db:write"));
    manager.use_capability("db:write", None, None).unwrap();
    assert!(!manager.has_capability("db:write"));
}

#[test]
fn cached_grants_expire_within_the_ttl() {
    let config = ManagerConfig {
        cache_ttl_ms: 20,
        ..ManagerConfig::default()
    };
    let gate = gate_with(AttributeRegistry::with_builtins(), config);
    let manager = gate.manager();
    let token = manager.issue_token(
        "net:fetch",
        Constraint::unrestricted().expiring_in(Duration::milliseconds(60)),
    );
    let _scope = manager.capability_context("short", [token]).unwrap();

    assert!(manager.has_capability("net:fetch"));
    thread::sleep(StdDuration::from_millis(150));
    assert!(!manager.has_capability("net:fetch"));
}

#[test]
fn every_default_whitelist_entry_resolves() {
    let gate = default_gate();
    let bound = gate.get_attr(&Value::from("x"), "upper").unwrap();
    let samples = [
        Value::from("text"),
        Value::List(vec![Value::from("a")]),
        Value::Int(3),
        Value::Float(1.5),
        Value::Bool(true),
        Value::pattern("a+").unwrap(),
        Value::Function(NativeFunction::new("noop", |_: &[Value]| Ok(Value::Null))),
        bound,
    ];

    for sample in &samples {
        let kind = sample.type_kind();
        for name in gate.registry().attributes(&kind) {
            assert!(
                gate.get_attr(sample, &name).is_ok(),
                "{}.{} is whitelisted but does not resolve",
                kind,
                name
            );
        }
        assert_eq!(gate.dir(sample), gate.registry().attributes(&kind));
    }
}

#[test]
fn access_plan_agrees_with_the_registry() {
    let mut registry = AttributeRegistry::with_builtins();
    ClassManifest::from_toml_str(HTTP_MANIFEST)
        .unwrap()
        .apply(&mut registry)
        .unwrap();
    let gate = gate_with(registry, ManagerConfig::default());

    let kinds = [
        TypeKind::Str,
        TypeKind::List,
        TypeKind::Int,
        TypeKind::Float,
        TypeKind::Bool,
        TypeKind::Pattern,
        TypeKind::Function,
        TypeKind::Custom("HttpClient".into()),
    ];
    let names = ["upper", "findAll", "abs", "get", "base_url", "__class__", "__dict__", "globals", "nope"];

    for kind in &kinds {
        for name in names {
            let allowed = gate.registry().is_access_allowed(kind, name);
            let unconditional = gate.registry().required_capabilities(kind, name).is_empty();
            let expected = match (allowed, unconditional) {
                (false, _) => AccessPlan::Reject,
                (true, true) => AccessPlan::Direct,
                (true, false) => AccessPlan::Gated,
            };
            assert_eq!(gate.access_plan(Some(kind), name), expected, "{}.{}", kind, name);
        }
    }
}

#[test]
fn safe_getattr_on_records_and_objects() {
    let gate = default_gate();
    let record = Value::Map(BTreeMap::from([("name".to_string(), Value::from("x"))]));
    assert_eq!(
        gate.safe_getattr(&record, "missing", Value::Int(0)).unwrap(),
        Value::Int(0)
    );
    assert_eq!(
        gate.safe_getattr(&Value::from("x"), "__globals__", Value::Null).unwrap(),
        Value::Null
    );
    // Failures inside a member are not masked.
    let err = gate
        .call_method(&Value::from("x"), "split", &[Value::Int(1)])
        .unwrap_err();
    assert!(!err.is_soft_denial());
}
