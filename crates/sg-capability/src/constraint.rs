// constraint.rs — Limits attached to a capability token.
//
// Restrictions are additive: an empty pattern list places no restriction on
// resources and an empty operation set places none on operations. Anything
// that is set must be satisfied.
//
// Constraints are built with the `with_*` methods and then moved into a
// `CapabilityToken`, which only hands out shared references. After issuance
// they are never mutated, so concurrent users always see the same snapshot.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use glob::Pattern;
use serde::{Deserialize, Serialize};

/// Numeric resource ceilings carried by a constraint.
///
/// Each field is optional; `None` means no ceiling for that resource.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceLimits {
    pub max_size_bytes: Option<u64>,
    pub max_time_ms: Option<u64>,
    pub max_memory_bytes: Option<u64>,
}

impl ResourceLimits {
    /// True when no ceiling is set.
    pub fn is_unbounded(&self) -> bool {
        self.max_size_bytes.is_none() && self.max_time_ms.is_none() && self.max_memory_bytes.is_none()
    }

    /// Check that every amount in `requested` fits under the matching ceiling.
    ///
    /// Amounts the caller does not claim (`None`) are not checked.
    pub fn permits(&self, requested: &ResourceLimits) -> Result<(), String> {
        check_limit("size", self.max_size_bytes, requested.max_size_bytes)?;
        check_limit("time", self.max_time_ms, requested.max_time_ms)?;
        check_limit("memory", self.max_memory_bytes, requested.max_memory_bytes)
    }
}

fn check_limit(label: &str, limit: Option<u64>, requested: Option<u64>) -> Result<(), String> {
    match (limit, requested) {
        (Some(max), Some(amount)) if amount > max => {
            Err(format!("requested {} {} exceeds limit {}", label, amount, max))
        }
        _ => Ok(()),
    }
}

/// Fine-grained limits on what a capability token may be used for.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Constraint {
    /// Glob patterns the requested resource must match (any of them).
    #[serde(default)]
    resource_patterns: Vec<String>,
    /// Operations the token may be used for.
    #[serde(default)]
    operations: BTreeSet<String>,
    /// Hard cap on successful uses.
    #[serde(default)]
    max_usage_count: Option<u64>,
    /// Hard cutoff; the token is invalid from this instant on.
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    limits: ResourceLimits,
}

impl Constraint {
    /// A constraint with no restrictions at all.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Add a resource glob (e.g. `fs://workspace/**`).
    pub fn with_resource_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.resource_patterns.push(pattern.into());
        self
    }

    /// Add an allowed operation (e.g. `read`).
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operations.insert(operation.into());
        self
    }

    pub fn with_max_usage(mut self, count: u64) -> Self {
        self.max_usage_count = Some(count);
        self
    }

    pub fn with_expiry(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Expire `ttl` from now.
    pub fn expiring_in(self, ttl: Duration) -> Self {
        self.with_expiry(Utc::now() + ttl)
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn resource_patterns(&self) -> &[String] {
        &self.resource_patterns
    }

    pub fn operations(&self) -> &BTreeSet<String> {
        &self.operations
    }

    pub fn max_usage_count(&self) -> Option<u64> {
        self.max_usage_count
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Whether the constraint's expiry has passed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |at| now >= at)
    }

    /// Whether `used` successful uses have consumed the usage budget.
    pub fn is_exhausted_by(&self, used: u64) -> bool {
        self.max_usage_count.map_or(false, |max| used >= max)
    }

    /// Evaluate a request against the resource patterns and operation set.
    ///
    /// Returns the human-readable reason on rejection. A request that omits
    /// the resource (or operation) is rejected when the constraint restricts
    /// it, so an unspecified target never slips past a restriction.
    pub fn evaluate(&self, resource: Option<&str>, operation: Option<&str>) -> Result<(), String> {
        if !self.resource_patterns.is_empty() {
            let resource = resource.ok_or_else(|| "resource required but not given".to_string())?;
            if contains_path_traversal(resource) {
                return Err(format!("path traversal detected in resource '{}'", resource));
            }
            if !self
                .resource_patterns
                .iter()
                .any(|pattern| matches_resource_pattern(pattern, resource))
            {
                return Err(format!("resource '{}' not covered by any pattern", resource));
            }
        }

        if !self.operations.is_empty() {
            let operation = operation.ok_or_else(|| "operation required but not given".to_string())?;
            if !self.operations.contains(operation) {
                return Err(format!("operation '{}' not permitted", operation));
            }
        }

        Ok(())
    }
}

/// Glob match that fails closed on an invalid pattern.
fn matches_resource_pattern(pattern: &str, target: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(p) => p.matches(target),
        Err(_) => false,
    }
}

/// Raw-string check so encoded variants are caught without normalizing.
fn contains_path_traversal(resource: &str) -> bool {
    resource.contains("..") || resource.contains("%2e%2e") || resource.contains("%2E%2E")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrestricted_allows_anything() {
        let c = Constraint::unrestricted();
        assert!(c.evaluate(None, None).is_ok());
        assert!(c.evaluate(Some("fs://anywhere"), Some("delete")).is_ok());
    }

    #[test]
    fn resource_pattern_glob() {
        let c = Constraint::unrestricted().with_resource_pattern("fs://workspace/src/**");
        assert!(c.evaluate(Some("fs://workspace/src/lib.rs"), None).is_ok());
        assert!(c.evaluate(Some("fs://workspace/Cargo.toml"), None).is_err());
    }

    #[test]
    fn missing_resource_is_rejected_when_restricted() {
        let c = Constraint::unrestricted().with_resource_pattern("fs://workspace/**");
        let reason = c.evaluate(None, None).unwrap_err();
        assert!(reason.contains("resource required"));
    }

    #[test]
    fn path_traversal_rejected() {
        let c = Constraint::unrestricted().with_resource_pattern("fs://workspace/**");
        let reason = c
            .evaluate(Some("fs://workspace/../etc/passwd"), None)
            .unwrap_err();
        assert!(reason.contains("path traversal"));
        assert!(c.evaluate(Some("fs://workspace/%2e%2e/etc"), None).is_err());
    }

    #[test]
    fn invalid_pattern_fails_closed() {
        let c = Constraint::unrestricted().with_resource_pattern("fs://[unclosed");
        assert!(c.evaluate(Some("fs://[unclosed"), None).is_err());
    }

    #[test]
    fn operation_set() {
        let c = Constraint::unrestricted()
            .with_operation("read")
            .with_operation("stat");
        assert!(c.evaluate(None, Some("read")).is_ok());
        assert!(c.evaluate(None, Some("write")).is_err());
        assert!(c.evaluate(None, None).is_err());
    }

    #[test]
    fn expiry_and_usage_bounds() {
        let c = Constraint::unrestricted()
            .with_max_usage(2)
            .expiring_in(Duration::minutes(5));
        assert!(!c.is_expired_at(Utc::now()));
        assert!(c.is_expired_at(Utc::now() + Duration::minutes(10)));
        assert!(!c.is_exhausted_by(1));
        assert!(c.is_exhausted_by(2));
        assert!(!Constraint::unrestricted().is_exhausted_by(u64::MAX));
    }

    #[test]
    fn resource_limits() {
        let limits = ResourceLimits {
            max_size_bytes: Some(1024),
            ..Default::default()
        };
        assert!(!limits.is_unbounded());
        assert!(limits
            .permits(&ResourceLimits {
                max_size_bytes: Some(512),
                max_time_ms: Some(10_000),
                ..Default::default()
            })
            .is_ok());
        let reason = limits
            .permits(&ResourceLimits {
                max_size_bytes: Some(4096),
                ..Default::default()
            })
            .unwrap_err();
        assert!(reason.contains("size"));
    }
}
