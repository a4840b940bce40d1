// token.rs — Capability tokens.
//
// A token is the unit of authority: one capability type, one constraint,
// usage counters and an integrity checksum over the fields that never
// change after issuance. A token whose checksum no longer matches is
// treated exactly like an expired one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::constraint::Constraint;
use crate::error::CapabilityError;

/// Why a token can no longer be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenInvalid {
    Expired,
    Exhausted,
    /// The checksum does not match the immutable fields.
    Tampered,
}

/// A granted capability.
///
/// Fields are private: the only mutation after issuance is usage recording,
/// which is crate-internal and happens under the owning context's lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityToken {
    id: Uuid,
    /// Namespaced capability type, e.g. `file:read`.
    capability: String,
    constraint: Constraint,
    created_at: DateTime<Utc>,
    created_by: String,
    usage_count: u64,
    last_used: Option<DateTime<Utc>>,
    checksum: String,
}

impl CapabilityToken {
    /// Issue a token for `capability` limited by `constraint`.
    pub fn new(
        capability: impl Into<String>,
        constraint: Constraint,
        created_by: impl Into<String>,
    ) -> Self {
        let id = Uuid::new_v4();
        let capability = capability.into();
        let created_by = created_by.into();
        let created_at = Utc::now();
        let checksum = compute_checksum(&id, &capability, &constraint, &created_at, &created_by);
        Self {
            id,
            capability,
            constraint,
            created_at,
            created_by,
            usage_count: 0,
            last_used: None,
            checksum,
        }
    }

    /// Issue an unconstrained token, attributed to the runtime.
    pub fn unrestricted(capability: impl Into<String>) -> Self {
        Self::new(capability, Constraint::unrestricted(), "runtime")
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn capability(&self) -> &str {
        &self.capability
    }

    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn usage_count(&self) -> u64 {
        self.usage_count
    }

    pub fn last_used(&self) -> Option<DateTime<Utc>> {
        self.last_used
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Recompute the checksum and compare it with the stored one.
    pub fn verify_checksum(&self) -> bool {
        let expected = compute_checksum(
            &self.id,
            &self.capability,
            &self.constraint,
            &self.created_at,
            &self.created_by,
        );
        expected == self.checksum
    }

    /// Validate against a given instant. Integrity is checked first.
    pub fn validate_at(&self, now: DateTime<Utc>) -> Result<(), TokenInvalid> {
        if !self.verify_checksum() {
            return Err(TokenInvalid::Tampered);
        }
        if self.constraint.is_expired_at(now) {
            return Err(TokenInvalid::Expired);
        }
        if self.constraint.is_exhausted_by(self.usage_count) {
            return Err(TokenInvalid::Exhausted);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), TokenInvalid> {
        self.validate_at(Utc::now())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Map an invalidity reason onto the error guarded callers see.
    ///
    /// Tampering is reported as expiry: the token is simply unusable.
    pub fn invalid_error(&self, reason: TokenInvalid) -> CapabilityError {
        match reason {
            TokenInvalid::Expired | TokenInvalid::Tampered => CapabilityError::Expired {
                capability: self.capability.clone(),
            },
            TokenInvalid::Exhausted => CapabilityError::Exhausted {
                capability: self.capability.clone(),
                used: self.usage_count,
            },
        }
    }

    /// Record one successful use.
    pub(crate) fn record_use(&mut self) {
        self.usage_count = self.usage_count.saturating_add(1);
        self.last_used = Some(Utc::now());
    }
}

/// SHA-256 over the immutable fields, lowercase hex.
///
/// Fields are separated with the ASCII unit separator so adjacent values
/// cannot be shifted into each other.
fn compute_checksum(
    id: &Uuid,
    capability: &str,
    constraint: &Constraint,
    created_at: &DateTime<Utc>,
    created_by: &str,
) -> String {
    const SEP: &[u8] = &[0x1f];

    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update(SEP);
    hasher.update(capability.as_bytes());
    hasher.update(SEP);
    for pattern in constraint.resource_patterns() {
        hasher.update(pattern.as_bytes());
        hasher.update(SEP);
    }
    hasher.update(b"ops");
    for operation in constraint.operations() {
        hasher.update(operation.as_bytes());
        hasher.update(SEP);
    }
    hasher.update(format!("{:?}", constraint.max_usage_count()).as_bytes());
    hasher.update(SEP);
    hasher.update(
        constraint
            .expires_at()
            .map(|at| at.to_rfc3339())
            .unwrap_or_default()
            .as_bytes(),
    );
    hasher.update(SEP);
    hasher.update(format!("{:?}", constraint.limits()).as_bytes());
    hasher.update(SEP);
    hasher.update(created_at.to_rfc3339().as_bytes());
    hasher.update(SEP);
    hasher.update(created_by.as_bytes());
    format!("{:x}", hasher.finalize())
}
