//! Identifiers
//!
//! Each entity gets its own UUID newtype so a wallet id cannot be handed to
//! a claim lookup. Ids render with a short prefix (`claim_…`) and parse
//! back with or without it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{BenefitError, Result};

macro_rules! prefixed_id {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Accepts `prefix_<uuid>` or a bare UUID
            pub fn parse(text: &str) -> Result<Self> {
                let raw = text.trim();
                let raw = raw.strip_prefix(concat!($prefix, "_")).unwrap_or(raw);
                Uuid::parse_str(raw).map(Self).map_err(|e| {
                    BenefitError::invalid_input($prefix, format!("'{}' is not a {} id: {}", text, $prefix, e))
                })
            }

            /// Hyphen-free form, used for external references
            pub fn compact(&self) -> String {
                self.0.simple().to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl FromStr for $name {
            type Err = BenefitError;

            fn from_str(text: &str) -> Result<Self> {
                Self::parse(text)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "_{}"), self.0)
            }
        }
    };
}

prefixed_id!(WalletId, "wallet", "Unique identifier for a benefit wallet (member or family pool)");
prefixed_id!(ClaimId, "claim", "Unique identifier for a reimbursement claim");
prefixed_id!(UserId, "user", "Unique identifier for a person: member, dependent, or staff actor");
prefixed_id!(PolicyId, "policy", "Unique identifier for an employer/insurer policy");
prefixed_id!(TransactionId, "txn", "Unique identifier for a ledger transaction");

/// A benefit bucket such as `CONSULTATION` or `PHARMACY`.
///
/// Category codes are configured per policy, so this is an open string key
/// rather than a closed enum. Codes are normalised to upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(String);

impl CategoryId {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn consultation() -> Self {
        Self::new("CONSULTATION")
    }

    pub fn pharmacy() -> Self {
        Self::new("PHARMACY")
    }

    pub fn diagnostics() -> Self {
        Self::new("DIAGNOSTICS")
    }

    pub fn dental() -> Self {
        Self::new("DENTAL")
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque reference returned by the external document-storage capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentRef(pub String);

impl DocumentRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }
}
