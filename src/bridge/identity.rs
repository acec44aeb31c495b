//! Caller identity resolution.
//!
//! The telephony start signal may or may not carry the caller's number. When
//! it does not, the call id stands in as the partition key. The two cases are
//! kept as separate variants so their memory partitions can never collide.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallerIdentity {
    /// Caller's phone number as reported by the telephony provider
    Phone(String),
    /// No number available; the per-call id is used instead
    CallFallback(String),
}

impl CallerIdentity {
    /// Resolve from the optional caller number, falling back to the call id.
    pub fn resolve(caller: Option<&str>, call_id: &str) -> Self {
        match caller.map(str::trim).filter(|number| !number.is_empty()) {
            Some(number) => CallerIdentity::Phone(number.to_string()),
            None => CallerIdentity::CallFallback(call_id.to_string()),
        }
    }

    /// Raw value, as it was received.
    pub fn as_str(&self) -> &str {
        match self {
            CallerIdentity::Phone(number) => number,
            CallerIdentity::CallFallback(call_id) => call_id,
        }
    }

    /// Key under which memories for this caller are stored.
    ///
    /// Phone numbers are normalized to digits so `+1 (555) 000-1111` and
    /// `+15550001111` share a partition.
    pub fn partition_key(&self) -> String {
        match self {
            CallerIdentity::Phone(number) => {
                let digits: String = number.chars().filter(char::is_ascii_digit).collect();
                format!("phone_{}", digits)
            }
            CallerIdentity::CallFallback(call_id) => format!("call_{}", call_id),
        }
    }

    /// Whether earlier calls can exist under this identity.
    pub fn is_stable(&self) -> bool {
        matches!(self, CallerIdentity::Phone(_))
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
