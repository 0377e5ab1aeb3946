//! Results of best-effort operations
//!
//! Several workflow steps must not fail the caller's request when a
//! secondary write or read fails (stage seeding, header sync, secondary list
//! queries, graph sub-fetches). Those steps return an [`Outcome`] carrying
//! the primary value plus one [`Warning`] per swallowed failure.

use serde::Serialize;
use std::fmt;
use tracing::warn;

/// A swallowed failure of a best-effort step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    /// Name of the step that failed, e.g. `seed_stages`
    pub operation: String,
    /// Failure detail. Kept out of API responses.
    #[serde(skip_serializing)]
    pub detail: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.operation, self.detail)
    }
}

#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub value: T,
    pub warnings: Vec<Warning>,
}

impl<T> Outcome<T> {
    pub fn complete(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    /// Record a swallowed failure and log it
    pub fn warn(&mut self, operation: &str, detail: impl fmt::Display) {
        let warning = Warning {
            operation: operation.to_string(),
            detail: detail.to_string(),
        };
        warn!("Best-effort step failed: {}", warning);
        self.warnings.push(warning);
    }

    /// Whether any best-effort step failed
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            warnings: self.warnings,
        }
    }

    pub fn into_parts(self) -> (T, Vec<Warning>) {
        (self.value, self.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_accumulate() {
        let mut outcome = Outcome::complete(1);
        assert!(!outcome.is_degraded());

        outcome.warn("seed_stages", "backend down");
        outcome.warn("sync_deal_status", "timeout");
        assert!(outcome.is_degraded());

        let (value, warnings) = outcome.map(|v| v + 1).into_parts();
        assert_eq!(value, 2);
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[1].operation, "sync_deal_status");
    }

    #[test]
    fn test_detail_not_serialized() {
        let mut outcome = Outcome::complete(());
        outcome.warn("list_documents", "mongo: 10.0.0.4 refused");
        let json = serde_json::to_value(&outcome.warnings).unwrap();
        assert_eq!(json, serde_json::json!([{"operation": "list_documents"}]));
    }
}
