use crate::UnitError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The smallest independently analyzable piece of a source, typically one file.
///
/// Units are created by a [`UnitSource`](crate::UnitSource) before analysis
/// starts and are never modified afterwards.
///
/// # Examples
///
/// ```
/// use codepager::AnalysisUnit;
///
/// let unit = AnalysisUnit::new("src/lib.rs", 0, "/repo/src/lib.rs").with_affinity("src");
/// assert_eq!(unit.id, "src/lib.rs");
/// assert_eq!(unit.affinity.as_deref(), Some("src"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisUnit {
    /// Stable id, unique within a run
    pub id: String,

    /// Position in source order, dense from 0
    pub ordinal: usize,

    /// Opaque handle the analyzer uses to reach the unit's data (a path, a URL, ...)
    pub payload: String,

    /// Grouping hint (directory, module) used to keep related units together
    pub affinity: Option<String>,
}

impl AnalysisUnit {
    pub fn new(id: impl Into<String>, ordinal: usize, payload: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ordinal,
            payload: payload.into(),
            affinity: None,
        }
    }

    pub fn with_affinity(mut self, affinity: impl Into<String>) -> Self {
        self.affinity = Some(affinity.into());
        self
    }
}

/// Outcome of analyzing one unit: content on success, the failure otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitOutcome {
    Ok { content: Value },
    Failed { error: UnitError },
}

/// Result of analyzing one unit.
///
/// Created exactly once per analyzed unit by the
/// [`Coordinator`](crate::Coordinator) and never mutated afterwards. Chunks
/// refer to results by reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitResult {
    pub unit_id: String,
    pub ordinal: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affinity: Option<String>,
    #[serde(flatten)]
    pub outcome: UnitOutcome,
    /// Estimated token cost of the content (or of the error message)
    pub size_tokens: usize,
    pub elapsed_ms: u64,
}

impl UnitResult {
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, UnitOutcome::Ok { .. })
    }

    pub fn is_failed(&self) -> bool {
        !self.is_ok()
    }

    pub fn content(&self) -> Option<&Value> {
        match &self.outcome {
            UnitOutcome::Ok { content } => Some(content),
            UnitOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&UnitError> {
        match &self.outcome {
            UnitOutcome::Ok { .. } => None,
            UnitOutcome::Failed { error } => Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_serializes_status_inline() {
        let ok = UnitResult {
            unit_id: "a.rs".to_string(),
            ordinal: 0,
            affinity: None,
            outcome: UnitOutcome::Ok {
                content: json!({"lines": 3}),
            },
            size_tokens: 4,
            elapsed_ms: 1,
        };
        let value = serde_json::to_value(&ok).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["content"]["lines"], 3);
        assert!(value.get("affinity").is_none());

        let failed = UnitResult {
            outcome: UnitOutcome::Failed {
                error: UnitError::Timeout(10),
            },
            ..ok
        };
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error"]["kind"], "timeout");
        assert!(failed.is_failed());
        assert!(failed.content().is_none());
        assert_eq!(failed.error(), Some(&UnitError::Timeout(10)));
    }
}
