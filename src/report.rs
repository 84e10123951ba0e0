//! Result contract handed to callers (the CLI, or an HTTP layer wrapping the pipelines).

use serde::Serialize;

use crate::error::{PipelineError, PipelineResult};

/// Success with an affected-record count, or a categorized failure with detail text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineReport {
    Success {
        affected: u64,
        message: String,
    },
    Failure {
        /// Stable label, see [`crate::error::ErrorCategory::label`].
        category: String,
        detail: String,
    },
}

impl PipelineReport {
    pub fn success(affected: u64, message: impl Into<String>) -> Self {
        PipelineReport::Success {
            affected,
            message: message.into(),
        }
    }

    pub fn failure(error: &PipelineError) -> Self {
        PipelineReport::Failure {
            category: error.category().label().to_string(),
            detail: error.to_string(),
        }
    }

    /// Build a report from a pipeline result, counting affected records with `affected`.
    pub fn from_result<T>(result: &PipelineResult<T>, affected: impl FnOnce(&T) -> u64, what: &str) -> Self {
        match result {
            Ok(value) => {
                let n = affected(value);
                Self::success(n, format!("{n} {what}"))
            }
            Err(e) => Self::failure(e),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PipelineReport::Success { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_serialize_with_status_tag() {
        let ok = PipelineReport::success(3, "3 records replicated");
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            serde_json::json!({ "status": "success", "affected": 3, "message": "3 records replicated" })
        );

        let failed = PipelineReport::failure(&PipelineError::ValidationEmpty);
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            serde_json::json!({
                "status": "failure",
                "category": "validation_empty",
                "detail": "no valid data found"
            })
        );
    }
}
