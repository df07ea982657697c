use crate::models::TableKind;
use crate::processor::parser::SourceKind;
use crate::processor::state::RunState;
use common::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

/// Why a run failed, and in which stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub kind: ErrorKind,
    pub stage: RunState,
    pub message: String,
}

impl RunError {
    pub fn new(stage: RunState, error: &Error) -> Self {
        Self {
            kind: error.kind(),
            stage,
            message: error.to_string(),
        }
    }
}

/// Report of one transform run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub status: RunStatus,
    /// Rows written per table.
    pub row_counts: BTreeMap<TableKind, usize>,
    /// Records skipped per source.
    pub malformed_counts: BTreeMap<SourceKind, usize>,
    pub duplicate_events: usize,
    /// Partitions committed per table.
    pub partitions_written: BTreeMap<TableKind, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
}

impl RunResult {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            status: RunStatus::Succeeded,
            row_counts: BTreeMap::new(),
            malformed_counts: BTreeMap::new(),
            duplicate_events: 0,
            partitions_written: BTreeMap::new(),
            error: None,
        }
    }

    /// A run that failed before it had a chance to start, e.g. on bad settings.
    pub fn failed(run_id: Uuid, stage: RunState, error: &Error) -> Self {
        let mut result = Self::new(run_id);
        result.fail(stage, error);
        result
    }

    pub fn fail(&mut self, stage: RunState, error: &Error) {
        self.status = RunStatus::Failed;
        self.error = Some(RunError::new(stage, error));
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result_serialization() {
        let error = Error::Ingest("too many malformed records".to_string());
        let result = RunResult::failed(Uuid::nil(), RunState::Parse, &error);
        assert!(!result.is_success());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"]["kind"], "INGEST_FAILURE");
        assert_eq!(json["error"]["stage"], "PARSE");
    }

    #[test]
    fn test_success_omits_error() {
        let mut result = RunResult::new(Uuid::nil());
        result.row_counts.insert(TableKind::Songplays, 3);
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["row_counts"]["songplays"], 3);
    }
}
