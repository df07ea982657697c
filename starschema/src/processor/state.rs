use common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stages of a single transform run. A failed run is retried from `Init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Init,
    Parse,
    BuildDimensions,
    ResolveFacts,
    Write,
    Done,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Init => "INIT",
            RunState::Parse => "PARSE",
            RunState::BuildDimensions => "BUILD_DIMENSIONS",
            RunState::ResolveFacts => "RESOLVE_FACTS",
            RunState::Write => "WRITE",
            RunState::Done => "DONE",
            RunState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    /// The stage that follows a successful `self`.
    pub fn next(&self) -> Option<RunState> {
        match self {
            RunState::Init => Some(RunState::Parse),
            RunState::Parse => Some(RunState::BuildDimensions),
            RunState::BuildDimensions => Some(RunState::ResolveFacts),
            RunState::ResolveFacts => Some(RunState::Write),
            RunState::Write => Some(RunState::Done),
            RunState::Done | RunState::Failed => None,
        }
    }

    pub fn can_transition_to(&self, to: RunState) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == RunState::Failed || self.next() == Some(to)
    }

    pub fn transition(self, to: RunState) -> Result<RunState> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(Error::Other(format!(
                "Illegal run state transition {} -> {}",
                self, to
            )))
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
