use serde::{Deserialize, Serialize};

/// Status-machine state of a tracked job.
///
/// Forward path is `Queued -> Starting -> Processing -> {RateLimited, Completed, Failed}`,
/// with `RateLimited -> Processing` for retries. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Queued,
    Starting,
    Processing,
    RateLimited,
    Completed,
    Failed,
}

impl JobPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Starting => "starting",
            Self::Processing => "processing",
            Self::RateLimited => "rate_limited",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One entry of the job list handed to the tracker at batch start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub key: String,
    pub display_name: String,
}

impl JobSpec {
    pub fn new(key: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
        }
    }

    /// Job keyed by model name, labelled with its resolved provider.
    pub fn for_model(model: &str) -> Self {
        Self::new(model, crate::provider::display_label(model))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonInteractiveReason {
    CiEnv,
    DumbTerminal,
    NonTtyStdout,
    Forced,
}

/// Coordinator lifecycle. Moves strictly `Idle -> Tracking -> Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Idle,
    Tracking,
    Finished,
}

/// `auto | always | never` setting, as spelled in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
    #[default]
    Auto,
    Always,
    Never,
}
