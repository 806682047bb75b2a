use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("duplicate job key: {0}")]
    DuplicateJobKey(String),
    #[error("ticker error: {0}")]
    Ticker(String),
}

impl From<std::io::Error> for DashboardError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}
