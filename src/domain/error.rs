//! Domain error types.

/// Top-level error type for candlebot.
#[derive(Debug, thiserror::Error)]
pub enum CandlebotError {
    #[error("schema error in row {row}: field `{field}` {reason}")]
    Schema {
        row: usize,
        field: String,
        reason: String,
    },

    #[error("missing columns: {}", columns.join(", "))]
    MissingColumn { columns: Vec<String> },

    #[error("column `{column}` is not a {expected} column")]
    ColumnType { column: String, expected: String },

    #[error("duplicate row for {instrument} at {timestamp}")]
    DuplicateRow {
        instrument: String,
        timestamp: String,
    },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("unknown strategy `{name}`")]
    UnknownStrategy { name: String },

    #[error("no data for {instrument}")]
    NoData { instrument: String },

    #[error("data file error: {reason}")]
    DataFile { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CandlebotError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        CandlebotError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            CandlebotError::ConfigParse { .. }
                | CandlebotError::ConfigMissing { .. }
                | CandlebotError::ConfigInvalid { .. }
                | CandlebotError::UnknownStrategy { .. }
        )
    }
}

impl From<&CandlebotError> for std::process::ExitCode {
    fn from(err: &CandlebotError) -> Self {
        let code: u8 = match err {
            CandlebotError::Io(_) => 1,
            CandlebotError::ConfigParse { .. }
            | CandlebotError::ConfigMissing { .. }
            | CandlebotError::ConfigInvalid { .. }
            | CandlebotError::UnknownStrategy { .. } => 2,
            CandlebotError::DataFile { .. } => 3,
            CandlebotError::Schema { .. }
            | CandlebotError::MissingColumn { .. }
            | CandlebotError::ColumnType { .. }
            | CandlebotError::DuplicateRow { .. } => 4,
            CandlebotError::NoData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
