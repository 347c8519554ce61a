use thiserror::Error;

/// Deployment mistakes detected at startup. The only error class that stops the process.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{key}: cannot parse '{value}': {reason}")]
    Parse {
        key: String,
        value: String,
        reason: String,
    },
    #[error("{key}: {reason}")]
    Invalid { key: String, reason: String },
}

impl ConfigError {
    pub fn parse(key: &str, value: &str, reason: impl ToString) -> Self {
        ConfigError::Parse {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid(key: &str, reason: impl ToString) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}
