use thiserror::Error;

impl From<serde_json::Error> for SecurityGateError {
    fn from(err: serde_json::Error) -> Self {
        Self::ValidationError(format!("JSON serialization error: {}", err))
    }
}

impl From<serde_yaml::Error> for SecurityGateError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::ConfigError(format!("YAML parse error: {}", err))
    }
}

impl From<std::io::Error> for SecurityGateError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SecurityGateError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("GitHub API error: {0}")]
    GitHubError(String),

    #[error("Scanner error: {0}")]
    ScannerError(String),

    #[error("Notification error: {0}")]
    NotificationError(String),

    #[error("External call to {collaborator} timed out after {timeout_ms}ms")]
    ExternalCallTimeout { collaborator: String, timeout_ms: u64 },

    #[error("Merge execution failed: {0}")]
    MergeExecutionError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Audit error: {0}")]
    AuditError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl SecurityGateError {
    /// True for failures of collaborators (VCS host, scanners, notifiers)
    /// that callers recover from with a safe default.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            Self::GitHubError(_)
                | Self::ScannerError(_)
                | Self::NotificationError(_)
                | Self::ExternalCallTimeout { .. }
        )
    }

    pub fn missing_strategy(level: &str) -> Self {
        Self::ConfigError(format!("No merge strategy configured for risk level '{}'", level))
    }

    pub fn auto_merge_not_allowed(level: &str) -> Self {
        Self::ConfigError(format!(
            "Risk level '{}' must not enable autoMerge; high and critical changes always require manual review",
            level
        ))
    }

    pub fn invalid_weight(factor: &str, weight: f64) -> Self {
        Self::ConfigError(format!(
            "Risk weight for '{}' has the wrong sign: {}",
            factor, weight
        ))
    }
}

pub type Result<T> = std::result::Result<T, SecurityGateError>;
