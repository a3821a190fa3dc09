use thiserror::Error;

/// Main error type for the trading desk
#[derive(Error, Debug)]
pub enum DeskError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Component failure: {component} - {reason}")]
    ComponentFailure { component: String, reason: String },

    #[error("Component not initialized: {0}")]
    NotInitialized(String),

    // External collaborators (data sources, broker)
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    // Bus handler errors
    #[error("Handler {handler} failed: {reason}")]
    Handler { handler: String, reason: String },

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for DeskError
pub type Result<T> = std::result::Result<T, DeskError>;

/// Failure kinds returned by external collaborators (data sources, quote feeds, broker).
///
/// Callers branch on the kind instead of inspecting messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("{source_name} unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },

    #[error("{source_name} timed out after {elapsed_ms}ms")]
    Timeout { source_name: String, elapsed_ms: u64 },

    #[error("{source_name} rejected request: {reason}")]
    Rejected { source_name: String, reason: String },

    #[error("{source_name} returned invalid data: {reason}")]
    InvalidData { source_name: String, reason: String },
}

impl CollaboratorError {
    pub fn unavailable(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    pub fn rejected(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_data(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidData {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Whether a retry on the next cycle could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }

    pub fn source_name(&self) -> &str {
        match self {
            Self::Unavailable { source_name, .. }
            | Self::Timeout { source_name, .. }
            | Self::Rejected { source_name, .. }
            | Self::InvalidData { source_name, .. } => source_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborator_error_kinds() {
        let err = CollaboratorError::unavailable("kis", "connection reset");
        assert!(err.is_transient());
        assert_eq!(err.source_name(), "kis");
        assert_eq!(err.to_string(), "kis unavailable: connection reset");

        let err = CollaboratorError::rejected("broker", "insufficient margin");
        assert!(!err.is_transient());
    }

    #[test]
    fn test_desk_error_from_collaborator() {
        let err: DeskError = CollaboratorError::invalid_data("dart", "missing field").into();
        assert!(matches!(err, DeskError::Collaborator(_)));
        assert_eq!(err.to_string(), "dart returned invalid data: missing field");
    }
}
