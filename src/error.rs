use crate::lifecycle::Phase;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EnsembleError>;

#[derive(Debug, Error)]
pub enum EnsembleError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// A unit returned an error from one of its lifecycle operations.
    #[error("{unit} failed to {phase}: {source:#}")]
    Lifecycle {
        unit: String,
        phase: Phase,
        #[source]
        source: anyhow::Error,
    },

    /// A unit panicked inside a lifecycle operation.
    #[error("{unit} panicked during {phase}: {message}")]
    Fault {
        unit: String,
        phase: Phase,
        message: String,
    },

    #[error("{unit} failed to reload: {source:#}")]
    Reload {
        unit: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Dependency not found: {type_name}")]
    DependencyNotFound { type_name: String },

    #[error("Failed to downcast type: {type_name}")]
    DowncastFailed { type_name: String },

    #[error("Factory for {type_name} failed: {message}")]
    Factory { type_name: String, message: String },

    #[error("Task {name} rejected: {message}")]
    Task { name: String, message: String },

    #[error("Route binding failed for {namespace}: {message}")]
    Route { namespace: String, message: String },

    #[error("Orchestration pass already ran")]
    AlreadyRan,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EnsembleError {
    /// Wrap a unit-authored error with the unit name and phase it came from.
    pub fn lifecycle(unit: impl Into<String>, phase: Phase, source: anyhow::Error) -> Self {
        Self::Lifecycle {
            unit: unit.into(),
            phase,
            source,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Name of the unit this error is attributed to, if any.
    pub fn unit(&self) -> Option<&str> {
        match self {
            Self::Lifecycle { unit, .. } | Self::Fault { unit, .. } | Self::Reload { unit, .. } => {
                Some(unit)
            }
            _ => None,
        }
    }

    /// Lifecycle phase this error is attributed to, if any.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::Lifecycle { phase, .. } | Self::Fault { phase, .. } => Some(*phase),
            Self::Reload { .. } => Some(Phase::Reload),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for EnsembleError {
    fn from(err: toml::de::Error) -> Self {
        EnsembleError::Config(format!("malformed configuration: {}", err))
    }
}

impl From<toml::ser::Error> for EnsembleError {
    fn from(err: toml::ser::Error) -> Self {
        EnsembleError::Config(format!("failed to serialize configuration: {}", err))
    }
}

impl From<serde_json::Error> for EnsembleError {
    fn from(err: serde_json::Error) -> Self {
        EnsembleError::Config(format!("failed to decode configuration value: {}", err))
    }
}

impl axum::response::IntoResponse for EnsembleError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            EnsembleError::DependencyNotFound { .. } => axum::http::StatusCode::SERVICE_UNAVAILABLE,
            _ => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
