use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod clock;

pub use clock::{Clock, SystemClock};

macro_rules! define_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn from_string(s: &str) -> Self {
                Self(s.to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

// A source is one externally bookable calendar (a tutor page, a room, ...)
define_id!(SourceId);
define_id!(RunId);

/// Identity of one worker inside a scheduling run.
///
/// Assigned sequentially by the scheduler starting at 1; zero is reserved
/// so the outcome registry can encode "nobody" in its atomic state word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(u64);

impl WorkerId {
    pub fn new(raw: u64) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub fn first() -> Self {
        Self(1)
    }

    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// Error codes for structured error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Configuration (1xxx)
    InvalidConfiguration = 1001,
    MissingCredential = 1002,

    // Collaborator sessions (2xxx)
    SessionUnavailable = 2001,
    SessionBroken = 2002,

    // Slot operations (3xxx)
    ProbeFailed = 3001,
    AcquireFailed = 3002,
    ConfirmationFailed = 3003,

    // Data & Persistence (4xxx)
    RepositoryError = 4001,
    SerializationError = 4004,

    // Infrastructure (5xxx)
    InfrastructureError = 5001,
    TimeoutError = 5003,
}

impl ErrorCode {
    /// Get error code as integer
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorCode::SessionUnavailable
                | ErrorCode::SessionBroken
                | ErrorCode::ProbeFailed
                | ErrorCode::AcquireFailed
                | ErrorCode::ConfirmationFailed
                | ErrorCode::TimeoutError
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl DomainError {
    /// Get error code
    pub fn code(&self) -> ErrorCode {
        match self {
            DomainError::InvalidConfiguration(_) => ErrorCode::InvalidConfiguration,
            DomainError::MissingCredential(_) => ErrorCode::MissingCredential,
            DomainError::SessionUnavailable(_) => ErrorCode::SessionUnavailable,
            DomainError::Repository(_) => ErrorCode::RepositoryError,
            DomainError::Serialization(_) => ErrorCode::SerializationError,
            DomainError::Infrastructure(_) => ErrorCode::InfrastructureError,
            DomainError::Timeout(_) => ErrorCode::TimeoutError,
        }
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        self.code().is_recoverable()
    }

    /// Format error with code
    pub fn format_with_code(&self) -> String {
        format!("[{}] {}", self.code().code(), self)
    }
}
