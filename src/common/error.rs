//! Error types for ringkv

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // === Ring Errors ===
    #[error("Hash ring is empty")]
    EmptyRing,

    #[error("Unknown node name: {0}")]
    UnknownNodeName(String),

    #[error("Node name listed twice: {0}")]
    DuplicateNodeName(String),

    #[error("Hash collision between {existing} and {incoming}")]
    HashCollision { existing: String, incoming: String },

    #[error("No available servers: requested {requested}, available {available}")]
    PoolExhausted { requested: usize, available: usize },

    // === Lifecycle / Protocol Errors ===
    #[error("Invalid transition for {node}: {command} while {state}")]
    InvalidTransition {
        node: String,
        state: String,
        command: String,
    },

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("No started neighbour to migrate data of {0}")]
    NoEligibleNeighbor(String),

    #[error("Migration aborted: {0}")]
    MigrationAborted(String),

    #[error("Launch failed for {node}: {reason}")]
    Launch { node: String, reason: String },

    // === Coordination Service Errors ===
    #[error("Coordination service unavailable: {0}")]
    CoordinationUnavailable(String),

    #[error("Version conflict on {path}: expected {expected}, found {actual}")]
    VersionConflict {
        path: String,
        expected: i32,
        actual: i32,
    },

    #[error("No such znode: {0}")]
    NoNode(String),

    #[error("Znode already exists: {0}")]
    NodeExists(String),

    #[error("Znode has children: {0}")]
    NotEmpty(String),

    // === Network Errors ===
    #[error("HTTP error: {0}")]
    Http(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Operation timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Stable machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::EmptyRing => "empty_ring",
            Error::UnknownNodeName(_) => "unknown_node_name",
            Error::DuplicateNodeName(_) => "duplicate_node_name",
            Error::HashCollision { .. } => "hash_collision",
            Error::PoolExhausted { .. } => "pool_exhausted",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::InvalidCommand(_) => "invalid_command",
            Error::NoEligibleNeighbor(_) => "no_eligible_neighbor",
            Error::MigrationAborted(_) => "migration_aborted",
            Error::Launch { .. } => "launch",
            Error::CoordinationUnavailable(_) => "coordination_service_unavailable",
            Error::VersionConflict { .. } => "version_conflict",
            Error::NoNode(_) => "no_node",
            Error::NodeExists(_) => "node_exists",
            Error::NotEmpty(_) => "not_empty",
            Error::Http(_) => "http",
            Error::InvalidConfig(_) => "invalid_config",
            Error::Timeout(_) => "timeout",
            Error::Other(_) => "other",
        }
    }

    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::VersionConflict { .. } | Error::NodeExists(_) | Error::Timeout(_)
        )
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::NoNode(_) | Error::UnknownNodeName(_) => StatusCode::NOT_FOUND,
            Error::NodeExists(_)
            | Error::NotEmpty(_)
            | Error::VersionConflict { .. }
            | Error::HashCollision { .. }
            | Error::InvalidTransition { .. } => StatusCode::CONFLICT,
            Error::DuplicateNodeName(_)
            | Error::InvalidCommand(_)
            | Error::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            Error::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            Error::EmptyRing
            | Error::PoolExhausted { .. }
            | Error::NoEligibleNeighbor(_)
            | Error::CoordinationUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (self.to_http_status(), axum::Json(body)).into_response()
    }
}

// Implement From for common error types
impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}
