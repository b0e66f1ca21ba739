use thiserror::Error;

/// Failures surfaced by the pool controller.
///
/// Precondition violations are raised before any scene mutation. Host
/// failures are opaque and carried as [`anyhow::Error`].
#[derive(Debug, Error)]
pub enum TrailError {
    #[error("pool size must be positive, got {0}")]
    InvalidPoolSize(usize),

    #[error("index {index} is outside a pool of {pool_size}")]
    IndexOutOfRange { index: usize, pool_size: usize },

    #[error("material catalog is empty")]
    EmptyMaterialCatalog,

    #[error("{kind} `{name}` not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{op} failed for instance {index:?}")]
    Collaborator {
        op: &'static str,
        index: Option<usize>,
        #[source]
        source: anyhow::Error,
    },

    #[error("controller is no longer running")]
    ControllerClosed,
}

impl TrailError {
    pub(crate) fn collaborator(op: &'static str, index: Option<usize>, source: anyhow::Error) -> Self {
        Self::Collaborator { op, index, source }
    }
}

pub type Result<T, E = TrailError> = std::result::Result<T, E>;
