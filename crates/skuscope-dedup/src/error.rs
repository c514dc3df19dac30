use skuscope_core::{CatalogError, ExitCode, ProductId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DedupError {
    #[error("invalid {field}: {message}")]
    InvalidArgument { field: &'static str, message: String },

    #[error("{role} product not found: {id}")]
    NotFound { role: &'static str, id: ProductId },

    #[error("merge aborted, no changes applied: {0}")]
    Conflict(#[source] CatalogError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl DedupError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidArgument { .. } => ExitCode::InvalidArgs,
            Self::NotFound { .. } => ExitCode::NotFound,
            Self::Conflict(_) => ExitCode::Conflict,
            Self::Catalog(inner) => inner.exit_code(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DedupError>;
