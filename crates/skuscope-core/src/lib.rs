pub mod config;
pub mod error;
pub mod models;
pub mod storage;

pub use config::{AppConfig, CheckConfig, DedupConfig, MergeConfig, WeightsConfig};
pub use error::{CatalogError, ExitCode, Result};
pub use models::*;

pub use storage::database::{ConnectionPool, Database, UnitOfWork, open_database, open_in_memory};

pub use storage::repositories::{
    AuditRepository, ProductRepository, Repository, SqliteAuditRepository,
    SqliteProductRepository,
};
