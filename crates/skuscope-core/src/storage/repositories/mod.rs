mod audit_repository;
mod product_repository;

pub use audit_repository::{AuditRepository, SqliteAuditRepository};
pub use product_repository::{ProductRepository, SqliteProductRepository};

use crate::error::Result;

pub trait Repository {
    type Entity;
    type Id;

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>>;
    fn save(&self, entity: &Self::Entity) -> Result<()>;
    fn delete(&self, id: &Self::Id) -> Result<bool>;
}
