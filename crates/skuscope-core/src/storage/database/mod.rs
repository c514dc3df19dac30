mod connection;
mod migrations;
mod schema;

pub use connection::ConnectionPool;
pub use migrations::{Migration, get_applied_versions, run_migrations};
pub use schema::{SCHEMA_VERSION, init_schema};

use std::path::Path;

use rusqlite::{Connection, TransactionBehavior};

use crate::error::{CatalogError, Result};
use crate::models::{AuditEntry, ProductId, ProductRecord};

use super::repositories::{
    AuditRepository, ProductRepository, Repository, SqliteAuditRepository,
    SqliteProductRepository,
};

pub fn open_database(path: &Path) -> Result<ConnectionPool> {
    let pool = ConnectionPool::open(path)?;
    {
        let conn = pool.get_connection();
        migrations::run_migrations(&conn)?;
    }
    Ok(pool)
}

pub fn open_in_memory() -> Result<ConnectionPool> {
    let pool = ConnectionPool::open_in_memory()?;
    {
        let conn = pool.get_connection();
        migrations::run_migrations(&conn)?;
    }
    Ok(pool)
}

/// The product catalog and its audit log.
pub struct Database {
    pool: ConnectionPool,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let pool = open_database(path)?;
        Ok(Self { pool })
    }

    pub fn open_in_memory() -> Result<Self> {
        let pool = open_in_memory()?;
        Ok(Self { pool })
    }

    pub fn path(&self) -> Option<&str> {
        self.pool.path()
    }

    pub fn upsert_product(&self, product: &ProductRecord) -> Result<()> {
        let conn = self.pool.get_connection();
        SqliteProductRepository::new(&conn).save(product)
    }

    /// Inserts or replaces all records in one transaction.
    pub fn upsert_products(&self, products: &[ProductRecord]) -> Result<usize> {
        self.transaction(|uow| {
            for product in products {
                uow.upsert_product(product)?;
            }
            Ok::<_, CatalogError>(products.len())
        })
    }

    pub fn find_product(&self, id: &ProductId) -> Result<Option<ProductRecord>> {
        let conn = self.pool.get_connection();
        SqliteProductRepository::new(&conn).find_by_id(id)
    }

    pub fn get_product(&self, id: &ProductId) -> Result<ProductRecord> {
        self.find_product(id)?
            .ok_or_else(|| CatalogError::ProductNotFound(id.to_string()))
    }

    pub fn list_products(&self) -> Result<Vec<ProductRecord>> {
        let conn = self.pool.get_connection();
        SqliteProductRepository::new(&conn).list_all()
    }

    pub fn count_products(&self) -> Result<usize> {
        let conn = self.pool.get_connection();
        SqliteProductRepository::new(&conn).count()
    }

    pub fn delete_product(&self, id: &ProductId) -> Result<()> {
        let conn = self.pool.get_connection();
        if !SqliteProductRepository::new(&conn).delete(id)? {
            return Err(CatalogError::ProductNotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        let conn = self.pool.get_connection();
        SqliteAuditRepository::new(&conn).append(entry)
    }

    pub fn list_audit(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        let conn = self.pool.get_connection();
        SqliteAuditRepository::new(&conn).list_recent(limit)
    }

    pub fn list_audit_for(&self, entity_id: &str) -> Result<Vec<AuditEntry>> {
        let conn = self.pool.get_connection();
        SqliteAuditRepository::new(&conn).list_for_entity(entity_id)
    }

    /// Runs `work` inside one `BEGIN IMMEDIATE` transaction.
    ///
    /// The write lock is taken before the first read, so existence checks made
    /// through the [`UnitOfWork`] stay valid until commit. Any `Err` returned by
    /// `work` rolls back every write it made.
    pub fn transaction<T, E, F>(&self, work: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&UnitOfWork<'_>) -> std::result::Result<T, E>,
        E: From<CatalogError>,
    {
        let mut conn = self.pool.get_connection();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| E::from(CatalogError::from(e)))?;

        let outcome = {
            let uow = UnitOfWork { conn: &tx };
            work(&uow)
        };

        match outcome {
            Ok(value) => {
                tx.commit().map_err(|e| E::from(CatalogError::from(e)))?;
                Ok(value)
            }
            Err(err) => {
                tracing::debug!("rolling back catalog transaction");
                drop(tx);
                Err(err)
            }
        }
    }
}

/// Catalog operations bound to an open transaction.
pub struct UnitOfWork<'a> {
    conn: &'a Connection,
}

impl<'a> UnitOfWork<'a> {
    pub fn find_product(&self, id: &ProductId) -> Result<Option<ProductRecord>> {
        SqliteProductRepository::new(self.conn).find_by_id(id)
    }

    pub fn upsert_product(&self, product: &ProductRecord) -> Result<()> {
        SqliteProductRepository::new(self.conn).save(product)
    }

    /// Returns `false` when no row with the product's id exists.
    pub fn update_product(&self, product: &ProductRecord) -> Result<bool> {
        SqliteProductRepository::new(self.conn).update(product)
    }

    /// Returns `false` when no row with `id` exists.
    pub fn delete_product(&self, id: &ProductId) -> Result<bool> {
        SqliteProductRepository::new(self.conn).delete(id)
    }

    pub fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        SqliteAuditRepository::new(self.conn).append(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuditAction;

    fn make_product(id: &str, name: &str, sku: &str) -> ProductRecord {
        let mut product = ProductRecord::new(name, sku);
        product.id = ProductId::from(id);
        product
    }

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.count_products().unwrap(), 0);
        assert!(db.path().is_none());
    }

    #[test]
    fn test_open_on_disk_runs_migrations_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("catalog.db");

        let db = Database::open(&path).unwrap();
        db.upsert_product(&make_product("p1", "Widget", "W-1")).unwrap();
        drop(db);

        let reopened = Database::open(&path).unwrap();
        assert_eq!(reopened.count_products().unwrap(), 1);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let err = db.get_product(&ProductId::from("missing")).unwrap_err();
        assert!(matches!(err, CatalogError::ProductNotFound(id) if id == "missing"));
    }

    #[test]
    fn test_delete_nonexistent() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.delete_product(&ProductId::from("ghost")).is_err());
    }

    #[test]
    fn test_upsert_products_rejects_whole_batch_on_invalid_record() {
        let db = Database::open_in_memory().unwrap();
        let batch = vec![
            make_product("p1", "Widget", "W-1"),
            make_product("p2", "   ", "W-2"),
        ];

        assert!(db.upsert_products(&batch).is_err());
        assert_eq!(db.count_products().unwrap(), 0);
    }

    #[test]
    fn test_transaction_commits_on_ok() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_product(&make_product("p1", "Widget", "W-1")).unwrap();

        db.transaction(|uow| {
            let mut product = uow.find_product(&ProductId::from("p1"))?.unwrap();
            product.name = "Widget Pro".to_string();
            uow.update_product(&product)?;
            uow.append_audit(&AuditEntry::new(
                "tester",
                AuditAction::Merge,
                "p1",
                serde_json::json!({}),
            ))?;
            Ok::<_, CatalogError>(())
        })
        .unwrap();

        assert_eq!(db.get_product(&ProductId::from("p1")).unwrap().name, "Widget Pro");
        assert_eq!(db.list_audit(10).unwrap().len(), 1);
    }

    #[test]
    fn test_transaction_rolls_back_on_err() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_product(&make_product("p1", "Widget", "W-1")).unwrap();
        db.upsert_product(&make_product("p2", "Widget 2", "W-2")).unwrap();

        let result: Result<()> = db.transaction(|uow| {
            let mut product = uow.find_product(&ProductId::from("p1"))?.unwrap();
            product.name = "Changed".to_string();
            uow.update_product(&product)?;
            uow.delete_product(&ProductId::from("p2"))?;
            Err(CatalogError::ProductNotFound("p3".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(db.get_product(&ProductId::from("p1")).unwrap().name, "Widget");
        assert!(db.find_product(&ProductId::from("p2")).unwrap().is_some());
    }
}
