use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;

use crate::error::Result;
use crate::models::{ProductId, ProductRecord};

use super::Repository;

pub trait ProductRepository: Repository<Entity = ProductRecord, Id = ProductId> {
    fn list_all(&self) -> Result<Vec<ProductRecord>>;
    fn count(&self) -> Result<usize>;
    /// Overwrites an existing row; returns `false` when the id is unknown.
    fn update(&self, entity: &ProductRecord) -> Result<bool>;
}

const PRODUCT_COLUMNS: &str = "id, name, sku, brand_name, category_name, description, price,
                               attributes, created_at, updated_at";

pub struct SqliteProductRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteProductRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn row_to_product(row: &rusqlite::Row) -> rusqlite::Result<ProductRecord> {
        let price: Option<String> = row.get(6)?;
        let attributes: String = row.get(7)?;

        Ok(ProductRecord {
            id: ProductId::new(row.get::<_, String>(0)?),
            name: row.get(1)?,
            sku: row.get(2)?,
            brand_name: row.get(3)?,
            category_name: row.get(4)?,
            description: row.get(5)?,
            price: price
                .map(|p| Decimal::from_str(&p))
                .transpose()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?,
            attributes: serde_json::from_str(&attributes)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?,
            created_at: parse_timestamp(row, 8)?,
            updated_at: parse_timestamp(row, 9)?,
        })
    }
}

fn parse_timestamp(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

impl<'a> Repository for SqliteProductRepository<'a> {
    type Entity = ProductRecord;
    type Id = ProductId;

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
        let product = self
            .conn
            .query_row(&sql, params![id.as_str()], Self::row_to_product)
            .optional()?;
        Ok(product)
    }

    fn save(&self, product: &Self::Entity) -> Result<()> {
        product.validate()?;
        let attributes = serde_json::to_string(&product.attributes)?;

        self.conn.execute(
            "INSERT INTO products
                (id, name, sku, brand_name, category_name, description, price,
                 attributes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                sku = excluded.sku,
                brand_name = excluded.brand_name,
                category_name = excluded.category_name,
                description = excluded.description,
                price = excluded.price,
                attributes = excluded.attributes,
                updated_at = excluded.updated_at",
            params![
                product.id.as_str(),
                product.name,
                product.sku,
                product.brand_name,
                product.category_name,
                product.description,
                product.price.map(|p| p.to_string()),
                attributes,
                product.created_at.to_rfc3339(),
                product.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn delete(&self, id: &Self::Id) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM products WHERE id = ?1", params![id.as_str()])?;
        Ok(deleted > 0)
    }
}

impl<'a> ProductRepository for SqliteProductRepository<'a> {
    fn list_all(&self) -> Result<Vec<ProductRecord>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at, id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], Self::row_to_product)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn update(&self, product: &ProductRecord) -> Result<bool> {
        product.validate()?;
        let attributes = serde_json::to_string(&product.attributes)?;

        let updated = self.conn.execute(
            "UPDATE products SET
                name = ?2, sku = ?3, brand_name = ?4, category_name = ?5,
                description = ?6, price = ?7, attributes = ?8, updated_at = ?9
             WHERE id = ?1",
            params![
                product.id.as_str(),
                product.name,
                product.sku,
                product.brand_name,
                product.category_name,
                product.description,
                product.price.map(|p| p.to_string()),
                attributes,
                product.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(updated > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::init_schema;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_save_and_find_preserves_optional_fields() {
        let conn = setup();
        let repo = SqliteProductRepository::new(&conn);

        let mut product = ProductRecord::new("Galaxy S24 Ultra", "SAMSUNG-2");
        product.brand_name = Some("Samsung".to_string());
        product.price = Some(Decimal::from_str("1299.00").unwrap());
        product
            .attributes
            .insert("color".to_string(), serde_json::json!("titanium"));
        repo.save(&product).unwrap();

        let loaded = repo.find_by_id(&product.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Galaxy S24 Ultra");
        assert_eq!(loaded.brand_name.as_deref(), Some("Samsung"));
        assert!(loaded.category_name.is_none());
        assert_eq!(loaded.price, product.price);
        assert_eq!(loaded.attributes["color"], "titanium");
        assert_eq!(loaded.created_at.timestamp(), product.created_at.timestamp());
    }

    #[test]
    fn test_find_missing_returns_none() {
        let conn = setup();
        let repo = SqliteProductRepository::new(&conn);
        assert!(repo.find_by_id(&ProductId::from("nope")).unwrap().is_none());
    }

    #[test]
    fn test_update_unknown_id_returns_false() {
        let conn = setup();
        let repo = SqliteProductRepository::new(&conn);
        let product = ProductRecord::new("Ghost", "G-1");
        assert!(!repo.update(&product).unwrap());
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn test_save_is_upsert() {
        let conn = setup();
        let repo = SqliteProductRepository::new(&conn);

        let mut product = ProductRecord::new("Old", "SKU-1");
        repo.save(&product).unwrap();
        product.name = "New".to_string();
        repo.save(&product).unwrap();

        assert_eq!(repo.count().unwrap(), 1);
        assert_eq!(repo.list_all().unwrap()[0].name, "New");
    }

    #[test]
    fn test_delete() {
        let conn = setup();
        let repo = SqliteProductRepository::new(&conn);
        let product = ProductRecord::new("Temp", "T-1");
        repo.save(&product).unwrap();

        assert!(repo.delete(&product.id).unwrap());
        assert!(!repo.delete(&product.id).unwrap());
    }
}
