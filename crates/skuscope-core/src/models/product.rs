use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque product identifier.
///
/// The catalog never interprets ids beyond equality and ordering; new records
/// get a UUIDv7 rendered as text, imported records keep whatever id they carry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ProductId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for ProductId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A single catalog entry as seen by duplicate detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    #[serde(default = "ProductId::generate")]
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub sku: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,

    /// Display-only passthrough fields owned by the host application.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: serde_json::Map<String, serde_json::Value>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl ProductRecord {
    pub fn new(name: impl Into<String>, sku: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ProductId::generate(),
            name: name.into(),
            sku: sku.into(),
            brand_name: None,
            category_name: None,
            description: None,
            price: None,
            attributes: serde_json::Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Rejects records the store cannot hold: a blank id or a blank name.
    pub fn validate(&self) -> crate::Result<()> {
        if self.id.is_blank() {
            return Err(crate::CatalogError::Validation(
                "product id must not be empty".to_string(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(crate::CatalogError::Validation(format!(
                "product {} has an empty name",
                self.id
            )));
        }
        Ok(())
    }
}

/// Parses a user-supplied price such as `"19.99"`.
pub fn parse_price(raw: &str) -> crate::Result<Decimal> {
    let trimmed = raw.trim();
    let price: Decimal = trimmed
        .parse()
        .map_err(|e: rust_decimal::Error| crate::CatalogError::InvalidPrice {
            value: raw.to_string(),
            message: e.to_string(),
        })?;
    if price.is_sign_negative() {
        return Err(crate::CatalogError::InvalidPrice {
            value: raw.to_string(),
            message: "price must not be negative".to_string(),
        });
    }
    Ok(price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_product_new() {
        let product = ProductRecord::new("iPhone 15 Pro", "APPLE-IP15P-128");
        assert_eq!(product.name, "iPhone 15 Pro");
        assert_eq!(product.sku, "APPLE-IP15P-128");
        assert!(product.brand_name.is_none());
        assert!(!product.id.is_blank());
        assert_eq!(product.created_at, product.updated_at);
    }

    #[test]
    fn test_product_deserializes_host_payload() {
        let json = r#"{
            "id": "clx001",
            "name": "Air Jordan 1",
            "sku": "NIKE-1",
            "brandName": "Nike",
            "price": "129.99",
            "attributes": {"color": "red"}
        }"#;
        let product: ProductRecord = serde_json::from_str(json).unwrap();
        assert_eq!(product.id, ProductId::from("clx001"));
        assert_eq!(product.brand_name.as_deref(), Some("Nike"));
        assert_eq!(product.price, Some(Decimal::from_str("129.99").unwrap()));
        assert_eq!(product.attributes["color"], "red");
        assert!(product.category_name.is_none());
    }

    #[test]
    fn test_missing_id_gets_generated() {
        let product: ProductRecord = serde_json::from_str(r#"{"name": "Widget"}"#).unwrap();
        assert!(!product.id.is_blank());
        assert!(product.sku.is_empty());
    }

    #[test]
    fn test_validate_rejects_blank_name() {
        let product = ProductRecord::new("   ", "SKU-1");
        assert!(matches!(
            product.validate(),
            Err(crate::CatalogError::Validation(_))
        ));
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price(" 19.90 ").unwrap(), Decimal::from_str("19.90").unwrap());
        assert!(parse_price("abc").is_err());
        assert!(parse_price("-1").is_err());
    }
}
