//! Merging a set of duplicates into one surviving product.
//!
//! Every read and write of a merge goes through one immediate transaction:
//! either the primary is updated, all duplicates are gone and one `MERGE`
//! audit entry exists, or nothing changed at all.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::json;
use skuscope_core::{
    AuditAction, AuditEntry, Database, MergeConfig, ProductId, ProductRecord,
    UnitOfWork,
};

use crate::{DedupError, Result};

/// Which primary fields survive untouched.
///
/// A `false` flag lets an empty primary field be filled from the duplicates;
/// a non-empty primary value is never overwritten.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FieldPolicy {
    pub keep_name: bool,
    pub keep_description: bool,
    pub keep_price: bool,
    pub keep_brand: bool,
    pub keep_category: bool,
}

impl FieldPolicy {
    pub fn keep_all() -> Self {
        Self {
            keep_name: true,
            keep_description: true,
            keep_price: true,
            keep_brand: true,
            keep_category: true,
        }
    }
}

impl From<&MergeConfig> for FieldPolicy {
    fn from(config: &MergeConfig) -> Self {
        Self {
            keep_name: config.keep_name,
            keep_description: config.keep_description,
            keep_price: config.keep_price,
            keep_brand: config.keep_brand,
            keep_category: config.keep_category,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRequest {
    #[serde(rename = "primaryProductId")]
    pub primary_id: ProductId,
    #[serde(rename = "duplicateProductIds")]
    pub duplicate_ids: Vec<ProductId>,
    #[serde(rename = "mergeOptions", default)]
    pub field_policy: FieldPolicy,
}

impl MergeRequest {
    pub fn new(primary_id: impl Into<ProductId>, duplicate_ids: Vec<ProductId>) -> Self {
        Self {
            primary_id: primary_id.into(),
            duplicate_ids,
            field_policy: FieldPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FieldPolicy) -> Self {
        self.field_policy = policy;
        self
    }

    /// Checks the request shape without touching the store.
    pub fn validate(&self) -> Result<()> {
        if self.primary_id.is_blank() {
            return Err(DedupError::invalid("primaryProductId", "must not be empty"));
        }
        if self.duplicate_ids.is_empty() {
            return Err(DedupError::invalid(
                "duplicateProductIds",
                "at least one duplicate is required",
            ));
        }

        let mut seen = HashSet::with_capacity(self.duplicate_ids.len());
        for id in &self.duplicate_ids {
            if id.is_blank() {
                return Err(DedupError::invalid("duplicateProductIds", "ids must not be empty"));
            }
            if id == &self.primary_id {
                return Err(DedupError::invalid(
                    "duplicateProductIds",
                    format!("primary product {id} cannot be merged into itself"),
                ));
            }
            if !seen.insert(id) {
                return Err(DedupError::invalid(
                    "duplicateProductIds",
                    format!("{id} is listed more than once"),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOutcome {
    pub product: ProductRecord,
    pub merged_ids: Vec<ProductId>,
    /// Primary fields that were empty and got a duplicate's value.
    pub filled_fields: Vec<&'static str>,
    pub audit_id: String,
}

/// Merges `request.duplicate_ids` into the primary product.
///
/// Missing products abort with [`DedupError::NotFound`]; store failures after
/// validation abort with [`DedupError::Conflict`]. In both cases the
/// transaction is rolled back.
pub fn merge_duplicates(db: &Database, request: &MergeRequest, actor: &str) -> Result<MergeOutcome> {
    request.validate()?;

    let outcome = db
        .transaction(|uow| merge_in(uow, request, actor))
        .map_err(|err| match err {
            DedupError::Catalog(inner) => DedupError::Conflict(inner),
            other => other,
        })?;

    tracing::info!(
        primary = %outcome.product.id,
        merged = outcome.merged_ids.len(),
        filled = ?outcome.filled_fields,
        actor,
        "merged duplicate products"
    );
    Ok(outcome)
}

fn merge_in(uow: &UnitOfWork<'_>, request: &MergeRequest, actor: &str) -> Result<MergeOutcome> {
    let mut primary = uow
        .find_product(&request.primary_id)?
        .ok_or_else(|| DedupError::NotFound {
            role: "primary",
            id: request.primary_id.clone(),
        })?;

    let mut duplicates = Vec::with_capacity(request.duplicate_ids.len());
    for id in &request.duplicate_ids {
        let duplicate = uow.find_product(id)?.ok_or_else(|| DedupError::NotFound {
            role: "duplicate",
            id: id.clone(),
        })?;
        duplicates.push(duplicate);
    }

    let filled_fields = reconcile(&mut primary, &duplicates, &request.field_policy);
    primary.touch();

    if !uow.update_product(&primary)? {
        return Err(DedupError::NotFound {
            role: "primary",
            id: primary.id.clone(),
        });
    }

    for id in &request.duplicate_ids {
        if !uow.delete_product(id)? {
            return Err(DedupError::NotFound {
                role: "duplicate",
                id: id.clone(),
            });
        }
    }

    let entry = AuditEntry::new(
        actor,
        AuditAction::Merge,
        primary.id.as_str(),
        json!({
            "mergedIds": request.duplicate_ids,
            "filledFields": filled_fields,
            "message": format!(
                "Merged {} duplicate products into {}",
                request.duplicate_ids.len(),
                primary.name
            ),
        }),
    );
    uow.append_audit(&entry)?;

    Ok(MergeOutcome {
        product: primary,
        merged_ids: request.duplicate_ids.clone(),
        filled_fields,
        audit_id: entry.id.to_string(),
    })
}

/// Fills empty primary fields from the first duplicate that has a value.
fn reconcile(
    primary: &mut ProductRecord,
    duplicates: &[ProductRecord],
    policy: &FieldPolicy,
) -> Vec<&'static str> {
    let mut filled = Vec::new();

    if !policy.keep_name
        && primary.name.trim().is_empty()
        && let Some(name) = duplicates.iter().map(|d| &d.name).find(|n| !n.trim().is_empty())
    {
        primary.name = name.clone();
        filled.push("name");
    }

    if !policy.keep_description
        && fill_text(&mut primary.description, duplicates.iter().map(|d| &d.description))
    {
        filled.push("description");
    }

    if !policy.keep_price
        && primary.price.is_none()
        && let Some(price) = duplicates.iter().find_map(|d| d.price)
    {
        primary.price = Some(price);
        filled.push("price");
    }

    if !policy.keep_brand
        && fill_text(&mut primary.brand_name, duplicates.iter().map(|d| &d.brand_name))
    {
        filled.push("brandName");
    }

    if !policy.keep_category
        && fill_text(&mut primary.category_name, duplicates.iter().map(|d| &d.category_name))
    {
        filled.push("categoryName");
    }

    filled
}

fn fill_text<'a>(
    target: &mut Option<String>,
    candidates: impl Iterator<Item = &'a Option<String>>,
) -> bool {
    if !is_blank(target) {
        return false;
    }
    match candidates.filter(|c| !is_blank(c)).find_map(Option::clone) {
        Some(value) => {
            *target = Some(value);
            true
        }
        None => false,
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}
