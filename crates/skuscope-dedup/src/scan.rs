use std::time::Instant;

use serde::Serialize;
use serde_json::json;
use skuscope_core::{AuditAction, AuditEntry, Database, DedupConfig};

use crate::grouping::{DuplicateFinder, DuplicateGroup};
use crate::Result;

/// Audit entity id used for catalog-wide scans.
pub const SCAN_ENTITY_ID: &str = "duplicate-scan";

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub record_audit: bool,
    pub actor: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            record_audit: false,
            actor: "system".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub groups: Vec<DuplicateGroup>,
    pub products_scanned: usize,
    pub threshold: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_id: Option<String>,
}

/// Scans the whole catalog for duplicate groups.
///
/// Reads a snapshot of the products, so concurrent writers never see a
/// half-finished scan. With `record_audit` one `SCAN` entry is appended.
pub fn scan_catalog(
    db: &Database,
    config: &DedupConfig,
    threshold: f64,
    options: &ScanOptions,
) -> Result<ScanReport> {
    let finder = DuplicateFinder::from_config(config)?.with_threshold(threshold)?;

    let started = Instant::now();
    let products = db.list_products()?;
    let groups = finder.find(&products);

    tracing::info!(
        products = products.len(),
        groups = groups.len(),
        threshold,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "duplicate scan finished"
    );

    let audit_id = if options.record_audit {
        let entry = AuditEntry::new(
            options.actor.as_str(),
            AuditAction::Scan,
            SCAN_ENTITY_ID,
            json!({
                "groupsFound": groups.len(),
                "threshold": threshold,
            }),
        );
        db.append_audit(&entry)?;
        Some(entry.id.to_string())
    } else {
        None
    };

    Ok(ScanReport {
        groups,
        products_scanned: products.len(),
        threshold,
        audit_id,
    })
}
