use serde::Serialize;
use skuscope_core::{ProductId, ProductRecord};

use crate::similarity::SimilarityEngine;
use crate::{DedupError, Result};

pub const DEFAULT_MIN_SIMILARITY: f64 = 0.7;

/// An existing product whose name resembles a candidate name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NameMatch {
    pub product: ProductRecord,
    pub similarity: f64,
}

/// Looks for catalog entries whose name is close to `name`.
///
/// Used before inserting or renaming a product. `exclude_id` skips the product
/// being edited.
pub fn check_duplicates(
    catalog: &[ProductRecord],
    name: &str,
    exclude_id: Option<&ProductId>,
    min_similarity: f64,
) -> Result<Vec<NameMatch>> {
    check_with(&SimilarityEngine::default(), catalog, name, exclude_id, min_similarity)
}

pub fn check_with(
    engine: &SimilarityEngine,
    catalog: &[ProductRecord],
    name: &str,
    exclude_id: Option<&ProductId>,
    min_similarity: f64,
) -> Result<Vec<NameMatch>> {
    if !(min_similarity.is_finite() && min_similarity > 0.0 && min_similarity <= 1.0) {
        return Err(DedupError::invalid(
            "minSimilarity",
            format!("must be in (0, 1], got {min_similarity}"),
        ));
    }
    if name.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut matches: Vec<NameMatch> = catalog
        .iter()
        .filter(|p| exclude_id != Some(&p.id) && !p.name.trim().is_empty())
        .filter_map(|p| {
            let similarity = engine.name_similarity(name, &p.name);
            (similarity >= min_similarity).then(|| NameMatch {
                product: p.clone(),
                similarity,
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.product.id.cmp(&b.product.id))
    });
    Ok(matches)
}
