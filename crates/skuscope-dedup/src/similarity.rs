//! Pairwise product similarity.
//!
//! Text fields are normalized, compared with a Levenshtein ratio and combined
//! with fixed weights. A field that is blank on either side does not count
//! toward the score at all, so two products with empty SKUs are not "equal" on
//! SKU. Only names get the containment floor; SKUs and descriptions use the
//! plain ratio.

use serde::Serialize;
use skuscope_core::{DedupConfig, ProductRecord, WeightsConfig};

/// Shorter strings are too generic for the containment rule ("pro", "15").
const MIN_CONTAINMENT_LEN: usize = 4;

const VERY_SIMILAR_NAME: f64 = 0.8;
const SIMILAR_NAME: f64 = 0.6;
const SIMILAR_SKU: f64 = 0.7;
const SIMILAR_DESCRIPTION: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityResult {
    pub score: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SimilarityEngine {
    weights: WeightsConfig,
    containment_score: f64,
}

impl Default for SimilarityEngine {
    fn default() -> Self {
        Self::from(&DedupConfig::default())
    }
}

impl From<&DedupConfig> for SimilarityEngine {
    fn from(config: &DedupConfig) -> Self {
        Self {
            weights: config.weights,
            containment_score: config.containment_score.clamp(0.0, 1.0),
        }
    }
}

impl SimilarityEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(mut self, weights: WeightsConfig) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_containment_score(mut self, score: f64) -> Self {
        self.containment_score = score.clamp(0.0, 1.0);
        self
    }

    /// Similarity of two raw product names; 0 when either normalizes to empty.
    pub fn name_similarity(&self, a: &str, b: &str) -> f64 {
        self.contained_similarity(&normalize(a), &normalize(b))
    }

    fn contained_similarity(&self, a: &str, b: &str) -> f64 {
        let ratio = string_similarity(a, b);
        if ratio >= self.containment_score {
            return ratio;
        }

        let (shorter, longer) = if a.chars().count() <= b.chars().count() {
            (a, b)
        } else {
            (b, a)
        };
        if shorter.chars().count() >= MIN_CONTAINMENT_LEN && longer.contains(shorter) {
            self.containment_score
        } else {
            ratio
        }
    }

    pub fn compare(&self, a: &ProductRecord, b: &ProductRecord) -> SimilarityResult {
        let mut acc = WeightedScore::default();
        let mut reasons = Vec::new();

        if let Some(sim) = text_field(&a.name, &b.name, |x, y| self.contained_similarity(x, y)) {
            acc.add(self.weights.name, sim);
            if sim > VERY_SIMILAR_NAME {
                reasons.push(format!("Very similar names ({}% match)", percent(sim)));
            } else if sim > SIMILAR_NAME {
                reasons.push(format!("Similar names ({}% match)", percent(sim)));
            }
        }

        if let Some(sim) = text_field(&a.sku, &b.sku, string_similarity) {
            acc.add(self.weights.sku, sim);
            if sim > SIMILAR_SKU {
                reasons.push(format!("Similar SKUs ({}% match)", percent(sim)));
            }
        }

        if let Some(same) = exact_match(a.brand_name.as_deref(), b.brand_name.as_deref()) {
            acc.add(self.weights.brand, if same { 1.0 } else { 0.0 });
            if same {
                reasons.push("Same brand".to_string());
            }
        }

        if let Some(same) = exact_match(a.category_name.as_deref(), b.category_name.as_deref()) {
            acc.add(self.weights.category, if same { 1.0 } else { 0.0 });
            if same {
                reasons.push("Same category".to_string());
            }
        }

        if let (Some(left), Some(right)) = (a.description.as_deref(), b.description.as_deref())
            && let Some(sim) = text_field(left, right, string_similarity)
        {
            acc.add(self.weights.description, sim);
            if sim > SIMILAR_DESCRIPTION {
                reasons.push(format!("Very similar descriptions ({}% match)", percent(sim)));
            }
        }

        SimilarityResult {
            score: acc.finish(),
            reasons,
        }
    }
}

/// `None` when the field is blank on either side and must be left out.
fn text_field(a: &str, b: &str, similarity: impl Fn(&str, &str) -> f64) -> Option<f64> {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return None;
    }
    Some(similarity(&a, &b))
}

#[derive(Debug, Default)]
struct WeightedScore {
    total: f64,
    weight_sum: f64,
}

impl WeightedScore {
    fn add(&mut self, weight: f64, sub_score: f64) {
        if weight <= 0.0 {
            return;
        }
        self.total += weight * sub_score;
        self.weight_sum += weight;
    }

    fn finish(&self) -> f64 {
        if self.weight_sum > 0.0 {
            (self.total / self.weight_sum).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Compares two products with the default weights.
pub fn compare_products(a: &ProductRecord, b: &ProductRecord) -> SimilarityResult {
    SimilarityEngine::default().compare(a, b)
}

/// Name-only similarity with the default containment rule.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    SimilarityEngine::default().name_similarity(a, b)
}

/// Lower-cases, drops everything except alphanumerics and whitespace, and
/// collapses whitespace runs.
pub fn normalize(value: &str) -> String {
    let cleaned: String = value
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Levenshtein edit distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            let deletion = prev[j + 1] + 1;
            let insertion = curr[j] + 1;
            curr[j + 1] = substitution.min(deletion).min(insertion);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// `(maxLen - distance) / maxLen`; 0 when either side is empty.
pub fn string_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let max_len = a.chars().count().max(b.chars().count());
    let distance = levenshtein(a, b);
    (max_len - distance) as f64 / max_len as f64
}

fn exact_match(a: Option<&str>, b: Option<&str>) -> Option<bool> {
    let a = a.map(str::trim).filter(|s| !s.is_empty())?;
    let b = b.map(str::trim).filter(|s| !s.is_empty())?;
    Some(a.to_lowercase() == b.to_lowercase())
}

fn percent(similarity: f64) -> u32 {
    (similarity * 100.0).round() as u32
}
