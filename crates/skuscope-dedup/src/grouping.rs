use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use serde::Serialize;
use skuscope_core::{DedupConfig, ProductId, ProductRecord};

use crate::similarity::SimilarityEngine;
use crate::{DedupError, Result};

pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// Products believed to describe the same item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    /// Ordered by ascending id; always at least two.
    pub products: Vec<ProductRecord>,
    /// Mean score of the above-threshold pairs inside the group.
    pub score: f64,
    pub reasons: Vec<String>,
}

impl DuplicateGroup {
    pub fn ids(&self) -> Vec<&ProductId> {
        self.products.iter().map(|p| &p.id).collect()
    }

    pub fn smallest_id(&self) -> &ProductId {
        &self.products[0].id
    }

    pub fn contains(&self, id: &ProductId) -> bool {
        self.products.iter().any(|p| &p.id == id)
    }
}

#[derive(Debug, Clone)]
pub struct DuplicateFinder {
    engine: SimilarityEngine,
    threshold: f64,
    parallel_min_products: usize,
}

impl Default for DuplicateFinder {
    fn default() -> Self {
        Self {
            engine: SimilarityEngine::default(),
            threshold: DEFAULT_THRESHOLD,
            parallel_min_products: DedupConfig::default().parallel_min_products,
        }
    }
}

impl DuplicateFinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &DedupConfig) -> Result<Self> {
        Ok(Self {
            engine: SimilarityEngine::from(config),
            threshold: validate_threshold(config.threshold)?,
            parallel_min_products: config.parallel_min_products,
        })
    }

    pub fn with_threshold(mut self, threshold: f64) -> Result<Self> {
        self.threshold = validate_threshold(threshold)?;
        Ok(self)
    }

    pub fn with_parallel_min_products(mut self, min: usize) -> Self {
        self.parallel_min_products = min;
        self
    }

    /// Groups the catalog into connected components of above-threshold pairs.
    pub fn find(&self, catalog: &[ProductRecord]) -> Vec<DuplicateGroup> {
        let products = unique_by_id(catalog);
        if products.len() < 2 {
            return Vec::new();
        }

        let mut edges = self.scan_pairs(&products);
        edges.sort_by_key(|edge| (edge.left, edge.right));

        let mut dsu = DisjointSet::new(products.len());
        for edge in &edges {
            dsu.union(edge.left, edge.right);
        }

        let mut components: HashMap<usize, Component> = HashMap::new();
        for edge in edges {
            let root = dsu.find(edge.left);
            components.entry(root).or_default().absorb(edge);
        }
        for idx in 0..products.len() {
            let root = dsu.find(idx);
            if let Some(component) = components.get_mut(&root) {
                component.members.push(idx);
            }
        }

        let mut groups: Vec<DuplicateGroup> = components
            .into_values()
            .filter(|component| component.members.len() > 1)
            .map(|component| component.into_group(&products))
            .collect();

        sort_groups_deterministically(&mut groups);
        groups
    }

    fn scan_pairs(&self, products: &[&ProductRecord]) -> Vec<Edge> {
        let n = products.len();
        let row = |i: usize| -> Vec<Edge> {
            ((i + 1)..n)
                .filter_map(|j| {
                    let result = self.engine.compare(products[i], products[j]);
                    if result.score < self.threshold {
                        return None;
                    }
                    tracing::debug!(
                        left = %products[i].id,
                        right = %products[j].id,
                        score = result.score,
                        "duplicate pair"
                    );
                    Some(Edge {
                        left: i,
                        right: j,
                        score: result.score,
                        reasons: result.reasons,
                    })
                })
                .collect()
        };

        if n >= self.parallel_min_products {
            (0..n).into_par_iter().flat_map_iter(row).collect()
        } else {
            (0..n).flat_map(row).collect()
        }
    }
}

/// Finds duplicate groups with the default engine.
///
/// `threshold` must lie in `(0, 1]`.
pub fn find_duplicates(catalog: &[ProductRecord], threshold: f64) -> Result<Vec<DuplicateGroup>> {
    Ok(DuplicateFinder::new().with_threshold(threshold)?.find(catalog))
}

pub fn validate_threshold(threshold: f64) -> Result<f64> {
    if threshold.is_finite() && threshold > 0.0 && threshold <= 1.0 {
        Ok(threshold)
    } else {
        Err(DedupError::invalid(
            "threshold",
            format!("must be in (0, 1], got {threshold}"),
        ))
    }
}

#[derive(Debug)]
struct Edge {
    left: usize,
    right: usize,
    score: f64,
    reasons: Vec<String>,
}

#[derive(Debug, Default)]
struct Component {
    members: Vec<usize>,
    score_sum: f64,
    edge_count: usize,
    reasons: Vec<String>,
    seen_reasons: HashSet<String>,
}

impl Component {
    fn absorb(&mut self, edge: Edge) {
        self.score_sum += edge.score;
        self.edge_count += 1;
        for reason in edge.reasons {
            if self.seen_reasons.insert(reason.clone()) {
                self.reasons.push(reason);
            }
        }
    }

    fn into_group(self, products: &[&ProductRecord]) -> DuplicateGroup {
        let mut members: Vec<ProductRecord> = self
            .members
            .into_iter()
            .map(|idx| products[idx].clone())
            .collect();
        members.sort_by(|a, b| a.id.cmp(&b.id));

        DuplicateGroup {
            products: members,
            score: self.score_sum / self.edge_count as f64,
            reasons: self.reasons,
        }
    }
}

fn unique_by_id(catalog: &[ProductRecord]) -> Vec<&ProductRecord> {
    let mut seen: HashSet<&ProductId> = HashSet::with_capacity(catalog.len());
    catalog
        .iter()
        .filter(|product| {
            let fresh = seen.insert(&product.id);
            if !fresh {
                tracing::warn!(id = %product.id, "repeated product id in catalog, keeping first");
            }
            fresh
        })
        .collect()
}

fn sort_groups_deterministically(groups: &mut [DuplicateGroup]) {
    groups.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.smallest_id().cmp(b.smallest_id()))
    });
}

#[derive(Debug, Clone)]
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, left: usize, right: usize) {
        let left_root = self.find(left);
        let right_root = self.find(right);

        if left_root == right_root {
            return;
        }

        match self.rank[left_root].cmp(&self.rank[right_root]) {
            std::cmp::Ordering::Less => self.parent[left_root] = right_root,
            std::cmp::Ordering::Greater => self.parent[right_root] = left_root,
            std::cmp::Ordering::Equal => {
                self.parent[right_root] = left_root;
                self.rank[left_root] += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, name: &str, sku: &str) -> ProductRecord {
        let mut p = ProductRecord::new(name, sku);
        p.id = ProductId::from(id);
        p
    }

    fn sample_catalog() -> Vec<ProductRecord> {
        vec![
            product("p01", "iPhone 15 Pro", "APPLE-IP15P-128"),
            product("p02", "iPhone 15 Pro - Space Black", "APPLE-IP15P-SB-128"),
            product("p03", "iPhone 15 Pro Max", "APPLE-IP15PM-256"),
            product("p04", "Air Jordan 1", "NIKE-1"),
            product("p05", "Air Jordan 1 Retro", "NIKE-1R"),
            product("p06", "Galaxy S24 Ultra", "SAMSUNG-2"),
            product("p07", "Galaxy S24", "SAMSUNG-S24"),
            product("p08", "Pixel 8", "GOOGLE-P8"),
            product("p09", "Pixel 8a", "GOOGLE-P8A"),
            product("p10", "Kindle Paperwhite", "AMZ-KPW"),
        ]
    }

    fn membership(groups: &[DuplicateGroup]) -> HashSet<ProductId> {
        groups
            .iter()
            .flat_map(|g| g.products.iter().map(|p| p.id.clone()))
            .collect()
    }

    #[test]
    fn empty_and_single_catalogs_yield_no_groups() {
        assert!(find_duplicates(&[], 0.7).unwrap().is_empty());
        let single = vec![product("p1", "Widget", "W-1")];
        assert!(find_duplicates(&single, 0.7).unwrap().is_empty());
    }

    #[test]
    fn rejects_thresholds_outside_unit_interval() {
        for bad in [0.0, -0.1, 1.01, f64::NAN, f64::INFINITY] {
            let err = find_duplicates(&sample_catalog(), bad).unwrap_err();
            assert!(matches!(err, DedupError::InvalidArgument { field: "threshold", .. }));
        }
        assert!(find_duplicates(&sample_catalog(), 1.0).is_ok());
    }

    #[test]
    fn iphone_variants_are_grouped() {
        let catalog = vec![
            product("a", "iPhone 15 Pro", "APPLE-IP15P-128"),
            product("b", "iPhone 15 Pro - Space Black", "APPLE-IP15P-SB-128"),
        ];
        let groups = find_duplicates(&catalog, 0.7).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].products.len(), 2);
    }

    #[test]
    fn unrelated_products_never_grouped() {
        let catalog = vec![
            product("a", "Air Jordan 1", "NIKE-1"),
            product("b", "Galaxy S24 Ultra", "SAMSUNG-2"),
        ];
        for threshold in [0.3, 0.5, 0.7, 1.0] {
            assert!(find_duplicates(&catalog, threshold).unwrap().is_empty());
        }
    }

    #[test]
    fn chains_merge_into_one_component() {
        // a~b = 0.8, b~c = 0.7, a~c = 0.6
        let catalog = vec![
            product("a", "abcdefghij", ""),
            product("b", "abcdefghxy", ""),
            product("c", "abcdefwxyz", ""),
        ];

        let groups = find_duplicates(&catalog, 0.65).unwrap();
        assert_eq!(groups.len(), 1);
        let ids: Vec<&str> = groups[0].ids().into_iter().map(ProductId::as_str).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!((groups[0].score - 0.75).abs() < 1e-12);
    }

    #[test]
    fn group_reasons_are_deduplicated_union() {
        let catalog = vec![
            product("a", "Widget Pro", "WP-100"),
            product("b", "Widget Pro", "WP-100"),
            product("c", "Widget Pro", "WP-100"),
        ];
        let groups = find_duplicates(&catalog, 0.7).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].score, 1.0);
        assert_eq!(
            groups[0].reasons,
            vec![
                "Very similar names (100% match)".to_string(),
                "Similar SKUs (100% match)".to_string(),
            ]
        );
    }

    #[test]
    fn raising_threshold_never_grows_membership() {
        let catalog = sample_catalog();
        let thresholds = [0.3, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];

        let mut previous: Option<Vec<DuplicateGroup>> = None;
        for threshold in thresholds {
            let groups = find_duplicates(&catalog, threshold).unwrap();
            if let Some(prev) = &previous {
                let before = membership(prev);
                let after = membership(&groups);
                assert!(after.is_subset(&before), "threshold {threshold}");
                // every stricter group is a refinement of a looser one
                for group in &groups {
                    assert!(prev.iter().any(|p| group.ids().iter().all(|id| p.contains(id))));
                }
            }
            previous = Some(groups);
        }
    }

    #[test]
    fn groups_sorted_by_score_then_smallest_id() {
        let catalog = vec![
            product("b1", "Beta Gadget", "BG-1"),
            product("a2", "Alpha Widget", "AW-1"),
            product("b2", "Beta Gadget", "BG-1"),
            product("a1", "Alpha Widget", "AW-1"),
            product("c1", "iPhone 15 Pro", "APPLE-IP15P-128"),
            product("c2", "iPhone 15 Pro - Space Black", "APPLE-IP15P-SB-128"),
        ];
        let groups = find_duplicates(&catalog, 0.7).unwrap();
        let firsts: Vec<&str> = groups.iter().map(|g| g.smallest_id().as_str()).collect();
        assert_eq!(firsts, vec!["a1", "b1", "c1"]);
        assert!(groups[0].score >= groups[2].score);
    }

    #[test]
    fn parallel_scan_matches_sequential() {
        let catalog = sample_catalog();
        let sequential = DuplicateFinder::new()
            .with_parallel_min_products(usize::MAX)
            .find(&catalog);
        let parallel = DuplicateFinder::new()
            .with_parallel_min_products(0)
            .find(&catalog);
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn repeated_ids_are_not_self_matched() {
        let catalog = vec![
            product("same", "Widget", "W-1"),
            product("same", "Widget", "W-1"),
        ];
        assert!(find_duplicates(&catalog, 0.7).unwrap().is_empty());
    }

    #[test]
    fn disjoint_set_tracks_components() {
        let mut dsu = DisjointSet::new(5);
        dsu.union(0, 1);
        dsu.union(3, 4);
        dsu.union(1, 4);
        assert_eq!(dsu.find(0), dsu.find(3));
        assert_ne!(dsu.find(2), dsu.find(0));
    }
}
