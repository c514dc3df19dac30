//! Product similarity, duplicate grouping and merge for the skuscope catalog.

pub mod error;
pub mod similarity;
pub mod grouping;
pub mod scan;
pub mod merge;
pub mod check;

pub use error::{DedupError, Result};
pub use similarity::{SimilarityEngine, SimilarityResult, compare_products, name_similarity};
pub use grouping::{DEFAULT_THRESHOLD, DuplicateFinder, DuplicateGroup, find_duplicates};
pub use scan::{ScanOptions, ScanReport, scan_catalog};
pub use merge::{FieldPolicy, MergeOutcome, MergeRequest, merge_duplicates};
pub use check::{DEFAULT_MIN_SIMILARITY, NameMatch, check_duplicates};
