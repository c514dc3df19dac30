use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};

/// Root application configuration, loaded from `~/.config/skuscope/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub core: CoreConfig,
    pub dedup: DedupConfig,
    pub merge: MergeConfig,
    pub check: CheckConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub data_path: String,
}

/// Duplicate scan tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub threshold: f64,
    pub weights: WeightsConfig,
    /// Similarity floor for text fields when one normalized value contains the other.
    pub containment_score: f64,
    /// Catalogs smaller than this are scanned on the calling thread.
    pub parallel_min_products: usize,
    /// Append a SCAN entry to the audit log after every scan.
    pub record_scans: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightsConfig {
    pub name: f64,
    pub sku: f64,
    pub brand: f64,
    pub category: f64,
    pub description: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub default_actor: String,
    pub keep_name: bool,
    pub keep_description: bool,
    pub keep_price: bool,
    pub keep_brand: bool,
    pub keep_category: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    pub min_similarity: f64,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for CoreConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("skuscope");

        Self {
            data_path: data_dir.to_string_lossy().to_string(),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            weights: WeightsConfig::default(),
            containment_score: 0.9,
            parallel_min_products: 512,
            record_scans: false,
        }
    }
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            name: 0.40,
            sku: 0.30,
            brand: 0.15,
            category: 0.10,
            description: 0.05,
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            default_actor: "system".to_string(),
            keep_name: false,
            keep_description: false,
            keep_price: false,
            keep_brand: false,
            keep_category: false,
        }
    }
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self { min_similarity: 0.7 }
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/skuscope/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("SKUSCOPE_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("skuscope")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        Self::load_from(&path)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let in_unit = |v: f64| v.is_finite() && v > 0.0 && v <= 1.0;

        if !in_unit(self.dedup.threshold) {
            return Err(CatalogError::Config(format!(
                "dedup.threshold must be in (0, 1], got {}",
                self.dedup.threshold
            )));
        }
        if !in_unit(self.check.min_similarity) {
            return Err(CatalogError::Config(format!(
                "check.min_similarity must be in (0, 1], got {}",
                self.check.min_similarity
            )));
        }
        if !(0.0..=1.0).contains(&self.dedup.containment_score) {
            return Err(CatalogError::Config(format!(
                "dedup.containment_score must be in [0, 1], got {}",
                self.dedup.containment_score
            )));
        }

        let w = &self.dedup.weights;
        let weights = [
            ("name", w.name),
            ("sku", w.sku),
            ("brand", w.brand),
            ("category", w.category),
            ("description", w.description),
        ];
        if let Some((field, value)) = weights
            .iter()
            .find(|(_, value)| !value.is_finite() || *value < 0.0)
        {
            return Err(CatalogError::Config(format!(
                "dedup.weights.{field} must be a non-negative number, got {value}"
            )));
        }
        if weights.iter().all(|(_, value)| *value == 0.0) {
            return Err(CatalogError::Config(
                "dedup.weights must not all be zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn set_data_path(&mut self, path: PathBuf) {
        self.core.data_path = path.to_string_lossy().to_string();
    }

    // ─── Derived paths ─────────────────────────────────────

    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.core.data_path)
    }

    /// Path to the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_path().join("catalog.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.dedup.threshold, 0.7);
        assert_eq!(cfg.dedup.weights.name, 0.40);
        assert_eq!(cfg.check.min_similarity, 0.7);
        assert!(!cfg.core.data_path.is_empty());
        cfg.validate().unwrap();
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut cfg = AppConfig::default();
        cfg.dedup.threshold = 0.85;
        cfg.merge.keep_name = true;
        cfg.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.dedup.threshold, 0.85);
        assert!(loaded.merge.keep_name);
        assert_eq!(loaded.dedup.weights, cfg.dedup.weights);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[dedup]\nthreshold = 0.8\n").unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.dedup.threshold, 0.8);
        assert_eq!(loaded.dedup.weights.sku, 0.30);
        assert_eq!(loaded.merge.default_actor, "system");
    }

    #[test]
    fn test_load_rejects_out_of_range_threshold() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[dedup]\nthreshold = 1.5\n").unwrap();

        assert!(matches!(
            AppConfig::load_from(&path),
            Err(CatalogError::Config(_))
        ));
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let cfg = AppConfig::load_from(Path::new("/tmp/nonexistent_skuscope_config.toml")).unwrap();
        assert_eq!(cfg.dedup.threshold, 0.7);
    }

    #[test]
    fn test_derived_paths() {
        let mut cfg = AppConfig::default();
        cfg.set_data_path(PathBuf::from("/srv/catalog"));
        assert_eq!(cfg.database_path(), PathBuf::from("/srv/catalog/catalog.db"));
    }
}
