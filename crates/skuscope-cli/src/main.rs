use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use skuscope_core::{AppConfig, CatalogError, Database, ExitCode, ProductId, ProductRecord, parse_price};
use skuscope_dedup::{
    DedupError, FieldPolicy, MergeRequest, ScanOptions, SimilarityEngine, check::check_with,
    merge_duplicates, scan_catalog,
};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "skuscope",
    about = "Find and merge duplicate products in a catalog",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format (for scripts and admin tooling).
    /// Also enabled by setting SKUSCOPE_JSON=1.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the whole catalog for duplicate groups.
    Scan {
        /// Minimum pair score, in (0, 1]. Defaults to `dedup.threshold`.
        #[arg(long)]
        threshold: Option<f64>,
        /// Append a SCAN entry to the audit log.
        #[arg(long)]
        record: bool,
        #[arg(long)]
        actor: Option<String>,
    },

    /// Merge duplicates into a primary product.
    Merge {
        #[arg(required_unless_present = "request")]
        primary: Option<String>,
        #[arg(required_unless_present = "request")]
        duplicates: Vec<String>,
        /// Read a MergeRequest JSON document instead of positional ids.
        #[arg(long, conflicts_with_all = ["primary", "duplicates"])]
        request: Option<PathBuf>,
        #[arg(long)]
        keep_name: bool,
        #[arg(long)]
        keep_description: bool,
        #[arg(long)]
        keep_price: bool,
        #[arg(long)]
        keep_brand: bool,
        #[arg(long)]
        keep_category: bool,
        #[arg(long)]
        actor: Option<String>,
    },

    /// Look for existing products with a similar name.
    Check {
        name: String,
        /// Product id to ignore (the one being edited).
        #[arg(long)]
        exclude: Option<String>,
        /// Minimum name similarity. Defaults to `check.min_similarity`.
        #[arg(long)]
        min: Option<f64>,
    },

    /// Operations on single products.
    Product {
        #[command(subcommand)]
        action: ProductAction,
    },

    /// Import a JSON array of product records.
    Import { file: PathBuf },

    /// Show the most recent audit entries.
    Audit {
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

// ─── Product Actions ────────────────────────────────────────────────────────

#[derive(Subcommand)]
enum ProductAction {
    /// Add a product; warns when similar names already exist.
    Add {
        name: String,
        #[arg(long, default_value = "")]
        sku: String,
        #[arg(long)]
        brand: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        price: Option<String>,
    },
    /// Get a product by id.
    Get { id: String },
    /// List products.
    List {
        #[arg(long, default_value = "50")]
        limit: usize,
    },
    /// Delete a product.
    Delete {
        id: String,
        #[arg(long)]
        confirm: bool,
    },
}

// ─── Config Actions ──────────────────────────────────────────────────────────

#[derive(Subcommand)]
enum ConfigAction {
    /// Show all config values.
    List,
    /// Print the config file location.
    Path,
}

// ─── Main ────────────────────────────────────────────────────────────────────

fn main() {
    let start = Instant::now();
    let cli = Cli::parse();
    init_tracing();

    let json_output = cli.json || std::env::var("SKUSCOPE_JSON").as_deref() == Ok("1");

    if let Err(err) = run(cli.command, json_output, start) {
        let code = exit_code_for(&err);
        if json_output {
            let envelope = json!({
                "status": "error",
                "error": { "code": code as i32, "message": format!("{err:#}") },
                "meta": { "duration_ms": start.elapsed().as_millis() }
            });
            if let Err(write_err) = print_json(&envelope) {
                eprintln!("error: {err:#} (json output failed: {write_err})");
            }
        } else {
            eprintln!("error: {err:#}");
        }
        std::process::exit(code as i32);
    }
}

fn run(command: Commands, json_output: bool, start: Instant) -> Result<()> {
    // Load config (honors SKUSCOPE_DATA_PATH if set)
    let mut config = AppConfig::load()?;
    if let Ok(data_path) = std::env::var("SKUSCOPE_DATA_PATH") {
        config.set_data_path(data_path.into());
    }

    match command {
        // ── Scan ───────────────────────────────────────────────────────────

        Commands::Scan { threshold, record, actor } => {
            let db = open_db(&config)?;
            let threshold = threshold.unwrap_or(config.dedup.threshold);
            let options = ScanOptions {
                record_audit: record || config.dedup.record_scans,
                actor: actor.unwrap_or_else(|| config.merge.default_actor.clone()),
            };
            let report = scan_catalog(&db, &config.dedup, threshold, &options)?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&json!({"status":"ok","data":report,"meta":{"duration_ms":dur}}))?;
            } else if report.groups.is_empty() {
                println!("No duplicates among {} products.", report.products_scanned);
            } else {
                println!(
                    "Found {} duplicate group(s) among {} products:",
                    report.groups.len(),
                    report.products_scanned
                );
                for (i, group) in report.groups.iter().enumerate() {
                    println!("\n[{}] score {:.0}%  {}", i + 1, group.score * 100.0, group.reasons.join("; "));
                    for product in &group.products {
                        println!("    {id}  {name:<40}  {sku}", id = product.id, name = product.name, sku = product.sku);
                    }
                }
            }
        }

        // ── Merge ──────────────────────────────────────────────────────────

        Commands::Merge {
            primary,
            duplicates,
            request,
            keep_name,
            keep_description,
            keep_price,
            keep_brand,
            keep_category,
            actor,
        } => {
            let flags = FieldPolicy {
                keep_name,
                keep_description,
                keep_price,
                keep_brand,
                keep_category,
            };
            let request = match request {
                Some(path) => {
                    let mut request = load_merge_request(&path)?;
                    request.field_policy = combine_policy(request.field_policy, flags, &config);
                    request
                }
                None => build_merge_request(primary.unwrap_or_default(), duplicates, flags, &config),
            };
            let actor = actor.unwrap_or_else(|| config.merge.default_actor.clone());

            let db = open_db(&config)?;
            let outcome = merge_duplicates(&db, &request, &actor)?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&json!({"status":"ok","data":outcome,"meta":{"duration_ms":dur}}))?;
            } else {
                println!(
                    "Merged {} duplicate(s) into {} ({}).",
                    outcome.merged_ids.len(),
                    outcome.product.name,
                    outcome.product.id
                );
                if !outcome.filled_fields.is_empty() {
                    println!("  Filled from duplicates: {}", outcome.filled_fields.join(", "));
                }
            }
        }

        // ── Check ──────────────────────────────────────────────────────────

        Commands::Check { name, exclude, min } => {
            let db = open_db(&config)?;
            let catalog = db.list_products()?;
            let engine = SimilarityEngine::from(&config.dedup);
            let exclude = exclude.map(ProductId::from);
            let min = min.unwrap_or(config.check.min_similarity);
            let matches = check_with(&engine, &catalog, &name, exclude.as_ref(), min)?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&json!({"status":"ok","data":{"items":matches,"total":matches.len()},"meta":{"duration_ms":dur}}))?;
            } else if matches.is_empty() {
                println!("No similar products for: {name}");
            } else {
                for m in &matches {
                    println!("  {:>3}%  {}  {}", (m.similarity * 100.0).round(), m.product.id, m.product.name);
                }
            }
        }

        // ── Product ────────────────────────────────────────────────────────

        Commands::Product { action } => match action {
            ProductAction::Add { name, sku, brand, category, description, price } => {
                let mut product = ProductRecord::new(name, sku);
                product.brand_name = brand;
                product.category_name = category;
                product.description = description;
                product.price = price.as_deref().map(parse_price).transpose()?;

                let db = open_db(&config)?;
                let catalog = db.list_products()?;
                let engine = SimilarityEngine::from(&config.dedup);
                let similar =
                    check_with(&engine, &catalog, &product.name, None, config.check.min_similarity)?;
                if !similar.is_empty() {
                    tracing::warn!(name = %product.name, matches = similar.len(), "possible duplicate product");
                }

                db.upsert_product(&product)?;
                let dur = start.elapsed().as_millis();

                if json_output {
                    print_json(&json!({
                        "status":"ok",
                        "data":{"product":product,"possibleDuplicates":similar},
                        "meta":{"duration_ms":dur}
                    }))?;
                } else {
                    println!("Added: {} ({})", product.name, product.id);
                    for m in &similar {
                        println!("  ! similar to {} ({}, {:.0}%)", m.product.name, m.product.id, m.similarity * 100.0);
                    }
                }
            }

            ProductAction::Get { id } => {
                let db = open_db(&config)?;
                let product = db.get_product(&ProductId::from(id))?;
                let dur = start.elapsed().as_millis();
                if json_output {
                    print_json(&json!({"status":"ok","data":product,"meta":{"duration_ms":dur}}))?;
                } else {
                    println!("{}", serde_json::to_string_pretty(&product)?);
                }
            }

            ProductAction::List { limit } => {
                let db = open_db(&config)?;
                let products = db.list_products()?;
                let total = products.len();
                let items: Vec<&ProductRecord> = products.iter().take(limit).collect();
                let dur = start.elapsed().as_millis();

                if json_output {
                    print_json(&json!({
                        "status":"ok",
                        "data":{"items":items,"total":total,"limit":limit},
                        "meta":{"duration_ms":dur}
                    }))?;
                } else if items.is_empty() {
                    println!("No products. Use `skuscope product add` or `skuscope import`.");
                } else {
                    for product in &items {
                        println!(
                            "{id}  {name:<40}  {sku:<20}  {brand}",
                            id = product.id,
                            name = product.name,
                            sku = product.sku,
                            brand = product.brand_name.as_deref().unwrap_or(""),
                        );
                    }
                }
            }

            ProductAction::Delete { id, confirm } => {
                if !confirm {
                    eprintln!("Add --confirm to delete without prompt.");
                    std::process::exit(ExitCode::ConfirmRequired as i32);
                }
                let db = open_db(&config)?;
                db.delete_product(&ProductId::from(id.as_str()))?;
                let dur = start.elapsed().as_millis();
                if json_output {
                    print_json(&json!({"status":"ok","data":{"deleted":id},"meta":{"duration_ms":dur}}))?;
                } else {
                    println!("Deleted product: {id}");
                }
            }
        },

        // ── Import ─────────────────────────────────────────────────────────

        Commands::Import { file } => {
            let products = load_products(&file)?;
            let db = open_db(&config)?;
            let count = db.upsert_products(&products)?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&json!({
                    "status":"ok","data":{"imported":count,"total":db.count_products()?},
                    "meta":{"duration_ms":dur}
                }))?;
            } else {
                println!("Imported {count} product(s).");
            }
        }

        // ── Audit ──────────────────────────────────────────────────────────

        Commands::Audit { limit } => {
            let db = open_db(&config)?;
            let entries = db.list_audit(limit)?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&json!({"status":"ok","data":entries,"meta":{"duration_ms":dur}}))?;
            } else if entries.is_empty() {
                println!("Audit log is empty.");
            } else {
                for entry in &entries {
                    println!(
                        "{when}  {action:<5}  {actor:<12}  {entity}  {details}",
                        when = entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                        action = entry.action,
                        actor = entry.actor,
                        entity = entry.entity_id,
                        details = entry.details,
                    );
                }
            }
        }

        // ── Config ─────────────────────────────────────────────────────────

        Commands::Config { action } => {
            let dur = start.elapsed().as_millis();
            match action {
                ConfigAction::List => {
                    let kv = config_key_values(&config);
                    if json_output {
                        print_json(&json!({"status":"ok","data":kv,"meta":{"duration_ms":dur}}))?;
                    } else {
                        for (k, v) in &kv {
                            println!("{k} = {v}");
                        }
                    }
                }
                ConfigAction::Path => {
                    let path = AppConfig::config_path();
                    if json_output {
                        print_json(&json!({"status":"ok","data":{"path":path,"exists":path.exists()},"meta":{"duration_ms":dur}}))?;
                    } else {
                        println!("{}", path.display());
                    }
                }
            }
        }
    }

    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    if let Some(e) = err.downcast_ref::<DedupError>() {
        return e.exit_code();
    }
    if let Some(e) = err.downcast_ref::<CatalogError>() {
        return e.exit_code();
    }
    ExitCode::GeneralError
}

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

fn open_db(config: &AppConfig) -> Result<Database> {
    let db_path = config.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Database::open(&db_path)?)
}

fn build_merge_request(
    primary: String,
    duplicates: Vec<String>,
    flags: FieldPolicy,
    config: &AppConfig,
) -> MergeRequest {
    let policy = combine_policy(FieldPolicy::default(), flags, config);
    MergeRequest::new(primary, duplicates.into_iter().map(ProductId::from).collect())
        .with_policy(policy)
}

/// A field is kept when the request, a `--keep-*` flag or `[merge]` config says so.
fn combine_policy(base: FieldPolicy, flags: FieldPolicy, config: &AppConfig) -> FieldPolicy {
    let defaults = FieldPolicy::from(&config.merge);
    FieldPolicy {
        keep_name: base.keep_name || flags.keep_name || defaults.keep_name,
        keep_description: base.keep_description || flags.keep_description || defaults.keep_description,
        keep_price: base.keep_price || flags.keep_price || defaults.keep_price,
        keep_brand: base.keep_brand || flags.keep_brand || defaults.keep_brand,
        keep_category: base.keep_category || flags.keep_category || defaults.keep_category,
    }
}

fn load_merge_request(path: &Path) -> Result<MergeRequest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading merge request {}", path.display()))?;
    let request = serde_json::from_str(&raw)
        .with_context(|| format!("parsing merge request {}", path.display()))?;
    Ok(request)
}

fn load_products(path: &Path) -> Result<Vec<ProductRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let products = serde_json::from_str(&raw)
        .with_context(|| format!("parsing product array in {}", path.display()))?;
    Ok(products)
}

fn config_key_values(config: &AppConfig) -> std::collections::BTreeMap<&'static str, String> {
    let mut map = std::collections::BTreeMap::new();
    map.insert("data_path", config.data_path().to_string_lossy().to_string());
    map.insert("database_path", config.database_path().to_string_lossy().to_string());
    map.insert("dedup.threshold", config.dedup.threshold.to_string());
    map.insert("dedup.containment_score", config.dedup.containment_score.to_string());
    map.insert("dedup.parallel_min_products", config.dedup.parallel_min_products.to_string());
    map.insert("dedup.record_scans", config.dedup.record_scans.to_string());
    map.insert("merge.default_actor", config.merge.default_actor.clone());
    map.insert("check.min_similarity", config.check.min_similarity.to_string());
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn merge_flags_extend_configured_policy() {
        let mut config = AppConfig::default();
        config.merge.keep_price = true;
        let flags = FieldPolicy {
            keep_name: true,
            ..FieldPolicy::default()
        };

        let request = build_merge_request("p1".into(), vec!["p2".into(), "p3".into()], flags, &config);
        assert_eq!(request.primary_id, ProductId::from("p1"));
        assert_eq!(request.duplicate_ids.len(), 2);
        assert!(request.field_policy.keep_name);
        assert!(request.field_policy.keep_price);
        assert!(!request.field_policy.keep_brand);
    }

    #[test]
    fn merge_request_file_is_parsed() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("merge.json");
        std::fs::write(
            &path,
            r#"{"primaryProductId":"p1","duplicateProductIds":["p2"],"mergeOptions":{"keepBrand":true}}"#,
        )
        .unwrap();

        let request = load_merge_request(&path).unwrap();
        assert_eq!(request.duplicate_ids, vec![ProductId::from("p2")]);
        assert!(request.field_policy.keep_brand);
        assert!(!request.field_policy.keep_name);
    }

    #[test]
    fn request_file_policy_honors_flags_and_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("merge.json");
        std::fs::write(
            &path,
            r#"{"primaryProductId":"p1","duplicateProductIds":["p2"],"mergeOptions":{"keepBrand":true}}"#,
        )
        .unwrap();

        let mut config = AppConfig::default();
        config.merge.keep_category = true;
        let flags = FieldPolicy {
            keep_price: true,
            ..FieldPolicy::default()
        };

        let request = load_merge_request(&path).unwrap();
        let policy = combine_policy(request.field_policy, flags, &config);
        assert!(policy.keep_brand);
        assert!(policy.keep_price);
        assert!(policy.keep_category);
        assert!(!policy.keep_name);
        assert!(!policy.keep_description);
    }

    #[test]
    fn product_file_is_parsed() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("products.json");
        std::fs::write(
            &path,
            r#"[{"id":"p1","name":"iPhone 15 Pro","sku":"APPLE-IP15P-128"},{"name":"Air Jordan 1"}]"#,
        )
        .unwrap();

        let products = load_products(&path).unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].id, ProductId::from("p1"));
        assert!(products[1].sku.is_empty());
    }

    #[test]
    fn domain_errors_map_to_exit_codes() {
        let not_found = anyhow::Error::new(DedupError::NotFound {
            role: "primary",
            id: ProductId::from("p1"),
        });
        assert_eq!(exit_code_for(&not_found), ExitCode::NotFound);

        let missing = anyhow::Error::new(CatalogError::ProductNotFound("p1".into()));
        assert_eq!(exit_code_for(&missing), ExitCode::NotFound);

        assert_eq!(exit_code_for(&anyhow::anyhow!("boom")), ExitCode::GeneralError);
    }

    #[test]
    fn merge_without_ids_or_request_is_rejected() {
        assert!(Cli::try_parse_from(["skuscope", "merge"]).is_err());
        assert!(Cli::try_parse_from(["skuscope", "merge", "p1", "p2"]).is_ok());
        assert!(Cli::try_parse_from(["skuscope", "merge", "--request", "m.json"]).is_ok());
        assert!(Cli::try_parse_from(["skuscope", "merge", "p1", "p2", "--request", "m.json"]).is_err());
    }
}
