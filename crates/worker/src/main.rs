//! `geoimport`: batch importer for geospatial vector products.
//!
//! Connects to PostGIS, applies migrations, makes sure the consolidated
//! table exists, then runs one subcommand.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use geoimport_core::import_status::{BatchReport, FileOutcome, FileStatus};
use geoimport_db::repositories::ImportEventRepo;
use geoimport_pipeline::metadata::{locate_metadata, MetadataLocator};
use geoimport_pipeline::orchestrator::product_ids_in_tree;
use geoimport_pipeline::seed::seed_mappings;
use geoimport_pipeline::{FeatureStore, ImportConfig, Importer, PgFeatureStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "geoimport")]
#[command(author, version, about = "Import zipped shapefiles and geopackages into PostGIS")]
struct Cli {
    /// Print reports as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import every .zip/.gpkg under IMPORT_ROOT (or --root), then reclassify.
    Run {
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Import a single file, then reclassify.
    Import {
        file: PathBuf,
        /// Metadata XML to use instead of searching for one.
        #[arg(long)]
        metadata: Option<PathBuf>,
    },

    /// Upsert representation mappings from a CSV (esquema,classe,grupo_representacao).
    SeedMappings { csv: PathBuf },

    /// Recompute representation groups for the whole table.
    Reclassify,

    /// Delete a product, or one class of it.
    Remove {
        product_id: String,
        #[arg(long = "class")]
        class_name: Option<String>,
    },

    /// List stored products with feature counts.
    Products,

    /// Show the import history, optionally for one product.
    History {
        product_id: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },

    /// List product identifiers found under a directory without importing.
    Scan {
        #[arg(long, env = "IMPORT_ROOT", default_value = "./data")]
        root: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    if let Commands::Scan { root } = &cli.command {
        for product_id in product_ids_in_tree(root) {
            println!("{product_id}");
        }
        return Ok(());
    }

    let config = ImportConfig::from_env().context("invalid configuration")?;
    let table = config.table()?;

    let pool = geoimport_db::create_pool(&config.database_url, config.db_max_connections)
        .await
        .context("cannot connect to database")?;
    geoimport_db::health_check(&pool).await?;
    geoimport_db::run_migrations(&pool).await?;
    tracing::info!("Database ready");

    let store = PgFeatureStore::new(pool.clone(), table);
    store.ensure_table().await?;
    let importer = Importer::new(&store, &config);

    match cli.command {
        Commands::Run { root } => {
            let report = match root {
                Some(root) => {
                    let config = ImportConfig {
                        import_root: root,
                        ..config.clone()
                    };
                    Importer::new(&store, &config).run_directory().await
                }
                None => importer.run_directory().await,
            };
            print_report(&report, cli.json)?;
        }
        Commands::Import { file, metadata } => {
            let locator = match metadata {
                Some(xml) => Some(MetadataLocator::File(xml)),
                None => locate_metadata(&file),
            };
            let mappings = importer.load_mappings().await;
            let outcome = importer.import_file(&file, locator.as_ref(), &mappings).await;
            let mut report = BatchReport::default();
            report.push(outcome);
            report.reclassified = Some(importer.reclassify().await?);
            print_report(&report, cli.json)?;
        }
        Commands::SeedMappings { csv } => {
            let seed = seed_mappings(&pool, &csv).await?;
            println!(
                "{} mapeamentos gravados, {} linhas ignoradas",
                seed.mappings.len(),
                seed.skipped
            );
        }
        Commands::Reclassify => {
            let changed = importer.reclassify().await?;
            println!("{changed} feições reclassificadas");
        }
        Commands::Remove {
            product_id,
            class_name,
        } => {
            let removed = importer
                .remove_product(&product_id, class_name.as_deref())
                .await?;
            println!("{removed} feições removidas de {product_id}");
        }
        Commands::Products => {
            let products = importer.list_products().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&products)?);
            } else {
                for p in products {
                    println!(
                        "{}\t{}\t{}\t{}\t{}",
                        p.product_id,
                        p.schema_label,
                        p.scale,
                        p.product_date.map(|d| d.to_string()).unwrap_or_default(),
                        p.feature_count
                    );
                }
            }
        }
        Commands::History { product_id, limit } => {
            let events = match product_id {
                Some(id) => ImportEventRepo::list_for_product(&pool, &id).await?,
                None => ImportEventRepo::list_recent(&pool, limit).await?,
            };
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else {
                for e in events {
                    println!(
                        "{}\t{}\t{}\t{}\t{}\t{}",
                        e.occurred_at.to_rfc3339(),
                        e.action,
                        e.product_id,
                        e.class_filter.unwrap_or_default(),
                        e.actor,
                        e.details
                    );
                }
            }
        }
        Commands::Scan { .. } => unreachable!("handled before connecting"),
    }

    Ok(())
}

/// `LOG_FORMAT=json` switches to JSON lines; filter comes from `RUST_LOG`.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "geoimport_worker=info,geoimport_pipeline=info,geoimport_db=info".into()
    });
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_report(report: &BatchReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    for FileOutcome {
        file_name, result, ..
    } in &report.files
    {
        println!("{}\t{}\t{}", result.status(), file_name, result.detail());
    }
    println!(
        "{} arquivos: {} sucesso, {} aviso, {} erro; {} feições gravadas",
        report.files.len(),
        report.count_by_status(FileStatus::Sucesso),
        report.count_by_status(FileStatus::Aviso),
        report.count_by_status(FileStatus::Erro),
        report.total_written()
    );
    if let Some(changed) = report.reclassified {
        println!("{changed} feições reclassificadas");
    }
    Ok(())
}
