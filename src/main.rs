use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use jemallocator::Jemalloc;
use tracing::{info, warn};

use olap_cube::config::CubeConfig;
use olap_cube::cube::schema::validate_snapshot;
use olap_cube::{
    CubeQueryService, FilterSet, HierarchyRegistry, SchemaContract, Snapshot, telemetry,
};

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

/// In-memory OLAP queries over the pre-aggregated KPI cube
#[derive(Parser)]
#[command(name = "olap-cube")]
#[command(version)]
#[command(about = "Roll-up, drill-down and slice/dice queries over a KPI cube snapshot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "OLAP_CUBE_CONFIG")]
    config: Option<PathBuf>,

    /// Override snapshot CSV path
    #[arg(short, long, global = true)]
    snapshot: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the registered hierarchy keys
    Hierarchies,

    /// Aggregate the snapshot along a hierarchy and print JSON records
    Query {
        /// Hierarchy key, e.g. Anio or Anio_Producto
        hierarchy: String,

        /// Keep only this year
        #[arg(long)]
        anio: Option<i64>,

        /// Keep only this product
        #[arg(long)]
        producto: Option<String>,

        /// Keep only this project
        #[arg(long)]
        proyecto: Option<String>,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Check row count and declared columns of the snapshot
    Validate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = CubeConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(snapshot) = cli.snapshot {
        config.snapshot.path = snapshot;
    }
    telemetry::init(&config.logging.level);

    match cli.command {
        Commands::Hierarchies => {
            for hierarchy in HierarchyRegistry::new().hierarchies() {
                println!("{}\t{}", hierarchy.key(), hierarchy.columns().join(", "));
            }
        }
        Commands::Query {
            hierarchy,
            anio,
            producto,
            proyecto,
            pretty,
        } => {
            let snapshot = load(&config)?;
            let service = CubeQueryService::with_cache_capacity(
                snapshot,
                SchemaContract::kpi(),
                config.cache.capacity,
            )?;

            let mut filters = FilterSet::new();
            if let Some(anio) = anio {
                filters = filters.anio(anio);
            }
            if let Some(producto) = &producto {
                filters = filters.producto(producto);
            }
            if let Some(proyecto) = &proyecto {
                filters = filters.proyecto(proyecto);
            }

            let result = service.query(&hierarchy, &filters)?;
            let records: Vec<serde_json::Value> = result
                .to_records()
                .into_iter()
                .map(serde_json::Value::Object)
                .collect();
            let output = if pretty {
                serde_json::to_string_pretty(&records)?
            } else {
                serde_json::to_string(&records)?
            };
            println!("{output}");
        }
        Commands::Validate => {
            let snapshot = load(&config)?;
            let report =
                validate_snapshot(&snapshot, &SchemaContract::kpi(), config.validation.min_rows);
            println!("{report}");
            if !report.passed() {
                bail!("snapshot {} failed validation", config.snapshot.path.display());
            }
        }
    }

    Ok(())
}

fn load(config: &CubeConfig) -> Result<Snapshot> {
    let path = &config.snapshot.path;
    let (snapshot, summary) = Snapshot::load_csv(path)
        .with_context(|| format!("loading snapshot {}", path.display()))?;
    if !summary.errors.is_empty() {
        warn!(
            skipped = summary.errors.len(),
            first_row = summary.errors[0].row,
            "skipped malformed snapshot rows"
        );
    }
    info!(path = %path.display(), rows = summary.rows_processed, "snapshot read");
    Ok(snapshot)
}
