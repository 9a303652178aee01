use anyhow::Result;
use clap::Parser;
use rand::Rng;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Writes a synthetic pre-aggregated KPI cube CSV
#[derive(Parser)]
#[command(name = "data_generator")]
struct Args {
    /// Cube rows to write
    #[arg(long, default_value_t = 10_000)]
    rows: usize,

    /// Output file
    #[arg(long, default_value = "data/cube.csv")]
    out: PathBuf,
}

const PRODUCTS: [&str; 4] = ["ERP", "CRM", "BI", "Mobile"];

fn main() -> Result<()> {
    let args = Args::parse();
    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(&args.out)?);

    writeln!(
        writer,
        "anio,producto,proyecto,cpi_index_promedio,spi_index_promedio,schedule_variance_sum,densidad_defectos_promedio"
    )?;

    let mut rng = rand::rng();
    for _ in 0..args.rows {
        let anio = rng.random_range(2018..=2025);
        let producto = PRODUCTS[rng.random_range(0..PRODUCTS.len())];
        let proyecto = rng.random_range(1..=200);
        let cpi: f64 = rng.random_range(0.6..1.4);
        let spi: f64 = rng.random_range(0.6..1.4);
        let variance: f64 = rng.random_range(-30.0..30.0);
        let defects: f64 = rng.random_range(0.0..5.0);
        writeln!(
            writer,
            "{anio},{producto},P{proyecto:03},{cpi:.4},{spi:.4},{variance:.2},{defects:.3}"
        )?;
    }
    writer.flush()?;

    println!("Sample cube CSV generated: {}", args.out.display());
    Ok(())
}
