use std::path::PathBuf;

use anyhow::Result;
use burn::data::dataset::Dataset;
use clap::Parser;
use dotenv::dotenv;
use ivae::{
    data::{synthetic::COND_SAMPLES, DataSource, IvaeDataset},
    utils::{get_env, show_image_terminal, Stats},
};
use tracing_subscriber::EnvFilter;

/// Prints dimensions and statistics of a training dataset.
#[derive(Parser)]
#[command(name = "inspect-data")]
struct Cli {
    #[arg(short, long)]
    file: Option<String>,

    #[arg(short = 'x', long)]
    data_args: Option<String>,

    #[arg(long)]
    mnist: bool,

    #[arg(long)]
    latent_dim: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("info"))
        .init();

    let root = PathBuf::from(get_env("ARTIFACTS_DIR").unwrap_or_else(|_| ".".to_string()));
    let source = DataSource::resolve(
        cli.file.as_deref(),
        cli.data_args.as_deref(),
        cli.mnist,
        &root.join("data"),
        COND_SAMPLES,
    )?;
    let dataset = IvaeDataset::load(&source)?;
    let dims = dataset.dims(cli.latent_dim)?;
    println!("num items: {}", dataset.len());
    println!("{:#?}", dataset.metadata(dims));

    let x_stats = Stats::from_iter(dataset.iter().map(|item| item.x));
    println!("x: {x_stats:#?}");
    let u_stats = Stats::from_iter(dataset.iter().map(|item| item.u));
    println!("u: {u_stats:#?}");
    if dataset.get(0).is_some_and(|item| item.s.is_some()) {
        let s_stats = Stats::from_iter(dataset.iter().filter_map(|item| item.s));
        println!("s: {s_stats:#?}");
    }

    if let (true, Some(item)) = (source.is_image(), dataset.get(0)) {
        let side = (item.x.len() as f64).sqrt() as usize;
        if side * side == item.x.len() {
            show_image_terminal(&item.x, side);
        }
    }

    Ok(())
}
