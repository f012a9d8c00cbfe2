use burn::backend::libtorch::LibTorchDevice;
use burn::backend::{Autodiff, LibTorch};
use clap::Parser;
use dotenv::dotenv;
use ivae::{training, utils::get_env};
use tracing_subscriber::EnvFilter;

/// Trains an identifiable VAE on synthetic nonstationary ICA data or MNIST.
#[derive(Parser)]
#[command(name = "train")]
struct Cli {
    /// Path to an `.npz` dataset
    #[arg(short, long)]
    file: Option<String>,

    /// Arguments of a generated dataset: `nps_ns_dl_dd_nl_s_p_a_u_n`
    #[arg(short = 'x', long)]
    data_args: Option<String>,

    /// Train on MNIST
    #[arg(long)]
    mnist: bool,

    #[arg(short, long, default_value_t = 16)]
    batch_size: usize,

    #[arg(short, long, default_value_t = 20)]
    epochs: usize,

    /// Number of iterations, defaults to `epochs` passes over the data
    #[arg(short, long)]
    max_iter: Option<usize>,

    #[arg(short = 'g', long, default_value_t = 50)]
    hidden_dim: usize,

    #[arg(short, long, default_value_t = 3)]
    depth: usize,

    #[arg(short, long, default_value_t = 1e-4)]
    lr: f64,

    #[arg(short, long, default_value_t = 1)]
    seed: u64,

    /// Train on the first CUDA device
    #[arg(short, long)]
    cuda: bool,

    /// Move the whole dataset to the device up front
    #[arg(short, long)]
    preload_gpu: bool,

    /// Anneal the ELBO terms during the first part of training
    #[arg(short, long)]
    anneal: bool,

    /// Skip checkpoints and log files
    #[arg(short, long)]
    no_log: bool,

    #[arg(short = 'q', long, default_value_t = 25)]
    log_freq: usize,

    /// Latent dimension, defaults to the source dimension (128 for images)
    #[arg(long)]
    latent_dim: Option<usize>,

    #[arg(long, default_value_t = 1)]
    num_workers: usize,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenv().ok();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let device = if cli.cuda {
        LibTorchDevice::Cuda(0)
    } else {
        LibTorchDevice::Cpu
    };
    log::info!("setup device {device:?}");

    let config = training::TrainingConfig::new(training::default_optimizer())
        .with_file(cli.file)
        .with_data_args(cli.data_args)
        .with_mnist(cli.mnist)
        .with_batch_size(cli.batch_size)
        .with_num_epochs(cli.epochs)
        .with_max_iter(cli.max_iter)
        .with_hidden_dim(cli.hidden_dim)
        .with_depth(cli.depth)
        .with_learning_rate(cli.lr)
        .with_seed(cli.seed)
        .with_preload(cli.preload_gpu)
        .with_anneal(cli.anneal)
        .with_no_log(cli.no_log)
        .with_log_freq(cli.log_freq)
        .with_latent_dim(cli.latent_dim)
        .with_num_workers(cli.num_workers)
        .with_artifacts_dir(get_env("ARTIFACTS_DIR").ok());

    let summary = training::train::<Autodiff<LibTorch<f32>>>(config, device)?;
    log::info!("done! {summary:?}");
    Ok(())
}
