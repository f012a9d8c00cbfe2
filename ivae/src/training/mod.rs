use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::Context;
use burn::{
    config::Config,
    data::dataset::Dataset,
    module::AutodiffModule,
    nn::loss::{MseLoss, Reduction},
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, backend::Backend, ElementConversion, Tensor},
};
use ndarray::Array2;
use serde_json::Value;
use tensorboard_rs::summary_writer::SummaryWriter;

use crate::{
    data::{
        loader::{PreloadedLoader, StreamingLoader, TrainLoader},
        synthetic::COND_SAMPLES,
        DataSource, IvaeDataset,
    },
    metrics::{mean_corr_coef, CorrelationMethod},
    model::{anneal::Annealer, IVae, IVaeConfig},
    utils::{grid::save_image_grid, logger::Logger},
};

use self::{checkpoint::checkpoint, scheduler::ReduceLrOnPlateauConfig};

pub mod checkpoint;
pub mod scheduler;

#[derive(Config)]
pub struct TrainingConfig {
    pub optimizer: AdamConfig,
    /// `.npz` dataset to train on; takes precedence over `data_args`.
    pub file: Option<String>,
    /// Synthetic dataset arguments `nps_ns_dl_dd_nl_s_p_a_u_n`.
    pub data_args: Option<String>,
    pub max_iter: Option<usize>,
    pub latent_dim: Option<usize>,
    /// Root of `log/`, `runs/`, `ckpt/`, `out/` and `data/`.
    pub artifacts_dir: Option<String>,
    #[config(default = false)]
    pub mnist: bool,
    #[config(default = 16)]
    pub batch_size: usize,
    #[config(default = 20)]
    pub num_epochs: usize,
    #[config(default = 50)]
    pub hidden_dim: usize,
    #[config(default = 3)]
    pub depth: usize,
    #[config(default = 1.0e-4)]
    pub learning_rate: f64,
    #[config(default = 1)]
    pub seed: u64,
    #[config(default = false)]
    pub preload: bool,
    #[config(default = false)]
    pub anneal: bool,
    #[config(default = false)]
    pub no_log: bool,
    #[config(default = 25)]
    pub log_freq: usize,
    #[config(default = 1)]
    pub num_workers: usize,
}

/// Adam with the epsilon PyTorch uses by default.
pub fn default_optimizer() -> AdamConfig {
    AdamConfig::new().with_epsilon(1e-8)
}

/// One-based epoch number reached after `it` iterations.
fn epoch_number(it: usize, num_batches: usize) -> usize {
    it / num_batches.max(1) + 1
}

/// Run arguments stored with the logs, without the logging switches.
fn run_metadata(config: &TrainingConfig) -> anyhow::Result<Value> {
    let mut value = serde_json::to_value(config).context("serializing training config")?;
    if let Value::Object(map) = &mut value {
        for key in ["no_log", "data_args", "optimizer"] {
            map.remove(key);
        }
    }
    Ok(value)
}

#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub exp_id: usize,
    pub iterations: usize,
    pub epochs: usize,
    pub final_loss: Option<f64>,
    pub final_perf: Option<f64>,
    pub final_lr: f64,
    pub log_file: Option<PathBuf>,
}

struct Folders {
    log: PathBuf,
    runs: PathBuf,
    ckpt: PathBuf,
    out: PathBuf,
    data: PathBuf,
}

impl Folders {
    fn new(root: &Path) -> Self {
        Self {
            log: root.join("log"),
            runs: root.join("runs"),
            ckpt: root.join("ckpt"),
            out: root.join("out"),
            data: root.join("data"),
        }
    }
}

fn to_array<B: Backend>(tensor: Tensor<B, 2>) -> anyhow::Result<Array2<f64>> {
    let [rows, cols] = tensor.dims();
    let values = tensor
        .into_data()
        .convert::<f32>()
        .value
        .into_iter()
        .map(f64::from)
        .collect();
    Array2::from_shape_vec((rows, cols), values).context("tensor to array")
}

fn to_rows<B: Backend>(tensor: Tensor<B, 2>) -> Vec<Vec<f32>> {
    let [_, cols] = tensor.dims();
    tensor
        .into_data()
        .convert::<f32>()
        .value
        .chunks(cols.max(1))
        .map(<[f32]>::to_vec)
        .collect()
}

fn image_side(data_dim: usize) -> Option<usize> {
    let side = (data_dim as f64).sqrt().round() as usize;
    (side * side == data_dim).then_some(side)
}

pub fn train<B: AutodiffBackend>(
    config: TrainingConfig,
    device: B::Device,
) -> anyhow::Result<TrainingSummary> {
    log::info!("- train -");
    let setup_start = Instant::now();
    anyhow::ensure!(config.batch_size > 0, "batch size must be positive");
    anyhow::ensure!(config.log_freq > 0, "log frequency must be positive");
    B::seed(config.seed);

    let root = PathBuf::from(config.artifacts_dir.as_deref().unwrap_or("."));
    let folders = Folders::new(&root);

    log::info!("loading dataset");
    let source = DataSource::resolve(
        config.file.as_deref(),
        config.data_args.as_deref(),
        config.mnist,
        &folders.data,
        COND_SAMPLES,
    )
    .context("resolving dataset")?;
    let is_image = source.is_image();
    let dataset = IvaeDataset::load(&source).context("loading dataset")?;
    let dims = dataset.dims(config.latent_dim).context("dataset dimensions")?;
    let metadata = dataset.metadata(dims);
    let dataset_size = dataset.len();
    anyhow::ensure!(dataset_size > 0, "dataset {source:?} is empty");
    log::info!(
        "{dataset_size} items, data dim {}, latent dim {}, aux dim {}",
        dims.data_dim,
        dims.latent_dim,
        dims.aux_dim
    );

    log::info!("creating loader");
    let mut loader: Box<dyn TrainLoader<B>> = if config.preload {
        Box::new(PreloadedLoader::new(
            &dataset,
            config.batch_size,
            config.seed,
            &device,
        ))
    } else {
        Box::new(StreamingLoader::new(
            dataset,
            config.batch_size,
            config.num_workers,
            config.seed,
            device.clone(),
        ))
    };
    let max_iter = config
        .max_iter
        .unwrap_or(loader.num_batches() * config.num_epochs);
    let ckpt_period = (max_iter / 5).max(1);

    log::info!("creating model");
    let mut model = IVaeConfig::new(dims.latent_dim, dims.data_dim, dims.aux_dim)
        .with_hidden_dim(config.hidden_dim)
        .with_n_layers(config.depth)
        .init::<B>(&device);
    let mut optimizer = config.optimizer.init::<B, IVae<B>>();
    let mut scheduler = ReduceLrOnPlateauConfig::new().init(config.learning_rate);
    let mut annealer = Annealer::new(config.anneal, model.decoder_var());
    let mse = MseLoss::new();

    log::info!("setup time: {:.2?}", setup_start.elapsed());

    let mut logger = Logger::new(&folders.log)?;
    let exp_id = logger.exp_id();
    let run_name = format!(
        "exp{exp_id}_{}_{max_iter}_{}_{}_{}_{}",
        config.batch_size, config.learning_rate, config.hidden_dim, config.depth, config.anneal
    );
    let run_dir = folders.runs.join(&run_name);
    std::fs::create_dir_all(&run_dir).with_context(|| format!("creating {}", run_dir.display()))?;
    let mut writer = SummaryWriter::new(&run_dir);
    logger.add("elbo");
    logger.add("perf");
    log::info!("beginning training for exp: {exp_id}");

    let train_start = Instant::now();
    let mut it = 0;
    let mut epoch = 0;
    let mut c = 0;
    while it < max_iter {
        let epoch_start = Instant::now();
        epoch += 1;
        let mut last = None;

        for batch in loader.epoch() {
            if it == max_iter {
                break;
            }
            it += 1;
            annealer.step(dataset_size, max_iter, it);

            let out = model.elbo(batch.x.clone(), batch.u.clone(), annealer.weights());
            let loss = out.elbo.neg();
            let loss_value = loss.clone().into_scalar().elem::<f64>();

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(scheduler.lr(), model, grads);
            logger.update("elbo", loss_value);

            let perf = match (&batch.s, is_image) {
                (Some(s), false) => mean_corr_coef(
                    to_array(s.clone())?.view(),
                    to_array(out.z.clone())?.view(),
                    CorrelationMethod::Pearson,
                ),
                _ => mse
                    .forward(out.x_recon.clone(), batch.x.clone(), Reduction::Mean)
                    .into_scalar()
                    .elem::<f64>(),
            };
            logger.update("perf", perf);

            if it % config.log_freq == 0 {
                logger.log();
                if let (Some(elbo), Some(perf)) = (logger.get_last("elbo"), logger.get_last("perf")) {
                    writer.add_scalar("data/performance", perf as f32, it);
                    writer.add_scalar("data/elbo", elbo as f32, it);
                    scheduler.step(elbo);
                }
            }

            if it % ckpt_period == 0 && !config.no_log {
                checkpoint::<B, _, _>(
                    &folders.ckpt,
                    exp_id,
                    it,
                    &model,
                    &optimizer,
                    logger.get_last("elbo").unwrap_or(f64::NAN),
                    logger.get_last("perf").unwrap_or(f64::NAN),
                )?;
            }

            last = Some((batch.u, out.x_recon));
        }

        if let (true, Some((u, x_recon))) = (is_image, last) {
            match image_side(dims.data_dim) {
                Some(side) => {
                    let dir = folders.out.join(format!("exp{exp_id}"));
                    let (samples, _) = model.valid().sample(u.inner());
                    save_image_grid(&to_rows(samples), side, dir.join(format!("{c:03}_samples.png")))?;
                    c += 1;
                    save_image_grid(&to_rows(x_recon), side, dir.join(format!("{c:03}_recons.png")))?;
                    c += 1;
                }
                None => log::warn!("data dim {} is not a square image", dims.data_dim),
            }
        }

        log::info!(
            "epoch {} done in: {:.2?};\tloss: {:?};\tperf: {:?}",
            epoch_number(it, loader.num_batches()),
            epoch_start.elapsed(),
            logger.get_last("elbo"),
            logger.get_last("perf")
        );
    }
    log::info!("training time: {:.2?}", train_start.elapsed());
    writer.flush();

    let log_file = if config.no_log {
        None
    } else {
        logger.add_metadata(run_metadata(&config)?)?;
        logger.add_metadata(&metadata)?;
        let path = logger.save_to_json()?;
        logger.save_to_npz()?;
        Some(path)
    };
    log::info!("total time: {:.2?}", setup_start.elapsed());

    Ok(TrainingSummary {
        exp_id,
        iterations: it,
        epochs: epoch,
        final_loss: logger.get_last("elbo"),
        final_perf: logger.get_last("perf"),
        final_lr: scheduler.lr(),
        log_file,
    })
}
