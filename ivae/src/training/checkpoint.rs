use std::path::{Path, PathBuf};

use anyhow::Context;
use burn::{
    module::AutodiffModule,
    optim::Optimizer,
    record::{CompactRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub exp_id: usize,
    pub iteration: usize,
    pub loss: f64,
    pub perf: f64,
}

/// Files making up one checkpoint: `{exp_id}_ckpt_{it}` followed by
/// `_model.mpk`, `_optim.mpk` and `.json`.
#[derive(Debug, Clone)]
pub struct CheckpointPaths {
    pub model: PathBuf,
    pub optimizer: PathBuf,
    pub meta: PathBuf,
}

impl CheckpointPaths {
    pub fn new(dir: &Path, exp_id: usize, it: usize) -> Self {
        let stem = format!("{exp_id}_ckpt_{it}");
        Self {
            model: dir.join(format!("{stem}_model")),
            optimizer: dir.join(format!("{stem}_optim")),
            meta: dir.join(format!("{stem}.json")),
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn checkpoint<B, M, O>(
    dir: &Path,
    exp_id: usize,
    it: usize,
    model: &M,
    optimizer: &O,
    loss: f64,
    perf: f64,
) -> anyhow::Result<CheckpointPaths>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let paths = CheckpointPaths::new(dir, exp_id, it);
    let recorder = CompactRecorder::new();

    model
        .clone()
        .save_file(&paths.model, &recorder)
        .context("saving model record")?;
    Recorder::<B>::record(&recorder, optimizer.to_record(), paths.optimizer.clone())
        .context("saving optimizer record")?;

    let meta = CheckpointMeta {
        exp_id,
        iteration: it,
        loss,
        perf,
    };
    let file = std::fs::File::create(&paths.meta)
        .with_context(|| format!("creating {}", paths.meta.display()))?;
    serde_json::to_writer_pretty(file, &meta).context("writing checkpoint metadata")?;

    log::info!("checkpoint saved: {}", paths.model.display());
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IVae, IVaeConfig};
    use burn::{module::Module, optim::AdamConfig};

    type B = burn::backend::Autodiff<burn::backend::NdArray>;

    #[test]
    fn writes_all_parts() {
        let device = burn::backend::ndarray::NdArrayDevice::Cpu;
        let dir = tempfile::tempdir().unwrap();

        let model: IVae<B> = IVaeConfig::new(2, 3, 4).init(&device);
        let optimizer = AdamConfig::new().init::<B, IVae<B>>();

        let paths = checkpoint(dir.path(), 3, 40, &model, &optimizer, 1.5, 0.75).unwrap();
        assert!(paths.meta.ends_with("3_ckpt_40.json"));
        assert!(paths.model.with_extension("mpk").exists());
        assert!(paths.optimizer.with_extension("mpk").exists());

        let meta: CheckpointMeta =
            serde_json::from_reader(std::fs::File::open(&paths.meta).unwrap()).unwrap();
        assert_eq!(
            meta,
            CheckpointMeta {
                exp_id: 3,
                iteration: 40,
                loss: 1.5,
                perf: 0.75
            }
        );

        let fresh: IVae<B> = IVaeConfig::new(2, 3, 4).init(&device);
        assert!(fresh
            .load_file(&paths.model, &CompactRecorder::new(), &device)
            .is_ok());
    }
}
