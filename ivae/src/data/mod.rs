use std::path::{Path, PathBuf};

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    tensor::{backend::Backend, Data, Shape, Tensor},
};
use derive_new::new;
use serde::Serialize;

use self::{
    mnist::MnistIvaeDataset,
    npz::NpzDataset,
    synthetic::{create_if_not_exist_dataset, SyntheticArgs},
};

pub mod loader;
pub mod mnist;
pub mod npz;
pub mod synthetic;

/// Latent dimension used for image data when none is given.
pub const IMAGE_LATENT_DIM: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("reading npz archive: {0}")]
    ReadNpz(#[from] ndarray_npy::ReadNpzError),
    #[error("writing npz archive: {0}")]
    WriteNpz(#[from] ndarray_npy::WriteNpzError),
    #[error("{path} has no array `{name}`")]
    MissingArray { path: PathBuf, name: String },
    #[error("array `{name}` in {path} is neither a float matrix nor integer labels")]
    UnsupportedArray { path: PathBuf, name: String },
    #[error("inconsistent dataset: {0}")]
    Inconsistent(String),
    #[error("invalid dataset arguments: {0}")]
    InvalidArgs(String),
}

pub(crate) fn one_hot(i: usize, len: usize) -> Vec<f32> {
    let mut v = vec![0.0; len];
    v[i] = 1.0;
    v
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, new)]
pub struct DataDims {
    pub data_dim: usize,
    pub latent_dim: usize,
    pub aux_dim: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IvaeItem {
    pub x: Vec<f32>,
    pub u: Vec<f32>,
    /// True sources, only known for synthetic data.
    pub s: Option<Vec<f32>>,
}

#[derive(Debug, Clone)]
pub struct IvaeBatch<B: Backend> {
    pub x: Tensor<B, 2>,
    pub u: Tensor<B, 2>,
    pub s: Option<Tensor<B, 2>>,
}

#[derive(Debug, Clone, new)]
pub struct IvaeBatcher<B: Backend> {
    device: B::Device,
}

fn rows_to_tensor<'a, B: Backend>(
    rows: impl Iterator<Item = &'a [f32]>,
    device: &B::Device,
) -> Tensor<B, 2> {
    let mut values = Vec::new();
    let mut n = 0;
    let mut dim = 0;
    for row in rows {
        dim = row.len();
        values.extend_from_slice(row);
        n += 1;
    }
    Tensor::from_floats(Data::new(values, Shape::new([n, dim])), device)
}

impl<B: Backend> Batcher<IvaeItem, IvaeBatch<B>> for IvaeBatcher<B> {
    fn batch(&self, items: Vec<IvaeItem>) -> IvaeBatch<B> {
        let x = rows_to_tensor(items.iter().map(|item| item.x.as_slice()), &self.device);
        let u = rows_to_tensor(items.iter().map(|item| item.u.as_slice()), &self.device);
        let s = items
            .iter()
            .map(|item| item.s.as_deref())
            .collect::<Option<Vec<_>>>()
            .map(|rows| rows_to_tensor(rows.into_iter(), &self.device));

        IvaeBatch { x, u, s }
    }
}

/// Where the training data comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum DataSource {
    Npz(PathBuf),
    Mnist,
}

impl DataSource {
    /// `mnist` wins, then an explicit file, then a dataset generated from
    /// `data_args` (or the default arguments) under `data_root`.
    pub fn resolve(
        file: Option<&str>,
        data_args: Option<&str>,
        mnist: bool,
        data_root: &Path,
        cond_samples: usize,
    ) -> Result<Self, DataError> {
        if mnist {
            return Ok(Self::Mnist);
        }
        if let Some(file) = file {
            return Ok(Self::Npz(PathBuf::from(file)));
        }

        let args = match data_args {
            Some(data_args) => data_args.parse()?,
            None => SyntheticArgs::default(),
        };
        let path = create_if_not_exist_dataset(data_root, &args, cond_samples)?;
        Ok(Self::Npz(path))
    }

    /// Image data is trained on reconstruction error and gets sample grids.
    pub fn is_image(&self) -> bool {
        match self {
            Self::Mnist => true,
            Self::Npz(path) => path
                .file_name()
                .map_or(false, |name| name.to_string_lossy().contains("mnist")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetMetadata {
    pub path: String,
    pub nps: Option<usize>,
    pub ns: Option<usize>,
    pub n: usize,
    pub latent_dim: usize,
    pub data_dim: usize,
    pub aux_dim: usize,
}

pub enum IvaeDataset {
    Npz(NpzDataset),
    Mnist(MnistIvaeDataset),
}

impl IvaeDataset {
    pub fn load(source: &DataSource) -> Result<Self, DataError> {
        match source {
            DataSource::Npz(path) => Ok(Self::Npz(NpzDataset::load(path)?)),
            DataSource::Mnist => Ok(Self::Mnist(MnistIvaeDataset::train())),
        }
    }

    pub fn dims(&self, latent_dim: Option<usize>) -> Result<DataDims, DataError> {
        match self {
            Self::Npz(dataset) if !dataset.has_sources() => {
                dataset.dims(latent_dim.or(Some(IMAGE_LATENT_DIM)))
            }
            Self::Npz(dataset) => dataset.dims(latent_dim),
            Self::Mnist(_) => Ok(MnistIvaeDataset::dims(
                latent_dim.unwrap_or(IMAGE_LATENT_DIM),
            )),
        }
    }

    pub fn metadata(&self, dims: DataDims) -> DatasetMetadata {
        let (path, args) = match self {
            Self::Npz(dataset) => {
                let args = dataset
                    .path()
                    .file_name()
                    .and_then(|name| SyntheticArgs::from_file_name(&name.to_string_lossy()));
                (dataset.path().display().to_string(), args)
            }
            Self::Mnist(_) => ("mnist".to_string(), None),
        };

        DatasetMetadata {
            path,
            nps: args.as_ref().map(|args| args.n_per_seg),
            ns: args.as_ref().map(|args| args.n_seg),
            n: self.len(),
            latent_dim: dims.latent_dim,
            data_dim: dims.data_dim,
            aux_dim: dims.aux_dim,
        }
    }
}

impl Dataset<IvaeItem> for IvaeDataset {
    fn get(&self, index: usize) -> Option<IvaeItem> {
        match self {
            Self::Npz(dataset) => dataset.get(index),
            Self::Mnist(dataset) => dataset.get(index),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Npz(dataset) => dataset.len(),
            Self::Mnist(dataset) => dataset.len(),
        }
    }
}
