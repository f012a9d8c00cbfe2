use std::{
    fs::File,
    path::{Path, PathBuf},
};

use burn::data::dataset::Dataset;
use ndarray::{Array1, Array2, Ix1, Ix2, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter};

use super::{one_hot, synthetic::SyntheticData, DataDims, DataError, IvaeItem};

fn find_entry(names: &[String], name: &str) -> Option<String> {
    let with_ext = format!("{name}.npy");
    names
        .iter()
        .find(|entry| entry.as_str() == name || entry.as_str() == with_ext)
        .cloned()
}

fn labels_to_one_hot(
    labels: impl Iterator<Item = i64>,
    path: &Path,
    name: &str,
) -> Result<Array2<f32>, DataError> {
    let labels = labels
        .map(|label| {
            usize::try_from(label).map_err(|_| {
                DataError::Inconsistent(format!(
                    "negative label {label} in `{name}` of {}",
                    path.display()
                ))
            })
        })
        .collect::<Result<Vec<usize>, _>>()?;
    let num_classes = labels.iter().max().map_or(0, |max| max + 1);
    let mut u = Array2::zeros((labels.len(), num_classes));
    for (mut row, label) in u.rows_mut().into_iter().zip(&labels) {
        row.assign(&Array1::from(one_hot(*label, num_classes)));
    }
    Ok(u)
}

/// Reads a 2-D float array stored as `f32` or `f64`. 1-D integer arrays are
/// read as class labels and one-hot encoded.
fn read_matrix(npz: &mut NpzReader<File>, path: &Path, name: &str) -> Result<Option<Array2<f32>>, DataError> {
    let names = npz.names()?;
    let Some(entry) = find_entry(&names, name) else {
        return Ok(None);
    };

    if let Ok(a) = npz.by_name::<OwnedRepr<f32>, Ix2>(&entry) {
        return Ok(Some(a));
    }
    if let Ok(a) = npz.by_name::<OwnedRepr<f64>, Ix2>(&entry) {
        return Ok(Some(a.mapv(|v| v as f32)));
    }
    if let Ok(a) = npz.by_name::<OwnedRepr<i64>, Ix1>(&entry) {
        return labels_to_one_hot(a.iter().copied(), path, name).map(Some);
    }
    if let Ok(a) = npz.by_name::<OwnedRepr<i32>, Ix1>(&entry) {
        return labels_to_one_hot(a.iter().map(|&v| i64::from(v)), path, name).map(Some);
    }
    if let Ok(a) = npz.by_name::<OwnedRepr<u8>, Ix1>(&entry) {
        return labels_to_one_hot(a.iter().map(|&v| i64::from(v)), path, name).map(Some);
    }

    Err(DataError::UnsupportedArray {
        path: path.to_path_buf(),
        name: name.to_string(),
    })
}

pub fn save_synthetic(path: &Path, data: &SyntheticData) -> Result<(), DataError> {
    let file = File::create(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut npz = NpzWriter::new_compressed(file);
    npz.add_array("s.npy", &data.s)?;
    npz.add_array("x.npy", &data.x)?;
    npz.add_array("u.npy", &data.u)?;
    npz.add_array("m.npy", &data.m)?;
    npz.add_array("L.npy", &data.l)?;
    npz.finish()?;
    Ok(())
}

/// Observations `x`, auxiliary variables `u` and, when known, the true
/// sources `s`, all held in memory.
#[derive(Debug, Clone)]
pub struct NpzDataset {
    path: PathBuf,
    x: Array2<f32>,
    u: Array2<f32>,
    s: Option<Array2<f32>>,
}

impl NpzDataset {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| DataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut npz = NpzReader::new(file)?;

        let missing = |name: &str| DataError::MissingArray {
            path: path.to_path_buf(),
            name: name.to_string(),
        };
        let x = read_matrix(&mut npz, path, "x")?.ok_or_else(|| missing("x"))?;
        let u = read_matrix(&mut npz, path, "u")?.ok_or_else(|| missing("u"))?;
        let s = read_matrix(&mut npz, path, "s")?;

        Self::from_arrays(path, x, u, s)
    }

    pub fn from_arrays(
        path: impl AsRef<Path>,
        x: Array2<f32>,
        u: Array2<f32>,
        s: Option<Array2<f32>>,
    ) -> Result<Self, DataError> {
        let n = x.nrows();
        let rows = [Some(u.nrows()), s.as_ref().map(Array2::nrows)];
        if rows.into_iter().flatten().any(|rows| rows != n) {
            return Err(DataError::Inconsistent(format!(
                "x has {n} rows but u has {} and s has {:?}",
                u.nrows(),
                s.as_ref().map(Array2::nrows)
            )));
        }

        Ok(Self {
            path: path.as_ref().to_path_buf(),
            x,
            u,
            s,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_sources(&self) -> bool {
        self.s.is_some()
    }

    /// Latent dim comes from the sources when they are stored, otherwise
    /// from `latent_dim`.
    pub fn dims(&self, latent_dim: Option<usize>) -> Result<DataDims, DataError> {
        let latent_dim = latent_dim
            .or_else(|| self.s.as_ref().map(Array2::ncols))
            .ok_or_else(|| {
                DataError::Inconsistent(format!(
                    "{} stores no sources, a latent dim is required",
                    self.path.display()
                ))
            })?;
        Ok(DataDims {
            data_dim: self.x.ncols(),
            latent_dim,
            aux_dim: self.u.ncols(),
        })
    }
}

impl Dataset<IvaeItem> for NpzDataset {
    fn get(&self, index: usize) -> Option<IvaeItem> {
        if index >= self.x.nrows() {
            return None;
        }
        Some(IvaeItem {
            x: self.x.row(index).to_vec(),
            u: self.u.row(index).to_vec(),
            s: self.s.as_ref().map(|s| s.row(index).to_vec()),
        })
    }

    fn len(&self) -> usize {
        self.x.nrows()
    }
}
