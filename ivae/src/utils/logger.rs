use std::{
    collections::BTreeMap,
    fs::File,
    path::{Path, PathBuf},
};

use anyhow::Context;
use ndarray::Array1;
use ndarray_npy::NpzWriter;
use serde::Serialize;
use serde_json::{Map, Value};

/// Metric log of one experiment. Values are accumulated with [`Logger::update`]
/// and averaged into the log on every [`Logger::log`].
#[derive(Debug)]
pub struct Logger {
    path: PathBuf,
    exp_id: usize,
    logs: BTreeMap<String, Vec<f64>>,
    pending: BTreeMap<String, Vec<f64>>,
    metadata: Map<String, Value>,
}

#[derive(Serialize)]
struct LogFile<'a> {
    id: usize,
    metadata: &'a Map<String, Value>,
    logs: &'a BTreeMap<String, Vec<f64>>,
}

fn parse_id(name: &str) -> Option<usize> {
    let stem = name
        .strip_suffix(".json")
        .or_else(|| name.strip_suffix(".npz"))?;
    stem.strip_prefix("data_")?.parse().ok()
}

impl Logger {
    /// Opens the log folder, taking the id after the largest one stored there.
    pub fn new(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path).with_context(|| format!("creating {}", path.display()))?;

        let mut last_id = 0;
        for entry in std::fs::read_dir(&path).with_context(|| format!("reading {}", path.display()))? {
            let name = entry?.file_name();
            if let Some(id) = name.to_str().and_then(parse_id) {
                last_id = last_id.max(id);
            }
        }

        Ok(Self {
            path,
            exp_id: last_id + 1,
            logs: BTreeMap::new(),
            pending: BTreeMap::new(),
            metadata: Map::new(),
        })
    }

    pub fn exp_id(&self) -> usize {
        self.exp_id
    }

    pub fn add(&mut self, key: &str) {
        self.logs.entry(key.to_string()).or_default();
        self.pending.entry(key.to_string()).or_default();
    }

    pub fn update(&mut self, key: &str, value: f64) {
        self.pending.entry(key.to_string()).or_default().push(value);
    }

    pub fn log(&mut self) {
        for (key, values) in self.pending.iter_mut() {
            if values.is_empty() {
                continue;
            }
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            self.logs.entry(key.clone()).or_default().push(mean);
            values.clear();
        }
    }

    pub fn get_last(&self, key: &str) -> Option<f64> {
        self.logs.get(key).and_then(|values| values.last().copied())
    }

    pub fn get(&self, key: &str) -> Option<&[f64]> {
        self.logs.get(key).map(Vec::as_slice)
    }

    pub fn add_metadata(&mut self, metadata: impl Serialize) -> anyhow::Result<()> {
        match serde_json::to_value(metadata)? {
            Value::Object(map) => self.metadata.extend(map),
            other => anyhow::bail!("metadata must serialize to an object, got {other}"),
        }
        Ok(())
    }

    pub fn save_to_json(&self) -> anyhow::Result<PathBuf> {
        let file_path = self.path.join(format!("data_{}.json", self.exp_id));
        let file = File::create(&file_path)
            .with_context(|| format!("creating {}", file_path.display()))?;
        let log = LogFile {
            id: self.exp_id,
            metadata: &self.metadata,
            logs: &self.logs,
        };
        serde_json::to_writer(file, &log).context("writing json log")?;
        log::info!("log saved to {}", file_path.display());
        Ok(file_path)
    }

    pub fn save_to_npz(&self) -> anyhow::Result<PathBuf> {
        let file_path = self.path.join(format!("data_{}.npz", self.exp_id));
        let file = File::create(&file_path)
            .with_context(|| format!("creating {}", file_path.display()))?;
        let mut npz = NpzWriter::new(file);
        for (key, values) in self.logs.iter() {
            npz.add_array(format!("{key}.npy"), &Array1::from(values.clone()))
                .with_context(|| format!("writing `{key}`"))?;
        }
        npz.finish().context("finishing npz log")?;
        Ok(file_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray_npy::NpzReader;

    #[test]
    fn ids_increase() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::new(dir.path()).unwrap();
        assert_eq!(logger.exp_id(), 1);
        logger.save_to_json().unwrap();

        std::fs::write(dir.path().join("data_7.npz"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        assert_eq!(Logger::new(dir.path()).unwrap().exp_id(), 8);
    }

    #[test]
    fn averages_pending_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = Logger::new(dir.path()).unwrap();
        logger.add("elbo");
        logger.add("perf");
        assert_eq!(logger.get_last("elbo"), None);

        logger.update("elbo", 1.0);
        logger.update("elbo", 3.0);
        logger.update("perf", 0.5);
        logger.log();
        assert_eq!(logger.get_last("elbo"), Some(2.0));
        assert_eq!(logger.get_last("perf"), Some(0.5));

        logger.update("elbo", 10.0);
        logger.log();
        assert_eq!(logger.get("elbo").unwrap(), &[2.0, 10.0]);
        assert_eq!(logger.get("perf").unwrap(), &[0.5]);
    }

    #[test]
    fn saves_json_and_npz() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = Logger::new(dir.path()).unwrap();
        logger.add("elbo");
        logger.update("elbo", -4.0);
        logger.log();
        logger
            .add_metadata(serde_json::json!({ "batch_size": 16, "anneal": false }))
            .unwrap();
        assert!(logger.add_metadata(3).is_err());

        let json_path = logger.save_to_json().unwrap();
        let value: Value = serde_json::from_reader(File::open(json_path).unwrap()).unwrap();
        assert_eq!(value["id"], 1);
        assert_eq!(value["metadata"]["batch_size"], 16);
        assert_eq!(value["logs"]["elbo"][0], -4.0);

        let npz_path = logger.save_to_npz().unwrap();
        let mut npz = NpzReader::new(File::open(npz_path).unwrap()).unwrap();
        let elbo: Array1<f64> = npz.by_name("elbo.npy").unwrap();
        assert_eq!(elbo.to_vec(), vec![-4.0]);
    }
}
