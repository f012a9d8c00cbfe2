//! Nonstationary ICA data: piecewise-stationary sources, one variance profile
//! per segment, mixed through a random multilayer network.

use std::{
    f64::consts::FRAC_PI_2,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use nalgebra::DMatrix;
use ndarray::{s, Array2};
use rand::{distributions::Open01, rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;

use super::{npz, DataError};

/// Argument string of the dataset generated when nothing else is given.
pub const DEFAULT_ARGS: &str = "1000_40_2_4_3_1_gauss_xtanh_false_false";

/// Random draws used to estimate the acceptable condition number of a mixing matrix.
pub const COND_SAMPLES: usize = 10_000;

const FILE_PREFIX: &str = "tcl";
const SLOPE: f64 = 0.1;
const SCALE_BOUNDS: (f64, f64) = (0.5, 3.0);
const MEAN_BOUND: f64 = 5.0;
const COND_PERCENTILE: f64 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePrior {
    Gauss,
    Laplace,
    HypSecant,
}

impl SourcePrior {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Self::Gauss => rng.sample(StandardNormal),
            // inverse cdf, unit variance
            Self::Laplace => {
                let q = rng.sample::<f64, _>(Open01) - 0.5;
                -std::f64::consts::FRAC_1_SQRT_2 * q.signum() * (1.0 - 2.0 * q.abs()).ln()
            }
            Self::HypSecant => {
                let p: f64 = rng.sample(Open01);
                (FRAC_PI_2 * p).tan().ln()
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Gauss => "gauss",
            Self::Laplace => "lap",
            Self::HypSecant => "hs",
        }
    }
}

impl FromStr for SourcePrior {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauss" => Ok(Self::Gauss),
            "lap" => Ok(Self::Laplace),
            "hs" => Ok(Self::HypSecant),
            other => Err(DataError::InvalidArgs(format!("unknown prior `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixingActivation {
    LeakyRelu,
    Sigmoid,
    XTanh,
    Identity,
}

impl MixingActivation {
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            Self::LeakyRelu => {
                if x > 0.0 {
                    x
                } else {
                    SLOPE * x
                }
            }
            Self::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Self::XTanh => x.tanh() + SLOPE * x,
            Self::Identity => x,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::LeakyRelu => "lrelu",
            Self::Sigmoid => "sigmoid",
            Self::XTanh => "xtanh",
            Self::Identity => "none",
        }
    }
}

impl FromStr for MixingActivation {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lrelu" => Ok(Self::LeakyRelu),
            "sigmoid" => Ok(Self::Sigmoid),
            "xtanh" => Ok(Self::XTanh),
            "none" => Ok(Self::Identity),
            other => Err(DataError::InvalidArgs(format!("unknown activation `{other}`"))),
        }
    }
}

/// Parameters of a generated dataset, written as
/// `nps_ns_dl_dd_nl_s_p_a_u_n`:
/// points per segment, segments, latent dim, data dim, mixing layers, seed
/// (`n` for none), prior, activation, uncentered flag and noise level.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticArgs {
    pub n_per_seg: usize,
    pub n_seg: usize,
    pub latent_dim: usize,
    pub data_dim: usize,
    pub n_layers: usize,
    pub seed: Option<u64>,
    pub prior: SourcePrior,
    pub activation: MixingActivation,
    pub uncentered: bool,
    pub noise: f64,
}

impl Default for SyntheticArgs {
    fn default() -> Self {
        Self {
            n_per_seg: 1000,
            n_seg: 40,
            latent_dim: 2,
            data_dim: 4,
            n_layers: 3,
            seed: Some(1),
            prior: SourcePrior::Gauss,
            activation: MixingActivation::XTanh,
            uncentered: false,
            noise: 0.0,
        }
    }
}

fn parse_field<T: FromStr>(value: &str, field: &str) -> Result<T, DataError> {
    value
        .parse()
        .map_err(|_| DataError::InvalidArgs(format!("invalid {field} `{value}`")))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "true" | "True" | "1" | "t" | "T" | "yes" => Some(true),
        "false" | "False" | "0" | "f" | "F" | "no" => Some(false),
        _ => None,
    }
}

impl FromStr for SyntheticArgs {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split('_').collect();
        let [nps, ns, dl, dd, nl, seed, prior, activation, uncentered, noise] = fields[..] else {
            return Err(DataError::InvalidArgs(format!(
                "expected 10 `_`-separated fields in `{s}`, found {}",
                fields.len()
            )));
        };

        let seed = match seed {
            "n" => None,
            seed => Some(parse_field(seed, "seed")?),
        };
        let uncentered = parse_flag(uncentered)
            .ok_or_else(|| DataError::InvalidArgs(format!("invalid flag `{uncentered}`")))?;
        let noise = match parse_flag(noise) {
            Some(noisy) => f64::from(u8::from(noisy)),
            None => parse_field(noise, "noise level")?,
        };

        Ok(Self {
            n_per_seg: parse_field(nps, "points per segment")?,
            n_seg: parse_field(ns, "number of segments")?,
            latent_dim: parse_field(dl, "latent dim")?,
            data_dim: parse_field(dd, "data dim")?,
            n_layers: parse_field(nl, "number of layers")?,
            seed,
            prior: prior.parse()?,
            activation: activation.parse()?,
            uncentered,
            noise,
        })
    }
}

impl fmt::Display for SyntheticArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seed = self.seed.map_or_else(|| "n".to_string(), |s| s.to_string());
        write!(
            f,
            "{}_{}_{}_{}_{}_{}_{}_{}_{}_{}",
            self.n_per_seg,
            self.n_seg,
            self.latent_dim,
            self.data_dim,
            self.n_layers,
            seed,
            self.prior.name(),
            self.activation.name(),
            self.uncentered,
            self.noise,
        )
    }
}

impl SyntheticArgs {
    pub fn n(&self) -> usize {
        self.n_per_seg * self.n_seg
    }

    /// `tcl_{nps}_{ns}_{dl}_{dd}_{nl}_{s}_{p}_{a}[_u][_n{noise}].npz`
    pub fn file_name(&self) -> String {
        let seed = self.seed.map_or_else(|| "n".to_string(), |s| s.to_string());
        let mut name = format!(
            "{FILE_PREFIX}_{}_{}_{}_{}_{}_{}_{}_{}",
            self.n_per_seg,
            self.n_seg,
            self.latent_dim,
            self.data_dim,
            self.n_layers,
            seed,
            self.prior.name(),
            self.activation.name(),
        );
        if self.uncentered {
            name.push_str("_u");
        }
        if self.noise > 0.0 {
            name.push_str(&format!("_n{}", self.noise));
        }
        name.push_str(".npz");
        name
    }

    /// Inverse of [`SyntheticArgs::file_name`]; `None` for other file names.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".npz").unwrap_or(name);
        let rest = stem.strip_prefix(FILE_PREFIX)?.strip_prefix('_')?;
        let fields: Vec<&str> = rest.split('_').collect();
        if fields.len() < 8 {
            return None;
        }

        let mut uncentered = false;
        let mut noise = 0.0;
        for flag in &fields[8..] {
            match *flag {
                "u" => uncentered = true,
                "n" => noise = 1.0,
                other => noise = other.strip_prefix('n')?.parse().ok()?,
            }
        }

        let seed = match fields[5] {
            "n" => None,
            seed => Some(seed.parse().ok()?),
        };

        Some(Self {
            n_per_seg: fields[0].parse().ok()?,
            n_seg: fields[1].parse().ok()?,
            latent_dim: fields[2].parse().ok()?,
            data_dim: fields[3].parse().ok()?,
            n_layers: fields[4].parse().ok()?,
            seed,
            prior: fields[6].parse().ok()?,
            activation: fields[7].parse().ok()?,
            uncentered,
            noise,
        })
    }
}

/// Generated arrays, row-major with one observation per row.
#[derive(Debug, Clone)]
pub struct SyntheticData {
    /// Sources, `n x latent_dim`.
    pub s: Array2<f32>,
    /// Observations, `n x data_dim`.
    pub x: Array2<f32>,
    /// One-hot segment labels, `n x n_seg`.
    pub u: Array2<f32>,
    /// Per-segment source means, `n_seg x latent_dim`.
    pub m: Array2<f32>,
    /// Per-segment source scales, `n_seg x latent_dim`.
    pub l: Array2<f32>,
}

pub fn generate(args: &SyntheticArgs, cond_samples: usize) -> SyntheticData {
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let (sources, labels, means, scales) = nonstationary_sources(args, &mut rng);

    let act = args.activation;
    let a = mixing_matrix(args.latent_dim, args.data_dim, cond_samples, &mut rng);
    let b = if args.latent_dim == args.data_dim {
        a.clone()
    } else {
        mixing_matrix(args.data_dim, args.data_dim, cond_samples, &mut rng)
    };

    let mut x = sources.dot(&a).mapv(|v| act.apply(v));
    for layer in 1..args.n_layers {
        x = x.dot(&b);
        if layer != args.n_layers - 1 {
            x.mapv_inplace(|v| act.apply(v));
        }
    }

    if args.noise > 0.0 {
        let noise = args.noise;
        x.mapv_inplace(|v| v + noise * rng.sample::<f64, _>(StandardNormal));
    }

    let to_f32 = |a: Array2<f64>| a.mapv(|v| v as f32);
    SyntheticData {
        s: to_f32(sources),
        x: to_f32(x),
        u: labels,
        m: to_f32(means),
        l: to_f32(scales),
    }
}

fn nonstationary_sources<R: Rng>(
    args: &SyntheticArgs,
    rng: &mut R,
) -> (Array2<f64>, Array2<f32>, Array2<f64>, Array2<f64>) {
    let (ns, dl, nps) = (args.n_seg, args.latent_dim, args.n_per_seg);

    let scales = Array2::from_shape_fn((ns, dl), |_| {
        rng.gen_range(SCALE_BOUNDS.0..SCALE_BOUNDS.1)
    });
    let means = if args.uncentered {
        Array2::from_shape_fn((ns, dl), |_| rng.gen_range(-MEAN_BOUND..MEAN_BOUND))
    } else {
        Array2::zeros((ns, dl))
    };

    let prior = args.prior;
    let mut sources = Array2::from_shape_fn((args.n(), dl), |_| prior.sample(rng));
    let mut labels = Array2::zeros((args.n(), ns));

    for seg in 0..ns {
        let rows = seg * nps..(seg + 1) * nps;
        let mut block = sources.slice_mut(s![rows.clone(), ..]);
        block *= &scales.row(seg);
        block += &means.row(seg);
        labels.slice_mut(s![rows, seg]).fill(1.0);
    }

    (sources, labels, means, scales)
}

fn normalized_uniform<R: Rng>(rows: usize, cols: usize, rng: &mut R) -> Array2<f64> {
    let mut a: Array2<f64> = Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-1.0..1.0));
    for mut col in a.columns_mut() {
        let norm = col.dot(&col).sqrt();
        col /= norm;
    }
    a
}

pub fn condition_number(a: &Array2<f64>) -> f64 {
    let (rows, cols) = a.dim();
    let m = DMatrix::from_fn(rows, cols, |i, j| a[[i, j]]);
    let singular = m.singular_values();
    let max = singular.iter().copied().fold(f64::MIN, f64::max);
    let min = singular.iter().copied().fold(f64::MAX, f64::min);
    max / min
}

/// Linear interpolation between closest ranks, as numpy does by default.
fn percentile(values: &mut [f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::INFINITY;
    }
    values.sort_by(f64::total_cmp);
    let rank = q / 100.0 * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    values[lo] + (values[hi] - values[lo]) * (rank - lo as f64)
}

/// Random `rows x cols` matrix with unit-norm columns whose condition number is
/// within the best quarter of `cond_samples` random draws.
pub fn mixing_matrix<R: Rng>(rows: usize, cols: usize, cond_samples: usize, rng: &mut R) -> Array2<f64> {
    let mut conds: Vec<f64> = (0..cond_samples)
        .map(|_| condition_number(&normalized_uniform(rows, cols, rng)))
        .collect();
    let threshold = percentile(&mut conds, COND_PERCENTILE);

    loop {
        let a = normalized_uniform(rows, cols, rng);
        if condition_number(&a) <= threshold {
            return a;
        }
    }
}

/// Generates the dataset described by `args` under `root` unless it is
/// already there. Returns the dataset path.
pub fn create_if_not_exist_dataset(
    root: impl AsRef<Path>,
    args: &SyntheticArgs,
    cond_samples: usize,
) -> Result<PathBuf, DataError> {
    let root = root.as_ref();
    let path = root.join(args.file_name());
    if path.exists() {
        log::info!("using existing dataset {}", path.display());
        return Ok(path);
    }

    std::fs::create_dir_all(root).map_err(|source| DataError::Io {
        path: root.to_path_buf(),
        source,
    })?;

    log::info!("generating dataset {}", path.display());
    let data = generate(args, cond_samples);
    npz::save_synthetic(&path, &data)?;
    Ok(path)
}
