/// Weights of the decomposed ELBO terms:
/// `a` reconstruction, `b` index-code mutual information, `c` total
/// correlation, `d` dimension-wise KL to the prior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnealWeights {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub dataset_size: usize,
}

impl Default for AnnealWeights {
    fn default() -> Self {
        Self {
            a: 1.0,
            b: 1.0,
            c: 1.0,
            d: 1.0,
            dataset_size: 1,
        }
    }
}

/// Schedules the weights over training. The annealed objective is used until
/// `max_iter / 1.6` iterations have passed, then the plain ELBO takes over.
#[derive(Debug, Clone)]
pub struct Annealer {
    weights: AnnealWeights,
    active: bool,
    decoder_var: f64,
}

impl Annealer {
    pub fn new(enabled: bool, decoder_var: f64) -> Self {
        Self {
            weights: AnnealWeights::default(),
            active: enabled,
            decoder_var,
        }
    }

    pub fn step(&mut self, dataset_size: usize, max_iter: usize, it: usize) {
        let thr = ((max_iter as f64 / 1.6) as usize).max(1);
        let progress = it as f64 / thr as f64;
        let alpha = 0.5 / self.decoder_var;

        self.weights = AnnealWeights {
            a: (2.0 * alpha).min(alpha + alpha * progress),
            b: (alpha * 0.3 * (1.0 - progress)).max(1.0),
            c: progress.min(1.0),
            d: (alpha * 0.5 * (1.0 - progress)).max(1.0),
            dataset_size,
        };

        if it > thr {
            self.active = false;
        }
    }

    /// Weights to train with, `None` once annealing is over.
    pub fn weights(&self) -> Option<&AnnealWeights> {
        self.active.then_some(&self.weights)
    }
}
