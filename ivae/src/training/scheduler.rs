use burn::config::Config;

#[derive(Config, Debug)]
pub struct ReduceLrOnPlateauConfig {
    #[config(default = 0.1)]
    pub factor: f64,
    #[config(default = 4)]
    pub patience: usize,
    /// Relative improvement required over the best value seen so far.
    #[config(default = 1e-4)]
    pub threshold: f64,
    #[config(default = 0)]
    pub cooldown: usize,
    #[config(default = 0.0)]
    pub min_lr: f64,
    /// Reductions smaller than this are skipped.
    #[config(default = 1e-8)]
    pub eps: f64,
}

impl ReduceLrOnPlateauConfig {
    pub fn init(&self, lr: f64) -> ReduceLrOnPlateau {
        ReduceLrOnPlateau {
            config: self.clone(),
            lr,
            best: f64::INFINITY,
            num_bad_epochs: 0,
            cooldown_counter: 0,
        }
    }
}

/// Lowers the learning rate once a minimized metric stops improving.
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    config: ReduceLrOnPlateauConfig,
    lr: f64,
    best: f64,
    num_bad_epochs: usize,
    cooldown_counter: usize,
}

impl ReduceLrOnPlateau {
    pub fn lr(&self) -> f64 {
        self.lr
    }

    pub fn step(&mut self, metric: f64) -> f64 {
        if metric < self.best * (1.0 - self.config.threshold) {
            self.best = metric;
            self.num_bad_epochs = 0;
        } else {
            self.num_bad_epochs += 1;
        }

        if self.cooldown_counter > 0 {
            self.cooldown_counter -= 1;
            self.num_bad_epochs = 0;
        }

        if self.num_bad_epochs > self.config.patience {
            let new_lr = (self.lr * self.config.factor).max(self.config.min_lr);
            if self.lr - new_lr > self.config.eps {
                log::info!("reducing learning rate: {:.4e} -> {:.4e}", self.lr, new_lr);
                self.lr = new_lr;
            }
            self.cooldown_counter = self.config.cooldown;
            self.num_bad_epochs = 0;
        }

        self.lr
    }
}
