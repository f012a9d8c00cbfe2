use burn::{
    config::Config,
    module::Module,
    tensor::{backend::Backend, Tensor},
};
use dl_utils::nn::ActivationConfig;

use self::{
    anneal::AnnealWeights,
    mlp::{Mlp, MlpConfig},
    normal::{log_sum_exp, NormalParams},
};

pub mod anneal;
pub mod mlp;
pub mod normal;

#[derive(Config, Debug)]
pub struct IVaeConfig {
    pub latent_dim: usize,
    pub data_dim: usize,
    pub aux_dim: usize,
    #[config(default = 50)]
    pub hidden_dim: usize,
    #[config(default = 3)]
    pub n_layers: usize,
    #[config(default = "ActivationConfig::LeakyRelu")]
    pub activation: ActivationConfig,
    #[config(default = 0.01)]
    pub decoder_var: f64,
}

impl IVaeConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> IVae<B> {
        let mlp = |input, output| {
            MlpConfig::new2(input, output, self.hidden_dim, self.n_layers, self.activation)
                .init(device)
        };

        IVae {
            logl: mlp(self.aux_dim, self.latent_dim),
            f: mlp(self.latent_dim, self.data_dim),
            g: mlp(self.data_dim + self.aux_dim, self.latent_dim),
            logv: mlp(self.data_dim + self.aux_dim, self.latent_dim),
            decoder_var: self.decoder_var,
        }
    }
}

/// Identifiable VAE with a conditionally factorial Gaussian prior `p(z|u)`.
#[derive(Module, Debug)]
pub struct IVae<B: Backend> {
    logl: Mlp<B>,
    f: Mlp<B>,
    g: Mlp<B>,
    logv: Mlp<B>,
    decoder_var: f64,
}

#[derive(Debug, Clone)]
pub struct IVaeForward<B: Backend> {
    pub prior: NormalParams<B, 2>,
    pub encoder: NormalParams<B, 2>,
    pub z: Tensor<B, 2>,
    pub decoder: NormalParams<B, 2>,
}

#[derive(Debug, Clone)]
pub struct ElboOutput<B: Backend> {
    /// Batch mean of the (possibly weighted) evidence lower bound.
    pub elbo: Tensor<B, 1>,
    pub z: Tensor<B, 2>,
    pub x_recon: Tensor<B, 2>,
}

impl<B: Backend> IVae<B> {
    pub fn prior_params(&self, u: Tensor<B, 2>) -> NormalParams<B, 2> {
        let var = self.logl.forward(u).exp();
        NormalParams::new(Tensor::zeros(var.shape(), &var.device()), var)
    }

    pub fn encoder_params(&self, x: Tensor<B, 2>, u: Tensor<B, 2>) -> NormalParams<B, 2> {
        let xu = Tensor::cat(vec![x, u], 1);
        let mean = self.g.forward(xu.clone());
        let var = self.logv.forward(xu).exp();
        NormalParams::new(mean, var)
    }

    pub fn decoder_params(&self, z: Tensor<B, 2>) -> NormalParams<B, 2> {
        let mean = self.f.forward(z);
        let var = Tensor::ones(mean.shape(), &mean.device()).mul_scalar(self.decoder_var);
        NormalParams::new(mean, var)
    }

    pub fn forward(&self, x: Tensor<B, 2>, u: Tensor<B, 2>) -> IVaeForward<B> {
        let prior = self.prior_params(u.clone());
        let encoder = self.encoder_params(x, u);
        let z = encoder.sample();
        let decoder = self.decoder_params(z.clone());

        IVaeForward {
            prior,
            encoder,
            z,
            decoder,
        }
    }

    pub fn elbo(
        &self,
        x: Tensor<B, 2>,
        u: Tensor<B, 2>,
        weights: Option<&AnnealWeights>,
    ) -> ElboOutput<B> {
        let forward = self.forward(x.clone(), u);
        let elbo = Self::objective(&forward, x, weights);

        ElboOutput {
            elbo,
            z: forward.z,
            x_recon: forward.decoder.mean,
        }
    }

    /// Batch mean of the objective for an already sampled forward pass.
    pub fn objective(
        forward: &IVaeForward<B>,
        x: Tensor<B, 2>,
        weights: Option<&AnnealWeights>,
    ) -> Tensor<B, 1> {
        let IVaeForward {
            prior,
            encoder,
            z,
            decoder,
        } = forward;

        let log_px_z = decoder.log_pdf(x);
        let log_qz_xu = encoder.log_pdf(z.clone());
        let log_pz_u = prior.log_pdf(z.clone());

        let elbo = match weights {
            None => log_px_z + log_pz_u - log_qz_xu,
            Some(w) => {
                let [m, l] = z.dims();
                let log_mn = ((m * w.dataset_size) as f64).ln();

                // log q(z_i | x_j, u_j) for every pair (i, j): [m, m, l]
                let pairwise = NormalParams::new(
                    encoder.mean.clone().reshape([1, m, l]).repeat(0, m),
                    encoder.var.clone().reshape([1, m, l]).repeat(0, m),
                )
                .log_pdf_elementwise(z.clone().reshape([m, 1, l]).repeat(1, m));

                let log_qz = log_sum_exp(pairwise.clone().sum_dim(2), 1)
                    .reshape([m])
                    .sub_scalar(log_mn);
                let log_qz_prod = log_sum_exp(pairwise, 1)
                    .sub_scalar(log_mn)
                    .sum_dim(2)
                    .reshape([m]);

                log_px_z.mul_scalar(w.a)
                    - (log_qz_xu - log_qz.clone()).mul_scalar(w.b)
                    - (log_qz - log_qz_prod.clone()).mul_scalar(w.c)
                    - (log_qz_prod - log_pz_u).mul_scalar(w.d)
            }
        };

        elbo.mean()
    }

    /// Draws latents from the prior given `u` and decodes them, returning `(x, z)`.
    pub fn sample(&self, u: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let z = self.prior_params(u).sample();
        let x = self.decoder_params(z.clone()).sample();
        (x, z)
    }

    pub fn decoder_var(&self) -> f64 {
        self.decoder_var
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;

    type B = burn::backend::NdArray;

    fn inputs(device: &<B as Backend>::Device) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let x = Tensor::random([8, 4], Distribution::Normal(0.0, 1.0), device);
        let u = Tensor::from_floats(
            [
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            device,
        );
        (x, u)
    }

    #[test]
    fn forward_shapes() {
        let device = burn::backend::ndarray::NdArrayDevice::Cpu;
        let model = IVaeConfig::new(2, 4, 3).init::<B>(&device);
        let (x, u) = inputs(&device);

        let out = model.forward(x, u.clone());
        assert_eq!(out.prior.mean.dims(), [8, 2]);
        assert_eq!(out.encoder.var.dims(), [8, 2]);
        assert_eq!(out.z.dims(), [8, 2]);
        assert_eq!(out.decoder.mean.dims(), [8, 4]);

        let decoder_var = out.decoder.var.into_data().value;
        assert!(decoder_var.iter().all(|v| (v - 0.01).abs() < 1e-7));

        let (x, z) = model.sample(u);
        assert_eq!(x.dims(), [8, 4]);
        assert_eq!(z.dims(), [8, 2]);
    }

    #[test]
    fn elbo_is_finite() {
        let device = burn::backend::ndarray::NdArrayDevice::Cpu;
        let model = IVaeConfig::new(2, 4, 3)
            .with_n_layers(2)
            .with_activation(ActivationConfig::XTanh)
            .init::<B>(&device);
        let (x, u) = inputs(&device);

        let plain = model.elbo(x.clone(), u.clone(), None);
        assert_eq!(plain.z.dims(), [8, 2]);
        assert_eq!(plain.x_recon.dims(), [8, 4]);
        assert!(plain.elbo.into_scalar().is_finite());

        let weights = AnnealWeights {
            a: 100.0,
            b: 15.0,
            c: 0.0,
            d: 25.0,
            dataset_size: 1000,
        };
        let annealed = model.elbo(x, u, Some(&weights));
        assert!(annealed.elbo.into_scalar().is_finite());
    }

    #[test]
    fn unit_weights_match_plain_elbo() {
        // With a = b = c = d = 1 the decomposition telescopes to the plain ELBO.
        let device = burn::backend::ndarray::NdArrayDevice::Cpu;
        let model = IVaeConfig::new(2, 4, 3).init::<B>(&device);
        let (x, u) = inputs(&device);

        let forward = model.forward(x.clone(), u);
        let plain = IVae::objective(&forward, x.clone(), None).into_scalar();
        let annealed =
            IVae::objective(&forward, x, Some(&AnnealWeights::default())).into_scalar();

        assert!(
            (plain - annealed).abs() < 1e-3 * plain.abs().max(1.0),
            "{plain} != {annealed}"
        );
    }

    #[test]
    fn elbo_uses_a_single_latent_draw() {
        let device = burn::backend::ndarray::NdArrayDevice::Cpu;
        let model = IVaeConfig::new(2, 4, 3).init::<B>(&device);
        let (x, u) = inputs(&device);

        let out = model.elbo(x.clone(), u, None);
        let recon = model.decoder_params(out.z).mean;
        let diff = (recon - out.x_recon).abs().max().into_scalar();
        assert!(diff < 1e-6);
    }
}
