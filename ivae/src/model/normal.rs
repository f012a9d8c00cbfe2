use std::f64::consts::PI;

use burn::tensor::{backend::Backend, Distribution, Tensor};

/// Diagonal Gaussian given by its mean and variance.
#[derive(Debug, Clone)]
pub struct NormalParams<B: Backend, const D: usize> {
    pub mean: Tensor<B, D>,
    pub var: Tensor<B, D>,
}

impl<B: Backend, const D: usize> NormalParams<B, D> {
    pub fn new(mean: Tensor<B, D>, var: Tensor<B, D>) -> Self {
        Self { mean, var }
    }

    /// Reparameterized draw, differentiable in mean and variance.
    pub fn sample(&self) -> Tensor<B, D> {
        let eps = Tensor::random(
            self.mean.shape(),
            Distribution::Normal(0.0, 1.0),
            &self.mean.device(),
        );
        self.mean.clone() + eps * self.var.clone().sqrt()
    }

    pub fn log_pdf_elementwise(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        let diff = x - self.mean.clone();
        let sq = diff.clone() * diff / self.var.clone();
        (self.var.clone().log() + sq)
            .add_scalar((2.0 * PI).ln())
            .mul_scalar(-0.5)
    }
}

impl<B: Backend> NormalParams<B, 2> {
    /// Log density of each row, summed over the last dim.
    pub fn log_pdf(&self, x: Tensor<B, 2>) -> Tensor<B, 1> {
        self.log_pdf_elementwise(x).sum_dim(1).squeeze(1)
    }
}

/// `ln Σ exp(x)` along `dim`, keeping `dim` with size 1.
pub fn log_sum_exp<B: Backend, const D: usize>(x: Tensor<B, D>, dim: usize) -> Tensor<B, D> {
    let size = x.dims()[dim];
    let max = x.clone().max_dim(dim).detach();
    let shifted = x - max.clone().repeat(dim, size);
    shifted.exp().sum_dim(dim).log() + max
}

#[cfg(test)]
mod tests {
    use super::*;

    type B = burn::backend::NdArray;

    #[test]
    fn standard_normal_density() {
        let device = burn::backend::ndarray::NdArrayDevice::Cpu;
        let params = NormalParams::<B, 2>::new(Tensor::zeros([1, 2], &device), Tensor::ones([1, 2], &device));
        let x = Tensor::<B, 2>::from_floats([[0.0, 1.0]], &device);

        let expected = -(2.0 * PI).ln() - 0.5;
        let lp = params.log_pdf(x).into_scalar() as f64;
        assert!((lp - expected).abs() < 1e-5);
    }

    #[test]
    fn scaled_density() {
        let device = burn::backend::ndarray::NdArrayDevice::Cpu;
        let params = NormalParams::<B, 1>::new(
            Tensor::from_floats([1.0], &device),
            Tensor::from_floats([4.0], &device),
        );
        let lp = params
            .log_pdf_elementwise(Tensor::from_floats([3.0], &device))
            .into_scalar() as f64;

        let expected = -0.5 * ((2.0 * PI).ln() + 4.0f64.ln() + 1.0);
        assert!((lp - expected).abs() < 1e-5);
    }

    #[test]
    fn sample_moments() {
        let device = burn::backend::ndarray::NdArrayDevice::Cpu;
        let params = NormalParams::<B, 2>::new(
            Tensor::ones([20_000, 1], &device).mul_scalar(3.0),
            Tensor::ones([20_000, 1], &device).mul_scalar(0.25),
        );
        let z = params.sample();
        let mean = z.clone().mean().into_scalar();
        let var = z.var(0).into_scalar();
        assert!((mean - 3.0).abs() < 0.05, "{mean}");
        assert!((var - 0.25).abs() < 0.05, "{var}");
    }

    #[test]
    fn log_sum_exp_is_stable() {
        let device = burn::backend::ndarray::NdArrayDevice::Cpu;
        let x = Tensor::<B, 2>::from_floats([[1000.0, 1000.0], [0.0, 2.0f32.ln()]], &device);
        let y = log_sum_exp(x, 1).into_data().value;

        assert_eq!(y.len(), 2);
        assert!((y[0] - (1000.0 + 2.0f32.ln())).abs() < 1e-3);
        assert!((y[1] - 3.0f32.ln()).abs() < 1e-5);
    }
}
