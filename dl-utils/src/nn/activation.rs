use std::str::FromStr;

use burn::{
    config::Config,
    module::Module,
    tensor::{activation, backend::Backend, Tensor},
};
use derive_new::new;

use super::Identity;

/// Slope used by [`LeakyRelu`] and [`XTanh`] when built from an [`ActivationConfig`].
pub const DEFAULT_SLOPE: f64 = 0.1;

macro_rules! impl_activation {
    ($name:ident, $fn:expr) => {
        #[derive(Debug, Module, Clone, Copy, new)]
        pub struct $name {}

        impl $name {
            pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
                $fn(x)
            }
        }
    };
}

impl_activation!(Sigmoid, activation::sigmoid);
impl_activation!(Tanh, activation::tanh);

/// `x` for positive inputs, `negative_slope * x` otherwise.
#[derive(Debug, Module, Clone, Copy, new)]
pub struct LeakyRelu {
    pub negative_slope: f64,
}

impl LeakyRelu {
    pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        let negative = activation::relu(x.clone().neg()).mul_scalar(self.negative_slope);
        activation::relu(x) - negative
    }
}

/// `tanh(x) + slope * x`.
#[derive(Debug, Module, Clone, Copy, new)]
pub struct XTanh {
    pub slope: f64,
}

impl XTanh {
    pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        activation::tanh(x.clone()) + x.mul_scalar(self.slope)
    }
}

#[derive(Debug, Config, Copy)]
pub enum ActivationConfig {
    LeakyRelu,
    XTanh,
    Sigmoid,
    Tanh,
    Identity,
}

impl ActivationConfig {
    pub fn init<D>(&self, _device: &D) -> Activation {
        match self {
            Self::LeakyRelu => Activation::LeakyRelu(LeakyRelu::new(DEFAULT_SLOPE)),
            Self::XTanh => Activation::XTanh(XTanh::new(DEFAULT_SLOPE)),
            Self::Sigmoid => Activation::Sigmoid(Sigmoid::new()),
            Self::Tanh => Activation::Tanh(Tanh::new()),
            Self::Identity => Activation::Identity(Identity::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::LeakyRelu => "lrelu",
            Self::XTanh => "xtanh",
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
            Self::Identity => "none",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown activation `{0}`, expected one of lrelu, xtanh, sigmoid, tanh, none")]
pub struct UnknownActivation(pub String);

impl FromStr for ActivationConfig {
    type Err = UnknownActivation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lrelu" => Ok(Self::LeakyRelu),
            "xtanh" => Ok(Self::XTanh),
            "sigmoid" => Ok(Self::Sigmoid),
            "tanh" => Ok(Self::Tanh),
            "none" => Ok(Self::Identity),
            other => Err(UnknownActivation(other.to_string())),
        }
    }
}

#[derive(Debug, Module, Clone)]
pub enum Activation {
    LeakyRelu(LeakyRelu),
    XTanh(XTanh),
    Sigmoid(Sigmoid),
    Tanh(Tanh),
    Identity(Identity),
}

impl Activation {
    pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Self::LeakyRelu(act) => act.forward(x),
            Self::XTanh(act) => act.forward(x),
            Self::Sigmoid(act) => act.forward(x),
            Self::Tanh(act) => act.forward(x),
            Self::Identity(act) => act.forward(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Tensor;

    type B = burn::backend::NdArray;

    fn apply(config: ActivationConfig, values: [f32; 4]) -> Vec<f32> {
        let device = burn::backend::ndarray::NdArrayDevice::Cpu;
        let x = Tensor::<B, 1>::from_floats(values, &device);
        config.init(&device).forward(x).into_data().value
    }

    fn assert_close(actual: &[f32], expected: &[f32]) {
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-5, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn leaky_relu() {
        let y = apply(ActivationConfig::LeakyRelu, [-2.0, -0.5, 0.0, 3.0]);
        assert_close(&y, &[-0.2, -0.05, 0.0, 3.0]);
    }

    #[test]
    fn xtanh() {
        let y = apply(ActivationConfig::XTanh, [-1.0, 0.0, 0.5, 2.0]);
        let expected = [-1.0f32, 0.0, 0.5, 2.0].map(|x| x.tanh() + 0.1 * x);
        assert_close(&y, &expected);
    }

    #[test]
    fn identity() {
        let y = apply(ActivationConfig::Identity, [-1.0, 0.0, 0.5, 2.0]);
        assert_close(&y, &[-1.0, 0.0, 0.5, 2.0]);
    }

    #[test]
    fn parse_names() {
        for config in [
            ActivationConfig::LeakyRelu,
            ActivationConfig::XTanh,
            ActivationConfig::Sigmoid,
            ActivationConfig::Tanh,
            ActivationConfig::Identity,
        ] {
            let parsed: ActivationConfig = config.name().parse().unwrap();
            assert_eq!(parsed.name(), config.name());
        }
        assert!("relu6".parse::<ActivationConfig>().is_err());
    }
}
