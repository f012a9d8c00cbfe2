use burn::{
    module::Module,
    nn::{Initializer, Linear, LinearConfig},
    tensor::backend::Backend,
};
use dl_utils::nn::{Activation, ActivationConfig};
use dl_utils_burn_sequential::SequentialForward;

#[derive(Debug, Module, SequentialForward)]
#[dims(2, 2)]
pub struct HiddenLayer<B: Backend> {
    linear: Linear<B>,
    act: Activation,
}

/// Fully connected network, activation after every layer but the last.
#[derive(Debug, Module, SequentialForward)]
#[dims(2, 2)]
pub struct Mlp<B: Backend> {
    hidden: Vec<HiddenLayer<B>>,
    output: Linear<B>,
}

fn xavier_linear(d_input: usize, d_output: usize) -> LinearConfig {
    LinearConfig::new(d_input, d_output).with_initializer(Initializer::XavierUniform { gain: 1.0 })
}

impl MlpConfig {
    /// `n_layers` linear maps in total; a single layer maps the input straight
    /// to the output.
    pub fn new2(
        input_dim: usize,
        output_dim: usize,
        hidden_dim: usize,
        n_layers: usize,
        act: ActivationConfig,
    ) -> Self {
        let hidden = (0..n_layers.saturating_sub(1))
            .map(|layer| {
                let d_input = if layer == 0 { input_dim } else { hidden_dim };
                HiddenLayerConfig::new(xavier_linear(d_input, hidden_dim), act)
            })
            .collect::<Vec<_>>();
        let d_input = if hidden.is_empty() { input_dim } else { hidden_dim };

        Self::new(hidden, xavier_linear(d_input, output_dim))
    }
}
