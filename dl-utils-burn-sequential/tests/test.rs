use burn::{
    module::Module,
    nn::{Linear, LinearConfig},
    tensor::{backend::Backend, Distribution, Tensor},
};
use dl_utils::nn::{Activation, ActivationConfig};
use dl_utils_burn_sequential::SequentialForward;

#[derive(Debug, Module, SequentialForward)]
#[dims(2, 2)]
pub struct Block<B: Backend> {
    linear: Linear<B>,
    act: Activation,
}

#[derive(Debug, Module, SequentialForward)]
#[dims(2, 2)]
#[res]
pub struct ResBlock<B: Backend> {
    linear: Linear<B>,
}

#[derive(Debug, Module, SequentialForward)]
#[dims(2, 2)]
struct MyModule<B: Backend> {
    blocks: Vec<Block<B>>,
    skip: Option<ResBlock<B>>,
    output: Linear<B>,
}

type B = burn::backend::NdArray;

fn config(with_skip: bool) -> MyModuleConfig {
    MyModuleConfig {
        blocks: vec![
            BlockConfig::new(LinearConfig::new(3, 8), ActivationConfig::LeakyRelu),
            BlockConfig::new(LinearConfig::new(8, 8), ActivationConfig::XTanh),
        ],
        skip: with_skip.then(|| ResBlockConfig::new(LinearConfig::new(8, 8))),
        output: LinearConfig::new(8, 2),
    }
}

#[test]
fn forward_shapes() {
    let device = burn::backend::ndarray::NdArrayDevice::Cpu;

    for with_skip in [false, true] {
        let net = config(with_skip).init::<B>(&device);
        assert_eq!(net.blocks.len(), 2);
        assert_eq!(net.skip.is_some(), with_skip);

        let x: Tensor<B, 2> = Tensor::random([5, 3], Distribution::Normal(0.0, 1.0), &device);
        assert_eq!(net.forward(x).dims(), [5, 2]);
    }
}

#[test]
fn init_with_restores_record() {
    let device = burn::backend::ndarray::NdArrayDevice::Cpu;
    let config = config(true);

    let net = config.init::<B>(&device);
    let net_with = config.init_with(net.clone().into_record(), &device);

    let x: Tensor<B, 2> = Tensor::random([4, 3], Distribution::Normal(0.0, 1.0), &device);
    let x1 = net.forward(x.clone()).into_data().value;
    let x2 = net_with.forward(x).into_data().value;

    assert_eq!(x1, x2);
}
