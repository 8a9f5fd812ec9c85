// ============================================================
// Layer 5 — Convolutional Digit Model
// ============================================================
// Turns a validated NetworkConfig into burn modules:
//
//   Convolution / Pool  → FeatureBlock  (on [N, C, H, W])
//   flatten             → [N, C·H·W]
//   Dense               → DenseBlock
//   Output              → Linear producing raw logits [N, 10]
//
// Softmax is not part of the forward pass: training feeds logits
// to CrossEntropyLoss (softmax + negative log-likelihood) and the
// predictor applies softmax itself when probabilities are asked for.

use std::sync::Mutex;

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Initializer, Linear, LinearConfig, Relu,
    },
    prelude::*,
};

use crate::domain::network::{Activation, LayerSpec, NetworkConfig, PoolMode, WeightInit};

/// One Convolution or Pool layer. Exactly one of `conv` / `pool` is set.
#[derive(Module, Debug)]
pub struct FeatureBlock<B: Backend> {
    conv: Option<Conv2d<B>>,
    pool: Option<MaxPool2d>,
    activation: Option<Relu>,
}

impl<B: Backend> FeatureBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.conv {
            Some(conv) => conv.forward(x),
            None => x,
        };
        let x = match &self.pool {
            Some(pool) => pool.forward(x),
            None => x,
        };
        match &self.activation {
            Some(relu) => relu.forward(x),
            None => x,
        }
    }
}

#[derive(Module, Debug)]
pub struct DenseBlock<B: Backend> {
    linear: Linear<B>,
    activation: Option<Relu>,
}

impl<B: Backend> DenseBlock<B> {
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.linear.forward(x);
        match &self.activation {
            Some(relu) => relu.forward(x),
            None => x,
        }
    }
}

#[derive(Module, Debug)]
pub struct DigitModel<B: Backend> {
    features: Vec<FeatureBlock<B>>,
    dense: Vec<DenseBlock<B>>,
    output: Linear<B>,
}

impl<B: Backend> DigitModel<B> {
    /// Allocate the modules described by `config`. Parameters are
    /// initialised lazily by burn; use [`ModelBuilder::build`] for a
    /// seeded, fully materialised model.
    pub fn init(config: &NetworkConfig, device: &B::Device) -> Self {
        let initializer = initializer(config.hyper().weight_init);

        let mut channels = config.input().channels;
        let mut features = Vec::new();
        let mut dense = Vec::new();
        let mut units = config.flattened_len();
        let mut output = None;

        for layer in config.layers() {
            match *layer {
                LayerSpec::Convolution { kernel, stride, filters, activation } => {
                    let conv = Conv2dConfig::new([channels, filters], [kernel, kernel])
                        .with_stride([stride, stride])
                        .with_initializer(initializer.clone())
                        .init(device);
                    channels = filters;
                    features.push(FeatureBlock {
                        conv: Some(conv),
                        pool: None,
                        activation: relu(activation),
                    });
                }
                LayerSpec::Pool { kernel, stride, mode: PoolMode::Max } => {
                    let pool = MaxPool2dConfig::new([kernel, kernel])
                        .with_strides([stride, stride])
                        .init();
                    features.push(FeatureBlock { conv: None, pool: Some(pool), activation: None });
                }
                LayerSpec::Dense { units: out, activation } => {
                    let linear = LinearConfig::new(units, out)
                        .with_initializer(initializer.clone())
                        .init(device);
                    units = out;
                    dense.push(DenseBlock { linear, activation: relu(activation) });
                }
                LayerSpec::Output { units: classes } => {
                    output = Some(
                        LinearConfig::new(units, classes)
                            .with_initializer(initializer.clone())
                            .init(device),
                    );
                }
            }
        }

        // NetworkConfig guarantees a trailing Output layer.
        let output = output.unwrap_or_else(|| {
            LinearConfig::new(units, crate::domain::sample::NUM_CLASSES)
                .with_initializer(initializer)
                .init(device)
        });

        Self { features, dense, output }
    }

    /// images: [N, 1, 28, 28] → logits: [N, 10]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = images;
        for block in &self.features {
            x = block.forward(x);
        }

        let [batch, c, h, w] = x.dims();
        let mut x = x.reshape([batch, c * h * w]);
        for block in &self.dense {
            x = block.forward(x);
        }
        self.output.forward(x)
    }

    /// Class probabilities: softmax over the logits. Shape [N, 10].
    pub fn probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        burn::tensor::activation::softmax(self.forward(images), 1)
    }
}

fn relu(activation: Activation) -> Option<Relu> {
    match activation {
        Activation::Relu => Some(Relu::new()),
        Activation::Identity => None,
    }
}

fn initializer(scheme: WeightInit) -> Initializer {
    match scheme {
        WeightInit::XavierUniform => Initializer::XavierUniform { gain: 1.0 },
        WeightInit::XavierNormal => Initializer::XavierNormal { gain: 1.0 },
        WeightInit::KaimingUniform => Initializer::KaimingUniform {
            gain: std::f64::consts::SQRT_2,
            fan_out_only: false,
        },
    }
}

// ─── ModelBuilder ─────────────────────────────────────────────────────────────
// Backends draw initial weights from one process-wide RNG, and burn
// materialises parameters on first use. Seeding and materialising
// therefore happen together under this lock, so two builds with the
// same seed see the same random stream even when run concurrently.
static BUILD_LOCK: Mutex<()> = Mutex::new(());

pub struct ModelBuilder;

impl ModelBuilder {
    /// Untrained model with every parameter initialised from
    /// `config.seed()`.
    pub fn build<B: Backend>(config: &NetworkConfig, device: &B::Device) -> DigitModel<B> {
        // A poisoned lock only means another build panicked; the
        // guarded state is the backend RNG, which is reseeded below.
        let _guard = BUILD_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        B::seed(config.seed());
        let model = DigitModel::<B>::init(config, device);

        let input = config.input();
        let warmup = Tensor::<B, 4>::zeros([1, input.channels, input.height, input.width], device);
        let _ = model.forward(warmup);

        tracing::debug!(
            "Built model: {} feature blocks, {} dense blocks, {} parameters (seed {})",
            model.features.len(),
            model.dense.len(),
            model.num_params(),
            config.seed()
        );
        model
    }
}
