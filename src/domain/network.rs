// ============================================================
// Layer 3 — Network Configuration
// ============================================================
// The CNN topology as plain data: an ordered list of LayerSpec
// variants plus global hyperparameters. A NetworkConfig is
// validated once when it is created (or deserialised) and is
// never mutated afterwards.
//
// Default topology:
//
//   input 28×28×1
//     │  Convolution 5×5, 20 filters, stride 1   → 24×24×20
//     │  MaxPool 2×2, stride 2                   → 12×12×20
//     │  Convolution 5×5, 50 filters, stride 1   →  8× 8×50
//     │  MaxPool 2×2, stride 2                   →  4× 4×50
//     │  Dense 500, ReLU                         →  500
//     ▼  Output 10, softmax + negative log-likelihood
//
// Shapes use "valid" padding: out = (in - kernel) / stride + 1.

use serde::{Deserialize, Serialize};

use crate::domain::error::{DigitError, DigitResult};
use crate::domain::sample::{IMAGE_SIDE, NUM_CLASSES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Identity,
    Relu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolMode {
    Max,
}

/// Parameter initialisation scheme, scaled by fan-in / fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightInit {
    XavierUniform,
    XavierNormal,
    KaimingUniform,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    Convolution {
        kernel: usize,
        stride: usize,
        filters: usize,
        activation: Activation,
    },
    Pool {
        kernel: usize,
        stride: usize,
        mode: PoolMode,
    },
    Dense {
        units: usize,
        activation: Activation,
    },
    /// Final classification layer. Always softmax over `units`
    /// classes, trained with negative log-likelihood.
    Output { units: usize },
}

impl LayerSpec {
    fn is_spatial(&self) -> bool {
        matches!(self, LayerSpec::Convolution { .. } | LayerSpec::Pool { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl Default for InputShape {
    fn default() -> Self {
        Self { height: IMAGE_SIDE, width: IMAGE_SIDE, channels: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub seed: u64,
    pub learning_rate: f64,
    /// Nesterov momentum coefficient.
    pub momentum: f64,
    pub weight_init: WeightInit,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            seed: 1234,
            learning_rate: 0.006,
            momentum: 0.9,
            weight_init: WeightInit::XavierUniform,
        }
    }
}

/// Unvalidated wire form; only reachable through `TryFrom`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawNetworkConfig {
    input: InputShape,
    layers: Vec<LayerSpec>,
    hyper: Hyperparameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNetworkConfig", into = "RawNetworkConfig")]
pub struct NetworkConfig {
    input: InputShape,
    layers: Vec<LayerSpec>,
    hyper: Hyperparameters,
    /// Output shape [channels, height, width] after each spatial layer.
    spatial_shapes: Vec<[usize; 3]>,
}

impl NetworkConfig {
    pub fn new(
        input: InputShape,
        layers: Vec<LayerSpec>,
        hyper: Hyperparameters,
    ) -> DigitResult<Self> {
        validate_hyper(&hyper)?;
        let spatial_shapes = propagate(&input, &layers)?;
        Ok(Self { input, layers, hyper, spatial_shapes })
    }

    /// The fixed LeNet-style topology used by this system, with
    /// the given hyperparameters.
    pub fn lenet(hyper: Hyperparameters) -> DigitResult<Self> {
        Self::new(InputShape::default(), lenet_layers(), hyper)
    }

    pub fn input(&self) -> InputShape {
        self.input
    }

    pub fn layers(&self) -> &[LayerSpec] {
        &self.layers
    }

    pub fn hyper(&self) -> &Hyperparameters {
        &self.hyper
    }

    pub fn seed(&self) -> u64 {
        self.hyper.seed
    }

    /// Shapes [channels, height, width] produced by each
    /// Convolution / Pool layer, in order.
    pub fn spatial_shapes(&self) -> &[[usize; 3]] {
        &self.spatial_shapes
    }

    /// Length of the feature vector handed to the first dense layer.
    pub fn flattened_len(&self) -> usize {
        let [c, h, w] = self
            .spatial_shapes
            .last()
            .copied()
            .unwrap_or([self.input.channels, self.input.height, self.input.width]);
        c * h * w
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        // Shapes of the built-in topology, checked by test_default_matches_lenet.
        Self {
            input: InputShape::default(),
            layers: lenet_layers(),
            hyper: Hyperparameters::default(),
            spatial_shapes: vec![[20, 24, 24], [20, 12, 12], [50, 8, 8], [50, 4, 4]],
        }
    }
}

impl TryFrom<RawNetworkConfig> for NetworkConfig {
    type Error = DigitError;

    fn try_from(raw: RawNetworkConfig) -> DigitResult<Self> {
        Self::new(raw.input, raw.layers, raw.hyper)
    }
}

impl From<NetworkConfig> for RawNetworkConfig {
    fn from(cfg: NetworkConfig) -> Self {
        Self { input: cfg.input, layers: cfg.layers, hyper: cfg.hyper }
    }
}

fn lenet_layers() -> Vec<LayerSpec> {
    vec![
        LayerSpec::Convolution { kernel: 5, stride: 1, filters: 20, activation: Activation::Identity },
        LayerSpec::Pool { kernel: 2, stride: 2, mode: PoolMode::Max },
        LayerSpec::Convolution { kernel: 5, stride: 1, filters: 50, activation: Activation::Identity },
        LayerSpec::Pool { kernel: 2, stride: 2, mode: PoolMode::Max },
        LayerSpec::Dense { units: 500, activation: Activation::Relu },
        LayerSpec::Output { units: NUM_CLASSES },
    ]
}

fn validate_hyper(hyper: &Hyperparameters) -> DigitResult<()> {
    if !hyper.learning_rate.is_finite() || hyper.learning_rate <= 0.0 {
        return Err(DigitError::Configuration(format!(
            "learning rate must be a positive number, got {}",
            hyper.learning_rate
        )));
    }
    if !(0.0..1.0).contains(&hyper.momentum) {
        return Err(DigitError::Configuration(format!(
            "momentum must be in [0, 1), got {}",
            hyper.momentum
        )));
    }
    Ok(())
}

/// Walk the layer list, checking ordering rules and computing the
/// output shape of every spatial layer.
fn propagate(input: &InputShape, layers: &[LayerSpec]) -> DigitResult<Vec<[usize; 3]>> {
    let bad = |msg: String| Err(DigitError::Configuration(msg));

    if input.channels != 1 {
        return bad(format!("input must have 1 channel, got {}", input.channels));
    }
    if input.height != IMAGE_SIDE || input.width != IMAGE_SIDE {
        return bad(format!(
            "input must be {IMAGE_SIDE}×{IMAGE_SIDE}, got {}×{}",
            input.height, input.width
        ));
    }
    let Some(last) = layers.last() else {
        return bad("layer list is empty".to_string());
    };
    let outputs = layers.iter().filter(|l| matches!(l, LayerSpec::Output { .. })).count();
    if outputs != 1 || !matches!(last, LayerSpec::Output { .. }) {
        return bad("layer list must end in exactly one Output layer".to_string());
    }

    let mut shapes = Vec::new();
    let [mut c, mut h, mut w] = [input.channels, input.height, input.width];
    let mut flattened = false;

    for (i, layer) in layers.iter().enumerate() {
        if layer.is_spatial() && flattened {
            return bad(format!("layer {i}: spatial layer after a dense layer"));
        }
        match *layer {
            LayerSpec::Convolution { kernel, stride, filters, .. } => {
                if kernel == 0 || stride == 0 || filters == 0 {
                    return bad(format!("layer {i}: kernel, stride and filters must be > 0"));
                }
                (h, w) = shrink(i, h, w, kernel, stride)?;
                c = filters;
                shapes.push([c, h, w]);
            }
            LayerSpec::Pool { kernel, stride, .. } => {
                if kernel == 0 || stride == 0 {
                    return bad(format!("layer {i}: kernel and stride must be > 0"));
                }
                (h, w) = shrink(i, h, w, kernel, stride)?;
                shapes.push([c, h, w]);
            }
            LayerSpec::Dense { units, .. } => {
                if units == 0 {
                    return bad(format!("layer {i}: dense layer needs at least one unit"));
                }
                flattened = true;
            }
            LayerSpec::Output { units } => {
                if units != NUM_CLASSES {
                    return bad(format!(
                        "output layer has {units} units but there are {NUM_CLASSES} labels"
                    ));
                }
            }
        }
    }
    Ok(shapes)
}

fn shrink(i: usize, h: usize, w: usize, kernel: usize, stride: usize) -> DigitResult<(usize, usize)> {
    if kernel > h || kernel > w {
        return Err(DigitError::Configuration(format!(
            "layer {i}: kernel {kernel} larger than its {h}×{w} input"
        )));
    }
    Ok(((h - kernel) / stride + 1, (w - kernel) / stride + 1))
}
