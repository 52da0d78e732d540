//! Reconstruction model: a small dense autoencoder trained with Adam.
//!
//! Encoder: 6 -> 8 (ReLU) -> 3 (ReLU). Decoder: 3 -> 8 (ReLU) -> 6 (linear).
//! Trained end-to-end on mean squared reconstruction error.

use nalgebra::{DMatrix, DVector};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::analysis::features::FEATURE_COUNT;

pub const HIDDEN_UNITS: usize = 8;
pub const LATENT_UNITS: usize = 3;

/// Number of layers belonging to the encoder half.
const ENCODER_DEPTH: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Relu,
    Linear,
}

impl Activation {
    fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Linear => x,
        }
    }

    fn derivative(self, pre: f64) -> f64 {
        match self {
            Activation::Relu => {
                if pre > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Linear => 1.0,
        }
    }
}

/// Fully connected layer; `weights` is `outputs x inputs`.
#[derive(Debug, Clone)]
pub struct Dense {
    weights: DMatrix<f64>,
    bias: DVector<f64>,
    activation: Activation,
}

impl Dense {
    /// Glorot-uniform kernel, zero bias.
    fn new<R: Rng + ?Sized>(
        inputs: usize,
        outputs: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        let limit = (6.0 / (inputs + outputs) as f64).sqrt();
        Self {
            weights: DMatrix::from_fn(outputs, inputs, |_, _| rng.gen_range(-limit..limit)),
            bias: DVector::zeros(outputs),
            activation,
        }
    }

    /// Returns (pre-activation, post-activation).
    fn forward(&self, input: &DVector<f64>) -> (DVector<f64>, DVector<f64>) {
        let pre = &self.weights * input + &self.bias;
        let post = pre.map(|z| self.activation.apply(z));
        (pre, post)
    }

    fn param_count(&self) -> usize {
        self.weights.len() + self.bias.len()
    }
}

/// Accumulated gradients for one layer.
#[derive(Debug, Clone)]
struct LayerGrad {
    weights: DMatrix<f64>,
    bias: DVector<f64>,
}

impl LayerGrad {
    fn zeros(layer: &Dense) -> Self {
        Self {
            weights: DMatrix::zeros(layer.weights.nrows(), layer.weights.ncols()),
            bias: DVector::zeros(layer.bias.len()),
        }
    }

    fn clear(&mut self) {
        self.weights.fill(0.0);
        self.bias.fill(0.0);
    }
}

/// First and second moment estimates for one layer.
#[derive(Debug, Clone)]
struct Moments {
    m_weights: DMatrix<f64>,
    v_weights: DMatrix<f64>,
    m_bias: DVector<f64>,
    v_bias: DVector<f64>,
}

impl Moments {
    fn zeros(layer: &Dense) -> Self {
        let (rows, cols) = layer.weights.shape();
        Self {
            m_weights: DMatrix::zeros(rows, cols),
            v_weights: DMatrix::zeros(rows, cols),
            m_bias: DVector::zeros(layer.bias.len()),
            v_bias: DVector::zeros(layer.bias.len()),
        }
    }
}

/// One bias-corrected Adam step over a parameter tensor, in place.
macro_rules! adam_step {
    ($param:expr, $grad:expr, $m:expr, $v:expr, $hyper:expr) => {{
        let (lr, beta1, beta2, eps, bc1, bc2) = $hyper;
        $m = &$m * beta1 + $grad * (1.0 - beta1);
        $v = &$v * beta2 + $grad.component_mul($grad) * (1.0 - beta2);
        $param -= $m.zip_map(&$v, |m, v| lr * (m / bc1) / ((v / bc2).sqrt() + eps));
    }};
}

/// Adam optimizer with per-parameter first and second moment estimates.
#[derive(Debug)]
struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    step: i32,
    state: Vec<Moments>,
}

impl Adam {
    fn new(learning_rate: f64, layers: &[Dense]) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            step: 0,
            state: layers.iter().map(Moments::zeros).collect(),
        }
    }

    fn apply(&mut self, layers: &mut [Dense], grads: &[LayerGrad]) {
        self.step = self.step.saturating_add(1);
        let bc1 = 1.0 - self.beta1.powi(self.step);
        let bc2 = 1.0 - self.beta2.powi(self.step);
        let hyper = (self.learning_rate, self.beta1, self.beta2, self.epsilon, bc1, bc2);

        for ((layer, grad), mo) in layers.iter_mut().zip(grads).zip(self.state.iter_mut()) {
            adam_step!(layer.weights, &grad.weights, mo.m_weights, mo.v_weights, hyper);
            adam_step!(layer.bias, &grad.bias, mo.m_bias, mo.v_bias, hyper);
        }
    }
}

/// Optimization settings for [`Autoencoder::fit`].
#[derive(Debug, Clone, Copy)]
pub struct TrainingParams {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 32,
            learning_rate: 0.01,
        }
    }
}

/// Summary of a completed fit.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub epochs: usize,
    pub samples: usize,
    /// Mean per-sample MSE over the last epoch. `None` if nothing was fitted.
    pub final_loss: Option<f64>,
}

/// Encoder/decoder pair over normalized feature vectors.
#[derive(Debug, Clone)]
pub struct Autoencoder {
    layers: Vec<Dense>,
}

fn column(x: &[f64]) -> DVector<f64> {
    DVector::from_vec(x.to_vec())
}

fn to_array<const N: usize>(v: &DVector<f64>) -> [f64; N] {
    let mut out = [0.0; N];
    out.copy_from_slice(v.as_slice());
    out
}

impl Autoencoder {
    /// Build a freshly initialized, untrained network.
    pub fn new<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let layers = vec![
            Dense::new(FEATURE_COUNT, HIDDEN_UNITS, Activation::Relu, rng),
            Dense::new(HIDDEN_UNITS, LATENT_UNITS, Activation::Relu, rng),
            Dense::new(LATENT_UNITS, HIDDEN_UNITS, Activation::Relu, rng),
            Dense::new(HIDDEN_UNITS, FEATURE_COUNT, Activation::Linear, rng),
        ];
        Self { layers }
    }

    pub fn param_count(&self) -> usize {
        self.layers.iter().map(Dense::param_count).sum()
    }

    fn run(layers: &[Dense], input: DVector<f64>) -> DVector<f64> {
        layers.iter().fold(input, |x, layer| layer.forward(&x).1)
    }

    /// Compress a normalized vector into the latent representation.
    pub fn encode(&self, input: &[f64; FEATURE_COUNT]) -> [f64; LATENT_UNITS] {
        let latent = Self::run(&self.layers[..ENCODER_DEPTH], column(input));
        to_array(&latent)
    }

    /// Expand a latent representation back to feature space.
    pub fn decode(&self, latent: &[f64; LATENT_UNITS]) -> [f64; FEATURE_COUNT] {
        let out = Self::run(&self.layers[ENCODER_DEPTH..], column(latent));
        to_array(&out)
    }

    pub fn reconstruct(&self, input: &[f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
        to_array(&Self::run(&self.layers, column(input)))
    }

    /// Mean per-sample reconstruction MSE over `data`.
    pub fn loss(&self, data: &[[f64; FEATURE_COUNT]]) -> f64 {
        if data.is_empty() {
            return 0.0;
        }
        let total: f64 = data
            .iter()
            .map(|x| {
                let x = column(x);
                (Self::run(&self.layers, x.clone()) - x).norm_squared() / FEATURE_COUNT as f64
            })
            .sum();
        total / data.len() as f64
    }

    /// Fit on `data` for `params.epochs` passes of shuffled mini-batches.
    pub fn fit<R: Rng + ?Sized>(
        &mut self,
        data: &[[f64; FEATURE_COUNT]],
        params: &TrainingParams,
        rng: &mut R,
    ) -> TrainingReport {
        let batch_size = params.batch_size.max(1);
        let mut optimizer = Adam::new(params.learning_rate, &self.layers);
        let mut grads: Vec<LayerGrad> = self.layers.iter().map(LayerGrad::zeros).collect();
        let samples: Vec<DVector<f64>> = data.iter().map(|x| column(x)).collect();
        let mut order: Vec<usize> = (0..samples.len()).collect();
        let mut final_loss = None;

        for epoch in 0..params.epochs {
            order.shuffle(rng);
            let mut epoch_loss = 0.0;

            for batch in order.chunks(batch_size) {
                grads.iter_mut().for_each(LayerGrad::clear);
                for &idx in batch {
                    epoch_loss += self.backprop(&samples[idx], batch.len(), &mut grads);
                }
                optimizer.apply(&mut self.layers, &grads);
            }

            if !samples.is_empty() {
                let mean = epoch_loss / samples.len() as f64;
                debug!(epoch = epoch + 1, loss = mean, "epoch complete");
                final_loss = Some(mean);
            }
        }

        TrainingReport {
            epochs: params.epochs,
            samples: samples.len(),
            final_loss,
        }
    }

    /// Add the gradient of one sample's share of the batch loss to `grads`.
    /// Returns that sample's MSE.
    fn backprop(&self, input: &DVector<f64>, batch_len: usize, grads: &mut [LayerGrad]) -> f64 {
        let mut activations: Vec<DVector<f64>> = Vec::with_capacity(self.layers.len() + 1);
        let mut pres: Vec<DVector<f64>> = Vec::with_capacity(self.layers.len());
        activations.push(input.clone());
        for layer in &self.layers {
            let (pre, post) = layer.forward(&activations[activations.len() - 1]);
            pres.push(pre);
            activations.push(post);
        }

        let residual = &activations[self.layers.len()] - input;
        let mse = residual.norm_squared() / FEATURE_COUNT as f64;

        // d(batch mean MSE)/d(output)
        let mut upstream = residual * (2.0 / (batch_len * FEATURE_COUNT) as f64);

        for l in (0..self.layers.len()).rev() {
            let layer = &self.layers[l];
            let delta = upstream.zip_map(&pres[l], |g, z| g * layer.activation.derivative(z));

            grads[l].weights += &delta * activations[l].transpose();
            grads[l].bias += &delta;

            if l > 0 {
                upstream = layer.weights.tr_mul(&delta);
            }
        }

        mse
    }
}
