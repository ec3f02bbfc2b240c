//! Fusion network
//!
//! Feed-forward ranker over concatenated `[student ‖ course]` embeddings:
//!
//! ```text
//! Linear(in,128) → ReLU → BatchNorm → Dropout(0.3)
//! Linear(128,64) → ReLU → BatchNorm → Dropout(0.3)
//! Linear(64,32)  → ReLU
//! Linear(32,1)
//! ```
//!
//! Trained with binary cross-entropy on logits and Adam. Backpropagation is
//! written out by hand over `ndarray` matrices, one row per sample.

use anyhow::{bail, Context, Result};
use ndarray::{Array1, Array2, ArrayViewD, ArrayViewMutD, Axis};
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::BTreeMap;

pub const HIDDEN_DIMS: [usize; 3] = [128, 64, 32];
pub const DROPOUT_RATE: f32 = 0.3;
const BN_MOMENTUM: f32 = 0.1;
const BN_EPSILON: f32 = 1e-5;

/// Whether a forward pass uses batch statistics and dropout
pub enum Mode<'a> {
    Train(&'a mut StdRng),
    Eval,
}

/// Fully connected layer, `y = x Wᵀ + b`
#[derive(Debug, Clone, PartialEq)]
pub struct Linear {
    /// [out_features x in_features]
    pub weight: Array2<f32>,
    pub bias: Array1<f32>,
}

impl Linear {
    /// Xavier-uniform weights, zero bias
    pub fn new(in_features: usize, out_features: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (in_features + out_features) as f32).sqrt();
        let weight =
            Array2::from_shape_fn((out_features, in_features), |_| rng.gen_range(-limit..limit));
        Self {
            weight,
            bias: Array1::zeros(out_features),
        }
    }

    pub fn in_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn out_features(&self) -> usize {
        self.weight.nrows()
    }

    fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        x.dot(&self.weight.t()) + &self.bias
    }

    /// Returns (dW, db, dx)
    fn backward(
        &self,
        x: &Array2<f32>,
        grad: &Array2<f32>,
    ) -> (Array2<f32>, Array1<f32>, Array2<f32>) {
        let dw = grad.t().dot(x);
        let db = grad.sum_axis(Axis(0));
        let dx = grad.dot(&self.weight);
        (dw, db, dx)
    }
}

/// Batch normalization over the sample axis with running statistics
#[derive(Debug, Clone, PartialEq)]
pub struct BatchNorm1d {
    /// Scale (gamma)
    pub weight: Array1<f32>,
    /// Shift (beta)
    pub bias: Array1<f32>,
    pub running_mean: Array1<f32>,
    pub running_var: Array1<f32>,
}

struct BatchNormCache {
    normalized: Array2<f32>,
    inv_std: Array1<f32>,
    batch_mean: Array1<f32>,
    batch_var_unbiased: Array1<f32>,
}

impl BatchNorm1d {
    pub fn new(features: usize) -> Self {
        Self {
            weight: Array1::ones(features),
            bias: Array1::zeros(features),
            running_mean: Array1::zeros(features),
            running_var: Array1::ones(features),
        }
    }

    pub fn features(&self) -> usize {
        self.weight.len()
    }

    fn forward_eval(&self, x: &Array2<f32>) -> Array2<f32> {
        let inv_std = self.running_var.mapv(|v| 1.0 / (v + BN_EPSILON).sqrt());
        (x - &self.running_mean) * &inv_std * &self.weight + &self.bias
    }

    fn forward_train(&self, x: &Array2<f32>) -> (Array2<f32>, BatchNormCache) {
        let n = x.nrows() as f32;
        let mean = x.sum_axis(Axis(0)) / n;
        let centered = x - &mean;
        let var = (&centered * &centered).sum_axis(Axis(0)) / n;
        let inv_std = var.mapv(|v| 1.0 / (v + BN_EPSILON).sqrt());
        let normalized = &centered * &inv_std;
        let out = &normalized * &self.weight + &self.bias;

        let unbiased = if n > 1.0 { &var * (n / (n - 1.0)) } else { var.clone() };

        (
            out,
            BatchNormCache {
                normalized,
                inv_std,
                batch_mean: mean,
                batch_var_unbiased: unbiased,
            },
        )
    }

    fn update_running(&mut self, cache: &BatchNormCache) {
        self.running_mean =
            &self.running_mean * (1.0 - BN_MOMENTUM) + &cache.batch_mean * BN_MOMENTUM;
        self.running_var =
            &self.running_var * (1.0 - BN_MOMENTUM) + &cache.batch_var_unbiased * BN_MOMENTUM;
    }

    /// Returns (dgamma, dbeta, dx)
    fn backward(
        &self,
        cache: &BatchNormCache,
        grad: &Array2<f32>,
    ) -> (Array1<f32>, Array1<f32>, Array2<f32>) {
        let n = grad.nrows() as f32;
        let dgamma = (grad * &cache.normalized).sum_axis(Axis(0));
        let dbeta = grad.sum_axis(Axis(0));

        let dnorm = grad * &self.weight;
        let sum_dnorm = dnorm.sum_axis(Axis(0));
        let sum_dnorm_norm = (&dnorm * &cache.normalized).sum_axis(Axis(0));

        let dx =
            (&dnorm * n - &sum_dnorm - &cache.normalized * &sum_dnorm_norm) * &cache.inv_std / n;
        (dgamma, dbeta, dx)
    }
}

fn relu(x: &Array2<f32>) -> Array2<f32> {
    x.mapv(|v| v.max(0.0))
}

fn relu_backward(pre_activation: &Array2<f32>, grad: &Array2<f32>) -> Array2<f32> {
    let mut out = grad.clone();
    out.zip_mut_with(pre_activation, |g, &z| {
        if z <= 0.0 {
            *g = 0.0;
        }
    });
    out
}

fn dropout_mask(shape: (usize, usize), rate: f32, rng: &mut StdRng) -> Array2<f32> {
    let scale = 1.0 / (1.0 - rate);
    Array2::from_shape_fn(shape, |_| if rng.gen::<f32>() < rate { 0.0 } else { scale })
}

/// Mean binary cross-entropy on logits and its gradient w.r.t. the logits
pub fn bce_with_logits(logits: &Array1<f32>, labels: &Array1<f32>) -> (f32, Array1<f32>) {
    let n = logits.len().max(1) as f32;
    let mut loss = 0.0;
    let mut grad = Array1::<f32>::zeros(logits.len());

    for (i, (&z, &y)) in logits.iter().zip(labels.iter()).enumerate() {
        loss += z.max(0.0) - z * y + (-z.abs()).exp().ln_1p();
        let p = 1.0 / (1.0 + (-z).exp());
        grad[i] = (p - y) / n;
    }

    (loss / n, grad)
}

/// Per-block activations kept for backpropagation
struct ForwardCache {
    input: Array2<f32>,
    z0: Array2<f32>,
    bn0: BatchNormCache,
    mask0: Array2<f32>,
    h0: Array2<f32>,
    z1: Array2<f32>,
    bn1: BatchNormCache,
    mask1: Array2<f32>,
    h1: Array2<f32>,
    z2: Array2<f32>,
    a2: Array2<f32>,
}

struct Gradients {
    linear: [(Array2<f32>, Array1<f32>); 4],
    norm: [(Array1<f32>, Array1<f32>); 2],
}

/// Fusion MLP
#[derive(Debug, Clone, PartialEq)]
pub struct FusionNetwork {
    linear: [Linear; 4],
    norm: [BatchNorm1d; 2],
}

/// Sequential positions of the parameterized layers
const LINEAR_KEYS: [usize; 4] = [0, 4, 8, 10];
const NORM_KEYS: [usize; 2] = [2, 6];

impl FusionNetwork {
    pub fn new(input_dim: usize, rng: &mut StdRng) -> Self {
        let [h0, h1, h2] = HIDDEN_DIMS;
        Self {
            linear: [
                Linear::new(input_dim, h0, rng),
                Linear::new(h0, h1, rng),
                Linear::new(h1, h2, rng),
                Linear::new(h2, 1, rng),
            ],
            norm: [BatchNorm1d::new(h0), BatchNorm1d::new(h1)],
        }
    }

    pub fn input_dim(&self) -> usize {
        self.linear[0].in_features()
    }

    /// Raw logits, one per input row
    pub fn forward(&self, inputs: &Array2<f32>, mode: Mode<'_>) -> Array1<f32> {
        match mode {
            Mode::Eval => self.forward_eval(inputs),
            Mode::Train(rng) => {
                let (logits, _) = self.forward_train(inputs, rng);
                logits
            }
        }
    }

    fn forward_eval(&self, inputs: &Array2<f32>) -> Array1<f32> {
        let h0 = self.norm[0].forward_eval(&relu(&self.linear[0].forward(inputs)));
        let h1 = self.norm[1].forward_eval(&relu(&self.linear[1].forward(&h0)));
        let a2 = relu(&self.linear[2].forward(&h1));
        self.linear[3].forward(&a2).column(0).to_owned()
    }

    fn forward_train(
        &self,
        inputs: &Array2<f32>,
        rng: &mut StdRng,
    ) -> (Array1<f32>, ForwardCache) {
        let z0 = self.linear[0].forward(inputs);
        let (n0, bn0) = self.norm[0].forward_train(&relu(&z0));
        let mask0 = dropout_mask(n0.dim(), DROPOUT_RATE, rng);
        let h0 = &n0 * &mask0;

        let z1 = self.linear[1].forward(&h0);
        let (n1, bn1) = self.norm[1].forward_train(&relu(&z1));
        let mask1 = dropout_mask(n1.dim(), DROPOUT_RATE, rng);
        let h1 = &n1 * &mask1;

        let z2 = self.linear[2].forward(&h1);
        let a2 = relu(&z2);
        let logits = self.linear[3].forward(&a2).column(0).to_owned();

        (
            logits,
            ForwardCache {
                input: inputs.clone(),
                z0,
                bn0,
                mask0,
                h0,
                z1,
                bn1,
                mask1,
                h1,
                z2,
                a2,
            },
        )
    }

    fn backward(&self, cache: &ForwardCache, dlogits: &Array1<f32>) -> Gradients {
        let d3 = dlogits.clone().insert_axis(Axis(1));
        let (dw3, db3, da2) = self.linear[3].backward(&cache.a2, &d3);

        let dz2 = relu_backward(&cache.z2, &da2);
        let (dw2, db2, dh1) = self.linear[2].backward(&cache.h1, &dz2);

        let dn1 = &dh1 * &cache.mask1;
        let (dg1, dbeta1, da1) = self.norm[1].backward(&cache.bn1, &dn1);
        let dz1 = relu_backward(&cache.z1, &da1);
        let (dw1, db1, dh0) = self.linear[1].backward(&cache.h0, &dz1);

        let dn0 = &dh0 * &cache.mask0;
        let (dg0, dbeta0, da0) = self.norm[0].backward(&cache.bn0, &dn0);
        let dz0 = relu_backward(&cache.z0, &da0);
        let (dw0, db0, _) = self.linear[0].backward(&cache.input, &dz0);

        Gradients {
            linear: [(dw0, db0), (dw1, db1), (dw2, db2), (dw3, db3)],
            norm: [(dg0, dbeta0), (dg1, dbeta1)],
        }
    }

    /// One optimization step on a mini-batch; returns the batch loss
    pub fn train_batch(
        &mut self,
        inputs: &Array2<f32>,
        labels: &Array1<f32>,
        optimizer: &mut Adam,
        rng: &mut StdRng,
    ) -> Result<f32> {
        if inputs.nrows() < 2 {
            bail!("Batch normalization needs at least 2 samples, got {}", inputs.nrows());
        }
        if inputs.ncols() != self.input_dim() {
            bail!(
                "Input width {} does not match network input {}",
                inputs.ncols(),
                self.input_dim()
            );
        }

        let (logits, cache) = self.forward_train(inputs, rng);
        let (loss, dlogits) = bce_with_logits(&logits, labels);
        let grads = self.backward(&cache, &dlogits);

        self.norm[0].update_running(&cache.bn0);
        self.norm[1].update_running(&cache.bn1);

        let mut params: Vec<(ArrayViewMutD<'_, f32>, ArrayViewD<'_, f32>)> =
            Vec::with_capacity(12);
        let (linear, norm) = (&mut self.linear, &mut self.norm);
        for (layer, (dw, db)) in linear.iter_mut().zip(grads.linear.iter()) {
            params.push((layer.weight.view_mut().into_dyn(), dw.view().into_dyn()));
            params.push((layer.bias.view_mut().into_dyn(), db.view().into_dyn()));
        }
        for (layer, (dg, dbeta)) in norm.iter_mut().zip(grads.norm.iter()) {
            params.push((layer.weight.view_mut().into_dyn(), dg.view().into_dyn()));
            params.push((layer.bias.view_mut().into_dyn(), dbeta.view().into_dyn()));
        }
        optimizer.step(params);

        Ok(loss)
    }

    /// Parameters and buffers keyed by layer name, e.g. `network.0.weight`
    pub fn state_dict(&self) -> BTreeMap<String, (Vec<usize>, Vec<f32>)> {
        let mut state = BTreeMap::new();

        for (layer, key) in self.linear.iter().zip(LINEAR_KEYS) {
            state.insert(
                format!("network.{}.weight", key),
                (layer.weight.shape().to_vec(), layer.weight.iter().copied().collect()),
            );
            state.insert(
                format!("network.{}.bias", key),
                (layer.bias.shape().to_vec(), layer.bias.to_vec()),
            );
        }

        for (layer, key) in self.norm.iter().zip(NORM_KEYS) {
            for (name, values) in [
                ("weight", &layer.weight),
                ("bias", &layer.bias),
                ("running_mean", &layer.running_mean),
                ("running_var", &layer.running_var),
            ] {
                state.insert(
                    format!("network.{}.{}", key, name),
                    (vec![values.len()], values.to_vec()),
                );
            }
        }

        state
    }

    /// Rebuild from a state dict produced by [`FusionNetwork::state_dict`]
    pub fn from_state_dict(state: &BTreeMap<String, (Vec<usize>, Vec<f32>)>) -> Result<Self> {
        let matrix = |key: String| -> Result<Array2<f32>> {
            let (shape, data) = state
                .get(&key)
                .with_context(|| format!("Missing tensor '{}'", key))?;
            if shape.len() != 2 {
                bail!("Tensor '{}' has rank {}, expected 2", key, shape.len());
            }
            Array2::from_shape_vec((shape[0], shape[1]), data.clone())
                .with_context(|| format!("Failed to reconstruct '{}'", key))
        };
        let vector = |key: String, len: usize| -> Result<Array1<f32>> {
            let (_, data) = state
                .get(&key)
                .with_context(|| format!("Missing tensor '{}'", key))?;
            if data.len() != len {
                bail!("Tensor '{}' has {} values, expected {}", key, data.len(), len);
            }
            Ok(Array1::from_vec(data.clone()))
        };

        let mut linear = Vec::with_capacity(4);
        for key in LINEAR_KEYS {
            let weight = matrix(format!("network.{}.weight", key))?;
            let bias = vector(format!("network.{}.bias", key), weight.nrows())?;
            linear.push(Linear { weight, bias });
        }

        for pair in linear.windows(2) {
            if pair[0].out_features() != pair[1].in_features() {
                bail!(
                    "Layer widths do not chain: {} -> {}",
                    pair[0].out_features(),
                    pair[1].in_features()
                );
            }
        }

        let mut norm = Vec::with_capacity(2);
        let norm_widths = [linear[0].out_features(), linear[1].out_features()];
        for (key, features) in NORM_KEYS.into_iter().zip(norm_widths) {
            norm.push(BatchNorm1d {
                weight: vector(format!("network.{}.weight", key), features)?,
                bias: vector(format!("network.{}.bias", key), features)?,
                running_mean: vector(format!("network.{}.running_mean", key), features)?,
                running_var: vector(format!("network.{}.running_var", key), features)?,
            });
        }

        let linear: [Linear; 4] = linear
            .try_into()
            .map_err(|_| anyhow::anyhow!("Expected 4 linear layers"))?;
        let norm: [BatchNorm1d; 2] = norm
            .try_into()
            .map_err(|_| anyhow::anyhow!("Expected 2 batch norm layers"))?;

        Ok(Self { linear, norm })
    }
}

/// Adam optimizer (β₁=0.9, β₂=0.999, ε=1e-8)
#[derive(Debug, Clone)]
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    t: u32,
    m: Vec<Vec<f32>>,
    v: Vec<Vec<f32>>,
}

impl Adam {
    pub fn new(lr: f32) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    /// Parameters must be passed in the same order on every call
    pub fn step(&mut self, params: Vec<(ArrayViewMutD<'_, f32>, ArrayViewD<'_, f32>)>) {
        if self.m.is_empty() {
            self.m = params.iter().map(|(p, _)| vec![0.0; p.len()]).collect();
            self.v = params.iter().map(|(p, _)| vec![0.0; p.len()]).collect();
        }

        self.t += 1;
        let bias_correction1 = 1.0 - self.beta1.powi(self.t as i32);
        let bias_correction2 = 1.0 - self.beta2.powi(self.t as i32);

        for (k, (mut param, grad)) in params.into_iter().enumerate() {
            let (m, v) = (&mut self.m[k], &mut self.v[k]);
            for (i, (p, &g)) in param.iter_mut().zip(grad.iter()).enumerate() {
                m[i] = self.beta1 * m[i] + (1.0 - self.beta1) * g;
                v[i] = self.beta2 * v[i] + (1.0 - self.beta2) * g * g;
                let m_hat = m[i] / bias_correction1;
                let v_hat = v[i] / bias_correction2;
                *p -= self.lr * m_hat / (v_hat.sqrt() + self.eps);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_bce_with_logits_matches_closed_form() {
        let logits = Array1::from_vec(vec![0.0, 2.0]);
        let labels = Array1::from_vec(vec![1.0, 0.0]);
        let (loss, grad) = bce_with_logits(&logits, &labels);

        let expected = (2f32.ln() + (1.0 + 2f32.exp()).ln()) / 2.0;
        assert!((loss - expected).abs() < 1e-5);
        assert!((grad[0] - (0.5 - 1.0) / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_eval_forward_shape_and_determinism() {
        let mut rng = StdRng::seed_from_u64(1);
        let net = FusionNetwork::new(6, &mut rng);
        let x = Array2::from_shape_fn((3, 6), |(i, j)| (i + j) as f32 * 0.1);

        let a = net.forward(&x, Mode::Eval);
        let b = net.forward(&x, Mode::Eval);
        assert_eq!(a.len(), 3);
        assert_eq!(a, b);
    }

    #[test]
    fn test_single_row_eval_matches_batch_eval() {
        let mut rng = StdRng::seed_from_u64(2);
        let net = FusionNetwork::new(4, &mut rng);
        let x = Array2::from_shape_fn((2, 4), |(i, j)| (i as f32 - j as f32) * 0.3);

        let batch = net.forward(&x, Mode::Eval);
        let single = net.forward(&x.slice(ndarray::s![1..2, ..]).to_owned(), Mode::Eval);
        assert!((batch[1] - single[0]).abs() < 1e-6);
    }

    #[test]
    fn test_train_batch_rejects_single_sample() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut net = FusionNetwork::new(4, &mut rng);
        let mut adam = Adam::new(0.001);
        let x = Array2::zeros((1, 4));
        let y = Array1::zeros(1);
        assert!(net.train_batch(&x, &y, &mut adam, &mut rng).is_err());
    }

    #[test]
    fn test_training_reduces_loss_on_separable_data() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut net = FusionNetwork::new(2, &mut rng);
        let mut adam = Adam::new(0.01);

        let x = Array2::from_shape_vec(
            (8, 2),
            vec![
                1.0, 1.0, 0.9, 1.1, 1.2, 0.8, 1.0, 0.9, //
                -1.0, -1.0, -0.9, -1.1, -1.2, -0.8, -1.0, -0.9,
            ],
        )
        .unwrap();
        let y = Array1::from_vec(vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0]);

        let first = net.train_batch(&x, &y, &mut adam, &mut rng).unwrap();
        let mut last = first;
        for _ in 0..200 {
            last = net.train_batch(&x, &y, &mut adam, &mut rng).unwrap();
        }
        assert!(last < first, "loss {} -> {}", first, last);

        let logits = net.forward(&x, Mode::Eval);
        assert!(logits[0] > logits[7]);
    }

    #[test]
    fn test_state_dict_keys_and_round_trip() {
        let mut rng = StdRng::seed_from_u64(5);
        let net = FusionNetwork::new(10, &mut rng);
        let state = net.state_dict();

        for key in [
            "network.0.weight",
            "network.2.running_mean",
            "network.4.bias",
            "network.6.running_var",
            "network.8.weight",
            "network.10.bias",
        ] {
            assert!(state.contains_key(key), "missing {}", key);
        }
        assert_eq!(state["network.0.weight"].0, vec![128, 10]);

        let restored = FusionNetwork::from_state_dict(&state).unwrap();
        assert_eq!(restored, net);
    }

    #[test]
    fn test_from_state_dict_rejects_missing_tensor() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut state = FusionNetwork::new(3, &mut rng).state_dict();
        state.remove("network.6.running_var");
        assert!(FusionNetwork::from_state_dict(&state).is_err());
    }
}
