//! Weight regularizers.
//!
//! Penalties are ordinary tensor expressions; Burn's autodiff differentiates
//! them directly.

use crate::error::ConfigurationError;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// Bimodal sparsity penalty.
///
/// ```text
/// penalty(w) = mean(tanh(steepness * (|w| - threshold)) - y_shift) * intensity
///            + mean(|w|) * l1
/// y_shift    = tanh(-threshold * steepness)
/// ```
///
/// Weights below `threshold` sit on the flat bottom of the `tanh` and are pulled
/// toward zero; weights comfortably above it sit on the flat top and pay almost
/// nothing extra. The small L1 term keeps large weights from drifting upward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "SparseRegularizerConfig", into = "SparseRegularizerConfig")]
pub struct SparseRegularizer {
    intensity: f32,
    threshold: f32,
    steepness: f32,
    l1: f32,
    y_shift: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct SparseRegularizerConfig {
    #[serde(default = "SparseRegularizer::default_intensity")]
    intensity: f32,
    #[serde(default = "SparseRegularizer::default_threshold")]
    threshold: f32,
    #[serde(default = "SparseRegularizer::default_steepness")]
    steepness: f32,
    #[serde(default = "SparseRegularizer::default_l1")]
    l1: f32,
}

impl From<SparseRegularizerConfig> for SparseRegularizer {
    fn from(config: SparseRegularizerConfig) -> Self {
        Self::new(config.intensity, config.threshold, config.steepness, config.l1)
    }
}

impl From<SparseRegularizer> for SparseRegularizerConfig {
    fn from(reg: SparseRegularizer) -> Self {
        Self {
            intensity: reg.intensity,
            threshold: reg.threshold,
            steepness: reg.steepness,
            l1: reg.l1,
        }
    }
}

impl Default for SparseRegularizer {
    fn default() -> Self {
        Self::new(
            Self::default_intensity(),
            Self::default_threshold(),
            Self::default_steepness(),
            Self::default_l1(),
        )
    }
}

impl SparseRegularizer {
    pub fn new(intensity: f32, threshold: f32, steepness: f32, l1: f32) -> Self {
        Self {
            intensity,
            threshold,
            steepness,
            l1,
            y_shift: (-threshold * steepness).tanh(),
        }
    }

    fn default_intensity() -> f32 {
        0.1
    }

    fn default_threshold() -> f32 {
        0.1
    }

    fn default_steepness() -> f32 {
        100.0
    }

    fn default_l1() -> f32 {
        0.001
    }

    pub fn with_intensity(self, intensity: f32) -> Self {
        Self::new(intensity, self.threshold, self.steepness, self.l1)
    }

    pub fn with_threshold(self, threshold: f32) -> Self {
        Self::new(self.intensity, threshold, self.steepness, self.l1)
    }

    pub fn with_steepness(self, steepness: f32) -> Self {
        Self::new(self.intensity, self.threshold, steepness, self.l1)
    }

    pub fn with_l1(self, l1: f32) -> Self {
        Self::new(self.intensity, self.threshold, self.steepness, l1)
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn steepness(&self) -> f32 {
        self.steepness
    }

    pub fn l1(&self) -> f32 {
        self.l1
    }

    /// `tanh(-threshold * steepness)`, fixed at construction.
    pub fn y_shift(&self) -> f32 {
        self.y_shift
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (name, value) in [
            ("intensity", self.intensity),
            ("threshold", self.threshold),
            ("steepness", self.steepness),
            ("l1", self.l1),
        ] {
            if !value.is_finite() {
                return Err(ConfigurationError::InvalidParameter {
                    name,
                    value: value as f64,
                    reason: "must be finite",
                });
            }
        }
        if self.y_shift <= -1.0 {
            tracing::warn!(
                threshold = self.threshold,
                steepness = self.steepness,
                "sparsity penalty saturates: weights near zero receive no gradient"
            );
        }
        Ok(())
    }

    pub fn penalty<B: Backend, const D: usize>(&self, weights: Tensor<B, D>) -> Tensor<B, 1> {
        let abs_weights = weights.abs();
        let shifted = abs_weights.clone().sub_scalar(self.threshold);
        let tanh_weights = shifted.mul_scalar(self.steepness).tanh().sub_scalar(self.y_shift);
        let l1 = abs_weights.mean().mul_scalar(self.l1);

        tanh_weights.mean().mul_scalar(self.intensity) + l1
    }
}

/// Pulls weights toward integer multiples of `interval`.
///
/// `penalty(w) = mean(|w / interval - round(w / interval)|) * intensity`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantizationRegularizer {
    pub interval: f32,
    pub intensity: f32,
}

impl QuantizationRegularizer {
    pub fn new(interval: f32, intensity: f32) -> Self {
        Self {
            interval,
            intensity,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.interval.is_finite() || self.interval <= 0.0 {
            return Err(ConfigurationError::InvalidParameter {
                name: "interval",
                value: self.interval as f64,
                reason: "quantization interval must be positive",
            });
        }
        Ok(())
    }

    pub fn penalty<B: Backend, const D: usize>(&self, weights: Tensor<B, D>) -> Tensor<B, 1> {
        let scaled = weights.div_scalar(self.interval);
        let error = scaled.clone() - scaled.round();
        error.abs().mean().mul_scalar(self.intensity)
    }
}

/// Any regularizer a cell can attach to one of its weights.
///
/// Deserializes from a bare `"sparse"` (default parameters) or a tagged
/// descriptor such as `{"id": "quantization", "interval": 0.5, "intensity": 1.0}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "id", rename_all = "snake_case")]
pub enum Regularizer {
    Sparse(SparseRegularizer),
    Quantization(QuantizationRegularizer),
    /// Sum of the member penalties.
    Composed { regularizers: Vec<Regularizer> },
}

impl From<SparseRegularizer> for Regularizer {
    fn from(reg: SparseRegularizer) -> Self {
        Regularizer::Sparse(reg)
    }
}

impl From<QuantizationRegularizer> for Regularizer {
    fn from(reg: QuantizationRegularizer) -> Self {
        Regularizer::Quantization(reg)
    }
}

impl FromStr for Regularizer {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sparse" => Ok(Regularizer::Sparse(SparseRegularizer::default())),
            other => Err(ConfigurationError::UnknownRegularizer(other.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for Regularizer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(tag = "id", rename_all = "snake_case")]
        enum Descriptor {
            Sparse(SparseRegularizer),
            Quantization(QuantizationRegularizer),
            Composed { regularizers: Vec<Regularizer> },
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Name(String),
            Descriptor(Descriptor),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Name(name) => name.parse().map_err(D::Error::custom),
            Repr::Descriptor(Descriptor::Sparse(reg)) => Ok(Regularizer::Sparse(reg)),
            Repr::Descriptor(Descriptor::Quantization(reg)) => Ok(Regularizer::Quantization(reg)),
            Repr::Descriptor(Descriptor::Composed { regularizers }) => {
                Ok(Regularizer::Composed { regularizers })
            }
        }
    }
}

impl Regularizer {
    pub fn composed(regularizers: impl IntoIterator<Item = Regularizer>) -> Self {
        Regularizer::Composed {
            regularizers: regularizers.into_iter().collect(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match self {
            Regularizer::Sparse(reg) => reg.validate(),
            Regularizer::Quantization(reg) => reg.validate(),
            Regularizer::Composed { regularizers } => {
                regularizers.iter().try_for_each(Regularizer::validate)
            }
        }
    }

    /// Scalar penalty (a single-element tensor).
    pub fn penalty<B: Backend, const D: usize>(&self, weights: Tensor<B, D>) -> Tensor<B, 1> {
        match self {
            Regularizer::Sparse(reg) => reg.penalty(weights),
            Regularizer::Quantization(reg) => reg.penalty(weights),
            Regularizer::Composed { regularizers } => {
                let zero = Tensor::<B, 1>::zeros([1], &weights.device());
                regularizers
                    .iter()
                    .fold(zero, |acc, reg| acc + reg.penalty(weights.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_scalar()
    }

    #[test]
    fn test_y_shift_precomputed() {
        let reg = SparseRegularizer::default();
        assert!((reg.y_shift() - (-10.0f32).tanh()).abs() < 1e-7);
        let reg = reg.with_threshold(0.01).with_steepness(10.0);
        assert!((reg.y_shift() - (-0.1f32).tanh()).abs() < 1e-7);
    }

    #[test]
    fn test_penalty_zero_weights_is_zero() {
        let device = Default::default();
        let reg = SparseRegularizer::default();
        let w = Tensor::<TestBackend, 2>::zeros([3, 3], &device);
        assert!(scalar(reg.penalty(w)).abs() < 1e-7);
    }

    #[test]
    fn test_penalty_formula() {
        let device = Default::default();
        let reg = SparseRegularizer::new(0.5, 0.2, 10.0, 0.1);
        let values = [0.0f32, -0.1, 0.3, -1.0];
        let w = Tensor::<TestBackend, 1>::from_floats(values, &device);

        let y_shift = (-2.0f32).tanh();
        let tanh_mean = values
            .iter()
            .map(|v| (10.0 * (v.abs() - 0.2)).tanh() - y_shift)
            .sum::<f32>()
            / 4.0;
        let l1_mean = values.iter().map(|v| v.abs()).sum::<f32>() / 4.0;
        let expected = tanh_mean * 0.5 + l1_mean * 0.1;

        assert!((scalar(reg.penalty(w)) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_quantization_penalty() {
        let device = Default::default();
        let reg = QuantizationRegularizer::new(0.5, 2.0);
        let on_grid = Tensor::<TestBackend, 1>::from_floats([0.0f32, 0.5, -1.5], &device);
        assert!(scalar(reg.penalty(on_grid)).abs() < 1e-7);

        let off_grid = Tensor::<TestBackend, 1>::from_floats([0.25f32, 0.6], &device);
        // |0.5 - round(0.5)| and |1.2 - 1|
        let p = scalar(reg.penalty(off_grid));
        assert!((p - (0.5 + 0.2) / 2.0 * 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_composed_sums_members() {
        let device = Default::default();
        let sparse = SparseRegularizer::default();
        let quant = QuantizationRegularizer::new(1.0, 1.0);
        let composed = Regularizer::composed([sparse.into(), quant.into()]);

        let w = Tensor::<TestBackend, 2>::random(
            [4, 4],
            burn::tensor::Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let expected = scalar(sparse.penalty(w.clone())) + scalar(quant.penalty(w.clone()));
        assert!((scalar(composed.penalty(w)) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_serde_descriptor() {
        let reg: Regularizer =
            serde_json::from_str(r#"{"id": "sparse", "intensity": 0.2}"#).unwrap();
        let Regularizer::Sparse(sparse) = reg else {
            panic!("expected sparse regularizer");
        };
        assert_eq!(sparse.intensity(), 0.2);
        assert_eq!(sparse.threshold(), 0.1);
        assert!((sparse.y_shift() - (-10.0f32).tanh()).abs() < 1e-7);
    }

    #[test]
    fn test_parse_bare_name() {
        let reg: Regularizer = serde_json::from_str("\"sparse\"").unwrap();
        assert_eq!(reg, Regularizer::Sparse(SparseRegularizer::default()));
        assert_eq!(
            "l2".parse::<Regularizer>(),
            Err(ConfigurationError::UnknownRegularizer("l2".to_string()))
        );

        let reg: Regularizer = serde_json::from_str(
            r#"{"id": "composed", "regularizers": ["sparse", {"id": "quantization", "interval": 0.5, "intensity": 1.0}]}"#,
        )
        .unwrap();
        assert_eq!(
            reg,
            Regularizer::composed([
                SparseRegularizer::default().into(),
                QuantizationRegularizer::new(0.5, 1.0).into(),
            ])
        );
    }

    #[test]
    fn test_validate() {
        assert!(QuantizationRegularizer::new(0.0, 1.0).validate().is_err());
        assert!(Regularizer::composed([SparseRegularizer::new(f32::NAN, 0.1, 1.0, 0.0).into()])
            .validate()
            .is_err());
        assert!(Regularizer::from(SparseRegularizer::default()).validate().is_ok());
    }
}
