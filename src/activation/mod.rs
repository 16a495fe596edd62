//! # Activation functions
//!
//! The AMEO family is a set of bounded, non-monotonic activations designed to
//! encode multi-level (boolean / ternary) signals in a differentiable form:
//!
//! | Activation | Shape | Gradient |
//! |------------|-------|----------|
//! | [`Ameo`] | hard piecewise-linear, `[-1, 1]` | exact subgradient |
//! | [`LeakyAmeo`] | C¹ quartic spline + linear leak outside `[-3, 3]` | exact spline derivative |
//! | [`InterpolatedAmeo`] | `factor * Ameo + (1 - factor) * LeakyAmeo` | same convex combination |
//!
//! All three run through [`ActivationBackend::ameo_activation`], which registers
//! the analytic gradient with Burn's autodiff instead of letting it
//! differentiate the piecewise formula.
//!
//! Cells select their activations with an [`ActivationSpec`], which can be
//! parsed from a bare identifier or a tagged descriptor:
//!
//! ```rust
//! use ameo_rnn::activation::ActivationSpec;
//!
//! let tanh: ActivationSpec = "tanh".parse().unwrap();
//! let leaky: ActivationSpec =
//!     serde_json::from_str(r#"{"id": "leaky_ameo", "leakyness": 0.1}"#).unwrap();
//!
//! assert_eq!(tanh, ActivationSpec::Tanh);
//! assert_eq!(leaky, ActivationSpec::LeakyAmeo { leakyness: 0.1 });
//! ```

pub mod backend;
pub mod kernel;

pub use backend::{apply_kernel, ActivationBackend};
pub use kernel::{AmeoKernel, AmeoShape, KernelPath, DEFAULT_LEAKYNESS};

use crate::error::ConfigurationError;
use burn::tensor::{activation, Tensor};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// Symbolic choice of activation function.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(tag = "id", rename_all = "snake_case")]
pub enum ActivationSpec {
    Linear,
    #[default]
    Tanh,
    Sigmoid,
    Relu,
    Ameo,
    LeakyAmeo { leakyness: f32 },
    InterpolatedAmeo { factor: f32, leakyness: f32 },
}

impl FromStr for ActivationSpec {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(ActivationSpec::Linear),
            "tanh" => Ok(ActivationSpec::Tanh),
            "sigmoid" => Ok(ActivationSpec::Sigmoid),
            "relu" => Ok(ActivationSpec::Relu),
            "ameo" => Ok(ActivationSpec::Ameo),
            other => Err(ConfigurationError::UnknownActivation(other.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for ActivationSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        fn default_leakyness() -> f32 {
            DEFAULT_LEAKYNESS
        }

        #[derive(Deserialize)]
        #[serde(tag = "id", rename_all = "snake_case")]
        enum Descriptor {
            Linear,
            Tanh,
            Sigmoid,
            Relu,
            Ameo,
            LeakyAmeo {
                #[serde(default = "default_leakyness")]
                leakyness: f32,
            },
            InterpolatedAmeo {
                factor: f32,
                #[serde(default = "default_leakyness")]
                leakyness: f32,
            },
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Name(String),
            Descriptor(Descriptor),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Name(name) => name.parse().map_err(D::Error::custom),
            Repr::Descriptor(descriptor) => Ok(match descriptor {
                Descriptor::Linear => ActivationSpec::Linear,
                Descriptor::Tanh => ActivationSpec::Tanh,
                Descriptor::Sigmoid => ActivationSpec::Sigmoid,
                Descriptor::Relu => ActivationSpec::Relu,
                Descriptor::Ameo => ActivationSpec::Ameo,
                Descriptor::LeakyAmeo { leakyness } => ActivationSpec::LeakyAmeo { leakyness },
                Descriptor::InterpolatedAmeo { factor, leakyness } => {
                    ActivationSpec::InterpolatedAmeo { factor, leakyness }
                }
            }),
        }
    }
}

impl ActivationSpec {
    /// Validate the parameters and resolve it into an [`Activation`] using the
    /// reference kernel path.
    pub fn build(&self) -> Result<Activation, ConfigurationError> {
        self.build_with_path(KernelPath::Reference)
    }

    /// Validate the parameters and resolve it into an [`Activation`], evaluating AMEO
    /// kernels on `path`.
    pub fn build_with_path(&self, path: KernelPath) -> Result<Activation, ConfigurationError> {
        let activation = match *self {
            ActivationSpec::Linear => Activation::Linear,
            ActivationSpec::Tanh => Activation::Tanh,
            ActivationSpec::Sigmoid => Activation::Sigmoid,
            ActivationSpec::Relu => Activation::Relu,
            ActivationSpec::Ameo => Activation::Ameo(AmeoKernel::hard().with_path(path)),
            ActivationSpec::LeakyAmeo { leakyness } => {
                check_leakyness(leakyness)?;
                Activation::Ameo(AmeoKernel::leaky(leakyness).with_path(path))
            }
            ActivationSpec::InterpolatedAmeo { factor, leakyness } => {
                check_leakyness(leakyness)?;
                if !factor.is_finite() || !(0.0..=1.0).contains(&factor) {
                    return Err(ConfigurationError::InvalidParameter {
                        name: "factor",
                        value: factor as f64,
                        reason: "interpolation factor must lie in [0, 1]",
                    });
                }
                Activation::Ameo(AmeoKernel::interpolated(factor, leakyness).with_path(path))
            }
        };
        Ok(activation)
    }
}

fn check_leakyness(leakyness: f32) -> Result<(), ConfigurationError> {
    if !leakyness.is_finite() {
        return Err(ConfigurationError::InvalidParameter {
            name: "leakyness",
            value: leakyness as f64,
            reason: "must be finite",
        });
    }
    if leakyness.abs() > 1.0 {
        tracing::warn!(
            leakyness,
            "leak slope above 1 lets gradients grow geometrically across timesteps"
        );
    }
    Ok(())
}

/// A validated activation, bound once at cell construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activation {
    Linear,
    Tanh,
    Sigmoid,
    Relu,
    Ameo(AmeoKernel),
}

impl Activation {
    /// Apply the activation element-wise.
    pub fn forward<B: ActivationBackend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Activation::Linear => x,
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => activation::sigmoid(x),
            Activation::Relu => activation::relu(x),
            Activation::Ameo(kernel) => apply_kernel(*kernel, x),
        }
    }
}

/// Hard AMEO activation.
///
/// ```text
/// x <= -3  -> -1
/// x <= -1  -> x + 2
/// x <=  1  -> -x
/// x <=  3  -> x - 2
/// else     -> 1
/// ```
///
/// # Example
///
/// ```rust
/// use burn::backend::NdArray;
/// use burn::tensor::Tensor;
/// use ameo_rnn::activation::Ameo;
///
/// type Backend = NdArray<f32>;
/// let device = Default::default();
///
/// let x = Tensor::<Backend, 1>::from_floats([-3.0, 0.0, 3.0], &device);
/// let y = Ameo::forward(x);
/// assert_eq!(y.into_data().to_vec::<f32>().unwrap(), vec![-1.0, 0.0, 1.0]);
/// ```
pub struct Ameo;

impl Ameo {
    pub fn forward<B: ActivationBackend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
        apply_kernel(AmeoKernel::hard(), x)
    }
}

/// Smoothed AMEO with a constant `leakyness` slope outside `[-3, 3]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeakyAmeo {
    pub leakyness: f32,
}

impl LeakyAmeo {
    pub fn new(leakyness: f32) -> Self {
        Self { leakyness }
    }

    pub fn forward<B: ActivationBackend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        apply_kernel(AmeoKernel::leaky(self.leakyness), x)
    }
}

/// Blend of [`Ameo`] (`factor = 1`) and [`LeakyAmeo`] (`factor = 0`).
///
/// Annealing `factor` from 0 to 1 during training moves a network from the
/// smooth shape onto the exact hard shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpolatedAmeo {
    pub factor: f32,
    pub leakyness: f32,
}

impl InterpolatedAmeo {
    pub fn new(factor: f32, leakyness: f32) -> Self {
        Self { factor, leakyness }
    }

    pub fn forward<B: ActivationBackend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        apply_kernel(AmeoKernel::interpolated(self.factor, self.leakyness), x)
    }
}

/// Extension methods for applying AMEO activations directly on tensors.
pub trait AmeoActivation {
    fn ameo(self) -> Self;
    fn leaky_ameo(self, leakyness: f32) -> Self;
    fn interpolated_ameo(self, factor: f32, leakyness: f32) -> Self;
}

impl<B: ActivationBackend, const D: usize> AmeoActivation for Tensor<B, D> {
    fn ameo(self) -> Self {
        Ameo::forward(self)
    }

    fn leaky_ameo(self, leakyness: f32) -> Self {
        LeakyAmeo::new(leakyness).forward(self)
    }

    fn interpolated_ameo(self, factor: f32, leakyness: f32) -> Self {
        InterpolatedAmeo::new(factor, leakyness).forward(self)
    }
}
