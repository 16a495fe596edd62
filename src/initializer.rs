//! Weight initializers.
//!
//! An [`InitializerSpec`] is a pure function of a shape: every call to
//! [`InitializerSpec::init`] allocates a fresh tensor on the given device.

use crate::error::ConfigurationError;
use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, ElementConversion, Tensor};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// Standard deviation of a unit normal truncated to `[-2, 2]`.
const TRUNCATED_NORMAL_STD: f64 = 0.879_625_661_034_239_8;

/// Upper bound on resampling rounds for the truncated normal.
const MAX_RESAMPLE_ROUNDS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(tag = "id", rename_all = "snake_case")]
pub enum InitializerSpec {
    Zeros,
    Ones,
    #[default]
    GlorotUniform,
    GlorotNormal,
    Normal { mean: f64, std: f64 },
    Uniform { low: f64, high: f64 },
}

impl FromStr for InitializerSpec {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zeros" => Ok(InitializerSpec::Zeros),
            "ones" => Ok(InitializerSpec::Ones),
            "glorot_uniform" => Ok(InitializerSpec::GlorotUniform),
            "glorot_normal" => Ok(InitializerSpec::GlorotNormal),
            other => Err(ConfigurationError::UnknownInitializer(other.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for InitializerSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(tag = "id", rename_all = "snake_case")]
        enum Descriptor {
            Zeros,
            Ones,
            GlorotUniform,
            GlorotNormal,
            Normal { mean: f64, std: f64 },
            Uniform { low: f64, high: f64 },
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
                Descriptor::Zeros => InitializerSpec::Zeros,
                Descriptor::Ones => InitializerSpec::Ones,
                Descriptor::GlorotUniform => InitializerSpec::GlorotUniform,
                Descriptor::GlorotNormal => InitializerSpec::GlorotNormal,
                Descriptor::Normal { mean, std } => InitializerSpec::Normal { mean, std },
                Descriptor::Uniform { low, high } => InitializerSpec::Uniform { low, high },
            }),
        }
    }
}

impl InitializerSpec {
    /// Check distribution parameters before any tensor is allocated.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match *self {
            InitializerSpec::Normal { mean, std } => {
                if !mean.is_finite() {
                    return Err(invalid("mean", mean, "must be finite"));
                }
                if !std.is_finite() || std < 0.0 {
                    return Err(invalid("std", std, "must be finite and non-negative"));
                }
            }
            InitializerSpec::Uniform { low, high } => {
                if !low.is_finite() || !high.is_finite() {
                    return Err(invalid("low", low, "bounds must be finite"));
                }
                if low >= high {
                    return Err(invalid("low", low, "must be below `high`"));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Allocate a tensor of `shape` drawn from this initializer.
    pub fn init<B: Backend, const D: usize>(
        &self,
        shape: [usize; D],
        device: &B::Device,
    ) -> Tensor<B, D> {
        match *self {
            InitializerSpec::Zeros => Tensor::zeros(shape, device),
            InitializerSpec::Ones => Tensor::ones(shape, device),
            InitializerSpec::GlorotUniform => {
                let (fan_in, fan_out) = fans(&shape);
                let limit = (6.0 / (fan_in + fan_out).max(1) as f64).sqrt();
                Tensor::random(shape, Distribution::Uniform(-limit, limit), device)
            }
            InitializerSpec::GlorotNormal => {
                let (fan_in, fan_out) = fans(&shape);
                let scale = 1.0 / f64::max(1.0, (fan_in + fan_out) as f64 / 2.0);
                let std = scale.sqrt() / TRUNCATED_NORMAL_STD;
                truncated_normal(shape, std, device)
            }
            InitializerSpec::Normal { mean, std } => {
                Tensor::random(shape, Distribution::Normal(mean, std), device)
            }
            // An empty range has nothing to sample.
            InitializerSpec::Uniform { low, high } if low >= high => {
                Tensor::full(shape, low, device)
            }
            InitializerSpec::Uniform { low, high } => {
                Tensor::random(shape, Distribution::Uniform(low, high), device)
            }
        }
    }
}

fn invalid(name: &'static str, value: f64, reason: &'static str) -> ConfigurationError {
    ConfigurationError::InvalidParameter {
        name,
        value,
        reason,
    }
}

/// `(fan_in, fan_out)` for a weight shape.
fn fans(shape: &[usize]) -> (usize, usize) {
    match shape {
        [] => (1, 1),
        [n] => (*n, *n),
        [fan_in, fan_out] => (*fan_in, *fan_out),
        [rest @ .., fan_in, fan_out] => {
            let receptive: usize = rest.iter().product();
            (fan_in * receptive, fan_out * receptive)
        }
    }
}

/// Normal(0, std) with every sample beyond two standard deviations redrawn.
fn truncated_normal<B: Backend, const D: usize>(
    shape: [usize; D],
    std: f64,
    device: &B::Device,
) -> Tensor<B, D> {
    let bound = 2.0 * std;
    let mut values = Tensor::<B, D>::random(shape, Distribution::Normal(0.0, std), device);

    for _ in 0..MAX_RESAMPLE_ROUNDS {
        let outside = values.clone().abs().greater_elem(bound);
        let remaining: i64 = outside.clone().int().sum().into_scalar().elem();
        if remaining == 0 {
            return values;
        }
        let fresh = Tensor::<B, D>::random(shape, Distribution::Normal(0.0, std), device);
        values = values.mask_where(outside, fresh);
    }

    // Anything still out of range after the resampling rounds is clipped.
    values.clamp(-bound, bound)
}
