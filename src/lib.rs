//! # AMEO-RNN
//!
//! Recurrent networks built from AMEO activations, using the Burn framework.
//!
//! ## Features
//!
//! - **AMEO activations**: hard, leaky (C¹ spline) and interpolated variants,
//!   each with an exact analytic gradient registered with Burn's autodiff
//! - **Two kernel paths**: composed tensor ops, or a fused single-pass kernel
//! - **Recurrent cells**: separate output and state projections, optional
//!   stateless mode, non-trainable initial state by default
//! - **Recurrent stacks**: multi-cell unrolling with optional last-to-first
//!   state feedback and construction-time dimension checks
//! - **Regularizers**: bimodal sparsity penalty, quantization, and sums of both
//!
//! ## Quick Start
//!
//! ```rust
//! use ameo_rnn::prelude::*;
//! use burn::backend::NdArray;
//! use burn::tensor::Tensor;
//!
//! type Backend = NdArray<f32>;
//! let device = Default::default();
//!
//! let stack = RecurrentStackConfig::new(vec![
//!     RecurrentCellConfig::new(3, 8, 4).with_output_activation(ActivationSpec::Ameo),
//!     RecurrentCellConfig::new(8, 1, 0).with_output_activation(ActivationSpec::Linear),
//! ])
//! .init::<Backend>(&device)
//! .unwrap();
//!
//! let out = stack.forward(Tensor::<Backend, 3>::zeros([2, 5, 3], &device)).unwrap();
//! assert_eq!(out.output.dims(), [2, 5, 1]);
//! ```
//!
//! ## Activation-level Usage
//!
//! ```rust
//! use ameo_rnn::activation::AmeoActivation;
//! use burn::backend::NdArray;
//! use burn::tensor::Tensor;
//!
//! let device = Default::default();
//! let x = Tensor::<NdArray<f32>, 1>::from_floats([-2.0, 0.5, 2.0], &device);
//! let y = x.ameo();
//! assert_eq!(y.into_data().to_vec::<f32>().unwrap(), vec![0.0, -0.5, 0.0]);
//! ```

pub mod activation;
pub mod cells;
pub mod error;
pub mod initializer;
pub mod regularizer;
pub mod rnn;

pub mod prelude {
    pub use crate::activation::{
        Activation, ActivationBackend, ActivationSpec, Ameo, AmeoActivation, AmeoKernel,
        InterpolatedAmeo, KernelPath, LeakyAmeo,
    };
    pub use crate::cells::{RecurrentCell, RecurrentCellConfig, Weight, WeightTensor};
    pub use crate::error::{ConfigurationError, Error, ShapeContractError};
    pub use crate::initializer::InitializerSpec;
    pub use crate::regularizer::{QuantizationRegularizer, Regularizer, SparseRegularizer};
    pub use crate::rnn::{RecurrentStack, RecurrentStackConfig, StackOutput};
}
