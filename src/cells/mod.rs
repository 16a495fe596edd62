//! # Recurrent Cells
//!
//! Single-timestep cells. They process one timestep at a time and are driven
//! over sequences by [`RecurrentStack`](crate::rnn::RecurrentStack).
//!
//! ## Weights
//!
//! With `combined = input_dim + state_size + extra_feedback_state_size`:
//!
//! | Weight | Shape | Present when |
//! |--------|-------|--------------|
//! | `output_kernel` | `[combined, output_dim]` | always |
//! | `recurrent_kernel` | `[combined, state_size]` | `state_size > 0` |
//! | `output_bias` | `[output_dim]` | `use_bias` |
//! | `recurrent_bias` | `[state_size]` | `use_bias` and `state_size > 0` |
//! | `initial_state` | `[state_size]` | `state_size > 0` |
//!
//! The initial state is not trainable unless the config says so.
//!
//! ## Tensor Shapes
//!
//! | Tensor | Shape | Description |
//! |--------|-------|-------------|
//! | `input` | `[batch, input_dim]` | Input features |
//! | `prev_state` | `[batch, state_size]` | Previous state (`None` if stateless) |
//! | `extra_state` | `[batch, extra_feedback_state_size]` | Fed-back final-cell state |
//! | `output` | `[batch, output_dim]` | Cell output |
//! | `next_state` | `[batch, state_size]` | Updated state |
//!
//! ## Example
//!
//! ```rust
//! use ameo_rnn::activation::ActivationSpec;
//! use ameo_rnn::cells::RecurrentCellConfig;
//! use burn::backend::NdArray;
//! use burn::tensor::Tensor;
//!
//! type Backend = NdArray<f32>;
//! let device = Default::default();
//!
//! let cell = RecurrentCellConfig::new(16, 8, 32)
//!     .with_output_activation(ActivationSpec::Ameo)
//!     .init::<Backend>(&device)
//!     .unwrap();
//!
//! let input = Tensor::<Backend, 2>::zeros([4, 16], &device);
//! let state = cell.get_initial_state(4);
//! let (output, next_state) = cell.call(input, state, None).unwrap();
//!
//! assert_eq!(output.dims(), [4, 8]);
//! assert_eq!(next_state.unwrap().dims(), [4, 32]);
//! ```

pub mod recurrent_cell;

pub use recurrent_cell::{RecurrentCell, RecurrentCellConfig, Weight, WeightTensor};
