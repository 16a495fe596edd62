//! # Recurrent Stacks for Sequence Processing
//!
//! [`RecurrentStack`] chains [`RecurrentCell`](crate::cells::RecurrentCell)s and
//! unrolls them over a batch-first sequence.
//!
//! ## Output Shapes
//!
//! | Setting | Shape | Description |
//! |---------|-------|-------------|
//! | `return_sequences=true` (default) | `[batch, seq_len, output_dim]` | All timesteps |
//! | `return_sequences=false` | `[batch, 1, output_dim]` | Last timestep only |
//! | `return_state=true` | one `Option<[batch, state_size]>` per cell | Final states |
//!
//! ## Feedback
//!
//! With `feedback_final_cell_state`, the last cell's state from timestep
//! `t - 1` is appended to cell 0's inputs at timestep `t`. At `t = 0` nothing
//! has been produced yet, so cell 0 sees zeros in that slot. Cell 0 must
//! declare `extra_feedback_state_size` equal to the last cell's `state_size`.
//!
//! ## Example
//!
//! ```rust
//! use ameo_rnn::cells::RecurrentCellConfig;
//! use ameo_rnn::rnn::RecurrentStackConfig;
//! use burn::backend::NdArray;
//! use burn::tensor::Tensor;
//!
//! type Backend = NdArray<f32>;
//! let device = Default::default();
//!
//! let stack = RecurrentStackConfig::new(vec![
//!     RecurrentCellConfig::new(16, 32, 8).with_extra_feedback_state_size(4),
//!     RecurrentCellConfig::new(32, 2, 4),
//! ])
//! .with_feedback_final_cell_state(true)
//! .init::<Backend>(&device)
//! .unwrap();
//!
//! let input = Tensor::<Backend, 3>::zeros([4, 10, 16], &device);
//! let out = stack.forward(input).unwrap();
//! assert_eq!(out.output.dims(), [4, 10, 2]);
//! ```
//!
//! ## Loading from JSON
//!
//! ```rust
//! use ameo_rnn::rnn::RecurrentStackConfig;
//!
//! let config = RecurrentStackConfig::from_json(
//!     r#"{"cells": [{"input_dim": 2, "output_dim": 1, "output_activation": "ameo"}]}"#,
//! )
//! .unwrap();
//! assert_eq!(config.cells.len(), 1);
//! assert!(config.return_sequences);
//! ```

pub mod stack;

pub use stack::{RecurrentStack, RecurrentStackConfig, StackOutput, TimestepState};
