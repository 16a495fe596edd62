//! Multi-cell recurrent stack.
//!
//! Each timestep runs the cells left to right; cell `i + 1` consumes the output
//! of cell `i`. With `feedback_final_cell_state` enabled, cell 0 additionally
//! receives the final cell's state from the previous timestep.

use crate::activation::ActivationBackend;
use crate::cells::{RecurrentCell, RecurrentCellConfig, Weight};
use crate::error::{ConfigurationError, Result, ShapeContractError};
use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// One optional state per cell (`None` for stateless cells).
pub type TimestepState<B> = Vec<Option<Tensor<B, 2>>>;

fn default_return_sequences() -> bool {
    true
}

/// Serializable description of a [`RecurrentStack`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrentStackConfig {
    pub cells: Vec<RecurrentCellConfig>,
    #[serde(default = "default_return_sequences")]
    pub return_sequences: bool,
    #[serde(default)]
    pub return_state: bool,
    #[serde(default)]
    pub feedback_final_cell_state: bool,
}

impl RecurrentStackConfig {
    pub fn new(cells: Vec<RecurrentCellConfig>) -> Self {
        Self {
            cells,
            return_sequences: true,
            return_state: false,
            feedback_final_cell_state: false,
        }
    }

    pub fn with_return_sequences(mut self, return_sequences: bool) -> Self {
        self.return_sequences = return_sequences;
        self
    }

    pub fn with_return_state(mut self, return_state: bool) -> Self {
        self.return_state = return_state;
        self
    }

    pub fn with_feedback_final_cell_state(mut self, feedback: bool) -> Self {
        self.feedback_final_cell_state = feedback;
        self
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, ConfigurationError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> std::result::Result<String, ConfigurationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check cell chaining and feedback widths without allocating.
    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        for cell in &self.cells {
            cell.validate()?;
        }
        validate_chain(
            &self.cells.iter().collect::<Vec<_>>(),
            self.feedback_final_cell_state,
        )
    }

    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> std::result::Result<RecurrentStack<B>, ConfigurationError> {
        self.validate()?;
        let cells = self
            .cells
            .iter()
            .map(|config| config.init(device))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(RecurrentStack::new(cells, self.feedback_final_cell_state)?
            .with_return_sequences(self.return_sequences)
            .with_return_state(self.return_state))
    }
}

fn validate_chain(
    cells: &[&RecurrentCellConfig],
    feedback: bool,
) -> std::result::Result<(), ConfigurationError> {
    let (Some(first), Some(last)) = (cells.first(), cells.last()) else {
        return Err(ConfigurationError::EmptyStack);
    };

    for (i, pair) in cells.windows(2).enumerate() {
        if pair[1].input_dim != pair[0].output_dim {
            return Err(ConfigurationError::DimensionMismatch {
                index: i + 1,
                expected: pair[0].output_dim,
                actual: pair[1].input_dim,
            });
        }
    }

    if feedback {
        if !last.is_stateful() {
            return Err(ConfigurationError::InvalidParameter {
                name: "feedback_final_cell_state",
                value: 1.0,
                reason: "the final cell must be stateful to feed its state back",
            });
        }
        if first.extra_feedback_state_size != last.state_size {
            return Err(ConfigurationError::FeedbackMismatch {
                expected: last.state_size,
                actual: first.extra_feedback_state_size,
            });
        }
    }

    let fed = usize::from(feedback);
    if let Some(index) = cells
        .iter()
        .enumerate()
        .skip(fed)
        .find(|(_, cell)| cell.extra_feedback_state_size > 0)
        .map(|(index, _)| index)
    {
        return Err(ConfigurationError::UnexpectedFeedback { index });
    }

    Ok(())
}

/// Result of [`RecurrentStack::forward`].
#[derive(Debug, Clone)]
pub struct StackOutput<B: Backend> {
    /// `[batch, time, output_dim]`, or `[batch, 1, output_dim]` when only the
    /// last timestep is returned.
    pub output: Tensor<B, 3>,
    /// Final per-cell states, present when the stack returns state.
    pub states: Option<TimestepState<B>>,
}

/// An ordered stack of [`RecurrentCell`]s unrolled over time.
#[derive(Module, Debug)]
pub struct RecurrentStack<B: Backend> {
    cells: Vec<RecurrentCell<B>>,
    #[module(skip)]
    return_sequences: bool,
    #[module(skip)]
    return_state: bool,
    #[module(skip)]
    feedback_final_cell_state: bool,
}

impl<B: Backend> RecurrentStack<B> {
    /// Validate and assemble already-built cells. Cells are renumbered by position.
    pub fn new(
        cells: Vec<RecurrentCell<B>>,
        feedback_final_cell_state: bool,
    ) -> std::result::Result<Self, ConfigurationError> {
        validate_chain(
            &cells.iter().map(|cell| cell.config()).collect::<Vec<_>>(),
            feedback_final_cell_state,
        )?;

        let cells: Vec<_> = cells
            .into_iter()
            .enumerate()
            .map(|(i, cell)| cell.with_index(i))
            .collect();

        tracing::debug!(
            cells = cells.len(),
            input_dim = cells.first().map_or(0, |c| c.input_dim()),
            output_dim = cells.last().map_or(0, |c| c.output_dim()),
            feedback_final_cell_state,
            "built recurrent stack"
        );

        Ok(Self {
            cells,
            return_sequences: true,
            return_state: false,
            feedback_final_cell_state,
        })
    }

    /// Return the output at every timestep (default) or only the last one.
    pub fn with_return_sequences(mut self, return_sequences: bool) -> Self {
        self.return_sequences = return_sequences;
        self
    }

    pub fn with_return_state(mut self, return_state: bool) -> Self {
        self.return_state = return_state;
        self
    }

    pub fn cells(&self) -> &[RecurrentCell<B>] {
        &self.cells
    }

    pub fn input_dim(&self) -> usize {
        self.cells.first().map_or(0, |cell| cell.input_dim())
    }

    pub fn output_dim(&self) -> usize {
        self.cells.last().map_or(0, |cell| cell.output_dim())
    }

    pub fn return_sequences(&self) -> bool {
        self.return_sequences
    }

    pub fn return_state(&self) -> bool {
        self.return_state
    }

    pub fn feedback_final_cell_state(&self) -> bool {
        self.feedback_final_cell_state
    }

    pub fn initial_states(&self, batch_size: usize) -> TimestepState<B> {
        self.cells
            .iter()
            .map(|cell| cell.get_initial_state(batch_size))
            .collect()
    }

    pub fn weights(&self) -> Vec<Weight<B>> {
        self.cells.iter().flat_map(|cell| cell.weights()).collect()
    }

    /// Trainable weights of every cell, cell by cell.
    pub fn trainable_weights(&self) -> Vec<Weight<B>> {
        self.cells
            .iter()
            .flat_map(|cell| cell.trainable_weights())
            .collect()
    }

    pub fn regularization_loss(&self) -> Tensor<B, 1> {
        let mut losses = self.cells.iter().map(|cell| cell.regularization_loss());
        let first = losses.next();
        first.map_or_else(
            || Tensor::zeros([1], &Default::default()),
            |first| losses.fold(first, |acc, loss| acc + loss),
        )
    }
}

impl<B: ActivationBackend> RecurrentStack<B> {
    /// Run one timestep through every cell.
    ///
    /// `feedback` is handed to cell 0 as its extra state; pass the previous
    /// timestep's final-cell state, or `None` on the first timestep.
    pub fn step(
        &self,
        input: Tensor<B, 2>,
        states: TimestepState<B>,
        feedback: Option<Tensor<B, 2>>,
    ) -> Result<(Tensor<B, 2>, TimestepState<B>)> {
        if states.len() != self.cells.len() {
            return Err(ShapeContractError::StateCount {
                expected: self.cells.len(),
                actual: states.len(),
            }
            .into());
        }

        let mut x = input;
        let mut extra = feedback;
        let mut next_states = Vec::with_capacity(states.len());

        for (cell, state) in self.cells.iter().zip(states) {
            let (output, next_state) = cell.call(x, state, extra.take())?;
            x = output;
            next_states.push(next_state);
        }

        Ok((x, next_states))
    }

    /// Unroll the stack over `sequence` (`[batch, time, input_dim]`).
    pub fn forward(&self, sequence: Tensor<B, 3>) -> Result<StackOutput<B>> {
        let [batch_size, seq_len, features] = sequence.dims();
        if seq_len == 0 {
            return Err(ShapeContractError::EmptySequence.into());
        }
        if features != self.input_dim() {
            return Err(ShapeContractError::SequenceWidth {
                expected: self.input_dim(),
                actual: features,
            }
            .into());
        }

        tracing::trace!(batch_size, seq_len, "recurrent stack forward");

        let mut states = self.initial_states(batch_size);
        let mut outputs: Vec<Tensor<B, 2>> = Vec::with_capacity(seq_len);
        let mut feedback = None;

        for t in 0..seq_len {
            // [batch, t, features] -> [batch, features]
            let step_input = sequence.clone().narrow(1, t, 1).squeeze(1);
            let (output, next_states) = self.step(step_input, states, feedback)?;
            states = next_states;

            feedback = if self.feedback_final_cell_state {
                states.last().cloned().flatten()
            } else {
                None
            };

            if self.return_sequences || t == seq_len - 1 {
                outputs.push(output);
            }
        }

        Ok(StackOutput {
            output: Tensor::stack(outputs, 1),
            states: self.return_state.then_some(states),
        })
    }
}
