//! Error types for cell/stack construction and forward-pass shape contracts.

use thiserror::Error;

/// Raised while building activations, initializers, regularizers, cells or stacks.
///
/// A value that fails with one of these is never handed back to the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("recurrent stack requires at least one cell")]
    EmptyStack,

    #[error("cell {index} has input_dim {actual} but the previous cell outputs {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("unknown activation: {0}")]
    UnknownActivation(String),

    #[error("unknown initializer: {0}")]
    UnknownInitializer(String),

    #[error("unknown regularizer: {0}")]
    UnknownRegularizer(String),

    #[error("invalid value {value} for `{name}`: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("cell 0 expects {actual} feedback features but the final cell state has {expected}")]
    FeedbackMismatch { expected: usize, actual: usize },

    #[error("cell {index} declares feedback features but never receives fed-back state")]
    UnexpectedFeedback { index: usize },

    #[error("weight `{weight}` must have shape {expected:?}, got {actual:?}")]
    WeightShape {
        weight: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("parse error: {0}")]
    Parse(String),
}

/// Raised when tensors handed to a cell or stack at call time break the shape contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeContractError {
    #[error("cell {cell}: input has {actual} features, expected {expected}")]
    InputWidth {
        cell: usize,
        expected: usize,
        actual: usize,
    },

    #[error("cell {cell}: state has {actual} features, expected {expected}")]
    StateWidth {
        cell: usize,
        expected: usize,
        actual: usize,
    },

    #[error("cell {cell}: stateful cell called without a previous state")]
    MissingState { cell: usize },

    #[error("cell {cell}: stateless cell called with a previous state")]
    UnexpectedState { cell: usize },

    #[error("cell {cell}: batch size {actual} does not match input batch size {expected}")]
    BatchMismatch {
        cell: usize,
        expected: usize,
        actual: usize,
    },

    #[error("cell {cell}: extra state has {actual} features, expected {expected}")]
    ExtraStateWidth {
        cell: usize,
        expected: usize,
        actual: usize,
    },

    #[error("cell {cell}: extra state supplied to a cell without feedback features")]
    UnexpectedExtraState { cell: usize },

    #[error("expected one state slot per cell ({expected}), got {actual}")]
    StateCount { expected: usize, actual: usize },

    #[error("sequence must contain at least one timestep")]
    EmptySequence,

    #[error("sequence has {actual} features per timestep, expected {expected}")]
    SequenceWidth { expected: usize, actual: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("shape contract violated: {0}")]
    ShapeContract(#[from] ShapeContractError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for ConfigurationError {
    fn from(e: serde_json::Error) -> Self {
        ConfigurationError::Parse(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Configuration(e.into())
    }
}
