//! Single-timestep recurrent cell with separate output and state paths.
//!
//! The cell concatenates `[input, prev_state, extra_state]` and projects the
//! result twice:
//!
//! ```text
//! output     = act_out(combined · output_kernel + output_bias)
//! next_state = act_rec(combined · recurrent_kernel + recurrent_bias)
//! ```
//!
//! A cell with `state_size == 0` is stateless and only has the output path.

use crate::activation::{Activation, ActivationBackend, ActivationSpec, KernelPath};
use crate::error::{ConfigurationError, Result, ShapeContractError};
use crate::initializer::InitializerSpec;
use crate::regularizer::Regularizer;
use burn::module::{Ignored, Module, Param};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

fn default_use_bias() -> bool {
    true
}

/// Configuration for a [`RecurrentCell`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrentCellConfig {
    pub input_dim: usize,
    pub output_dim: usize,
    #[serde(default)]
    pub state_size: usize,
    #[serde(default)]
    pub output_activation: ActivationSpec,
    #[serde(default)]
    pub recurrent_activation: ActivationSpec,
    #[serde(default = "default_use_bias")]
    pub use_bias: bool,
    #[serde(default)]
    pub kernel_initializer: InitializerSpec,
    #[serde(default)]
    pub recurrent_initializer: InitializerSpec,
    #[serde(default)]
    pub bias_initializer: InitializerSpec,
    #[serde(default)]
    pub initial_state_initializer: InitializerSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_kernel_regularizer: Option<Regularizer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_bias_regularizer: Option<Regularizer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrent_kernel_regularizer: Option<Regularizer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrent_bias_regularizer: Option<Regularizer>,
    #[serde(default)]
    pub trainable_initial_state: bool,
    /// Width of the final-cell state fed back into this cell by a stack.
    #[serde(default)]
    pub extra_feedback_state_size: usize,
    #[serde(default)]
    pub kernel_path: KernelPath,
}

impl RecurrentCellConfig {
    pub fn new(input_dim: usize, output_dim: usize, state_size: usize) -> Self {
        Self {
            input_dim,
            output_dim,
            state_size,
            output_activation: ActivationSpec::default(),
            recurrent_activation: ActivationSpec::default(),
            use_bias: true,
            kernel_initializer: InitializerSpec::default(),
            recurrent_initializer: InitializerSpec::default(),
            bias_initializer: InitializerSpec::default(),
            initial_state_initializer: InitializerSpec::default(),
            output_kernel_regularizer: None,
            output_bias_regularizer: None,
            recurrent_kernel_regularizer: None,
            recurrent_bias_regularizer: None,
            trainable_initial_state: false,
            extra_feedback_state_size: 0,
            kernel_path: KernelPath::default(),
        }
    }

    pub fn with_output_activation(mut self, activation: ActivationSpec) -> Self {
        self.output_activation = activation;
        self
    }

    pub fn with_recurrent_activation(mut self, activation: ActivationSpec) -> Self {
        self.recurrent_activation = activation;
        self
    }

    pub fn with_use_bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }

    pub fn with_kernel_initializer(mut self, initializer: InitializerSpec) -> Self {
        self.kernel_initializer = initializer;
        self
    }

    pub fn with_recurrent_initializer(mut self, initializer: InitializerSpec) -> Self {
        self.recurrent_initializer = initializer;
        self
    }

    pub fn with_bias_initializer(mut self, initializer: InitializerSpec) -> Self {
        self.bias_initializer = initializer;
        self
    }

    pub fn with_initial_state_initializer(mut self, initializer: InitializerSpec) -> Self {
        self.initial_state_initializer = initializer;
        self
    }

    pub fn with_output_kernel_regularizer(mut self, regularizer: Regularizer) -> Self {
        self.output_kernel_regularizer = Some(regularizer);
        self
    }

    pub fn with_output_bias_regularizer(mut self, regularizer: Regularizer) -> Self {
        self.output_bias_regularizer = Some(regularizer);
        self
    }

    pub fn with_recurrent_kernel_regularizer(mut self, regularizer: Regularizer) -> Self {
        self.recurrent_kernel_regularizer = Some(regularizer);
        self
    }

    pub fn with_recurrent_bias_regularizer(mut self, regularizer: Regularizer) -> Self {
        self.recurrent_bias_regularizer = Some(regularizer);
        self
    }

    pub fn with_trainable_initial_state(mut self, trainable: bool) -> Self {
        self.trainable_initial_state = trainable;
        self
    }

    pub fn with_extra_feedback_state_size(mut self, size: usize) -> Self {
        self.extra_feedback_state_size = size;
        self
    }

    pub fn with_kernel_path(mut self, path: KernelPath) -> Self {
        self.kernel_path = path;
        self
    }

    /// Width of `[input, state, extra_state]`.
    pub fn combined_dim(&self) -> usize {
        self.input_dim + self.state_size + self.extra_feedback_state_size
    }

    pub fn is_stateful(&self) -> bool {
        self.state_size > 0
    }

    /// Check dimensions, initializers and regularizers without allocating.
    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        if self.input_dim == 0 {
            return Err(ConfigurationError::InvalidParameter {
                name: "input_dim",
                value: 0.0,
                reason: "must be positive",
            });
        }
        if self.output_dim == 0 {
            return Err(ConfigurationError::InvalidParameter {
                name: "output_dim",
                value: 0.0,
                reason: "must be positive",
            });
        }

        for initializer in [
            &self.kernel_initializer,
            &self.recurrent_initializer,
            &self.bias_initializer,
            &self.initial_state_initializer,
        ] {
            initializer.validate()?;
        }

        for regularizer in [
            &self.output_kernel_regularizer,
            &self.output_bias_regularizer,
            &self.recurrent_kernel_regularizer,
            &self.recurrent_bias_regularizer,
        ]
        .into_iter()
        .flatten()
        {
            regularizer.validate()?;
        }

        Ok(())
    }

    /// Validate the config and allocate a cell on `device`.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> std::result::Result<RecurrentCell<B>, ConfigurationError> {
        self.validate()?;
        let output_activation = self.output_activation.build_with_path(self.kernel_path)?;
        let recurrent_activation = self.recurrent_activation.build_with_path(self.kernel_path)?;

        let combined = self.combined_dim();
        let stateful = self.is_stateful();

        let output_kernel =
            Param::from_tensor(self.kernel_initializer.init([combined, self.output_dim], device));
        let recurrent_kernel = stateful.then(|| {
            Param::from_tensor(
                self.recurrent_initializer
                    .init([combined, self.state_size], device),
            )
        });
        let output_bias = self
            .use_bias
            .then(|| Param::from_tensor(self.bias_initializer.init([self.output_dim], device)));
        let recurrent_bias = (self.use_bias && stateful)
            .then(|| Param::from_tensor(self.bias_initializer.init([self.state_size], device)));
        let initial_state = stateful.then(|| {
            Param::from_tensor(self.initial_state_initializer.init([self.state_size], device))
                .set_require_grad(self.trainable_initial_state)
        });

        tracing::debug!(
            input_dim = self.input_dim,
            output_dim = self.output_dim,
            state_size = self.state_size,
            extra_feedback_state_size = self.extra_feedback_state_size,
            "built recurrent cell"
        );

        Ok(RecurrentCell {
            config: Ignored(self.clone()),
            index: 0,
            output_activation: Ignored(output_activation),
            recurrent_activation: Ignored(recurrent_activation),
            output_kernel,
            recurrent_kernel,
            output_bias,
            recurrent_bias,
            initial_state,
        })
    }
}

/// Tensor payload of a [`Weight`].
#[derive(Debug, Clone)]
pub enum WeightTensor<B: Backend> {
    Matrix(Tensor<B, 2>),
    Vector(Tensor<B, 1>),
}

impl<B: Backend> WeightTensor<B> {
    pub fn dims(&self) -> Vec<usize> {
        match self {
            WeightTensor::Matrix(t) => t.dims().to_vec(),
            WeightTensor::Vector(t) => t.dims().to_vec(),
        }
    }

    pub fn into_flat(self) -> Tensor<B, 1> {
        match self {
            WeightTensor::Matrix(t) => t.flatten(0, 1),
            WeightTensor::Vector(t) => t,
        }
    }
}

/// A named view of one cell weight.
#[derive(Debug, Clone)]
pub struct Weight<B: Backend> {
    pub name: String,
    pub tensor: WeightTensor<B>,
    pub trainable: bool,
}

/// A recurrent cell.
///
/// # Type Parameters
/// * `B` - The backend type
#[derive(Module, Debug)]
pub struct RecurrentCell<B: Backend> {
    config: Ignored<RecurrentCellConfig>,
    /// Position in the owning stack; used for weight names and errors.
    #[module(skip)]
    index: usize,
    output_activation: Ignored<Activation>,
    recurrent_activation: Ignored<Activation>,
    output_kernel: Param<Tensor<B, 2>>,
    recurrent_kernel: Option<Param<Tensor<B, 2>>>,
    output_bias: Option<Param<Tensor<B, 1>>>,
    recurrent_bias: Option<Param<Tensor<B, 1>>>,
    initial_state: Option<Param<Tensor<B, 1>>>,
}

impl<B: Backend> RecurrentCell<B> {
    /// Set the cell's position in its stack.
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn config(&self) -> &RecurrentCellConfig {
        &self.config.0
    }

    pub fn input_dim(&self) -> usize {
        self.config.0.input_dim
    }

    pub fn output_dim(&self) -> usize {
        self.config.0.output_dim
    }

    pub fn state_size(&self) -> usize {
        self.config.0.state_size
    }

    pub fn extra_feedback_state_size(&self) -> usize {
        self.config.0.extra_feedback_state_size
    }

    pub fn is_stateful(&self) -> bool {
        self.config.0.is_stateful()
    }

    /// Replace the output kernel, shape `[combined_dim, output_dim]`.
    pub fn with_output_kernel(
        mut self,
        values: Array2<f32>,
        device: &B::Device,
    ) -> std::result::Result<Self, ConfigurationError> {
        let expected = [self.config.0.combined_dim(), self.config.0.output_dim];
        check_shape(self.weight_name("output_kernel"), &expected, values.shape())?;
        self.output_kernel = Param::from_tensor(matrix_from_array(&values, device));
        Ok(self)
    }

    /// Replace the recurrent kernel, shape `[combined_dim, state_size]`.
    pub fn with_recurrent_kernel(
        mut self,
        values: Array2<f32>,
        device: &B::Device,
    ) -> std::result::Result<Self, ConfigurationError> {
        let name = self.weight_name("recurrent_kernel");
        if !self.is_stateful() {
            return Err(absent_weight(name, values.shape()));
        }
        let expected = [self.config.0.combined_dim(), self.config.0.state_size];
        check_shape(name, &expected, values.shape())?;
        self.recurrent_kernel = Some(Param::from_tensor(matrix_from_array(&values, device)));
        Ok(self)
    }

    pub fn with_output_bias(
        mut self,
        values: Array1<f32>,
        device: &B::Device,
    ) -> std::result::Result<Self, ConfigurationError> {
        let name = self.weight_name("output_bias");
        if !self.config.0.use_bias {
            return Err(absent_weight(name, values.shape()));
        }
        check_shape(name, &[self.config.0.output_dim], values.shape())?;
        self.output_bias = Some(Param::from_tensor(vector_from_array(&values, device)));
        Ok(self)
    }

    pub fn with_recurrent_bias(
        mut self,
        values: Array1<f32>,
        device: &B::Device,
    ) -> std::result::Result<Self, ConfigurationError> {
        let name = self.weight_name("recurrent_bias");
        if !self.config.0.use_bias || !self.is_stateful() {
            return Err(absent_weight(name, values.shape()));
        }
        check_shape(name, &[self.config.0.state_size], values.shape())?;
        self.recurrent_bias = Some(Param::from_tensor(vector_from_array(&values, device)));
        Ok(self)
    }

    /// Replace the initial state. Trainability follows the config.
    pub fn with_initial_state(
        mut self,
        values: Array1<f32>,
        device: &B::Device,
    ) -> std::result::Result<Self, ConfigurationError> {
        let name = self.weight_name("initial_state");
        if !self.is_stateful() {
            return Err(absent_weight(name, values.shape()));
        }
        check_shape(name, &[self.config.0.state_size], values.shape())?;
        self.initial_state = Some(
            Param::from_tensor(vector_from_array(&values, device))
                .set_require_grad(self.config.0.trainable_initial_state),
        );
        Ok(self)
    }

    /// `initial_state` tiled to `[batch_size, state_size]`, or `None` if stateless.
    pub fn get_initial_state(&self, batch_size: usize) -> Option<Tensor<B, 2>> {
        self.initial_state
            .as_ref()
            .map(|state| state.val().unsqueeze::<2>().repeat_dim(0, batch_size))
    }

    /// All weights, in the order output kernel, recurrent kernel, output bias,
    /// recurrent bias, initial state.
    pub fn weights(&self) -> Vec<Weight<B>> {
        let mut weights = vec![Weight {
            name: self.weight_name("output_kernel"),
            tensor: WeightTensor::Matrix(self.output_kernel.val()),
            trainable: true,
        }];

        if let Some(kernel) = &self.recurrent_kernel {
            weights.push(Weight {
                name: self.weight_name("recurrent_kernel"),
                tensor: WeightTensor::Matrix(kernel.val()),
                trainable: true,
            });
        }
        if let Some(bias) = &self.output_bias {
            weights.push(Weight {
                name: self.weight_name("output_bias"),
                tensor: WeightTensor::Vector(bias.val()),
                trainable: true,
            });
        }
        if let Some(bias) = &self.recurrent_bias {
            weights.push(Weight {
                name: self.weight_name("recurrent_bias"),
                tensor: WeightTensor::Vector(bias.val()),
                trainable: true,
            });
        }
        if let Some(state) = &self.initial_state {
            weights.push(Weight {
                name: self.weight_name("initial_state"),
                tensor: WeightTensor::Vector(state.val()),
                trainable: self.config.0.trainable_initial_state,
            });
        }

        weights
    }

    pub fn trainable_weights(&self) -> Vec<Weight<B>> {
        self.weights().into_iter().filter(|w| w.trainable).collect()
    }

    /// Sum of every configured regularizer applied to its weight.
    pub fn regularization_loss(&self) -> Tensor<B, 1> {
        let kernel = self.output_kernel.val();
        let mut loss = Tensor::<B, 1>::zeros([1], &kernel.device());

        if let Some(reg) = &self.config.0.output_kernel_regularizer {
            loss = loss + reg.penalty(kernel);
        }
        if let (Some(reg), Some(bias)) = (
            &self.config.0.output_bias_regularizer,
            &self.output_bias,
        ) {
            loss = loss + reg.penalty(bias.val());
        }
        if let (Some(reg), Some(kernel)) = (
            &self.config.0.recurrent_kernel_regularizer,
            &self.recurrent_kernel,
        ) {
            loss = loss + reg.penalty(kernel.val());
        }
        if let (Some(reg), Some(bias)) = (
            &self.config.0.recurrent_bias_regularizer,
            &self.recurrent_bias,
        ) {
            loss = loss + reg.penalty(bias.val());
        }

        loss
    }

    fn weight_name(&self, weight: &str) -> String {
        format!("cell{}_{}", self.index, weight)
    }
}

impl<B: ActivationBackend> RecurrentCell<B> {
    /// Run one timestep.
    ///
    /// `extra_state` is the fed-back final-cell state. When the cell has
    /// feedback features but `extra_state` is `None` (first timestep), the
    /// slot is filled with zeros.
    pub fn call(
        &self,
        input: Tensor<B, 2>,
        prev_state: Option<Tensor<B, 2>>,
        extra_state: Option<Tensor<B, 2>>,
    ) -> Result<(Tensor<B, 2>, Option<Tensor<B, 2>>)> {
        let cell = self.index;
        let [batch_size, input_width] = input.dims();
        if input_width != self.config.0.input_dim {
            return Err(ShapeContractError::InputWidth {
                cell,
                expected: self.config.0.input_dim,
                actual: input_width,
            }
            .into());
        }

        let device = input.device();
        let mut parts = vec![input];

        match (prev_state, self.config.0.state_size) {
            (Some(_), 0) => return Err(ShapeContractError::UnexpectedState { cell }.into()),
            (None, 0) => {}
            (None, _) => return Err(ShapeContractError::MissingState { cell }.into()),
            (Some(state), state_size) => {
                let [batch, width] = state.dims();
                check_batch(cell, batch_size, batch)?;
                if width != state_size {
                    return Err(ShapeContractError::StateWidth {
                        cell,
                        expected: state_size,
                        actual: width,
                    }
                    .into());
                }
                parts.push(state);
            }
        }

        match (extra_state, self.config.0.extra_feedback_state_size) {
            (Some(_), 0) => return Err(ShapeContractError::UnexpectedExtraState { cell }.into()),
            (None, 0) => {}
            (None, extra) => parts.push(Tensor::zeros([batch_size, extra], &device)),
            (Some(state), extra) => {
                let [batch, width] = state.dims();
                check_batch(cell, batch_size, batch)?;
                if width != extra {
                    return Err(ShapeContractError::ExtraStateWidth {
                        cell,
                        expected: extra,
                        actual: width,
                    }
                    .into());
                }
                parts.push(state);
            }
        }

        let combined = if parts.len() == 1 {
            parts.remove(0)
        } else {
            Tensor::cat(parts, 1)
        };

        let output = self.output_activation.0.forward(dense(
            combined.clone(),
            &self.output_kernel,
            self.output_bias.as_ref(),
        ));

        let next_state = self.recurrent_kernel.as_ref().map(|kernel| {
            self.recurrent_activation
                .0
                .forward(dense(combined, kernel, self.recurrent_bias.as_ref()))
        });

        Ok((output, next_state))
    }
}

fn dense<B: Backend>(
    x: Tensor<B, 2>,
    kernel: &Param<Tensor<B, 2>>,
    bias: Option<&Param<Tensor<B, 1>>>,
) -> Tensor<B, 2> {
    let y = x.matmul(kernel.val());
    match bias {
        Some(bias) => y + bias.val().unsqueeze::<2>(),
        None => y,
    }
}

fn check_batch(cell: usize, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(ShapeContractError::BatchMismatch {
            cell,
            expected,
            actual,
        }
        .into());
    }
    Ok(())
}

fn check_shape(
    weight: String,
    expected: &[usize],
    actual: &[usize],
) -> std::result::Result<(), ConfigurationError> {
    if expected != actual {
        return Err(ConfigurationError::WeightShape {
            weight,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        });
    }
    Ok(())
}

/// The cell has no such weight (stateless or bias-free).
fn absent_weight(weight: String, actual: &[usize]) -> ConfigurationError {
    ConfigurationError::WeightShape {
        weight,
        expected: Vec::new(),
        actual: actual.to_vec(),
    }
}

fn matrix_from_array<B: Backend>(values: &Array2<f32>, device: &B::Device) -> Tensor<B, 2> {
    let (rows, cols) = values.dim();
    let data: Vec<f32> = values.iter().copied().collect();
    Tensor::<B, 1>::from_floats(data.as_slice(), device).reshape([rows, cols])
}

fn vector_from_array<B: Backend>(values: &Array1<f32>, device: &B::Device) -> Tensor<B, 1> {
    let data: Vec<f32> = values.iter().copied().collect();
    Tensor::<B, 1>::from_floats(data.as_slice(), device)
}
