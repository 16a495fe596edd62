//! Integration tests for the recurrent cell

use ameo_rnn::activation::{ActivationSpec, KernelPath};
use ameo_rnn::cells::{RecurrentCell, RecurrentCellConfig, WeightTensor};
use ameo_rnn::error::{ConfigurationError, Error, ShapeContractError};
use ameo_rnn::initializer::InitializerSpec;
use ameo_rnn::regularizer::SparseRegularizer;
use burn::backend::{Autodiff, NdArray};
use burn::tensor::{Distribution, Tensor};
use ndarray::Array2;

type Backend = NdArray<f32>;

fn create_test_cell(path: KernelPath) -> RecurrentCell<Backend> {
    let device = Default::default();
    RecurrentCellConfig::new(6, 4, 5)
        .with_output_activation(ActivationSpec::InterpolatedAmeo {
            factor: 0.5,
            leakyness: 0.05,
        })
        .with_recurrent_activation(ActivationSpec::LeakyAmeo { leakyness: 0.1 })
        .with_kernel_initializer(InitializerSpec::Ones)
        .with_recurrent_initializer(InitializerSpec::Uniform {
            low: -0.5,
            high: 0.5,
        })
        .with_bias_initializer(InitializerSpec::Zeros)
        .with_kernel_path(path)
        .init(&device)
        .unwrap()
}

#[test]
fn test_cell_creation() {
    let cell = create_test_cell(KernelPath::Reference);

    assert_eq!(cell.input_dim(), 6);
    assert_eq!(cell.output_dim(), 4);
    assert_eq!(cell.state_size(), 5);
    assert_eq!(cell.extra_feedback_state_size(), 0);
    assert!(cell.is_stateful());
}

#[test]
fn test_cell_paths_agree() {
    let device = Default::default();
    let reference = create_test_cell(KernelPath::Reference);
    let recurrent_kernel = match &reference.weights()[1].tensor {
        WeightTensor::Matrix(t) => t.clone(),
        WeightTensor::Vector(_) => unreachable!(),
    };
    let values = recurrent_kernel.into_data().to_vec::<f32>().unwrap();
    let fused = create_test_cell(KernelPath::Fused)
        .with_recurrent_kernel(Array2::from_shape_vec((11, 5), values).unwrap(), &device)
        .unwrap();

    let input = Tensor::<Backend, 2>::random([3, 6], Distribution::Uniform(-1.0, 1.0), &device);
    let state = reference.get_initial_state(3);

    let (out_ref, state_ref) = reference.call(input.clone(), state.clone(), None).unwrap();
    let (out_fused, state_fused) = fused.call(input, state, None).unwrap();

    assert!((out_ref - out_fused).abs().max().into_scalar() < 1e-5);
    assert!(
        (state_ref.unwrap() - state_fused.unwrap())
            .abs()
            .max()
            .into_scalar()
            < 1e-5
    );
}

#[test]
fn test_cell_outputs_bounded_by_hard_ameo() {
    let device = Default::default();
    let cell = RecurrentCellConfig::new(3, 8, 0)
        .with_output_activation(ActivationSpec::Ameo)
        .init::<Backend>(&device)
        .unwrap();

    let input = Tensor::<Backend, 2>::random([16, 3], Distribution::Uniform(-10.0, 10.0), &device);
    let (output, _) = cell.call(input, None, None).unwrap();

    assert!(output.abs().max().into_scalar() <= 1.0);
}

#[test]
fn test_cell_batch_mismatch() {
    let device = Default::default();
    let cell = create_test_cell(KernelPath::Reference);

    let input = Tensor::<Backend, 2>::zeros([2, 6], &device);
    let err = cell
        .call(input, cell.get_initial_state(3), None)
        .unwrap_err();

    assert_eq!(
        err,
        Error::ShapeContract(ShapeContractError::BatchMismatch {
            cell: 0,
            expected: 2,
            actual: 3
        })
    );
}

#[test]
fn test_cell_stateless_rejects_state() {
    let device = Default::default();
    let cell = RecurrentCellConfig::new(2, 2, 0)
        .init::<Backend>(&device)
        .unwrap();

    let err = cell
        .call(
            Tensor::zeros([1, 2], &device),
            Some(Tensor::zeros([1, 1], &device)),
            None,
        )
        .unwrap_err();
    assert_eq!(
        err,
        Error::ShapeContract(ShapeContractError::UnexpectedState { cell: 0 })
    );
}

#[test]
fn test_regularization_gradient_reaches_kernel() {
    let device = Default::default();
    let cell = RecurrentCellConfig::new(4, 4, 0)
        .with_kernel_initializer(InitializerSpec::Uniform {
            low: 0.02,
            high: 0.08,
        })
        .with_output_kernel_regularizer(SparseRegularizer::default().into())
        .init::<Autodiff<Backend>>(&device)
        .unwrap();

    let grads = cell.regularization_loss().backward();
    let kernel = match &cell.weights()[0].tensor {
        WeightTensor::Matrix(t) => t.clone(),
        WeightTensor::Vector(_) => unreachable!(),
    };
    let grad = kernel.grad(&grads).unwrap();

    // Every weight sits below the threshold, so the penalty pushes it down.
    assert!(grad.min().into_scalar() > 0.0);
}

#[test]
fn test_empty_uniform_range_is_rejected_before_init() {
    let device = Default::default();
    let result = RecurrentCellConfig::new(2, 2, 2)
        .with_kernel_initializer(InitializerSpec::Uniform {
            low: 0.5,
            high: 0.5,
        })
        .init::<Backend>(&device);

    assert!(matches!(
        result,
        Err(ConfigurationError::InvalidParameter { name: "low", .. })
    ));
}
