//! Basic usage example of an AMEO recurrent stack
//!
//! Builds a two-cell stack, runs a random batch through it and prints the
//! resulting shapes and regularization loss.

use ameo_rnn::prelude::*;
use burn::backend::NdArray;
use burn::tensor::{Distribution, Tensor};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== AMEO-RNN Basic Example ===\n");

    // Use the NdArray backend (CPU)
    type Backend = NdArray<f32>;
    let device = Default::default();

    // Example 1: Two stateful cells, outputs at every timestep
    println!("Example 1: Full sequence output");
    let stack = RecurrentStackConfig::new(vec![
        RecurrentCellConfig::new(8, 16, 12)
            .with_output_activation(ActivationSpec::LeakyAmeo { leakyness: 0.05 })
            .with_recurrent_activation(ActivationSpec::Ameo)
            .with_output_kernel_regularizer(SparseRegularizer::default().into()),
        RecurrentCellConfig::new(16, 2, 4).with_output_activation(ActivationSpec::Linear),
    ])
    .init::<Backend>(&device)?;

    println!("Created stack:");
    println!("  Cells:      {}", stack.cells().len());
    println!("  Input dim:  {}", stack.input_dim());
    println!("  Output dim: {}", stack.output_dim());
    println!();

    // Input shape: [batch=4, seq=10, features=8]
    let input = Tensor::<Backend, 3>::random([4, 10, 8], Distribution::Uniform(-3.0, 3.0), &device);
    let out = stack.forward(input.clone())?;

    println!("  Input shape:  [4, 10, 8]");
    println!("  Output shape: {:?}", out.output.dims());
    println!();

    // Example 2: Last timestep plus final states
    println!("Example 2: Last timestep and final states");
    let stack = stack.with_return_sequences(false).with_return_state(true);
    let out = stack.forward(input)?;

    println!("  Output shape: {:?}", out.output.dims());
    for (i, state) in out.states.unwrap_or_default().iter().enumerate() {
        match state {
            Some(state) => println!("  Cell {} state: {:?}", i, state.dims()),
            None => println!("  Cell {} is stateless", i),
        }
    }
    println!();

    // Example 3: Weights and regularization
    println!("Example 3: Trainable weights");
    for weight in stack.trainable_weights() {
        println!("  {:<24} {:?}", weight.name, weight.tensor.dims());
    }
    println!(
        "  Regularization loss: {:.6}",
        stack.regularization_loss().into_scalar()
    );
    println!();

    println!("=== Example completed successfully! ===");
    Ok(())
}
