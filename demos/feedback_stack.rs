//! Feedback stack example
//!
//! Loads a stack from JSON whose final cell's state is fed back into the first
//! cell at the next timestep, then steps it manually to show the feedback path.

use ameo_rnn::rnn::RecurrentStackConfig;
use burn::backend::NdArray;
use burn::tensor::{Distribution, Tensor};

const CONFIG: &str = r#"{
    "cells": [
        {
            "input_dim": 4,
            "output_dim": 8,
            "state_size": 6,
            "output_activation": {"id": "interpolated_ameo", "factor": 0.5, "leakyness": 0.05},
            "recurrent_activation": "ameo",
            "extra_feedback_state_size": 3
        },
        {
            "input_dim": 8,
            "output_dim": 1,
            "state_size": 3,
            "output_activation": "linear",
            "recurrent_activation": {"id": "leaky_ameo"},
            "recurrent_kernel_regularizer": "sparse",
            "trainable_initial_state": true
        }
    ],
    "return_state": true,
    "feedback_final_cell_state": true
}"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== AMEO-RNN Feedback Example ===\n");

    type Backend = NdArray<f32>;
    let device = Default::default();

    let config = RecurrentStackConfig::from_json(CONFIG)?;
    let stack = config.init::<Backend>(&device)?;

    println!("Loaded stack from JSON:");
    for cell in stack.cells() {
        println!(
            "  cell{}: input {} + state {} + feedback {} -> output {}",
            cell.index(),
            cell.input_dim(),
            cell.state_size(),
            cell.extra_feedback_state_size(),
            cell.output_dim()
        );
    }
    println!();

    // Full sequence
    let input = Tensor::<Backend, 3>::random([2, 6, 4], Distribution::Uniform(-2.0, 2.0), &device);
    let out = stack.forward(input.clone())?;
    println!("Forward over the whole sequence:");
    println!("  Output shape: {:?}", out.output.dims());
    println!();

    // The same unrolling, one step at a time
    println!("Manual stepping:");
    let mut states = stack.initial_states(2);
    let mut feedback = None;
    for t in 0..6 {
        let step_input = input.clone().narrow(1, t, 1).squeeze(1);
        let (output, next_states) = stack.step(step_input, states, feedback)?;
        states = next_states;
        feedback = states.last().cloned().flatten();

        let values: Vec<f32> = output.into_data().iter::<f32>().collect();
        println!("  t = {}: output {:?}", t, values);
    }
    println!();

    println!(
        "Regularization loss: {:.6}",
        stack.regularization_loss().into_scalar()
    );
    println!("\nRound-tripped config:\n{}", config.to_json()?);

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
