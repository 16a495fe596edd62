//! Gradient check for the AMEO activations
//!
//! Compares the gradient registered with Burn's autodiff against a central
//! finite difference, for each AMEO variant and both kernel paths.

use ameo_rnn::activation::{apply_kernel, AmeoKernel, KernelPath};
use burn::backend::{Autodiff, NdArray};
use burn::tensor::Tensor;

type Backend = NdArray<f32>;

const STEP: f32 = 1e-3;

fn main() {
    println!("=== AMEO Gradient Check ===\n");

    let device = Default::default();
    let points: Vec<f32> = (0..=20).map(|i| -4.75 + i as f32 * 0.475).collect();

    let kernels = [
        ("ameo", AmeoKernel::hard()),
        ("leaky_ameo(0.05)", AmeoKernel::leaky(0.05)),
        ("interpolated_ameo(0.5, 0.05)", AmeoKernel::interpolated(0.5, 0.05)),
    ];

    for (name, kernel) in kernels {
        for path in [KernelPath::Reference, KernelPath::Fused] {
            let kernel = kernel.with_path(path);

            let x = Tensor::<Autodiff<Backend>, 1>::from_floats(points.as_slice(), &device)
                .require_grad();
            let grads = apply_kernel(kernel, x.clone()).sum().backward();
            let analytic: Vec<f32> = match x.grad(&grads) {
                Some(grad) => grad.into_data().iter::<f32>().collect(),
                None => {
                    println!("  {} ({:?}): no gradient recorded", name, path);
                    continue;
                }
            };

            let max_error = points
                .iter()
                .zip(analytic.iter())
                .map(|(&x, &a)| {
                    let numeric =
                        (kernel.value(x + STEP) - kernel.value(x - STEP)) / (2.0 * STEP);
                    (a - numeric).abs()
                })
                .fold(0.0f32, f32::max);

            println!(
                "{:<30} {:<10} max |analytic - numeric| = {:.2e}",
                name,
                format!("{:?}", path),
                max_error
            );
        }
    }

    println!();
    println!("Sample values (x, ameo, d ameo / dx):");
    for &x in points.iter().step_by(4) {
        let kernel = AmeoKernel::hard();
        println!("  {:>6.3}  {:>7.3}  {:>5.1}", x, kernel.value(x), kernel.slope(x));
    }
    println!();

    println!("=== Gradient check completed! ===");
}
