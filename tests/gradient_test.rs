//! Finite-difference checks of the analytic AMEO gradients through autodiff

use ameo_rnn::activation::{apply_kernel, AmeoKernel, KernelPath};
use burn::backend::{Autodiff, NdArray};
use burn::tensor::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

type Backend = NdArray<f32>;
type AutodiffBackend = Autodiff<Backend>;

const POINTS: usize = 1000;
const STEP: f32 = 1e-3;
const TOLERANCE: f32 = 1e-3;
/// Points closer than this to a breakpoint are left out of the tight check.
const BREAKPOINT_MARGIN: f32 = 1e-2;

const HARD_BREAKPOINTS: [f32; 4] = [-3.0, -1.0, 1.0, 3.0];
const LEAKY_BREAKPOINTS: [f32; 5] = [-3.0, -2.0, 0.0, 2.0, 3.0];

fn sample_points(seed: u64, breakpoints: &[f32]) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = Vec::with_capacity(POINTS);
    while points.len() < POINTS {
        let x: f32 = rng.random_range(-5.0..5.0);
        if breakpoints.iter().all(|b| (x - b).abs() > BREAKPOINT_MARGIN) {
            points.push(x);
        }
    }
    points
}

fn evaluate(kernel: AmeoKernel, points: &[f32]) -> Vec<f32> {
    let device = Default::default();
    let x = Tensor::<Backend, 1>::from_floats(points, &device);
    apply_kernel(kernel, x).into_data().to_vec::<f32>().unwrap()
}

fn autodiff_gradient(kernel: AmeoKernel, points: &[f32]) -> Vec<f32> {
    let device = Default::default();
    let x = Tensor::<AutodiffBackend, 1>::from_floats(points, &device).require_grad();
    let grads = apply_kernel(kernel, x.clone()).sum().backward();
    x.grad(&grads)
        .expect("input requires grad")
        .into_data()
        .to_vec::<f32>()
        .unwrap()
}

fn finite_difference(kernel: AmeoKernel, points: &[f32]) -> Vec<f32> {
    let plus: Vec<f32> = points.iter().map(|x| x + STEP).collect();
    let minus: Vec<f32> = points.iter().map(|x| x - STEP).collect();
    let f_plus = evaluate(kernel, &plus);
    let f_minus = evaluate(kernel, &minus);

    f_plus
        .iter()
        .zip(f_minus.iter())
        .zip(plus.iter().zip(minus.iter()))
        .map(|((fp, fm), (xp, xm))| (fp - fm) / (xp - xm))
        .collect()
}

fn check_kernel(kernel: AmeoKernel, seed: u64, breakpoints: &[f32]) {
    let points = sample_points(seed, breakpoints);
    let analytic = autodiff_gradient(kernel, &points);
    let numeric = finite_difference(kernel, &points);

    for ((x, a), n) in points.iter().zip(analytic.iter()).zip(numeric.iter()) {
        assert!(
            (a - n).abs() < TOLERANCE,
            "{:?}: gradient at x = {} is {} but finite difference gives {}",
            kernel,
            x,
            a,
            n
        );
    }
}

fn all_breakpoints() -> Vec<f32> {
    let mut points = HARD_BREAKPOINTS.to_vec();
    points.extend_from_slice(&LEAKY_BREAKPOINTS);
    points
}

#[test]
fn test_ameo_gradient_matches_finite_difference() {
    for path in [KernelPath::Reference, KernelPath::Fused] {
        check_kernel(AmeoKernel::hard().with_path(path), 7, &HARD_BREAKPOINTS);
    }
}

#[test]
fn test_leaky_ameo_gradient_matches_finite_difference() {
    for path in [KernelPath::Reference, KernelPath::Fused] {
        for leakyness in [0.0, 0.05, 0.3] {
            check_kernel(
                AmeoKernel::leaky(leakyness).with_path(path),
                11,
                &LEAKY_BREAKPOINTS,
            );
        }
    }
}

#[test]
fn test_interpolated_ameo_gradient_matches_finite_difference() {
    for path in [KernelPath::Reference, KernelPath::Fused] {
        for factor in [0.0, 0.25, 0.8, 1.0] {
            check_kernel(
                AmeoKernel::interpolated(factor, 0.05).with_path(path),
                13,
                &all_breakpoints(),
            );
        }
    }
}

#[test]
fn test_autodiff_gradient_equals_analytic_slope() {
    let points = sample_points(17, &all_breakpoints());
    for kernel in [
        AmeoKernel::hard(),
        AmeoKernel::leaky(0.05),
        AmeoKernel::interpolated(0.5, 0.1),
    ] {
        let grad = autodiff_gradient(kernel, &points);
        for (x, g) in points.iter().zip(grad.iter()) {
            assert!((g - kernel.slope(*x)).abs() < 1e-4);
        }
    }
}

#[test]
fn test_gradient_through_rank_two_input() {
    let device = Default::default();
    let x = Tensor::<AutodiffBackend, 2>::from_floats([[-2.0, 0.0], [2.0, 5.0]], &device)
        .require_grad();
    let grads = apply_kernel(AmeoKernel::hard(), x.clone())
        .mul_scalar(3.0)
        .sum()
        .backward();
    let grad = x.grad(&grads).unwrap().into_data().to_vec::<f32>().unwrap();

    assert_eq!(grad, vec![3.0, -3.0, 3.0, 0.0]);
}
