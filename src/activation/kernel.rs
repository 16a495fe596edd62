//! AMEO kernels: forward values and exact analytic derivatives.
//!
//! Every shape is available through two evaluation paths:
//!
//! - [`KernelPath::Reference`] composes Burn tensor ops (`mask_where`, clamps,
//!   polynomial arithmetic) and runs on any backend. The hard shape is evaluated
//!   in the rescaled coordinate `u = 0.5x - 0.5`.
//! - [`KernelPath::Fused`] is a host-side single pass: it reads the tensor back
//!   to the CPU, evaluates the scalar piecewise formula per element and uploads
//!   the result. The hard shape uses the breakpoints `[-3, -1, 1, 3]` directly
//!   on `x`. On a CPU backend this avoids the intermediate mask tensors; on an
//!   accelerator the round trip makes it slower than the reference path.
//!
//! Both paths describe the same function and are checked against each other in
//! the test suite.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// Slope used outside `[-3, 3]` when a descriptor omits `leakyness`.
pub const DEFAULT_LEAKYNESS: f32 = 0.05;

/// The three members of the AMEO family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AmeoShape {
    /// Hard piecewise-linear shape mapping the real line onto `[-1, 1]`.
    Hard,
    /// Quartic-spline smoothing of [`AmeoShape::Hard`] with a constant slope
    /// outside the saturated region.
    Leaky { leakyness: f32 },
    /// `factor * Hard + (1 - factor) * Leaky`.
    Interpolated { factor: f32, leakyness: f32 },
}

/// How a kernel is evaluated on a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelPath {
    /// Composed tensor operations; runs wherever the backend runs.
    #[default]
    Reference,
    /// Host-side single pass with the scalar formula. Copies the tensor to the
    /// CPU and back, so prefer [`KernelPath::Reference`] on accelerators.
    Fused,
}

/// A fully-parameterized AMEO kernel.
///
/// This is the state carried by the custom backward op, so it stays `Copy`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmeoKernel {
    shape: AmeoShape,
    path: KernelPath,
}

impl AmeoKernel {
    pub fn hard() -> Self {
        Self {
            shape: AmeoShape::Hard,
            path: KernelPath::Reference,
        }
    }

    pub fn leaky(leakyness: f32) -> Self {
        Self {
            shape: AmeoShape::Leaky { leakyness },
            path: KernelPath::Reference,
        }
    }

    pub fn interpolated(factor: f32, leakyness: f32) -> Self {
        Self {
            shape: AmeoShape::Interpolated { factor, leakyness },
            path: KernelPath::Reference,
        }
    }

    /// Select the evaluation path (default: [`KernelPath::Reference`]).
    pub fn with_path(mut self, path: KernelPath) -> Self {
        self.path = path;
        self
    }

    pub fn shape(&self) -> AmeoShape {
        self.shape
    }

    pub fn path(&self) -> KernelPath {
        self.path
    }

    /// Scalar forward value.
    pub fn value(&self, x: f32) -> f32 {
        match self.shape {
            AmeoShape::Hard => ameo(x),
            AmeoShape::Leaky { leakyness } => leaky_ameo(leakyness, x),
            AmeoShape::Interpolated { factor, leakyness } => {
                factor * ameo(x) + (1.0 - factor) * leaky_ameo(leakyness, x)
            }
        }
    }

    /// Scalar derivative `dy/dx`.
    pub fn slope(&self, x: f32) -> f32 {
        match self.shape {
            AmeoShape::Hard => ameo_grad(x),
            AmeoShape::Leaky { leakyness } => leaky_ameo_grad(leakyness, x),
            AmeoShape::Interpolated { factor, leakyness } => {
                factor * ameo_grad(x) + (1.0 - factor) * leaky_ameo_grad(leakyness, x)
            }
        }
    }

    /// Evaluate the forward value on a flat tensor.
    pub fn forward<B: Backend>(&self, x: Tensor<B, 1>) -> Tensor<B, 1> {
        match self.path {
            KernelPath::Fused => fused_map(x, |v| self.value(v)),
            KernelPath::Reference => match self.shape {
                AmeoShape::Hard => hard_reference(x),
                AmeoShape::Leaky { leakyness } => leaky_reference(x, leakyness),
                AmeoShape::Interpolated { factor, leakyness } => {
                    let hard = hard_reference(x.clone()).mul_scalar(factor);
                    let leaky = leaky_reference(x, leakyness).mul_scalar(1.0 - factor);
                    hard + leaky
                }
            },
        }
    }

    /// Evaluate `dy/dx` on a flat tensor.
    pub fn derivative<B: Backend>(&self, x: Tensor<B, 1>) -> Tensor<B, 1> {
        match self.path {
            KernelPath::Fused => fused_map(x, |v| self.slope(v)),
            KernelPath::Reference => match self.shape {
                AmeoShape::Hard => hard_derivative_reference(x),
                AmeoShape::Leaky { leakyness } => leaky_derivative_reference(x, leakyness),
                AmeoShape::Interpolated { factor, leakyness } => {
                    let hard = hard_derivative_reference(x.clone()).mul_scalar(factor);
                    let leaky =
                        leaky_derivative_reference(x, leakyness).mul_scalar(1.0 - factor);
                    hard + leaky
                }
            },
        }
    }
}

/// Hard AMEO on raw `x`.
///
/// ```text
/// x <= -3  -> -1
/// x <= -1  -> x + 2
/// x <=  1  -> -x
/// x <=  3  -> x - 2
/// else     -> 1
/// ```
pub fn ameo(x: f32) -> f32 {
    if x <= -3.0 {
        -1.0
    } else if x <= -1.0 {
        x + 2.0
    } else if x <= 1.0 {
        -x
    } else if x <= 3.0 {
        x - 2.0
    } else {
        1.0
    }
}

/// Derivative of [`ameo`]. Each breakpoint takes the slope of the segment that
/// ends there (`-3 < x <= -1` is rising, and so on).
pub fn ameo_grad(x: f32) -> f32 {
    if x <= -3.0 {
        0.0
    } else if x <= -1.0 {
        1.0
    } else if x <= 1.0 {
        -1.0
    } else if x <= 3.0 {
        1.0
    } else {
        0.0
    }
}

/// Leaky AMEO: quartic spline in `u = 0.5x - 0.5`, output rescaled by
/// `(p(u) - 0.5) * 2`.
pub fn leaky_ameo(leakyness: f32, x: f32) -> f32 {
    let u = x * 0.5 - 0.5;

    let y = if u <= -2.0 {
        leakyness * (u + 2.0)
    } else if u <= -1.5 {
        8.0 * (u + 2.0).powi(4)
    } else if u <= -0.5 {
        1.0 - 8.0 * (u + 1.0).powi(4)
    } else if u <= 0.5 {
        8.0 * u.powi(4)
    } else if u <= 1.0 {
        1.0 - 8.0 * (u - 1.0).powi(4)
    } else {
        leakyness * (u - 1.0) + 1.0
    };

    (y - 0.5) * 2.0
}

/// Derivative of [`leaky_ameo`] with respect to `x`.
///
/// The input rescale contributes a factor of `0.5` and the output rescale a
/// factor of `2`, so this is exactly `p'(u)`.
pub fn leaky_ameo_grad(leakyness: f32, x: f32) -> f32 {
    let u = x * 0.5 - 0.5;

    if u <= -2.0 {
        leakyness
    } else if u <= -1.5 {
        32.0 * (u + 2.0).powi(3)
    } else if u <= -0.5 {
        -32.0 * (u + 1.0).powi(3)
    } else if u <= 0.5 {
        32.0 * u.powi(3)
    } else if u <= 1.0 {
        -32.0 * (u - 1.0).powi(3)
    } else {
        leakyness
    }
}

/// Read the tensor back, apply `f` per element and upload the result on the
/// same device. Blocks until the readback completes.
fn fused_map<B: Backend>(x: Tensor<B, 1>, f: impl Fn(f32) -> f32) -> Tensor<B, 1> {
    let device = x.device();
    let values: Vec<f32> = x.into_data().iter::<f32>().map(f).collect();
    Tensor::<B, 1>::from_floats(values.as_slice(), &device)
}

fn rescale<B: Backend>(x: Tensor<B, 1>) -> Tensor<B, 1> {
    x.mul_scalar(0.5).sub_scalar(0.5)
}

fn hard_reference<B: Backend>(x: Tensor<B, 1>) -> Tensor<B, 1> {
    let u = rescale(x);

    let rising = u.clone().add_scalar(2.0).clamp_min(0.0);
    let falling = u.clone().neg();
    let upper = u.clone().clamp_max(1.0);

    let y = upper
        .mask_where(u.clone().lower_equal_elem(0.0), falling)
        .mask_where(u.lower_equal_elem(-1.0), rising);

    y.sub_scalar(0.5).mul_scalar(2.0)
}

fn hard_derivative_reference<B: Backend>(x: Tensor<B, 1>) -> Tensor<B, 1> {
    let u = rescale(x);

    // Each mask overrides everything to its right.
    u.zeros_like()
        .mask_fill(u.clone().greater_elem(-2.0), 1.0)
        .mask_fill(u.clone().greater_elem(-1.0), -1.0)
        .mask_fill(u.clone().greater_elem(0.0), 1.0)
        .mask_fill(u.greater_elem(1.0), 0.0)
}

fn cubic<B: Backend>(v: Tensor<B, 1>) -> Tensor<B, 1> {
    v.clone() * v.clone() * v
}

fn quartic<B: Backend>(v: Tensor<B, 1>) -> Tensor<B, 1> {
    let v2 = v.clone() * v;
    v2.clone() * v2
}

fn leaky_reference<B: Backend>(x: Tensor<B, 1>, leakyness: f32) -> Tensor<B, 1> {
    let u = rescale(x);
    // Quartics stay centered on their knots; expanded forms cancel in f32.
    let lower_leak = u.clone().add_scalar(2.0).mul_scalar(leakyness);
    let rise = quartic(u.clone().add_scalar(2.0)).mul_scalar(8.0);
    let peak = quartic(u.clone().add_scalar(1.0)).mul_scalar(-8.0).add_scalar(1.0);
    let valley = quartic(u.clone()).mul_scalar(8.0);
    let fall = quartic(u.clone().sub_scalar(1.0)).mul_scalar(-8.0).add_scalar(1.0);
    let upper_leak = u.clone().sub_scalar(1.0).mul_scalar(leakyness).add_scalar(1.0);

    let y = lower_leak
        .mask_where(u.clone().greater_elem(-2.0), rise)
        .mask_where(u.clone().greater_elem(-1.5), peak)
        .mask_where(u.clone().greater_elem(-0.5), valley)
        .mask_where(u.clone().greater_elem(0.5), fall)
        .mask_where(u.greater_elem(1.0), upper_leak);

    y.sub_scalar(0.5).mul_scalar(2.0)
}

fn leaky_derivative_reference<B: Backend>(x: Tensor<B, 1>, leakyness: f32) -> Tensor<B, 1> {
    let u = rescale(x);

    let rise = cubic(u.clone().add_scalar(2.0)).mul_scalar(32.0);
    let peak = cubic(u.clone().add_scalar(1.0)).mul_scalar(-32.0);
    let valley = cubic(u.clone()).mul_scalar(32.0);
    let fall = cubic(u.clone().sub_scalar(1.0)).mul_scalar(-32.0);

    u.zeros_like()
        .add_scalar(leakyness)
        .mask_where(u.clone().greater_elem(-2.0), rise)
        .mask_where(u.clone().greater_elem(-1.5), peak)
        .mask_where(u.clone().greater_elem(-0.5), valley)
        .mask_where(u.clone().greater_elem(0.5), fall)
        .mask_fill(u.greater_elem(1.0), leakyness)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn grid_points() -> Vec<f32> {
        (0..161).map(|i| -4.0 + i as f32 * 0.05).collect()
    }

    fn to_vec(t: Tensor<TestBackend, 1>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_ameo_breakpoints() {
        assert_eq!(ameo(-3.0), -1.0);
        assert_eq!(ameo(-1.0), 1.0);
        assert_eq!(ameo(0.0), 0.0);
        assert_eq!(ameo(1.0), -1.0);
        assert_eq!(ameo(3.0), 1.0);
        assert_eq!(ameo(-10.0), -1.0);
        assert_eq!(ameo(10.0), 1.0);
    }

    #[test]
    fn test_ameo_grad_segments() {
        assert_eq!(ameo_grad(-3.5), 0.0);
        assert_eq!(ameo_grad(-3.0), 0.0);
        assert_eq!(ameo_grad(-2.0), 1.0);
        assert_eq!(ameo_grad(-1.0), 1.0);
        assert_eq!(ameo_grad(0.0), -1.0);
        assert_eq!(ameo_grad(1.0), -1.0);
        assert_eq!(ameo_grad(2.0), 1.0);
        assert_eq!(ameo_grad(3.0), 1.0);
        assert_eq!(ameo_grad(3.5), 0.0);
    }

    #[test]
    fn test_leaky_ameo_matches_hard_at_breakpoints() {
        for leakyness in [0.0f32, 0.05, 0.5] {
            for x in [-3.0f32, -1.0, 1.0, 3.0] {
                assert!((leaky_ameo(leakyness, x) - ameo(x)).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_leaky_ameo_spline_is_c1() {
        // Spline joints in x: u = -1.5, -0.5, 0.5
        for x in [-2.0f32, 0.0, 2.0] {
            let eps = 1e-3;
            let left = leaky_ameo_grad(0.1, x - eps);
            let right = leaky_ameo_grad(0.1, x + eps);
            assert!((left - right).abs() < 0.1, "slope jump at {}", x);
            let v_left = leaky_ameo(0.1, x - 1e-5);
            let v_right = leaky_ameo(0.1, x + 1e-5);
            assert!((v_left - v_right).abs() < 1e-3, "value jump at {}", x);
        }
    }

    #[test]
    fn test_leaky_slope_outside_saturation() {
        assert_eq!(leaky_ameo_grad(0.3, -5.0), 0.3);
        assert_eq!(leaky_ameo_grad(0.3, 5.0), 0.3);
        assert!((leaky_ameo(0.3, 5.0) - (1.0 + 0.3 * 2.0)).abs() < 1e-6);
        assert!((leaky_ameo(0.3, -5.0) - (-1.0 - 0.3 * 2.0)).abs() < 1e-6);
    }

    fn leaky_exact(leakyness: f64, x: f64) -> f64 {
        let u = x * 0.5 - 0.5;
        let y = if u <= -2.0 {
            leakyness * (u + 2.0)
        } else if u <= -1.5 {
            8.0 * (u + 2.0).powi(4)
        } else if u <= -0.5 {
            1.0 - 8.0 * (u + 1.0).powi(4)
        } else if u <= 0.5 {
            8.0 * u.powi(4)
        } else if u <= 1.0 {
            1.0 - 8.0 * (u - 1.0).powi(4)
        } else {
            leakyness * (u - 1.0) + 1.0
        };
        (y - 0.5) * 2.0
    }

    #[test]
    fn test_leaky_ameo_close_to_exact_spline() {
        let device = Default::default();
        let points: Vec<f32> = (0..=600).map(|i| -3.0 + i as f32 * 0.01).collect();
        let x = Tensor::<TestBackend, 1>::from_floats(points.as_slice(), &device);
        let reference = to_vec(AmeoKernel::leaky(0.0).forward(x));

        for (&p, &r) in points.iter().zip(reference.iter()) {
            let exact = leaky_exact(0.0, p as f64);
            let scalar = leaky_ameo(0.0, p) as f64;
            assert!((scalar - exact).abs() < 5e-6, "scalar at {}: {} vs {}", p, scalar, exact);
            assert!((r as f64 - exact).abs() < 5e-6, "reference at {}: {} vs {}", p, r, exact);
        }
    }

    #[test]
    fn test_reference_matches_scalar() {
        let device = Default::default();
        let points = grid_points();

        for kernel in [
            AmeoKernel::hard(),
            AmeoKernel::leaky(0.1),
            AmeoKernel::interpolated(0.3, 0.1),
        ] {
            let x = Tensor::<TestBackend, 1>::from_floats(points.as_slice(), &device);
            let y = to_vec(kernel.forward(x.clone()));
            let dy = to_vec(kernel.derivative(x));

            for (i, &p) in points.iter().enumerate() {
                assert!(
                    (y[i] - kernel.value(p)).abs() < 1e-5,
                    "{:?} value at {}: {} vs {}",
                    kernel.shape(),
                    p,
                    y[i],
                    kernel.value(p)
                );
                assert!(
                    (dy[i] - kernel.slope(p)).abs() < 1e-4,
                    "{:?} slope at {}: {} vs {}",
                    kernel.shape(),
                    p,
                    dy[i],
                    kernel.slope(p)
                );
            }
        }
    }

    #[test]
    fn test_fused_path_preserves_length() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([-4.0f32, 0.0, 4.0], &device);
        let kernel = AmeoKernel::hard().with_path(KernelPath::Fused);
        assert_eq!(kernel.path(), KernelPath::Fused);
        assert_eq!(to_vec(kernel.forward(x)), vec![-1.0, 0.0, 1.0]);
    }
}
