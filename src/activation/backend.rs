//! Backend seam where AMEO kernels are registered with a hand-derived gradient.
//!
//! Burn would happily differentiate the composed reference formula, but the
//! piecewise masks and polynomial pieces would then produce gradients from the
//! graph rather than from the exact derivative. Instead, [`ActivationBackend`]
//! exposes one primitive op. Plain backends just evaluate the kernel; the
//! [`Autodiff`] decorator records a custom [`Backward`] step whose gradient is
//! `kernel.derivative(x) * grad_output`.

use crate::activation::kernel::AmeoKernel;
use burn::backend::autodiff::checkpoint::base::Checkpointer;
use burn::backend::autodiff::checkpoint::strategy::CheckpointStrategy;
use burn::backend::autodiff::grads::Gradients;
use burn::backend::autodiff::ops::{Backward, Ops, OpsKind};
use burn::backend::autodiff::{Autodiff, NodeID};
use burn::backend::NdArray;
use burn::tensor::backend::Backend;
use burn::tensor::ops::FloatTensor;
use burn::tensor::{Tensor, TensorPrimitive};

/// A backend that can run AMEO kernels as a single primitive op.
///
/// The primitive is always flat (rank 1); [`apply_kernel`] handles reshaping.
pub trait ActivationBackend: Backend {
    fn ameo_activation(kernel: AmeoKernel, x: FloatTensor<Self>) -> FloatTensor<Self> {
        let x = Tensor::<Self, 1>::from_primitive(TensorPrimitive::Float(x));
        kernel.forward(x).into_primitive().tensor()
    }
}

impl<E, I, Q> ActivationBackend for NdArray<E, I, Q> where Self: Backend {}

impl<B: ActivationBackend, C: CheckpointStrategy> ActivationBackend for Autodiff<B, C> {
    fn ameo_activation(kernel: AmeoKernel, x: FloatTensor<Self>) -> FloatTensor<Self> {
        #[derive(Debug)]
        struct AmeoBackward;

        impl<B: Backend> Backward<B, 1> for AmeoBackward {
            type State = (NodeID, AmeoKernel);

            fn backward(
                self,
                ops: Ops<Self::State, 1>,
                grads: &mut Gradients,
                checkpointer: &mut Checkpointer,
            ) {
                let [node_x] = ops.parents;
                let grad = grads.consume::<B>(&ops.node);
                let (x_state, kernel) = ops.state;
                let x: FloatTensor<B> = checkpointer.retrieve_node_output(x_state);

                if let Some(node) = node_x {
                    let x = Tensor::<B, 1>::from_primitive(TensorPrimitive::Float(x));
                    let grad = Tensor::<B, 1>::from_primitive(TensorPrimitive::Float(grad));
                    let grad_x = kernel.derivative(x) * grad;
                    grads.register::<B>(node.id, grad_x.into_primitive().tensor());
                }
            }
        }

        match AmeoBackward
            .prepare::<C>([x.node.clone()])
            .compute_bound()
            .stateful()
        {
            OpsKind::Tracked(mut prep) => {
                let x_state = prep.checkpoint(&x);
                let output = B::ameo_activation(kernel, x.primitive.clone());
                prep.finish((x_state, kernel), output)
            }
            OpsKind::UnTracked(prep) => {
                let output = B::ameo_activation(kernel, x.primitive);
                prep.finish(output)
            }
        }
    }
}

/// Apply `kernel` element-wise to a tensor of any rank.
///
/// The tensor is flattened, sent through [`ActivationBackend::ameo_activation`]
/// and reshaped back, so gradients flow through the custom backward step.
pub fn apply_kernel<B: ActivationBackend, const D: usize>(
    kernel: AmeoKernel,
    x: Tensor<B, D>,
) -> Tensor<B, D> {
    let dims = x.dims();
    let flat: Tensor<B, 1> = x.reshape([dims.iter().product::<usize>()]);
    let y = B::ameo_activation(kernel, flat.into_primitive().tensor());
    Tensor::<B, 1>::from_primitive(TensorPrimitive::Float(y)).reshape(dims)
}
