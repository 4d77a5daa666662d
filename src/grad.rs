// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Gradient accessors over the engine's backward pass.
//!
//! The engine records operations only for tensors marked as trainable. Backward
//! returns a [`Gradients`] value that the host keeps and queries; nothing is
//! stored on the tensors themselves.

use std::fmt;

use candle_core::backprop::GradStore;
use candle_core::{Tensor, Var};

use crate::error::{EngineResultExt, Result};

/// Gradients produced by one backward pass.
pub struct Gradients {
    store: GradStore,
}

impl Gradients {
    /// Run the backward pass rooted at `root`.
    pub(crate) fn compute(root: &Tensor) -> Result<Self> {
        let store = root.backward().engine_op("calc_grad")?;
        Ok(Self { store })
    }

    /// Gradient of `tensor`, if it took part in the pass.
    pub(crate) fn lookup(&self, tensor: &Tensor) -> Option<&Tensor> {
        self.store.get(tensor)
    }
}

impl fmt::Debug for Gradients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gradients").finish_non_exhaustive()
    }
}

/// Return a copy of `tensor` whose operations the engine records.
pub(crate) fn track(tensor: &Tensor) -> Result<Tensor> {
    Var::from_tensor(tensor)
        .map(Var::into_inner)
        .engine_op("requires_grad")
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_gradient_of_sum() {
        let x = track(&Tensor::new(&[1f32, 2., 3.], &Device::Cpu).unwrap()).unwrap();
        let y = x.sqr().unwrap().sum_all().unwrap();
        let grads = Gradients::compute(&y).unwrap();

        let dx = grads.lookup(&x).unwrap();
        assert_eq!(dx.to_vec1::<f32>().unwrap(), vec![2., 4., 6.]);
    }

    #[test]
    fn test_untracked_has_no_gradient() {
        let x = Tensor::new(&[1f32, 2.], &Device::Cpu).unwrap();
        let y = x.sum_all().unwrap();
        let grads = Gradients::compute(&y).unwrap();
        assert!(grads.lookup(&x).is_none());
    }
}
