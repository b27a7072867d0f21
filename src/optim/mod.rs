//! Optimizers. Updates rebind each parameter's storage in place, so the
//! parameter keeps its identity across steps.

use crate::array::Array;
use crate::errors::PgResult;

pub trait Optimizer {
    /// Apply one update to every parameter carrying a gradient, then clear
    /// the gradients. Parameters without a gradient are skipped with a
    /// warning rather than aborting the step.
    fn update(&self, params: &[Array]) -> PgResult<()>;
}

/// Plain stochastic gradient descent: `p ← p − lr · g`.
pub struct GradientDescent {
    lr: f32,
}

impl GradientDescent {
    pub fn new(lr: f32) -> Self {
        GradientDescent { lr }
    }
}

impl Optimizer for GradientDescent {
    fn update(&self, params: &[Array]) -> PgResult<()> {
        for param in params {
            let Some(grad) = param.grad() else {
                tracing::warn!(id = %param.id(), "parameter has no gradient, skipping update");
                continue;
            };
            let step = param
                .detach()
                .sub(&grad.detach().mul(&Array::scalar(self.lr))?)?;
            param.bind_storage_from(&step)?;
            param.zero_grad();
        }
        Ok(())
    }
}
