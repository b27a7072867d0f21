//! Neural-network primitives on top of the array engine.

use crate::array::Array;
use crate::dtype::DType;
use crate::errors::{PgError, PgResult};
use crate::types::Scalar;

/// A composable unit of a model.
///
/// `parameters` must yield the module's own trainable arrays *and* those of
/// every child module, in declaration order. Optimizers rely on the list
/// being complete.
pub trait Module {
    fn forward(&self, input: &Array) -> PgResult<Array>;

    fn parameters(&self) -> Vec<Array>;
}

/// Fully-connected layer: `y = x · Wᵀ + b`.
///
/// `weight` is `(out, in)` and `bias` is `(out,)`, both drawn from
/// `U(-1/√in, 1/√in)`.
pub struct Linear {
    pub weight: Array,
    pub bias: Array,
}

impl Linear {
    pub fn new(in_features: usize, out_features: usize) -> PgResult<Linear> {
        let bound = 1.0 / (in_features as f32).sqrt();
        let weight = Array::uniform(&[out_features, in_features], -bound, bound)?;
        let bias = Array::uniform(&[out_features], -bound, bound)?;
        Ok(Linear { weight, bias })
    }
}

impl Module for Linear {
    fn forward(&self, input: &Array) -> PgResult<Array> {
        input
            .matmul(&self.weight.transpose(-2, -1)?)?
            .add(&self.bias)
    }

    fn parameters(&self) -> Vec<Array> {
        vec![self.weight.clone(), self.bias.clone()]
    }
}

pub fn relu(x: &Array) -> PgResult<Array> {
    x.maximum(&Array::scalar(Scalar::F32(0.0).cast(x.dtype())))
}

/// Numerically stable softmax over the last axis.
pub fn softmax(x: &Array) -> PgResult<Array> {
    let max = x.max(&[-1])?;
    let exp = x.sub(&max)?.exp();
    let sum = exp.sum(&[-1])?;
    exp.div(&sum)
}

/// One-hot encode integer class indices. `num_classes == 0` infers the
/// class count from the largest index present.
pub fn onehot(x: &Array, num_classes: usize) -> PgResult<Array> {
    if !x.dtype().is_int() {
        return Err(PgError::DTypeMismatch {
            op: "onehot",
            lhs: x.dtype(),
            rhs: DType::I32,
        });
    }
    let classes = if num_classes == 0 {
        (x.max(&[])?.item()?.to_i32() + 1) as usize
    } else {
        num_classes
    };
    let cls = Array::arange(&[classes], 0.0, 1.0, DType::I32)?;
    Ok(x.unsqueeze(-1)?.eq(&cls)?.astype(DType::I32))
}

/// Cross entropy in log-sum-exp form, mean-reduced over the batch:
/// `mean(-logits[target] + logsumexp(logits))`.
pub fn cross_entropy_loss(logits: &Array, labels: &Array) -> PgResult<Array> {
    if !labels.dtype().is_int() {
        return Err(PgError::DTypeMismatch {
            op: "cross_entropy_loss",
            lhs: labels.dtype(),
            rhs: DType::I32,
        });
    }
    let classes = *logits.shape().last().ok_or(PgError::ShapeMismatch {
        op: "cross_entropy_loss",
        lhs: vec![],
        rhs: vec![],
    })?;
    let max = logits.max(&[-1])?;
    let exp = logits.sub(&max)?.exp();
    let sum_exp = exp.sum(&[-1])?;
    let log_sum_exp = sum_exp.log().add(&max)?;
    let target = onehot(labels, classes)?.astype(logits.dtype());
    let picked = target.mul(logits)?.sum(&[-1])?.neg();
    picked.add(&log_sum_exp)?.mean(&[])
}
