use strata_core::{broadcast_shapes, Array, Result};

use crate::tensor::Tensor;

// Binary nodes — broadcasting arithmetic
//
// Forward values broadcast like their Array counterparts. Each contribution
// is computed at the broadcast shape and summed back to its operand's shape:
//
//   add  da = g            db = g
//   sub  da = g            db = -g
//   mul  da = g * b        db = g * a
//   div  da = g / b        db = g * (-a / b²)

impl Tensor {
    /// Element-wise `self + other`.
    pub fn add(&self, other: &Tensor) -> Result<Tensor> {
        broadcast_shapes(self.shape(), other.shape())?;
        let value = self.value().add(other.value())?;
        let (sa, sb) = (self.shape().clone(), other.shape().clone());
        Ok(Tensor::node("add", value)
            .edge(self, move |g| g.reduce_to_shape(&sa))
            .edge(other, move |g| g.reduce_to_shape(&sb))
            .build())
    }

    /// Element-wise `self - other`.
    pub fn sub(&self, other: &Tensor) -> Result<Tensor> {
        broadcast_shapes(self.shape(), other.shape())?;
        let value = self.value().sub(other.value())?;
        let (sa, sb) = (self.shape().clone(), other.shape().clone());
        Ok(Tensor::node("sub", value)
            .edge(self, move |g| g.reduce_to_shape(&sa))
            .edge(other, move |g| g.neg()?.reduce_to_shape(&sb))
            .build())
    }

    /// Element-wise `self * other`.
    pub fn mul(&self, other: &Tensor) -> Result<Tensor> {
        broadcast_shapes(self.shape(), other.shape())?;
        let value = self.value().mul(other.value())?;
        let (a, b) = (self.value().clone(), other.value().clone());
        let (sa, sb) = (a.shape().clone(), b.shape().clone());
        Ok(Tensor::node("mul", value)
            .edge(self, move |g| g.mul(&b)?.reduce_to_shape(&sa))
            .edge(other, move |g| g.mul(&a)?.reduce_to_shape(&sb))
            .build())
    }

    /// Element-wise `self / other`.
    pub fn div(&self, other: &Tensor) -> Result<Tensor> {
        broadcast_shapes(self.shape(), other.shape())?;
        let value = self.value().div(other.value())?;
        let (a, b) = (self.value().clone(), other.value().clone());
        let (sa, sb) = (a.shape().clone(), b.shape().clone());
        let b_da = b.clone();
        Ok(Tensor::node("div", value)
            .edge(self, move |g| g.div(&b_da)?.reduce_to_shape(&sa))
            .edge(other, move |g| {
                // -a / b²
                let local = a.neg()?.div(&b.sqr()?)?;
                g.mul(&local)?.reduce_to_shape(&sb)
            })
            .build())
    }

    fn scalar_operand(&self, value: f64) -> Tensor {
        Tensor::constant(Array::scalar(value, self.dtype()))
    }

    pub fn add_scalar(&self, value: f64) -> Result<Tensor> {
        self.add(&self.scalar_operand(value))
    }

    pub fn sub_scalar(&self, value: f64) -> Result<Tensor> {
        self.sub(&self.scalar_operand(value))
    }

    pub fn mul_scalar(&self, value: f64) -> Result<Tensor> {
        self.mul(&self.scalar_operand(value))
    }

    pub fn div_scalar(&self, value: f64) -> Result<Tensor> {
        self.div(&self.scalar_operand(value))
    }
}
