use rand::Rng;
use rand_distr::{Bernoulli, Distribution};
use strata_core::{Array, Error, Result};

use crate::tensor::Tensor;

impl Tensor {
    /// Randomly zero elements with probability `p`.
    ///
    /// One Bernoulli(`p`) draw per element decides the mask: a hit zeroes
    /// the element, a miss keeps it. Kept elements are scaled by
    /// `1 / (1 - p)`; with `p = 1` every element is zero. The backward pass
    /// multiplies by the same binary mask without the scale.
    ///
    /// With `inplace` the operand's value is overwritten and shared by the
    /// new node. Nodes built earlier from that value observe the change.
    pub fn dropout<R: Rng + ?Sized>(&self, p: f64, rng: &mut R, inplace: bool) -> Result<Tensor> {
        if !self.dtype().is_float() {
            return Err(Error::Unsupported {
                op: "dropout",
                dtype: self.dtype(),
            });
        }
        let draw = Bernoulli::new(p)
            .map_err(|e| Error::InvalidParameter(format!("dropout probability {}: {}", p, e)))?;
        let bits: Vec<f64> = (0..self.elem_count())
            .map(|_| if draw.sample(rng) { 0.0 } else { 1.0 })
            .collect();
        let mask = Array::from_f64_slice(&bits, self.shape(), self.dtype())?;
        let scale = if p < 1.0 { 1.0 / (1.0 - p) } else { 0.0 };

        let value = if inplace {
            let x = self.value();
            x.mul_(&mask)?;
            x.mul_scalar_(scale)?;
            x.clone()
        } else {
            self.value().mul(&mask)?.mul_scalar(scale)?
        };
        Ok(Tensor::node("dropout", value)
            .edge(self, move |g| g.mul(&mask))
            .build())
    }
}
