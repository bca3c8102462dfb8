use strata_core::Result;

use crate::tensor::Tensor;

impl Tensor {
    /// Softmax along `axis`, with `dx = y * (g - Σ(g y))`.
    pub fn softmax(&self, axis: usize) -> Result<Tensor> {
        let value = self.value().softmax(axis)?;
        let y = value.clone();
        Ok(Tensor::node("softmax", value)
            .edge(self, move |g| {
                let gy = g.mul(&y)?.sum(axis, true)?;
                y.mul(&g.sub(&gy)?)
            })
            .build())
    }

    /// `x - logsumexp(x)` along `axis`, with `dx = g - softmax(x) * Σg`.
    pub fn log_softmax(&self, axis: usize) -> Result<Tensor> {
        let value = self.value().log_softmax(axis)?;
        let soft = value.exp()?;
        Ok(Tensor::node("log_softmax", value)
            .edge(self, move |g| g.sub(&soft.mul(&g.sum(axis, true)?)?))
            .build())
    }
}
