use strata_core::{CmpOp, Result};

use crate::tensor::Tensor;

impl Tensor {
    pub fn neg(&self) -> Result<Tensor> {
        let value = self.value().neg()?;
        Ok(Tensor::node("neg", value).edge(self, |g| g.neg()).build())
    }

    /// `x²`, with `dx = 2x * g`.
    pub fn sqr(&self) -> Result<Tensor> {
        let value = self.value().sqr()?;
        let x = self.value().clone();
        Ok(Tensor::node("sqr", value)
            .edge(self, move |g| g.mul(&x)?.mul_scalar(2.0))
            .build())
    }

    /// `√x`, with `dx = g / (2√x)`.
    pub fn sqrt(&self) -> Result<Tensor> {
        let value = self.value().sqrt()?;
        let y = value.clone();
        Ok(Tensor::node("sqrt", value)
            .edge(self, move |g| g.div(&y)?.mul_scalar(0.5))
            .build())
    }

    pub fn exp(&self) -> Result<Tensor> {
        let value = self.value().exp()?;
        let y = value.clone();
        Ok(Tensor::node("exp", value)
            .edge(self, move |g| g.mul(&y))
            .build())
    }

    /// Natural logarithm, with `dx = g / x`.
    pub fn log(&self) -> Result<Tensor> {
        let value = self.value().log()?;
        let x = self.value().clone();
        Ok(Tensor::node("log", value)
            .edge(self, move |g| g.div(&x))
            .build())
    }

    /// `log(max(x, eps))`. Inputs at or below `eps` are floored to it and
    /// pass no gradient; a non-positive `eps` gives the plain [`Tensor::log`].
    pub fn log_eps(&self, eps: f64) -> Result<Tensor> {
        if eps <= 0.0 {
            return self.log();
        }
        let floored = self.value().max_scalar(eps)?;
        let value = floored.log()?;
        let mask = self.value().compare_mask(CmpOp::Gt, eps)?;
        Ok(Tensor::node("log_eps", value)
            .edge(self, move |g| g.mul(&mask)?.div(&floored))
            .build())
    }

    /// Logistic sigmoid, with `dx = g * y * (1 - y)`.
    pub fn sigmoid(&self) -> Result<Tensor> {
        let value = self.value().sigmoid()?;
        let y = value.clone();
        Ok(Tensor::node("sigmoid", value)
            .edge(self, move |g| {
                let local = y.mul(&y.neg()?.add_scalar(1.0)?)?;
                g.mul(&local)
            })
            .build())
    }

    /// Hyperbolic tangent, with `dx = g * (1 - tanh²)`.
    pub fn tanh(&self) -> Result<Tensor> {
        let value = self.value().tanh()?;
        let y = value.clone();
        Ok(Tensor::node("tanh", value)
            .edge(self, move |g| {
                let local = y.sqr()?.neg()?.add_scalar(1.0)?;
                g.mul(&local)
            })
            .build())
    }

    /// `max(x, threshold)` element-wise. The gradient passes where
    /// `x > threshold` and is zero elsewhere.
    pub fn max_threshold(&self, threshold: f64) -> Result<Tensor> {
        let value = self.value().max_scalar(threshold)?;
        let mask = self.value().compare_mask(CmpOp::Gt, threshold)?;
        Ok(Tensor::node("max_threshold", value)
            .edge(self, move |g| g.mul(&mask))
            .build())
    }

    /// Keep the elements where `x <cmp> threshold` holds, zero the rest.
    pub fn compare_true(&self, cmp: CmpOp, threshold: f64) -> Result<Tensor> {
        self.compare_masked("compare_true", cmp, threshold)
    }

    /// Keep the elements where `x <cmp> threshold` does not hold.
    pub fn compare_false(&self, cmp: CmpOp, threshold: f64) -> Result<Tensor> {
        self.compare_masked("compare_false", cmp.negate(), threshold)
    }

    fn compare_masked(&self, op: &'static str, cmp: CmpOp, threshold: f64) -> Result<Tensor> {
        let mask = self.value().compare_mask(cmp, threshold)?;
        let value = self.value().mul(&mask)?;
        Ok(Tensor::node(op, value)
            .edge(self, move |g| g.mul(&mask))
            .build())
    }
}
