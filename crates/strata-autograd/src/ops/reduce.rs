use strata_core::{Result, Shape};

use crate::tensor::Tensor;

impl Tensor {
    /// Sum of all elements as a rank-0 node. `dx = g` broadcast back.
    pub fn sum_all(&self) -> Result<Tensor> {
        let value = self.value().sum_all()?;
        let shape = self.shape().clone();
        Ok(Tensor::node("sum_all", value)
            .edge(self, move |g| g.broadcast_to(shape.clone()))
            .build())
    }

    /// Mean of all elements as a rank-0 node.
    pub fn mean_all(&self) -> Result<Tensor> {
        let n = self.elem_count() as f64;
        self.sum_all()?.div_scalar(n)
    }

    /// Sum along `axis`, removing it. `dx = g` repeated along `axis`.
    pub fn sum_axis(&self, axis: usize) -> Result<Tensor> {
        let value = self.value().sum(axis, false)?;
        let n = self.dim(axis)?;
        Ok(Tensor::node("sum_axis", value)
            .edge(self, move |g| g.strexp(axis, n))
            .build())
    }

    /// Mean along `axis`, removing it. `dx = g / n` repeated along `axis`.
    pub fn mean_axis(&self, axis: usize) -> Result<Tensor> {
        let value = self.value().mean(axis, false)?;
        let n = self.dim(axis)?;
        Ok(Tensor::node("mean_axis", value)
            .edge(self, move |g| g.div_scalar(n as f64)?.strexp(axis, n))
            .build())
    }

    /// Mean over every axis that `shape` collapses to size 1 (or drops, for
    /// a shorter `shape`). The result has `shape`; `dx = g / n` broadcast
    /// back, with `n` elements folded into each entry.
    pub fn mean_on(&self, shape: impl Into<Shape>) -> Result<Tensor> {
        let target = shape.into();
        let n = match target.elem_count() {
            0 => 1.0,
            t => (self.elem_count() / t) as f64,
        };
        let value = self.value().reduce_to_shape(&target)?.div_scalar(n)?;
        let full = self.shape().clone();
        Ok(Tensor::node("mean_on", value)
            .edge(self, move |g| g.div_scalar(n)?.broadcast_to(full.clone()))
            .build())
    }
}

#[cfg(test)]
mod tests {
    use strata_core::{Array, DType};

    use crate::tensor::Tensor;

    fn iota(shape: impl Into<strata_core::Shape>) -> Tensor {
        let shape = shape.into();
        let data: Vec<f64> = (0..shape.elem_count()).map(|i| i as f64).collect();
        Tensor::var(Array::from_f64_slice(&data, shape, DType::F64).unwrap())
    }

    #[test]
    fn test_sum_all_gradient_is_ones() {
        let x = iota(4);
        let s = x.sum_all().unwrap();
        assert_eq!(s.rank(), 0);
        assert_eq!(s.value().to_scalar_f64().unwrap(), 6.0);
        s.backward().unwrap();
        assert_eq!(x.grad().unwrap().to_f64_vec().unwrap(), vec![1.0; 4]);
    }

    #[test]
    fn test_mean_axis_gradient() {
        let x = iota(4);
        let m = x.mean_axis(0).unwrap();
        assert_eq!(m.value().to_scalar_f64().unwrap(), 1.5);
        m.backward().unwrap();
        assert_eq!(x.grad().unwrap().to_f64_vec().unwrap(), vec![0.25; 4]);
    }

    #[test]
    fn test_sum_axis_repeats_gradient() {
        let x = iota((2, 3));
        let s = x.sum_axis(1).unwrap();
        assert_eq!(s.value().to_f64_vec().unwrap(), vec![3.0, 12.0]);
        let seed = Array::from_f64_slice(&[1.0, -2.0], 2, DType::F64).unwrap();
        crate::backward::backward_with(&s, &seed).unwrap();
        assert_eq!(
            x.grad().unwrap().to_f64_vec().unwrap(),
            vec![1.0, 1.0, 1.0, -2.0, -2.0, -2.0]
        );
    }

    #[test]
    fn test_axis_out_of_range() {
        let x = iota((2, 3));
        assert!(x.sum_axis(2).unwrap_err().is_index_error());
        let s = x.sum_all().unwrap();
        assert!(s.mean_axis(0).unwrap_err().is_index_error());
    }

    #[test]
    fn test_mean_all() {
        let x = iota((2, 2));
        let m = x.mean_all().unwrap();
        assert_eq!(m.value().to_scalar_f64().unwrap(), 1.5);
        m.backward().unwrap();
        assert_eq!(x.grad().unwrap().to_f64_vec().unwrap(), vec![0.25; 4]);
    }
}
