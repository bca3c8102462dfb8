use strata_core::{Array, Error, Result, Shape};

use crate::tensor::Tensor;

impl Tensor {
    /// Pass-through node; the gradient flows back unchanged.
    pub fn identity(&self) -> Tensor {
        Tensor::node("identity", self.value().clone())
            .edge(self, |g| Ok(g.clone()))
            .build()
    }

    /// Reshape to `shape` (a view when the layout allows).
    pub fn reshape(&self, shape: impl Into<Shape>) -> Result<Tensor> {
        let value = self.value().reshape(shape)?;
        let back = self.shape().clone();
        Ok(Tensor::node("reshape", value)
            .edge(self, move |g| g.reshape(back.clone()))
            .build())
    }

    /// Entries `[start, end)` of `axis`.
    ///
    /// The gradient is scattered into a zero array of the operand shape.
    pub fn narrow(&self, axis: usize, start: usize, end: usize) -> Result<Tensor> {
        if end < start {
            return Err(Error::InvalidParameter(format!(
                "narrow: end {} before start {}",
                end, start
            )));
        }
        let len = end - start;
        let value = self.value().narrow(axis, start, len)?;
        let src = self.value().clone();
        Ok(Tensor::node("narrow", value)
            .edge(self, move |g| {
                let full = src.zeros_like();
                full.narrow(axis, start, len)?.add_(g)?;
                Ok(full)
            })
            .build())
    }

    /// Split along `axis` at the given start offsets. Piece `i` covers
    /// `[starts[i], starts[i + 1])`, the last one runs to the end of the axis.
    pub fn split(&self, axis: usize, starts: &[usize]) -> Result<Vec<Tensor>> {
        let size = self.dim(axis)?;
        starts
            .iter()
            .enumerate()
            .map(|(i, &start)| {
                let end = starts.get(i + 1).copied().unwrap_or(size);
                self.narrow(axis, start, end)
            })
            .collect()
    }

    /// Entries picked along `axis` by `index`, see [`Array::gather`].
    ///
    /// The index is data, not a graph operand. The gradient is added back
    /// into a zero array at the picked positions, so an entry picked twice
    /// receives both contributions.
    pub fn gather(&self, axis: usize, index: &Array) -> Result<Tensor> {
        let value = self.value().gather(axis, index)?;
        let index = index.clone();
        let src = self.value().clone();
        Ok(Tensor::node("gather", value)
            .edge(self, move |g| {
                let full = src.zeros_like();
                full.scatter_add_(axis, &index, g)?;
                Ok(full)
            })
            .build())
    }

    /// Insert a size-1 axis at `axis`.
    pub fn stretch(&self, axis: usize) -> Result<Tensor> {
        let value = self.value().stretch(axis)?;
        Ok(Tensor::node("stretch", value)
            .edge(self, move |g| g.squeeze(axis))
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
    fn test_narrow_scatters_gradient() {
        let x = iota((2, 4));
        let y = x.narrow(1, 1, 3).unwrap();
        assert_eq!(y.value().to_f64_vec().unwrap(), vec![1.0, 2.0, 5.0, 6.0]);
        y.sum_all().unwrap().backward().unwrap();
        assert_eq!(
            x.grad().unwrap().to_f64_vec().unwrap(),
            vec![0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0]
        );
    }

    #[test]
    fn test_split_pieces_cover_axis() {
        let x = iota(5);
        let parts = x.split(0, &[0, 2]).unwrap();
        assert_eq!(parts[0].value().to_f64_vec().unwrap(), vec![0.0, 1.0]);
        assert_eq!(parts[1].value().to_f64_vec().unwrap(), vec![2.0, 3.0, 4.0]);
        // gradients from both pieces land in disjoint slices
        let total = parts[0].sum_all().unwrap().add(&parts[1].mul_scalar(2.0).unwrap().sum_all().unwrap()).unwrap();
        total.backward().unwrap();
        assert_eq!(x.grad().unwrap().to_f64_vec().unwrap(), vec![1.0, 1.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_reshape_and_stretch_round_trip_gradient() {
        let x = iota((2, 3));
        let y = x.reshape(6).unwrap().stretch(0).unwrap();
        assert_eq!(y.dims(), &[1, 6]);
        y.sum_all().unwrap().backward().unwrap();
        assert_eq!(x.grad().unwrap().dims(), &[2, 3]);
        assert!(x.narrow(0, 2, 1).is_err());
    }

    #[test]
    fn test_identity_passes_gradient() {
        let x = iota(3);
        x.identity().sum_all().unwrap().backward().unwrap();
        assert_eq!(x.grad().unwrap().to_f64_vec().unwrap(), vec![1.0; 3]);
    }

    #[test]
    fn test_gather_routes_gradient_to_picked_entries() {
        let x = iota((2, 3));
        let index = Array::from_vec(vec![2i32, 2, 0, 1], (2, 2)).unwrap();
        let y = x.gather(1, &index).unwrap();
        assert_eq!(y.value().to_f64_vec().unwrap(), vec![2.0, 2.0, 3.0, 4.0]);
        y.sum_all().unwrap().backward().unwrap();
        assert_eq!(
            x.grad().unwrap().to_f64_vec().unwrap(),
            vec![0.0, 0.0, 2.0, 1.0, 1.0, 0.0]
        );
    }

    #[test]
    fn test_gather_gradient_matches_numerical() {
        let data = [0.3, -1.2, 2.0, 0.7, 1.1, -0.4];
        let index = Array::from_vec(vec![1i32, 0, 1], (1, 3)).unwrap();
        let report = crate::gradcheck::check_gradients(
            move |xs| xs[0].gather(0, &index)?.tanh()?.sum_all(),
            &[Array::from_f64_slice(&data, (2, 3), DType::F64).unwrap()],
            1e-6,
        )
        .unwrap();
        assert!(report.max_abs_error < 1e-6, "{:?}", report);
    }
}
