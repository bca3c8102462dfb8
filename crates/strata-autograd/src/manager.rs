use rand::rngs::StdRng;
use rand::SeedableRng;
use strata_core::{config, Array, DType, Result, Shape};

use crate::ops::stats::DEFAULT_STD_EPS;
use crate::tensor::Tensor;

/// Defaults for building leaves and parameterized nodes.
///
/// ```ignore
/// let tm = TensorManager::new().with_dtype(DType::F64).with_seed(42);
/// let w = tm.randn((4, 3), &mut tm.seeded_rng());
/// let x = tm.var(&[1.0, 2.0, 3.0], 3)?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TensorManager {
    dtype: DType,
    std_eps: f64,
    seed: Option<u64>,
}

impl Default for TensorManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TensorManager {
    /// Manager using the engine's default dtype.
    pub fn new() -> Self {
        TensorManager {
            dtype: config::current().default_dtype,
            std_eps: DEFAULT_STD_EPS,
            seed: None,
        }
    }

    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = dtype;
        self
    }

    /// Epsilon added to the variance by [`std_axis`](Self::std_axis).
    pub fn with_std_eps(mut self, eps: f64) -> Self {
        self.std_eps = eps;
        self
    }

    /// Fix the seed handed out by [`seeded_rng`](Self::seeded_rng).
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn std_eps(&self) -> f64 {
        self.std_eps
    }

    /// A generator seeded with the configured seed, or from entropy.
    pub fn seeded_rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Trainable leaf from row-major data.
    pub fn var(&self, data: &[f64], shape: impl Into<Shape>) -> Result<Tensor> {
        Ok(Tensor::var(Array::from_f64_slice(data, shape, self.dtype)?))
    }

    /// Constant leaf from row-major data.
    pub fn constant(&self, data: &[f64], shape: impl Into<Shape>) -> Result<Tensor> {
        Ok(Tensor::constant(Array::from_f64_slice(data, shape, self.dtype)?))
    }

    pub fn zeros(&self, shape: impl Into<Shape>, requires_grad: bool) -> Tensor {
        Tensor::leaf(Array::zeros(shape, self.dtype), requires_grad)
    }

    pub fn ones(&self, shape: impl Into<Shape>, requires_grad: bool) -> Tensor {
        Tensor::leaf(Array::ones(shape, self.dtype), requires_grad)
    }

    /// Rank-0 constant.
    pub fn scalar(&self, value: f64) -> Tensor {
        Tensor::constant(Array::scalar(value, self.dtype))
    }

    /// Trainable leaf of standard normal samples.
    pub fn randn<R: rand::Rng + ?Sized>(&self, shape: impl Into<Shape>, rng: &mut R) -> Tensor {
        Tensor::var(Array::randn(shape, self.dtype, rng))
    }

    /// [`Tensor::std_axis_with`] with this manager's epsilon.
    pub fn std_axis(&self, x: &Tensor, axis: usize, ddof: usize) -> Result<Tensor> {
        x.std_axis_with(axis, ddof, self.std_eps, None)
    }
}
