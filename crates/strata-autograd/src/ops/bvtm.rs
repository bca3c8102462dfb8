use strata_core::{Error, Result, Shape};

use crate::tensor::Tensor;

// BatchVtm — batched vector times matrix
//
//   v: [B, n] or [n]     m: [B, n, k]     y: [B, k]
//
//   y[b, j] = Σ_i v[b, i] · m[b, i, j]
//
// An unbatched v is shared by every sample. Gradients:
//
//   dm[b] = outer(v[b], g[b])
//   dv[b] = m[b] · g[b]       (averaged over the batch when v is unbatched)

impl Tensor {
    /// Multiply each vector of `self` with the matching matrix of `m`.
    pub fn bvtm(&self, m: &Tensor) -> Result<Tensor> {
        if m.rank() != 3 {
            return Err(Error::RankTooLow {
                op: "bvtm",
                min: 3,
                got: m.rank(),
            });
        }
        let (batch, n) = (m.dims()[0], m.dims()[1]);
        let batched = match self.dims() {
            [len] if *len == n => false,
            [b, len] if *b == batch && *len == n => true,
            _ => {
                return Err(Error::ShapeMismatch {
                    expected: Shape::from((batch, n)),
                    got: self.shape().clone(),
                })
            }
        };

        // [.., n, 1] * [B, n, k] summed over n
        let v_col = self.value().stretch(self.rank())?;
        let value = v_col.mul(m.value())?.sum(1, false)?;

        let mv = m.value().clone();
        let dm_v = v_col.clone();
        Ok(Tensor::node("bvtm", value)
            .edge(self, move |g| {
                // [B, 1, k] * [B, n, k] summed over k
                let dv = g.stretch(1)?.mul(&mv)?.sum(2, false)?;
                if batched {
                    Ok(dv)
                } else {
                    dv.mean(0, false)
                }
            })
            // [.., n, 1] * [B, 1, k]
            .edge(m, move |g| dm_v.mul(&g.stretch(1)?))
            .build())
    }
}
