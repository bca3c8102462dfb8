// End-to-end tests for the strata facade
//
// Small models assembled from the prelude and trained with plain gradient
// descent, plus checks that the engine configuration reaches the array
// operators.

use std::sync::Once;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strata::prelude::*;
use strata::LoopKind;

static SETUP: Once = Once::new();

// One subscriber and one engine configuration for the whole test binary;
// a threshold of 1 sends every axis reduction through the rayon pool.
fn setup() {
    SETUP.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        strata::config::install(EngineConfig::default().with_parallel_threshold(1).with_dtype(DType::F64))
            .expect("configuration installed once");
    });
}

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() < tol
}

// (batch, 3) inputs labelled by the arg-max of a fixed linear map
fn dataset(rng: &mut StdRng, batch: usize) -> (Vec<f64>, Vec<usize>) {
    let w = [[2.0, -1.0, 0.0], [0.0, 1.5, -1.0], [-1.0, 0.0, 2.0]];
    let mut xs = Vec::with_capacity(batch * 3);
    let mut labels = Vec::with_capacity(batch);
    for _ in 0..batch {
        let x: Vec<f64> = (0..3).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let scores: Vec<f64> = (0..3).map(|j| (0..3).map(|i| x[i] * w[i][j]).sum()).collect();
        let label = (0..3)
            .max_by(|&a, &b| scores[a].total_cmp(&scores[b]))
            .unwrap_or(0);
        xs.extend(x);
        labels.push(label);
    }
    (xs, labels)
}

fn one_hot(labels: &[usize], classes: usize) -> Vec<f64> {
    let mut out = vec![0.0; labels.len() * classes];
    for (row, &l) in labels.iter().enumerate() {
        out[row * classes + l] = 1.0;
    }
    out
}

// logits[b, j] = Σ_i x[b, i] · w[i, j] + bias[j]
fn logits(x: &Tensor, w: &Tensor, bias: &Tensor) -> strata::Result<Tensor> {
    x.stretch(2)?.mul(w)?.sum_axis(1)?.add(bias)
}

fn nll(logits: &Tensor, targets: &Tensor) -> strata::Result<Tensor> {
    let batch = logits.dim(0)? as f64;
    logits.log_softmax(1)?.mul(targets)?.sum_all()?.mul_scalar(-1.0 / batch)
}

#[test]
fn test_softmax_regression_learns() -> strata::Result<()> {
    setup();
    let tm = TensorManager::new().with_seed(17);
    let mut rng = tm.seeded_rng();
    let (xs, labels) = dataset(&mut rng, 32);
    let x = tm.constant(&xs, (32, 3))?;
    let targets = tm.constant(&one_hot(&labels, 3), (32, 3))?;

    let w = tm.zeros((3, 3), true);
    let bias = tm.zeros(3, true);
    let initial = nll(&logits(&x, &w, &bias)?, &targets)?.value().to_scalar_f64()?;
    // uniform prediction over three classes
    assert!(approx_eq(initial, 3.0f64.ln(), 1e-12));

    let mut last = initial;
    for step in 0..150 {
        let loss = nll(&logits(&x, &w, &bias)?, &targets)?;
        last = loss.value().to_scalar_f64()?;
        zero_grad(&loss);
        loss.backward()?;
        for p in [&w, &bias] {
            let g = p.grad().expect("parameter reached by backward");
            p.value().sub_(&g.mul_scalar(1.0)?)?;
        }
        if step % 50 == 0 {
            tracing::info!(step, loss = last, "softmax regression");
        }
    }
    assert!(last < 0.5 * initial, "loss went from {} to {}", initial, last);

    let predicted = logits(&x, &w, &bias)?.value().to_f64_vec()?;
    let correct = labels
        .iter()
        .enumerate()
        .filter(|&(row, &l)| {
            let r = &predicted[row * 3..row * 3 + 3];
            (0..3).all(|j| r[l] >= r[j])
        })
        .count();
    assert!(correct >= 28, "{} of 32 correct", correct);
    Ok(())
}

#[test]
fn test_composed_graph_gradients() -> strata::Result<()> {
    setup();
    let mut rng = StdRng::seed_from_u64(3);
    let v = Array::randn((2, 3), DType::F64, &mut rng);
    let m = Array::randn((2, 3, 4), DType::F64, &mut rng);
    let report = check_gradients(
        |t| {
            let h = t[0].bvtm(&t[1])?.tanh()?;
            let s = h.std_axis(1, 1)?;
            h.log_softmax(1)?.sum_axis(1)?.mul(&s)?.sum_all()
        },
        &[v, m],
        1e-6,
    )?;
    assert!(report.max_abs_error < 1e-5, "{:?}", report);
    Ok(())
}

#[test]
fn test_standardize_then_dropout() -> strata::Result<()> {
    setup();
    let tm = TensorManager::new().with_seed(8);
    let mut rng = tm.seeded_rng();
    let x = tm.randn((6, 5), &mut rng);
    let z = x.standardize_axis(1, 0, 1e-5)?;

    // each row has zero mean and unit deviation
    let means = z.value().mean(1, false)?.to_f64_vec()?;
    assert!(means.iter().all(|m| m.abs() < 1e-12));

    let dropped = z.dropout(0.25, &mut rng, false)?;
    let loss = dropped.sqr()?.mean_all()?;
    loss.backward()?;
    let grad = x.grad().expect("x requires grad");
    assert_eq!(grad.dims(), &[6, 5]);
    assert!(grad.to_f64_vec()?.iter().all(|g| g.is_finite()));
    Ok(())
}

#[test]
fn test_parallel_reductions_match_sequential_sums() -> strata::Result<()> {
    setup();
    assert_eq!(strata::config::current().parallel_threshold, 1);
    let data: Vec<f64> = (0..60).map(|i| i as f64).collect();
    let a = Array::from_f64_slice(&data, (3, 4, 5), DType::F64)?;

    let rows = a.sum(2, false)?.to_f64_vec()?;
    let expected: Vec<f64> = (0..12).map(|r| (0..5).map(|c| (r * 5 + c) as f64).sum()).collect();
    assert_eq!(rows, expected);

    // the same reduction on a permuted view
    let p = a.permute(&[2, 0, 1])?;
    assert_eq!(p.sum(0, false)?.to_f64_vec()?, expected);
    Ok(())
}

#[test]
fn test_default_dtype_and_loop_selection() -> strata::Result<()> {
    setup();
    let tm = TensorManager::new();
    assert_eq!(tm.dtype(), DType::F64);

    let a = Array::from_f64_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], (2, 3), DType::F64)?;
    assert_eq!(LoopKind::select(a.supports_vectorization()?, 1), LoopKind::Unit);
    let t = a.t();
    assert!(!t.is_contiguous());
    assert_eq!(t.exp()?.to_f64_vec()?, t.copy()?.exp()?.to_f64_vec()?);
    Ok(())
}
