//! Integration test suite for the thick-restart SVD driver.
//!
//! # Test Methodology
//!
//! Each test builds a matrix whose leading singular values are known, either analytically
//! (rectangular diagonal matrices) or from a full dense SVD computed by [`faer`], and runs
//! [`thick_restart_svd`] against it through the public API only:
//!
//! 1.  **Accuracy:** the returned values are compared with the reference values.
//! 2.  **Structure:** the final factorization must still have orthonormal bases and the
//!     Ritz vectors must satisfy the residual identities of the Golub–Kahan relation.
//! 3.  **Cost:** a [`CountingOperator`] checks that `A` is touched only through products,
//!     and exactly as many times as the restart scheme prescribes.
//! 4.  **Termination:** budget exhaustion and invariant subspaces are reported as
//!     outcomes, not panics.

use anyhow::{Result, anyhow, ensure};
use faer::{
    Mat, MatMut, MatRef, Par,
    dyn_stack::{MemBuffer, MemStack, StackReq},
    matrix_free::{BiLinOp, LinOp},
    sparse::{SparseColMat, Triplet},
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use thick_restart_svd::{
    Termination, ThickRestartOutput, ThickRestartParams,
    algorithms::{RestartCallback, RestartSnapshot},
    matrix::CountingOperator,
    thick_restart_svd, thick_restart_svd_scratch,
};

/// Dense matrix with entries uniform in `[-0.5, 0.5)`.
fn random_dense(rows: usize, cols: usize, seed: u64) -> Mat<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Mat::from_fn(rows, cols, |_, _| rng.random::<f64>() - 0.5)
}

/// Random vector of unit 2-norm.
fn random_start(n: usize, seed: u64) -> Mat<f64> {
    let g = random_dense(n, 1, seed);
    let norm = g.norm_l2();
    Mat::from_fn(n, 1, |i, _| g[(i, 0)] / norm)
}

/// `rows×cols` matrix with `sigma` on its main diagonal, so its singular values are
/// exactly the entries of `sigma`.
fn rectangular_diagonal(rows: usize, cols: usize, sigma: &[f64]) -> Mat<f64> {
    Mat::from_fn(rows, cols, |i, j| if i == j { sigma[i] } else { 0.0 })
}

fn orthogonality_loss(v: MatRef<'_, f64>) -> f64 {
    let gram = v.transpose() * v;
    (&Mat::<f64>::identity(v.ncols(), v.ncols()) - &gram).norm_l2()
}

/// A dense operator whose forward products turn into NaN after `healthy_products` calls,
/// so that a restart fails at a known point.
#[derive(Debug)]
struct FailingOperator<'a> {
    inner: MatRef<'a, f64>,
    healthy_products: usize,
    forward: AtomicUsize,
}

impl<'a> FailingOperator<'a> {
    fn new(inner: MatRef<'a, f64>, healthy_products: usize) -> Self {
        Self {
            inner,
            healthy_products,
            forward: AtomicUsize::new(0),
        }
    }
}

impl LinOp<f64> for FailingOperator<'_> {
    fn apply_scratch(&self, rhs_ncols: usize, par: Par) -> StackReq {
        self.inner.apply_scratch(rhs_ncols, par)
    }

    fn nrows(&self) -> usize {
        self.inner.nrows()
    }

    fn ncols(&self) -> usize {
        self.inner.ncols()
    }

    fn apply(&self, out: MatMut<'_, f64>, rhs: MatRef<'_, f64>, par: Par, stack: &mut MemStack) {
        if self.forward.fetch_add(1, Ordering::Relaxed) < self.healthy_products {
            self.inner.apply(out, rhs, par, stack);
        } else {
            let poisoned = Mat::<f64>::from_fn(rhs.nrows(), rhs.ncols(), |_, _| f64::NAN);
            self.inner.apply(out, poisoned.as_ref(), par, stack);
        }
    }

    fn conj_apply(
        &self,
        out: MatMut<'_, f64>,
        rhs: MatRef<'_, f64>,
        par: Par,
        stack: &mut MemStack,
    ) {
        self.apply(out, rhs, par, stack);
    }
}

impl BiLinOp<f64> for FailingOperator<'_> {
    fn transpose_apply_scratch(&self, rhs_ncols: usize, par: Par) -> StackReq {
        self.inner.transpose_apply_scratch(rhs_ncols, par)
    }

    fn transpose_apply(
        &self,
        out: MatMut<'_, f64>,
        rhs: MatRef<'_, f64>,
        par: Par,
        stack: &mut MemStack,
    ) {
        self.inner.transpose_apply(out, rhs, par, stack);
    }

    fn adjoint_apply(
        &self,
        out: MatMut<'_, f64>,
        rhs: MatRef<'_, f64>,
        par: Par,
        stack: &mut MemStack,
    ) {
        self.inner.adjoint_apply(out, rhs, par, stack);
    }
}

/// Runs the driver on a dense matrix with a fresh workspace.
fn run_dense(
    a: &Mat<f64>,
    q0: &Mat<f64>,
    params: ThickRestartParams,
    callback: Option<&mut RestartCallback<'_>>,
) -> Result<ThickRestartOutput> {
    let mut mem = MemBuffer::new(thick_restart_svd_scratch(&a.as_ref(), params.par));
    let stack = MemStack::new(&mut mem);
    Ok(thick_restart_svd(
        &a.as_ref(),
        q0.as_ref(),
        params,
        stack,
        callback,
    )?)
}

#[test]
fn test_random_dense_matches_full_svd() -> Result<()> {
    let (l, k) = (5, 10);
    let a = random_dense(300, 200, 42);
    let q0 = random_start(200, 43);
    let params = ThickRestartParams {
        nvals: l,
        working_size: Some(k),
        tol: 1e-5,
        ..ThickRestartParams::default()
    };

    let output = run_dense(&a, &q0, params, None)?;
    let reference = a
        .thin_svd()
        .map_err(|e| anyhow!("Reference SVD failed: {:?}", e))?;
    let sigma = reference.S().column_vector();

    let error = output
        .values
        .iter()
        .enumerate()
        .map(|(i, v)| (v - sigma[i]).powi(2))
        .sum::<f64>()
        .sqrt();
    ensure!(
        error <= (k * k) as f64 * 1e-5,
        "Values deviate from the full SVD by {error:e} ({:?})",
        output.termination
    );
    ensure!(output.values.windows(2).all(|w| w[0] >= w[1]));
    Ok(())
}

#[test]
fn test_bases_stay_orthonormal() -> Result<()> {
    let a = random_dense(300, 200, 7);
    let q0 = random_start(200, 8);
    let params = ThickRestartParams {
        nvals: 5,
        working_size: Some(12),
        max_iterations: Some(40),
        tol: 0.0,
        ..ThickRestartParams::default()
    };

    let output = run_dense(&a, &q0, params, None)?;
    ensure!(output.termination == Termination::Exhausted);
    ensure!(output.iterations == 40);

    let p_loss = orthogonality_loss(output.state.p());
    let q_loss = orthogonality_loss(output.state.q());
    ensure!(p_loss < 1e-6, "P lost orthogonality: {p_loss:e}");
    ensure!(q_loss < 1e-10, "Q lost orthogonality: {q_loss:e}");
    Ok(())
}

#[test]
fn test_known_spectrum_converges_with_decreasing_bounds() -> Result<()> {
    let sigma: Vec<f64> = (0..150).map(|i| 1.0 / (1.0 + i as f64)).collect();
    let a = rectangular_diagonal(200, 150, &sigma);
    let q0 = Mat::from_fn(150, 1, |_, _| 1.0 / (150.0_f64).sqrt());
    let params = ThickRestartParams {
        nvals: 4,
        working_size: Some(8),
        tol: 1e-10,
        ..ThickRestartParams::default()
    };

    let mut max_bounds = Vec::new();
    let mut seen_iterations = Vec::new();
    let callback: &mut RestartCallback<'_> = &mut |snapshot: &RestartSnapshot<'_>| {
        seen_iterations.push(snapshot.iteration);
        max_bounds.push(snapshot.report.max_bound());
    };
    let output = run_dense(&a, &q0, params, Some(callback))?;

    ensure!(output.converged(), "{:?}", output.termination);
    for (value, exact) in output.values.iter().zip(&sigma) {
        ensure!((value - exact).abs() < 1e-8, "{value} != {exact}");
    }

    ensure!(seen_iterations == (1..=output.iterations).collect::<Vec<_>>());
    ensure!(max_bounds.last().is_some_and(|&last| last < 1e-10));
    for (i, w) in max_bounds.windows(2).enumerate() {
        ensure!(
            w[1] <= 1.1 * w[0] + 1e-12,
            "bound grew from {:e} to {:e} at restart {}",
            w[0],
            w[1],
            i + 2
        );
    }
    Ok(())
}

#[test]
fn test_ritz_vector_residuals() -> Result<()> {
    let a = random_dense(120, 80, 11);
    let q0 = random_start(80, 12);
    let params = ThickRestartParams {
        nvals: 3,
        working_size: Some(10),
        max_iterations: Some(15),
        tol: 0.0,
        ..ThickRestartParams::default()
    };
    let output = run_dense(&a, &q0, params, None)?;

    for i in 0..3 {
        let sigma = output.values[i];
        let u = output.left.get(.., i..i + 1);
        let v = output.right.get(.., i..i + 1);

        // A v = σ u holds exactly on the Krylov subspace.
        let forward = a.as_ref() * v - u * faer::Scale(sigma);
        ensure!(forward.norm_l2() < 1e-8, "‖A v - σ u‖ = {:e}", forward.norm_l2());

        // Aᵗ u = σ v + β U[k, i] q_{k+1}, whose norm is the simple bound.
        let transpose = a.transpose() * u - v * faer::Scale(sigma);
        let residual = transpose.norm_l2();
        let simple = output.report.simple_bounds[i];
        ensure!(
            (residual - simple).abs() < 1e-8,
            "‖Aᵗ u - σ v‖ = {residual:e}, bound {simple:e}"
        );
    }
    Ok(())
}

#[test]
fn test_reorthogonalization_gives_same_values() -> Result<()> {
    let sigma: Vec<f64> = (0..60).map(|i| 10.0 * 0.8_f64.powi(i)).collect();
    let a = rectangular_diagonal(90, 60, &sigma);
    let q0 = random_start(60, 5);
    let params = ThickRestartParams {
        nvals: 3,
        working_size: Some(7),
        tol: 1e-10,
        ..ThickRestartParams::default()
    };

    let plain = run_dense(&a, &q0, params, None)?;
    let reorthogonalized = run_dense(
        &a,
        &q0,
        ThickRestartParams {
            reorthogonalize: true,
            ..params
        },
        None,
    )?;

    ensure!(plain.converged() && reorthogonalized.converged());
    for ((x, y), exact) in plain
        .values
        .iter()
        .zip(&reorthogonalized.values)
        .zip(&sigma)
    {
        ensure!((x - y).abs() < 1e-8);
        ensure!((x - exact).abs() < 1e-8);
    }
    Ok(())
}

#[test]
fn test_large_sparse_matrix_through_products_only() -> Result<()> {
    let (m, n) = (30_000, 20_000);
    let (l, k, restarts) = (3, 8, 4);
    let mut rng = StdRng::seed_from_u64(2024);
    let mut triplets = Vec::with_capacity(3 * n);
    for j in 0..n {
        for t in 0..3 {
            triplets.push(Triplet {
                row: (j * 7919 + t * 104_729) % m,
                col: j,
                val: rng.random::<f64>() - 0.5,
            });
        }
    }
    let a = SparseColMat::<usize, f64>::try_new_from_triplets(m, n, &triplets)
        .map_err(|e| anyhow!("Failed to assemble the sparse matrix: {:?}", e))?;

    let op = CountingOperator::new(a.as_ref());
    let q0 = random_start(n, 99);
    let params = ThickRestartParams {
        nvals: l,
        working_size: Some(k),
        max_iterations: Some(restarts),
        tol: 0.0,
        ..ThickRestartParams::default()
    };
    let mut mem = MemBuffer::new(thick_restart_svd_scratch(&op, Par::Seq));
    let output = thick_restart_svd(&op, q0.as_ref(), params, MemStack::new(&mut mem), None)?;

    ensure!(output.termination == Termination::Exhausted);
    ensure!(output.iterations == restarts);
    ensure!(output.values.len() == l);
    ensure!(output.values.iter().all(|v| v.is_finite() && *v > 0.0));
    ensure!(output.values.windows(2).all(|w| w[0] >= w[1]));
    ensure!(output.left.nrows() == m && output.right.nrows() == n);

    // Build costs k products of each kind, every restart k - l more.
    let expected = k + restarts * (k - l);
    ensure!(op.forward_products() == expected, "{} forward products", op.forward_products());
    ensure!(
        op.transpose_products() == expected,
        "{} transpose products",
        op.transpose_products()
    );
    Ok(())
}

#[test]
fn test_zero_matrix_breaks_down_during_build() -> Result<()> {
    let a = Mat::<f64>::zeros(20, 15);
    let q0 = random_start(15, 1);
    let mut mem = MemBuffer::new(thick_restart_svd_scratch(&a.as_ref(), Par::Seq));
    let result = thick_restart_svd(
        &a.as_ref(),
        q0.as_ref(),
        ThickRestartParams::new(2),
        MemStack::new(&mut mem),
        None,
    );
    match result {
        Err(e) => ensure!(e.is_breakdown(), "unexpected error: {e}"),
        Ok(output) => return Err(anyhow!("expected a breakdown, got {:?}", output.termination)),
    }
    Ok(())
}

#[test]
fn test_invariant_start_vector_keeps_its_singular_value() -> Result<()> {
    // q0 = e_1 is a right singular vector, so Aᵗ A q0 has no component outside q0.
    let sigma: Vec<f64> = (0..15).map(|i| (15 - i) as f64).collect();
    let a = rectangular_diagonal(20, 15, &sigma);
    let q0 = Mat::from_fn(15, 1, |i, _| if i == 0 { 1.0 } else { 0.0 });
    let output = run_dense(&a, &q0, ThickRestartParams::new(2), None)?;

    ensure!(output.termination == Termination::Breakdown { iteration: 0 });
    ensure!(output.state.is_invariant() && output.state.working_size() == 1);
    ensure!(output.values.len() == 1 && (output.values[0] - 15.0).abs() < 1e-12);
    Ok(())
}

#[test]
fn test_low_rank_matrix_converges_from_build() -> Result<()> {
    // Rank 4, and q0 lies in the span of the four leading right singular vectors.
    let sigma: Vec<f64> = (0..30).map(|i| if i < 4 { (4 - i) as f64 } else { 0.0 }).collect();
    let a = rectangular_diagonal(40, 30, &sigma);
    let q0 = Mat::from_fn(30, 1, |i, _| if i < 4 { 0.5 } else { 0.0 });
    let params = ThickRestartParams {
        nvals: 2,
        working_size: Some(4),
        ..ThickRestartParams::default()
    };
    let output = run_dense(&a, &q0, params, None)?;

    ensure!(output.converged(), "{:?}", output.termination);
    ensure!(output.iterations == 0);
    ensure!((output.values[0] - 4.0).abs() < 1e-12 && (output.values[1] - 3.0).abs() < 1e-12);

    let values = Mat::from_fn(2, 2, |i, j| if i == j { output.values[i] } else { 0.0 });
    let forward = a.as_ref() * output.right.as_ref() - output.left.as_ref() * values.as_ref();
    ensure!(forward.norm_l2() < 1e-12);
    Ok(())
}

/// Runs `a` through an operator that fails after `healthy_products` forward products and
/// checks that the output is the one of an unharmed run stopped after `restarts` restarts.
fn check_restart_breakdown(healthy_products: usize, restarts: usize) -> Result<()> {
    let a = random_dense(80, 60, 31);
    let q0 = random_start(60, 32);
    let params = ThickRestartParams {
        nvals: 3,
        working_size: Some(8),
        max_iterations: Some(10),
        tol: 0.0,
        ..ThickRestartParams::default()
    };
    let reference = run_dense(
        &a,
        &q0,
        ThickRestartParams {
            max_iterations: Some(restarts),
            ..params
        },
        None,
    )?;

    let op = FailingOperator::new(a.as_ref(), healthy_products);
    let mut mem = MemBuffer::new(thick_restart_svd_scratch(&op, Par::Seq));
    let output = thick_restart_svd(&op, q0.as_ref(), params, MemStack::new(&mut mem), None)?;

    ensure!(
        output.termination == Termination::Breakdown { iteration: restarts + 1 },
        "{:?}",
        output.termination
    );
    ensure!(output.iterations == restarts);
    ensure!(output.values == reference.values);
    ensure!(output.report == reference.report);
    ensure!(output.state.p().to_owned() == reference.state.p().to_owned());
    ensure!(output.state.q().to_owned() == reference.state.q().to_owned());
    ensure!(output.values.iter().all(|v| v.is_finite()));

    let svd = output.state.b().svd()?;
    let (left, right) = output.state.ritz_vectors(&svd, 3)?;
    ensure!(left == output.left && right == output.right);
    Ok(())
}

#[test]
fn test_breakdown_in_truncate_keeps_built_factorization() -> Result<()> {
    // Build uses the first k = 8 forward products; Truncate's product fails.
    check_restart_breakdown(8, 0)
}

#[test]
fn test_breakdown_in_extend_keeps_previous_restart() -> Result<()> {
    // A restart costs k - l = 5 forward products: the first one (Truncate) of the second
    // restart succeeds and the first product of its extension fails.
    check_restart_breakdown(8 + 5 + 1, 1)
}

#[test]
fn test_zero_budget_returns_initial_estimates() -> Result<()> {
    let a = random_dense(50, 40, 21);
    let q0 = random_start(40, 22);
    let params = ThickRestartParams {
        nvals: 4,
        max_iterations: Some(0),
        ..ThickRestartParams::default()
    };
    let mut calls = 0;
    let callback: &mut RestartCallback<'_> = &mut |_: &RestartSnapshot<'_>| calls += 1;
    let output = run_dense(&a, &q0, params, Some(callback))?;

    ensure!(output.termination == Termination::Exhausted);
    ensure!(output.iterations == 0);
    ensure!(calls == 0);
    ensure!(output.state.p().ncols() == 8 && output.state.q().ncols() == 9);
    Ok(())
}

#[test]
fn test_invalid_parameters_are_rejected_before_products() -> Result<()> {
    let a = random_dense(30, 20, 3);
    let op = CountingOperator::new(a.as_ref());
    let q0 = random_start(20, 4);
    let mut mem = MemBuffer::new(thick_restart_svd_scratch(&op, Par::Seq));

    let bad = ThickRestartParams {
        nvals: 5,
        working_size: Some(5),
        ..ThickRestartParams::default()
    };
    let err = thick_restart_svd(&op, q0.as_ref(), bad, MemStack::new(&mut mem), None)
        .err()
        .ok_or_else(|| anyhow!("k = l must be rejected"))?;
    ensure!(err.is_precondition_violation());

    let short = random_start(19, 4);
    let err = thick_restart_svd(
        &op,
        short.as_ref(),
        ThickRestartParams::new(3),
        MemStack::new(&mut mem),
        None,
    )
    .err()
    .ok_or_else(|| anyhow!("a short start vector must be rejected"))?;
    ensure!(err.is_precondition_violation());

    ensure!(op.forward_products() == 0 && op.transpose_products() == 0);
    Ok(())
}
