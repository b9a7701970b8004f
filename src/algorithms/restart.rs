//! Implicit restart of an Arnoldi factorization by shifted QR steps.
//!
//! Given a full factorization `A V_m = V_{m+1} H`, [`implicit_restart`]
//! compresses it to an equivalent length-`n` factorization whose starting
//! vector has been implicitly filtered by the polynomial with the discarded
//! Ritz values as roots. The unwanted Ritz values are applied as exact
//! shifts: each shift drives one QR similarity transform of the Hessenberg
//! block, and the accumulated orthogonal factor rotates the basis.
//!
//! Complex Ritz values come in conjugate pairs for a real Hessenberg matrix,
//! and a pair is consumed in a single real double-shift step built from the
//! quadratic `H^2 - 2 Re(s) H + |s|^2 I`, so the arithmetic stays real
//! throughout. An unpaired trailing complex shift falls back to a single
//! real shift at its real part.
//!
//! The Hessenberg blocks here are small (the expansion capacity, tens at
//! most), so the QR factorizations use a plain Householder sweep rather than
//! a blocked decomposition.

use faer::{Mat, MatRef, Scale};
use log::debug;

use super::{KrylovState, SpectralDecomposition};
use crate::error::{ArnoldiError, ArnoldiErrorKind};

/// Shifts closer to the real axis than this are treated as real.
const REAL_SHIFT_TOL: f64 = 1e-12;

/// Columns whose active part is smaller than this fraction of the matrix
/// norm are treated as already reduced and get no reflector.
const QR_DEFLATION_TOL: f64 = 1e-12;

/// Result of one implicit restart.
#[derive(Debug, Clone, Copy)]
pub struct CompressionOutcome {
    /// Length of the compressed factorization.
    pub retained: usize,
    /// Norm of the new residual vector `f`. A zero residual means the
    /// retained subspace is invariant.
    pub residual_norm: f64,
}

/// Householder QR of a small square matrix, returning `(Q, R)`.
///
/// Columns whose active part is pure roundoff are skipped rather than
/// reflected. Once exact shifts deflate the Hessenberg block, the shifted
/// matrix contains columns that are zero up to rounding noise; normalizing
/// that noise into a reflector would smear it across `Q` and destroy the
/// Hessenberg structure of the similarity transform.
pub(crate) fn householder_qr(m: MatRef<'_, f64>) -> (Mat<f64>, Mat<f64>) {
    let n = m.nrows();
    let mut r = m.to_owned();
    let mut q = Mat::<f64>::identity(n, n);
    let mut v = vec![0.0f64; n];
    let negligible = m.norm_l2() * QR_DEFLATION_TOL;

    for j in 0..n {
        let mut col_norm = 0.0;
        for i in j..n {
            col_norm += r[(i, j)] * r[(i, j)];
        }
        let col_norm = col_norm.sqrt();
        if col_norm <= negligible {
            continue;
        }

        // Reflect onto -sign(x0) * ||x|| e_j to avoid cancellation.
        let alpha = if r[(j, j)] >= 0.0 { -col_norm } else { col_norm };
        v[..j].fill(0.0);
        v[j] = r[(j, j)] - alpha;
        for i in j + 1..n {
            v[i] = r[(i, j)];
        }
        let v_norm_sq: f64 = v[j..].iter().map(|x| x * x).sum();
        if v_norm_sq == 0.0 {
            continue;
        }
        let scale = 2.0 / v_norm_sq;

        // R <- (I - scale v v^T) R, applied column by column.
        for c in j..n {
            let mut dot = 0.0;
            for i in j..n {
                dot += v[i] * r[(i, c)];
            }
            let dot = dot * scale;
            for i in j..n {
                r[(i, c)] -= dot * v[i];
            }
        }
        // Q <- Q (I - scale v v^T), row by row.
        for row in 0..n {
            let mut dot = 0.0;
            for i in j..n {
                dot += q[(row, i)] * v[i];
            }
            let dot = dot * scale;
            for i in j..n {
                q[(row, i)] -= dot * v[i];
            }
        }
    }

    // Round the lower triangle of R to exact zeros.
    for i in 1..n {
        for j in 0..i {
            r[(i, j)] = 0.0;
        }
    }
    (q, r)
}

/// Applies the unwanted Ritz values as exact shifts to the `m x m`
/// Hessenberg block, returning the transformed block and the accumulated
/// orthogonal factor.
fn apply_shifts(h: MatRef<'_, f64>, shifts: &[faer::c64]) -> (Mat<f64>, Mat<f64>) {
    let m = h.nrows();
    let mut h = h.to_owned();
    let mut q_acc = Mat::<f64>::identity(m, m);
    let identity = Mat::<f64>::identity(m, m);

    let mut i = 0;
    while i < shifts.len() {
        let shift = shifts[i];
        let shifted = if shift.im.abs() > REAL_SHIFT_TOL {
            if i + 1 < shifts.len() {
                // Conjugate pair: one real double-shift consumes both.
                let s = -2.0 * shift.re;
                let t = shift.norm_sqr();
                i += 2;
                &h * &h + Scale(s) * &h + Scale(t) * &identity
            } else {
                // Odd shift count left a complex value unpaired; shifting by
                // its real part keeps the arithmetic real.
                debug!("unpaired complex shift {shift:?}, using its real part");
                i += 1;
                &h - Scale(shift.re) * &identity
            }
        } else {
            i += 1;
            &h - Scale(shift.re) * &identity
        };

        let (q, _) = householder_qr(shifted.as_ref());
        h = q.transpose() * &h * &q;
        q_acc = &q_acc * &q;
    }

    // The explicit polynomial and QR products leave rounding noise below the
    // subdiagonal; the transformed block is Hessenberg in exact arithmetic.
    for i in 2..m {
        for j in 0..i - 1 {
            h[(i, j)] = 0.0;
        }
    }
    (h, q_acc)
}

/// Compresses a length-`m` factorization down to length `keep`.
///
/// The `m - keep` smallest Ritz values in `spectral` are used as exact
/// shifts. On return the state holds a valid length-`keep` factorization
/// with an updated residual direction in basis column `keep`, ready for
/// [`expand`](super::arnoldi::expand) to resume from iteration `keep + 1`.
///
/// A vanishing residual norm in the outcome means the compressed subspace
/// is exactly invariant and further expansion from it is meaningless.
pub fn implicit_restart(
    state: &mut KrylovState,
    spectral: &SpectralDecomposition,
    keep: usize,
) -> Result<CompressionOutcome, ArnoldiError> {
    let m = state.k();
    if keep == 0 || keep >= m {
        return Err(ArnoldiErrorKind::InvalidInput(format!(
            "restart must retain between 1 and {} vectors, got {keep}",
            m.saturating_sub(1)
        ))
        .into());
    }
    if spectral.values.len() != m {
        return Err(ArnoldiErrorKind::InvalidInput(format!(
            "spectral decomposition has {} values for a length-{m} factorization",
            spectral.values.len()
        ))
        .into());
    }

    // Ritz values are sorted ascending, so the leading entries are the
    // unwanted ones.
    let shifts = &spectral.values[..m - keep];
    debug!(
        "implicit restart: compressing {m} -> {keep} with {} shifts",
        shifts.len()
    );
    let (h_new, q_acc) = apply_shifts(state.h_square(), shifts);

    let v_new = state.basis() * q_acc.as_ref();

    // Residual update (Sorensen): the new residual direction combines the
    // rotated interior column with the old residual vector.
    let beta = h_new[(keep, keep - 1)];
    let sigma = q_acc[(m - 1, keep - 1)];
    let old_subdiag = state.h[(m, m - 1)];
    let len = state.len();
    let mut f = Mat::<f64>::zeros(len, 1);
    for i in 0..len {
        f[(i, 0)] = v_new[(i, keep)] * beta + state.basis[(i, m)] * old_subdiag * sigma;
    }
    let f_norm = f.norm_l2();

    // Write the compressed factorization back. Everything past column
    // `keep` is cleared so stale entries cannot leak into the next
    // expansion.
    for j in 0..state.capacity() {
        for i in 0..state.capacity() + 1 {
            state.h[(i, j)] = if i < keep && j < keep { h_new[(i, j)] } else { 0.0 };
        }
    }
    state.h[(keep, keep - 1)] = f_norm;

    for j in 0..state.capacity() + 1 {
        for i in 0..len {
            state.basis[(i, j)] = if j < keep { v_new[(i, j)] } else { 0.0 };
        }
    }
    if f_norm > 0.0 {
        for i in 0..len {
            state.basis[(i, keep)] = f[(i, 0)] / f_norm;
        }
    }
    state.k = keep;

    Ok(CompressionOutcome {
        retained: keep,
        residual_norm: f_norm,
    })
}
