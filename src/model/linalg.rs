use ndarray::{Array1, Array2, ArrayView2};

use crate::error::ModelError;

const MAX_SWEEPS: usize = 64;

/// Eigenvalues at or below this fraction of the largest one are treated as zero.
///
/// Forming a Gram matrix squares the condition number, so rounding noise in
/// null directions sits well above machine epsilon.
pub const RELATIVE_CUTOFF: f64 = 1e-10;

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// Returns `(eigenvalues, eigenvectors)` with eigenvectors as columns, so
/// `a = v · diag(λ) · vᵀ`. Only the symmetric part of `a` is meaningful.
pub fn symmetric_eigen(a: ArrayView2<'_, f64>) -> Result<(Array1<f64>, Array2<f64>), ModelError> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(ModelError::DimensionMismatch {
            expected: n,
            got: a.ncols(),
        });
    }

    let mut a = a.to_owned();
    let mut v = Array2::<f64>::eye(n);
    let scale: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let tolerance = f64::EPSILON * scale;

    let mut converged = false;
    for _ in 0..MAX_SWEEPS {
        if off_diagonal_norm(&a) <= tolerance {
            converged = true;
            break;
        }

        for p in 0..n {
            for q in p + 1..n {
                let apq = a[[p, q]];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let sign = if theta >= 0.0 { 1.0 } else { -1.0 };
                let t = sign / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let (akp, akq) = (a[[k, p]], a[[k, q]]);
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let (apk, aqk) = (a[[p, k]], a[[q, k]]);
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let (vkp, vkq) = (v[[k, p]], v[[k, q]]);
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    if a.iter().any(|x| !x.is_finite()) {
        return Err(ModelError::Computation(
            "eigen-decomposition produced non-finite values".to_string(),
        ));
    }
    if !converged {
        let off = off_diagonal_norm(&a);
        if off > tolerance {
            tracing::warn!(n, sweeps = MAX_SWEEPS, off, tolerance, "Jacobi eigen-decomposition did not converge");
        }
    }
    Ok((a.diag().to_owned(), v))
}

/// Frobenius norm of the strictly upper triangle.
fn off_diagonal_norm(a: &Array2<f64>) -> f64 {
    let n = a.nrows();
    (0..n)
        .flat_map(|p| (p + 1..n).map(move |q| (p, q)))
        .map(|(p, q)| a[[p, q]] * a[[p, q]])
        .sum::<f64>()
        .sqrt()
}

/// Minimum-norm solution of `a · x = b` for symmetric positive semi-definite `a`.
///
/// Eigenvalues at or below `RELATIVE_CUTOFF · λ_max` are treated as zero,
/// which keeps rank-deficient systems solvable.
pub fn pinv_solve(a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
    let n = a.nrows();
    if b.nrows() != n {
        return Err(ModelError::DimensionMismatch {
            expected: n,
            got: b.nrows(),
        });
    }
    let mut x = Array2::zeros((n, b.ncols()));
    if n == 0 {
        return Ok(x);
    }

    let (values, vectors) = symmetric_eigen(a)?;
    let max = values.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    let cutoff = RELATIVE_CUTOFF * max;

    for (k, lambda) in values.iter().enumerate() {
        if *lambda <= cutoff {
            continue;
        }
        let vk = vectors.column(k);
        // x += v_k (v_kᵀ b) / λ_k
        let projection = vk.dot(&b) / *lambda;
        for i in 0..n {
            let vi = vk[i];
            x.row_mut(i).scaled_add(vi, &projection);
        }
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn eigen_reconstructs_matrix() {
        let m = array![[4.0, 1.0, 2.0], [1.0, 3.0, 0.5], [2.0, 0.5, 5.0]];
        let (values, vectors) = symmetric_eigen(m.view()).expect("eigen");

        let rebuilt = vectors.dot(&Array2::from_diag(&values)).dot(&vectors.t());
        for (x, y) in rebuilt.iter().zip(m.iter()) {
            assert_close(*x, *y);
        }
        assert_close(values.sum(), 12.0);
    }

    #[test]
    fn eigen_leaves_no_off_diagonal_mass() {
        let a = array![[2.0, 1.0, 0.5, 0.0], [1.0, 3.0, 0.2, 1.0], [0.5, 0.2, 1.0, 0.3], [0.0, 1.0, 0.3, 4.0]];
        let (values, vectors) = symmetric_eigen(a.view()).expect("eigen");
        let diagonalized = vectors.t().dot(&a).dot(&vectors);

        assert!(off_diagonal_norm(&diagonalized) < 1e-9);
        for i in 0..4 {
            assert_close(diagonalized[[i, i]], values[i]);
        }
        assert_close(off_diagonal_norm(&Array2::eye(3)), 0.0);
    }

    #[test]
    fn full_rank_system_is_solved_exactly() {
        let a = array![[2.0, 1.0], [1.0, 3.0]];
        let b = array![[3.0], [5.0]];
        let x = pinv_solve(a.view(), b.view()).expect("solve");
        assert_close(x[[0, 0]], 0.8);
        assert_close(x[[1, 0]], 1.4);
    }

    #[test]
    fn singular_system_gets_minimum_norm_solution() {
        // Rank one: [1 1; 1 1] x = [2; 2]. Minimum-norm answer is [1; 1].
        let a = array![[1.0, 1.0], [1.0, 1.0]];
        let b = array![[2.0], [2.0]];
        let x = pinv_solve(a.view(), b.view()).expect("solve");
        assert_close(x[[0, 0]], 1.0);
        assert_close(x[[1, 0]], 1.0);
    }

    #[test]
    fn zero_matrix_yields_zero_solution() {
        let a = Array2::<f64>::zeros((3, 3));
        let b = array![[1.0], [2.0], [3.0]];
        let x = pinv_solve(a.view(), b.view()).expect("solve");
        assert!(x.iter().all(|v| *v == 0.0));
    }
}
