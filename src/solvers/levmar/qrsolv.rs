use crate::jacobian::TriangularFactor;
use nalgebra::DVector;


/// Solve the damped linear least squares problem
/// ```math
/// \min_{\vec{x}} \left\Vert \begin{pmatrix} R \\ D \end{pmatrix} P^T \vec{x} - \begin{pmatrix} Q^T\vec{b} \\ \vec{0}\end{pmatrix}\right\Vert_2,
/// ```
/// where `$R$` and `$P$` are given by `factor` and `$D = \text{diag}(\vec{d})$`.
///
/// The rows of `$D$` are eliminated against `$R$` with Givens rotations, which
/// yields an upper triangular `$S$` with `$P^T (R^T R + D^T D) P = S^T S$`. The
/// strict upper part of `$S$` is written transposed into the strict lower triangle
/// of `factor` and the diagonal of `$S$` is written to `sdiag`. `$R$` itself (upper
/// triangle including diagonal) is left intact.
///
/// Diagonal elements of `$S$` with magnitude at most `$\epsilon$` are treated as a
/// rank deficiency: the corresponding components of the solution, and all
/// components after them in pivoted order, are set to zero.
///
/// `work` is scratch space.
///
/// # Panics
/// if any of the vectors does not have the dimension of the factor
pub fn solve_damped(
    factor: &mut TriangularFactor,
    diag: &DVector<f64>,
    qtb: &DVector<f64>,
    x: &mut DVector<f64>,
    sdiag: &mut DVector<f64>,
    work: &mut DVector<f64>,
) {
    let n = factor.dim();
    for (name, len) in [
        ("diag", diag.len()),
        ("qtb", qtb.len()),
        ("x", x.len()),
        ("sdiag", sdiag.len()),
        ("work", work.len()),
    ] {
        assert_eq!(len, n, "Vector {} must have the dimension of the factor", name);
    }

    // copy R to the lower triangle and save its diagonal in x
    for j in 0..n {
        for i in j..n {
            factor.set_entry(i, j, factor.entry(j, i));
        }
        x[j] = factor.entry(j, j);
        work[j] = qtb[j];
    }

    for j in 0..n {
        let l = factor.permutation()[j];
        if diag[l] != 0. {
            sdiag.rows_mut(j, n - j).fill(0.);
            sdiag[j] = diag[l];

            // the rotations only touch elements of qtb beyond the j-th
            let mut qtbpj = 0.;
            for k in j..n {
                if sdiag[k] == 0. {
                    continue;
                }
                let (cos, sin) = givens(factor.entry(k, k), sdiag[k]);
                factor.set_entry(k, k, cos * factor.entry(k, k) + sin * sdiag[k]);
                let temp = cos * work[k] + sin * qtbpj;
                qtbpj = -sin * work[k] + cos * qtbpj;
                work[k] = temp;

                for i in (k + 1)..n {
                    let rik = factor.entry(i, k);
                    let temp = cos * rik + sin * sdiag[i];
                    sdiag[i] = -sin * rik + cos * sdiag[i];
                    factor.set_entry(i, k, temp);
                }
            }
        }
        // store the diagonal of S and restore the diagonal of R
        sdiag[j] = factor.entry(j, j);
        factor.set_entry(j, j, x[j]);
    }

    // the singular part of the system is solved in the least squares sense
    let nsing = sdiag
        .iter()
        .position(|s| s.abs() <= f64::EPSILON)
        .unwrap_or(n);
    work.rows_mut(nsing, n - nsing).fill(0.);

    for j in (0..nsing).rev() {
        let sum: f64 = ((j + 1)..nsing)
            .map(|i| factor.entry(i, j) * work[i])
            .sum();
        work[j] = (work[j] - sum) / sdiag[j];
    }

    for (j, &l) in factor.permutation().iter().enumerate() {
        x[l] = work[j];
    }
}

/// cosine and sine of the rotation that eliminates `b` against `a`
#[inline]
fn givens(a: f64, b: f64) -> (f64, f64) {
    if a.abs() < b.abs() {
        let cotan = a / b;
        let sin = 0.5 / (0.25 + 0.25 * cotan * cotan).sqrt();
        (sin * cotan, sin)
    } else {
        let tan = b / a;
        let cos = 0.5 / (0.25 + 0.25 * tan * tan).sqrt();
        (cos, cos * tan)
    }
}
