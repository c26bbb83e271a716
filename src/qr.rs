use crate::jacobian::{FactoredJacobian, Jacobian};
use crate::linalg_helpers::euclidean_norm_of;
use nalgebra::DVector;


/// A column norm that was updated incrementally is recomputed from scratch
/// once `$0.05\,(\text{current}/\text{last recomputed})^2 \leq \epsilon$`.
const NORM_RECOMPUTATION_THRESHOLD: f64 = 0.05;

/// Householder QR factorization `$J P = Q R$` of the given Jacobian with
/// optional column pivoting.
///
/// The Jacobian is consumed and its storage is reused for the packed factors,
/// see [FactoredJacobian]. With pivoting, the column with the largest remaining
/// norm is moved into pivot position in every step, so that the magnitudes of the
/// diagonal elements of `$R$` are nonincreasing. Without pivoting the permutation
/// is the identity.
///
/// A column whose remaining part is exactly zero (e.g. a parameter that has
/// no effect on any residual) gets no reflection and a zero diagonal element.
/// This is not an error. The factorization stays valid for least squares
/// solutions.
pub fn qr_factorize(jacobian: Jacobian, column_pivoting: bool) -> FactoredJacobian {
    let mut a = jacobian.into_matrix();
    let (m, n) = a.shape();
    let min_mn = m.min(n);

    let acnorm = DVector::from_fn(n, |j, _| euclidean_norm_of(a.column(j).iter().copied()));
    // current norms of the not yet reduced parts of the columns
    let mut rdiag = acnorm.clone();
    // the norms as they were when they were last calculated from scratch
    let mut wa = acnorm.clone();
    let mut ipvt: Vec<usize> = (0..n).collect();
    let mut householder_diag = DVector::zeros(min_mn);

    for j in 0..min_mn {
        if column_pivoting {
            let kmax = (j..n).fold(j, |kmax, k| if rdiag[k] > rdiag[kmax] { k } else { kmax });
            if kmax != j {
                a.swap_columns(j, kmax);
                rdiag[kmax] = rdiag[j];
                wa[kmax] = wa[j];
                ipvt.swap(j, kmax);
            }
        }

        let mut ajnorm = euclidean_norm_of(a.view((j, j), (m - j, 1)).iter().copied());
        if ajnorm != 0. {
            if a[(j, j)] < 0. {
                ajnorm = -ajnorm;
            }
            for i in j..m {
                a[(i, j)] /= ajnorm;
            }
            a[(j, j)] += 1.;

            // apply the reflection to the remaining columns and update their norms
            for k in (j + 1)..n {
                let sum: f64 = (j..m).map(|i| a[(i, j)] * a[(i, k)]).sum();
                let temp = sum / a[(j, j)];
                for i in j..m {
                    a[(i, k)] -= temp * a[(i, j)];
                }
                if column_pivoting && rdiag[k] != 0. {
                    let temp = a[(j, k)] / rdiag[k];
                    rdiag[k] *= (1. - temp * temp).max(0.).sqrt();
                    let ratio = rdiag[k] / wa[k];
                    if NORM_RECOMPUTATION_THRESHOLD * ratio * ratio <= f64::EPSILON {
                        rdiag[k] =
                            euclidean_norm_of(a.view((j + 1, k), (m - j - 1, 1)).iter().copied());
                        wa[k] = rdiag[k];
                    }
                }
            }
        }
        // for a zero column, this is zero as well and marks the missing reflection
        householder_diag[j] = a[(j, j)];
        rdiag[j] = -ajnorm;
        a[(j, j)] = rdiag[j];
    }

    FactoredJacobian {
        packed: a,
        householder_diag,
        rdiag,
        acnorm,
        ipvt,
    }
}
