use super::qrsolv::solve_damped;
use super::TrustRegionTuning;
use crate::jacobian::TriangularFactor;
use crate::linalg_helpers::euclidean_norm;
use log::trace;
use nalgebra::DVector;


/// when the upper bound for the damping parameter is zero, the damping
/// parameter is restarted from this fraction of it.
const P001: f64 = 0.001;

/// Scratch vectors for the [search_parameter] routine.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchScratch {
    pub(crate) sdiag: DVector<f64>,
    pub(crate) wa1: DVector<f64>,
    pub(crate) wa2: DVector<f64>,
}

impl SearchScratch {
    /// scratch space for a problem with `n` parameters
    pub fn new(n: usize) -> Self {
        Self {
            sdiag: DVector::zeros(n),
            wa1: DVector::zeros(n),
            wa2: DVector::zeros(n),
        }
    }

    /// the total number of elements held
    pub fn len(&self) -> usize {
        self.sdiag.len() + self.wa1.len() + self.wa2.len()
    }

    /// whether the scratch holds no elements at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn resize(&mut self, n: usize) {
        if self.sdiag.len() != n {
            *self = Self::new(n);
        }
    }
}

/// The result of the search for the damping parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOutcome {
    /// the damping parameter. Zero if the Gauss-Newton step is acceptable.
    pub par: f64,
    /// the number of damped solves that were performed
    pub iterations: usize,
}

/// Find the damping parameter `$\lambda \geq 0$` such that the step
/// `$\vec{p}(\lambda)$` that solves
/// ```math
/// \min_{\vec{p}} \Vert J\vec{p} + \vec{f}\Vert_2^2 + \lambda \Vert D\vec{p} \Vert_2^2
/// ```
/// has a scaled length `$\Vert D \vec{p}\Vert$` close to the trust region radius `delta`.
///
/// The Jacobian enters only through its pivoted QR factorization `$JP = QR$`
/// given by `factor`, and `qtb` holds the first `$n$` components of `$Q^T\vec{f}$`.
/// If the Gauss-Newton step (`$\lambda = 0$`) already has a scaled length of at
/// most `$(1+\sigma)\Delta$`, where `$\sigma$` is the search tolerance of `tuning`,
/// the damping parameter is zero. Otherwise the returned damping parameter
/// gives `$\vert\Vert D\vec{p}\Vert - \Delta\vert \leq \sigma\Delta$`, unless the
/// iteration limit of `tuning` was reached first.
///
/// `par` is the initial estimate of the damping parameter. The step `$\vec{p}$` is
/// written into `step`. On return, the strict lower triangle of `factor` holds
/// the transposed strict upper part of the triangular factor of the damped
/// system, see [solve_damped].
#[allow(clippy::too_many_arguments)]
pub fn search_parameter(
    factor: &mut TriangularFactor,
    diag: &DVector<f64>,
    qtb: &DVector<f64>,
    delta: f64,
    par: f64,
    tuning: &TrustRegionTuning,
    step: &mut DVector<f64>,
    scratch: &mut SearchScratch,
) -> SearchOutcome {
    let n = factor.dim();
    assert_eq!(diag.len(), n, "Scaling vector has wrong length");
    assert_eq!(qtb.len(), n, "Projected residual has wrong length");
    assert_eq!(step.len(), n, "Step vector has wrong length");
    scratch.resize(n);
    let dwarf = f64::MIN_POSITIVE;
    let sigma = tuning.search_tolerance;
    let SearchScratch { sdiag, wa1, wa2 } = scratch;

    // Gauss-Newton direction. A singular R contributes zeros.
    let nsing = (0..n)
        .position(|j| factor.entry(j, j).abs() <= f64::EPSILON)
        .unwrap_or(n);
    wa1.copy_from(qtb);
    wa1.rows_mut(nsing, n - nsing).fill(0.);
    for j in (0..nsing).rev() {
        wa1[j] /= factor.entry(j, j);
        let temp = wa1[j];
        for i in 0..j {
            wa1[i] -= factor.entry(i, j) * temp;
        }
    }
    for (j, &l) in factor.permutation().iter().enumerate() {
        step[l] = wa1[j];
    }

    wa2.copy_from(diag);
    wa2.component_mul_assign(&*step);
    let mut dxnorm = euclidean_norm(wa2.as_slice());
    let mut fp = dxnorm - delta;
    if fp <= sigma * delta {
        trace!(
            "Gauss-Newton step with scaled norm {:e} lies inside trust region {:e}",
            dxnorm,
            delta
        );
        step.neg_mut();
        return SearchOutcome {
            par: 0.,
            iterations: 0,
        };
    }

    // Lower bound from a Newton step, only available if the Jacobian has full rank.
    let mut parl = 0.;
    if nsing >= n {
        for (j, &l) in factor.permutation().iter().enumerate() {
            wa1[j] = diag[l] * (wa2[l] / dxnorm);
        }
        for j in 0..n {
            let sum: f64 = (0..j).map(|i| factor.entry(i, j) * wa1[i]).sum();
            wa1[j] = (wa1[j] - sum) / factor.entry(j, j);
        }
        let temp = euclidean_norm(wa1.as_slice());
        parl = ((fp / delta) / temp) / temp;
    }

    // Upper bound from the scaled gradient.
    for (j, &l) in factor.permutation().iter().enumerate() {
        let sum: f64 = (0..=j).map(|i| factor.entry(i, j) * qtb[i]).sum();
        wa1[j] = sum / diag[l];
    }
    let gnorm = euclidean_norm(wa1.as_slice());
    let mut paru = gnorm / delta;
    if paru == 0. {
        paru = dwarf / delta.min(sigma);
    }

    let mut par = par.max(parl).min(paru);
    if par == 0. {
        par = gnorm / dxnorm;
    }

    let mut iterations = 0;
    loop {
        iterations += 1;
        if par == 0. {
            par = dwarf.max(P001 * paru);
        }
        let sqrt_par = par.sqrt();
        wa1.copy_from(diag);
        wa1.scale_mut(sqrt_par);
        solve_damped(factor, wa1, qtb, step, sdiag, wa2);
        wa2.copy_from(diag);
        wa2.component_mul_assign(&*step);
        dxnorm = euclidean_norm(wa2.as_slice());
        let previous_fp = fp;
        fp = dxnorm - delta;
        trace!(
            "Parameter search iteration {}: par = {:e}, scaled step norm = {:e}, bracket = [{:e}, {:e}]",
            iterations,
            par,
            dxnorm,
            parl,
            paru
        );

        if fp.abs() <= sigma * delta
            || (parl == 0. && fp <= previous_fp && previous_fp < 0.)
            || iterations >= tuning.max_search_iterations
        {
            break;
        }

        // Newton correction through the factor of the damped system
        for (j, &l) in factor.permutation().iter().enumerate() {
            wa1[j] = diag[l] * (wa2[l] / dxnorm);
        }
        for j in 0..n {
            wa1[j] /= sdiag[j];
            let temp = wa1[j];
            for i in (j + 1)..n {
                wa1[i] -= factor.entry(i, j) * temp;
            }
        }
        let temp = euclidean_norm(wa1.as_slice());
        let parc = ((fp / delta) / temp) / temp;

        if fp > 0. {
            parl = parl.max(par);
        }
        if fp < 0. {
            paru = paru.min(par);
        }
        par = parl.max(par + parc);
    }

    step.neg_mut();
    SearchOutcome { par, iterations }
}
