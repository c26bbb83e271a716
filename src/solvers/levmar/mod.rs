use crate::jacobian::{Jacobian, TriangularFactor};
use crate::linalg_helpers::{euclidean_norm, scaled_norm};
use crate::problem::{Abort, LeastSquaresProblem};
use crate::qr::qr_factorize;
use log::{debug, trace, warn};
use nalgebra::DVector;

mod error;
/// the damping parameter search for the trust region subproblem
pub mod lmpar;
/// the damped linear least squares solver
pub mod qrsolv;
pub mod state;

pub use error::{LevMarError, TerminationReason};
use lmpar::{search_parameter, SearchScratch};
use state::{transition, Event, Thresholds, TrialStep, TrustRegionState};


/// The square root of the machine epsilon, which is the default for the
/// function and step tolerances.
pub const DEFAULT_TOLERANCE: f64 = 1.49012e-8;

/// How the parameters are scaled for the trust region.
///
/// The trust region is the set of steps `$\vec{p}$` with `$\Vert D\vec{p}\Vert \leq \Delta$`,
/// where `$D$` is a positive diagonal matrix of scaling factors.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Scaling {
    /// The scaling factors are the column norms of the initial Jacobian
    /// (`1` for zero columns) and each factor is increased to the
    /// norm of the current column whenever that is larger.
    #[default]
    Automatic,
    /// Fixed, positive scaling factors, one per parameter.
    Fixed(DVector<f64>),
}

/// The classical constants of the trust region method. The defaults are the
/// values of the MINPACK implementation and should only be changed with care,
/// since the iteration counts are sensitive to them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrustRegionTuning {
    /// relative tolerance for the length of the damped step compared to the
    /// radius. Default `0.1`.
    pub search_tolerance: f64,
    /// the radius shrinks if the gain ratio is at most this. Default `0.25`.
    pub shrink_threshold: f64,
    /// the radius grows if the gain ratio is at least this. Default `0.75`.
    pub grow_threshold: f64,
    /// steps with a gain ratio of at least this are accepted. Default `1e-4`.
    pub acceptance_threshold: f64,
    /// maximum number of iterations of the damping parameter search.
    /// Default `10`.
    pub max_search_iterations: usize,
}

impl Default for TrustRegionTuning {
    fn default() -> Self {
        Self {
            search_tolerance: 0.1,
            shrink_threshold: 0.25,
            grow_threshold: 0.75,
            acceptance_threshold: 1e-4,
            max_search_iterations: 10,
        }
    }
}

impl TrustRegionTuning {
    fn validate(&self) -> Result<(), LevMarError> {
        let finite = [
            self.search_tolerance,
            self.shrink_threshold,
            self.grow_threshold,
            self.acceptance_threshold,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite {
            return Err(LevMarError::InvalidTuning {
                reason: "all thresholds must be finite",
            });
        }
        if self.search_tolerance <= 0. || self.search_tolerance >= 1. {
            return Err(LevMarError::InvalidTuning {
                reason: "search tolerance must lie strictly between 0 and 1",
            });
        }
        if !(0. <= self.acceptance_threshold
            && self.acceptance_threshold <= self.shrink_threshold
            && self.shrink_threshold < self.grow_threshold)
        {
            return Err(LevMarError::InvalidTuning {
                reason: "thresholds must satisfy 0 <= acceptance <= shrink < grow",
            });
        }
        if self.max_search_iterations == 0 {
            return Err(LevMarError::InvalidTuning {
                reason: "at least one parameter search iteration is required",
            });
        }
        Ok(())
    }
}

/// All buffers that a minimization needs besides the Jacobian. A workspace can
/// be reused for many minimizations, which avoids reallocations if the problem
/// dimensions stay the same.
#[derive(Debug, Clone, PartialEq)]
pub struct Workspace {
    diag: DVector<f64>,
    qtf: DVector<f64>,
    step: DVector<f64>,
    trial_x: DVector<f64>,
    linear_change: DVector<f64>,
    column_norms: DVector<f64>,
    search: SearchScratch,
    residuals: DVector<f64>,
    trial_residuals: DVector<f64>,
    q_tr_f: DVector<f64>,
}

impl Workspace {
    /// workspace for `m` residuals and `n` parameters
    pub fn new(m: usize, n: usize) -> Self {
        Self {
            diag: DVector::zeros(n),
            qtf: DVector::zeros(n),
            step: DVector::zeros(n),
            trial_x: DVector::zeros(n),
            linear_change: DVector::zeros(n),
            column_norms: DVector::zeros(n),
            search: SearchScratch::new(n),
            residuals: DVector::zeros(m),
            trial_residuals: DVector::zeros(m),
            q_tr_f: DVector::zeros(m),
        }
    }

    /// the total number of elements in all buffers
    pub fn len(&self) -> usize {
        self.diag.len()
            + self.qtf.len()
            + self.step.len()
            + self.trial_x.len()
            + self.linear_change.len()
            + self.column_norms.len()
            + self.search.len()
            + self.residuals.len()
            + self.trial_residuals.len()
            + self.q_tr_f.len()
    }

    /// whether the workspace holds no elements at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// the scaling factors of the last minimization
    pub fn scaling(&self) -> &DVector<f64> {
        &self.diag
    }

    fn prepare(&mut self, m: usize, n: usize) {
        if self.diag.len() != n || self.residuals.len() != m {
            *self = Self::new(m, n);
        }
    }
}

/// The outcome of a minimization that was started with valid inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimizationReport {
    /// why the minimization ended
    pub termination: TerminationReason,
    /// number of evaluations of the residuals
    pub number_of_evaluations: usize,
    /// number of evaluations of the Jacobian
    pub number_of_jacobian_evaluations: usize,
    /// number of outer iterations that ended with an accepted step
    pub iterations: usize,
    /// the norm `$\Vert\vec{f}(\vec{x})\Vert$` of the residuals at the final parameters
    pub residual_norm: f64,
    /// `$\frac{1}{2}\Vert\vec{f}(\vec{x})\Vert^2$` at the final parameters
    pub objective_function: f64,
    /// the residuals at the final parameters
    pub residuals: DVector<f64>,
}

impl MinimizationReport {
    /// the classic integer termination code, see [TerminationReason::code]
    pub fn info(&self) -> i32 {
        self.termination.code()
    }
}

/// A Levenberg-Marquardt solver for nonlinear least squares problems
/// `$\min_{\vec{x}} \frac{1}{2}\Vert\vec{f}(\vec{x})\Vert^2$` that provide
/// their own Jacobian.
///
/// This is the trust region variant of the MINPACK routine `lmder`. Every
/// iteration factors the Jacobian with a column pivoted QR decomposition and
/// then searches for the damping parameter that places the step on the
/// boundary of the trust region. Steps are accepted when the actual reduction
/// of the sum of squares is a large enough fraction of the reduction that the
/// linearization predicts. The radius is adapted from this ratio as well.
///
/// The solver is configured with the `with_*` methods.
/// ```rust
/// # use lmder::prelude::*;
/// let solver = LevMarSolver::new()
///     .with_ftol(1e-10)
///     .with_xtol(1e-10)
///     .with_max_evaluations(500);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LevMarSolver {
    ftol: f64,
    xtol: f64,
    gtol: f64,
    max_evaluations: Option<usize>,
    stepbound: f64,
    scaling: Scaling,
    report_every: usize,
    tuning: TrustRegionTuning,
}

impl Default for LevMarSolver {
    fn default() -> Self {
        Self {
            ftol: DEFAULT_TOLERANCE,
            xtol: DEFAULT_TOLERANCE,
            gtol: 0.,
            max_evaluations: None,
            stepbound: 100.,
            scaling: Scaling::Automatic,
            report_every: 0,
            tuning: TrustRegionTuning::default(),
        }
    }
}

impl LevMarSolver {
    /// solver with the default settings, see the `with_*` methods
    pub fn new() -> Self {
        Self::default()
    }

    /// Terminate when both the actual and the predicted relative reduction
    /// of the sum of squares are at most `ftol`. Default is `$\sqrt{\epsilon}$`.
    #[must_use]
    pub fn with_ftol(self, ftol: f64) -> Self {
        Self { ftol, ..self }
    }

    /// Terminate when the relative error between two consecutive iterates is
    /// at most `xtol`. Default is `$\sqrt{\epsilon}$`.
    #[must_use]
    pub fn with_xtol(self, xtol: f64) -> Self {
        Self { xtol, ..self }
    }

    /// Terminate when the cosine of the angle between the residuals and any
    /// column of the Jacobian is at most `gtol`. Default is `0`.
    #[must_use]
    pub fn with_gtol(self, gtol: f64) -> Self {
        Self { gtol, ..self }
    }

    /// Maximum number of residual evaluations. Default is `$100(n+1)$`.
    #[must_use]
    pub fn with_max_evaluations(self, max_evaluations: usize) -> Self {
        Self {
            max_evaluations: Some(max_evaluations),
            ..self
        }
    }

    /// Factor for the initial radius of the trust region, which is
    /// `stepbound` times the scaled norm of the initial parameters (or just
    /// `stepbound` if that is zero). Default is `100`.
    #[must_use]
    pub fn with_stepbound(self, stepbound: f64) -> Self {
        Self { stepbound, ..self }
    }

    /// How to scale the parameters. Default is [Scaling::Automatic].
    #[must_use]
    pub fn with_scaling(self, scaling: Scaling) -> Self {
        Self { scaling, ..self }
    }

    /// Call [LeastSquaresProblem::report] every `report_every` iterations.
    /// Zero disables reporting, which is the default.
    #[must_use]
    pub fn with_report_every(self, report_every: usize) -> Self {
        Self {
            report_every,
            ..self
        }
    }

    /// Replace the constants of the trust region method.
    #[must_use]
    pub fn with_tuning(self, tuning: TrustRegionTuning) -> Self {
        Self { tuning, ..self }
    }

    fn validate(&self, m: usize, n: usize) -> Result<(), LevMarError> {
        if n == 0 {
            return Err(LevMarError::NoParameters);
        }
        if m < n {
            return Err(LevMarError::TooFewResiduals {
                residuals: m,
                parameters: n,
            });
        }
        for (name, value) in [("ftol", self.ftol), ("xtol", self.xtol), ("gtol", self.gtol)] {
            if !(value.is_finite() && value >= 0.) {
                return Err(LevMarError::NegativeTolerance { name, value });
            }
        }
        if self.max_evaluations == Some(0) {
            return Err(LevMarError::ZeroEvaluationBudget);
        }
        if !(self.stepbound.is_finite() && self.stepbound > 0.) {
            return Err(LevMarError::NonPositiveStepBound {
                stepbound: self.stepbound,
            });
        }
        if let Scaling::Fixed(diag) = &self.scaling {
            if diag.len() != n {
                return Err(LevMarError::ScalingLengthMismatch {
                    expected: n,
                    actual: diag.len(),
                });
            }
            if let Some((index, &value)) = diag
                .iter()
                .enumerate()
                .find(|(_, v)| !(v.is_finite() && **v > 0.))
            {
                return Err(LevMarError::NonPositiveScaling { index, value });
            }
        }
        self.tuning.validate()
    }

    /// Minimize the sum of squares of the residuals of `problem`, starting at
    /// `x`. On return, `x` holds the best parameters that were found.
    ///
    /// # Errors
    /// if the inputs are invalid, in which case the problem was never evaluated
    /// and `x` is untouched. Aborts requested by the problem are not errors,
    /// they are reported as [TerminationReason::UserAbort].
    ///
    /// # Panics
    /// if the problem changes the dimensions of its output buffers, see
    /// [LeastSquaresProblem].
    pub fn minimize<P>(
        &self,
        problem: &mut P,
        x: &mut DVector<f64>,
    ) -> Result<MinimizationReport, LevMarError>
    where
        P: LeastSquaresProblem + ?Sized,
    {
        let mut workspace = Workspace::new(problem.residual_count(), x.len());
        self.minimize_with_workspace(problem, x, &mut workspace)
    }

    /// Like [LevMarSolver::minimize], but with buffers from the given workspace.
    /// The workspace is resized if it does not fit the problem.
    pub fn minimize_with_workspace<P>(
        &self,
        problem: &mut P,
        x: &mut DVector<f64>,
        workspace: &mut Workspace,
    ) -> Result<MinimizationReport, LevMarError>
    where
        P: LeastSquaresProblem + ?Sized,
    {
        let m = problem.residual_count();
        let n = x.len();
        self.validate(m, n)?;
        workspace.prepare(m, n);
        let max_evaluations = self.max_evaluations.unwrap_or(100 * (n + 1));
        let thresholds = Thresholds {
            ftol: self.ftol,
            xtol: self.xtol,
            gtol: self.gtol,
            tuning: self.tuning,
        };
        let mut run = Run {
            solver: self,
            problem,
            workspace,
            evaluations: 0,
            jacobian_evaluations: 0,
            max_evaluations,
        };
        let (termination, state) = run.iterate(x, &thresholds);

        if self.report_every > 0 {
            let iteration = state.map(|s| s.iteration).unwrap_or(1);
            // an abort at this point has no effect anymore
            let _ = run.problem.report(iteration, x, &run.workspace.residuals);
        }

        let residual_norm = euclidean_norm(run.workspace.residuals.as_slice());
        let iterations = state.map(|s| s.iteration - 1).unwrap_or(0);
        debug!(
            "Levenberg-Marquardt terminated with {:?} (code {}) after {} evaluations, {} Jacobian evaluations, {} iterations. Residual norm: {:e}",
            termination,
            termination.code(),
            run.evaluations,
            run.jacobian_evaluations,
            iterations,
            residual_norm
        );
        if termination.is_precision_limited()
            || termination == TerminationReason::MaxEvaluationsReached
        {
            warn!(
                "Levenberg-Marquardt stopped early: {:?}. The result may be less accurate than requested.",
                termination
            );
        }

        Ok(MinimizationReport {
            termination,
            number_of_evaluations: run.evaluations,
            number_of_jacobian_evaluations: run.jacobian_evaluations,
            iterations,
            residual_norm,
            objective_function: 0.5 * residual_norm * residual_norm,
            residuals: run.workspace.residuals.clone(),
        })
    }
}

/// The state of one minimization that is not covered by [TrustRegionState].
struct Run<'a, P: ?Sized> {
    solver: &'a LevMarSolver,
    problem: &'a mut P,
    workspace: &'a mut Workspace,
    evaluations: usize,
    jacobian_evaluations: usize,
    max_evaluations: usize,
}

impl<'a, P> Run<'a, P>
where
    P: LeastSquaresProblem + ?Sized,
{
    fn evaluate_jacobian(&mut self, x: &DVector<f64>, jacobian: &mut Jacobian) -> Result<(), Abort> {
        let shape = (jacobian.residual_count(), jacobian.parameter_count());
        self.jacobian_evaluations += 1;
        self.problem.jacobian(x, jacobian)?;
        assert_eq!(
            (jacobian.residual_count(), jacobian.parameter_count()),
            shape,
            "Problem must not change the dimensions of the Jacobian"
        );
        Ok(())
    }

    /// The outer iteration. Returns why it ended and the trust region state,
    /// if the first iteration got far enough to create one.
    fn iterate(
        &mut self,
        x: &mut DVector<f64>,
        thresholds: &Thresholds,
    ) -> (TerminationReason, Option<TrustRegionState>) {
        let m = self.problem.residual_count();
        let n = x.len();
        let fnorm = match evaluate_residuals(
            &mut *self.problem,
            x,
            &mut self.workspace.residuals,
            &mut self.evaluations,
        ) {
            Ok(fnorm) => fnorm,
            Err(abort) => return (TerminationReason::UserAbort(abort.status()), None),
        };
        let mut jacobian = Jacobian::zeros(m, n);
        let mut state: Option<TrustRegionState> = None;

        loop {
            if let Err(abort) = self.evaluate_jacobian(x, &mut jacobian) {
                return (TerminationReason::UserAbort(abort.status()), state);
            }
            let iteration = state.map(|s| s.iteration).unwrap_or(1);
            if self.solver.report_every > 0 && (iteration - 1) % self.solver.report_every == 0 {
                if let Err(abort) = self
                    .problem
                    .report(iteration, x, &self.workspace.residuals)
                {
                    return (TerminationReason::UserAbort(abort.status()), state);
                }
            }

            let factored = qr_factorize(jacobian, true);
            let ws = &mut *self.workspace;
            ws.column_norms.copy_from(factored.column_norms());

            let mut current = match state {
                Some(current) => current,
                None => {
                    match &self.solver.scaling {
                        Scaling::Automatic => {
                            for (d, &norm) in ws.diag.iter_mut().zip(ws.column_norms.iter()) {
                                *d = if norm == 0. { 1. } else { norm };
                            }
                        }
                        Scaling::Fixed(diag) => ws.diag.copy_from(diag),
                    }
                    let xnorm = scaled_norm(&ws.diag, x);
                    TrustRegionState::initial(self.solver.stepbound, xnorm, fnorm)
                }
            };

            ws.q_tr_f.copy_from(&ws.residuals);
            factored.q_tr_mul(&mut ws.q_tr_f);
            ws.qtf.copy_from(&ws.q_tr_f.rows(0, n));
            let mut factor = factored.into_triangular();

            let gnorm = scaled_gradient_norm(&factor, &ws.qtf, &ws.column_norms, current.fnorm);
            let (next, outcome) = transition(current, Event::Gradient { gnorm }, thresholds);
            current = next;
            state = Some(current);
            debug!(
                "Iteration {}: residual norm {:e}, radius {:e}, damping {:e}, gradient norm {:e}",
                current.iteration, current.fnorm, current.delta, current.par, current.gnorm
            );
            if let Some(termination) = outcome.termination {
                return (termination, state);
            }

            if let Scaling::Automatic = self.solver.scaling {
                for (d, &norm) in ws.diag.iter_mut().zip(ws.column_norms.iter()) {
                    *d = d.max(norm);
                }
            }

            // the inner loop ends with an accepted step
            loop {
                let ws = &mut *self.workspace;
                let search = search_parameter(
                    &mut factor,
                    &ws.diag,
                    &ws.qtf,
                    current.delta,
                    current.par,
                    &thresholds.tuning,
                    &mut ws.step,
                    &mut ws.search,
                );
                ws.trial_x.copy_from(&*x);
                ws.trial_x += &ws.step;
                let pnorm = scaled_norm(&ws.diag, &ws.step);
                factor.r_mul_permuted(&ws.step, &mut ws.linear_change);
                let linear_norm = euclidean_norm(ws.linear_change.as_slice());
                let trial_xnorm = scaled_norm(&ws.diag, &ws.trial_x);

                let trial_fnorm = match evaluate_residuals(
                    &mut *self.problem,
                    &ws.trial_x,
                    &mut ws.trial_residuals,
                    &mut self.evaluations,
                ) {
                    Ok(fnorm) => fnorm,
                    Err(abort) => return (TerminationReason::UserAbort(abort.status()), state),
                };

                let (next, outcome) = transition(
                    current,
                    Event::Trial(TrialStep {
                        fnorm: trial_fnorm,
                        pnorm,
                        linear_norm,
                        par: search.par,
                        xnorm: trial_xnorm,
                        budget_exhausted: self.evaluations >= self.max_evaluations,
                    }),
                    thresholds,
                );
                current = next;
                state = Some(current);

                let ws = &mut *self.workspace;
                if outcome.accepted {
                    x.copy_from(&ws.trial_x);
                    std::mem::swap(&mut ws.residuals, &mut ws.trial_residuals);
                } else {
                    trace!(
                        "Rejected step with residual norm {:e}, new radius {:e}, damping {:e}",
                        trial_fnorm,
                        current.delta,
                        current.par
                    );
                }
                if let Some(termination) = outcome.termination {
                    return (termination, state);
                }
                if outcome.accepted {
                    break;
                }
            }
            jacobian = factor.into_jacobian();
        }
    }
}

/// Evaluate the residuals at `x` into `out` and return their norm.
fn evaluate_residuals<P>(
    problem: &mut P,
    x: &DVector<f64>,
    out: &mut DVector<f64>,
    evaluations: &mut usize,
) -> Result<f64, Abort>
where
    P: LeastSquaresProblem + ?Sized,
{
    let m = problem.residual_count();
    *evaluations += 1;
    problem.residuals(x, out)?;
    assert_eq!(
        out.len(),
        m,
        "Problem must not change the number of residuals"
    );
    Ok(euclidean_norm(out.as_slice()))
}

/// The maximum over all columns of the cosine of the angle between the
/// residuals and that column of the Jacobian. Zero if the residuals vanish.
fn scaled_gradient_norm(
    factor: &TriangularFactor,
    qtf: &DVector<f64>,
    column_norms: &DVector<f64>,
    fnorm: f64,
) -> f64 {
    if fnorm == 0. {
        return 0.;
    }
    factor
        .permutation()
        .iter()
        .enumerate()
        .filter(|&(_, &l)| column_norms[l] != 0.)
        .map(|(j, &l)| {
            let sum: f64 = (0..=j).map(|i| factor.entry(i, j) * (qtf[i] / fnorm)).sum();
            (sum / column_norms[l]).abs()
        })
        .fold(0., f64::max)
}

/// Minimize with the standard settings: function and step tolerance `tol`,
/// gradient tolerance `0`, automatic scaling, step bound `100`, at most
/// `$100(n+1)$` residual evaluations and no reporting.
///
/// The workspace must hold at least `$5n+m$` elements. Unlike
/// [LevMarSolver::minimize], a termination because `gtol` is too small is reported
/// as [TerminationReason::GradientConverged], since the gradient tolerance
/// was not chosen by the caller.
pub fn solve_default<P>(
    problem: &mut P,
    x: &mut DVector<f64>,
    tol: f64,
    workspace: &mut Workspace,
) -> Result<MinimizationReport, LevMarError>
where
    P: LeastSquaresProblem + ?Sized,
{
    let m = problem.residual_count();
    let n = x.len();
    let required = 5 * n + m;
    if workspace.len() < required {
        return Err(LevMarError::WorkspaceTooSmall {
            required,
            actual: workspace.len(),
        });
    }
    let mut report = LevMarSolver::new()
        .with_ftol(tol)
        .with_xtol(tol)
        .with_gtol(0.)
        .with_scaling(Scaling::Automatic)
        .with_stepbound(100.)
        .with_max_evaluations(100 * (n + 1))
        .minimize_with_workspace(problem, x, workspace)?;
    if report.termination == TerminationReason::GtolTooSmall {
        report.termination = TerminationReason::GradientConverged;
    }
    Ok(report)
}
