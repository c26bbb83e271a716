//! The trust region bookkeeping of the Levenberg-Marquardt iteration as a
//! pure state machine.
//!
//! The driver loop evaluates the problem and solves the linear subproblems.
//! Everything it learns from that is fed to [transition] as an [Event], which
//! updates the radius and damping, decides about acceptance of a trial step
//! and determines whether the minimization has to stop.

use super::{TerminationReason, TrustRegionTuning};


const P1: f64 = 0.1;
const P5: f64 = 0.5;

/// The tolerances the convergence tests use.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    /// relative reduction of the sum of squares
    pub ftol: f64,
    /// relative size of the trust region
    pub xtol: f64,
    /// scaled gradient norm
    pub gtol: f64,
    /// the trust region constants
    pub tuning: TrustRegionTuning,
}

/// State that is carried between the iterations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrustRegionState {
    /// trust region radius
    pub delta: f64,
    /// damping parameter
    pub par: f64,
    /// residual norm at the current point
    pub fnorm: f64,
    /// scaled norm of the current point
    pub xnorm: f64,
    /// scaled gradient norm at the current point
    pub gnorm: f64,
    /// the outer iteration, starting at one and advancing on every accepted step
    pub iteration: usize,
}

impl TrustRegionState {
    /// The state at the start of the first iteration. The initial radius is
    /// `stepbound` times the scaled norm `xnorm` of the starting point, or
    /// `stepbound` itself if the starting point is zero.
    pub fn initial(stepbound: f64, xnorm: f64, fnorm: f64) -> Self {
        let delta = stepbound * xnorm;
        Self {
            delta: if delta == 0. { stepbound } else { delta },
            par: 0.,
            fnorm,
            xnorm,
            gnorm: 0.,
            iteration: 1,
        }
    }
}

/// What the driver measured for a trial step `$\vec{p}$`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialStep {
    /// residual norm at the trial point
    pub fnorm: f64,
    /// scaled norm `$\Vert D\vec{p}\Vert$` of the step
    pub pnorm: f64,
    /// norm `$\Vert J\vec{p}\Vert$` of the linearized change of the residuals
    pub linear_norm: f64,
    /// the damping parameter the step was calculated with
    pub par: f64,
    /// scaled norm of the trial point
    pub xnorm: f64,
    /// whether the evaluation of the trial point used up the evaluation budget
    pub budget_exhausted: bool,
}

/// Something the driver observed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    /// the scaled gradient norm was calculated after a Jacobian evaluation
    Gradient {
        /// the scaled gradient norm
        gnorm: f64,
    },
    /// a trial step was evaluated
    Trial(TrialStep),
}

/// The outcome of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// whether the trial point becomes the current point
    pub accepted: bool,
    /// if set, the minimization ends
    pub termination: Option<TerminationReason>,
}

impl Transition {
    fn proceed() -> Self {
        Self {
            accepted: false,
            termination: None,
        }
    }
}

/// Advance the state by one event.
pub fn transition(
    state: TrustRegionState,
    event: Event,
    thresholds: &Thresholds,
) -> (TrustRegionState, Transition) {
    match event {
        Event::Gradient { gnorm } => {
            let state = TrustRegionState { gnorm, ..state };
            let termination =
                (gnorm <= thresholds.gtol).then_some(TerminationReason::GradientConverged);
            (
                state,
                Transition {
                    termination,
                    ..Transition::proceed()
                },
            )
        }
        Event::Trial(trial) => trial_step(state, trial, thresholds),
    }
}

fn trial_step(
    mut state: TrustRegionState,
    trial: TrialStep,
    thresholds: &Thresholds,
) -> (TrustRegionState, Transition) {
    let tuning = &thresholds.tuning;
    state.par = trial.par;
    if state.iteration == 1 {
        state.delta = state.delta.min(trial.pnorm);
    }

    let actred = if P1 * trial.fnorm < state.fnorm {
        1. - (trial.fnorm / state.fnorm).powi(2)
    } else {
        -1.
    };
    let temp1 = trial.linear_norm / state.fnorm;
    let temp2 = trial.par.sqrt() * trial.pnorm / state.fnorm;
    let prered = temp1 * temp1 + temp2 * temp2 / P5;
    let dirder = -(temp1 * temp1 + temp2 * temp2);
    let ratio = if prered != 0. { actred / prered } else { 0. };

    if ratio <= tuning.shrink_threshold {
        let mut temp = if actred >= 0. {
            P5
        } else {
            P5 * dirder / (dirder + P5 * actred)
        };
        if P1 * trial.fnorm >= state.fnorm || temp < P1 {
            temp = P1;
        }
        state.delta = temp * state.delta.min(trial.pnorm / P1);
        state.par /= temp;
    } else if state.par == 0. || ratio >= tuning.grow_threshold {
        state.delta = trial.pnorm / P5;
        state.par *= P5;
    }

    let accepted = ratio >= tuning.acceptance_threshold;
    if accepted {
        state.xnorm = trial.xnorm;
        state.fnorm = trial.fnorm;
        state.iteration += 1;
    }

    let function_converged =
        actred.abs() <= thresholds.ftol && prered <= thresholds.ftol && P5 * ratio <= 1.;
    let step_converged = state.delta <= thresholds.xtol * state.xnorm;
    let mut termination = match (function_converged, step_converged) {
        (true, true) => Some(TerminationReason::FunctionAndStepConverged),
        (true, false) => Some(TerminationReason::FunctionConverged),
        (false, true) => Some(TerminationReason::StepConverged),
        (false, false) => None,
    };

    // later tests take precedence over earlier ones
    if termination.is_none() {
        let eps = f64::EPSILON;
        if trial.budget_exhausted {
            termination = Some(TerminationReason::MaxEvaluationsReached);
        }
        if actred.abs() <= eps && prered <= eps && P5 * ratio <= 1. {
            termination = Some(TerminationReason::FtolTooSmall);
        }
        if state.delta <= eps * state.xnorm {
            termination = Some(TerminationReason::XtolTooSmall);
        }
        if state.gnorm <= eps {
            termination = Some(TerminationReason::GtolTooSmall);
        }
    }

    (
        state,
        Transition {
            accepted,
            termination,
        },
    )
}
