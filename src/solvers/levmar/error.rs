use thiserror::Error as ThisError;

/// Errors for invalid inputs to the Levenberg-Marquardt solver. These are
/// detected before the problem is evaluated for the first time, so no
/// evaluations have been performed when one of them is returned.
#[derive(Debug, Clone, PartialEq, ThisError)]
pub enum LevMarError {
    /// there are fewer residuals than parameters
    #[error(
        "Number of residuals ({}) must be at least the number of parameters ({}).",
        residuals,
        parameters
    )]
    TooFewResiduals {
        /// number of residuals `$m$`
        residuals: usize,
        /// number of parameters `$n$`
        parameters: usize,
    },

    /// the parameter vector is empty
    #[error("The parameter vector must have at least one element.")]
    NoParameters,

    /// a tolerance is negative or not finite
    #[error("Tolerance '{}' must be finite and nonnegative, but is {}.", name, value)]
    NegativeTolerance {
        /// name of the tolerance
        name: &'static str,
        /// the value that was given
        value: f64,
    },

    /// the maximum number of evaluations is zero
    #[error("Maximum number of function evaluations must be positive.")]
    ZeroEvaluationBudget,

    /// the step bound factor is not positive
    #[error("Step bound must be positive and finite, but is {}.", stepbound)]
    NonPositiveStepBound {
        /// the value that was given
        stepbound: f64,
    },

    /// a fixed scaling factor is not positive
    #[error(
        "Scaling factors must be positive, but element {} is {}.",
        index,
        value
    )]
    NonPositiveScaling {
        /// index of the offending scaling factor
        index: usize,
        /// the value that was given
        value: f64,
    },

    /// the fixed scaling vector does not have one element per parameter
    #[error(
        "Scaling vector has length {}, but there are {} parameters.",
        actual,
        expected
    )]
    ScalingLengthMismatch {
        /// the number of parameters
        expected: usize,
        /// the length of the scaling vector
        actual: usize,
    },

    /// the trust region tuning constants are out of order or out of range
    #[error("Invalid trust region tuning: {}", reason)]
    InvalidTuning {
        /// what is wrong with the tuning
        reason: &'static str,
    },

    /// the workspace is too small for the problem
    #[error(
        "Workspace must have at least {} elements, but has {}.",
        required,
        actual
    )]
    WorkspaceTooSmall {
        /// minimum number of elements
        required: usize,
        /// number of elements in the given workspace
        actual: usize,
    },
}

impl LevMarError {
    /// The classic termination code for invalid inputs, which is always `0`.
    pub fn code(&self) -> i32 {
        0
    }
}

/// The reason why a minimization ended.
///
/// The classic integer termination codes are available via
/// [TerminationReason::code]. Codes `1` through `4` indicate success. Code `5`
/// means the evaluation budget ran out. Codes `6` to `8` mean that the
/// tolerances were too small for any further progress in double precision,
/// which callers can treat as weak convergence. Invalid inputs (code `0`) are
/// reported as [LevMarError] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationReason {
    /// both the actual and predicted relative reductions of the sum of
    /// squares are at most `ftol`
    FunctionConverged,
    /// the relative error between two consecutive iterates is at most `xtol`
    StepConverged,
    /// both of the above
    FunctionAndStepConverged,
    /// the cosine of the angle between the residuals and any column of the
    /// Jacobian is at most `gtol` in absolute value
    GradientConverged,
    /// the number of residual evaluations reached the maximum
    MaxEvaluationsReached,
    /// `ftol` is too small, no further reduction of the sum of squares is possible
    FtolTooSmall,
    /// `xtol` is too small, no further improvement of the parameters is possible
    XtolTooSmall,
    /// `gtol` is too small, the residuals are orthogonal to the columns of the
    /// Jacobian to machine precision
    GtolTooSmall,
    /// the problem requested termination with the given negative status
    UserAbort(i32),
}

impl TerminationReason {
    /// the classic integer termination code
    pub fn code(&self) -> i32 {
        match self {
            TerminationReason::FunctionConverged => 1,
            TerminationReason::StepConverged => 2,
            TerminationReason::FunctionAndStepConverged => 3,
            TerminationReason::GradientConverged => 4,
            TerminationReason::MaxEvaluationsReached => 5,
            TerminationReason::FtolTooSmall => 6,
            TerminationReason::XtolTooSmall => 7,
            TerminationReason::GtolTooSmall => 8,
            TerminationReason::UserAbort(status) => *status,
        }
    }

    /// whether one of the convergence criteria was met (codes `1` to `4`)
    pub fn was_successful(&self) -> bool {
        matches!(
            self,
            TerminationReason::FunctionConverged
                | TerminationReason::StepConverged
                | TerminationReason::FunctionAndStepConverged
                | TerminationReason::GradientConverged
        )
    }

    /// whether the run stopped because of the limits of floating point
    /// precision (codes `6` to `8`)
    pub fn is_precision_limited(&self) -> bool {
        matches!(
            self,
            TerminationReason::FtolTooSmall
                | TerminationReason::XtolTooSmall
                | TerminationReason::GtolTooSmall
        )
    }
}
