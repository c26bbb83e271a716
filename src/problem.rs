use crate::jacobian::Jacobian;
use nalgebra::DVector;
use thiserror::Error as ThisError;

/// A request from the problem to stop the minimization immediately.
///
/// An abort carries a negative status code, which becomes the
/// termination code of the run verbatim. See
/// [TerminationReason::UserAbort](crate::solvers::levmar::TerminationReason::UserAbort).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ThisError)]
#[error("Evaluation aborted by the problem with status {status}")]
pub struct Abort {
    status: i32,
}

impl Abort {
    /// An abort with status `-1`.
    pub fn new() -> Self {
        Self { status: -1 }
    }

    /// An abort with the given status, which must be negative. Status codes
    /// that are zero or positive would mean "continue" in the classic interface
    /// and are replaced by `-1`.
    pub fn with_status(status: i32) -> Self {
        if status < 0 {
            Self { status }
        } else {
            Self::new()
        }
    }

    /// the (always negative) status code
    pub fn status(&self) -> i32 {
        self.status
    }
}

impl Default for Abort {
    fn default() -> Self {
        Self::new()
    }
}

/// A nonlinear least squares problem
/// ```math
/// \min_{\vec{x}\in\mathbb{R}^n} \frac{1}{2}\Vert \vec{f}(\vec{x}) \Vert_2^2,
/// ```
/// with residual vector `$\vec{f}: \mathbb{R}^n \rightarrow \mathbb{R}^m$` and
/// `$m \geq n$`, which provides its own Jacobian.
///
/// The solver owns the parameters `$\vec{x}$` and the output buffers and passes
/// them to the problem for every evaluation. Implementations must only write
/// the requested outputs. Returning an [Abort] from any method stops the
/// minimization immediately.
#[cfg_attr(test, mockall::automock)]
pub trait LeastSquaresProblem {
    /// the number of residuals `$m$`
    fn residual_count(&self) -> usize;

    /// Calculate the residual vector `$\vec{f}(\vec{x})$` into `residuals`,
    /// which has length `$m$`. The Jacobian is not touched.
    ///
    /// # Panics
    /// The solver panics if the implementation replaces `residuals` by a
    /// vector of a different length.
    fn residuals(&mut self, x: &DVector<f64>, residuals: &mut DVector<f64>) -> Result<(), Abort>;

    /// Calculate the Jacobian `$J(\vec{x})$` of the residuals into `jacobian`.
    /// See [Jacobian] for the layout. The residuals are not touched.
    ///
    /// On entry every element of `jacobian` is zero, so it is enough to
    /// set the structurally nonzero entries.
    ///
    /// # Panics
    /// The solver panics if the implementation replaces `jacobian` by a
    /// matrix of different dimensions.
    fn jacobian(&mut self, x: &DVector<f64>, jacobian: &mut Jacobian) -> Result<(), Abort>;

    /// Informational callback that is invoked periodically if reporting was
    /// enabled on the solver, as well as once when the minimization ends.
    /// `iteration` counts the accepted steps, starting at one.
    ///
    /// The default implementation does nothing.
    fn report(
        &mut self,
        _iteration: usize,
        _x: &DVector<f64>,
        _residuals: &DVector<f64>,
    ) -> Result<(), Abort> {
        Ok(())
    }
}
