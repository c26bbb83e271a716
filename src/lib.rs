#![warn(missing_docs)]
//!
//! # Introduction
//!
//! This crate solves dense nonlinear least squares problems
//!
//! ```math
//! \min_{\vec{x}\in\mathbb{R}^n} \frac{1}{2} \Vert \vec{f}(\vec{x}) \Vert_2^2,
//! ```
//!
//! where `$\vec{f}: \mathbb{R}^n \rightarrow \mathbb{R}^m$` with `$m \geq n$` is a vector of
//! residuals whose Jacobian the caller can calculate. The solver is the trust region
//! formulation of the Levenberg-Marquardt algorithm as implemented in the MINPACK routine
//! `lmder` (Moré1978).
//!
//! ## How It Works
//!
//! Each iteration of the algorithm looks for a step `$\vec{p}$` that minimizes the linearized
//! residuals `$\Vert J\vec{p}+\vec{f}\Vert$` within a trust region `$\Vert D\vec{p}\Vert\leq\Delta$`,
//! where `$D$` is a diagonal scaling matrix. This is done in a number of layers:
//!
//! * The Jacobian is decomposed with a [column pivoted QR decomposition](crate::qr::qr_factorize).
//! * A [damped linear least squares solver](crate::solvers::levmar::qrsolv::solve_damped) folds
//!   the damping term into the triangular factor using Givens rotations.
//! * A [parameter search](crate::solvers::levmar::lmpar::search_parameter) finds the
//!   damping parameter for which the step lies on the boundary of the trust region.
//! * The [outer iteration](crate::solvers::levmar::LevMarSolver) accepts or rejects the step
//!   depending on how well the actual reduction of the residuals matches the prediction and
//!   adapts the trust region accordingly. The bookkeeping of that is a pure
//!   [state machine](crate::solvers::levmar::state).
//!
//! All norms are calculated with an [overflow and underflow safe](crate::linalg_helpers::euclidean_norm)
//! algorithm.
//!
//! # Usage
//!
//! 1. Implement the [LeastSquaresProblem](crate::problem::LeastSquaresProblem) trait for your
//!    problem. It calculates the residuals and the [Jacobian](crate::jacobian::Jacobian) for given
//!    parameters. Any method can return an [Abort](crate::problem::Abort) to stop the minimization.
//! 2. Configure a [LevMarSolver](crate::solvers::levmar::LevMarSolver) or use the defaults.
//! 3. Minimize and inspect the [report](crate::solvers::levmar::MinimizationReport), which tells
//!    you [why](crate::solvers::levmar::TerminationReason) the minimization ended.
//!
//! # Example
//!
//! Fit a line through the origin `$y = a\,x$` to three data points. The residuals are
//! `$f_i(a) = a\,x_i - y_i$` and the Jacobian is just the vector of the `$x_i$`.
//!
//! ```rust
//! use lmder::prelude::*;
//! use nalgebra::{dvector, DVector};
//!
//! struct LineThroughOrigin {
//!     x: DVector<f64>,
//!     y: DVector<f64>,
//! }
//!
//! impl LeastSquaresProblem for LineThroughOrigin {
//!     fn residual_count(&self) -> usize {
//!         self.x.len()
//!     }
//!
//!     fn residuals(&mut self, a: &DVector<f64>, residuals: &mut DVector<f64>) -> Result<(), Abort> {
//!         residuals.copy_from(&(&self.x * a[0] - &self.y));
//!         Ok(())
//!     }
//!
//!     fn jacobian(&mut self, _a: &DVector<f64>, jacobian: &mut Jacobian) -> Result<(), Abort> {
//!         jacobian.parameter_column_mut(0).copy_from(&self.x);
//!         Ok(())
//!     }
//! }
//!
//! let mut problem = LineThroughOrigin {
//!     x: dvector![1., 2., 3.],
//!     y: dvector![2., 4., 6.1],
//! };
//! let mut a = dvector![0.];
//! let report = LevMarSolver::new()
//!     .minimize(&mut problem, &mut a)
//!     .expect("inputs are valid");
//!
//! assert!(report.termination.was_successful());
//! // the least squares solution is sum(x*y)/sum(x*x)
//! assert!((a[0] - 28.3 / 14.).abs() < 1e-6);
//! ```
//!
//! # References
//! (Moré1978) Moré, J.J. The Levenberg-Marquardt algorithm: Implementation and theory.
//! In: Watson G.A. (eds) Numerical Analysis. *Lecture Notes in Mathematics* **630**. Springer (1978).
//! DOI: [10.1007/BFb0067700](https://doi.org/10.1007/BFb0067700)
//!
//! (Moré1980) Moré, J.J., Garbow, B.S., Hillstrom, K.E. *User Guide for MINPACK-1*. Argonne National
//! Laboratory Report ANL-80-74 (1980).

/// the Jacobian matrix and its factorizations
pub mod jacobian;
/// numerically robust norms
pub mod linalg_helpers;
/// commonly useful imports
pub mod prelude;
/// the interface between the solver and the problem to be minimized
pub mod problem;
/// Householder QR decomposition with column pivoting
pub mod qr;
/// solvers for the nonlinear minimization problem
pub mod solvers;
