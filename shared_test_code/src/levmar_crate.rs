use levenberg_marquardt::LeastSquaresProblem as LevmarLeastSquaresProblem;
use lmder::prelude::*;
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn};
use std::cell::RefCell;

/// Wraps a problem of this crate so that it can be minimized by the
/// [levenberg_marquardt](https://crates.io/crates/levenberg-marquardt) crate,
/// which lets us compare the solutions of both implementations.
#[derive(Debug)]
pub struct LevmarCrateAdapter<P> {
    problem: RefCell<P>,
    params: DVector<f64>,
}

impl<P: LeastSquaresProblem> LevmarCrateAdapter<P> {
    /// wrap the problem with the given initial parameters
    pub fn new(problem: P, initial_guess: DVector<f64>) -> Self {
        Self {
            problem: RefCell::new(problem),
            params: initial_guess,
        }
    }

    /// the wrapped problem
    pub fn into_inner(self) -> P {
        self.problem.into_inner()
    }
}

impl<P: LeastSquaresProblem> LevmarLeastSquaresProblem<f64, Dyn, Dyn> for LevmarCrateAdapter<P> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.copy_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let mut problem = self.problem.borrow_mut();
        let mut residuals = DVector::zeros(problem.residual_count());
        problem.residuals(&self.params, &mut residuals).ok()?;
        Some(residuals)
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let mut problem = self.problem.borrow_mut();
        let mut jacobian = Jacobian::zeros(problem.residual_count(), self.params.len());
        problem.jacobian(&self.params, &mut jacobian).ok()?;
        Some(jacobian.as_matrix().clone())
    }
}
