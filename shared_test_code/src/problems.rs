use crate::{exp_decay, exp_decay_dtau};
use lmder::prelude::*;
use nalgebra::DVector;

/// fit a line through the origin `y = a*x` with the single parameter `a`.
/// The residuals are `a*x_i - y_i`.
#[derive(Clone, Debug, PartialEq)]
pub struct LineThroughOrigin {
    x: DVector<f64>,
    y: DVector<f64>,
}

impl LineThroughOrigin {
    /// create new fitting problem from the data. x and y must have the same length.
    pub fn new(x: DVector<f64>, y: DVector<f64>) -> Self {
        assert_eq!(x.len(), y.len(), "x and y must have same length");
        Self { x, y }
    }

    /// the least squares solution `sum(x*y)/sum(x*x)`
    pub fn exact_solution(&self) -> f64 {
        self.x.dot(&self.y) / self.x.dot(&self.x)
    }
}

impl LeastSquaresProblem for LineThroughOrigin {
    fn residual_count(&self) -> usize {
        self.x.len()
    }

    fn residuals(&mut self, a: &DVector<f64>, residuals: &mut DVector<f64>) -> Result<(), Abort> {
        residuals.copy_from(&(&self.x * a[0] - &self.y));
        Ok(())
    }

    fn jacobian(&mut self, _a: &DVector<f64>, jacobian: &mut Jacobian) -> Result<(), Abort> {
        jacobian.parameter_column_mut(0).copy_from(&self.x);
        Ok(())
    }
}

/// The Rosenbrock function written as residuals
/// `f_1 = 10(x_2 - x_1^2)`, `f_2 = 1 - x_1`. The minimum is at `(1,1)`
/// and the standard starting point is `(-1.2, 1)`.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Rosenbrock;

impl LeastSquaresProblem for Rosenbrock {
    fn residual_count(&self) -> usize {
        2
    }

    fn residuals(&mut self, x: &DVector<f64>, residuals: &mut DVector<f64>) -> Result<(), Abort> {
        residuals[0] = 10. * (x[1] - x[0] * x[0]);
        residuals[1] = 1. - x[0];
        Ok(())
    }

    fn jacobian(&mut self, x: &DVector<f64>, jacobian: &mut Jacobian) -> Result<(), Abort> {
        jacobian.set(0, 0, -20. * x[0]);
        jacobian.set(0, 1, 10.);
        jacobian.set(1, 0, -1.);
        jacobian.set(1, 1, 0.);
        Ok(())
    }
}

/// Powell's singular function. The Jacobian is singular at the minimum `0`,
/// so convergence is only linear there. The standard starting point is
/// `(3, -1, 0, 1)`.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct PowellSingular;

impl LeastSquaresProblem for PowellSingular {
    fn residual_count(&self) -> usize {
        4
    }

    fn residuals(&mut self, x: &DVector<f64>, residuals: &mut DVector<f64>) -> Result<(), Abort> {
        residuals[0] = x[0] + 10. * x[1];
        residuals[1] = 5f64.sqrt() * (x[2] - x[3]);
        residuals[2] = (x[1] - 2. * x[2]).powi(2);
        residuals[3] = 10f64.sqrt() * (x[0] - x[3]).powi(2);
        Ok(())
    }

    fn jacobian(&mut self, x: &DVector<f64>, jacobian: &mut Jacobian) -> Result<(), Abort> {
        let mut j = jacobian.as_view_mut();
        j.fill(0.);
        j[(0, 0)] = 1.;
        j[(0, 1)] = 10.;
        j[(1, 2)] = 5f64.sqrt();
        j[(1, 3)] = -(5f64.sqrt());
        j[(2, 1)] = 2. * (x[1] - 2. * x[2]);
        j[(2, 2)] = -4. * (x[1] - 2. * x[2]);
        j[(3, 0)] = 2. * 10f64.sqrt() * (x[0] - x[3]);
        j[(3, 3)] = -2. * 10f64.sqrt() * (x[0] - x[3]);
        Ok(())
    }
}

/// fitting of a double exponential decay with constant offset
/// `f(x) = c1*exp(-x/tau1) + c2*exp(-x/tau2) + c3`
/// to data. The parameters have the layout `(tau1,tau2,c1,c2,c3)`.
#[derive(Clone, Debug, PartialEq)]
pub struct DoubleExponentialDecayWithOffset {
    x: DVector<f64>,
    y: DVector<f64>,
}

impl DoubleExponentialDecayWithOffset {
    /// create new fitting problem from the data. x and y must have the same length.
    pub fn new(x: DVector<f64>, y: DVector<f64>) -> Self {
        assert_eq!(x.len(), y.len(), "x and y must have same length");
        Self { x, y }
    }

    /// evaluate the model at the given parameters `(tau1,tau2,c1,c2,c3)`
    pub fn model(x: &DVector<f64>, params: &[f64; 5]) -> DVector<f64> {
        let [tau1, tau2, c1, c2, c3] = *params;
        exp_decay(x, tau1) * c1 + exp_decay(x, tau2) * c2 + DVector::from_element(x.len(), c3)
    }
}

impl LeastSquaresProblem for DoubleExponentialDecayWithOffset {
    fn residual_count(&self) -> usize {
        self.x.len()
    }

    fn residuals(&mut self, p: &DVector<f64>, residuals: &mut DVector<f64>) -> Result<(), Abort> {
        let f = Self::model(&self.x, &[p[0], p[1], p[2], p[3], p[4]]);
        residuals.copy_from(&(f - &self.y));
        Ok(())
    }

    fn jacobian(&mut self, p: &DVector<f64>, jacobian: &mut Jacobian) -> Result<(), Abort> {
        let (tau1, tau2, c1, c2) = (p[0], p[1], p[2], p[3]);
        jacobian
            .parameter_column_mut(0)
            .copy_from(&(exp_decay_dtau(&self.x, tau1) * c1));
        jacobian
            .parameter_column_mut(1)
            .copy_from(&(exp_decay_dtau(&self.x, tau2) * c2));
        jacobian
            .parameter_column_mut(2)
            .copy_from(&exp_decay(&self.x, tau1));
        jacobian
            .parameter_column_mut(3)
            .copy_from(&exp_decay(&self.x, tau2));
        jacobian.parameter_column_mut(4).fill(1.);
        Ok(())
    }
}

/// Three residuals in three parameters where the second parameter does not
/// enter any residual: `x_0 - 1`, `x_2 - 2`, `x_0 + x_2 - 3`.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct IgnoredParameter;

impl LeastSquaresProblem for IgnoredParameter {
    fn residual_count(&self) -> usize {
        3
    }

    fn residuals(&mut self, x: &DVector<f64>, residuals: &mut DVector<f64>) -> Result<(), Abort> {
        residuals[0] = x[0] - 1.;
        residuals[1] = x[2] - 2.;
        residuals[2] = x[0] + x[2] - 3.;
        Ok(())
    }

    fn jacobian(&mut self, _x: &DVector<f64>, jacobian: &mut Jacobian) -> Result<(), Abort> {
        let mut j = jacobian.as_view_mut();
        j.fill(0.);
        j[(0, 0)] = 1.;
        j[(1, 2)] = 1.;
        j[(2, 0)] = 1.;
        j[(2, 2)] = 1.;
        Ok(())
    }
}

/// Wraps a problem and counts the evaluations. Once the given number of
/// residual evaluations has been performed, every further evaluation
/// aborts with the given status.
#[derive(Clone, Debug, PartialEq)]
pub struct AbortAfter<P> {
    /// the wrapped problem
    pub inner: P,
    /// residual evaluations that are still allowed
    pub remaining: usize,
    /// the status of the abort
    pub status: i32,
    /// the number of calls to the residuals
    pub residual_calls: usize,
    /// the number of calls to the jacobian
    pub jacobian_calls: usize,
    /// the iterations with which `report` was called
    pub reported_iterations: Vec<usize>,
}

impl<P> AbortAfter<P> {
    /// wrap the problem
    pub fn new(inner: P, remaining: usize, status: i32) -> Self {
        Self {
            inner,
            remaining,
            status,
            residual_calls: 0,
            jacobian_calls: 0,
            reported_iterations: Vec::new(),
        }
    }

    /// wrap the problem without ever aborting
    pub fn never(inner: P) -> Self {
        Self::new(inner, usize::MAX, -1)
    }
}

impl<P: LeastSquaresProblem> LeastSquaresProblem for AbortAfter<P> {
    fn residual_count(&self) -> usize {
        self.inner.residual_count()
    }

    fn residuals(&mut self, x: &DVector<f64>, residuals: &mut DVector<f64>) -> Result<(), Abort> {
        self.residual_calls += 1;
        if self.remaining == 0 {
            return Err(Abort::with_status(self.status));
        }
        self.remaining -= 1;
        self.inner.residuals(x, residuals)
    }

    fn jacobian(&mut self, x: &DVector<f64>, jacobian: &mut Jacobian) -> Result<(), Abort> {
        self.jacobian_calls += 1;
        self.inner.jacobian(x, jacobian)
    }

    fn report(
        &mut self,
        iteration: usize,
        _x: &DVector<f64>,
        _residuals: &DVector<f64>,
    ) -> Result<(), Abort> {
        self.reported_iterations.push(iteration);
        Ok(())
    }
}
