use approx::assert_relative_eq;
use levenberg_marquardt::LevenbergMarquardt;
use lmder::prelude::*;
use nalgebra::{dvector, DVector};
use shared_test_code::levmar_crate::LevmarCrateAdapter;
use shared_test_code::problems::DoubleExponentialDecayWithOffset;
use shared_test_code::{add_uniform_noise, linspace};

const TRUE_PARAMETERS: [f64; 5] = [1., 3., 4., 2.5, 1.];

fn noise_free_problem() -> DoubleExponentialDecayWithOffset {
    let x = linspace(0., 12.5, 128);
    let y = DoubleExponentialDecayWithOffset::model(&x, &TRUE_PARAMETERS);
    DoubleExponentialDecayWithOffset::new(x, y)
}

#[test]
// sanity check the analytical jacobian against a numerical derivative
fn jacobian_of_double_exponential_problem_is_correct() {
    let mut adapter =
        LevmarCrateAdapter::new(noise_free_problem(), dvector![0.5, 4.5, 8., 7.5, 3.]);
    let jacobian_numerical = levenberg_marquardt::differentiate_numerically(&mut adapter)
        .expect("numerical differentiation must succeed");
    let jacobian_trait = levenberg_marquardt::LeastSquaresProblem::jacobian(&adapter)
        .expect("jacobian must be available");
    assert_relative_eq!(jacobian_numerical, jacobian_trait, epsilon = 1e-5);
}

#[test]
fn double_exponential_fit_without_noise_finds_true_parameters() {
    let mut problem = noise_free_problem();
    let mut x = dvector![0.5, 4.5, 8., 7.5, 3.];
    let report = LevMarSolver::new()
        .minimize(&mut problem, &mut x)
        .expect("valid inputs must not give an error");
    assert!(
        report.termination.was_successful(),
        "unexpected termination {:?}",
        report.termination
    );
    assert_relative_eq!(
        x,
        DVector::from_row_slice(&TRUE_PARAMETERS),
        epsilon = 1e-6
    );
    assert!(report.objective_function < 1e-12);
}

#[test]
fn double_exponential_fit_with_noise_agrees_with_levenberg_marquardt_crate() {
    let x_data = linspace(0., 12.5, 256);
    let y = add_uniform_noise(
        &DoubleExponentialDecayWithOffset::model(&x_data, &TRUE_PARAMETERS),
        0.05,
        0xdeadbeef,
    );
    let initial_guess = dvector![0.5, 4.5, 8., 7.5, 3.];

    let mut problem = DoubleExponentialDecayWithOffset::new(x_data.clone(), y.clone());
    let mut x = initial_guess.clone();
    let report = LevMarSolver::new()
        .minimize(&mut problem, &mut x)
        .expect("valid inputs must not give an error");
    assert!(report.termination.was_successful());

    let (adapter, levmar_report) = LevenbergMarquardt::new().minimize(LevmarCrateAdapter::new(
        DoubleExponentialDecayWithOffset::new(x_data, y),
        initial_guess,
    ));
    assert!(levmar_report.termination.was_successful());
    let levmar_x = levenberg_marquardt::LeastSquaresProblem::params(&adapter);

    assert_relative_eq!(x, levmar_x, epsilon = 1e-5, max_relative = 1e-5);
    assert_relative_eq!(
        report.objective_function,
        levmar_report.objective_function,
        max_relative = 1e-6
    );
}

#[test]
fn solve_default_fits_double_exponential() {
    let mut problem = noise_free_problem();
    let mut x = dvector![0.5, 4.5, 8., 7.5, 3.];
    let mut workspace = Workspace::new(128, 5);
    let report = solve_default(&mut problem, &mut x, 1e-10, &mut workspace)
        .expect("valid inputs must not give an error");
    assert!(report.termination.was_successful());
    assert_relative_eq!(
        x,
        DVector::from_row_slice(&TRUE_PARAMETERS),
        epsilon = 1e-6
    );
}
