use approx::assert_relative_eq;
use assert_matches::assert_matches;
use levenberg_marquardt::LevenbergMarquardt;
use lmder::prelude::*;
use lmder::solvers::levmar::DEFAULT_TOLERANCE;
use nalgebra::{dvector, DVector};
use shared_test_code::levmar_crate::LevmarCrateAdapter;
use shared_test_code::linspace;
use shared_test_code::problems::{
    AbortAfter, DoubleExponentialDecayWithOffset, IgnoredParameter, LineThroughOrigin,
    PowellSingular, Rosenbrock,
};

mod double_exponential;

#[test]
fn line_through_origin_is_fitted_with_default_settings() {
    let mut problem = LineThroughOrigin::new(dvector![1., 2., 3.], dvector![2., 4., 6.1]);
    let expected = problem.exact_solution();
    assert_relative_eq!(expected, 28.3 / 14.);
    let mut a = dvector![0.];
    let mut workspace = Workspace::new(3, 1);
    let report = solve_default(&mut problem, &mut a, DEFAULT_TOLERANCE, &mut workspace)
        .expect("valid inputs must not give an error");
    assert_matches!(report.info(), 1..=3);
    assert!((a[0] - expected).abs() < 1e-4);
}

#[test]
fn rosenbrock_solution_agrees_with_levenberg_marquardt_crate() {
    let initial_guess = dvector![-1.2, 1.];
    let mut x = initial_guess.clone();
    let report = LevMarSolver::new()
        .minimize(&mut Rosenbrock, &mut x)
        .expect("valid inputs must not give an error");
    assert!(report.termination.was_successful());

    let (adapter, levmar_report) =
        LevenbergMarquardt::new().minimize(LevmarCrateAdapter::new(Rosenbrock, initial_guess));
    assert!(levmar_report.termination.was_successful());
    let levmar_x = levenberg_marquardt::LeastSquaresProblem::params(&adapter);

    assert_relative_eq!(x, dvector![1., 1.], epsilon = 1e-6);
    assert_relative_eq!(x, levmar_x, epsilon = 1e-6);
}

#[test]
fn powell_singular_function_is_minimized_despite_the_singular_jacobian() {
    let mut x = dvector![3., -1., 0., 1.];
    let report = LevMarSolver::new()
        .minimize(&mut PowellSingular, &mut x)
        .expect("valid inputs must not give an error");
    assert!(
        report.termination.was_successful() || report.termination.is_precision_limited(),
        "unexpected termination {:?}",
        report.termination
    );
    assert!(report.residual_norm < 1e-4);
    assert!(x.norm() < 5e-2);
    assert!(x.iter().all(|v| v.is_finite()));
}

#[test]
fn parameter_without_influence_is_never_changed() {
    let mut x = dvector![10., -3., 7.];
    let report = LevMarSolver::new()
        .minimize(&mut IgnoredParameter, &mut x)
        .expect("valid inputs must not give an error");
    assert!(report.termination.was_successful());
    assert_eq!(x[1], -3.);
    assert_relative_eq!(x[0], 1., epsilon = 1e-8);
    assert_relative_eq!(x[2], 2., epsilon = 1e-8);
}

#[test]
fn too_few_residuals_are_rejected_without_evaluation() {
    let mut problem = AbortAfter::never(Rosenbrock);
    let mut x = dvector![1., 2., 3.];
    let error = LevMarSolver::new()
        .minimize(&mut problem, &mut x)
        .expect_err("more parameters than residuals must be rejected");
    assert_matches!(
        error,
        LevMarError::TooFewResiduals {
            residuals: 2,
            parameters: 3
        }
    );
    assert_eq!(error.code(), 0);
    assert_eq!(problem.residual_calls, 0);
    assert_eq!(problem.jacobian_calls, 0);
    assert_eq!(x, dvector![1., 2., 3.]);
}

#[test]
fn abort_status_is_propagated_verbatim() {
    let mut problem = AbortAfter::new(Rosenbrock, 4, -17);
    let mut x = dvector![-1.2, 1.];
    let report = LevMarSolver::new()
        .minimize(&mut problem, &mut x)
        .expect("valid inputs must not give an error");
    assert_eq!(report.termination, TerminationReason::UserAbort(-17));
    assert_eq!(report.info(), -17);
    assert_eq!(report.number_of_evaluations, 5);
    assert_eq!(problem.residual_calls, 5);
    assert_eq!(report.number_of_jacobian_evaluations, problem.jacobian_calls);
}

#[test]
fn evaluation_budget_is_respected() {
    for max_evaluations in [1, 3, 7] {
        let mut problem = AbortAfter::never(Rosenbrock);
        let mut x = dvector![-1.2, 1.];
        let report = LevMarSolver::new()
            .with_max_evaluations(max_evaluations)
            .minimize(&mut problem, &mut x)
            .expect("valid inputs must not give an error");
        assert_eq!(report.termination, TerminationReason::MaxEvaluationsReached);
        assert_eq!(report.number_of_evaluations, max_evaluations.max(2));
        assert_eq!(problem.residual_calls, report.number_of_evaluations);
    }
    let mut problem = AbortAfter::never(Rosenbrock);
    let mut x = dvector![-1.2, 1.];
    let report = LevMarSolver::new()
        .with_max_evaluations(1)
        .minimize(&mut problem, &mut x)
        .unwrap();
    assert_eq!(report.number_of_jacobian_evaluations, 1);
}

#[test]
fn reports_are_sent_every_few_iterations() {
    let mut problem = AbortAfter::never(Rosenbrock);
    let mut x = dvector![-1.2, 1.];
    LevMarSolver::new()
        .with_report_every(2)
        .minimize(&mut problem, &mut x)
        .unwrap();
    let (last, periodic) = problem
        .reported_iterations
        .split_last()
        .expect("at least the final report must be sent");
    assert!(!periodic.is_empty());
    assert!(periodic.iter().all(|it| (it - 1) % 2 == 0));
    assert!(periodic.iter().all(|it| it <= last));
}

#[test]
fn repeated_minimizations_are_bit_identical() {
    let x_data = linspace(0., 12.5, 64);
    let y = DoubleExponentialDecayWithOffset::model(&x_data, &[1., 3., 4., 2.5, 1.]);
    let solve = || {
        let mut problem = DoubleExponentialDecayWithOffset::new(x_data.clone(), y.clone());
        let mut x = dvector![0.5, 4.5, 8., 7.5, 3.];
        let report = LevMarSolver::new().minimize(&mut problem, &mut x).unwrap();
        (x, report)
    };
    let (x1, report1) = solve();
    let (x2, report2) = solve();
    assert_eq!(report1, report2);
    assert_eq!(
        x1.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
        x2.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
    );
}

#[test]
fn workspace_is_reused_across_problems_of_different_size() {
    let mut workspace = Workspace::new(2, 2);
    let mut x = dvector![-1.2, 1.];
    LevMarSolver::new()
        .minimize_with_workspace(&mut Rosenbrock, &mut x, &mut workspace)
        .unwrap();
    let mut x: DVector<f64> = dvector![3., -1., 0., 1.];
    let report = LevMarSolver::new()
        .minimize_with_workspace(&mut PowellSingular, &mut x, &mut workspace)
        .unwrap();
    assert!(report.residual_norm < 1e-4);
    assert_eq!(workspace.scaling().len(), 4);
}
