/// The trust region Levenberg-Marquardt solver.
///
/// The entry points are [`levmar::LevMarSolver`] for full control over the
/// configuration and [`levmar::solve_default`] for the standard settings.
/// The building blocks of each iteration live in the submodules.
pub mod levmar;
