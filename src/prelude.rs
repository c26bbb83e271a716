pub use crate::jacobian::Jacobian;
pub use crate::problem::{Abort, LeastSquaresProblem};
pub use crate::solvers::levmar::{
    solve_default, LevMarError, LevMarSolver, MinimizationReport, Scaling, TerminationReason,
    TrustRegionTuning, Workspace,
};
