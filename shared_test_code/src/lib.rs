#![warn(missing_docs)]
//! a helper crate which carries common code used by the benchtests and the
//! integration tests.
use nalgebra::{DVector, Scalar};
use num_traits::Float;
use rand::{Rng, SeedableRng};

/// least squares problems with known solutions
pub mod problems;

/// an adapter that lets the problems be solved with the levenberg_marquardt crate
pub mod levmar_crate;

/// create holding `count` the elements from range [first,last] with linear spacing. (equivalent to matlabs linspace)
pub fn linspace<ScalarType: Float + Scalar>(
    first: ScalarType,
    last: ScalarType,
    count: usize,
) -> DVector<ScalarType> {
    let n_minus_one = ScalarType::from(count - 1).expect("Could not convert usize to Float");
    let lin: Vec<ScalarType> = (0..count)
        .map(|n| {
            first
                + (last - first) / (n_minus_one)
                    * ScalarType::from(n).expect("Could not convert usize to Float")
        })
        .collect();
    DVector::from(lin)
}

/// exponential decay f(t,tau) = exp(-t/tau)
pub fn exp_decay<ScalarType: Float + Scalar>(
    tvec: &DVector<ScalarType>,
    tau: ScalarType,
) -> DVector<ScalarType> {
    tvec.map(|t| (-t / tau).exp())
}

/// derivative of exp decay with respect to tau
pub fn exp_decay_dtau<ScalarType: Scalar + Float>(
    tvec: &DVector<ScalarType>,
    tau: ScalarType,
) -> DVector<ScalarType> {
    tvec.map(|t| (-t / tau).exp() * t / (tau * tau))
}

/// add uniformly distributed noise in `[-amplitude, amplitude)` to the data,
/// reproducibly for a given seed
pub fn add_uniform_noise(y: &DVector<f64>, amplitude: f64, seed: u64) -> DVector<f64> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    y.map(|y| y + rng.gen_range(-amplitude..amplitude))
}
