
use nalgebra::DVector;
use num_traits::Float;

/// Calculate the Euclidean norm `$\Vert \vec{x} \Vert_2$` of a vector without
/// destructive overflow or underflow.
///
/// The components are sorted into three bands by magnitude: the ones whose
/// square would underflow, the ones whose square is representable, and the
/// ones whose square (summed over all components) could overflow. Every band
/// keeps its own partial sum of squares relative to the largest component seen
/// in that band so far, and the three sums are combined on the scale of the
/// largest band at the end. The band limits are derived from the representable
/// range of `T`.
///
/// Returns exactly zero for an empty or all-zero vector. The result does not
/// depend on the order of the components, up to rounding.
pub fn euclidean_norm<T: Float>(x: &[T]) -> T {
    euclidean_norm_of(x.iter().copied())
}

/// The scaled norm `$\Vert D \vec{x}\Vert_2$`, where `$D = \text{diag}(\vec{d})$`.
/// This is what the trust region radius is measured against.
///
/// # Panics
/// if the scaling and the vector have different lengths
pub fn scaled_norm(diag: &DVector<f64>, x: &DVector<f64>) -> f64 {
    assert_eq!(
        diag.len(),
        x.len(),
        "Scaling vector and vector must have the same length"
    );
    euclidean_norm_of(diag.iter().zip(x.iter()).map(|(d, x)| d * x))
}

/// Same as [euclidean_norm], but for the elements of an iterator, so that
/// norms of intermediate expressions need no temporary storage.
pub fn euclidean_norm_of<T, I>(elements: I) -> T
where
    T: Float,
    I: IntoIterator<Item = T>,
    I::IntoIter: ExactSizeIterator,
{
    let elements = elements.into_iter();
    let count = elements.len();
    if count == 0 {
        return T::zero();
    }
    let zero = T::zero();
    let one = T::one();

    let rdwarf = T::min_positive_value().sqrt();
    let rgiant = T::max_value().sqrt();
    let agiant = rgiant / T::from(count).unwrap_or(one);

    // partial sums for the giant, intermediate and dwarf components
    let mut s1 = zero;
    let mut s2 = zero;
    let mut s3 = zero;
    let mut x1max = zero;
    let mut x3max = zero;

    for xabs in elements.map(Float::abs) {
        if xabs > rdwarf && xabs < agiant {
            s2 = s2 + xabs * xabs;
        } else if xabs <= rdwarf {
            if xabs > x3max {
                let ratio = x3max / xabs;
                s3 = one + s3 * ratio * ratio;
                x3max = xabs;
            } else if xabs != zero {
                let ratio = xabs / x3max;
                s3 = s3 + ratio * ratio;
            }
        } else if xabs > x1max {
            let ratio = x1max / xabs;
            s1 = one + s1 * ratio * ratio;
            x1max = xabs;
        } else {
            let ratio = xabs / x1max;
            s1 = s1 + ratio * ratio;
        }
    }

    if s1 != zero {
        x1max * (s1 + (s2 / x1max) / x1max).sqrt()
    } else if s2 != zero {
        if s2 >= x3max {
            (s2 * (one + (x3max / s2) * (x3max * s3))).sqrt()
        } else {
            (x3max * ((s2 / x3max) + (x3max * s3))).sqrt()
        }
    } else {
        x3max * s3.sqrt()
    }
}
