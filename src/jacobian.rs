use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorViewMut};

/// The Jacobian `$J \in \mathbb{R}^{m\times n}$` of the residual vector with
/// respect to the parameters.
///
/// # Layout
///
/// Entry `(i, j)` is `$\partial f_i / \partial x_j$`, i.e. **row `i` belongs to
/// residual `i` and column `j` belongs to parameter `j`**. The matrix is stored
/// column major, so all derivatives with respect to one parameter are contiguous
/// in memory. Every kernel in this crate uses exactly this convention and all
/// element access goes through the bounds checked indexing of nalgebra.
#[derive(Debug, Clone, PartialEq)]
pub struct Jacobian {
    matrix: DMatrix<f64>,
}

impl Jacobian {
    /// A Jacobian of the given dimensions with all entries set to zero.
    pub fn zeros(residual_count: usize, parameter_count: usize) -> Self {
        Self {
            matrix: DMatrix::zeros(residual_count, parameter_count),
        }
    }

    /// number of residuals `$m$`, which is the number of rows
    pub fn residual_count(&self) -> usize {
        self.matrix.nrows()
    }

    /// number of parameters `$n$`, which is the number of columns
    pub fn parameter_count(&self) -> usize {
        self.matrix.ncols()
    }

    /// The derivative of residual `residual` with respect to parameter `parameter`.
    /// # Panics
    /// if either index is out of bounds
    pub fn get(&self, residual: usize, parameter: usize) -> f64 {
        self.matrix[(residual, parameter)]
    }

    /// Set the derivative of residual `residual` with respect to parameter `parameter`.
    /// # Panics
    /// if either index is out of bounds
    pub fn set(&mut self, residual: usize, parameter: usize, value: f64) {
        self.matrix[(residual, parameter)] = value;
    }

    /// Mutable access to the derivatives of all residuals with respect to
    /// one parameter.
    /// # Panics
    /// if the parameter index is out of bounds
    pub fn parameter_column_mut(&mut self, parameter: usize) -> DVectorViewMut<'_, f64> {
        self.matrix.column_mut(parameter)
    }

    /// Mutable view of the whole matrix. The view cannot change the dimensions
    /// of the Jacobian.
    pub fn as_view_mut(&mut self) -> DMatrixViewMut<'_, f64> {
        let (nrows, ncols) = self.matrix.shape();
        self.matrix.view_mut((0, 0), (nrows, ncols))
    }

    /// the underlying matrix
    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Overwrite the Jacobian with the given matrix.
    /// # Panics
    /// if the dimensions do not match
    pub fn copy_from(&mut self, matrix: &DMatrix<f64>) {
        assert_eq!(
            self.matrix.shape(),
            matrix.shape(),
            "Jacobian dimensions must not change"
        );
        self.matrix.copy_from(matrix);
    }

    pub(crate) fn into_matrix(self) -> DMatrix<f64> {
        self.matrix
    }
}

impl From<DMatrix<f64>> for Jacobian {
    fn from(matrix: DMatrix<f64>) -> Self {
        Self { matrix }
    }
}

/// The pivoted QR factorization `$J P = Q R$` of a Jacobian, packed into the
/// storage that used to hold the Jacobian itself.
///
/// This is produced by [qr_factorize](crate::qr::qr_factorize), which consumes
/// the [Jacobian]. The upper triangle (including the diagonal) of the packed
/// matrix holds `$R$`, the strictly lower part holds the trailing components
/// of the Householder vectors. The leading component of each Householder
/// vector is kept separately.
#[derive(Debug, Clone, PartialEq)]
pub struct FactoredJacobian {
    pub(crate) packed: DMatrix<f64>,
    /// leading component of the j-th Householder vector, zero if column j
    /// needed no reflection
    pub(crate) householder_diag: DVector<f64>,
    pub(crate) rdiag: DVector<f64>,
    pub(crate) acnorm: DVector<f64>,
    pub(crate) ipvt: Vec<usize>,
}

impl FactoredJacobian {
    /// number of rows of the factored matrix
    pub fn residual_count(&self) -> usize {
        self.packed.nrows()
    }

    /// number of columns of the factored matrix
    pub fn parameter_count(&self) -> usize {
        self.packed.ncols()
    }

    /// The signed diagonal elements of `$R$`.
    pub fn rdiag(&self) -> &DVector<f64> {
        &self.rdiag
    }

    /// The Euclidean norms of the columns of the original Jacobian, in the
    /// original (unpivoted) column order.
    pub fn column_norms(&self) -> &DVector<f64> {
        &self.acnorm
    }

    /// The column permutation: column `j` of `$J P$` is column `permutation()[j]`
    /// of the original Jacobian. This is the identity without pivoting.
    pub fn permutation(&self) -> &[usize] {
        &self.ipvt
    }

    /// A copy of the upper triangular (or trapezoidal if `$m<n$`) factor `$R$`
    /// of dimension `$\min(m,n) \times n$`.
    pub fn r(&self) -> DMatrix<f64> {
        let (m, n) = self.packed.shape();
        DMatrix::from_fn(m.min(n), n, |i, j| {
            if i <= j {
                self.packed[(i, j)]
            } else {
                0.
            }
        })
    }

    /// Calculate `$Q^T \vec{b}$` in place by applying the stored Householder
    /// reflections to `rhs`.
    /// # Panics
    /// if `rhs` does not have as many elements as the matrix has rows
    pub fn q_tr_mul(&self, rhs: &mut DVector<f64>) {
        let m = self.packed.nrows();
        assert_eq!(
            rhs.len(),
            m,
            "Vector length must match the number of rows of the factored matrix"
        );
        for (j, &vj) in self.householder_diag.iter().enumerate() {
            if vj == 0. {
                continue;
            }
            let sum = vj * rhs[j]
                + ((j + 1)..m)
                    .map(|i| self.packed[(i, j)] * rhs[i])
                    .sum::<f64>();
            let temp = -sum / vj;
            rhs[j] += temp * vj;
            for i in (j + 1)..m {
                rhs[i] += temp * self.packed[(i, j)];
            }
        }
    }

    /// Give up the Householder vectors and keep only the square factor `$R$`
    /// together with the permutation. The storage is reused.
    ///
    /// # Panics
    /// if the matrix has fewer rows than columns
    pub fn into_triangular(self) -> TriangularFactor {
        assert!(
            self.packed.nrows() >= self.packed.ncols(),
            "Triangular factor requires at least as many rows as columns"
        );
        TriangularFactor {
            packed: self.packed,
            ipvt: self.ipvt,
        }
    }
}

/// The square upper triangular factor `$R \in \mathbb{R}^{n\times n}$` of a
/// pivoted QR factorization, together with the permutation `$P$`.
///
/// Only the upper triangle including the diagonal holds `$R$`. The
/// strictly lower triangle is scratch space for the
/// [damped least squares solver](crate::solvers::levmar::qrsolv::solve_damped),
/// which leaves the transposed strict upper part of its own triangular
/// factor `$S$` there.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangularFactor {
    /// the first n rows of this matrix are used
    packed: DMatrix<f64>,
    ipvt: Vec<usize>,
}

impl TriangularFactor {
    /// Create the factor from an upper triangular matrix `r` and the column
    /// permutation that goes with it. Everything below the diagonal of `r` is
    /// ignored.
    ///
    /// # Panics
    /// if `r` is not square or the permutation is not a permutation of `0..n`
    pub fn new(r: DMatrix<f64>, permutation: Vec<usize>) -> Self {
        assert!(r.is_square(), "Triangular factor must be square");
        let n = r.ncols();
        assert_eq!(permutation.len(), n, "Permutation has wrong length");
        let mut seen = vec![false; n];
        for &p in &permutation {
            assert!(p < n && !seen[p], "Not a valid permutation");
            seen[p] = true;
        }
        Self {
            packed: r,
            ipvt: permutation,
        }
    }

    /// the dimension `$n$`
    pub fn dim(&self) -> usize {
        self.packed.ncols()
    }

    /// the column permutation, see [FactoredJacobian::permutation]
    pub fn permutation(&self) -> &[usize] {
        &self.ipvt
    }

    /// Element `(row, col)` of the `$n\times n$` working matrix. For `row <= col`
    /// this is an element of `$R$`.
    /// # Panics
    /// if an index is out of bounds
    #[inline]
    pub fn entry(&self, row: usize, col: usize) -> f64 {
        assert!(row < self.dim(), "Row index out of bounds");
        self.packed[(row, col)]
    }

    #[inline]
    pub(crate) fn set_entry(&mut self, row: usize, col: usize, value: f64) {
        assert!(row < self.dim(), "Row index out of bounds");
        self.packed[(row, col)] = value;
    }

    /// A copy of the upper triangular factor `$R$`.
    pub fn r(&self) -> DMatrix<f64> {
        let n = self.dim();
        DMatrix::from_fn(n, n, |i, j| if i <= j { self.packed[(i, j)] } else { 0. })
    }

    /// Calculate `$R P^T \vec{v}$`, which is `$Q^T J \vec{v}$`, into `out`.
    /// # Panics
    /// if the vectors do not have length `$n$`
    pub fn r_mul_permuted(&self, v: &DVector<f64>, out: &mut DVector<f64>) {
        let n = self.dim();
        assert_eq!(v.len(), n, "Vector has wrong length");
        assert_eq!(out.len(), n, "Output vector has wrong length");
        out.fill(0.);
        for (j, &l) in self.ipvt.iter().enumerate() {
            let temp = v[l];
            for i in 0..=j {
                out[i] += self.packed[(i, j)] * temp;
            }
        }
    }

    /// Hand the storage back for the next Jacobian evaluation. All entries
    /// are reset to zero, so no part of the factorization survives.
    pub fn into_jacobian(mut self) -> Jacobian {
        self.packed.fill(0.);
        Jacobian::from(self.packed)
    }
}
