//! Regularised least squares
//!
//! The seasonal-trend model is fitted as a maximum a posteriori estimate
//! under independent Gaussian priors, which reduces to ridge regression
//! with one penalty per column.

use crate::{MathError, Result};
pub use nalgebra::{DMatrix, DVector};

/// Row-major observations by column-major features, as nalgebra stores them
pub type DesignMatrix = DMatrix<f64>;

/// Solve `(XᵀX + diag(penalties)) β = Xᵀy`.
///
/// Uses a Cholesky factorisation and falls back to LU when the system is
/// not numerically positive definite. Fails if the system is singular or
/// the solution contains non-finite values.
pub fn ridge_solve(
    design: &DesignMatrix,
    target: &DVector<f64>,
    penalties: &[f64],
) -> Result<DVector<f64>> {
    let (rows, cols) = design.shape();
    if rows != target.len() {
        return Err(MathError::InvalidInput(format!(
            "Design has {} rows but target has {} values",
            rows,
            target.len()
        )));
    }
    if cols != penalties.len() {
        return Err(MathError::InvalidInput(format!(
            "Design has {} columns but {} penalties were given",
            cols,
            penalties.len()
        )));
    }
    if cols == 0 {
        return Ok(DVector::zeros(0));
    }
    if penalties.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(MathError::InvalidInput(
            "Penalties must be finite and non-negative".to_string(),
        ));
    }

    let mut normal = design.tr_mul(design);
    for (j, penalty) in penalties.iter().enumerate() {
        normal[(j, j)] += penalty;
    }
    let rhs = design.tr_mul(target);

    let solution = match normal.clone().cholesky() {
        Some(chol) => chol.solve(&rhs),
        None => normal.lu().solve(&rhs).ok_or_else(|| {
            MathError::CalculationError("Normal equations are singular".to_string())
        })?,
    };

    if solution.iter().any(|v| !v.is_finite()) {
        return Err(MathError::CalculationError(
            "Least-squares solution is not finite".to_string(),
        ));
    }

    Ok(solution)
}

/// Concatenate blocks side by side; every block must have `rows` rows.
pub fn hstack(blocks: &[&DesignMatrix], rows: usize) -> Result<DesignMatrix> {
    if let Some(block) = blocks.iter().find(|b| b.nrows() != rows) {
        return Err(MathError::InvalidInput(format!(
            "Cannot stack a block of {} rows onto {} rows",
            block.nrows(),
            rows
        )));
    }
    let cols = blocks.iter().map(|b| b.ncols()).sum();
    let mut stacked = DesignMatrix::zeros(rows, cols);
    let mut offset = 0;
    for block in blocks {
        stacked.columns_mut(offset, block.ncols()).copy_from(*block);
        offset += block.ncols();
    }
    Ok(stacked)
}

/// Multiply row `i` of `design` by `weights[i]`.
pub fn scale_rows(design: &DesignMatrix, weights: &[f64]) -> DesignMatrix {
    DesignMatrix::from_fn(design.nrows(), design.ncols(), |i, j| design[(i, j)] * weights[i])
}

/// Residual sum of squares of `target - design * coefficients`.
pub fn residual_sum_of_squares(
    design: &DesignMatrix,
    target: &DVector<f64>,
    coefficients: &DVector<f64>,
) -> f64 {
    let fitted = design * coefficients;
    (target - fitted).norm_squared()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn recovers_exact_line_without_penalty() {
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let design = DMatrix::from_fn(xs.len(), 2, |i, j| if j == 0 { 1.0 } else { xs[i] });
        let target = DVector::from_iterator(xs.len(), xs.iter().map(|x| 3.0 + 2.0 * x));

        let beta = ridge_solve(&design, &target, &[0.0, 0.0]).unwrap();
        assert_relative_eq!(beta[0], 3.0, epsilon = 1e-9);
        assert_relative_eq!(beta[1], 2.0, epsilon = 1e-9);
        assert_relative_eq!(
            residual_sum_of_squares(&design, &target, &beta),
            0.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn penalty_shrinks_towards_zero() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let design = DMatrix::from_fn(xs.len(), 1, |i, _| xs[i]);
        let target = DVector::from_iterator(xs.len(), xs.iter().map(|x| 5.0 * x));

        let loose = ridge_solve(&design, &target, &[0.0]).unwrap();
        let tight = ridge_solve(&design, &target, &[100.0]).unwrap();
        assert!(tight[0].abs() < loose[0].abs());
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let design = DMatrix::zeros(3, 2);
        let target = DVector::zeros(4);
        assert!(ridge_solve(&design, &target, &[0.0, 0.0]).is_err());

        let target = DVector::zeros(3);
        assert!(ridge_solve(&design, &target, &[0.0]).is_err());
    }

    #[test]
    fn hstack_places_blocks_in_order() {
        let left = DMatrix::from_element(2, 1, 1.0);
        let right = DMatrix::from_row_slice(2, 2, &[2.0, 3.0, 4.0, 5.0]);
        let empty = DMatrix::zeros(2, 0);

        let stacked = hstack(&[&left, &empty, &right], 2).unwrap();
        assert_eq!(stacked.shape(), (2, 3));
        assert_eq!(stacked[(1, 0)], 1.0);
        assert_eq!(stacked[(0, 2)], 3.0);
        assert_eq!(stacked[(1, 1)], 4.0);

        assert!(hstack(&[&left], 3).is_err());
    }

    #[test]
    fn scale_rows_weights_each_observation() {
        let design = DMatrix::from_element(2, 2, 1.0);
        let scaled = scale_rows(&design, &[2.0, -1.0]);
        assert_eq!(scaled[(0, 1)], 2.0);
        assert_eq!(scaled[(1, 0)], -1.0);
    }

    #[test]
    fn singular_system_without_penalty_fails() {
        let design = DMatrix::zeros(3, 2);
        let target = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        assert!(ridge_solve(&design, &target, &[0.0, 0.0]).is_err());
    }
}
