pub type CooMatrix = nalgebra_sparse::coo::CooMatrix<f64>;
pub type CsrMatrix = nalgebra_sparse::csr::CsrMatrix<f64>;
pub type DVector = nalgebra::DVector<f64>;

pub struct CgSolution {
    pub x: DVector,
    pub iterations: usize,
    pub converged: bool,
}

// Solves ax = b for a sparse symmetric positive definite a. Stops once the
// residual norm drops below 'tolerance' times the norm of b, or after
// 'max_iterations' steps with the last iterate.
pub fn conjugate_gradients_solve(
    a: &CsrMatrix,
    b: &DVector,
    x0: DVector,
    max_iterations: usize,
    tolerance: f64,
) -> CgSolution {
    assert!(
        a.nrows() == a.ncols()
            && a.nrows() == b.nrows()
            && a.nrows() == x0.nrows()
    );

    let threshold = tolerance * b.norm();
    let mut x = x0;
    let mut r = b - a * &x;
    let mut rsold = r.dot(&r);
    if rsold.sqrt() <= threshold {
        return CgSolution {
            x,
            iterations: 0,
            converged: true,
        };
    }

    let mut p = r.clone();
    for iteration in 0..max_iterations {
        let ap = a * &p;
        let pap = p.dot(&ap);
        if !(pap > 0.0 && pap.is_finite()) {
            return CgSolution {
                x,
                iterations: iteration,
                converged: false,
            };
        }
        let alpha = rsold / pap;
        x += &p * alpha;
        r -= &ap * alpha;
        let rsnew = r.dot(&r);
        if rsnew.sqrt() <= threshold {
            return CgSolution {
                x,
                iterations: iteration + 1,
                converged: true,
            };
        }
        p = &r + &p * (rsnew / rsold);
        rsold = rsnew;
    }

    CgSolution {
        x,
        iterations: max_iterations,
        converged: false,
    }
}
