use ampsym_core::{AmpsymError, AmpsymResult, Value, PI};
use ndarray::{Array1, Array2};

/// A fixed rectangular mesh over the azimuthal angle $`\phi \in [0, 2\pi)`$ and
/// $`\cos\theta \in [-1, 1]`$.
///
/// The first axis runs over $`\phi`$ (right edge excluded), the second over $`\cos\theta`$ (both
/// edges included). The mesh never changes once built.
#[derive(Clone, Debug)]
pub struct GridSample {
    phi_axis: Array1<f64>,
    costheta_axis: Array1<f64>,
    phi: Array2<f64>,
    costheta: Array2<f64>,
    theta: Array2<f64>,
}

impl GridSample {
    /// The default number of $`\phi`$ bins.
    pub const DEFAULT_N_PHI: usize = 400;
    /// The default number of $`\cos\theta`$ bins.
    pub const DEFAULT_N_COSTHETA: usize = 200;

    /// Build a mesh with `n_phi` by `n_costheta` points.
    ///
    /// # Errors
    ///
    /// Returns [`AmpsymError::Custom`] if `n_phi` is zero or `n_costheta` is smaller than two.
    pub fn new(n_phi: usize, n_costheta: usize) -> AmpsymResult<Self> {
        if n_phi == 0 || n_costheta < 2 {
            return Err(AmpsymError::Custom(format!(
                "a grid needs at least 1 phi bin and 2 cos(theta) bins (got {n_phi} x {n_costheta})"
            )));
        }
        Ok(Self::build(n_phi, n_costheta))
    }

    fn build(n_phi: usize, n_costheta: usize) -> Self {
        let phi_axis = Array1::from_shape_fn(n_phi, |i| 2.0 * PI * i as f64 / n_phi as f64);
        let costheta_axis = Array1::linspace(-1.0, 1.0, n_costheta);
        let phi = Array2::from_shape_fn((n_phi, n_costheta), |(i, _)| phi_axis[i]);
        let costheta = Array2::from_shape_fn((n_phi, n_costheta), |(_, j)| costheta_axis[j]);
        let theta = costheta.mapv(f64::acos);
        Self {
            phi_axis,
            costheta_axis,
            phi,
            costheta,
            theta,
        }
    }

    /// The shape `(n_phi, n_costheta)` of every grid array.
    pub fn shape(&self) -> (usize, usize) {
        (self.phi_axis.len(), self.costheta_axis.len())
    }

    /// The number of mesh points.
    pub fn len(&self) -> usize {
        self.phi.len()
    }

    /// Whether the mesh is empty (it never is).
    pub fn is_empty(&self) -> bool {
        self.phi.is_empty()
    }

    /// The distinct $`\phi`$ values.
    pub fn phi_axis(&self) -> &Array1<f64> {
        &self.phi_axis
    }

    /// The distinct $`\cos\theta`$ values.
    pub fn costheta_axis(&self) -> &Array1<f64> {
        &self.costheta_axis
    }

    /// $`\phi`$ at every mesh point.
    pub fn phi(&self) -> &Array2<f64> {
        &self.phi
    }

    /// $`\cos\theta`$ at every mesh point.
    pub fn costheta(&self) -> &Array2<f64> {
        &self.costheta
    }

    /// $`\theta = \arccos(\cos\theta)`$ at every mesh point.
    pub fn theta(&self) -> &Array2<f64> {
        &self.theta
    }

    /// The mesh values for a coordinate argument, by name.
    pub fn coordinate(&self, name: &str) -> Option<Value> {
        match name {
            "theta" => Some(Value::from(self.theta.clone())),
            "phi" => Some(Value::from(self.phi.clone())),
            "costheta" => Some(Value::from(self.costheta.clone())),
            _ => None,
        }
    }
}

impl Default for GridSample {
    fn default() -> Self {
        Self::build(Self::DEFAULT_N_PHI, Self::DEFAULT_N_COSTHETA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_grid() {
        let grid = GridSample::default();
        assert_eq!(grid.shape(), (400, 200));
        assert_eq!(grid.len(), 80_000);
        assert_eq!(grid.theta().shape(), &[400, 200]);
    }

    #[test]
    fn test_axis_edges() {
        let grid = GridSample::new(4, 3).unwrap();
        assert_relative_eq!(grid.phi_axis()[0], 0.0);
        assert_relative_eq!(grid.phi_axis()[3], 1.5 * PI);
        assert_relative_eq!(grid.costheta_axis()[0], -1.0);
        assert_relative_eq!(grid.costheta_axis()[2], 1.0);
        assert_relative_eq!(grid.theta()[[1, 0]], PI);
        assert_relative_eq!(grid.theta()[[1, 2]], 0.0);
        assert_relative_eq!(grid.phi()[[2, 1]], PI);
    }

    #[test]
    fn test_degenerate_grid_fails() {
        assert!(GridSample::new(0, 10).is_err());
        assert!(GridSample::new(10, 1).is_err());
    }
}
