//! Coordinate charts.
//!
//! A [`Chart`] is the explicit symbol table for one coordinate system: the
//! ordered coordinate symbols, the affine parameter, and one minted velocity
//! symbol `u_<coord>` per coordinate. Every stage of the pipeline receives
//! the chart as data; nothing registers symbols globally.

use crate::expr::{Expr, Symbol};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    label: String,
    coords: Vec<Symbol>,
    velocities: Vec<Symbol>,
    affine: Symbol,
}

impl Chart {
    /// Builds a chart from coordinate names. Velocity symbols are derived as
    /// `u_<name>`; the affine parameter is `s`.
    pub fn new(label: impl Into<String>, coord_names: &[&str]) -> Self {
        let coords: Vec<Symbol> = coord_names.iter().copied().map(Symbol::new).collect();
        let velocities = coords
            .iter()
            .map(|c| Symbol::new(format!("u_{}", c.as_str())))
            .collect();
        Self {
            label: label.into(),
            coords,
            velocities,
            affine: Symbol::new("s"),
        }
    }

    /// The (t, x, y, z) chart of flat spacetime.
    pub fn cartesian() -> Self {
        Self::new("cartesian", &["t", "x", "y", "z"])
    }

    /// The (t, r, theta, phi) chart used by all shipped metrics.
    pub fn spherical() -> Self {
        Self::new("spherical", &["t", "r", "theta", "phi"])
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of coordinates; the integrated state has twice this length.
    pub fn dim(&self) -> usize {
        self.coords.len()
    }

    pub fn coords(&self) -> &[Symbol] {
        &self.coords
    }

    pub fn velocities(&self) -> &[Symbol] {
        &self.velocities
    }

    pub fn affine(&self) -> &Symbol {
        &self.affine
    }

    pub fn coord(&self, i: usize) -> &Symbol {
        &self.coords[i]
    }

    pub fn velocity(&self, i: usize) -> &Symbol {
        &self.velocities[i]
    }

    /// Index of a coordinate by name.
    pub fn coord_index(&self, name: &str) -> Option<usize> {
        self.coords.iter().position(|c| c.as_str() == name)
    }

    /// The full state symbol list, coordinates then velocities, matching the
    /// `[x_0 .. x_{n-1}, u_0 .. u_{n-1}]` state-vector layout.
    pub fn state_symbols(&self) -> Vec<Symbol> {
        let mut out = self.coords.clone();
        out.extend(self.velocities.iter().cloned());
        out
    }

    /// Default coordinate-speed expression for this chart, if it has one.
    /// For the spherical chart this is the polar speed
    /// sqrt(u_r^2 + r^2 u_phi^2); for the cartesian chart the spatial speed
    /// sqrt(u_x^2 + u_y^2 + u_z^2).
    pub fn default_speed_expr(&self) -> Option<Expr> {
        if self.coords.len() != 4 {
            return None;
        }
        match self.label.as_str() {
            "spherical" => {
                let r = Expr::from(&self.coords[1]);
                let u_r = Expr::from(&self.velocities[1]);
                let u_phi = Expr::from(&self.velocities[3]);
                Some((u_r.clone() * u_r + r.clone() * r * u_phi.clone() * u_phi).sqrt())
            }
            "cartesian" => {
                let u_x = Expr::from(&self.velocities[1]);
                let u_y = Expr::from(&self.velocities[2]);
                let u_z = Expr::from(&self.velocities[3]);
                Some(
                    (u_x.clone() * u_x + u_y.clone() * u_y + u_z.clone() * u_z).sqrt(),
                )
            }
            _ => None,
        }
    }
}

/// Converts spherical (t, r, theta, phi) position samples to cartesian
/// (x, y, z) sample series.
pub fn spherical_to_cartesian(
    r: &[f64],
    theta: &[f64],
    phi: &[f64],
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let n = r.len().min(theta.len()).min(phi.len());
    let mut x = Vec::with_capacity(n);
    let mut y = Vec::with_capacity(n);
    let mut z = Vec::with_capacity(n);
    for i in 0..n {
        let (st, ct) = theta[i].sin_cos();
        let (sp, cp) = phi[i].sin_cos();
        x.push(r[i] * st * cp);
        y.push(r[i] * st * sp);
        z.push(r[i] * ct);
    }
    (x, y, z)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spherical_chart_symbols() {
        let chart = Chart::spherical();
        assert_eq!(chart.dim(), 4);
        assert_eq!(chart.coord(1).as_str(), "r");
        assert_eq!(chart.velocity(3).as_str(), "u_phi");
        assert_eq!(chart.affine().as_str(), "s");
        assert_eq!(chart.coord_index("theta"), Some(2));
        assert_eq!(chart.coord_index("w"), None);

        let state = chart.state_symbols();
        assert_eq!(state.len(), 8);
        assert_eq!(state[0].as_str(), "t");
        assert_eq!(state[4].as_str(), "u_t");
    }

    #[test]
    fn cartesian_conversion_equator_and_pole() {
        let (x, y, z) = spherical_to_cartesian(
            &[2.0, 3.0],
            &[std::f64::consts::FRAC_PI_2, 0.0],
            &[0.0, 1.234],
        );
        assert!((x[0] - 2.0).abs() < 1e-15);
        assert!(y[0].abs() < 1e-15);
        assert!(z[0].abs() < 1e-15);
        // At the pole the azimuth does not matter.
        assert!(x[1].abs() < 1e-15);
        assert!(y[1].abs() < 1e-15);
        assert!((z[1] - 3.0).abs() < 1e-15);
    }
}
