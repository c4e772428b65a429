//! Trajectory container.
//!
//! [`Body`] stores an integrated trajectory as one ordered sample sequence
//! per coordinate plus the affine-parameter sequence, all of equal length,
//! together with the run's outcome and work counters. Derived quantities
//! are evaluated on demand against the stored samples; the coordinate speed
//! is computed at most once and cached.

use crate::chart::{spherical_to_cartesian, Chart};
use crate::driver::{Solution, Status};
use crate::error::GeodesicError;
use crate::expr::Expr;
use crate::lower::{ParamValues, StateLayout};
use crate::solvers::Stats;
use std::cell::OnceCell;

#[derive(Debug, Clone)]
pub struct Body {
    chart: Chart,
    params: ParamValues,
    s: Vec<f64>,
    coords: Vec<Vec<f64>>,
    velocities: Vec<Vec<f64>>,
    status: Status,
    stats: Stats,
    speed: OnceCell<Vec<f64>>,
}

impl Body {
    /// Transposes a raw solution into per-coordinate sample sequences.
    pub fn from_solution(
        chart: Chart,
        params: ParamValues,
        solution: Solution,
    ) -> Result<Self, GeodesicError> {
        let n = chart.dim();
        let samples = solution.states.len();
        if solution.s.len() != samples {
            return Err(GeodesicError::ShapeMismatch {
                what: "affine samples".to_string(),
                expected: samples,
                found: solution.s.len(),
            });
        }
        for state in &solution.states {
            if state.len() != 2 * n {
                return Err(GeodesicError::ShapeMismatch {
                    what: "trajectory state".to_string(),
                    expected: 2 * n,
                    found: state.len(),
                });
            }
        }
        let mut coords: Vec<Vec<f64>> = (0..n).map(|_| Vec::with_capacity(samples)).collect();
        let mut velocities: Vec<Vec<f64>> = (0..n).map(|_| Vec::with_capacity(samples)).collect();
        for state in &solution.states {
            for k in 0..n {
                coords[k].push(state[k]);
                velocities[k].push(state[n + k]);
            }
        }
        Ok(Self {
            chart,
            params,
            s: solution.s,
            coords,
            velocities,
            status: solution.status,
            stats: solution.stats,
            speed: OnceCell::new(),
        })
    }

    pub fn chart(&self) -> &Chart {
        &self.chart
    }

    pub fn params(&self) -> &ParamValues {
        &self.params
    }

    /// The affine-parameter sequence.
    pub fn affine(&self) -> &[f64] {
        &self.s
    }

    /// Samples of coordinate `k`, in chart order.
    pub fn coord(&self, k: usize) -> &[f64] {
        &self.coords[k]
    }

    /// Samples of the velocity conjugate to coordinate `k`.
    pub fn velocity(&self, k: usize) -> &[f64] {
        &self.velocities[k]
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.s.is_empty()
    }

    /// Evaluates a scalar expression over the state symbols, the affine
    /// parameter, and the bound metric parameters at every stored sample.
    pub fn evaluate(&self, expr: &Expr) -> Result<Vec<f64>, GeodesicError> {
        let layout = StateLayout::for_chart(&self.chart, &self.params);
        let scalar = layout.compile(expr)?;
        let n = self.chart.dim();
        let mut buf = vec![0.0; 2 * n];
        let mut out = Vec::with_capacity(self.s.len());
        for k in 0..self.s.len() {
            for j in 0..n {
                buf[j] = self.coords[j][k];
                buf[n + j] = self.velocities[j][k];
            }
            let v = scalar.eval(self.s[k], &buf);
            if !v.is_finite() {
                return Err(GeodesicError::NumericEvaluation {
                    s: self.s[k],
                    component: k,
                });
            }
            out.push(v);
        }
        Ok(out)
    }

    /// The coordinate-speed sequence, computed at most once.
    ///
    /// Uses `expr` on the first call when given, the chart's default speed
    /// expression otherwise; later calls return the cached sequence.
    pub fn coordinate_speed(&self, expr: Option<&Expr>) -> Result<&[f64], GeodesicError> {
        if let Some(cached) = self.speed.get() {
            return Ok(cached);
        }
        let owned;
        let expr = match expr {
            Some(e) => e,
            None => {
                owned = self.chart.default_speed_expr().ok_or_else(|| {
                    GeodesicError::InvalidConfig {
                        reason: format!(
                            "chart '{}' has no default speed expression",
                            self.chart.label()
                        ),
                    }
                })?;
                &owned
            }
        };
        let values = self.evaluate(expr)?;
        Ok(self.speed.get_or_init(|| values))
    }

    /// Spatial samples as (x, y, z) series, converting from the spherical
    /// chart when needed.
    pub fn cartesian_positions(&self) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>), GeodesicError> {
        if self.chart.dim() != 4 {
            return Err(GeodesicError::InvalidConfig {
                reason: format!("chart '{}' has no cartesian projection", self.chart.label()),
            });
        }
        match self.chart.label() {
            "cartesian" => Ok((
                self.coords[1].clone(),
                self.coords[2].clone(),
                self.coords[3].clone(),
            )),
            "spherical" => Ok(spherical_to_cartesian(
                &self.coords[1],
                &self.coords[2],
                &self.coords[3],
            )),
            other => Err(GeodesicError::InvalidConfig {
                reason: format!("chart '{}' has no cartesian projection", other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse;
    use std::f64::consts::FRAC_PI_2;

    fn sample_solution() -> Solution {
        Solution {
            s: vec![0.0, 1.0],
            states: vec![
                vec![0.0, 1.0, FRAC_PI_2, 0.0, 1.0, 0.1, 0.0, 0.5],
                vec![1.0, 2.0, FRAC_PI_2, 0.2, 1.0, 0.3, 0.0, 0.4],
            ],
            status: Status::Completed,
            stats: Stats::default(),
        }
    }

    #[test]
    fn transposes_states_into_coordinate_series() {
        let body =
            Body::from_solution(Chart::spherical(), ParamValues::new(), sample_solution()).unwrap();
        assert_eq!(body.len(), 2);
        assert_eq!(body.coord(1), &[1.0, 2.0]);
        assert_eq!(body.velocity(3), &[0.5, 0.4]);
        assert_eq!(body.affine(), &[0.0, 1.0]);
        assert_eq!(*body.status(), Status::Completed);
    }

    #[test]
    fn rejects_mismatched_state_width() {
        let mut sol = sample_solution();
        sol.states[1].pop();
        match Body::from_solution(Chart::spherical(), ParamValues::new(), sol) {
            Err(GeodesicError::ShapeMismatch {
                expected, found, ..
            }) => {
                assert_eq!(expected, 8);
                assert_eq!(found, 7);
            }
            other => panic!("expected shape mismatch, got {:?}", other),
        }
    }

    #[test]
    fn evaluates_derived_quantities_per_sample() {
        let body = Body::from_solution(
            Chart::spherical(),
            ParamValues::new().with("rs", 2.0),
            sample_solution(),
        )
        .unwrap();
        let vals = body.evaluate(&parse("r * u_phi + rs").unwrap()).unwrap();
        assert!((vals[0] - (1.0 * 0.5 + 2.0)).abs() < 1e-14);
        assert!((vals[1] - (2.0 * 0.4 + 2.0)).abs() < 1e-14);
    }

    #[test]
    fn unknown_symbol_in_derived_quantity_is_rejected() {
        let body =
            Body::from_solution(Chart::spherical(), ParamValues::new(), sample_solution()).unwrap();
        match body.evaluate(&parse("zeta").unwrap()) {
            Err(GeodesicError::UnboundSymbol { symbol }) => assert_eq!(symbol, "zeta"),
            other => panic!("expected unbound symbol, got {:?}", other),
        }
    }

    #[test]
    fn coordinate_speed_uses_chart_default_and_caches() {
        let body =
            Body::from_solution(Chart::spherical(), ParamValues::new(), sample_solution()).unwrap();
        let first = body.coordinate_speed(None).unwrap().to_vec();
        let expected0 = (0.1_f64 * 0.1 + 1.0 * 0.5 * 0.5).sqrt();
        let expected1 = (0.3_f64 * 0.3 + 4.0 * 0.4 * 0.4).sqrt();
        assert!((first[0] - expected0).abs() < 1e-14);
        assert!((first[1] - expected1).abs() < 1e-14);
        // Cached after the first computation: a later call with a different
        // expression still hands back the same sequence.
        let again = body.coordinate_speed(Some(&parse("42").unwrap())).unwrap();
        assert_eq!(again, first.as_slice());
    }

    #[test]
    fn cartesian_projection_of_spherical_samples() {
        let body =
            Body::from_solution(Chart::spherical(), ParamValues::new(), sample_solution()).unwrap();
        let (x, y, z) = body.cartesian_positions().unwrap();
        assert!((x[0] - 1.0).abs() < 1e-14);
        assert!(y[0].abs() < 1e-14);
        assert!(z[0].abs() < 1e-12);
        assert!((x[1] - 2.0 * 0.2_f64.cos()).abs() < 1e-14);
        assert!((y[1] - 2.0 * 0.2_f64.sin()).abs() < 1e-14);
    }

    #[test]
    fn cartesian_chart_positions_pass_through() {
        let sol = Solution {
            s: vec![0.0],
            states: vec![vec![0.0, 3.0, -1.0, 2.0, 1.0, 0.0, 0.0, 0.0]],
            status: Status::Completed,
            stats: Stats::default(),
        };
        let body = Body::from_solution(Chart::cartesian(), ParamValues::new(), sol).unwrap();
        let (x, y, z) = body.cartesian_positions().unwrap();
        assert_eq!((x[0], y[0], z[0]), (3.0, -1.0, 2.0));
    }
}
