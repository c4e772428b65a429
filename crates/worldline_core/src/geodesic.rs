//! Christoffel symbols and the geodesic equation system.
//!
//! From a metric g over a chart this module derives
//!
//!   Gamma^k_ij = 1/2 sum_l g^kl (d_i g_jl + d_j g_il - d_l g_ij)
//!
//! and assembles the second-order geodesic accelerations
//!
//!   d(u_k)/ds = - sum_ij Gamma^k_ij u_i u_j
//!
//! as symbolic expressions over the chart's coordinate and velocity symbols.
//! Symmetry in the lower index pair halves the derivation work and the
//! assembled sums.

use crate::chart::Chart;
use crate::error::GeodesicError;
use crate::expr::{Expr, Symbol};
use crate::metric::Metric;
use std::fmt;

/// The N^3 Christoffel symbols of a metric, symmetric in the lower indices.
#[derive(Debug, Clone, PartialEq)]
pub struct ChristoffelSymbols {
    n: usize,
    gamma: Vec<Expr>,
}

impl ChristoffelSymbols {
    /// Derives all symbols from the metric and its cached inverse.
    pub fn from_metric(metric: &Metric) -> Result<Self, GeodesicError> {
        let chart = metric.chart();
        let n = chart.dim();
        let inv = metric.inverse()?;

        // dg[l][i][j] = d g_ij / d x_l
        let mut dg = vec![Expr::zero(); n * n * n];
        for l in 0..n {
            let coord = chart.coord(l);
            for i in 0..n {
                for j in 0..n {
                    dg[(l * n + i) * n + j] = metric.component(i, j).diff(coord);
                }
            }
        }
        let d = |l: usize, i: usize, j: usize| &dg[(l * n + i) * n + j];

        let mut gamma = vec![Expr::zero(); n * n * n];
        for k in 0..n {
            for i in 0..n {
                for j in i..n {
                    let mut sum = Expr::zero();
                    for l in 0..n {
                        let weight = inv.get(k, l);
                        if weight.is_zero() {
                            continue;
                        }
                        let bracket = Expr::sub(
                            Expr::add(d(i, j, l).clone(), d(j, i, l).clone()),
                            d(l, i, j).clone(),
                        );
                        sum = Expr::add(sum, Expr::mul(weight.clone(), bracket));
                    }
                    let value = Expr::mul(Expr::Const(0.5), sum);
                    gamma[(k * n + i) * n + j] = value.clone();
                    gamma[(k * n + j) * n + i] = value;
                }
            }
        }

        Ok(Self { n, gamma })
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    /// Gamma^k_ij.
    pub fn get(&self, k: usize, i: usize, j: usize) -> &Expr {
        &self.gamma[(k * self.n + i) * self.n + j]
    }
}

/// The geodesic equations of a metric in second-order form: one symbolic
/// acceleration per coordinate, over the chart's velocity symbols.
#[derive(Debug, Clone)]
pub struct GeodesicSystem {
    chart: Chart,
    params: Vec<Symbol>,
    accel: Vec<Expr>,
}

impl GeodesicSystem {
    /// Assembles the accelerations from the metric's Christoffel symbols.
    /// Use [`Metric::geodesics`] to get the per-metric cached instance.
    pub fn derive(metric: &Metric) -> Result<Self, GeodesicError> {
        let gamma = metric.christoffel()?;
        let chart = metric.chart().clone();
        let n = chart.dim();

        let mut accel = Vec::with_capacity(n);
        for k in 0..n {
            let mut sum = Expr::zero();
            for i in 0..n {
                for j in i..n {
                    let g = gamma.get(k, i, j);
                    if g.is_zero() {
                        continue;
                    }
                    let u_i = Expr::from(chart.velocity(i));
                    let u_j = Expr::from(chart.velocity(j));
                    let mut term = Expr::mul(g.clone(), Expr::mul(u_i, u_j));
                    if i != j {
                        term = Expr::mul(Expr::Const(2.0), term);
                    }
                    sum = Expr::add(sum, term);
                }
            }
            accel.push(Expr::neg(sum));
        }

        Ok(Self {
            chart,
            params: metric.params().to_vec(),
            accel,
        })
    }

    pub fn chart(&self) -> &Chart {
        &self.chart
    }

    pub fn params(&self) -> &[Symbol] {
        &self.params
    }

    /// One acceleration expression per coordinate, chart order.
    pub fn accelerations(&self) -> &[Expr] {
        &self.accel
    }
}

impl fmt::Display for GeodesicSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for k in 0..self.chart.dim() {
            writeln!(
                f,
                "d({})/ds = {}",
                self.chart.coord(k),
                self.chart.velocity(k)
            )?;
        }
        for k in 0..self.chart.dim() {
            writeln!(f, "d({})/ds = {}", self.chart.velocity(k), self.accel[k])?;
        }
        Ok(())
    }
}
