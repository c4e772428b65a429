//! Metric tensors over a coordinate chart.
//!
//! A [`Metric`] owns an N x N symmetric matrix of symbolic entries in the
//! chart coordinates and a declared set of parameter symbols. Shape and
//! symmetry are validated at construction. The inverse metric and the
//! Christoffel symbols derived from it are computed on first use and cached
//! on the instance; the model is single-threaded, so a plain `OnceCell`
//! carries the write-once discipline.

use crate::chart::Chart;
use crate::error::GeodesicError;
use crate::expr::{Expr, Symbol};
use crate::geodesic::{ChristoffelSymbols, GeodesicSystem};
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::collections::{BTreeSet, HashMap};

/// Dense square matrix of symbolic entries, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymMatrix {
    n: usize,
    entries: Vec<Expr>,
}

impl SymMatrix {
    pub fn from_rows(rows: Vec<Vec<Expr>>) -> Result<Self, GeodesicError> {
        let n = rows.len();
        let mut entries = Vec::with_capacity(n * n);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != n {
                return Err(GeodesicError::ShapeMismatch {
                    what: format!("metric row {}", i),
                    expected: n,
                    found: row.len(),
                });
            }
            entries.extend(row);
        }
        Ok(Self { n, entries })
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    pub fn get(&self, i: usize, j: usize) -> &Expr {
        &self.entries[i * self.n + j]
    }

    fn minor(&self, row: usize, col: usize) -> SymMatrix {
        let n = self.n;
        let mut entries = Vec::with_capacity((n - 1) * (n - 1));
        for i in 0..n {
            if i == row {
                continue;
            }
            for j in 0..n {
                if j == col {
                    continue;
                }
                entries.push(self.get(i, j).clone());
            }
        }
        SymMatrix { n: n - 1, entries }
    }

    /// Determinant by Laplace expansion along the first row. The smart
    /// constructors fold away the zero entries, which is what keeps this
    /// tractable for the mostly-diagonal metrics of interest.
    pub fn determinant(&self) -> Expr {
        match self.n {
            0 => Expr::one(),
            1 => self.get(0, 0).clone(),
            2 => Expr::sub(
                Expr::mul(self.get(0, 0).clone(), self.get(1, 1).clone()),
                Expr::mul(self.get(0, 1).clone(), self.get(1, 0).clone()),
            ),
            _ => {
                let mut det = Expr::zero();
                for j in 0..self.n {
                    let entry = self.get(0, j);
                    if entry.is_zero() {
                        continue;
                    }
                    let term = Expr::mul(entry.clone(), self.minor(0, j).determinant());
                    det = if j % 2 == 0 {
                        Expr::add(det, term)
                    } else {
                        Expr::sub(det, term)
                    };
                }
                det
            }
        }
    }

    /// Symbolic inverse by the adjugate. Fails with [`SingularMetric`]
    /// (`GeodesicError::SingularMetric`) when the determinant folds to the
    /// zero constant; determinants that only vanish at particular coordinate
    /// values (horizons) pass through and surface numerically instead.
    pub fn inverse(&self) -> Result<SymMatrix, GeodesicError> {
        let det = self.determinant();
        if det.is_zero() {
            return Err(GeodesicError::SingularMetric);
        }
        let n = self.n;
        let mut entries = vec![Expr::zero(); n * n];
        for i in 0..n {
            for j in 0..n {
                let mut cof = self.minor(i, j).determinant();
                if (i + j) % 2 == 1 {
                    cof = Expr::neg(cof);
                }
                // Adjugate transposes the cofactors.
                entries[j * n + i] = Expr::div(cof, det.clone());
            }
        }
        Ok(SymMatrix { n, entries })
    }
}

/// A metric tensor bound to a chart and a set of parameter symbols.
#[derive(Debug)]
pub struct Metric {
    chart: Chart,
    params: Vec<Symbol>,
    g: SymMatrix,
    inverse: OnceCell<SymMatrix>,
    christoffel: OnceCell<ChristoffelSymbols>,
    geodesics: OnceCell<GeodesicSystem>,
}

impl Metric {
    /// Validates shape against the chart and symmetry of the entries.
    ///
    /// Symmetry accepts entry pairs that are structurally equal or that
    /// agree numerically at a set of deterministic probe points, so `a*r`
    /// against `r*a` passes while a genuinely asymmetric pair fails with
    /// [`GeodesicError::AsymmetricMetric`].
    pub fn new(
        chart: Chart,
        rows: Vec<Vec<Expr>>,
        params: Vec<Symbol>,
    ) -> Result<Self, GeodesicError> {
        let n = chart.dim();
        if rows.len() != n {
            return Err(GeodesicError::ShapeMismatch {
                what: "metric rows".to_string(),
                expected: n,
                found: rows.len(),
            });
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n {
                return Err(GeodesicError::ShapeMismatch {
                    what: format!("metric row {}", i),
                    expected: n,
                    found: row.len(),
                });
            }
        }
        let g = SymMatrix::from_rows(rows)?;

        for i in 0..n {
            for j in (i + 1)..n {
                if !entries_agree(g.get(i, j), g.get(j, i)) {
                    return Err(GeodesicError::AsymmetricMetric { row: i, col: j });
                }
            }
        }

        Ok(Self {
            chart,
            params,
            g,
            inverse: OnceCell::new(),
            christoffel: OnceCell::new(),
            geodesics: OnceCell::new(),
        })
    }

    /// Builds a diagonal metric; off-diagonal entries are zero.
    pub fn diagonal(
        chart: Chart,
        diag: Vec<Expr>,
        params: Vec<Symbol>,
    ) -> Result<Self, GeodesicError> {
        let n = chart.dim();
        if diag.len() != n {
            return Err(GeodesicError::ShapeMismatch {
                what: "metric diagonal".to_string(),
                expected: n,
                found: diag.len(),
            });
        }
        let mut rows = vec![vec![Expr::zero(); n]; n];
        for (i, e) in diag.into_iter().enumerate() {
            rows[i][i] = e;
        }
        Self::new(chart, rows, params)
    }

    pub fn chart(&self) -> &Chart {
        &self.chart
    }

    pub fn params(&self) -> &[Symbol] {
        &self.params
    }

    pub fn component(&self, i: usize, j: usize) -> &Expr {
        self.g.get(i, j)
    }

    pub fn matrix(&self) -> &SymMatrix {
        &self.g
    }

    /// The inverse metric, computed on first call and cached.
    pub fn inverse(&self) -> Result<&SymMatrix, GeodesicError> {
        if let Some(inv) = self.inverse.get() {
            return Ok(inv);
        }
        let inv = self.g.inverse()?;
        Ok(self.inverse.get_or_init(|| inv))
    }

    /// The Christoffel symbols of the metric, computed once and cached.
    pub fn christoffel(&self) -> Result<&ChristoffelSymbols, GeodesicError> {
        if let Some(gamma) = self.christoffel.get() {
            return Ok(gamma);
        }
        let gamma = ChristoffelSymbols::from_metric(self)?;
        Ok(self.christoffel.get_or_init(|| gamma))
    }

    /// The geodesic equation system of the metric, derived once and cached.
    /// Repeated integration runs against the same metric reuse this.
    pub fn geodesics(&self) -> Result<&GeodesicSystem, GeodesicError> {
        if let Some(sys) = self.geodesics.get() {
            return Ok(sys);
        }
        let sys = GeodesicSystem::derive(self)?;
        Ok(self.geodesics.get_or_init(|| sys))
    }
}

const SYMMETRY_PROBES: usize = 5;
const SYMMETRY_TOL: f64 = 1e-9;

/// Structural equality first, then agreement at deterministic probe points.
/// Probes that evaluate non-finite (or hit an unbound symbol) are skipped;
/// if nothing can be probed the structural verdict stands.
fn entries_agree(a: &Expr, b: &Expr) -> bool {
    if a == b {
        return true;
    }
    let mut syms = BTreeSet::new();
    a.symbols(&mut syms);
    b.symbols(&mut syms);

    let mut compared = false;
    for k in 0..SYMMETRY_PROBES {
        let mut bindings = HashMap::new();
        for (m, sym) in syms.iter().enumerate() {
            // Low-discrepancy stride keeps probes off the axes where trig
            // factors vanish.
            let t = (0.618_033_988_75 * ((m + 1) as f64) + 0.414_213_562_37 * ((k + 1) as f64))
                .fract();
            bindings.insert(sym.as_str().to_string(), 0.7 + 2.3 * t);
        }
        let (va, vb) = match (a.eval_map(&bindings), b.eval_map(&bindings)) {
            (Some(va), Some(vb)) => (va, vb),
            _ => return false,
        };
        if !va.is_finite() || !vb.is_finite() {
            continue;
        }
        compared = true;
        let scale = va.abs().max(vb.abs()).max(1.0);
        if (va - vb).abs() > SYMMETRY_TOL * scale {
            return false;
        }
    }
    compared
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse;

    fn spherical_minkowski() -> Metric {
        let chart = Chart::spherical();
        let r = Expr::from(chart.coord(1));
        let theta = Expr::from(chart.coord(2));
        Metric::diagonal(
            chart,
            vec![
                Expr::Const(-1.0),
                Expr::one(),
                r.clone() * &r,
                r.clone() * &r * theta.clone().sin() * theta.sin(),
            ],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn rejects_wrong_row_count() {
        let chart = Chart::spherical();
        let rows = vec![vec![Expr::one(); 4]; 3];
        match Metric::new(chart, rows, vec![]) {
            Err(GeodesicError::ShapeMismatch {
                expected, found, ..
            }) => {
                assert_eq!(expected, 4);
                assert_eq!(found, 3);
            }
            other => panic!("expected ShapeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn rejects_ragged_row() {
        let chart = Chart::spherical();
        let mut rows = vec![vec![Expr::zero(); 4]; 4];
        rows[2] = vec![Expr::zero(); 5];
        assert!(matches!(
            Metric::new(chart, rows, vec![]),
            Err(GeodesicError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn rejects_asymmetric_matrix() {
        let chart = Chart::spherical();
        let mut rows = vec![vec![Expr::zero(); 4]; 4];
        for i in 0..4 {
            rows[i][i] = Expr::one();
        }
        rows[0][3] = parse("r").unwrap();
        rows[3][0] = parse("2*r").unwrap();
        match Metric::new(chart, rows, vec![]) {
            Err(GeodesicError::AsymmetricMetric { row, col }) => {
                assert_eq!((row, col), (0, 3));
            }
            other => panic!("expected AsymmetricMetric, got {:?}", other),
        }
    }

    #[test]
    fn accepts_commuted_but_equal_off_diagonals() {
        let chart = Chart::spherical();
        let mut rows = vec![vec![Expr::zero(); 4]; 4];
        for i in 0..4 {
            rows[i][i] = Expr::one();
        }
        rows[0][3] = parse("a * r").unwrap();
        rows[3][0] = parse("r * a").unwrap();
        assert!(Metric::new(chart, rows, vec![Symbol::new("a")]).is_ok());
    }

    #[test]
    fn singular_diagonal_detected() {
        let chart = Chart::spherical();
        let m = Metric::diagonal(
            chart,
            vec![Expr::one(), Expr::zero(), Expr::one(), Expr::one()],
            vec![],
        )
        .unwrap();
        assert!(matches!(m.inverse(), Err(GeodesicError::SingularMetric)));
    }

    #[test]
    fn inverse_of_diagonal_metric_is_reciprocal() {
        let m = spherical_minkowski();
        let inv = m.inverse().unwrap();
        let bindings: HashMap<String, f64> = [
            ("t".to_string(), 0.0),
            ("r".to_string(), 2.5),
            ("theta".to_string(), 1.1),
            ("phi".to_string(), 0.3),
        ]
        .into();
        for i in 0..4 {
            let gii = m.component(i, i).eval_map(&bindings).unwrap();
            let hii = inv.get(i, i).eval_map(&bindings).unwrap();
            assert!((gii * hii - 1.0).abs() < 1e-10);
            for j in 0..4 {
                if i != j {
                    let hij = inv.get(i, j).eval_map(&bindings).unwrap();
                    assert!(hij.abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn inverse_with_off_diagonal_block() {
        // g = [[0, c], [c, 0]] in a 2-coordinate chart inverts to
        // [[0, 1/c], [1/c, 0]].
        let chart = Chart::new("plane", &["u", "v"]);
        let c = parse("c").unwrap();
        let rows = vec![
            vec![Expr::zero(), c.clone()],
            vec![c.clone(), Expr::zero()],
        ];
        let m = Metric::new(chart, rows, vec![Symbol::new("c")]).unwrap();
        let inv = m.inverse().unwrap();
        let bindings: HashMap<String, f64> =
            [("u".to_string(), 0.0), ("v".to_string(), 0.0), ("c".to_string(), 4.0)].into();
        assert!(inv.get(0, 0).eval_map(&bindings).unwrap().abs() < 1e-12);
        assert!((inv.get(0, 1).eval_map(&bindings).unwrap() - 0.25).abs() < 1e-12);
        assert!((inv.get(1, 0).eval_map(&bindings).unwrap() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn inverse_is_cached_per_instance() {
        let m = spherical_minkowski();
        let first = m.inverse().unwrap() as *const SymMatrix;
        let second = m.inverse().unwrap() as *const SymMatrix;
        assert_eq!(first, second);
    }
}
