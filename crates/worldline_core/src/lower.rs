//! Lowering the geodesic system to a numeric ODE.
//!
//! [`GeodesicOde`] compiles each symbolic acceleration to bytecode once and
//! then serves as the right-hand side f(s, y) of the first-order system
//!
//!   y = [x_0 .. x_{n-1}, u_0 .. u_{n-1}],   y' = [u, a(x, u)]
//!
//! for both `f64` and [`Dual`] scalars. Parameter symbols are bound to
//! numeric values here, never inside the expressions, so re-running a metric
//! family under different parameter values is a cheap re-lower with no
//! re-derivation.

use crate::autodiff::Dual;
use crate::chart::Chart;
use crate::compile::{Bytecode, Compiler, VM};
use crate::error::GeodesicError;
use crate::expr::{Expr, Symbol};
use crate::geodesic::GeodesicSystem;
use crate::traits::{OdeSystem, Scalar};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

/// Named numeric values for parameter symbols, passed as data wherever an
/// expression is lowered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamValues {
    pairs: Vec<(Symbol, f64)>,
}

impl ParamValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert; a repeated name overwrites the earlier value.
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        let sym = Symbol::new(name);
        if let Some(pair) = self.pairs.iter_mut().find(|(s, _)| *s == sym) {
            pair.1 = value;
        } else {
            self.pairs.push((sym, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.pairs
            .iter()
            .find(|(s, _)| s.as_str() == name)
            .map(|(_, v)| *v)
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        self.pairs.iter().map(|(s, _)| s.clone()).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.pairs.iter().map(|(_, v)| *v).collect()
    }

    /// Values reordered to match `symbols`; any symbol without a value is
    /// reported as unbound.
    fn values_for(&self, symbols: &[Symbol]) -> Result<Vec<f64>, GeodesicError> {
        symbols
            .iter()
            .map(|sym| {
                self.get(sym.as_str())
                    .ok_or_else(|| GeodesicError::UnboundSymbol {
                        symbol: sym.as_str().to_string(),
                    })
            })
            .collect()
    }
}

/// The slot layout scalar expressions are compiled against: a state symbol
/// list, the affine parameter in the slot after the state, and bound
/// parameter values.
#[derive(Debug, Clone)]
pub struct StateLayout {
    state: Vec<Symbol>,
    affine: Symbol,
    param_syms: Vec<Symbol>,
    param_vals: Vec<f64>,
}

impl StateLayout {
    pub fn new(state: Vec<Symbol>, affine: Symbol, params: &ParamValues) -> Self {
        Self {
            state,
            affine,
            param_syms: params.symbols(),
            param_vals: params.values(),
        }
    }

    /// The layout of a chart's 2N geodesic state.
    pub fn for_chart(chart: &Chart, params: &ParamValues) -> Self {
        Self::new(chart.state_symbols(), chart.affine().clone(), params)
    }

    /// State length excluding the affine slot.
    pub fn state_len(&self) -> usize {
        self.state.len()
    }

    /// Compiles a scalar expression against this layout.
    pub fn compile(&self, expr: &Expr) -> Result<StateScalar, GeodesicError> {
        let mut vars = self.state.clone();
        vars.push(self.affine.clone());
        let compiler = Compiler::new(&vars, &self.param_syms);
        let code = compiler.compile(expr)?;
        Ok(StateScalar {
            code,
            params: self.param_vals.clone(),
            buf: RefCell::new(Vec::with_capacity(vars.len())),
            stack: RefCell::new(Vec::with_capacity(16)),
        })
    }
}

/// A compiled scalar over (s, y): event predicates and derived trajectory
/// quantities. Compile once, evaluate per sample.
#[derive(Debug)]
pub struct StateScalar {
    code: Bytecode,
    params: Vec<f64>,
    buf: RefCell<Vec<f64>>,
    stack: RefCell<Vec<f64>>,
}

impl StateScalar {
    pub fn eval(&self, s: f64, y: &[f64]) -> f64 {
        let mut buf = self.buf.borrow_mut();
        buf.clear();
        buf.extend_from_slice(y);
        buf.push(s);
        let mut stack = self.stack.borrow_mut();
        VM::execute(&self.code, &buf, &self.params, &mut stack)
    }
}

/// The lowered geodesic ODE: compiled accelerations plus bound parameter
/// values. Implements [`OdeSystem`] over both scalar types so the implicit
/// stepper can take Jacobians through the same bytecode.
#[derive(Debug)]
pub struct GeodesicOde {
    dim: usize,
    accel: Vec<Bytecode>,
    params: Vec<f64>,
    params_dual: Vec<Dual>,
    stack: RefCell<Vec<f64>>,
    stack_dual: RefCell<Vec<Dual>>,
}

impl GeodesicOde {
    /// Compiles the system's accelerations against the chart state layout
    /// and binds parameter values. Pure: the same system and values always
    /// produce identical bytecode and parameter vectors.
    pub fn lower(system: &GeodesicSystem, values: &ParamValues) -> Result<Self, GeodesicError> {
        let chart = system.chart();
        let state = chart.state_symbols();
        let compiler = Compiler::new(&state, system.params());
        let accel = system
            .accelerations()
            .iter()
            .map(|a| compiler.compile(a))
            .collect::<Result<Vec<_>, _>>()?;
        let params = values.values_for(system.params())?;
        let params_dual = params.iter().map(|&v| Dual::constant(v)).collect();

        Ok(Self {
            dim: chart.dim(),
            accel,
            params,
            params_dual,
            stack: RefCell::new(Vec::with_capacity(32)),
            stack_dual: RefCell::new(Vec::with_capacity(32)),
        })
    }

    /// Coordinate count n; the integrated state has length 2n.
    pub fn coord_dim(&self) -> usize {
        self.dim
    }

    fn eval_in<T: Scalar>(&self, y: &[T], out: &mut [T], params: &[T], stack: &mut Vec<T>) {
        let n = self.dim;
        out[..n].copy_from_slice(&y[n..2 * n]);
        for (k, code) in self.accel.iter().enumerate() {
            out[n + k] = VM::execute(code, y, params, stack);
        }
    }
}

impl OdeSystem<f64> for GeodesicOde {
    fn dimension(&self) -> usize {
        2 * self.dim
    }

    fn eval(&self, _s: f64, y: &[f64], out: &mut [f64]) {
        let mut stack = self.stack.borrow_mut();
        self.eval_in(y, out, &self.params, &mut stack);
    }
}

impl OdeSystem<Dual> for GeodesicOde {
    fn dimension(&self) -> usize {
        2 * self.dim
    }

    fn eval(&self, _s: Dual, y: &[Dual], out: &mut [Dual]) {
        let mut stack = self.stack_dual.borrow_mut();
        self.eval_in(y, out, &self.params_dual, &mut stack);
    }
}
