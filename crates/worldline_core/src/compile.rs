//! Lowering symbolic expressions to stack-machine bytecode.
//!
//! This is the numeric half of the symbolic layer: an [`Expr`] is compiled
//! once into a flat instruction sequence, then evaluated many times by a
//! small stack VM. Compilation resolves symbol names to state-vector and
//! parameter slots through explicit maps, so the same program text never
//! depends on ambient context. The VM is generic over [`Scalar`], which is
//! what lets one compiled program serve both `f64` integration and
//! dual-number Jacobian columns.

use crate::error::GeodesicError;
use crate::expr::{Expr, Symbol};
use crate::traits::Scalar;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// OpCodes for the stack-based virtual machine.
/// The VM operates on a stack of `Scalar` values (f64 or Dual).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OpCode {
    /// Pushes a constant value onto the stack.
    LoadConst(f64),
    /// Pushes a state-vector component (by slot) onto the stack.
    LoadVar(usize),
    /// Pushes a parameter value (by slot) onto the stack.
    LoadParam(usize),
    /// Pops (b, a), pushes a + b.
    Add,
    /// Pops (b, a), pushes a - b.
    Sub,
    /// Pops (b, a), pushes a * b.
    Mul,
    /// Pops (b, a), pushes a / b.
    Div,
    /// Pops (b, a), pushes a ^ b.
    Pow,
    /// Pops a, pushes -a.
    Neg,
    Sin,
    Cos,
    Tan,
    Exp,
    Ln,
    Sqrt,
}

/// A compiled instruction sequence for one scalar expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

/// Stack-based virtual machine.
///
/// The VM is stateless; `execute` takes all context explicitly:
/// - `bytecode`: instructions to run
/// - `vars`: state vector (read-only)
/// - `params`: parameter vector (read-only)
/// - `stack`: scratch buffer reused across calls
///
/// Returns the value left on the stack. Compiled programs are balanced by
/// construction, so the intermediate pops cannot fail.
pub struct VM;

impl VM {
    pub fn execute<T: Scalar>(
        bytecode: &Bytecode,
        vars: &[T],
        params: &[T],
        stack: &mut Vec<T>,
    ) -> T {
        stack.clear();

        for op in &bytecode.ops {
            match op {
                OpCode::LoadConst(val) => {
                    stack.push(T::from_f64(*val).unwrap());
                }
                OpCode::LoadVar(idx) => {
                    stack.push(vars[*idx]);
                }
                OpCode::LoadParam(idx) => {
                    stack.push(params[*idx]);
                }
                OpCode::Add => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a + b);
                }
                OpCode::Sub => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a - b);
                }
                OpCode::Mul => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a * b);
                }
                OpCode::Div => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a / b);
                }
                OpCode::Pow => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a.powf(b));
                }
                OpCode::Neg => {
                    let a = stack.pop().unwrap();
                    stack.push(-a);
                }
                OpCode::Sin => {
                    let a = stack.pop().unwrap();
                    stack.push(a.sin());
                }
                OpCode::Cos => {
                    let a = stack.pop().unwrap();
                    stack.push(a.cos());
                }
                OpCode::Tan => {
                    let a = stack.pop().unwrap();
                    stack.push(a.tan());
                }
                OpCode::Exp => {
                    let a = stack.pop().unwrap();
                    stack.push(a.exp());
                }
                OpCode::Ln => {
                    let a = stack.pop().unwrap();
                    stack.push(a.ln());
                }
                OpCode::Sqrt => {
                    let a = stack.pop().unwrap();
                    stack.push(a.sqrt());
                }
            }
        }

        stack.pop().unwrap_or_else(|| T::from_f64(0.0).unwrap())
    }
}

/// Compiles [`Expr`] trees into [`Bytecode`], resolving symbols to slots.
///
/// Slot maps are built from explicit symbol lists; a symbol present in both
/// lists resolves as a state variable. Compilation is pure: the same
/// expression against the same maps always yields the same instruction
/// sequence.
pub struct Compiler {
    var_map: HashMap<String, usize>,
    param_map: HashMap<String, usize>,
}

impl Compiler {
    pub fn new(vars: &[Symbol], params: &[Symbol]) -> Self {
        let mut var_map = HashMap::new();
        for (i, sym) in vars.iter().enumerate() {
            var_map.insert(sym.as_str().to_string(), i);
        }

        let mut param_map = HashMap::new();
        for (i, sym) in params.iter().enumerate() {
            param_map.insert(sym.as_str().to_string(), i);
        }

        Self { var_map, param_map }
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode, GeodesicError> {
        let mut ops = Vec::new();
        self.compile_node(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_node(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<(), GeodesicError> {
        match expr {
            Expr::Const(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Sym(sym) => {
                if let Some(&idx) = self.var_map.get(sym.as_str()) {
                    ops.push(OpCode::LoadVar(idx));
                } else if let Some(&idx) = self.param_map.get(sym.as_str()) {
                    ops.push(OpCode::LoadParam(idx));
                } else {
                    return Err(GeodesicError::UnboundSymbol {
                        symbol: sym.as_str().to_string(),
                    });
                }
            }
            Expr::Add(a, b) => {
                self.compile_node(a, ops)?;
                self.compile_node(b, ops)?;
                ops.push(OpCode::Add);
            }
            Expr::Sub(a, b) => {
                self.compile_node(a, ops)?;
                self.compile_node(b, ops)?;
                ops.push(OpCode::Sub);
            }
            Expr::Mul(a, b) => {
                self.compile_node(a, ops)?;
                self.compile_node(b, ops)?;
                ops.push(OpCode::Mul);
            }
            Expr::Div(a, b) => {
                self.compile_node(a, ops)?;
                self.compile_node(b, ops)?;
                ops.push(OpCode::Div);
            }
            Expr::Pow(a, b) => {
                self.compile_node(a, ops)?;
                self.compile_node(b, ops)?;
                ops.push(OpCode::Pow);
            }
            Expr::Neg(a) => {
                self.compile_node(a, ops)?;
                ops.push(OpCode::Neg);
            }
            Expr::Sin(a) => {
                self.compile_node(a, ops)?;
                ops.push(OpCode::Sin);
            }
            Expr::Cos(a) => {
                self.compile_node(a, ops)?;
                ops.push(OpCode::Cos);
            }
            Expr::Tan(a) => {
                self.compile_node(a, ops)?;
                ops.push(OpCode::Tan);
            }
            Expr::Exp(a) => {
                self.compile_node(a, ops)?;
                ops.push(OpCode::Exp);
            }
            Expr::Ln(a) => {
                self.compile_node(a, ops)?;
                ops.push(OpCode::Ln);
            }
            Expr::Sqrt(a) => {
                self.compile_node(a, ops)?;
                ops.push(OpCode::Sqrt);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse;
    use std::collections::HashMap;

    fn symbols(names: &[&str]) -> Vec<Symbol> {
        names.iter().copied().map(Symbol::new).collect()
    }

    #[test]
    fn vm_matches_tree_walk_evaluation() {
        let vars = symbols(&["r", "theta"]);
        let params = symbols(&["rs"]);
        let compiler = Compiler::new(&vars, &params);
        let e = parse("-(rs/r^2) * sin(theta) + sqrt(1 - rs/r) / tan(theta)").unwrap();
        let code = compiler.compile(&e).unwrap();

        let mut stack = Vec::new();
        for (r, theta) in [(3.0, 0.4), (10.0, 1.2), (2.5, 2.0)] {
            let got = VM::execute(&code, &[r, theta], &[1.0], &mut stack);
            let bindings: HashMap<String, f64> = [
                ("r".to_string(), r),
                ("theta".to_string(), theta),
                ("rs".to_string(), 1.0),
            ]
            .into();
            let expected = e.eval_map(&bindings).unwrap();
            assert!((got - expected).abs() < 1e-13);
        }
    }

    #[test]
    fn compilation_is_deterministic() {
        let vars = symbols(&["r", "theta", "phi"]);
        let compiler_a = Compiler::new(&vars, &[]);
        let compiler_b = Compiler::new(&vars, &[]);
        let e = parse("r^2 * sin(theta)^2 + cos(phi)").unwrap();
        let code_a = compiler_a.compile(&e).unwrap();
        let code_b = compiler_b.compile(&e).unwrap();
        assert_eq!(code_a, code_b);

        let mut stack = Vec::new();
        let y: [f64; 3] = [7.3, 0.9, 2.2];
        let va = VM::execute(&code_a, &y, &[], &mut stack);
        let vb = VM::execute(&code_b, &y, &[], &mut stack);
        assert_eq!(va.to_bits(), vb.to_bits());
    }

    #[test]
    fn unbound_symbol_is_reported_by_name() {
        let compiler = Compiler::new(&symbols(&["r"]), &symbols(&["rs"]));
        let e = parse("r + rz").unwrap();
        match compiler.compile(&e) {
            Err(GeodesicError::UnboundSymbol { symbol }) => assert_eq!(symbol, "rz"),
            other => panic!("expected UnboundSymbol, got {:?}", other),
        }
    }

    #[test]
    fn state_slot_shadows_parameter_slot() {
        let vars = symbols(&["r"]);
        let params = symbols(&["r"]);
        let compiler = Compiler::new(&vars, &params);
        let code = compiler.compile(&Expr::sym("r")).unwrap();
        let mut stack = Vec::new();
        let got = VM::execute(&code, &[2.0], &[99.0], &mut stack);
        assert_eq!(got, 2.0);
    }
}
