//! The `worldline_core` crate is the computational engine for the worldline
//! CLI: symbolic spacetime metrics in, sampled geodesic trajectories out.
//! It is generic over the scalar type, supporting both plain `f64`
//! arithmetic and forward-mode automatic differentiation via dual numbers.
//!
//! Key components:
//! - **Expressions**: a small symbolic expression tree with differentiation,
//!   parsing, and compilation to bytecode (`expr`, `compile`).
//! - **Geometry**: charts, metric tensors, Christoffel symbols, and the
//!   geodesic equations derived from them (`chart`, `metric`, `geodesic`).
//! - **Numerics**: dual numbers and Jacobians (`autodiff`), implicit and
//!   explicit adaptive steppers (`solvers`), and the event-aware
//!   integration driver (`driver`).
//! - **Results**: the trajectory container with cached derived quantities
//!   (`body`) and the end-to-end entry point (`propagate`).

pub mod autodiff;
pub mod body;
pub mod chart;
pub mod compile;
pub mod driver;
pub mod error;
pub mod expr;
pub mod geodesic;
pub mod lower;
pub mod metric;
pub mod propagate;
pub mod solvers;
pub mod traits;
