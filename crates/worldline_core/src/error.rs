use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error taxonomy for the geodesic pipeline.
///
/// Construction-time kinds (`ShapeMismatch`, `AsymmetricMetric`,
/// `SingularMetric`, `UnboundSymbol`) abort before any integration starts.
/// The runtime kinds are carried inside
/// [`Status::Failed`](crate::driver::Status) so a failed run still hands
/// back the partial trajectory; they are `Err` only when no trajectory
/// exists to return.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum GeodesicError {
    #[error("{what} has {found} entries, expected {expected}")]
    ShapeMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    #[error("metric is not symmetric: g[{row}][{col}] != g[{col}][{row}]")]
    AsymmetricMetric { row: usize, col: usize },

    #[error("metric is singular: symbolic determinant vanishes identically")]
    SingularMetric,

    #[error("symbol '{symbol}' is not a coordinate, velocity, affine parameter, or bound parameter")]
    UnboundSymbol { symbol: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("non-finite value in component {component} at s = {s}")]
    NumericEvaluation { s: f64, component: usize },

    #[error("solver failed to converge at s = {s} (step size {step_size:e})")]
    SolverNonConvergence { s: f64, step_size: f64 },

    #[error("step budget of {max_steps} exhausted at s = {s}")]
    StepBudgetExhausted { s: f64, max_steps: usize },
}
