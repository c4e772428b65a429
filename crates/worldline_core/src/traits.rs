use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types the compiled evaluators can run over.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A first-order ODE system y' = f(s, y).
///
/// Implementors are generic over [`Scalar`] so the same compiled right-hand
/// side can be evaluated at `f64` for integration and at
/// [`Dual`](crate::autodiff::Dual) for Jacobian assembly.
pub trait OdeSystem<T: Scalar> {
    /// Returns the dimension of the state vector.
    fn dimension(&self) -> usize;

    /// Evaluates the right-hand side.
    /// s: independent variable (affine parameter)
    /// y: current state
    /// out: buffer to write f(s, y) into
    fn eval(&self, s: T, y: &[T], out: &mut [T]);
}
