//! Adaptive integration driver.
//!
//! [`integrate`] advances an [`OdeSystem`] over an affine span with
//! proportional step control, watching a list of [`Event`] predicates for
//! sign changes. Runs end in one of three ways: the span is exhausted
//! (`Completed`), an event crosses zero and the run stops at the refined
//! crossing (`Terminated`), or the solver gives up (`Failed`). Whatever
//! samples were accepted before the end are always returned; a failure is
//! data, not an early `Err`.

use crate::autodiff::Dual;
use crate::error::GeodesicError;
use crate::expr::Expr;
use crate::lower::{StateLayout, StateScalar};
use crate::solvers::{Radau5, Stats, StepAttempt, Tolerances, Tsit5};
use crate::traits::OdeSystem;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 5.0;
const EVENT_REFINE_TOL: f64 = 1e-12;
const EVENT_REFINE_MAX_ITERS: usize = 100;

/// Stepper selection. Radau handles the stiff near-horizon regimes the
/// explicit pair cannot; Tsitouras is cheaper when the problem is tame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Method {
    #[default]
    Radau5,
    Tsit5,
}

/// Which sign changes of an event function count as a crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Any,
    Rising,
    Falling,
}

/// A termination predicate: a scalar expression over the state symbols and
/// the affine parameter, watched for zero crossings between accepted steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub label: String,
    pub expr: Expr,
    pub direction: Direction,
}

impl Event {
    pub fn new(label: impl Into<String>, expr: Expr) -> Self {
        Self {
            label: label.into(),
            expr,
            direction: Direction::Any,
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }
}

/// Everything that shapes one integration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    /// Affine parameter span `(s0, s1)`; `s1 < s0` integrates backward.
    pub span: (f64, f64),
    pub method: Method,
    pub atol: f64,
    pub rtol: f64,
    /// Upper bound on the step magnitude, also the output density bound.
    pub max_step: f64,
    /// Initial step magnitude; a span-scaled guess when `None`.
    pub first_step: Option<f64>,
    /// Bound on attempted steps, accepted and rejected together.
    pub max_steps: usize,
    pub events: Vec<Event>,
}

impl IntegrationConfig {
    pub fn new(span: (f64, f64)) -> Self {
        Self {
            span,
            method: Method::default(),
            atol: 1e-8,
            rtol: 1e-8,
            max_step: f64::INFINITY,
            first_step: None,
            max_steps: 1_000_000,
            events: Vec::new(),
        }
    }
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self::new((0.0, 1.0))
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Status {
    Completed,
    Terminated { event: String, index: usize, s: f64 },
    Failed { error: GeodesicError },
}

/// The sampled trajectory. `states[k]` is the state at `s[k]`; the first
/// sample is the initial condition and the last is the span end, the
/// refined event crossing, or the point where the solver gave up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub s: Vec<f64>,
    pub states: Vec<Vec<f64>>,
    pub status: Status,
    pub stats: Stats,
}

enum MethodStepper {
    Radau(Radau5),
    Tsit(Tsit5),
}

impl MethodStepper {
    fn new(method: Method, dim: usize) -> Self {
        match method {
            Method::Radau5 => Self::Radau(Radau5::new(dim)),
            Method::Tsit5 => Self::Tsit(Tsit5::new(dim)),
        }
    }

    fn order_exponent(&self) -> f64 {
        match self {
            Self::Radau(r) => r.order_exponent(),
            Self::Tsit(t) => t.order_exponent(),
        }
    }

    fn try_step<S>(
        &mut self,
        system: &S,
        s: f64,
        y: &[f64],
        h: f64,
        tol: &Tolerances,
        stats: &mut Stats,
    ) -> StepAttempt
    where
        S: OdeSystem<f64> + OdeSystem<Dual>,
    {
        match self {
            Self::Radau(r) => r.try_step(system, s, y, h, tol, stats),
            Self::Tsit(t) => t.try_step(system, s, y, h, tol, stats),
        }
    }
}

fn validate(config: &IntegrationConfig) -> Result<(), GeodesicError> {
    let invalid = |reason: &str| GeodesicError::InvalidConfig {
        reason: reason.to_string(),
    };
    let (s0, s1) = config.span;
    if !s0.is_finite() || !s1.is_finite() {
        return Err(invalid("span endpoints must be finite"));
    }
    if s0 == s1 {
        return Err(invalid("span is empty"));
    }
    if !(config.atol > 0.0) || !config.atol.is_finite() {
        return Err(invalid("atol must be positive and finite"));
    }
    if !(config.rtol > 0.0) || !config.rtol.is_finite() {
        return Err(invalid("rtol must be positive and finite"));
    }
    if !(config.max_step > 0.0) {
        return Err(invalid("max_step must be positive"));
    }
    if let Some(h0) = config.first_step {
        if !(h0 > 0.0) || !h0.is_finite() {
            return Err(invalid("first_step must be positive and finite"));
        }
    }
    if config.max_steps == 0 {
        return Err(invalid("max_steps must be at least 1"));
    }
    Ok(())
}

/// Smallest usable step magnitude around `s`.
fn step_floor(span_len: f64, s: f64) -> f64 {
    (1e-13 * span_len).max(16.0 * f64::EPSILON * s.abs())
}

fn crossed(direction: Direction, g_prev: f64, g_new: f64) -> bool {
    match direction {
        Direction::Any => g_prev != 0.0 && (g_prev * g_new < 0.0 || g_new == 0.0),
        Direction::Rising => g_prev < 0.0 && g_new >= 0.0,
        Direction::Falling => g_prev > 0.0 && g_new <= 0.0,
    }
}

/// Cubic Hermite interpolant over one step of width `h`, `alpha` in [0, 1].
fn hermite_state(y0: &[f64], f0: &[f64], y1: &[f64], f1: &[f64], h: f64, alpha: f64, out: &mut [f64]) {
    let a2 = alpha * alpha;
    let a3 = a2 * alpha;
    let h00 = 2.0 * a3 - 3.0 * a2 + 1.0;
    let h10 = a3 - 2.0 * a2 + alpha;
    let h01 = -2.0 * a3 + 3.0 * a2;
    let h11 = a3 - a2;
    for i in 0..y0.len() {
        out[i] = h00 * y0[i] + h10 * h * f0[i] + h01 * y1[i] + h11 * h * f1[i];
    }
}

/// Locates the crossing inside an accepted step by bisection on the Hermite
/// interpolant. Returns the step fraction and the interpolated state there.
#[allow(clippy::too_many_arguments)]
fn refine_crossing(
    scalar: &StateScalar,
    s_prev: f64,
    h: f64,
    y_prev: &[f64],
    f_prev: &[f64],
    y_new: &[f64],
    f_new: &[f64],
    g_prev: f64,
    g_new: f64,
) -> (f64, Vec<f64>) {
    if g_new == 0.0 {
        return (1.0, y_new.to_vec());
    }
    let mut lo = 0.0_f64;
    let mut hi = 1.0_f64;
    let mut g_lo = g_prev;
    let mut mid_y = vec![0.0; y_prev.len()];
    for _ in 0..EVENT_REFINE_MAX_ITERS {
        if hi - lo < EVENT_REFINE_TOL {
            break;
        }
        let mid = 0.5 * (lo + hi);
        hermite_state(y_prev, f_prev, y_new, f_new, h, mid, &mut mid_y);
        let g_mid = scalar.eval(s_prev + mid * h, &mid_y);
        if g_lo * g_mid <= 0.0 {
            hi = mid;
        } else {
            lo = mid;
            g_lo = g_mid;
        }
    }
    let alpha = 0.5 * (lo + hi);
    hermite_state(y_prev, f_prev, y_new, f_new, h, alpha, &mut mid_y);
    (alpha, mid_y)
}

/// Distinguishes a broken right-hand side from genuine non-convergence at
/// the point where the step size bottomed out.
fn failure_kind<S: OdeSystem<f64>>(
    system: &S,
    s: f64,
    y: &[f64],
    h: f64,
    scratch: &mut [f64],
    stats: &mut Stats,
) -> GeodesicError {
    system.eval(s, y, scratch);
    stats.rhs_evals += 1;
    match scratch.iter().position(|v| !v.is_finite()) {
        Some(component) => GeodesicError::NumericEvaluation { s, component },
        None => GeodesicError::SolverNonConvergence { s, step_size: h },
    }
}

/// Integrates `system` from `y0` over `config.span`.
///
/// `layout` names the state slots so event expressions can be compiled; its
/// length must match the system dimension. Pre-flight problems (bad config,
/// shape mismatches, an event referring to an unknown symbol) are `Err`;
/// anything that goes wrong after the first sample exists comes back as
/// [`Status::Failed`] on the partial [`Solution`].
pub fn integrate<S>(
    system: &S,
    y0: &[f64],
    layout: &StateLayout,
    config: &IntegrationConfig,
) -> Result<Solution, GeodesicError>
where
    S: OdeSystem<f64> + OdeSystem<Dual>,
{
    validate(config)?;
    let dim = OdeSystem::<f64>::dimension(system);
    if y0.len() != dim {
        return Err(GeodesicError::ShapeMismatch {
            what: "initial state".to_string(),
            expected: dim,
            found: y0.len(),
        });
    }
    if layout.state_len() != dim {
        return Err(GeodesicError::ShapeMismatch {
            what: "state layout".to_string(),
            expected: dim,
            found: layout.state_len(),
        });
    }
    let scalars = config
        .events
        .iter()
        .map(|ev| layout.compile(&ev.expr))
        .collect::<Result<Vec<_>, _>>()?;

    let (s0, s1) = config.span;
    let dir = if s1 > s0 { 1.0 } else { -1.0 };
    let span_len = (s1 - s0).abs();
    let tol = Tolerances {
        atol: config.atol,
        rtol: config.rtol,
    };
    let mut stepper = MethodStepper::new(config.method, dim);
    let exponent = stepper.order_exponent();

    debug!(
        method = ?config.method,
        span = ?config.span,
        atol = config.atol,
        rtol = config.rtol,
        events = config.events.len(),
        "starting integration"
    );

    let mut s = s0;
    let mut y = y0.to_vec();
    let mut samples_s = vec![s0];
    let mut samples_y = vec![y.clone()];
    let mut stats = Stats::default();
    let mut status = Status::Completed;

    let mut g: Vec<f64> = scalars.iter().map(|sc| sc.eval(s0, y0)).collect();
    let mut g_new = vec![0.0; g.len()];
    let mut f_prev = vec![0.0; dim];
    let mut f_new = vec![0.0; dim];
    let mut scratch = vec![0.0; dim];

    let mut h = config
        .first_step
        .unwrap_or(span_len * 1e-3)
        .min(config.max_step)
        .min(span_len);

    while (s1 - s) * dir > 0.0 {
        let remaining = (s1 - s) * dir;
        let floor = step_floor(span_len, s);
        if remaining <= floor {
            break;
        }
        let h_used = h.min(config.max_step).min(remaining);
        if h_used < floor {
            let error = failure_kind(system, s, &y, h_used, &mut scratch, &mut stats);
            warn!(%error, "integration failed");
            status = Status::Failed { error };
            break;
        }
        if stats.steps_accepted + stats.steps_rejected >= config.max_steps {
            let error = GeodesicError::StepBudgetExhausted {
                s,
                max_steps: config.max_steps,
            };
            warn!(%error, "integration failed");
            status = Status::Failed { error };
            break;
        }

        let h_signed = dir * h_used;
        let attempt = stepper.try_step(system, s, &y, h_signed, &tol, &mut stats);

        if attempt.err_norm <= 1.0 {
            stats.steps_accepted += 1;
            let mut s_new = s + h_signed;
            if (s1 - s_new) * dir <= span_len * 1e-12 {
                s_new = s1;
            }

            let mut hit: Option<(f64, usize, Vec<f64>)> = None;
            if !scalars.is_empty() {
                for (i, scalar) in scalars.iter().enumerate() {
                    g_new[i] = scalar.eval(s_new, &attempt.y_new);
                }
                let any = config
                    .events
                    .iter()
                    .enumerate()
                    .any(|(i, ev)| crossed(ev.direction, g[i], g_new[i]));
                if any {
                    system.eval(s, &y, &mut f_prev);
                    system.eval(s_new, &attempt.y_new, &mut f_new);
                    stats.rhs_evals += 2;
                    for (i, ev) in config.events.iter().enumerate() {
                        if !crossed(ev.direction, g[i], g_new[i]) {
                            continue;
                        }
                        let (alpha, y_star) = refine_crossing(
                            &scalars[i],
                            s,
                            h_signed,
                            &y,
                            &f_prev,
                            &attempt.y_new,
                            &f_new,
                            g[i],
                            g_new[i],
                        );
                        let replace = match &hit {
                            None => true,
                            Some((best, _, _)) => alpha < *best,
                        };
                        if replace {
                            hit = Some((alpha, i, y_star));
                        }
                    }
                }
            }
            if let Some((alpha, index, y_star)) = hit {
                let s_star = s + alpha * h_signed;
                samples_s.push(s_star);
                samples_y.push(y_star);
                status = Status::Terminated {
                    event: config.events[index].label.clone(),
                    index,
                    s: s_star,
                };
                debug!(event = %config.events[index].label, s = s_star, "terminated by event");
                break;
            }

            g.copy_from_slice(&g_new);
            s = s_new;
            y = attempt.y_new;
            samples_s.push(s);
            samples_y.push(y.clone());

            let factor = (SAFETY * attempt.err_norm.powf(-exponent)).clamp(MIN_FACTOR, MAX_FACTOR);
            h = h_used * factor;
            trace!(s, h, "step accepted");
        } else {
            stats.steps_rejected += 1;
            let mut factor = SAFETY * attempt.err_norm.powf(-exponent);
            if !factor.is_finite() {
                factor = MIN_FACTOR;
            }
            h = h_used * factor.clamp(MIN_FACTOR, 1.0);
            trace!(s, err = attempt.err_norm, h, "step rejected");
        }
    }

    debug!(
        status = ?status,
        accepted = stats.steps_accepted,
        rejected = stats.steps_rejected,
        "integration finished"
    );
    Ok(Solution {
        s: samples_s,
        states: samples_y,
        status,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{parse, Symbol};
    use crate::lower::ParamValues;
    use crate::traits::Scalar;
    use std::f64::consts::{PI, TAU};

    struct Decay;

    impl<T: Scalar> OdeSystem<T> for Decay {
        fn dimension(&self) -> usize {
            1
        }
        fn eval(&self, _s: T, y: &[T], out: &mut [T]) {
            out[0] = -y[0];
        }
    }

    struct Oscillator;

    impl<T: Scalar> OdeSystem<T> for Oscillator {
        fn dimension(&self) -> usize {
            2
        }
        fn eval(&self, _s: T, y: &[T], out: &mut [T]) {
            out[0] = y[1];
            out[1] = -y[0];
        }
    }

    struct Quadratic;

    impl<T: Scalar> OdeSystem<T> for Quadratic {
        fn dimension(&self) -> usize {
            1
        }
        fn eval(&self, _s: T, y: &[T], out: &mut [T]) {
            out[0] = y[0] * y[0];
        }
    }

    struct Poisoned;

    impl<T: Scalar> OdeSystem<T> for Poisoned {
        fn dimension(&self) -> usize {
            1
        }
        fn eval(&self, _s: T, _y: &[T], out: &mut [T]) {
            out[0] = T::nan();
        }
    }

    fn layout_of(names: &[&str]) -> StateLayout {
        let state = names.iter().map(|n| Symbol::new(*n)).collect();
        StateLayout::new(state, Symbol::new("t"), &ParamValues::new())
    }

    #[test]
    fn radau_completes_harmonic_oscillator_period() {
        let layout = layout_of(&["x", "v"]);
        let config = IntegrationConfig::new((0.0, TAU));
        let sol = integrate(&Oscillator, &[1.0, 0.0], &layout, &config).unwrap();
        assert_eq!(sol.status, Status::Completed);
        let last = sol.states.last().unwrap();
        assert!((sol.s.last().unwrap() - TAU).abs() < 1e-12);
        assert!((last[0] - 1.0).abs() < 1e-5);
        assert!(last[1].abs() < 1e-5);
        assert!(sol.stats.steps_accepted > 0);
        assert!(sol.stats.rhs_evals > 0);
        assert_eq!(sol.s.len(), sol.states.len());
    }

    #[test]
    fn tsit5_completes_harmonic_oscillator_period() {
        let layout = layout_of(&["x", "v"]);
        let mut config = IntegrationConfig::new((0.0, TAU));
        config.method = Method::Tsit5;
        let sol = integrate(&Oscillator, &[1.0, 0.0], &layout, &config).unwrap();
        assert_eq!(sol.status, Status::Completed);
        let last = sol.states.last().unwrap();
        assert!((last[0] - 1.0).abs() < 1e-5);
        assert!(last[1].abs() < 1e-5);
    }

    #[test]
    fn backward_span_recovers_initial_value() {
        let layout = layout_of(&["x"]);
        let config = IntegrationConfig::new((1.0, 0.0));
        let sol = integrate(&Decay, &[(-1.0_f64).exp()], &layout, &config).unwrap();
        assert_eq!(sol.status, Status::Completed);
        assert!((sol.states.last().unwrap()[0] - 1.0).abs() < 1e-6);
        assert!(sol.s.last().unwrap().abs() < 1e-12);
    }

    #[test]
    fn falling_event_fires_at_first_downward_crossing() {
        let layout = layout_of(&["x", "v"]);
        let mut config = IntegrationConfig::new((0.0, TAU));
        config.events = vec![Event::new("node", parse("x").unwrap()).with_direction(Direction::Falling)];
        let sol = integrate(&Oscillator, &[1.0, 0.0], &layout, &config).unwrap();
        match &sol.status {
            Status::Terminated { event, index, s } => {
                assert_eq!(event, "node");
                assert_eq!(*index, 0);
                assert!((s - PI / 2.0).abs() < 5e-4);
            }
            other => panic!("expected termination, got {:?}", other),
        }
        let last = sol.states.last().unwrap();
        assert!(last[0].abs() < 5e-4);
        assert_eq!(sol.s.len(), sol.states.len());
    }

    #[test]
    fn rising_event_ignores_downward_crossing() {
        let layout = layout_of(&["x", "v"]);
        let mut config = IntegrationConfig::new((0.0, TAU));
        config.events = vec![Event::new("node", parse("x").unwrap()).with_direction(Direction::Rising)];
        let sol = integrate(&Oscillator, &[1.0, 0.0], &layout, &config).unwrap();
        match &sol.status {
            Status::Terminated { s, .. } => assert!((s - 3.0 * PI / 2.0).abs() < 5e-4),
            other => panic!("expected termination, got {:?}", other),
        }
    }

    #[test]
    fn earliest_crossing_wins_regardless_of_list_order() {
        let layout = layout_of(&["x", "v"]);
        let mut config = IntegrationConfig::new((0.0, TAU));
        config.events = vec![
            Event::new("late", parse("x + 0.5").unwrap()),
            Event::new("early", parse("x").unwrap()),
        ];
        let sol = integrate(&Oscillator, &[1.0, 0.0], &layout, &config).unwrap();
        match &sol.status {
            Status::Terminated { event, index, s } => {
                assert_eq!(event, "early");
                assert_eq!(*index, 1);
                assert!((s - PI / 2.0).abs() < 5e-4);
            }
            other => panic!("expected termination, got {:?}", other),
        }
    }

    #[test]
    fn simultaneous_crossings_resolve_by_list_order() {
        let layout = layout_of(&["x", "v"]);
        let mut config = IntegrationConfig::new((0.0, TAU));
        config.events = vec![
            Event::new("a", parse("x").unwrap()),
            Event::new("b", parse("x").unwrap()),
        ];
        let sol = integrate(&Oscillator, &[1.0, 0.0], &layout, &config).unwrap();
        match &sol.status {
            Status::Terminated { event, index, .. } => {
                assert_eq!(event, "a");
                assert_eq!(*index, 0);
            }
            other => panic!("expected termination, got {:?}", other),
        }
    }

    #[test]
    fn event_zero_at_start_is_not_a_crossing() {
        let layout = layout_of(&["x", "v"]);
        let mut config = IntegrationConfig::new((0.0, TAU));
        config.events = vec![Event::new("turn", parse("v").unwrap())];
        let sol = integrate(&Oscillator, &[1.0, 0.0], &layout, &config).unwrap();
        match &sol.status {
            Status::Terminated { s, .. } => {
                assert!(*s > 1.0);
                assert!((s - PI).abs() < 5e-4);
            }
            other => panic!("expected termination, got {:?}", other),
        }
    }

    #[test]
    fn event_in_final_step_still_terminates() {
        let layout = layout_of(&["x"]);
        let mut config = IntegrationConfig::new((0.0, 1.0));
        config.events =
            vec![Event::new("threshold", parse("x - 0.37").unwrap()).with_direction(Direction::Falling)];
        let sol = integrate(&Decay, &[1.0], &layout, &config).unwrap();
        let expected = (1.0 / 0.37_f64).ln();
        match &sol.status {
            Status::Terminated { s, .. } => assert!((s - expected).abs() < 1e-3),
            other => panic!("expected termination, got {:?}", other),
        }
    }

    #[test]
    fn max_step_bounds_sample_spacing() {
        let layout = layout_of(&["x"]);
        let mut config = IntegrationConfig::new((0.0, 1.0));
        config.max_step = 0.01;
        let sol = integrate(&Decay, &[1.0], &layout, &config).unwrap();
        assert_eq!(sol.status, Status::Completed);
        assert!(sol.s.len() >= 101);
        for pair in sol.s.windows(2) {
            assert!(pair[1] - pair[0] <= 0.01 + 1e-12);
        }
    }

    #[test]
    fn step_budget_failure_keeps_partial_trajectory() {
        let layout = layout_of(&["x", "v"]);
        let mut config = IntegrationConfig::new((0.0, 1000.0));
        config.max_steps = 10;
        let sol = integrate(&Oscillator, &[1.0, 0.0], &layout, &config).unwrap();
        match &sol.status {
            Status::Failed {
                error: GeodesicError::StepBudgetExhausted { max_steps, .. },
            } => assert_eq!(*max_steps, 10),
            other => panic!("expected budget exhaustion, got {:?}", other),
        }
        assert!(sol.s.len() >= 2);
        assert!(*sol.s.last().unwrap() < 1000.0);
    }

    #[test]
    fn blowup_fails_with_partial_trajectory() {
        let layout = layout_of(&["x"]);
        let config = IntegrationConfig::new((0.0, 2.0));
        let sol = integrate(&Quadratic, &[1.0], &layout, &config).unwrap();
        match &sol.status {
            Status::Failed {
                error: GeodesicError::SolverNonConvergence { s, .. },
            } => assert!((s - 1.0).abs() < 0.2),
            other => panic!("expected non-convergence near the blowup, got {:?}", other),
        }
        assert!(sol.s.len() >= 2);
        for state in &sol.states {
            assert!(state[0].is_finite());
        }
    }

    #[test]
    fn poisoned_rhs_reports_numeric_evaluation() {
        let layout = layout_of(&["x"]);
        let config = IntegrationConfig::new((0.0, 1.0));
        let sol = integrate(&Poisoned, &[1.0], &layout, &config).unwrap();
        match &sol.status {
            Status::Failed {
                error: GeodesicError::NumericEvaluation { component, .. },
            } => assert_eq!(*component, 0),
            other => panic!("expected numeric failure, got {:?}", other),
        }
        assert_eq!(sol.s.len(), 1);
        assert_eq!(sol.states.len(), 1);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let layout = layout_of(&["x"]);
        let mut config = IntegrationConfig::new((0.0, 0.0));
        assert!(matches!(
            integrate(&Decay, &[1.0], &layout, &config),
            Err(GeodesicError::InvalidConfig { .. })
        ));
        config = IntegrationConfig::new((0.0, 1.0));
        config.atol = 0.0;
        assert!(matches!(
            integrate(&Decay, &[1.0], &layout, &config),
            Err(GeodesicError::InvalidConfig { .. })
        ));
        config = IntegrationConfig::new((0.0, 1.0));
        config.first_step = Some(-0.1);
        assert!(matches!(
            integrate(&Decay, &[1.0], &layout, &config),
            Err(GeodesicError::InvalidConfig { .. })
        ));
        config = IntegrationConfig::new((0.0, 1.0));
        config.max_steps = 0;
        assert!(matches!(
            integrate(&Decay, &[1.0], &layout, &config),
            Err(GeodesicError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn shape_mismatches_are_rejected() {
        let config = IntegrationConfig::new((0.0, 1.0));
        let two = layout_of(&["x", "v"]);
        assert!(matches!(
            integrate(&Oscillator, &[1.0], &two, &config),
            Err(GeodesicError::ShapeMismatch { .. })
        ));
        let one = layout_of(&["x"]);
        assert!(matches!(
            integrate(&Oscillator, &[1.0, 0.0], &one, &config),
            Err(GeodesicError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn unknown_event_symbol_is_rejected_before_integration() {
        let layout = layout_of(&["x"]);
        let mut config = IntegrationConfig::new((0.0, 1.0));
        config.events = vec![Event::new("bad", parse("q").unwrap())];
        match integrate(&Decay, &[1.0], &layout, &config) {
            Err(GeodesicError::UnboundSymbol { symbol }) => assert_eq!(symbol, "q"),
            other => panic!("expected unbound symbol, got {:?}", other),
        }
    }
}
