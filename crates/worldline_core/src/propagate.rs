//! End-to-end propagation.
//!
//! [`propagate`] runs the whole pipeline for one body: derive the geodesic
//! equations from the metric (cached on the metric), lower them against the
//! requested parameter values, integrate, and pack the samples into a
//! [`Body`].

use crate::body::Body;
use crate::driver::{integrate, IntegrationConfig};
use crate::error::GeodesicError;
use crate::lower::{GeodesicOde, ParamValues, StateLayout};
use crate::metric::Metric;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One propagation request: where the body starts and how to integrate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Propagation {
    /// Initial coordinate values, in chart order.
    pub initial_position: Vec<f64>,
    /// Initial velocities d(coordinate)/ds, in chart order.
    pub initial_velocity: Vec<f64>,
    pub params: ParamValues,
    pub config: IntegrationConfig,
}

pub fn propagate(metric: &Metric, request: &Propagation) -> Result<Body, GeodesicError> {
    let chart = metric.chart();
    let n = chart.dim();
    if request.initial_position.len() != n {
        return Err(GeodesicError::ShapeMismatch {
            what: "initial position".to_string(),
            expected: n,
            found: request.initial_position.len(),
        });
    }
    if request.initial_velocity.len() != n {
        return Err(GeodesicError::ShapeMismatch {
            what: "initial velocity".to_string(),
            expected: n,
            found: request.initial_velocity.len(),
        });
    }

    let system = metric.geodesics()?;
    let ode = GeodesicOde::lower(system, &request.params)?;
    let layout = StateLayout::for_chart(chart, &request.params);

    let mut y0 = Vec::with_capacity(2 * n);
    y0.extend_from_slice(&request.initial_position);
    y0.extend_from_slice(&request.initial_velocity);

    debug!(chart = chart.label(), span = ?request.config.span, "propagating geodesic");
    let solution = integrate(&ode, &y0, &layout, &request.config)?;
    Body::from_solution(chart.clone(), request.params.clone(), solution)
}
