//! Scenario subcommands.
//!
//! Each subcommand builds its metric symbolically, fills in the example
//! defaults (closed-form circular-orbit constants where the spacetime has
//! them), runs the pipeline, and exports the sampled trajectory.

use anyhow::{ensure, Result};
use clap::Args;
use std::f64::consts::{FRAC_PI_2, TAU};
use std::path::{Path, PathBuf};
use tracing::warn;
use worldline_core::chart::Chart;
use worldline_core::driver::{Direction, Event, IntegrationConfig, Status};
use worldline_core::expr::{Expr, Symbol};
use worldline_core::lower::ParamValues;
use worldline_core::metric::Metric;
use worldline_core::propagate::{propagate, Propagation};

use crate::output;

#[derive(Args)]
pub struct SchwarzschildArgs {
    /// Schwarzschild radius
    #[arg(long, default_value_t = 1.0)]
    pub rs: f64,

    /// Initial radius
    #[arg(long, default_value_t = 6.0)]
    pub ro: f64,

    /// Fall radially from rest instead of orbiting
    #[arg(long)]
    pub plunge: bool,

    /// Affine span [default: one orbital period, or twice the plunge time]
    #[arg(long)]
    pub span: Option<f64>,

    /// Append the coordinate-speed column to the CSV
    #[arg(long)]
    pub speed: bool,

    /// Output CSV path
    #[arg(long, default_value = "outputs/schwarzschild.csv")]
    pub output: PathBuf,
}

#[derive(Args)]
pub struct KerrArgs {
    /// Schwarzschild radius
    #[arg(long, default_value_t = 1.0)]
    pub rs: f64,

    /// Spin parameter; a horizon exists for |a| <= rs/2
    #[arg(long, default_value_t = 0.4, allow_hyphen_values = true)]
    pub spin: f64,

    /// Initial radius [default: 5 rs]
    #[arg(long)]
    pub ro: Option<f64>,

    /// Initial polar angle; small values give the near-axis plunge
    #[arg(long, default_value_t = FRAC_PI_2)]
    pub theta0: f64,

    /// Initial d(t)/ds
    #[arg(long, default_value_t = 1.0, allow_hyphen_values = true)]
    pub ut: f64,

    /// Initial d(phi)/ds
    #[arg(long, default_value_t = -0.02, allow_hyphen_values = true)]
    pub uphi: f64,

    /// Affine span
    #[arg(long, default_value_t = 1000.0)]
    pub span: f64,

    /// Step-size ceiling
    #[arg(long, default_value_t = 1.0)]
    pub max_step: f64,

    /// Append the coordinate-speed column to the CSV
    #[arg(long)]
    pub speed: bool,

    /// Output CSV path
    #[arg(long, default_value = "outputs/kerr.csv")]
    pub output: PathBuf,
}

#[derive(Args)]
pub struct SitterArgs {
    /// Schwarzschild radius
    #[arg(long, default_value_t = 1.0)]
    pub rs: f64,

    /// Initial radius
    #[arg(long, default_value_t = 6.0)]
    pub ro: f64,

    /// Cosmological constant
    #[arg(long, default_value_t = 1.11e-52)]
    pub lambda: f64,

    /// Time-velocity constant k [default: closed-form circular value]
    #[arg(long, allow_hyphen_values = true)]
    pub k: Option<f64>,

    /// Angular-momentum constant h [default: closed-form circular value]
    #[arg(long, allow_hyphen_values = true)]
    pub h: Option<f64>,

    /// Affine span [default: the corrected Kepler period]
    #[arg(long)]
    pub span: Option<f64>,

    /// Append the coordinate-speed column to the CSV
    #[arg(long)]
    pub speed: bool,

    /// Output CSV path
    #[arg(long, default_value = "outputs/sitter.csv")]
    pub output: PathBuf,
}

#[derive(Args)]
pub struct MondArgs {
    /// Central mass
    #[arg(long, default_value_t = 1.0)]
    pub mass: f64,

    /// Initial radius
    #[arg(long, default_value_t = 1e5)]
    pub ro: f64,

    /// MOND acceleration scale [default: sqrt(1.11e-52 / 3)]
    #[arg(long)]
    pub ao: Option<f64>,

    /// Time-velocity constant k [default: closed-form circular value]
    #[arg(long, allow_hyphen_values = true)]
    pub k: Option<f64>,

    /// Angular-momentum constant h [default: closed-form circular value]
    #[arg(long, allow_hyphen_values = true)]
    pub h: Option<f64>,

    /// Affine span [default: the Kepler period]
    #[arg(long)]
    pub span: Option<f64>,

    /// Append the coordinate-speed column to the CSV
    #[arg(long)]
    pub speed: bool,

    /// Output CSV path
    #[arg(long, default_value = "outputs/mond.csv")]
    pub output: PathBuf,
}

fn schwarzschild_metric() -> Result<Metric> {
    let chart = Chart::spherical();
    let r = Expr::from(chart.coord(1));
    let theta = Expr::from(chart.coord(2));
    let rs = Expr::sym("rs");
    let f = 1.0 - rs / &r;
    Ok(Metric::diagonal(
        chart,
        vec![
            f.clone(),
            -1.0 / f,
            -(r.clone() * &r),
            -(r.clone() * &r * theta.clone().sin() * theta.sin()),
        ],
        vec![Symbol::new("rs")],
    )?)
}

fn kerr_metric() -> Result<Metric> {
    let chart = Chart::spherical();
    let r = Expr::from(chart.coord(1));
    let theta = Expr::from(chart.coord(2));
    let rs = Expr::sym("rs");
    let a = Expr::sym("a");
    let sin2 = theta.clone().sin() * theta.clone().sin();
    let p = r.clone() * &r + a.clone() * &a * theta.clone().cos() * theta.cos();
    let pp = p.clone() * &p;
    let delta = r.clone() * &r + a.clone() * &a - r.clone() * &rs;
    let g_tphi = a.clone() * &r * &rs * &sin2 / &pp;
    let rows = vec![
        vec![
            1.0 - rs.clone() * &r / &pp,
            Expr::zero(),
            Expr::zero(),
            g_tphi.clone(),
        ],
        vec![
            Expr::zero(),
            -(pp.clone() / &delta),
            Expr::zero(),
            Expr::zero(),
        ],
        vec![Expr::zero(), Expr::zero(), -pp.clone(), Expr::zero()],
        vec![
            g_tphi,
            Expr::zero(),
            Expr::zero(),
            -((r.clone() * &r + a.clone() * &a + a.clone() * &a * &r * &rs * &sin2 / &pp)
                * &sin2),
        ],
    ];
    Ok(Metric::new(
        chart,
        rows,
        vec![Symbol::new("rs"), Symbol::new("a")],
    )?)
}

fn sitter_metric() -> Result<Metric> {
    let chart = Chart::spherical();
    let r = Expr::from(chart.coord(1));
    let theta = Expr::from(chart.coord(2));
    let rs = Expr::sym("rs");
    let lam = Expr::sym("lambda");
    Ok(Metric::diagonal(
        chart,
        vec![
            1.0 - rs.clone() / &r - lam.clone() * &r * &r / 3.0,
            1.0 / (lam.clone() * &r * &r / 3.0 + rs.clone() / &r - 1.0),
            -(r.clone() * &r),
            -(r.clone() * &r * theta.clone().sin() * theta.sin()),
        ],
        vec![Symbol::new("rs"), Symbol::new("lambda")],
    )?)
}

fn mond_metric() -> Result<Metric> {
    let chart = Chart::spherical();
    let r = Expr::from(chart.coord(1));
    let theta = Expr::from(chart.coord(2));
    let m = Expr::sym("m");
    let ao = Expr::sym("ao");
    let f = 1.0 + (m.clone() * &ao).sqrt() * r.clone().ln();
    Ok(Metric::diagonal(
        chart,
        vec![
            f.clone(),
            -(1.0 / f),
            -(r.clone() * &r),
            -(r.clone() * &r * theta.clone().sin() * theta.sin()),
        ],
        vec![Symbol::new("m"), Symbol::new("ao")],
    )?)
}

/// Circular-orbit constants (k, h) for Schwarzschild.
fn schwarzschild_circ(rs: f64, ro: f64) -> (f64, f64) {
    let k = (1.0 - rs / ro) / (1.0 - 1.5 * rs / ro).sqrt();
    let h = ro * (rs / (2.0 * ro - 3.0 * rs)).sqrt();
    (k, h)
}

/// Circular-orbit constants (k, h) with the cosmological-constant terms.
fn sitter_circ(rs: f64, ro: f64, lam: f64) -> (f64, f64) {
    let k = (1.0 - rs / ro - lam * ro * ro / 3.0) / (1.0 - 1.5 * rs / ro).sqrt();
    let h = ((rs / (2.0 * ro.powi(3)) - lam / 3.0)
        / ((1.0 / ro.powi(4)) * (1.0 - 1.5 * rs / ro)))
        .sqrt();
    (k, h)
}

/// Circular-orbit constants (k, h) for the MOND metric, reference radius 1.
fn mond_circ(mass: f64, ro: f64, ao: f64) -> (f64, f64) {
    let g = (mass * ao).sqrt();
    let root = (1.0 - g / 2.0 + g * ro.ln()).sqrt();
    let k = (1.0 - g * ro.ln()) / root;
    let h = (g / 2.0).sqrt() * ro / root;
    (k, h)
}

fn run_scenario(
    metric: &Metric,
    request: &Propagation,
    output_path: &Path,
    with_speed: bool,
    verbose: u8,
) -> Result<()> {
    if verbose >= 1 {
        println!("Geodesic differential equations:");
        println!("{}", metric.geodesics()?);
    }
    let body = propagate(metric, request)?;
    match body.status() {
        Status::Completed => println!("completed: {} samples", body.len()),
        Status::Terminated { event, s, .. } => {
            println!(
                "terminated by '{event}' at s = {s:.6} ({} samples)",
                body.len()
            )
        }
        Status::Failed { error } => {
            println!("failed: {error} ({} partial samples kept)", body.len())
        }
    }
    output::write_csv(output_path, &body, with_speed)?;
    println!("wrote {}", output_path.display());
    Ok(())
}

pub fn schwarzschild(args: &SchwarzschildArgs, verbose: u8) -> Result<()> {
    ensure!(args.rs > 0.0, "rs must be positive");
    ensure!(args.ro > args.rs, "the body must start outside the horizon");
    let metric = schwarzschild_metric()?;

    let pos = vec![0.0, args.ro, FRAC_PI_2, 0.0];
    let (vel, span, events) = if args.plunge {
        let u_t = 1.0 / (1.0 - args.rs / args.ro).sqrt();
        let span = args
            .span
            .unwrap_or_else(|| TAU * (args.ro.powi(3) / (8.0 * args.rs)).sqrt());
        let r = Expr::from(metric.chart().coord(1));
        let horizon = Event::new("horizon", r - 1.01 * Expr::sym("rs"))
            .with_direction(Direction::Falling);
        (vec![u_t, 0.0, 0.0, 0.0], span, vec![horizon])
    } else {
        ensure!(
            args.ro > 1.5 * args.rs,
            "no circular orbit at or below the photon sphere"
        );
        let (k, h) = schwarzschild_circ(args.rs, args.ro);
        let vel = vec![
            k / (1.0 - args.rs / args.ro),
            0.0,
            0.0,
            h / (args.ro * args.ro),
        ];
        let span = args.span.unwrap_or(TAU * args.ro * args.ro / h);
        (vel, span, Vec::new())
    };

    let mut config = IntegrationConfig::new((0.0, span));
    config.max_step = span * 1e-3;
    config.events = events;
    let request = Propagation {
        initial_position: pos,
        initial_velocity: vel,
        params: ParamValues::new().with("rs", args.rs),
        config,
    };
    run_scenario(&metric, &request, &args.output, args.speed, verbose)
}

pub fn kerr(args: &KerrArgs, verbose: u8) -> Result<()> {
    ensure!(args.rs > 0.0, "rs must be positive");
    let ro = args.ro.unwrap_or(5.0 * args.rs);
    ensure!(ro > 0.0, "initial radius must be positive");
    let metric = kerr_metric()?;

    let mut events = Vec::new();
    let disc = args.rs * args.rs - 4.0 * args.spin * args.spin;
    if disc >= 0.0 {
        let outer = 0.5 * (args.rs + disc.sqrt());
        let r = Expr::from(metric.chart().coord(1));
        events.push(
            Event::new("horizon", r - 1.01 * outer).with_direction(Direction::Falling),
        );
    } else {
        warn!("spin exceeds rs/2: no horizon, running without a termination event");
    }

    let mut config = IntegrationConfig::new((0.0, args.span));
    config.max_step = args.max_step;
    config.events = events;
    let request = Propagation {
        initial_position: vec![0.0, ro, args.theta0, 0.0],
        initial_velocity: vec![args.ut, 0.0, 0.0, args.uphi],
        params: ParamValues::new()
            .with("rs", args.rs)
            .with("a", args.spin),
        config,
    };
    run_scenario(&metric, &request, &args.output, args.speed, verbose)
}

pub fn sitter(args: &SitterArgs, verbose: u8) -> Result<()> {
    ensure!(args.rs > 0.0, "rs must be positive");
    ensure!(
        args.ro > 1.5 * args.rs,
        "no circular orbit at or below the photon sphere"
    );
    let metric = sitter_metric()?;

    let (kc, hc) = sitter_circ(args.rs, args.ro, args.lambda);
    let k = args.k.unwrap_or(kc);
    let h = args.h.unwrap_or(hc);
    ensure!(
        k.is_finite() && h.is_finite(),
        "no circular orbit for these parameters"
    );
    let span = args.span.unwrap_or_else(|| {
        TAU / (args.rs / (2.0 * args.ro.powi(3)) - args.lambda / 3.0).sqrt()
    });

    let mut config = IntegrationConfig::new((0.0, span));
    config.max_step = span * 1e-3;
    let request = Propagation {
        initial_position: vec![0.0, args.ro, FRAC_PI_2, 0.0],
        initial_velocity: vec![
            k / (1.0 - args.rs / args.ro),
            0.0,
            0.0,
            h / (args.ro * args.ro),
        ],
        params: ParamValues::new()
            .with("rs", args.rs)
            .with("lambda", args.lambda),
        config,
    };
    run_scenario(&metric, &request, &args.output, args.speed, verbose)
}

pub fn mond(args: &MondArgs, verbose: u8) -> Result<()> {
    ensure!(args.mass > 0.0, "mass must be positive");
    ensure!(args.ro > 0.0, "initial radius must be positive");
    let ao = args.ao.unwrap_or_else(|| (1.11e-52_f64 / 3.0).sqrt());
    let metric = mond_metric()?;

    let (kc, hc) = mond_circ(args.mass, args.ro, ao);
    let k = args.k.unwrap_or(kc);
    let h = args.h.unwrap_or(hc);
    ensure!(
        k.is_finite() && h.is_finite(),
        "no circular orbit for these parameters"
    );
    let span = args.span.unwrap_or_else(|| {
        TAU * args.ro / ((2.0 * args.mass).sqrt() * (1.0 + 2.0 * args.mass * args.ro.ln()).sqrt())
    });

    let g = (args.mass * ao).sqrt();
    let mut config = IntegrationConfig::new((0.0, span));
    config.max_step = span * 1e-3;
    let request = Propagation {
        initial_position: vec![0.0, args.ro, FRAC_PI_2, 0.0],
        initial_velocity: vec![
            k / (1.0 + g * args.ro.ln()),
            0.0,
            0.0,
            h / (args.ro * args.ro),
        ],
        params: ParamValues::new()
            .with("m", args.mass)
            .with("ao", ao),
        config,
    };
    run_scenario(&metric, &request, &args.output, args.speed, verbose)
}
