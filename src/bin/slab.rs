//! Runner for the homogeneous-slab eigenvalue problem.
//!
//! Configures a one-dimensional slab transport cycle from the command line,
//! runs the selected restarted Arnoldi driver against it, and reports the
//! dominant eigenvalue estimate together with its accumulated statistics.
//! The per-iteration estimate and residual history can optionally be written
//! to a CSV file for convergence plots.

use anyhow::{Context, Result, anyhow};
use arnoldi_mc::geometry::{CrossSection, Geometry};
use arnoldi_mc::markov::{SignTreatment, TransportCycle};
use arnoldi_mc::operator::{MonteCarloOperator, TransportOperator};
use arnoldi_mc::solvers::RestartStrategy;
use arnoldi_mc::{SolverConfig, solve};
use clap::{Parser, ValueEnum};
use faer::Mat;
use serde::Serialize;
use std::path::PathBuf;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StrategyArg {
    Explicit,
    Implicit,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SignArg {
    Split,
    Single,
}

/// Command-line arguments for the slab runner.
#[derive(Parser, Debug)]
#[clap(
    name = "slab",
    about = "Estimates the dominant fission-source eigenpair of a homogeneous 1-D slab."
)]
struct SlabArgs {
    /// Number of spatial bins for the fission source density.
    #[clap(long, default_value_t = 50)]
    bins: usize,

    /// Slab width in mean free paths.
    #[clap(long, default_value_t = 20.0)]
    width: f64,

    /// Particle histories per transport cycle.
    #[clap(long, default_value_t = 100_000)]
    histories: usize,

    /// Arnoldi iterations per expansion cycle.
    #[clap(long, default_value_t = 10)]
    iterations: usize,

    /// Maximum number of expansion cycles.
    #[clap(long, default_value_t = 20)]
    restarts: usize,

    /// Number of eigenpairs to compute.
    #[clap(long, default_value_t = 1)]
    wanted: usize,

    /// Restart strategy.
    #[clap(long, value_enum, default_value_t = StrategyArg::Implicit)]
    strategy: StrategyArg,

    /// How negative source entries are transported.
    #[clap(long, value_enum, default_value_t = SignArg::Single)]
    sign: SignArg,

    /// Macroscopic scattering cross section.
    #[clap(long, default_value_t = 0.5)]
    scatter: f64,

    /// Macroscopic fission cross section.
    #[clap(long, default_value_t = 0.5)]
    fission: f64,

    /// Macroscopic capture cross section.
    #[clap(long, default_value_t = 0.0)]
    capture: f64,

    /// Mean neutrons per fission.
    #[clap(long, default_value_t = 1.0)]
    nu: f64,

    /// RNG seed for the transport cycle.
    #[clap(long, default_value_t = 1)]
    seed: u64,

    /// Optional CSV file for the per-iteration estimate history.
    #[clap(long, value_name = "PATH")]
    output: Option<PathBuf>,
}

/// One row of the convergence history CSV.
#[derive(Debug, Serialize)]
struct HistoryRow {
    iteration: usize,
    estimate_re: f64,
    estimate_im: f64,
    residual: f64,
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;

    let args = SlabArgs::parse();

    let geometry = Geometry::new(args.bins, 0.0, args.width)?;
    let xs = CrossSection::new(args.scatter, args.fission, args.capture, args.nu)?;
    let sign = match args.sign {
        SignArg::Split => SignTreatment::Split,
        SignArg::Single => SignTreatment::Single,
    };
    let cycle = TransportCycle::new(geometry, xs, args.histories, sign, args.seed)?;
    let mut operator = MonteCarloOperator::new(cycle);

    let config = SolverConfig {
        iterations: args.iterations,
        restarts: args.restarts,
        wanted: args.wanted,
        strategy: match args.strategy {
            StrategyArg::Explicit => RestartStrategy::Explicit,
            StrategyArg::Implicit => RestartStrategy::Implicit,
        },
        ..SolverConfig::default()
    };

    log::info!(
        "slab run: {} bins over [0, {}], {} histories/cycle, {:?} restarts",
        args.bins,
        args.width,
        args.histories,
        args.strategy
    );

    // A flat source is the standard cold start for a homogeneous slab.
    let initial = Mat::from_fn(operator.len(), 1, |_, _| 1.0);
    let output = solve(&mut operator, initial.as_ref(), &config)?;

    let stats = output.diagnostics.eigenvalue_stats;
    log::info!(
        "dominant eigenvalue: {:.6} (cycle mean {:.6} +/- {:.2e}, {} cycles)",
        output.dominant().re,
        stats.mean(),
        stats.std_of_mean(),
        stats.count()
    );
    log::info!(
        "converged: {} after {} operator applications ({} restarts)",
        output.converged,
        output.diagnostics.operator_applications,
        output.diagnostics.restarts_performed
    );
    let tallies = operator.cycle().tallies();
    log::info!(
        "leakage: {} left, {} right; {} histories rouletted",
        tallies.left_leakage,
        tallies.right_leakage,
        tallies.roulette_kills
    );

    if let Some(path) = &args.output {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to open output file {path:?}"))?;
        for (i, (estimate, residual)) in output
            .diagnostics
            .estimate_history
            .iter()
            .zip(&output.diagnostics.residual_history)
            .enumerate()
        {
            writer.serialize(HistoryRow {
                iteration: i + 1,
                estimate_re: estimate.re,
                estimate_im: estimate.im,
                residual: *residual,
            })?;
        }
        writer.flush()?;
        log::info!("history written to {path:?}");
    }

    Ok(())
}
