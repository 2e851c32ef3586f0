use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::unbounded;

use mcsps::analysis::summary::{self, DEFAULT_TARGET_TOLERANCE};
use mcsps::engine::evaluator::EnergyOracle;
use mcsps::engine::external::command::CommandOracle;
use mcsps::interface::job::{Job, JobFile};
use mcsps::interface::progress::ProgressMonitor;
use mcsps::solvers::sps::Annealer;

// --- CLI Definitions ---

#[derive(Parser, Debug)]
#[command(author, version, about = "Stochastic site-permutation search on rigid lattices", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run one annealing trial described by a JSON job file
    Run {
        job: PathBuf,

        /// Random seed (overrides params.seed)
        #[arg(short, long)]
        seed: Option<u64>,

        /// Trajectory output (must not exist)
        #[arg(long)]
        swaps: Option<PathBuf>,

        /// Best-structure snapshot (extended XYZ)
        #[arg(long)]
        emin: Option<PathBuf>,

        /// Stop once the best energy is at or below this value
        #[arg(long, allow_hyphen_values = true)]
        stop: Option<f64>,

        /// Seconds between progress lines
        #[arg(long, default_value_t = 10)]
        report_every: u64,
    },

    /// Print a CSV summary of trajectory files
    Summarize {
        files: Vec<PathBuf>,

        /// Flag trials whose minimum reaches this energy
        #[arg(long, allow_hyphen_values = true)]
        min_energy: Option<f64>,

        #[arg(long, default_value_t = DEFAULT_TARGET_TOLERANCE)]
        tolerance: f64,
    },
}

fn run(
    job_path: &Path,
    overrides: (Option<u64>, Option<PathBuf>, Option<PathBuf>, Option<f64>),
    report_every: u64,
) -> Result<()> {
    let mut file = JobFile::load(job_path)?;
    let (seed, swaps, emin, stop) = overrides;
    file.apply_overrides(seed, swaps, emin, stop);

    let base = job_path.parent().unwrap_or_else(|| Path::new("."));
    let job = file.resolve(base)?;

    let oracle: Arc<dyn EnergyOracle> =
        Arc::new(CommandOracle::new(&file.oracle).context("Failed to set up energy oracle")?);

    // Solver on a worker thread, progress on this one
    let (tx, rx) = unbounded();
    let params = file.params.clone();
    let worker = thread::Builder::new()
        .name("SPS-Worker".to_string())
        .spawn(move || -> Result<String> {
            let mut annealer = Annealer::new(oracle, params).with_events(tx);
            let line = match job {
                Job::Fixed(input) => {
                    let s = annealer.run_fixed(&input)?;
                    format!(
                        "{:?} after {} iterations ({} accepted): best energy {}",
                        s.termination, s.iterations, s.accepted, s.best_energy
                    )
                }
                Job::Vacancy(input) => {
                    let s = annealer.run_vacancy(&input)?;
                    format!(
                        "{:?} after {} iterations ({} accepted): best energy {}",
                        s.termination, s.iterations, s.accepted, s.best_energy
                    )
                }
            };
            Ok(line)
        })
        .context("Failed to spawn solver thread")?;

    let mut monitor = ProgressMonitor::new(rx, Duration::from_secs(report_every.max(1)));
    monitor.drain();

    let line = worker
        .join()
        .map_err(|_| anyhow!("Solver thread panicked"))??;
    log::info!("{line}");
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match args.command {
        Cmd::Run {
            job,
            seed,
            swaps,
            emin,
            stop,
            report_every,
        } => run(&job, (seed, swaps, emin, stop), report_every),

        Cmd::Summarize {
            files,
            min_energy,
            tolerance,
        } => {
            let rows = summary::summarize_files(&files, min_energy.map(|e| (e, tolerance)))?;
            summary::write_csv(&rows, io::stdout().lock())
        }
    }
}
