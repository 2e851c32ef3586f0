use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::io::trajectory::{read_trajectory, StepRecord};

/// Default tolerance when deciding whether a trial reached a target energy.
pub const DEFAULT_TARGET_TOLERANCE: f64 = 1e-4;

/// Per-trial digest of one trajectory file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrajectorySummary {
    pub file: String,
    pub records: usize,
    pub last_iteration: usize,
    pub initial_energy: f64,
    pub min_energy: f64,
    pub min_iteration: usize,
    /// Temperature at which the minimum was first accepted.
    pub min_temperature: f64,
    /// `Some` only when a target energy was supplied.
    pub reached_target: Option<bool>,
}

/// A target counts as reached when the trial minimum is below it or within
/// `tolerance` of it.
pub fn reached(min_energy: f64, target: f64, tolerance: f64) -> bool {
    min_energy < target || (min_energy - target).abs() <= tolerance
}

/// Summarises records already in memory. `None` for an empty trajectory.
pub fn summarize(
    file: &str,
    records: &[StepRecord],
    target: Option<(f64, f64)>,
) -> Option<TrajectorySummary> {
    let first = records.first()?;
    let last = records.last()?;
    let min = records
        .iter()
        .fold(first, |m, r| if r.energy < m.energy { r } else { m });

    Some(TrajectorySummary {
        file: file.to_string(),
        records: records.len(),
        last_iteration: last.iteration,
        initial_energy: first.energy,
        min_energy: min.energy,
        min_iteration: min.iteration,
        min_temperature: min.temperature,
        reached_target: target.map(|(e, tol)| reached(min.energy, e, tol)),
    })
}

/// Reads and summarises each file in order, skipping empty ones.
pub fn summarize_files<P: AsRef<Path>>(
    paths: &[P],
    target: Option<(f64, f64)>,
) -> Result<Vec<TrajectorySummary>> {
    let mut out = Vec::with_capacity(paths.len());
    for p in paths {
        let p = p.as_ref();
        let records = read_trajectory(p)
            .with_context(|| format!("Failed to read trajectory {}", p.display()))?;
        match summarize(&p.display().to_string(), &records, target) {
            Some(s) => out.push(s),
            None => log::warn!("{} holds no records, skipped", p.display()),
        }
    }
    Ok(out)
}

/// Writes one CSV row per summary, with a header.
pub fn write_csv<W: Write>(summaries: &[TrajectorySummary], writer: W) -> Result<()> {
    let mut w = csv::Writer::from_writer(writer);
    for s in summaries {
        w.serialize(s).context("Failed to write summary row")?;
    }
    w.flush().context("Failed to flush summary")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(iteration: usize, temperature: f64, energy: f64) -> StepRecord {
        StepRecord {
            iteration,
            since_previous: 0,
            temperature,
            energy,
        }
    }

    #[test]
    fn test_summary_picks_first_minimum() {
        let recs = vec![
            rec(0, 10.0, -1.0),
            rec(4, 10.0, -1.5),
            rec(9, 5.0, -1.2),
            rec(20, 0.0, -1.5),
        ];
        let s = summarize("t", &recs, Some((-1.5, DEFAULT_TARGET_TOLERANCE))).unwrap();
        assert_eq!(s.min_iteration, 4);
        assert_eq!(s.last_iteration, 20);
        assert_eq!(s.reached_target, Some(true));
    }

    #[test]
    fn test_reached_tolerance() {
        assert!(reached(-1.49995, -1.5, 1e-4));
        assert!(!reached(-1.49, -1.5, 1e-4));
        assert!(reached(-1.6, -1.5, 1e-4));
    }

    #[test]
    fn test_csv_header_and_rows() {
        let s = summarize("a.out", &[rec(0, 1.0, -2.0)], None).unwrap();
        let mut buf = Vec::new();
        write_csv(&[s], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("file,records,last_iteration"));
        assert!(lines.next().unwrap().starts_with("a.out,1,0,"));
    }
}
