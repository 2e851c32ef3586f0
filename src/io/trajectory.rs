//! Append-only record of accepted Monte Carlo steps.
//!
//! One line per accepted iteration:
//! `iteration iterations_since_previous_acceptance temperature energy`.
//! Each line is flushed as soon as it is written so a killed run leaves a
//! readable prefix.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::{SpsError, SpsResult};

/// A single trajectory line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub iteration: usize,
    /// Iterations since the previous acceptance (0 for the initial record).
    pub since_previous: usize,
    pub temperature: f64,
    pub energy: f64,
}

impl fmt::Display for StepRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.iteration, self.since_previous, self.temperature, self.energy
        )
    }
}

impl StepRecord {
    fn parse(line: &str) -> Option<Self> {
        let mut it = line.split_whitespace();
        let rec = StepRecord {
            iteration: parse_count(it.next()?)?,
            since_previous: parse_count(it.next()?)?,
            temperature: it.next()?.parse().ok()?,
            energy: it.next()?.parse().ok()?,
        };
        if it.next().is_some() {
            return None;
        }
        Some(rec)
    }
}

/// Counts may have been written as floats ("12.0") by other tools.
fn parse_count(s: &str) -> Option<usize> {
    s.parse::<usize>().ok().or_else(|| {
        let v: f64 = s.parse().ok()?;
        (v >= 0.0 && v.fract() == 0.0).then_some(v as usize)
    })
}

/// Exclusive writer for one run's trajectory file.
#[derive(Debug)]
pub struct TrajectoryWriter {
    path: PathBuf,
    file: File,
    records: usize,
}

impl TrajectoryWriter {
    /// Fails with `OutputExists` if anything is already at `path`.
    pub fn ensure_absent(path: &Path) -> SpsResult<()> {
        if path.exists() {
            return Err(SpsError::OutputExists(path.to_path_buf()));
        }
        Ok(())
    }

    /// Creates the file (never truncating an existing one) and writes the
    /// initial record.
    pub fn create(path: &Path, initial: &StepRecord) -> SpsResult<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => SpsError::OutputExists(path.to_path_buf()),
                _ => SpsError::io(path, e),
            })?;
        let mut w = Self {
            path: path.to_path_buf(),
            file,
            records: 0,
        };
        w.append(initial)?;
        Ok(w)
    }

    pub fn append(&mut self, rec: &StepRecord) -> SpsResult<()> {
        let line = format!("{rec}\n");
        self.file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.flush())
            .map_err(|e| SpsError::io(&self.path, e))?;
        self.records += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records written so far, including the initial one.
    pub fn records(&self) -> usize {
        self.records
    }
}

/// Reads a trajectory file.
///
/// Every record is newline-terminated by the writer, so a final line without
/// a newline is a write still in progress and is skipped even if it parses.
/// Any other malformed line is an `Io` error of kind `InvalidData`.
pub fn read_trajectory(path: &Path) -> SpsResult<Vec<StepRecord>> {
    let text = fs::read_to_string(path).map_err(|e| SpsError::io(path, e))?;
    parse_trajectory(&text).map_err(|(lineno, line)| {
        SpsError::io(
            path,
            io::Error::new(
                ErrorKind::InvalidData,
                format!("line {lineno}: malformed trajectory record {line:?}"),
            ),
        )
    })
}

fn parse_trajectory(text: &str) -> Result<Vec<StepRecord>, (usize, String)> {
    let complete = text.ends_with('\n');
    let lines: Vec<&str> = text.lines().collect();
    let mut out = Vec::with_capacity(lines.len());

    for (i, line) in lines.iter().enumerate() {
        if !complete && i + 1 == lines.len() {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        match StepRecord::parse(line) {
            Some(rec) => out.push(rec),
            None => return Err((i + 1, line.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_format() {
        let r = StepRecord {
            iteration: 12,
            since_previous: 3,
            temperature: 100.0,
            energy: -0.25,
        };
        assert_eq!(r.to_string(), "12 3 100 -0.25");
        assert_eq!(StepRecord::parse(&r.to_string()), Some(r));
    }

    #[test]
    fn test_parse_accepts_float_counts() {
        let r = StepRecord::parse("4.0 2.0 30.0 -1.5").unwrap();
        assert_eq!(r.iteration, 4);
        assert_eq!(r.since_previous, 2);
    }

    #[test]
    fn test_partial_last_line_is_skipped() {
        let recs = parse_trajectory("0 0 10 -1\n5 5 10 -1.2\n9 4 1").unwrap();
        assert_eq!(recs.len(), 2);
    }

    #[test]
    fn test_truncated_last_line_is_skipped_even_if_it_parses() {
        // "5 5 10 -1.25" cut short inside the energy
        let recs = parse_trajectory("0 0 10 -1\n5 5 10 -1.2").unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].energy, -1.0);
    }

    #[test]
    fn test_malformed_file_is_data_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swaps.out");
        fs::write(&path, "0 0 10 -1\ngarbage\n5 5 10 -1.2\n").unwrap();

        let err = read_trajectory(&path).unwrap_err();
        assert!(!err.is_configuration());
        match err {
            SpsError::Io { source, .. } => assert_eq!(source.kind(), ErrorKind::InvalidData),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_writer_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swaps.out");
        let rec = |iteration, energy| StepRecord {
            iteration,
            since_previous: iteration,
            temperature: 0.0,
            energy,
        };

        let mut w = TrajectoryWriter::create(&path, &rec(0, -1.0)).unwrap();
        w.append(&rec(4, -1.5)).unwrap();
        assert_eq!(w.records(), 2);
        assert_eq!(w.path(), path.as_path());
        assert_eq!(read_trajectory(&path).unwrap(), vec![rec(0, -1.0), rec(4, -1.5)]);
    }

    #[test]
    fn test_malformed_interior_line_is_error() {
        let err = parse_trajectory("0 0 10 -1\ngarbage\n5 5 10 -1.2\n").unwrap_err();
        assert_eq!(err.0, 2);
    }
}
