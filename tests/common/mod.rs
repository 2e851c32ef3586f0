#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use mcsps::core::domain::Structure;
use mcsps::engine::evaluator::EnergyOracle;

pub fn labels(s: &[&str]) -> Vec<String> {
    s.iter().map(|x| x.to_string()).collect()
}

pub fn cubic(a: f64) -> Vec<Vec<f64>> {
    vec![vec![a, 0.0, 0.0], vec![0.0, a, 0.0], vec![0.0, 0.0, a]]
}

/// `n` sites spread along x.
pub fn line_sites(n: usize) -> Vec<[f64; 3]> {
    (0..n).map(|i| [i as f64 / n as f64, 0.0, 0.0]).collect()
}

/// Looks the energy up by species arrangement. Unknown arrangements are an error.
/// Every returned energy is remembered.
pub struct TableOracle {
    table: HashMap<Vec<String>, f64>,
    pub visited: Mutex<Vec<f64>>,
}

impl TableOracle {
    pub fn new(entries: &[(&[&str], f64)]) -> Self {
        Self {
            table: entries.iter().map(|(k, e)| (labels(k), *e)).collect(),
            visited: Mutex::new(Vec::new()),
        }
    }
}

impl EnergyOracle for TableOracle {
    fn evaluate(&self, s: &Structure) -> Result<f64> {
        let Some(&e) = self.table.get(&s.species) else {
            bail!("arrangement {:?} not in table", s.species);
        };
        self.visited.lock().unwrap().push(e);
        Ok(e)
    }

    fn name(&self) -> &str {
        "table"
    }
}

/// Deterministic pseudo-energy from species labels and positions. Like labels
/// on neighbouring x coordinates cost energy, so there is a real ordering to find.
pub struct OrderingOracle;

impl EnergyOracle for OrderingOracle {
    fn evaluate(&self, s: &Structure) -> Result<f64> {
        let mut atoms: Vec<(f64, &str)> = s
            .positions
            .iter()
            .zip(&s.species)
            .map(|(p, l)| (p.x, l.as_str()))
            .collect();
        atoms.sort_by(|a, b| a.0.total_cmp(&b.0));
        let like = atoms.windows(2).filter(|w| w[0].1 == w[1].1).count();
        let spread: f64 = atoms.iter().map(|(x, _)| x).sum();
        Ok(0.1 * like as f64 - 0.01 * spread)
    }

    fn name(&self) -> &str {
        "ordering"
    }
}

/// Returns the same energy for every structure.
pub struct ConstantOracle(pub f64);

impl EnergyOracle for ConstantOracle {
    fn evaluate(&self, _: &Structure) -> Result<f64> {
        Ok(self.0)
    }

    fn name(&self) -> &str {
        "constant"
    }
}

/// Each call returns a strictly lower energy than the previous one.
#[derive(Default)]
pub struct DescendingOracle {
    calls: AtomicUsize,
}

impl EnergyOracle for DescendingOracle {
    fn evaluate(&self, _: &Structure) -> Result<f64> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(-(n as f64))
    }

    fn name(&self) -> &str {
        "descending"
    }
}

/// Returns `high` for the first `plateau` calls and `low` afterwards.
pub struct PlateauOracle {
    plateau: usize,
    high: f64,
    low: f64,
    calls: AtomicUsize,
}

impl PlateauOracle {
    pub fn new(plateau: usize, high: f64, low: f64) -> Self {
        Self {
            plateau,
            high,
            low,
            calls: AtomicUsize::new(0),
        }
    }
}

impl EnergyOracle for PlateauOracle {
    fn evaluate(&self, _: &Structure) -> Result<f64> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(if n < self.plateau { self.high } else { self.low })
    }

    fn name(&self) -> &str {
        "plateau"
    }
}

/// Counts calls and optionally fails once `fail_after` calls have succeeded.
pub struct CountingOracle<O> {
    inner: O,
    pub calls: AtomicUsize,
    fail_after: Option<usize>,
}

impl<O> CountingOracle<O> {
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            fail_after: None,
        }
    }

    pub fn failing_after(inner: O, n: usize) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            fail_after: Some(n),
        }
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<O: EnergyOracle> EnergyOracle for CountingOracle<O> {
    fn evaluate(&self, s: &Structure) -> Result<f64> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.fail_after {
            if n >= limit {
                bail!("model crashed on call {}", n + 1);
            }
        }
        self.inner.evaluate(s)
    }

    fn name(&self) -> &str {
        "counting"
    }
}

/// Records every structure it is asked to evaluate.
pub struct RecordingOracle<O> {
    inner: O,
    pub seen: Mutex<Vec<Structure>>,
}

impl<O> RecordingOracle<O> {
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl<O: EnergyOracle> EnergyOracle for RecordingOracle<O> {
    fn evaluate(&self, s: &Structure) -> Result<f64> {
        self.seen.lock().unwrap().push(s.clone());
        self.inner.evaluate(s)
    }

    fn name(&self) -> &str {
        "recording"
    }
}
