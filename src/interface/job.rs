//! JSON job files for the command-line driver.
//!
//! ```json
//! {
//!   "lattice": [[5.75, 0, 0], [0, 5.75, 0], [0, 0, 5.75]],
//!   "species": ["Ga", "As"],
//!   "positions": [[0, 0, 0], [0.25, 0.25, 0.25]],
//!   "supercell": [3, 3, 3],
//!   "shuffle": true,
//!   "mode": { "fixed": { "nfixed": 0 } },
//!   "schedule": { "linear": { "start": 100, "end": 0, "steps": 200, "swaps": 5 } },
//!   "params": { "swap_path": "swaps.out", "seed": 1234 },
//!   "oracle": { "command": "python", "args": ["megnet_eform.py"] }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use nalgebra::Point3;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;

use crate::core::domain::{LatticeFrame, SpsParams, TemperatureSchedule};
use crate::core::spatial;
use crate::engine::external::command::CommandSpec;
use crate::io::xyz;
use crate::solvers::sps::{FixedInput, VacancyInput};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeSpec {
    /// Every position is occupied.
    Fixed {
        #[serde(default)]
        nfixed: usize,
    },
    /// Positions beyond `nfixed` are vacancy-eligible sites; there may be more
    /// of them than remaining species.
    Vacancy {
        #[serde(default)]
        nfixed: usize,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleSpec {
    Explicit {
        temperatures: Vec<f64>,
        #[serde(default)]
        swaps: Vec<usize>,
    },
    Linear {
        start: f64,
        end: f64,
        steps: usize,
        swaps: usize,
    },
}

impl ScheduleSpec {
    /// Raw sequences; length checks happen when the run is prepared.
    fn sequences(&self) -> Result<(Vec<f64>, Vec<usize>)> {
        match self {
            ScheduleSpec::Explicit {
                temperatures,
                swaps,
            } => Ok((temperatures.clone(), swaps.clone())),
            ScheduleSpec::Linear {
                start,
                end,
                steps,
                swaps,
            } => {
                let s = TemperatureSchedule::linear(*start, *end, *steps, *swaps)?;
                Ok(s.iter().unzip())
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobFile {
    /// Inline geometry; ignored when `structure` is set.
    #[serde(default)]
    pub lattice: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub species: Option<Vec<String>>,
    #[serde(default)]
    pub positions: Option<Vec<[f64; 3]>>,
    /// Extended-XYZ file providing lattice, species and positions.
    #[serde(default)]
    pub structure: Option<PathBuf>,
    /// Replicate the cell. Species are replicated too when they match the
    /// unit-cell positions one to one; otherwise they describe the supercell.
    #[serde(default)]
    pub supercell: Option<[usize; 3]>,
    /// Shuffle the mobile species before the run (seeded from `params.seed`).
    #[serde(default)]
    pub shuffle: bool,
    pub mode: ModeSpec,
    pub schedule: ScheduleSpec,
    #[serde(default)]
    pub params: SpsParams,
    pub oracle: CommandSpec,
}

/// A resolved run description.
#[derive(Debug, Clone)]
pub enum Job {
    Fixed(FixedInput),
    Vacancy(VacancyInput),
}

impl JobFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read job file {}", path.display()))?;
        let job: JobFile = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse job file {}", path.display()))?;
        Ok(job)
    }

    /// Relative structure paths are taken relative to `base`.
    pub fn resolve(&self, base: &Path) -> Result<Job> {
        let (lattice, mut species, positions) = self.geometry(base)?;
        let rows: Vec<Vec<f64>> = lattice.rows().iter().map(|r| r.to_vec()).collect();
        let raw: Vec<[f64; 3]> = positions.iter().map(|p| [p.x, p.y, p.z]).collect();
        let (temperatures, swaps) = self.schedule.sequences()?;

        let nfixed = match self.mode {
            ModeSpec::Fixed { nfixed } | ModeSpec::Vacancy { nfixed } => nfixed,
        };
        if nfixed > species.len() {
            bail!("nfixed = {nfixed} exceeds the {} species given", species.len());
        }
        if self.shuffle {
            let mut rng = ChaCha8Rng::seed_from_u64(self.params.seed);
            // Independent of the stream the annealer draws from
            rng.set_stream(1);
            species[nfixed..].shuffle(&mut rng);
        }

        Ok(match self.mode {
            ModeSpec::Fixed { nfixed } => Job::Fixed(FixedInput {
                lattice: rows,
                species,
                positions: raw,
                temperatures,
                swaps,
                nfixed,
            }),
            ModeSpec::Vacancy { nfixed } => {
                if nfixed > raw.len() {
                    bail!("nfixed = {nfixed} exceeds the {} positions given", raw.len());
                }
                let (fixed_species, fixed_positions) = if nfixed > 0 {
                    (
                        Some(species[..nfixed].to_vec()),
                        Some(raw[..nfixed].to_vec()),
                    )
                } else {
                    (None, None)
                };
                Job::Vacancy(VacancyInput {
                    lattice: rows,
                    vacancy_species: species[nfixed..].to_vec(),
                    vacancy_positions: raw[nfixed..].to_vec(),
                    temperatures,
                    swaps,
                    fixed_species,
                    fixed_positions,
                })
            }
        })
    }

    fn geometry(&self, base: &Path) -> Result<(LatticeFrame, Vec<String>, Vec<Point3<f64>>)> {
        let (lattice, species, positions) = match &self.structure {
            Some(p) => {
                let path = if p.is_absolute() { p.clone() } else { base.join(p) };
                let s = xyz::read_extxyz(&path)?;
                (s.lattice, s.species, s.positions)
            }
            None => {
                let (Some(l), Some(sp), Some(pos)) = (&self.lattice, &self.species, &self.positions)
                else {
                    bail!("Job needs either `structure` or all of `lattice`, `species`, `positions`");
                };
                let lattice = LatticeFrame::from_rows(l)?;
                let positions = pos.iter().map(|p| Point3::new(p[0], p[1], p[2])).collect();
                (lattice, sp.clone(), positions)
            }
        };

        let Some(nsc) = self.supercell else {
            return Ok((lattice, species, positions));
        };
        let replicate = species.len() == positions.len();
        let (big, big_pos, big_species) = spatial::create_supercell(
            &lattice,
            &positions,
            replicate.then_some(species.as_slice()),
            nsc,
        )?;
        Ok((big, big_species.unwrap_or(species), big_pos))
    }

    /// Applies command-line overrides on top of the file's parameters.
    pub fn apply_overrides(
        &mut self,
        seed: Option<u64>,
        swap_path: Option<PathBuf>,
        emin_path: Option<PathBuf>,
        stop: Option<f64>,
    ) {
        if let Some(s) = seed {
            self.params.seed = s;
        }
        if let Some(p) = swap_path {
            self.params.swap_path = p;
        }
        if let Some(p) = emin_path {
            self.params.emin_path = Some(p);
        }
        if stop.is_some() {
            self.params.stop = stop;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAAS: &str = r#"{
        "lattice": [[0, 2.875, 2.875], [2.875, 0, 2.875], [2.875, 2.875, 0]],
        "species": ["Ga", "As"],
        "positions": [[0, 0, 0], [0.25, 0.25, 0.25]],
        "supercell": [3, 3, 3],
        "shuffle": true,
        "mode": { "fixed": {} },
        "schedule": { "linear": { "start": 100, "end": 0, "steps": 200, "swaps": 5 } },
        "params": { "seed": 1234 },
        "oracle": { "command": "megnet-eform" }
    }"#;

    #[test]
    fn test_fixed_job_with_supercell() {
        let job: JobFile = serde_json::from_str(GAAS).unwrap();
        let Job::Fixed(input) = job.resolve(Path::new(".")).unwrap() else {
            panic!("expected a fixed job");
        };
        assert_eq!(input.species.len(), 54);
        assert_eq!(input.positions.len(), 54);
        assert_eq!(input.species.iter().filter(|s| *s == "Ga").count(), 27);
        assert_eq!(input.temperatures.len(), 200);
        assert_eq!(input.swaps, vec![5; 200]);
        // Unspecified params keep their defaults
        assert_eq!(job.params.nswap_inc, 1000);
    }

    #[test]
    fn test_shuffle_is_reproducible() {
        let job: JobFile = serde_json::from_str(GAAS).unwrap();
        let (Job::Fixed(a), Job::Fixed(b)) = (
            job.resolve(Path::new(".")).unwrap(),
            job.resolve(Path::new(".")).unwrap(),
        ) else {
            panic!("expected fixed jobs");
        };
        assert_eq!(a.species, b.species);
    }

    #[test]
    fn test_vacancy_job_splits_fixed_prefix() {
        let text = r#"{
            "lattice": [[6.29, 0, 0], [0, 6.29, 0], [0, 0, 6.29]],
            "species": ["Cs", "Sn", "I"],
            "positions": [[0, 0, 0], [0.5, 0.5, 0.5], [0.5, 0.5, 0], [0.5, 0, 0.5]],
            "mode": { "vacancy": { "nfixed": 1 } },
            "schedule": { "explicit": { "temperatures": [0], "swaps": [3000] } },
            "oracle": { "command": "megnet-eform" }
        }"#;
        let job: JobFile = serde_json::from_str(text).unwrap();
        let Job::Vacancy(input) = job.resolve(Path::new(".")).unwrap() else {
            panic!("expected a vacancy job");
        };
        assert_eq!(input.fixed_species, Some(vec!["Cs".to_string()]));
        assert_eq!(input.vacancy_species.len(), 2);
        assert_eq!(input.vacancy_positions.len(), 3);
    }
}
