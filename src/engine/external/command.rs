use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::domain::Structure;
use crate::engine::evaluator::EnergyOracle;
use crate::io::xyz;

/// Matches the last floating point number in the program output by default.
const DEFAULT_ENERGY_PATTERN: &str = r"([-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?)\s*$";

/// How to launch an external energy program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Regex whose first capture group is the energy. The last match wins.
    #[serde(default)]
    pub energy_pattern: Option<String>,
}

/// Evaluates structures with an external program.
///
/// Each call spawns the program, streams the structure as extended-XYZ on its
/// stdin and reads the energy from its stdout. This is the adapter for Python
/// backends such as a MEGNet formation-energy model wrapped in a small script.
pub struct CommandOracle {
    executable: String,
    args: Vec<String>,
    pattern: Regex,
    label: String,
}

impl CommandOracle {
    pub fn new(spec: &CommandSpec) -> Result<Self> {
        let raw = spec.energy_pattern.as_deref().unwrap_or(DEFAULT_ENERGY_PATTERN);
        let pattern = Regex::new(&format!("(?m){raw}"))
            .with_context(|| format!("Invalid energy pattern {raw:?}"))?;
        if pattern.captures_len() < 2 {
            bail!("Energy pattern {raw:?} needs a capture group");
        }
        Ok(Self {
            executable: spec.command.clone(),
            args: spec.args.clone(),
            pattern,
            label: format!("command ({})", spec.command),
        })
    }

    /// Executes the program via stdin/stdout piping.
    ///
    /// Stdin is fed from a scoped thread while stdout and stderr are drained, so
    /// a program that writes before reading cannot block on a full pipe.
    fn run_process(&self, input_data: &str) -> Result<String> {
        let mut child = Command::new(&self.executable)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn energy program {:?}", self.executable))?;

        let mut stdin = child
            .stdin
            .take()
            .context("Energy program stdin was not captured")?;

        let (output, fed) = thread::scope(|s| {
            let feeder = s.spawn(move || stdin.write_all(input_data.as_bytes()));
            let output = child.wait_with_output();
            (output, feeder.join())
        });
        let output = output.context("Failed to read energy program output")?;

        if !output.status.success() {
            let err_msg = String::from_utf8_lossy(&output.stderr);
            bail!("Energy program exited with {}: {}", output.status, err_msg.trim());
        }
        fed.map_err(|_| anyhow!("Stdin writer thread panicked"))?
            .context("Failed to write structure to energy program stdin")?;

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn parse_energy(&self, output: &str) -> Result<f64> {
        let raw = self
            .pattern
            .captures_iter(output.trim_end())
            .last()
            .and_then(|c| c.get(1))
            .ok_or_else(|| anyhow!("Could not find an energy in program output"))?;
        let val = raw
            .as_str()
            .parse::<f64>()
            .with_context(|| format!("Failed to parse energy {:?}", raw.as_str()))?;
        if !val.is_finite() {
            bail!("Energy program returned a non-finite energy");
        }
        Ok(val)
    }
}

impl EnergyOracle for CommandOracle {
    fn name(&self) -> &str {
        &self.label
    }

    fn evaluate(&self, structure: &Structure) -> Result<f64> {
        let input_str = xyz::format_extxyz(structure, None);
        let output_str = self.run_process(&input_str)?;
        self.parse_energy(&output_str)
    }
}
