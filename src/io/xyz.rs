//! Extended-XYZ structure files.
//!
//! Positions are Cartesian in the file and fractional in memory. The lattice is
//! written as `Lattice="R1x R1y R1z R2x ... R3z"` (rows, row-major).

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use nalgebra::Point3;
use regex::Regex;

use crate::core::domain::{LatticeFrame, Structure};
use crate::core::error::{SpsError, SpsResult};

/// Renders one frame. `energy` is stored as an `energy=` key when present.
pub fn format_extxyz(structure: &Structure, energy: Option<f64>) -> String {
    let mut s = String::with_capacity(64 * (structure.len() + 2));

    let lattice = structure
        .lattice
        .rows()
        .iter()
        .flat_map(|r| r.iter())
        .map(|v| format!("{v:.8}"))
        .collect::<Vec<_>>()
        .join(" ");

    let _ = writeln!(s, "{}", structure.len());
    let _ = write!(s, "Lattice=\"{lattice}\" Properties=species:S:1:pos:R:3");
    if let Some(e) = energy {
        let _ = write!(s, " energy={e}");
    }
    let _ = writeln!(s, " pbc=\"T T T\"");

    for (label, p) in structure.species.iter().zip(structure.cartesian_positions()) {
        let _ = writeln!(s, "{:<3} {:16.8} {:16.8} {:16.8}", label, p.x, p.y, p.z);
    }
    s
}

/// Writes a frame, replacing `path` atomically via a sibling temp file.
pub fn write_extxyz(path: &Path, structure: &Structure, energy: Option<f64>) -> SpsResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = Path::new(&tmp);

    fs::write(tmp, format_extxyz(structure, energy)).map_err(|e| SpsError::io(tmp, e))?;
    fs::rename(tmp, path).map_err(|e| SpsError::io(path, e))
}

/// Reads the first frame of an extended-XYZ file.
pub fn read_extxyz(path: &Path) -> SpsResult<Structure> {
    let text = fs::read_to_string(path).map_err(|e| SpsError::io(path, e))?;
    parse_extxyz(&text).map_err(|msg| SpsError::config(format!("{}: {}", path.display(), msg)))
}

/// Column layout declared by `Properties=name:type:ncols:...`.
fn property_columns(comment: &str) -> Result<(usize, usize), String> {
    let re = Regex::new(r"Properties=(\S+)").map_err(|e| e.to_string())?;
    let Some(cap) = re.captures(comment) else {
        // Plain XYZ: species then x y z
        return Ok((0, 1));
    };
    let fields: Vec<&str> = cap[1].split(':').collect();
    if fields.len() % 3 != 0 {
        return Err(format!("malformed Properties {:?}", &cap[1]));
    }

    let (mut species, mut pos) = (None, None);
    let mut col = 0;
    for chunk in fields.chunks(3) {
        let width: usize = chunk[2]
            .parse()
            .map_err(|_| format!("bad column count in Properties {:?}", &cap[1]))?;
        match chunk[0] {
            "species" => species = Some(col),
            "pos" if width == 3 => pos = Some(col),
            _ => {}
        }
        col += width;
    }
    match (species, pos) {
        (Some(s), Some(p)) => Ok((s, p)),
        _ => Err("Properties must declare species and pos:R:3".into()),
    }
}

fn parse_extxyz(text: &str) -> Result<Structure, String> {
    let mut lines = text.lines();
    let n: usize = lines
        .next()
        .and_then(|l| l.trim().parse().ok())
        .ok_or("first line must hold the atom count")?;
    let comment = lines.next().ok_or("missing comment line")?;

    let re = Regex::new(r#"Lattice="([^"]*)""#).map_err(|e| e.to_string())?;
    let cap = re
        .captures(comment)
        .ok_or("comment line has no Lattice=\"...\" entry")?;
    let values: Vec<f64> = cap[1]
        .split_whitespace()
        .map(|v| v.parse::<f64>().map_err(|_| format!("bad lattice value {v:?}")))
        .collect::<Result<_, _>>()?;
    if values.len() != 9 {
        return Err("Lattice shape must be (3,3)".into());
    }
    let lattice = LatticeFrame::from_rows(&[&values[0..3], &values[3..6], &values[6..9]])
        .map_err(|e| e.to_string())?;

    let (species_col, pos_col) = property_columns(comment)?;

    let mut species = Vec::with_capacity(n);
    let mut positions = Vec::with_capacity(n);
    for (i, line) in lines.take(n).enumerate() {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < species_col.max(pos_col + 2) + 1 {
            return Err(format!("atom line {} has too few columns", i + 1));
        }
        let coord = |k: usize| {
            cols[pos_col + k]
                .parse::<f64>()
                .map_err(|_| format!("atom line {}: bad coordinate {:?}", i + 1, cols[pos_col + k]))
        };
        let cart = Point3::new(coord(0)?, coord(1)?, coord(2)?);
        species.push(cols[species_col].to_string());
        positions.push(lattice.to_fractional(&cart));
    }
    if species.len() != n {
        return Err(format!("expected {} atoms, found {}", n, species.len()));
    }

    Ok(Structure {
        lattice,
        species,
        positions,
    })
}
