use nalgebra::{Matrix3, Point3};

use crate::core::domain::LatticeFrame;
use crate::core::error::{SpsError, SpsResult};

/// Wraps a fractional coordinate into the primary cell [0, 1).
#[inline]
pub fn wrap_fractional(p: &Point3<f64>) -> Point3<f64> {
    Point3::new(p.x.rem_euclid(1.0), p.y.rem_euclid(1.0), p.z.rem_euclid(1.0))
}

/// Replicates a unit cell `nsc[0] x nsc[1] x nsc[2]` times.
///
/// Positions are fractional and are wrapped into the unit cell before
/// replication. Images are generated with `i` outermost and `k`
/// innermost, each image holding the whole basis in its original order. Species
/// (when given) are repeated once per image in the same block order.
///
/// **Invariant**: returned positions are fractional in the enlarged cell.
pub fn create_supercell(
    lattice: &LatticeFrame,
    positions: &[Point3<f64>],
    species: Option<&[String]>,
    nsc: [usize; 3],
) -> SpsResult<(LatticeFrame, Vec<Point3<f64>>, Option<Vec<String>>)> {
    if nsc.iter().any(|&n| n == 0) {
        return Err(SpsError::config(format!(
            "Supercell dimensions must be positive, got {nsc:?}"
        )));
    }
    if let Some(sp) = species {
        if sp.len() != positions.len() {
            return Err(SpsError::config(
                "Positions shape must be (N,3), where N is the number of provided species",
            ));
        }
    }

    let images = nsc[0] * nsc[1] * nsc[2];
    let mut out = Vec::with_capacity(images * positions.len());
    for i in 0..nsc[0] {
        for j in 0..nsc[1] {
            for k in 0..nsc[2] {
                for p in positions.iter().map(wrap_fractional) {
                    out.push(Point3::new(
                        (p.x + i as f64) / nsc[0] as f64,
                        (p.y + j as f64) / nsc[1] as f64,
                        (p.z + k as f64) / nsc[2] as f64,
                    ));
                }
            }
        }
    }

    // Scale each lattice vector (column) by its replication count
    let scale = Matrix3::from_diagonal(&nalgebra::Vector3::new(
        nsc[0] as f64,
        nsc[1] as f64,
        nsc[2] as f64,
    ));
    let v = lattice.vectors * scale;
    let big = LatticeFrame::new(
        v.column(0).into_owned(),
        v.column(1).into_owned(),
        v.column(2).into_owned(),
    )?;

    let species = species.map(|sp| {
        let mut all = Vec::with_capacity(images * sp.len());
        for _ in 0..images {
            all.extend_from_slice(sp);
        }
        all
    });

    Ok((big, out, species))
}
