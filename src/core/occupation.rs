//! Species-to-site assignments for the two annealing modes.
//!
//! Geometry and label tables live in a shared, immutable frame behind an `Arc`;
//! an occupation only carries the mutable assignment, so cloning one per
//! proposal stays cheap.

use std::collections::HashMap;
use std::sync::Arc;

use nalgebra::Point3;

use crate::core::chemistry::Composition;
use crate::core::domain::{LatticeFrame, Structure};
use crate::core::error::{SpsError, SpsResult};

/// Anything the annealer can project into a structure for the oracle.
pub trait Occupation: Clone + Send {
    /// Deterministic projection into the flat triple the oracle consumes.
    fn build_structure(&self) -> SpsResult<Structure>;

    /// Species multiset of the full structure.
    fn composition(&self) -> Composition;
}

/// Maps labels onto dense ids, in order of first appearance.
fn intern(labels: &[String], table: &mut Vec<String>) -> Vec<usize> {
    let mut lookup: HashMap<String, usize> = table
        .iter()
        .enumerate()
        .map(|(i, l)| (l.clone(), i))
        .collect();
    labels
        .iter()
        .map(|l| {
            *lookup.entry(l.clone()).or_insert_with(|| {
                table.push(l.clone());
                table.len() - 1
            })
        })
        .collect()
}

// --- Fixed occupancy ---

#[derive(Debug)]
struct FixedFrame {
    lattice: LatticeFrame,
    positions: Vec<Point3<f64>>,
    labels: Vec<String>,
    nfixed: usize,
}

/// Every site is occupied; only the labels on the mobile suffix are permuted.
#[derive(Debug, Clone)]
pub struct FixedOccupation {
    frame: Arc<FixedFrame>,
    species: Vec<usize>, // Index into frame.labels, one per site
}

impl FixedOccupation {
    /// Validates the input and builds the initial assignment.
    ///
    /// # Errors
    /// `Configuration` if positions and species disagree in length, fewer than two
    /// mobile sites remain after `nfixed`, or the mobile region has a single label
    /// (no swap could ever change the structure).
    pub fn new(
        lattice: LatticeFrame,
        species: Vec<String>,
        positions: Vec<Point3<f64>>,
        nfixed: usize,
    ) -> SpsResult<Self> {
        let nat = species.len();
        if positions.len() != nat {
            return Err(SpsError::config(format!(
                "Positions shape must be (N,3), where N is the number of provided species ({} positions, {} species)",
                positions.len(),
                nat
            )));
        }
        if nat < 2 || nfixed > nat - 2 {
            return Err(SpsError::config(format!(
                "Cannot fix {nfixed} of {nat} sites. Decrease nfixed or provide more sites."
            )));
        }
        if Composition::from_labels(&species).distinct() <= 1 {
            return Err(SpsError::config(
                "Species list must contain more than one type of species",
            ));
        }
        if Composition::from_labels(&species[nfixed..]).distinct() <= 1 {
            return Err(SpsError::config(
                "Mobile sites must hold more than one type of species",
            ));
        }

        let mut labels = Vec::new();
        let ids = intern(&species, &mut labels);
        Ok(Self {
            frame: Arc::new(FixedFrame {
                lattice,
                positions,
                labels,
                nfixed,
            }),
            species: ids,
        })
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn nfixed(&self) -> usize {
        self.frame.nfixed
    }

    pub fn mobile_count(&self) -> usize {
        self.len() - self.nfixed()
    }

    /// Dense label id on `site`.
    #[inline]
    pub fn species_id(&self, site: usize) -> usize {
        self.species[site]
    }

    pub fn label(&self, site: usize) -> &str {
        &self.frame.labels[self.species[site]]
    }

    pub fn labels(&self) -> Vec<&str> {
        self.species
            .iter()
            .map(|&id| self.frame.labels[id].as_str())
            .collect()
    }

    /// Exchanges the labels on two sites. Callers keep both indices mobile.
    pub(crate) fn swap_sites(&mut self, a: usize, b: usize) {
        self.species.swap(a, b);
    }
}

impl Occupation for FixedOccupation {
    fn build_structure(&self) -> SpsResult<Structure> {
        let f = &self.frame;
        if self.species.len() != f.positions.len() {
            return Err(SpsError::InvalidOccupation(format!(
                "{} species for {} sites",
                self.species.len(),
                f.positions.len()
            )));
        }
        let species = self
            .species
            .iter()
            .map(|&id| {
                f.labels.get(id).cloned().ok_or_else(|| {
                    SpsError::InvalidOccupation(format!("species id {id} out of range"))
                })
            })
            .collect::<SpsResult<Vec<_>>>()?;
        Ok(Structure {
            lattice: f.lattice.clone(),
            species,
            positions: f.positions.clone(),
        })
    }

    fn composition(&self) -> Composition {
        Composition::from_labels(&self.labels())
    }
}

// --- Vacancy occupancy ---

#[derive(Debug)]
struct VacancyFrame {
    lattice: LatticeFrame,
    fixed_species: Vec<String>,
    fixed_positions: Vec<Point3<f64>>,
    sites: Vec<Point3<f64>>,
    labels: Vec<String>,
    vacancy_ids: Vec<usize>, // Label id of each mobile species index
}

/// Bijection between mobile species indices and a subset of vacancy-eligible
/// sites. Sites without an occupant are vacant.
///
/// Backed by two arrays kept mutually consistent:
/// `index_to_site[i]` is the site of species `i`, and
/// `site_to_index[s]` is `Some(i)` exactly when `index_to_site[i] == s`.
#[derive(Debug, Clone)]
pub struct VacancyOccupation {
    frame: Arc<VacancyFrame>,
    index_to_site: Vec<usize>,
    site_to_index: Vec<Option<usize>>,
}

impl VacancyOccupation {
    /// Builds the initial occupation, species `i` on site `i`.
    ///
    /// # Errors
    /// `Configuration` if fixed species/positions differ in length, there are
    /// fewer sites than species, fewer than two sites, no species, or no move
    /// exists (no vacant site and a single label).
    pub fn new(
        lattice: LatticeFrame,
        vacancy_species: Vec<String>,
        vacancy_sites: Vec<Point3<f64>>,
        fixed_species: Vec<String>,
        fixed_positions: Vec<Point3<f64>>,
    ) -> SpsResult<Self> {
        if fixed_positions.len() != fixed_species.len() {
            return Err(SpsError::config(
                "Fixed positions shape must be (N,3), where N is the number of fixed species",
            ));
        }
        let nvspecies = vacancy_species.len();
        let nvsites = vacancy_sites.len();
        if nvsites < nvspecies {
            return Err(SpsError::config(format!(
                "Vacancy positions shape must be (N,3), where N is greater than or equal to the number of vacancy species ({nvsites} < {nvspecies})"
            )));
        }
        if nvspecies == 0 {
            return Err(SpsError::config("At least one vacancy species is required"));
        }
        if nvsites < 2 {
            return Err(SpsError::config("At least two vacancy-eligible sites are required"));
        }
        if nvsites == nvspecies && Composition::from_labels(&vacancy_species).distinct() <= 1 {
            return Err(SpsError::config(
                "Vacancy species must contain more than one type of species when no site is vacant",
            ));
        }

        let mut labels = Vec::new();
        let vacancy_ids = intern(&vacancy_species, &mut labels);

        let index_to_site: Vec<usize> = (0..nvspecies).collect();
        let mut site_to_index = vec![None; nvsites];
        for (i, slot) in site_to_index.iter_mut().take(nvspecies).enumerate() {
            *slot = Some(i);
        }

        Ok(Self {
            frame: Arc::new(VacancyFrame {
                lattice,
                fixed_species,
                fixed_positions,
                sites: vacancy_sites,
                labels,
                vacancy_ids,
            }),
            index_to_site,
            site_to_index,
        })
    }

    pub fn nvspecies(&self) -> usize {
        self.index_to_site.len()
    }

    pub fn nvsites(&self) -> usize {
        self.site_to_index.len()
    }

    pub fn nfixed(&self) -> usize {
        self.frame.fixed_species.len()
    }

    #[inline]
    pub fn site_of(&self, index: usize) -> usize {
        self.index_to_site[index]
    }

    #[inline]
    pub fn occupant(&self, site: usize) -> Option<usize> {
        self.site_to_index[site]
    }

    /// Dense label id of mobile species `index`.
    #[inline]
    pub fn species_id(&self, index: usize) -> usize {
        self.frame.vacancy_ids[index]
    }

    pub fn label(&self, index: usize) -> &str {
        &self.frame.labels[self.frame.vacancy_ids[index]]
    }

    pub fn vacant_sites(&self) -> impl Iterator<Item = usize> + '_ {
        self.site_to_index
            .iter()
            .enumerate()
            .filter(|(_, o)| o.is_none())
            .map(|(s, _)| s)
    }

    pub fn occupied_sites(&self) -> impl Iterator<Item = usize> + '_ {
        self.site_to_index
            .iter()
            .enumerate()
            .filter(|(_, o)| o.is_some())
            .map(|(s, _)| s)
    }

    /// Moves species `index` onto the vacant `site`; its old site becomes vacant.
    pub(crate) fn relocate(&mut self, index: usize, site: usize) -> SpsResult<()> {
        if index >= self.nvspecies() || site >= self.nvsites() {
            return Err(SpsError::InvalidOccupation(format!(
                "relocate({index}, {site}) out of range"
            )));
        }
        if let Some(other) = self.site_to_index[site] {
            return Err(SpsError::InvalidOccupation(format!(
                "site {site} is held by species {other}, not vacant"
            )));
        }
        let old = self.index_to_site[index];
        self.site_to_index[old] = None;
        self.site_to_index[site] = Some(index);
        self.index_to_site[index] = site;
        Ok(())
    }

    /// Swaps the sites of two mobile species.
    pub(crate) fn exchange(&mut self, a: usize, b: usize) -> SpsResult<()> {
        if a >= self.nvspecies() || b >= self.nvspecies() {
            return Err(SpsError::InvalidOccupation(format!(
                "exchange({a}, {b}) out of range"
            )));
        }
        let (sa, sb) = (self.index_to_site[a], self.index_to_site[b]);
        self.index_to_site.swap(a, b);
        self.site_to_index[sa] = Some(b);
        self.site_to_index[sb] = Some(a);
        Ok(())
    }

    /// Checks that both views describe the same injective map.
    pub fn check_invariants(&self) -> SpsResult<()> {
        let nvsites = self.nvsites();
        let mut seen = vec![false; nvsites];
        for (i, &s) in self.index_to_site.iter().enumerate() {
            if s >= nvsites {
                return Err(SpsError::InvalidOccupation(format!(
                    "species {i} mapped to site {s}, only {nvsites} sites"
                )));
            }
            if std::mem::replace(&mut seen[s], true) {
                return Err(SpsError::InvalidOccupation(format!(
                    "site {s} holds more than one species"
                )));
            }
            if self.site_to_index[s] != Some(i) {
                return Err(SpsError::InvalidOccupation(format!(
                    "site {s} does not point back to species {i}"
                )));
            }
        }
        let occupied = self.site_to_index.iter().filter(|o| o.is_some()).count();
        if occupied != self.nvspecies() {
            return Err(SpsError::InvalidOccupation(format!(
                "{occupied} occupied sites for {} species",
                self.nvspecies()
            )));
        }
        Ok(())
    }
}

impl Occupation for VacancyOccupation {
    fn build_structure(&self) -> SpsResult<Structure> {
        self.check_invariants()?;
        let f = &self.frame;

        let mut species = Vec::with_capacity(f.fixed_species.len() + self.nvspecies());
        species.extend(f.fixed_species.iter().cloned());
        species.extend(f.vacancy_ids.iter().map(|&id| f.labels[id].clone()));

        let mut positions = Vec::with_capacity(species.len());
        positions.extend_from_slice(&f.fixed_positions);
        positions.extend(self.index_to_site.iter().map(|&s| f.sites[s]));

        Ok(Structure {
            lattice: f.lattice.clone(),
            species,
            positions,
        })
    }

    fn composition(&self) -> Composition {
        let f = &self.frame;
        let mut all: Vec<&str> = f.fixed_species.iter().map(String::as_str).collect();
        all.extend(f.vacancy_ids.iter().map(|&id| f.labels[id].as_str()));
        Composition::from_labels(&all)
    }
}
