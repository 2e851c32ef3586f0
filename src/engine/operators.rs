use rand::Rng;

use crate::core::error::{SpsError, SpsResult};
use crate::core::occupation::{FixedOccupation, Occupation, VacancyOccupation};

/// Produces candidate occupations for the annealer.
///
/// `propose` never mutates `state`; the candidate differs from it by at most
/// `cap` exchanges. Implementations must preserve the species multiset and
/// leave fixed sites alone.
pub trait SwapMove {
    type State: Occupation;

    fn propose<R: Rng + ?Sized>(
        &self,
        state: &Self::State,
        cap: usize,
        rng: &mut R,
    ) -> SpsResult<Self::State>;

    fn name(&self) -> &'static str;
}

/// Pairwise label exchange on a fully occupied lattice.
#[derive(Clone, Copy, Debug, Default)]
pub struct SiteSwap;

impl SiteSwap {
    pub fn new() -> Self {
        Self
    }

    /// Applies exactly `count` effective swaps between mobile sites.
    ///
    /// A draw that would exchange a site with itself, or two sites carrying the
    /// same label in the candidate, is redrawn and not counted.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        occ: &FixedOccupation,
        count: usize,
        rng: &mut R,
    ) -> FixedOccupation {
        let mut c = occ.clone();
        let (lo, hi) = (occ.nfixed(), occ.len());

        for _ in 0..count {
            let i = rng.gen_range(lo..hi);
            let mut j = rng.gen_range(lo..hi);
            // Terminates: the mobile region always holds a second label
            while i == j || c.species_id(i) == c.species_id(j) {
                j = rng.gen_range(lo..hi);
            }
            c.swap_sites(i, j);
        }
        c
    }
}

impl SwapMove for SiteSwap {
    type State = FixedOccupation;

    fn propose<R: Rng + ?Sized>(
        &self,
        state: &FixedOccupation,
        cap: usize,
        rng: &mut R,
    ) -> SpsResult<FixedOccupation> {
        let upper = state.mobile_count().min(cap).max(1);
        let count = rng.gen_range(1..=upper);
        Ok(self.apply(state, count, rng))
    }

    fn name(&self) -> &'static str {
        "site-swap"
    }
}

/// Random walk of one mobile species through the vacancy sub-lattice.
///
/// One species index is picked and chased for the whole proposal. Each step
/// draws a target site: a vacant target receives the chased species, a target
/// held by a different label trades places with it, and a target held by the
/// same label is redrawn without counting.
#[derive(Clone, Copy, Debug, Default)]
pub struct VacancyHop;

impl VacancyHop {
    pub fn new() -> Self {
        Self
    }

    /// Performs `count` relocations and returns the candidate together with the
    /// index of the chased species.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        occ: &VacancyOccupation,
        count: usize,
        rng: &mut R,
    ) -> SpsResult<(VacancyOccupation, usize)> {
        let chased = rng.gen_range(0..occ.nvspecies());
        let nvsites = occ.nvsites();
        let targets = std::iter::repeat_with(|| rng.gen_range(0..nvsites));
        let c = self.walk(occ, chased, count, targets)?;
        Ok((c, chased))
    }

    /// Chases species `chased` through `count` counted steps, drawing target
    /// sites from `targets`. Redrawn targets do not count.
    ///
    /// # Errors
    /// `InvalidOccupation` if `chased` or a target is out of range, or if
    /// `targets` runs out first.
    pub fn walk<I>(
        &self,
        occ: &VacancyOccupation,
        chased: usize,
        count: usize,
        targets: I,
    ) -> SpsResult<VacancyOccupation>
    where
        I: IntoIterator<Item = usize>,
    {
        if chased >= occ.nvspecies() {
            return Err(SpsError::InvalidOccupation(format!(
                "chased species {chased} out of range"
            )));
        }
        let mut c = occ.clone();
        let mut targets = targets.into_iter();

        let mut done = 0;
        while done < count {
            let target = targets.next().ok_or_else(|| {
                SpsError::InvalidOccupation(format!("target sites ran out after {done} steps"))
            })?;
            if target >= c.nvsites() {
                return Err(SpsError::InvalidOccupation(format!(
                    "target site {target} out of range"
                )));
            }
            match c.occupant(target) {
                Some(other) if c.species_id(other) == c.species_id(chased) => continue,
                Some(other) => c.exchange(chased, other)?,
                None => c.relocate(chased, target)?,
            }
            done += 1;
        }
        Ok(c)
    }
}

impl SwapMove for VacancyHop {
    type State = VacancyOccupation;

    fn propose<R: Rng + ?Sized>(
        &self,
        state: &VacancyOccupation,
        cap: usize,
        rng: &mut R,
    ) -> SpsResult<VacancyOccupation> {
        let count = rng.gen_range(1..=cap.max(1));
        self.apply(state, count, rng).map(|(c, _)| c)
    }

    fn name(&self) -> &'static str {
        "vacancy-hop"
    }
}
