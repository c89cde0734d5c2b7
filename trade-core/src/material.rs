// Material: a resource with a nuclide composition

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::resource::{Resource, ResourceError, check_extract_amount};
use crate::types::{NuclideId, QUALITY_TOLERANCE, QUANTITY_EPSILON, Quantity, Tick};

/// Mass (kg) per nuclide.
pub type Composition = BTreeMap<NuclideId, Quantity>;

/// Half-life per nuclide, in ticks. Nuclides absent from the table are stable.
pub type HalfLives = HashMap<NuclideId, f64>;

/// A quantity of matter tracked by nuclide composition.
///
/// The only ways to change a material's mass are `absorb`, `extract_*`
/// and `decay`. Absorb/extract pairs conserve total mass exactly (up to
/// float rounding); decay does not.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Material {
    composition: Composition,
    last_update_tick: Tick,
}

impl Material {
    pub fn new(composition: Composition) -> Self {
        let composition = composition
            .into_iter()
            .filter(|(_, mass)| holds_mass(*mass))
            .collect();
        Self {
            composition,
            last_update_tick: 0,
        }
    }

    /// Single-nuclide material.
    pub fn of(nuclide: NuclideId, mass: Quantity) -> Self {
        Self::new(Composition::from([(nuclide, mass)]))
    }

    pub fn with_update_tick(mut self, tick: Tick) -> Self {
        self.last_update_tick = tick;
        self
    }

    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    pub fn mass_of(&self, nuclide: NuclideId) -> Quantity {
        self.composition.get(&nuclide).copied().unwrap_or(0.0)
    }

    pub fn last_update_tick(&self) -> Tick {
        self.last_update_tick
    }

    /// Mass fraction per nuclide. Empty for an empty material.
    pub fn mass_fractions(&self) -> BTreeMap<NuclideId, f64> {
        let total = self.quantity();
        if total <= 0.0 {
            return BTreeMap::new();
        }
        self.composition
            .iter()
            .map(|(nuclide, mass)| (*nuclide, mass / total))
            .collect()
    }

    /// Merge `other` into this material. `other` is consumed.
    pub fn absorb(&mut self, other: Material) {
        for (nuclide, mass) in other.composition {
            *self.composition.entry(nuclide).or_insert(0.0) += mass;
        }
        self.last_update_tick = self.last_update_tick.max(other.last_update_tick);
    }

    /// Split off `mass` kg with this material's current mass fractions.
    pub fn extract_mass(&mut self, mass: Quantity) -> Result<Material, ResourceError> {
        let total = self.quantity();
        check_extract_amount(mass, total)?;
        let mass = mass.min(total);
        if total <= 0.0 {
            return Ok(Material::default().with_update_tick(self.last_update_tick));
        }

        // Within epsilon of everything: take everything, leave no residue.
        if total - mass <= QUANTITY_EPSILON {
            let extracted = std::mem::take(&mut self.composition);
            return Ok(Material::new(extracted).with_update_tick(self.last_update_tick));
        }

        let ratio = mass / total;
        let mut extracted = Composition::new();
        for (nuclide, held) in self.composition.iter_mut() {
            let take = *held * ratio;
            *held -= take;
            extracted.insert(*nuclide, take);
        }
        self.prune();

        Ok(Material::new(extracted).with_update_tick(self.last_update_tick))
    }

    /// Remove exactly the per-nuclide masses in `removed`.
    ///
    /// Fails without touching this material if any nuclide is missing or
    /// short.
    pub fn extract_composition(&mut self, removed: &Composition) -> Result<Material, ResourceError> {
        for (nuclide, mass) in removed {
            if *mass == 0.0 {
                continue;
            }
            let held = self
                .composition
                .get(nuclide)
                .copied()
                .ok_or(ResourceError::UnknownNuclide(*nuclide))?;
            check_extract_amount(*mass, held)?;
        }

        let mut extracted = Composition::new();
        for (nuclide, mass) in removed.iter().filter(|(_, mass)| holds_mass(**mass)) {
            if let Some(held) = self.composition.get_mut(nuclide) {
                let take = if *held - mass <= QUANTITY_EPSILON { *held } else { *mass };
                *held -= take;
                extracted.insert(*nuclide, take);
            }
        }
        self.prune();

        Ok(Material::new(extracted).with_update_tick(self.last_update_tick))
    }

    /// First-order decay of each nuclide over `ticks`.
    ///
    /// Daughter products are not tracked.
    pub fn decay(&mut self, ticks: Tick, half_lives: &HalfLives) {
        if ticks == 0 {
            return;
        }
        for (nuclide, mass) in self.composition.iter_mut() {
            if let Some(half_life) = half_lives.get(nuclide).filter(|h| **h > 0.0) {
                *mass *= 0.5_f64.powf(ticks as f64 / half_life);
            }
        }
        self.prune();
        self.last_update_tick += ticks;
    }

    fn prune(&mut self) {
        self.composition.retain(|_, mass| holds_mass(*mass));
    }
}

/// Whether a nuclide entry is kept. Shared by construction and pruning.
fn holds_mass(mass: Quantity) -> bool {
    mass > 0.0
}

impl Resource for Material {
    fn quantity(&self) -> Quantity {
        self.composition.values().sum()
    }

    fn units(&self) -> &str {
        "kg"
    }

    fn kind(&self) -> &'static str {
        "material"
    }

    fn quality_matches(&self, other: &Self) -> bool {
        let ours = self.mass_fractions();
        let theirs = other.mass_fractions();
        if ours.len() != theirs.len() {
            return false;
        }
        ours.iter().all(|(nuclide, frac)| {
            theirs
                .get(nuclide)
                .is_some_and(|other_frac| (frac - other_frac).abs() <= QUALITY_TOLERANCE)
        })
    }
}
