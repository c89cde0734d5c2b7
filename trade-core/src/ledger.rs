// Decay scheduling for materials, owned by whoever drives the clock

use serde::{Deserialize, Serialize};

use crate::material::{HalfLives, Material};
use crate::types::Tick;

/// Whether and how often materials decay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayConfig {
    pub enabled: bool,
    /// Ticks between decay passes.
    pub interval_ticks: Tick,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ticks: 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResourceLedger {
    config: DecayConfig,
    half_lives: HalfLives,
    last_decay_tick: Tick,
}

impl ResourceLedger {
    pub fn new(config: DecayConfig, half_lives: HalfLives) -> Self {
        Self {
            config,
            half_lives,
            last_decay_tick: 0,
        }
    }

    pub fn config(&self) -> &DecayConfig {
        &self.config
    }

    pub fn set_decay(&mut self, config: DecayConfig) {
        self.config = config;
    }

    pub fn half_lives(&self) -> &HalfLives {
        &self.half_lives
    }

    pub fn last_decay_tick(&self) -> Tick {
        self.last_decay_tick
    }

    pub fn decay_due(&self, tick: Tick) -> bool {
        self.config.enabled
            && tick.saturating_sub(self.last_decay_tick) >= self.config.interval_ticks.max(1)
    }

    /// Bring every material up to `tick` if a decay pass is due.
    ///
    /// Returns how many materials were decayed.
    pub fn decay_materials<'a>(
        &mut self,
        tick: Tick,
        materials: impl IntoIterator<Item = &'a mut Material>,
    ) -> usize {
        if !self.decay_due(tick) {
            return 0;
        }

        let mut touched = 0;
        for material in materials {
            let elapsed = tick.saturating_sub(material.last_update_tick());
            if elapsed > 0 {
                material.decay(elapsed, &self.half_lives);
                touched += 1;
            }
        }
        self.last_decay_tick = tick;

        tracing::debug!(target: "ledger", tick, touched, "decayed materials");
        touched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;

    const CS137: u32 = 55137;

    fn ledger(enabled: bool, interval_ticks: Tick) -> ResourceLedger {
        ResourceLedger::new(
            DecayConfig {
                enabled,
                interval_ticks,
            },
            HalfLives::from([(CS137, 4.0)]),
        )
    }

    #[test]
    fn disabled_ledger_never_decays() {
        let mut ledger = ledger(false, 1);
        let mut m = Material::of(CS137, 1.0);
        assert_eq!(ledger.decay_materials(100, [&mut m]), 0);
        assert_eq!(m.quantity(), 1.0);
    }

    #[test]
    fn decays_only_on_due_ticks() {
        let mut ledger = ledger(true, 4);
        let mut m = Material::of(CS137, 1.0);

        assert!(!ledger.decay_due(3));
        assert_eq!(ledger.decay_materials(3, [&mut m]), 0);

        assert_eq!(ledger.decay_materials(4, [&mut m]), 1);
        assert!((m.quantity() - 0.5).abs() < 1e-12);
        assert_eq!(ledger.last_decay_tick(), 4);
        assert!(!ledger.decay_due(7));
        assert!(ledger.decay_due(8));
    }

    #[test]
    fn toggle_at_runtime() {
        let mut ledger = ledger(false, 2);
        assert!(!ledger.decay_due(10));
        ledger.set_decay(DecayConfig {
            enabled: true,
            interval_ticks: 2,
        });
        assert!(ledger.decay_due(10));
    }
}
