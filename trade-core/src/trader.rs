// Trader capability and the registry that owns participants

use slotmap::SlotMap;

use crate::exchange::Trade;
use crate::resource::Resource;
use crate::types::TraderId;

/// Error raised by a participant callback. Opaque to the engine.
pub type ParticipantError = Box<dyn std::error::Error + Send + Sync>;

/// A simulation participant able to supply and/or request resources.
///
/// Both roles have defaults so an implementor only writes the role it
/// plays. A supplier-only trader that is asked to accept, or a
/// requester-only trader that is asked to supply, fails the round.
pub trait Trader<T: Resource> {
    /// Materialize one resource per trade in which this trader is the
    /// supplier. Side effects on the supplier's own state are allowed.
    fn supply_responses(
        &mut self,
        trades: &[Trade<T>],
    ) -> Result<Vec<(Trade<T>, T)>, ParticipantError> {
        let _ = trades;
        Ok(Vec::new())
    }

    /// Take ownership of the resources delivered for this trader's requests.
    fn accept_responses(&mut self, responses: Vec<(Trade<T>, T)>) -> Result<(), ParticipantError> {
        let _ = responses;
        Err("trader does not accept trades".into())
    }
}

impl<T: Resource, P: Trader<T> + ?Sized> Trader<T> for Box<P> {
    fn supply_responses(
        &mut self,
        trades: &[Trade<T>],
    ) -> Result<Vec<(Trade<T>, T)>, ParticipantError> {
        (**self).supply_responses(trades)
    }

    fn accept_responses(&mut self, responses: Vec<(Trade<T>, T)>) -> Result<(), ParticipantError> {
        (**self).accept_responses(responses)
    }
}

// === REGISTRY ===

/// Owns the simulation's traders and hands out stable identities.
///
/// Identity is the key, not the trader's state: inserting two identical
/// traders yields two distinct ids.
#[derive(Debug, Clone)]
pub struct TraderRegistry<P> {
    traders: SlotMap<TraderId, P>,
}

impl<P> Default for TraderRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> TraderRegistry<P> {
    pub fn new() -> Self {
        Self {
            traders: SlotMap::with_key(),
        }
    }

    /// Register a trader, returns its ID
    pub fn add(&mut self, trader: P) -> TraderId {
        self.traders.insert(trader)
    }

    /// Register a trader that needs to know its own ID at construction.
    pub fn add_with_id(&mut self, build: impl FnOnce(TraderId) -> P) -> TraderId {
        self.traders.insert_with_key(build)
    }

    pub fn get(&self, id: TraderId) -> Option<&P> {
        self.traders.get(id)
    }

    pub fn get_mut(&mut self, id: TraderId) -> Option<&mut P> {
        self.traders.get_mut(id)
    }

    pub fn remove(&mut self, id: TraderId) -> Option<P> {
        self.traders.remove(id)
    }

    pub fn contains(&self, id: TraderId) -> bool {
        self.traders.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.traders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traders.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TraderId, &P)> {
        self.traders.iter()
    }
}
