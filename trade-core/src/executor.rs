// Trade execution: group by supplier, collect responses, deliver, record

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::panic::{AssertUnwindSafe, catch_unwind};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::exchange::Trade;
use crate::record::{RecordError, RecordSummary, Recorder, TradeRecord};
use crate::resource::Resource;
use crate::trader::{ParticipantError, Trader, TraderRegistry};
use crate::types::{Role, Tick, TraderId};

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("trader {trader:?} appears as {role} but is not registered")]
    UnknownTrader { trader: TraderId, role: Role },

    #[error("supplier {supplier:?} returned {actual} responses for {expected} trades")]
    ResponseCount {
        supplier: TraderId,
        expected: usize,
        actual: usize,
    },

    #[error("supplier {supplier:?} returned a response for a trade it was not asked to fill")]
    UnmatchedResponse { supplier: TraderId },

    #[error("{role} {trader:?} failed: {source}")]
    Participant {
        trader: TraderId,
        role: Role,
        #[source]
        source: ParticipantError,
    },

    #[error("settlement phase called out of order: expected {expected:?}, executor is {actual:?}")]
    PhaseOrder { expected: Phase, actual: Phase },
}

/// Where a settlement round currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Batch accepted, nothing computed.
    Built,
    /// Trades partitioned by supplier.
    Grouped,
    /// Every supplier has responded.
    Responded,
    /// Every requester has accepted.
    Executed,
    /// A phase failed; the round is dead.
    Aborted,
}

/// Per-round executor settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Simulation tick stamped on every record.
    pub tick: Tick,
    /// Transaction id given to the first recorded trade of the round.
    pub first_transaction_id: u64,
}

// === ORDERED GROUPING ===

/// Keyed groups that remember the order keys were first seen.
#[derive(Debug, Clone)]
pub struct OrderedGroups<K, V> {
    slots: HashMap<K, usize>,
    groups: Vec<(K, Vec<V>)>,
}

impl<K, V> Default for OrderedGroups<K, V> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
            groups: Vec::new(),
        }
    }
}

impl<K: Copy + Eq + Hash, V> OrderedGroups<K, V> {
    pub fn push(&mut self, key: K, value: V) {
        let slot = *self.slots.entry(key).or_insert_with(|| {
            self.groups.push((key, Vec::new()));
            self.groups.len() - 1
        });
        self.groups[slot].1.push(value);
    }

    pub fn get(&self, key: &K) -> Option<&[V]> {
        self.slots.get(key).map(|&slot| self.groups[slot].1.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.groups.iter().map(|(key, _)| *key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &[V])> + '_ {
        self.groups.iter().map(|(key, values)| (*key, values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of values across all groups.
    pub fn total(&self) -> usize {
        self.groups.iter().map(|(_, values)| values.len()).sum()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.groups.clear();
    }
}

// === EXECUTOR ===

/// Settles one batch of matched trades.
///
/// Built fresh per clearing round. Phases run strictly in order:
/// `group_by_supplier` → `collect_responses` → `deliver`, with
/// `execute_trades` running all three. `record_trades` can be called
/// afterwards and never fails the caller.
#[derive(Debug)]
pub struct TradeExecutor<T> {
    config: ExecutorConfig,
    trades: Vec<Trade<T>>,
    phase: Phase,
    recorded: bool,

    /// supplier -> positions in `trades`, input order
    trades_by_supplier: OrderedGroups<TraderId, usize>,
    requesters: Vec<TraderId>,

    /// (trade, resource) in assembly order
    responses: Vec<(Trade<T>, T)>,
    /// trade position -> position in `responses`
    response_for_trade: Vec<Option<usize>>,
    responses_by_requester: OrderedGroups<TraderId, usize>,
    responses_by_pair: OrderedGroups<(TraderId, TraderId), usize>,
}

impl<T: Resource> TradeExecutor<T> {
    pub fn new(trades: Vec<Trade<T>>) -> Self {
        Self::with_config(trades, ExecutorConfig::default())
    }

    pub fn with_config(trades: Vec<Trade<T>>, config: ExecutorConfig) -> Self {
        let response_for_trade = vec![None; trades.len()];
        Self {
            config,
            trades,
            phase: Phase::Built,
            recorded: false,
            trades_by_supplier: OrderedGroups::default(),
            requesters: Vec::new(),
            responses: Vec::new(),
            response_for_trade,
            responses_by_requester: OrderedGroups::default(),
            responses_by_pair: OrderedGroups::default(),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn trades(&self) -> &[Trade<T>] {
        &self.trades
    }

    /// Distinct suppliers in first-discovery order.
    pub fn suppliers(&self) -> impl Iterator<Item = TraderId> + '_ {
        self.trades_by_supplier.keys()
    }

    /// Distinct requesters in first-discovery order.
    pub fn requesters(&self) -> &[TraderId] {
        &self.requesters
    }

    pub fn trades_by_supplier(&self) -> Vec<(TraderId, Vec<&Trade<T>>)> {
        self.trades_by_supplier
            .iter()
            .map(|(supplier, positions)| {
                (supplier, positions.iter().map(|&i| &self.trades[i]).collect())
            })
            .collect()
    }

    pub fn trades_by_requester(&self) -> Vec<(TraderId, Vec<&(Trade<T>, T)>)> {
        self.responses_by_requester
            .iter()
            .map(|(requester, positions)| (requester, self.responses_at(positions)))
            .collect()
    }

    pub fn trades_by_pair(&self) -> Vec<((TraderId, TraderId), Vec<&(Trade<T>, T)>)> {
        self.responses_by_pair
            .iter()
            .map(|(pair, positions)| (pair, self.responses_at(positions)))
            .collect()
    }

    /// All supplier responses in assembly order.
    pub fn responses(&self) -> &[(Trade<T>, T)] {
        &self.responses
    }

    fn responses_at(&self, positions: &[usize]) -> Vec<&(Trade<T>, T)> {
        positions.iter().map(|&i| &self.responses[i]).collect()
    }

    fn expect_phase(&self, expected: Phase) -> Result<(), ExecutionError> {
        if self.phase != expected {
            return Err(ExecutionError::PhaseOrder {
                expected,
                actual: self.phase,
            });
        }
        Ok(())
    }

    fn abort(&mut self, err: ExecutionError) -> ExecutionError {
        tracing::warn!(target: "settlement", error = %err, "settlement round aborted");
        self.phase = Phase::Aborted;
        err
    }

    /// Run grouping, response collection and delivery.
    pub fn execute_trades<P: Trader<T>>(
        &mut self,
        registry: &mut TraderRegistry<P>,
    ) -> Result<(), ExecutionError> {
        if let Err(err) = self.validate(registry) {
            return Err(self.abort(err));
        }
        self.group_by_supplier()?;
        self.collect_responses(registry)?;
        self.deliver(registry)
    }

    /// Check that every participant in the batch is registered.
    pub fn validate<P>(&self, registry: &TraderRegistry<P>) -> Result<(), ExecutionError> {
        for trade in &self.trades {
            if !registry.contains(trade.supplier()) {
                return Err(ExecutionError::UnknownTrader {
                    trader: trade.supplier(),
                    role: Role::Supplier,
                });
            }
            if !registry.contains(trade.requester()) {
                return Err(ExecutionError::UnknownTrader {
                    trader: trade.requester(),
                    role: Role::Requester,
                });
            }
        }
        Ok(())
    }

    /// Partition the batch by supplier and discover requesters.
    ///
    /// Invokes no trader.
    pub fn group_by_supplier(&mut self) -> Result<(), ExecutionError> {
        self.expect_phase(Phase::Built)?;

        let mut seen_requesters = HashSet::new();
        for (i, trade) in self.trades.iter().enumerate() {
            self.trades_by_supplier.push(trade.supplier(), i);
            if seen_requesters.insert(trade.requester()) {
                self.requesters.push(trade.requester());
            }
        }

        tracing::debug!(
            target: "settlement",
            tick = self.config.tick,
            trades = self.trades.len(),
            suppliers = self.trades_by_supplier.len(),
            requesters = self.requesters.len(),
            "grouped trades by supplier"
        );
        self.phase = Phase::Grouped;
        Ok(())
    }

    /// Ask each supplier, in discovery order, for one resource per trade.
    pub fn collect_responses<P: Trader<T>>(
        &mut self,
        registry: &mut TraderRegistry<P>,
    ) -> Result<(), ExecutionError> {
        self.expect_phase(Phase::Grouped)?;

        let groups: Vec<(TraderId, Vec<usize>)> = self
            .trades_by_supplier
            .iter()
            .map(|(supplier, positions)| (supplier, positions.to_vec()))
            .collect();

        for (supplier, positions) in groups {
            if let Err(err) = self.collect_from(supplier, &positions, registry) {
                return Err(self.abort(err));
            }
        }

        tracing::debug!(
            target: "settlement",
            tick = self.config.tick,
            responses = self.responses.len(),
            "collected supplier responses"
        );
        self.phase = Phase::Responded;
        Ok(())
    }

    fn collect_from<P: Trader<T>>(
        &mut self,
        supplier: TraderId,
        positions: &[usize],
        registry: &mut TraderRegistry<P>,
    ) -> Result<(), ExecutionError> {
        let trader = registry
            .get_mut(supplier)
            .ok_or(ExecutionError::UnknownTrader {
                trader: supplier,
                role: Role::Supplier,
            })?;

        let batch: Vec<Trade<T>> = positions.iter().map(|&i| self.trades[i].clone()).collect();
        let returned = trader
            .supply_responses(&batch)
            .map_err(|source| ExecutionError::Participant {
                trader: supplier,
                role: Role::Supplier,
                source,
            })?;

        if returned.len() != batch.len() {
            return Err(ExecutionError::ResponseCount {
                supplier,
                expected: batch.len(),
                actual: returned.len(),
            });
        }

        // Pair each response with a distinct outstanding trade before
        // touching any index, so a bad response set leaves no trace.
        let mut outstanding = vec![true; batch.len()];
        let mut matched = Vec::with_capacity(returned.len());
        for (trade, _) in &returned {
            let slot = batch
                .iter()
                .zip(outstanding.iter())
                .position(|(candidate, open)| *open && candidate == trade)
                .ok_or(ExecutionError::UnmatchedResponse { supplier })?;
            outstanding[slot] = false;
            matched.push(positions[slot]);
        }

        for ((trade, resource), trade_pos) in returned.into_iter().zip(matched) {
            let pos = self.responses.len();
            let requester = trade.requester();
            self.responses_by_requester.push(requester, pos);
            self.responses_by_pair.push((supplier, requester), pos);
            self.response_for_trade[trade_pos] = Some(pos);
            self.responses.push((trade, resource));
        }
        Ok(())
    }

    /// Hand each requester, in discovery order, the resources addressed to it.
    pub fn deliver<P: Trader<T>>(
        &mut self,
        registry: &mut TraderRegistry<P>,
    ) -> Result<(), ExecutionError> {
        self.expect_phase(Phase::Responded)?;

        for requester in self.requesters.clone() {
            if let Err(err) = self.deliver_to(requester, registry) {
                return Err(self.abort(err));
            }
        }

        tracing::debug!(
            target: "settlement",
            tick = self.config.tick,
            requesters = self.requesters.len(),
            "delivered responses to requesters"
        );
        self.phase = Phase::Executed;
        Ok(())
    }

    fn deliver_to<P: Trader<T>>(
        &self,
        requester: TraderId,
        registry: &mut TraderRegistry<P>,
    ) -> Result<(), ExecutionError> {
        let trader = registry
            .get_mut(requester)
            .ok_or(ExecutionError::UnknownTrader {
                trader: requester,
                role: Role::Requester,
            })?;

        let delivery: Vec<(Trade<T>, T)> = self
            .responses_by_requester
            .get(&requester)
            .unwrap_or_default()
            .iter()
            .map(|&i| self.responses[i].clone())
            .collect();

        trader
            .accept_responses(delivery)
            .map_err(|source| ExecutionError::Participant {
                trader: requester,
                role: Role::Requester,
                source,
            })
    }

    /// Write one record per settled trade, in batch order.
    ///
    /// Never fails: recorder errors and panics are logged and counted.
    /// Nothing is written before responses exist or after an aborted
    /// round, and a second call is a no-op.
    pub fn record_trades<R: Recorder + ?Sized>(&mut self, recorder: &mut R) -> RecordSummary {
        let mut summary = RecordSummary::default();
        if self.recorded {
            tracing::debug!(target: "settlement", tick = self.config.tick, "trades already recorded");
            return summary;
        }
        if !matches!(self.phase, Phase::Responded | Phase::Executed) {
            tracing::debug!(
                target: "settlement",
                tick = self.config.tick,
                phase = ?self.phase,
                "no settled trades to record"
            );
            return summary;
        }
        self.recorded = true;

        let tick = self.config.tick;
        let mut next_id = self.config.first_transaction_id;
        for (trade_pos, response) in self.response_for_trade.iter().enumerate() {
            let Some(pos) = response else { continue };
            let (trade, resource) = &self.responses[*pos];
            let transaction_id = next_id;
            next_id = next_id.wrapping_add(1);
            if next_id == 0 {
                tracing::warn!(target: "settlement", tick, "transaction ids wrapped around");
            }

            // Building the record calls into the resource, so it is contained too.
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                let record = TradeRecord::new(tick, transaction_id, trade, resource);
                recorder.record_trade(&record)
            }))
            .unwrap_or_else(|_| Err(RecordError::Backend("recorder panicked".to_string())));
            match outcome {
                Ok(()) => summary.written += 1,
                Err(err) => {
                    summary.failed += 1;
                    tracing::warn!(
                        target: "settlement",
                        tick,
                        trade = trade_pos,
                        transaction_id,
                        error = %err,
                        "failed to record trade"
                    );
                }
            }
        }
        summary
    }
}
