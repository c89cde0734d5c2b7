//! Property tests over randomized trade batches
//!
//! Each case builds a random market of traders, requests and bids, settles
//! it, and checks the grouping and routing invariants that must hold for
//! every batch regardless of shape.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use trade_core::{
    Bid, GenericResource, ParticipantError, Request, Trade, TradeExecutor, Trader, TraderId,
    TraderRegistry,
};

// === TEST FIXTURES ===

#[derive(Debug, Default)]
struct Counter {
    supply_calls: Vec<Vec<Trade<GenericResource>>>,
    accept_calls: Vec<Vec<Trade<GenericResource>>>,
}

impl Trader<GenericResource> for Counter {
    fn supply_responses(
        &mut self,
        trades: &[Trade<GenericResource>],
    ) -> Result<Vec<(Trade<GenericResource>, GenericResource)>, ParticipantError> {
        self.supply_calls.push(trades.to_vec());
        // Return in reverse to check the engine keeps supplier order.
        Ok(trades
            .iter()
            .rev()
            .map(|t| (t.clone(), GenericResource::new("grain", "t", t.amount())))
            .collect())
    }

    fn accept_responses(
        &mut self,
        responses: Vec<(Trade<GenericResource>, GenericResource)>,
    ) -> Result<(), ParticipantError> {
        self.accept_calls
            .push(responses.into_iter().map(|(t, _)| t).collect());
        Ok(())
    }
}

/// Random market: `n_traders` participants, each trade picks a random
/// request and a random supplier (self-trades allowed).
fn random_round(
    rng: &mut StdRng,
    n_traders: usize,
    n_requests: usize,
    n_trades: usize,
) -> (TraderRegistry<Counter>, Vec<TraderId>, Vec<Trade<GenericResource>>) {
    let mut registry = TraderRegistry::new();
    let ids: Vec<TraderId> = (0..n_traders).map(|_| registry.add(Counter::default())).collect();

    let requests: Vec<_> = (0..n_requests)
        .map(|_| {
            let requester = ids[rng.random_range(0..ids.len())];
            Request::new(GenericResource::new("grain", "t", 1.0), requester)
        })
        .collect();

    let trades = (0..n_trades)
        .map(|_| {
            let request = &requests[rng.random_range(0..requests.len())];
            let supplier = ids[rng.random_range(0..ids.len())];
            let amount = rng.random_range(0.1..10.0);
            let bid = Bid::new(
                Arc::clone(request),
                GenericResource::new("grain", "t", amount),
                supplier,
            )
            .unwrap();
            Trade::new(Arc::clone(request), bid, amount).unwrap()
        })
        .collect();

    (registry, ids, trades)
}

fn first_seen(ids: impl Iterator<Item = TraderId>) -> Vec<TraderId> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

/// Trade identity for multiset comparison.
fn trade_key(t: &Trade<GenericResource>) -> (usize, usize) {
    (
        Arc::as_ptr(t.request()) as usize,
        Arc::as_ptr(t.bid()) as usize,
    )
}

fn multiset<'a>(
    trades: impl Iterator<Item = &'a Trade<GenericResource>>,
) -> HashMap<(usize, usize), usize> {
    let mut counts = HashMap::new();
    for t in trades {
        *counts.entry(trade_key(t)).or_insert(0) += 1;
    }
    counts
}

// === PROPERTIES ===

#[test]
fn property_grouping_covers_every_participant() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..50 {
        let n_trades = rng.random_range(1..40);
        let (_, _, trades) = random_round(&mut rng, 6, 5, n_trades);
        let mut exec = TradeExecutor::new(trades.clone());
        exec.group_by_supplier().unwrap();

        let expected_suppliers = first_seen(trades.iter().map(|t| t.supplier()));
        let expected_requesters = first_seen(trades.iter().map(|t| t.requester()));
        assert_eq!(exec.suppliers().collect::<Vec<_>>(), expected_suppliers);
        assert_eq!(exec.requesters(), expected_requesters.as_slice());

        for (supplier, group) in exec.trades_by_supplier() {
            let expected: Vec<&Trade<GenericResource>> =
                trades.iter().filter(|t| t.supplier() == supplier).collect();
            assert_eq!(group, expected, "group for {supplier:?} must keep input order");
        }
    }
}

#[test]
fn property_response_counts_match_batch() {
    let mut rng = StdRng::seed_from_u64(23);
    for _ in 0..50 {
        let n_trades = rng.random_range(1..40);
        let (mut registry, _, trades) = random_round(&mut rng, 8, 6, n_trades);
        let mut exec = TradeExecutor::new(trades.clone());
        exec.group_by_supplier().unwrap();
        exec.collect_responses(&mut registry).unwrap();

        let supplier_total: usize = exec.trades_by_supplier().iter().map(|(_, g)| g.len()).sum();
        let requester_total: usize = exec.trades_by_requester().iter().map(|(_, g)| g.len()).sum();
        assert_eq!(supplier_total, trades.len());
        assert_eq!(requester_total, trades.len());

        let by_requester = exec.trades_by_requester();
        let by_pair = exec.trades_by_pair();
        let from_requesters = multiset(by_requester.iter().flat_map(|(_, g)| g.iter().map(|(t, _)| t)));
        let from_pairs = multiset(by_pair.iter().flat_map(|(_, g)| g.iter().map(|(t, _)| t)));
        assert_eq!(from_requesters, from_pairs);
        assert_eq!(from_requesters, multiset(trades.iter()));

        for ((supplier, requester), group) in &by_pair {
            assert!(group
                .iter()
                .all(|(t, _)| t.supplier() == *supplier && t.requester() == *requester));
        }
    }
}

#[test]
fn property_each_participant_called_once_with_its_trades() {
    let mut rng = StdRng::seed_from_u64(47);
    for _ in 0..50 {
        let n_trades = rng.random_range(1..40);
        let (mut registry, ids, trades) = random_round(&mut rng, 7, 5, n_trades);
        let mut exec = TradeExecutor::new(trades.clone());
        exec.execute_trades(&mut registry).unwrap();

        for id in ids {
            let counter = registry.get(id).unwrap();
            let supplied: Vec<&Trade<GenericResource>> =
                trades.iter().filter(|t| t.supplier() == id).collect();
            let requested: Vec<&Trade<GenericResource>> =
                trades.iter().filter(|t| t.requester() == id).collect();

            if supplied.is_empty() {
                assert!(counter.supply_calls.is_empty());
            } else {
                assert_eq!(counter.supply_calls.len(), 1);
                assert_eq!(counter.supply_calls[0].iter().collect::<Vec<_>>(), supplied);
            }

            if requested.is_empty() {
                assert!(counter.accept_calls.is_empty());
            } else {
                assert_eq!(counter.accept_calls.len(), 1);
                assert_eq!(
                    multiset(counter.accept_calls[0].iter()),
                    multiset(requested.into_iter())
                );
            }
        }
    }
}

#[test]
fn property_requester_lists_follow_supplier_return_order() {
    let mut rng = StdRng::seed_from_u64(5);
    let (mut registry, _, trades) = random_round(&mut rng, 5, 4, 30);
    let mut exec = TradeExecutor::new(trades);
    exec.group_by_supplier().unwrap();
    exec.collect_responses(&mut registry).unwrap();

    // Suppliers answer in reverse, so the assembled order is each
    // supplier's group reversed, suppliers in discovery order.
    let assembled: Vec<Trade<GenericResource>> = exec
        .trades_by_supplier()
        .into_iter()
        .flat_map(|(_, group)| group.into_iter().rev().cloned().collect::<Vec<_>>())
        .collect();
    let responses: Vec<Trade<GenericResource>> =
        exec.responses().iter().map(|(t, _)| t.clone()).collect();
    assert_eq!(responses, assembled);

    for (requester, group) in exec.trades_by_requester() {
        let expected: Vec<&Trade<GenericResource>> =
            assembled.iter().filter(|t| t.requester() == requester).collect();
        let got: Vec<&Trade<GenericResource>> = group.into_iter().map(|(t, _)| t).collect();
        assert_eq!(got, expected);
    }
}
