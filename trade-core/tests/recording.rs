use std::sync::Arc;

use polars::prelude::*;
use trade_core::instrument::{self, TypedColumn};
use trade_core::{
    Bid, ExecutorConfig, GenericResource, JsonLinesRecorder, KeyToU64, ParticipantError, Request,
    Resource, Trade, TradeExecutor, TradeRecord, Trader, TraderId, TraderRegistry, TracingRecorder,
};

/// Warehouse that hands out and stores generic goods.
#[derive(Debug)]
struct Warehouse {
    stock: GenericResource,
}

impl Trader<GenericResource> for Warehouse {
    fn supply_responses(
        &mut self,
        trades: &[Trade<GenericResource>],
    ) -> Result<Vec<(Trade<GenericResource>, GenericResource)>, ParticipantError> {
        let mut out = Vec::with_capacity(trades.len());
        for trade in trades {
            out.push((trade.clone(), self.stock.extract(trade.amount())?));
        }
        Ok(out)
    }

    fn accept_responses(
        &mut self,
        responses: Vec<(Trade<GenericResource>, GenericResource)>,
    ) -> Result<(), ParticipantError> {
        for (_, goods) in responses {
            self.stock.absorb(goods)?;
        }
        Ok(())
    }
}

fn timber(qty: f64) -> GenericResource {
    GenericResource::new("timber", "m3", qty)
}

fn settled_round(tick: u64) -> (TradeExecutor<GenericResource>, TraderRegistry<Warehouse>, [TraderId; 2]) {
    let mut registry = TraderRegistry::new();
    let mill = registry.add(Warehouse { stock: timber(10.0) });
    let yard = registry.add(Warehouse { stock: timber(0.0) });

    let req = Request::new(timber(1.0), yard);
    let trades = [2.0, 3.0]
        .into_iter()
        .map(|amount| {
            let bid = Bid::new(Arc::clone(&req), timber(amount), mill).unwrap();
            Trade::new(Arc::clone(&req), bid, amount).unwrap()
        })
        .collect();

    let config = ExecutorConfig {
        tick,
        first_transaction_id: 0,
    };
    let mut exec = TradeExecutor::with_config(trades, config);
    exec.execute_trades(&mut registry).unwrap();
    (exec, registry, [mill, yard])
}

#[test]
fn settlement_moves_goods_and_conserves_quantity() {
    let (_, registry, [mill, yard]) = settled_round(1);
    let mill_stock = registry.get(mill).unwrap().stock.clone();
    let yard_stock = registry.get(yard).unwrap().stock.clone();
    assert!((mill_stock.quantity() - 5.0).abs() < 1e-12);
    assert!((yard_stock.quantity() - 5.0).abs() < 1e-12);
}

#[test]
fn tracing_recorder_rows_land_in_trade_table() {
    let (mut exec, _, [mill, yard]) = settled_round(7);

    let (summary, tables) = instrument::capture(|| exec.record_trades(&mut TracingRecorder));
    assert_eq!(summary.written, 2);

    let table = tables.table("trade").expect("trade table");
    assert_eq!(table.row_count(), 2);
    assert_eq!(table.column("tick"), Some(&TypedColumn::U64(vec![7, 7])));
    assert_eq!(table.column("transaction_id"), Some(&TypedColumn::U64(vec![0, 1])));
    assert_eq!(
        table.column("supplier"),
        Some(&TypedColumn::U64(vec![mill.to_u64(), mill.to_u64()]))
    );
    assert_eq!(
        table.column("requester"),
        Some(&TypedColumn::U64(vec![yard.to_u64(), yard.to_u64()]))
    );
    assert_eq!(table.column("amount"), Some(&TypedColumn::F64(vec![2.0, 3.0])));

    let df = table.to_dataframe().unwrap();
    let total = df
        .lazy()
        .select([col("resource_quantity").sum()])
        .collect()
        .unwrap();
    let total = total.column("resource_quantity").unwrap().f64().unwrap().get(0);
    assert_eq!(total, Some(5.0));
}

#[test]
fn json_lines_recorder_round_trips_records() {
    let (mut exec, _, _) = settled_round(3);
    let mut recorder = JsonLinesRecorder::new(Vec::new());
    let summary = exec.record_trades(&mut recorder);
    assert_eq!(summary.written, 2);

    let text = String::from_utf8(recorder.into_inner()).unwrap();
    let records: Vec<TradeRecord> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.tick == 3 && r.resource_kind == "generic"));
    assert_eq!(records[1].amount, 3.0);
}
