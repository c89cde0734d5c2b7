// Durable sinks for executed trades

use std::io::Write;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::exchange::Trade;
use crate::resource::Resource;
use crate::types::{KeyToU64, Quantity, Tick};

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("recorder backend error: {0}")]
    Backend(String),
}

/// One row per executed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub tick: Tick,
    pub transaction_id: u64,
    pub supplier: u64,
    pub requester: u64,
    pub resource_kind: String,
    pub units: String,
    pub resource_quantity: Quantity,
    pub amount: Quantity,
}

impl TradeRecord {
    pub fn new<T: Resource>(tick: Tick, transaction_id: u64, trade: &Trade<T>, resource: &T) -> Self {
        Self {
            tick,
            transaction_id,
            supplier: trade.supplier().to_u64(),
            requester: trade.requester().to_u64(),
            resource_kind: resource.kind().to_string(),
            units: resource.units().to_string(),
            resource_quantity: resource.quantity(),
            amount: trade.amount(),
        }
    }
}

/// Append-only sink the executor writes trade records to.
///
/// Implementations may fail; the executor contains every failure.
pub trait Recorder {
    fn record_trade(&mut self, record: &TradeRecord) -> Result<(), RecordError>;
}

impl<R: Recorder + ?Sized> Recorder for &mut R {
    fn record_trade(&mut self, record: &TradeRecord) -> Result<(), RecordError> {
        (**self).record_trade(record)
    }
}

/// Outcome of a recording pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordSummary {
    pub written: usize,
    pub failed: usize,
}

// === RECORDERS ===

/// Emits each record as a `tracing` event with target `"trade"`.
///
/// Pair with `instrument::TableSubscriber` to collect the rows into a table.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRecorder;

impl Recorder for TracingRecorder {
    fn record_trade(&mut self, record: &TradeRecord) -> Result<(), RecordError> {
        tracing::info!(
            target: "trade",
            tick = record.tick,
            transaction_id = record.transaction_id,
            supplier = record.supplier,
            requester = record.requester,
            resource_kind = record.resource_kind.as_str(),
            units = record.units.as_str(),
            resource_quantity = record.resource_quantity,
            amount = record.amount,
        );
        Ok(())
    }
}

/// Writes one JSON object per line.
#[derive(Debug)]
pub struct JsonLinesRecorder<W> {
    writer: W,
}

impl<W: Write> JsonLinesRecorder<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Recorder for JsonLinesRecorder<W> {
    fn record_trade(&mut self, record: &TradeRecord) -> Result<(), RecordError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecorder {
    pub records: Vec<TradeRecord>,
}

impl Recorder for MemoryRecorder {
    fn record_trade(&mut self, record: &TradeRecord) -> Result<(), RecordError> {
        self.records.push(record.clone());
        Ok(())
    }
}
