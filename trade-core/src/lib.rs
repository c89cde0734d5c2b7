//! Settlement core for an agent-based resource-exchange simulation.
//!
//! An external matcher pairs requests with bids into [`Trade`]s; a
//! [`TradeExecutor`] turns one batch of them into executed transfers:
//!
//! 1. group trades by supplier,
//! 2. ask each supplier for one resource per trade,
//! 3. hand each requester the resources addressed to it,
//! 4. write one [`TradeRecord`] per trade to a [`Recorder`].
//!
//! Steps 1–3 fail the whole round on any error. Step 4 never fails.

pub mod exchange;
pub mod executor;
pub mod generic;
pub mod ledger;
pub mod material;
pub mod record;
pub mod resource;
pub mod trader;
pub mod types;

pub use exchange::{Bid, ExchangeError, Request, Trade};
pub use executor::{ExecutionError, ExecutorConfig, OrderedGroups, Phase, TradeExecutor};
pub use generic::GenericResource;
pub use ledger::{DecayConfig, ResourceLedger};
pub use material::{Composition, HalfLives, Material};
pub use record::{
    JsonLinesRecorder, MemoryRecorder, RecordError, RecordSummary, Recorder, TracingRecorder,
    TradeRecord,
};
pub use resource::{Resource, ResourceError};
pub use trader::{ParticipantError, Trader, TraderRegistry};
pub use types::*;

#[cfg(feature = "instrument")]
pub use instrument;
