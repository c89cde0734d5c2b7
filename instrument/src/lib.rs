//! Captures settlement events into column-oriented tables.
//!
//! Settlement code logs through `tracing`; every captured event becomes one
//! row in the table named after its target. Columns appear the first time a
//! field is seen, so the schema follows whatever the recorders emit.
//!
//! # Usage
//!
//! ```ignore
//! // In settlement code (trade_core::TracingRecorder does this):
//! tracing::info!(target: "trade", tick, transaction_id, supplier, requester, amount);
//!
//! // In a test:
//! let (summary, tables) = instrument::capture(|| executor.record_trades(&mut TracingRecorder));
//! let trades = tables.table("trade").unwrap();
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Record};
use tracing::{Event, Id, Level, Metadata, Subscriber};

// === COLUMNS & TABLES ===

/// A column of typed values.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedColumn {
    U64(Vec<u64>),
    I64(Vec<i64>),
    F64(Vec<f64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
}

/// One captured field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    U64(u64),
    I64(i64),
    F64(f64),
    Bool(bool),
    Str(String),
}

impl TypedColumn {
    fn empty_like(cell: &Cell, rows: usize) -> Self {
        match cell {
            Cell::U64(_) => TypedColumn::U64(vec![0; rows]),
            Cell::I64(_) => TypedColumn::I64(vec![0; rows]),
            Cell::F64(_) => TypedColumn::F64(vec![0.0; rows]),
            Cell::Bool(_) => TypedColumn::Bool(vec![false; rows]),
            Cell::Str(_) => TypedColumn::Str(vec![String::new(); rows]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TypedColumn::U64(v) => v.len(),
            TypedColumn::I64(v) => v.len(),
            TypedColumn::F64(v) => v.len(),
            TypedColumn::Bool(v) => v.len(),
            TypedColumn::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a value, converting integers into float columns. A value of
    /// an incompatible type is stored as the column default.
    fn push(&mut self, cell: Cell) {
        match (self, cell) {
            (TypedColumn::U64(v), Cell::U64(x)) => v.push(x),
            (TypedColumn::I64(v), Cell::I64(x)) => v.push(x),
            (TypedColumn::I64(v), Cell::U64(x)) => v.push(i64::try_from(x).unwrap_or(i64::MAX)),
            (TypedColumn::F64(v), Cell::F64(x)) => v.push(x),
            (TypedColumn::F64(v), Cell::U64(x)) => v.push(x as f64),
            (TypedColumn::F64(v), Cell::I64(x)) => v.push(x as f64),
            (TypedColumn::Bool(v), Cell::Bool(x)) => v.push(x),
            (TypedColumn::Str(v), Cell::Str(x)) => v.push(x),
            (col, _) => col.pad_to(col.len() + 1),
        }
    }

    fn pad_to(&mut self, rows: usize) {
        let missing = rows.saturating_sub(self.len());
        match self {
            TypedColumn::U64(v) => v.extend(std::iter::repeat_n(0, missing)),
            TypedColumn::I64(v) => v.extend(std::iter::repeat_n(0, missing)),
            TypedColumn::F64(v) => v.extend(std::iter::repeat_n(0.0, missing)),
            TypedColumn::Bool(v) => v.extend(std::iter::repeat_n(false, missing)),
            TypedColumn::Str(v) => v.extend(std::iter::repeat_n(String::new(), missing)),
        }
    }

    fn to_polars(&self, name: &str) -> Column {
        match self {
            TypedColumn::U64(v) => Column::new(name.into(), v),
            TypedColumn::I64(v) => Column::new(name.into(), v),
            TypedColumn::F64(v) => Column::new(name.into(), v),
            TypedColumn::Bool(v) => Column::new(name.into(), v),
            TypedColumn::Str(v) => Column::new(name.into(), v),
        }
    }
}

/// Rows captured for one target. Every column always has `row_count` values.
#[derive(Debug, Clone, Default)]
pub struct EventTable {
    columns: HashMap<String, TypedColumn>,
    row_count: usize,
}

impl EventTable {
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column(&self, name: &str) -> Option<&TypedColumn> {
        self.columns.get(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Append one row. Fields missing from the row get the column default;
    /// new fields get a column back-filled with defaults.
    pub fn push_row(&mut self, row: Vec<(String, Cell)>) {
        let rows_before = self.row_count;
        for (name, cell) in row {
            let col = self
                .columns
                .entry(name)
                .or_insert_with(|| TypedColumn::empty_like(&cell, rows_before));
            // A field repeated within one event keeps its first value.
            if col.len() == rows_before {
                col.push(cell);
            }
        }
        self.row_count += 1;
        for col in self.columns.values_mut() {
            col.pad_to(self.row_count);
        }
    }

    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let mut names: Vec<&String> = self.columns.keys().collect();
        names.sort();
        let columns = names
            .into_iter()
            .map(|name| self.columns[name].to_polars(name))
            .collect();
        DataFrame::new(columns)
    }
}

/// Captured tables keyed by tracing target.
#[derive(Debug, Clone, Default)]
pub struct TableSet {
    tables: HashMap<String, EventTable>,
}

impl TableSet {
    pub fn table(&self, target: &str) -> Option<&EventTable> {
        self.tables.get(target)
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn push_row(&mut self, target: &str, row: Vec<(String, Cell)>) {
        self.tables.entry(target.to_string()).or_default().push_row(row);
    }

    /// Convert every table; tables polars rejects are skipped.
    pub fn to_dataframes(&self) -> HashMap<String, DataFrame> {
        self.tables
            .iter()
            .filter_map(|(name, table)| table.to_dataframe().ok().map(|df| (name.clone(), df)))
            .collect()
    }
}

thread_local! {
    static TABLES: RefCell<TableSet> = RefCell::default();
}

// === SUBSCRIBER ===

#[derive(Default)]
struct RowVisitor {
    row: Vec<(String, Cell)>,
}

impl RowVisitor {
    fn push(&mut self, field: &Field, cell: Cell) {
        self.row.push((field.name().to_string(), cell));
    }
}

impl Visit for RowVisitor {
    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, Cell::U64(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, Cell::I64(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, Cell::F64(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, Cell::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, Cell::Str(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.push(field, Cell::Str(format!("{:?}", value)));
    }
}

/// Tracing subscriber that appends events to the thread-local tables.
///
/// Spans are ignored. By default every event at INFO or more severe is
/// captured; `with_targets` narrows capture to the named targets.
#[derive(Debug, Clone)]
pub struct TableSubscriber {
    targets: Vec<String>,
    max_level: Level,
}

impl Default for TableSubscriber {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            max_level: Level::INFO,
        }
    }
}

impl TableSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscriber for the settlement kernel's own targets.
    pub fn settlement() -> Self {
        Self::new().with_targets(["trade", "settlement"])
    }

    pub fn with_targets<S: Into<String>>(mut self, targets: impl IntoIterator<Item = S>) -> Self {
        self.targets = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_level(mut self, level: Level) -> Self {
        self.max_level = level;
        self
    }

    fn wants_target(&self, target: &str) -> bool {
        self.targets.is_empty() || self.targets.iter().any(|t| t == target)
    }
}

impl Subscriber for TableSubscriber {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.is_event()
            && *metadata.level() <= self.max_level
            && self.wants_target(metadata.target())
    }

    fn new_span(&self, _span: &Attributes<'_>) -> Id {
        Id::from_u64(1)
    }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        let mut visitor = RowVisitor::default();
        event.record(&mut visitor);
        let target = event.metadata().target();
        TABLES.with(|t| t.borrow_mut().push_row(target, visitor.row));
    }

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}

/// Install `subscriber` as the global default. Later calls are ignored.
pub fn install(subscriber: TableSubscriber) {
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Run `f` with the settlement subscriber scoped to this thread and return
/// only what it captured.
pub fn capture<R>(f: impl FnOnce() -> R) -> (R, TableSet) {
    let before = drain();
    let out = tracing::subscriber::with_default(TableSubscriber::settlement(), f);
    let captured = TABLES.with(|t| std::mem::replace(&mut *t.borrow_mut(), before));
    (out, captured)
}

/// Take everything captured on this thread so far.
pub fn drain() -> TableSet {
    TABLES.with(|t| std::mem::take(&mut *t.borrow_mut()))
}

pub fn clear() {
    TABLES.with(|t| *t.borrow_mut() = TableSet::default());
}

// === PARQUET OUTPUT ===

fn io_err(error: std::io::Error) -> PolarsError {
    PolarsError::IO {
        error: error.into(),
        msg: None,
    }
}

/// Write each DataFrame to `{dir}/{name}.parquet`.
pub fn save_parquet(dfs: &mut HashMap<String, DataFrame>, dir: &Path) -> PolarsResult<()> {
    std::fs::create_dir_all(dir).map_err(io_err)?;
    for (name, df) in dfs.iter_mut() {
        let file = std::fs::File::create(dir.join(format!("{}.parquet", name))).map_err(io_err)?;
        ParquetWriter::new(file).finish(df)?;
    }
    Ok(())
}

/// Replace anything but ASCII alphanumerics with `_`, capped at 60 chars.
fn sanitize(name: &str) -> String {
    name.chars()
        .take(60)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// RAII capture of one settlement run.
///
/// Clears this thread's tables and installs a global `TableSubscriber` on
/// creation; on drop, writes every table to `{parent}/{name}/` as parquet
/// plus a `_ready` sentinel.
pub struct ScopedCapture {
    run_dir: PathBuf,
    tables: Option<TableSet>,
}

impl ScopedCapture {
    pub fn new(parent: impl Into<PathBuf>, name: &str) -> Self {
        let run_dir = parent.into().join(sanitize(name));
        clear();
        install(TableSubscriber::new());
        Self {
            run_dir,
            tables: None,
        }
    }

    /// Drain captured rows. Later calls return the same data.
    pub fn get(&mut self) -> &TableSet {
        self.tables.get_or_insert_with(drain)
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }
}

impl Drop for ScopedCapture {
    fn drop(&mut self) {
        let tables = self.tables.take().unwrap_or_else(drain);
        if tables.is_empty() {
            return;
        }
        let mut dfs = tables.to_dataframes();
        if let Err(e) = save_parquet(&mut dfs, &self.run_dir) {
            eprintln!("ScopedCapture({}): failed to write parquet: {}", self.run_dir.display(), e);
            return;
        }
        if let Err(e) = std::fs::File::create(self.run_dir.join("_ready")) {
            eprintln!("ScopedCapture({}): failed to write _ready sentinel: {}", self.run_dir.display(), e);
        }
    }
}
