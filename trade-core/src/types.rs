// Core ID types and type aliases

use serde::{Deserialize, Serialize};
use slotmap::{Key, new_key_type};

// === TYPE ALIASES ===

pub type Quantity = f64;
pub type Tick = u64;

/// Nuclide key in ZZAAA form (e.g. 92235 for U-235).
pub type NuclideId = u32;

// === TOLERANCES ===

/// Absolute slack used when comparing or extracting quantities.
pub const QUANTITY_EPSILON: f64 = 1e-9;

/// Allowed per-nuclide mass fraction difference for two materials to be
/// considered the same quality.
pub const QUALITY_TOLERANCE: f64 = 1e-6;

// === TRADER IDENTITY ===

new_key_type! {
    pub struct TraderId;
}

/// Trait for converting registry keys to u64 for record output
pub trait KeyToU64 {
    fn to_u64(self) -> u64;
}

impl KeyToU64 for TraderId {
    fn to_u64(self) -> u64 {
        self.data().as_ffi()
    }
}

/// Which capability of a trader the engine was exercising.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Supplier,
    Requester,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Supplier => write!(f, "supplier"),
            Role::Requester => write!(f, "requester"),
        }
    }
}
