use thiserror::Error;

use crate::types::{NuclideId, QUANTITY_EPSILON, Quantity};

/// Errors raised by resource arithmetic.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResourceError {
    #[error("cannot extract {requested} from a resource holding {available}")]
    InsufficientQuantity {
        requested: Quantity,
        available: Quantity,
    },

    #[error("invalid quantity: {0}")]
    InvalidQuantity(Quantity),

    #[error("nuclide {0} is not present in this material")]
    UnknownNuclide(NuclideId),

    #[error("resources are not quality-compatible")]
    IncompatibleResource,
}

/// Capability contract for anything that can change hands in a trade.
///
/// Deep copies go through `Clone`; the engine never aliases a resource
/// between two owners.
pub trait Resource: Clone + std::fmt::Debug + PartialEq {
    /// Scalar amount held by this instance.
    fn quantity(&self) -> Quantity;

    /// Unit label for `quantity`.
    fn units(&self) -> &str;

    /// Short type label used in trade records.
    fn kind(&self) -> &'static str;

    /// True if `other` is sufficiently equal in quality to `self`.
    fn quality_matches(&self, other: &Self) -> bool;

    /// True if `other` holds the same quantity as `self`, within tolerance.
    fn quantity_eq(&self, other: &Self) -> bool {
        (self.quantity() - other.quantity()).abs() <= QUANTITY_EPSILON
    }

    /// True if `other` holds strictly more than `self`.
    fn quantity_gt(&self, other: &Self) -> bool {
        other.quantity() > self.quantity() + QUANTITY_EPSILON
    }

    /// Same quality and same quantity.
    fn equivalent(&self, other: &Self) -> bool {
        self.quality_matches(other) && self.quantity_eq(other)
    }
}

/// Validate an amount passed to an extract operation.
pub(crate) fn check_extract_amount(
    requested: Quantity,
    available: Quantity,
) -> Result<(), ResourceError> {
    if !requested.is_finite() || requested < 0.0 {
        return Err(ResourceError::InvalidQuantity(requested));
    }
    if requested > available + QUANTITY_EPSILON {
        return Err(ResourceError::InsufficientQuantity {
            requested,
            available,
        });
    }
    Ok(())
}
