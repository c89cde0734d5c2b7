use serde::{Deserialize, Serialize};

use crate::resource::{Resource, ResourceError, check_extract_amount};
use crate::types::Quantity;

/// A resource described only by a quality label, a unit and an amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericResource {
    quality: String,
    units: String,
    quantity: Quantity,
}

impl GenericResource {
    pub fn new(quality: impl Into<String>, units: impl Into<String>, quantity: Quantity) -> Self {
        Self {
            quality: quality.into(),
            units: units.into(),
            quantity: quantity.max(0.0),
        }
    }

    pub fn quality(&self) -> &str {
        &self.quality
    }

    /// Merge `other` into this resource. Labels must match.
    pub fn absorb(&mut self, other: GenericResource) -> Result<(), ResourceError> {
        if !self.quality_matches(&other) {
            return Err(ResourceError::IncompatibleResource);
        }
        self.quantity += other.quantity;
        Ok(())
    }

    pub fn extract(&mut self, quantity: Quantity) -> Result<GenericResource, ResourceError> {
        check_extract_amount(quantity, self.quantity)?;
        let taken = quantity.min(self.quantity);
        self.quantity -= taken;
        Ok(Self {
            quality: self.quality.clone(),
            units: self.units.clone(),
            quantity: taken,
        })
    }
}

impl Resource for GenericResource {
    fn quantity(&self) -> Quantity {
        self.quantity
    }

    fn units(&self) -> &str {
        &self.units
    }

    fn kind(&self) -> &'static str {
        "generic"
    }

    fn quality_matches(&self, other: &Self) -> bool {
        self.quality == other.quality && self.units == other.units
    }
}
