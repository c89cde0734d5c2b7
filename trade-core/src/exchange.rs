// Requests, bids and matched trades

use std::sync::Arc;

use thiserror::Error;

use crate::resource::Resource;
use crate::types::{Quantity, TraderId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExchangeError {
    #[error("bid from {supplier:?} does not answer the request it is paired with")]
    BidRequestMismatch { supplier: TraderId },

    #[error("offer from {supplier:?} is not quality-compatible with the requested resource")]
    IncompatibleOffer { supplier: TraderId },

    #[error("invalid trade amount: {0}")]
    InvalidAmount(Quantity),
}

// === REQUEST ===

/// A requester's stated demand for a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Request<T> {
    target: T,
    requester: TraderId,
}

impl<T: Resource> Request<T> {
    pub fn new(target: T, requester: TraderId) -> Arc<Self> {
        Arc::new(Self { target, requester })
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn requester(&self) -> TraderId {
        self.requester
    }
}

// === BID ===

/// A supplier's offer against one specific request.
#[derive(Debug, Clone, PartialEq)]
pub struct Bid<T> {
    request: Arc<Request<T>>,
    offer: T,
    supplier: TraderId,
}

impl<T: Resource> Bid<T> {
    /// Build a bid. The offer must be quality-compatible with the request.
    pub fn new(
        request: Arc<Request<T>>,
        offer: T,
        supplier: TraderId,
    ) -> Result<Arc<Self>, ExchangeError> {
        if !request.target().quality_matches(&offer) {
            return Err(ExchangeError::IncompatibleOffer { supplier });
        }
        Ok(Arc::new(Self {
            request,
            offer,
            supplier,
        }))
    }

    pub fn request(&self) -> &Arc<Request<T>> {
        &self.request
    }

    pub fn offer(&self) -> &T {
        &self.offer
    }

    pub fn supplier(&self) -> TraderId {
        self.supplier
    }

    /// True if this bid answers exactly `request` (same shared record).
    pub fn answers(&self, request: &Arc<Request<T>>) -> bool {
        Arc::ptr_eq(&self.request, request)
    }
}

// === TRADE ===

/// A matched request/bid pair with the agreed transfer amount.
///
/// Request and bid are shared with the matcher; equality compares them by
/// handle, so two trades are equal only if they pair the same records.
#[derive(Debug)]
pub struct Trade<T> {
    request: Arc<Request<T>>,
    bid: Arc<Bid<T>>,
    amount: Quantity,
}

impl<T: Resource> Trade<T> {
    pub fn new(
        request: Arc<Request<T>>,
        bid: Arc<Bid<T>>,
        amount: Quantity,
    ) -> Result<Self, ExchangeError> {
        if !bid.answers(&request) {
            return Err(ExchangeError::BidRequestMismatch {
                supplier: bid.supplier(),
            });
        }
        if !amount.is_finite() || amount < 0.0 {
            return Err(ExchangeError::InvalidAmount(amount));
        }
        Ok(Self {
            request,
            bid,
            amount,
        })
    }

    pub fn request(&self) -> &Arc<Request<T>> {
        &self.request
    }

    pub fn bid(&self) -> &Arc<Bid<T>> {
        &self.bid
    }

    pub fn amount(&self) -> Quantity {
        self.amount
    }

    pub fn supplier(&self) -> TraderId {
        self.bid.supplier()
    }

    pub fn requester(&self) -> TraderId {
        self.request.requester()
    }
}

impl<T> Clone for Trade<T> {
    fn clone(&self) -> Self {
        Self {
            request: Arc::clone(&self.request),
            bid: Arc::clone(&self.bid),
            amount: self.amount,
        }
    }
}

impl<T> PartialEq for Trade<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.request, &other.request)
            && Arc::ptr_eq(&self.bid, &other.bid)
            && self.amount == other.amount
    }
}
