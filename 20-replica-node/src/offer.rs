use serde::{Deserialize, Serialize};

/// A single offer routed to this node by the broker.
///
/// Only `offer_id` carries meaning for the node: it is the dedup key. The
/// product label and price are stored and returned untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Offer {
    pub offer_id: String,
    pub product: String,
    pub price: i64,
}

impl Offer {
    pub fn new(offer_id: impl Into<String>, product: impl Into<String>, price: i64) -> Self {
        Self {
            offer_id: offer_id.into(),
            product: product.into(),
            price,
        }
    }
}
