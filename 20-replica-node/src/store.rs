//! In-memory offer storage for a replica node.
//!
//! The store itself is not synchronized. It lives inside the node state and
//! every access goes through the node-wide lock in [`crate::node`].

use crate::offer::Offer;

/// Result of inserting a single offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Accepted,
    /// An offer with the same id was already stored; nothing changed.
    Duplicate,
}

/// Ordered sequence of accepted offers, unique by `offer_id`.
///
/// # Why a Vec instead of a map?
///
/// Reads must return offers in insertion order, and the per-node volume is
/// small enough that a linear id scan is cheaper than keeping a second index
/// in sync.
#[derive(Debug, Default)]
pub struct OfferStore {
    offers: Vec<Offer>,
}

impl OfferStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self { offers: Vec::new() }
    }

    /// Appends `offer` unless its id is already present.
    pub fn insert(&mut self, offer: Offer) -> InsertOutcome {
        if self.contains(&offer.offer_id) {
            return InsertOutcome::Duplicate;
        }
        self.offers.push(offer);
        InsertOutcome::Accepted
    }

    /// Inserts every candidate that is not already stored.
    ///
    /// Returns how many offers were newly added. Candidates that repeat an id
    /// within the same batch are only added once.
    pub fn merge<I>(&mut self, candidates: I) -> usize
    where
        I: IntoIterator<Item = Offer>,
    {
        candidates
            .into_iter()
            .map(|offer| self.insert(offer))
            .filter(|outcome| *outcome == InsertOutcome::Accepted)
            .count()
    }

    /// Returns a copy of all stored offers in insertion order.
    ///
    /// The copy is what lets recovery release the lock before its network call.
    pub fn read_all(&self) -> Vec<Offer> {
        self.offers.clone()
    }

    pub fn len(&self) -> usize {
        self.offers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }

    fn contains(&self, offer_id: &str) -> bool {
        self.offers.iter().any(|offer| offer.offer_id == offer_id)
    }
}
