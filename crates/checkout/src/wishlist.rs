//! Wishlist store.
//!
//! A persisted, ordered set of product ids. Same persistence policy as the
//! cart: in-memory state is authoritative, storage failures are swallowed
//! and logged, and a corrupt or version-mismatched record resets to empty.

use serde::{Deserialize, Serialize};
use tracing::warn;

use marigold_core::ProductId;

use crate::storage::{self, StateStore, keys};

const WISHLIST_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedWishlist {
    version: u32,
    product_ids: Vec<ProductId>,
}

/// The wishlist: insertion-ordered, one entry per product.
#[derive(Debug)]
pub struct WishlistStore<S: StateStore> {
    product_ids: Vec<ProductId>,
    store: S,
}

impl<S: StateStore> WishlistStore<S> {
    /// Open the wishlist, rehydrating from the store.
    pub fn open(store: S) -> Self {
        let product_ids = match storage::load_json::<PersistedWishlist>(&store, keys::WISHLIST) {
            Some(persisted) if persisted.version == WISHLIST_SCHEMA_VERSION => {
                persisted.product_ids
            }
            Some(persisted) => {
                warn!(
                    version = persisted.version,
                    "unknown wishlist schema version, resetting to empty"
                );
                Vec::new()
            }
            None => Vec::new(),
        };

        Self { product_ids, store }
    }

    /// Add a product. Already-present products are left where they are.
    pub fn add(&mut self, product_id: ProductId) {
        if !self.product_ids.contains(&product_id) {
            self.product_ids.push(product_id);
            self.persist();
        }
    }

    /// Remove a product, if present.
    pub fn remove(&mut self, product_id: ProductId) {
        let before = self.product_ids.len();
        self.product_ids.retain(|id| *id != product_id);
        if self.product_ids.len() != before {
            self.persist();
        }
    }

    /// Toggle membership; returns whether the product is now on the list.
    pub fn toggle(&mut self, product_id: ProductId) -> bool {
        if self.contains(product_id) {
            self.remove(product_id);
            false
        } else {
            self.add(product_id);
            true
        }
    }

    #[must_use]
    pub fn contains(&self, product_id: ProductId) -> bool {
        self.product_ids.contains(&product_id)
    }

    /// Product ids in insertion order.
    #[must_use]
    pub fn items(&self) -> &[ProductId] {
        &self.product_ids
    }

    fn persist(&self) {
        let record = PersistedWishlist {
            version: WISHLIST_SCHEMA_VERSION,
            product_ids: self.product_ids.clone(),
        };
        if let Err(e) = storage::save_json(&self.store, keys::WISHLIST, &record) {
            warn!(error = %e, "failed to persist wishlist");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_add_is_idempotent() {
        let mut wishlist = WishlistStore::open(MemoryStore::new());
        wishlist.add(ProductId::new(1));
        wishlist.add(ProductId::new(2));
        wishlist.add(ProductId::new(1));

        assert_eq!(wishlist.items(), &[ProductId::new(1), ProductId::new(2)]);
    }

    #[test]
    fn test_toggle() {
        let mut wishlist = WishlistStore::open(MemoryStore::new());
        assert!(wishlist.toggle(ProductId::new(5)));
        assert!(wishlist.contains(ProductId::new(5)));
        assert!(!wishlist.toggle(ProductId::new(5)));
        assert!(wishlist.items().is_empty());
    }

    #[test]
    fn test_rehydration_roundtrip() {
        let store = MemoryStore::new();
        {
            let mut wishlist = WishlistStore::open(store.clone_handle());
            wishlist.add(ProductId::new(3));
            wishlist.add(ProductId::new(1));
        }

        let wishlist = WishlistStore::open(store);
        assert_eq!(wishlist.items(), &[ProductId::new(3), ProductId::new(1)]);
    }

    #[test]
    fn test_corrupt_record_resets_to_empty() {
        let store = MemoryStore::new();
        store.save(keys::WISHLIST, "not json").unwrap();
        let wishlist = WishlistStore::open(store);
        assert!(wishlist.items().is_empty());
    }

    #[test]
    fn test_storage_outage_is_swallowed() {
        let mut wishlist = WishlistStore::open(MemoryStore::failing());
        wishlist.add(ProductId::new(1));
        assert!(wishlist.contains(ProductId::new(1)));
    }
}
