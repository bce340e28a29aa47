//! Cart store.
//!
//! The sole writer of cart content. Items are kept in insertion order with at
//! most one line per product; the subtotal is derived by a single pure fold
//! so the displayed total and the submitted order total can never disagree.
//!
//! Every mutation persists through the injected [`StateStore`]. Persistence
//! failures are swallowed and logged - the in-memory state stays
//! authoritative for the session, and a storage outage must never block a
//! cart mutation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use marigold_core::ProductId;

use crate::storage::{self, StateStore, keys};

/// Persisted cart schema version. Bump when [`LineItem`] changes shape.
const CART_SCHEMA_VERSION: u32 = 1;

/// Errors from cart operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartError {
    /// No line item exists for the given product.
    #[error("no line item for product {0}")]
    UnknownProduct(ProductId),
}

/// A single cart line.
///
/// `unit_price` is in the store base currency and serializes as a numeric
/// string. Quantity never falls below 1; removal, not zero-quantity, is how
/// an item leaves the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

impl LineItem {
    /// Create a line item with quantity 1.
    #[must_use]
    pub fn new(product_id: ProductId, unit_price: Decimal, display_name: &str) -> Self {
        Self {
            product_id,
            unit_price,
            quantity: 1,
            display_name: display_name.to_owned(),
            image_ref: None,
        }
    }

    /// Price times quantity for this line.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// An immutable view of the cart at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSnapshot {
    /// Line items in insertion order.
    pub items: Vec<LineItem>,
    /// Σ(unit_price × quantity) in the store base currency.
    pub subtotal: Decimal,
}

impl CartSnapshot {
    /// Whether the snapshot holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Persisted representation of the cart.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedCart {
    version: u32,
    items: Vec<LineItem>,
}

// =============================================================================
// CartStore
// =============================================================================

/// The cart: singly-owned mutable state, all writes through these methods.
#[derive(Debug)]
pub struct CartStore<S: StateStore> {
    items: Vec<LineItem>,
    store: S,
}

impl<S: StateStore> CartStore<S> {
    /// Open the cart, rehydrating from the store.
    ///
    /// Corrupt or version-mismatched persisted data resets to an empty cart.
    pub fn open(store: S) -> Self {
        let items = match storage::load_json::<PersistedCart>(&store, keys::CART) {
            Some(persisted) if persisted.version == CART_SCHEMA_VERSION => persisted.items,
            Some(persisted) => {
                warn!(
                    version = persisted.version,
                    "unknown cart schema version, resetting to empty"
                );
                Vec::new()
            }
            None => Vec::new(),
        };

        Self { items, store }
    }

    /// Add an item. If the product is already in the cart, its quantity is
    /// incremented by 1 and the incoming item is otherwise ignored.
    pub fn add(&mut self, item: LineItem) {
        if let Some(existing) = self
            .items
            .iter_mut()
            .find(|line| line.product_id == item.product_id)
        {
            existing.quantity += 1;
        } else {
            self.items.push(LineItem {
                quantity: item.quantity.max(1),
                ..item
            });
        }
        self.persist();
    }

    /// Remove the line for `product_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::UnknownProduct`] if no such line exists.
    pub fn remove(&mut self, product_id: ProductId) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|line| line.product_id != product_id);
        if self.items.len() == before {
            return Err(CartError::UnknownProduct(product_id));
        }
        self.persist();
        Ok(())
    }

    /// Set the quantity for `product_id`, clamped to a floor of 1.
    ///
    /// A quantity of zero or less never removes the item - removal is an
    /// explicit, separate operation.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::UnknownProduct`] if no such line exists.
    pub fn set_quantity(&mut self, product_id: ProductId, quantity: i64) -> Result<(), CartError> {
        let line = self
            .items
            .iter_mut()
            .find(|line| line.product_id == product_id)
            .ok_or(CartError::UnknownProduct(product_id))?;

        line.quantity = u32::try_from(quantity).map_or(1, |q| q.max(1));
        self.persist();
        Ok(())
    }

    /// Drop all items.
    pub fn clear(&mut self) {
        self.items.clear();
        self.persist();
    }

    /// Current items and derived subtotal.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        CartSnapshot {
            items: self.items.clone(),
            subtotal: subtotal_of(&self.items),
        }
    }

    /// Whether the cart holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn unit_count(&self) -> u32 {
        self.items.iter().map(|line| line.quantity).sum()
    }

    fn persist(&self) {
        let record = PersistedCart {
            version: CART_SCHEMA_VERSION,
            items: self.items.clone(),
        };
        if let Err(e) = storage::save_json(&self.store, keys::CART, &record) {
            // In-memory state stays authoritative; never fail the mutation
            warn!(error = %e, "failed to persist cart");
        } else {
            debug!(lines = self.items.len(), "cart persisted");
        }
    }
}

/// The one subtotal fold. Everything that needs a total goes through this.
fn subtotal_of(items: &[LineItem]) -> Decimal {
    items
        .iter()
        .fold(Decimal::ZERO, |acc, line| acc + line.line_total())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn item(id: i64, price: &str) -> LineItem {
        LineItem::new(ProductId::new(id), dec(price), "Widget")
    }

    #[test]
    fn test_add_new_item() {
        let mut cart = CartStore::open(MemoryStore::new());
        cart.add(item(1, "50.00"));

        let snapshot = cart.snapshot();
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.subtotal, dec("50.00"));
    }

    #[test]
    fn test_add_existing_product_increments_quantity() {
        let mut cart = CartStore::open(MemoryStore::new());
        cart.add(item(1, "50.00"));
        cart.add(item(1, "50.00"));

        let snapshot = cart.snapshot();
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items.first().unwrap().quantity, 2);
        assert_eq!(snapshot.subtotal, dec("100.00"));
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut cart = CartStore::open(MemoryStore::new());
        cart.add(item(3, "1.00"));
        cart.add(item(1, "2.00"));
        cart.add(item(2, "3.00"));

        let ids: Vec<i64> = cart
            .snapshot()
            .items
            .iter()
            .map(|line| line.product_id.as_i64())
            .collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_set_quantity_clamps_to_floor_of_one() {
        let mut cart = CartStore::open(MemoryStore::new());
        cart.add(item(1, "50.00"));

        for bad in [0_i64, -1, -100] {
            cart.set_quantity(ProductId::new(1), bad).unwrap();
            let snapshot = cart.snapshot();
            assert_eq!(snapshot.items.first().unwrap().quantity, 1);
            assert_eq!(snapshot.items.len(), 1, "clamping must never remove");
        }

        cart.set_quantity(ProductId::new(1), 4).unwrap();
        assert_eq!(cart.snapshot().subtotal, dec("200.00"));
    }

    #[test]
    fn test_set_quantity_unknown_product() {
        let mut cart = CartStore::open(MemoryStore::new());
        assert_eq!(
            cart.set_quantity(ProductId::new(9), 2),
            Err(CartError::UnknownProduct(ProductId::new(9)))
        );
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cart = CartStore::open(MemoryStore::new());
        cart.add(item(1, "50.00"));
        cart.add(item(2, "25.00"));

        cart.remove(ProductId::new(1)).unwrap();
        assert_eq!(cart.snapshot().subtotal, dec("25.00"));
        assert_eq!(
            cart.remove(ProductId::new(1)),
            Err(CartError::UnknownProduct(ProductId::new(1)))
        );

        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.snapshot().subtotal, Decimal::ZERO);
    }

    #[test]
    fn test_snapshot_is_idempotent() {
        let mut cart = CartStore::open(MemoryStore::new());
        cart.add(item(1, "19.99"));
        cart.set_quantity(ProductId::new(1), 3).unwrap();

        let first = cart.snapshot();
        let second = cart.snapshot();
        assert_eq!(first, second);
        assert_eq!(first.subtotal, second.subtotal);
    }

    #[test]
    fn test_persistence_failure_is_swallowed() {
        let mut cart = CartStore::open(MemoryStore::failing());
        cart.add(item(1, "50.00"));
        cart.set_quantity(ProductId::new(1), 2).unwrap();

        // Mutations succeeded despite the storage outage
        assert_eq!(cart.snapshot().subtotal, dec("100.00"));
    }

    #[test]
    fn test_rehydration_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = crate::storage::JsonFileStore::new(dir.path()).unwrap();
            let mut cart = CartStore::open(store);
            cart.add(item(1, "50.00"));
            cart.add(item(1, "50.00"));
        }

        let store = crate::storage::JsonFileStore::new(dir.path()).unwrap();
        let cart = CartStore::open(store);
        let snapshot = cart.snapshot();
        assert_eq!(snapshot.items.first().unwrap().quantity, 2);
        assert_eq!(snapshot.subtotal, dec("100.00"));
    }

    #[test]
    fn test_corrupt_persisted_cart_resets_to_empty() {
        let store = MemoryStore::new();
        store.save(keys::CART, "{broken json").unwrap();
        let cart = CartStore::open(store);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_unknown_schema_version_resets_to_empty() {
        let store = MemoryStore::new();
        store
            .save(keys::CART, r#"{"version": 99, "items": []}"#)
            .unwrap();
        let cart = CartStore::open(store);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_unit_price_serializes_as_numeric_string() {
        let json = serde_json::to_value(item(1, "50.00")).unwrap();
        assert_eq!(json["unit_price"], "50.00");
    }
}
