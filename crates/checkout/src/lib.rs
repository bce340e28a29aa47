//! Marigold checkout pipeline.
//!
//! This crate is the cart & checkout transaction pipeline of the Marigold
//! storefront: the persisted cart store, the currency-conversion layer, the
//! coupon/discount engine, the cascading address resolver, the
//! order-assembly/submission state machine, and the session guard that gates
//! checkout.
//!
//! # Architecture
//!
//! Every component is singly-owned mutable state with an explicit `&mut self`
//! update path - no ambient globals. The remote commerce backend is reached
//! only through the per-concern traits in [`api`], implemented for production
//! by [`api::RestClient`] and by in-process fakes in tests. All remote-call
//! failures are normalized into [`api::ApiError`] at that boundary; nothing
//! above it ever sees a raw transport error.
//!
//! Currency conversion and coupon discounts affect *displayed* totals only.
//! The authoritative order total is always recomputed server-side from the
//! submitted `(product_id, quantity)` pairs, in the store's base currency.
//!
//! # Example
//!
//! ```rust,ignore
//! use marigold_checkout::api::RestClient;
//! use marigold_checkout::cart::{CartStore, LineItem};
//! use marigold_checkout::checkout::CheckoutOrchestrator;
//! use marigold_checkout::config::CheckoutConfig;
//! use marigold_checkout::session::SessionGuard;
//! use marigold_checkout::storage::JsonFileStore;
//!
//! let config = CheckoutConfig::from_env()?;
//! let backend = RestClient::new(&config);
//! let mut cart = CartStore::open(JsonFileStore::new(&config.state_dir)?);
//! let mut session = SessionGuard::restore(JsonFileStore::new(&config.state_dir)?);
//!
//! session.login(&backend, "shopper@example.com", "hunter2!").await?;
//! cart.add(LineItem::new(product.id, product.price, &product.name));
//!
//! let mut checkout = CheckoutOrchestrator::new();
//! checkout.begin(&session, &cart)?;
//! // ... addresses via GeographyResolver, payment method, optional coupon ...
//! let confirmation = checkout.submit(&backend, &session, &mut cart).await?;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod coupon;
pub mod currency;
pub mod geography;
pub mod session;
pub mod storage;
pub mod wishlist;
