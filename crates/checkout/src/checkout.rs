//! Checkout orchestrator.
//!
//! Drives a cart through address assembly, coupon application, payment
//! method selection, and order submission. The orchestrator is a phase
//! machine with one hard rule: at most one submission is ever in flight.
//! [`CheckoutOrchestrator::begin_submit`] flips the phase to `Submitting`
//! *before* any request leaves, so a second submit attempt - double tap,
//! retry race - fails fast with [`CheckoutError::SubmissionInFlight`]
//! instead of creating a duplicate order.
//!
//! The split begin/complete API exists for callers that drive the request
//! themselves; [`CheckoutOrchestrator::submit`] composes both around the
//! gateway call. The cart is cleared only on a confirmed order; any failure
//! preserves it untouched.

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use marigold_core::{CurrencyCode, CustomerId, OrderId, ProductId};

use crate::api::{
    Address, ApiError, CatalogDirectory, CouponDirectory, CustomerDirectory, CustomerUpdate,
    OrderConfirmation, OrderGateway, OrderLine, PaymentGateway,
};
use crate::cart::{CartSnapshot, CartStore};
use crate::coupon::{self, AppliedCoupon, CouponRejection};
use crate::currency::CurrencyService;
use crate::session::SessionGuard;
use crate::storage::StateStore;

/// Errors from checkout operations.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// No authenticated session.
    #[error("not signed in")]
    NotAuthenticated,

    /// The cart holds no items.
    #[error("cart is empty")]
    EmptyCart,

    /// A required checkout field is not filled in.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A submission is already in flight.
    #[error("an order submission is already in progress")]
    SubmissionInFlight,

    /// The operation requires an active checkout.
    #[error("checkout has not been started")]
    NotAssembling,

    /// The backend rejected the order; the message is shown verbatim.
    #[error("{0}")]
    Rejected(String),

    /// The backend could not be reached.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Where the checkout currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    /// No checkout started.
    #[default]
    Idle,
    /// Collecting addresses, payment method, coupon.
    Assembling,
    /// An order request is in flight. All edits and further submits are
    /// refused until it completes.
    Submitting,
    /// The order was created.
    Succeeded { order_id: OrderId },
    /// Submission failed; the cart and all entered data are preserved.
    Failed { reason: String },
}

/// The order payload submitted to the backend.
///
/// Carries no prices - the backend computes the authoritative total from
/// product ids and quantities. The idempotency key is fresh per submission
/// attempt.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDraft {
    pub customer_id: CustomerId,
    pub email: String,
    pub billing: Address,
    pub shipping: Address,
    pub payment_method_id: String,
    pub line_items: Vec<OrderLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    #[serde(skip)]
    pub idempotency_key: Uuid,
}

// =============================================================================
// CheckoutOrchestrator
// =============================================================================

/// Owns the checkout phase and the data assembled for the order.
#[derive(Debug, Default)]
pub struct CheckoutOrchestrator {
    phase: Phase,
    billing: Address,
    shipping: Address,
    /// When set, `shipping` is ignored and the billing address ships.
    ship_to_billing: bool,
    payment_method_id: Option<String>,
    coupon: Option<AppliedCoupon>,
}

impl CheckoutOrchestrator {
    /// Create an idle orchestrator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ship_to_billing: true,
            ..Self::default()
        }
    }

    /// Start a checkout for the current session and cart.
    ///
    /// # Errors
    ///
    /// [`CheckoutError::NotAuthenticated`] without a session,
    /// [`CheckoutError::EmptyCart`] for an empty cart,
    /// [`CheckoutError::SubmissionInFlight`] while a submit is pending.
    pub fn begin<S: StateStore, C: StateStore>(
        &mut self,
        session: &SessionGuard<S>,
        cart: &CartStore<C>,
    ) -> Result<(), CheckoutError> {
        self.ensure_editable()?;
        if !session.is_authenticated() {
            return Err(CheckoutError::NotAuthenticated);
        }
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        self.phase = Phase::Assembling;
        Ok(())
    }

    // =========================================================================
    // Assembly
    // =========================================================================

    /// Set the billing address.
    ///
    /// # Errors
    ///
    /// Refused while a submission is in flight.
    pub fn set_billing(&mut self, address: Address) -> Result<(), CheckoutError> {
        self.ensure_editable()?;
        self.billing = address;
        Ok(())
    }

    /// Set a separate shipping address (clears ship-to-billing).
    ///
    /// # Errors
    ///
    /// Refused while a submission is in flight.
    pub fn set_shipping(&mut self, address: Address) -> Result<(), CheckoutError> {
        self.ensure_editable()?;
        self.shipping = address;
        self.ship_to_billing = false;
        Ok(())
    }

    /// Ship to the billing address (the default).
    ///
    /// # Errors
    ///
    /// Refused while a submission is in flight.
    pub fn use_billing_for_shipping(&mut self) -> Result<(), CheckoutError> {
        self.ensure_editable()?;
        self.ship_to_billing = true;
        Ok(())
    }

    /// Select the payment method by gateway id.
    ///
    /// # Errors
    ///
    /// Refused while a submission is in flight.
    pub fn set_payment_method(&mut self, gateway_id: &str) -> Result<(), CheckoutError> {
        self.ensure_editable()?;
        self.payment_method_id = Some(gateway_id.to_owned());
        Ok(())
    }

    /// Validate and apply a coupon against the snapshot's subtotal.
    ///
    /// An already-applied coupon is replaced, never stacked.
    ///
    /// # Errors
    ///
    /// [`CouponRejection`] describing why the code was not accepted; the
    /// previously applied coupon (if any) stays in place on rejection.
    pub async fn apply_coupon(
        &mut self,
        directory: &impl CouponDirectory,
        code: &str,
        snapshot: &CartSnapshot,
    ) -> Result<AppliedCoupon, CouponRejection> {
        let applied = coupon::validate(directory, code, snapshot.subtotal).await?;
        self.coupon = Some(applied.clone());
        Ok(applied)
    }

    /// Drop the applied coupon, if any.
    pub fn remove_coupon(&mut self) {
        self.coupon = None;
    }

    /// Chargeable total in the store base currency: subtotal minus the
    /// applied discount, never negative.
    #[must_use]
    pub fn order_total(&self, snapshot: &CartSnapshot) -> Decimal {
        let discount = self.coupon.as_ref().map_or(Decimal::ZERO, |c| c.discount);
        (snapshot.subtotal - discount).max(Decimal::ZERO)
    }

    /// The order total converted into the shopper's display currency.
    ///
    /// Display only; what is charged is always the base-currency total the
    /// backend computes.
    #[must_use]
    pub fn display_total(
        &self,
        snapshot: &CartSnapshot,
        rates: &CurrencyService,
        base: &CurrencyCode,
        display: &CurrencyCode,
    ) -> Decimal {
        rates.convert(self.order_total(snapshot), base, display)
    }

    /// Payment methods currently offered: enabled gateways only.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] when the gateway list cannot be fetched.
    pub async fn payment_methods(
        &self,
        gateway: &impl OrderGateway,
    ) -> Result<Vec<PaymentGateway>, ApiError> {
        let mut gateways = gateway.payment_gateways().await?;
        gateways.retain(|g| g.enabled);
        Ok(gateways)
    }

    /// Prefill addresses from the customer's saved profile.
    ///
    /// Only fills what the profile has; existing edits to the other address
    /// are left alone. A missing profile is not an error at this stage.
    ///
    /// # Errors
    ///
    /// Refused while a submission is in flight; otherwise returns the
    /// [`ApiError`] from the profile fetch.
    pub async fn prefill_from_profile<S: StateStore>(
        &mut self,
        customers: &impl CustomerDirectory,
        session: &SessionGuard<S>,
    ) -> Result<(), CheckoutError> {
        self.ensure_editable()?;
        let Some(customer_id) = session.customer_id() else {
            return Err(CheckoutError::NotAuthenticated);
        };

        let profile = customers.customer(customer_id).await?;
        if let Some(billing) = profile.billing {
            self.billing = billing;
        }
        if let Some(shipping) = profile.shipping {
            self.shipping = shipping;
            self.ship_to_billing = false;
        }
        Ok(())
    }

    /// Save the checkout's addresses back to the customer profile.
    ///
    /// Best-effort convenience after a successful order; failure leaves the
    /// profile as it was.
    ///
    /// # Errors
    ///
    /// [`CheckoutError::NotAuthenticated`] without a session; otherwise the
    /// [`ApiError`] from the profile update.
    pub async fn save_addresses_to_profile<S: StateStore>(
        &self,
        customers: &impl CustomerDirectory,
        session: &SessionGuard<S>,
    ) -> Result<(), CheckoutError> {
        let Some(customer_id) = session.customer_id() else {
            return Err(CheckoutError::NotAuthenticated);
        };
        if !self.billing.is_complete() {
            return Err(CheckoutError::MissingField("billing address"));
        }

        let update = CustomerUpdate {
            billing: Some(self.billing.clone()),
            shipping: if self.ship_to_billing || !self.shipping.is_complete() {
                None
            } else {
                Some(self.shipping.clone())
            },
        };
        customers.update_customer(customer_id, &update).await?;
        Ok(())
    }

    /// Check every cart line against current catalog stock.
    ///
    /// Returns the products that can no longer be purchased (out of stock,
    /// or gone from the catalog entirely). Empty means all clear.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] when the catalog cannot be fetched.
    pub async fn verify_availability(
        &self,
        catalog: &impl CatalogDirectory,
        snapshot: &CartSnapshot,
    ) -> Result<Vec<ProductId>, ApiError> {
        let products = catalog.products().await?;
        let unavailable = snapshot
            .items
            .iter()
            .map(|line| line.product_id)
            .filter(|id| {
                !products
                    .iter()
                    .any(|p| p.id == *id && p.stock_status.is_purchasable())
            })
            .collect();
        Ok(unavailable)
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Build the order draft and enter the `Submitting` phase.
    ///
    /// The phase flips before this returns, so a concurrent second call
    /// cannot produce a second draft. Every call mints a fresh idempotency
    /// key - a retry after failure is a new attempt.
    ///
    /// # Errors
    ///
    /// [`CheckoutError::SubmissionInFlight`] if a submit is already pending;
    /// [`CheckoutError::NotAssembling`], [`CheckoutError::NotAuthenticated`],
    /// [`CheckoutError::EmptyCart`], or [`CheckoutError::MissingField`] when
    /// the checkout is not ready to submit.
    pub fn begin_submit<S: StateStore>(
        &mut self,
        session: &SessionGuard<S>,
        snapshot: &CartSnapshot,
    ) -> Result<OrderDraft, CheckoutError> {
        match &self.phase {
            Phase::Submitting => return Err(CheckoutError::SubmissionInFlight),
            Phase::Assembling | Phase::Failed { .. } => {}
            Phase::Idle | Phase::Succeeded { .. } => return Err(CheckoutError::NotAssembling),
        }

        let (Some(customer_id), Some(email)) = (session.customer_id(), session.email()) else {
            return Err(CheckoutError::NotAuthenticated);
        };
        if snapshot.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        if !self.billing.is_complete() {
            return Err(CheckoutError::MissingField("billing address"));
        }
        let shipping = if self.ship_to_billing {
            self.billing.clone()
        } else {
            if !self.shipping.is_complete() {
                return Err(CheckoutError::MissingField("shipping address"));
            }
            self.shipping.clone()
        };
        let Some(payment_method_id) = self.payment_method_id.clone() else {
            return Err(CheckoutError::MissingField("payment method"));
        };

        let draft = OrderDraft {
            customer_id,
            email: email.to_owned(),
            billing: self.billing.clone(),
            shipping,
            payment_method_id,
            line_items: snapshot
                .items
                .iter()
                .map(|line| OrderLine {
                    product_id: line.product_id,
                    quantity: line.quantity,
                })
                .collect(),
            coupon_code: self.coupon.as_ref().map(|c| c.code.clone()),
            idempotency_key: Uuid::new_v4(),
        };

        self.phase = Phase::Submitting;
        Ok(draft)
    }

    /// Record the outcome of a submission started by
    /// [`Self::begin_submit`].
    ///
    /// Success clears the cart and the coupon; failure preserves both so the
    /// shopper can retry.
    ///
    /// # Errors
    ///
    /// Echoes the submission failure as a [`CheckoutError`].
    pub fn complete_submit<C: StateStore>(
        &mut self,
        cart: &mut CartStore<C>,
        outcome: Result<OrderConfirmation, ApiError>,
    ) -> Result<OrderConfirmation, CheckoutError> {
        debug_assert!(matches!(self.phase, Phase::Submitting));

        match outcome {
            Ok(confirmation) => {
                info!(order_id = %confirmation.id, total = %confirmation.total, "order created");
                cart.clear();
                self.coupon = None;
                self.phase = Phase::Succeeded {
                    order_id: confirmation.id,
                };
                Ok(confirmation)
            }
            Err(e) => {
                warn!(error = %e, "order submission failed, cart preserved");
                self.phase = Phase::Failed {
                    reason: e.to_string(),
                };
                match e {
                    ApiError::Rejected(message) => Err(CheckoutError::Rejected(message)),
                    other => Err(other.into()),
                }
            }
        }
    }

    /// Submit the order: build the draft, send it, record the outcome.
    ///
    /// # Errors
    ///
    /// Everything [`Self::begin_submit`] and [`Self::complete_submit`] can
    /// return.
    #[instrument(skip_all)]
    pub async fn submit<S: StateStore, C: StateStore>(
        &mut self,
        gateway: &impl OrderGateway,
        session: &SessionGuard<S>,
        cart: &mut CartStore<C>,
    ) -> Result<OrderConfirmation, CheckoutError> {
        let draft = self.begin_submit(session, &cart.snapshot())?;
        let outcome = gateway.create_order(&draft).await;
        self.complete_submit(cart, outcome)
    }

    /// Return to idle, dropping the coupon and payment selection.
    /// Addresses are kept for the next checkout.
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.coupon = None;
        self.payment_method_id = None;
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[must_use]
    pub const fn phase(&self) -> &Phase {
        &self.phase
    }

    #[must_use]
    pub const fn coupon(&self) -> Option<&AppliedCoupon> {
        self.coupon.as_ref()
    }

    #[must_use]
    pub const fn billing(&self) -> &Address {
        &self.billing
    }

    fn ensure_editable(&self) -> Result<(), CheckoutError> {
        if matches!(self.phase, Phase::Submitting) {
            return Err(CheckoutError::SubmissionInFlight);
        }
        Ok(())
    }
}
