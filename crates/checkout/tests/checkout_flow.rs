//! End-to-end checkout flows against an in-process fake backend.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;

use marigold_core::{CouponId, CustomerId, OrderId, ProductId};
use marigold_checkout::api::{
    ApiError, AuthBackend, AuthToken, CityOption, ConfirmedLine, Country, CouponDirectory,
    CouponRecord, DiscountType, GeoDirectory, OrderConfirmation, OrderGateway, PaymentGateway,
    StateOption,
};
use marigold_checkout::cart::{CartStore, LineItem};
use marigold_checkout::checkout::{CheckoutError, CheckoutOrchestrator, OrderDraft, Phase};
use marigold_checkout::geography::GeographyResolver;
use marigold_checkout::session::SessionGuard;
use marigold_checkout::storage::MemoryStore;

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("marigold_checkout=debug")
        .try_init();
}

// =============================================================================
// Fake backend
// =============================================================================

struct FakeBackend {
    coupon: Option<CouponRecord>,
    orders_created: AtomicUsize,
    last_draft: Mutex<Option<serde_json::Value>>,
    token_valid: bool,
}

impl FakeBackend {
    fn new() -> Self {
        Self {
            coupon: None,
            orders_created: AtomicUsize::new(0),
            last_draft: Mutex::new(None),
            token_valid: true,
        }
    }

    fn with_coupon(amount: &str) -> Self {
        Self {
            coupon: Some(CouponRecord {
                id: CouponId::new(1),
                code: "SAVE".to_string(),
                discount_type: DiscountType::Fixed,
                amount: dec(amount),
                expires_at: None,
                usage_limit: None,
                usage_count: 0,
            }),
            ..Self::new()
        }
    }
}

#[async_trait]
impl CouponDirectory for FakeBackend {
    async fn coupon_by_code(&self, code: &str) -> Result<Option<CouponRecord>, ApiError> {
        Ok(self
            .coupon
            .as_ref()
            .filter(|c| c.code == code)
            .cloned())
    }
}

#[async_trait]
impl GeoDirectory for FakeBackend {
    async fn countries(&self) -> Result<Vec<Country>, ApiError> {
        Ok(vec![
            Country {
                code: "AE".to_string(),
                name: "United Arab Emirates".to_string(),
            },
            Country {
                code: "US".to_string(),
                name: "United States".to_string(),
            },
        ])
    }

    async fn states(&self, country_code: &str) -> Result<Vec<StateOption>, ApiError> {
        match country_code {
            "AE" => Ok(vec![StateOption {
                code: "DU".to_string(),
                name: "Dubai".to_string(),
            }]),
            _ => Ok(Vec::new()),
        }
    }

    async fn cities(&self, _country: &str, state_code: &str) -> Result<Vec<CityOption>, ApiError> {
        match state_code {
            "DU" => Ok(vec![CityOption {
                name: "Dubai".to_string(),
            }]),
            _ => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl OrderGateway for FakeBackend {
    async fn payment_gateways(&self) -> Result<Vec<PaymentGateway>, ApiError> {
        Ok(vec![
            PaymentGateway {
                id: "cod".to_string(),
                title: "Cash on delivery".to_string(),
                enabled: true,
            },
            PaymentGateway {
                id: "legacy".to_string(),
                title: "Retired gateway".to_string(),
                enabled: false,
            },
        ])
    }

    async fn create_order(&self, draft: &OrderDraft) -> Result<OrderConfirmation, ApiError> {
        let n = self.orders_created.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_draft.lock().unwrap() = Some(serde_json::to_value(draft).unwrap());

        Ok(OrderConfirmation {
            id: OrderId::new(i64::try_from(n).unwrap()),
            status: "processing".to_string(),
            total: dec("100.00"),
            currency: marigold_core::CurrencyCode::usd(),
            line_items: draft
                .line_items
                .iter()
                .map(|line| ConfirmedLine {
                    product_id: line.product_id,
                    quantity: line.quantity,
                    total: dec("50.00") * Decimal::from(line.quantity),
                })
                .collect(),
        })
    }
}

#[async_trait]
impl AuthBackend for FakeBackend {
    async fn authenticate(&self, email: &str, _password: &str) -> Result<AuthToken, ApiError> {
        Ok(AuthToken {
            token: "session-token".to_string(),
            customer_id: CustomerId::new(7),
            email: Some(email.to_string()),
        })
    }

    async fn validate_token(&self, _token: &str) -> Result<bool, ApiError> {
        Ok(self.token_valid)
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn signed_in_session(backend: &FakeBackend) -> SessionGuard<MemoryStore> {
    let mut session = SessionGuard::restore(MemoryStore::new());
    session
        .login(backend, "amina@example.com", "hunter2")
        .await
        .unwrap();
    session
}

fn cart_with_two_widgets() -> CartStore<MemoryStore> {
    let mut cart = CartStore::open(MemoryStore::new());
    let widget = LineItem::new(ProductId::new(1), dec("50.00"), "Widget");
    cart.add(widget.clone());
    cart.add(widget);
    cart
}

async fn assemble_address(
    backend: &FakeBackend,
    checkout: &mut CheckoutOrchestrator,
) -> GeographyResolver {
    let mut geo = GeographyResolver::new();
    geo.load_countries(backend).await;
    let token = geo.select_country("AE");
    geo.apply_states(token, backend.states("AE").await);
    let token = geo.select_state("DU");
    geo.apply_cities(token, backend.cities("AE", "DU").await);
    geo.select_city("Dubai");

    checkout
        .set_billing(marigold_checkout::api::Address {
            first_name: "Amina".to_string(),
            last_name: "Haddad".to_string(),
            street: "1 Palm St".to_string(),
            city: geo.resolved_city().unwrap().to_string(),
            state_code: geo.selected_state().unwrap().to_string(),
            country_code: geo.selected_country().unwrap().to_string(),
            postal_code: "00000".to_string(),
            phone: None,
        })
        .unwrap();
    geo
}

// =============================================================================
// Flows
// =============================================================================

#[tokio::test]
async fn full_checkout_flow_with_coupon() {
    init_tracing();
    let backend = FakeBackend::with_coupon("30.00");
    let session = signed_in_session(&backend).await;
    let mut cart = cart_with_two_widgets();
    assert_eq!(cart.snapshot().subtotal, dec("100.00"));

    let mut checkout = CheckoutOrchestrator::new();
    checkout.begin(&session, &cart).unwrap();
    assemble_address(&backend, &mut checkout).await;

    let applied = checkout
        .apply_coupon(&backend, "SAVE", &cart.snapshot())
        .await
        .unwrap();
    assert_eq!(applied.total_after_discount(), dec("70.00"));
    assert_eq!(checkout.order_total(&cart.snapshot()), dec("70.00"));

    // Only the enabled gateway is offered
    let methods = checkout.payment_methods(&backend).await.unwrap();
    assert_eq!(methods.len(), 1);
    checkout.set_payment_method(&methods[0].id).unwrap();

    let confirmation = checkout
        .submit(&backend, &session, &mut cart)
        .await
        .unwrap();

    assert_eq!(confirmation.id, OrderId::new(1));
    assert!(cart.is_empty());
    assert_eq!(
        checkout.phase(),
        &Phase::Succeeded {
            order_id: OrderId::new(1)
        }
    );

    // The submitted draft carries ids and quantities, never prices
    let draft = backend.last_draft.lock().unwrap().take().unwrap();
    assert_eq!(draft["coupon_code"], "SAVE");
    assert_eq!(
        draft["line_items"],
        serde_json::json!([{"product_id": 1, "quantity": 2}])
    );
    assert_eq!(draft["billing"]["city"], "Dubai");
    assert_eq!(draft["shipping"]["country_code"], "AE");
}

#[tokio::test]
async fn oversized_coupon_floors_total_at_zero() {
    init_tracing();
    let backend = FakeBackend::with_coupon("150.00");
    let session = signed_in_session(&backend).await;
    let cart = cart_with_two_widgets();

    let mut checkout = CheckoutOrchestrator::new();
    checkout.begin(&session, &cart).unwrap();
    checkout
        .apply_coupon(&backend, "SAVE", &cart.snapshot())
        .await
        .unwrap();

    assert_eq!(checkout.order_total(&cart.snapshot()), Decimal::ZERO);
}

#[tokio::test]
async fn double_submit_creates_exactly_one_order() {
    init_tracing();
    let backend = FakeBackend::new();
    let session = signed_in_session(&backend).await;
    let mut cart = cart_with_two_widgets();

    let mut checkout = CheckoutOrchestrator::new();
    checkout.begin(&session, &cart).unwrap();
    assemble_address(&backend, &mut checkout).await;
    checkout.set_payment_method("cod").unwrap();

    // First attempt enters Submitting; the double tap must be refused
    // before it can build a second draft.
    let draft = checkout.begin_submit(&session, &cart.snapshot()).unwrap();
    assert!(matches!(
        checkout.begin_submit(&session, &cart.snapshot()),
        Err(CheckoutError::SubmissionInFlight)
    ));

    let outcome = backend.create_order(&draft).await;
    checkout.complete_submit(&mut cart, outcome).unwrap();

    assert_eq!(backend.orders_created.load(Ordering::SeqCst), 1);
    assert!(cart.is_empty());
}

#[tokio::test]
async fn stale_geography_response_never_lands() {
    init_tracing();
    let backend = FakeBackend::new();
    let mut geo = GeographyResolver::new();
    geo.load_countries(&backend).await;

    // Kick off a state fetch for AE, then switch to US before it resolves
    let ae_token = geo.select_country("AE");
    let ae_states = backend.states("AE").await;
    let us_token = geo.select_country("US");

    geo.apply_states(ae_token, ae_states);
    assert!(geo.states().is_loading(), "stale AE list must be dropped");

    geo.apply_states(us_token, backend.states("US").await);
    assert!(geo.states().options().is_empty());
    assert_eq!(geo.selected_country(), Some("US"));
}

#[tokio::test]
async fn forced_logout_preserves_cart() {
    init_tracing();
    let mut backend = FakeBackend::new();
    let mut session = signed_in_session(&backend).await;
    let mut cart = cart_with_two_widgets();

    backend.token_valid = false;
    assert!(!session.validate(&backend).await.unwrap());
    assert!(!session.is_authenticated());

    // The cart belongs to the device, not the session
    assert_eq!(cart.snapshot().subtotal, dec("100.00"));

    // And checkout now refuses to start
    let mut checkout = CheckoutOrchestrator::new();
    assert!(matches!(
        checkout.begin(&session, &cart),
        Err(CheckoutError::NotAuthenticated)
    ));

    // Signing back in resumes with the same cart
    session
        .login(&backend, "amina@example.com", "hunter2")
        .await
        .unwrap();
    checkout.begin(&session, &cart).unwrap();
    assemble_address(&backend, &mut checkout).await;
    checkout.set_payment_method("cod").unwrap();
    checkout
        .submit(&backend, &session, &mut cart)
        .await
        .unwrap();
    assert!(cart.is_empty());
}
