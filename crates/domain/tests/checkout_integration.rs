//! Integration tests for checkout, status lifecycle and payments.
//!
//! These run the domain services against the in-memory store, which takes
//! real per-row async locks, so the concurrency scenarios exercise the same
//! lock discipline the PostgreSQL store enforces with `FOR UPDATE`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{
    AddressId, ColorVariantId, Money, OrderStatus, PaymentMethodId, PaymentStatus, ProductId,
    RoleId, ShippingId, SizeVariantId, SystemClock, TransactionStatus, TxId, UserId,
};
use domain::{
    Basket, BasketLine, CheckoutConfig, DomainError, ErrorKind, Storefront, SubmitPayment,
    TransactionView,
};
use store::{
    Address, ColorVariant, InMemoryStore, PaymentMethod, Permission, Product, Role, Shipping,
    ShippingState, SizeVariant, Store, User,
};

const CUSTOMER_PERMISSIONS: &[(&str, &str)] = &[
    ("transactions", "create"),
    ("transactions", "read_own"),
    ("transactions", "cancel_own"),
    ("transactions", "pay_own"),
    ("orders", "cancel_own"),
    ("payments", "read_own"),
];

const ADMIN_PERMISSIONS: &[(&str, &str)] = &[
    ("transactions", "create"),
    ("transactions", "read"),
    ("transactions", "update"),
    ("transactions", "cancel"),
    ("transactions", "pay"),
    ("orders", "cancel"),
    ("payments", "read"),
    ("payments", "update"),
];

/// A seeded store with one admin, two customers and their addresses.
struct World {
    store: Arc<InMemoryStore>,
    app: Storefront,
    admin: UserId,
    alice: UserId,
    bob: UserId,
    alice_address: AddressId,
    bob_address: AddressId,
    shipping: ShippingId,
    payment_method: PaymentMethodId,
}

/// One purchasable product/color/size chain.
#[derive(Clone, Copy)]
struct Sku {
    product: ProductId,
    color: ColorVariantId,
    size: SizeVariantId,
}

impl Sku {
    fn line(&self, quantity: i32) -> BasketLine {
        BasketLine {
            product_id: self.product,
            color_variant_id: self.color,
            size_variant_id: self.size,
            quantity,
        }
    }
}

async fn add_role(store: &InMemoryStore, name: &str, level: i32, grants: &[(&str, &str)]) -> RoleId {
    let id = RoleId::new();
    store
        .insert_role(Role {
            id,
            name: name.to_string(),
            description: String::new(),
            is_system_role: true,
            level,
        })
        .await
        .unwrap();
    for (resource, action) in grants {
        let permission = Permission::new(resource, action);
        let permission_id = permission.id;
        store.insert_permission(permission).await;
        store.grant_permission(id, permission_id).await;
    }
    id
}

async fn add_user(store: &InMemoryStore, role_id: RoleId, name: &str) -> UserId {
    let id = UserId::new();
    store
        .insert_user(User {
            id,
            email: format!("{name}@example.com"),
            username: name.to_string(),
            password_hash: String::new(),
            role_id,
            is_active: true,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    id
}

async fn add_address(store: &InMemoryStore, user_id: UserId) -> AddressId {
    let id = AddressId::new();
    store
        .insert_address(Address {
            id,
            user_id,
            recipient_name: "Recipient".to_string(),
            phone: "555-0100".to_string(),
            province: "West".to_string(),
            city: "Springfield".to_string(),
            district: "Central".to_string(),
            postal_code: "10110".to_string(),
            full_address: "Main St 1".to_string(),
        })
        .await;
    id
}

async fn world_with(store: InMemoryStore, config: CheckoutConfig) -> World {
    let store = Arc::new(store);
    let customer_role = add_role(&store, "customer", 1, CUSTOMER_PERMISSIONS).await;
    let admin_role = add_role(&store, "admin", 10, ADMIN_PERMISSIONS).await;

    let admin = add_user(&store, admin_role, "admin").await;
    let alice = add_user(&store, customer_role, "alice").await;
    let bob = add_user(&store, customer_role, "bob").await;
    let alice_address = add_address(&store, alice).await;
    let bob_address = add_address(&store, bob).await;

    let shipping = ShippingId::new();
    store
        .insert_shipping(Shipping {
            id: shipping,
            name: "Courier".to_string(),
            price: Money::from_minor(10_000),
            state: ShippingState::Active,
        })
        .await;
    let payment_method = PaymentMethodId::new();
    store
        .insert_payment_method(PaymentMethod {
            id: payment_method,
            account_name: "Shop".to_string(),
            account_number: "0001".to_string(),
            bank_name: "Bank".to_string(),
            image_url: None,
            is_active: true,
        })
        .await;

    let app = Storefront::new(store.clone(), Arc::new(SystemClock), config);
    World {
        store,
        app,
        admin,
        alice,
        bob,
        alice_address,
        bob_address,
        shipping,
        payment_method,
    }
}

async fn world() -> World {
    world_with(InMemoryStore::new(), CheckoutConfig::default()).await
}

impl World {
    async fn add_sku(&self, price: i64, stock: i32) -> Sku {
        let sku = Sku {
            product: ProductId::new(),
            color: ColorVariantId::new(),
            size: SizeVariantId::new(),
        };
        self.store
            .insert_product(Product {
                id: sku.product,
                name: "Shirt".to_string(),
                category_id: None,
                base_price: Money::from_minor(price),
                description: String::new(),
                rating: 0.0,
                deleted_at: None,
            })
            .await;
        self.store
            .insert_color_variant(ColorVariant {
                id: sku.color,
                product_id: sku.product,
                name: "Red".to_string(),
                color_code: "#ff0000".to_string(),
                image_url: None,
            })
            .await
            .unwrap();
        self.store
            .insert_size_variant(SizeVariant {
                id: sku.size,
                color_variant_id: sku.color,
                size_label: "M".to_string(),
                stock,
            })
            .await
            .unwrap();
        sku
    }

    fn basket(&self, address: AddressId, lines: Vec<BasketLine>) -> Basket {
        Basket {
            address_id: address,
            shipping_id: self.shipping,
            payment_method_id: self.payment_method,
            shipping_price: Money::from_minor(10_000),
            lines,
        }
    }

    async fn stock(&self, sku: Sku) -> i32 {
        self.store
            .get_size_variant(sku.size)
            .await
            .unwrap()
            .unwrap()
            .stock
    }

    async fn checkout_alice(&self, lines: Vec<BasketLine>) -> Result<TransactionView, DomainError> {
        self.app
            .checkout
            .checkout(self.alice, self.basket(self.alice_address, lines))
            .await
    }

    async fn advance(&self, tx_id: &TxId, path: &[TransactionStatus]) {
        for to in path {
            self.app
                .lifecycle
                .advance_transaction(self.admin, tx_id, *to)
                .await
                .unwrap();
        }
    }
}

mod checkout {
    use super::*;

    #[tokio::test]
    async fn checkout_reserves_stock_and_totals() {
        let w = world().await;
        let shirt = w.add_sku(70_000, 5).await;
        let socks = w.add_sku(5_000, 10).await;

        let view = w
            .checkout_alice(vec![shirt.line(2), socks.line(3)])
            .await
            .unwrap();

        assert!(view.tx_id.as_str().starts_with("TRX-"));
        assert_eq!(view.status, TransactionStatus::WaitingPayment);
        assert_eq!(view.total_price, Money::from_minor(140_000 + 15_000 + 10_000));
        assert!(view.total_is_consistent());
        assert_eq!(view.orders.len(), 2);
        for order in &view.orders {
            assert!(order.id.as_str().starts_with("TXO"));
            assert_eq!(order.status, OrderStatus::Pending);
            assert_eq!(
                order.subtotal,
                order.unit_price.checked_mul(order.quantity).unwrap()
            );
        }
        assert_eq!(view.address.id, w.alice_address);
        assert_eq!(view.shipping.id, w.shipping);

        assert_eq!(w.stock(shirt).await, 3);
        assert_eq!(w.stock(socks).await, 7);
    }

    #[tokio::test]
    async fn read_back_matches_basket() {
        let w = world().await;
        let a = w.add_sku(1_000, 5).await;
        let b = w.add_sku(2_000, 5).await;
        let lines = vec![b.line(1), a.line(4)];

        let created = w.checkout_alice(lines.clone()).await.unwrap();
        let read = w
            .app
            .queries
            .get_transaction(w.alice, &created.tx_id)
            .await
            .unwrap();
        assert_eq!(read, created);

        let mut observed: Vec<_> = read
            .orders
            .iter()
            .map(|o| (o.size_variant_id, o.quantity))
            .collect();
        let mut expected: Vec<_> = lines.iter().map(|l| (l.size_variant_id, l.quantity)).collect();
        observed.sort();
        expected.sort();
        assert_eq!(observed, expected);
    }

    #[tokio::test]
    async fn unit_price_is_snapshotted() {
        let w = world().await;
        let sku = w.add_sku(50_000, 5).await;

        let view = w.checkout_alice(vec![sku.line(1)]).await.unwrap();
        w.store
            .set_product_price(sku.product, Money::from_minor(99_000))
            .await;

        let read = w
            .app
            .queries
            .get_transaction(w.alice, &view.tx_id)
            .await
            .unwrap();
        assert_eq!(read.orders[0].unit_price, Money::from_minor(50_000));
        assert_eq!(read.total_price, Money::from_minor(60_000));
    }

    #[tokio::test]
    async fn insufficient_stock_rolls_back_earlier_lines() {
        let w = world().await;
        let plenty = w.add_sku(1_000, 10).await;
        let scarce = w.add_sku(1_000, 1).await;

        let err = w
            .checkout_alice(vec![plenty.line(2), scarce.line(2)])
            .await
            .unwrap_err();

        match err {
            DomainError::InsufficientStock {
                product_id,
                size_variant_id,
                requested,
                available,
            } => {
                assert_eq!(product_id, scarce.product);
                assert_eq!(size_variant_id, scarce.size);
                assert_eq!(requested, 2);
                assert_eq!(available, 1);
            }
            other => panic!("expected insufficient stock, got {other:?}"),
        }
        assert_eq!(w.stock(plenty).await, 10);
        assert_eq!(w.stock(scarce).await, 1);
        assert_eq!(w.store.transaction_count().await, 0);
        assert_eq!(w.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn address_of_another_user_is_forbidden() {
        let w = world().await;
        let sku = w.add_sku(1_000, 5).await;

        let err = w
            .app
            .checkout
            .checkout(w.alice, w.basket(w.bob_address, vec![sku.line(1)]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(w.stock(sku).await, 5);
    }

    #[tokio::test]
    async fn inactive_shipping_is_forbidden() {
        let w = world().await;
        let sku = w.add_sku(1_000, 5).await;
        let inactive = ShippingId::new();
        w.store
            .insert_shipping(Shipping {
                id: inactive,
                name: "Retired".to_string(),
                price: Money::zero(),
                state: ShippingState::Inactive,
            })
            .await;

        let mut basket = w.basket(w.alice_address, vec![sku.line(1)]);
        basket.shipping_id = inactive;
        let err = w.app.checkout.checkout(w.alice, basket).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn missing_references_are_not_found() {
        let w = world().await;
        let sku = w.add_sku(1_000, 5).await;

        let mut basket = w.basket(w.alice_address, vec![sku.line(1)]);
        basket.payment_method_id = PaymentMethodId::new();
        let err = w.app.checkout.checkout(w.alice, basket).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let mut line = sku.line(1);
        line.size_variant_id = SizeVariantId::new();
        let err = w.checkout_alice(vec![line]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn deleted_product_is_not_found() {
        let w = world().await;
        let sku = w.add_sku(1_000, 5).await;
        w.store
            .insert_product(Product {
                id: sku.product,
                name: "Shirt".to_string(),
                category_id: None,
                base_price: Money::from_minor(1_000),
                description: String::new(),
                rating: 0.0,
                deleted_at: Some(Utc::now()),
            })
            .await;

        let err = w.checkout_alice(vec![sku.line(1)]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn broken_variant_chain_is_invalid_basket() {
        let w = world().await;
        let a = w.add_sku(1_000, 5).await;
        let b = w.add_sku(1_000, 5).await;

        let mixed = BasketLine {
            product_id: a.product,
            color_variant_id: a.color,
            size_variant_id: b.size,
            quantity: 1,
        };
        let err = w.checkout_alice(vec![mixed]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidBasket);
        assert_eq!(w.stock(b).await, 5);
    }

    #[tokio::test]
    async fn user_without_create_permission_is_forbidden() {
        let w = world().await;
        let sku = w.add_sku(1_000, 5).await;
        let viewer_role = add_role(&w.store, "viewer", 0, &[]).await;
        let viewer = add_user(&w.store, viewer_role, "viewer").await;
        let address = add_address(&w.store, viewer).await;

        let err = w
            .app
            .checkout
            .checkout(viewer, w.basket(address, vec![sku.line(1)]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }
}

mod concurrency {
    use super::*;

    /// Two buyers race for the last unit.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn last_unit_is_sold_once() {
        let w = Arc::new(world().await);
        let sku = w.add_sku(80_000, 1).await;

        let alice = {
            let w = w.clone();
            tokio::spawn(async move { w.checkout_alice(vec![sku.line(1)]).await })
        };
        let bob = {
            let w = w.clone();
            tokio::spawn(async move {
                w.app
                    .checkout
                    .checkout(w.bob, w.basket(w.bob_address, vec![sku.line(1)]))
                    .await
            })
        };
        let results = [alice.await.unwrap(), bob.await.unwrap()];

        let committed: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        let failed: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
        assert_eq!(committed.len(), 1);
        assert!(committed[0].total_price > Money::zero());
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].kind(), ErrorKind::InsufficientStock);
        assert_eq!(w.stock(sku).await, 0);
    }

    /// Opposite line orders still lock in the same order, so neither side
    /// can deadlock or time out.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cross_baskets_do_not_deadlock() {
        let store = InMemoryStore::new().with_lock_timeout(Duration::from_secs(2));
        let w = Arc::new(world_with(store, CheckoutConfig::default()).await);
        let ten = w.add_sku(1_000, 100).await;
        let twenty = w.add_sku(1_000, 100).await;

        let mut handles = Vec::new();
        for i in 0..20 {
            let w = w.clone();
            handles.push(tokio::spawn(async move {
                let lines = if i % 2 == 0 {
                    vec![ten.line(1), twenty.line(1)]
                } else {
                    vec![twenty.line(1), ten.line(1)]
                };
                if i % 4 < 2 {
                    w.checkout_alice(lines).await
                } else {
                    w.app
                        .checkout
                        .checkout(w.bob, w.basket(w.bob_address, lines))
                        .await
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(w.stock(ten).await, 80);
        assert_eq!(w.stock(twenty).await, 80);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stock_never_goes_negative_under_contention() {
        let w = Arc::new(world().await);
        let sku = w.add_sku(1_000, 7).await;

        let mut handles = Vec::new();
        for _ in 0..12 {
            let w = w.clone();
            handles.push(tokio::spawn(
                async move { w.checkout_alice(vec![sku.line(1)]).await },
            ));
        }
        let mut sold = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => sold += 1,
                Err(e) => assert_eq!(e.kind(), ErrorKind::InsufficientStock),
            }
        }

        assert_eq!(sold, 7);
        assert_eq!(w.stock(sku).await, 0);
        assert_eq!(w.store.order_count().await, 7);
    }

    #[tokio::test]
    async fn deadline_exceeded_is_timeout() {
        let config = CheckoutConfig {
            timeout: Duration::from_millis(100),
            lock_retries: 3,
        };
        let w = world_with(InMemoryStore::new(), config).await;
        let sku = w.add_sku(1_000, 5).await;

        let mut holder = w.store.begin().await.unwrap();
        holder.load_variant_for_update(sku.size).await.unwrap();

        let err = w.checkout_alice(vec![sku.line(1)]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.is_retriable());

        drop(holder);
        assert_eq!(w.stock(sku).await, 5);
        assert_eq!(w.store.transaction_count().await, 0);
    }

    #[tokio::test]
    async fn lock_retries_exhausted_is_conflict() {
        let store = InMemoryStore::new().with_lock_timeout(Duration::from_millis(30));
        let config = CheckoutConfig {
            timeout: Duration::from_secs(5),
            lock_retries: 2,
        };
        let w = world_with(store, config).await;
        let sku = w.add_sku(1_000, 5).await;

        let mut holder = w.store.begin().await.unwrap();
        holder.load_variant_for_update(sku.size).await.unwrap();

        let err = w.checkout_alice(vec![sku.line(1)]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        drop(holder);
        w.checkout_alice(vec![sku.line(1)]).await.unwrap();
        assert_eq!(w.stock(sku).await, 4);
    }
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn cancel_restores_stock() {
        let w = world().await;
        let sku = w.add_sku(1_000, 5).await;

        let view = w.checkout_alice(vec![sku.line(3)]).await.unwrap();
        assert_eq!(w.stock(sku).await, 2);

        let cancelled = w
            .app
            .lifecycle
            .cancel_transaction(w.alice, &view.tx_id)
            .await
            .unwrap();
        assert_eq!(cancelled.status, TransactionStatus::Cancelled);
        assert!(
            cancelled
                .orders
                .iter()
                .all(|o| o.status == OrderStatus::Cancelled)
        );
        assert_eq!(w.stock(sku).await, 5);
    }

    #[tokio::test]
    async fn cancelling_twice_is_illegal_without_side_effects() {
        let w = world().await;
        let sku = w.add_sku(1_000, 5).await;
        let view = w.checkout_alice(vec![sku.line(3)]).await.unwrap();

        w.app
            .lifecycle
            .cancel_transaction(w.alice, &view.tx_id)
            .await
            .unwrap();
        let err = w
            .app
            .lifecycle
            .cancel_transaction(w.alice, &view.tx_id)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::IllegalTransition);
        assert_eq!(w.stock(sku).await, 5);
    }

    #[tokio::test]
    async fn other_customer_cannot_cancel() {
        let w = world().await;
        let sku = w.add_sku(1_000, 5).await;
        let view = w.checkout_alice(vec![sku.line(1)]).await.unwrap();

        let err = w
            .app
            .lifecycle
            .cancel_transaction(w.bob, &view.tx_id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(w.stock(sku).await, 4);
    }

    #[tokio::test]
    async fn cancel_order_cancels_its_transaction() {
        let w = world().await;
        let a = w.add_sku(1_000, 5).await;
        let b = w.add_sku(1_000, 5).await;
        let view = w
            .checkout_alice(vec![a.line(1), b.line(2)])
            .await
            .unwrap();

        let cancelled = w
            .app
            .lifecycle
            .cancel_order(w.alice, &view.orders[0].id)
            .await
            .unwrap();
        assert_eq!(cancelled.tx_id, view.tx_id);
        assert_eq!(cancelled.status, TransactionStatus::Cancelled);
        assert_eq!(w.stock(a).await, 5);
        assert_eq!(w.stock(b).await, 5);

        let err = w
            .app
            .lifecycle
            .cancel_order(w.bob, &view.orders[1].id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn cancel_after_payment_requests_refund() {
        let w = world().await;
        let sku = w.add_sku(1_000, 5).await;
        let view = w.checkout_alice(vec![sku.line(2)]).await.unwrap();
        w.advance(&view.tx_id, &[TransactionStatus::Paid]).await;

        let requested = w
            .app
            .lifecycle
            .cancel_transaction(w.alice, &view.tx_id)
            .await
            .unwrap();
        assert_eq!(requested.status, TransactionStatus::RefundRequested);
        // Refunds are status only; reserved stock stays reserved.
        assert_eq!(w.stock(sku).await, 3);

        let refunded = w
            .app
            .lifecycle
            .advance_transaction(w.admin, &view.tx_id, TransactionStatus::Refunded)
            .await
            .unwrap();
        assert_eq!(refunded.status, TransactionStatus::Refunded);
    }

    #[tokio::test]
    async fn orders_follow_their_transaction() {
        let w = world().await;
        let sku = w.add_sku(1_000, 5).await;
        let view = w.checkout_alice(vec![sku.line(1)]).await.unwrap();
        let lifecycle = &w.app.lifecycle;

        let paid = lifecycle
            .advance_transaction(w.admin, &view.tx_id, TransactionStatus::Paid)
            .await
            .unwrap();
        assert_eq!(paid.orders[0].status, OrderStatus::Packaged);

        let packed = lifecycle
            .advance_transaction(w.admin, &view.tx_id, TransactionStatus::Packed)
            .await
            .unwrap();
        assert_eq!(packed.orders[0].status, OrderStatus::Packaged);

        let shipped = lifecycle
            .advance_transaction(w.admin, &view.tx_id, TransactionStatus::Shipped)
            .await
            .unwrap();
        assert_eq!(shipped.orders[0].status, OrderStatus::OnDelivery);

        let completed = lifecycle
            .advance_transaction(w.admin, &view.tx_id, TransactionStatus::Completed)
            .await
            .unwrap();
        assert_eq!(completed.orders[0].status, OrderStatus::Received);

        let stored = w.store.get_order(&view.orders[0].id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Received);
    }

    #[tokio::test]
    async fn shipped_to_paid_is_rejected() {
        let w = world().await;
        let sku = w.add_sku(1_000, 5).await;
        let view = w.checkout_alice(vec![sku.line(1)]).await.unwrap();
        w.advance(
            &view.tx_id,
            &[
                TransactionStatus::Paid,
                TransactionStatus::Packed,
                TransactionStatus::Shipped,
            ],
        )
        .await;

        let err = w
            .app
            .lifecycle
            .advance_transaction(w.admin, &view.tx_id, TransactionStatus::Paid)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalTransition);

        let stored = w.store.get_transaction(&view.tx_id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Shipped);
    }

    #[tokio::test]
    async fn repeating_the_current_status_is_a_no_op() {
        let w = world().await;
        let sku = w.add_sku(1_000, 5).await;
        let view = w.checkout_alice(vec![sku.line(1)]).await.unwrap();
        w.advance(&view.tx_id, &[TransactionStatus::Paid]).await;

        let again = w
            .app
            .lifecycle
            .advance_transaction(w.admin, &view.tx_id, TransactionStatus::Paid)
            .await
            .unwrap();
        assert_eq!(again.status, TransactionStatus::Paid);
        assert_eq!(again.orders[0].status, OrderStatus::Packaged);
    }

    #[tokio::test]
    async fn customers_cannot_update_status() {
        let w = world().await;
        let sku = w.add_sku(1_000, 5).await;
        let view = w.checkout_alice(vec![sku.line(1)]).await.unwrap();

        let err = w
            .app
            .lifecycle
            .advance_transaction(w.alice, &view.tx_id, TransactionStatus::Paid)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }
}

mod ownership {
    use super::*;

    #[tokio::test]
    async fn foreign_and_missing_transactions_look_the_same() {
        let w = world().await;
        let sku = w.add_sku(1_000, 5).await;
        let view = w.checkout_alice(vec![sku.line(1)]).await.unwrap();

        let foreign = w
            .app
            .queries
            .get_transaction(w.bob, &view.tx_id)
            .await
            .unwrap_err();
        let missing = w
            .app
            .queries
            .get_transaction(w.bob, &TxId::generate(Utc::now()))
            .await
            .unwrap_err();

        assert_eq!(foreign.kind(), ErrorKind::Forbidden);
        assert_eq!(missing.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn admin_sees_any_transaction_and_missing_ones_as_not_found() {
        let w = world().await;
        let sku = w.add_sku(1_000, 5).await;
        let view = w.checkout_alice(vec![sku.line(1)]).await.unwrap();

        let read = w
            .app
            .queries
            .get_transaction(w.admin, &view.tx_id)
            .await
            .unwrap();
        assert_eq!(read.tx_id, view.tx_id);

        let err = w
            .app
            .queries
            .get_transaction(w.admin, &TxId::generate(Utc::now()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}

mod payments {
    use super::*;

    async fn checkout_for_150k(w: &World) -> TransactionView {
        let sku = w.add_sku(70_000, 5).await;
        let view = w.checkout_alice(vec![sku.line(2)]).await.unwrap();
        assert_eq!(view.total_price, Money::from_minor(150_000));
        view
    }

    fn pay(tx: &TransactionView, amount: i64) -> SubmitPayment {
        SubmitPayment {
            transaction_id: tx.tx_id.clone(),
            total_payment: Money::from_minor(amount),
        }
    }

    #[tokio::test]
    async fn mismatched_total_is_rejected() {
        let w = world().await;
        let tx = checkout_for_150k(&w).await;

        let err = w
            .app
            .payments
            .submit(w.alice, pay(&tx, 149_000))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.to_string().contains("total payment does not match"));
    }

    #[tokio::test]
    async fn confirmed_payment_marks_transaction_paid() {
        let w = world().await;
        let tx = checkout_for_150k(&w).await;

        let payment = w
            .app
            .payments
            .submit(w.alice, pay(&tx, 150_000))
            .await
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);

        let confirmed = w
            .app
            .payments
            .update_status(w.admin, payment.id, PaymentStatus::Confirmed)
            .await
            .unwrap();
        assert_eq!(confirmed.status, PaymentStatus::Confirmed);

        let view = w
            .app
            .queries
            .get_transaction(w.alice, &tx.tx_id)
            .await
            .unwrap();
        assert_eq!(view.status, TransactionStatus::Paid);
        assert_eq!(view.orders[0].status, OrderStatus::Packaged);
    }

    #[tokio::test]
    async fn only_one_open_payment_per_transaction() {
        let w = world().await;
        let tx = checkout_for_150k(&w).await;

        w.app
            .payments
            .submit(w.alice, pay(&tx, 150_000))
            .await
            .unwrap();
        let err = w
            .app
            .payments
            .submit(w.alice, pay(&tx, 150_000))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn rejected_payment_is_resubmitted() {
        let w = world().await;
        let tx = checkout_for_150k(&w).await;

        let first = w
            .app
            .payments
            .submit(w.alice, pay(&tx, 150_000))
            .await
            .unwrap();
        w.app
            .payments
            .update_status(w.admin, first.id, PaymentStatus::Rejected)
            .await
            .unwrap();

        let again = w
            .app
            .payments
            .submit(w.alice, pay(&tx, 150_000))
            .await
            .unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.status, PaymentStatus::Pending);
        assert_eq!(
            w.store.get_payments_for_transaction(&tx.tx_id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn payment_requires_waiting_transaction() {
        let w = world().await;
        let tx = checkout_for_150k(&w).await;
        w.app
            .lifecycle
            .cancel_transaction(w.alice, &tx.tx_id)
            .await
            .unwrap();

        let err = w
            .app
            .payments
            .submit(w.alice, pay(&tx, 150_000))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn strangers_cannot_pay_or_read() {
        let w = world().await;
        let tx = checkout_for_150k(&w).await;

        let err = w
            .app
            .payments
            .submit(w.bob, pay(&tx, 150_000))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let payment = w
            .app
            .payments
            .submit(w.alice, pay(&tx, 150_000))
            .await
            .unwrap();
        assert_eq!(
            w.app.payments.get(w.alice, payment.id).await.unwrap().id,
            payment.id
        );
        let err = w.app.payments.get(w.bob, payment.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn refunded_payment_completes_refund() {
        let w = world().await;
        let tx = checkout_for_150k(&w).await;
        let payment = w
            .app
            .payments
            .submit(w.alice, pay(&tx, 150_000))
            .await
            .unwrap();
        w.app
            .payments
            .update_status(w.admin, payment.id, PaymentStatus::Confirmed)
            .await
            .unwrap();
        w.app
            .lifecycle
            .cancel_transaction(w.alice, &tx.tx_id)
            .await
            .unwrap();

        w.app
            .payments
            .update_status(w.admin, payment.id, PaymentStatus::Refunded)
            .await
            .unwrap();

        let stored = w.store.get_transaction(&tx.tx_id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Refunded);
    }

    #[tokio::test]
    async fn illegal_payment_transition_is_rejected() {
        let w = world().await;
        let tx = checkout_for_150k(&w).await;
        let payment = w
            .app
            .payments
            .submit(w.alice, pay(&tx, 150_000))
            .await
            .unwrap();

        let err = w
            .app
            .payments
            .update_status(w.admin, payment.id, PaymentStatus::Completed)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalTransition);

        let err = w
            .app
            .payments
            .update_status(w.alice, payment.id, PaymentStatus::Confirmed)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn cancelled_transaction_cancels_pending_payment() {
        let w = world().await;
        let sku = w.add_sku(70_000, 5).await;
        let tx = w.checkout_alice(vec![sku.line(2)]).await.unwrap();
        let payment = w
            .app
            .payments
            .submit(w.alice, pay(&tx, 150_000))
            .await
            .unwrap();
        w.app
            .lifecycle
            .cancel_transaction(w.alice, &tx.tx_id)
            .await
            .unwrap();

        let stored = w.store.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Cancelled);

        let err = w
            .app
            .payments
            .update_status(w.admin, payment.id, PaymentStatus::Confirmed)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalTransition);

        let stored = w.store.get_transaction(&tx.tx_id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Cancelled);
        assert_eq!(w.stock(sku).await, 5);
    }

    #[tokio::test]
    async fn payment_cannot_leave_its_transaction_behind() {
        let w = world().await;
        let tx = checkout_for_150k(&w).await;
        let payment = w
            .app
            .payments
            .submit(w.alice, pay(&tx, 150_000))
            .await
            .unwrap();

        // A pending payment on a paid transaction would contradict it.
        w.advance(&tx.tx_id, &[TransactionStatus::Paid]).await;
        let stored = w.store.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Confirmed);

        // Refunding before a refund was requested.
        let err = w
            .app
            .payments
            .update_status(w.admin, payment.id, PaymentStatus::Refunded)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalTransition);
        assert!(err.to_string().contains("while its transaction is paid"));

        let stored = w.store.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Confirmed);
        w.advance(&tx.tx_id, &[TransactionStatus::Packed, TransactionStatus::Shipped])
            .await;
        let stored = w.store.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Confirmed);
    }

    #[tokio::test]
    async fn admin_refund_refunds_confirmed_payment() {
        let w = world().await;
        let tx = checkout_for_150k(&w).await;
        let payment = w
            .app
            .payments
            .submit(w.alice, pay(&tx, 150_000))
            .await
            .unwrap();
        w.app
            .payments
            .update_status(w.admin, payment.id, PaymentStatus::Confirmed)
            .await
            .unwrap();

        w.advance(
            &tx.tx_id,
            &[TransactionStatus::RefundRequested, TransactionStatus::Refunded],
        )
        .await;

        let stored = w.store.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn completed_payment_keeps_shipped_transaction() {
        let w = world().await;
        let tx = checkout_for_150k(&w).await;
        let payment = w
            .app
            .payments
            .submit(w.alice, pay(&tx, 150_000))
            .await
            .unwrap();
        w.app
            .payments
            .update_status(w.admin, payment.id, PaymentStatus::Confirmed)
            .await
            .unwrap();
        w.advance(&tx.tx_id, &[TransactionStatus::Packed, TransactionStatus::Shipped])
            .await;

        let completed = w
            .app
            .payments
            .update_status(w.admin, payment.id, PaymentStatus::Completed)
            .await
            .unwrap();
        assert_eq!(completed.status, PaymentStatus::Completed);

        let stored = w.store.get_transaction(&tx.tx_id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Shipped);
    }
}
