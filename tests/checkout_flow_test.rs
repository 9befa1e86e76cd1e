//! Checkout orchestration: vendor partitioning, commission math, stock
//! validation and the no-side-effects failure paths.

mod common;

use assert_matches::assert_matches;
use common::{order_input, TestApp};
use marketplace_api::{
    entities::order::{OrderStatus, PaymentStatus},
    entities::vendor_order::VendorOrderStatus,
    errors::ServiceError,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

#[tokio::test]
async fn checkout_two_vendors_creates_one_order_with_two_sub_orders() {
    let app = TestApp::new().await;
    let vendor_a = Uuid::new_v4();
    let vendor_b = Uuid::new_v4();
    let product_a = app
        .seed_product(vendor_a, "ceramic mug", dec!(25.00), 10, None)
        .await;
    let product_b = app
        .seed_product(vendor_b, "walnut board", dec!(40.00), 5, Some(dec!(20)))
        .await;

    let customer = app.customer();
    let detail = app
        .services
        .checkout
        .create_order(
            &customer,
            order_input(vec![(product_a.id, 1), (product_b.id, 2)]),
        )
        .await
        .expect("checkout should succeed");

    let order = &detail.order;
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert!(order.order_number.starts_with("ORD-"));
    assert_eq!(detail.vendor_orders.len(), 2);

    // Totals: 25 + 80 subtotal, 8% tax, flat 10 shipping.
    assert_eq!(order.subtotal, dec!(105.00));
    assert_eq!(order.tax, dec!(8.40));
    assert_eq!(order.shipping_total, dec!(10));
    assert_eq!(order.total, dec!(123.40));
    assert_eq!(
        order.total,
        order.subtotal + order.shipping_total + order.tax
    );

    // Commission: vendor A falls back to the 10% default, vendor B is 20%.
    let sub_a = detail
        .vendor_orders
        .iter()
        .find(|vo| vo.vendor_order.vendor_id == vendor_a)
        .expect("vendor A sub-order");
    let sub_b = detail
        .vendor_orders
        .iter()
        .find(|vo| vo.vendor_order.vendor_id == vendor_b)
        .expect("vendor B sub-order");

    assert_eq!(sub_a.vendor_order.commission_rate, dec!(10));
    assert_eq!(sub_a.vendor_order.commission_amount, dec!(2.50));
    assert_eq!(sub_a.vendor_order.vendor_earnings, dec!(22.50));
    assert_eq!(sub_b.vendor_order.commission_rate, dec!(20));
    assert_eq!(sub_b.vendor_order.commission_amount, dec!(16.00));
    assert_eq!(sub_b.vendor_order.vendor_earnings, dec!(64.00));
    assert_eq!(order.total_commission, dec!(18.50));

    // Commission split is exact: earnings + commission == subtotals.
    let earnings: Decimal = detail
        .vendor_orders
        .iter()
        .map(|vo| vo.vendor_order.vendor_earnings)
        .sum();
    assert_eq!(earnings + order.total_commission, order.subtotal);

    // Sub-orders start pending with their item snapshots in place.
    for vo in &detail.vendor_orders {
        assert_eq!(vo.vendor_order.status, VendorOrderStatus::Pending);
        assert!(!vo.items.is_empty());
    }

    // Stock was decremented.
    assert_eq!(app.product(product_a.id).await.stock, 9);
    assert_eq!(app.product(product_b.id).await.stock, 3);
}

#[tokio::test]
async fn checkout_clears_the_customer_cart() {
    let app = TestApp::new().await;
    let vendor = Uuid::new_v4();
    let product = app
        .seed_product(vendor, "candle", dec!(12.00), 8, None)
        .await;

    let customer = app.customer();
    app.seed_cart_item(customer.user_id, product.id, 2).await;
    assert_eq!(app.cart_len(customer.user_id).await, 1);

    app.services
        .checkout
        .create_order(&customer, order_input(vec![(product.id, 2)]))
        .await
        .expect("checkout");

    assert_eq!(app.cart_len(customer.user_id).await, 0);
}

#[tokio::test]
async fn shortfall_reports_every_product_and_changes_nothing() {
    let app = TestApp::new().await;
    let vendor = Uuid::new_v4();
    let scarce = app
        .seed_product(vendor, "limited print", dec!(60.00), 3, None)
        .await;
    let gone = app.seed_product(vendor, "sold out tee", dec!(20.00), 0, None).await;
    let fine = app.seed_product(vendor, "sticker", dec!(3.00), 50, None).await;

    let customer = app.customer();
    let err = app
        .services
        .checkout
        .create_order(
            &customer,
            order_input(vec![(scarce.id, 5), (gone.id, 1), (fine.id, 2)]),
        )
        .await
        .expect_err("stock check should fail");

    match err {
        ServiceError::InsufficientStock(shortfalls) => {
            assert_eq!(shortfalls.len(), 2);
            let s = shortfalls
                .iter()
                .find(|s| s.product_id == scarce.id)
                .expect("scarce product listed");
            assert_eq!(s.requested, 5);
            assert_eq!(s.available, 3);
            assert_eq!(s.product_name, "limited print");
            assert!(shortfalls.iter().any(|s| s.product_id == gone.id));
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    // No side effects: stock untouched, no order rows.
    assert_eq!(app.product(scarce.id).await.stock, 3);
    assert_eq!(app.product(gone.id).await.stock, 0);
    assert_eq!(app.product(fine.id).await.stock, 50);

    use sea_orm::EntityTrait;
    let orders = marketplace_api::entities::Order::find()
        .all(&*app.db)
        .await
        .unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
async fn inactive_products_fail_checkout_before_any_side_effect() {
    let app = TestApp::new().await;
    let vendor = Uuid::new_v4();
    let active = app.seed_product(vendor, "lamp", dec!(30.00), 5, None).await;
    let inactive = app
        .seed_inactive_product(vendor, "retired lamp", dec!(30.00), 5)
        .await;

    let customer = app.customer();
    let err = app
        .services
        .checkout
        .create_order(
            &customer,
            order_input(vec![(active.id, 1), (inactive.id, 1)]),
        )
        .await
        .expect_err("inactive product should fail checkout");

    assert_matches!(err, ServiceError::OrderCreation(_));
    assert_eq!(app.product(active.id).await.stock, 5);
}

#[tokio::test]
async fn unknown_product_fails_checkout() {
    let app = TestApp::new().await;
    let customer = app.customer();
    let err = app
        .services
        .checkout
        .create_order(&customer, order_input(vec![(Uuid::new_v4(), 1)]))
        .await
        .expect_err("unknown product should fail");
    assert_matches!(err, ServiceError::OrderCreation(_));
}

#[tokio::test]
async fn duplicate_products_are_rejected() {
    let app = TestApp::new().await;
    let vendor = Uuid::new_v4();
    let product = app.seed_product(vendor, "mug", dec!(10.00), 10, None).await;

    let customer = app.customer();
    let err = app
        .services
        .checkout
        .create_order(
            &customer,
            order_input(vec![(product.id, 1), (product.id, 2)]),
        )
        .await
        .expect_err("duplicate lines should be rejected");
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn empty_order_is_rejected() {
    let app = TestApp::new().await;
    let customer = app.customer();
    let err = app
        .services
        .checkout
        .create_order(&customer, order_input(vec![]))
        .await
        .expect_err("empty order should be rejected");
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn billing_address_defaults_to_shipping() {
    let app = TestApp::new().await;
    let vendor = Uuid::new_v4();
    let product = app.seed_product(vendor, "vase", dec!(45.00), 4, None).await;

    let customer = app.customer();
    let detail = app
        .services
        .checkout
        .create_order(&customer, order_input(vec![(product.id, 1)]))
        .await
        .expect("checkout");

    assert_eq!(
        detail.order.shipping_address,
        detail.order.billing_address
    );
}
