//! Checkout and order placement, end to end through the service layer.

mod common;

use common::*;

use checkstand_api::services::{checkout, orders};
use checkstand_api::ServiceError;
use checkstand_core::{LineIssueKind, Money, OrderStatus, PaymentStatus};
use checkstand_db::DbError;

fn is_out_of_stock(err: &ServiceError) -> bool {
    match err {
        ServiceError::OutOfStock { .. } => true,
        // Lost the race before validation rather than at the decrement
        ServiceError::CheckoutRejected(issues) => issues
            .iter()
            .all(|issue| matches!(issue.kind, LineIssueKind::OutOfStock { .. })),
        _ => false,
    }
}

#[tokio::test]
async fn test_valid_cart_places_order_and_reserves_stock() {
    let db = test_db().await;
    let p1 = seed_product(&db, "p1", 1000, Some(5)).await;
    let (state, _, _) = test_state(db.clone());

    let request = checkout_request(vec![line(&p1.id, 2, 1000)]);
    let details = checkout::place_order(&state, OWNER, &request).await.unwrap();
    let order = &details.order;

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.subtotal_cents, 2000);
    assert_eq!(order.tax_cents, 160);
    assert_eq!(order.shipping_cents, 999);
    assert_eq!(order.total_cents, 3159);
    assert!(order.order_number.starts_with("ORD-"));

    assert_eq!(details.items.len(), 1);
    assert_eq!(details.items[0].quantity, 2);
    assert_eq!(details.items[0].product_name, "p1");
    assert_eq!(details.shipping_address.country, "GB");

    assert_eq!(db.catalog().stock_quantity(&p1.id).await.unwrap(), Some(3));
}

#[tokio::test]
async fn test_order_total_matches_preview() {
    let db = test_db().await;
    let p1 = seed_product(&db, "p1", 2599, Some(10)).await;
    let p2 = seed_product(&db, "p2", 1250, None).await;
    let (state, _, _) = test_state(db);

    let lines = vec![line(&p1.id, 2, 2599), line(&p2.id, 3, 1250)];
    let preview = checkout::preview(&state, &checkout::PreviewRequest { lines: lines.clone() })
        .await
        .unwrap();

    let details = checkout::place_order(&state, OWNER, &checkout_request(lines)).await.unwrap();

    assert_eq!(details.order.totals(), preview);
    // 8948 is over the free shipping threshold
    assert_eq!(preview.shipping, Money::zero());
}

#[tokio::test]
async fn test_free_items_still_pay_shipping() {
    let db = test_db().await;
    let sample = seed_product(&db, "sample", 0, Some(3)).await;
    let (state, _, _) = test_state(db.clone());

    let lines = vec![line(&sample.id, 1, 0)];
    let preview = checkout::preview(&state, &checkout::PreviewRequest { lines: lines.clone() })
        .await
        .unwrap();
    let details = checkout::place_order(&state, OWNER, &checkout_request(lines)).await.unwrap();

    assert_eq!(details.order.subtotal_cents, 0);
    assert_eq!(details.order.tax_cents, 0);
    assert_eq!(details.order.shipping_cents, 999);
    assert_eq!(details.order.total_cents, 999);
    assert_eq!(details.order.totals(), preview);
    assert_eq!(db.catalog().stock_quantity(&sample.id).await.unwrap(), Some(2));
}

#[tokio::test]
async fn test_preview_of_unknown_lines_quotes_zero() {
    let db = test_db().await;
    let (state, _, _) = test_state(db);

    let lines = vec![line("no-such-product", 1, 500)];
    let preview = checkout::preview(&state, &checkout::PreviewRequest { lines })
        .await
        .unwrap();

    assert_eq!(preview.total, Money::zero());
    assert_eq!(preview.shipping, Money::zero());
}

#[tokio::test]
async fn test_tampered_price_is_rejected_without_side_effects() {
    let db = test_db().await;
    let p1 = seed_product(&db, "p1", 1200, Some(5)).await;
    let (state, _, _) = test_state(db.clone());

    let request = checkout_request(vec![line(&p1.id, 2, 1000)]);
    let err = checkout::place_order(&state, OWNER, &request).await.unwrap_err();

    match err {
        ServiceError::CheckoutRejected(issues) => {
            assert_eq!(issues.len(), 1);
            assert_eq!(
                issues[0].kind,
                LineIssueKind::PriceMismatch {
                    claimed: Money::from_cents(1000),
                    authoritative: Money::from_cents(1200),
                }
            );
        }
        other => panic!("expected CheckoutRejected, got {:?}", other),
    }

    assert_eq!(db.catalog().stock_quantity(&p1.id).await.unwrap(), Some(5));
    assert!(orders::list_orders(&state, OWNER).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejection_lists_every_bad_line() {
    let db = test_db().await;
    let cheap = seed_product(&db, "cheap", 500, Some(1)).await;
    let repriced = seed_product(&db, "repriced", 900, None).await;
    let (state, _, _) = test_state(db);

    let request = checkout_request(vec![
        line(&cheap.id, 3, 500),
        line("no-such-product", 1, 100),
        line(&repriced.id, 1, 700),
    ]);
    let err = checkout::place_order(&state, OWNER, &request).await.unwrap_err();

    let ServiceError::CheckoutRejected(issues) = err else {
        panic!("expected CheckoutRejected");
    };
    let lines: Vec<usize> = issues.iter().map(|i| i.line).collect();
    assert_eq!(lines, vec![0, 1, 2]);
    assert!(matches!(issues[0].kind, LineIssueKind::OutOfStock { available: Some(1), requested: 3 }));
    assert_eq!(issues[1].kind, LineIssueKind::NotFound);
    assert!(matches!(issues[2].kind, LineIssueKind::PriceMismatch { .. }));
}

#[tokio::test]
async fn test_claimed_subtotal_must_match() {
    let db = test_db().await;
    let p1 = seed_product(&db, "p1", 1000, None).await;
    let (state, _, _) = test_state(db);

    let mut request = checkout_request(vec![line(&p1.id, 2, 1000)]);
    request.claimed_subtotal_cents = 1500;

    let err = checkout::place_order(&state, OWNER, &request).await.unwrap_err();
    assert!(matches!(err, ServiceError::TotalMismatch { .. }));
}

#[tokio::test]
async fn test_malformed_request_is_a_validation_error() {
    let db = test_db().await;
    let (state, _, _) = test_state(db);

    let err = checkout::place_order(&state, OWNER, &checkout_request(vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let err = checkout::place_order(&state, "", &checkout_request(vec![line("p", 1, 100)]))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn test_validated_checkouts_race_for_last_unit() {
    let db = test_db().await;
    let p1 = seed_product(&db, "p1", 1000, Some(1)).await;
    let (state, _, _) = test_state(db.clone());

    // Both pass validation against the same snapshot
    let request = checkout_request(vec![line(&p1.id, 1, 1000)]);
    let first = checkout::validate(&state, "user-a", &request).await.unwrap();
    let second = checkout::validate(&state, "user-b", &request).await.unwrap();

    let orders = db.orders();
    let (a, b) = tokio::join!(orders.place_order(&first), orders.place_order(&second));

    let (won, lost) = match (a, b) {
        (Ok(order), Err(err)) | (Err(err), Ok(order)) => (order, err),
        other => panic!("expected exactly one winner, got {:?}", other),
    };
    assert_eq!(won.status, OrderStatus::Pending);
    assert!(matches!(lost, DbError::StockConflict { requested: 1, .. }));
    assert_eq!(db.catalog().stock_quantity(&p1.id).await.unwrap(), Some(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_checkouts_for_one_unit() {
    let file = FileDb::new().await;
    let p1 = seed_product(&file.db, "p1", 1000, Some(1)).await;
    let (state, _, _) = test_state(file.db.clone());

    let request = checkout_request(vec![line(&p1.id, 1, 1000)]);
    let (a, b) = tokio::join!(
        checkout::place_order(&state, "user-a", &request),
        checkout::place_order(&state, "user-b", &request),
    );

    let results = [a, b];
    let placed = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(placed, 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(is_out_of_stock(err), "unexpected error: {:?}", err);
    }
    assert_eq!(file.db.catalog().stock_quantity(&p1.id).await.unwrap(), Some(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checkouts_never_oversell() {
    const STOCK: i64 = 3;
    const BUYERS: usize = 8;

    let file = FileDb::new().await;
    let p1 = seed_product(&file.db, "p1", 1000, Some(STOCK)).await;
    let (state, _, _) = test_state(file.db.clone());

    let mut handles = Vec::new();
    for buyer in 0..BUYERS {
        let state = state.clone();
        let request = checkout_request(vec![line(&p1.id, 1, 1000)]);
        handles.push(tokio::spawn(async move {
            checkout::place_order(&state, &format!("buyer-{}", buyer), &request).await
        }));
    }

    let mut placed = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            Err(err) if is_out_of_stock(&err) => refused += 1,
            Err(err) => panic!("unexpected error: {:?}", err),
        }
    }

    assert_eq!(placed, STOCK as usize);
    assert_eq!(refused, BUYERS - STOCK as usize);
    assert_eq!(file.db.catalog().stock_quantity(&p1.id).await.unwrap(), Some(0));
}

#[tokio::test]
async fn test_untracked_stock_is_not_decremented() {
    let db = test_db().await;
    let p1 = seed_product(&db, "p1", 1000, None).await;
    let (state, _, _) = test_state(db.clone());

    checkout::place_order(&state, OWNER, &checkout_request(vec![line(&p1.id, 50, 1000)]))
        .await
        .unwrap();

    assert_eq!(db.catalog().stock_quantity(&p1.id).await.unwrap(), None);
}

#[tokio::test]
async fn test_orders_are_scoped_to_owner() {
    let db = test_db().await;
    let p1 = seed_product(&db, "p1", 1000, None).await;
    let (state, _, _) = test_state(db);

    let details = checkout::place_order(&state, OWNER, &checkout_request(vec![line(&p1.id, 1, 1000)]))
        .await
        .unwrap();

    let err = orders::get_order(&state, "someone-else", &details.order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
    assert!(orders::list_orders(&state, "someone-else").await.unwrap().is_empty());

    let mine = orders::list_orders(&state, OWNER).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].order.id, details.order.id);
}
