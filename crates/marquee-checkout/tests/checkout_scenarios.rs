//! End-to-end checkout scenarios through the [`Checkout`] facade.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use marquee_checkout::{Checkout, CheckoutConfig, ErrorKind, MemoryAuditSink, RequestContext};
use marquee_core::discount::DiscountCode;
use marquee_core::{
    AdjustmentReason, Clock, DiscountKind, ManualClock, Money, NewSaleItem, PaymentMethod, SaleDetails, SaleStatus,
    SaleTotals, SeatState, Session, SessionStatus, SystemClock,
};
use marquee_db::{Database, DbConfig, StockMovement};

const TENANT: &str = "cinema-1";

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 6, 1, 18, 0, 0).unwrap()
}

fn seats(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

async fn seed(db: &Database) {
    let now = start();
    db.catalog()
        .insert_session(&Session {
            id: "S1".into(),
            tenant_id: TENANT.into(),
            room_id: "R1".into(),
            title: "Evening Feature".into(),
            starts_at: now + Duration::hours(2),
            ends_at: now + Duration::hours(4),
            status: SessionStatus::Scheduled,
        })
        .await
        .unwrap();
    db.catalog()
        .insert_seats(TENANT, "R1", &["A1", "A2", "A3", "B1"])
        .await
        .unwrap();

    db.inventory()
        .create_item(TENANT, "POPCORN-L", "Popcorn Large", 2, now)
        .await
        .unwrap();
    db.inventory()
        .adjust(
            &StockMovement {
                tenant_id: TENANT,
                sku: "POPCORN-L",
                delta: 5,
                reason: AdjustmentReason::Restock,
                actor: "seed",
                sale_id: None,
            },
            now,
        )
        .await
        .unwrap();

    db.catalog()
        .insert_discount_code(&DiscountCode {
            tenant_id: TENANT.into(),
            code: "WEEKEND".into(),
            kind: DiscountKind::Percent,
            value: 2000,
            valid_from: Some(now - Duration::days(1)),
            valid_until: Some(now + Duration::days(1)),
            max_uses: None,
            used_count: 0,
            min_age: None,
            max_age: None,
        })
        .await
        .unwrap();
}

async fn in_memory(clock: Arc<dyn Clock>) -> (Checkout, Arc<MemoryAuditSink>, Database) {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    seed(&db).await;
    let audit = Arc::new(MemoryAuditSink::new());
    let checkout = Checkout::new(db.clone(), &CheckoutConfig::default(), clock, audit.clone());
    (checkout, audit, db)
}

fn ticket(seat: &str, cents: i64) -> NewSaleItem {
    NewSaleItem::ticket("S1", seat, "Adult", Money::from_cents(cents))
}

fn popcorn(quantity: i64) -> NewSaleItem {
    NewSaleItem::inventory("POPCORN-L", "Popcorn Large", quantity, Money::from_cents(800))
}

#[tokio::test]
async fn seat_contention_resolves_by_lease_then_expiry() {
    let clock = Arc::new(ManualClock::new(start()));
    let (checkout, _, _) = in_memory(clock.clone()).await;
    let ctx = RequestContext::new(TENANT, "kiosk");

    checkout
        .reserve(&ctx, "S1", &seats(&["A1", "A2"]), "T1", Some(300))
        .await
        .into_result()
        .unwrap();

    let contested = checkout.reserve(&ctx, "S1", &seats(&["A2", "A3"]), "T2", None).await;
    assert_eq!(contested.kind(), Some(ErrorKind::SeatUnavailable));
    let error = contested.error.unwrap();
    assert_eq!(error.details["seat_ids"], serde_json::json!(["A2"]));

    // Nothing was granted to T2, not even the free seat.
    assert!(checkout.leases_for(&ctx, "T2").await.into_result().unwrap().is_empty());

    let map = checkout.seat_map(&ctx, "S1").await.into_result().unwrap();
    let a3 = map.iter().find(|s| s.seat_id == "A3").unwrap();
    assert_eq!(a3.state, SeatState::Available);

    clock.advance(Duration::seconds(300));
    checkout
        .reserve(&ctx, "S1", &seats(&["A2", "A3"]), "T2", None)
        .await
        .into_result()
        .unwrap();
}

#[tokio::test]
async fn release_frees_seats_for_another_token() {
    let (checkout, _, _) = in_memory(Arc::new(ManualClock::new(start()))).await;
    let ctx = RequestContext::new(TENANT, "kiosk");

    checkout
        .reserve(&ctx, "S1", &seats(&["A1", "A2"]), "T1", None)
        .await
        .into_result()
        .unwrap();

    // Same token again extends rather than conflicts.
    let extended = checkout
        .reserve(&ctx, "S1", &seats(&["A2", "A3"]), "T1", Some(1800))
        .await
        .into_result()
        .unwrap();
    assert_eq!(extended.expires_at, start() + Duration::seconds(1800));

    let blocked = checkout.reserve(&ctx, "S1", &seats(&["A1"]), "T2", None).await;
    assert_eq!(blocked.kind(), Some(ErrorKind::SeatUnavailable));

    assert_eq!(checkout.release(&ctx, "T1").await.into_result().unwrap(), 3);
    assert_eq!(checkout.release(&ctx, "T1").await.into_result().unwrap(), 0);

    checkout
        .reserve(&ctx, "S1", &seats(&["A1"]), "T2", None)
        .await
        .into_result()
        .unwrap();
}

#[tokio::test]
async fn shortfall_is_reported_in_cents() {
    let (checkout, _, _) = in_memory(Arc::new(ManualClock::new(start()))).await;
    let ctx = RequestContext::new(TENANT, "cashier");

    let sale = checkout.open_sale(&ctx, None, None).await.into_result().unwrap();
    checkout.add_item(&ctx, &sale.id, &ticket("A1", 5000)).await.into_result().unwrap();
    checkout
        .add_payment(&ctx, &sale.id, PaymentMethod::Cash, Money::from_cents(3000), None)
        .await
        .into_result()
        .unwrap();

    let result = checkout.finalize(&ctx, &sale.id).await;
    assert_eq!(result.kind(), Some(ErrorKind::InsufficientPayment));
    assert_eq!(result.error.unwrap().details["shortfall_cents"], 2000);

    let details = checkout.get_sale(&ctx, &sale.id).await.into_result().unwrap();
    assert_eq!(details.sale.status, SaleStatus::Open);
    assert!(checkout.tickets_for_sale(&ctx, &sale.id).await.into_result().unwrap().is_empty());
}

#[tokio::test]
async fn reserved_seats_flow_into_the_sale() {
    let clock = Arc::new(ManualClock::new(start()));
    let (checkout, _, _) = in_memory(clock.clone()).await;
    let kiosk = RequestContext::new(TENANT, "kiosk");

    checkout
        .reserve(&kiosk, "S1", &seats(&["B1"]), "T-WEB", None)
        .await
        .into_result()
        .unwrap();

    let sale = checkout.open_sale(&kiosk, None, Some("T-WEB")).await.into_result().unwrap();
    checkout.add_item(&kiosk, &sale.id, &ticket("B1", 1100)).await.into_result().unwrap();
    checkout
        .add_payment(&kiosk, &sale.id, PaymentMethod::Card, Money::from_cents(1100), Some("AUTH-77"))
        .await
        .into_result()
        .unwrap();

    let receipt = checkout.finalize(&kiosk, &sale.id).await.into_result().unwrap();
    assert_eq!(receipt.tickets.len(), 1);
    assert_eq!(receipt.change, Money::zero());

    // The hold is gone; the seat is sold.
    assert!(checkout.leases_for(&kiosk, "T-WEB").await.into_result().unwrap().is_empty());
    let map = checkout.seat_map(&kiosk, "S1").await.into_result().unwrap();
    assert_eq!(map.iter().find(|s| s.seat_id == "B1").unwrap().state, SeatState::Sold);

    let again = checkout.reserve(&kiosk, "S1", &seats(&["B1"]), "T-OTHER", None).await;
    assert_eq!(again.kind(), Some(ErrorKind::SeatUnavailable));
}

#[tokio::test]
async fn finalize_rejects_seat_held_by_another_token() {
    let (checkout, _, db) = in_memory(Arc::new(ManualClock::new(start()))).await;
    let ctx = RequestContext::new(TENANT, "cashier");

    let sale = checkout.open_sale(&ctx, None, None).await.into_result().unwrap();
    checkout.add_item(&ctx, &sale.id, &ticket("A3", 1200)).await.into_result().unwrap();
    checkout.add_item(&ctx, &sale.id, &popcorn(1)).await.into_result().unwrap();
    checkout
        .add_payment(&ctx, &sale.id, PaymentMethod::Cash, Money::from_cents(2000), None)
        .await
        .into_result()
        .unwrap();

    checkout
        .reserve(&ctx, "S1", &seats(&["A3"]), "T-ELSEWHERE", None)
        .await
        .into_result()
        .unwrap();

    let result = checkout.finalize(&ctx, &sale.id).await;
    assert_eq!(result.kind(), Some(ErrorKind::SeatUnavailable));

    // Rolled back: no stock taken, no ticket, still open.
    assert_eq!(db.inventory().get(TENANT, "POPCORN-L").await.unwrap().unwrap().on_hand, 5);
    assert!(checkout.tickets_for_sale(&ctx, &sale.id).await.into_result().unwrap().is_empty());
    let details = checkout.get_sale(&ctx, &sale.id).await.into_result().unwrap();
    assert_eq!(details.sale.status, SaleStatus::Open);
}

#[tokio::test]
async fn refund_restores_stock_and_frees_seats() {
    let (checkout, audit, db) = in_memory(Arc::new(ManualClock::new(start()))).await;
    let cashier = RequestContext::new(TENANT, "cashier");
    let manager = RequestContext::new(TENANT, "manager");

    let sale = checkout.open_sale(&cashier, None, None).await.into_result().unwrap();
    checkout.add_item(&cashier, &sale.id, &ticket("A1", 1000)).await.into_result().unwrap();
    checkout.add_item(&cashier, &sale.id, &popcorn(2)).await.into_result().unwrap();
    let discounted = checkout
        .apply_discount(&cashier, &sale.id, "WEEKEND")
        .await
        .into_result()
        .unwrap();
    assert_eq!(discounted.sale.total_cents, 2080);

    checkout
        .add_payment(&cashier, &sale.id, PaymentMethod::Cash, Money::from_cents(2500), None)
        .await
        .into_result()
        .unwrap();
    let receipt = checkout.finalize(&cashier, &sale.id).await.into_result().unwrap();
    assert_eq!(receipt.change.cents(), 420);
    assert_eq!(db.inventory().get(TENANT, "POPCORN-L").await.unwrap().unwrap().on_hand, 3);

    let refund = checkout.refund(&manager, &sale.id, "double charged").await.into_result().unwrap();
    assert_eq!(refund.sale.status, SaleStatus::Refunded);
    assert_eq!(db.inventory().get(TENANT, "POPCORN-L").await.unwrap().unwrap().on_hand, 5);

    let history = checkout.history(&manager, "POPCORN-L", Some(10)).await.into_result().unwrap();
    assert_eq!(history[0].reason, AdjustmentReason::Refund);
    assert_eq!(history[0].delta, 2);

    // A1 can be sold again.
    let next = checkout.open_sale(&cashier, None, None).await.into_result().unwrap();
    checkout.add_item(&cashier, &next.id, &ticket("A1", 1000)).await.into_result().unwrap();
    checkout
        .add_payment(&cashier, &next.id, PaymentMethod::Card, Money::from_cents(1000), None)
        .await
        .into_result()
        .unwrap();
    checkout.finalize(&cashier, &next.id).await.into_result().unwrap();

    let events = audit.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].actor, "manager");
}

#[tokio::test]
async fn terminal_sales_reject_further_changes() {
    let (checkout, _, _) = in_memory(Arc::new(ManualClock::new(start()))).await;
    let ctx = RequestContext::new(TENANT, "cashier");

    let sale = checkout.open_sale(&ctx, None, None).await.into_result().unwrap();
    checkout.add_item(&ctx, &sale.id, &popcorn(1)).await.into_result().unwrap();
    checkout.cancel(&ctx, &sale.id, "walked away").await.into_result().unwrap();

    assert_eq!(checkout.add_item(&ctx, &sale.id, &popcorn(1)).await.kind(), Some(ErrorKind::SaleNotOpen));
    assert_eq!(
        checkout
            .add_payment(&ctx, &sale.id, PaymentMethod::Cash, Money::from_cents(100), None)
            .await
            .kind(),
        Some(ErrorKind::SaleNotOpen)
    );
    assert_eq!(checkout.finalize(&ctx, &sale.id).await.kind(), Some(ErrorKind::SaleNotOpen));
    assert_eq!(checkout.cancel(&ctx, &sale.id, "again").await.kind(), Some(ErrorKind::SaleNotOpen));
    assert_eq!(checkout.refund(&ctx, &sale.id, "why").await.kind(), Some(ErrorKind::SaleNotFinalized));
}

#[tokio::test]
async fn expired_discount_is_rejected() {
    let clock = Arc::new(ManualClock::new(start()));
    let (checkout, _, _) = in_memory(clock.clone()).await;
    let ctx = RequestContext::new(TENANT, "cashier");

    let sale = checkout.open_sale(&ctx, None, None).await.into_result().unwrap();
    checkout.add_item(&ctx, &sale.id, &popcorn(1)).await.into_result().unwrap();

    clock.advance(Duration::days(2));
    let result = checkout.apply_discount(&ctx, &sale.id, "WEEKEND").await;
    assert_eq!(result.kind(), Some(ErrorKind::DiscountExpired));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_finalize_sells_stock_once() {
    let dir = TempDir::new().unwrap();
    let db = Database::new(DbConfig::new(dir.path().join("marquee.db")).max_connections(4))
        .await
        .unwrap();
    seed(&db).await;

    let checkout = Checkout::new(
        db.clone(),
        &CheckoutConfig::default(),
        Arc::new(SystemClock),
        Arc::new(MemoryAuditSink::new()),
    );
    let ctx = RequestContext::new(TENANT, "cashier");

    assert_eq!(checkout.correct(&ctx, "POPCORN-L", -4).await.into_result().unwrap(), 1);

    // One on hand; each sale wants it. Both pass the advisory check.
    let mut sale_ids = Vec::new();
    for _ in 0..2 {
        let sale = checkout.open_sale(&ctx, None, None).await.into_result().unwrap();
        checkout.add_item(&ctx, &sale.id, &popcorn(1)).await.into_result().unwrap();
        checkout
            .add_payment(&ctx, &sale.id, PaymentMethod::Cash, Money::from_cents(800), None)
            .await
            .into_result()
            .unwrap();
        sale_ids.push(sale.id);
    }

    let handles: Vec<_> = sale_ids
        .into_iter()
        .map(|sale_id| {
            let checkout = checkout.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { checkout.finalize(&ctx, &sale_id).await })
        })
        .collect();

    let mut succeeded = 0;
    let mut short = 0;
    for handle in handles {
        let result = handle.await.unwrap();
        match result.kind() {
            None => succeeded += 1,
            Some(ErrorKind::InsufficientStock) => short += 1,
            Some(other) => panic!("unexpected error kind: {other:?}"),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(short, 1);
    assert_eq!(db.inventory().get(TENANT, "POPCORN-L").await.unwrap().unwrap().on_hand, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reserve_grants_a_seat_once() {
    let dir = TempDir::new().unwrap();
    let db = Database::new(DbConfig::new(dir.path().join("marquee.db")).max_connections(4))
        .await
        .unwrap();
    seed(&db).await;

    let checkout = Checkout::new(
        db,
        &CheckoutConfig::default(),
        Arc::new(SystemClock),
        Arc::new(MemoryAuditSink::new()),
    );
    let ctx = RequestContext::new(TENANT, "kiosk");

    let handles: Vec<_> = ["T1", "T2", "T3"]
        .into_iter()
        .map(|token| {
            let checkout = checkout.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { checkout.reserve(&ctx, "S1", &seats(&["A2"]), token, None).await })
        })
        .collect();

    let mut granted = 0;
    for handle in handles {
        let result = handle.await.unwrap();
        match result.kind() {
            None => granted += 1,
            Some(ErrorKind::SeatUnavailable) => {
                assert_eq!(result.error.unwrap().details["seat_ids"], serde_json::json!(["A2"]));
            }
            Some(other) => panic!("unexpected error kind: {other:?}"),
        }
    }
    assert_eq!(granted, 1);
}

async fn file_backed(clock: Arc<dyn Clock>) -> (Checkout, Database, TempDir) {
    let dir = TempDir::new().unwrap();
    let db = Database::new(DbConfig::new(dir.path().join("marquee.db")).max_connections(4))
        .await
        .unwrap();
    seed(&db).await;
    let checkout = Checkout::new(db.clone(), &CheckoutConfig::default(), clock, Arc::new(MemoryAuditSink::new()));
    (checkout, db, dir)
}

/// Stored totals match a fresh computation over the stored rows.
fn assert_totals_consistent(details: &SaleDetails) {
    let recomputed = SaleTotals::compute(&details.items, &details.discounts);
    assert_eq!(details.sale.totals(), recomputed.totals);
    let paid: Money = details.payments.iter().map(|p| p.amount()).sum();
    assert_eq!(details.paid, paid);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_lines_and_payments_converge() {
    let (checkout, db, _dir) = file_backed(Arc::new(ManualClock::new(start()))).await;
    let ctx = RequestContext::new(TENANT, "cashier");

    let sale = checkout.open_sale(&ctx, None, None).await.into_result().unwrap();
    checkout.add_item(&ctx, &sale.id, &popcorn(1)).await.into_result().unwrap();
    checkout.apply_discount(&ctx, &sale.id, "WEEKEND").await.into_result().unwrap();

    // Double-clicked lines and tenders all land on the same sale at once.
    let lines: Vec<_> = [popcorn(1), popcorn(1), ticket("A1", 1200), ticket("A2", 1200)]
        .into_iter()
        .map(|item| {
            let checkout = checkout.clone();
            let ctx = ctx.clone();
            let sale_id = sale.id.clone();
            tokio::spawn(async move { checkout.add_item(&ctx, &sale_id, &item).await })
        })
        .collect();
    let payments: Vec<_> = (0..3)
        .map(|_| {
            let checkout = checkout.clone();
            let ctx = ctx.clone();
            let sale_id = sale.id.clone();
            tokio::spawn(async move {
                checkout
                    .add_payment(&ctx, &sale_id, PaymentMethod::Cash, Money::from_cents(500), None)
                    .await
            })
        })
        .collect();

    for handle in lines {
        let result = handle.await.unwrap();
        assert!(result.success, "add_item failed: {:?}", result.error);
    }
    for handle in payments {
        let result = handle.await.unwrap();
        assert!(result.success, "add_payment failed: {:?}", result.error);
    }

    let details = db.sales().details(TENANT, &sale.id).await.unwrap();
    assert_eq!(details.items.len(), 5);
    assert_eq!(details.payments.len(), 3);
    assert_totals_consistent(&details);

    // 3 × 800 + 2 × 1200 = 4800, less 20%.
    assert_eq!(details.sale.subtotal_cents, 4800);
    assert_eq!(details.sale.discount_cents, 960);
    assert_eq!(details.sale.total_cents, 3840);
    assert_eq!(details.paid.cents(), 1500);
    assert_eq!(details.remaining.cents(), 2340);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn add_item_racing_finalize_never_lands_on_a_closed_sale() {
    let (checkout, db, _dir) = file_backed(Arc::new(ManualClock::new(start()))).await;
    let ctx = RequestContext::new(TENANT, "cashier");

    for _ in 0..5 {
        let sale = checkout.open_sale(&ctx, None, None).await.into_result().unwrap();
        checkout
            .add_item(&ctx, &sale.id, &NewSaleItem::service("Booking fee", Money::from_cents(150)))
            .await
            .into_result()
            .unwrap();
        checkout
            .add_payment(&ctx, &sale.id, PaymentMethod::Card, Money::from_cents(150), None)
            .await
            .into_result()
            .unwrap();

        let finalize = {
            let checkout = checkout.clone();
            let ctx = ctx.clone();
            let sale_id = sale.id.clone();
            tokio::spawn(async move { checkout.finalize(&ctx, &sale_id).await })
        };
        let add = {
            let checkout = checkout.clone();
            let ctx = ctx.clone();
            let sale_id = sale.id.clone();
            tokio::spawn(async move {
                checkout
                    .add_item(&ctx, &sale_id, &NewSaleItem::service("Parking", Money::from_cents(300)))
                    .await
            })
        };

        let finalized = finalize.await.unwrap();
        let added = add.await.unwrap();
        let details = db.sales().details(TENANT, &sale.id).await.unwrap();
        assert_totals_consistent(&details);

        match details.sale.status {
            SaleStatus::Finalized => {
                // The sale closed first: the late line was turned away.
                assert!(finalized.success);
                assert_eq!(added.kind(), Some(ErrorKind::SaleNotOpen));
                assert_eq!(details.items.len(), 1);
                assert_eq!(details.sale.total_cents, 150);
            }
            SaleStatus::Open => {
                // The line won: finalize saw the larger total and refused.
                assert!(added.success);
                assert_eq!(finalized.kind(), Some(ErrorKind::InsufficientPayment));
                assert_eq!(details.items.len(), 2);
                assert_eq!(details.sale.total_cents, 450);
            }
            other => panic!("unexpected status: {other:?}"),
        }
    }
}
