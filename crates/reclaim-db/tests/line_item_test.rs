//! Line item claim and result tests.
//!
//! Run with: `cargo test -p reclaim-db --test line_item_test`
//! Requires Docker for testcontainers (Postgres).

mod helpers;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use helpers::{insert_line_item, insert_receipt, setup_test_db};
use reclaim_core::models::{WarrantyLookupResult, WarrantyLookupStatus, WarrantySource};
use reclaim_db::{LineItemRepository, PgLineItemRepository, PgReceiptRepository};
use uuid::Uuid;

const STALE_AFTER_MINUTES: i64 = 5;

#[tokio::test]
async fn test_claim_is_single_flight_until_stale() {
    let db = setup_test_db().await;
    let receipts = PgReceiptRepository::new(db.pool.clone());
    let items = PgLineItemRepository::new(db.pool.clone());
    let tenant_id = Uuid::new_v4();
    let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();

    let receipt_id = insert_receipt(&receipts, tenant_id, b"claim", t0).await;
    let item_id = insert_line_item(&db.pool, tenant_id, receipt_id, "Espresso Machine").await;

    let claimed = items
        .claim_warranty_lookup(tenant_id, receipt_id, item_id, t0, t0 - Duration::minutes(STALE_AFTER_MINUTES))
        .await
        .unwrap()
        .expect("first claim wins");
    assert_eq!(claimed.warranty_lookup_status, WarrantyLookupStatus::InProgress);
    assert_eq!(claimed.warranty_lookup_started_at, Some(t0));

    let t1 = t0 + Duration::seconds(30);
    let rival = items
        .claim_warranty_lookup(tenant_id, receipt_id, item_id, t1, t1 - Duration::minutes(STALE_AFTER_MINUTES))
        .await
        .unwrap();
    assert!(rival.is_none());

    // An abandoned claim can be taken over.
    let t2 = t0 + Duration::minutes(STALE_AFTER_MINUTES + 1);
    let takeover = items
        .claim_warranty_lookup(tenant_id, receipt_id, item_id, t2, t2 - Duration::minutes(STALE_AFTER_MINUTES))
        .await
        .unwrap()
        .expect("stale claim is reclaimable");
    assert_eq!(takeover.warranty_lookup_started_at, Some(t2));
}

#[tokio::test]
async fn test_concurrent_claims_have_one_winner() {
    let db = setup_test_db().await;
    let receipts = PgReceiptRepository::new(db.pool.clone());
    let items = PgLineItemRepository::new(db.pool.clone());
    let tenant_id = Uuid::new_v4();
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
    let stale_before = now - Duration::minutes(STALE_AFTER_MINUTES);

    let receipt_id = insert_receipt(&receipts, tenant_id, b"race", now).await;
    let item_id = insert_line_item(&db.pool, tenant_id, receipt_id, "Sound Bar").await;

    let (a, b) = tokio::join!(
        items.claim_warranty_lookup(tenant_id, receipt_id, item_id, now, stale_before),
        items.claim_warranty_lookup(tenant_id, receipt_id, item_id, now, stale_before),
    );
    let winners = [a.unwrap(), b.unwrap()].iter().filter(|c| c.is_some()).count();
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_claim_is_tenant_scoped() {
    let db = setup_test_db().await;
    let receipts = PgReceiptRepository::new(db.pool.clone());
    let items = PgLineItemRepository::new(db.pool.clone());
    let tenant_id = Uuid::new_v4();
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();

    let receipt_id = insert_receipt(&receipts, tenant_id, b"scoped", now).await;
    let item_id = insert_line_item(&db.pool, tenant_id, receipt_id, "Cordless Drill").await;

    let foreign = items
        .claim_warranty_lookup(Uuid::new_v4(), receipt_id, item_id, now, now)
        .await
        .unwrap();
    assert!(foreign.is_none());

    let stored = items.get_line_item(tenant_id, receipt_id, item_id).await.unwrap().unwrap();
    assert_eq!(stored.warranty_lookup_status, WarrantyLookupStatus::Unknown);
}

#[tokio::test]
async fn test_recording_result_releases_claim() {
    let db = setup_test_db().await;
    let receipts = PgReceiptRepository::new(db.pool.clone());
    let items = PgLineItemRepository::new(db.pool.clone());
    let tenant_id = Uuid::new_v4();
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();

    let receipt_id = insert_receipt(&receipts, tenant_id, b"result", now).await;
    let item_id = insert_line_item(&db.pool, tenant_id, receipt_id, "Coffee Maker").await;
    items
        .claim_warranty_lookup(tenant_id, receipt_id, item_id, now, now)
        .await
        .unwrap()
        .unwrap();

    let end_date = NaiveDate::from_ymd_opt(2027, 3, 1).unwrap();
    let done = now + Duration::seconds(4);
    let item = items
        .record_warranty_result(
            tenant_id,
            receipt_id,
            item_id,
            &WarrantyLookupResult::found(end_date, Some(0.8), WarrantySource::AiLookup, done),
        )
        .await
        .unwrap();

    assert_eq!(item.warranty_lookup_status, WarrantyLookupStatus::Found);
    assert!(item.warranty_eligible);
    assert_eq!(item.warranty_end_date, Some(end_date));
    assert_eq!(item.warranty_checked_at, Some(done));
    assert_eq!(item.warranty_lookup_started_at, None);

    // Released, so the next check can claim straight away.
    let reclaimed = items
        .claim_warranty_lookup(tenant_id, receipt_id, item_id, done, done - Duration::minutes(STALE_AFTER_MINUTES))
        .await
        .unwrap();
    assert!(reclaimed.is_some());
}
