//! Test helpers: a throwaway Postgres with the receipt schema applied.
//!
//! Needs a running Docker daemon. Migrations path: from the reclaim-db crate
//! root, `../../migrations`.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use reclaim_core::ContentFingerprint;
use reclaim_core::models::NewReceipt;
use reclaim_db::{CreateReceiptOutcome, PgReceiptRepository, ReceiptRepository};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use uuid::Uuid;

/// Isolated database: the pool plus the container that owns it.
pub struct TestDb {
    pub pool: PgPool,
    pub _container: ContainerAsync<Postgres>,
}

pub async fn setup_test_db() -> TestDb {
    let container = Postgres::default()
        .start()
        .await
        .expect("Failed to start Postgres container");

    let connection_string = format!(
        "postgresql://postgres:postgres@{}:{}/postgres",
        container.get_host().await.expect("Failed to resolve container host"),
        container
            .get_host_port_ipv4(5432)
            .await
            .expect("Failed to resolve Postgres port")
    );

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&connection_string)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    TestDb {
        pool,
        _container: container,
    }
}

pub fn new_receipt(tenant_id: Uuid, content: &[u8], created_at: DateTime<Utc>) -> NewReceipt {
    let id = Uuid::new_v4();
    NewReceipt {
        id,
        tenant_id,
        owner_id: Uuid::new_v4(),
        content_fingerprint: ContentFingerprint::of(content),
        storage_key: format!("receipts/{}/{}.pdf", tenant_id, id),
        content_type: "application/pdf".to_string(),
        file_size: content.len() as i64,
        original_filename: Some("receipt.pdf".to_string()),
        email_provenance: None,
        created_at,
    }
}

/// Insert a pending receipt and return its id.
pub async fn insert_receipt(
    repo: &PgReceiptRepository,
    tenant_id: Uuid,
    content: &[u8],
    created_at: DateTime<Utc>,
) -> Uuid {
    match repo
        .create_receipt(new_receipt(tenant_id, content, created_at))
        .await
        .expect("Failed to insert receipt")
    {
        CreateReceiptOutcome::Created(record) => record.id,
        CreateReceiptOutcome::FingerprintTaken => panic!("fixture fingerprint collided"),
    }
}

/// Line items are written by the extraction service; tests seed them directly.
pub async fn insert_line_item(pool: &PgPool, tenant_id: Uuid, receipt_id: Uuid, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO line_items (id, receipt_id, tenant_id, name, price) VALUES ($1, $2, $3, $4, 499.00)",
    )
    .bind(id)
    .bind(receipt_id)
    .bind(tenant_id)
    .bind(name)
    .execute(pool)
    .await
    .expect("Failed to insert line item");
    id
}

pub async fn set_receipt_status(pool: &PgPool, receipt_id: Uuid, status: &str) {
    sqlx::query("UPDATE receipts SET status = $2 WHERE id = $1")
        .bind(receipt_id)
        .bind(status)
        .execute(pool)
        .await
        .expect("Failed to update receipt status");
}
