//! Locked sections against a real database
//!
//! Needs `DATABASE_URL` pointing at a scratch Postgres database; migrations run on start.

use std::{sync::Arc, time::Duration};

use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use rental_server::{
    config::{CacheConfig, SchedulingConfig},
    models::{LineItem, NewBooking, TenantContext},
    repository::Repository,
    services::{bookings::Confirmation, Services},
};

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_concurrent_confirmations_on_a_small_pool() {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("Failed to connect");
    sqlx::migrate!("./migrations").run(&pool).await.expect("Failed to migrate");

    let tenant_id = Uuid::new_v4();
    let equipment_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO equipment_stock (id, tenant_id, name, total_quantity) VALUES ($1, $2, 'Tent-A', 3)",
    )
    .bind(equipment_id)
    .bind(tenant_id)
    .execute(&pool)
    .await
    .expect("Failed to seed equipment");

    let store = Arc::new(Repository::new(pool, Duration::from_secs(10)));
    let services = Arc::new(Services::new(store, SchedulingConfig::default(), &CacheConfig::default()));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let services = services.clone();
        handles.push(tokio::spawn(async move {
            let ctx = TenantContext::new(tenant_id, "dispatcher");
            let booking = NewBooking {
                client_ref: "CRM-1042".to_string(),
                start_date: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2025, 6, 12).unwrap(),
                items: vec![LineItem { equipment_id, quantity: 1 }],
                recurrence: None,
            };
            services.bookings.confirm(&ctx, booking).await
        }));
    }

    let mut confirmed = 0;
    for handle in handles {
        match handle.await.unwrap().expect("confirmation failed") {
            Confirmation::Confirmed(_) => confirmed += 1,
            Confirmation::Rejected(_) => {}
        }
    }
    assert_eq!(confirmed, 3);
}
