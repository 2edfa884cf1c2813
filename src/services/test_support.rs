//! Fixtures shared by service tests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use super::Services;
use crate::{
    config::{CacheConfig, SchedulingConfig},
    error::AppResult,
    models::{BookingRequest, EquipmentStock, LineItem, NewBooking, TenantContext},
    repository::{memory::MemoryStore, SchedulingStore, StoreLock},
};

pub fn tenant() -> TenantContext {
    TenantContext::new(Uuid::new_v4(), "dispatcher")
}

/// Day of June 2025
pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
}

pub fn stock(ctx: &TenantContext, name: &str, total: i32, rented: i32, maintenance: i32) -> EquipmentStock {
    EquipmentStock {
        id: Uuid::new_v4(),
        tenant_id: ctx.tenant_id,
        name: name.to_string(),
        total_quantity: total,
        rented_quantity: rented,
        maintenance_quantity: maintenance,
        crea_date: Some(Utc::now()),
        modif_date: None,
    }
}

pub fn request(equipment_id: Uuid, quantity: i32, from: u32, to: u32) -> BookingRequest {
    BookingRequest {
        equipment_id,
        quantity,
        start_date: day(from),
        end_date: day(to),
        exclude_booking_id: None,
    }
}

pub fn new_booking(equipment_id: Uuid, quantity: i32, from: u32, to: u32) -> NewBooking {
    NewBooking {
        client_ref: "CRM-1042".to_string(),
        start_date: day(from),
        end_date: day(to),
        items: vec![LineItem { equipment_id, quantity }],
        recurrence: None,
    }
}

pub fn services(store: Arc<MemoryStore>) -> Services {
    Services::new(store, SchedulingConfig::default(), &CacheConfig::default())
}

pub fn strict_services(store: Arc<MemoryStore>) -> Services {
    let scheduling = SchedulingConfig {
        check_availability_on_expand: true,
        ..SchedulingConfig::default()
    };
    Services::new(store, scheduling, &CacheConfig::default())
}

/// Lock handing out a fixed store and recording how its section ended
pub struct RecordingLock {
    store: Arc<dyn SchedulingStore>,
    ended: Arc<Mutex<Vec<&'static str>>>,
}

impl RecordingLock {
    pub fn boxed(store: Arc<dyn SchedulingStore>) -> (Box<dyn StoreLock>, Arc<Mutex<Vec<&'static str>>>) {
        let ended = Arc::new(Mutex::new(Vec::new()));
        let lock = Box::new(Self {
            store,
            ended: ended.clone(),
        });
        (lock, ended)
    }
}

#[async_trait]
impl StoreLock for RecordingLock {
    fn store(&self) -> &dyn SchedulingStore {
        self.store.as_ref()
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.ended.lock().unwrap().push("commit");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        self.ended.lock().unwrap().push("rollback");
        Ok(())
    }
}
