//! Booking queries on Repository

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Connection, FromRow, PgConnection};
use uuid::Uuid;

use super::Repository;
use crate::{
    error::{AppError, AppResult},
    models::{
        Booking, BookingQuery, BookingStatus, DateRange, LineItem, RecurrenceDescriptor,
        RecurrenceUnit, SeriesStatus,
    },
};

/// `bookings` row; line items live in `booking_items`
#[derive(Debug, FromRow)]
struct BookingRow {
    id: Uuid,
    tenant_id: Uuid,
    client_ref: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    status: i16,
    recurrence_unit: Option<i16>,
    recurrence_interval: Option<i32>,
    recurrence_end_date: Option<NaiveDate>,
    series_status: Option<i16>,
    installed_at: Option<DateTime<Utc>>,
    removed_at: Option<DateTime<Utc>>,
    crea_date: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct BookingItemRow {
    booking_id: Uuid,
    equipment_id: Uuid,
    quantity: i32,
}

impl BookingRow {
    fn into_booking(self, items: Vec<LineItem>) -> AppResult<Booking> {
        let recurrence = match (self.recurrence_unit, self.recurrence_interval, self.series_status) {
            (Some(unit), Some(interval), Some(status)) => Some(RecurrenceDescriptor {
                unit: RecurrenceUnit::try_from(unit)?,
                interval,
                end_date: self.recurrence_end_date,
                status: SeriesStatus::try_from(status)?,
            }),
            (None, None, None) => None,
            _ => {
                return Err(AppError::DataIntegrity(format!(
                    "booking {} has a partial recurrence",
                    self.id
                )))
            }
        };

        Ok(Booking {
            id: self.id,
            tenant_id: self.tenant_id,
            client_ref: self.client_ref,
            start_date: self.start_date,
            end_date: self.end_date,
            status: BookingStatus::try_from(self.status)?,
            items,
            recurrence,
            installed_at: self.installed_at,
            removed_at: self.removed_at,
            created_at: self.crea_date,
        })
    }
}

const BOOKING_COLUMNS: &str = r#"
    b.id, b.tenant_id, b.client_ref, b.start_date, b.end_date, b.status,
    b.recurrence_unit, b.recurrence_interval, b.recurrence_end_date, b.series_status,
    b.installed_at, b.removed_at, b.crea_date
"#;

/// Attach line items to booking rows, preserving row order
async fn hydrate(conn: &mut PgConnection, rows: Vec<BookingRow>) -> AppResult<Vec<Booking>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

    let item_rows = sqlx::query_as::<_, BookingItemRow>(
        r#"
        SELECT booking_id, equipment_id, quantity
        FROM booking_items
        WHERE booking_id = ANY($1)
        ORDER BY booking_id, position
        "#,
    )
    .bind(&ids)
    .fetch_all(conn)
    .await?;

    let mut items: HashMap<Uuid, Vec<LineItem>> = HashMap::new();
    for row in item_rows {
        items.entry(row.booking_id).or_default().push(LineItem {
            equipment_id: row.equipment_id,
            quantity: row.quantity,
        });
    }

    rows.into_iter()
        .map(|row| {
            let booking_items = items.remove(&row.id).unwrap_or_default();
            row.into_booking(booking_items)
        })
        .collect()
}

impl Repository {
    /// Get booking by ID
    pub async fn bookings_get(&self, tenant_id: Uuid, booking_id: Uuid) -> AppResult<Option<Booking>> {
        let mut conn = self.conn().await?;
        let conn = conn.get()?;
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings b WHERE b.tenant_id = $1 AND b.id = $2",
            BOOKING_COLUMNS
        ))
        .bind(tenant_id)
        .bind(booking_id)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Ok(hydrate(conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    /// Pending or active bookings holding `equipment_id` whose range overlaps `range` (inclusive)
    pub async fn bookings_overlapping(
        &self,
        tenant_id: Uuid,
        equipment_id: Uuid,
        range: DateRange,
        exclude_id: Option<Uuid>,
    ) -> AppResult<Vec<Booking>> {
        let mut conn = self.conn().await?;
        let conn = conn.get()?;
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            SELECT {}
            FROM bookings b
            WHERE b.tenant_id = $1
              AND b.status IN ($2, $3)
              AND b.start_date <= $5 AND $4 <= b.end_date
              AND ($6::uuid IS NULL OR b.id <> $6)
              AND EXISTS (
                  SELECT 1 FROM booking_items i
                  WHERE i.booking_id = b.id AND i.equipment_id = $7
              )
            ORDER BY b.start_date, b.id
            "#,
            BOOKING_COLUMNS
        ))
        .bind(tenant_id)
        .bind(i16::from(BookingStatus::PendingInstallation))
        .bind(i16::from(BookingStatus::Active))
        .bind(range.start)
        .bind(range.end)
        .bind(exclude_id)
        .bind(equipment_id)
        .fetch_all(&mut *conn)
        .await?;

        hydrate(conn, rows).await
    }

    /// List bookings with optional filters
    pub async fn bookings_list(&self, tenant_id: Uuid, query: &BookingQuery) -> AppResult<Vec<Booking>> {
        let range = query.range()?;
        let mut conditions = vec!["b.tenant_id = $1".to_string()];
        let mut idx = 2;

        if query.status.is_some() {
            conditions.push(format!("b.status = ${}", idx));
            idx += 1;
        }
        if query.equipment_id.is_some() {
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM booking_items i WHERE i.booking_id = b.id AND i.equipment_id = ${})",
                idx
            ));
            idx += 1;
        }
        if range.is_some() {
            conditions.push(format!("b.start_date <= ${} AND ${} <= b.end_date", idx + 1, idx));
        }

        let sql = format!(
            "SELECT {} FROM bookings b WHERE {} ORDER BY b.start_date, b.id",
            BOOKING_COLUMNS,
            conditions.join(" AND ")
        );

        let mut builder = sqlx::query_as::<_, BookingRow>(&sql).bind(tenant_id);
        if let Some(status) = query.status {
            builder = builder.bind(i16::from(status));
        }
        if let Some(equipment_id) = query.equipment_id {
            builder = builder.bind(equipment_id);
        }
        if let Some(range) = range {
            builder = builder.bind(range.start).bind(range.end);
        }

        let mut conn = self.conn().await?;
        let conn = conn.get()?;
        let rows = builder.fetch_all(&mut *conn).await?;
        hydrate(conn, rows).await
    }

    /// Insert a booking and its line items atomically
    pub async fn bookings_insert(&self, booking: &Booking) -> AppResult<()> {
        let mut conn = self.conn().await?;
        let mut tx = conn.get()?.begin().await?;

        let recurrence = booking.recurrence.as_ref();
        sqlx::query(
            r#"
            INSERT INTO bookings (
                id, tenant_id, client_ref, start_date, end_date, status,
                recurrence_unit, recurrence_interval, recurrence_end_date, series_status,
                installed_at, removed_at, crea_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(booking.id)
        .bind(booking.tenant_id)
        .bind(&booking.client_ref)
        .bind(booking.start_date)
        .bind(booking.end_date)
        .bind(i16::from(booking.status))
        .bind(recurrence.map(|r| i16::from(r.unit)))
        .bind(recurrence.map(|r| r.interval))
        .bind(recurrence.and_then(|r| r.end_date))
        .bind(recurrence.map(|r| i16::from(r.status)))
        .bind(booking.installed_at)
        .bind(booking.removed_at)
        .bind(booking.created_at)
        .execute(&mut *tx)
        .await?;

        insert_items(&mut tx, booking.id, &booking.items).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Replace dates and line items of a pending booking
    pub async fn bookings_update_schedule(
        &self,
        tenant_id: Uuid,
        booking_id: Uuid,
        range: DateRange,
        items: &[LineItem],
    ) -> AppResult<()> {
        let mut conn = self.conn().await?;
        let mut tx = conn.get()?.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE bookings SET start_date = $3, end_date = $4, modif_date = NOW()
            WHERE tenant_id = $1 AND id = $2 AND status = $5
            "#,
        )
        .bind(tenant_id)
        .bind(booking_id)
        .bind(range.start)
        .bind(range.end)
        .bind(i16::from(BookingStatus::PendingInstallation))
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::ConcurrencyConflict(format!(
                "booking {} is no longer pending installation",
                booking_id
            )));
        }

        sqlx::query("DELETE FROM booking_items WHERE booking_id = $1")
            .bind(booking_id)
            .execute(&mut *tx)
            .await?;
        insert_items(&mut tx, booking_id, items).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Compare-and-set the booking status
    pub async fn bookings_update_status(
        &self,
        tenant_id: Uuid,
        booking_id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut conn = self.conn().await?;
        let result = sqlx::query(
            r#"
            UPDATE bookings SET
                status = $4,
                installed_at = CASE WHEN $4 = $6 THEN $5 ELSE installed_at END,
                removed_at = CASE WHEN $4 = $7 THEN $5 ELSE removed_at END,
                modif_date = $5
            WHERE tenant_id = $1 AND id = $2 AND status = $3
            "#,
        )
        .bind(tenant_id)
        .bind(booking_id)
        .bind(i16::from(from))
        .bind(i16::from(to))
        .bind(at)
        .bind(i16::from(BookingStatus::Active))
        .bind(i16::from(BookingStatus::Completed))
        .execute(conn.get()?)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::ConcurrencyConflict(format!(
                "booking {} changed status concurrently",
                booking_id
            )));
        }
        Ok(())
    }

    /// Compare-and-set the series status of a template booking
    pub async fn bookings_update_series_status(
        &self,
        tenant_id: Uuid,
        series_id: Uuid,
        from: SeriesStatus,
        to: SeriesStatus,
    ) -> AppResult<()> {
        let mut conn = self.conn().await?;
        let result = sqlx::query(
            r#"
            UPDATE bookings SET series_status = $4, modif_date = NOW()
            WHERE tenant_id = $1 AND id = $2 AND series_status = $3
            "#,
        )
        .bind(tenant_id)
        .bind(series_id)
        .bind(i16::from(from))
        .bind(i16::from(to))
        .execute(conn.get()?)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::ConcurrencyConflict(format!(
                "series {} changed status concurrently",
                series_id
            )));
        }
        Ok(())
    }
}

async fn insert_items(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    booking_id: Uuid,
    items: &[LineItem],
) -> AppResult<()> {
    for (position, item) in items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO booking_items (booking_id, position, equipment_id, quantity)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(booking_id)
        .bind(position as i32)
        .bind(item.equipment_id)
        .bind(item.quantity)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}
