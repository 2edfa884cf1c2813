//! Occurrence queries on Repository

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Connection, FromRow};
use uuid::Uuid;

use super::Repository;
use crate::{
    error::{AppError, AppResult},
    models::{BookingStatus, CommittedOccurrence, DateRange, Occurrence},
};

#[derive(Debug, FromRow)]
struct OccurrenceRow {
    id: Uuid,
    tenant_id: Uuid,
    booking_id: Uuid,
    sequence: i32,
    start_date: NaiveDate,
    end_date: NaiveDate,
    status: i16,
    installed_at: Option<DateTime<Utc>>,
    removed_at: Option<DateTime<Utc>>,
    crea_date: DateTime<Utc>,
}

impl TryFrom<OccurrenceRow> for Occurrence {
    type Error = AppError;

    fn try_from(row: OccurrenceRow) -> Result<Self, Self::Error> {
        Ok(Occurrence {
            id: row.id,
            tenant_id: row.tenant_id,
            booking_id: row.booking_id,
            sequence: row.sequence,
            start_date: row.start_date,
            end_date: row.end_date,
            status: BookingStatus::try_from(row.status)?,
            installed_at: row.installed_at,
            removed_at: row.removed_at,
            created_at: row.crea_date,
        })
    }
}

impl Repository {
    /// Get occurrence by ID
    pub async fn occurrences_get(
        &self,
        tenant_id: Uuid,
        occurrence_id: Uuid,
    ) -> AppResult<Option<Occurrence>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<_, OccurrenceRow>(
            "SELECT * FROM occurrences WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(occurrence_id)
        .fetch_optional(conn.get()?)
        .await?
        .map(Occurrence::try_from)
        .transpose()
    }

    /// Occurrences of a series ordered by sequence
    pub async fn occurrences_list(&self, tenant_id: Uuid, booking_id: Uuid) -> AppResult<Vec<Occurrence>> {
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, OccurrenceRow>(
            "SELECT * FROM occurrences WHERE tenant_id = $1 AND booking_id = $2 ORDER BY sequence",
        )
        .bind(tenant_id)
        .bind(booking_id)
        .fetch_all(conn.get()?)
        .await?;

        rows.into_iter().map(Occurrence::try_from).collect()
    }

    /// Installed occurrences holding `equipment_id` over `range`, with the template's quantity
    pub async fn occurrences_committed(
        &self,
        tenant_id: Uuid,
        equipment_id: Uuid,
        range: DateRange,
    ) -> AppResult<Vec<CommittedOccurrence>> {
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, CommittedOccurrence>(
            r#"
            SELECT o.id AS occurrence_id, o.booking_id, o.start_date, o.end_date,
                   SUM(i.quantity)::int4 AS quantity
            FROM occurrences o
            JOIN booking_items i ON i.booking_id = o.booking_id
            WHERE o.tenant_id = $1
              AND o.status = $2
              AND i.equipment_id = $3
              AND o.start_date <= $5 AND $4 <= o.end_date
            GROUP BY o.id, o.booking_id, o.start_date, o.end_date
            ORDER BY o.start_date
            "#,
        )
        .bind(tenant_id)
        .bind(i16::from(BookingStatus::Active))
        .bind(equipment_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(conn.get()?)
        .await?;
        Ok(rows)
    }

    /// Insert a batch of occurrences in one transaction
    pub async fn occurrences_insert(&self, occurrences: &[Occurrence]) -> AppResult<()> {
        let mut conn = self.conn().await?;
        let mut tx = conn.get()?.begin().await?;

        for occurrence in occurrences {
            sqlx::query(
                r#"
                INSERT INTO occurrences (
                    id, tenant_id, booking_id, sequence, start_date, end_date,
                    status, installed_at, removed_at, crea_date
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(occurrence.id)
            .bind(occurrence.tenant_id)
            .bind(occurrence.booking_id)
            .bind(occurrence.sequence)
            .bind(occurrence.start_date)
            .bind(occurrence.end_date)
            .bind(i16::from(occurrence.status))
            .bind(occurrence.installed_at)
            .bind(occurrence.removed_at)
            .bind(occurrence.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Compare-and-set the occurrence status
    pub async fn occurrences_update_status(
        &self,
        tenant_id: Uuid,
        occurrence_id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut conn = self.conn().await?;
        let result = sqlx::query(
            r#"
            UPDATE occurrences SET
                status = $4,
                installed_at = CASE WHEN $4 = $6 THEN $5 ELSE installed_at END,
                removed_at = CASE WHEN $4 = $7 THEN $5 ELSE removed_at END
            WHERE tenant_id = $1 AND id = $2 AND status = $3
            "#,
        )
        .bind(tenant_id)
        .bind(occurrence_id)
        .bind(i16::from(from))
        .bind(i16::from(to))
        .bind(at)
        .bind(i16::from(BookingStatus::Active))
        .bind(i16::from(BookingStatus::Completed))
        .execute(conn.get()?)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::ConcurrencyConflict(format!(
                "occurrence {} changed status concurrently",
                occurrence_id
            )));
        }
        Ok(())
    }
}
