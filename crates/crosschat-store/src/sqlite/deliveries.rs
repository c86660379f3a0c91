//! Delivery record and retraction mark queries.

use super::{from_millis, map_conflict, to_millis, SqliteStore};
use crate::store::DeliveryStore;
use crate::{Result, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use crosschat_core::{
    ChannelId, CorrelationId, DeliveryOutcome, DeliveryRecord, PlatformMessageId,
};

type DeliveryRow = (String, String, Option<String>, i64, String, i64, Option<String>);

fn from_row(row: DeliveryRow) -> Result<DeliveryRecord> {
    let (cc_id, destination, platform_message_id, delivered_at, outcome, attempts, error) = row;
    let outcome = DeliveryOutcome::from_name(&outcome)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown delivery outcome '{}'", outcome)))?;
    let attempts = u32::try_from(attempts)
        .map_err(|_| StoreError::Corrupt(format!("attempt count out of range: {}", attempts)))?;

    Ok(DeliveryRecord {
        cc_id: CorrelationId::parse(&cc_id)
            .ok_or_else(|| StoreError::Corrupt(format!("invalid cc_id '{}'", cc_id)))?,
        destination_channel_id: ChannelId::new(destination),
        platform_message_id: platform_message_id.map(PlatformMessageId::new),
        delivered_at: from_millis(delivered_at)?,
        outcome,
        attempts,
        error,
    })
}

#[async_trait]
impl DeliveryStore for SqliteStore {
    async fn insert_delivery(&self, record: &DeliveryRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO delivery_records
                (cc_id, destination_channel_id, platform_message_id, delivered_at, outcome, attempts, error)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.cc_id.as_str())
        .bind(record.destination_channel_id.as_str())
        .bind(record.platform_message_id.as_ref().map(|id| id.as_str()))
        .bind(to_millis(record.delivered_at))
        .bind(record.outcome.as_str())
        .bind(i64::from(record.attempts))
        .bind(record.error.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_conflict(e, || {
                format!(
                    "delivery {} -> {} already recorded",
                    record.cc_id, record.destination_channel_id
                )
            })
        })?;
        Ok(())
    }

    async fn deliveries_for(&self, cc_id: &CorrelationId) -> Result<Vec<DeliveryRecord>> {
        let rows: Vec<DeliveryRow> = sqlx::query_as(
            r#"
            SELECT cc_id, destination_channel_id, platform_message_id, delivered_at, outcome, attempts, error
            FROM delivery_records
            WHERE cc_id = ?
            ORDER BY destination_channel_id
            "#,
        )
        .bind(cc_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(from_row).collect()
    }

    async fn mark_retracted(
        &self,
        cc_id: &CorrelationId,
        destination: &ChannelId,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO retraction_marks (cc_id, destination_channel_id, retracted_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(cc_id.as_str())
        .bind(destination.as_str())
        .bind(to_millis(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn retracted_destinations(&self, cc_id: &CorrelationId) -> Result<Vec<ChannelId>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT destination_channel_id FROM retraction_marks WHERE cc_id = ? ORDER BY destination_channel_id",
        )
        .bind(cc_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| ChannelId::new(id)).collect())
    }
}
