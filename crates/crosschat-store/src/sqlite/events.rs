//! Relay event queries.

use super::{from_millis, map_conflict, to_millis, SqliteStore};
use crate::store::RelayEventStore;
use crate::{Result, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crosschat_core::{
    ChannelId, CommunityId, CorrelationId, PlatformMessageId, RelayEvent, Tier, UserId,
};

type EventRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    i64,
    Option<i64>,
    Option<String>,
);

const SELECT_EVENT: &str = "SELECT cc_id, source_message_id, source_channel_id, community_id, \
     community_name, author_id, author_display, tier, content, created_at, retracted_at, \
     retracted_by FROM relay_events";

fn from_row(row: EventRow) -> Result<RelayEvent> {
    let (
        cc_id,
        source_message_id,
        source_channel_id,
        community_id,
        community_name,
        author_id,
        author_display,
        tier,
        content,
        created_at,
        retracted_at,
        retracted_by,
    ) = row;

    Ok(RelayEvent {
        cc_id: CorrelationId::parse(&cc_id)
            .ok_or_else(|| StoreError::Corrupt(format!("invalid cc_id '{}'", cc_id)))?,
        source_message_id: PlatformMessageId::new(source_message_id),
        source_channel_id: ChannelId::new(source_channel_id),
        community_id: CommunityId::new(community_id),
        community_name,
        author_id: UserId::new(author_id),
        author_display,
        tier: Tier::from_name(&tier)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown tier '{}'", tier)))?,
        content,
        created_at: from_millis(created_at)?,
        retracted_at: retracted_at.map(from_millis).transpose()?,
        retracted_by: retracted_by.map(UserId::new),
    })
}

#[async_trait]
impl RelayEventStore for SqliteStore {
    async fn insert_event(&self, event: &RelayEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO relay_events
                (cc_id, source_message_id, source_channel_id, community_id, community_name,
                 author_id, author_display, tier, content, created_at, retracted_at,
                 retracted_by)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.cc_id.as_str())
        .bind(event.source_message_id.as_str())
        .bind(event.source_channel_id.as_str())
        .bind(event.community_id.as_str())
        .bind(&event.community_name)
        .bind(event.author_id.as_str())
        .bind(&event.author_display)
        .bind(event.tier.as_str())
        .bind(&event.content)
        .bind(to_millis(event.created_at))
        .bind(event.retracted_at.map(to_millis))
        .bind(event.retracted_by.as_ref().map(|id| id.as_str()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_conflict(e, || {
                format!(
                    "relay event {} for source message {} already exists",
                    event.cc_id, event.source_message_id
                )
            })
        })?;
        Ok(())
    }

    async fn get_event(&self, cc_id: &CorrelationId) -> Result<Option<RelayEvent>> {
        let row: Option<EventRow> = sqlx::query_as(&format!("{} WHERE cc_id = ?", SELECT_EVENT))
            .bind(cc_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(from_row).transpose()
    }

    async fn find_event_by_source(
        &self,
        source_message_id: &PlatformMessageId,
    ) -> Result<Option<RelayEvent>> {
        let row: Option<EventRow> =
            sqlx::query_as(&format!("{} WHERE source_message_id = ?", SELECT_EVENT))
                .bind(source_message_id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        row.map(from_row).transpose()
    }

    async fn mark_event_retracted(
        &self,
        cc_id: &CorrelationId,
        retracted_by: &UserId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE relay_events SET retracted_at = ?, retracted_by = ?
            WHERE cc_id = ? AND retracted_at IS NULL
            "#,
        )
        .bind(to_millis(at))
        .bind(retracted_by.as_str())
        .bind(cc_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
