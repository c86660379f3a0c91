//! Channel registration queries.

use super::{from_millis, to_millis, SqliteStore};
use crate::store::RegistrationStore;
use crate::Result;
use async_trait::async_trait;
use crosschat_core::{ChannelId, ChannelRegistration, CommunityId};

type RegistrationRow = (String, String, bool, bool, i64);

const SELECT_REGISTRATION: &str = "SELECT channel_id, community_id, enabled, partner, registered_at \
     FROM channel_registrations";

fn from_row(row: RegistrationRow) -> Result<ChannelRegistration> {
    let (channel_id, community_id, enabled, partner, registered_at) = row;
    Ok(ChannelRegistration {
        channel_id: ChannelId::new(channel_id),
        community_id: CommunityId::new(community_id),
        enabled,
        partner,
        registered_at: from_millis(registered_at)?,
    })
}

#[async_trait]
impl RegistrationStore for SqliteStore {
    async fn upsert_registration(&self, registration: &ChannelRegistration) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO channel_registrations (channel_id, community_id, enabled, partner, registered_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(channel_id) DO UPDATE SET
                community_id = excluded.community_id,
                enabled = excluded.enabled,
                partner = excluded.partner,
                registered_at = excluded.registered_at
            "#,
        )
        .bind(registration.channel_id.as_str())
        .bind(registration.community_id.as_str())
        .bind(registration.enabled)
        .bind(registration.partner)
        .bind(to_millis(registration.registered_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_registration(
        &self,
        channel_id: &ChannelId,
    ) -> Result<Option<ChannelRegistration>> {
        let row: Option<RegistrationRow> =
            sqlx::query_as(&format!("{} WHERE channel_id = ?", SELECT_REGISTRATION))
                .bind(channel_id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        row.map(from_row).transpose()
    }

    async fn list_registrations(&self) -> Result<Vec<ChannelRegistration>> {
        let rows: Vec<RegistrationRow> =
            sqlx::query_as(&format!("{} ORDER BY channel_id", SELECT_REGISTRATION))
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(from_row).collect()
    }

    async fn list_enabled(&self) -> Result<Vec<ChannelRegistration>> {
        let rows: Vec<RegistrationRow> = sqlx::query_as(&format!(
            "{} WHERE enabled = 1 ORDER BY channel_id",
            SELECT_REGISTRATION
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(from_row).collect()
    }

    async fn set_enabled(&self, channel_id: &ChannelId, enabled: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE channel_registrations SET enabled = ? WHERE channel_id = ?")
            .bind(enabled)
            .bind(channel_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_community_partner(
        &self,
        community_id: &CommunityId,
        partner: bool,
    ) -> Result<u64> {
        let result =
            sqlx::query("UPDATE channel_registrations SET partner = ? WHERE community_id = ?")
                .bind(partner)
                .bind(community_id.as_str())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn delete_community(&self, community_id: &CommunityId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM channel_registrations WHERE community_id = ?")
            .bind(community_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
