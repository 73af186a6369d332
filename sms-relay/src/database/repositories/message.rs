//! Message repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::database::models::MessageDbModel;
use crate::database::retry::retry_on_sqlite_busy;
use crate::relay::ChannelKind;
use crate::{Error, Result};

/// Fields of a message row at creation time.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub reference: Option<u16>,
    pub total_parts: Option<u8>,
}

/// Delivery record store.
///
/// Forwarded flags are independent columns; channels never coordinate their
/// writes and a flag may land before or after any other.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create(&self, message: &NewMessage) -> Result<i64>;
    async fn update_text(&self, id: i64, text: &str) -> Result<()>;
    /// Mark `channel` as delivered for `id`. Calling it again is a no-op.
    async fn set_forwarded(&self, id: i64, channel: ChannelKind) -> Result<()>;
    async fn get(&self, id: i64) -> Result<MessageDbModel>;
}

/// SQLx implementation of MessageRepository.
pub struct SqlxMessageRepository {
    pool: SqlitePool,
}

impl SqlxMessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn forwarded_update_sql(channel: ChannelKind) -> &'static str {
    match channel {
        ChannelKind::Api => "UPDATE sms_messages SET api_forwarded = 1 WHERE id = ?",
        ChannelKind::Sms => "UPDATE sms_messages SET sms_forwarded = 1 WHERE id = ?",
        ChannelKind::Email => "UPDATE sms_messages SET email_forwarded = 1 WHERE id = ?",
    }
}

#[async_trait]
impl MessageRepository for SqlxMessageRepository {
    async fn create(&self, message: &NewMessage) -> Result<i64> {
        let timestamp = message.timestamp.to_rfc3339();
        let id = retry_on_sqlite_busy("create_message", || async {
            let result = sqlx::query(
                r#"
                INSERT INTO sms_messages (sender, timestamp, reference, total_parts, message_text)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&message.sender)
            .bind(&timestamp)
            .bind(message.reference.map(i64::from))
            .bind(message.total_parts.map(i64::from))
            .bind(&message.text)
            .execute(&self.pool)
            .await?;
            Ok(result.last_insert_rowid())
        })
        .await?;

        tracing::info!("Saved new SMS: ID={}", id);
        Ok(id)
    }

    async fn update_text(&self, id: i64, text: &str) -> Result<()> {
        let result = retry_on_sqlite_busy("update_message_text", || async {
            Ok(
                sqlx::query("UPDATE sms_messages SET message_text = ? WHERE id = ?")
                    .bind(text)
                    .bind(id)
                    .execute(&self.pool)
                    .await?,
            )
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Message", id.to_string()));
        }
        tracing::debug!("Updated SMS text: ID={}", id);
        Ok(())
    }

    async fn set_forwarded(&self, id: i64, channel: ChannelKind) -> Result<()> {
        let sql = forwarded_update_sql(channel);
        let result = retry_on_sqlite_busy("set_forwarded", || async {
            Ok(sqlx::query(sql).bind(id).execute(&self.pool).await?)
        })
        .await?;

        // SQLite counts matched rows, so a repeated call still reports 1.
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Message", id.to_string()));
        }
        tracing::info!("Marked {} forwarded for SMS ID={}", channel, id);
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<MessageDbModel> {
        sqlx::query_as::<_, MessageDbModel>("SELECT * FROM sms_messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Message", id.to_string()))
    }
}
