use async_trait::async_trait;
use sqlx::PgPool;

use super::{NotificationRepository, RepositoryError};
use crate::models::notifications::Notification;

#[derive(Clone)]
pub struct PgNotificationRepository {
    conn: PgPool,
}

impl PgNotificationRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn insert_notification(
        &self,
        user_id: i64,
        kind: &str,
        message: &str,
    ) -> Result<Notification, RepositoryError> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"INSERT INTO notifications (user_id, type, message)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, type, message, is_read, created_at"#,
        )
        .bind(user_id)
        .bind(kind)
        .bind(message)
        .fetch_one(&self.conn)
        .await?;

        Ok(notification)
    }

    async fn list_notifications(
        &self,
        user_id: i64,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let notifications = sqlx::query_as::<_, Notification>(
            r#"SELECT id, user_id, type, message, is_read, created_at
            FROM notifications
            WHERE user_id = $1 AND (NOT $2 OR is_read = FALSE)
            ORDER BY created_at DESC, id DESC"#,
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_all(&self.conn)
        .await?;

        Ok(notifications)
    }

    async fn mark_all_read(&self, user_id: i64) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .execute(&self.conn)
        .await?;

        Ok(result.rows_affected())
    }
}
