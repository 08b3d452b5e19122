use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::oneshot;

use super::{registry::ConnectionRegistry, RequestHandler, Service, ServiceError};
use crate::models::notifications::Notification;
use crate::repositories::NotificationRepository;

/// Event name used for every pushed notification.
pub const NOTIFICATION_EVENT: &str = "notification";

pub enum NotificationRequest {
    /// Fire-and-forget: persisted, then pushed if the user is connected.
    Notify {
        user_id: i64,
        kind: String,
        message: String,
        context: Value,
    },
    ListNotifications {
        user_id: i64,
        unread_only: bool,
        response: oneshot::Sender<Result<Vec<Notification>, ServiceError>>,
    },
    MarkAllRead {
        user_id: i64,
        response: oneshot::Sender<Result<u64, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct NotificationRequestHandler {
    repository: Arc<dyn NotificationRepository>,
    registry: ConnectionRegistry,
}

impl NotificationRequestHandler {
    pub fn new(repository: Arc<dyn NotificationRepository>, registry: ConnectionRegistry) -> Self {
        NotificationRequestHandler {
            repository,
            registry,
        }
    }

    /// Returns whether the event reached a live connection. The stored row is
    /// the durable record either way.
    pub async fn notify(
        &self,
        user_id: i64,
        kind: &str,
        message: &str,
        context: Value,
    ) -> Result<bool, ServiceError> {
        let notification = self
            .repository
            .insert_notification(user_id, kind, message)
            .await?;

        let mut payload = match context {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("context".to_string(), other);
                map
            }
        };
        payload.insert("id".to_string(), json!(notification.id));
        payload.insert("type".to_string(), json!(notification.kind));
        payload.insert("message".to_string(), json!(notification.message));

        let delivered = self
            .registry
            .emit_to_user(user_id, NOTIFICATION_EVENT, Value::Object(payload));
        if !delivered {
            log::debug!("User {} is offline, {} stored only", user_id, kind);
        }

        Ok(delivered)
    }

    pub async fn list_notifications(
        &self,
        user_id: i64,
        unread_only: bool,
    ) -> Result<Vec<Notification>, ServiceError> {
        Ok(self
            .repository
            .list_notifications(user_id, unread_only)
            .await?)
    }

    pub async fn list_unread(&self, user_id: i64) -> Result<Vec<Notification>, ServiceError> {
        self.list_notifications(user_id, true).await
    }

    pub async fn mark_all_read(&self, user_id: i64) -> Result<u64, ServiceError> {
        Ok(self.repository.mark_all_read(user_id).await?)
    }
}

#[async_trait]
impl RequestHandler<NotificationRequest> for NotificationRequestHandler {
    async fn handle_request(&self, request: NotificationRequest) {
        match request {
            NotificationRequest::Notify {
                user_id,
                kind,
                message,
                context,
            } => {
                if let Err(e) = self.notify(user_id, &kind, &message, context).await {
                    log::error!("Could not record {} for user {}: {}", kind, user_id, e);
                }
            }
            NotificationRequest::ListNotifications {
                user_id,
                unread_only,
                response,
            } => {
                let result = self.list_notifications(user_id, unread_only).await;
                let _ = response.send(result);
            }
            NotificationRequest::MarkAllRead { user_id, response } => {
                let result = self.mark_all_read(user_id).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct NotificationService;

impl NotificationService {
    pub fn new() -> Self {
        NotificationService {}
    }
}

#[async_trait]
impl Service<NotificationRequest, NotificationRequestHandler> for NotificationService {}
