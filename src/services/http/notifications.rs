use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{AppQuery, AppState, AuthUser};
use crate::models::notifications::Notification;
use crate::services::{dispatch, notifications::NotificationRequest, ServiceError};

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppQuery(query): AppQuery<NotificationQuery>,
) -> Result<Json<Vec<Notification>>, ServiceError> {
    let notifications = dispatch("notifications", &state.channels.notifications, |response| {
        NotificationRequest::ListNotifications {
            user_id,
            unread_only: query.unread,
            response,
        }
    })
    .await?;

    Ok(Json(notifications))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Value>, ServiceError> {
    let updated = dispatch("notifications", &state.channels.notifications, |response| {
        NotificationRequest::MarkAllRead { user_id, response }
    })
    .await?;

    Ok(Json(json!({
        "message": "Notifications marked as read",
        "updated": updated
    })))
}
