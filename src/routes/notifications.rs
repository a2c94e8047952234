use axum::{extract::{Path, State}, http::StatusCode, routing::{delete, get}, Json, Router};

use crate::{db::{offload, Records}, errors::{ApiError, ApiResult}, model::{BroadcastEnvelope, DismissalEvent, NotificationRecord}, routes::AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications).put(put_notification))
        .route("/:id", delete(dismiss_notification))
}

async fn list_notifications(State(state): State<AppState>) -> ApiResult<Json<Records>> {
    Ok(Json(offload(&state.store, |store| store.list()).await?))
}

async fn put_notification(State(state): State<AppState>, Json(record): Json<NotificationRecord>) -> ApiResult<Json<NotificationRecord>> {
    if record.id.is_empty() {
        return Err(ApiError::BadRequest("toastId must not be empty".into()));
    }
    let stored = record.clone();
    offload(&state.store, move |store| store.put(&stored)).await?;
    state.channel.publish(&BroadcastEnvelope::Notification(record.clone()));
    Ok(Json(record))
}

async fn dismiss_notification(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    let key = id.clone();
    offload(&state.store, move |store| store.delete(&key)).await?;
    state.channel.publish(&BroadcastEnvelope::Dismissal(DismissalEvent::new(id)));
    Ok(StatusCode::NO_CONTENT)
}
