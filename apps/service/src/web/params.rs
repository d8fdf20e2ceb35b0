use actix_web::{HttpRequest, HttpResponse, Responder, delete, get, post, web};
use tracing::error;

use super::{AppState, auth};
use crate::database::StoreError;
use crate::database::models::StateChangeParams;

/// Upsert with the API's error wording; shared with the backup import.
pub(super) async fn store_params(
    state: &AppState,
    params: &StateChangeParams,
) -> Result<(), HttpResponse> {
    match state.database.upsert_notification_params(params).await {
        Ok(()) => Ok(()),
        Err(StoreError::NoSuchHost) => Err(HttpResponse::BadRequest().body("No such host")),
        Err(err) => {
            error!("Failed to store notification params for {}: {err}", params.host);
            Err(HttpResponse::InternalServerError().body(err.to_string()))
        }
    }
}

#[get("/api/notifications_params")]
pub async fn list_params(req: HttpRequest, state: web::Data<AppState>) -> impl Responder {
    if !auth::authorized(&req, &state.config.auth) {
        return auth::unauthorized();
    }

    match state.database.list_notification_params().await {
        Ok(params) => HttpResponse::Ok().json(params),
        Err(err) => {
            error!("Failed to list notification params: {err}");
            HttpResponse::InternalServerError().body(err.to_string())
        }
    }
}

#[post("/api/notifications_params")]
pub async fn upsert_params(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> impl Responder {
    if !auth::authorized(&req, &state.config.auth) {
        return auth::unauthorized();
    }

    let Ok(params) = serde_json::from_slice::<StateChangeParams>(&body) else {
        return HttpResponse::BadRequest().body("Bad request");
    };

    match store_params(&state, &params).await {
        Ok(()) => HttpResponse::Created().finish(),
        Err(response) => response,
    }
}

/// Body is the raw host string.
#[delete("/api/notifications_params")]
pub async fn delete_params(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: String,
) -> impl Responder {
    if !auth::authorized(&req, &state.config.auth) {
        return auth::unauthorized();
    }

    match state.database.delete_notification_params(&body).await {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(err) => {
            error!("Failed to delete notification params for {body}: {err}");
            HttpResponse::InternalServerError().body(err.to_string())
        }
    }
}
