use actix_web::{HttpRequest, HttpResponse, Responder, delete, get, post, web};
use tracing::error;

use super::{AppState, auth};
use crate::database::StoreError;
use crate::monitoring::classify::{CheckKind, check_kind};

/// Validate and register a host. Shared by the JSON endpoint, the hosts
/// page form and the backup import.
pub(super) async fn create_host(state: &AppState, host: &str) -> Result<(), HttpResponse> {
    if check_kind(host) == CheckKind::Invalid {
        return Err(HttpResponse::BadRequest().body("Host not acceptable"));
    }

    match state.database.add_host(host).await {
        Ok(()) => Ok(()),
        Err(StoreError::HostExists) => {
            Err(HttpResponse::BadRequest().body("Host already exists"))
        }
        Err(err) => {
            error!("Failed to add host {host}: {err}");
            Err(HttpResponse::InternalServerError().body(err.to_string()))
        }
    }
}

/// Validate and unregister a host along with its checks and params.
pub(super) async fn drop_host(state: &AppState, host: &str) -> Result<(), HttpResponse> {
    if check_kind(host) == CheckKind::Invalid {
        return Err(HttpResponse::BadRequest().body("Host not acceptable"));
    }

    match state.database.remove_host(host).await {
        Ok(()) => Ok(()),
        Err(StoreError::NoSuchHost) => Err(HttpResponse::BadRequest().body("No such host")),
        Err(err) => {
            error!("Failed to delete host {host}: {err}");
            Err(HttpResponse::InternalServerError().body(err.to_string()))
        }
    }
}

#[get("/api/hosts")]
pub async fn list_hosts(state: web::Data<AppState>) -> impl Responder {
    match state.database.list_hosts().await {
        Ok(hosts) => HttpResponse::Ok().json(hosts),
        Err(err) => {
            error!("Failed to list hosts: {err}");
            HttpResponse::InternalServerError().body(err.to_string())
        }
    }
}

/// Body is a JSON-encoded string, e.g. `"a.example"`.
#[post("/api/hosts")]
pub async fn add_host(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> impl Responder {
    if !auth::authorized(&req, &state.config.auth) {
        return auth::unauthorized();
    }

    let Ok(host) = serde_json::from_slice::<String>(&body) else {
        return HttpResponse::BadRequest().body("Bad request");
    };

    match create_host(&state, &host).await {
        Ok(()) => HttpResponse::Created().finish(),
        Err(response) => response,
    }
}

#[delete("/api/hosts")]
pub async fn delete_host(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> impl Responder {
    if !auth::authorized(&req, &state.config.auth) {
        return auth::unauthorized();
    }

    let Ok(host) = serde_json::from_slice::<String>(&body) else {
        return HttpResponse::BadRequest().body("Bad request");
    };

    match drop_host(&state, &host).await {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(response) => response,
    }
}
