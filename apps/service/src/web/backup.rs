use std::collections::HashMap;

use actix_web::{HttpRequest, HttpResponse, Responder, get, route, web};
use chrono::DateTime;
use tracing::error;

use super::{AppState, auth};
use crate::database::StoreError;
use crate::database::models::BackupData;
use crate::monitoring::classify::{CheckKind, check_kind};

fn internal(err: impl std::fmt::Display) -> HttpResponse {
    HttpResponse::InternalServerError().body(err.to_string())
}

async fn export(state: &AppState, with_checks: bool) -> Result<BackupData, HttpResponse> {
    let hosts = state.database.list_hosts().await.map_err(internal)?;
    let notifications = state.database.list_notification_params().await.map_err(internal)?;

    let mut checks = HashMap::new();
    if with_checks {
        for host in &hosts {
            let history = state
                .database
                .get_checks(host, DateTime::UNIX_EPOCH, DateTime::<chrono::Utc>::MAX_UTC)
                .await
                .map_err(internal)?;
            checks.insert(host.clone(), history);
        }
    }

    Ok(BackupData { hosts, notifications, checks })
}

/// Re-add everything from a backup. Hosts that already exist are kept as
/// they are; anything else failing aborts the import.
async fn import(state: &AppState, data: &BackupData) -> Result<(), HttpResponse> {
    for host in &data.hosts {
        if check_kind(host) == CheckKind::Invalid {
            return Err(internal(format!("host {host} not acceptable")));
        }
        match state.database.add_host(host).await {
            Ok(()) | Err(StoreError::HostExists) => {}
            Err(err) => {
                error!("Backup import failed to add host {host}: {err}");
                return Err(internal(err));
            }
        }
    }

    for params in &data.notifications {
        if let Err(err) = state.database.upsert_notification_params(params).await {
            error!("Backup import failed to store params for {}: {err}", params.host);
            return Err(internal(err));
        }
    }

    for (host, history) in &data.checks {
        for check in history {
            if let Err(err) =
                state.database.save_check(host, check.check_time, check.rtt, check.up).await
            {
                error!("Backup import failed to save check for {host}: {err}");
                return Err(internal(err));
            }
        }
    }

    Ok(())
}

async fn respond_export(
    req: &HttpRequest,
    state: &AppState,
    with_checks: bool,
) -> HttpResponse {
    if !auth::authorized(req, &state.config.auth) {
        return auth::unauthorized();
    }

    match export(state, with_checks).await {
        Ok(data) => HttpResponse::Ok().json(data),
        Err(response) => response,
    }
}

async fn respond_import(req: &HttpRequest, state: &AppState, body: &[u8]) -> HttpResponse {
    if !auth::authorized(req, &state.config.auth) {
        return auth::unauthorized();
    }

    let Ok(data) = serde_json::from_slice::<BackupData>(body) else {
        return HttpResponse::BadRequest().body("Bad request");
    };

    match import(state, &data).await {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(response) => response,
    }
}

/// Hosts and notification params only.
#[get("/api/backup")]
pub async fn export_backup(req: HttpRequest, state: web::Data<AppState>) -> impl Responder {
    respond_export(&req, &state, false).await
}

#[route("/api/backup", method = "POST", method = "PUT")]
pub async fn import_backup(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> impl Responder {
    respond_import(&req, &state, &body).await
}

/// Everything, including every host's full check history.
#[get("/api/backup_full")]
pub async fn export_backup_full(req: HttpRequest, state: web::Data<AppState>) -> impl Responder {
    respond_export(&req, &state, true).await
}

#[route("/api/backup_full", method = "POST", method = "PUT")]
pub async fn import_backup_full(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> impl Responder {
    respond_import(&req, &state, &body).await
}
