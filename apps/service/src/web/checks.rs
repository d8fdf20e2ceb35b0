use std::collections::HashMap;

use actix_web::{HttpResponse, Responder, get, post, web};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::error;

use super::AppState;
use super::chart::{render_chart, truncate_to_interval};
use crate::config::Web;
use crate::database::models::{CheckData, ChecksRequest};
use crate::monitoring::classify::{CheckKind, check_kind};

const CHART_WIDTH: i64 = 1280;
const CHART_HEIGHT: i64 = 720;

/// Query form of the history request: `start`/`end` are unix seconds,
/// defaulting to the last 24 hours.
#[derive(Debug, Deserialize)]
pub struct ChecksQuery {
    #[serde(default)]
    host: String,
    start: Option<String>,
    end: Option<String>,
}

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().body(message.to_string())
}

fn parse_unix(raw: &str) -> Result<DateTime<Utc>, HttpResponse> {
    let secs: i64 = raw.parse().map_err(|_| bad_request("Bad request"))?;
    DateTime::from_timestamp(secs, 0).ok_or_else(|| bad_request("Bad request"))
}

pub(super) fn request_from_query(query: &ChecksQuery) -> Result<ChecksRequest, HttpResponse> {
    let end = match &query.end {
        Some(raw) => parse_unix(raw)?,
        None => Utc::now(),
    };
    let start = match &query.start {
        Some(raw) => parse_unix(raw)?,
        None => end - Duration::hours(24),
    };

    Ok(ChecksRequest { host: query.host.clone(), start, end })
}

/// Request validation shared by the history, chart and table endpoints.
/// Order matters; each failure has its own 400 wording.
pub(super) async fn validate_request(
    state: &AppState,
    request: &ChecksRequest,
) -> Result<(), HttpResponse> {
    if request.host.is_empty() {
        return Err(bad_request("Bad request"));
    }
    if request.end < request.start {
        return Err(bad_request("Bad dates in request"));
    }
    if check_kind(&request.host) == CheckKind::Invalid {
        return Err(bad_request("Host not acceptable"));
    }

    match state.database.host_exists(&request.host).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(bad_request("Unknown host")),
        Err(err) => {
            error!("Failed to look up host {}: {err}", request.host);
            Err(HttpResponse::InternalServerError().body(err.to_string()))
        }
    }
}

async fn respond_checks(state: &AppState, request: ChecksRequest) -> HttpResponse {
    if let Err(response) = validate_request(state, &request).await {
        return response;
    }

    match state.database.get_checks(&request.host, request.start, request.end).await {
        Ok(checks) => HttpResponse::Ok().json(checks),
        Err(err) => {
            error!("Failed to load checks for {}: {err}", request.host);
            HttpResponse::InternalServerError().body(err.to_string())
        }
    }
}

#[get("/api/checks")]
pub async fn get_checks(
    state: web::Data<AppState>,
    query: web::Query<ChecksQuery>,
) -> impl Responder {
    match request_from_query(&query) {
        Ok(request) => respond_checks(&state, request).await,
        Err(response) => response,
    }
}

#[post("/api/checks")]
pub async fn post_checks(state: web::Data<AppState>, body: web::Bytes) -> impl Responder {
    let Ok(request) = serde_json::from_slice::<ChecksRequest>(&body) else {
        return bad_request("Bad request");
    };
    respond_checks(&state, request).await
}

/// Host named either by the `host` query parameter or a raw request body.
#[derive(Debug, Deserialize)]
pub struct HostQuery {
    #[serde(default)]
    host: String,
}

fn validate_host(host: &str) -> Result<(), HttpResponse> {
    if host.is_empty() {
        return Err(bad_request("Bad request"));
    }
    if check_kind(host) == CheckKind::Invalid {
        return Err(bad_request("Host not acceptable"));
    }
    Ok(())
}

async fn respond_last_check(state: &AppState, host: &str) -> HttpResponse {
    if let Err(response) = validate_host(host) {
        return response;
    }

    match state.database.get_last_check(host).await {
        Ok(Some(check)) => HttpResponse::Ok().json(check),
        Ok(None) => HttpResponse::NotFound().body("No checks for host"),
        Err(err) => {
            error!("Failed to load last check for {host}: {err}");
            HttpResponse::InternalServerError().body(err.to_string())
        }
    }
}

#[get("/api/checks/last")]
pub async fn get_last_check(
    state: web::Data<AppState>,
    query: web::Query<HostQuery>,
) -> impl Responder {
    respond_last_check(&state, &query.host).await
}

#[post("/api/checks/last")]
pub async fn post_last_check(state: web::Data<AppState>, body: String) -> impl Responder {
    respond_last_check(&state, &body).await
}

/// On-demand probe; nothing is persisted and no state change is evaluated.
pub(super) async fn respond_single_check(state: &AppState, host: &str) -> HttpResponse {
    if !state.config.checks.allow_single_checks {
        return HttpResponse::Forbidden().body("Single checks are not allowed");
    }
    if let Err(response) = validate_host(host) {
        return response;
    }

    let outcome = state.executor.dispatch(host).await;
    if let Some(err) = &outcome.error {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok().json(CheckData { check_time: Utc::now(), rtt: outcome.rtt, up: outcome.up })
}

#[get("/api/check")]
pub async fn get_single_check(
    state: web::Data<AppState>,
    query: web::Query<HostQuery>,
) -> impl Responder {
    respond_single_check(&state, &query.host).await
}

#[post("/api/check")]
pub async fn post_single_check(state: web::Data<AppState>, body: String) -> impl Responder {
    respond_single_check(&state, &body).await
}

/// Load the local series into interval-aligned buckets and fold in any
/// configured remote instances.
pub(super) async fn merged_buckets(
    state: &AppState,
    request: &ChecksRequest,
    interval_secs: i64,
) -> Result<HashMap<i64, CheckData>, HttpResponse> {
    let checks = state
        .database
        .get_checks(&request.host, request.start, request.end)
        .await
        .map_err(|err| {
            error!("Failed to load checks for {}: {err}", request.host);
            HttpResponse::InternalServerError().body(err.to_string())
        })?;

    let mut buckets: HashMap<i64, CheckData> = HashMap::new();
    for check in checks {
        buckets.insert(truncate_to_interval(check.check_time.timestamp(), interval_secs), check);
    }

    state.remote.merge_into(&mut buckets, request, interval_secs).await;
    Ok(buckets)
}

/// Chart y-axis scale in milliseconds: the configured maximum, or with
/// dynamic scaling the observed maximum rounded up to the next 100ms and
/// capped by the configured maximum.
fn rtt_scale_ms(web: &Web, buckets: &HashMap<i64, CheckData>) -> i64 {
    if !web.dynamic_rtt_scale {
        return web.max_rtt_scale_ms;
    }

    let max_rtt_ms = buckets.values().map(|check| check.rtt).max().unwrap_or(0) / 1_000_000 + 1;
    let dynamic = (max_rtt_ms / 100 + if max_rtt_ms % 100 > 0 { 1 } else { 0 }) * 100;
    if dynamic > 0 && dynamic < web.max_rtt_scale_ms {
        dynamic
    } else {
        web.max_rtt_scale_ms
    }
}

#[get("/web/checks/svg")]
pub async fn checks_svg(
    state: web::Data<AppState>,
    query: web::Query<ChecksQuery>,
) -> impl Responder {
    let request = match request_from_query(&query) {
        Ok(request) => request,
        Err(response) => return response,
    };
    if let Err(response) = validate_request(&state, &request).await {
        return response;
    }

    let interval_secs = state.config.checks.interval_secs;
    let buckets = match merged_buckets(&state, &request, interval_secs).await {
        Ok(buckets) => buckets,
        Err(response) => return response,
    };

    let scale = rtt_scale_ms(&state.config.web, &buckets);
    let chart =
        render_chart(CHART_WIDTH, CHART_HEIGHT, scale, interval_secs, &request, &buckets);
    HttpResponse::Ok().content_type("image/svg+xml").body(chart)
}
