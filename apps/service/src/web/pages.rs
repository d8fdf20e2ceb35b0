use actix_web::{HttpRequest, HttpResponse, Responder, get, post, web};
use serde::Deserialize;
use tracing::error;
use url::form_urlencoded::byte_serialize;

use super::checks::{ChecksQuery, request_from_query, validate_request};
use super::{AppState, auth, checks, hosts};

fn html(body: String) -> HttpResponse {
    HttpResponse::Ok().content_type("text/html; charset=utf-8").body(body)
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn escape_query(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect()
}

/// Landing page: single-check form when enabled, endpoint links.
#[derive(Debug, Deserialize)]
pub struct IndexQuery {
    #[serde(default)]
    host: String,
}

async fn render_index(state: &AppState, host: &str) -> HttpResponse {
    let mut body = String::from(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"UTF-8\"><title>srvmon</title></head>\n<body>\n",
    );

    if state.config.checks.allow_single_checks {
        body.push_str(&format!(
            "<h2>Check host</h2>\n<form action=\"/\" method=\"get\">\n\
             <input name=\"host\" type=\"text\" value=\"{}\">\n\
             <input type=\"submit\" value=\"Check\">\n</form>\n",
            escape_html(host)
        ));

        if !host.is_empty() {
            let outcome = state.executor.dispatch(host).await;
            if outcome.error.is_none() {
                let state_word = if outcome.up { "up" } else { "down" };
                body.push_str(&format!(
                    "<h2>Result</h2>\n<p>Host is <b>{state_word}</b> rtt: {}ns</p>\n",
                    outcome.rtt
                ));
            }
        }
    }

    body.push_str(
        "<h2>Web Endpoints</h2>\n<ul>\n\
         <li><a href=\"/web/hosts\">/web/hosts</a></li>\n\
         <li><a href=\"/web/checks\">/web/checks</a></li>\n\
         <li><a href=\"/web/view\">/web/view</a></li>\n\
         <li><a href=\"/web/checks/svg\">/web/checks/svg</a></li>\n\
         </ul>\n<h2>API Endpoints</h2>\n<ul>\n\
         <li><a href=\"/api/hosts\">/api/hosts</a></li>\n\
         <li><a href=\"/api/checks\">/api/checks</a></li>\n\
         <li><a href=\"/api/checks/last\">/api/checks/last</a></li>\n\
         <li><a href=\"/api/notifications_params\">/api/notifications_params</a></li>\n\
         <li><a href=\"/api/backup\">/api/backup</a></li>\n",
    );
    if state.config.checks.allow_single_checks {
        body.push_str("<li><a href=\"/api/check\">/api/check</a></li>\n");
    }
    body.push_str("</ul>\n</body>\n</html>\n");

    html(body)
}

#[get("/")]
pub async fn index(state: web::Data<AppState>, query: web::Query<IndexQuery>) -> impl Responder {
    render_index(&state, &query.host).await
}

#[get("/index.html")]
pub async fn index_html(
    state: web::Data<AppState>,
    query: web::Query<IndexQuery>,
) -> impl Responder {
    render_index(&state, &query.host).await
}

/// Host management page with add/delete forms.
#[derive(Debug, Deserialize)]
pub struct HostsForm {
    action: String,
    host: String,
}

async fn render_hosts(state: &AppState, banner: Option<&str>) -> HttpResponse {
    let hosts = match state.database.list_hosts().await {
        Ok(hosts) => hosts,
        Err(err) => {
            error!("Failed to list hosts: {err}");
            return HttpResponse::InternalServerError().body(err.to_string());
        }
    };

    let mut body = String::from(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"UTF-8\"><title>Hosts</title>\n\
         <style>td {padding-right: 1em;}</style></head>\n<body>\n\
         <h2>Add host</h2>\n<form action=\"/web/hosts\" method=\"post\">\n\
         <input type=\"hidden\" name=\"action\" value=\"add\">\n\
         <input name=\"host\" type=\"text\">\n\
         <input type=\"submit\" value=\"Add\">\n</form>\n",
    );

    if let Some(banner) = banner {
        body.push_str(&format!("<h2>{banner}</h2>\n"));
    }

    body.push_str("<h2>Hosts</h2>\n<table id=\"hosts\">\n");
    for host in &hosts {
        let query = escape_query(host);
        let label = escape_html(host);
        body.push_str(&format!(
            "<tr>\n<td><a href=\"/web/view?host={query}\">{label}</a></td>\n\
             <td><a href=\"/web/checks/svg?host={query}\">Last day</a></td>\n\
             <td><form action=\"/web/hosts\" method=\"post\">\n\
             <input type=\"hidden\" name=\"action\" value=\"del\">\n\
             <input type=\"hidden\" name=\"host\" value=\"{label}\">\n\
             <input type=\"submit\" value=\"Delete\">\n</form></td>\n</tr>\n"
        ));
    }
    body.push_str("</table>\n</body>\n</html>\n");

    html(body)
}

#[get("/web/hosts")]
pub async fn hosts_page(state: web::Data<AppState>) -> impl Responder {
    render_hosts(&state, None).await
}

#[post("/web/hosts")]
pub async fn hosts_page_submit(
    req: HttpRequest,
    state: web::Data<AppState>,
    form: web::Form<HostsForm>,
) -> impl Responder {
    if !auth::authorized(&req, &state.config.auth) {
        return auth::unauthorized();
    }
    if form.host.is_empty() {
        return HttpResponse::BadRequest().body("Bad request");
    }

    match form.action.as_str() {
        "add" => match hosts::create_host(&state, &form.host).await {
            Ok(()) => render_hosts(&state, Some("Host created")).await,
            Err(response) => response,
        },
        "del" => match hosts::drop_host(&state, &form.host).await {
            Ok(()) => render_hosts(&state, Some("Host deleted")).await,
            Err(response) => response,
        },
        _ => HttpResponse::BadRequest().body("Bad request"),
    }
}

/// Chart page for one host with a period-selection form.
#[derive(Debug, Deserialize)]
pub struct ViewQuery {
    #[serde(default)]
    host: String,
}

#[get("/web/view")]
pub async fn view_page(query: web::Query<ViewQuery>) -> impl Responder {
    let label = escape_html(&query.host);
    let chart_src = format!("/web/checks/svg?host={}", escape_query(&query.host));

    html(format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"UTF-8\"><title>Host Statistics</title></head>\n\
         <body>\n<form action=\"/web/checks/svg\" method=\"get\">\n\
         <input type=\"hidden\" name=\"host\" value=\"{label}\">\n\
         Start: <input name=\"start\" type=\"number\" placeholder=\"unix seconds\">\n\
         End: <input name=\"end\" type=\"number\" placeholder=\"unix seconds\">\n\
         <input type=\"submit\" value=\"Open\">\n</form>\n\
         <div id=\"chart\" style=\"margin-top: 25px;\"><img alt=\"Chart\" src=\"{chart_src}\"></div>\n\
         </body>\n</html>\n"
    ))
}

/// History table for one host, remote-merged like the chart.
#[get("/web/checks")]
pub async fn checks_page(
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

    // Second-granularity buckets keep the table entries distinct.
    let buckets = match checks::merged_buckets(&state, &request, 1).await {
        Ok(buckets) => buckets,
        Err(response) => return response,
    };

    let mut slots: Vec<i64> = buckets.keys().copied().collect();
    slots.sort_unstable();

    let mut body = String::from(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"UTF-8\"><title>Checks</title></head>\n\
         <body>\n<h2>Checks</h2>\n<table id=\"checks\">\n",
    );
    for slot in slots {
        let check = &buckets[&slot];
        body.push_str(&format!(
            "<tr>\n<td>{}</td>\n<td>{}</td>\n<td>{}</td>\n</tr>\n",
            check.check_time.format("%Y-%m-%d %H:%M:%S UTC"),
            check.rtt,
            check.up
        ));
    }
    body.push_str("</table>\n</body>\n</html>\n");

    html(body)
}
