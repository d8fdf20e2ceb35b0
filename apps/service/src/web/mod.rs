/// HTTP surface
///
/// JSON API, backup import/export, the SVG availability chart and a few
/// server-rendered pages, all reading through the storage trait.
pub mod auth;
pub mod backup;
pub mod chart;
pub mod checks;
pub mod hosts;
pub mod pages;
pub mod params;
pub mod remote;


use std::sync::Arc;

use actix_web::web::ServiceConfig;

use crate::config::Config;
use crate::database::Database;
use crate::monitoring::ProbeExecutor;
use remote::RemoteChecks;

/// Shared state handed to every handler.
pub struct AppState {
    pub database: Arc<dyn Database>,
    pub executor: Arc<ProbeExecutor>,
    pub remote: RemoteChecks,
    pub config: Config,
}

pub fn routes(cfg: &mut ServiceConfig) {
    cfg.service(hosts::list_hosts)
        .service(hosts::add_host)
        .service(hosts::delete_host)
        .service(checks::get_checks)
        .service(checks::post_checks)
        .service(checks::get_last_check)
        .service(checks::post_last_check)
        .service(checks::get_single_check)
        .service(checks::post_single_check)
        .service(checks::checks_svg)
        .service(params::list_params)
        .service(params::upsert_params)
        .service(params::delete_params)
        .service(backup::export_backup)
        .service(backup::import_backup)
        .service(backup::export_backup_full)
        .service(backup::import_backup_full)
        .service(pages::index)
        .service(pages::index_html)
        .service(pages::hosts_page)
        .service(pages::hosts_page_submit)
        .service(pages::view_page)
        .service(pages::checks_page);
}
