use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::config::Auth;

/// Whether the request carries the shared credential.
///
/// Always true when auth is disabled; reads are left open, only the
/// mutating and exporting endpoints call this.
pub fn authorized(req: &HttpRequest, auth: &Auth) -> bool {
    if !auth.enabled {
        return true;
    }

    let Some((username, password)) = basic_credentials(req) else {
        return false;
    };
    username == auth.username && password == auth.password
}

fn basic_credentials(req: &HttpRequest) -> Option<(String, String)> {
    let header = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded).ok()?).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// The challenge response for a failed credential check.
pub fn unauthorized() -> HttpResponse {
    HttpResponse::Unauthorized()
        .insert_header((header::WWW_AUTHENTICATE, "Basic realm=\"Restricted\""))
        .body("401 - Not authorized")
}
