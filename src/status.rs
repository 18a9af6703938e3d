//! `GET /status`.

use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;

use crate::handler::Handler;
use crate::info::Info;
use crate::request::Request;
use crate::response::Response;

#[derive(Serialize)]
struct Status<'a> {
    status: &'a str,
    info: &'a Info,
}

/// Reports liveness together with the server identity:
/// `{"status":"ok","info":{"name":…,"version":…,"build":…,"build_time":…}}`.
pub fn status(info: Info) -> impl Handler {
    let info = Arc::new(info);
    move |_: Request| {
        let body = serde_json::to_vec(&Status { status: "ok", info: &info });
        async move {
            match body {
                Ok(body) => Response::json(body),
                Err(e) => Response::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            }
        }
    }
}
