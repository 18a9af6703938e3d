//! Static file serving below a mount point.
//!
//! Files are streamed with a content type guessed from their extension.
//! Directories serve their `index.html` when present and an HTML listing
//! otherwise.

use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use http::StatusCode;
use http::header::{HeaderValue, LOCATION};
use tracing::{debug, error};

use crate::body;
use crate::handler::Handler;
use crate::pathguard;
use crate::request::Request;
use crate::response::Response;
use crate::router::MOUNT_PARAM;

const INDEX: &str = "index.html";

/// Handler serving `doc_root`. Meant to be [mounted](crate::Router::mount).
pub fn serve_dir(doc_root: PathBuf) -> impl Handler {
    let doc_root: Arc<Path> = Arc::from(doc_root);
    move |req: Request| {
        let doc_root = Arc::clone(&doc_root);
        let relative = req.param(MOUNT_PARAM).unwrap_or("/").to_owned();
        let request_path = req.path().to_owned();
        async move { serve(&doc_root, &relative, &request_path).await }
    }
}

async fn serve(doc_root: &Path, relative: &str, request_path: &str) -> Response {
    let path = match pathguard::resolve(doc_root, relative) {
        Ok(path) => path,
        Err(escape) => {
            error!(path = %escape.candidate.display(), "static path violation");
            return Response::error(StatusCode::BAD_REQUEST, escape.to_string());
        }
    };

    let metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Response::not_found(),
        Err(e) => return io_failure(&path, &e),
    };
    if !metadata.is_dir() {
        return stream_file(path).await;
    }

    // Relative links in a listing or index only resolve under a trailing
    // slash.
    if !request_path.ends_with('/') {
        if let Ok(location) = HeaderValue::from_str(&format!("{request_path}/")) {
            return Response::builder()
                .status(StatusCode::MOVED_PERMANENTLY)
                .header(LOCATION, location)
                .no_body();
        }
    }

    let index = path.join(INDEX);
    if tokio::fs::metadata(&index).await.is_ok_and(|m| m.is_file()) {
        return stream_file(index).await;
    }
    match listing(&path).await {
        Ok(html) => Response::html(html),
        Err(e) => io_failure(&path, &e),
    }
}

async fn stream_file(path: PathBuf) -> Response {
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file.into_std().await,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Response::not_found(),
        Err(e) => return io_failure(&path, &e),
    };
    let content_type = mime_guess::from_path(&path).first_or_octet_stream();
    let content_type = HeaderValue::from_str(content_type.as_ref())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    let (mut writer, stream) = body::channel();
    tokio::task::spawn_blocking(move || {
        let mut file = file;
        if let Err(e) = io::copy(&mut file, &mut writer) {
            debug!(path = %path.display(), error = %e, "static file transfer interrupted");
            writer.abort(e);
        }
    });
    Response::stream(content_type, stream)
}

async fn listing(dir: &Path) -> io::Result<String> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().await?.is_dir() {
            name.push('/');
        }
        names.push(name);
    }
    names.sort();

    let mut html = String::from("<!doctype html>\n<meta name=\"viewport\" content=\"width=device-width\">\n<pre>\n");
    for name in names {
        let escaped = escape_html(&name);
        let _ = writeln!(html, "<a href=\"{escaped}\">{escaped}</a>");
    }
    html.push_str("</pre>\n");
    Ok(html)
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn io_failure(path: &Path, e: &io::Error) -> Response {
    error!(path = %path.display(), error = %e, "static serving failed");
    Response::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
