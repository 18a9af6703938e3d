//! Upload and download handlers.
//!
//! Both resolve a client supplied, root-relative path through
//! [`pathguard`] before touching the filesystem, then move the data through
//! the blocking archive codec on the blocking pool. Errors become plain-text
//! responses here and nowhere else.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use http::StatusCode;
use http::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use tracing::{debug, error};

use crate::archive::{self, ArchiveError};
use crate::body;
use crate::handler::Handler;
use crate::metrics::Metrics;
use crate::pathguard::{self, PathEscape};
use crate::request::Request;
use crate::response::Response;

pub const TAR_GZIP: &str = "application/tar+gzip";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Upload destination, relative to the document root.
pub const DEPLOY_PATH: &str = "deploy-path";
/// Download source, relative to the document root.
pub const DOWNLOAD_PATH: &str = "download-path";

#[derive(Clone, Copy, Debug)]
enum UploadKind {
    Archive,
    File,
}

/// `POST` handler unpacking `application/tar+gzip` bodies, or saving
/// `application/octet-stream` bodies as one file, at the `Deploy-Path`
/// header below `doc_root`.
pub fn upload(doc_root: PathBuf, metrics: Option<Metrics>) -> impl Handler {
    let doc_root: Arc<Path> = Arc::from(doc_root);
    move |req: Request| {
        let doc_root = Arc::clone(&doc_root);
        let metrics = metrics.clone();
        async move { receive(&doc_root, metrics.as_ref(), req).await }
    }
}

/// `GET` handler streaming the `Download-Path` header below `doc_root` as
/// `application/tar+gzip`. Requires `Accept: application/tar+gzip`.
pub fn download(doc_root: PathBuf) -> impl Handler {
    let doc_root: Arc<Path> = Arc::from(doc_root);
    move |req: Request| {
        let doc_root = Arc::clone(&doc_root);
        async move { send(&doc_root, req).await }
    }
}

async fn receive(doc_root: &Path, metrics: Option<&Metrics>, req: Request) -> Response {
    let deploy_path = req.header(DEPLOY_PATH).unwrap_or_default().to_owned();
    let target = match pathguard::resolve(doc_root, &deploy_path) {
        Ok(target) => target,
        Err(escape) => return path_violation("upload", &escape),
    };
    let kind = match req.header(CONTENT_TYPE).map(media_type) {
        Some(TAR_GZIP) => UploadKind::Archive,
        Some(OCTET_STREAM) => UploadKind::File,
        _ => return Response::not_found(),
    };
    if matches!(kind, UploadKind::File) && target == pathguard::absolute(doc_root) {
        debug!(path = %target.display(), "rejected file upload onto the root");
        return Response::error(StatusCode::BAD_REQUEST, ArchiveError::FileOverRoot(target).to_string());
    }

    let reader = body::reader(req.into_body());
    let dest = target.clone();
    let written = tokio::task::spawn_blocking(move || match kind {
        UploadKind::Archive => archive::unpack(reader, &dest),
        UploadKind::File => archive::save_file(reader, &dest),
    })
    .await;

    match written {
        Ok(Ok(bytes)) => {
            let msg = format!("upload complete ! Bytes written: {bytes}");
            debug!(path = %target.display(), bytes, "{msg}");
            if let Some(metrics) = metrics {
                metrics.observe_upload(bytes);
            }
            Response::text(msg)
        }
        Ok(Err(ArchiveError::PathEscape(escape))) => path_violation("upload", &escape),
        Ok(Err(e)) if e.is_client_error() => {
            debug!(path = %target.display(), error = %e, "rejected upload");
            Response::error(StatusCode::BAD_REQUEST, e.to_string())
        }
        Ok(Err(e)) => {
            error!(path = %target.display(), error = %e, "upload failed");
            Response::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            error!(error = %e, "upload task failed");
            Response::error(StatusCode::INTERNAL_SERVER_ERROR, "upload failed")
        }
    }
}

async fn send(doc_root: &Path, req: Request) -> Response {
    if req.header(ACCEPT).map(media_type) != Some(TAR_GZIP) {
        return Response::not_found();
    }
    let download_path = req.header(DOWNLOAD_PATH).unwrap_or_default().to_owned();
    let remote = req.remote_addr();
    let source = match pathguard::resolve(doc_root, &download_path) {
        Ok(source) => source,
        Err(escape) => return path_violation("download", &escape),
    };

    match tokio::fs::symlink_metadata(&source).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Response::not_found(),
        Err(e) => {
            error!(path = %source.display(), error = %e, "download source unreadable");
            return Response::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    }

    // The status line is committed before packing starts; failures past this
    // point truncate the body.
    let (mut writer, stream) = body::channel();
    tokio::task::spawn_blocking(move || match archive::pack(&mut writer, &source) {
        Ok(bytes) => debug!(%remote, bytes, "sent tar.gz"),
        Err(e) => {
            error!(%remote, path = %source.display(), error = %e, "failed writing tar.gz to the wire");
            writer.abort(io::Error::other(e.to_string()));
        }
    });

    Response::stream(HeaderValue::from_static(TAR_GZIP), stream)
}

fn path_violation(direction: &str, escape: &PathEscape) -> Response {
    error!(path = %escape.candidate.display(), root = %escape.root.display(), "{direction} path violation");
    Response::error(StatusCode::BAD_REQUEST, escape.to_string())
}

/// `type/subtype` without parameters.
fn media_type(value: &str) -> &str {
    value.split(';').next().unwrap_or_default().trim()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Cursor;

    use http_body_util::BodyExt;

    use super::*;

    fn request(method: http::Method, headers: &[(&str, &str)], body: Vec<u8>) -> Request {
        let mut builder = http::Request::builder().method(method).uri("/transfer");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        Request::new(builder.body(body::full(body)).unwrap(), "127.0.0.1:1".parse().unwrap())
    }

    async fn text(res: Response) -> String {
        String::from_utf8(res.into_body().collect().await.unwrap().to_bytes().to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_upload_file_reports_bytes() {
        let root = tempfile::tempdir().unwrap();
        let handler = upload(root.path().to_owned(), None).into_boxed_handler();

        let req = request(
            http::Method::POST,
            &[("Deploy-Path", "docs/a.txt"), ("Content-Type", OCTET_STREAM)],
            b"01234567890123456789".to_vec(),
        );
        let res = handler.call(req).await;

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(text(res).await, "upload complete ! Bytes written: 20");
        assert_eq!(fs::read(root.path().join("docs/a.txt")).unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_upload_outside_root_is_rejected() {
        let outer = tempfile::tempdir().unwrap();
        let root = outer.path().join("root");
        fs::create_dir(&root).unwrap();
        let handler = upload(root, None).into_boxed_handler();

        let req = request(
            http::Method::POST,
            &[("Deploy-Path", "../x.txt"), ("Content-Type", OCTET_STREAM)],
            b"x".to_vec(),
        );
        let res = handler.call(req).await;

        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert!(text(res).await.contains("is not a suitable one"));
        assert!(!outer.path().join("x.txt").exists());
    }

    #[tokio::test]
    async fn test_upload_file_without_deploy_path_is_bad_request() {
        let root = tempfile::tempdir().unwrap();
        let handler = upload(root.path().to_owned(), None).into_boxed_handler();

        let req = request(http::Method::POST, &[("Content-Type", OCTET_STREAM)], b"x".to_vec());
        let res = handler.call(req).await;

        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert!(text(res).await.contains("is the destination directory"));
        assert!(root.path().is_dir());
    }

    #[tokio::test]
    async fn test_upload_archive_to_parent_is_rejected() {
        let outer = tempfile::tempdir().unwrap();
        let root = outer.path().join("root");
        fs::create_dir(&root).unwrap();
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("page.html"), b"<p>hi</p>").unwrap();
        let mut archive = Vec::new();
        archive::pack(&mut archive, src.path()).unwrap();
        let handler = upload(root.clone(), None).into_boxed_handler();

        let req = request(http::Method::POST, &[("Deploy-Path", ".."), ("Content-Type", TAR_GZIP)], archive);
        let res = handler.call(req).await;

        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        let body = text(res).await;
        assert!(body.contains("is not a suitable one, it is outside of"), "{body}");
        assert!(!outer.path().join("page.html").exists());
        assert_eq!(fs::read_dir(outer.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_upload_unknown_content_type_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let handler = upload(root.path().to_owned(), None).into_boxed_handler();

        let req = request(http::Method::POST, &[("Content-Type", "text/plain")], b"x".to_vec());
        assert_eq!(handler.call(req).await.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_garbage_archive_is_bad_request() {
        let root = tempfile::tempdir().unwrap();
        let handler = upload(root.path().to_owned(), None).into_boxed_handler();

        let req = request(http::Method::POST, &[("Content-Type", TAR_GZIP)], b"not an archive".to_vec());
        assert_eq!(handler.call(req).await.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_download_streams_archive() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("notes")).unwrap();
        fs::write(root.path().join("notes/a.txt"), b"hello").unwrap();
        let handler = download(root.path().to_owned()).into_boxed_handler();

        let req = request(http::Method::GET, &[("Accept", TAR_GZIP), ("Download-Path", "notes")], Vec::new());
        let res = handler.call(req).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.headers()[CONTENT_TYPE], TAR_GZIP);

        let archive = res.into_body().collect().await.unwrap().to_bytes();
        let dest = tempfile::tempdir().unwrap();
        archive::unpack(Cursor::new(archive.to_vec()), dest.path()).unwrap();
        assert_eq!(fs::read(dest.path().join("a.txt")).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_download_requires_accept_header() {
        let root = tempfile::tempdir().unwrap();
        let handler = download(root.path().to_owned()).into_boxed_handler();

        let req = request(http::Method::GET, &[("Accept", "text/html")], Vec::new());
        assert_eq!(handler.call(req).await.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_download_missing_and_escaping_paths() {
        let root = tempfile::tempdir().unwrap();
        let handler = download(root.path().to_owned()).into_boxed_handler();

        let missing = request(http::Method::GET, &[("Accept", TAR_GZIP), ("Download-Path", "nope")], Vec::new());
        assert_eq!(handler.call(missing).await.status_code(), StatusCode::NOT_FOUND);

        let escaping = request(http::Method::GET, &[("Accept", TAR_GZIP), ("Download-Path", "../..")], Vec::new());
        assert_eq!(handler.call(escaping).await.status_code(), StatusCode::BAD_REQUEST);
    }
}
