use std::sync::Arc;

use http::StatusCode;
use http::header::{HeaderValue, WWW_AUTHENTICATE};
use tracing::{debug, error};

use super::Middleware;
use crate::auth::{self, AuthRule};
use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;
use crate::response::Response;

/// Enforces one [`AuthRule`].
///
/// Requests the rule does not apply to pass through untouched. Requests it
/// applies to need valid HTTP Basic credentials, otherwise they get a 401
/// with a `WWW-Authenticate` challenge. Several checkers in one chain are
/// independent: each one can reject.
pub struct AuthChecker {
    rule: Arc<AuthRule>,
    challenge: HeaderValue,
}

impl AuthChecker {
    pub fn new(realm: &str, rule: AuthRule) -> Self {
        let challenge = HeaderValue::from_str(&format!("Basic realm=\"{realm}\""))
            .unwrap_or_else(|_| HeaderValue::from_static("Basic"));
        Self { rule: Arc::new(rule), challenge }
    }
}

impl Middleware for AuthChecker {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let rule = Arc::clone(&self.rule);
        let challenge = self.challenge.clone();
        (move |req: Request| {
            let next = Arc::clone(&next);
            let applies = rule.applies(req.method(), req.path());
            let presented = if applies { auth::basic_credentials(req.headers()) } else { None };
            let rule = Arc::clone(&rule);
            let challenge = challenge.clone();
            async move {
                if !applies {
                    return next.call(req).await;
                }
                let Some((user, password)) = presented else {
                    debug!(path = %req.path(), "missing or malformed credentials");
                    return unauthorized(challenge);
                };
                let checked = tokio::task::spawn_blocking(move || {
                    let ok = rule.credentials().verify(&user, &password);
                    (user, ok)
                })
                .await;
                match checked {
                    Ok((_, true)) => next.call(req).await,
                    Ok((user, false)) => {
                        debug!(%user, "rejected credentials");
                        unauthorized(challenge)
                    }
                    Err(e) => {
                        error!(error = %e, "credential check failed");
                        Response::error(StatusCode::INTERNAL_SERVER_ERROR, "credential check failed")
                    }
                }
            }
        })
        .into_boxed_handler()
    }
}

fn unauthorized(challenge: HeaderValue) -> Response {
    let mut res = Response::error(StatusCode::UNAUTHORIZED, "401 Unauthorized");
    res.headers_mut().insert(WWW_AUTHENTICATE, challenge);
    res
}

#[cfg(test)]
mod tests {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use http::Method;
    use http::header::AUTHORIZATION;

    use super::*;
    use crate::auth::CredentialSet;
    use crate::body;

    fn checker(method: Method, pattern: &str) -> BoxedHandler {
        let hash = bcrypt::hash("secret", 4).unwrap();
        let credentials = CredentialSet::from_htpasswd(&format!("alice:{hash}")).unwrap();
        let rule = AuthRule::new(method, pattern, credentials).unwrap();
        AuthChecker::new("docserve", rule).wrap((|_: Request| async { Response::text("ok") }).into_boxed_handler())
    }

    fn request(method: Method, path: &str, credentials: Option<&str>) -> Request {
        let mut builder = http::Request::builder().method(method).uri(path);
        if let Some(pair) = credentials {
            builder = builder.header(AUTHORIZATION, format!("Basic {}", STANDARD.encode(pair)));
        }
        Request::new(builder.body(body::empty()).unwrap(), "127.0.0.1:1".parse().unwrap())
    }

    #[tokio::test]
    async fn test_valid_credentials_pass() {
        let handler = checker(Method::GET, ".*");
        let res = handler.call(request(Method::GET, "/a", Some("alice:secret"))).await;
        assert_eq!(res.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_credentials_are_challenged() {
        let handler = checker(Method::GET, ".*");
        let res = handler.call(request(Method::GET, "/a", None)).await;
        assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(res.headers()[WWW_AUTHENTICATE], r#"Basic realm="docserve""#);
    }

    #[tokio::test]
    async fn test_wrong_credentials_are_rejected() {
        let handler = checker(Method::GET, ".*");
        let res = handler.call(request(Method::GET, "/a", Some("alice:nope"))).await;
        assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_requests_outside_the_rule_pass() {
        let handler = checker(Method::POST, "/upload");
        assert_eq!(handler.call(request(Method::GET, "/upload", None)).await.status_code(), StatusCode::OK);
        assert_eq!(handler.call(request(Method::POST, "/other", None)).await.status_code(), StatusCode::OK);
    }
}
