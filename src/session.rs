use std::{fmt, time::Duration};

use reqwest::{
    header::{HeaderValue, COOKIE},
    multipart::Form,
    Request, RequestBuilder,
};
use tokio::{sync::RwLock, time::timeout};
use tracing::{debug, info, warn};

use crate::{
    credentials::Credentials,
    error::{Result, ThermostatError},
    protocol::{endpoint_url, extract_token, Endpoint, AUTH_COOKIE, PASSWORD_FIELD},
};

/// Opaque session token issued by the controller
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap a token value
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw token value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn cookie(&self) -> String {
        format!("{AUTH_COOKIE}={}", self.0)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

/// Credentials, token and the generation they belong to, guarded together
#[derive(Debug)]
struct SessionState {
    credentials: Credentials,
    token: Option<SessionToken>,
    generation: u64,
}

/// Owner of the controller credentials and the current session
///
/// The token is either entirely present or absent. Renewal replaces it
/// wholesale; concurrent callers read whichever token was written last.
/// A token only ever belongs to the credentials it was issued for: each
/// [`configure`](Self::configure) starts a new generation and a login that
/// began under an older generation is discarded.
#[derive(Debug)]
pub struct SessionManager {
    state: RwLock<SessionState>,
}

impl SessionManager {
    /// Create a manager for `base_url`, hashing `secret` immediately
    #[must_use]
    pub fn new(base_url: impl Into<String>, secret: &str) -> Self {
        Self {
            state: RwLock::new(SessionState {
                credentials: Credentials::new(base_url, secret),
                token: None,
                generation: 0,
            }),
        }
    }

    /// Replace URL and secret, dropping the current session
    pub async fn configure(&self, base_url: impl Into<String>, secret: &str) {
        let credentials = Credentials::new(base_url, secret);
        info!("Session configured for {}", credentials.base_url);

        let mut state = self.state.write().await;
        state.credentials = credentials;
        state.token = None;
        state.generation = state.generation.wrapping_add(1);
    }

    /// Current base URL
    pub async fn base_url(&self) -> String {
        self.state.read().await.credentials.base_url.clone()
    }

    /// Full URL of an endpoint on the configured controller
    pub async fn url_for(&self, endpoint: Endpoint) -> String {
        endpoint_url(&self.state.read().await.credentials.base_url, endpoint)
    }

    /// Endpoint URL and the token issued by that same controller
    ///
    /// Both are read under one lock so a request never pairs one
    /// controller's URL with another controller's token.
    pub async fn target(&self, endpoint: Endpoint) -> (String, Option<SessionToken>) {
        let state = self.state.read().await;
        (
            endpoint_url(&state.credentials.base_url, endpoint),
            state.token.clone(),
        )
    }

    /// Whether a session token is currently held
    pub async fn has_session(&self) -> bool {
        self.state.read().await.token.is_some()
    }

    /// Snapshot of the current token
    pub async fn token(&self) -> Option<SessionToken> {
        self.state.read().await.token.clone()
    }

    /// Install a token obtained elsewhere
    pub async fn set_token(&self, token: SessionToken) {
        self.state.write().await.token = Some(token);
    }

    /// Forget the current session
    pub async fn invalidate(&self) {
        if self.state.write().await.token.take().is_some() {
            debug!("Session token discarded");
        }
    }

    /// Build a request carrying exactly the current session cookie
    ///
    /// Any `Cookie` header already on the request is replaced. Requests are
    /// left anonymous when no session is held.
    ///
    /// # Errors
    ///
    /// Returns [`ThermostatError::InvalidConfig`] if the request cannot be
    /// built, or [`ThermostatError::Protocol`] if the token is not a valid
    /// header value.
    pub async fn attach(&self, request: RequestBuilder) -> Result<Request> {
        let mut request = request.build()?;
        let token = self.token().await;
        apply_token(&mut request, token.as_ref())?;
        Ok(request)
    }

    /// Run the login exchange and store the issued token
    ///
    /// # Errors
    ///
    /// Returns [`ThermostatError::AuthenticationFailed`] with the status code
    /// on any non-success response, [`ThermostatError::Protocol`] if the
    /// controller accepted the login without issuing a token or the session
    /// was reconfigured while the login was in flight,
    /// [`ThermostatError::Timeout`] if the exchange exceeds `deadline`, or
    /// [`ThermostatError::NetworkUnreachable`] on transport failure.
    pub async fn authenticate(&self, http: &reqwest::Client, deadline: Duration) -> Result<()> {
        let (url, secret, generation) = {
            let state = self.state.read().await;
            (
                endpoint_url(&state.credentials.base_url, Endpoint::Auth),
                state.credentials.secret.as_str().to_string(),
                state.generation,
            )
        };
        info!("Authenticating with controller");

        let form = Form::new().text(PASSWORD_FIELD, secret);
        let exchange = async {
            let response = http
                .request(Endpoint::Auth.method(), &url)
                .multipart(form)
                .send()
                .await?;
            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok::<_, ThermostatError>((status, headers, body))
        };

        let timeout_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX);
        let (status, headers, body) = timeout(deadline, exchange)
            .await
            .map_err(|_| ThermostatError::Timeout { timeout_ms })??;

        if !(200..300).contains(&status) {
            warn!("Authentication rejected with status {}", status);
            return Err(ThermostatError::AuthenticationFailed { status });
        }

        let token = extract_token(&headers, &body).ok_or_else(|| {
            ThermostatError::Protocol("login succeeded but no session token was issued".to_string())
        })?;

        let mut state = self.state.write().await;
        if state.generation != generation {
            warn!("Session reconfigured during login, discarding token from {}", url);
            return Err(ThermostatError::Protocol(
                "session was reconfigured while logging in".to_string(),
            ));
        }
        state.token = Some(SessionToken::new(token));
        drop(state);

        info!("Authentication successful");
        Ok(())
    }
}

/// Replace every `Cookie` header with the session cookie, if any
pub(crate) fn apply_token(request: &mut Request, token: Option<&SessionToken>) -> Result<()> {
    let headers = request.headers_mut();
    headers.remove(COOKIE);
    if let Some(token) = token {
        let value = HeaderValue::from_str(&token.cookie()).map_err(|_| {
            ThermostatError::Protocol("session token is not a valid cookie value".to_string())
        })?;
        headers.insert(COOKIE, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::hash_secret;
    use std::sync::Arc;
    use tokio_test::assert_ok;
    use wiremock::{
        matchers::{body_string_contains, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    #[tokio::test]
    async fn test_attach_without_session_is_anonymous() {
        let session = SessionManager::new("http://pi", "pw");
        let http = reqwest::Client::new();

        let request = session.attach(http.get("http://pi/getParams")).await.unwrap();
        assert!(request.headers().get(COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_attach_replays_single_cookie() {
        let session = SessionManager::new("http://pi", "pw");
        session.set_token(SessionToken::new("first")).await;
        session.set_token(SessionToken::new("second")).await;
        let http = reqwest::Client::new();

        let request = session
            .attach(http.get("http://pi/getParams").header(COOKIE, "authToken=stale"))
            .await
            .unwrap();
        let cookies: Vec<_> = request.headers().get_all(COOKIE).iter().collect();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0], "authToken=second");
    }

    #[tokio::test]
    async fn test_attach_strips_cookie_without_session() {
        let session = SessionManager::new("http://pi", "pw");
        let http = reqwest::Client::new();

        let request = session
            .attach(http.get("http://pi/getParams").header(COOKIE, "authToken=stale"))
            .await
            .unwrap();
        assert!(request.headers().get(COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_target_pairs_url_with_its_token() {
        let session = SessionManager::new("http://pi", "pw");
        session.set_token(SessionToken::new("token")).await;
        assert_eq!(
            session.target(Endpoint::GetParams).await,
            ("http://pi/getParams".to_string(), Some(SessionToken::new("token")))
        );

        session.configure("http://other", "pw").await;
        assert_eq!(
            session.target(Endpoint::GetParams).await,
            ("http://other/getParams".to_string(), None)
        );
    }

    #[tokio::test]
    async fn test_login_in_flight_during_configure_is_discarded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "authToken=old-controller; Path=/")
                    .set_delay(Duration::from_millis(300)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let session = Arc::new(SessionManager::new(server.uri(), "pw"));
        let login = tokio::spawn({
            let session = Arc::clone(&session);
            async move {
                let http = reqwest::Client::new();
                session.authenticate(&http, Duration::from_secs(2)).await
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        session.configure("http://new-controller", "pw2").await;

        let result = login.await.unwrap();
        assert!(matches!(result, Err(ThermostatError::Protocol(_))));
        assert!(!session.has_session().await);

        let (url, token) = session.target(Endpoint::GetParams).await;
        assert_eq!(url, "http://new-controller/getParams");
        assert_eq!(token, None);

        let http = reqwest::Client::new();
        let request = session.attach(http.get(url)).await.unwrap();
        assert!(request.headers().get(COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_configure_drops_session() {
        let session = SessionManager::new("http://pi", "pw");
        session.set_token(SessionToken::new("token")).await;
        assert!(session.has_session().await);

        session.configure("http://other", "pw2").await;
        assert!(!session.has_session().await);
        assert_eq!(session.base_url().await, "http://other");
        assert_eq!(session.url_for(Endpoint::GetParams).await, "http://other/getParams");
    }

    #[tokio::test]
    async fn test_authenticate_stores_cookie_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .and(body_string_contains(hash_secret("pw")))
            .respond_with(
                ResponseTemplate::new(200).insert_header("set-cookie", "authToken=tok-1; Path=/"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let session = SessionManager::new(server.uri(), "pw");
        let http = reqwest::Client::new();
        assert_ok!(session.authenticate(&http, Duration::from_secs(2)).await);
        assert_eq!(session.token().await, Some(SessionToken::new("tok-1")));
    }

    #[tokio::test]
    async fn test_authenticate_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let session = SessionManager::new(server.uri(), "wrong");
        let http = reqwest::Client::new();
        let result = session.authenticate(&http, Duration::from_secs(2)).await;
        assert!(matches!(
            result,
            Err(ThermostatError::AuthenticationFailed { status: 403 })
        ));
        assert!(!session.has_session().await);
    }

    #[tokio::test]
    async fn test_authenticate_without_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let session = SessionManager::new(server.uri(), "pw");
        let http = reqwest::Client::new();
        let result = session.authenticate(&http, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(ThermostatError::Protocol(_))));
    }
}
