use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{
    error::{Result, ThermostatError},
    notify::Notifier,
    protocol::Endpoint,
    session::{apply_token, SessionManager},
};

/// A request that can be issued more than once
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// Target endpoint
    pub endpoint: Endpoint,
    /// Query pairs, already stripped of absent values
    pub query: Vec<(&'static str, String)>,
    /// Optional JSON body
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Request without query or body
    #[must_use]
    pub const fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            query: Vec::new(),
            body: None,
        }
    }

    /// Attach query pairs
    #[must_use]
    pub fn with_query(mut self, query: Vec<(&'static str, String)>) -> Self {
        self.query = query;
        self
    }

    /// Attach a JSON body
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Raw successful response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: Bytes,
}

/// Outcome of a single attempt, before renewal is considered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classification {
    Success,
    Unauthorized,
    Failure(u16),
}

impl Classification {
    const fn of(status: u16) -> Self {
        match status {
            200..=299 => Self::Success,
            401 => Self::Unauthorized,
            other => Self::Failure(other),
        }
    }
}

/// Issues requests with a hard deadline and one-shot session renewal
///
/// Every failed call is reported to the [`Notifier`] exactly once before the
/// typed error is returned.
#[derive(Debug)]
pub struct RequestExecutor {
    http: reqwest::Client,
    session: Arc<SessionManager>,
    notifier: Notifier,
    request_timeout: Duration,
    auth_timeout: Duration,
}

impl RequestExecutor {
    /// Create an executor sharing `session` and `notifier`
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        session: Arc<SessionManager>,
        notifier: Notifier,
        request_timeout: Duration,
        auth_timeout: Duration,
    ) -> Self {
        Self {
            http,
            session,
            notifier,
            request_timeout,
            auth_timeout,
        }
    }

    /// Shared session manager
    #[must_use]
    pub const fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Shared notifier
    #[must_use]
    pub const fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Underlying HTTP client
    #[must_use]
    pub const fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Deadline applied to each attempt
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Execute a request
    ///
    /// A 401 triggers exactly one session renewal followed by exactly one
    /// retry; a second 401 is final.
    ///
    /// # Errors
    ///
    /// Returns [`ThermostatError::Timeout`], [`ThermostatError::Unauthorized`],
    /// [`ThermostatError::ServerError`] or
    /// [`ThermostatError::NetworkUnreachable`]. The failure has already been
    /// published to the notifier when this returns.
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let outcome = self.execute_with_renewal(request).await;
        if let Err(e) = &outcome {
            warn!("{} {} failed: {}", request.endpoint.method(), request.endpoint.path(), e);
            self.notifier.notify(e.notification());
        }
        outcome
    }

    async fn execute_with_renewal(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let response = self.send_once(request).await?;
        match Classification::of(response.status) {
            Classification::Success => Ok(response),
            Classification::Failure(status) => Err(ThermostatError::ServerError { status }),
            Classification::Unauthorized => {
                info!("Session rejected for {}, renewing", request.endpoint.path());
                if let Err(e) = self.session.authenticate(&self.http, self.auth_timeout).await {
                    warn!("Session renewal failed: {}", e);
                    return Err(ThermostatError::Unauthorized);
                }

                let retry = self.send_once(request).await?;
                match Classification::of(retry.status) {
                    Classification::Success => Ok(retry),
                    Classification::Unauthorized => Err(ThermostatError::Unauthorized),
                    Classification::Failure(status) => Err(ThermostatError::ServerError { status }),
                }
            }
        }
    }

    /// One attempt raced against the request deadline
    async fn send_once(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let (url, token) = self.session.target(request.endpoint).await;
        debug!("{} {}", request.endpoint.method(), url);

        let mut builder = self.http.request(request.endpoint.method(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let mut outgoing = builder.build()?;
        apply_token(&mut outgoing, token.as_ref())?;

        let attempt = async {
            let response = self.http.execute(outgoing).await?;
            let status = response.status().as_u16();
            let body = response.bytes().await?;
            Ok::<_, ThermostatError>(ApiResponse { status, body })
        };

        let timeout_ms = u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX);
        timeout(self.request_timeout, attempt)
            .await
            .map_err(|_| ThermostatError::Timeout { timeout_ms })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Notification;
    use std::time::Instant;
    use tokio::sync::broadcast::error::TryRecvError;
    use wiremock::{
        matchers::{header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn executor(base_url: &str, request_timeout: Duration) -> RequestExecutor {
        RequestExecutor::new(
            reqwest::Client::new(),
            Arc::new(SessionManager::new(base_url, "pw")),
            Notifier::new(),
            request_timeout,
            Duration::from_secs(2),
        )
    }

    async fn mount_auth(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(
                ResponseTemplate::new(200).insert_header("set-cookie", "authToken=fresh; Path=/"),
            )
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[test]
    fn test_classification() {
        assert_eq!(Classification::of(200), Classification::Success);
        assert_eq!(Classification::of(204), Classification::Success);
        assert_eq!(Classification::of(401), Classification::Unauthorized);
        assert_eq!(Classification::of(404), Classification::Failure(404));
        assert_eq!(Classification::of(500), Classification::Failure(500));
    }

    #[tokio::test]
    async fn test_success_passes_body_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/temperature/get"))
            .and(query_param("startDate", "24h"))
            .respond_with(ResponseTemplate::new(200).set_body_string("payload"))
            .expect(1)
            .mount(&server)
            .await;

        let executor = executor(&server.uri(), Duration::from_secs(2));
        let mut notifications = executor.notifier().subscribe();
        let request = ApiRequest::new(Endpoint::TemperatureSeries)
            .with_query(vec![("startDate", "24h".to_string())]);

        let response = executor.execute(&request).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], b"payload");
        assert_eq!(notifications.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_single_401_renews_and_retries_once() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/getParams"))
            .and(header("cookie", "authToken=fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/getParams"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let executor = executor(&server.uri(), Duration::from_secs(2));
        let response = executor
            .execute(&ApiRequest::new(Endpoint::GetParams))
            .await
            .unwrap();
        assert_eq!(&response.body[..], b"ok");
        assert!(executor.session().has_session().await);
    }

    #[tokio::test]
    async fn test_second_401_is_terminal() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/shutdown"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let executor = executor(&server.uri(), Duration::from_secs(2));
        let mut notifications = executor.notifier().subscribe();

        let result = executor.execute(&ApiRequest::new(Endpoint::Shutdown)).await;
        assert!(matches!(result, Err(ThermostatError::Unauthorized)));
        assert_eq!(notifications.try_recv(), Ok(Notification::Unauthorized));
        assert_eq!(notifications.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_failed_renewal_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/getParams"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let executor = executor(&server.uri(), Duration::from_secs(2));
        let result = executor.execute(&ApiRequest::new(Endpoint::GetParams)).await;
        assert!(matches!(result, Err(ThermostatError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_server_error_reported_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/getParams"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let executor = executor(&server.uri(), Duration::from_secs(2));
        let mut notifications = executor.notifier().subscribe();

        let result = executor.execute(&ApiRequest::new(Endpoint::GetParams)).await;
        assert!(matches!(result, Err(ThermostatError::ServerError { status: 404 })));
        assert_eq!(notifications.try_recv(), Ok(Notification::NotFound));
        assert_eq!(notifications.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_timeout_is_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/getParams"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let executor = executor(&server.uri(), Duration::from_millis(200));
        let mut notifications = executor.notifier().subscribe();

        let started = Instant::now();
        let result = executor.execute(&ApiRequest::new(Endpoint::GetParams)).await;
        let elapsed = started.elapsed();

        assert!(matches!(result, Err(ThermostatError::Timeout { timeout_ms: 200 })));
        assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
        assert_eq!(notifications.try_recv(), Ok(Notification::Timeout));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let executor = executor(&format!("http://{address}"), Duration::from_secs(2));
        let mut notifications = executor.notifier().subscribe();

        let result = executor.execute(&ApiRequest::new(Endpoint::GetParams)).await;
        assert!(matches!(result, Err(ThermostatError::NetworkUnreachable(_))));
        assert_eq!(notifications.try_recv(), Ok(Notification::NetworkUnreachable));
        assert_eq!(notifications.try_recv(), Err(TryRecvError::Empty));
    }
}
