use crate::{
    config::{normalize_base_url, ClientConfig, SettingsStore},
    error::{Result, ThermostatError},
    executor::{ApiRequest, ApiResponse, RequestExecutor},
    notify::{Notification, Notifier},
    protocol::{decode_envelope, Endpoint},
    session::SessionManager,
    types::{
        AverageState, AverageTemp, DateRange, ParameterUpdate, PollingConfig, StateFilter,
        StatePoint, TemperaturePoint, ThermostatState, TimeoutConfig,
    },
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Main interface for controlling a remote thermostat controller
///
/// `ThermostatClient` is cheap to clone; clones share one HTTP connection
/// pool, one session and one notifier, so user-triggered calls may run as
/// independent tasks alongside a [`crate::PollingLoop`].
///
/// Every failed call is published once to the notifier (see
/// [`ThermostatClient::subscribe`]) and also returned as a typed error.
///
/// # Examples
///
/// ```no_run
/// use thermoremote::{ClientConfig, ParameterUpdate, ThermostatClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ClientConfig::new("192.168.1.20:5000", "secret")?;
///     let client = ThermostatClient::new(config)?;
///
///     let state = client.get_state().await?;
///     println!("{:.1}°C, heating {}", state.temperature, state.power);
///
///     client
///         .set_parameters(ParameterUpdate::default().with_min(19.0))
///         .await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ThermostatClient {
    executor: Arc<RequestExecutor>,
    timeouts: TimeoutConfig,
    polling: PollingConfig,
}

/// Results of one statistics refresh
///
/// Each query succeeds or fails on its own.
#[derive(Debug)]
pub struct StatisticsReport {
    /// Temperature samples
    pub temperatures: Result<Vec<TemperaturePoint>>,
    /// Mean temperature
    pub temperature_average: Result<Option<f32>>,
    /// Heating-on periods
    pub on_periods: Result<Vec<StatePoint>>,
    /// Mean heating-on period in seconds
    pub average_on_time: Result<Option<f32>>,
}

impl ThermostatClient {
    /// Build a client from explicit settings
    ///
    /// # Errors
    ///
    /// Returns [`ThermostatError::InvalidConfig`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ThermostatError::InvalidConfig(e.to_string()))?;
        Ok(Self::with_http_client(http, config))
    }

    /// Build a client from a settings store
    ///
    /// # Errors
    ///
    /// Returns [`ThermostatError::InvalidConfig`] if the stored settings are
    /// unusable.
    pub fn from_store(store: &dyn SettingsStore) -> Result<Self> {
        Self::new(ClientConfig::from_store(store)?)
    }

    /// Build a client on top of an existing `reqwest` client
    #[must_use]
    pub fn with_http_client(http: reqwest::Client, config: ClientConfig) -> Self {
        let ClientConfig {
            base_url,
            password,
            timeouts,
            polling,
        } = config;

        let session = Arc::new(SessionManager::new(base_url, &password));
        let executor = RequestExecutor::new(
            http,
            session,
            Notifier::new(),
            timeouts.request_timeout(),
            timeouts.auth_timeout(),
        );

        Self {
            executor: Arc::new(executor),
            timeouts,
            polling,
        }
    }

    /// Shared session manager
    #[must_use]
    pub fn session(&self) -> &Arc<SessionManager> {
        self.executor.session()
    }

    /// Shared notifier
    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        self.executor.notifier()
    }

    /// Receive a [`Notification`] for every failed call from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier().subscribe()
    }

    /// Timeouts the client was built with
    #[must_use]
    pub const fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    /// Polling cadence the client was built with
    #[must_use]
    pub const fn polling_config(&self) -> &PollingConfig {
        &self.polling
    }

    /// Point the client at a different controller or password
    ///
    /// The current session is dropped; the next request logs in again.
    ///
    /// # Errors
    ///
    /// Returns [`ThermostatError::InvalidConfig`] if the URL is blank.
    pub async fn reconfigure(&self, base_url: &str, password: &str) -> Result<()> {
        let base_url = normalize_base_url(base_url)?;
        self.session().configure(base_url, password).await;
        Ok(())
    }

    /// Log in explicitly instead of waiting for the first 401
    ///
    /// # Errors
    ///
    /// Returns the login failure; it is also reported to the notifier.
    pub async fn authenticate(&self) -> Result<()> {
        let result = self
            .session()
            .authenticate(self.executor.http(), self.timeouts.auth_timeout())
            .await;
        if let Err(e) = &result {
            self.notifier().notify(e.notification());
        }
        result
    }

    /// Fetch the current thermostat state
    ///
    /// # Errors
    ///
    /// Returns the request or decode failure; it is also reported to the
    /// notifier.
    pub async fn get_state(&self) -> Result<ThermostatState> {
        let state: ThermostatState = self.fetch(ApiRequest::new(Endpoint::GetParams)).await?;
        debug!(
            "State: {:.1} ({:.1}-{:.1}) {}",
            state.temperature, state.min_temp, state.max_temp, state.power
        );
        Ok(state)
    }

    /// Change the hysteresis band, sending only the bounds that are set
    ///
    /// # Errors
    ///
    /// Returns [`ThermostatError::InvalidParameters`] without contacting the
    /// controller when the update is empty, not finite, or has `min > max`.
    /// Request failures are returned and reported to the notifier.
    pub async fn set_parameters(&self, update: ParameterUpdate) -> Result<()> {
        validate_update(&update)?;
        info!(
            "Setting parameters: min={:?} max={:?}",
            update.min_temp, update.max_temp
        );

        let body = serde_json::to_value(update)?;
        self.executor
            .execute(&ApiRequest::new(Endpoint::SetParams).with_body(body))
            .await?;
        Ok(())
    }

    /// Ask the controller to power down
    ///
    /// # Errors
    ///
    /// Returns the request failure; it is also reported to the notifier.
    pub async fn shutdown(&self) -> Result<()> {
        warn!("Requesting controller shutdown");
        self.executor
            .execute(&ApiRequest::new(Endpoint::Shutdown))
            .await?;
        Ok(())
    }

    /// Temperature history, in the order the controller returns it
    ///
    /// # Errors
    ///
    /// Returns the request or decode failure; it is also reported to the
    /// notifier.
    pub async fn temperature_series(&self, range: &DateRange) -> Result<Vec<TemperaturePoint>> {
        self.fetch(ApiRequest::new(Endpoint::TemperatureSeries).with_query(range.query_pairs()))
            .await
    }

    /// Mean temperature over the range, `None` when there is no data
    ///
    /// # Errors
    ///
    /// Returns the request or decode failure; it is also reported to the
    /// notifier.
    pub async fn temperature_average(&self, range: &DateRange) -> Result<Option<f32>> {
        let rows: Vec<AverageTemp> = self
            .fetch(ApiRequest::new(Endpoint::TemperatureAverage).with_query(range.query_pairs()))
            .await?;
        Ok(rows.first().map(|row| row.average_temp))
    }

    /// Heating periods matching `filter`, in the order the controller returns them
    ///
    /// # Errors
    ///
    /// Returns the request or decode failure; it is also reported to the
    /// notifier.
    pub async fn state_series(
        &self,
        range: &DateRange,
        filter: StateFilter,
    ) -> Result<Vec<StatePoint>> {
        let mut query = range.query_pairs();
        query.push(("state", filter.to_string()));
        self.fetch(ApiRequest::new(Endpoint::StateSeries).with_query(query))
            .await
    }

    /// Mean heating-on period in seconds, `None` when there is no data
    ///
    /// # Errors
    ///
    /// Returns the request or decode failure; it is also reported to the
    /// notifier.
    pub async fn state_average(&self, range: &DateRange) -> Result<Option<f32>> {
        let rows: Vec<AverageState> = self
            .fetch(ApiRequest::new(Endpoint::StateAverage).with_query(range.query_pairs()))
            .await?;
        Ok(rows.first().map(|row| row.average_on_time))
    }

    /// Run all four statistics queries concurrently
    pub async fn statistics(&self, range: &DateRange) -> StatisticsReport {
        let (temperatures, temperature_average, on_periods, average_on_time) = futures::join!(
            self.temperature_series(range),
            self.temperature_average(range),
            self.state_series(range, StateFilter::On),
            self.state_average(range),
        );

        StatisticsReport {
            temperatures,
            temperature_average,
            on_periods,
            average_on_time,
        }
    }

    /// Execute and decode an enveloped response
    async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let response = self.executor.execute(&request).await?;
        self.decode(request.endpoint, &response)
    }

    fn decode<T: DeserializeOwned>(&self, endpoint: Endpoint, response: &ApiResponse) -> Result<T> {
        decode_envelope(&response.body).map_err(|e| {
            warn!("Could not decode {} response: {}", endpoint.path(), e);
            self.notifier().notify(e.notification());
            e
        })
    }
}

fn validate_update(update: &ParameterUpdate) -> Result<()> {
    if update.is_empty() {
        return Err(ThermostatError::InvalidParameters(
            "no bound to change".to_string(),
        ));
    }

    for value in [update.min_temp, update.max_temp].into_iter().flatten() {
        if !value.is_finite() {
            return Err(ThermostatError::InvalidParameters(format!(
                "temperature {value} is not a finite number"
            )));
        }
    }

    if let (Some(min), Some(max)) = (update.min_temp, update.max_temp) {
        if min > max {
            return Err(ThermostatError::InvalidParameters(format!(
                "minimum {min:.1} is above maximum {max:.1}"
            )));
        }
    }

    Ok(())
}
