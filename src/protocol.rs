use reqwest::{header::HeaderMap, Method};
use serde::{de::DeserializeOwned, Deserialize};

use crate::{
    error::{Result, ThermostatError},
    types::ResponseEnvelope,
};

/// Name of the cookie carrying the session token
pub const AUTH_COOKIE: &str = "authToken";

/// Multipart field carrying the hashed password on login
pub const PASSWORD_FIELD: &str = "password";

/// Controller endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Login exchange
    Auth,
    /// Current thermostat state
    GetParams,
    /// Update the thermostat band
    SetParams,
    /// Power the controller down
    Shutdown,
    /// Temperature history
    TemperatureSeries,
    /// Mean temperature over a range
    TemperatureAverage,
    /// Heating on/off periods
    StateSeries,
    /// Mean on-period length over a range
    StateAverage,
}

impl Endpoint {
    /// Path appended to the base URL
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Auth => "/auth",
            Self::GetParams => "/getParams",
            Self::SetParams => "/setParams",
            Self::Shutdown => "/shutdown",
            Self::TemperatureSeries => "/temperature/get",
            Self::TemperatureAverage => "/temperature/getAverage",
            Self::StateSeries => "/state/get",
            Self::StateAverage => "/state/getAverage",
        }
    }

    /// HTTP method used for the endpoint
    #[must_use]
    pub fn method(self) -> Method {
        match self {
            Self::Auth | Self::SetParams => Method::POST,
            _ => Method::GET,
        }
    }
}

/// Join a base URL and an endpoint path
#[must_use]
pub fn endpoint_url(base_url: &str, endpoint: Endpoint) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), endpoint.path())
}

/// Decode a `{status, data}` envelope and return its payload
///
/// # Errors
///
/// Returns [`ThermostatError::Decode`] for malformed JSON and
/// [`ThermostatError::ServerError`] when the envelope itself reports a
/// non-success status.
pub fn decode_envelope<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let envelope: ResponseEnvelope<T> = serde_json::from_slice(body)?;
    if (200..300).contains(&envelope.status) {
        Ok(envelope.data)
    } else {
        Err(ThermostatError::ServerError {
            status: u16::try_from(envelope.status).unwrap_or(500),
        })
    }
}

#[derive(Deserialize)]
struct TokenPayload {
    token: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LoginBody {
    Envelope { data: TokenPayload },
    Bare(TokenPayload),
}

/// Find the session token in a login response
///
/// The `authToken` cookie wins; a JSON body carrying `token` (bare or inside
/// an envelope) is accepted when no cookie was set.
#[must_use]
pub fn extract_token(headers: &HeaderMap, body: &[u8]) -> Option<String> {
    token_from_cookies(headers).or_else(|| token_from_body(body))
}

fn token_from_cookies(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|cookie| cookie.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, value)| name.trim() == AUTH_COOKIE && !value.trim().is_empty())
        .map(|(_, value)| value.trim().to_string())
}

fn token_from_body(body: &[u8]) -> Option<String> {
    let token = match serde_json::from_slice::<LoginBody>(body).ok()? {
        LoginBody::Envelope { data } | LoginBody::Bare(data) => data.token,
    };
    (!token.is_empty()).then_some(token)
}
