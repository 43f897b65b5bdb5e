#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # Thermoremote
//!
//! A Rust client library for remotely controlling a headless thermostat
//! controller over HTTP.
//!
//! The controller exposes a small JSON API guarded by a pre-shared password.
//! This crate owns everything between a user interface and that API:
//!
//! - **Authentication**: the password is hashed (SHA-256, lowercase hex) as
//!   soon as it is configured, exchanged for a session cookie on `/auth`, and
//!   the cookie is replayed on every request
//! - **Renewal**: a 401 triggers exactly one login and one retry; a second
//!   401 is final
//! - **Deadlines**: every request is raced against a fixed timeout and never
//!   blocks past it
//! - **Polling**: a pausable background loop publishes fresh state every
//!   second, backing off to five seconds while the controller is unreachable
//! - **Notifications**: every failed call is published once to any number of
//!   subscribers, in addition to the typed error the caller receives
//!
//! ## Quick Start
//!
//! ```no_run
//! use thermoremote::{MemoryStore, ParameterUpdate, PollUpdate, PollingLoop, ThermostatClient};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = MemoryStore::with_settings("192.168.1.20:5000", "secret");
//!     let client = ThermostatClient::from_store(&settings)?;
//!
//!     // Report failures to the user
//!     client.notifier().on_notification(|n| eprintln!("{n}"));
//!
//!     // Keep a view of the thermostat fresh in the background
//!     let (tx, mut rx) = mpsc::unbounded_channel();
//!     let poller = PollingLoop::start(client.clone(), tx, client.polling_config().clone());
//!
//!     // User actions run independently of the loop
//!     client.set_parameters(ParameterUpdate::default().with_max(23.5)).await?;
//!
//!     if let Some(PollUpdate::State(state)) = rx.recv().await {
//!         println!("{:.1}°C", state.temperature);
//!     }
//!
//!     poller.stop();
//!     Ok(())
//! }
//! ```

/// Main typed client interface
pub mod client;
/// Settings stores and client configuration
pub mod config;
/// Password hashing and controller credentials
pub mod credentials;
/// Error types and handling
pub mod error;
/// Deadline-bounded request execution with session renewal
pub mod executor;
/// Failure notifications for user-facing subscribers
pub mod notify;
/// Cancellable background state polling
pub mod polling;
/// Endpoint table and wire decoding
pub mod protocol;
/// Session token ownership and the login exchange
pub mod session;
/// Type definitions and data structures
pub mod types;

// Re-export the main types for convenient usage
pub use client::{StatisticsReport, ThermostatClient};
pub use config::{ClientConfig, EnvStore, MemoryStore, SettingsStore};
pub use credentials::{hash_secret, Credentials};
pub use error::{Result, ThermostatError};
pub use executor::{ApiRequest, ApiResponse, RequestExecutor};
pub use notify::{Notification, Notifier};
pub use polling::{PollingLoop, PollingState, StateObserver, StateSource};
pub use session::{SessionManager, SessionToken};
pub use types::{
    AverageState, AverageTemp, DateRange, ParameterUpdate, PollUpdate, PollingConfig, PowerState,
    ResponseEnvelope, StateFilter, StatePoint, TemperaturePoint, ThermostatState, TimeoutConfig,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Controller URL used when none has been configured
pub const DEFAULT_BASE_URL: &str = "http://localhost";
