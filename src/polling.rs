use std::sync::{
    atomic::{AtomicBool, AtomicU8, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    client::ThermostatClient,
    error::Result,
    types::{PollUpdate, PollingConfig, ThermostatState},
};

/// Anything the polling loop can fetch state from
#[async_trait]
pub trait StateSource: Send + Sync + 'static {
    /// Fetch the current thermostat state
    async fn fetch_state(&self) -> Result<ThermostatState>;
}

#[async_trait]
impl StateSource for ThermostatClient {
    async fn fetch_state(&self) -> Result<ThermostatState> {
        self.get_state().await
    }
}

/// Consumer of polling results
#[async_trait]
pub trait StateObserver: Send + Sync + 'static {
    /// Receive the outcome of one iteration
    async fn publish(&self, update: PollUpdate);
}

#[async_trait]
impl StateObserver for mpsc::UnboundedSender<PollUpdate> {
    async fn publish(&self, update: PollUpdate) {
        if self.send(update).is_err() {
            debug!("Poll update receiver dropped");
        }
    }
}

#[async_trait]
impl StateObserver for watch::Sender<PollUpdate> {
    async fn publish(&self, update: PollUpdate) {
        self.send_replace(update);
    }
}

/// Lifecycle of a polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PollingState {
    /// Iterations continue
    Running = 0,
    /// No further iteration starts until resumed
    Paused = 1,
    /// Terminal; the loop never runs again
    Stopped = 2,
}

impl From<u8> for PollingState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Paused,
            _ => Self::Stopped,
        }
    }
}

struct Shared {
    state: AtomicU8,
    active: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
    source: Arc<dyn StateSource>,
    observer: Arc<dyn StateObserver>,
    config: PollingConfig,
}

impl Shared {
    fn state(&self) -> PollingState {
        PollingState::from(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: PollingState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// Background task keeping a consumer's view of the thermostat fresh
///
/// At most one loop task is alive per `PollingLoop`. Pausing and stopping are
/// cooperative: an in-flight request finishes, and the state is checked
/// before every iteration.
///
/// # Examples
///
/// ```no_run
/// use thermoremote::{ClientConfig, PollUpdate, PollingLoop, ThermostatClient};
/// use tokio::sync::mpsc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = ThermostatClient::new(ClientConfig::new("pi.local:5000", "secret")?)?;
///     let (tx, mut rx) = mpsc::unbounded_channel();
///
///     let config = client.polling_config().clone();
///     let poller = PollingLoop::start(client, tx, config);
///     while let Some(update) = rx.recv().await {
///         match update {
///             PollUpdate::State(state) => println!("{:.1}°C", state.temperature),
///             PollUpdate::NoConnection => println!("No Connection"),
///         }
///     }
///     poller.stop();
///     Ok(())
/// }
/// ```
pub struct PollingLoop {
    shared: Arc<Shared>,
}

impl PollingLoop {
    /// Spawn a running loop publishing results of `source` to `observer`
    #[must_use]
    pub fn start<S, O>(source: S, observer: O, config: PollingConfig) -> Self
    where
        S: StateSource,
        O: StateObserver,
    {
        Self::start_shared(Arc::new(source), Arc::new(observer), config)
    }

    /// Spawn a running loop from already shared source and observer
    #[must_use]
    pub fn start_shared(
        source: Arc<dyn StateSource>,
        observer: Arc<dyn StateObserver>,
        config: PollingConfig,
    ) -> Self {
        info!(
            "Starting polling (success every {}ms, no data every {}ms)",
            config.success_interval_ms, config.no_data_interval_ms
        );
        let shared = Arc::new(Shared {
            state: AtomicU8::new(PollingState::Running as u8),
            active: AtomicBool::new(true),
            task: Mutex::new(None),
            source,
            observer,
            config,
        });
        spawn_loop(&shared);
        Self { shared }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> PollingState {
        self.shared.state()
    }

    /// Whether a loop task is currently alive
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Stop starting new iterations until [`PollingLoop::resume`]
    pub fn pause(&self) {
        let previous = self.shared.state.compare_exchange(
            PollingState::Running as u8,
            PollingState::Paused as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        if previous.is_ok() {
            info!("Polling paused");
        }
    }

    /// Continue polling, spawning a task only if none is alive
    ///
    /// Has no effect once the loop is stopped.
    pub fn resume(&self) {
        let previous = self.shared.state.compare_exchange(
            PollingState::Paused as u8,
            PollingState::Running as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        match previous.map(PollingState::from).map_err(PollingState::from) {
            Ok(_) => info!("Polling resumed"),
            Err(PollingState::Stopped) => {
                warn!("Ignoring resume of a stopped polling loop");
                return;
            }
            Err(_) => {}
        }

        if self
            .shared
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            spawn_loop(&self.shared);
        }
    }

    /// Stop for good; the loop exits after its current iteration
    pub fn stop(&self) {
        if self.shared.state() != PollingState::Stopped {
            self.shared.set_state(PollingState::Stopped);
            info!("Polling stopped");
        }
    }

    /// Wait for the most recently spawned loop task to finish
    ///
    /// Call after [`PollingLoop::stop`] or [`PollingLoop::pause`]; waiting on a
    /// running loop does not return.
    pub async fn join(&self) {
        let handle = self
            .shared
            .task
            .lock()
            .ok()
            .and_then(|mut task| task.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Polling task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for PollingLoop {
    fn drop(&mut self) {
        self.shared.set_state(PollingState::Stopped);
    }
}

/// Spawn the loop task; the caller must have set `active`
fn spawn_loop(shared: &Arc<Shared>) {
    let handle = tokio::spawn(run(shared.clone()));
    if let Ok(mut task) = shared.task.lock() {
        *task = Some(handle);
    }
}

async fn run(shared: Arc<Shared>) {
    debug!("Polling task started");

    loop {
        if shared.state() != PollingState::Running {
            shared.active.store(false, Ordering::SeqCst);
            // A resume may have landed between the check and the store above.
            if shared.state() == PollingState::Running
                && shared
                    .active
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            {
                continue;
            }
            break;
        }

        let delay = match shared.source.fetch_state().await {
            Ok(state) => {
                shared.observer.publish(PollUpdate::State(state)).await;
                shared.config.success_interval()
            }
            Err(e) => {
                debug!("Poll produced no data: {}", e);
                shared.observer.publish(PollUpdate::NoConnection).await;
                shared.config.no_data_interval()
            }
        };

        tokio::time::sleep(delay).await;
    }

    debug!("Polling task exited");
}
