use thermoremote::{
    ClientConfig, DateRange, EnvStore, PollUpdate, PollingLoop, PowerState, Result,
    ThermostatClient,
};
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Thermoremote Monitor Example");
    info!("Reading THERMOSTAT_URL / THERMOSTAT_PASSWORD from the environment");

    let config = ClientConfig::from_store(&EnvStore)?;
    info!("Controller: {}", config.base_url);
    let client = ThermostatClient::new(config)?;

    // Surface failures the way a UI would show a toast
    client
        .notifier()
        .on_notification(|notification| error!("⚠️  {}", notification));

    if let Err(e) = client.authenticate().await {
        error!("Initial login failed, continuing anonymously: {}", e);
    }

    let report = client.statistics(&DateRange::last_day()).await;
    if let Ok(Some(average)) = report.temperature_average {
        println!("📈 24h average temperature: {average:.2}°C");
    }
    if let Ok(Some(seconds)) = report.average_on_time {
        let seconds = seconds.max(0.0) as u64;
        println!(
            "🔥 24h average heating period: {}h {}m",
            seconds / 3600,
            (seconds / 60) % 60
        );
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let poller = PollingLoop::start(client.clone(), tx, client.polling_config().clone());
    info!("Press Ctrl+C to stop monitoring");

    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Some(PollUpdate::State(state)) => {
                    let marker = match state.power {
                        PowerState::On => "🟢",
                        PowerState::Off => "🔴",
                    };
                    println!(
                        "{marker} {:5.1}°C  band {:.1} - {:.1}",
                        state.temperature, state.min_temp, state.max_temp
                    );
                }
                Some(PollUpdate::NoConnection) => println!("⚪ No Connection"),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping...");
                break;
            }
        }
    }

    poller.stop();
    poller.join().await;
    info!("Monitoring finished");
    Ok(())
}
