mod bridge;
mod config;
mod device;
mod fimp;
mod mqtt;
mod poll;
mod report;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use bridge::{Bridge, InboundTasks};
use config::Config;
use device::SensorClient;
use fimp::{FimpAddress, MsgType, ResourceType};
use mqtt::{MqttClient, MqttPublisher};

#[derive(Parser, Debug)]
#[command(name = "miflora-ad")]
#[command(about = "Flower Care BLE sensor bridge for the FIMP bus", long_about = None)]
struct Args {
    /// Path to the JSON (or YAML) config file
    #[arg(short, long, default_value = "miflora-ad.json")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let json_logging = std::env::var("MIFLORA_LOG_JSON")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let default_level = if verbose { "miflora_ad=debug" } else { "miflora_ad=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .init();
    }
}

#[cfg(feature = "ble")]
async fn sensor_client(config: &Config) -> Arc<dyn SensorClient> {
    match device::miflora::MifloraClient::new(&config.adapter_name, config.read_timeout()).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("cannot open bluetooth adapter {}: {}", config.adapter_name, e);
            Arc::new(device::UnavailableClient)
        }
    }
}

#[cfg(not(feature = "ble"))]
async fn sensor_client(_config: &Config) -> Arc<dyn SensorClient> {
    warn!("built without the `ble` feature, devices cannot be read");
    Arc::new(device::UnavailableClient)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = Config::load_or_default(&args.config).await;
    let devices = config.device_addresses();
    info!("{} devices configured", devices.len());

    let mut mqtt_client = MqttClient::new(&config);
    let prefix = config.mqtt_topic_global_prefix.as_str();
    let commands = FimpAddress::adapter(MsgType::Cmd, &config.bridge_name);
    mqtt_client.subscribe(commands.topic(prefix));
    mqtt_client.subscribe(format!(
        "{}/#",
        FimpAddress {
            resource_type: ResourceType::Device,
            ..commands
        }
        .topic(prefix)
    ));

    let (mut mqtt_handle, mut rx, client) = mqtt_client.run();
    let publisher = Arc::new(MqttPublisher::new(client.clone(), prefix));

    let bridge = Arc::new(Bridge::new(
        sensor_client(&config).await,
        publisher,
        &config.bridge_name,
        devices,
        config.poll_settings(),
    ));
    let scheduler = bridge.start();
    let mut inbound = InboundTasks::new(bridge);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some(msg) = msg else {
                    error!("mqtt event loop stopped");
                    break;
                };

                let (addr, fimp_msg) = match msg.decode() {
                    Ok(decoded) => decoded,
                    Err(e) => {
                        warn!("dropping message on {}: {}", msg.topic, e);
                        continue;
                    }
                };

                // on-demand polls can take a while, keep consuming the bus
                inbound.dispatch(addr, fimp_msg);
            }
            _ = &mut shutdown => {
                info!("shutting down");
                break;
            }
        }
    }

    // keep the event loop unblocked while running polls finish
    tokio::spawn(async move { while rx.recv().await.is_some() {} });

    scheduler.shutdown().await;
    inbound.drain().await;

    if let Err(e) = client.try_disconnect() {
        warn!("cannot disconnect from mqtt broker: {}", e);
    }
    if tokio::time::timeout(Duration::from_secs(5), &mut mqtt_handle)
        .await
        .is_err()
    {
        warn!("mqtt transport did not flush in time");
        mqtt_handle.abort();
    }

    Ok(())
}
