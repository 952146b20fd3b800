use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::device::{DeviceAddress, SensorClient};
use crate::fimp::{FimpAddress, FimpMessage, Publisher};
use crate::poll::{PollCoordinator, PollSettings, Scheduler};
use crate::report::{Command, Reporter};

/// Entry points the host process drives: start the sweep, feed it inbound
/// bus messages.
pub struct Bridge {
    coordinator: Arc<PollCoordinator>,
    reporter: Arc<Reporter>,
}

impl Bridge {
    pub fn new(
        client: Arc<dyn SensorClient>,
        publisher: Arc<dyn Publisher>,
        bridge_name: &str,
        devices: Vec<DeviceAddress>,
        settings: PollSettings,
    ) -> Bridge {
        let reporter = Arc::new(Reporter::new(publisher, bridge_name, settings.interval));
        let coordinator = Arc::new(PollCoordinator::new(
            client,
            reporter.clone(),
            devices,
            settings,
        ));

        Bridge {
            coordinator,
            reporter,
        }
    }

    pub fn start(&self) -> Scheduler {
        self.coordinator.start()
    }

    /// Routes one inbound message. Malformed or unknown commands are logged
    /// and dropped; nothing is ever sent back for them.
    pub async fn handle_inbound(&self, addr: &FimpAddress, msg: &FimpMessage) {
        let command = match Command::decode(addr, msg) {
            Ok(command) => command,
            Err(e) => {
                warn!("dropping {} on {}: {}", msg.msg_type, addr, e);
                return;
            }
        };

        match command {
            Command::GetInclusionReport(device) => {
                if self.coordinator.is_known(&device) {
                    self.reporter.send_inclusion_report(&device).await;
                } else {
                    info!(address = %device, "inclusion report requested for unknown device");
                }
            }
            Command::GetAllNodes => {
                self.reporter
                    .send_device_list(self.coordinator.devices())
                    .await;
            }
            Command::PollDevice(device) => {
                let outcome = self.coordinator.request_sensor_data(&device).await;
                debug!(address = %device, "on-demand poll finished: {:?}", outcome);
            }
            Command::Unrecognized => {
                debug!("ignoring {} on {}", msg.msg_type, addr);
            }
        }
    }
}

/// Spawned inbound handlers, kept so shutdown can wait for them.
pub struct InboundTasks {
    bridge: Arc<Bridge>,
    tasks: JoinSet<()>,
}

impl InboundTasks {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        InboundTasks {
            bridge,
            tasks: JoinSet::new(),
        }
    }

    pub fn dispatch(&mut self, addr: FimpAddress, msg: FimpMessage) {
        while let Some(result) = self.tasks.try_join_next() {
            log_join_error(result);
        }

        let bridge = self.bridge.clone();
        self.tasks.spawn(async move {
            bridge.handle_inbound(&addr, &msg).await;
        });
    }

    pub async fn drain(mut self) {
        if !self.tasks.is_empty() {
            info!("waiting for {} inbound handlers", self.tasks.len());
        }
        while let Some(result) = self.tasks.join_next().await {
            log_join_error(result);
        }
    }
}

fn log_join_error(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!("inbound handler ended abnormally: {:?}", e);
    }
}
