use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::retry::{with_retry, RetryPolicy};
use crate::device::{DeviceAddress, SensorClient};
use crate::report::Reporter;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PollSettings {
    pub interval: Duration,
    pub stagger: Duration,
    pub retry: RetryPolicy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    Reported,
    Discarded,
    Failed,
    Skipped,
}

/// Owns the device list and the in-flight table, and runs the periodic sweep.
///
/// Each device is either idle or has exactly one poll in flight. A request
/// that arrives while one is in flight is dropped, not queued.
pub struct PollCoordinator {
    client: Arc<dyn SensorClient>,
    reporter: Arc<Reporter>,
    devices: Vec<DeviceAddress>,
    in_flight: DashMap<DeviceAddress, bool>,
    settings: PollSettings,
}

/// Clears the in-flight flag for one device when dropped.
struct InFlightGuard<'a> {
    table: &'a DashMap<DeviceAddress, bool>,
    addr: DeviceAddress,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut entry) = self.table.get_mut(&self.addr) {
            *entry = false;
        }
    }
}

impl PollCoordinator {
    pub fn new(
        client: Arc<dyn SensorClient>,
        reporter: Arc<Reporter>,
        devices: Vec<DeviceAddress>,
        settings: PollSettings,
    ) -> Self {
        let in_flight = devices.iter().map(|d| (d.clone(), false)).collect();

        PollCoordinator {
            client,
            reporter,
            devices,
            in_flight,
            settings,
        }
    }

    pub fn devices(&self) -> &[DeviceAddress] {
        &self.devices
    }

    pub fn is_known(&self, addr: &DeviceAddress) -> bool {
        self.devices.contains(addr)
    }

    pub fn is_in_flight(&self, addr: &DeviceAddress) -> bool {
        self.in_flight.get(addr).map(|e| *e).unwrap_or(false)
    }

    fn try_begin(&self, addr: &DeviceAddress) -> Option<InFlightGuard<'_>> {
        // the entry holds the shard lock, so check and set are atomic
        let mut entry = self.in_flight.entry(addr.clone()).or_insert(false);
        if *entry {
            return None;
        }
        *entry = true;
        drop(entry);

        Some(InFlightGuard {
            table: &self.in_flight,
            addr: addr.clone(),
        })
    }

    /// Battery (best effort), then sensors with retries. Failures end here.
    pub async fn request_sensor_data(&self, addr: &DeviceAddress) -> PollOutcome {
        info!(address = %addr, "requesting sensor data");

        let Some(_guard) = self.try_begin(addr) else {
            info!(address = %addr, "another request is already running");
            return PollOutcome::Skipped;
        };

        match self.client.read_battery(addr).await {
            Ok(level) => self.reporter.report_battery(addr, level).await,
            Err(e) => debug!(address = %addr, "battery read failed: {}", e),
        }

        let result = with_retry(self.settings.retry, || self.client.read_sensors(addr)).await;
        let reading = match result {
            Ok(reading) => reading,
            Err(e) => {
                warn!(address = %addr, "failed reading sensors: {}", e);
                return PollOutcome::Failed;
            }
        };

        if !reading.is_plausible() {
            debug!(
                address = %addr,
                "temperature {} outside allowed range, dropping reading", reading.temperature
            );
            return PollOutcome::Discarded;
        }

        info!(address = %addr, "reporting sensors: {:?}", reading);
        self.reporter.report_reading(addr, &reading).await;
        PollOutcome::Reported
    }

    pub fn start(self: &Arc<Self>) -> Scheduler {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let coordinator = Arc::clone(self);

        let handle = tokio::spawn(async move {
            info!(
                "polling {} devices every {:?}",
                coordinator.devices.len(),
                coordinator.settings.interval
            );

            loop {
                for addr in &coordinator.devices {
                    coordinator.request_sensor_data(addr).await;
                    if sleep_or_stop(coordinator.settings.stagger, &mut stop_rx).await {
                        return;
                    }
                }
                if sleep_or_stop(coordinator.settings.interval, &mut stop_rx).await {
                    return;
                }
            }
        });

        Scheduler {
            stop: stop_tx,
            handle,
        }
    }
}

// Returns true once a stop has been requested.
async fn sleep_or_stop(duration: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    if *stop.borrow() {
        return true;
    }

    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        changed = stop.changed() => changed.is_err() || *stop.borrow(),
    }
}

pub struct Scheduler {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Scheduler {
    /// Stops scheduling new polls. A poll already running is allowed to
    /// finish before this returns.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.handle.await {
            error!("poll scheduler ended abnormally: {:?}", e);
        }
        info!("poll scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::client::testing::ScriptedClient;
    use crate::device::SensorReading;
    use crate::fimp::testing::RecordingPublisher;
    use tokio::task::JoinSet;

    fn addr(s: &str) -> DeviceAddress {
        s.parse().unwrap()
    }

    fn reading(temperature: f64) -> SensorReading {
        SensorReading {
            temperature,
            illuminance: 1500,
            moisture: 42,
            conductivity: 380,
        }
    }

    fn settings() -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(600),
            stagger: Duration::from_secs(1),
            retry: RetryPolicy::new(3, Duration::from_millis(10)),
        }
    }

    fn coordinator(
        client: ScriptedClient,
        devices: Vec<DeviceAddress>,
    ) -> (Arc<ScriptedClient>, Arc<RecordingPublisher>, Arc<PollCoordinator>) {
        let client = Arc::new(client);
        let publisher = Arc::new(RecordingPublisher::default());
        let reporter = Arc::new(Reporter::new(publisher.clone(), "ble", Duration::from_secs(600)));
        let coordinator = Arc::new(PollCoordinator::new(
            client.clone(),
            reporter,
            devices,
            settings(),
        ));
        (client, publisher, coordinator)
    }

    #[tokio::test]
    async fn successful_poll_reports_everything() {
        let device = addr("AA:BB:CC:DD:EE:FF");
        let (_, publisher, coordinator) =
            coordinator(ScriptedClient::new(Some(77), Some(reading(21.0))), vec![device.clone()]);

        assert_eq!(coordinator.request_sensor_data(&device).await, PollOutcome::Reported);
        assert_eq!(publisher.of_type("evt.sensor.report").len(), 4);
        assert_eq!(publisher.of_type("evt.lvl.report").len(), 1);
        assert!(!coordinator.is_in_flight(&device));
    }

    #[tokio::test]
    async fn battery_failure_is_tolerated() {
        let device = addr("AA:BB:CC:DD:EE:FF");
        let (_, publisher, coordinator) =
            coordinator(ScriptedClient::new(None, Some(reading(21.0))), vec![device.clone()]);

        assert_eq!(coordinator.request_sensor_data(&device).await, PollOutcome::Reported);
        assert_eq!(publisher.of_type("evt.sensor.report").len(), 4);
        assert!(publisher.of_type("evt.lvl.report").is_empty());
    }

    #[tokio::test]
    async fn implausible_reading_is_discarded_whole() {
        let device = addr("AA:BB:CC:DD:EE:FF");
        for temperature in [-50.0, 100.0, -50.1, 100.1] {
            let client = ScriptedClient::new(Some(50), Some(reading(temperature)));
            let (_, publisher, coordinator) = coordinator(client, vec![device.clone()]);

            assert_eq!(coordinator.request_sensor_data(&device).await, PollOutcome::Discarded);
            assert!(publisher.of_type("evt.sensor.report").is_empty(), "{}", temperature);
            assert_eq!(publisher.of_type("evt.lvl.report").len(), 1);
        }
    }

    #[tokio::test]
    async fn boundary_readings_are_published() {
        let device = addr("AA:BB:CC:DD:EE:FF");
        for temperature in [-49.9, 99.9] {
            let client = ScriptedClient::new(Some(50), Some(reading(temperature)));
            let (_, publisher, coordinator) = coordinator(client, vec![device.clone()]);

            assert_eq!(coordinator.request_sensor_data(&device).await, PollOutcome::Reported);
            assert_eq!(publisher.of_type("evt.sensor.report").len(), 4, "{}", temperature);
        }
    }

    #[tokio::test]
    async fn unreachable_device_fails_after_retries() {
        let device = addr("AA:BB:CC:DD:EE:FF");
        let (client, publisher, coordinator) =
            coordinator(ScriptedClient::new(None, None), vec![device.clone()]);

        assert_eq!(coordinator.request_sensor_data(&device).await, PollOutcome::Failed);
        assert_eq!(client.sensor_reads(&device), 3);
        assert!(publisher.published().is_empty());
        assert!(!coordinator.is_in_flight(&device));
    }

    #[tokio::test]
    async fn concurrent_requests_for_one_device_do_not_overlap() {
        let device = addr("AA:BB:CC:DD:EE:FF");
        let (client, _, coordinator) = coordinator(
            ScriptedClient::new(Some(90), Some(reading(20.0)))
                .with_delay(Duration::from_millis(50)),
            vec![device.clone()],
        );

        let mut tasks = JoinSet::new();
        for _ in 0..10 {
            let coordinator = coordinator.clone();
            let device = device.clone();
            tasks.spawn(async move { coordinator.request_sensor_data(&device).await });
        }

        let mut outcomes = Vec::new();
        while let Some(outcome) = tasks.join_next().await {
            outcomes.push(outcome.unwrap());
        }

        assert_eq!(client.max_concurrent_reads(), 1);
        assert_eq!(outcomes.iter().filter(|o| **o == PollOutcome::Reported).count(), 1);
        assert_eq!(outcomes.iter().filter(|o| **o == PollOutcome::Skipped).count(), 9);
        assert_eq!(client.sensor_reads(&device), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn parallel_requests_for_one_device_do_not_overlap() {
        let device = addr("AA:BB:CC:DD:EE:FF");
        let (client, _, coordinator) = coordinator(
            ScriptedClient::new(Some(90), Some(reading(20.0)))
                .with_delay(Duration::from_millis(5)),
            vec![device.clone()],
        );

        for _ in 0..20 {
            let barrier = Arc::new(tokio::sync::Barrier::new(8));
            let mut tasks = JoinSet::new();
            for _ in 0..8 {
                let coordinator = coordinator.clone();
                let device = device.clone();
                let barrier = barrier.clone();
                tasks.spawn(async move {
                    barrier.wait().await;
                    coordinator.request_sensor_data(&device).await
                });
            }

            let mut reported = 0;
            while let Some(outcome) = tasks.join_next().await {
                match outcome.unwrap() {
                    PollOutcome::Reported => reported += 1,
                    PollOutcome::Skipped => {}
                    other => panic!("unexpected outcome {:?}", other),
                }
            }
            assert!(reported >= 1);
            assert!(!coordinator.is_in_flight(&device));
        }

        assert_eq!(client.max_concurrent_reads(), 1);
    }

    #[tokio::test]
    async fn skipped_request_keeps_first_poll_in_flight() {
        let device = addr("AA:BB:CC:DD:EE:FF");
        let (_, _, coordinator) = coordinator(
            ScriptedClient::new(Some(90), Some(reading(20.0)))
                .with_delay(Duration::from_millis(100)),
            vec![device.clone()],
        );

        let first = tokio::spawn({
            let coordinator = coordinator.clone();
            let device = device.clone();
            async move { coordinator.request_sensor_data(&device).await }
        });
        while !coordinator.is_in_flight(&device) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert_eq!(coordinator.request_sensor_data(&device).await, PollOutcome::Skipped);
        assert!(coordinator.is_in_flight(&device));

        assert_eq!(first.await.unwrap(), PollOutcome::Reported);
        assert!(!coordinator.is_in_flight(&device));
    }

    #[tokio::test]
    async fn different_devices_poll_independently() {
        let a = addr("AA:BB:CC:DD:EE:01");
        let b = addr("AA:BB:CC:DD:EE:02");
        let (client, _, coordinator) = coordinator(
            ScriptedClient::new(Some(90), Some(reading(20.0)))
                .with_delay(Duration::from_millis(50)),
            vec![a.clone(), b.clone()],
        );

        let (ra, rb) = tokio::join!(
            coordinator.request_sensor_data(&a),
            coordinator.request_sensor_data(&b)
        );

        assert_eq!((ra, rb), (PollOutcome::Reported, PollOutcome::Reported));
        assert_eq!(client.max_concurrent_reads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_sweeps_all_devices_each_interval() {
        let a = addr("AA:BB:CC:DD:EE:01");
        let b = addr("AA:BB:CC:DD:EE:02");
        let (client, _, coordinator) = coordinator(
            ScriptedClient::new(Some(90), Some(reading(20.0))),
            vec![a.clone(), b.clone()],
        );

        let scheduler = coordinator.start();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!((client.sensor_reads(&a), client.sensor_reads(&b)), (1, 0));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!((client.sensor_reads(&a), client.sensor_reads(&b)), (1, 1));

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!((client.sensor_reads(&a), client.sensor_reads(&b)), (2, 2));

        scheduler.shutdown().await;
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(client.total_sensor_reads(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_device_does_not_stall_sweep() {
        let a = addr("AA:BB:CC:DD:EE:01");
        let b = addr("AA:BB:CC:DD:EE:02");
        let (client, _, coordinator) =
            coordinator(ScriptedClient::new(None, None), vec![a.clone(), b.clone()]);

        let scheduler = coordinator.start();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(client.sensor_reads(&a), 3);
        assert_eq!(client.sensor_reads(&b), 3);
        scheduler.shutdown().await;
    }
}
