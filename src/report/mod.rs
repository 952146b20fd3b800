pub mod command;
pub mod inclusion;
pub mod services;

pub use command::Command;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, error};

use self::inclusion::{InclusionReport, InclusionReportBuilder};
use self::services::ServiceDescriptor;
use crate::device::{BatteryLevel, DeviceAddress, SensorReading};
use crate::fimp::{FimpAddress, FimpMessage, MsgType, Publisher, ValueType};

#[derive(Serialize)]
struct DeviceListItem<'a> {
    address: &'a str,
}

pub fn sensor_events(reading: &SensorReading) -> Vec<(&'static ServiceDescriptor, FimpMessage)> {
    [
        (&services::TEMPERATURE, reading.temperature),
        (&services::ILLUMINANCE, reading.illuminance as f64),
        (&services::HUMIDITY, reading.moisture as f64),
        (&services::CONDUCTIVITY, reading.conductivity as f64),
    ]
    .into_iter()
    .map(|(service, value)| {
        let mut msg = FimpMessage::new(
            service.outbound.msg_type,
            service.name,
            ValueType::Float,
            json!(value),
        );
        if let Some(unit) = service.unit() {
            msg = msg.with_prop("unit", unit);
        }
        (service, msg)
    })
    .collect()
}

pub fn battery_event(level: BatteryLevel) -> FimpMessage {
    FimpMessage::new(
        services::BATTERY.outbound.msg_type,
        services::BATTERY.name,
        ValueType::Int,
        json!(level),
    )
}

/// Publish failures are logged, never returned.
pub struct Reporter {
    publisher: Arc<dyn Publisher>,
    resource_name: String,
    wakeup_interval: Duration,
}

impl Reporter {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        resource_name: &str,
        wakeup_interval: Duration,
    ) -> Self {
        Reporter {
            publisher,
            resource_name: resource_name.to_string(),
            wakeup_interval,
        }
    }

    pub async fn report_reading(&self, addr: &DeviceAddress, reading: &SensorReading) {
        let bus_addr = addr.bus_form();
        for (service, msg) in sensor_events(reading) {
            let topic = FimpAddress::device_service(
                MsgType::Evt,
                &self.resource_name,
                service.name,
                &bus_addr,
            );
            self.publish(&topic, &msg).await;
        }
    }

    pub async fn report_battery(&self, addr: &DeviceAddress, level: BatteryLevel) {
        let topic = FimpAddress::device_service(
            MsgType::Evt,
            &self.resource_name,
            services::BATTERY.name,
            &addr.bus_form(),
        );
        self.publish(&topic, &battery_event(level)).await;
    }

    pub fn inclusion_report(&self, addr: &DeviceAddress) -> InclusionReport {
        InclusionReportBuilder::new(&self.resource_name)
            .wakeup_interval(self.wakeup_interval)
            .build(addr)
    }

    pub async fn send_inclusion_report(&self, addr: &DeviceAddress) {
        let report = self.inclusion_report(addr);
        let value = match serde_json::to_value(&report) {
            Ok(value) => value,
            Err(e) => {
                error!(address = %addr, "cannot encode inclusion report: {}", e);
                return;
            }
        };

        let msg = FimpMessage::new(
            services::EVT_INCLUSION_REPORT,
            &self.resource_name,
            ValueType::Object,
            value,
        );
        self.publish(&FimpAddress::adapter(MsgType::Evt, &self.resource_name), &msg)
            .await;
    }

    pub async fn send_device_list(&self, devices: &[DeviceAddress]) {
        let items: Vec<DeviceListItem> = devices
            .iter()
            .map(|d| DeviceListItem { address: d.as_str() })
            .collect();

        let msg = FimpMessage::new(
            services::EVT_ALL_NODES_REPORT,
            &self.resource_name,
            ValueType::Object,
            json!(items),
        );
        self.publish(&FimpAddress::adapter(MsgType::Evt, &self.resource_name), &msg)
            .await;
    }

    async fn publish(&self, topic: &FimpAddress, msg: &FimpMessage) {
        debug!("publishing {} to {}", msg.msg_type, topic);
        if let Err(e) = self.publisher.publish(topic, msg).await {
            error!("cannot publish {} to {}: {}", msg.msg_type, topic, e);
        }
    }
}
