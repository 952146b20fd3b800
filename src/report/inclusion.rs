//! Device description announced to the bus on request.
//!
//! Reports are rebuilt from the static service catalogue every time; nothing
//! here is cached.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::services::{ServiceDescriptor, SERVICES};
use crate::device::DeviceAddress;
use crate::fimp::ValueType;

const GROUP: &str = "ch_0";
const PRODUCT_NAME: &str = "Flower care";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InterfaceReport {
    #[serde(rename = "intf_t")]
    pub direction: String,
    #[serde(rename = "msg_t")]
    pub msg_type: String,
    #[serde(rename = "val_t")]
    pub value_type: ValueType,
    #[serde(rename = "ver")]
    pub version: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServiceReport {
    pub name: String,
    pub alias: String,
    pub address: String,
    pub enabled: bool,
    pub groups: Vec<String>,
    pub props: BTreeMap<String, Vec<String>>,
    pub tags: Vec<String>,
    pub interfaces: Vec<InterfaceReport>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InclusionReport {
    pub address: String,
    #[serde(rename = "type")]
    pub thing_type: String,
    pub alias: String,
    pub comm_tech: String,
    pub product_name: String,
    pub product_hash: String,
    pub product_id: String,
    pub manufacturer_id: String,
    pub sw_ver: String,
    pub power_source: String,
    pub wakeup_interval: String,
    pub security: String,
    pub groups: Vec<String>,
    pub services: Vec<ServiceReport>,
}

pub struct InclusionReportBuilder<'a> {
    resource_name: &'a str,
    wakeup_interval: Duration,
}

impl<'a> InclusionReportBuilder<'a> {
    pub fn new(resource_name: &'a str) -> Self {
        InclusionReportBuilder {
            resource_name,
            wakeup_interval: Duration::ZERO,
        }
    }

    pub fn wakeup_interval(mut self, interval: Duration) -> Self {
        self.wakeup_interval = interval;
        self
    }

    pub fn build(&self, addr: &DeviceAddress) -> InclusionReport {
        let bus_addr = addr.bus_form();

        InclusionReport {
            address: bus_addr.clone(),
            thing_type: self.resource_name.to_string(),
            alias: PRODUCT_NAME.to_string(),
            comm_tech: "ble".to_string(),
            product_name: PRODUCT_NAME.to_string(),
            product_hash: "flower_care_1".to_string(),
            product_id: "flower_care".to_string(),
            manufacturer_id: "mi".to_string(),
            sw_ver: "1.0".to_string(),
            power_source: "battery".to_string(),
            wakeup_interval: self.wakeup_interval.as_secs().to_string(),
            security: "none".to_string(),
            groups: vec![GROUP.to_string()],
            services: SERVICES
                .iter()
                .map(|s| self.service(s, &bus_addr))
                .collect(),
        }
    }

    fn service(&self, descriptor: &ServiceDescriptor, bus_addr: &str) -> ServiceReport {
        let mut props = BTreeMap::new();
        if !descriptor.units.is_empty() {
            props.insert(
                "sup_units".to_string(),
                descriptor.units.iter().map(|u| u.to_string()).collect(),
            );
        }

        let interface = |direction: &str, msg_type: &str, value_type| InterfaceReport {
            direction: direction.to_string(),
            msg_type: msg_type.to_string(),
            value_type,
            version: "1".to_string(),
        };

        ServiceReport {
            name: descriptor.name.to_string(),
            alias: String::new(),
            address: format!(
                "/rt:dev/rn:{}/ad:1/sv:{}/ad:{}",
                self.resource_name, descriptor.name, bus_addr
            ),
            enabled: true,
            groups: vec![GROUP.to_string()],
            props,
            tags: Vec::new(),
            interfaces: vec![
                interface("out", descriptor.outbound.msg_type, descriptor.outbound.value_type),
                interface("in", descriptor.inbound.msg_type, descriptor.inbound.value_type),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> InclusionReport {
        let addr: DeviceAddress = "C4:7C:8D:63:33:14".parse().unwrap();
        InclusionReportBuilder::new("ble")
            .wakeup_interval(Duration::from_secs(600))
            .build(&addr)
    }

    #[test]
    fn contains_all_services_with_in_and_out() {
        let report = report();
        let names: Vec<&str> = report.services.iter().map(|s| s.name.as_str()).collect();

        assert_eq!(
            names,
            vec!["sensor_temp", "sensor_lumin", "sensor_humid", "sensor_conduct", "battery"]
        );
        for service in &report.services {
            let directions: Vec<&str> = service
                .interfaces
                .iter()
                .map(|i| i.direction.as_str())
                .collect();
            assert_eq!(directions, vec!["out", "in"], "{}", service.name);
        }
    }

    #[test]
    fn metadata() {
        let report = report();

        assert_eq!(report.address, "C4-7C-8D-63-33-14");
        assert_eq!(report.wakeup_interval, "600");
        assert_eq!(report.power_source, "battery");
        assert_eq!(report.security, "none");
        assert_eq!(
            report.services[0].address,
            "/rt:dev/rn:ble/ad:1/sv:sensor_temp/ad:C4-7C-8D-63-33-14"
        );
    }

    #[test]
    fn units_declared_per_service() {
        let report = report();

        assert_eq!(report.services[1].props["sup_units"], vec!["Lux".to_string()]);
        assert!(report.services[4].props.is_empty());
        assert_eq!(report.services[4].interfaces[0].msg_type, "evt.lvl.report");
        assert_eq!(report.services[4].interfaces[0].value_type, ValueType::Int);
    }

    #[test]
    fn serializes_with_bus_field_names() {
        let value = serde_json::to_value(report()).unwrap();

        assert_eq!(value["type"], "ble");
        assert_eq!(value["services"][0]["interfaces"][0]["intf_t"], "out");
        assert_eq!(value["services"][0]["interfaces"][1]["msg_t"], "cmd.sensor.get_report");
    }
}
