use crate::fimp::ValueType;

pub const EVT_SENSOR_REPORT: &str = "evt.sensor.report";
pub const EVT_LVL_REPORT: &str = "evt.lvl.report";
pub const EVT_ALL_NODES_REPORT: &str = "evt.network.all_nodes_report";
pub const EVT_INCLUSION_REPORT: &str = "evt.thing.inclusion_report";

pub const CMD_GET_INCLUSION_REPORT: &str = "cmd.thing.get_inclusion_report";
pub const CMD_GET_ALL_NODES: &str = "cmd.network.get_all_nodes";
pub const CMD_SENSOR_GET_REPORT: &str = "cmd.sensor.get_report";
pub const CMD_LVL_GET_REPORT: &str = "cmd.lvl.get_report";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interface {
    pub msg_type: &'static str,
    pub value_type: ValueType,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceDescriptor {
    pub name: &'static str,
    pub units: &'static [&'static str],
    pub outbound: Interface,
    pub inbound: Interface,
}

impl ServiceDescriptor {
    pub fn unit(&self) -> Option<&'static str> {
        self.units.first().copied()
    }
}

const SENSOR_OUT: Interface = Interface {
    msg_type: EVT_SENSOR_REPORT,
    value_type: ValueType::Float,
};

const SENSOR_IN: Interface = Interface {
    msg_type: CMD_SENSOR_GET_REPORT,
    value_type: ValueType::String,
};

pub const TEMPERATURE: ServiceDescriptor = ServiceDescriptor {
    name: "sensor_temp",
    units: &["C"],
    outbound: SENSOR_OUT,
    inbound: SENSOR_IN,
};

pub const ILLUMINANCE: ServiceDescriptor = ServiceDescriptor {
    name: "sensor_lumin",
    units: &["Lux"],
    outbound: SENSOR_OUT,
    inbound: SENSOR_IN,
};

pub const HUMIDITY: ServiceDescriptor = ServiceDescriptor {
    name: "sensor_humid",
    units: &["%"],
    outbound: SENSOR_OUT,
    inbound: SENSOR_IN,
};

// Deployed consumers expect "?" here; the bus has no conductivity unit.
pub const CONDUCTIVITY: ServiceDescriptor = ServiceDescriptor {
    name: "sensor_conduct",
    units: &["?"],
    outbound: SENSOR_OUT,
    inbound: SENSOR_IN,
};

pub const BATTERY: ServiceDescriptor = ServiceDescriptor {
    name: "battery",
    units: &[],
    outbound: Interface {
        msg_type: EVT_LVL_REPORT,
        value_type: ValueType::Int,
    },
    inbound: Interface {
        msg_type: CMD_LVL_GET_REPORT,
        value_type: ValueType::String,
    },
};

pub static SERVICES: [ServiceDescriptor; 5] =
    [TEMPERATURE, ILLUMINANCE, HUMIDITY, CONDUCTIVITY, BATTERY];
