use thiserror::Error;

use super::services::{
    CMD_GET_ALL_NODES, CMD_GET_INCLUSION_REPORT, CMD_LVL_GET_REPORT, CMD_SENSOR_GET_REPORT,
};
use crate::device::{DeviceAddress, InvalidAddress};
use crate::fimp::{FimpAddress, FimpMessage, ResourceType};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    GetInclusionReport(DeviceAddress),
    GetAllNodes,
    // raised by both sensor and battery report requests
    PollDevice(DeviceAddress),
    Unrecognized,
}

#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("{0}: value is not a string")]
    ValueNotString(String),
    #[error("{0}: service address is empty")]
    MissingServiceAddress(String),
    #[error(transparent)]
    InvalidAddress(#[from] InvalidAddress),
}

impl Command {
    pub fn decode(addr: &FimpAddress, msg: &FimpMessage) -> Result<Command, CommandError> {
        let msg_type = msg.msg_type.as_str();

        match (addr.resource_type, msg_type) {
            (ResourceType::Adapter, CMD_GET_INCLUSION_REPORT) => {
                let value = msg
                    .string_value()
                    .ok_or_else(|| CommandError::ValueNotString(msg_type.to_string()))?;
                Ok(Command::GetInclusionReport(DeviceAddress::from_bus_form(value)?))
            }
            (ResourceType::Adapter, CMD_GET_ALL_NODES) => Ok(Command::GetAllNodes),
            (ResourceType::Device, CMD_SENSOR_GET_REPORT | CMD_LVL_GET_REPORT) => {
                let service_address = addr
                    .service_address
                    .as_deref()
                    .ok_or_else(|| CommandError::MissingServiceAddress(msg_type.to_string()))?;
                Ok(Command::PollDevice(DeviceAddress::from_bus_form(service_address)?))
            }
            _ => Ok(Command::Unrecognized),
        }
    }
}
