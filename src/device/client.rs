use async_trait::async_trait;
use thiserror::Error;

use super::{BatteryLevel, DeviceAddress, SensorReading};

#[derive(Error, Debug, Clone, PartialEq)]
#[error("transport failure: {0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(msg: impl Into<String>) -> Self {
        TransportError(msg.into())
    }
}

#[async_trait]
pub trait SensorClient: Send + Sync {
    async fn read_battery(&self, addr: &DeviceAddress) -> Result<BatteryLevel, TransportError>;

    async fn read_sensors(&self, addr: &DeviceAddress) -> Result<SensorReading, TransportError>;
}

/// Every read fails. Used when no radio is available.
pub struct UnavailableClient;

#[async_trait]
impl SensorClient for UnavailableClient {
    async fn read_battery(&self, addr: &DeviceAddress) -> Result<BatteryLevel, TransportError> {
        Err(TransportError(format!("no radio support, cannot read {}", addr)))
    }

    async fn read_sensors(&self, addr: &DeviceAddress) -> Result<SensorReading, TransportError> {
        Err(TransportError(format!("no radio support, cannot read {}", addr)))
    }
}
