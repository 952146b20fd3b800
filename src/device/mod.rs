pub mod address;
pub mod client;
pub mod miflora;
pub mod reading;

pub use address::{DeviceAddress, InvalidAddress};
pub use client::{SensorClient, TransportError, UnavailableClient};
pub use reading::{BatteryLevel, SensorReading};
