//! Xiaomi Flower Care GATT protocol.
//!
//! The payload decoders are always available; the btleplug-backed client is
//! only compiled with the `ble` feature.
#![cfg_attr(not(feature = "ble"), allow(dead_code))]

use uuid::Uuid;

use super::{BatteryLevel, SensorReading, TransportError};

pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x00001204_0000_1000_8000_00805f9b34fb);
pub const MODE_UUID: Uuid = Uuid::from_u128(0x00001a00_0000_1000_8000_00805f9b34fb);
pub const DATA_UUID: Uuid = Uuid::from_u128(0x00001a01_0000_1000_8000_00805f9b34fb);
pub const FIRMWARE_UUID: Uuid = Uuid::from_u128(0x00001a02_0000_1000_8000_00805f9b34fb);

/// Written to the mode characteristic to switch the device into live-data mode.
pub const MODE_REALTIME_READ: [u8; 2] = [0xa0, 0x1f];

const DATA_LEN: usize = 10;
const FIRMWARE_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct Firmware {
    pub battery: BatteryLevel,
    pub version: String,
}

pub fn decode_firmware(data: &[u8]) -> Result<Firmware, TransportError> {
    if data.len() < FIRMWARE_LEN {
        return Err(TransportError(format!(
            "firmware payload too short: {} bytes",
            data.len()
        )));
    }

    let version = String::from_utf8_lossy(&data[2..])
        .trim_end_matches('\0')
        .to_string();

    Ok(Firmware {
        battery: data[0],
        version,
    })
}

pub fn decode_sensor_data(data: &[u8]) -> Result<SensorReading, TransportError> {
    if data.len() < DATA_LEN {
        return Err(TransportError(format!(
            "sensor payload too short: {} bytes",
            data.len()
        )));
    }

    // byte 2 is unused by the firmware
    let temperature = i16::from_le_bytes([data[0], data[1]]) as f64 / 10.0;
    let illuminance = u32::from_le_bytes([data[3], data[4], data[5], data[6]]);
    let moisture = data[7];
    let conductivity = u16::from_le_bytes([data[8], data[9]]);

    Ok(SensorReading {
        temperature,
        illuminance,
        moisture,
        conductivity,
    })
}

#[cfg(feature = "ble")]
pub use self::ble::MifloraClient;

#[cfg(feature = "ble")]
mod ble {
    use std::future::Future;
    use std::time::Duration;

    use async_trait::async_trait;
    use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter, WriteType};
    use btleplug::platform::{Adapter, Manager, Peripheral};
    use tracing::{debug, info};
    use uuid::Uuid;

    use super::*;
    use crate::device::{DeviceAddress, SensorClient};

    fn transport(e: btleplug::Error) -> TransportError {
        TransportError(e.to_string())
    }

    pub struct MifloraClient {
        adapter: Adapter,
        timeout: Duration,
    }

    impl MifloraClient {
        /// Opens the named host adapter (e.g. `hci0`) and starts a background scan
        /// so configured devices show up as peripherals.
        pub async fn new(adapter_name: &str, timeout: Duration) -> Result<Self, TransportError> {
            let manager = Manager::new().await.map_err(transport)?;

            let mut selected = None;
            for adapter in manager.adapters().await.map_err(transport)? {
                let info = adapter.adapter_info().await.map_err(transport)?;
                debug!("found bluetooth adapter {}", info);
                if info.starts_with(adapter_name) {
                    selected = Some(adapter);
                    break;
                }
            }

            let adapter = selected.ok_or_else(|| {
                TransportError(format!("bluetooth adapter {} not found", adapter_name))
            })?;

            adapter
                .start_scan(ScanFilter {
                    services: vec![SERVICE_UUID],
                })
                .await
                .map_err(transport)?;
            info!("scanning for flower care devices on {}", adapter_name);

            Ok(MifloraClient { adapter, timeout })
        }

        async fn peripheral(&self, addr: &DeviceAddress) -> Result<Peripheral, TransportError> {
            let peripheral = self
                .adapter
                .peripherals()
                .await
                .map_err(transport)?
                .into_iter()
                .find(|p| p.address().to_string().eq_ignore_ascii_case(addr.as_str()))
                .ok_or_else(|| TransportError(format!("device {} not discovered yet", addr)))?;

            if !peripheral.is_connected().await.map_err(transport)? {
                debug!(address = %addr, "connecting");
                peripheral.connect().await.map_err(transport)?;
            }
            if peripheral.characteristics().is_empty() {
                peripheral.discover_services().await.map_err(transport)?;
            }

            Ok(peripheral)
        }

        async fn read(
            &self,
            peripheral: &Peripheral,
            uuid: Uuid,
        ) -> Result<Vec<u8>, TransportError> {
            let characteristic = peripheral
                .characteristics()
                .into_iter()
                .find(|c| c.uuid == uuid)
                .ok_or_else(|| TransportError(format!("characteristic {} not found", uuid)))?;

            peripheral.read(&characteristic).await.map_err(transport)
        }

        async fn enable_realtime(&self, peripheral: &Peripheral) -> Result<(), TransportError> {
            let characteristic = peripheral
                .characteristics()
                .into_iter()
                .find(|c| c.uuid == MODE_UUID)
                .ok_or_else(|| TransportError(format!("characteristic {} not found", MODE_UUID)))?;

            peripheral
                .write(&characteristic, &MODE_REALTIME_READ, WriteType::WithResponse)
                .await
                .map_err(transport)
        }

        async fn bounded<T>(
            &self,
            addr: &DeviceAddress,
            fut: impl Future<Output = Result<T, TransportError>>,
        ) -> Result<T, TransportError> {
            tokio::time::timeout(self.timeout, fut)
                .await
                .map_err(|_| TransportError(format!("timed out talking to {}", addr)))?
        }
    }

    #[async_trait]
    impl SensorClient for MifloraClient {
        async fn read_battery(
            &self,
            addr: &DeviceAddress,
        ) -> Result<BatteryLevel, TransportError> {
            self.bounded(addr, async {
                let peripheral = self.peripheral(addr).await?;
                let firmware = decode_firmware(&self.read(&peripheral, FIRMWARE_UUID).await?)?;
                debug!(address = %addr, "firmware: {:?}", firmware);
                Ok(firmware.battery)
            })
            .await
        }

        async fn read_sensors(
            &self,
            addr: &DeviceAddress,
        ) -> Result<SensorReading, TransportError> {
            self.bounded(addr, async {
                let peripheral = self.peripheral(addr).await?;
                self.enable_realtime(&peripheral).await?;
                decode_sensor_data(&self.read(&peripheral, DATA_UUID).await?)
            })
            .await
        }
    }
}
