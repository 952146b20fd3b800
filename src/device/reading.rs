use serde::{Deserialize, Serialize};

// Open interval; anything at or beyond these bounds is treated as a sensor glitch.
const MIN_TEMPERATURE: f64 = -50.0;
const MAX_TEMPERATURE: f64 = 100.0;

pub type BatteryLevel = u8;

/// One complete set of measurements taken in a single device read.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub temperature: f64,
    pub illuminance: u32,
    // soil moisture, published as humidity
    pub moisture: u8,
    pub conductivity: u16,
}

impl SensorReading {
    pub fn is_plausible(&self) -> bool {
        self.temperature > MIN_TEMPERATURE && self.temperature < MAX_TEMPERATURE
    }
}
