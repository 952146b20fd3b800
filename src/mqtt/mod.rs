pub mod client;

pub use client::{MqttClient, MqttPublisher};
