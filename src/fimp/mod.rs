pub mod address;
pub mod message;

pub use address::{FimpAddress, MsgType, ResourceType};
pub use message::{FimpMessage, ValueType};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FimpError {
    #[error("invalid topic: {0}")]
    InvalidTopic(String),
    #[error("invalid message payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
#[error("publish failed: {0}")]
pub struct PublishError(pub String);

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, addr: &FimpAddress, msg: &FimpMessage) -> Result<(), PublishError>;
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct RecordingPublisher {
        published: Mutex<Vec<(FimpAddress, FimpMessage)>>,
    }

    impl RecordingPublisher {
        pub fn published(&self) -> Vec<(FimpAddress, FimpMessage)> {
            self.published.lock().unwrap().clone()
        }

        pub fn of_type(&self, msg_type: &str) -> Vec<(FimpAddress, FimpMessage)> {
            self.published()
                .into_iter()
                .filter(|(_, m)| m.msg_type == msg_type)
                .collect()
        }
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, addr: &FimpAddress, msg: &FimpMessage) -> Result<(), PublishError> {
            self.published
                .lock()
                .unwrap()
                .push((addr.clone(), msg.clone()));
            Ok(())
        }
    }
}
