use std::fmt;

use super::FimpError;

const PAYLOAD_TYPE: &str = "j1";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MsgType {
    Cmd,
    Evt,
}

impl MsgType {
    fn as_str(&self) -> &'static str {
        match self {
            MsgType::Cmd => "cmd",
            MsgType::Evt => "evt",
        }
    }

    fn parse(s: &str) -> Option<MsgType> {
        match s {
            "cmd" => Some(MsgType::Cmd),
            "evt" => Some(MsgType::Evt),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceType {
    Adapter,
    Device,
    App,
}

impl ResourceType {
    fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Adapter => "ad",
            ResourceType::Device => "dev",
            ResourceType::App => "app",
        }
    }

    fn parse(s: &str) -> Option<ResourceType> {
        match s {
            "ad" => Some(ResourceType::Adapter),
            "dev" => Some(ResourceType::Device),
            "app" => Some(ResourceType::App),
            _ => None,
        }
    }
}

/// Topic-structured bus address:
/// `pt:j1/mt:<msg>/rt:<resource>/rn:<name>/ad:<n>[/sv:<service>/ad:<service address>]`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FimpAddress {
    pub msg_type: MsgType,
    pub resource_type: ResourceType,
    pub resource_name: String,
    pub resource_address: String,
    pub service_name: Option<String>,
    pub service_address: Option<String>,
}

impl FimpAddress {
    pub fn adapter(msg_type: MsgType, resource_name: &str) -> FimpAddress {
        FimpAddress {
            msg_type,
            resource_type: ResourceType::Adapter,
            resource_name: resource_name.to_string(),
            resource_address: "1".to_string(),
            service_name: None,
            service_address: None,
        }
    }

    pub fn device_service(
        msg_type: MsgType,
        resource_name: &str,
        service_name: &str,
        service_address: &str,
    ) -> FimpAddress {
        FimpAddress {
            msg_type,
            resource_type: ResourceType::Device,
            resource_name: resource_name.to_string(),
            resource_address: "1".to_string(),
            service_name: Some(service_name.to_string()),
            service_address: Some(service_address.to_string()),
        }
    }

    /// Parses a topic. Anything before the `pt:` segment (a global topic
    /// prefix) is ignored. An empty service address is treated as absent.
    pub fn parse(topic: &str) -> Result<FimpAddress, FimpError> {
        let invalid = || FimpError::InvalidTopic(topic.to_string());

        let segments: Vec<&str> = topic.split('/').collect();
        let start = segments
            .iter()
            .position(|s| s.starts_with("pt:"))
            .ok_or_else(invalid)?;

        let mut fields = Vec::with_capacity(7);
        for segment in &segments[start..] {
            fields.push(segment.split_once(':').ok_or_else(invalid)?);
        }

        let value = |i: usize, key: &str| field(&fields, i, key).ok_or_else(invalid);

        if value(0, "pt")? != PAYLOAD_TYPE {
            return Err(invalid());
        }
        let msg_type = MsgType::parse(value(1, "mt")?).ok_or_else(invalid)?;
        let resource_type = ResourceType::parse(value(2, "rt")?).ok_or_else(invalid)?;
        let resource_name = value(3, "rn")?.to_string();
        let resource_address = value(4, "ad")?.to_string();

        let (service_name, service_address) = match fields.len() {
            5 => (None, None),
            6 => (Some(value(5, "sv")?.to_string()), None),
            7 => (
                Some(value(5, "sv")?.to_string()),
                Some(value(6, "ad")?.to_string()).filter(|s| !s.is_empty()),
            ),
            _ => return Err(invalid()),
        };

        Ok(FimpAddress {
            msg_type,
            resource_type,
            resource_name,
            resource_address,
            service_name,
            service_address,
        })
    }

    pub fn topic(&self, global_prefix: &str) -> String {
        if global_prefix.is_empty() {
            self.to_string()
        } else {
            format!("{}/{}", global_prefix.trim_end_matches('/'), self)
        }
    }
}

fn field<'a>(fields: &[(&'a str, &'a str)], i: usize, key: &str) -> Option<&'a str> {
    match fields.get(i) {
        Some((k, v)) if *k == key => Some(*v),
        _ => None,
    }
}

impl fmt::Display for FimpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pt:{}/mt:{}/rt:{}/rn:{}/ad:{}",
            PAYLOAD_TYPE,
            self.msg_type.as_str(),
            self.resource_type.as_str(),
            self.resource_name,
            self.resource_address
        )?;
        if let Some(service) = &self.service_name {
            write!(f, "/sv:{}", service)?;
            if let Some(addr) = &self.service_address {
                write!(f, "/ad:{}", addr)?;
            }
        }
        Ok(())
    }
}
