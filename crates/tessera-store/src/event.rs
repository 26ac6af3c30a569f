//! Block and transaction events

use serde::{Deserialize, Serialize};

/// A single key/value attribute of an event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    pub value: String,
}

/// Event emitted through the context, in the host's attribute form
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbciEvent {
    #[serde(rename = "type")]
    pub ty: String,
    pub attributes: Vec<EventAttribute>,
}

impl AbciEvent {
    pub fn new(ty: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            attributes: Vec::new(),
        }
    }

    pub fn add_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(EventAttribute {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// First attribute value stored under `key`
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_lookup() {
        let event = AbciEvent::new("exchange_rate_update")
            .add_attribute("pair", "ubtc:uusd")
            .add_attribute("rate", "42000");
        assert_eq!(event.attribute("rate"), Some("42000"));
        assert_eq!(event.attribute("missing"), None);
    }
}
