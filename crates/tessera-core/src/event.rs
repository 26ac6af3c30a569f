//! Typed events
//!
//! A typed event is a serde struct with a fixed type name. Each field becomes
//! one attribute whose value is the field's JSON encoding, so events decode
//! back into the same struct.

use crate::error::{CoreError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tessera_store::{AbciEvent, Context};

pub trait TypedEvent: Serialize + DeserializeOwned {
    /// Event type name
    const TYPE: &'static str;

    fn to_abci(&self) -> Result<AbciEvent> {
        let value = serde_json::to_value(self).map_err(|e| CoreError::Event(e.to_string()))?;
        let Value::Object(fields) = value else {
            return Err(CoreError::Event(format!("{} is not a struct", Self::TYPE)));
        };
        let mut event = AbciEvent::new(Self::TYPE);
        for (key, field) in fields {
            event = event.add_attribute(key, field.to_string());
        }
        Ok(event)
    }

    fn from_abci(event: &AbciEvent) -> Result<Self> {
        if event.ty != Self::TYPE {
            return Err(CoreError::Event(format!(
                "expected {}, found {}",
                Self::TYPE,
                event.ty
            )));
        }
        let mut fields = Map::new();
        for attr in &event.attributes {
            let value: Value = serde_json::from_str(&attr.value)
                .map_err(|e| CoreError::Event(format!("{}: {e}", attr.key)))?;
            fields.insert(attr.key.clone(), value);
        }
        serde_json::from_value(Value::Object(fields)).map_err(|e| CoreError::Event(e.to_string()))
    }
}

/// Emit a typed event on the context
pub fn emit<E: TypedEvent>(ctx: &mut Context<'_>, event: &E) -> Result<()> {
    ctx.emit(event.to_abci()?);
    Ok(())
}

/// Decode every event of type `E` from a list
pub fn find_events<E: TypedEvent>(events: &[AbciEvent]) -> Vec<E> {
    events
        .iter()
        .filter(|e| e.ty == E::TYPE)
        .filter_map(|e| E::from_abci(e).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dec::Dec;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct RateSet {
        pair: String,
        rate: Dec,
        height: u64,
    }

    impl TypedEvent for RateSet {
        const TYPE: &'static str = "test.rate_set";
    }

    #[test]
    fn test_event_round_trip() {
        let event = RateSet {
            pair: "ubtc:uusd".into(),
            rate: "42000.5".parse().unwrap(),
            height: 9,
        };
        let abci = event.to_abci().unwrap();
        assert_eq!(abci.attribute("rate"), Some("\"42000.5\""));
        assert_eq!(abci.attribute("height"), Some("9"));
        assert_eq!(RateSet::from_abci(&abci).unwrap(), event);
    }

    #[test]
    fn test_wrong_type_rejected() {
        let abci = AbciEvent::new("other");
        assert!(RateSet::from_abci(&abci).is_err());
        assert!(find_events::<RateSet>(&[abci]).is_empty());
    }
}
