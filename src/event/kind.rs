use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Notification types a subscription can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    /// Delivered once to a new subscription with the present state.
    Init,
    /// The live state changed.
    Update,
    /// The dump history changed or a dump was restored.
    DumpUpdate,
    /// Wildcard matching every concrete type.
    All,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Init => "init",
            EventType::Update => "update",
            EventType::DumpUpdate => "dumpUpdate",
            EventType::All => "all",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct ParseEventTypeError(pub String);

impl FromStr for EventType {
    type Err = ParseEventTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(EventType::Init),
            "update" => Ok(EventType::Update),
            "dumpUpdate" => Ok(EventType::DumpUpdate),
            "all" => Ok(EventType::All),
            other => Err(ParseEventTypeError(other.to_string())),
        }
    }
}

/// The set of types one subscription listens for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTypes(Vec<EventType>);

impl EventTypes {
    /// Whether a notification of type `kind` should reach this subscription.
    pub fn matches(&self, kind: EventType) -> bool {
        self.0.iter().any(|t| *t == kind || *t == EventType::All)
    }

    pub fn iter(&self) -> impl Iterator<Item = EventType> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[EventType] {
        &self.0
    }
}

impl From<EventType> for EventTypes {
    fn from(kind: EventType) -> Self {
        EventTypes(vec![kind])
    }
}

impl From<Vec<EventType>> for EventTypes {
    fn from(mut kinds: Vec<EventType>) -> Self {
        let mut seen = Vec::with_capacity(kinds.len());
        kinds.retain(|kind| {
            if seen.contains(kind) {
                false
            } else {
                seen.push(*kind);
                true
            }
        });
        EventTypes(kinds)
    }
}

impl From<&[EventType]> for EventTypes {
    fn from(kinds: &[EventType]) -> Self {
        kinds.to_vec().into()
    }
}

impl<const N: usize> From<[EventType; N]> for EventTypes {
    fn from(kinds: [EventType; N]) -> Self {
        kinds.to_vec().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_everything() {
        let types = EventTypes::from(EventType::All);
        assert!(types.matches(EventType::Init));
        assert!(types.matches(EventType::Update));
        assert!(types.matches(EventType::DumpUpdate));
    }

    #[test]
    fn concrete_types_match_only_themselves() {
        let types = EventTypes::from([EventType::Update, EventType::Update]);
        assert_eq!(types.as_slice(), &[EventType::Update]);
        assert!(types.matches(EventType::Update));
        assert!(!types.matches(EventType::Init));
    }

    #[test]
    fn names_round_trip() {
        for kind in [EventType::Init, EventType::Update, EventType::DumpUpdate, EventType::All] {
            assert_eq!(kind.to_string().parse::<EventType>(), Ok(kind));
        }
        assert!("changed".parse::<EventType>().is_err());
        assert_eq!(serde_json::to_string(&EventType::DumpUpdate).unwrap(), "\"dumpUpdate\"");
    }
}
