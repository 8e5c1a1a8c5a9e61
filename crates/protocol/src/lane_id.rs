use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifier of one independent record stream ("customers", "vendors", ...).
///
/// Wraps `Arc<str>` so ids can be cloned into requests, events and log
/// fields without allocating. Two ids compare equal only when their names
/// match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LaneId(Arc<str>);

impl LaneId {
    pub const CUSTOMERS: &'static str = "customers";
    pub const VENDORS: &'static str = "vendors";
    pub const TRANSACTIONS: &'static str = "transactions";

    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// The three ledger streams a dashboard shows out of the box.
    pub fn ledger_defaults() -> Vec<LaneId> {
        vec![
            LaneId::new(Self::CUSTOMERS),
            LaneId::new(Self::VENDORS),
            LaneId::new(Self::TRANSACTIONS),
        ]
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Hash is derived over the inner `str`, so lookups by `&str` agree with it.
impl std::borrow::Borrow<str> for LaneId {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LaneId {
    fn from(s: &str) -> Self {
        LaneId(Arc::from(s))
    }
}

impl From<String> for LaneId {
    fn from(s: String) -> Self {
        LaneId(Arc::from(s))
    }
}

impl std::fmt::Display for LaneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// Serialized as a bare string; hand-rolled to avoid serde's `rc` feature.

impl Serialize for LaneId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for LaneId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(LaneId::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_by_name() {
        let a = LaneId::new("customers");
        let b = LaneId::from(String::from("customers"));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "customers");
        assert_ne!(a, LaneId::new("vendors"));
    }

    #[test]
    fn hashmap_lookup_by_str() {
        let mut map = std::collections::HashMap::new();
        map.insert(LaneId::new(LaneId::VENDORS), 7);
        assert_eq!(map.get("vendors"), Some(&7));
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = LaneId::new("transactions");
        let json = serde_json::to_string(&id).expect("serialize lane id");
        assert_eq!(json, "\"transactions\"");
        let back: LaneId = serde_json::from_str(&json).expect("deserialize lane id");
        assert_eq!(back, id);
    }

    #[test]
    fn deserializes_from_owned_value() {
        let value = serde_json::json!(["customers", "vendors"]);
        let ids: Vec<LaneId> = serde_json::from_value(value).expect("lane id list");
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[1], LaneId::new(LaneId::VENDORS));
    }

    #[test]
    fn ledger_defaults_are_ordered() {
        let ids = LaneId::ledger_defaults();
        let names: Vec<&str> = ids.iter().map(LaneId::as_str).collect();
        assert_eq!(names, ["customers", "vendors", "transactions"]);
    }
}
