use serde::{Deserialize, Serialize};

use crate::fixed::FixedPoint;
use crate::ids::RecordId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(i64),
    Fixed(FixedPoint),
    Reference(RecordId),
    Bytes(Vec<u8>),
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b).is_eq(),
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            (Self::Fixed(a), Self::Fixed(b)) => a == b,
            (Self::Reference(a), Self::Reference(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for FieldValue {}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Variant name, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Text(_) => "Text",
            Self::Integer(_) => "Integer",
            Self::Float(_) => "Float",
            Self::Boolean(_) => "Boolean",
            Self::Timestamp(_) => "Timestamp",
            Self::Fixed(_) => "Fixed",
            Self::Reference(_) => "Reference",
            Self::Bytes(_) => "Bytes",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_fixed(&self) -> Option<FixedPoint> {
        match self {
            FieldValue::Fixed(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<RecordId> {
        match self {
            FieldValue::Reference(id) => Some(*id),
            _ => None,
        }
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

impl From<FixedPoint> for FieldValue {
    fn from(value: FixedPoint) -> Self {
        FieldValue::Fixed(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    // Same variant names and order as `FieldValue`, up to `Fixed`.
    #[derive(Serialize)]
    #[allow(dead_code)]
    enum Wire {
        Null,
        Text(String),
        Integer(i64),
        Float(f64),
        Boolean(bool),
        Timestamp(i64),
        Fixed(WireFixed),
    }

    #[derive(Serialize)]
    struct WireFixed {
        magnitude: i64,
        scale: u32,
    }

    #[test]
    fn fixed_round_trips_through_msgpack() {
        let value = FieldValue::Fixed(FixedPoint::new(15_000, 2).unwrap());
        let bytes = value.to_msgpack().unwrap();
        assert_eq!(FieldValue::from_msgpack(&bytes).unwrap(), value);
    }

    #[test]
    fn stored_fixed_with_oversized_scale_is_rejected() {
        let bytes = rmp_serde::to_vec(&Wire::Fixed(WireFixed { magnitude: 1, scale: 40 })).unwrap();
        assert!(FieldValue::from_msgpack(&bytes).is_err());

        let valid = rmp_serde::to_vec(&Wire::Fixed(WireFixed { magnitude: 1, scale: 18 })).unwrap();
        assert_eq!(
            FieldValue::from_msgpack(&valid).unwrap(),
            FieldValue::Fixed(FixedPoint::new(1, 18).unwrap())
        );
    }
}
