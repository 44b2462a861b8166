use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::Value as Json;

use crate::graph::arena::ObjectId;
use crate::schema::attribute::{Attribute, AttributeType};

/// Typed scalar payload of a [`Value`].
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    String(String),
    Number(f64),
    Integer(i64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
}

impl Scalar {
    /// Convert a JSON value into a typed scalar for the given attribute
    /// type. Returns `None` when the JSON value does not fit the type; the
    /// validator reports that as a per-attribute error.
    pub fn from_json(ty: AttributeType, value: &Json) -> Option<Self> {
        match ty {
            AttributeType::String => value.as_str().map(|s| Scalar::String(s.to_string())),
            // Integers are acceptable numbers too
            AttributeType::Number => value.as_f64().map(Scalar::Number),
            AttributeType::Integer => value.as_i64().map(Scalar::Integer),
            AttributeType::Boolean => value.as_bool().map(Scalar::Boolean),
            AttributeType::Date => value
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .map(Scalar::Date),
            AttributeType::DateTime => value
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| Scalar::DateTime(dt.with_timezone(&Utc))),
            AttributeType::Object => None,
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Scalar::String(s) => Json::String(s.clone()),
            Scalar::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Scalar::Integer(i) => Json::Number((*i).into()),
            Scalar::Boolean(b) => Json::Bool(*b),
            Scalar::Date(d) => Json::String(d.format("%Y-%m-%d").to_string()),
            Scalar::DateTime(dt) => {
                Json::String(dt.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
        }
    }
}

/// The data half of a [`Value`]. Exactly one variant is meaningful per
/// attribute, determined by `attribute.ty` and `attribute.multiple`; a value
/// never holds a scalar and nested objects at the same time.
#[derive(Debug, Clone)]
pub enum ValueData {
    Scalar(Option<Scalar>),
    ScalarList(Vec<Scalar>),
    Object(Option<ObjectId>),
    ObjectList(Vec<ObjectId>),
}

impl ValueData {
    /// The empty/null shape for an attribute.
    pub fn empty_for(attribute: &Attribute) -> Self {
        match (attribute.ty, attribute.multiple) {
            (AttributeType::Object, false) => ValueData::Object(None),
            (AttributeType::Object, true) => ValueData::ObjectList(Vec::new()),
            (_, false) => ValueData::Scalar(None),
            (_, true) => ValueData::ScalarList(Vec::new()),
        }
    }
}

/// One attribute's data for one object.
#[derive(Debug, Clone)]
pub struct Value {
    pub attribute: String,
    pub data: ValueData,
}

impl Value {
    pub fn empty(attribute: &Attribute) -> Self {
        Self { attribute: attribute.name.clone(), data: ValueData::empty_for(attribute) }
    }

    /// Clear semantics: an omitted, non-required field becomes null rather
    /// than keeping a stale value.
    pub fn set_null(&mut self, attribute: &Attribute) {
        self.data = ValueData::empty_for(attribute);
    }

    /// Nested objects referenced by this value, in order. Empty for scalar
    /// values.
    pub fn objects(&self) -> Vec<ObjectId> {
        match &self.data {
            ValueData::Object(Some(id)) => vec![*id],
            ValueData::Object(None) => Vec::new(),
            ValueData::ObjectList(ids) => ids.clone(),
            _ => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.data {
            ValueData::Scalar(s) => s.is_none(),
            ValueData::ScalarList(items) => items.is_empty(),
            ValueData::Object(o) => o.is_none(),
            ValueData::ObjectList(items) => items.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integer_scalar_rejects_fractional_json() {
        assert!(Scalar::from_json(AttributeType::Integer, &json!(5)).is_some());
        assert!(Scalar::from_json(AttributeType::Integer, &json!(5.5)).is_none());
        assert!(Scalar::from_json(AttributeType::Integer, &json!("5")).is_none());
    }

    #[test]
    fn number_scalar_accepts_integers() {
        assert_eq!(Scalar::from_json(AttributeType::Number, &json!(5)), Some(Scalar::Number(5.0)));
    }

    #[test]
    fn date_scalar_round_trips() {
        let scalar = Scalar::from_json(AttributeType::Date, &json!("2024-02-29")).unwrap();
        assert_eq!(scalar.to_json(), json!("2024-02-29"));
        assert!(Scalar::from_json(AttributeType::Date, &json!("2023-02-29")).is_none());
    }
}
