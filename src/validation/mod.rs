//! Schema-driven validation: walks a runtime-defined entity and a raw JSON
//! payload, populating an object graph and collecting per-attribute errors.
//!
//! Malformed data never aborts processing or raises an error; it is recorded
//! on the object it belongs to. `Err` returns are reserved for programmer
//! and configuration problems (unknown target entities and the like).

use serde_json::{Map, Value as Json};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::error::GatewayError;
use crate::graph::{ObjectArena, ObjectEntity, ObjectId, Scalar, ValueData};
use crate::schema::attribute::{Attribute, AttributeType};
use crate::schema::registry::SchemaStore;

pub struct Validator<'a> {
    schemas: &'a dyn SchemaStore,
}

impl<'a> Validator<'a> {
    pub fn new(schemas: &'a dyn SchemaStore) -> Self {
        Self { schemas }
    }

    /// Validate `payload` against the schema of `object`, updating the
    /// object's values in place and recording errors on the graph.
    ///
    /// Recursion into nested objects is bounded by the root entity's
    /// `max_depth`, so validation terminates even when object attributes
    /// form a schema-level cycle.
    pub fn validate(
        &self,
        arena: &mut ObjectArena,
        object: ObjectId,
        payload: &Map<String, Json>,
    ) -> Result<(), GatewayError> {
        let entity = self.schemas.entity(&arena.get(object).entity)?;
        self.validate_object(arena, object, payload, entity.max_depth)
    }

    fn validate_object(
        &self,
        arena: &mut ObjectArena,
        object: ObjectId,
        payload: &Map<String, Json>,
        depth_left: usize,
    ) -> Result<(), GatewayError> {
        let entity = self.schemas.entity(&arena.get(object).entity)?;

        // Strictly in attribute declaration order: fallback semantics and
        // error ordering depend on it.
        for attribute in &entity.attributes {
            if let Some(value) = payload.get(&attribute.name) {
                self.validate_attribute(arena, object, attribute, value, depth_left)?;
            } else if let Some(default) = attribute.default_value.clone() {
                // Defaults go through the same checks as payload input, so a
                // misconfigured default fails loud instead of persisting
                self.validate_attribute(arena, object, attribute, &default, depth_left)?;
            } else if attribute.nullable {
                arena.get_mut(object).value_mut(attribute).set_null(attribute);
            } else if attribute.required {
                arena.get_mut(object).add_error(attribute.name.as_str(), "this attribute is required");
            } else {
                // Clear semantics: an omitted optional field becomes null
                // rather than silently keeping a stale value (PUT behavior)
                arena.get_mut(object).value_mut(attribute).set_null(attribute);
            }
        }

        // This is the point where we know whether an outbound call is needed
        let has_source = entity.source.is_some();
        let obj = arena.get_mut(object);
        if !obj.has_errors() && has_source {
            obj.pending_sync = true;
            tracing::debug!("object {} of '{}' marked for synchronization", obj.id, obj.entity);
        }

        Ok(())
    }

    fn validate_attribute(
        &self,
        arena: &mut ObjectArena,
        object: ObjectId,
        attribute: &Attribute,
        value: &Json,
        depth_left: usize,
    ) -> Result<(), GatewayError> {
        // An explicit null clears the value, same as omission, except for a
        // required attribute that is not nullable
        if value.is_null() {
            if attribute.nullable || !attribute.required {
                arena.get_mut(object).value_mut(attribute).set_null(attribute);
            } else {
                arena
                    .get_mut(object)
                    .add_error(attribute.name.as_str(), format!("Expects {}, null given.", attribute.ty));
            }
            return Ok(());
        }

        if attribute.multiple {
            self.validate_multiple(arena, object, attribute, value, depth_left)
        } else if attribute.ty == AttributeType::Object {
            self.validate_single_object(arena, object, attribute, value, depth_left)
        } else {
            let before = arena.get(object).error_count(&attribute.name);

            for message in scalar_errors(attribute, value) {
                arena.get_mut(object).add_error(attribute.name.as_str(), message);
            }
            for message in format_errors(attribute, value) {
                arena.get_mut(object).add_error(attribute.name.as_str(), message);
            }

            // Assign only when this attribute's own checks all passed
            if arena.get(object).error_count(&attribute.name) == before {
                if let Some(scalar) = Scalar::from_json(attribute.ty, value) {
                    arena.get_mut(object).value_mut(attribute).data = ValueData::Scalar(Some(scalar));
                }
            }
            Ok(())
        }
    }

    fn validate_single_object(
        &self,
        arena: &mut ObjectArena,
        object: ObjectId,
        attribute: &Attribute,
        value: &Json,
        depth_left: usize,
    ) -> Result<(), GatewayError> {
        let Some(map) = value.as_object() else {
            arena.get_mut(object).add_error(
                attribute.name.as_str(),
                format!("Expects object, {} given.", json_type_name(value)),
            );
            return Ok(());
        };

        if depth_left == 0 {
            arena
                .get_mut(object)
                .add_error(attribute.name.as_str(), "Maximum nesting depth exceeded.");
            return Ok(());
        }

        // Reuse the already attached child when updating, create otherwise
        let existing = match arena.get(object).value(&attribute.name).map(|v| &v.data) {
            Some(ValueData::Object(Some(child))) => Some(*child),
            _ => None,
        };
        let child = match existing {
            Some(child) => child,
            None => self.create_child(arena, object, attribute)?,
        };

        self.validate_object(arena, child, map, depth_left - 1)?;

        // Attach only when the nested validation produced no errors; an
        // erroring child stays in the arena so its errors surface by path
        if !arena.get(child).has_errors() {
            arena.get_mut(object).value_mut(attribute).data = ValueData::Object(Some(child));
        }

        Ok(())
    }

    fn validate_multiple(
        &self,
        arena: &mut ObjectArena,
        object: ObjectId,
        attribute: &Attribute,
        value: &Json,
        depth_left: usize,
    ) -> Result<(), GatewayError> {
        let Some(items) = value.as_array() else {
            arena.get_mut(object).add_error(
                attribute.name.as_str(),
                format!(
                    "Expects an array of {}, {} given. (Multiple is set for this attribute)",
                    attribute.ty,
                    json_type_name(value)
                ),
            );
            return Ok(());
        };

        let before = arena.get(object).error_count(&attribute.name);

        if let Some(min) = attribute.min_items {
            if items.len() < min {
                arena.get_mut(object).add_error(
                    attribute.name.as_str(),
                    format!("The minimum array length of this attribute is {min}."),
                );
            }
        }
        if let Some(max) = attribute.max_items {
            if items.len() > max {
                arena.get_mut(object).add_error(
                    attribute.name.as_str(),
                    format!("The maximum array length of this attribute is {max}."),
                );
            }
        }
        // Arrays of associative records are exempt: structural equality over
        // records is not defined
        if attribute.unique_items && !items.iter().any(|item| item.is_object()) {
            let mut seen = std::collections::HashSet::new();
            let duplicated = items
                .iter()
                .any(|item| !seen.insert(serde_json::to_string(item).unwrap_or_default()));
            if duplicated {
                arena
                    .get_mut(object)
                    .add_error(attribute.name.as_str(), "Must be an array of unique items.");
            }
        }

        if attribute.ty == AttributeType::Object {
            self.validate_object_elements(arena, object, attribute, items, depth_left)?;
        } else {
            // Element-wise scalar validation; constraint errors aggregate,
            // they do not short-circuit the loop
            let mut scalars = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                if item.is_null() {
                    arena.get_mut(object).add_error(
                        attribute.name.as_str(),
                        format!("Item {index}: Expects {}, null given.", attribute.ty),
                    );
                    continue;
                }
                let mut messages = scalar_errors(attribute, item);
                messages.extend(format_errors(attribute, item));
                if messages.is_empty() {
                    if let Some(scalar) = Scalar::from_json(attribute.ty, item) {
                        scalars.push(scalar);
                    }
                } else {
                    for message in messages {
                        arena
                            .get_mut(object)
                            .add_error(attribute.name.as_str(), format!("Item {index}: {message}"));
                    }
                }
            }
            if arena.get(object).error_count(&attribute.name) == before {
                arena.get_mut(object).value_mut(attribute).data = ValueData::ScalarList(scalars);
            }
        }

        Ok(())
    }

    fn validate_object_elements(
        &self,
        arena: &mut ObjectArena,
        object: ObjectId,
        attribute: &Attribute,
        items: &[Json],
        depth_left: usize,
    ) -> Result<(), GatewayError> {
        // Children attached by a previous validation pass, available for
        // reuse when an element carries a matching id
        let previous: Vec<ObjectId> = match arena.get(object).value(&attribute.name).map(|v| &v.data)
        {
            Some(ValueData::ObjectList(children)) => children.clone(),
            _ => Vec::new(),
        };

        let mut attached = Vec::new();
        for (index, item) in items.iter().enumerate() {
            let Some(map) = item.as_object() else {
                arena.get_mut(object).add_error(
                    attribute.name.as_str(),
                    format!(
                        "Item {index}: Multiple is set for this attribute. Expecting an array of objects."
                    ),
                );
                continue;
            };

            if depth_left == 0 {
                arena
                    .get_mut(object)
                    .add_error(attribute.name.as_str(), "Maximum nesting depth exceeded.");
                break;
            }

            let reused = map
                .get("id")
                .and_then(|id| id.as_str())
                .and_then(|id| Uuid::parse_str(id).ok())
                .and_then(|uuid| previous.iter().copied().find(|c| arena.get(*c).id == uuid));
            let child = match reused {
                Some(child) => child,
                None => self.create_child(arena, object, attribute)?,
            };

            self.validate_object(arena, child, map, depth_left - 1)?;

            // Clean children are appended in input order
            if !arena.get(child).has_errors() {
                attached.push(child);
            }
        }

        arena.get_mut(object).value_mut(attribute).data = ValueData::ObjectList(attached);
        Ok(())
    }

    /// Create a nested object for an object-typed attribute. The child gets
    /// its identifier immediately so a URI can be composed for it before
    /// anything is written to the store.
    fn create_child(
        &self,
        arena: &mut ObjectArena,
        parent: ObjectId,
        attribute: &Attribute,
    ) -> Result<ObjectId, GatewayError> {
        let target = attribute.target_entity.as_deref().ok_or_else(|| {
            GatewayError::MissingTargetEntity { attribute: attribute.name.clone() }
        })?;
        let entity = self.schemas.entity(target).map_err(|_| GatewayError::UnknownTargetEntity {
            attribute: attribute.name.clone(),
            target: target.to_string(),
        })?;

        let (organization, application) = {
            let parent = arena.get(parent);
            (parent.organization.clone(), parent.application)
        };
        let ctx = RequestContext { organization, application, owner: None };
        let mut child = ObjectEntity::new(entity.name.clone(), &ctx);
        child.subresource_of = Some((parent, attribute.name.clone()));
        Ok(arena.insert(child))
    }
}

/// Type and constraint errors for a scalar attribute value. Pure so array
/// elements and single values share one code path.
fn scalar_errors(attribute: &Attribute, value: &Json) -> Vec<String> {
    let mut errors = Vec::new();
    match attribute.ty {
        AttributeType::String => match value.as_str() {
            None => errors.push(format!("Expects string, {} given.", json_type_name(value))),
            Some(s) => {
                let length = s.chars().count();
                if let Some(min) = attribute.min_length {
                    if length < min {
                        errors.push(format!("Is too short, minimum length is {min}."));
                    }
                }
                if let Some(max) = attribute.max_length {
                    if length > max {
                        errors.push(format!("Is too long, maximum length is {max}."));
                    }
                }
            }
        },
        AttributeType::Number => match value.as_f64() {
            None => errors.push(format!("Expects number, {} given.", json_type_name(value))),
            Some(n) => numeric_errors(attribute, n, &mut errors),
        },
        AttributeType::Integer => match value.as_i64() {
            // Non-integral JSON numbers are rejected, not rounded
            None => errors.push(format!("Expects integer, {} given.", json_type_name(value))),
            Some(i) => numeric_errors(attribute, i as f64, &mut errors),
        },
        AttributeType::Boolean => {
            if !value.is_boolean() {
                errors.push(format!("Expects boolean, {} given.", json_type_name(value)));
            }
        }
        AttributeType::Date => match value.as_str() {
            None => errors.push(format!("Expects date, {} given.", json_type_name(value))),
            Some(s) => {
                if chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_err() {
                    errors.push("Expects date, failed to parse as a calendar date.".to_string());
                }
            }
        },
        AttributeType::DateTime => match value.as_str() {
            None => errors.push(format!("Expects datetime, {} given.", json_type_name(value))),
            Some(s) => {
                if chrono::DateTime::parse_from_rfc3339(s).is_err() {
                    errors.push("Expects datetime, failed to parse as a timestamp.".to_string());
                }
            }
        },
        // Object values never reach the scalar path; dispatch handles them
        AttributeType::Object => {}
    }
    errors
}

fn numeric_errors(attribute: &Attribute, value: f64, errors: &mut Vec<String>) {
    if let Some(minimum) = attribute.minimum {
        if attribute.exclusive_minimum && value <= minimum {
            errors.push(format!("Must be higher than {minimum}."));
        } else if !attribute.exclusive_minimum && value < minimum {
            errors.push(format!("Must be {minimum} or higher."));
        }
    }
    if let Some(maximum) = attribute.maximum {
        if attribute.exclusive_maximum && value >= maximum {
            errors.push(format!("Must be lower than {maximum}."));
        } else if !attribute.exclusive_maximum && value > maximum {
            errors.push(format!("Must be {maximum} or lower."));
        }
    }
    if let Some(step) = attribute.multiple_of {
        if step != 0.0 && value % step != 0.0 {
            errors.push(format!("Must be a multiple of {step}."));
        }
    }
}

/// Format checks run after type checks and only apply to string values; a
/// format this engine does not know is itself an error, never a silent pass.
fn format_errors(attribute: &Attribute, value: &Json) -> Vec<String> {
    let Some(format) = attribute.format.as_deref() else {
        return Vec::new();
    };
    let Some(s) = value.as_str() else {
        return Vec::new();
    };
    match format {
        "email" => {
            let valid = matches!(
                s.split_once('@'),
                Some((local, domain)) if !local.is_empty() && domain.contains('.')
            );
            if valid {
                Vec::new()
            } else {
                vec!["Is not a valid email.".to_string()]
            }
        }
        "uuid" => {
            if Uuid::parse_str(s).is_ok() {
                Vec::new()
            } else {
                vec!["Is not a valid uuid.".to_string()]
            }
        }
        "url" => {
            if url::Url::parse(s).is_ok() {
                Vec::new()
            } else {
                vec!["Is not a valid url.".to_string()]
            }
        }
        unknown => vec![format!("has an unknown format: [{unknown}]")],
    }
}

fn json_type_name(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
