use serde_json::Value as Json;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::graph::arena::ObjectId;
use crate::graph::value::Value;
use crate::schema::attribute::Attribute;

/// One instance of a runtime-defined entity, living inside an
/// [`ObjectArena`](crate::graph::ObjectArena) for the duration of a request.
///
/// The id is generated at creation so nested objects carry an identifier
/// before any URI exists or anything is written to the store.
#[derive(Debug, Clone)]
pub struct ObjectEntity {
    pub id: Uuid,
    /// Owning schema name; immutable after creation.
    pub entity: String,
    /// External URI, set once a synchronization succeeds.
    pub uri: Option<String>,
    /// Identifier assigned by the external source, if any.
    pub external_id: Option<String>,
    pub organization: Option<String>,
    pub application: Option<Uuid>,
    values: Vec<Value>,
    /// Errors keyed by attribute, in the order they were first recorded.
    /// The validator walks attributes in declaration order, so error bodies
    /// come out in declaration order too.
    errors: Vec<(String, Vec<String>)>,
    /// Raw external response cached on the object, merged into render output
    /// as mirror data.
    pub external_result: Option<Json>,
    /// Back-reference to the parent value owning this object when it is a
    /// nested subresource: `(parent object, attribute name)`. Traversal
    /// only, never lifetime.
    pub subresource_of: Option<(ObjectId, String)>,
    /// Set by the validator when this object needs an outbound
    /// synchronization call; cleared once the task settles.
    pub pending_sync: bool,
    /// Whether this object was loaded from the store (update) rather than
    /// created for this request.
    pub persisted: bool,
}

impl ObjectEntity {
    pub fn new(entity: impl Into<String>, ctx: &RequestContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity: entity.into(),
            uri: None,
            external_id: None,
            organization: ctx.organization.clone(),
            application: ctx.application,
            values: Vec::new(),
            errors: Vec::new(),
            external_result: None,
            subresource_of: None,
            pending_sync: false,
            persisted: false,
        }
    }

    /// Self-link for this object under the gateway's own API.
    pub fn self_uri(&self, base_url: &str, object_path: &str) -> String {
        format!(
            "{}{}/{}/{}",
            base_url.trim_end_matches('/'),
            object_path,
            self.entity,
            self.id
        )
    }

    /// The URI the synchronizer publishes for this object: the external one
    /// when known, the local self-link otherwise.
    pub fn resolved_uri(&self, base_url: &str, object_path: &str) -> String {
        self.uri.clone().unwrap_or_else(|| self.self_uri(base_url, object_path))
    }

    pub fn value(&self, attribute: &str) -> Option<&Value> {
        self.values.iter().find(|v| v.attribute == attribute)
    }

    /// Value holder for an attribute, created empty on first access.
    pub fn value_mut(&mut self, attribute: &Attribute) -> &mut Value {
        if let Some(index) = self.values.iter().position(|v| v.attribute == attribute.name) {
            &mut self.values[index]
        } else {
            self.values.push(Value::empty(attribute));
            self.values.last_mut().expect("value just pushed")
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn push_value(&mut self, value: Value) {
        self.values.push(value);
    }

    pub fn add_error(&mut self, attribute: impl Into<String>, message: impl Into<String>) {
        let attribute = attribute.into();
        match self.errors.iter_mut().find(|(name, _)| *name == attribute) {
            Some((_, messages)) => messages.push(message.into()),
            None => self.errors.push((attribute, vec![message.into()])),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[(String, Vec<String>)] {
        &self.errors
    }

    /// Number of errors recorded for one attribute. The validator compares
    /// this before and after a check to decide whether a value may be set.
    pub fn error_count(&self, attribute: &str) -> usize {
        self.errors
            .iter()
            .find(|(name, _)| name == attribute)
            .map(|(_, messages)| messages.len())
            .unwrap_or(0)
    }
}
