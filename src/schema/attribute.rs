use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of attribute types. Dispatch on this enum is exhaustive, so
/// adding a type forces the validator, renderer and sync payload builder to
/// be updated together. A type tag outside this set fails at schema
/// deserialization instead of surfacing mid-validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Number,
    Integer,
    Boolean,
    Date,
    DateTime,
    Object,
}

impl AttributeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeType::String => "string",
            AttributeType::Number => "number",
            AttributeType::Integer => "integer",
            AttributeType::Boolean => "boolean",
            AttributeType::Date => "date",
            AttributeType::DateTime => "datetime",
            AttributeType::Object => "object",
        }
    }
}

impl std::fmt::Display for AttributeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field definition within an [`Entity`](crate::schema::Entity).
///
/// Attributes are authored at runtime as JSON, so everything beyond `name`
/// and `type` is optional with defaults that make the attribute a plain,
/// single-valued, optional field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: AttributeType,
    /// Optional format refinement (email, uuid, url). Checked after the type
    /// check; a format this engine does not recognize is itself a validation
    /// error on the attribute, never a silent pass.
    #[serde(default)]
    pub format: Option<String>,

    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub nullable: bool,
    /// Array-valued. Orthogonal to `type`: array constraints apply whatever
    /// the element type, and `object` with `multiple` means a list of nested
    /// object graphs.
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub default_value: Option<Value>,

    // Numeric constraints
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    #[serde(default)]
    pub exclusive_minimum: bool,
    #[serde(default)]
    pub exclusive_maximum: bool,
    #[serde(default)]
    pub multiple_of: Option<f64>,

    // String constraints
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,

    // Array constraints
    #[serde(default)]
    pub min_items: Option<usize>,
    #[serde(default)]
    pub max_items: Option<usize>,
    #[serde(default)]
    pub unique_items: bool,

    // Object linkage
    #[serde(default)]
    pub target_entity: Option<String>,
    #[serde(default)]
    pub cascade_delete: bool,
    #[serde(default = "default_true")]
    pub may_be_orphaned: bool,

    /// Whether this attribute is included in outbound synchronization
    /// payloads. Attributes stored only locally set this to false.
    #[serde(default = "default_true")]
    pub expose_to_source: bool,
}

fn default_true() -> bool {
    true
}

impl Attribute {
    /// A plain optional attribute of the given type, for programmatic schema
    /// construction. Runtime-authored schemas deserialize instead.
    pub fn new(name: impl Into<String>, ty: AttributeType) -> Self {
        Self {
            name: name.into(),
            ty,
            format: None,
            required: false,
            nullable: false,
            multiple: false,
            default_value: None,
            minimum: None,
            maximum: None,
            exclusive_minimum: false,
            exclusive_maximum: false,
            multiple_of: None,
            min_length: None,
            max_length: None,
            min_items: None,
            max_items: None,
            unique_items: false,
            target_entity: None,
            cascade_delete: false,
            may_be_orphaned: true,
            expose_to_source: true,
        }
    }

    /// A nested-object attribute pointing at another entity.
    pub fn object(name: impl Into<String>, target_entity: impl Into<String>) -> Self {
        let mut attribute = Self::new(name, AttributeType::Object);
        attribute.target_entity = Some(target_entity.into());
        attribute
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn local_only(mut self) -> Self {
        self.expose_to_source = false;
        self
    }
}
