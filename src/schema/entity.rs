use serde::{Deserialize, Serialize};

use crate::schema::attribute::Attribute;

fn default_max_depth() -> usize {
    3
}

/// Authentication for an external source.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum SourceAuth {
    #[default]
    None,
    ApiKey {
        header: String,
        key: String,
    },
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        password: String,
    },
}

/// A remote HTTP source that instances of an entity are mirrored toward.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSource {
    /// Base location of the remote API, without a trailing slash.
    pub location: String,
    #[serde(default)]
    pub auth: SourceAuth,
}

impl ExternalSource {
    pub fn new(location: impl Into<String>) -> Self {
        Self { location: location.into(), auth: SourceAuth::None }
    }

    /// Collection URL new instances are POSTed to.
    pub fn collection_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.location.trim_end_matches('/'), endpoint.trim_matches('/'))
    }
}

/// A runtime-defined object schema.
///
/// Attribute names are unique within the entity; [`Entity::attribute`] is the
/// lookup the rest of the engine relies on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub name: String,
    /// External schema identity, for import/export.
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Route this entity is served under, used as a fallback lookup key.
    #[serde(default)]
    pub route: Option<String>,
    pub attributes: Vec<Attribute>,
    /// Recursion bound when rendering nested objects; the cycle guard.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Remote source instances are synchronized toward, if any.
    #[serde(default)]
    pub source: Option<ExternalSource>,
    /// Collection endpoint on the source, relative to its location.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Entity {
    pub fn new(name: impl Into<String>, attributes: Vec<Attribute>) -> Self {
        Self {
            name: name.into(),
            reference: None,
            version: None,
            route: None,
            attributes,
            max_depth: default_max_depth(),
            source: None,
            endpoint: None,
        }
    }

    pub fn with_source(mut self, source: ExternalSource, endpoint: impl Into<String>) -> Self {
        self.source = Some(source);
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Attribute names must be unique; checked at registration time.
    pub fn check_attribute_names(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for attribute in &self.attributes {
            if !seen.insert(attribute.name.as_str()) {
                return Err(format!(
                    "entity '{}' declares attribute '{}' more than once",
                    self.name, attribute.name
                ));
            }
        }
        Ok(())
    }
}
