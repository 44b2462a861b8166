//! Rendering a stored object graph back into JSON.
//!
//! Rendering is read-only: it merges the cached external response (mirror
//! data) with locally stored values, bounded by the entity's `max_depth` so
//! cyclic graphs terminate. Local values always win over mirror data, and
//! identity keys win over everything.

use std::collections::HashSet;

use serde_json::{Map, Value as Json};

use crate::config::config;
use crate::error::GatewayError;
use crate::graph::{ObjectArena, ObjectId, ValueData};
use crate::schema::registry::SchemaStore;

pub struct Renderer<'a> {
    schemas: &'a dyn SchemaStore,
    base_url: String,
    object_path: String,
}

impl<'a> Renderer<'a> {
    pub fn new(schemas: &'a dyn SchemaStore) -> Self {
        let gateway = &config().gateway;
        Self::with_gateway(schemas, &gateway.base_url, &gateway.object_path)
    }

    /// Constructor with an explicit gateway address, for callers that do not
    /// want the process-wide configuration.
    pub fn with_gateway(schemas: &'a dyn SchemaStore, base_url: &str, object_path: &str) -> Self {
        Self {
            schemas,
            base_url: base_url.to_string(),
            object_path: object_path.to_string(),
        }
    }

    /// Render one object and its reachable subresources as a JSON record.
    pub fn render(
        &self,
        arena: &ObjectArena,
        object: ObjectId,
    ) -> Result<Map<String, Json>, GatewayError> {
        let entity = self.schemas.entity(&arena.get(object).entity)?;
        self.render_object(arena, object, entity.max_depth, None)
    }

    /// Like [`render`](Self::render) but only including the named top-level
    /// attributes. Identity keys are always present; subresources below the
    /// selected attributes render in full.
    pub fn render_selected(
        &self,
        arena: &ObjectArena,
        object: ObjectId,
        fields: &HashSet<String>,
    ) -> Result<Map<String, Json>, GatewayError> {
        let entity = self.schemas.entity(&arena.get(object).entity)?;
        self.render_object(arena, object, entity.max_depth, Some(fields))
    }

    fn render_object(
        &self,
        arena: &ObjectArena,
        id: ObjectId,
        depth_left: usize,
        fields: Option<&HashSet<String>>,
    ) -> Result<Map<String, Json>, GatewayError> {
        let object = arena.get(id);
        let entity = self.schemas.entity(&object.entity)?;
        let mut out = Map::new();

        // Mirror data goes in first. Keys that would collide with the
        // gateway's own identity keys are moved aside instead of dropped.
        if let Some(Json::Object(external)) = &object.external_result {
            for (key, value) in external {
                let key = match key.as_str() {
                    "id" => "_id",
                    "@id" => "_self",
                    "@type" => "_type",
                    "@context" => "_context",
                    other => other,
                };
                out.insert(key.to_string(), value.clone());
            }
        }

        // Locally stored values override whatever the mirror reported
        for attribute in &entity.attributes {
            if let Some(fields) = fields {
                if !fields.contains(&attribute.name) {
                    continue;
                }
            }
            let Some(value) = object.value(&attribute.name) else { continue };
            let rendered = match &value.data {
                ValueData::Scalar(None) => Json::Null,
                ValueData::Scalar(Some(scalar)) => scalar.to_json(),
                ValueData::ScalarList(items) => {
                    Json::Array(items.iter().map(|s| s.to_json()).collect())
                }
                ValueData::Object(None) => Json::Null,
                ValueData::Object(Some(child)) => {
                    self.render_child(arena, *child, depth_left)?
                }
                ValueData::ObjectList(children) => Json::Array(
                    children
                        .iter()
                        .map(|child| self.render_child(arena, *child, depth_left))
                        .collect::<Result<Vec<_>, _>>()?,
                ),
            };
            out.insert(attribute.name.clone(), rendered);
        }

        // Identity keys are set last so nothing can shadow them
        out.insert("id".to_string(), Json::String(object.id.to_string()));
        out.insert(
            "@id".to_string(),
            Json::String(object.self_uri(&self.base_url, &self.object_path)),
        );
        out.insert("@type".to_string(), Json::String(entity.name.clone()));
        out.insert(
            "@context".to_string(),
            Json::String(
                entity
                    .reference
                    .clone()
                    .unwrap_or_else(|| format!("/contexts/{}", entity.name)),
            ),
        );

        Ok(out)
    }

    /// A nested object renders as a full record while depth remains, and as
    /// a URI reference once the depth is exhausted. That keeps output finite
    /// on cyclic graphs without losing the link.
    fn render_child(
        &self,
        arena: &ObjectArena,
        child: ObjectId,
        depth_left: usize,
    ) -> Result<Json, GatewayError> {
        if depth_left <= 1 {
            let uri = arena.get(child).resolved_uri(&self.base_url, &self.object_path);
            return Ok(Json::String(uri));
        }
        Ok(Json::Object(self.render_object(arena, child, depth_left - 1, None)?))
    }
}
