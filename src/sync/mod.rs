//! Synchronization of validated objects toward their external sources.
//!
//! Ordering rule: an object's attached subresources settle before its own
//! payload is built, so child URIs can be substituted into the parent body.
//! Independent objects at the same depth go out concurrently. A failed or
//! timed-out call marks that object with an error and lets the rest of the
//! batch continue.

pub mod cache;
pub mod client;

use std::collections::HashSet;

use serde_json::{Map, Value as Json};

use crate::config::config;
use crate::error::GatewayError;
use crate::graph::{ObjectArena, ObjectId, ValueData};
use crate::schema::entity::Entity;
use crate::schema::registry::SchemaStore;

pub use cache::{mirror_key, MemoryMirrorCache, MirrorCache};
pub use client::{HttpSourceClient, SourceCall, SourceClient, SourceMethod, SourceOutcome};

/// Error key under which source-reported failures are collected on an
/// object, alongside regular attribute names.
pub const EXTERNAL_ERROR_KEY: &str = "external source said";

pub struct Synchronizer<'a> {
    schemas: &'a dyn SchemaStore,
    client: &'a dyn SourceClient,
    cache: &'a dyn MirrorCache,
    base_url: String,
    object_path: String,
}

impl<'a> Synchronizer<'a> {
    pub fn new(
        schemas: &'a dyn SchemaStore,
        client: &'a dyn SourceClient,
        cache: &'a dyn MirrorCache,
    ) -> Self {
        let gateway = &config().gateway;
        Self::with_gateway(schemas, client, cache, &gateway.base_url, &gateway.object_path)
    }

    pub fn with_gateway(
        schemas: &'a dyn SchemaStore,
        client: &'a dyn SourceClient,
        cache: &'a dyn MirrorCache,
        base_url: &str,
        object_path: &str,
    ) -> Self {
        Self {
            schemas,
            client,
            cache,
            base_url: base_url.to_string(),
            object_path: object_path.to_string(),
        }
    }

    /// Synchronize every object in the batch marked `pending_sync`.
    ///
    /// Works in waves: each wave takes the pending objects whose attached
    /// children have all settled, sends their calls concurrently, then
    /// applies the outcomes. A parent whose child failed still goes out; the
    /// child's reference falls back to its local self-link.
    pub async fn synchronize(&self, arena: &mut ObjectArena) -> Result<(), GatewayError> {
        let mut pending: HashSet<ObjectId> =
            arena.ids().filter(|id| arena.get(*id).pending_sync).collect();

        while !pending.is_empty() {
            let ready: Vec<ObjectId> = pending
                .iter()
                .copied()
                .filter(|id| arena.children_of(*id).iter().all(|child| !pending.contains(child)))
                .collect();

            if ready.is_empty() {
                // Objects attached in a cycle cannot be ordered; fail them
                // instead of spinning
                for id in pending.drain() {
                    let object = arena.get_mut(id);
                    object.pending_sync = false;
                    object.add_error(
                        EXTERNAL_ERROR_KEY,
                        "synchronization order could not be resolved for this object",
                    );
                }
                break;
            }

            let mut calls = Vec::with_capacity(ready.len());
            for id in &ready {
                calls.push((*id, self.build_call(arena, *id)?));
            }

            // Calls own their data, so the arena is free while they run
            let outcomes = futures::future::join_all(calls.into_iter().map(|(id, call)| async move {
                (id, self.client.call(call).await)
            }))
            .await;

            for (id, outcome) in outcomes {
                self.apply_outcome(arena, id, outcome)?;
                pending.remove(&id);
            }
        }

        Ok(())
    }

    /// Best-effort DELETE on the source for an object that is being removed
    /// locally. Failures are logged, never propagated: local deletion wins.
    pub async fn delete_remote(
        &self,
        arena: &ObjectArena,
        id: ObjectId,
    ) -> Result<(), GatewayError> {
        let object = arena.get(id);
        let Some(uri) = object.uri.clone() else { return Ok(()) };
        let entity = self.schemas.entity(&object.entity)?;
        let Some(source) = &entity.source else { return Ok(()) };

        let outcome = self
            .client
            .call(SourceCall {
                method: SourceMethod::Delete,
                url: uri.clone(),
                auth: source.auth.clone(),
                body: None,
            })
            .await;
        if let SourceOutcome::Failure { status, message } = outcome {
            tracing::warn!(
                "external delete of {} failed (status {:?}): {}",
                uri,
                status,
                message
            );
        }
        self.cache.remove(&uri);
        Ok(())
    }

    fn build_call(&self, arena: &ObjectArena, id: ObjectId) -> Result<SourceCall, GatewayError> {
        let object = arena.get(id);
        let entity = self.schemas.entity(&object.entity)?;
        let source = entity
            .source
            .as_ref()
            .ok_or_else(|| GatewayError::MissingSource { entity: entity.name.clone() })?;

        let body = self.build_payload(arena, id, &entity);
        // Known external URI means the source already has this object
        let (method, url) = match &object.uri {
            Some(uri) => (SourceMethod::Put, uri.clone()),
            None => (
                SourceMethod::Post,
                source.collection_url(entity.endpoint.as_deref().unwrap_or(&entity.name)),
            ),
        };
        Ok(SourceCall { method, url, auth: source.auth.clone(), body: Some(body) })
    }

    /// The outbound body: exposed attributes only, with nested objects
    /// replaced by their URIs (external where known, local self-link as the
    /// fallback).
    fn build_payload(&self, arena: &ObjectArena, id: ObjectId, entity: &Entity) -> Json {
        let object = arena.get(id);
        let mut payload = Map::new();
        for attribute in &entity.attributes {
            if !attribute.expose_to_source {
                continue;
            }
            let Some(value) = object.value(&attribute.name) else { continue };
            let json = match &value.data {
                ValueData::Scalar(None) | ValueData::Object(None) => Json::Null,
                ValueData::Scalar(Some(scalar)) => scalar.to_json(),
                ValueData::ScalarList(items) => {
                    Json::Array(items.iter().map(|s| s.to_json()).collect())
                }
                ValueData::Object(Some(child)) => Json::String(
                    arena.get(*child).resolved_uri(&self.base_url, &self.object_path),
                ),
                ValueData::ObjectList(children) => Json::Array(
                    children
                        .iter()
                        .map(|child| {
                            Json::String(
                                arena
                                    .get(*child)
                                    .resolved_uri(&self.base_url, &self.object_path),
                            )
                        })
                        .collect(),
                ),
            };
            payload.insert(attribute.name.clone(), json);
        }
        Json::Object(payload)
    }

    fn apply_outcome(
        &self,
        arena: &mut ObjectArena,
        id: ObjectId,
        outcome: SourceOutcome,
    ) -> Result<(), GatewayError> {
        let entity = self.schemas.entity(&arena.get(id).entity)?;
        match outcome {
            SourceOutcome::Success { status, body } => {
                let collection = entity.source.as_ref().map(|source| {
                    source.collection_url(entity.endpoint.as_deref().unwrap_or(&entity.name))
                });
                let object = arena.get_mut(id);
                object.pending_sync = false;
                if object.uri.is_none() {
                    if let (Some(collection), Some(external_id)) =
                        (collection, body.get("id").and_then(json_id_string))
                    {
                        object.uri = Some(format!("{collection}/{external_id}"));
                        object.external_id = Some(external_id);
                    }
                }
                object.external_result = Some(body.clone());
                if let Some(uri) = object.uri.clone() {
                    self.cache.put(&uri, &body);
                }
                tracing::info!(
                    "synchronized object {} of '{}' (status {})",
                    arena.get(id).id,
                    entity.name,
                    status
                );
            }
            SourceOutcome::Failure { status, message } => {
                let object = arena.get_mut(id);
                object.pending_sync = false;
                object.add_error(
                    EXTERNAL_ERROR_KEY,
                    format!("entity '{}': {}", entity.name, message),
                );
                tracing::warn!(
                    "synchronization of object {} of '{}' failed (status {:?}): {}",
                    arena.get(id).id,
                    entity.name,
                    status,
                    message
                );
            }
        }
        Ok(())
    }
}

/// External ids come back as strings or numbers depending on the source.
fn json_id_string(value: &Json) -> Option<String> {
    match value {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
