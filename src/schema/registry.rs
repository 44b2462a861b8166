use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::GatewayError;
use crate::schema::entity::Entity;

/// Schema lookup interface consumed by the validator, renderer and
/// synchronizer. The admin layer that authors schemas lives elsewhere; this
/// engine only reads them.
pub trait SchemaStore: Send + Sync {
    /// Look up an entity by name, falling back to its route.
    fn entity(&self, name: &str) -> Result<Arc<Entity>, GatewayError>;

    fn entity_names(&self) -> Vec<String>;
}

/// In-memory schema repository keyed by entity name.
#[derive(Default)]
pub struct SchemaRegistry {
    entities: RwLock<HashMap<String, Arc<Entity>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity, replacing any previous definition with the same
    /// name. Duplicate attribute names are rejected here so the validator
    /// never sees an ill-formed schema.
    pub fn register(&self, entity: Entity) -> Result<(), GatewayError> {
        entity.check_attribute_names().map_err(GatewayError::InvalidSchema)?;

        // Nested targets must resolve by the time validation runs, but
        // registration order is the author's business; only self-evident
        // problems are rejected here.
        let mut entities = self.entities.write().expect("schema registry lock poisoned");
        tracing::debug!("registered entity '{}'", entity.name);
        entities.insert(entity.name.clone(), Arc::new(entity));
        Ok(())
    }

    pub fn register_all(
        &self,
        entities: impl IntoIterator<Item = Entity>,
    ) -> Result<(), GatewayError> {
        for entity in entities {
            self.register(entity)?;
        }
        Ok(())
    }
}

impl SchemaStore for SchemaRegistry {
    fn entity(&self, name: &str) -> Result<Arc<Entity>, GatewayError> {
        let entities = self.entities.read().expect("schema registry lock poisoned");
        if let Some(entity) = entities.get(name) {
            return Ok(entity.clone());
        }
        // Fall back to route lookup, mirroring how entities are addressed
        // when requests come in on a configured route.
        let route = format!("/api/{name}");
        entities
            .values()
            .find(|entity| entity.route.as_deref() == Some(route.as_str()))
            .cloned()
            .ok_or_else(|| GatewayError::UnknownEntity(name.to_string()))
    }

    fn entity_names(&self) -> Vec<String> {
        let entities = self.entities.read().expect("schema registry lock poisoned");
        entities.keys().cloned().collect()
    }
}
