//! Persistence of object graphs.
//!
//! The arena is a request-scoped working set; what persists is a flat set of
//! records, one per object, with child references by id. Two backends
//! implement the same trait: an in-memory store for tests and a Postgres
//! store for deployments.

pub mod memory;
pub mod postgres;

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use serde_json::Value as Json;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::graph::{ObjectArena, ObjectEntity, ObjectId, Scalar, Value, ValueData};
use crate::schema::attribute::AttributeType;
use crate::schema::registry::SchemaStore;

pub use memory::MemoryObjectRepository;
pub use postgres::PgObjectRepository;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("object {0} not found")]
    NotFound(Uuid),

    #[error("repository configuration error: {0}")]
    Configuration(String),

    #[error("stored data could not be decoded: {0}")]
    Decode(String),
}

/// Persisted form of one value: a scalar (or scalar list) as JSON, or child
/// object references by id. Which half is meaningful follows from the
/// attribute's schema, exactly as it does in the arena.
#[derive(Debug, Clone)]
pub struct ValueRecord {
    pub attribute: String,
    pub scalar: Option<Json>,
    pub children: Vec<Uuid>,
}

/// Persisted form of one object.
#[derive(Debug, Clone)]
pub struct ObjectRecord {
    pub id: Uuid,
    pub entity: String,
    pub uri: Option<String>,
    pub external_id: Option<String>,
    pub organization: Option<String>,
    pub application: Option<Uuid>,
    /// Degraded-result marker: set when a synchronization failed after the
    /// object itself was committed.
    pub has_errors: bool,
    pub values: Vec<ValueRecord>,
}

#[async_trait]
pub trait ObjectRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ObjectRecord>, RepositoryError>;

    /// Lookup by the identifier the external source assigned, scoped to one
    /// entity. Used when callers address objects by external rather than
    /// gateway id.
    async fn find_by_external_id(
        &self,
        entity: &str,
        external_id: &str,
    ) -> Result<Option<ObjectRecord>, RepositoryError>;

    /// Every stored object of one entity, unfiltered. Backs collection
    /// retrieval; paging happens above this layer, on the rendered results.
    async fn find_by_entity(&self, entity: &str) -> Result<Vec<ObjectRecord>, RepositoryError>;

    /// Objects of one entity whose stored value for `attribute` equals the
    /// given JSON value.
    async fn find_by_attribute(
        &self,
        entity: &str,
        attribute: &str,
        value: &Json,
    ) -> Result<Vec<ObjectRecord>, RepositoryError>;

    /// Upsert a whole graph's records in one go. All-or-nothing where the
    /// backend can manage it.
    async fn save_graph(&self, records: &[ObjectRecord]) -> Result<(), RepositoryError>;

    /// Persist the outcome of a synchronization, without touching values.
    /// This runs after the object's own transaction committed; a sync
    /// failure is a follow-up update, never a rollback.
    async fn update_sync_state(
        &self,
        id: Uuid,
        uri: Option<&str>,
        external_id: Option<&str>,
        has_errors: bool,
    ) -> Result<(), RepositoryError>;

    async fn remove(&self, id: Uuid) -> Result<(), RepositoryError>;
}

/// Flatten the subgraph reachable from `root` (through attached values) into
/// records. Objects that failed validation are never attached, so they never
/// persist.
pub fn records_from_graph(arena: &ObjectArena, root: ObjectId) -> Vec<ObjectRecord> {
    let mut records = Vec::new();
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([root]);

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        let object = arena.get(id);
        let values = object
            .values()
            .iter()
            .map(|value| match &value.data {
                ValueData::Scalar(scalar) => ValueRecord {
                    attribute: value.attribute.clone(),
                    scalar: Some(scalar.as_ref().map(Scalar::to_json).unwrap_or(Json::Null)),
                    children: Vec::new(),
                },
                ValueData::ScalarList(items) => ValueRecord {
                    attribute: value.attribute.clone(),
                    scalar: Some(Json::Array(items.iter().map(Scalar::to_json).collect())),
                    children: Vec::new(),
                },
                ValueData::Object(child) => ValueRecord {
                    attribute: value.attribute.clone(),
                    scalar: None,
                    children: child.iter().map(|c| arena.get(*c).id).collect(),
                },
                ValueData::ObjectList(children) => ValueRecord {
                    attribute: value.attribute.clone(),
                    scalar: None,
                    children: children.iter().map(|c| arena.get(*c).id).collect(),
                },
            })
            .collect();
        records.push(ObjectRecord {
            id: object.id,
            entity: object.entity.clone(),
            uri: object.uri.clone(),
            external_id: object.external_id.clone(),
            organization: object.organization.clone(),
            application: object.application,
            has_errors: object.has_errors(),
            values,
        });
        queue.extend(arena.children_of(id));
    }

    records
}

/// Load the object graph rooted at `root` back into an arena, following
/// child references breadth-first. Values whose attribute has since been
/// removed from the schema are skipped; the graph loads with what the schema
/// still knows.
pub async fn load_graph(
    repository: &dyn ObjectRepository,
    schemas: &dyn SchemaStore,
    root: Uuid,
) -> Result<Option<(ObjectArena, ObjectId)>, GatewayError> {
    let Some(record) = repository.find_by_id(root).await? else {
        return Ok(None);
    };

    let mut arena = ObjectArena::new();
    let mut loaded: HashMap<Uuid, ObjectId> = HashMap::new();
    // Deferred child wiring: (parent, attribute, children, multiple)
    let mut links: Vec<(ObjectId, String, Vec<Uuid>, bool)> = Vec::new();
    let mut queue = VecDeque::from([record]);

    while let Some(record) = queue.pop_front() {
        if loaded.contains_key(&record.id) {
            continue;
        }
        let entity = schemas.entity(&record.entity)?;

        let ctx = crate::context::RequestContext {
            organization: record.organization.clone(),
            application: record.application,
            owner: None,
        };
        let mut object = ObjectEntity::new(record.entity.clone(), &ctx);
        object.id = record.id;
        object.uri = record.uri.clone();
        object.external_id = record.external_id.clone();
        object.persisted = true;
        let object_id = arena.insert(object);
        loaded.insert(record.id, object_id);

        for value in &record.values {
            let Some(attribute) = entity.attribute(&value.attribute) else { continue };
            if attribute.ty == AttributeType::Object {
                links.push((
                    object_id,
                    attribute.name.clone(),
                    value.children.clone(),
                    attribute.multiple,
                ));
                for child in &value.children {
                    if !loaded.contains_key(child) {
                        if let Some(child_record) = repository.find_by_id(*child).await? {
                            queue.push_back(child_record);
                        }
                        // A dangling reference loads as an absent child
                    }
                }
            } else {
                let data = decode_scalar(attribute.ty, attribute.multiple, value.scalar.as_ref());
                arena
                    .get_mut(object_id)
                    .push_value(Value { attribute: attribute.name.clone(), data });
            }
        }
    }

    for (parent, attribute, children, multiple) in links {
        let resolved: Vec<ObjectId> =
            children.iter().filter_map(|uuid| loaded.get(uuid).copied()).collect();
        for child in &resolved {
            let child_object = arena.get_mut(*child);
            if child_object.subresource_of.is_none() {
                child_object.subresource_of = Some((parent, attribute.clone()));
            }
        }
        let data = if multiple {
            ValueData::ObjectList(resolved)
        } else {
            ValueData::Object(resolved.first().copied())
        };
        arena.get_mut(parent).push_value(Value { attribute, data });
    }

    let root_id = loaded[&root];
    Ok(Some((arena, root_id)))
}

fn decode_scalar(ty: AttributeType, multiple: bool, stored: Option<&Json>) -> ValueData {
    match (multiple, stored) {
        (false, Some(json)) => ValueData::Scalar(Scalar::from_json(ty, json)),
        (false, None) => ValueData::Scalar(None),
        (true, Some(Json::Array(items))) => ValueData::ScalarList(
            items.iter().filter_map(|item| Scalar::from_json(ty, item)).collect(),
        ),
        (true, _) => ValueData::ScalarList(Vec::new()),
    }
}
