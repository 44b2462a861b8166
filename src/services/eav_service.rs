//! Request orchestration: resolve the target object, validate, persist,
//! synchronize, render. Each handler turns every failure into a structured
//! error body; callers always get a response, never a panic or a silent
//! partial success.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use serde_json::{json, Map, Value as Json};
use uuid::Uuid;

use crate::config::config;
use crate::context::RequestContext;
use crate::error::{ErrorBody, GatewayError};
use crate::graph::{ObjectArena, ObjectEntity, ObjectId};
use crate::render::Renderer;
use crate::repository::{
    load_graph, records_from_graph, ObjectRecord, ObjectRepository, RepositoryError,
};
use crate::schema::attribute::AttributeType;
use crate::schema::registry::SchemaStore;
use crate::sync::{MirrorCache, SourceClient, Synchronizer};
use crate::validation::Validator;

/// Transport-agnostic response: an HTTP-equivalent status and a JSON body.
/// The HTTP layer in front of this engine maps it one-to-one.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Json,
}

impl ApiResponse {
    pub fn ok(body: Json) -> Self {
        Self { status: 200, body }
    }

    pub fn created(body: Json) -> Self {
        Self { status: 201, body }
    }

    pub fn no_content() -> Self {
        Self { status: 204, body: Json::Null }
    }
}

impl From<ErrorBody> for ApiResponse {
    fn from(error: ErrorBody) -> Self {
        Self { status: error.status_code(), body: error.to_json() }
    }
}

pub struct EavService {
    schemas: Arc<dyn SchemaStore>,
    repository: Arc<dyn ObjectRepository>,
    client: Arc<dyn SourceClient>,
    cache: Arc<dyn MirrorCache>,
    base_url: String,
    object_path: String,
}

impl EavService {
    pub fn new(
        schemas: Arc<dyn SchemaStore>,
        repository: Arc<dyn ObjectRepository>,
        client: Arc<dyn SourceClient>,
        cache: Arc<dyn MirrorCache>,
    ) -> Self {
        let gateway = &config().gateway;
        let base_url = gateway.base_url.clone();
        let object_path = gateway.object_path.clone();
        Self { schemas, repository, client, cache, base_url, object_path }
    }

    /// Override the gateway address used for self-links, for callers that do
    /// not want the process-wide configuration.
    pub fn with_gateway(mut self, base_url: &str, object_path: &str) -> Self {
        self.base_url = base_url.to_string();
        self.object_path = object_path.to_string();
        self
    }

    /// Create or update an object of `entity_name` from a JSON payload.
    /// With an id this is an update (absent fields clear), without one a
    /// create. Ids may be gateway uuids or source-assigned external ids.
    pub async fn handle_mutation(
        &self,
        entity_name: &str,
        id: Option<&str>,
        payload: &Json,
        ctx: &RequestContext,
    ) -> ApiResponse {
        match self.mutate(entity_name, id, payload, ctx).await {
            Ok(response) => response,
            Err(err) => err.to_error_body(entity_name).into(),
        }
    }

    pub async fn handle_get(
        &self,
        entity_name: &str,
        id: &str,
        fields: Option<&HashSet<String>>,
    ) -> ApiResponse {
        match self.get(entity_name, id, fields).await {
            Ok(response) => response,
            Err(err) => err.to_error_body(entity_name).into(),
        }
    }

    pub async fn handle_delete(&self, entity_name: &str, id: &str) -> ApiResponse {
        match self.delete(entity_name, id).await {
            Ok(response) => response,
            Err(err) => err.to_error_body(entity_name).into(),
        }
    }

    /// Filtered collection retrieval: every stored object of `entity_name`
    /// whose values match all of `filters` (attribute name to JSON value,
    /// array-valued attributes match on containment), rendered and paged.
    pub async fn handle_search(
        &self,
        entity_name: &str,
        filters: &Map<String, Json>,
        fields: Option<&HashSet<String>>,
        limit: usize,
        offset: usize,
    ) -> ApiResponse {
        match self.search(entity_name, filters, fields, limit, offset).await {
            Ok(response) => response,
            Err(err) => err.to_error_body(entity_name).into(),
        }
    }

    async fn mutate(
        &self,
        entity_name: &str,
        id: Option<&str>,
        payload: &Json,
        ctx: &RequestContext,
    ) -> Result<ApiResponse, GatewayError> {
        let Ok(entity) = self.schemas.entity(entity_name) else {
            return Ok(ErrorBody::bad_request(
                format!("Could not establish an entity for '{entity_name}'"),
                entity_name,
                json!({}),
            )
            .into());
        };
        let Some(payload) = payload.as_object() else {
            return Ok(ErrorBody::bad_request(
                "The request body must be a JSON object",
                entity.name.as_str(),
                json!({}),
            )
            .into());
        };

        let (mut arena, root, created) = match id {
            Some(id) => {
                let Some(record) = self.lookup(&entity.name, id).await? else {
                    return Ok(not_found(id, &entity.name).into());
                };
                if record.entity != entity.name {
                    return Ok(entity_mismatch(id, &entity.name).into());
                }
                let Some((arena, root)) =
                    load_graph(self.repository.as_ref(), self.schemas.as_ref(), record.id).await?
                else {
                    return Ok(not_found(id, &entity.name).into());
                };
                (arena, root, false)
            }
            None => {
                let mut arena = ObjectArena::new();
                let root = arena.insert(ObjectEntity::new(entity.name.clone(), ctx));
                (arena, root, true)
            }
        };

        self.attach_mirrors(&mut arena);

        let validator = Validator::new(self.schemas.as_ref());
        validator.validate(&mut arena, root, payload)?;

        if arena.has_any_errors() {
            return Ok(validation_failed(&entity.name, &arena, root).into());
        }

        // Persist before synchronizing: a failed source call must leave a
        // retrievable object behind, not an error body and nothing else
        let records = records_from_graph(&arena, root);
        self.repository.save_graph(&records).await?;

        let synchronizer = Synchronizer::with_gateway(
            self.schemas.as_ref(),
            self.client.as_ref(),
            self.cache.as_ref(),
            &self.base_url,
            &self.object_path,
        );
        synchronizer.synchronize(&mut arena).await?;
        self.persist_sync_state(&arena, &records).await?;

        if arena.has_any_errors() {
            return Ok(validation_failed(&entity.name, &arena, root).into());
        }

        let renderer =
            Renderer::with_gateway(self.schemas.as_ref(), &self.base_url, &self.object_path);
        let body = Json::Object(renderer.render(&arena, root)?);
        Ok(if created { ApiResponse::created(body) } else { ApiResponse::ok(body) })
    }

    async fn get(
        &self,
        entity_name: &str,
        id: &str,
        fields: Option<&HashSet<String>>,
    ) -> Result<ApiResponse, GatewayError> {
        let Ok(entity) = self.schemas.entity(entity_name) else {
            return Ok(ErrorBody::bad_request(
                format!("Could not establish an entity for '{entity_name}'"),
                entity_name,
                json!({}),
            )
            .into());
        };
        let Some(record) = self.lookup(&entity.name, id).await? else {
            return Ok(not_found(id, &entity.name).into());
        };
        if record.entity != entity.name {
            return Ok(entity_mismatch(id, &entity.name).into());
        }
        let Some((mut arena, root)) =
            load_graph(self.repository.as_ref(), self.schemas.as_ref(), record.id).await?
        else {
            return Ok(not_found(id, &entity.name).into());
        };

        self.attach_mirrors(&mut arena);

        let renderer =
            Renderer::with_gateway(self.schemas.as_ref(), &self.base_url, &self.object_path);
        let body = match fields {
            Some(fields) => renderer.render_selected(&arena, root, fields)?,
            None => renderer.render(&arena, root)?,
        };
        Ok(ApiResponse::ok(Json::Object(body)))
    }

    async fn delete(&self, entity_name: &str, id: &str) -> Result<ApiResponse, GatewayError> {
        let Ok(entity) = self.schemas.entity(entity_name) else {
            return Ok(ErrorBody::bad_request(
                format!("Could not establish an entity for '{entity_name}'"),
                entity_name,
                json!({}),
            )
            .into());
        };
        let Some(record) = self.lookup(&entity.name, id).await? else {
            return Ok(not_found(id, &entity.name).into());
        };
        if record.entity != entity.name {
            return Ok(entity_mismatch(id, &entity.name).into());
        }
        let Some((arena, root)) =
            load_graph(self.repository.as_ref(), self.schemas.as_ref(), record.id).await?
        else {
            return Ok(not_found(id, &entity.name).into());
        };

        // Plan the whole cascade before touching anything, so an orphan
        // check failure aborts with nothing deleted
        let mut plan = vec![root];
        let mut visited: HashSet<ObjectId> = HashSet::from([root]);
        let mut queue = VecDeque::from([root]);
        while let Some(current) = queue.pop_front() {
            let object = arena.get(current);
            let object_entity = self.schemas.entity(&object.entity)?;
            for attribute in &object_entity.attributes {
                if attribute.ty != AttributeType::Object {
                    continue;
                }
                let Some(value) = object.value(&attribute.name) else { continue };
                let children = value.objects();
                if children.is_empty() {
                    continue;
                }
                if attribute.cascade_delete {
                    for child in children {
                        if visited.insert(child) {
                            queue.push_back(child);
                            plan.push(child);
                        }
                    }
                } else if !attribute.may_be_orphaned {
                    return Ok(ErrorBody::forbidden(
                        format!(
                            "Cannot delete this object: attribute '{}' does not allow orphaned subresources",
                            attribute.name
                        ),
                        object_entity.name.as_str(),
                        json!({}),
                    )
                    .into());
                }
            }
        }

        let synchronizer = Synchronizer::with_gateway(
            self.schemas.as_ref(),
            self.client.as_ref(),
            self.cache.as_ref(),
            &self.base_url,
            &self.object_path,
        );
        for object in &plan {
            synchronizer.delete_remote(&arena, *object).await?;
        }
        for object in &plan {
            let uuid = arena.get(*object).id;
            match self.repository.remove(uuid).await {
                Ok(()) => {}
                // Shared subresources may already be gone
                Err(RepositoryError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        tracing::info!("deleted object {} of '{}' ({} objects total)", id, entity.name, plan.len());

        Ok(ApiResponse::no_content())
    }

    async fn search(
        &self,
        entity_name: &str,
        filters: &Map<String, Json>,
        fields: Option<&HashSet<String>>,
        limit: usize,
        offset: usize,
    ) -> Result<ApiResponse, GatewayError> {
        let Ok(entity) = self.schemas.entity(entity_name) else {
            return Ok(ErrorBody::bad_request(
                format!("Could not establish an entity for '{entity_name}'"),
                entity_name,
                json!({}),
            )
            .into());
        };
        // Filters on attributes the schema does not know are rejected rather
        // than silently matching nothing
        for name in filters.keys() {
            if entity.attribute(name).is_none() {
                return Ok(ErrorBody::bad_request(
                    format!("No attribute '{}' on entity '{}'", name, entity.name),
                    entity.name.as_str(),
                    json!({}),
                )
                .into());
            }
        }

        let mut filter_iter = filters.iter();
        let mut records = match filter_iter.next() {
            None => self.repository.find_by_entity(&entity.name).await?,
            Some((attribute, value)) => {
                self.repository.find_by_attribute(&entity.name, attribute, value).await?
            }
        };
        // Remaining filters intersect by object id
        for (attribute, value) in filter_iter {
            let matched: HashSet<Uuid> = self
                .repository
                .find_by_attribute(&entity.name, attribute, value)
                .await?
                .into_iter()
                .map(|record| record.id)
                .collect();
            records.retain(|record| matched.contains(&record.id));
        }

        // Stable order regardless of backend iteration order
        records.sort_by_key(|record| record.id);
        let total = records.len();

        let renderer =
            Renderer::with_gateway(self.schemas.as_ref(), &self.base_url, &self.object_path);
        let mut results = Vec::new();
        for record in records.into_iter().skip(offset).take(limit) {
            let Some((mut arena, root)) =
                load_graph(self.repository.as_ref(), self.schemas.as_ref(), record.id).await?
            else {
                continue;
            };
            self.attach_mirrors(&mut arena);
            let body = match fields {
                Some(fields) => renderer.render_selected(&arena, root, fields)?,
                None => renderer.render(&arena, root)?,
            };
            results.push(Json::Object(body));
        }

        Ok(ApiResponse::ok(json!({
            "results": results,
            "total": total,
            "limit": limit,
            "offset": offset,
        })))
    }

    /// Resolve an id to a record: gateway uuid first, source-assigned
    /// external id as the fallback.
    async fn lookup(
        &self,
        entity: &str,
        id: &str,
    ) -> Result<Option<ObjectRecord>, RepositoryError> {
        match Uuid::parse_str(id) {
            Ok(uuid) => self.repository.find_by_id(uuid).await,
            Err(_) => self.repository.find_by_external_id(entity, id).await,
        }
    }

    /// Attach cached mirror bodies to every loaded object that has an
    /// external URI, so rendering sees the source's last known state.
    fn attach_mirrors(&self, arena: &mut ObjectArena) {
        for id in arena.ids().collect::<Vec<_>>() {
            let Some(uri) = arena.get(id).uri.clone() else { continue };
            if let Some(body) = self.cache.get(&uri) {
                arena.get_mut(id).external_result = Some(body);
            }
        }
    }

    /// Persist what synchronization produced: URIs, external ids, and the
    /// degraded-result flag. A follow-up update per object, never a rollback
    /// of the already committed graph. Only saved (attached) objects update.
    async fn persist_sync_state(
        &self,
        arena: &ObjectArena,
        records: &[ObjectRecord],
    ) -> Result<(), GatewayError> {
        for record in records {
            let Some(id) = arena.find_by_uuid(record.id) else { continue };
            let object = arena.get(id);
            if object.uri != record.uri
                || object.external_id != record.external_id
                || object.has_errors() != record.has_errors
            {
                self.repository
                    .update_sync_state(
                        record.id,
                        object.uri.as_deref(),
                        object.external_id.as_deref(),
                        object.has_errors(),
                    )
                    .await?;
            }
        }
        Ok(())
    }
}

fn not_found(id: &str, entity: &str) -> ErrorBody {
    ErrorBody::bad_request(format!("No object found with the id '{id}'"), entity, json!({}))
}

fn entity_mismatch(id: &str, entity: &str) -> ErrorBody {
    ErrorBody::bad_request(
        format!("The object with id '{id}' does not belong to entity '{entity}'"),
        entity,
        json!({}),
    )
}

fn validation_failed(entity: &str, arena: &ObjectArena, root: ObjectId) -> ErrorBody {
    ErrorBody::validation(
        "The object could not be validated",
        entity,
        Json::Object(arena.collect_errors(root)),
    )
}
