#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use serde_json::{json, Value as Json};

use eav_gateway::repository::MemoryObjectRepository;
use eav_gateway::schema::{Attribute, AttributeType, Entity, ExternalSource, SchemaRegistry};
use eav_gateway::services::EavService;
use eav_gateway::sync::{MemoryMirrorCache, SourceCall, SourceClient, SourceMethod, SourceOutcome};

pub const BASE_URL: &str = "http://localhost:8000";
pub const OBJECT_PATH: &str = "/api/v1/eav/object_entities";
pub const SOURCE: &str = "https://petstore.example.com/api";

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Wire stub: records every call in order and answers from a programmable
/// response table, defaulting to a success with a fresh numeric id.
pub struct StubSourceClient {
    calls: Mutex<Vec<SourceCall>>,
    responses: Mutex<HashMap<String, SourceOutcome>>,
    next_id: AtomicUsize,
}

impl StubSourceClient {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            responses: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(0),
        }
    }

    /// Program the outcome for calls to `url`.
    pub fn respond(&self, url: &str, outcome: SourceOutcome) {
        self.responses.lock().unwrap().insert(url.to_string(), outcome);
    }

    pub fn fail(&self, url: &str, status: u16, message: &str) {
        self.respond(
            url,
            SourceOutcome::Failure { status: Some(status), message: message.to_string() },
        );
    }

    pub fn calls(&self) -> Vec<SourceCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceClient for StubSourceClient {
    async fn call(&self, call: SourceCall) -> SourceOutcome {
        self.calls.lock().unwrap().push(call.clone());
        if let Some(outcome) = self.responses.lock().unwrap().get(&call.url).cloned() {
            return outcome;
        }
        match call.method {
            SourceMethod::Delete => SourceOutcome::Success { status: 204, body: Json::Null },
            _ => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 100;
                SourceOutcome::Success {
                    status: 200,
                    body: json!({"id": id.to_string(), "synced": true}),
                }
            }
        }
    }
}

pub struct Harness {
    pub service: EavService,
    pub schemas: Arc<SchemaRegistry>,
    pub repository: Arc<MemoryObjectRepository>,
    pub cache: Arc<MemoryMirrorCache>,
    pub client: Arc<StubSourceClient>,
}

pub fn harness(entities: Vec<Entity>) -> Harness {
    init_tracing();
    let schemas = Arc::new(SchemaRegistry::new());
    schemas.register_all(entities).expect("fixture schemas must register");
    let repository = Arc::new(MemoryObjectRepository::new());
    let cache = Arc::new(MemoryMirrorCache::new());
    let client = Arc::new(StubSourceClient::new());
    let service = EavService::new(
        schemas.clone(),
        repository.clone(),
        client.clone(),
        cache.clone(),
    )
    .with_gateway(BASE_URL, OBJECT_PATH);
    Harness { service, schemas, repository, cache, client }
}

// Fixture schemas

pub fn person_entity() -> Entity {
    let mut age = Attribute::new("age", AttributeType::Integer);
    age.minimum = Some(0.0);
    Entity::new(
        "person",
        vec![
            Attribute::new("name", AttributeType::String).required(),
            age,
            Attribute::new("email", AttributeType::String).with_format("email").nullable(),
            Attribute::object("address", "address"),
        ],
    )
}

pub fn address_entity() -> Entity {
    Entity::new(
        "address",
        vec![
            Attribute::new("street", AttributeType::String).required(),
            Attribute::new("city", AttributeType::String),
        ],
    )
}

/// Pet mirrors to the external pet store; its owner mirrors too, so pet
/// synchronization depends on the owner settling first.
pub fn pet_entity() -> Entity {
    Entity::new(
        "pet",
        vec![
            Attribute::new("name", AttributeType::String).required(),
            Attribute::new("notes", AttributeType::String).local_only(),
            Attribute::object("owner", "owner"),
        ],
    )
    .with_source(ExternalSource::new(SOURCE), "pets")
}

pub fn owner_entity() -> Entity {
    Entity::new(
        "owner",
        vec![Attribute::new("name", AttributeType::String).required()],
    )
    .with_source(ExternalSource::new(SOURCE), "owners")
}
