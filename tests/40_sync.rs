mod common;

use serde_json::json;

use eav_gateway::context::RequestContext;
use eav_gateway::graph::{ObjectArena, ObjectEntity};
use eav_gateway::schema::SchemaRegistry;
use eav_gateway::sync::{
    MemoryMirrorCache, MirrorCache, SourceMethod, Synchronizer, EXTERNAL_ERROR_KEY,
};
use eav_gateway::validation::Validator;

use common::{StubSourceClient, BASE_URL, OBJECT_PATH, SOURCE};

struct SyncSetup {
    registry: SchemaRegistry,
    client: StubSourceClient,
    cache: MemoryMirrorCache,
}

fn setup() -> SyncSetup {
    common::init_tracing();
    let registry = SchemaRegistry::new();
    registry
        .register_all(vec![common::pet_entity(), common::owner_entity()])
        .expect("fixture schemas must register");
    SyncSetup { registry, client: StubSourceClient::new(), cache: MemoryMirrorCache::new() }
}

fn validated_pet(registry: &SchemaRegistry, payload: serde_json::Value) -> (ObjectArena, eav_gateway::graph::ObjectId) {
    let mut arena = ObjectArena::new();
    let pet = arena.insert(ObjectEntity::new("pet", &RequestContext::default()));
    Validator::new(registry)
        .validate(&mut arena, pet, payload.as_object().unwrap())
        .unwrap();
    assert!(!arena.has_any_errors());
    (arena, pet)
}

#[tokio::test]
async fn children_settle_before_parents_and_uris_substitute() {
    let s = setup();
    let (mut arena, pet) =
        validated_pet(&s.registry, json!({"name": "Rex", "owner": {"name": "Ada"}}));

    let sync = Synchronizer::with_gateway(&s.registry, &s.client, &s.cache, BASE_URL, OBJECT_PATH);
    sync.synchronize(&mut arena).await.unwrap();
    assert!(!arena.has_any_errors());

    let calls = s.client.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].url, format!("{SOURCE}/owners"));
    assert_eq!(calls[1].url, format!("{SOURCE}/pets"));
    assert_eq!(calls[0].method, SourceMethod::Post);

    // The parent payload carries the child's freshly assigned external URI
    let owner = arena.children_of(pet)[0];
    let owner_uri = arena.get(owner).uri.clone().unwrap();
    assert!(owner_uri.starts_with(&format!("{SOURCE}/owners/")));
    let body = calls[1].body.as_ref().unwrap();
    assert_eq!(body["owner"], json!(owner_uri));

    // Both objects now mirror their source responses
    let pet_uri = arena.get(pet).uri.clone().unwrap();
    assert!(pet_uri.starts_with(&format!("{SOURCE}/pets/")));
    assert!(s.cache.get(&pet_uri).is_some());
    assert!(arena.get(pet).external_result.is_some());
    assert!(!arena.get(pet).pending_sync);
}

#[tokio::test]
async fn local_only_attributes_stay_out_of_the_payload() {
    let s = setup();
    let (mut arena, _pet) =
        validated_pet(&s.registry, json!({"name": "Rex", "notes": "bites the mailman"}));

    let sync = Synchronizer::with_gateway(&s.registry, &s.client, &s.cache, BASE_URL, OBJECT_PATH);
    sync.synchronize(&mut arena).await.unwrap();

    let calls = s.client.calls();
    let body = calls[0].body.as_ref().unwrap().as_object().unwrap();
    assert!(body.contains_key("name"));
    assert!(!body.contains_key("notes"));
}

#[tokio::test]
async fn known_uri_means_put_and_no_uri_means_post() {
    let s = setup();
    let (mut arena, pet) = validated_pet(&s.registry, json!({"name": "Rex"}));
    let existing = format!("{SOURCE}/pets/42");
    arena.get_mut(pet).uri = Some(existing.clone());

    let sync = Synchronizer::with_gateway(&s.registry, &s.client, &s.cache, BASE_URL, OBJECT_PATH);
    sync.synchronize(&mut arena).await.unwrap();

    let calls = s.client.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, SourceMethod::Put);
    assert_eq!(calls[0].url, existing);
    // The URI is stable across updates
    assert_eq!(arena.get(pet).uri.as_deref(), Some(existing.as_str()));
}

#[tokio::test]
async fn failed_child_does_not_abort_the_parent() {
    let s = setup();
    s.client.fail(&format!("{SOURCE}/owners"), 422, "name is already taken");
    let (mut arena, pet) =
        validated_pet(&s.registry, json!({"name": "Rex", "owner": {"name": "Ada"}}));

    let sync = Synchronizer::with_gateway(&s.registry, &s.client, &s.cache, BASE_URL, OBJECT_PATH);
    sync.synchronize(&mut arena).await.unwrap();

    // The owner's failure lands under the synthetic error key, dotted by path
    let errors = arena.collect_errors(pet);
    let key = format!("owner.{EXTERNAL_ERROR_KEY}");
    let messages = errors[&key].as_array().unwrap();
    assert!(messages[0].as_str().unwrap().contains("name is already taken"));

    // The pet still went out, referencing the owner by its local self-link
    let pet_call = s
        .client
        .calls()
        .into_iter()
        .find(|call| call.url == format!("{SOURCE}/pets"))
        .expect("pet call must still happen");
    let owner_ref = pet_call.body.as_ref().unwrap()["owner"].as_str().unwrap().to_string();
    assert!(owner_ref.starts_with(BASE_URL));
    assert!(arena.get(pet).uri.is_some());
}

#[tokio::test]
async fn delete_remote_is_best_effort_and_clears_the_mirror() {
    let s = setup();
    let (mut arena, pet) = validated_pet(&s.registry, json!({"name": "Rex"}));
    let uri = format!("{SOURCE}/pets/42");
    arena.get_mut(pet).uri = Some(uri.clone());
    s.cache.put(&uri, &json!({"id": "42"}));
    s.client.fail(&uri, 500, "source exploded");

    let sync = Synchronizer::with_gateway(&s.registry, &s.client, &s.cache, BASE_URL, OBJECT_PATH);
    sync.delete_remote(&arena, pet).await.unwrap();

    // Failure is logged, not propagated; the mirror entry is gone either way
    assert!(s.cache.get(&uri).is_none());
    assert_eq!(s.client.calls()[0].method, SourceMethod::Delete);
}
