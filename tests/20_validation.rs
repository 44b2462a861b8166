mod common;

use serde_json::json;

use eav_gateway::context::RequestContext;
use eav_gateway::graph::{ObjectArena, ObjectEntity, ValueData};
use eav_gateway::schema::{Attribute, AttributeType, Entity, SchemaRegistry};
use eav_gateway::validation::Validator;

fn setup(entities: Vec<Entity>) -> SchemaRegistry {
    common::init_tracing();
    let registry = SchemaRegistry::new();
    registry.register_all(entities).expect("fixture schemas must register");
    registry
}

fn new_object(arena: &mut ObjectArena, entity: &str) -> eav_gateway::graph::ObjectId {
    arena.insert(ObjectEntity::new(entity, &RequestContext::default()))
}

#[test]
fn valid_payload_populates_values_without_errors() {
    let registry = setup(vec![common::person_entity(), common::address_entity()]);
    let mut arena = ObjectArena::new();
    let person = new_object(&mut arena, "person");

    let payload = json!({"name": "Ada", "age": 36, "email": "ada@example.com"});
    Validator::new(&registry)
        .validate(&mut arena, person, payload.as_object().unwrap())
        .unwrap();

    assert!(!arena.has_any_errors());
    assert!(arena.get(person).value("name").is_some());
    assert!(!arena.get(person).value("age").unwrap().is_empty());
}

#[test]
fn missing_required_attribute_is_an_error() {
    let registry = setup(vec![common::person_entity(), common::address_entity()]);
    let mut arena = ObjectArena::new();
    let person = new_object(&mut arena, "person");

    Validator::new(&registry)
        .validate(&mut arena, person, json!({"age": 1}).as_object().unwrap())
        .unwrap();

    let errors = arena.collect_errors(person);
    assert_eq!(errors["name"], json!(["this attribute is required"]));
}

#[test]
fn explicit_null_clears_optional_fields_but_not_required_ones() {
    let registry = setup(vec![common::person_entity(), common::address_entity()]);
    let mut arena = ObjectArena::new();
    let person = new_object(&mut arena, "person");

    // name is required and not nullable; age and email may be nulled
    Validator::new(&registry)
        .validate(
            &mut arena,
            person,
            json!({"name": null, "age": null, "email": null}).as_object().unwrap(),
        )
        .unwrap();

    let errors = arena.collect_errors(person);
    assert!(errors.contains_key("name"));
    assert!(!errors.contains_key("age"));
    assert!(!errors.contains_key("email"));
    assert!(arena.get(person).value("age").unwrap().is_empty());
}

#[test]
fn exclusive_minimum_rejects_the_bound_itself() {
    let mut score = Attribute::new("score", AttributeType::Integer);
    score.minimum = Some(5.0);
    score.exclusive_minimum = true;
    let registry = setup(vec![Entity::new("game", vec![score])]);

    let mut arena = ObjectArena::new();
    let at_bound = new_object(&mut arena, "game");
    Validator::new(&registry)
        .validate(&mut arena, at_bound, json!({"score": 5}).as_object().unwrap())
        .unwrap();
    assert!(arena.get(at_bound).has_errors());

    let above = new_object(&mut arena, "game");
    Validator::new(&registry)
        .validate(&mut arena, above, json!({"score": 6}).as_object().unwrap())
        .unwrap();
    assert!(!arena.get(above).has_errors());
}

#[test]
fn integer_attribute_rejects_fractional_and_string_numbers() {
    let registry = setup(vec![common::person_entity(), common::address_entity()]);
    let mut arena = ObjectArena::new();
    let person = new_object(&mut arena, "person");

    Validator::new(&registry)
        .validate(
            &mut arena,
            person,
            json!({"name": "Ada", "age": 36.5}).as_object().unwrap(),
        )
        .unwrap();
    assert!(arena.collect_errors(person).contains_key("age"));
}

#[test]
fn unknown_format_is_a_validation_error() {
    let field = Attribute::new("code", AttributeType::String).with_format("postal-code");
    let registry = setup(vec![Entity::new("thing", vec![field])]);

    let mut arena = ObjectArena::new();
    let thing = new_object(&mut arena, "thing");
    Validator::new(&registry)
        .validate(&mut arena, thing, json!({"code": "1234AB"}).as_object().unwrap())
        .unwrap();

    let errors = arena.collect_errors(thing);
    assert_eq!(errors["code"], json!(["has an unknown format: [postal-code]"]));
}

#[test]
fn nested_object_attaches_when_clean() {
    let registry = setup(vec![common::person_entity(), common::address_entity()]);
    let mut arena = ObjectArena::new();
    let person = new_object(&mut arena, "person");

    let payload = json!({
        "name": "Ada",
        "address": {"street": "Main 1", "city": "Delft"},
    });
    Validator::new(&registry)
        .validate(&mut arena, person, payload.as_object().unwrap())
        .unwrap();

    assert!(!arena.has_any_errors());
    assert_eq!(arena.children_of(person).len(), 1);
    let child = arena.children_of(person)[0];
    assert_eq!(arena.get(child).entity, "address");
    assert_eq!(
        arena.get(child).subresource_of.as_ref().map(|(_, a)| a.as_str()),
        Some("address")
    );
}

#[test]
fn failing_nested_object_surfaces_errors_by_dotted_path_and_stays_detached() {
    let registry = setup(vec![common::person_entity(), common::address_entity()]);
    let mut arena = ObjectArena::new();
    let person = new_object(&mut arena, "person");

    let payload = json!({"name": "Ada", "address": {"city": "Delft"}});
    Validator::new(&registry)
        .validate(&mut arena, person, payload.as_object().unwrap())
        .unwrap();

    let errors = arena.collect_errors(person);
    assert_eq!(errors["address.street"], json!(["this attribute is required"]));
    // The erroring child is never attached to the parent value
    assert!(arena.children_of(person).is_empty());
}

#[test]
fn revalidation_reuses_the_attached_child() {
    let registry = setup(vec![common::person_entity(), common::address_entity()]);
    let mut arena = ObjectArena::new();
    let person = new_object(&mut arena, "person");
    let validator = Validator::new(&registry);

    validator
        .validate(
            &mut arena,
            person,
            json!({"name": "Ada", "address": {"street": "Main 1"}}).as_object().unwrap(),
        )
        .unwrap();
    let first_child = arena.children_of(person)[0];

    validator
        .validate(
            &mut arena,
            person,
            json!({"name": "Ada", "address": {"street": "Main 2"}}).as_object().unwrap(),
        )
        .unwrap();

    assert_eq!(arena.children_of(person), vec![first_child]);
    assert_eq!(arena.len(), 2);
}

#[test]
fn omitted_optional_attribute_is_cleared() {
    let registry = setup(vec![common::person_entity(), common::address_entity()]);
    let mut arena = ObjectArena::new();
    let person = new_object(&mut arena, "person");
    let validator = Validator::new(&registry);

    validator
        .validate(
            &mut arena,
            person,
            json!({"name": "Ada", "age": 36}).as_object().unwrap(),
        )
        .unwrap();
    assert!(!arena.get(person).value("age").unwrap().is_empty());

    // Update without the field: old value must not survive
    validator
        .validate(&mut arena, person, json!({"name": "Ada"}).as_object().unwrap())
        .unwrap();
    assert!(arena.get(person).value("age").unwrap().is_empty());
}

#[test]
fn multiple_requires_an_array() {
    let tags = Attribute::new("tags", AttributeType::String).multiple();
    let registry = setup(vec![Entity::new("post", vec![tags])]);

    let mut arena = ObjectArena::new();
    let post = new_object(&mut arena, "post");
    Validator::new(&registry)
        .validate(&mut arena, post, json!({"tags": "not-an-array"}).as_object().unwrap())
        .unwrap();

    assert!(arena.get(post).has_errors());
}

#[test]
fn array_bounds_and_uniqueness() {
    let mut tags = Attribute::new("tags", AttributeType::String).multiple();
    tags.min_items = Some(2);
    tags.unique_items = true;
    let registry = setup(vec![Entity::new("post", vec![tags])]);
    let validator = Validator::new(&registry);

    let mut arena = ObjectArena::new();
    let short = new_object(&mut arena, "post");
    validator
        .validate(&mut arena, short, json!({"tags": ["a"]}).as_object().unwrap())
        .unwrap();
    assert!(arena.get(short).has_errors());

    let duplicated = new_object(&mut arena, "post");
    validator
        .validate(&mut arena, duplicated, json!({"tags": ["a", "a"]}).as_object().unwrap())
        .unwrap();
    assert!(arena.get(duplicated).has_errors());

    let clean = new_object(&mut arena, "post");
    validator
        .validate(&mut arena, clean, json!({"tags": ["a", "b"]}).as_object().unwrap())
        .unwrap();
    assert!(!arena.get(clean).has_errors());
    match &arena.get(clean).value("tags").unwrap().data {
        ValueData::ScalarList(items) => assert_eq!(items.len(), 2),
        other => panic!("expected scalar list, got {other:?}"),
    }
}

#[test]
fn empty_array_is_valid_unless_min_items_applies() {
    let tags = Attribute::new("tags", AttributeType::String).multiple();
    let registry = setup(vec![Entity::new("post", vec![tags])]);

    let mut arena = ObjectArena::new();
    let post = new_object(&mut arena, "post");
    Validator::new(&registry)
        .validate(&mut arena, post, json!({"tags": []}).as_object().unwrap())
        .unwrap();
    assert!(!arena.get(post).has_errors());
    match &arena.get(post).value("tags").unwrap().data {
        ValueData::ScalarList(items) => assert!(items.is_empty()),
        other => panic!("expected scalar list, got {other:?}"),
    }

    // The same empty array fails once minItems demands an element
    let mut bounded = Attribute::new("tags", AttributeType::String).multiple();
    bounded.min_items = Some(1);
    let registry = setup(vec![Entity::new("post", vec![bounded])]);
    let mut arena = ObjectArena::new();
    let post = new_object(&mut arena, "post");
    Validator::new(&registry)
        .validate(&mut arena, post, json!({"tags": []}).as_object().unwrap())
        .unwrap();
    assert_eq!(
        arena.collect_errors(post)["tags"],
        json!(["The minimum array length of this attribute is 1."])
    );
}

#[test]
fn errors_surface_in_attribute_declaration_order() {
    // Declaration order deliberately disagrees with alphabetical order
    let registry = setup(vec![Entity::new(
        "book",
        vec![
            Attribute::new("title", AttributeType::String).required(),
            Attribute::new("author", AttributeType::String).required(),
        ],
    )]);

    let mut arena = ObjectArena::new();
    let book = new_object(&mut arena, "book");
    Validator::new(&registry)
        .validate(&mut arena, book, json!({}).as_object().unwrap())
        .unwrap();

    let errors = arena.collect_errors(book);
    let keys: Vec<&str> = errors.keys().map(|k| k.as_str()).collect();
    assert_eq!(keys, vec!["title", "author"]);
}

#[test]
fn default_value_applies_when_attribute_is_absent() {
    let status = Attribute::new("status", AttributeType::String).with_default(json!("open"));
    let registry = setup(vec![Entity::new("ticket", vec![status])]);

    let mut arena = ObjectArena::new();
    let ticket = new_object(&mut arena, "ticket");
    Validator::new(&registry)
        .validate(&mut arena, ticket, json!({}).as_object().unwrap())
        .unwrap();

    assert!(!arena.get(ticket).has_errors());
    assert!(!arena.get(ticket).value("status").unwrap().is_empty());
}

#[test]
fn nesting_depth_is_bounded() {
    // node links to itself; depth 2 means the third level must be rejected
    let child = Attribute::object("child", "node");
    let name = Attribute::new("name", AttributeType::String);
    let registry =
        setup(vec![Entity::new("node", vec![name, child]).with_max_depth(2)]);

    let mut arena = ObjectArena::new();
    let node = new_object(&mut arena, "node");
    let payload = json!({
        "name": "a",
        "child": {"name": "b", "child": {"name": "c", "child": {"name": "d"}}},
    });
    Validator::new(&registry)
        .validate(&mut arena, node, payload.as_object().unwrap())
        .unwrap();

    let errors = arena.collect_errors(node);
    assert!(errors.keys().any(|k| k.ends_with("child")), "errors: {errors:?}");
}
