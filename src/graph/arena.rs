use serde_json::{Map, Value as Json};
use uuid::Uuid;

use crate::graph::object::ObjectEntity;

/// Index of an object within an [`ObjectArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub(crate) usize);

/// Arena holding every object of one request batch.
///
/// Cross-references between objects are arena indices rather than owning
/// pointers, so parent/child cycles are representable without reference
/// cycles and traversal stays cheap.
#[derive(Debug, Default)]
pub struct ObjectArena {
    objects: Vec<ObjectEntity>,
}

impl ObjectArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: ObjectEntity) -> ObjectId {
        self.objects.push(object);
        ObjectId(self.objects.len() - 1)
    }

    pub fn get(&self, id: ObjectId) -> &ObjectEntity {
        &self.objects[id.0]
    }

    pub fn get_mut(&mut self, id: ObjectId) -> &mut ObjectEntity {
        &mut self.objects[id.0]
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> {
        (0..self.objects.len()).map(ObjectId)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn find_by_uuid(&self, uuid: Uuid) -> Option<ObjectId> {
        self.objects.iter().position(|o| o.id == uuid).map(ObjectId)
    }

    /// Objects referenced by the values of `id`, in value order.
    pub fn children_of(&self, id: ObjectId) -> Vec<ObjectId> {
        self.get(id).values().iter().flat_map(|v| v.objects()).collect()
    }

    /// Whether any object in the batch recorded an error. One request is one
    /// arena, so this is the "did validation or synchronization fail" check.
    pub fn has_any_errors(&self) -> bool {
        self.objects.iter().any(|o| o.has_errors())
    }

    /// Collect every error in the batch into a flat map keyed by the dotted
    /// attribute path from `root` (for example `address.street`). Errors on
    /// objects that failed validation and were therefore never attached to a
    /// parent value still surface here, through their `subresource_of`
    /// back-reference.
    pub fn collect_errors(&self, root: ObjectId) -> Map<String, Json> {
        let mut collected = Map::new();
        for id in self.ids() {
            if !self.get(id).has_errors() {
                continue;
            }
            let Some(prefix) = self.path_from(root, id) else { continue };
            for (attribute, messages) in self.get(id).errors() {
                let key = if prefix.is_empty() {
                    attribute.clone()
                } else {
                    format!("{prefix}.{attribute}")
                };
                let entry = collected.entry(key).or_insert_with(|| Json::Array(Vec::new()));
                if let Json::Array(list) = entry {
                    list.extend(messages.iter().map(|m| Json::String(m.clone())));
                }
            }
        }
        collected
    }

    /// Dotted attribute path from `root` down to `id`, or `None` when `id`
    /// does not descend from `root`.
    fn path_from(&self, root: ObjectId, id: ObjectId) -> Option<String> {
        let mut segments = Vec::new();
        let mut current = id;
        let mut hops = 0;
        while current != root {
            let (parent, attribute) = self.get(current).subresource_of.clone()?;
            segments.push(attribute);
            current = parent;
            // A back-reference loop would be a bug; bail out instead of spinning
            hops += 1;
            if hops > self.objects.len() {
                return None;
            }
        }
        segments.reverse();
        Some(segments.join("."))
    }
}
