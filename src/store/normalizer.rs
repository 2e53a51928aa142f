use crate::{
    error::StoreError,
    store::data::{self, Link},
    types::FieldSelector,
    HashMap, HashSet
};
use serde_json::{Map, Value};

/// One staged field: either an inlined record value or a link edge.
#[derive(Debug, PartialEq)]
pub enum StagedField {
    Record(Value),
    Link(Link)
}

/// The staged output of normalizing one payload: flat fields per entity and
/// the set of entity keys the write touches.
///
/// Staging instead of writing through means a payload that fails to
/// normalize leaves the store untouched, and the merge of a successful write
/// happens as one unit under the store's write lock. A field staged more
/// than once (the same entity reached through several payload paths) keeps
/// its last occurrence, record or link alike.
#[derive(Default)]
pub struct NormalizedWrite {
    pub fields: HashMap<String, HashMap<String, StagedField>>,
    pub dependencies: HashSet<String>
}

/// Selection-guided flattening of a nested payload.
///
/// Every object with an identity (per `key_of`) is extracted to its own
/// entity key and replaced by a [`Link`]; objects without identity are
/// inlined verbatim. Recursion is driven by the literal payload and the
/// selection depth, so cyclic entity graphs normalize in finite steps.
pub struct Normalizer<'a> {
    custom_keys: &'a HashMap<&'static str, String>,
    // entity key -> typename, for same-write collision detection
    seen: HashMap<String, String>,
    write: NormalizedWrite
}

impl<'a> Normalizer<'a> {
    pub fn new(custom_keys: &'a HashMap<&'static str, String>) -> Self {
        Normalizer {
            custom_keys,
            seen: HashMap::default(),
            write: NormalizedWrite::default()
        }
    }

    pub fn normalize(
        mut self,
        root_key: &str,
        selection: &[FieldSelector],
        payload: &Value
    ) -> Result<NormalizedWrite, StoreError> {
        let fields = payload
            .as_object()
            .ok_or_else(|| StoreError::InvalidPayload {
                reason: "top level of a written payload must be an object".to_string()
            })?;
        self.write_entity(root_key, selection, fields)?;
        Ok(self.write)
    }

    fn write_entity(
        &mut self,
        entity_key: &str,
        selection: &[FieldSelector],
        fields: &Map<String, Value>
    ) -> Result<(), StoreError> {
        for selector in selection {
            // A field absent from the payload is simply not written; partial
            // results merge over whatever is already stored.
            let value = match fields.get(selector.name()) {
                Some(value) => value,
                None => continue
            };
            let field_key = selector.field_key();
            match selector {
                FieldSelector::Scalar(_, _) => {
                    self.record(entity_key, field_key, value.clone());
                }
                FieldSelector::Object(_, _, subselection) => {
                    if self.is_linkable(value) {
                        let link = self.to_link(value, subselection)?;
                        self.link(entity_key, field_key, link);
                    } else {
                        self.record(entity_key, field_key, value.clone());
                    }
                }
            }
        }
        Ok(())
    }

    /// Whether a value can be stored as a link: null, an identifiable
    /// object, or a non-empty list of linkable values. A list mixing
    /// identifiable and identity-less members is inlined as a whole.
    fn is_linkable(&self, value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::Object(fields) => data::key_of(self.custom_keys, fields).is_some(),
            Value::Array(items) => {
                !items.is_empty() && items.iter().all(|item| self.is_linkable(item))
            }
            _ => false
        }
    }

    /// Extracts a linkable value, writing every entity it contains into the
    /// staged records. Only called on values `is_linkable` accepted.
    fn to_link(
        &mut self,
        value: &Value,
        subselection: &[FieldSelector]
    ) -> Result<Link, StoreError> {
        match value {
            Value::Null => Ok(Link::Null),
            Value::Array(items) => items
                .iter()
                .map(|item| self.to_link(item, subselection))
                .collect::<Result<Vec<_>, _>>()
                .map(Link::List),
            Value::Object(fields) => {
                let key = data::key_of(self.custom_keys, fields).ok_or_else(|| {
                    StoreError::InvalidPayload {
                        reason: "object in a linked position has no identity".to_string()
                    }
                })?;
                self.check_collision(&key, fields)?;
                if !data::is_root(&key) {
                    self.write_identity(&key, fields);
                    self.write.dependencies.insert(key.clone());
                }
                self.write_entity(&key, subselection, fields)?;
                Ok(Link::Single(key))
            }
            _ => Err(StoreError::InvalidPayload {
                reason: "scalar in a linked position".to_string()
            })
        }
    }

    /// Two objects in one write may share a key only if they are the same
    /// logical entity; a typename mismatch means the identity rule collided.
    fn check_collision(
        &mut self,
        entity_key: &str,
        fields: &Map<String, Value>
    ) -> Result<(), StoreError> {
        let typename = fields
            .get("__typename")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if let Some(existing) = self.seen.get(entity_key) {
            if existing != typename {
                return Err(StoreError::AmbiguousKey {
                    key: entity_key.to_string(),
                    existing: existing.clone(),
                    conflicting: typename.to_string()
                });
            }
        } else {
            self.seen
                .insert(entity_key.to_string(), typename.to_string());
        }
        Ok(())
    }

    /// The identity fields are stored even when the selection doesn't ask
    /// for them, so `identify` and snapshots work from stored data alone.
    fn write_identity(&mut self, entity_key: &str, fields: &Map<String, Value>) {
        if let Some(typename) = fields.get("__typename") {
            self.record(entity_key, "__typename".to_string(), typename.clone());
        }
        let id_field = match fields.get("__typename").and_then(Value::as_str) {
            Some(typename) => match self.custom_keys.get(typename) {
                Some(custom_key) => custom_key.clone(),
                None if fields.contains_key("id") => "id".to_string(),
                None => "_id".to_string()
            },
            None => return
        };
        if let Some(id) = fields.get(&id_field) {
            let id = id.clone();
            self.record(entity_key, id_field, id);
        }
    }

    fn record(&mut self, entity_key: &str, field_key: String, value: Value) {
        self.stage(entity_key, field_key, StagedField::Record(value));
    }

    fn link(&mut self, entity_key: &str, field_key: String, link: Link) {
        self.stage(entity_key, field_key, StagedField::Link(link));
    }

    fn stage(&mut self, entity_key: &str, field_key: String, staged: StagedField) {
        self.write
            .fields
            .entry(entity_key.to_string())
            .or_default()
            .insert(field_key, staged);
    }
}
