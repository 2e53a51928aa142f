use crate::{error::StoreError, HashMap};
use serde_json::{json, Value};

/// A relation edge stored in place of nested entity data.
///
/// Lists nest, so a list-of-lists field is `List` of `List` links and a null
/// list element is a `Null` link at its position.
#[derive(Debug, Hash, PartialEq, Eq, Clone)]
pub enum Link {
    /// A reference to a single entity.
    Single(String),
    /// A list of links, resolved positionally.
    List(Vec<Link>),
    /// An explicitly null relation.
    Null
}

impl Link {
    /// Collects every entity key reachable through this link, in order.
    pub(crate) fn collect_keys<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Link::Single(key) => out.push(key),
            Link::List(items) => {
                for item in items {
                    item.collect_keys(out);
                }
            }
            Link::Null => {}
        }
    }

    /// The snapshot form of this link: `{"ref": key}`, `{"ref": null}` or an
    /// array of snapshot forms.
    pub(crate) fn to_snapshot_value(&self) -> Value {
        match self {
            Link::Single(key) => json!({ "ref": key }),
            Link::List(items) => {
                Value::Array(items.iter().map(Link::to_snapshot_value).collect())
            }
            Link::Null => json!({ "ref": null })
        }
    }

    /// Parses a snapshot value back into a link, if it is link-shaped.
    ///
    /// The snapshot format reserves single-key `{"ref": <string|null>}`
    /// objects (and non-empty arrays made entirely of link shapes) as link
    /// markers; an inlined record value of exactly that shape is
    /// indistinguishable from a marker and comes back as a link. Anything
    /// else (including an empty array, which resolves identically as an
    /// inlined record) is a record value.
    pub(crate) fn from_snapshot_value(value: &Value) -> Option<Link> {
        match value {
            Value::Object(map) if map.len() == 1 => match map.get("ref") {
                Some(Value::String(key)) => Some(Link::Single(key.clone())),
                Some(Value::Null) => Some(Link::Null),
                _ => None
            },
            Value::Array(items) if !items.is_empty() => items
                .iter()
                .map(Link::from_snapshot_value)
                .collect::<Option<Vec<_>>>()
                .map(Link::List),
            _ => None
        }
    }
}

/// True for the operation root typenames, which are their own entity keys
/// and act as GC roots.
pub fn is_root(typename: &str) -> bool {
    typename == "Query" || typename == "Mutation" || typename == "Subscription"
}

/// Serializes field arguments for use in a store field name.
///
/// `Null` and an empty object both mean "no arguments". Object keys are
/// serialized in sorted order, so identical argument sets always produce the
/// same string regardless of how the caller built them.
pub(crate) fn serialize_args(args: &Value) -> String {
    match args {
        Value::Null => String::new(),
        Value::Object(map) if map.is_empty() => String::new(),
        args => {
            let json = args.to_string();
            let mut out = String::with_capacity(json.len() + 2);
            out.push('(');
            out.push_str(&json);
            out.push(')');
            out
        }
    }
}

/// Builds a store field name from a field name and pre-serialized arguments.
#[inline]
pub(crate) fn field_key(field_name: &str, args: &str) -> String {
    let mut key = String::with_capacity(field_name.len() + args.len());
    key.push_str(field_name);
    key.push_str(args);
    key
}

/// True if `store_field_name` is the bare field `base` or one of its
/// argument variants.
pub(crate) fn matches_field(store_field_name: &str, base: &str) -> bool {
    store_field_name == base
        || (store_field_name.len() > base.len()
            && store_field_name.starts_with(base)
            && store_field_name[base.len()..].starts_with('('))
}

/// Computes the entity key of an entity-shaped object, or `None` when the
/// object carries no identity and must be inlined.
pub(crate) fn key_of(
    custom_keys: &HashMap<&'static str, String>,
    entity: &serde_json::Map<String, Value>
) -> Option<String> {
    let typename = entity.get("__typename").and_then(Value::as_str)?;
    if is_root(typename) {
        return Some(typename.to_string());
    }

    let id = if let Some(custom_key) = custom_keys.get(typename) {
        entity.get(custom_key.as_str())
    } else {
        entity.get("id").or_else(|| entity.get("_id"))
    }
    .and_then(id_as_string)?;

    let mut key = String::with_capacity(typename.len() + id.len() + 1);
    key.push_str(typename);
    key.push(':');
    key.push_str(&id);
    Some(key)
}

fn id_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None
    }
}

/// The flat entity storage: scalar fields in `records`, relation fields in
/// `links`, both keyed by entity key and store field name. A field lives in
/// exactly one of the two maps at any time.
#[derive(Default)]
pub struct InMemoryData {
    records: HashMap<String, HashMap<String, Value>>,
    links: HashMap<String, HashMap<String, Link>>
}

impl InMemoryData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_record(&self, entity_key: &str, field_key: &str) -> Option<&Value> {
        self.records.get(entity_key)?.get(field_key)
    }

    pub fn read_link(&self, entity_key: &str, field_key: &str) -> Option<&Link> {
        self.links.get(entity_key)?.get(field_key)
    }

    pub fn write_record(&mut self, entity_key: String, field_key: String, value: Value) {
        if let Some(entity_links) = self.links.get_mut(&entity_key) {
            entity_links.remove(&field_key);
        }
        self.records
            .entry(entity_key)
            .or_default()
            .insert(field_key, value);
    }

    pub fn write_link(&mut self, entity_key: String, field_key: String, link: Link) {
        if let Some(entity_records) = self.records.get_mut(&entity_key) {
            entity_records.remove(&field_key);
        }
        self.links
            .entry(entity_key)
            .or_default()
            .insert(field_key, link);
    }

    pub fn has_entity(&self, entity_key: &str) -> bool {
        self.records.contains_key(entity_key) || self.links.contains_key(entity_key)
    }

    /// Removes an entire entity. Returns whether anything was removed.
    pub fn delete_entity(&mut self, entity_key: &str) -> bool {
        let had_records = self.records.remove(entity_key).is_some();
        let had_links = self.links.remove(entity_key).is_some();
        had_records || had_links
    }

    /// Removes every stored variant of `base` from an entity. Empty entities
    /// left behind are dropped entirely.
    pub fn delete_field(&mut self, entity_key: &str, base: &str) -> bool {
        let mut removed = false;
        if let Some(entity) = self.records.get_mut(entity_key) {
            let before = entity.len();
            entity.retain(|field, _| !matches_field(field, base));
            removed |= entity.len() != before;
            if entity.is_empty() {
                self.records.remove(entity_key);
            }
        }
        if let Some(entity) = self.links.get_mut(entity_key) {
            let before = entity.len();
            entity.retain(|field, _| !matches_field(field, base));
            removed |= entity.len() != before;
            if entity.is_empty() {
                self.links.remove(entity_key);
            }
        }
        removed
    }

    /// Removes a single store field name from an entity.
    pub fn delete_variant(&mut self, entity_key: &str, field_key: &str) {
        if let Some(entity) = self.records.get_mut(entity_key) {
            entity.remove(field_key);
            if entity.is_empty() {
                self.records.remove(entity_key);
            }
        }
        if let Some(entity) = self.links.get_mut(entity_key) {
            entity.remove(field_key);
            if entity.is_empty() {
                self.links.remove(entity_key);
            }
        }
    }

    /// Every store field name of `base` currently stored for an entity.
    pub fn field_variants(&self, entity_key: &str, base: &str) -> Vec<String> {
        let mut variants: Vec<String> = Vec::new();
        if let Some(entity) = self.records.get(entity_key) {
            variants.extend(
                entity
                    .keys()
                    .filter(|field| matches_field(field, base))
                    .cloned()
            );
        }
        if let Some(entity) = self.links.get(entity_key) {
            for field in entity.keys() {
                if matches_field(field, base) && !variants.iter().any(|v| v == field) {
                    variants.push(field.clone());
                }
            }
        }
        variants.sort();
        variants
    }

    /// All entity keys present in either map.
    pub fn entity_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.records.keys().cloned().collect();
        for key in self.links.keys() {
            if !self.records.contains_key(key) {
                keys.push(key.clone());
            }
        }
        keys
    }

    pub fn links_of<'a>(&'a self, entity_key: &str) -> impl Iterator<Item = &'a Link> {
        self.links
            .get(entity_key)
            .into_iter()
            .flat_map(|entity| entity.values())
    }

    /// The flat snapshot: one JSON object per entity, links as ref markers.
    pub fn to_snapshot(&self) -> Value {
        let mut out = serde_json::Map::new();
        for key in self.entity_keys() {
            let mut entity = serde_json::Map::new();
            if let Some(fields) = self.records.get(&key) {
                for (field, value) in fields {
                    entity.insert(field.clone(), value.clone());
                }
            }
            if let Some(fields) = self.links.get(&key) {
                for (field, link) in fields {
                    entity.insert(field.clone(), link.to_snapshot_value());
                }
            }
            out.insert(key, Value::Object(entity));
        }
        Value::Object(out)
    }

    /// Rebuilds storage from a snapshot in the `to_snapshot` format.
    pub fn from_snapshot(snapshot: &Value) -> Result<Self, StoreError> {
        let entities = snapshot
            .as_object()
            .ok_or_else(|| StoreError::MalformedSnapshot {
                reason: "top level must be an object mapping entity keys to records".to_string()
            })?;

        let mut data = InMemoryData::new();
        for (entity_key, record) in entities {
            let fields = record
                .as_object()
                .ok_or_else(|| StoreError::MalformedSnapshot {
                    reason: format!("entity \"{}\" is not an object", entity_key)
                })?;
            for (field_key, value) in fields {
                if let Some(link) = Link::from_snapshot_value(value) {
                    data.write_link(entity_key.clone(), field_key.clone(), link);
                } else {
                    data.write_record(entity_key.clone(), field_key.clone(), value.clone());
                }
            }
        }
        Ok(data)
    }
}
