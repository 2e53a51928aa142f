use crate::{
    error::StoreError,
    store::{
        data::{self, InMemoryData, Link},
        normalizer::{Normalizer, StagedField},
        resolver::Resolver
    },
    types::{FieldModifiers, FieldSelector, FieldValue, Modified, StoreOptions},
    HashMap, HashSet
};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::VecDeque;
use tracing::{debug, trace};

/// The normalized entity store.
///
/// All writes (`write_query`, `modify`, `evict`, `gc`, `restore`) run under
/// a single write lock for their whole normalize-and-merge unit, so readers
/// never observe a half-merged multi-entity write. Reads share a read lock
/// and don't block each other. Writes apply in lock order; sequencing of
/// out-of-order responses is the caller's concern.
pub struct Store {
    data: RwLock<InMemoryData>,
    custom_keys: HashMap<&'static str, String>
}

impl Default for Store {
    fn default() -> Self {
        Self::with_options(StoreOptions::default())
    }
}

impl Store {
    /// A store with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with the given [`StoreOptions`].
    pub fn with_options(options: StoreOptions) -> Self {
        let custom_keys = options.custom_keys.unwrap_or_default().into_iter().collect();
        Store {
            data: RwLock::new(InMemoryData::new()),
            custom_keys
        }
    }

    /// Computes the entity key of an entity-shaped value without writing it.
    ///
    /// Returns `None` for values that carry no identity (no `__typename`, or
    /// no id field per the configured key rule). Independent of field order
    /// in the input.
    pub fn identify(&self, object: &Value) -> Option<String> {
        data::key_of(&self.custom_keys, object.as_object()?)
    }

    /// Normalizes `payload` under `root_key` guided by `selection` and
    /// merges the result into the store.
    ///
    /// Merging is last-write-wins per store field name; fields absent from
    /// the payload keep their stored value, so two writes with disjoint
    /// field sets union. The same rule applies within one payload: when an
    /// entity field is reached through several paths, the occurrence visited
    /// last wins, whether it normalized to an inlined record or to a link.
    /// Returns the set of entity keys the write touched.
    ///
    /// Normalization stages everything before the merge: a payload that
    /// fails to normalize (e.g. [`StoreError::AmbiguousKey`]) leaves the
    /// store exactly as it was.
    pub fn write_query(
        &self,
        root_key: &str,
        selection: &[FieldSelector],
        payload: &Value
    ) -> Result<HashSet<String>, StoreError> {
        let write = Normalizer::new(&self.custom_keys).normalize(root_key, selection, payload)?;
        let dependencies = write.dependencies;

        let mut data = self.data.write();
        for (entity_key, fields) in write.fields {
            trace!(entity = %entity_key, fields = fields.len(), "merging staged fields");
            for (field_key, staged) in fields {
                match staged {
                    StagedField::Record(value) => {
                        data.write_record(entity_key.clone(), field_key, value)
                    }
                    StagedField::Link(link) => {
                        data.write_link(entity_key.clone(), field_key, link)
                    }
                }
            }
        }
        drop(data);

        debug!(root = root_key, entities = dependencies.len(), "write merged");
        Ok(dependencies)
    }

    /// Reconstructs the selected shape from the store.
    ///
    /// Fails with [`StoreError::MissingField`] when a selected field was
    /// never written (an explicitly cached `null` is a value, not a miss)
    /// and with [`StoreError::DanglingReference`] when a link points at an
    /// evicted entity.
    pub fn read_query(
        &self,
        root_key: &str,
        selection: &[FieldSelector]
    ) -> Result<Value, StoreError> {
        let data = self.data.read();
        Resolver::new(&data).resolve_entity(root_key, selection)
    }

    /// Reads a single field of an entity without resolving the record.
    ///
    /// A relation field comes back as an unresolved [`FieldValue::Link`];
    /// the caller decides whether to follow it, and a dangling target only
    /// surfaces if it does. `None` means the field was never written.
    pub fn read_field(
        &self,
        entity_key: &str,
        field_name: &str,
        args: Option<&Value>
    ) -> Option<FieldValue> {
        let field_key = match args {
            Some(args) => data::field_key(field_name, &data::serialize_args(args)),
            None => field_name.to_string()
        };
        let data = self.data.read();
        read_field_value(&data, entity_key, &field_key)
    }

    /// Runs field modifiers against an entity.
    ///
    /// Each modifier runs once per stored variant of its field, with a
    /// [`ModifyHelpers`] naming the exact variant, so a modifier targeting
    /// one argument set can skip the others. Returns true when at least one
    /// variant was visited.
    pub fn modify(&self, entity_key: &str, mut modifiers: FieldModifiers<'_>) -> bool {
        let mut data = self.data.write();
        let mut changed = false;
        for (base, modifier) in modifiers.fields.iter_mut() {
            for store_field_name in data.field_variants(entity_key, base) {
                let current = match read_field_value(&data, entity_key, &store_field_name) {
                    Some(value) => value,
                    None => continue
                };
                let outcome = {
                    let helpers = ModifyHelpers {
                        data: &*data,
                        custom_keys: &self.custom_keys,
                        field_name: base,
                        store_field_name: &store_field_name
                    };
                    modifier(current, &helpers)
                };
                match outcome {
                    Modified::Value(FieldValue::Scalar(value)) => {
                        data.write_record(entity_key.to_string(), store_field_name, value);
                    }
                    Modified::Value(FieldValue::Link(link)) => {
                        data.write_link(entity_key.to_string(), store_field_name, link);
                    }
                    Modified::Delete => data.delete_variant(entity_key, &store_field_name)
                }
                changed = true;
            }
        }
        changed
    }

    /// Removes an entire entity, or every stored variant of one of its
    /// fields.
    ///
    /// Links elsewhere in the store are left alone, so eviction can leave
    /// dangling references behind; run [`Store::gc`] afterwards to reclaim
    /// whatever became unreachable. Evicting something absent is a no-op
    /// returning false.
    pub fn evict(&self, entity_key: &str, field_name: Option<&str>) -> bool {
        let mut data = self.data.write();
        let removed = match field_name {
            Some(field) => data.delete_field(entity_key, field),
            None => data.delete_entity(entity_key)
        };
        drop(data);
        if removed {
            debug!(key = entity_key, field = ?field_name, "evicted");
        }
        removed
    }

    /// Removes every entity unreachable from the root records.
    ///
    /// Reachability is a breadth-first walk over live links starting at the
    /// operation roots (`Query`, `Mutation`, `Subscription`), so a group of
    /// entities referencing each other in a cycle is still collected once
    /// nothing on a root path points into it. Returns the removed keys,
    /// sorted.
    pub fn gc(&self) -> Vec<String> {
        let mut data = self.data.write();

        let mut reachable: HashSet<String> = HashSet::default();
        let mut queue: VecDeque<String> = VecDeque::new();
        for key in data.entity_keys() {
            if data::is_root(&key) {
                reachable.insert(key.clone());
                queue.push_back(key);
            }
        }
        while let Some(key) = queue.pop_front() {
            let mut targets = Vec::new();
            for link in data.links_of(&key) {
                link.collect_keys(&mut targets);
            }
            for target in targets {
                if reachable.insert(target.to_string()) {
                    queue.push_back(target.to_string());
                }
            }
        }

        let mut removed: Vec<String> = data
            .entity_keys()
            .into_iter()
            .filter(|key| !reachable.contains(key))
            .collect();
        for key in &removed {
            data.delete_entity(key);
        }
        drop(data);

        removed.sort();
        debug!(removed = removed.len(), "gc sweep finished");
        removed
    }

    /// The full store contents as one flat JSON object: entity key to
    /// record, links as `{"ref": key}` markers (arrays of markers for
    /// lists), parameterized fields under their `name({args})` keys.
    pub fn extract(&self) -> Value {
        self.data.read().to_snapshot()
    }

    /// Replaces the store contents with a snapshot in the [`Store::extract`]
    /// format. All-or-nothing: a malformed snapshot leaves the store as it
    /// was.
    ///
    /// The snapshot format reserves `{"ref": <key|null>}` objects (and
    /// non-empty arrays of them) as link markers. An inlined record value of
    /// exactly that shape is therefore reinterpreted as a link here; record
    /// values with any other key set round-trip unchanged.
    pub fn restore(&self, snapshot: &Value) -> Result<(), StoreError> {
        let new_data = InMemoryData::from_snapshot(snapshot)?;
        *self.data.write() = new_data;
        debug!("store restored from snapshot");
        Ok(())
    }
}

fn read_field_value(
    data: &InMemoryData,
    entity_key: &str,
    field_key: &str
) -> Option<FieldValue> {
    if let Some(value) = data.read_record(entity_key, field_key) {
        return Some(FieldValue::Scalar(value.clone()));
    }
    data.read_link(entity_key, field_key)
        .map(|link| FieldValue::Link(link.clone()))
}

/// Capabilities handed to a field modifier, scoped to the exact field
/// variant it is looking at.
pub struct ModifyHelpers<'a> {
    data: &'a InMemoryData,
    custom_keys: &'a HashMap<&'static str, String>,
    field_name: &'a str,
    store_field_name: &'a str
}

impl ModifyHelpers<'_> {
    /// The base field name the modifier was registered under.
    pub fn field_name(&self) -> &str {
        self.field_name
    }

    /// The full store field name of the variant being modified, including
    /// serialized arguments.
    pub fn store_field_name(&self) -> &str {
        self.store_field_name
    }

    /// The arguments of the variant being modified, parsed back into a
    /// value. `None` for the bare, argument-less variant.
    pub fn args(&self) -> Option<Value> {
        let rest = &self.store_field_name[self.field_name.len()..];
        let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
        serde_json::from_str(inner).ok()
    }

    /// Reads a field of any entity by its exact store field name, without
    /// resolving links.
    pub fn read_field(&self, entity_key: &str, field_key: &str) -> Option<FieldValue> {
        read_field_value(self.data, entity_key, field_key)
    }

    /// Computes a link for an entity-shaped value without writing anything.
    pub fn to_reference(&self, object: &Value) -> Option<Link> {
        object
            .as_object()
            .and_then(|fields| data::key_of(self.custom_keys, fields))
            .map(Link::Single)
    }
}
