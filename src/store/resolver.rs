use crate::{
    error::StoreError,
    store::data::{InMemoryData, Link},
    types::FieldSelector
};
use serde_json::{Map, Value};

/// Selection-guided reconstruction of nested values from the flat store.
///
/// Recursion depth is bounded by the selection, so reads over cyclic entity
/// graphs terminate: a cycle is only followed as deep as the caller asked.
pub struct Resolver<'a> {
    data: &'a InMemoryData
}

impl<'a> Resolver<'a> {
    pub fn new(data: &'a InMemoryData) -> Self {
        Resolver { data }
    }

    pub fn resolve_entity(
        &self,
        entity_key: &str,
        selection: &[FieldSelector]
    ) -> Result<Value, StoreError> {
        let mut out = Map::new();
        for selector in selection {
            let field_key = selector.field_key();
            let value = match selector {
                FieldSelector::Scalar(_, _) => self
                    .data
                    .read_record(entity_key, &field_key)
                    .cloned()
                    .ok_or_else(|| missing(entity_key, field_key))?,
                FieldSelector::Object(_, _, subselection) => {
                    match self.data.read_link(entity_key, &field_key) {
                        Some(link) => self.resolve_link(link, subselection)?,
                        // An object field without a link is either an inlined
                        // identity-less value (stored verbatim) or missing.
                        None => self
                            .data
                            .read_record(entity_key, &field_key)
                            .cloned()
                            .ok_or_else(|| missing(entity_key, field_key))?
                    }
                }
            };
            out.insert(selector.name().to_string(), value);
        }
        Ok(Value::Object(out))
    }

    fn resolve_link(
        &self,
        link: &Link,
        subselection: &[FieldSelector]
    ) -> Result<Value, StoreError> {
        match link {
            Link::Null => Ok(Value::Null),
            Link::Single(entity_key) => {
                if !self.data.has_entity(entity_key) {
                    return Err(StoreError::DanglingReference {
                        key: entity_key.clone()
                    });
                }
                self.resolve_entity(entity_key, subselection)
            }
            Link::List(items) => items
                .iter()
                .map(|item| self.resolve_link(item, subselection))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
    }
}

fn missing(entity_key: &str, field_key: String) -> StoreError {
    StoreError::MissingField {
        key: entity_key.to_string(),
        field: field_key
    }
}
