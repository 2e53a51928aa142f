use crate::store::{data, Link, ModifyHelpers};
use serde_json::Value;
use std::collections::HashMap;

/// Options to pass to the store.
#[derive(Default)]
pub struct StoreOptions {
    /// An optional `HashMap` of typenames to unique ID keys.
    /// The keys are the names of the fields, not the IDs themselves.
    /// So if your `User` has a unique ID called `ident`, you should
    /// set `"User" => "ident"`.
    /// The default ID keys are `id` and `_id`, so those don't need to be mapped.
    pub custom_keys: Option<HashMap<&'static str, String>>
}

/// One requested field in a selection shape.
///
/// A selection is a `Vec<FieldSelector>` describing the nested shape to write
/// or read. `Scalar` fields are stored verbatim, `Object` fields are
/// normalized into links (or inlined when the value has no identity) and
/// carry their own subselection.
///
/// Arguments are serialized into the store field name
/// (`"<name>({<serialized-args>})"`), so the same field queried with two
/// different argument sets occupies two independent entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSelector {
    /// A leaf field: `(field name, serialized arguments)`.
    Scalar(String, String),
    /// An entity-valued field: `(field name, serialized arguments, subselection)`.
    Object(String, String, Vec<FieldSelector>)
}

impl FieldSelector {
    /// A scalar field without arguments.
    pub fn scalar(name: impl Into<String>) -> Self {
        FieldSelector::Scalar(name.into(), String::new())
    }

    /// A scalar field with arguments.
    pub fn scalar_args(name: impl Into<String>, args: &Value) -> Self {
        FieldSelector::Scalar(name.into(), data::serialize_args(args))
    }

    /// An object field without arguments.
    pub fn object(name: impl Into<String>, selection: Vec<FieldSelector>) -> Self {
        FieldSelector::Object(name.into(), String::new(), selection)
    }

    /// An object field with arguments.
    pub fn object_args(
        name: impl Into<String>,
        args: &Value,
        selection: Vec<FieldSelector>
    ) -> Self {
        FieldSelector::Object(name.into(), data::serialize_args(args), selection)
    }

    pub(crate) fn name(&self) -> &str {
        match self {
            FieldSelector::Scalar(name, _) => name,
            FieldSelector::Object(name, _, _) => name
        }
    }

    pub(crate) fn args(&self) -> &str {
        match self {
            FieldSelector::Scalar(_, args) => args,
            FieldSelector::Object(_, args, _) => args
        }
    }

    /// The store field name this selector reads and writes.
    pub fn field_key(&self) -> String {
        data::field_key(self.name(), self.args())
    }
}

/// A single stored field value, as handed to [`crate::Store::read_field`]
/// callers and field modifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// A scalar (or inlined non-entity object) stored verbatim.
    Scalar(Value),
    /// An unresolved relation. The caller decides whether to follow it.
    Link(Link)
}

/// The outcome of a field modifier.
pub enum Modified {
    /// Replace the stored value of this field variant.
    Value(FieldValue),
    /// Remove this field variant from the record.
    Delete
}

pub(crate) type ModifierFn<'a> =
    Box<dyn FnMut(FieldValue, &ModifyHelpers<'_>) -> Modified + 'a>;

/// A mapping from base field name to modifier function, passed to
/// [`crate::Store::modify`].
///
/// A modifier registered under `"books"` runs once per stored variant of the
/// field, i.e. once for `books` and once for each
/// `books({...})` argument variant. Use
/// [`ModifyHelpers::store_field_name`](crate::ModifyHelpers::store_field_name)
/// or [`ModifyHelpers::args`](crate::ModifyHelpers::args) inside the closure
/// to skip variants it does not target.
#[derive(Default)]
pub struct FieldModifiers<'a> {
    pub(crate) fields: HashMap<String, ModifierFn<'a>>
}

impl<'a> FieldModifiers<'a> {
    /// An empty modifier set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a modifier for every stored variant of `name`.
    pub fn field<F>(mut self, name: impl Into<String>, modifier: F) -> Self
    where
        F: FnMut(FieldValue, &ModifyHelpers<'_>) -> Modified + 'a
    {
        self.fields.insert(name.into(), Box::new(modifier));
        self
    }
}
