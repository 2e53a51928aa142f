pub(crate) mod data;
mod normalizer;
mod resolver;
#[allow(clippy::module_inception)]
mod store;

pub use data::Link;
pub use store::{ModifyHelpers, Store};
