//! Persistence layer: durable (on-disk) and ephemeral (in-memory,
//! read-through) state stores behind one [`StateStore`] trait, plus the
//! hierarchy-handler registry and enumeration walk that back the `state`
//! command and `destroy`'s id lookup.

mod backend;
mod durable;
mod enumerate;
mod ephemeral;
mod error;
mod path;
mod registry;

pub use backend::{get_typed, put_typed, StateStore};
pub use durable::DurableStore;
pub use enumerate::{enumerate, EnumeratedDocument};
pub use ephemeral::EphemeralStore;
pub use error::StoreError;
pub use path::document_path;
pub use registry::{HandlerRegistry, HierarchyHandler};
