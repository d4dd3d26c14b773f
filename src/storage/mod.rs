pub mod engine;
pub mod identifiers;
pub mod local;

pub use engine::*;
pub use identifiers::{IdentifierStore, PersistenceError};
pub use local::LocalStorage;
