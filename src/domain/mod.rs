//! Domain layer: document contracts, validation and slug derivation.

pub mod documents;
pub mod error;
pub mod slug;

pub use documents::{Document, Record};
