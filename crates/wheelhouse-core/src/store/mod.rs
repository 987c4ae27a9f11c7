// ── Collection storage and reconciliation ──

mod collection;

pub use collection::{CollectionState, CollectionStore};
