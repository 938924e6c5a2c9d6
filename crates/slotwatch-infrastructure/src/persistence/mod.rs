mod json_store;
mod memory_store;

pub use json_store::{JsonOutcomeStore, OUTCOME_FILE_NAME};
pub use memory_store::InMemoryOutcomeStore;
