//! Configuration types and loading for llm-patch

mod backend;
mod loader;

pub use backend::BackendConfig;
pub use loader::LlmPatchConfig;
