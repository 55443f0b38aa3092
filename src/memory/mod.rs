//! OpenMemory HTTP service integration.

pub mod client;
pub mod types;

pub use client::{MemoryServiceApi, MemoryServiceClient};
pub use types::{AddMemoriesResponse, MemoryItem, MemoryPage, MemoryServiceError};
