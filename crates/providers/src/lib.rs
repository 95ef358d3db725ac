//! Provider adapters for remote 3D generation services.
//!
//! Each provider implements [`ProviderAdapter`], translating the uniform
//! task record into its own submit/query/download calls. Adapters are
//! collected into an [`AdapterRegistry`] at startup and looked up by the
//! task's `provider` name.

pub mod adapter;
pub mod error;
mod http;
pub mod hunyuan;
pub mod meshy;
pub mod registry;
pub mod storage;

pub use adapter::{DownloadResult, ProviderAdapter, RemoteStatus};
pub use error::ProviderError;
pub use registry::AdapterRegistry;
