use std::time::Duration;

use gen3d_core::error::CoreError;
use gen3d_db::store::StoreError;
use gen3d_providers::ProviderError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// No adapter is registered under this provider name.
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("{provider} status query exceeded {timeout:?}")]
    QueryTimeout { provider: String, timeout: Duration },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// The provider rejected the operation as unsupported.
    pub fn is_unsupported_operation(&self) -> bool {
        matches!(self, ServiceError::Provider(ProviderError::Unsupported { .. }))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ServiceError::QueryTimeout { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ServiceError::Core(CoreError::NotFound { .. } | CoreError::NotFoundByKey { .. })
        )
    }
}
