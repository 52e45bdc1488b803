//! Fetcher that never reaches upstream.

use async_trait::async_trait;
use pitdata_core::{FetchError, FetchOutcome, FetchRequest, Fetcher};
use tracing::trace;

/// A fetcher that refuses every request.
///
/// With it, fresh caches are served as usual and anything that would need a
/// refresh fails with [`FetchError::Offline`]. Useful for inspecting what is
/// already on disk without touching the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineFetcher;

impl OfflineFetcher {
    /// Create a new offline fetcher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Fetcher for OfflineFetcher {
    fn name(&self) -> &str {
        "offline"
    }

    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<FetchOutcome, FetchError> {
        trace!(entity = %request.entity, kind = %request.kind, "OfflineFetcher: refusing fetch");
        Err(FetchError::Offline {
            entity: request.entity.symbol(),
            kind: request.kind,
        })
    }
}
