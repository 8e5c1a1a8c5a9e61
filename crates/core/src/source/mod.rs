//! The boundary between the feed engine and whatever serves the records.
//!
//! The engine only ever sees `PageBatch<R>`. Transport, auth and payload
//! quirks belong to the `RecordSource` implementation.

pub mod memory;
pub mod normalize;

use std::sync::Arc;

use ledger_feed_protocol::{PageBatch, PageRequest};

use crate::error::SourceError;

pub use memory::{FilterTarget, MemorySource};
pub use normalize::normalize_payload;

/// A remote, server-paginated record store.
///
/// Implementations must return exactly the requested page or an error. They
/// must not retry on the engine's behalf: retries are caller-initiated.
#[async_trait::async_trait]
pub trait RecordSource: Send + Sync {
    type Record: Send;

    async fn fetch_page(
        &self,
        request: &PageRequest,
    ) -> Result<PageBatch<Self::Record>, SourceError>;
}

#[async_trait::async_trait]
impl<S: RecordSource + ?Sized> RecordSource for Arc<S> {
    type Record = S::Record;

    async fn fetch_page(
        &self,
        request: &PageRequest,
    ) -> Result<PageBatch<Self::Record>, SourceError> {
        (**self).fetch_page(request).await
    }
}
