//! Reading Source Interface
//!
//! One capability for everything that yields readings: remote feed groups
//! and local probe banks alike. The scheduler is written against this trait
//! only.

use async_trait::async_trait;

use crate::monitor::{error::ProviderError, types::Reading};

/// Result type for source operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Trait for reading sources to keep the pipeline independent of hardware
/// and remote APIs.
#[async_trait]
pub trait ReadingSource {
    /// Fetch the current readings of every source in the group.
    ///
    /// An `Err` means the group as a whole could not be reached. A single
    /// unreadable source is reported as a failed `Reading` instead.
    async fn fetch(&self) -> ProviderResult<Vec<Reading>>;

    /// Name of this source for logging/debugging
    fn source_name(&self) -> &str;
}
