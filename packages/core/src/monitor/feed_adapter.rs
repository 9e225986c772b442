//! Adafruit IO Feed Group Adapter
//!
//! Adapts the AdafruitClient to implement the ReadingSource trait

use async_trait::async_trait;

use crate::monitor::{
    source::{ProviderResult, ReadingSource},
    types::Reading,
};
use crate::services::adafruit::{AdafruitClient, FeedSnapshot};

/// Reads every feed of one Adafruit IO group.
pub struct FeedGroupSource {
    client: AdafruitClient,
    group: String,
}

impl FeedGroupSource {
    pub fn new(client: AdafruitClient, group: impl Into<String>) -> Self {
        Self {
            client,
            group: group.into(),
        }
    }

    /// Convert a feed snapshot to a Reading. The raw value is parsed here;
    /// a value that is not a number becomes an unparsed reading rather than
    /// an error.
    fn convert(snapshot: &FeedSnapshot) -> Reading {
        Reading::from_raw(
            snapshot.key.clone(),
            snapshot.name.clone(),
            snapshot.last_value.as_deref(),
            snapshot.last_updated(),
        )
    }
}

#[async_trait]
impl ReadingSource for FeedGroupSource {
    async fn fetch(&self) -> ProviderResult<Vec<Reading>> {
        let feeds = self.client.group_feeds(&self.group).await?;
        tracing::debug!("Group '{}' returned {} feeds", self.group, feeds.len());
        Ok(feeds.iter().map(Self::convert).collect())
    }

    fn source_name(&self) -> &str {
        "adafruit-io"
    }
}
