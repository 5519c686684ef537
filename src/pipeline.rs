//! One poll cycle: fetch, parse, project, publish.
//!
//! The host drives [`run_cycle`] on its own schedule. A [`PollContext`] holds
//! the settings for one source and the latest [`IngestionResult`]; taking it
//! by `&mut` keeps cycles for a source from overlapping. The new result is
//! published only once it is complete, so readers see either the previous
//! cycle's result or the new one. Dropping a cycle mid-fetch leaves the
//! published result untouched.

use crate::feed::{
    clamp_item_count, parse_feed, project, FeedSource, FetchError, Fetcher, FilterCriteria,
    ParsedFeed, ProjectedEntry, DEFAULT_FEED_URL, DEFAULT_ITEM_COUNT,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Source configuration as supplied by the host or the setup wizard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSettings {
    pub feed_url: String,
    pub identifier: String,
    pub station: String,
    pub count: u8,
    /// Also filter by identifier/station locally, not just via the query.
    #[serde(default)]
    pub local_filter: bool,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            identifier: String::new(),
            station: String::new(),
            count: DEFAULT_ITEM_COUNT,
            local_filter: false,
        }
    }
}

impl FeedSettings {
    /// Settings against the default ODIN feed. `count` is clamped to 1..=20.
    pub fn new(identifier: impl Into<String>, station: impl Into<String>, count: i64) -> Self {
        Self {
            identifier: identifier.into(),
            station: station.into(),
            count: clamp_item_count(count),
            ..Self::default()
        }
    }

    pub fn with_feed_url(mut self, feed_url: impl Into<String>) -> Self {
        self.feed_url = feed_url.into();
        self
    }

    pub fn with_local_filter(mut self, local_filter: bool) -> Self {
        self.local_filter = local_filter;
        self
    }

    pub fn source(&self) -> FeedSource {
        FeedSource::alarms(
            self.feed_url.as_str(),
            &self.identifier,
            &self.station,
            self.count,
        )
    }

    pub fn criteria(&self) -> FilterCriteria {
        let criteria = FilterCriteria::limit(self.count);
        if self.local_filter {
            criteria
                .with_identifier(self.identifier.as_str())
                .with_station(self.station.as_str())
        } else {
            criteria
        }
    }

    /// Stable name for this source, e.g. `112odin_4001`.
    pub fn unique_id(&self) -> String {
        if self.identifier.is_empty() {
            "112odin_default".to_string()
        } else {
            format!("112odin_{}", self.identifier)
        }
    }
}

/// Number of items in the latest result, or unknown after a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemCount {
    Known(usize),
    Unknown,
}

impl fmt::Display for ItemCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemCount::Known(n) => write!(f, "{n}"),
            ItemCount::Unknown => f.write_str("unknown"),
        }
    }
}

impl Serialize for ItemCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ItemCount::Known(n) => serializer.serialize_u64(*n as u64),
            ItemCount::Unknown => serializer.serialize_str("unknown"),
        }
    }
}

/// Outcome of one poll cycle.
///
/// A failed fetch always yields `Unknown` with no items; items from an
/// earlier cycle are never carried over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionResult {
    pub count: ItemCount,
    pub items: Vec<ProjectedEntry>,
    pub fetched_at: DateTime<Utc>,
}

impl IngestionResult {
    pub fn unknown(at: DateTime<Utc>) -> Self {
        Self {
            count: ItemCount::Unknown,
            items: Vec::new(),
            fetched_at: at,
        }
    }

    pub fn from_items(items: Vec<ProjectedEntry>, at: DateTime<Utc>) -> Self {
        Self {
            count: ItemCount::Known(items.len()),
            items,
            fetched_at: at,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.count == ItemCount::Unknown
    }
}

/// The result as handed to the host: a scalar state plus attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub unique_id: String,
    pub state: ItemCount,
    pub attributes: SnapshotAttributes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotAttributes {
    pub entries: Vec<ProjectedEntry>,
    /// ISO-8601 UTC, e.g. `2025-01-06T10:15:00Z`
    pub last_update: String,
    pub rss_url: String,
}

impl Snapshot {
    pub fn new(settings: &FeedSettings, result: &IngestionResult) -> Self {
        Self {
            unique_id: settings.unique_id(),
            state: result.count,
            attributes: SnapshotAttributes {
                entries: result.items.clone(),
                last_update: result
                    .fetched_at
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
                rss_url: settings.source().url().to_string(),
            },
        }
    }
}

/// Per-source state carried between poll cycles.
pub struct PollContext {
    settings: FeedSettings,
    latest: watch::Sender<Arc<IngestionResult>>,
}

impl PollContext {
    /// Starts with an `Unknown` result until the first cycle completes.
    pub fn new(settings: FeedSettings) -> Self {
        let (latest, _) = watch::channel(Arc::new(IngestionResult::unknown(Utc::now())));
        Self { settings, latest }
    }

    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    /// Applies new settings; they take effect on the next cycle.
    pub fn update_settings(&mut self, settings: FeedSettings) {
        tracing::info!(
            source = %settings.unique_id(),
            count = settings.count,
            "Feed settings updated"
        );
        self.settings = settings;
    }

    pub fn latest(&self) -> Arc<IngestionResult> {
        Arc::clone(&self.latest.borrow())
    }

    /// Receiver that sees every published result.
    pub fn subscribe(&self) -> watch::Receiver<Arc<IngestionResult>> {
        self.latest.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(&self.settings, &self.latest())
    }
}

/// Fetches the source and parses the body on the blocking pool.
pub async fn fetch_parsed(fetcher: &Fetcher, source: &FeedSource) -> Result<ParsedFeed, FetchError> {
    let bytes = fetcher.fetch(source).await?;
    let parsed = match tokio::task::spawn_blocking(move || parse_feed(&bytes)).await {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(error = %e, "Feed parse task did not complete");
            ParsedFeed::failed(e.to_string())
        }
    };

    if let Some(warning) = &parsed.warning {
        tracing::warn!(
            url = %source.url(),
            recovered = parsed.entries.len(),
            warning = %warning,
            "Feed parsed with warnings"
        );
    }

    Ok(parsed)
}

/// Runs fetch, parse and project once for `settings`.
///
/// Never fails: a fetch that exhausts its retries gives an `Unknown` result.
/// The fetcher has already logged the failure.
pub async fn ingest(fetcher: &Fetcher, settings: &FeedSettings) -> IngestionResult {
    let source = settings.source();
    let parsed = match fetch_parsed(fetcher, &source).await {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::debug!(source = %settings.unique_id(), error = %e, "Cycle ends without data");
            return IngestionResult::unknown(Utc::now());
        }
    };

    let items = project(&parsed.entries, &settings.criteria());
    tracing::debug!(
        source = %settings.unique_id(),
        parsed = parsed.entries.len(),
        kept = items.len(),
        "Feed projected"
    );
    IngestionResult::from_items(items, Utc::now())
}

/// Runs one cycle and publishes its result, replacing the previous one.
pub async fn run_cycle(fetcher: &Fetcher, ctx: &mut PollContext) -> Arc<IngestionResult> {
    let result = Arc::new(ingest(fetcher, &ctx.settings).await);
    ctx.latest.send_replace(Arc::clone(&result));
    tracing::info!(
        source = %ctx.settings.unique_id(),
        state = %result.count,
        "Feed cycle complete"
    );
    result
}
