//! Feed handling for the ODIN alarm RSS feed.
//!
//! Three stages, run in order by [`crate::pipeline`]:
//!
//! - **Fetching**: HTTP GET with per-attempt timeout and exponential backoff
//! - **Parsing**: RSS/Atom into raw entries, with a lenient salvage pass for
//!   malformed documents
//! - **Projection**: filtering by alarm group / station and capping the item
//!   count
//!
//! # Architecture
//!
//! - [`fetcher`] - `reqwest`-based fetching and query building
//! - [`parser`] - `feed-rs` parsing plus a `quick-xml` fallback scan
//! - [`extract`] - `beredskabsID=` / `enhed=` marker extraction
//! - [`project`] - filter criteria, projected entries and distinct value sets
//!
//! # Example
//!
//! ```ignore
//! use odin_feed::feed::{
//!     parse_feed, project, FeedSource, Fetcher, FilterCriteria, RetryPolicy, DEFAULT_FEED_URL,
//! };
//!
//! let fetcher = Fetcher::new(RetryPolicy::default())?;
//! let bytes = fetcher.fetch(&FeedSource::alarms(DEFAULT_FEED_URL, "4001", "", 5)).await?;
//! let parsed = parse_feed(&bytes);
//! let items = project(&parsed.entries, &FilterCriteria::limit(5));
//! ```

pub mod extract;
pub mod fetcher;
pub mod parser;
pub mod project;

pub use extract::{derive_station, extract_marker, IDENTIFIER_MARKER, STATION_MARKER};
pub use fetcher::{FeedSource, FetchError, Fetcher, NotReady, RetryPolicy, DEFAULT_FEED_URL};
pub use parser::{parse_feed, ParsedFeed, RawFeedEntry};
pub use project::{
    clamp_item_count, distinct_identifiers, distinct_stations, project, FilterCriteria,
    ProjectedEntry, DEFAULT_ITEM_COUNT, MAX_ITEM_COUNT, MIN_ITEM_COUNT,
};
