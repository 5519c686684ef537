//! Poller for the ODIN 112 alarm feed.
//!
//! Fetches the feed with retry, parses it tolerantly, and publishes the most
//! recent alarms as a [`pipeline::Snapshot`]. The [`wizard`] module drives
//! the two-step group/station selection used to configure a source.

pub mod config;
pub mod feed;
pub mod pipeline;
pub mod wizard;
