//! Feedkeeper - a feed subscription store
//!
//! Users register feed sources; each sync fetches the source's document,
//! normalizes entry timestamps and stores only the entries not seen before.

pub mod config;
pub mod db;
pub mod entries;
pub mod error;
pub mod fetcher;
pub mod routes;
pub mod sources;
pub mod sync;
pub mod timestamp;
