//! NewsDrip - A cached news feed aggregator
//!
//! This crate pulls RSS, RDF and Atom feeds from several sources, normalizes
//! them into one story shape, drops duplicates and serves the merged, newest
//! first list from a short-lived cache over a small JSON API.

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod fetcher;
pub mod heuristics;
pub mod normalize;
pub mod routes;
pub mod story;
pub mod xml;
