//! KindleHarvest - Kindle notebook annotation harvester.
//!
//! Scrapes a reader's highlights and notes from the Kindle notebook page
//! into a local SQLite store, deduplicated across runs, with a Parquet
//! snapshot of the full table rewritten after each harvest.

pub mod cli;
pub mod config;
pub mod models;
pub mod repository;
pub mod schema;
pub mod scrapers;
pub mod services;
pub mod session;
pub mod storage;
