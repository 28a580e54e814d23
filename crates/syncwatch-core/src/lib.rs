//! SyncWatch Core - Domain types and port definitions
//!
//! This crate holds everything the monitoring engine and its adapters agree on:
//! - **Domain types** - `WatchedResource`, `SubscriptionId`, `ChangeBatch`,
//!   `DirectorySnapshot`, `CloudItem`, `SearchPredicate`
//! - **Configuration** - YAML-backed [`config::Config`] with validation and a builder
//! - **Port definitions** - Traits for adapters: `ICloudItemSearch`, `ISearchSession`,
//!   `IFileProbe`, plus the [`ports::WatchHandle`] cancellation guard
//!
//! # Architecture
//!
//! Ports are implemented by adapter code in `syncwatch-monitor` (the xattr
//! polling search and the local file probe) and by in-memory fakes in tests.
//! The domain module performs no I/O.

pub mod config;
pub mod domain;
pub mod ports;
