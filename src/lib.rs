//! Offline-first capture for field inspections.
//!
//! Folder and asset writes made on a device without connectivity are queued
//! locally and replayed against the remote document store when the network
//! returns. See [`offline::OfflineQueue`].

pub mod config;
pub mod offline;
pub mod remote;
pub mod storage;
