//! # spacesync remote
//!
//! Client side of the remote document-space service.
//!
//! This crate provides:
//! - The [`RemoteService`] trait the sync engine is written against
//! - Typed payloads: [`Document`], [`DocumentSummary`], [`AttachmentMeta`]
//! - A REST implementation, [`ConfluenceRemote`], over a pluggable [`HttpClient`]
//! - An in-memory implementation, [`MemoryRemote`], for tests
//!
//! ## Error model
//!
//! Callers branch on [`RemoteError`] kinds: `NotFound` and `VersionConflict`
//! are distinguishable from generic transport failures, and transport
//! failures carry the HTTP status and raw body when a response was received.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod http;
mod memory;
mod service;
mod types;

pub use config::{RemoteConfig, RetryConfig};
pub use error::{RemoteError, RemoteResult};
pub use http::{ConfluenceRemote, HttpClient, HttpRequest, HttpResponse, Method};
pub use memory::{MemoryRemote, RemoteCall};
pub use service::RemoteService;
pub use types::{
    AttachmentFilter, AttachmentMeta, AttachmentMetadata, Body, Document, DocumentStatus,
    DocumentSummary, STORAGE_REPRESENTATION,
};
