//! # Batch API Client
//!
//! Transport abstraction and HTTP implementation for the charting batch
//! endpoints. The [`BatchTransport`] trait is the seam tests and embedding
//! applications use to substitute the backend.

pub mod http;
pub mod transport;

pub use http::HttpBatchClient;
pub use transport::BatchTransport;
