use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use futures_core::Stream;
use serde_json::Value;

use crate::error::ConnectError;

/// Response body chunks as they arrive off the wire.
pub type SseByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, ConnectError>> + Send>>;

pub type TransportFuture = Pin<Box<dyn Future<Output = Result<SseByteStream, ConnectError>> + Send>>;

#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

/// Sends a JSON POST and hands back the streaming response body.
///
/// The future resolves once the backend accepted the request; a rejected
/// request (non-success status, connection failure) is an `Err` there. A
/// failure while reading the body is an `Err` item on the byte stream.
pub trait SseTransport: Send + Sync {
    fn post(&self, request: TransportRequest) -> TransportFuture;
}
