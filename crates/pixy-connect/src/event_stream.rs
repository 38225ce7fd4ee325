use std::pin::Pin;

use futures_core::Stream;
use futures_util::StreamExt;

use crate::error::ConnectError;
use crate::event::{StreamEvent, StreamItem};
use crate::monitor::{ProtocolMonitor, StreamOutcome};

/// Lazily pulled event sequence returned by every connector. Nothing happens
/// until the consumer polls it.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamItem> + Send>>;

pub fn from_events(events: Vec<StreamEvent>) -> EventStream {
    Box::pin(futures_util::stream::iter(events.into_iter().map(Ok)))
}

/// Drains `stream`, returning every event or the cancellation that ended it.
pub async fn collect_events(mut stream: EventStream) -> Result<Vec<StreamEvent>, ConnectError> {
    let mut events = Vec::new();
    while let Some(item) = stream.next().await {
        events.push(item?);
    }
    Ok(events)
}

/// Drains `stream` through a [`ProtocolMonitor`] and returns what it
/// accumulated. Protocol violations surface as `ProviderProtocol` errors.
pub async fn collect_outcome(mut stream: EventStream) -> Result<StreamOutcome, ConnectError> {
    let mut monitor = ProtocolMonitor::new();
    while let Some(item) = stream.next().await {
        monitor.observe(&item?)?;
    }
    Ok(monitor.finish()?)
}
