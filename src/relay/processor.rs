//! Interface to the external request processor.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::{json, Value};

use crate::relay::message::{InboundMessage, OutboundPacket, StreamState};
use crate::relay::queue::{EnqueueOutcome, OutboundQueue};

/// Handle through which processors deliver responses.
///
/// Cheap to clone; enqueueing never blocks.
#[derive(Debug, Clone)]
pub struct Outbound {
    queue: Arc<OutboundQueue>,
}

impl Outbound {
    pub(crate) fn new(queue: Arc<OutboundQueue>) -> Self {
        Self { queue }
    }

    pub fn enqueue(&self, packet: OutboundPacket) -> EnqueueOutcome {
        self.queue.enqueue(packet)
    }

    /// Wrap `data` in a packet for `stream_name` and queue it.
    pub fn transmit(
        &self,
        stream_name: impl Into<String>,
        state: StreamState,
        data: Value,
    ) -> EnqueueOutcome {
        self.enqueue(OutboundPacket::new(stream_name, state, data))
    }

    /// Number of packets waiting for the writer.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

/// Consumes reassembled messages and answers through [`Outbound`].
///
/// The returned future is spawned by the relay; the reader never waits on it.
pub trait Processor: Send + Sync + 'static {
    fn process(&self, message: InboundMessage, outbound: Outbound) -> BoxFuture<'static, ()>;
}

/// Adapter that turns an async closure into a [`Processor`].
pub struct FnProcessor<F>(F);

/// Build a processor from an async closure.
pub fn processor_fn<F, Fut>(f: F) -> FnProcessor<F>
where
    F: Fn(InboundMessage, Outbound) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    FnProcessor(f)
}

impl<F, Fut> Processor for FnProcessor<F>
where
    F: Fn(InboundMessage, Outbound) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn process(&self, message: InboundMessage, outbound: Outbound) -> BoxFuture<'static, ()> {
        Box::pin((self.0)(message, outbound))
    }
}

/// Default processor served by the HTTP host.
///
/// `Data` messages are answered with their request echoed back under the
/// same stream and id. `Noop` gets no reply, `Error` is logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoProcessor;

impl Processor for EchoProcessor {
    fn process(&self, message: InboundMessage, outbound: Outbound) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            match message.state {
                StreamState::Data => {
                    let data = json!({
                        "id": message.data.id,
                        "response": message.data.request.unwrap_or(Value::Null),
                    });
                    outbound.transmit(message.stream_name, StreamState::Data, data);
                }
                StreamState::Noop => {
                    tracing::trace!(stream = %message.stream_name, id = %message.data.id, "Noop message");
                }
                StreamState::Error => {
                    tracing::warn!(
                        stream = %message.stream_name,
                        id = %message.data.id,
                        "Peer reported a stream error"
                    );
                }
            }
        })
    }
}
