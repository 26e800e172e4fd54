//! HTTP response transmission engine.
//!
//! Takes an already-resolved [`ResponseDescriptor`] and drives it to the
//! client: conditional 304 evaluation, payload marshalling, header
//! finalization, error adaptation, content-encoding negotiation, and the
//! streaming transmitter with its first-wins termination handling.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use egress_http::{Connection, Headers};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

mod conditional;
pub mod descriptor;
pub mod encoding;
pub mod fail;
mod headers;
mod marshal;
pub mod payload;
pub mod transmit;

#[cfg(test)]
pub(crate) mod testing;

pub use descriptor::{ResponseDescriptor, Variety};
pub use encoding::ContentEncoding;
pub use fail::HttpError;
pub use payload::{BoxPayload, BytesPayload, EmptyPayload, PayloadSource, StreamPayload};
pub use transmit::{TerminationCause, Transmission};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Produces the final byte stream and headers for a descriptor. Payload-type
/// serialization policy lives behind this seam, not in the engine.
pub trait PayloadMarshaller: Send + Sync {
    fn marshall<'a>(
        &'a self,
        request: &'a RequestContext,
        response: &'a mut ResponseDescriptor,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Applies cross-cutting header policy (date, server identity, cache
/// directives). The engine only calls it and propagates its failures.
pub trait HeaderComposer: Send + Sync {
    fn apply<'a>(
        &'a self,
        request: &'a RequestContext,
        response: &'a mut ResponseDescriptor,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Optional passive observer of pre-encoding body bytes.
pub trait InspectionTap: Send + Sync {
    /// A sink for byte copies, or None to disable tapping for this exchange.
    fn tap(&self) -> Option<mpsc::UnboundedSender<Bytes>>;
}

/// The request half of one exchange, as transmission sees it: method,
/// request headers, the already-negotiated encoding preference, and the
/// JSONP callback when the route asked for one.
#[derive(Debug, Default)]
pub struct RequestContext {
    method: String,
    headers: Headers,
    preferred_encoding: ContentEncoding,
    jsonp: Option<String>,
}

impl RequestContext {
    pub fn new(method: &str) -> Self {
        Self {
            method: method.to_ascii_lowercase(),
            ..Self::default()
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn set_headers(&mut self, headers: Headers) {
        self.headers = headers;
    }

    pub fn preferred_encoding(&self) -> ContentEncoding {
        self.preferred_encoding
    }

    pub fn set_preferred_encoding(&mut self, encoding: ContentEncoding) {
        self.preferred_encoding = encoding;
    }

    pub fn jsonp(&self) -> Option<&str> {
        self.jsonp.as_deref()
    }

    pub fn set_jsonp(&mut self, callback: impl Into<String>) {
        self.jsonp = Some(callback.into());
    }
}

/// One request/response pair on one connection. Created per exchange, moved
/// into [`Engine::send`], never reused.
pub struct Exchange {
    pub request: RequestContext,
    pub response: ResponseDescriptor,
    pub connection: Connection,
    disconnect: Option<oneshot::Sender<()>>,
}

impl Exchange {
    pub fn new(
        request: RequestContext,
        response: ResponseDescriptor,
        connection: Connection,
    ) -> Self {
        Self {
            request,
            response,
            connection,
            disconnect: None,
        }
    }

    /// Subscribe to the at-most-once "disconnected" notification fired when
    /// the exchange ends on anything but a normal finish.
    pub fn on_disconnect(&mut self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.disconnect = Some(tx);
        rx
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub compression: bool,
    pub compression_level: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            compression: true,
            compression_level: 6,
        }
    }
}

/// The transmission engine. Holds the collaborator seams and per-process
/// options; every exchange flows through [`Engine::send`].
pub struct Engine {
    marshaller: Box<dyn PayloadMarshaller>,
    composer: Box<dyn HeaderComposer>,
    tap: Option<Box<dyn InspectionTap>>,
    options: EngineOptions,
}

impl Engine {
    pub fn new(
        marshaller: Box<dyn PayloadMarshaller>,
        composer: Box<dyn HeaderComposer>,
    ) -> Self {
        Self {
            marshaller,
            composer,
            tap: None,
            options: EngineOptions::default(),
        }
    }

    pub fn with_tap(mut self, tap: Box<dyn InspectionTap>) -> Self {
        self.tap = Some(tap);
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Transmit the exchange's response. Always returns exactly once; every
    /// failure on the way is adapted into a transmitted error response, and
    /// every transport outcome collapses into the returned summary.
    pub async fn send(&self, exchange: Exchange) -> Transmission {
        self.send_inner(exchange, false).await
    }

    /// Transmit an error outcome directly: the synthesized response replaces
    /// whatever the exchange carried. Used when the application itself
    /// failed before a response descriptor existed.
    pub async fn send_error(&self, mut exchange: Exchange, error: HttpError) -> Transmission {
        exchange.response = fail::to_response(&error);
        self.send_inner(exchange, true).await
    }

    /// `is_error_reentry` structurally enforces the non-recursion invariant
    /// of the failure adapter: the error path re-enters this function once,
    /// and a failing re-entry is swallowed instead of adapted again.
    fn send_inner(
        &self,
        mut exchange: Exchange,
        is_error_reentry: bool,
    ) -> BoxFuture<'_, Transmission> {
        Box::pin(async move {
            if !is_error_reentry
                && conditional::not_modified(
                    exchange.request.method(),
                    exchange.request.headers(),
                    exchange.response.headers(),
                )
            {
                exchange.response.set_status(304);
            }

            if let Err(err) = marshal::marshal(
                self.marshaller.as_ref(),
                self.composer.as_ref(),
                &exchange.request,
                &mut exchange.response,
            )
            .await
            {
                if !is_error_reentry {
                    let normalized = HttpError::normalize(err);
                    debug!(
                        target: "egress::transmit",
                        status = normalized.status(),
                        error = %normalized,
                        "marshalling failed; adapting into an error response"
                    );
                    exchange.response = fail::to_response(&normalized);
                    return self.send_inner(exchange, true).await;
                }

                // Already transmitting a synthesized error: the original
                // error is authoritative, the secondary failure is dropped.
                debug!(
                    target: "egress::transmit",
                    error = %err,
                    "ignoring failure while preparing an error response"
                );
            }

            let Exchange {
                request,
                response,
                connection,
                disconnect,
            } = exchange;

            transmit::transmit(
                &request,
                response,
                connection,
                self.tap.as_ref().and_then(|t| t.tap()),
                disconnect,
                transmit::TransmitOptions {
                    compression: self.options.compression,
                    compression_level: self.options.compression_level,
                },
            )
            .await
        })
    }
}
