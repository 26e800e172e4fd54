//! The streaming transmitter: negotiates content encoding, writes the
//! response head, pipes payload → tap → encoder → connection, and reconciles
//! every termination signal into exactly one terminal outcome.

use std::io;

use bytes::Bytes;
use egress_http::{Connection, ConnectionEvent};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::descriptor::{ResponseDescriptor, Variety};
use crate::encoding::StreamEncoder;
use crate::RequestContext;

/// Why the exchange ended. Exactly one of these is produced per exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCause {
    /// Body fully flushed.
    Finished,
    /// The client went away; no end-of-response is written.
    Aborted,
    /// The connection closed before the body finished.
    Closed,
    /// The payload source (or the encoder fed from it) failed.
    SourceError,
    /// The transport itself failed.
    ConnectionError,
}

impl TerminationCause {
    fn event_marker(&self) -> Option<&'static str> {
        match self {
            TerminationCause::Aborted => Some(ConnectionEvent::Aborted.as_str()),
            TerminationCause::Closed => Some(ConnectionEvent::Closed.as_str()),
            _ => None,
        }
    }
}

/// Terminal outcome of one transmission. Returned exactly once per exchange.
#[derive(Debug)]
pub struct Transmission {
    pub cause: TerminationCause,
    pub error: Option<String>,
}

impl Transmission {
    pub fn is_normal(&self) -> bool {
        self.cause == TerminationCause::Finished
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TransmitOptions {
    pub compression: bool,
    pub compression_level: u32,
}

pub(crate) async fn transmit(
    request: &RequestContext,
    response: ResponseDescriptor,
    mut connection: Connection,
    tap: Option<mpsc::UnboundedSender<Bytes>>,
    disconnect: Option<oneshot::Sender<()>>,
    options: TransmitOptions,
) -> Transmission {
    let (status, mut headers, mut source, variety, raw) = response.into_parts();

    // Test-support side channel, not wire data.
    if connection.is_injected()
        && variety == Variety::Plain
        && let Some(value) = raw
    {
        connection.attach_result(value);
    }

    // Content encoding: only when nothing upstream already encoded the body
    // and there is a body to encode. Once a compressor is in the pipeline
    // the advertised length is no longer accurate.
    let mut encoder = None;
    if options.compression
        && !headers.contains("content-encoding")
        && !source.is_empty_source()
    {
        let encoding = request.preferred_encoding();
        if let Some(selected) = StreamEncoder::for_encoding(encoding, options.compression_level) {
            headers.remove("content-length");
            headers.set("content-encoding", encoding.as_str());
            headers.vary("accept-encoding");
            encoder = Some(selected);
        }
    }

    // The event subscription is the single-consumer claim over termination:
    // it exists before any byte flows, this loop is its only consumer, and
    // the first signal out of it (or out of the write path) wins.
    let mut events = connection.take_events();

    if let Err(err) = connection.write_head(status, &headers).await {
        return finish(
            connection,
            disconnect,
            TerminationCause::ConnectionError,
            Some(err),
        )
        .await;
    }

    let (cause, error) = loop {
        tokio::select! {
            event = next_event(&mut events) => match event {
                ConnectionEvent::Aborted => break (TerminationCause::Aborted, None),
                ConnectionEvent::Closed => break (TerminationCause::Closed, None),
                ConnectionEvent::Errored => break (TerminationCause::ConnectionError, None),
            },
            chunk = source.next() => match chunk {
                Some(Ok(bytes)) => {
                    if let Some(tap) = &tap {
                        let _ = tap.send(bytes.clone());
                    }
                    let outcome = match &mut encoder {
                        Some(enc) => match enc.encode(&bytes) {
                            Ok(encoded) => connection.write_chunk(&encoded).await,
                            Err(err) => break (TerminationCause::SourceError, Some(err)),
                        },
                        None => connection.write_chunk(&bytes).await,
                    };
                    if let Err(err) = outcome {
                        break (TerminationCause::ConnectionError, Some(err));
                    }
                }
                Some(Err(err)) => break (TerminationCause::SourceError, Some(err)),
                None => {
                    if let Some(enc) = encoder.take() {
                        match enc.finish() {
                            Ok(tail) => {
                                if !tail.is_empty()
                                    && let Err(err) = connection.write_chunk(&tail).await
                                {
                                    break (TerminationCause::ConnectionError, Some(err));
                                }
                            }
                            Err(err) => break (TerminationCause::SourceError, Some(err)),
                        }
                    }
                    break (TerminationCause::Finished, None);
                }
            },
        }
    };

    // Dropping the subscription deregisters this exchange: signals raised
    // after the claim land in a closed channel and are ignored.
    drop(events);

    finish(connection, disconnect, cause, error).await
}

/// Wait for a lifecycle event. A dropped handle is not a signal; the branch
/// just goes quiet.
async fn next_event(
    events: &mut Option<mpsc::UnboundedReceiver<ConnectionEvent>>,
) -> ConnectionEvent {
    loop {
        match events {
            Some(rx) => match rx.recv().await {
                Some(event) => return event,
                None => *events = None,
            },
            None => std::future::pending::<()>().await,
        }
    }
}

/// The single terminal path: end-of-response (unless aborted), disconnect
/// notification for non-normal outcomes, tag-list logging, and the summary
/// the caller's completion contract rides on.
async fn finish(
    mut connection: Connection,
    disconnect: Option<oneshot::Sender<()>>,
    cause: TerminationCause,
    error: Option<io::Error>,
) -> Transmission {
    if cause != TerminationCause::Aborted
        && let Err(err) = connection.end().await
    {
        debug!(target: "egress::transmit", error = %err, "end-of-response failed");
    }

    let normal = cause == TerminationCause::Finished && error.is_none();

    if !normal && let Some(tx) = disconnect {
        let _ = tx.send(());
    }

    let mut tags = vec!["egress", "response"];
    if !normal {
        tags.push("error");
    }
    if let Some(marker) = cause.event_marker() {
        tags.push(marker);
    }

    if normal {
        info!(target: "egress::transmit", tags = ?tags, "response transmitted");
    } else {
        warn!(
            target: "egress::transmit",
            tags = ?tags,
            cause = ?cause,
            error = error.as_ref().map(|e| e.to_string()),
            "response terminated"
        );
    }

    Transmission {
        cause,
        error: error.map(|e| e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{transmit, TerminationCause, TransmitOptions};
    use crate::descriptor::ResponseDescriptor;
    use crate::encoding::ContentEncoding;
    use crate::payload::{BytesPayload, StreamPayload};
    use crate::RequestContext;
    use bytes::Bytes;
    use egress_http::Connection;
    use std::io;
    use std::io::Read;
    use tokio::sync::{mpsc, oneshot};

    const OPTIONS: TransmitOptions = TransmitOptions {
        compression: true,
        compression_level: 6,
    };

    fn body_of(wire: &[u8]) -> Vec<u8> {
        let pos = wire
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("head terminator");
        wire[pos + 4..].to_vec()
    }

    fn head_of(wire: &[u8]) -> String {
        let pos = wire
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("head terminator");
        String::from_utf8(wire[..pos].to_vec()).expect("utf8 head")
    }

    #[tokio::test]
    async fn identity_transmission_preserves_content_length() {
        let request = RequestContext::new("GET");
        let response = ResponseDescriptor::stream(Box::new(BytesPayload::new("hello")))
            .header("content-length", "5");
        let (conn, _handle, inspection) = Connection::injected();

        let outcome = transmit(&request, response, conn, None, None, OPTIONS).await;
        assert_eq!(outcome.cause, TerminationCause::Finished);

        let wire = inspection.wire();
        assert!(head_of(&wire).contains("content-length: 5"));
        assert_eq!(body_of(&wire), b"hello");
    }

    #[tokio::test]
    async fn gzip_negotiation_rewrites_headers_and_compresses() {
        let mut request = RequestContext::new("GET");
        request.set_preferred_encoding(ContentEncoding::Gzip);

        let response = ResponseDescriptor::stream(Box::new(BytesPayload::new("hello world")))
            .header("Content-Length", "11");
        let (conn, _handle, inspection) = Connection::injected();

        let outcome = transmit(&request, response, conn, None, None, OPTIONS).await;
        assert_eq!(outcome.cause, TerminationCause::Finished);

        let wire = inspection.wire();
        let head = head_of(&wire);
        assert!(!head.to_ascii_lowercase().contains("content-length"));
        assert!(head.contains("content-encoding: gzip"));
        assert!(head.contains("vary: accept-encoding"));

        let body = body_of(&wire);
        let mut decoder = flate2::read::GzDecoder::new(&body[..]);
        let mut out = String::new();
        decoder.read_to_string(&mut out).expect("gzip body");
        assert_eq!(out, "hello world");
    }

    #[tokio::test]
    async fn preset_content_encoding_suppresses_negotiation() {
        let mut request = RequestContext::new("GET");
        request.set_preferred_encoding(ContentEncoding::Gzip);

        let response = ResponseDescriptor::stream(Box::new(BytesPayload::new("raw")))
            .header("content-encoding", "br")
            .header("content-length", "3");
        let (conn, _handle, inspection) = Connection::injected();

        transmit(&request, response, conn, None, None, OPTIONS).await;

        let head = head_of(&inspection.wire());
        assert!(head.contains("content-encoding: br"));
        assert!(head.contains("content-length: 3"));
        assert_eq!(body_of(&inspection.wire()), b"raw");
    }

    #[tokio::test]
    async fn empty_payload_is_never_encoded() {
        let mut request = RequestContext::new("HEAD");
        request.set_preferred_encoding(ContentEncoding::Gzip);

        let mut response = ResponseDescriptor::plain(serde_json::json!(null));
        response.set_payload(Box::new(crate::payload::EmptyPayload));
        let (conn, _handle, inspection) = Connection::injected();

        let outcome = transmit(&request, response, conn, None, None, OPTIONS).await;
        assert_eq!(outcome.cause, TerminationCause::Finished);

        let wire = inspection.wire();
        assert!(!head_of(&wire).contains("content-encoding"));
        assert!(body_of(&wire).is_empty());
    }

    #[tokio::test]
    async fn tap_receives_pre_encoding_bytes() {
        let mut request = RequestContext::new("GET");
        request.set_preferred_encoding(ContentEncoding::Gzip);

        let response = ResponseDescriptor::stream(Box::new(BytesPayload::new("plaintext")));
        let (conn, _handle, _inspection) = Connection::injected();
        let (tap_tx, mut tap_rx) = mpsc::unbounded_channel();

        transmit(&request, response, conn, Some(tap_tx), None, OPTIONS).await;

        let copied = tap_rx.recv().await.expect("tap chunk");
        assert_eq!(&copied[..], b"plaintext");
    }

    #[tokio::test]
    async fn abort_skips_end_of_response_and_notifies() {
        let request = RequestContext::new("GET");

        // A pending stream: the payload never produces, so only the abort
        // can end the exchange.
        let response = ResponseDescriptor::stream(Box::new(StreamPayload::new(
            tokio_stream::pending::<io::Result<Bytes>>(),
        )));
        let (conn, handle, inspection) = Connection::injected();
        let (disc_tx, disc_rx) = oneshot::channel();

        handle.abort();
        let outcome = transmit(&request, response, conn, None, Some(disc_tx), OPTIONS).await;

        assert_eq!(outcome.cause, TerminationCause::Aborted);
        assert!(disc_rx.await.is_ok());
        assert!(!inspection.ended());
    }

    #[tokio::test]
    async fn close_still_ends_the_response() {
        let request = RequestContext::new("GET");
        let response = ResponseDescriptor::stream(Box::new(StreamPayload::new(
            tokio_stream::pending::<io::Result<Bytes>>(),
        )));
        let (conn, handle, inspection) = Connection::injected();
        let (disc_tx, disc_rx) = oneshot::channel();

        handle.close();
        let outcome = transmit(&request, response, conn, None, Some(disc_tx), OPTIONS).await;

        assert_eq!(outcome.cause, TerminationCause::Closed);
        assert!(disc_rx.await.is_ok());
        assert!(inspection.ended());
    }

    #[tokio::test]
    async fn connection_error_event_terminates_with_error_outcome() {
        let request = RequestContext::new("GET");
        let response = ResponseDescriptor::stream(Box::new(StreamPayload::new(
            tokio_stream::pending::<io::Result<Bytes>>(),
        )));
        let (conn, handle, inspection) = Connection::injected();
        let (disc_tx, disc_rx) = oneshot::channel();

        handle.error();
        let outcome = transmit(&request, response, conn, None, Some(disc_tx), OPTIONS).await;

        assert_eq!(outcome.cause, TerminationCause::ConnectionError);
        assert!(disc_rx.await.is_ok());
        // Unlike an abort, a transport error still gets end-of-response.
        assert!(inspection.ended());
    }

    #[tokio::test]
    async fn same_tick_close_and_error_terminate_once() {
        let request = RequestContext::new("GET");
        let response = ResponseDescriptor::stream(Box::new(StreamPayload::new(
            tokio_stream::pending::<io::Result<Bytes>>(),
        )));
        let (conn, handle, _inspection) = Connection::injected();

        // Both signals land before the loop observes either; first wins,
        // the other is ignored, and transmit still returns exactly once.
        handle.close();
        handle.error();
        let outcome = transmit(&request, response, conn, None, None, OPTIONS).await;
        assert_eq!(outcome.cause, TerminationCause::Closed);
    }

    #[tokio::test]
    async fn source_error_terminates_with_error_outcome() {
        let request = RequestContext::new("GET");
        let failing = tokio_stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::other("stream broke")),
        ]);
        let response = ResponseDescriptor::stream(Box::new(StreamPayload::new(failing)));
        let (conn, _handle, inspection) = Connection::injected();
        let (disc_tx, disc_rx) = oneshot::channel();

        let outcome = transmit(&request, response, conn, None, Some(disc_tx), OPTIONS).await;

        assert_eq!(outcome.cause, TerminationCause::SourceError);
        assert_eq!(outcome.error.as_deref(), Some("stream broke"));
        assert!(disc_rx.await.is_ok());
        // The partial chunk made it out before the failure.
        assert_eq!(body_of(&inspection.wire()), b"partial");
    }

    #[tokio::test]
    async fn dropped_handle_is_not_a_termination_signal() {
        let request = RequestContext::new("GET");
        let response = ResponseDescriptor::stream(Box::new(BytesPayload::new("ok")));
        let (conn, handle, inspection) = Connection::injected();
        drop(handle);

        let outcome = transmit(&request, response, conn, None, None, OPTIONS).await;
        assert_eq!(outcome.cause, TerminationCause::Finished);
        assert_eq!(body_of(&inspection.wire()), b"ok");
    }

    #[tokio::test]
    async fn plain_variety_attaches_raw_result_to_injected_connection() {
        let request = RequestContext::new("GET");
        let mut response = ResponseDescriptor::plain(serde_json::json!({"answer": 42}));
        response.set_payload(Box::new(BytesPayload::new("{\"answer\":42}")));
        let (conn, _handle, inspection) = Connection::injected();

        transmit(&request, response, conn, None, None, OPTIONS).await;

        assert_eq!(
            inspection.result(),
            Some(serde_json::json!({"answer": 42}))
        );
    }

    #[tokio::test]
    async fn stream_variety_attaches_nothing() {
        let request = RequestContext::new("GET");
        let response = ResponseDescriptor::stream(Box::new(BytesPayload::new("data")));
        let (conn, _handle, inspection) = Connection::injected();

        transmit(&request, response, conn, None, None, OPTIONS).await;
        assert!(inspection.result().is_none());
    }

    #[tokio::test]
    async fn compression_disabled_by_options() {
        let mut request = RequestContext::new("GET");
        request.set_preferred_encoding(ContentEncoding::Gzip);

        let response = ResponseDescriptor::stream(Box::new(BytesPayload::new("plain")))
            .header("content-length", "5");
        let (conn, _handle, inspection) = Connection::injected();

        let options = TransmitOptions {
            compression: false,
            compression_level: 6,
        };
        transmit(&request, response, conn, None, None, options).await;

        let head = head_of(&inspection.wire());
        assert!(!head.contains("content-encoding"));
        assert!(head.contains("content-length: 5"));
        assert_eq!(body_of(&inspection.wire()), b"plain");
    }
}
