//! Payload sources: the lazy byte streams backing response bodies.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use egress_http::Headers;
use tokio_stream::Stream;

/// A response body. Chunks arrive lazily as an async stream; the optional
/// capabilities are resolved by the concrete type at construction, not
/// probed ad hoc.
pub trait PayloadSource: Stream<Item = io::Result<Bytes>> + Send + Unpin {
    /// True for the zero-byte source. Suppresses content-encoding work.
    fn is_empty_source(&self) -> bool {
        false
    }

    /// Exact body size when the source knows it up front.
    fn byte_len(&self) -> Option<u64> {
        None
    }

    /// Headers carried by the source itself, for pass-through merging.
    fn source_headers(&self) -> Option<&Headers> {
        None
    }

    /// Wrap the output in a JSONP callback. Returns false when the source
    /// does not support wrapping.
    fn wrap_jsonp(&mut self, callback: &str) -> bool {
        let _ = callback;
        false
    }
}

pub type BoxPayload = Box<dyn PayloadSource>;

/// The zero-byte stream installed for HEAD and 304 responses.
#[derive(Debug, Default)]
pub struct EmptyPayload;

impl Stream for EmptyPayload {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(None)
    }
}

impl PayloadSource for EmptyPayload {
    fn is_empty_source(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(0)
    }
}

/// An in-memory body. Supports JSONP wrapping and can carry source headers
/// for pass-through merging (an upstream-shaped response, for instance).
#[derive(Debug)]
pub struct BytesPayload {
    chunk: Option<Bytes>,
    headers: Option<Headers>,
}

impl BytesPayload {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            chunk: Some(bytes.into()),
            headers: None,
        }
    }

    pub fn with_headers(bytes: impl Into<Bytes>, headers: Headers) -> Self {
        Self {
            chunk: Some(bytes.into()),
            headers: Some(headers),
        }
    }
}

impl Stream for BytesPayload {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.get_mut().chunk.take().map(Ok))
    }
}

impl PayloadSource for BytesPayload {
    fn byte_len(&self) -> Option<u64> {
        self.chunk.as_ref().map(|c| c.len() as u64)
    }

    fn source_headers(&self) -> Option<&Headers> {
        self.headers.as_ref()
    }

    fn wrap_jsonp(&mut self, callback: &str) -> bool {
        let body = self.chunk.take().unwrap_or_default();
        // U+2028/U+2029 are valid JSON but break inline script execution.
        let escaped = match std::str::from_utf8(&body) {
            Ok(text) => text
                .replace('\u{2028}', "\\u2028")
                .replace('\u{2029}', "\\u2029")
                .into_bytes(),
            Err(_) => body.to_vec(),
        };

        let mut wrapped = Vec::with_capacity(escaped.len() + callback.len() + 8);
        wrapped.extend_from_slice(b"/**/");
        wrapped.extend_from_slice(callback.as_bytes());
        wrapped.push(b'(');
        wrapped.extend_from_slice(&escaped);
        wrapped.extend_from_slice(b");");
        self.chunk = Some(Bytes::from(wrapped));
        true
    }
}

/// Adapter for arbitrary chunk streams (a file reader, an upstream body).
/// No JSONP capability; optionally carries source headers.
pub struct StreamPayload<S> {
    inner: S,
    headers: Option<Headers>,
}

impl<S> StreamPayload<S>
where
    S: Stream<Item = io::Result<Bytes>> + Send + Unpin,
{
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            headers: None,
        }
    }

    pub fn with_headers(inner: S, headers: Headers) -> Self {
        Self {
            inner,
            headers: Some(headers),
        }
    }
}

impl<S> Stream for StreamPayload<S>
where
    S: Stream<Item = io::Result<Bytes>> + Send + Unpin,
{
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

impl<S> PayloadSource for StreamPayload<S>
where
    S: Stream<Item = io::Result<Bytes>> + Send + Unpin,
{
    fn source_headers(&self) -> Option<&Headers> {
        self.headers.as_ref()
    }
}
