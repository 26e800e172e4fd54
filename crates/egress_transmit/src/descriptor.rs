//! The response descriptor threaded through the transmission pipeline.

use egress_http::Headers;

use crate::payload::{BoxPayload, EmptyPayload};

/// Closed payload-kind tag. Only consulted to decide whether the raw result
/// value is exposed to injected connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variety {
    Plain,
    Stream,
}

pub struct ResponseDescriptor {
    status: u16,
    headers: Headers,
    payload: BoxPayload,
    variety: Variety,
    pass_through: bool,
    /// Pre-serialization value of a plain response.
    raw: Option<serde_json::Value>,
}

impl ResponseDescriptor {
    /// A plain response: the raw value is serialized into the final byte
    /// stream by the payload marshaller later; until then the payload slot
    /// holds the empty stream.
    pub fn plain(value: serde_json::Value) -> Self {
        Self {
            status: 200,
            headers: Headers::new(),
            payload: Box::new(EmptyPayload),
            variety: Variety::Plain,
            pass_through: true,
            raw: Some(value),
        }
    }

    /// A response backed by an arbitrary byte stream.
    pub fn stream(payload: BoxPayload) -> Self {
        Self {
            status: 200,
            headers: Headers::new(),
            payload,
            variety: Variety::Stream,
            pass_through: true,
            raw: None,
        }
    }

    pub fn code(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn pass_through(mut self, enabled: bool) -> Self {
        self.pass_through = enabled;
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn variety(&self) -> Variety {
        self.variety
    }

    pub fn pass_through_enabled(&self) -> bool {
        self.pass_through
    }

    pub fn raw(&self) -> Option<&serde_json::Value> {
        self.raw.as_ref()
    }

    pub fn payload(&self) -> &BoxPayload {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut BoxPayload {
        &mut self.payload
    }

    /// Install a new payload source. The previous source is dropped here,
    /// which releases whatever it held open.
    pub fn set_payload(&mut self, payload: BoxPayload) {
        self.payload = payload;
    }

    /// Replace the headers wholesale (pass-through merging).
    pub fn set_headers(&mut self, headers: Headers) {
        self.headers = headers;
    }

    pub(crate) fn into_parts(self) -> (u16, Headers, BoxPayload, Variety, Option<serde_json::Value>) {
        (
            self.status,
            self.headers,
            self.payload,
            self.variety,
            self.raw,
        )
    }
}
