//! Collaborator doubles shared by the crate's test modules.

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::descriptor::ResponseDescriptor;
use crate::payload::BytesPayload;
use crate::{BoxFuture, HeaderComposer, InspectionTap, PayloadMarshaller, RequestContext};

/// Serializes the descriptor's raw value as a JSON body and sets the
/// matching headers. Stream descriptors already carry their bytes.
pub(crate) struct JsonMarshaller;

impl PayloadMarshaller for JsonMarshaller {
    fn marshall<'a>(
        &'a self,
        _request: &'a RequestContext,
        response: &'a mut ResponseDescriptor,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            if let Some(raw) = response.raw() {
                let body = serde_json::to_vec(raw)?;
                response
                    .headers_mut()
                    .set("content-type", "application/json; charset=utf-8");
                response
                    .headers_mut()
                    .set("content-length", body.len().to_string());
                response.set_payload(Box::new(BytesPayload::new(body)));
            }
            Ok(())
        })
    }
}

/// Fails every call: the persistently broken serializer.
pub(crate) struct FailingMarshaller;

impl PayloadMarshaller for FailingMarshaller {
    fn marshall<'a>(
        &'a self,
        _request: &'a RequestContext,
        _response: &'a mut ResponseDescriptor,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async { Err(anyhow::anyhow!("marshalling failed")) })
    }
}

/// Fails the first call, then behaves like [`JsonMarshaller`]: the shape
/// of a payload whose serialization failed but whose error response
/// marshals fine.
pub(crate) struct FailOnceMarshaller {
    failed: AtomicBool,
}

impl FailOnceMarshaller {
    pub(crate) fn new() -> Self {
        Self {
            failed: AtomicBool::new(false),
        }
    }
}

impl PayloadMarshaller for FailOnceMarshaller {
    fn marshall<'a>(
        &'a self,
        request: &'a RequestContext,
        response: &'a mut ResponseDescriptor,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            if !self.failed.swap(true, Ordering::AcqRel) {
                return Err(anyhow::anyhow!("marshalling failed"));
            }
            JsonMarshaller.marshall(request, response).await
        })
    }
}

/// A composer with no policy at all.
pub(crate) struct NoopComposer;

impl HeaderComposer for NoopComposer {
    fn apply<'a>(
        &'a self,
        _request: &'a RequestContext,
        _response: &'a mut ResponseDescriptor,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Fails every call: a hard header-composition error.
pub(crate) struct FailingComposer;

impl HeaderComposer for FailingComposer {
    fn apply<'a>(
        &'a self,
        _request: &'a RequestContext,
        _response: &'a mut ResponseDescriptor,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async { Err(anyhow::anyhow!("composition failed")) })
    }
}

/// Stamps a marker header, to observe ordering against pass-through.
pub(crate) struct StampingComposer(pub(crate) &'static str);

impl HeaderComposer for StampingComposer {
    fn apply<'a>(
        &'a self,
        _request: &'a RequestContext,
        response: &'a mut ResponseDescriptor,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            response.headers_mut().set(self.0, "on");
            Ok(())
        })
    }
}

/// A tap backed by an unbounded channel.
pub(crate) struct ChannelTap {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl ChannelTap {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl InspectionTap for ChannelTap {
    fn tap(&self) -> Option<mpsc::UnboundedSender<Bytes>> {
        Some(self.tx.clone())
    }
}
