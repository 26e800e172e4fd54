//! Payload marshalling: decide whether the exchange needs a body at all,
//! then hand over to the payload collaborator and header finalization.

use crate::descriptor::ResponseDescriptor;
use crate::headers::finalize;
use crate::payload::EmptyPayload;
use crate::{HeaderComposer, PayloadMarshaller, RequestContext};

/// HEAD requests and 304 responses transmit no body: the current payload
/// source is dropped (released) and the empty stream takes its place. A 304
/// additionally must not resend the validators the client already has.
/// Every other response gets its final byte stream from the collaborator.
pub(crate) async fn marshal(
    marshaller: &dyn PayloadMarshaller,
    composer: &dyn HeaderComposer,
    request: &RequestContext,
    response: &mut ResponseDescriptor,
) -> anyhow::Result<()> {
    if request.method() == "head" || response.status() == 304 {
        response.set_payload(Box::new(EmptyPayload));
        response.headers_mut().remove("content-length");

        if response.status() == 304 {
            response.headers_mut().remove("etag");
            response.headers_mut().remove("last-modified");
        }
    } else {
        marshaller.marshall(request, response).await?;
    }

    finalize(composer, request, response).await
}
