//! Header finalization: JSONP wrapping, the external header-composition
//! collaborator, and pass-through merging of payload-source headers.

use crate::descriptor::ResponseDescriptor;
use crate::{HeaderComposer, RequestContext};

pub(crate) async fn finalize(
    composer: &dyn HeaderComposer,
    request: &RequestContext,
    response: &mut ResponseDescriptor,
) -> anyhow::Result<()> {
    if let Some(callback) = request.jsonp()
        && response.payload_mut().wrap_jsonp(callback)
    {
        response
            .headers_mut()
            .set("content-type", "text/javascript");
        // The wrap grew the body; an already-set length must follow it.
        if response.headers().contains("content-length")
            && let Some(len) = response.payload().byte_len()
        {
            response.headers_mut().set("content-length", len.to_string());
        }
    }

    // Cross-cutting header policy (date, vary, cache directives) is not
    // ours; failures propagate untouched.
    composer.apply(request, response).await?;

    if response.pass_through_enabled()
        && let Some(source_headers) = response.payload().source_headers().cloned()
    {
        let local = std::mem::take(response.headers_mut());

        // Source headers are the base, the response's own win on conflict.
        let mut merged = source_headers.clone();
        for (name, values) in local.iter() {
            merged.set_all(name, values.to_vec());
        }

        // set-cookie concatenates instead: source cookies first, then the
        // response's own, so no cookie is lost to an overwrite.
        let source_cookies = source_headers.get_all("set-cookie");
        let local_cookies = local.get_all("set-cookie");
        if !source_cookies.is_empty() && !local_cookies.is_empty() {
            let mut cookies = source_cookies.to_vec();
            cookies.extend(local_cookies.iter().cloned());
            merged.set_all("set-cookie", cookies);
        }

        response.set_headers(merged);
    }

    Ok(())
}
