//! Conditional request evaluation: decide whether a response can be
//! downgraded to 304 Not Modified before any payload work happens.

use egress_http::Headers;

/// First match wins: GET/HEAD only, then etag equality against
/// `if-none-match`, then `if-modified-since` vs `last-modified`. Dates that
/// fail to parse are treated as "no match", never as errors. No headers are
/// touched here; validator removal happens during marshalling.
pub(crate) fn not_modified(method: &str, request: &Headers, response: &Headers) -> bool {
    if method != "get" && method != "head" {
        return false;
    }

    if let Some(etag) = response.get("etag")
        && request.get("if-none-match") == Some(etag)
    {
        return true;
    }

    if let (Some(if_modified_since), Some(last_modified)) =
        (request.get("if-modified-since"), response.get("last-modified"))
        && let (Ok(since), Ok(modified)) = (
            httpdate::parse_http_date(if_modified_since),
            httpdate::parse_http_date(last_modified),
        )
    {
        return since >= modified;
    }

    false
}
