//! The demo application behind the engine: a JSON payload marshaller, the
//! header-composition policy, and a tiny route table.

use std::time::SystemTime;

use egress_config::EgressConfig;
use egress_transmit::descriptor::ResponseDescriptor;
use egress_transmit::payload::BytesPayload;
use egress_transmit::{
    BoxFuture, Engine, EngineOptions, HeaderComposer, HttpError, PayloadMarshaller,
    RequestContext,
};

pub fn build_engine(cfg: &EgressConfig) -> Engine {
    Engine::new(
        Box::new(JsonMarshaller),
        Box::new(PolicyComposer {
            server_name: cfg.global().server_name().to_string(),
        }),
    )
    .with_options(EngineOptions {
        compression: cfg.response().compression(),
        compression_level: cfg.response().compression_level(),
    })
}

/// Serializes a plain descriptor's raw value into its final JSON byte
/// stream and sets the matching entity headers.
struct JsonMarshaller;

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

/// Cross-cutting response headers: date, server identity, and the demo's
/// one-exchange-per-connection policy.
struct PolicyComposer {
    server_name: String,
}

impl HeaderComposer for PolicyComposer {
    fn apply<'a>(
        &'a self,
        _request: &'a RequestContext,
        response: &'a mut ResponseDescriptor,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            if !response.headers().contains("date") {
                let date = httpdate::fmt_http_date(SystemTime::now());
                response.headers_mut().set("date", date);
            }
            response.headers_mut().set("server", self.server_name.clone());
            response.headers_mut().set("connection", "close");
            Ok(())
        })
    }
}

/// Resolve a request to a response descriptor. The engine only ever sees
/// the result; route policy stays here.
pub fn route(method: &str, path: &str) -> Result<ResponseDescriptor, HttpError> {
    if method != "get" && method != "head" {
        return Err(
            HttpError::new(405, format!("method {method} not allowed"))
                .with_header("allow", "GET, HEAD"),
        );
    }

    match path {
        "/" => Ok(ResponseDescriptor::plain(serde_json::json!({
            "message": "egress demo",
            "docs": "/health",
        }))
        .header("etag", "\"demo-v1\"")),
        "/health" => Ok(ResponseDescriptor::plain(serde_json::json!({
            "status": "ok",
        }))),
        _ => Err(HttpError::not_found(format!("no route for {path}"))),
    }
}
