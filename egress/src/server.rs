//! Accept loop and per-connection handling for the demo server. One
//! exchange per connection: read the request head, build the exchange,
//! hand it to the engine.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use egress_config::EgressConfig;
use egress_http::{Connection, ConnectionHandle, Headers};
use egress_transmit::descriptor::ResponseDescriptor;
use egress_transmit::{ContentEncoding, Engine, Exchange, RequestContext};
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Duration, timeout};
use tracing::{debug, info, warn};

use crate::app;

pub async fn run(cfg: EgressConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(cfg.http().listen()).await?;
    info!(target: "egress::server", listen = %cfg.http().listen(), "Listening");

    let cfg = Arc::new(cfg);
    let engine = Arc::new(app::build_engine(&cfg));

    loop {
        let (stream, client_addr) = listener.accept().await?;
        let engine = Arc::clone(&engine);
        let cfg = Arc::clone(&cfg);

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, client_addr, engine, cfg).await {
                warn!(
                    target: "egress::server",
                    client = %client_addr,
                    error = %e,
                    "Connection handling failed"
                );
            }
        });
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    client_addr: SocketAddr,
    engine: Arc<Engine>,
    cfg: Arc<EgressConfig>,
) -> anyhow::Result<()> {
    debug!(target: "egress::server", client = %client_addr, "Handling new client connection");

    let read_timeout = Duration::from_secs(cfg.http().client_read_timeout_secs());
    let max_headers = cfg.http().max_request_headers_bytes() as usize;

    let Some(head) = read_request_head(&mut stream, read_timeout, max_headers).await? else {
        return Ok(());
    };

    let raw_path = head.path.clone();
    let (path, jsonp) = split_target(&raw_path);

    let mut request = RequestContext::new(&head.method);
    request.set_preferred_encoding(ContentEncoding::negotiate(
        head.headers.get("accept-encoding"),
    ));
    if let Some(callback) = jsonp {
        request.set_jsonp(callback);
    }
    request.set_headers(head.headers);

    let (read_half, write_half) = stream.into_split();
    let (connection, handle) = Connection::new(Box::new(write_half));
    watch_client(read_half, handle);

    let method = request.method().to_string();
    match app::route(&method, path) {
        Ok(response) => {
            engine.send(Exchange::new(request, response, connection)).await;
        }
        Err(err) => {
            let placeholder = ResponseDescriptor::plain(serde_json::Value::Null);
            engine
                .send_error(Exchange::new(request, placeholder, connection), err)
                .await;
        }
    }

    Ok(())
}

/// Observe the read half while the response is in flight: EOF means the
/// client closed, a read error means it went away hard. Either way the
/// engine finds out through the connection handle.
fn watch_client(mut read_half: OwnedReadHalf, handle: ConnectionHandle) {
    tokio::spawn(async move {
        let mut tmp = [0u8; 1024];
        loop {
            match read_half.read(&mut tmp).await {
                Ok(0) => {
                    handle.close();
                    break;
                }
                // Pipelined bytes are ignored; this demo serves one
                // exchange per connection.
                Ok(_) => {}
                Err(_) => {
                    handle.abort();
                    break;
                }
            }
        }
    });
}

#[derive(Debug)]
struct RequestHead {
    method: String,
    path: String,
    headers: Headers,
}

/// Read until the end of the header block and parse it. `Ok(None)` means
/// the client never sent a usable head (idle timeout, early EOF, oversized
/// headers); the connection is simply dropped.
async fn read_request_head(
    stream: &mut TcpStream,
    read_timeout: Duration,
    max_headers: usize,
) -> anyhow::Result<Option<RequestHead>> {
    let mut buf = BytesMut::new();
    let mut tmp = [0u8; 4096];

    let headers_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if max_headers > 0 && buf.len() > max_headers {
            debug!(target: "egress::server", "Request head too large; dropping connection");
            return Ok(None);
        }
        match timeout(read_timeout, stream.read(&mut tmp)).await {
            Ok(Ok(0)) => return Ok(None),
            Ok(Ok(n)) => buf.extend_from_slice(&tmp[..n]),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                debug!(target: "egress::server", "Timed out reading request head");
                return Ok(None);
            }
        }
    };

    let head = String::from_utf8_lossy(&buf[..headers_end]).to_string();
    Ok(parse_request_head(&head))
}

fn parse_request_head(raw: &str) -> Option<RequestHead> {
    let mut lines = raw.lines();
    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut headers = Headers::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        headers.append(name.trim(), value.trim());
    }

    Some(RequestHead {
        method,
        path,
        headers,
    })
}

/// Split a request target into its path and an optional JSONP callback
/// taken from the `callback` query parameter.
fn split_target(target: &str) -> (&str, Option<&str>) {
    let Some((path, query)) = target.split_once('?') else {
        return (target, None);
    };
    let callback = query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == "callback")
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty());
    (path, callback)
}
