//! Content-encoding negotiation and the streaming compressors.

use std::io::{self, Write};

use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};

/// The encodings the transmitter can apply. `Identity` means "write bytes
/// as-is"; anything the negotiation does not recognize collapses to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentEncoding {
    #[default]
    Identity,
    Gzip,
    Deflate,
}

impl ContentEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentEncoding::Identity => "identity",
            ContentEncoding::Gzip => "gzip",
            ContentEncoding::Deflate => "deflate",
        }
    }

    /// Pick an encoding from an `accept-encoding` request header. The
    /// supported token with the highest q-weight wins; ties go to the first
    /// listed; `q=0` disables a token. Absent or unsupported values fall
    /// back to identity.
    pub fn negotiate(accept_encoding: Option<&str>) -> Self {
        let Some(raw) = accept_encoding else {
            return ContentEncoding::Identity;
        };

        let mut best = ContentEncoding::Identity;
        let mut best_q = 0.0_f32;
        for entry in raw.split(',') {
            let mut parts = entry.split(';');
            let token = parts.next().unwrap_or("").trim().to_ascii_lowercase();
            let q = parts
                .find_map(|p| p.trim().strip_prefix("q=")?.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            if q <= 0.0 {
                continue;
            }
            let candidate = match token.as_str() {
                "gzip" | "x-gzip" => ContentEncoding::Gzip,
                "deflate" => ContentEncoding::Deflate,
                _ => continue,
            };
            if q > best_q {
                best = candidate;
                best_q = q;
            }
        }

        best
    }
}

/// A streaming compressor for one response body. Chunks go in, compressed
/// bytes come out per chunk (sync-flushed so the client is not starved);
/// `finish` drains the trailer.
pub(crate) enum StreamEncoder {
    Gzip(GzEncoder<Vec<u8>>),
    Deflate(ZlibEncoder<Vec<u8>>),
}

impl StreamEncoder {
    /// None for identity: no compressor, content-length stays accurate.
    pub(crate) fn for_encoding(encoding: ContentEncoding, level: u32) -> Option<Self> {
        let level = Compression::new(level.min(9));
        match encoding {
            ContentEncoding::Identity => None,
            ContentEncoding::Gzip => Some(StreamEncoder::Gzip(GzEncoder::new(Vec::new(), level))),
            ContentEncoding::Deflate => {
                Some(StreamEncoder::Deflate(ZlibEncoder::new(Vec::new(), level)))
            }
        }
    }

    pub(crate) fn encode(&mut self, chunk: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            StreamEncoder::Gzip(enc) => {
                enc.write_all(chunk)?;
                enc.flush()?;
                Ok(std::mem::take(enc.get_mut()))
            }
            StreamEncoder::Deflate(enc) => {
                enc.write_all(chunk)?;
                enc.flush()?;
                Ok(std::mem::take(enc.get_mut()))
            }
        }
    }

    pub(crate) fn finish(self) -> io::Result<Vec<u8>> {
        match self {
            StreamEncoder::Gzip(enc) => enc.finish(),
            StreamEncoder::Deflate(enc) => enc.finish(),
        }
    }
}
