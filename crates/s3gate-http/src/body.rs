//! Gateway response body supporting buffered, empty, and streaming modes.
//!
//! - **Buffered**: small responses such as XML error documents.
//! - **Empty**: responses with no body content.
//! - **Streaming**: backend response bodies passed through unbuffered.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::Full;

/// Response body used throughout the gateway.
///
/// Implements [`http_body::Body`] so it can be used directly with hyper
/// responses.
#[derive(Debug, Default)]
pub enum GatewayBody {
    /// Buffered body for error documents and other small payloads.
    Buffered(Full<Bytes>),
    /// Empty body.
    #[default]
    Empty,
    /// Streaming passthrough of a backend response body.
    Streaming(BoxBody<Bytes, std::io::Error>),
}

impl GatewayBody {
    /// Create a buffered body from bytes.
    #[must_use]
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::Buffered(Full::new(data.into()))
    }

    /// Create an empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::Empty
    }

    /// Wrap a backend body for streaming passthrough.
    #[must_use]
    pub fn streaming(body: BoxBody<Bytes, std::io::Error>) -> Self {
        Self::Streaming(body)
    }
}

impl http_body::Body for GatewayBody {
    type Data = Bytes;
    type Error = std::io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            Self::Buffered(full) => Pin::new(full)
                .poll_frame(cx)
                .map_err(|never| match never {}),
            Self::Empty => Poll::Ready(None),
            Self::Streaming(inner) => Pin::new(inner).poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Buffered(full) => full.is_end_stream(),
            Self::Empty => true,
            Self::Streaming(inner) => inner.is_end_stream(),
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            Self::Buffered(full) => full.size_hint(),
            Self::Empty => http_body::SizeHint::with_exact(0),
            Self::Streaming(inner) => inner.size_hint(),
        }
    }
}
