//! HTTP exposure for runnel streams: any stream mounts as a `GET` endpoint
//! whose response is a long-lived chunked body of newline-delimited JSON,
//! filtered by the `n` / `cap` / `recent` query parameters.

pub mod bridge;
pub mod serve;

pub use bridge::{NdjsonBridge, TailQuery};
pub use serve::{serve, stream_endpoint};
