use std::marker::PhantomData;

use async_trait::async_trait;
use bytes::Bytes;
use runnel_core::{Flow, SeqNum, Subscriber, Timestamp, Timestamped};
use serde::Serialize;
use tokio::sync::mpsc;

/// Query parameters recognized on stream endpoints.
///
/// `cap` and `recent` compose; `n` is "cap with blocking until fulfilled"
/// over the most recent records. Without any parameter the response streams
/// indefinitely.
#[derive(Debug, Default, Clone, Copy, serde::Deserialize)]
pub struct TailQuery {
    /// Deliver the `n` most recent records as of the subscription start,
    /// waiting for more if fewer exist so far.
    pub n: Option<u64>,
    /// Stop after this many records have been delivered.
    pub cap: Option<u64>,
    /// Only deliver records whose timestamp is at most this many
    /// milliseconds old.
    pub recent: Option<u64>,
}

/// Subscriber that writes each record as one JSON document per line into a
/// chunked response body.
///
/// A failed chunk send means the client went away; the next entry turns
/// that into a self-stop, which tears the cursor down.
pub struct NdjsonBridge<T> {
    chunk_tx: mpsc::Sender<Bytes>,
    cap: Option<u64>,
    skip_before: SeqNum,
    not_before: Option<Timestamp>,
    sent: u64,
    _record: PhantomData<fn(T)>,
}

impl<T> NdjsonBridge<T> {
    /// `now` and `total` anchor the `recent` and `n` windows; pass the
    /// stream's clock reading and size from the moment the subscription
    /// starts. Records published later never shift either window, so a
    /// capped tail read stays gap-free.
    pub fn new(
        chunk_tx: mpsc::Sender<Bytes>,
        query: TailQuery,
        now: Timestamp,
        total: u64,
    ) -> Self {
        Self {
            chunk_tx,
            cap: query.cap.or(query.n),
            skip_before: query.n.map_or(0, |n| total.saturating_sub(n)),
            not_before: query.recent.map(|window| now.saturating_sub(window)),
            sent: 0,
            _record: PhantomData,
        }
    }
}

#[async_trait]
impl<T> Subscriber for NdjsonBridge<T>
where
    T: Serialize + Timestamped + Send + Sync + 'static,
{
    type Record = T;

    async fn entry(&mut self, record: &T, seq_num: SeqNum, _total: u64) -> Flow {
        if seq_num < self.skip_before {
            return Flow::Continue;
        }
        if let Some(not_before) = self.not_before
            && record.timestamp() < not_before
        {
            return Flow::Continue;
        }
        let line = match encode_line(record) {
            Ok(line) => line,
            Err(error) => {
                tracing::warn!(%error, seq_num, "closing response on unserializable record");
                return Flow::Stop;
            }
        };
        if self.chunk_tx.send(line).await.is_err() {
            // Client disconnected.
            return Flow::Stop;
        }
        self.sent += 1;
        match self.cap {
            Some(cap) if self.sent >= cap => Flow::Stop,
            _ => Flow::Continue,
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    entry: &'a T,
}

fn encode_line<T: Serialize>(record: &T) -> serde_json::Result<Bytes> {
    let mut line = serde_json::to_vec(&Envelope { entry: record })?;
    line.push(b'\n');
    Ok(line.into())
}
