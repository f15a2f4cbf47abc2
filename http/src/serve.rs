use std::{convert::Infallible, net::SocketAddr, time::Duration};

use axum::{
    Router,
    body::Body,
    extract::Query,
    response::Response,
    routing::{self, MethodRouter},
};
use bytes::Bytes;
use http::{StatusCode, header};
use runnel_core::{Stream, Timestamped};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::{StreamExt as _, wrappers::ReceiverStream};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::info;

use crate::bridge::{NdjsonBridge, TailQuery};

/// Buffered chunks per client; a slow client backpressures only its own
/// cursor.
const CHUNKS_IN_FLIGHT: usize = 64;

/// Open tail responses never complete on their own; a shutdown waits this
/// long for in-flight writes and then closes them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// `GET` endpoint streaming a stream's records as newline-delimited JSON.
///
/// Mount with `Router::new().route(path, stream_endpoint(stream))`. Without
/// query parameters the response never ends; `n`, `cap` and `recent` filter
/// per [`TailQuery`].
pub fn stream_endpoint<T>(stream: Stream<T>) -> MethodRouter
where
    T: Serialize + Timestamped + Send + Sync + 'static,
{
    routing::get(move |Query(query): Query<TailQuery>| {
        let stream = stream.clone();
        async move { tail_response(&stream, query) }
    })
}

fn tail_response<T>(stream: &Stream<T>, query: TailQuery) -> Response
where
    T: Serialize + Timestamped + Send + Sync + 'static,
{
    let (chunk_tx, chunk_rx) = mpsc::channel(CHUNKS_IN_FLIGHT);
    // The client drives the lifetime: dropping the response body breaks the
    // channel, and the bridge self-stops on the failed send.
    stream
        .subscribe(NdjsonBridge::new(
            chunk_tx,
            query,
            stream.now(),
            stream.size(),
        ))
        .detach();
    let chunks = ReceiverStream::new(chunk_rx).map(Ok::<Bytes, Infallible>);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(Body::from_stream(chunks))
        .expect("valid response builder")
}

/// Serves `app` until interrupted or terminated.
pub async fn serve(addr: SocketAddr, app: Router) -> eyre::Result<()> {
    // A tail response can stay open for minutes, so connections are logged
    // when they arrive, not when they finish.
    let app = app.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(tracing::Level::DEBUG))
            .on_request(DefaultOnRequest::new().level(tracing::Level::INFO))
            .on_response(DefaultOnResponse::new().level(tracing::Level::DEBUG)),
    );

    let handle = axum_server::Handle::new();
    tokio::spawn(stop_on_signal(handle.clone()));
    info!(%addr, "listening");
    axum_server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

async fn stop_on_signal(handle: axum_server::Handle<SocketAddr>) {
    let signal = await_termination().await;
    info!(signal, "shutting down");
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}

#[cfg(unix)]
async fn await_termination() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler installs");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn await_termination() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "SIGINT"
}
