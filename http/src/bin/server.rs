#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::net::SocketAddr;

use axum::{Json, Router, routing};
use clap::Parser;
use http::StatusCode;
use runnel_core::{SeqNum, Stream, Timestamp, Timestamped};
use runnel_http::stream_endpoint;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Runnel demo server: POST records in, stream them out")]
struct Args {
    /// Port to listen on
    #[arg(long, default_value_t = 8090)]
    port: u16,

    /// Name of the exposed stream
    #[arg(long, default_value = "events")]
    name: String,
}

#[derive(Debug, Clone, Serialize)]
struct Event {
    message: String,
    t: Timestamp,
}

impl Timestamped for Event {
    fn timestamp(&self) -> Timestamp {
        self.t
    }
}

#[derive(Debug, Deserialize)]
struct PublishRequest {
    message: String,
}

#[derive(Debug, Serialize)]
struct PublishResponse {
    seq_num: SeqNum,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let stream = Stream::<Event>::new(args.name);

    let publish = {
        let stream = stream.clone();
        routing::post(move |Json(request): Json<PublishRequest>| {
            let stream = stream.clone();
            async move {
                let seq_num = stream.publish(Event {
                    message: request.message,
                    t: stream.now(),
                });
                (StatusCode::CREATED, Json(PublishResponse { seq_num }))
            }
        })
    };

    let app = Router::new()
        .route("/ping", routing::get(|| async { "pong" }))
        .route("/stream", stream_endpoint(stream).merge(publish));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    runnel_http::serve(addr, app).await
}
