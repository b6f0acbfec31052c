use crate::executor::EventDispatcher;
use crate::metrics::ExecutorMetrics;
use crate::types::Event;
use crate::{error::BridgeError, Result};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

const MAX_EVENT_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// HTTP ingress of the shard: events in, health and metrics out
pub struct ShardApi {
    dispatcher: EventDispatcher,
    metrics: Arc<ExecutorMetrics>,
    listen: String,
}

impl ShardApi {
    pub fn new(dispatcher: EventDispatcher, metrics: Arc<ExecutorMetrics>, listen: &str) -> Self {
        Self {
            dispatcher,
            metrics,
            listen: listen.to_string(),
        }
    }

    /// Serve until `shutdown` flips to true
    pub async fn start(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = self
            .listen
            .parse()
            .map_err(|_| {
                BridgeError::InvalidConfig(format!("Invalid listen address: {}", self.listen))
            })?;

        let (bound, server) = warp::serve(routes(self.dispatcher, self.metrics))
            .try_bind_with_graceful_shutdown(addr, async move {
                while shutdown.changed().await.is_ok() {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            })
            .map_err(|e| BridgeError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        info!("Starting event ingress on {}", bound);
        server.await;
        info!("Event ingress stopped");
        Ok(())
    }
}

pub fn routes(
    dispatcher: EventDispatcher,
    metrics: Arc<ExecutorMetrics>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health = warp::path!("health")
        .and(warp::get())
        .map(|| {
            warp::reply::json(&HealthResponse {
                status: "UP".to_string(),
            })
        });

    let events = warp::path!("events" / String)
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_EVENT_BYTES))
        .and(warp::body::json())
        .and(with_dispatcher(dispatcher))
        .and_then(handle_event);

    let metrics = warp::path!("metrics")
        .and(warp::get())
        .and(with_metrics(metrics))
        .map(handle_metrics);

    health
        .or(events)
        .or(metrics)
        .with(warp::trace::request())
        .recover(handle_rejection)
}

fn with_dispatcher(
    dispatcher: EventDispatcher,
) -> impl Filter<Extract = (EventDispatcher,), Error = Infallible> + Clone {
    warp::any().map(move || dispatcher.clone())
}

fn with_metrics(
    metrics: Arc<ExecutorMetrics>,
) -> impl Filter<Extract = (Arc<ExecutorMetrics>,), Error = Infallible> + Clone {
    warp::any().map(move || metrics.clone())
}

async fn handle_event(
    bridge_id: String,
    event: Event,
    dispatcher: EventDispatcher,
) -> std::result::Result<impl Reply, Rejection> {
    let report = dispatcher.dispatch(&bridge_id, &event).await;
    Ok(warp::reply::with_status(warp::reply::json(&report), StatusCode::ACCEPTED))
}

fn handle_metrics(metrics: Arc<ExecutorMetrics>) -> impl Reply {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    let (body, code) = match encoder.encode(&metrics.registry.gather(), &mut buffer) {
        Ok(()) => (String::from_utf8_lossy(&buffer).to_string(), StatusCode::OK),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (String::new(), StatusCode::INTERNAL_SERVER_ERROR)
        }
    };
    warp::reply::with_header(
        warp::reply::with_status(body, code),
        "Content-Type",
        encoder.format_type().to_string(),
    )
}

async fn handle_rejection(err: Rejection) -> std::result::Result<impl Reply, Infallible> {
    let code;
    let message;

    if err.is_not_found() {
        code = StatusCode::NOT_FOUND;
        message = "Not Found";
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        code = StatusCode::BAD_REQUEST;
        message = "Invalid JSON body";
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        code = StatusCode::PAYLOAD_TOO_LARGE;
        message = "Event too large";
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        code = StatusCode::LENGTH_REQUIRED;
        message = "Content-Length required";
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        code = StatusCode::METHOD_NOT_ALLOWED;
        message = "Method Not Allowed";
    } else {
        error!("Unhandled rejection: {:?}", err);
        code = StatusCode::INTERNAL_SERVER_ERROR;
        message = "Internal Server Error";
    }

    let json = warp::reply::json(&ErrorResponse {
        error: message.to_string(),
    });
    Ok(warp::reply::with_status(json, code))
}
