//! HTTP handlers module
//! This module contains the controllers for the different routes and middlewares.

use axum::{
    Json, Router,
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderValue, Response, StatusCode, Uri},
    middleware::{Next, from_fn},
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::{
    LatencyUnit,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, warn};

use crate::entities::{AppResponse, ReceivedMessages, Subscription, Topic};
use crate::message::{MAX_BODY_SIZE, read_message};
use crate::shared_state::{RecordOutcome, SharedState};

pub fn subscriber_router() -> Router<SharedState> {
    let router = Router::new()
        .route("/", get(index))
        .route("/dapr/subscribe", get(subscriptions))
        .route("/tests/get", post(received_messages))
        .route("/tests/set-respond-error", post(set_respond_error))
        .route("/tests/set-respond-retry", post(set_respond_retry))
        .route("/tests/set-respond-empty-json", post(set_respond_empty_json))
        .route("/tests/initialize", post(initialize));

    Topic::ALL
        .into_iter()
        .fold(router, |router, topic| {
            router.route(&topic.route(), post(deliver_message))
        })
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .layer(from_fn(set_json_app_header))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .include_headers(false)
                        .level(Level::DEBUG),
                )
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .include_headers(true)
                        .latency_unit(LatencyUnit::Micros),
                ),
        )
}

/// HTTP: liveness probe.
pub async fn index() -> Json<AppResponse> {
    debug!("index called");

    Json(AppResponse::with_message("OK"))
}

/// HTTP: return the topics this application subscribes to.
pub async fn subscriptions(State(state): State<SharedState>) -> Json<Vec<Subscription>> {
    let subscriptions = state.lock().await.get_subscriptions();
    debug!("subscribing to: {subscriptions:?}");

    Json(subscriptions)
}

/// HTTP: consume a message delivered by the sidecar on one of the topic routes.
pub async fn deliver_message(
    State(state): State<SharedState>,
    uri: Uri,
    body: Body,
) -> Response<Body> {
    debug!("message delivered on {uri}");

    let behavior = state.lock().await.behavior();
    if behavior.respond_with_retry {
        return Json(AppResponse::retry()).into_response();
    }
    if behavior.respond_with_error {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let message = match read_message(body).await {
        Ok(message) => message,
        Err(error) => {
            warn!("dropping message delivered on {uri}: {error}");
            return Json(AppResponse::discard(error.to_string())).into_response();
        }
    };

    let mut app_state = state.lock().await;
    let outcome = match Topic::from_route_suffix(uri.path()) {
        Some(topic) => {
            let outcome = app_state.record_message(topic, message);
            if outcome == RecordOutcome::Duplicate {
                warn!("message already received on topic {topic}");
            }
            Some(outcome)
        }
        None => {
            warn!("no subscribed topic matches route '{}'", uri.path());
            None
        }
    };

    if outcome != Some(RecordOutcome::Recorded) {
        return Json(AppResponse::discard(format!(
            "Unexpected/Multiple redelivery of message from {uri}"
        )))
        .into_response();
    }

    if app_state.behavior().respond_with_empty_json {
        (StatusCode::OK, "{}").into_response()
    } else {
        Json(AppResponse::consumed()).into_response()
    }
}

/// HTTP: return the messages received so far.
pub async fn received_messages(State(state): State<SharedState>) -> Json<ReceivedMessages> {
    let received_messages = state.lock().await.get_received_messages();
    debug!("received messages: {received_messages:?}");

    Json(received_messages)
}

/// HTTP: answer all subsequent deliveries with an error.
pub async fn set_respond_error(State(state): State<SharedState>, body: Body) -> StatusCode {
    drain_body(body).await;
    let mut app_state = state.lock().await;
    info!("set respond with error");
    app_state.set_respond_with_error();

    StatusCode::OK
}

/// HTTP: answer all subsequent deliveries with a retry status.
pub async fn set_respond_retry(State(state): State<SharedState>, body: Body) -> StatusCode {
    drain_body(body).await;
    let mut app_state = state.lock().await;
    info!("set respond with retry");
    app_state.set_respond_with_retry();

    StatusCode::OK
}

/// HTTP: answer all subsequent consumed deliveries with an empty JSON object.
pub async fn set_respond_empty_json(State(state): State<SharedState>, body: Body) -> StatusCode {
    drain_body(body).await;
    let mut app_state = state.lock().await;
    info!("set respond with empty json");
    app_state.set_respond_with_empty_json();

    StatusCode::OK
}

/// HTTP: forget all received messages.
pub async fn initialize(State(state): State<SharedState>, body: Body) -> StatusCode {
    drain_body(body).await;
    let mut app_state = state.lock().await;
    info!("initialize received messages");
    app_state.initialize();

    StatusCode::OK
}

/// HTTP: no route matches.
pub async fn not_found(uri: Uri) -> StatusCode {
    debug!("no route for {uri}");

    StatusCode::NOT_FOUND
}

async fn drain_body(body: Body) {
    if let Err(e) = to_bytes(body, MAX_BODY_SIZE).await {
        debug!("could not drain request body: {e}");
    }
}

/// MIDDLEWARE: set JSON application type in HTTP headers
pub async fn set_json_app_header(
    req: Request,
    next: Next,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut res = next.run(req).await;

    if res.status() == StatusCode::OK {
        let headers = res.headers_mut();
        headers.insert(
            "Content-Type",
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
    }

    Ok(res)
}

#[cfg(test)]
mod tests {
    use axum::body::Bytes;
    use serde_json::{Value, json};

    use crate::shared_state::AppState;

    pub use super::*;

    fn new_state() -> SharedState {
        AppState::default().into()
    }

    async fn deliver(state: &SharedState, path: &'static str, body: &str) -> (StatusCode, String) {
        let response = deliver_message(
            State(state.clone()),
            Uri::from_static(path),
            Body::from(body.to_owned()),
        )
        .await;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn received(state: &SharedState) -> ReceivedMessages {
        let Json(received) = received_messages(State(state.clone())).await;

        received
    }

    fn status_of(body: &str) -> Value {
        serde_json::from_str::<Value>(body).unwrap()["status"].clone()
    }

    #[tokio::test]
    async fn index_answers_ok() {
        let Json(response) = index().await;

        assert_eq!(AppResponse::with_message("OK"), response);
    }

    #[tokio::test]
    async fn subscriptions_list_the_three_topics() {
        let Json(subscriptions) = subscriptions(State(new_state())).await;

        assert_eq!(
            vec!["pubsub-a-topic", "pubsub-b-topic", "pubsub-c-topic"],
            subscriptions.iter().map(|s| s.topic.as_str()).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn valid_delivery_is_consumed_and_recorded() {
        let state = new_state();

        let (status, body) = deliver(&state, "/pubsub-a-topic", r#"{"data":"hello"}"#).await;

        assert_eq!(StatusCode::OK, status);
        assert_eq!(json!("SUCCESS"), status_of(&body));
        assert_eq!(vec!["hello".to_string()], received(&state).await.received_by_topic_a);
    }

    #[tokio::test]
    async fn duplicate_delivery_is_dropped_and_recorded_once() {
        let state = new_state();
        deliver(&state, "/pubsub-a-topic", r#"{"data":"hello"}"#).await;

        let (status, body) = deliver(&state, "/pubsub-a-topic", r#"{"data":"hello"}"#).await;

        assert_eq!(StatusCode::OK, status);
        assert_eq!(json!("DROP"), status_of(&body));
        assert_eq!(
            ReceivedMessages {
                received_by_topic_a: vec!["hello".to_string()],
                ..ReceivedMessages::default()
            },
            received(&state).await
        );
    }

    #[tokio::test]
    async fn delivery_on_unknown_route_is_dropped() {
        let state = new_state();

        let (status, body) = deliver(&state, "/pubsub-d-topic", r#"{"data":"hello"}"#).await;

        assert_eq!(StatusCode::OK, status);
        assert_eq!(
            json!({
                "status": "DROP",
                "message": "Unexpected/Multiple redelivery of message from /pubsub-d-topic"
            }),
            serde_json::from_str::<Value>(&body).unwrap()
        );
        assert_eq!(ReceivedMessages::default(), received(&state).await);
    }

    #[tokio::test]
    async fn delivery_without_data_is_dropped() {
        let state = new_state();

        let (status, body) = deliver(&state, "/pubsub-b-topic", r#"{"payload":"hello"}"#).await;

        assert_eq!(StatusCode::OK, status);
        assert_eq!(json!("DROP"), status_of(&body));
        assert_eq!(ReceivedMessages::default(), received(&state).await);
    }

    #[tokio::test]
    async fn delivery_with_non_string_data_is_dropped() {
        let state = new_state();

        let (status, body) = deliver(&state, "/pubsub-c-topic", r#"{"data":42}"#).await;

        assert_eq!(StatusCode::OK, status);
        assert_eq!(json!("DROP"), status_of(&body));
        assert_eq!(ReceivedMessages::default(), received(&state).await);
    }

    #[tokio::test]
    async fn delivery_with_unreadable_body_is_dropped() {
        let state = new_state();
        let body = Body::from_stream(futures::stream::once(async {
            Err::<Bytes, _>(std::io::Error::other("connection reset"))
        }));

        let response = deliver_message(
            State(state.clone()),
            Uri::from_static("/pubsub-a-topic"),
            body,
        )
        .await;

        assert_eq!(StatusCode::OK, response.status());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        assert_eq!(json!("DROP"), status_of(&body));
        assert_eq!(ReceivedMessages::default(), received(&state).await);
    }

    #[tokio::test]
    async fn delivery_with_oversized_body_is_dropped() {
        let state = new_state();
        let oversized = format!(r#"{{"data":"{}"}}"#, "a".repeat(MAX_BODY_SIZE));

        let (status, body) = deliver(&state, "/pubsub-a-topic", &oversized).await;

        assert_eq!(StatusCode::OK, status);
        assert_eq!(json!("DROP"), status_of(&body));
        assert_eq!(ReceivedMessages::default(), received(&state).await);
    }

    #[tokio::test]
    async fn delivery_with_empty_body_is_dropped() {
        let state = new_state();

        let (status, body) = deliver(&state, "/pubsub-c-topic", "").await;

        assert_eq!(StatusCode::OK, status);
        assert_eq!(json!("DROP"), status_of(&body));
    }

    #[tokio::test]
    async fn armed_retry_answers_retry_without_recording() {
        let state = new_state();
        set_respond_retry(State(state.clone()), Body::empty()).await;

        for path in ["/pubsub-a-topic", "/pubsub-b-topic", "/pubsub-c-topic"] {
            let (status, body) = deliver(&state, path, r#"{"data":"hello"}"#).await;

            assert_eq!(StatusCode::OK, status);
            assert_eq!(
                json!({"status": "RETRY", "message": "retry later"}),
                serde_json::from_str::<Value>(&body).unwrap()
            );
        }
        assert_eq!(ReceivedMessages::default(), received(&state).await);
    }

    #[tokio::test]
    async fn armed_retry_wins_over_armed_error() {
        let state = new_state();
        set_respond_error(State(state.clone()), Body::empty()).await;
        set_respond_retry(State(state.clone()), Body::empty()).await;

        let (status, body) = deliver(&state, "/pubsub-a-topic", r#"{"data":"hello"}"#).await;

        assert_eq!(StatusCode::OK, status);
        assert_eq!(json!("RETRY"), status_of(&body));
    }

    #[tokio::test]
    async fn armed_error_answers_server_error_without_recording() {
        let state = new_state();
        deliver(&state, "/pubsub-a-topic", r#"{"data":"before"}"#).await;
        set_respond_error(State(state.clone()), Body::from("ignored")).await;

        let (status, body) = deliver(&state, "/pubsub-a-topic", r#"{"data":"after"}"#).await;

        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, status);
        assert!(body.is_empty());
        assert_eq!(vec!["before".to_string()], received(&state).await.received_by_topic_a);
    }

    #[tokio::test]
    async fn armed_error_answers_server_error_even_for_malformed_delivery() {
        let state = new_state();
        set_respond_error(State(state.clone()), Body::empty()).await;

        let (status, _) = deliver(&state, "/pubsub-a-topic", "not json").await;

        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, status);
    }

    #[tokio::test]
    async fn armed_empty_json_answers_empty_object() {
        let state = new_state();
        set_respond_empty_json(State(state.clone()), Body::empty()).await;

        let (status, body) = deliver(&state, "/pubsub-b-topic", r#"{"data":"hello"}"#).await;

        assert_eq!(StatusCode::OK, status);
        assert_eq!("{}", body);
        assert_eq!(vec!["hello".to_string()], received(&state).await.received_by_topic_b);
    }

    #[tokio::test]
    async fn armed_empty_json_still_drops_duplicates() {
        let state = new_state();
        set_respond_empty_json(State(state.clone()), Body::empty()).await;
        deliver(&state, "/pubsub-b-topic", r#"{"data":"hello"}"#).await;

        let (_, body) = deliver(&state, "/pubsub-b-topic", r#"{"data":"hello"}"#).await;

        assert_eq!(json!("DROP"), status_of(&body));
    }

    #[tokio::test]
    async fn initialize_clears_all_topics_and_keeps_flags() {
        let state = new_state();
        deliver(&state, "/pubsub-a-topic", r#"{"data":"a"}"#).await;
        deliver(&state, "/pubsub-b-topic", r#"{"data":"b"}"#).await;
        deliver(&state, "/pubsub-c-topic", r#"{"data":"c"}"#).await;
        set_respond_empty_json(State(state.clone()), Body::empty()).await;

        let status = initialize(State(state.clone()), Body::empty()).await;

        assert_eq!(StatusCode::OK, status);
        assert_eq!(ReceivedMessages::default(), received(&state).await);
        assert!(state.lock().await.behavior().respond_with_empty_json);

        let (_, body) = deliver(&state, "/pubsub-a-topic", r#"{"data":"a"}"#).await;
        assert_eq!("{}", body);
    }

    #[tokio::test]
    async fn control_endpoints_answer_ok() {
        let state = new_state();

        assert_eq!(
            StatusCode::OK,
            set_respond_error(State(state.clone()), Body::empty()).await
        );
        assert_eq!(
            StatusCode::OK,
            set_respond_retry(State(state.clone()), Body::empty()).await
        );
        assert_eq!(
            StatusCode::OK,
            set_respond_empty_json(State(state.clone()), Body::empty()).await
        );
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let status = not_found(Uri::from_static("/whatever")).await;

        assert_eq!(StatusCode::NOT_FOUND, status);
    }
}
