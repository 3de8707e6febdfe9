//! The node's HTTP API.
//!
//! Content-negotiated transaction queries (`application/json` or
//! `text/event-stream`), plus the POST endpoints peers and clients submit
//! through. Error responses carry the protocol `{ code, message }` shape.

use crate::{BlockTransactionObserver, InboundMessage, LocalNode, MessageKind, Subscription};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use concord_ledger::{
    exists_block_transaction, get_block_transaction, get_block_transaction_history,
    get_block_transactions, BlockTransaction,
};
use concord_store::Store;
use concord_types::{Ballot, Error, Transaction};
use futures::stream::Stream;
use futures::StreamExt;
use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::warn;

/// Upper bound on historical records replayed into a fresh event stream.
const MAX_EXISTING_REPLAY: usize = 100;

/// Shared state for the API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: Store,
    pub observer: BlockTransactionObserver,
    pub inbound: mpsc::Sender<InboundMessage>,
    pub local_node: Arc<LocalNode>,
    pub network_id: Arc<Vec<u8>>,
}

/// Build the full API router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/node-info", get(node_info_handler))
        .route("/connect", post(connect_handler))
        .route(
            "/transactions",
            get(get_transactions_handler).post(post_transactions_handler),
        )
        .route("/transactions/{hash}", get(get_transaction_by_hash_handler))
        .route("/ballots", post(post_ballots_handler))
        .with_state(state)
}

/// A protocol error with the HTTP status it travels under.
pub struct ApiError {
    status: StatusCode,
    error: Error,
}

impl ApiError {
    fn bad_request(error: Error) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            error,
        }
    }

    fn unauthorized(error: Error) -> Self {
        ApiError {
            status: StatusCode::UNAUTHORIZED,
            error,
        }
    }

    fn not_found(error: Error) -> Self {
        ApiError {
            status: StatusCode::NOT_FOUND,
            error,
        }
    }

    fn internal(error: Error) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}

fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"))
}

async fn node_info_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.local_node.node_info())
}

async fn connect_handler(
    State(state): State<ApiState>,
    body: axum::body::Bytes,
) -> Result<StatusCode, ApiError> {
    state
        .inbound
        .send(InboundMessage::new(MessageKind::Connect, body.to_vec()))
        .await
        .map_err(|_| ApiError::internal(Error::InvalidState("inbound channel closed".into())))?;
    Ok(StatusCode::OK)
}

/// `GET /transactions`: the stored records, or a replay-then-live event
/// stream under `Accept: text/event-stream`.
async fn get_transactions_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if wants_event_stream(&headers) {
        let stream = transactions_stream(&state.store, &state.observer, MAX_EXISTING_REPLAY)
            .map_err(ApiError::internal)?;
        return Ok(sse_response(stream));
    }

    let records = get_block_transactions(&state.store, false).map_err(ApiError::internal)?;
    Ok(Json(records).into_response())
}

/// `GET /transactions/{hash}`: the externalized record, falling back to the
/// seen-but-not-yet-agreed history record; or the per-hash event stream.
async fn get_transaction_by_hash_handler(
    State(state): State<ApiState>,
    Path(hash): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if wants_event_stream(&headers) {
        let stream = transaction_stream_by_hash(&state.store, &state.observer, &hash)
            .map_err(ApiError::internal)?;
        return Ok(sse_response(stream));
    }

    if exists_block_transaction(&state.store, &hash).map_err(ApiError::internal)? {
        let bt = get_block_transaction(&state.store, &hash).map_err(ApiError::internal)?;
        return Ok(Json(bt).into_response());
    }
    match get_block_transaction_history(&state.store, &hash) {
        Ok(bth) => Ok(Json(bth).into_response()),
        Err(Error::StorageRecordDoesNotExist) => Err(ApiError::not_found(
            Error::BlockTransactionDoesNotExists,
        )),
        Err(e) => Err(ApiError::internal(e)),
    }
}

/// `POST /transactions`: a signed transaction, accepted for processing.
async fn post_transactions_handler(
    State(state): State<ApiState>,
    body: axum::body::Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tx = Transaction::from_json(&body).map_err(ApiError::bad_request)?;
    tx.verify_signature(&state.network_id)
        .map_err(ApiError::unauthorized)?;

    state
        .inbound
        .send(InboundMessage::new(MessageKind::FromClient, body.to_vec()))
        .await
        .map_err(|_| ApiError::internal(Error::InvalidState("inbound channel closed".into())))?;

    Ok(Json(serde_json::json!({
        "status": "accepted",
        "hash": tx.hash(),
    })))
}

/// `POST /ballots`: a signed ballot from a peer validator.
async fn post_ballots_handler(
    State(state): State<ApiState>,
    body: axum::body::Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ballot = Ballot::from_json(&body).map_err(ApiError::bad_request)?;
    ballot
        .verify_signature(&state.network_id)
        .map_err(ApiError::unauthorized)?;

    state
        .inbound
        .send(InboundMessage::new(MessageKind::Ballot, body.to_vec()))
        .await
        .map_err(|_| ApiError::internal(Error::InvalidState("inbound channel closed".into())))?;

    Ok(Json(serde_json::json!({
        "status": "accepted",
        "hash": ballot.hash,
    })))
}

fn sse_response(stream: impl Stream<Item = String> + Send + 'static) -> Response {
    Sse::new(stream.map(|data| Ok::<Event, Infallible>(Event::default().data(data))))
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// Bounded historical replay followed by live `saved` events.
///
/// The subscription is taken before the snapshot, so nothing externalized
/// in between is lost; the handoff deduplicates by hash instead.
pub fn transactions_stream(
    store: &Store,
    observer: &BlockTransactionObserver,
    replay_limit: usize,
) -> Result<impl Stream<Item = String> + Send + 'static, Error> {
    let subscription = observer.subscribe("saved");

    let records = get_block_transactions(store, false)?;
    let mut seen = HashSet::new();
    let mut replay = Vec::new();
    for bt in records.into_iter().take(replay_limit) {
        seen.insert(bt.hash.clone());
        replay.push(serialize_record(&bt));
    }

    Ok(futures::stream::iter(replay).chain(live_stream(subscription, seen)))
}

/// The current record for one hash (externalized or history), then live
/// `saved` events for that hash only.
pub fn transaction_stream_by_hash(
    store: &Store,
    observer: &BlockTransactionObserver,
    hash: &str,
) -> Result<impl Stream<Item = String> + Send + 'static, Error> {
    let subscription = observer.subscribe(&format!("hash-{hash}"));

    let mut seen = HashSet::new();
    let mut replay = Vec::new();
    if exists_block_transaction(store, hash)? {
        let bt = get_block_transaction(store, hash)?;
        seen.insert(bt.hash.clone());
        replay.push(serialize_record(&bt));
    } else if let Ok(bth) = get_block_transaction_history(store, hash) {
        replay.push(serde_json::to_string(&bth).expect("record should be encodable"));
    }

    Ok(futures::stream::iter(replay).chain(live_stream(subscription, seen)))
}

fn serialize_record(bt: &BlockTransaction) -> String {
    serde_json::to_string(bt).expect("record should be encodable")
}

fn live_stream(
    subscription: Subscription<Arc<BlockTransaction>>,
    seen: HashSet<String>,
) -> impl Stream<Item = String> + Send + 'static {
    futures::stream::unfold((subscription, seen), |(mut sub, seen)| async move {
        loop {
            match sub.receiver.recv().await {
                Ok(bt) => {
                    if seen.contains(&bt.hash) {
                        continue;
                    }
                    let data = serialize_record(&bt);
                    return Some((data, (sub, seen)));
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "event stream subscriber lagged, oldest dropped");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Endpoint, Observer};
    use axum::body::Body;
    use axum::http::Request;
    use concord_ledger::BlockTransactionHistory;
    use concord_types::test_utils::{test_transaction, TEST_NETWORK_ID};
    use concord_types::{Amount, KeyPair};
    use tower::ServiceExt;

    fn test_state() -> (ApiState, mpsc::Receiver<InboundMessage>) {
        let (inbound, rx) = mpsc::channel(16);
        let local = LocalNode::new(KeyPair::random(), Endpoint::memory("api-test"), None);
        let state = ApiState {
            store: Store::memory(),
            observer: Observer::new(),
            inbound,
            local_node: Arc::new(local),
            network_id: Arc::new(TEST_NETWORK_ID.to_vec()),
        };
        (state, rx)
    }

    fn saved_bt(store: &mut Store) -> BlockTransaction {
        let source = KeyPair::random();
        let tx = test_transaction(
            &source,
            "u-u",
            &KeyPair::random().address(),
            Amount::new(10),
        );
        let bt = BlockTransaction::from_transaction(&tx, "{}".to_string());
        bt.save(store).unwrap();
        bt
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn lists_transactions_as_json() {
        let (mut state, _rx) = test_state();
        let bt = saved_bt(&mut state.store);

        let app = router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/transactions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["hash"], bt.hash.as_str());
    }

    #[tokio::test]
    async fn get_by_hash_falls_back_to_history_then_404() {
        let (mut state, _rx) = test_state();
        let source = KeyPair::random();
        let tx = test_transaction(
            &source,
            "u-u",
            &KeyPair::random().address(),
            Amount::new(10),
        );
        BlockTransactionHistory::from_transaction(&tx)
            .save(&mut state.store)
            .unwrap();

        let app = router(state);
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/transactions/{}", tx.hash()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["hash"], tx.hash());
        // a history record, not an externalized one
        assert!(json.get("saved_at").is_none());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/transactions/unknown-hash")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["code"], 134);
    }

    #[tokio::test]
    async fn post_transaction_validates_then_enqueues() {
        let (state, mut rx) = test_state();
        let app = router(state);

        let source = KeyPair::random();
        let tx = test_transaction(
            &source,
            "u-u",
            &KeyPair::random().address(),
            Amount::new(10),
        );

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/transactions")
                    .header("content-type", "application/json")
                    .body(Body::from(tx.to_json()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let queued = rx.recv().await.unwrap();
        assert_eq!(queued.kind, MessageKind::FromClient);

        // malformed body
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/transactions")
                    .body(Body::from("not-json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // valid shape, wrong signature
        let mut forged = tx.clone();
        forged.header.signature = KeyPair::random().sign(b"whatever");
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/transactions")
                    .body(Body::from(forged.to_json()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn event_stream_replays_then_goes_live() {
        let (mut state, _rx) = test_state();
        let existing = saved_bt(&mut state.store);

        let mut stream = Box::pin(
            transactions_stream(&state.store, &state.observer, MAX_EXISTING_REPLAY).unwrap(),
        );

        // replayed history first
        let first = stream.next().await.unwrap();
        let first: serde_json::Value = serde_json::from_str(&first).unwrap();
        assert_eq!(first["hash"], existing.hash.as_str());

        // then live events as they are saved
        let source = KeyPair::random();
        let tx = test_transaction(
            &source,
            "u-u",
            &KeyPair::random().address(),
            Amount::new(20),
        );
        let live = BlockTransaction::from_transaction(&tx, "{}".to_string());
        state
            .observer
            .trigger(&format!("saved hash-{}", live.hash), Arc::new(live.clone()));

        let second = stream.next().await.unwrap();
        let second: serde_json::Value = serde_json::from_str(&second).unwrap();
        assert_eq!(second["hash"], live.hash.as_str());
    }

    #[tokio::test]
    async fn per_hash_stream_only_sees_its_transaction() {
        let (state, _rx) = test_state();
        let source = KeyPair::random();
        let tx = test_transaction(
            &source,
            "u-u",
            &KeyPair::random().address(),
            Amount::new(20),
        );
        let watched = BlockTransaction::from_transaction(&tx, "{}".to_string());

        let mut stream = Box::pin(
            transaction_stream_by_hash(&state.store, &state.observer, &watched.hash).unwrap(),
        );

        // an unrelated save does not reach this stream
        let other_tx = test_transaction(
            &KeyPair::random(),
            "u-u",
            &KeyPair::random().address(),
            Amount::new(30),
        );
        let other = BlockTransaction::from_transaction(&other_tx, "{}".to_string());
        state
            .observer
            .trigger(&format!("saved hash-{}", other.hash), Arc::new(other));
        state
            .observer
            .trigger(&format!("saved hash-{}", watched.hash), Arc::new(watched.clone()));

        let event = stream.next().await.unwrap();
        let event: serde_json::Value = serde_json::from_str(&event).unwrap();
        assert_eq!(event["hash"], watched.hash.as_str());
    }
}
