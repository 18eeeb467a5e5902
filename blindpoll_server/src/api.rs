use crate::config::Config;
use crate::{live, AppState};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use blindpoll::{
    cast_vote, redeem, AccessTokenSpec, Ballot, Error, NewPoll, Poll, PollProjection, PollStore,
    ValidationError,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub fn app(config: &Config, state: AppState) -> Router {
    let api = Router::new()
        .route("/create_poll", post(create_poll))
        .route("/get_poll", post(get_poll))
        .route("/get_polls", post(get_polls))
        .route("/sign_pubkey", post(sign_pubkey))
        .route("/vote", post(vote))
        .route("/end_poll", post(end_poll));

    let ws = Router::new().route("/poll/:channel_id", get(live::poll_channel));

    let router = Router::new()
        .nest(&config.api_route, api)
        .nest(&config.ws_route, ws)
        .layer(TraceLayer::new_for_http());

    let router = if config.enable_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    };

    router.with_state(state)
}

/// Protocol errors mapped onto HTTP statuses: validation failures 400,
/// credential problems 401/403, unknown polls 404, everything internal 500
/// with a generic body and the detail only in the server log.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            Error::PollNotFound => StatusCode::NOT_FOUND,

            Error::PollEnded
            | Error::TokenRejected
            | Error::HostTokenMismatch
            | Error::SignatureReplayed => StatusCode::FORBIDDEN,

            Error::AccessDenied | Error::MissingSignedFields => StatusCode::UNAUTHORIZED,

            Error::PollNotSigned
            | Error::MissingAccessToken
            | Error::CertificationInvalid
            | Error::MessageSignatureInvalid
            | Error::MalformedBallot
            | Error::InvalidOptions
            | Error::MalformedInteger
            | Error::BlindedValueOutOfRange
            | Error::NonInvertibleBlindingFactor
            | Error::UnblindVerifyFailed
            | Error::Validation(_) => StatusCode::BAD_REQUEST,

            Error::KeyMaterialMissing | Error::KeyGeneration | Error::Rsa(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
            return (status, Json(json!({ "error": "internal error" }))).into_response();
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePollRequest {
    question: String,
    options: Vec<String>,
    is_multiple_choice: bool,
    is_signed: bool,
    access_tokens: Option<Vec<String>>,
    access_token_count: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePollResponse {
    id: Uuid,
    host_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_tokens: Option<Vec<String>>,
}

async fn create_poll(
    State(state): State<AppState>,
    Json(req): Json<CreatePollRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let access_tokens = match (req.access_tokens, req.access_token_count) {
        (Some(_), Some(_)) => {
            return Err(Error::from(ValidationError::AmbiguousAccessTokens).into())
        }
        (Some(tokens), None) => Some(AccessTokenSpec::Tokens(tokens)),
        (None, Some(count)) => Some(AccessTokenSpec::Count(count)),
        (None, None) => None,
    };

    let poll = Poll::new(NewPoll {
        question: req.question,
        options: req.options,
        is_multiple_choice: req.is_multiple_choice,
        is_signed: req.is_signed,
        access_tokens,
    })?;

    let response = CreatePollResponse {
        id: poll.id,
        host_token: poll.host_token.clone(),
        access_tokens: if poll.is_signed {
            Some(poll.access_tokens.clone())
        } else {
            None
        },
    };

    state.bus.open(&poll.channel_id);
    tracing::info!(poll_id = %poll.id, signed = poll.is_signed, "poll created");
    state.store.insert(poll)?;

    Ok((StatusCode::CREATED, Json(response)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollQuery {
    id: String,
    access_token: Option<String>,
}

/// An unparsable id is indistinguishable from an unknown one.
fn fetch_poll(store: &dyn PollStore, id: &str) -> Result<Poll, Error> {
    let id: Uuid = id.parse().map_err(|_| Error::PollNotFound)?;
    store.fetch(&id)
}

async fn get_poll(
    State(state): State<AppState>,
    Json(query): Json<PollQuery>,
) -> Result<Json<PollProjection>, ApiError> {
    let poll = fetch_poll(&*state.store, &query.id)?;
    if !poll.authorizes(query.access_token.as_deref()) {
        return Err(Error::AccessDenied.into());
    }
    Ok(Json(poll.projection()))
}

#[derive(Deserialize)]
struct BatchQuery {
    queries: Vec<PollQuery>,
}

async fn get_polls(
    State(state): State<AppState>,
    Json(req): Json<BatchQuery>,
) -> Result<Json<Vec<PollProjection>>, ApiError> {
    // an empty query list means "all public polls"
    if req.queries.is_empty() {
        let projections = state
            .store
            .unsigned_polls()
            .iter()
            .map(Poll::projection)
            .collect();
        return Ok(Json(projections));
    }

    // unknown ids and unauthorized entries are silently filtered out
    let mut projections = Vec::with_capacity(req.queries.len());
    for query in &req.queries {
        if let Ok(poll) = fetch_poll(&*state.store, &query.id) {
            if poll.authorizes(query.access_token.as_deref()) {
                projections.push(poll.projection());
            }
        }
    }
    Ok(Json(projections))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CertificationRequest {
    id: String,
    access_token: Option<String>,
    blinded_hash: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CertificationResponse {
    blind_signature: String,
}

async fn sign_pubkey(
    State(state): State<AppState>,
    Json(req): Json<CertificationRequest>,
) -> Result<Json<CertificationResponse>, ApiError> {
    let id: Uuid = req.id.parse().map_err(|_| Error::PollNotFound)?;
    let access_token = req.access_token.as_deref().unwrap_or("");
    let blinded_hash = req.blinded_hash.as_deref().unwrap_or("");

    let signature = redeem(&*state.store, &id, access_token, blinded_hash)?;
    Ok(Json(CertificationResponse {
        blind_signature: signature.to_str_radix(10),
    }))
}

async fn vote(
    State(state): State<AppState>,
    Json(ballot): Json<Ballot>,
) -> Result<StatusCode, ApiError> {
    let poll = cast_vote(&*state.store, &ballot)?;

    // Fan-out happens after the commit; its ordering relative to this
    // response is unspecified by the channel contract.
    if poll.ended {
        state.bus.close(&poll);
    } else {
        state.bus.publish(&poll);
    }
    Ok(StatusCode::ACCEPTED)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndPollRequest {
    id: String,
    host_token: Option<String>,
}

async fn end_poll(
    State(state): State<AppState>,
    Json(req): Json<EndPollRequest>,
) -> Result<StatusCode, ApiError> {
    let poll = fetch_poll(&*state.store, &req.id)?;
    if !poll.is_host(req.host_token.as_deref().unwrap_or("")) {
        return Err(Error::HostTokenMismatch.into());
    }

    let (poll, newly_ended) = state.store.set_ended(&poll.id)?;
    if newly_ended {
        tracing::info!(poll_id = %poll.id, "poll ended by host");
        state.bus.close(&poll);
    }
    Ok(StatusCode::ACCEPTED)
}
