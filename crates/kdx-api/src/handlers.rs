//! API Handlers
use axum::{
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{json, Value};

use kdx_core::{ErrorCode, OperationKind, RichValue, RpcError};

use crate::AppState;

/// `/api/test`: fixed greeting. Preflights never get here.
pub async fn api_test() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "message": "Hello World" })))
}

#[derive(Debug, Default, Deserialize)]
pub struct RpcParams {
    pub batch: Option<String>,
    pub input: Option<String>,
}

/// `/api/trpc/{paths}`: queries over `GET`, mutations over `POST`.
pub async fn trpc(
    State(state): State<AppState>,
    method: Method,
    Path(paths): Path<String>,
    Query(params): Query<RpcParams>,
    body: String,
) -> Response {
    let batch = params.batch.as_deref() == Some("1");
    let paths: Vec<&str> = if batch {
        paths.split(',').collect()
    } else {
        vec![paths.as_str()]
    };

    let kind = match method {
        Method::GET => OperationKind::Query,
        Method::POST => OperationKind::Mutation,
        other => {
            let err = RpcError::new(
                ErrorCode::MethodNotSupported,
                format!("unsupported method {}", other),
            );
            let outcomes = paths.iter().map(|p| Err(err.clone().with_path(*p))).collect();
            return respond(&state, batch, outcomes);
        }
    };

    let raw = match kind {
        OperationKind::Query => params.input,
        OperationKind::Mutation => Some(body).filter(|b| !b.trim().is_empty()),
    };

    let outcomes = match parse_inputs(raw.as_deref(), paths.len(), batch) {
        Ok(inputs) => {
            let calls = paths
                .iter()
                .zip(inputs)
                .map(|(path, input)| dispatch(&state, kind, path, input));
            join_all(calls).await
        }
        Err(err) => paths.iter().map(|p| Err(err.clone().with_path(*p))).collect(),
    };
    respond(&state, batch, outcomes)
}

/// Per-call inputs. Batches key their envelopes by index; a missing key is
/// an absent input.
fn parse_inputs(raw: Option<&str>, count: usize, batch: bool) -> Result<Vec<Option<Value>>, RpcError> {
    let Some(raw) = raw else {
        return Ok(vec![None; count]);
    };
    let parsed: Value = serde_json::from_str(raw)
        .map_err(|e| RpcError::new(ErrorCode::ParseError, format!("input is not JSON: {}", e)))?;
    if !batch {
        return Ok(vec![Some(parsed)]);
    }
    match parsed {
        Value::Object(mut by_index) => Ok((0..count)
            .map(|i| by_index.remove(&i.to_string()))
            .collect()),
        _ => Err(RpcError::bad_request("batch input must be an object keyed by call index")),
    }
}

async fn dispatch(
    state: &AppState,
    kind: OperationKind,
    path: &str,
    input: Option<Value>,
) -> Result<Value, RpcError> {
    let input = match input {
        Some(envelope) => state.transformer.deserialize(envelope).map_err(|e| {
            RpcError::bad_request(format!("undecodable input: {}", e)).with_path(path)
        })?,
        None => RichValue::Undefined,
    };

    let outcome = state.procedures.call(kind, path, input).await.and_then(|data| {
        state.transformer.serialize(&data).map_err(|e| {
            RpcError::internal(format!("undecodable output: {}", e)).with_path(path)
        })
    });

    let label = if state.procedures.contains(path) { path } else { "<unknown>" };
    state.metrics.record_call(label, outcome.is_ok());
    match &outcome {
        Err(err) if err.code == ErrorCode::InternalServerError => {
            tracing::error!(%kind, path, error = %err, "procedure failed");
        }
        Err(err) => tracing::debug!(%kind, path, error = %err, "procedure rejected call"),
        Ok(_) => tracing::debug!(%kind, path, "procedure answered"),
    }
    outcome
}

fn respond(state: &AppState, batch: bool, outcomes: Vec<Result<Value, RpcError>>) -> Response {
    let status = batch_status(&outcomes);
    let items: Vec<Value> = outcomes
        .into_iter()
        .map(|outcome| match outcome {
            Ok(data) => json!({ "result": { "data": data } }),
            Err(err) => json!({ "error": encode_error(state, &err) }),
        })
        .collect();

    let body = if batch {
        Value::Array(items)
    } else {
        items.into_iter().next().unwrap_or(Value::Null)
    };
    (status, Json(body)).into_response()
}

fn encode_error(state: &AppState, err: &RpcError) -> Value {
    let shape = serde_json::to_value(err.to_shape()).unwrap_or_default();
    state
        .transformer
        .serialize(&RichValue::from_plain(shape.clone()))
        .unwrap_or(shape)
}

/// 200 when everything succeeded, the shared status when every call failed
/// the same way, 207 otherwise.
pub fn batch_status(outcomes: &[Result<Value, RpcError>]) -> StatusCode {
    let mut statuses = outcomes.iter().map(|outcome| match outcome {
        Ok(_) => 200,
        Err(err) => err.http_status(),
    });
    let first = statuses.next().unwrap_or(200);
    if statuses.all(|s| s == first) {
        StatusCode::from_u16(first).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    } else {
        StatusCode::MULTI_STATUS
    }
}

/// `/metrics`
pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.encode() {
        Ok(text) => ([(CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "metrics encoding failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
