//! HTTP surface for the natural-language pipeline.
//!
//! Routes
//! ------
//! - `GET /`, `GET /healthz`
//! - `POST /natural-language` `{command}`
//! - `POST /create-database` `{dbName, tables?}`
//! - `POST /extract-create-tables` `{sql}`
//! - `GET /data`, `POST /add-user` `{name, email, age}`
//!
//! Every response carries permissive CORS headers; `OPTIONS` on any path is
//! answered with an empty 204. Request bodies over [`MAX_BODY_BYTES`] get a 413.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CONTENT_TYPE,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::Instrument;

use nlsql_db::{DatabaseProvisioner, NewUser, ProvisionError, UserError, UserStore};
use nlsql_pipeline::CommandPipeline;
use nlsql_sql::{extract_table_statements, ExtractError};

pub const MAX_BODY_BYTES: usize = 1024 * 1024;

pub struct ServerState {
    pub pipeline: CommandPipeline,
    pub provisioner: Arc<dyn DatabaseProvisioner>,
    pub users: Arc<dyn UserStore>,
}

pub async fn serve(listen: SocketAddr, state: ServerState) -> Result<()> {
    let state = Arc::new(state);

    let listener = TcpListener::bind(listen)
        .await
        .map_err(|e| anyhow!("serve: failed to bind {listen}: {e}"))?;
    let bound = listener
        .local_addr()
        .map_err(|e| anyhow!("serve: failed to read bound addr: {e}"))?;

    tracing::info!(addr = %bound, model = state.pipeline.translator().model(), "server running");

    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|e| anyhow!("serve: accept failed: {e}"))?;
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, state.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(%peer, error = %e, "connection error");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<ServerState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let request_id = uuid::Uuid::new_v4();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let span = tracing::info_span!("request", id = %request_id, %method, %path);
    let resp = match read_body(req.into_body(), MAX_BODY_BYTES)
        .instrument(span.clone())
        .await
    {
        Ok(body) => {
            span.in_scope(|| tracing::debug!(bytes = body.len(), "request received"));
            dispatch(&state, &method, &path, &body)
                .instrument(span.clone())
                .await
        }
        Err(resp) => resp,
    };
    span.in_scope(|| tracing::info!(status = resp.status().as_u16(), "request handled"));
    Ok(resp)
}

/// Collect at most `limit` bytes of `body`.
async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, Response<Full<Bytes>>>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => {
            tracing::warn!(limit, "request body too large");
            Err(with_cors(json_error(
                StatusCode::PAYLOAD_TOO_LARGE,
                "request body too large",
            )))
        }
        Err(e) => {
            tracing::debug!(error = %e, "failed to read request body");
            Err(with_cors(json_error(
                StatusCode::BAD_REQUEST,
                "could not read request body",
            )))
        }
    }
}

/// Route one request. Split from the hyper plumbing so tests can call it directly.
pub(crate) async fn dispatch(
    state: &ServerState,
    method: &Method,
    path: &str,
    body: &[u8],
) -> Response<Full<Bytes>> {
    let resp = match (method, path) {
        (&Method::OPTIONS, _) => empty_response(StatusCode::NO_CONTENT),
        (&Method::GET, "/") => text_response(StatusCode::OK, "nlsql server is running...\n"),
        (&Method::GET, "/healthz") => text_response(StatusCode::OK, "ok\n"),
        (&Method::GET, "/data") => handle_data(state).await,
        (&Method::POST, "/add-user") => match parse_body(body) {
            Ok(v) => handle_add_user(state, &v).await,
            Err(r) => r,
        },
        (&Method::POST, "/create-database") => match parse_body(body) {
            Ok(v) => handle_create_database(state, &v).await,
            Err(r) => r,
        },
        (&Method::POST, "/natural-language") => match parse_body(body) {
            Ok(v) => handle_natural_language(state, &v).await,
            Err(r) => r,
        },
        (&Method::POST, "/extract-create-tables") => match parse_body(body) {
            Ok(v) => handle_extract(&v),
            Err(r) => r,
        },
        _ => json_error(StatusCode::NOT_FOUND, "not found"),
    };
    with_cors(resp)
}

async fn handle_data(state: &ServerState) -> Response<Full<Bytes>> {
    match state.users.list_users().await {
        Ok(rows) => json_response(StatusCode::OK, &rows),
        Err(e) => {
            tracing::error!(error = %e, "error fetching data");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

async fn handle_add_user(state: &ServerState, body: &Value) -> Response<Full<Bytes>> {
    let user = match NewUser::from_json(body) {
        Ok(user) => user,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    match state.users.add_user(&user).await {
        Ok(row) => json_response(StatusCode::OK, &row),
        Err(e @ (UserError::DuplicateEmail | UserError::MissingFields)) => {
            json_error(StatusCode::BAD_REQUEST, &e.to_string())
        }
        Err(UserError::Db(e)) => {
            tracing::error!(error = %e, "error inserting user");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Could not insert user")
        }
    }
}

fn tables_example() -> Value {
    json!({
        "dbName": "example_db",
        "tables": ["CREATE TABLE table1 (id SERIAL PRIMARY KEY, name VARCHAR(255));"]
    })
}

async fn handle_create_database(state: &ServerState, body: &Value) -> Response<Full<Bytes>> {
    let Some(name) = body.get("dbName").and_then(Value::as_str).filter(|s| !s.is_empty()) else {
        return json_error(StatusCode::BAD_REQUEST, "Database name is required");
    };

    let tables = match body.get("tables") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => match items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
        {
            Some(tables) => tables,
            None => return tables_shape_error(),
        },
        Some(_) => return tables_shape_error(),
    };

    match state.provisioner.create_database(name, &tables).await {
        Ok(message) => json_response(StatusCode::OK, &json!({ "message": message })),
        Err(e @ ProvisionError::Tables { .. }) => json_response(
            StatusCode::BAD_REQUEST,
            &json!({ "error": e.detail().unwrap_or_default(), "message": e.to_string() }),
        ),
        Err(e) => json_error(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

fn tables_shape_error() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::BAD_REQUEST,
        &json!({
            "error": "Tables must be an array of SQL statements",
            "example": tables_example(),
        }),
    )
}

async fn handle_natural_language(state: &ServerState, body: &Value) -> Response<Full<Bytes>> {
    let command = body.get("command").and_then(Value::as_str).unwrap_or_default();
    match state.pipeline.run(command).await {
        Ok(response) => json_response(StatusCode::OK, &response),
        Err(e) => {
            let status = StatusCode::from_u16(e.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            json_response(status, &e.to_json())
        }
    }
}

fn handle_extract(body: &Value) -> Response<Full<Bytes>> {
    let sql = body.get("sql").and_then(Value::as_str).unwrap_or_default();
    match extract_table_statements(sql) {
        Ok(extraction) => json_response(
            StatusCode::OK,
            &json!({
                "dbName": extraction.database_name,
                "tables": extraction.table_statements,
                "message": extraction.message(),
            }),
        ),
        Err(e) => {
            if matches!(e, ExtractError::Scan(_)) {
                tracing::warn!(error = %e, "extract: unscannable SQL");
            }
            json_error(StatusCode::BAD_REQUEST, &e.to_string())
        }
    }
}

/// An empty body reads as `{}`.
fn parse_body(body: &[u8]) -> Result<Value, Response<Full<Bytes>>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    serde_json::from_slice(body)
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, &format!("Invalid JSON body: {e}")))
}

fn with_cors(mut resp: Response<Full<Bytes>>) -> Response<Full<Bytes>> {
    let headers = resp.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("Content-Type"));
    resp
}

fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::new()));
    *resp.status_mut() = status;
    resp
}

fn text_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"internal error"))))
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{\"error\":\"serialize\"}".to_vec());
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"{\"error\":\"internal\"}"))))
}

fn json_error(status: StatusCode, msg: &str) -> Response<Full<Bytes>> {
    json_response(status, &json!({ "error": msg }))
}
