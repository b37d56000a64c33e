use axum::{
    debug_handler,
    extract::Request,
    http::{header, HeaderMap},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::AppError;

// the only field visible to callers without the admin header; everything
// else, id included, is filtered out of the response
const PUBLIC_MASK: &[&str] = &["record.public"];

#[derive(Serialize, Debug)]
struct RecordResponse {
    id: String,
    record: Record,
}

#[derive(Serialize, Debug)]
struct Record {
    public: String,
    private: String,
}

pub fn create_router() -> Router {
    Router::new()
        .route("/record", get(get_record))
        .layer(middleware::from_fn(require_auth))
}

/// Rejects requests without an Authorization header before they reach the
/// handler; validity of the value is the handler's concern.
async fn require_auth(req: Request, next: Next) -> Result<Response, AppError> {
    if req.headers().get(header::AUTHORIZATION).is_none() {
        return Err(AppError::Unauthenticated);
    }
    debug!("found auth header, continue to handler");
    Ok(next.run(req).await)
}

#[debug_handler]
async fn get_record(headers: HeaderMap) -> Result<Json<Value>, AppError> {
    info!(route = "/record", method = "GET", "handle request");
    let is_admin = headers
        .get(header::AUTHORIZATION)
        .is_some_and(|value| value.as_bytes() == b"valid");

    // mock response value to demonstrate field mask behavior
    let record = RecordResponse {
        id: "some_id_value".to_string(),
        record: Record {
            public: "public value".to_string(),
            private: "private value".to_string(),
        },
    };
    let full = serde_json::to_value(&record).map_err(|_| AppError::FieldMask)?;

    if is_admin {
        debug!("got admin header");
        return Ok(Json(full));
    }

    let masked = project(&full, PUBLIC_MASK).ok_or(AppError::FieldMask)?;
    Ok(Json(masked))
}

/// Copy only the dot-separated `paths` out of `value` into a fresh object.
/// Returns None when a path does not exist in the source.
fn project(value: &Value, paths: &[&str]) -> Option<Value> {
    let mut out = Value::Object(serde_json::Map::new());
    for path in paths {
        let segments: Vec<&str> = path.split('.').collect();
        let (leaf, parents) = segments.split_last()?;

        let mut src = value;
        for segment in &segments {
            src = src.get(segment)?;
        }

        let mut dst = &mut out;
        for segment in parents {
            dst = dst
                .as_object_mut()?
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
        }
        dst.as_object_mut()?.insert(leaf.to_string(), src.clone());
    }
    Some(out)
}
