use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use serde::Serialize;
use serde_json::ser::Formatter;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use crate::store::ImageStore;

const FILE_FIELD: &str = "file";
const NO_FILE: &str = "No file in request";
const NO_SELECTED_FILE: &str = "No selected file";
const SAVE_FAILED: &str = "Error in saving file";

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub store: ImageStore,
    pub max_upload_bytes: usize,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Reply body for an accepted upload. No detection runs; the box is always
/// empty.
#[derive(Debug, Default, Serialize)]
struct BoundingBox {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

/// JSON with `", "` and `": "` separators, byte-for-byte what clients of the
/// receiver expect: `{"x": 0, "y": 0, "w": 0, "h": 0}`.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + std::io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> std::io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + std::io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> std::io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + std::io::Write>(
        &mut self,
        writer: &mut W,
    ) -> std::io::Result<()> {
        writer.write_all(b": ")
    }
}

fn spaced_json<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}

fn json_response<T: Serialize>(value: &T) -> Response {
    match spaced_json(value) {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            error!(error = %e, "failed to serialize reply");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST / — multipart body with a `file` part.
async fn receive_image(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(e) => {
            debug!(error = %e, "request is not multipart");
            return (StatusCode::BAD_REQUEST, NO_FILE).into_response();
        }
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return (StatusCode::BAD_REQUEST, NO_FILE).into_response(),
            Err(e) => {
                warn!(error = %e, "failed to read multipart body");
                return (e.status(), e.body_text()).into_response();
            }
        };

        // Only a part that carries a filename counts as a file upload.
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let Some(file_name) = field.file_name().map(str::to_owned) else {
            continue;
        };
        if file_name.is_empty() {
            return (StatusCode::BAD_REQUEST, NO_SELECTED_FILE).into_response();
        }

        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, file_name, "failed to read uploaded file");
                return (e.status(), e.body_text()).into_response();
            }
        };

        return match state.store.save(&data).await {
            Ok(path) => {
                debug!(file_name, path = path.display().to_string(), "upload stored");
                json_response(&BoundingBox::default())
            }
            Err(e) => {
                error!(error = %e, file_name, "failed to save upload");
                (StatusCode::INTERNAL_SERVER_ERROR, SAVE_FAILED).into_response()
            }
        };
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: Arc<AppState>) -> Router {
    let limit = state.max_upload_bytes;
    Router::new()
        .route("/", post(receive_image))
        .layer(DefaultBodyLimit::max(limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
