use axum::{
    Json, Router,
    extract::{rejection::JsonRejection, DefaultBodyLimit, FromRequest, Path, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
};
use include_dir::{include_dir, Dir};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::{
    models::{
        ConfirmTagRequest, EditTagRequest, FormDefaults, FormError, LanguageToggle, OutfitRequest,
        SessionCreated, UploadImagesRequest, DEFAULT_WARDROBE_TEXT,
    },
    presenter::{present, BusyGuard, Presentation, OUTFIT_ELEMENT},
    session::{image_element, SessionStore, SessionView},
    stylist::Stylist,
    tagger::{decode_upload, image_key, ImageError, ImageTagger, TagError, TaggedImage},
    wardrobe::assemble_wardrobe,
};

static STATIC_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/static");

/// Room for several phone photos, base64-encoded in one JSON body.
pub const UPLOAD_LIMIT_BYTES: usize = 25 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionStore,
    pub stylist: Arc<Stylist>,
    pub tagger: Arc<ImageTagger>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("session {0} not found")]
    SessionNotFound(Uuid),
    #[error(transparent)]
    Form(#[from] FormError),
    #[error(transparent)]
    Tag(#[from] TagError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error("stylist request failed")]
    Generation(Presentation),
    #[error("invalid request body: {0}")]
    Body(#[from] JsonRejection),
}

/// `Json` whose rejections are reported as `ApiError`s.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::SessionNotFound(_) | ApiError::Tag(TagError::UnknownImage(_)) => StatusCode::NOT_FOUND,
            ApiError::Form(_) | ApiError::Tag(TagError::BlankTag(_)) => StatusCode::BAD_REQUEST,
            ApiError::Image(ImageError::Unsupported { .. }) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Image(_) => StatusCode::BAD_REQUEST,
            ApiError::Generation(_) => StatusCode::BAD_GATEWAY,
            // Well-formed JSON with values the form types cannot hold is still a bad form.
            ApiError::Body(rejection) if rejection.status() == StatusCode::UNPROCESSABLE_ENTITY => StatusCode::BAD_REQUEST,
            ApiError::Body(rejection) => rejection.status(),
        };
        match self {
            ApiError::Generation(presentation) => (status, Json(presentation)).into_response(),
            other => (status, Json(json!({ "error": other.to_string() }))).into_response(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/assets/*path", get(static_asset))
        .route("/api/defaults", get(get_defaults))
        .route("/api/session", post(create_session))
        .route("/api/session/:id", get(get_session))
        .route("/api/session/:id/language", put(set_language))
        .route(
            "/api/session/:id/images",
            post(upload_images).layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES)),
        )
        .route("/api/session/:id/images/:key", put(edit_tag))
        .route("/api/session/:id/images/:key/confirm", post(confirm_tag))
        .route("/api/session/:id/outfit", post(get_outfit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

pub async fn index() -> Response {
    match STATIC_DIR.get_file("index.html").and_then(|f| f.contents_utf8()) {
        Some(html) => Html(html).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn static_asset(Path(path): Path<String>) -> Response {
    let Some(file) = STATIC_DIR.get_file(&path) else { return StatusCode::NOT_FOUND.into_response() };
    let content_type = match path.rsplit('.').next() {
        Some("js") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("html") => "text/html; charset=utf-8",
        _ => "application/octet-stream",
    };
    ([(header::CONTENT_TYPE, content_type)], file.contents()).into_response()
}

pub async fn get_defaults() -> Json<FormDefaults> {
    Json(FormDefaults::new())
}

pub async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionCreated>) {
    let session = state.sessions.create();
    (StatusCode::CREATED, Json(SessionCreated {
        id: session.id,
        show_in_georgian: session.show_in_georgian(),
        created_at: session.created_at,
    }))
}

pub async fn get_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<SessionView>, ApiError> {
    state.sessions.view(id).map(Json).ok_or(ApiError::SessionNotFound(id))
}

pub async fn set_language(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LanguageToggle>,
) -> Result<Json<SessionView>, ApiError> {
    tracing::info!(session = %id, show_in_georgian = body.show_in_georgian, "Language toggled");
    state.sessions
        .update(id, |s| {
            s.set_show_in_georgian(body.show_in_georgian);
            s.view()
        })
        .map(Json)
        .ok_or(ApiError::SessionNotFound(id))
}

pub async fn upload_images(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<UploadImagesRequest>,
) -> Result<Json<Vec<TaggedImage>>, ApiError> {
    if !state.sessions.contains(id) {
        return Err(ApiError::SessionNotFound(id));
    }
    let payloads = body
        .images
        .iter()
        .map(|upload| decode_upload(&upload.file_name, &upload.data_base64))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!(session = %id, "🖼️ Tagging {} uploaded images", payloads.len());

    // One at a time, in upload order.
    let mut tagged = Vec::with_capacity(payloads.len());
    for payload in payloads {
        let key = state.sessions
            .update(id, |s| s.reserve_image_key(&image_key(&payload.file_name)))
            .ok_or(ApiError::SessionNotFound(id))?;
        let _busy = BusyGuard::claimed(&state.sessions, id, image_element(&key));
        let mut image = state.tagger.tag(payload).await;
        image.key = key;
        let added = state.sessions
            .update(id, |s| s.add_image(image).clone())
            .ok_or(ApiError::SessionNotFound(id))?;
        tagged.push(added);
    }
    Ok(Json(tagged))
}

pub async fn edit_tag(
    Path((id, key)): Path<(Uuid, String)>,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<EditTagRequest>,
) -> Result<Json<TaggedImage>, ApiError> {
    let edited = state.sessions
        .update(id, |s| s.edit_tag(&key, &body.tag).cloned())
        .ok_or(ApiError::SessionNotFound(id))??;
    Ok(Json(edited))
}

pub async fn confirm_tag(
    Path((id, key)): Path<(Uuid, String)>,
    State(state): State<AppState>,
    body: Option<Json<ConfirmTagRequest>>,
) -> Result<Json<SessionView>, ApiError> {
    let override_tag = body.and_then(|Json(b)| b.tag);
    let view = state.sessions
        .update(id, |s| s.confirm_tag(&key, override_tag.as_deref()).map(|_| s.view()))
        .ok_or(ApiError::SessionNotFound(id))??;
    tracing::info!(session = %id, image = %key, "➕ Tag added to wardrobe");
    Ok(Json(view))
}

#[axum::debug_handler]
pub async fn get_outfit(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<OutfitRequest>,
) -> Result<Json<Presentation>, ApiError> {
    let profile = body.profile.collect()?;
    let context_form = body.context;
    let (context, confirmed_tags) = state.sessions
        .update(id, |s| context_form.collect(s).map(|c| (c, s.confirmed_tags().to_vec())))
        .ok_or(ApiError::SessionNotFound(id))??;

    let wardrobe_text = body.wardrobe_text.as_deref().unwrap_or(DEFAULT_WARDROBE_TEXT);
    let wardrobe = assemble_wardrobe(wardrobe_text, &confirmed_tags);

    let result = {
        let _busy = BusyGuard::begin(&state.sessions, id, OUTFIT_ELEMENT);
        state.stylist.suggest(&profile, &wardrobe, &context).await
    };

    let presentation = present(result);
    if presentation.is_error() {
        return Err(ApiError::Generation(presentation));
    }
    Ok(Json(presentation))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::{
        localizer::Localizer,
        openai::{CaptionError, Captioner, GenerationError},
        stylist::tests::ScriptedGenerator,
        tagger::{tests::{png_base64, png_bytes}, ImagePayload},
    };
    use base64::Engine as _;
    use async_trait::async_trait;
    use axum::{body::Body, http::Request};
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use tower::ServiceExt; // for oneshot

    /// Captions an image after its file stem, e.g. `coat.png` → `coat piece`.
    struct StemCaptioner;

    #[async_trait]
    impl Captioner for StemCaptioner {
        async fn caption(&self, _instruction: &str, image: &ImagePayload) -> Result<String, CaptionError> {
            Ok(format!("{} piece", image.file_name.trim_end_matches(".png")))
        }
    }

    fn app(script: Vec<Result<String, GenerationError>>) -> (Router, Arc<ScriptedGenerator>) {
        let generator = Arc::new(ScriptedGenerator::new(script));
        let state = AppState {
            sessions: SessionStore::default(),
            stylist: Arc::new(Stylist::new(generator.clone(), Some(Localizer::new(generator.clone())))),
            tagger: Arc::new(ImageTagger::new(Some(Arc::new(StemCaptioner)))),
        };
        (router(state), generator)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn new_session(app: &Router) -> String {
        let (status, body) = send(app, "POST", "/api/session", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["show_in_georgian"], true);
        body["id"].as_str().unwrap().to_string()
    }

    /// A valid PNG padded with trailing zeros to roughly `len` bytes, like a full-size phone photo.
    fn photo_base64(len: usize) -> String {
        let mut bytes = png_bytes();
        bytes.resize(len.max(bytes.len()), 0);
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    fn outfit_body(show_in_georgian: Option<bool>) -> Value {
        json!({
            "profile": {"name": "Sofia", "location": "Barcelona"},
            "wardrobe_text": "white blouse, black jeans",
            "context": {"event": "coffee date", "season": "spring", "temperature_c": 20, "show_in_georgian": show_in_georgian}
        })
    }

    #[tokio::test]
    async fn index_page_is_served() {
        let (app, _) = app(vec![]);
        let response = app.oneshot(Request::builder().uri("/").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("Wardrobe Whisperer"));
    }

    #[tokio::test]
    async fn defaults_expose_widget_options() {
        let (app, _) = app(vec![]);
        let (status, body) = send(&app, "GET", "/api/defaults", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["profile"]["name"], "Sofia");
        assert_eq!(body["options"]["age_range"], json!([18, 60]));
        assert_eq!(body["options"]["brands"], json!(["Zara", "Arket", "Mango", "COS", "H&M"]));
    }

    #[tokio::test]
    async fn english_outfit_shows_the_raw_reply() {
        let (app, generator) = app(vec![Ok("Wear the white blouse.".into())]);
        let id = new_session(&app).await;

        let (status, body) = send(&app, "POST", &format!("/api/session/{id}/outfit"), Some(outfit_body(Some(false)))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({
            "kind": "suggestion",
            "heading": "🪄 AI Stylist Suggestion",
            "markdown": "Wear the white blouse.",
            "language": "english"
        }));

        let prompt = &generator.calls()[0].user;
        for needle in ["Sofia", "coffee date", "Barcelona", "20", "spring", "white blouse", "black jeans"] {
            assert!(prompt.contains(needle), "missing {needle:?}");
        }
    }

    #[tokio::test]
    async fn georgian_is_the_default_and_shows_the_localized_text() {
        let (app, generator) = app(vec![Ok("Wear the white blouse.".into()), Ok("ჩაიცვით თეთრი ბლუზა.".into())]);
        let id = new_session(&app).await;

        let (status, body) = send(&app, "POST", &format!("/api/session/{id}/outfit"), Some(outfit_body(None))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["markdown"], "ჩაიცვით თეთრი ბლუზა.");
        assert_eq!(body["language"], "georgian");
        assert_eq!(generator.calls().len(), 2);
    }

    #[tokio::test]
    async fn language_toggle_persists_across_submissions() {
        let (app, generator) = app(vec![Ok("one".into()), Ok("two".into())]);
        let id = new_session(&app).await;

        let (status, body) = send(&app, "PUT", &format!("/api/session/{id}/language"), Some(json!({"show_in_georgian": false}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["show_in_georgian"], false);

        for expected in ["one", "two"] {
            let (_, body) = send(&app, "POST", &format!("/api/session/{id}/outfit"), Some(outfit_body(None))).await;
            assert_eq!(body["markdown"], expected);
        }
        assert_eq!(generator.calls().len(), 2);
    }

    #[tokio::test]
    async fn timeout_shows_one_error_and_no_suggestion() {
        let (app, generator) = app(vec![Err(GenerationError::Timeout("operation timed out".into()))]);
        let id = new_session(&app).await;

        let (status, body) = send(&app, "POST", &format!("/api/session/{id}/outfit"), Some(outfit_body(Some(true)))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["kind"], "error");
        assert!(body["message"].as_str().unwrap().contains("timed out"));
        assert!(body.get("markdown").is_none());
        assert_eq!(generator.calls().len(), 1);

        // The session survives and nothing is left busy.
        let (status, view) = send(&app, "GET", &format!("/api/session/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["busy"], json!([]));
    }

    #[tokio::test]
    async fn only_the_confirmed_image_reaches_the_prompt() {
        let (app, generator) = app(vec![Ok("Wear the coat.".into())]);
        let id = new_session(&app).await;

        let upload = json!({"images": [
            {"file_name": "scarf.png", "data_base64": png_base64()},
            {"file_name": "coat.png", "data_base64": png_base64()}
        ]});
        let (status, images) = send(&app, "POST", &format!("/api/session/{id}/images"), Some(upload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(images[0]["tag"], "scarf piece");
        assert_eq!(images[1]["key"], "coat.png");

        let (status, view) = send(&app, "POST", &format!("/api/session/{id}/images/coat.png/confirm"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["confirmed_tags"], json!(["coat piece"]));

        let (status, _) = send(&app, "POST", &format!("/api/session/{id}/outfit"), Some(outfit_body(Some(false)))).await;
        assert_eq!(status, StatusCode::OK);
        let prompt = &generator.calls()[0].user;
        assert!(prompt.contains("white blouse, black jeans, coat piece"));
        assert!(!prompt.contains("scarf piece"));
    }

    #[tokio::test]
    async fn edited_tag_is_what_gets_added() {
        let (app, _) = app(vec![]);
        let id = new_session(&app).await;
        let upload = json!({"images": [{"file_name": "coat.png", "data_base64": png_base64()}]});
        send(&app, "POST", &format!("/api/session/{id}/images"), Some(upload)).await;

        let (status, image) = send(&app, "PUT", &format!("/api/session/{id}/images/coat.png"), Some(json!({"tag": "camel wool coat"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(image["suggested_tag"], "coat piece");
        assert_eq!(image["tag"], "camel wool coat");

        let (_, view) = send(&app, "POST", &format!("/api/session/{id}/images/coat.png/confirm"), Some(json!({}))).await;
        assert_eq!(view["confirmed_tags"], json!(["camel wool coat"]));
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected() {
        let (app, generator) = app(vec![]);
        let id = new_session(&app).await;

        let (status, _) = send(&app, "GET", &format!("/api/session/{}", Uuid::new_v4()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let gif = json!({"images": [{"file_name": "a.gif", "data_base64": "R0lGODlhAQABAAAAACw="}]});
        let (status, _) = send(&app, "POST", &format!("/api/session/{id}/images"), Some(gif)).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let (status, _) = send(&app, "POST", &format!("/api/session/{id}/images/nope/confirm"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let too_young = json!({"profile": {"age": 9}});
        let (status, body) = send(&app, "POST", &format!("/api/session/{id}/outfit"), Some(too_young)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("age"));

        // Values too large for the form's integer types are reported the same way.
        for (bad, field) in [
            (json!({"profile": {"age": 300}}), "age"),
            (json!({"profile": {"height_cm": 70000}}), "height_cm"),
            (json!({"context": {"temperature_c": 200}}), "temperature_c"),
        ] {
            let (status, body) = send(&app, "POST", &format!("/api/session/{id}/outfit"), Some(bad)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{field}");
            assert!(body["error"].as_str().unwrap().contains(field), "{body}");
        }

        let (status, body) = send(&app, "PUT", &format!("/api/session/{id}/language"), Some(json!({"show_in_georgian": "yes"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_translation_shows_one_error_and_no_suggestion() {
        let (app, generator) = app(vec![
            Ok("Wear the white blouse.".into()),
            Err(GenerationError::Network("connection reset".into())),
        ]);
        let id = new_session(&app).await;

        let (status, body) = send(&app, "POST", &format!("/api/session/{id}/outfit"), Some(outfit_body(None))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["kind"], "error");
        assert!(body["message"].as_str().unwrap().contains("connection reset"));
        assert!(body.get("markdown").is_none());
        assert_eq!(generator.calls().len(), 2);
    }

    #[tokio::test]
    async fn full_size_photos_are_accepted() {
        let (app, _) = app(vec![]);
        let id = new_session(&app).await;

        // Well past axum's 2 MB default once base64-encoded.
        let upload = json!({"images": [{"file_name": "coat.png", "data_base64": photo_base64(2_500_000)}]});
        let (status, images) = send(&app, "POST", &format!("/api/session/{id}/images"), Some(upload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(images[0]["key"], "coat.png");
        assert_eq!(images[0]["width"], 3);
    }

    #[tokio::test]
    async fn oversized_uploads_get_a_json_error() {
        let (app, _) = app(vec![]);
        let id = new_session(&app).await;

        let upload = json!({"images": [{"file_name": "huge.png", "data_base64": "A".repeat(UPLOAD_LIMIT_BYTES)}]});
        let (status, body) = send(&app, "POST", &format!("/api/session/{id}/images"), Some(upload)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(body["error"].is_string());

        let (_, view) = send(&app, "GET", &format!("/api/session/{id}"), None).await;
        assert_eq!(view["images"], json!([]));
    }

    #[tokio::test]
    async fn same_named_uploads_get_their_own_cards() {
        let (app, _) = app(vec![]);
        let id = new_session(&app).await;

        let upload = json!({"images": [
            {"file_name": "coat.png", "data_base64": png_base64()},
            {"file_name": "coat.png", "data_base64": png_base64()}
        ]});
        let (status, images) = send(&app, "POST", &format!("/api/session/{id}/images"), Some(upload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(images[0]["key"], "coat.png");
        assert_eq!(images[1]["key"], "coat.png-2");

        let (_, view) = send(&app, "GET", &format!("/api/session/{id}"), None).await;
        assert_eq!(view["busy"], json!([]));
        assert_eq!(view["images"].as_array().unwrap().len(), 2);
    }
}
