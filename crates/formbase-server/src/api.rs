//! REST API surface over the form store.
//!
//! Handlers translate request bodies into the store's typed operations and
//! map [`StoreError`]s onto status codes: 400 validation, 404 not-found,
//! 409 uniqueness conflict, 413 field-count-exceeded.  Mutations are logged
//! after they commit; a failed log line can never roll back a write.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::Method,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use formbase_core::{sanitize_and_validate, CategoryId, CleanField, FormId, RawField, TemplateId};
use formbase_store::{Database, Form, FormDraft, FormField, FormVersion, Patch, Submission};

use crate::config::ServerConfig;
use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        // Forms
        .route("/forms", get(list_forms).post(save_form))
        .route("/forms/check-title", get(check_title))
        .route("/forms/{id}", get(read_form).delete(delete_form))
        // Versions
        .route("/forms/{id}/versions", get(list_versions).post(create_version))
        .route("/forms/{id}/versions/{vid}/publish", post(publish_version))
        .route("/forms/{id}/versions/{vid}/rollback", post(rollback_version))
        // Submissions
        .route(
            "/forms/{id}/submissions",
            get(list_submissions).post(submit_form),
        )
        // Drafts
        .route("/drafts", get(read_draft).post(save_draft))
        .route("/drafts/{id}/publish", post(publish_draft))
        // Templates
        .route("/templates", get(list_templates).post(create_template))
        .route("/templates/check-name", get(check_template_name))
        .route(
            "/templates/{id}",
            get(read_template).put(update_template).delete(delete_template),
        )
        // Categories
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/{id}",
            put(update_category).delete(delete_category),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and run the HTTP server until it fails or is shut down.
pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "HTTP API listening");
    axum::serve(listener, router).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// `POST /forms` handles both create (no `id`) and update (`id` present).
/// On update, an absent key means "leave unchanged"; an empty `category`
/// string clears it back to the default.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveFormRequest {
    id: Option<String>,
    title: Option<String>,
    fields: Option<Vec<RawField>>,
    category: Option<String>,
    created_by: Option<String>,
}

#[derive(Serialize)]
struct FormResponse {
    form: Form,
    fields: Vec<FormField>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckTitleQuery {
    title: String,
    exclude_id: Option<String>,
}

#[derive(Serialize)]
struct UniqueResponse {
    unique: bool,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct CreateVersionRequest {
    /// Defaults to the form's current title.
    title: Option<String>,
    /// Defaults to the form's live fields.
    fields: Option<Vec<RawField>>,
    category_id: Option<String>,
    created_by: Option<String>,
    change_description: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RollbackRequest {
    created_by: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveDraftRequest {
    form_id: Option<String>,
    created_by: String,
    title: String,
    category_id: Option<String>,
    fields: Vec<RawField>,
    #[serde(default)]
    is_auto_save: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DraftQuery {
    form_id: Option<String>,
    created_by: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PublishDraftResponse {
    form: Form,
    version: FormVersion,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTemplateRequest {
    name: String,
    description: Option<String>,
    fields: Vec<RawField>,
    category_id: Option<String>,
    created_by: Option<String>,
}

/// Partial template patch.  `Option<Option<..>>` distinguishes an absent
/// key (keep) from an explicit `null` (clear).
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UpdateTemplateRequest {
    name: Option<String>,
    #[serde(default, with = "double_option")]
    description: Option<Option<String>>,
    fields: Option<Vec<RawField>>,
    #[serde(default, with = "double_option")]
    category_id: Option<Option<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckNameQuery {
    name: String,
    exclude_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCategoryRequest {
    name: String,
    description: Option<String>,
    color: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UpdateCategoryRequest {
    name: Option<String>,
    #[serde(default, with = "double_option")]
    description: Option<Option<String>>,
    color: Option<String>,
}

#[derive(Serialize)]
struct DeletedResponse {
    deleted: bool,
}

/// Serde helper: missing key -> `None`, explicit `null` -> `Some(None)`.
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(de).map(Some)
    }
}

// ---------------------------------------------------------------------------
// Path/body helpers
// ---------------------------------------------------------------------------

fn form_id(s: &str) -> Result<FormId, ApiError> {
    // A malformed id cannot name any form.
    FormId::parse(s).ok_or(ApiError::NotFound)
}

fn template_id(s: &str) -> Result<TemplateId, ApiError> {
    TemplateId::parse(s).ok_or(ApiError::NotFound)
}

fn category_id(s: &str) -> Result<CategoryId, ApiError> {
    CategoryId::parse(s).ok_or(ApiError::NotFound)
}

fn version_id(s: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(s).map_err(|_| ApiError::NotFound)
}

/// `excludeId` on the uniqueness probes is advisory: a malformed id cannot
/// name any row, so it excludes nothing rather than failing the check.
fn exclude_form_id(raw: Option<&str>) -> Option<FormId> {
    raw.and_then(FormId::parse)
}

fn exclude_template_id(raw: Option<&str>) -> Option<TemplateId> {
    raw.and_then(TemplateId::parse)
}

fn sanitize(fields: &[RawField], config: &ServerConfig) -> Result<Vec<CleanField>, ApiError> {
    sanitize_and_validate(fields, &config.field_limits()).map_err(ApiError::from)
}

// ---------------------------------------------------------------------------
// Handlers: health
// ---------------------------------------------------------------------------

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ---------------------------------------------------------------------------
// Handlers: forms
// ---------------------------------------------------------------------------

async fn list_forms(State(state): State<AppState>) -> Result<Json<Vec<Form>>, ApiError> {
    let db = state.db.lock().await;
    Ok(Json(db.list_forms()?))
}

async fn save_form(
    State(state): State<AppState>,
    Json(body): Json<SaveFormRequest>,
) -> Result<Json<FormResponse>, ApiError> {
    let clean = body
        .fields
        .as_deref()
        .map(|raw| sanitize(raw, &state.config))
        .transpose()?;

    let mut db = state.db.lock().await;

    match body.id {
        // Update path.
        Some(id) => {
            let id = form_id(&id)?;
            let form = db
                .update_form_with_fields(
                    &id,
                    Patch::from_option(body.title),
                    clean.as_deref(),
                    Patch::from_option(body.category),
                )?
                .ok_or(ApiError::NotFound)?;
            let fields = db.get_form_fields(&id)?;

            info!(form_id = %form.id, "form updated");
            Ok(Json(FormResponse { form, fields }))
        }
        // Create path.
        None => {
            let title = body
                .title
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| ApiError::Validation(vec!["Title is required".into()]))?;
            let clean = clean
                .ok_or_else(|| ApiError::Validation(vec!["Fields are required".into()]))?;

            let (form, fields) = db.create_form_with_fields(
                title,
                &clean,
                body.category.as_deref(),
                body.created_by.as_deref(),
            )?;

            info!(form_id = %form.id, fields = fields.len(), "form created");
            Ok(Json(FormResponse { form, fields }))
        }
    }
}

async fn read_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FormResponse>, ApiError> {
    let id = form_id(&id)?;
    let db = state.db.lock().await;
    let form = db.get_form(&id)?;
    let fields = db.get_form_fields(&id)?;
    Ok(Json(FormResponse { form, fields }))
}

async fn delete_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let id = form_id(&id)?;
    let db = state.db.lock().await;
    if !db.delete_form(&id)? {
        return Err(ApiError::NotFound);
    }
    info!(form_id = %id, "form deleted");
    Ok(Json(DeletedResponse { deleted: true }))
}

async fn check_title(
    State(state): State<AppState>,
    Query(query): Query<CheckTitleQuery>,
) -> Result<Json<UniqueResponse>, ApiError> {
    let exclude = exclude_form_id(query.exclude_id.as_deref());
    let db = state.db.lock().await;
    let taken = db.is_form_title_taken(&query.title, exclude.as_ref())?;
    Ok(Json(UniqueResponse { unique: !taken }))
}

// ---------------------------------------------------------------------------
// Handlers: versions
// ---------------------------------------------------------------------------

async fn list_versions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<FormVersion>>, ApiError> {
    let id = form_id(&id)?;
    let db = state.db.lock().await;
    Ok(Json(db.list_versions(&id)?))
}

async fn create_version(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CreateVersionRequest>,
) -> Result<Json<FormVersion>, ApiError> {
    let id = form_id(&id)?;
    let clean = body
        .fields
        .as_deref()
        .map(|raw| sanitize(raw, &state.config))
        .transpose()?;

    let mut db = state.db.lock().await;

    // Absent title/fields snapshot the form's current live state.
    let form = db.get_form(&id)?;
    let title = body.title.unwrap_or(form.title);
    let fields = match clean {
        Some(fields) => fields,
        None => db
            .get_form_fields(&id)?
            .iter()
            .map(FormField::to_clean)
            .collect(),
    };

    let version = db.create_version(
        &id,
        &title,
        &fields,
        body.category_id.as_deref(),
        body.created_by.as_deref(),
        body.change_description.as_deref(),
    )?;

    info!(form_id = %id, version = version.version_number, "version created");
    Ok(Json(version))
}

async fn publish_version(
    State(state): State<AppState>,
    Path((id, vid)): Path<(String, String)>,
) -> Result<Json<FormVersion>, ApiError> {
    let id = form_id(&id)?;
    let vid = version_id(&vid)?;

    let mut db = state.db.lock().await;
    let version = db.publish_version(&id, vid)?;

    info!(form_id = %id, version = version.version_number, "version published");
    Ok(Json(version))
}

async fn rollback_version(
    State(state): State<AppState>,
    Path((id, vid)): Path<(String, String)>,
    body: Option<Json<RollbackRequest>>,
) -> Result<Json<FormVersion>, ApiError> {
    let id = form_id(&id)?;
    let vid = version_id(&vid)?;
    let created_by = body.and_then(|Json(b)| b.created_by);

    let mut db = state.db.lock().await;
    let version = db.rollback_to_version(&id, vid, created_by.as_deref())?;

    info!(form_id = %id, version = version.version_number, "rolled back");
    Ok(Json(version))
}

// ---------------------------------------------------------------------------
// Handlers: drafts
// ---------------------------------------------------------------------------

async fn read_draft(
    State(state): State<AppState>,
    Query(query): Query<DraftQuery>,
) -> Result<Json<FormDraft>, ApiError> {
    let form = query.form_id.as_deref().map(form_id).transpose()?;
    let db = state.db.lock().await;
    let draft = db
        .get_draft(form.as_ref(), &query.created_by)?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(draft))
}

async fn save_draft(
    State(state): State<AppState>,
    Json(body): Json<SaveDraftRequest>,
) -> Result<Json<FormDraft>, ApiError> {
    let form = body.form_id.as_deref().map(form_id).transpose()?;
    let clean = sanitize(&body.fields, &state.config)?;

    let mut db = state.db.lock().await;
    let draft = db.save_draft(
        form.as_ref(),
        &body.created_by,
        &body.title,
        body.category_id.as_deref(),
        &clean,
        body.is_auto_save,
    )?;
    Ok(Json(draft))
}

async fn publish_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PublishDraftResponse>, ApiError> {
    let draft_id = Uuid::parse_str(&id).map_err(|_| ApiError::NotFound)?;

    let mut db = state.db.lock().await;
    let (form, version) = db.publish_draft_as_form(draft_id)?;

    info!(form_id = %form.id, "draft published as form");
    Ok(Json(PublishDraftResponse { form, version }))
}

// ---------------------------------------------------------------------------
// Handlers: submissions
// ---------------------------------------------------------------------------

async fn submit_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(values): Json<serde_json::Map<String, serde_json::Value>>,
) -> Result<Json<Submission>, ApiError> {
    let id = form_id(&id)?;
    let db = state.db.lock().await;
    let submission = db.submit(&id, &values)?;
    info!(form_id = %id, "submission stored");
    Ok(Json(submission))
}

async fn list_submissions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Submission>>, ApiError> {
    let id = form_id(&id)?;
    let db = state.db.lock().await;
    Ok(Json(db.list_submissions(&id)?))
}

// ---------------------------------------------------------------------------
// Handlers: templates
// ---------------------------------------------------------------------------

async fn list_templates(
    State(state): State<AppState>,
) -> Result<Json<Vec<formbase_store::Template>>, ApiError> {
    let db = state.db.lock().await;
    Ok(Json(db.list_templates()?))
}

async fn create_template(
    State(state): State<AppState>,
    Json(body): Json<CreateTemplateRequest>,
) -> Result<Json<formbase_store::Template>, ApiError> {
    let clean = sanitize(&body.fields, &state.config)?;
    let category = body.category_id.as_deref().map(category_id).transpose()?;

    let mut db = state.db.lock().await;
    let template = db.create_template(
        &body.name,
        body.description.as_deref(),
        &clean,
        category.as_ref(),
        body.created_by.as_deref(),
    )?;

    info!(template_id = %template.id, "template created");
    Ok(Json(template))
}

async fn read_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<formbase_store::Template>, ApiError> {
    let id = template_id(&id)?;
    let db = state.db.lock().await;
    Ok(Json(db.get_template(&id)?))
}

async fn update_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateTemplateRequest>,
) -> Result<Json<formbase_store::Template>, ApiError> {
    let id = template_id(&id)?;
    let clean = body
        .fields
        .as_deref()
        .map(|raw| sanitize(raw, &state.config))
        .transpose()?;
    let category = match body.category_id {
        None => Patch::Keep,
        Some(None) => Patch::Set(None),
        Some(Some(raw)) => Patch::Set(Some(category_id(&raw)?)),
    };

    let mut db = state.db.lock().await;
    let template = db
        .update_template(
            &id,
            Patch::from_option(body.name),
            Patch::from_option(body.description),
            Patch::from_option(clean),
            category,
        )?
        .ok_or(ApiError::NotFound)?;

    info!(template_id = %template.id, "template updated");
    Ok(Json(template))
}

async fn delete_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let id = template_id(&id)?;
    let db = state.db.lock().await;
    if !db.delete_template(&id)? {
        return Err(ApiError::NotFound);
    }
    info!(template_id = %id, "template deleted");
    Ok(Json(DeletedResponse { deleted: true }))
}

async fn check_template_name(
    State(state): State<AppState>,
    Query(query): Query<CheckNameQuery>,
) -> Result<Json<UniqueResponse>, ApiError> {
    let exclude = exclude_template_id(query.exclude_id.as_deref());
    let db = state.db.lock().await;
    let taken = db.is_template_name_taken(&query.name, exclude.as_ref())?;
    Ok(Json(UniqueResponse { unique: !taken }))
}

// ---------------------------------------------------------------------------
// Handlers: categories
// ---------------------------------------------------------------------------

async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<formbase_store::Category>>, ApiError> {
    let db = state.db.lock().await;
    Ok(Json(db.list_categories()?))
}

async fn create_category(
    State(state): State<AppState>,
    Json(body): Json<CreateCategoryRequest>,
) -> Result<Json<formbase_store::Category>, ApiError> {
    let mut db = state.db.lock().await;
    let category = db.create_category(
        &body.name,
        body.description.as_deref(),
        body.color.as_deref(),
    )?;
    info!(category_id = %category.id, "category created");
    Ok(Json(category))
}

async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateCategoryRequest>,
) -> Result<Json<formbase_store::Category>, ApiError> {
    let id = category_id(&id)?;
    let mut db = state.db.lock().await;
    let category = db
        .update_category(
            &id,
            Patch::from_option(body.name),
            Patch::from_option(body.description),
            Patch::from_option(body.color),
        )?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(category))
}

async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let id = category_id(&id)?;
    let db = state.db.lock().await;
    if !db.delete_category(&id)? {
        return Err(ApiError::NotFound);
    }
    info!(category_id = %id, "category deleted");
    Ok(Json(DeletedResponse { deleted: true }))
}
