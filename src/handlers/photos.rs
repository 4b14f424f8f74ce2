use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::db::{IntegrationStore, NewPhoto, PhotoRecord, Stage};
use crate::error::DriveError;
use crate::orchestrator::PhotoPersisted;
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateProjectBody {
    pub project_id: String,
    pub display_name: Option<String>,
}

/// POST /projects -> register the slice of the project record the
/// provisioner names folders after.
pub async fn create_project(
    State(state): State<AppState>,
    Json(body): Json<CreateProjectBody>,
) -> Result<impl IntoResponse, DriveError> {
    state
        .store
        .upsert_project(&body.project_id, body.display_name.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "ok": true }))))
}

#[derive(Debug, Deserialize)]
pub struct CreatePhotoBody {
    pub project_id: String,
    pub stage: Stage,
    pub local_file_ref: Option<String>,
}

/// POST /photos -> persist the record, then hand it to the orchestrator.
/// The upload runs inline; the response carries the updated record.
pub async fn create_photo(
    State(state): State<AppState>,
    Json(body): Json<CreatePhotoBody>,
) -> Result<Json<PhotoRecord>, DriveError> {
    let record = state
        .store
        .insert_photo(&NewPhoto {
            project_id: body.project_id,
            stage: body.stage,
            local_file_ref: body.local_file_ref,
        })
        .await?;

    state
        .orchestrator
        .on_photo_persisted(&PhotoPersisted {
            photo: record.clone(),
        })
        .await?;

    let record = state.store.photo_by_id(record.id).await?.unwrap_or(record);
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePhotoBody {
    pub local_file_ref: String,
}

/// PATCH /photos/{id} -> attach a local file and trigger the upload.
pub async fn update_photo(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdatePhotoBody>,
) -> Result<Response, DriveError> {
    let Some(mut record) = state.store.photo_by_id(id).await? else {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": { "code": "NOT_FOUND", "message": "photo record not found" }
            })),
        )
            .into_response());
    };

    state.store.set_photo_file(id, &body.local_file_ref).await?;
    record.local_file_ref = Some(body.local_file_ref);

    state
        .orchestrator
        .on_photo_persisted(&PhotoPersisted {
            photo: record.clone(),
        })
        .await?;

    let record = state.store.photo_by_id(id).await?.unwrap_or(record);
    Ok(Json(record).into_response())
}
