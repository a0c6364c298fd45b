//! HTTP handlers for project generation and the community feed.

use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::Field, rejection::JsonRejection},
};
use bytes::BytesMut;
use tracing::{Span, debug, info, instrument, warn};

use crate::{
    AppState,
    api::{
        handlers::parse_project_id,
        models::{
            MessageResponse,
            projects::{CreateProjectResponse, GenerateVideoRequest, GenerateVideoResponse, ProjectListResponse},
            users::CurrentUser,
        },
    },
    db::models::projects::ProjectFilter,
    errors::{Error, Result},
    generation::{DEFAULT_PROJECT_NAME, DEFAULT_TARGET_LENGTH, NewProject, SOURCE_IMAGE_COUNT},
    synthesis::InlineImage,
    types::{AspectRatio, ProjectId},
};

#[utoipa::path(
    post,
    path = "/project/create",
    tag = "projects",
    summary = "Create project",
    description = "Upload a product photo and a model photo and composite them into a new image. \
        Costs 5 credits, refunded if generation fails. Form fields: `images` (two files: product, then model), \
        `productName` (required), `name`, `productDescription`, `userPrompt`, `aspectRatio` (`9:16` or `16:9`), \
        `targetLength` (seconds).",
    request_body(
        content_type = "multipart/form-data",
        description = "Two images plus project fields"
    ),
    responses(
        (status = 200, description = "Project created with its generated image", body = CreateProjectResponse),
        (status = 400, description = "Missing fields, invalid values or insufficient credits", body = crate::errors::ErrorBody),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorBody),
        (status = 413, description = "An image exceeds the size limit", body = crate::errors::ErrorBody),
        (status = 500, description = "Generation failed", body = crate::errors::ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[instrument(skip_all, fields(user_id = %current_user.id))]
pub async fn create_project(
    State(state): State<AppState>,
    current_user: CurrentUser,
    multipart: Multipart,
) -> Result<Json<CreateProjectResponse>> {
    let input = read_project_form(multipart, state.config.limits.max_image_bytes).await?;

    let project = state.generation.create_project(&current_user.id, input).await?;
    info!(project_id = %project.id, "Project created");

    Ok(Json(CreateProjectResponse { project_id: project.id }))
}

/// Collect the upload form, enforcing image type and size as the parts stream in
async fn read_project_form(mut multipart: Multipart, max_image_bytes: usize) -> Result<NewProject> {
    let mut input = NewProject {
        name: DEFAULT_PROJECT_NAME.to_string(),
        product_name: String::new(),
        product_description: String::new(),
        user_prompt: String::new(),
        aspect_ratio: AspectRatio::default(),
        target_length: DEFAULT_TARGET_LENGTH,
        images: Vec::with_capacity(SOURCE_IMAGE_COUNT),
    };

    while let Some(field) = multipart.next_field().await.map_err(|e| Error::BadRequest {
        message: format!("Failed to parse multipart data: {e}"),
    })? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "images" => {
                if input.images.len() == SOURCE_IMAGE_COUNT {
                    return Err(Error::BadRequest {
                        message: "Upload at least 2 images & product name".to_string(),
                    });
                }
                input.images.push(read_image(field, max_image_bytes).await?);
            }
            "name" => {
                let name = read_text(field).await?;
                if !name.trim().is_empty() {
                    input.name = name;
                }
            }
            "productName" => input.product_name = read_text(field).await?,
            "productDescription" => input.product_description = read_text(field).await?,
            "userPrompt" => input.user_prompt = read_text(field).await?,
            "aspectRatio" => {
                let value = read_text(field).await?;
                if !value.trim().is_empty() {
                    input.aspect_ratio = value.trim().parse().map_err(|message| Error::BadRequest { message })?;
                }
            }
            "targetLength" => {
                let value = read_text(field).await?;
                if !value.trim().is_empty() {
                    input.target_length = value.trim().parse().map_err(|_| Error::BadRequest {
                        message: "targetLength must be a whole number of seconds".to_string(),
                    })?;
                }
            }
            other => {
                warn!(field = other, "Ignoring unknown form field");
            }
        }
    }

    Ok(input)
}

async fn read_image(mut field: Field<'_>, max_image_bytes: usize) -> Result<InlineImage> {
    let mime_type = field
        .content_type()
        .map(str::to_string)
        .or_else(|| {
            field
                .file_name()
                .and_then(|name| mime_guess::from_path(name).first_raw().map(str::to_string))
        })
        .unwrap_or_default();
    if !mime_type.starts_with("image/") {
        return Err(Error::BadRequest {
            message: "Only image uploads are allowed".to_string(),
        });
    }

    let mut data = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(|e| Error::BadRequest {
        message: format!("Failed to read image: {e}"),
    })? {
        // Check size limit incrementally to fail fast
        if data.len() + chunk.len() > max_image_bytes {
            return Err(Error::PayloadTooLarge {
                message: format!(
                    "Image exceeds maximum allowed size of {} bytes ({} MB)",
                    max_image_bytes,
                    max_image_bytes / (1024 * 1024)
                ),
            });
        }
        data.extend_from_slice(&chunk);
    }

    Ok(InlineImage {
        data: data.freeze(),
        mime_type,
    })
}

async fn read_text(field: Field<'_>) -> Result<String> {
    field.text().await.map_err(|e| Error::BadRequest {
        message: format!("Failed to read form field: {e}"),
    })
}

#[utoipa::path(
    post,
    path = "/project/video",
    tag = "projects",
    summary = "Generate video",
    description = "Animate a project's generated image into a short video. Costs 10 credits, refunded if generation fails. \
        The request returns once the video is stored.",
    request_body = GenerateVideoRequest,
    responses(
        (status = 200, description = "Video generated", body = GenerateVideoResponse),
        (status = 400, description = "Missing or invalid project ID, project busy, already has a video, has no image, or insufficient credits", body = crate::errors::ErrorBody),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorBody),
        (status = 404, description = "Project not found", body = crate::errors::ErrorBody),
        (status = 500, description = "Generation failed", body = crate::errors::ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[instrument(skip_all, fields(user_id = %current_user.id, project_id = tracing::field::Empty))]
pub async fn generate_video(
    State(state): State<AppState>,
    current_user: CurrentUser,
    payload: std::result::Result<Json<GenerateVideoRequest>, JsonRejection>,
) -> Result<Json<GenerateVideoResponse>> {
    let project_id = video_project_id(payload)?;
    Span::current().record("project_id", tracing::field::display(project_id));

    let project = state.generation.generate_video(&current_user.id, project_id).await?;

    let video_url = project.generated_video.ok_or_else(|| Error::Internal {
        operation: "read generated video URL".to_string(),
    })?;
    Ok(Json(GenerateVideoResponse {
        video_url,
        message: "Video generation completed".to_string(),
    }))
}

/// Unreadable bodies and missing or malformed ids are all the caller's mistake
fn video_project_id(payload: std::result::Result<Json<GenerateVideoRequest>, JsonRejection>) -> Result<ProjectId> {
    let invalid = || Error::BadRequest {
        message: "Valid Project ID required".to_string(),
    };
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!("Rejected video request body: {}", rejection.body_text());
            return Err(invalid());
        }
    };
    request
        .project_id
        .as_deref()
        .map(str::trim)
        .and_then(|id| id.parse().ok())
        .ok_or_else(invalid)
}

#[utoipa::path(
    get,
    path = "/project/published",
    tag = "projects",
    summary = "Community feed",
    description = "Every published project, newest first.",
    responses(
        (status = 200, description = "Published projects", body = ProjectListResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorBody),
    )
)]
#[instrument(skip_all)]
pub async fn list_published(State(state): State<AppState>) -> Result<Json<ProjectListResponse>> {
    let projects = state.store.list_projects(&ProjectFilter::published()).await?;
    Ok(Json(projects.into_iter().collect()))
}

#[utoipa::path(
    delete,
    path = "/project/{project_id}",
    tag = "projects",
    summary = "Delete project",
    description = "Delete one of the caller's projects and its stored media.",
    params(("project_id" = String, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project deleted", body = MessageResponse),
        (status = 400, description = "Invalid project ID", body = crate::errors::ErrorBody),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorBody),
        (status = 404, description = "Project not found", body = crate::errors::ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[instrument(skip_all, fields(user_id = %current_user.id, project_id = %project_id))]
pub async fn delete_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    current_user: CurrentUser,
) -> Result<Json<MessageResponse>> {
    let project_id = parse_project_id(&project_id)?;

    let project = state
        .store
        .get_project(project_id)
        .await?
        .filter(|project| project.user_id == current_user.id)
        .ok_or_else(|| Error::project_not_found(project_id))?;

    if !state.store.delete_project(project_id).await? {
        return Err(Error::project_not_found(project_id));
    }

    // Media cleanup is best effort; the row is already gone
    let media = project
        .uploaded_images
        .iter()
        .chain(project.generated_image.iter())
        .chain(project.generated_video.iter());
    for url in media {
        if let Err(e) = state.objects.delete(url).await {
            warn!(%url, "Failed to delete project media: {e}");
        }
    }

    info!("Project deleted");
    Ok(Json(MessageResponse::new("Project deleted successfully")))
}
