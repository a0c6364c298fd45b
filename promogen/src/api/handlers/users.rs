//! HTTP handlers for the caller's account and projects.

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::{info, instrument};

use crate::{
    AppState,
    api::{
        handlers::parse_project_id,
        models::{
            projects::{ProjectListResponse, ProjectResponse, PublishResponse, SingleProjectResponse},
            users::{CreditsResponse, CurrentUser},
        },
    },
    db::models::projects::{ProjectFilter, ProjectUpdateDBRequest},
    errors::{Error, Result},
};

#[utoipa::path(
    get,
    path = "/user/credits",
    tag = "users",
    summary = "Credit balance",
    description = "The caller's credit balance. Users the identity provider has not reported yet hold 0.",
    responses(
        (status = 200, description = "Current balance", body = CreditsResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[instrument(skip_all, fields(user_id = %current_user.id))]
pub async fn get_credits(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<CreditsResponse>> {
    let credits = state
        .store
        .get_user(&current_user.id)
        .await?
        .map(|user| user.credits)
        .unwrap_or_default();
    Ok(Json(CreditsResponse { credits }))
}

#[utoipa::path(
    get,
    path = "/user/projects",
    tag = "users",
    summary = "List own projects",
    description = "The caller's projects, newest first.",
    responses(
        (status = 200, description = "The caller's projects", body = ProjectListResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[instrument(skip_all, fields(user_id = %current_user.id))]
pub async fn list_projects(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<ProjectListResponse>> {
    let projects = state.store.list_projects(&ProjectFilter::owned_by(current_user.id)).await?;
    Ok(Json(projects.into_iter().collect()))
}

#[utoipa::path(
    get,
    path = "/user/projects/{project_id}",
    tag = "users",
    summary = "Get own project",
    description = "One of the caller's projects. Clients poll this while `isGenerating` is true.",
    params(("project_id" = String, Path, description = "Project ID")),
    responses(
        (status = 200, description = "The project", body = SingleProjectResponse),
        (status = 400, description = "Invalid project ID", body = crate::errors::ErrorBody),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorBody),
        (status = 404, description = "Project not found", body = crate::errors::ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[instrument(skip_all, fields(user_id = %current_user.id, project_id = %project_id))]
pub async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    current_user: CurrentUser,
) -> Result<Json<SingleProjectResponse>> {
    let project_id = parse_project_id(&project_id)?;
    let project = state
        .store
        .get_project(project_id)
        .await?
        .filter(|project| project.user_id == current_user.id)
        .ok_or_else(|| Error::project_not_found(project_id))?;

    Ok(Json(SingleProjectResponse {
        project: ProjectResponse::from(project),
    }))
}

#[utoipa::path(
    get,
    path = "/user/publish/{project_id}",
    tag = "users",
    summary = "Toggle publication",
    description = "Flip whether one of the caller's projects appears in the community feed. \
        Only projects with a generated image or video can be published.",
    params(("project_id" = String, Path, description = "Project ID")),
    responses(
        (status = 200, description = "New publication state", body = PublishResponse),
        (status = 400, description = "Invalid project ID, or nothing generated yet", body = crate::errors::ErrorBody),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorBody),
        (status = 404, description = "Project not found", body = crate::errors::ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[instrument(skip_all, fields(user_id = %current_user.id, project_id = %project_id))]
pub async fn toggle_publish(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    current_user: CurrentUser,
) -> Result<Json<PublishResponse>> {
    let project_id = parse_project_id(&project_id)?;
    let project = state
        .store
        .get_project(project_id)
        .await?
        .filter(|project| project.user_id == current_user.id)
        .ok_or_else(|| Error::project_not_found(project_id))?;

    if !project.has_asset() {
        return Err(Error::BadRequest {
            message: "Image or video not generated".to_string(),
        });
    }

    let updated = state
        .store
        .update_project(
            project_id,
            &ProjectUpdateDBRequest {
                is_published: Some(!project.is_published),
                ..Default::default()
            },
        )
        .await?;
    info!(published = updated.is_published, "Toggled publication");

    Ok(Json(PublishResponse {
        published: updated.is_published,
    }))
}

#[cfg(test)]
mod tests {
    use crate::{
        db::models::projects::ProjectCreateDBRequest,
        test_utils::{TestEnv, create_test_app, mint_token},
        types::AspectRatio,
    };
    use axum::http::StatusCode;
    use serde_json::{Value, json};
    use uuid::Uuid;

    async fn seed_project(env: &TestEnv, user_id: &str, generated_image: bool) -> Uuid {
        let id = Uuid::new_v4();
        env.store
            .create_project(&ProjectCreateDBRequest {
                id,
                user_id: user_id.to_string(),
                name: "New Project".to_string(),
                product_name: "Lamp".to_string(),
                product_description: String::new(),
                user_prompt: String::new(),
                aspect_ratio: AspectRatio::Portrait,
                target_length: 5,
                uploaded_images: vec!["a".to_string(), "b".to_string()],
                is_generating: false,
            })
            .await
            .unwrap();
        if generated_image {
            env.store
                .update_project(
                    id,
                    &crate::db::models::projects::ProjectUpdateDBRequest {
                        generated_image: Some("http://localhost:5000/media/x.png".to_string()),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }
        id
    }

    #[tokio::test]
    async fn test_credits() {
        let env = TestEnv::new().await;
        let server = create_test_app(&env);
        let user = env.user_with_credits(35).await;

        server
            .get("/api/user/credits")
            .authorization_bearer(mint_token(&user))
            .await
            .assert_json(&json!({"credits": 35}));

        server
            .get("/api/user/credits")
            .authorization_bearer(mint_token("user_not_synced_yet"))
            .await
            .assert_json(&json!({"credits": 0}));

        server.get("/api/user/credits").await.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_projects_are_scoped_to_owner() {
        let env = TestEnv::new().await;
        let server = create_test_app(&env);
        let owner = env.user_with_credits(0).await;
        let other = env.user_with_credits(0).await;

        let first = seed_project(&env, &owner, false).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = seed_project(&env, &owner, true).await;
        seed_project(&env, &other, true).await;

        let listed: Value = server
            .get("/api/user/projects")
            .authorization_bearer(mint_token(&owner))
            .await
            .json();
        let listed = listed["projects"].as_array().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0]["id"], second.to_string());
        assert_eq!(listed[1]["id"], first.to_string());

        let single: Value = server
            .get(&format!("/api/user/projects/{second}"))
            .authorization_bearer(mint_token(&owner))
            .await
            .json();
        assert_eq!(single["project"]["productName"], "Lamp");

        server
            .get(&format!("/api/user/projects/{second}"))
            .authorization_bearer(mint_token(&other))
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let response = server
            .get("/api/user/projects/123")
            .authorization_bearer(mint_token(&owner))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&json!({"message": "Invalid Project ID"}));
    }

    #[tokio::test]
    async fn test_publish_toggle() {
        let env = TestEnv::new().await;
        let server = create_test_app(&env);
        let owner = env.user_with_credits(0).await;
        let token = mint_token(&owner);

        let bare = seed_project(&env, &owner, false).await;
        let response = server.get(&format!("/api/user/publish/{bare}")).authorization_bearer(&token).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&json!({"message": "Image or video not generated"}));

        let ready = seed_project(&env, &owner, true).await;
        for expected in [true, false, true] {
            server
                .get(&format!("/api/user/publish/{ready}"))
                .authorization_bearer(&token)
                .await
                .assert_json(&json!({"published": expected}));
        }

        let stranger = env.user_with_credits(0).await;
        server
            .get(&format!("/api/user/publish/{ready}"))
            .authorization_bearer(mint_token(&stranger))
            .await
            .assert_status(StatusCode::NOT_FOUND);
        assert!(env.store.get_project(ready).await.unwrap().unwrap().is_published);
    }
}
