//! OpenAPI documentation for the `/api/*` surface.
//!
//! The document is served at `/openapi.json` and rendered with Scalar at `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::{api, errors::ErrorBody, types::AspectRatio, webhooks::events::WebhookEnvelope};

/// Bearer session tokens issued by the identity provider
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Session token from the identity provider. Include it in the `Authorization` header:\n\n\
                            ```\nAuthorization: Bearer SESSION_TOKEN\n```",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Promogen API",
        description = "Credit-metered product photo compositing and video generation."
    ),
    servers(
        (url = "/api", description = "Promogen API")
    ),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::projects::create_project,
        api::handlers::projects::generate_video,
        api::handlers::projects::list_published,
        api::handlers::projects::delete_project,
        api::handlers::users::get_credits,
        api::handlers::users::list_projects,
        api::handlers::users::get_project,
        api::handlers::users::toggle_publish,
        api::handlers::webhooks::identity_webhook,
    ),
    components(
        schemas(
            AspectRatio,
            ErrorBody,
            WebhookEnvelope,
            api::models::MessageResponse,
            api::models::projects::ProjectResponse,
            api::models::projects::CreateProjectResponse,
            api::models::projects::GenerateVideoRequest,
            api::models::projects::GenerateVideoResponse,
            api::models::projects::ProjectListResponse,
            api::models::projects::SingleProjectResponse,
            api::models::projects::PublishResponse,
            api::models::users::CreditsResponse,
        )
    ),
    tags(
        (name = "projects", description = "Project generation and the community feed"),
        (name = "users", description = "The caller's balance and projects"),
        (name = "webhooks", description = "Identity provider events"),
    )
)]
pub struct ApiDoc;
