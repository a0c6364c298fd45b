//! Whole-application tests: a user arrives through the identity webhook, pays for generations,
//! publishes and deletes their work, all through the HTTP surface.

use crate::test_utils::{FakeSynthesis, TestEnv, create_test_app, mint_token, webhook_headers};
use axum::http::{HeaderValue, StatusCode, header};
use axum_test::{
    TestServer,
    multipart::{MultipartForm, Part},
};
use serde_json::{Value, json};

async fn deliver(server: &TestServer, event: Value) {
    let body = event.to_string();
    let mut request = server.post("/api/clerk").content_type("application/json");
    for (name, value) in webhook_headers(&body) {
        request = request.add_header(name, value);
    }
    request.bytes(body.into()).await.assert_status_ok();
}

fn project_form(product: &str) -> MultipartForm {
    let image = |bytes: &'static [u8]| Part::bytes(bytes).file_name("photo.jpg").mime_type("image/jpeg");
    MultipartForm::new()
        .add_part("images", image(b"product-bytes"))
        .add_part("images", image(b"model-bytes"))
        .add_text("name", format!("{product} launch"))
        .add_text("productName", product.to_string())
        .add_text("aspectRatio", "9:16")
}

/// Path of a `/media` URL issued by the test store
fn media_path(url: &str) -> &str {
    url.strip_prefix("http://localhost:5000").expect("local media URL")
}

#[tokio::test]
async fn test_root_reports_liveness() {
    let env = TestEnv::new().await;
    let server = create_test_app(&env);

    let response = server.get("/").await;
    response.assert_status_ok();
    response.assert_text("Server is Live!");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let env = TestEnv::new().await;
    let server = create_test_app(&env);

    let doc: Value = server.get("/openapi.json").await.json();
    assert_eq!(doc["servers"][0]["url"], "/api");
    assert!(doc["paths"]["/project/create"]["post"].is_object());
    assert!(doc["components"]["securitySchemes"]["BearerAuth"].is_object());

    server.get("/docs").await.assert_status_ok();
}

#[tokio::test]
async fn test_cors_preflight() {
    let env = TestEnv::new().await;
    let server = create_test_app(&env);

    let response = server
        .method(axum::http::Method::OPTIONS, "/api/user/credits")
        .add_header(header::ORIGIN, HeaderValue::from_static("https://app.example.com"))
        .add_header(header::ACCESS_CONTROL_REQUEST_METHOD, HeaderValue::from_static("GET"))
        .add_header(
            header::ACCESS_CONTROL_REQUEST_HEADERS,
            HeaderValue::from_static("authorization"),
        )
        .await;
    response.assert_status_ok();
    assert_eq!(response.header(header::ACCESS_CONTROL_ALLOW_ORIGIN), "*");
}

#[test_log::test(tokio::test)]
async fn test_user_journey() {
    let env = TestEnv::with_synthesis(FakeSynthesis::new().with_pending_polls(2)).await;
    let server = create_test_app(&env);

    deliver(
        &server,
        json!({
            "type": "user.created",
            "data": {
                "id": "user_grace",
                "email_addresses": [{"email_address": "grace@example.com"}],
                "first_name": "Grace",
                "last_name": "Hopper",
                "image_url": ""
            }
        }),
    )
    .await;
    let token = mint_token("user_grace");

    server
        .get("/api/user/credits")
        .authorization_bearer(&token)
        .await
        .assert_json(&json!({"credits": 20}));

    // Image: 20 -> 15
    let created: Value = server
        .post("/api/project/create")
        .authorization_bearer(&token)
        .multipart(project_form("Aurora Lamp"))
        .await
        .json();
    let project_id = created["projectId"].as_str().unwrap().to_string();

    let project: Value = server
        .get(&format!("/api/user/projects/{project_id}"))
        .authorization_bearer(&token)
        .await
        .json();
    let project = &project["project"];
    assert_eq!(project["name"], "Aurora Lamp launch");
    assert_eq!(project["aspectRatio"], "9:16");
    assert_eq!(project["isGenerating"], false);
    assert_eq!(project["uploadedImages"].as_array().unwrap().len(), 2);

    // Uploaded and generated media are served back from /media
    let source = project["uploadedImages"][0].as_str().unwrap();
    assert!(source.ends_with(".jpg"), "{source}");
    server.get(media_path(source)).await.assert_text("product-bytes");
    let image = project["generatedImage"].as_str().unwrap();
    server.get(media_path(image)).await.assert_text("fake-png");

    // Video: 15 -> 5
    let response = server
        .post("/api/project/video")
        .authorization_bearer(&token)
        .json(&json!({"projectId": project_id}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["message"], "Video generation completed");
    let video = body["videoUrl"].as_str().unwrap();
    server.get(media_path(video)).await.assert_text("fake-mp4");
    assert_eq!(env.synthesis.poll_count(), 3);

    server
        .get("/api/user/credits")
        .authorization_bearer(&token)
        .await
        .assert_json(&json!({"credits": 5}));

    // One more image spends the rest: 5 -> 0
    server
        .post("/api/project/create")
        .authorization_bearer(&token)
        .multipart(project_form("Second Lamp"))
        .await
        .assert_status_ok();

    let response = server
        .post("/api/project/create")
        .authorization_bearer(&token)
        .multipart(project_form("Third Lamp"))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    response.assert_json(&json!({"message": "Insufficient credits"}));

    // A pro plan payment tops the balance up
    deliver(
        &server,
        json!({
            "type": "paymentAttempt.updated",
            "data": {
                "charge_type": "checkout",
                "status": "paid",
                "payer": {"user_id": "user_grace"},
                "subscription_items": [{"plan": {"slug": "pro"}}]
            }
        }),
    )
    .await;
    server
        .get("/api/user/credits")
        .authorization_bearer(&token)
        .await
        .assert_json(&json!({"credits": 80}));

    // Publishing puts the project in the community feed
    let feed: Value = server.get("/api/project/published").await.json();
    assert!(feed["projects"].as_array().unwrap().is_empty());

    server
        .get(&format!("/api/user/publish/{project_id}"))
        .authorization_bearer(&token)
        .await
        .assert_json(&json!({"published": true}));

    let feed: Value = server.get("/api/project/published").await.json();
    let feed = feed["projects"].as_array().unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0]["id"], project_id);
    assert_eq!(feed[0]["generatedVideo"], video);

    // Deleting removes the row, the feed entry and the media
    server
        .delete(&format!("/api/project/{project_id}"))
        .authorization_bearer(&token)
        .await
        .assert_json(&json!({"message": "Project deleted successfully"}));

    let feed: Value = server.get("/api/project/published").await.json();
    assert!(feed["projects"].as_array().unwrap().is_empty());
    server
        .get(&format!("/api/user/projects/{project_id}"))
        .authorization_bearer(&token)
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server.get(media_path(image)).await.assert_status(StatusCode::NOT_FOUND);
}
