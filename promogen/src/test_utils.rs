//! Test utilities: fakes, fixtures and an in-memory application.

use crate::{
    AppState, Application,
    config::{AuthConfig, Config, GenerationConfig, JwtKey, StorageConfig, WebhooksConfig},
    db::{
        InMemoryDatastore,
        models::{projects::ProjectDBResponse, projects::ProjectFilter, users::UserCreateDBRequest},
        store::Datastore,
    },
    generation::GenerationService,
    storage::{LocalObjectStore, ObjectStore},
    synthesis::{
        self, GeneratedImage, ImageRequest, InlineImage, OperationHandle, OperationStatus, SynthesisClient, SynthesisError,
        VideoRef, VideoRequest,
    },
    types::UserId,
    webhooks::signing::sign_payload,
};
use async_trait::async_trait;
use axum_test::TestServer;
use bytes::Bytes;
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use std::{
    sync::{
        Arc, Once,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};
use tempfile::TempDir;
use url::Url;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test-secret-key-for-jwt";
pub const TEST_WEBHOOK_SECRET: &str = "whsec_c2VjcmV0LXNlY3JldC1zZWNyZXQ=";

/// reqwest is built without a default TLS provider; tests that build clients need one installed
pub fn install_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

pub fn png_image(data: &'static [u8]) -> InlineImage {
    InlineImage {
        data: Bytes::from_static(data),
        mime_type: "image/png".to_string(),
    }
}

/// Scripted synthesis provider.
///
/// Images come back as `fake-png`; videos finish after the configured number of pending polls
/// with inline `fake-mp4` bytes.
#[derive(Debug, Default)]
pub struct FakeSynthesis {
    pending_polls: u32,
    fail_image: bool,
    fail_video: bool,
    image_calls: AtomicU32,
    video_starts: AtomicU32,
    polls: AtomicU32,
}

impl FakeSynthesis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the operation as running for the first `n` polls
    pub fn with_pending_polls(mut self, n: u32) -> Self {
        self.pending_polls = n;
        self
    }

    pub fn with_image_failure(mut self) -> Self {
        self.fail_image = true;
        self
    }

    /// Fail the first poll of every video operation
    pub fn with_video_failure(mut self) -> Self {
        self.fail_video = true;
        self
    }

    pub fn image_calls(&self) -> u32 {
        self.image_calls.load(Ordering::SeqCst)
    }

    pub fn video_starts(&self) -> u32 {
        self.video_starts.load(Ordering::SeqCst)
    }

    pub fn poll_count(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SynthesisClient for FakeSynthesis {
    async fn generate_image(&self, request: ImageRequest) -> synthesis::Result<GeneratedImage> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(request.images.len(), 2, "composite needs the product and the model");
        if self.fail_image {
            return Err(SynthesisError::NoImage);
        }
        Ok(GeneratedImage {
            data: Bytes::from_static(b"fake-png"),
            mime_type: "image/png".to_string(),
        })
    }

    async fn start_video(&self, _request: VideoRequest) -> synthesis::Result<OperationHandle> {
        let n = self.video_starts.fetch_add(1, Ordering::SeqCst);
        Ok(OperationHandle(format!("models/fake/operations/{n}")))
    }

    async fn poll_video(&self, _handle: &OperationHandle) -> synthesis::Result<OperationStatus> {
        let polls = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_video {
            return Err(SynthesisError::NoVideo);
        }
        if polls <= self.pending_polls {
            return Ok(OperationStatus::Pending);
        }
        Ok(OperationStatus::Done(VideoRef::Inline(Bytes::from_static(b"fake-mp4"))))
    }

    async fn download_video(&self, video: &VideoRef) -> synthesis::Result<Bytes> {
        match video {
            VideoRef::Inline(data) => Ok(data.clone()),
            VideoRef::Uri(_) => Err(SynthesisError::UnexpectedResponse),
        }
    }
}

/// Session token for `user_id`, signed with [`TEST_JWT_SECRET`]
pub fn mint_token(user_id: &str) -> String {
    let claims = crate::auth::token::SessionClaims {
        sub: user_id.to_string(),
        exp: Utc::now().timestamp() + 3600,
        nbf: None,
        iss: None,
        azp: None,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes())).expect("sign test token")
}

/// Svix-style headers signing `body` with [`TEST_WEBHOOK_SECRET`]
pub fn webhook_headers(body: &str) -> [(&'static str, String); 3] {
    let msg_id = format!("msg_{}", Uuid::new_v4().simple());
    let timestamp = Utc::now().timestamp();
    let signature = sign_payload(&msg_id, timestamp, body, TEST_WEBHOOK_SECRET).expect("sign test webhook");
    [
        ("svix-id", msg_id),
        ("svix-timestamp", timestamp.to_string()),
        ("svix-signature", signature),
    ]
}

pub fn create_test_config(media_dir: &std::path::Path) -> Config {
    Config {
        auth: AuthConfig {
            jwt: Some(JwtKey::Hs256 {
                secret: TEST_JWT_SECRET.to_string(),
            }),
            ..Default::default()
        },
        webhooks: WebhooksConfig {
            signing_secret: Some(TEST_WEBHOOK_SECRET.to_string()),
            ..Default::default()
        },
        storage: StorageConfig::Local {
            path: media_dir.to_path_buf(),
            public_url: Url::parse("http://localhost:5000/media").expect("valid test URL"),
        },
        generation: GenerationConfig {
            poll_interval: Duration::from_millis(10),
            video_timeout: Duration::from_secs(5),
        },
        ..Default::default()
    }
}

/// In-memory store, media in a temporary directory, and a scripted synthesis provider
pub struct TestEnv {
    pub config: Config,
    pub store: Arc<dyn Datastore>,
    pub objects: Arc<dyn ObjectStore>,
    pub synthesis: Arc<FakeSynthesis>,
    pub generation: GenerationService,
    _media: TempDir,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self::with_synthesis(FakeSynthesis::new()).await
    }

    pub async fn with_synthesis(synthesis: FakeSynthesis) -> Self {
        let media = TempDir::new().expect("create media dir");
        let config = create_test_config(media.path());
        let StorageConfig::Local { path, public_url } = &config.storage else {
            unreachable!("test config uses local storage")
        };

        let store: Arc<dyn Datastore> = Arc::new(InMemoryDatastore::new());
        let objects: Arc<dyn ObjectStore> = Arc::new(
            LocalObjectStore::new(path.clone(), public_url.clone())
                .await
                .expect("create local store"),
        );
        let synthesis = Arc::new(synthesis);
        let generation = GenerationService::builder()
            .store(store.clone())
            .objects(objects.clone())
            .synthesis(synthesis.clone() as Arc<dyn SynthesisClient>)
            .credits(config.credits.clone())
            .timing(config.generation.clone())
            .build();

        Self {
            config,
            store,
            objects,
            synthesis,
            generation,
            _media: media,
        }
    }

    pub fn state(&self) -> AppState {
        AppState::builder()
            .store(self.store.clone())
            .objects(self.objects.clone())
            .generation(self.generation.clone())
            .config(self.config.clone())
            .build()
    }

    /// Register a fresh user holding `credits`
    pub async fn user_with_credits(&self, credits: i64) -> UserId {
        let id = format!("user_{}", Uuid::new_v4().simple());
        self.store
            .create_user(&UserCreateDBRequest {
                id: id.clone(),
                email: format!("{id}@example.com"),
                name: "Test User".to_string(),
                image: String::new(),
                credits,
            })
            .await
            .expect("create test user");
        id
    }

    pub async fn balance(&self, user_id: &UserId) -> i64 {
        self.store
            .get_user(user_id)
            .await
            .expect("read test user")
            .expect("test user exists")
            .credits
    }

    pub async fn projects_of(&self, user_id: &UserId) -> Vec<ProjectDBResponse> {
        self.store
            .list_projects(&ProjectFilter::owned_by(user_id.clone()))
            .await
            .expect("list test projects")
    }
}

pub fn create_test_app(env: &TestEnv) -> TestServer {
    Application::from_state(env.state(), None)
        .expect("build test application")
        .into_test_server()
}
