//! Credit-metered generation pipelines.
//!
//! Both pipelines follow the same shape: validate, reserve credits, do the external work, and
//! either commit the reservation or record the failure on the project and refund. The external
//! work runs on a task owned by the service's [`TaskTracker`], so a client that disconnects
//! mid-request does not abandon a reservation or leave a project flagged as generating, and
//! shutdown can wait for in-flight pipelines to settle.

pub mod credits;
pub mod poller;

use crate::{
    config::{CreditsConfig, GenerationConfig},
    db::{
        errors::DbError,
        models::projects::{ProjectCreateDBRequest, ProjectDBResponse, ProjectUpdateDBRequest},
        store::Datastore,
    },
    errors::{Error, Result},
    storage::{ObjectStore, StorageError, extension_for},
    synthesis::{
        ImageRequest, InlineImage, SynthesisClient, SynthesisError, VideoRequest, composite_prompt, showcase_prompt,
    },
    types::{AspectRatio, ProjectId, UserId, abbrev_uuid},
};
use bon::Builder;
use bytes::Bytes;
use credits::CreditReservation;
use poller::{PollError, poll_operation};
use std::{future::Future, sync::Arc};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

/// Number of source photos a project is built from: the product and the model
pub const SOURCE_IMAGE_COUNT: usize = 2;

pub const DEFAULT_PROJECT_NAME: &str = "New Project";
pub const DEFAULT_TARGET_LENGTH: i32 = 5;

/// Input for a new project, as collected from the upload form
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub product_name: String,
    pub product_description: String,
    pub user_prompt: String,
    pub aspect_ratio: AspectRatio,
    pub target_length: i32,
    /// Product first, then model
    pub images: Vec<InlineImage>,
}

impl NewProject {
    pub fn validate(&self) -> Result<()> {
        if self.images.len() != SOURCE_IMAGE_COUNT || self.product_name.trim().is_empty() {
            return Err(Error::BadRequest {
                message: "Upload at least 2 images & product name".to_string(),
            });
        }
        if self.images.iter().any(|image| image.data.is_empty()) {
            return Err(Error::BadRequest {
                message: "Uploaded images must not be empty".to_string(),
            });
        }
        if self.target_length <= 0 {
            return Err(Error::BadRequest {
                message: "targetLength must be a positive number of seconds".to_string(),
            });
        }
        Ok(())
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        Error::Other(anyhow::Error::new(err).context("object storage"))
    }
}

impl From<SynthesisError> for Error {
    fn from(err: SynthesisError) -> Self {
        Error::Upstream { message: err.to_string() }
    }
}

impl From<PollError> for Error {
    fn from(err: PollError) -> Self {
        Error::Upstream { message: err.to_string() }
    }
}

#[derive(Clone, Builder)]
pub struct GenerationService {
    store: Arc<dyn Datastore>,
    objects: Arc<dyn ObjectStore>,
    synthesis: Arc<dyn SynthesisClient>,
    credits: CreditsConfig,
    timing: GenerationConfig,
    /// Cancels in-flight video polling on shutdown
    #[builder(default)]
    shutdown: CancellationToken,
    #[builder(default)]
    tasks: TaskTracker,
}

impl GenerationService {
    /// Stop accepting pipeline work, cancel polling loops, and wait for every pipeline task
    /// to settle its credits
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        info!("Waiting for {} in-flight generation(s) to settle", self.tasks.len());
        self.tasks.wait().await;
    }

    /// Run `pipeline` on a tracked task and wait for its outcome
    async fn run_tracked<F>(&self, pipeline: F) -> Result<ProjectDBResponse>
    where
        F: Future<Output = Result<ProjectDBResponse>> + Send + 'static,
    {
        if self.tasks.is_closed() {
            return Err(Error::Upstream {
                message: "Server is shutting down".to_string(),
            });
        }
        self.tasks.spawn(pipeline.in_current_span()).await.map_err(|e| Error::Internal {
            operation: format!("run generation task: {e}"),
        })?
    }

    /// Composite the two uploaded photos into a new project's image.
    ///
    /// Charges `credits.image_cost`. Validation and balance failures return before anything is
    /// written; failures after the debit refund it and, once the project row exists, record
    /// the error on it.
    pub async fn create_project(&self, user_id: &UserId, input: NewProject) -> Result<ProjectDBResponse> {
        input.validate()?;

        let reservation = CreditReservation::acquire(self.store.clone(), user_id, self.credits.image_cost).await?;
        let project_id = Uuid::new_v4();
        let span = info_span!("image_pipeline", project_id = %abbrev_uuid(&project_id), user_id = %user_id);

        let service = self.clone();
        let user_id = user_id.clone();
        self.run_tracked(
            async move { service.image_pipeline(reservation, project_id, user_id, input).await }.instrument(span),
        )
        .await
    }

    async fn image_pipeline(
        &self,
        reservation: CreditReservation,
        project_id: ProjectId,
        user_id: UserId,
        input: NewProject,
    ) -> Result<ProjectDBResponse> {
        let project = match self.persist_sources(project_id, &user_id, &input).await {
            Ok(project) => project,
            Err(e) => {
                reservation.refund().await;
                return Err(e);
            }
        };

        match self.composite(&project, input.images).await {
            Ok(project) => {
                reservation.commit();
                info!("Generated project image");
                Ok(project)
            }
            Err(e) => {
                self.record_failure(project_id, &e).await;
                reservation.refund().await;
                Err(e)
            }
        }
    }

    /// Upload the source photos and create the project row flagged as generating
    async fn persist_sources(&self, project_id: ProjectId, user_id: &UserId, input: &NewProject) -> Result<ProjectDBResponse> {
        let uploads = input.images.iter().enumerate().map(|(index, image)| {
            let key = format!("projects/{project_id}/source-{index}.{}", extension_for(&image.mime_type));
            let objects = self.objects.clone();
            let image = image.clone();
            async move { objects.put(&key, image.data, &image.mime_type).await }
        });
        let uploaded_images = futures::future::try_join_all(uploads).await?;

        let project = self
            .store
            .create_project(&ProjectCreateDBRequest {
                id: project_id,
                user_id: user_id.clone(),
                name: input.name.clone(),
                product_name: input.product_name.clone(),
                product_description: input.product_description.clone(),
                user_prompt: input.user_prompt.clone(),
                aspect_ratio: input.aspect_ratio,
                target_length: input.target_length,
                uploaded_images,
                is_generating: true,
            })
            .await?;
        Ok(project)
    }

    async fn composite(&self, project: &ProjectDBResponse, images: Vec<InlineImage>) -> Result<ProjectDBResponse> {
        let generated = self
            .synthesis
            .generate_image(ImageRequest {
                images,
                prompt: composite_prompt(&project.user_prompt),
                aspect_ratio: project.aspect_ratio,
            })
            .await?;

        let key = format!("projects/{}/image.{}", project.id, extension_for(&generated.mime_type));
        let url = self.objects.put(&key, generated.data, &generated.mime_type).await?;

        self.save_output(
            project.id,
            &url,
            ProjectUpdateDBRequest {
                generated_image: Some(url.clone()),
                is_generating: Some(false),
                error: Some(None),
                ..Default::default()
            },
        )
        .await
    }

    /// Attach a stored output to its project. When the project row is gone the output is an
    /// orphan, so it is removed again and the generation fails.
    async fn save_output(&self, project_id: ProjectId, url: &str, update: ProjectUpdateDBRequest) -> Result<ProjectDBResponse> {
        match self.store.update_project(project_id, &update).await {
            Ok(project) => Ok(project),
            Err(DbError::NotFound) => {
                if let Err(e) = self.objects.delete(url).await {
                    warn!(%url, "Failed to delete output of a deleted project: {e}");
                }
                Err(Error::Upstream {
                    message: "Project was deleted during generation".to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Animate a project's image into a short video.
    ///
    /// Charges `credits.video_cost`. The project must belong to the caller, be idle, have an
    /// image and have no video yet. Any failure after the debit refunds it, records the error,
    /// and clears the generating flag so the project can be retried.
    pub async fn generate_video(&self, user_id: &UserId, project_id: ProjectId) -> Result<ProjectDBResponse> {
        let project = self
            .store
            .get_project(project_id)
            .await?
            .filter(|project| project.user_id == *user_id)
            .ok_or_else(|| Error::project_not_found(project_id))?;

        // Project state is reported ahead of the balance
        check_video_preconditions(&project)?;

        let reservation = CreditReservation::acquire(self.store.clone(), user_id, self.credits.video_cost).await?;

        // A concurrent request may have claimed it since the read above
        let project = match self.store.claim_for_video(project_id, user_id).await {
            Ok(Some(project)) => project,
            Ok(None) => {
                reservation.refund().await;
                return Err(Error::BadRequest {
                    message: "Generation in progress".to_string(),
                });
            }
            Err(e) => {
                reservation.refund().await;
                return Err(e.into());
            }
        };

        let span = info_span!("video_pipeline", project_id = %abbrev_uuid(&project_id), user_id = %user_id);
        let service = self.clone();
        self.run_tracked(async move { service.video_pipeline(reservation, project).await }.instrument(span))
            .await
    }

    async fn video_pipeline(&self, reservation: CreditReservation, project: ProjectDBResponse) -> Result<ProjectDBResponse> {
        match self.animate(&project).await {
            Ok(project) => {
                reservation.commit();
                info!("Generated project video");
                Ok(project)
            }
            Err(e) => {
                self.record_failure(project.id, &e).await;
                reservation.refund().await;
                Err(e)
            }
        }
    }

    async fn animate(&self, project: &ProjectDBResponse) -> Result<ProjectDBResponse> {
        let image_url = project.generated_image.as_deref().ok_or_else(|| Error::BadRequest {
            message: "Generated image missing".to_string(),
        })?;
        let image = InlineImage {
            data: self.objects.get(image_url).await?,
            mime_type: mime_guess::from_path(image_url).first_raw().unwrap_or("image/png").to_string(),
        };

        let handle = self
            .synthesis
            .start_video(VideoRequest {
                prompt: showcase_prompt(&project.product_name),
                image,
                aspect_ratio: project.aspect_ratio,
            })
            .await?;
        info!(operation = %handle, "Submitted video operation");

        let video = poll_operation(
            self.synthesis.as_ref(),
            &handle,
            self.timing.poll_interval,
            self.timing.video_timeout,
            &self.shutdown,
        )
        .await?;

        let data: Bytes = self.synthesis.download_video(&video).await?;
        let url = self
            .objects
            .put(&format!("projects/{}/video.mp4", project.id), data, "video/mp4")
            .await?;

        self.save_output(
            project.id,
            &url,
            ProjectUpdateDBRequest {
                generated_video: Some(url.clone()),
                is_generating: Some(false),
                error: Some(None),
                ..Default::default()
            },
        )
        .await
    }

    /// Store the user-facing failure message and release the generating flag
    async fn record_failure(&self, project_id: ProjectId, err: &Error) {
        warn!("Generation failed: {err:#}");
        let update = ProjectUpdateDBRequest::failed(err.user_message());
        match self.store.update_project(project_id, &update).await {
            Ok(_) => {}
            Err(DbError::NotFound) => {
                info!(project_id = %abbrev_uuid(&project_id), "Project deleted; no failure to record");
            }
            Err(e) => {
                error!(project_id = %abbrev_uuid(&project_id), "Failed to record generation failure: {e:#}");
            }
        }
    }
}

/// Reject video generation for projects that are busy, finished, or have nothing to animate
pub fn check_video_preconditions(project: &ProjectDBResponse) -> Result<()> {
    let message = if project.is_generating {
        "Generation in progress"
    } else if project.generated_video.is_some() {
        "Video already generated"
    } else if project.generated_image.is_none() {
        "Generated image missing"
    } else {
        return Ok(());
    };
    Err(Error::BadRequest {
        message: message.to_string(),
    })
}
