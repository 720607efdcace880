use crate::client::{ClassifierApi, ClientError};
use crate::image_utils::{self, ImageUtilsError};
use crate::models::{ModelSelector, PreviewRepresentation, SelectedImage, UploadProgress};
use tokio::sync::{mpsc, watch};

pub const INVALID_FILE_MESSAGE: &str = "Please select an image file (JPEG, PNG, etc.)";
pub const NO_FILE_MESSAGE: &str = "Please select an image to classify";
pub const PREVIEW_FAILED_MESSAGE: &str = "Failed to create image preview";

#[derive(Debug, Clone, PartialEq)]
pub enum PreviewState {
    Pending,
    Ready(PreviewRepresentation),
    Failed(String),
}

/// The file currently chosen by the user, with its preview.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub image: SelectedImage,
    pub preview: PreviewState,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadState {
    Idle,
    Selecting {
        error: Option<String>,
    },
    Validated(Selection),
    Submitting {
        selection: Selection,
        model: ModelSelector,
        progress: UploadProgress,
    },
    Succeeded {
        identifier: String,
        model: ModelSelector,
    },
    Failed {
        selection: Selection,
        model: ModelSelector,
        message: String,
    },
}

impl UploadState {
    pub fn selection(&self) -> Option<&Selection> {
        match self {
            UploadState::Validated(selection)
            | UploadState::Submitting { selection, .. }
            | UploadState::Failed { selection, .. } => Some(selection),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            UploadState::Selecting { error } => error.as_deref(),
            UploadState::Failed { message, .. } => Some(message),
            UploadState::Validated(Selection {
                preview: PreviewState::Failed(message),
                ..
            }) => Some(message),
            _ => None,
        }
    }

    pub fn can_submit(&self) -> bool {
        matches!(
            self,
            UploadState::Validated(_) | UploadState::Failed { .. }
        )
    }
}

/// Handle for a preview that is being generated for one particular selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewTicket {
    generation: u64,
}

/// Outcome of a submission, consumed by the navigation shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Hand off to the results page for `identifier`.
    Navigate {
        identifier: String,
        model: ModelSelector,
    },
    Stay,
}

pub struct UploadWorkflow {
    state: UploadState,
    generation: u64,
    progress: watch::Sender<UploadProgress>,
    error_kind: Option<&'static str>,
}

impl Default for UploadWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadWorkflow {
    pub fn new() -> Self {
        let (progress, _) = watch::channel(UploadProgress::ZERO);
        Self {
            state: UploadState::Idle,
            generation: 0,
            progress,
            error_kind: None,
        }
    }

    /// A workflow whose input never reached validation, e.g. an oversized request body.
    pub fn rejected(message: impl Into<String>) -> Self {
        let mut workflow = Self::new();
        workflow.state = UploadState::Selecting {
            error: Some(message.into()),
        };
        workflow
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    /// Kind of the service error behind the last failed submission.
    pub fn error_kind(&self) -> Option<&'static str> {
        self.error_kind
    }

    /// Latest upload progress of the current submission.
    pub fn subscribe_progress(&self) -> watch::Receiver<UploadProgress> {
        self.progress.subscribe()
    }

    /// Validates `image` and makes it the current selection. Returns a ticket
    /// for the preview that should now be generated, or `None` when the file
    /// was rejected.
    pub fn select(&mut self, image: SelectedImage) -> Option<PreviewTicket> {
        if !image_utils::is_valid_image(&image) {
            tracing::info!(
                "Rejected selection {} with media type {}",
                image.name,
                image.media_type
            );
            self.generation += 1;
            self.state = UploadState::Selecting {
                error: Some(INVALID_FILE_MESSAGE.to_string()),
            };
            return None;
        }

        self.generation += 1;
        self.state = UploadState::Validated(Selection {
            image,
            preview: PreviewState::Pending,
            generation: self.generation,
        });
        Some(PreviewTicket {
            generation: self.generation,
        })
    }

    /// Stores a finished preview. Results for a selection that has since been
    /// replaced are discarded and `false` is returned.
    pub fn apply_preview(
        &mut self,
        ticket: PreviewTicket,
        result: Result<PreviewRepresentation, ImageUtilsError>,
    ) -> bool {
        let selection = match &mut self.state {
            UploadState::Validated(selection)
            | UploadState::Submitting { selection, .. }
            | UploadState::Failed { selection, .. } => selection,
            _ => return false,
        };
        if selection.generation != ticket.generation {
            tracing::debug!("Discarding stale preview");
            return false;
        }

        selection.preview = match result {
            Ok(preview) => PreviewState::Ready(preview),
            Err(e) => {
                tracing::warn!("Error creating preview: {}", e);
                PreviewState::Failed(PREVIEW_FAILED_MESSAGE.to_string())
            }
        };
        true
    }

    pub async fn select_and_preview(&mut self, image: SelectedImage) -> &UploadState {
        if let Some(ticket) = self.select(image.clone()) {
            let preview = image_utils::create_image_preview(&image).await;
            self.apply_preview(ticket, preview);
        }
        &self.state
    }

    /// Submits the current selection and drives the workflow to `Succeeded`
    /// or `Failed`. Submitting without a valid selection only sets an error.
    pub async fn submit<C>(&mut self, client: &C, model: ModelSelector) -> UploadOutcome
    where
        C: ClassifierApi + ?Sized,
    {
        let selection = match &self.state {
            UploadState::Validated(selection) | UploadState::Failed { selection, .. } => {
                selection.clone()
            }
            _ => {
                self.state = UploadState::Selecting {
                    error: Some(NO_FILE_MESSAGE.to_string()),
                };
                return UploadOutcome::Stay;
            }
        };

        self.error_kind = None;
        self.progress.send_replace(UploadProgress::ZERO);
        self.state = UploadState::Submitting {
            selection: selection.clone(),
            model,
            progress: UploadProgress::ZERO,
        };

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let outcome = {
            let request = client.submit(&selection.image, model, Some(progress_tx));
            tokio::pin!(request);
            loop {
                tokio::select! {
                    biased;
                    Some(progress) = progress_rx.recv() => self.record_progress(progress),
                    outcome = &mut request => break outcome,
                }
            }
        };
        while let Ok(progress) = progress_rx.try_recv() {
            self.record_progress(progress);
        }

        self.finish(selection, model, outcome)
    }

    fn record_progress(&mut self, update: UploadProgress) {
        if let UploadState::Submitting { progress, .. } = &mut self.state {
            if update > *progress {
                *progress = update;
                self.progress.send_replace(update);
            }
        }
    }

    fn finish(
        &mut self,
        selection: Selection,
        model: ModelSelector,
        outcome: Result<crate::client::Submission, ClientError>,
    ) -> UploadOutcome {
        // Keep a preview that arrived while the upload was in flight.
        let selection = match &self.state {
            UploadState::Submitting { selection, .. } => selection.clone(),
            _ => selection,
        };

        match outcome {
            Ok(submission) => {
                self.record_progress(UploadProgress::COMPLETE);
                tracing::info!(
                    "Classification request accepted as {}",
                    submission.identifier
                );
                self.state = UploadState::Succeeded {
                    identifier: submission.identifier.clone(),
                    model,
                };
                UploadOutcome::Navigate {
                    identifier: submission.identifier,
                    model,
                }
            }
            Err(e) => {
                tracing::error!("Error uploading image: {}", e);
                self.error_kind = Some(e.kind());
                self.state = UploadState::Failed {
                    selection,
                    model,
                    message: e.user_message(),
                };
                UploadOutcome::Stay
            }
        }
    }
}
