//! Per-tab poster session: the idle/loading/result/error state machine.

use crate::encoder::SelectedImage;
use crate::error::PosterError;
use crate::gemini::PosterGenerator;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const DEFAULT_PROMPT: &str = "Create a cinematic professional football (soccer) poster featuring the person in the foreground of the uploaded image. Keep their original face, hair, shape, and angle exactly as in the image. Show the person in three perspectives: a super close-up portrait wearing a club away jersey, a side profile view with their name on the back, and a full-body shot in a full football kit (jersey, shorts, socks, and cleats) with sponsor logos.

At the bottom, place a dynamic action scene of the player performing a powerful kick with motion blur and flying grass around. The jersey must clearly display the number \"01\" on the front, back, and shorts.

Use a bold dark blue stadium background with a large number and the player's name glowing behind the character. The overall style should be ultra-realistic, high-resolution, cinematic, and professional sports poster vibes.";

pub const MISSING_INPUT_MESSAGE: &str = "Please upload an image and provide a prompt.";
pub const NO_IMAGE_MESSAGE: &str = "The API did not return an image. Please try again.";
pub const FALLBACK_ERROR_MESSAGE: &str = "An unexpected error occurred.";

/// What the output panel shows. Exactly one holds at a time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PosterState {
    #[default]
    Idle,
    Loading,
    Result {
        /// Generated poster as a data URL.
        image: String,
    },
    Error {
        message: String,
    },
}

/// Identifies one generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// Everything a generation call needs, captured when it starts.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub ticket: Ticket,
    pub prompt: String,
    pub image: Arc<SelectedImage>,
}

/// Result of pressing "generate".
#[derive(Debug)]
pub enum Trigger {
    /// A request may be sent; the session is now loading.
    Started(GenerationJob),
    /// Image or prompt missing; the session now shows the validation error.
    Rejected,
    /// A request is already in flight; nothing changed.
    Busy,
}

/// How a full generation attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Committed,
    Rejected,
    Busy,
    /// The outcome arrived after a newer attempt or image selection and was dropped.
    Superseded,
}

#[derive(Debug, Clone)]
pub struct Session {
    prompt: String,
    image: Option<Arc<SelectedImage>>,
    preview: Option<String>,
    state: PosterState,
    generation: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            image: None,
            preview: None,
            state: PosterState::Idle,
            generation: 0,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn image(&self) -> Option<&SelectedImage> {
        self.image.as_deref()
    }

    pub fn preview(&self) -> Option<&str> {
        self.preview.as_deref()
    }

    pub fn state(&self) -> &PosterState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, PosterState::Loading)
    }

    /// The generated poster, if the session is showing one.
    pub fn result(&self) -> Option<&str> {
        match &self.state {
            PosterState::Result { image } => Some(image),
            _ => None,
        }
    }

    /// Replaces the image and returns to idle. Any in-flight attempt becomes stale.
    pub fn select_image(&mut self, image: SelectedImage) {
        self.preview = Some(image.preview_data_url());
        self.image = Some(Arc::new(image));
        self.state = PosterState::Idle;
        self.generation += 1;
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    pub fn trigger(&mut self) -> Trigger {
        if self.is_loading() {
            return Trigger::Busy;
        }

        let image = match &self.image {
            Some(image) if !self.prompt.trim().is_empty() => Arc::clone(image),
            _ => {
                self.state = PosterState::Error {
                    message: MISSING_INPUT_MESSAGE.to_string(),
                };
                return Trigger::Rejected;
            }
        };

        self.generation += 1;
        self.state = PosterState::Loading;

        Trigger::Started(GenerationJob {
            ticket: Ticket(self.generation),
            prompt: self.prompt.clone(),
            image,
        })
    }

    /// Commits an outcome if `ticket` is still the current attempt. Returns whether it was applied.
    pub fn complete(
        &mut self,
        ticket: Ticket,
        outcome: Result<Option<String>, PosterError>,
    ) -> bool {
        if ticket.0 != self.generation || !self.is_loading() {
            tracing::debug!(
                ticket = ticket.0,
                current = self.generation,
                "dropping stale generation result"
            );
            return false;
        }

        self.state = match outcome {
            Ok(Some(data)) => PosterState::Result {
                image: format!("data:image/png;base64,{data}"),
            },
            Ok(None) => PosterState::Error {
                message: NO_IMAGE_MESSAGE.to_string(),
            },
            Err(e) => {
                let message = e.to_string();
                PosterState::Error {
                    message: if message.is_empty() {
                        FALLBACK_ERROR_MESSAGE.to_string()
                    } else {
                        message
                    },
                }
            }
        };
        true
    }
}

/// Runs one generation attempt against a shared session.
///
/// The lock is held only to start and to commit, never across the service call.
/// If the returned future is dropped mid-call, the attempt is committed as failed
/// so the session does not stay loading.
pub async fn generate(session: &Arc<Mutex<Session>>, generator: &dyn PosterGenerator) -> Attempt {
    let job = match session.lock().await.trigger() {
        Trigger::Started(job) => job,
        Trigger::Rejected => return Attempt::Rejected,
        Trigger::Busy => return Attempt::Busy,
    };

    let mut pending = PendingAttempt {
        session: Arc::clone(session),
        ticket: Some(job.ticket),
    };

    let outcome = generator.generate(&job.prompt, &job.image).await;

    let committed = session.lock().await.complete(job.ticket, outcome);
    pending.ticket = None;

    if committed {
        Attempt::Committed
    } else {
        Attempt::Superseded
    }
}

/// Fails an attempt whose future was dropped before it could commit.
struct PendingAttempt {
    session: Arc<Mutex<Session>>,
    ticket: Option<Ticket>,
}

impl Drop for PendingAttempt {
    fn drop(&mut self) {
        let Some(ticket) = self.ticket.take() else {
            return;
        };
        tracing::warn!(ticket = ticket.0, "generation attempt abandoned");

        if let Ok(mut session) = self.session.try_lock() {
            session.complete(ticket, Err(PosterError::Generation));
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let session = Arc::clone(&self.session);
                handle.spawn(async move {
                    session
                        .lock()
                        .await
                        .complete(ticket, Err(PosterError::Generation));
                });
            }
            Err(_) => tracing::error!(ticket = ticket.0, "no runtime to release abandoned attempt"),
        }
    }
}
