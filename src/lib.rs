//! Poster Studio - turn a photo and a prompt into a generated poster.
//!
//! The crate serves a single-page front end over HTTP. Each browser tab gets a
//! [`Session`] that holds the selected image, the prompt, and the current
//! [`PosterState`]. Generation goes through a [`PosterGenerator`], normally the
//! Gemini-backed [`GeminiClient`], and finished posters can be handed to a
//! [`ShareTarget`].

pub mod config;
pub mod encoder;
mod error;
pub mod gemini;
pub mod server;
pub mod session;
pub mod share;

pub use config::Config;
pub use encoder::{EncodedImage, SelectedImage};
pub use error::{PosterError, Result};
pub use gemini::{Credential, GeminiClient, GeminiClientBuilder, PosterGenerator};
pub use server::{router, AppState};
pub use session::{Attempt, PosterState, Session};
pub use share::{share_poster, DirectoryShare, ShareError, ShareOutcome, SharePayload, ShareTarget};
