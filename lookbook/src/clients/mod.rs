//! HTTP clients for the third-party services behind a generation.
//!
//! - [`replicate`]: prediction create / poll / cancel with typed outcomes
//! - [`gemini`] and [`openai`]: text generation used for prompt enhancement
//! - [`storage`]: Supabase Storage uploads and downloads

use std::time::Duration;

use url::Url;

pub mod gemini;
pub mod openai;
pub mod replicate;
pub mod storage;

pub use gemini::{GeminiClient, GeminiError, InlineImage};
pub use openai::{OpenAiClient, OpenAiError};
pub use replicate::{FailureKind, PollPolicy, Prediction, PredictionOutcome, PredictionStatus, ReplicateClient, ReplicateError};
pub use storage::{StorageClient, StorageError};

/// Build a reqwest client with the process-wide rustls provider installed
pub fn build_http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    // Already installed by main; tests and library users may get here first
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    reqwest::Client::builder().timeout(timeout).build()
}

/// Makes sure a url has a trailing slash, so `join` appends instead of replacing the last segment
fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let mut path = new_url.path().to_string();
        path.push('/');
        new_url.set_path(&path);
        new_url
    }
}

/// Resolve `path` beneath `base`, keeping any path prefix on `base`
pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    ensure_slash(base).join(path.trim_start_matches('/'))
}
