mod error;
mod google_genai;

pub use error::{ProviderError, ProviderErrorKind};
pub use google_genai::GeminiProvider;

use std::time::Duration;

use reqwest::Client;

/// Shared HTTP client construction: fixed timeout, no redirects surprises.
pub(crate) fn build_http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder().timeout(timeout).build()
}
