use async_trait::async_trait;

/// Placeholder reply when the backend returns an empty candidate list.
pub const NO_CANDIDATES: &str = "No candidates returned.";

/// One complete alternative response from the backend; its text arrives as
/// one or more ordered segments.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub parts: Vec<String>,
}

/// Ranked candidates from a single generation request. Highest-ranked first.
#[derive(Debug, Clone, Default)]
pub struct GenerateResponse {
    pub candidates: Vec<Candidate>,
}

/// Generative backend — turns a prompt (and optionally one attachment) into
/// ranked candidate responses.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn generate(&self, model: &str, prompt: &str) -> anyhow::Result<GenerateResponse>;

    /// Multimodal variant: prompt plus one attachment (media kind + raw bytes).
    async fn generate_with_media(
        &self,
        model: &str,
        prompt: &str,
        mime_type: &str,
        data: &[u8],
    ) -> anyhow::Result<GenerateResponse>;
}

/// Concatenate every text segment of the first (highest-ranked) candidate,
/// in order. Lower-ranked candidates are ignored.
pub fn extract_text(response: &GenerateResponse) -> String {
    match response.candidates.first() {
        None => NO_CANDIDATES.to_string(),
        Some(candidate) => candidate.parts.concat(),
    }
}
