mod outbound;
mod provider;
mod store;

pub use outbound::Outbound;
pub use provider::{extract_text, Candidate, GenerateResponse, ModelProvider, NO_CANDIDATES};
pub use store::{ChatExchange, FileAnalysis, SearchRecord, StateStore, UserRecord, UserStatus};
