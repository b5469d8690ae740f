/// The sender of an inbound event, as the transport identifies them.
#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub chat_id: i64,
    pub first_name: String,
    pub username: Option<String>,
}

/// A contact the user shared through the platform's contact-share action.
/// `user_id` is the platform identity embedded in the contact itself, which
/// may differ from the sender's identity when someone relays another
/// person's contact card.
#[derive(Debug, Clone)]
pub struct ContactShare {
    pub user_id: Option<i64>,
    pub phone_number: String,
    pub first_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Photo,
    Document,
}

/// Reference to an attachment still held by the transport. The bytes are
/// fetched on demand via `Outbound::fetch_file`.
#[derive(Debug, Clone)]
pub struct AttachmentRef {
    pub kind: AttachmentKind,
    pub file_id: String,
    pub filename: Option<String>,
    pub mime_type: Option<String>,
}

/// One inbound event from the chat transport. Closed union: every variant
/// is handled exhaustively, so adding a variant is a compile error at the
/// dispatch site rather than a silent "unsupported type" fallback.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// The entry command (`/start`) beginning registration.
    Entry,
    /// The search command with its raw argument string.
    Search { query: String },
    /// Any non-command free text.
    Text { text: String },
    /// A platform-mediated contact share.
    Contact(ContactShare),
    /// A photo or document upload.
    Attachment(AttachmentRef),
}

/// A file downloaded from the transport, fully in memory.
pub struct FetchedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}
