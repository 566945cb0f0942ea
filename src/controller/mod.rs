//! Conversation controller: the session state machine behind the UI.
//!
//! The controller owns the in-memory transcript, the draft and pending
//! attachments, routes a submit through a [`crate::llm::Completer`] and
//! snapshots every completed turn into the local history log.

pub mod attachments;
pub mod notice;
pub mod reveal;
pub mod session;
pub mod transcript;

pub use attachments::{AttachmentSource, BlobUrlRegistry, PendingAttachment, PreviewUrls};
pub use notice::{Notice, NoticeKind};
pub use reveal::WordReveal;
pub use session::{ConversationController, PendingTurn, SessionPhase};
pub use transcript::Transcript;
