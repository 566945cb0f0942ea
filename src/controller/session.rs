//! Conversation session state machine.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::CoCreateResult;
use crate::history::{Conversation, HistoryLog, LocalHistoryStore, Message, Role};
use crate::ids::{ConversationId, MessageId};
use crate::llm::{Completer, ImageInput, PromptRefiner, RefineCredentials};
use crate::modes::{Mode, ModePreferences};

use super::attachments::{AttachmentSource, PendingAttachment, PreviewUrls};
use super::notice::{Notice, NoticeKind};
use super::reveal::WordReveal;
use super::transcript::{self, Transcript};

/// Where the session is in its turn cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    /// Nothing typed or attached.
    Idle,
    /// Draft text or attachments present.
    Composing,
    /// Waiting for the assistant.
    Awaiting,
}

/// A submitted turn waiting for its completion.
#[derive(Debug)]
pub struct PendingTurn {
    generation: u64,
    placeholder: MessageId,
    /// Persona instruction sent with the turn.
    pub system_prompt: &'static str,
    /// Submitted text.
    pub user_text: String,
    /// Submitted images.
    pub images: Vec<ImageInput>,
    /// Sampling preferences of the mode.
    pub preferences: ModePreferences,
}

/// Drives one conversation: input, submission, persistence and resets.
pub struct ConversationController {
    mode: Mode,
    messages: Vec<Message>,
    draft: String,
    attachments: Vec<PendingAttachment>,
    /// Preview URLs referenced by sent messages of this session.
    sent_previews: Vec<String>,
    phase: SessionPhase,
    generation: u64,
    history: LocalHistoryStore,
    completer: Arc<dyn Completer>,
    previews: Arc<dyn PreviewUrls>,
}

impl ConversationController {
    /// Create an idle controller in story mode.
    #[must_use]
    pub fn new(
        history: LocalHistoryStore,
        completer: Arc<dyn Completer>,
        previews: Arc<dyn PreviewUrls>,
    ) -> Self {
        Self {
            mode: Mode::default(),
            messages: Vec::new(),
            draft: String::new(),
            attachments: Vec::new(),
            sent_previews: Vec::new(),
            phase: SessionPhase::Idle,
            generation: 0,
            history,
            completer,
            previews,
        }
    }

    /// Start in `mode` instead of story.
    #[must_use]
    pub const fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Current persona.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// In-memory transcript.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Current draft text.
    #[must_use]
    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Attachments waiting to be sent.
    #[must_use]
    pub fn attachments(&self) -> &[PendingAttachment] {
        &self.attachments
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Whether submit is disabled.
    #[must_use]
    pub const fn is_awaiting(&self) -> bool {
        matches!(self.phase, SessionPhase::Awaiting)
    }

    /// Replace the draft text.
    ///
    /// # Errors
    /// Returns a busy notice while awaiting.
    pub fn set_draft(&mut self, text: impl Into<String>) -> Result<(), Notice> {
        self.ensure_not_awaiting()?;
        self.draft = text.into();
        self.refresh_phase();
        Ok(())
    }

    /// Add an image attachment and mint its preview URL.
    ///
    /// # Errors
    /// Returns a notice while awaiting or for non-image files.
    pub fn attach(&mut self, source: AttachmentSource) -> Result<&PendingAttachment, Notice> {
        self.ensure_not_awaiting()?;
        if !source.is_image() {
            return Err(Notice::new(
                NoticeKind::Unsupported,
                "Unsupported file",
                format!("{} is not an image", source.display_name),
            ));
        }

        let preview_url = self.previews.create(&source);
        self.attachments.push(PendingAttachment {
            source,
            preview_url,
        });
        self.refresh_phase();
        Ok(&self.attachments[self.attachments.len() - 1])
    }

    /// Remove a pending attachment and release its preview URL.
    pub fn remove_attachment(&mut self, index: usize) -> Option<AttachmentSource> {
        if self.is_awaiting() || index >= self.attachments.len() {
            return None;
        }
        let removed = self.attachments.remove(index);
        self.previews.revoke(&removed.preview_url);
        self.refresh_phase();
        Some(removed.source)
    }

    /// Switch persona. A different mode clears the session; history is untouched.
    pub fn switch_mode(&mut self, mode: Mode) {
        if mode == self.mode {
            return;
        }
        info!(from = %self.mode, to = %mode, "switching mode");
        self.reset_session();
        self.mode = mode;
    }

    /// Seed the session with a persisted conversation and adopt its mode.
    ///
    /// # Errors
    /// Returns a not-found notice if the conversation is gone.
    pub fn restore(&mut self, id: ConversationId) -> Result<(), Notice> {
        let conversation = self
            .history
            .get(id)
            .ok_or_else(|| Notice::not_found("This conversation"))?;

        self.reset_session();
        self.mode = conversation.mode;
        self.messages = conversation.messages;
        debug!(%id, messages = self.messages.len(), "restored conversation");
        Ok(())
    }

    /// First half of a submit: validate, append the user message and the
    /// placeholder, and enter [`SessionPhase::Awaiting`].
    ///
    /// # Errors
    /// Returns a busy notice while awaiting and an input-required notice when
    /// there is neither text nor an attachment. Neither mutates the transcript.
    pub fn begin_submit(&mut self) -> Result<PendingTurn, Notice> {
        self.ensure_not_awaiting()?;
        let text = self.draft.trim().to_string();
        if text.is_empty() && self.attachments.is_empty() {
            return Err(Notice::input_required());
        }

        let attachments = std::mem::take(&mut self.attachments);
        let images = attachments
            .iter()
            .filter_map(|a| a.source.to_image().ok())
            .collect();
        let refs = attachments.iter().map(PendingAttachment::to_ref).collect();
        self.sent_previews
            .extend(attachments.into_iter().map(|a| a.preview_url));

        self.messages.push(Message::user(text.clone(), refs));
        let placeholder = Message::placeholder();
        let placeholder_id = placeholder.id;
        self.messages.push(placeholder);
        self.draft.clear();
        self.phase = SessionPhase::Awaiting;

        Ok(PendingTurn {
            generation: self.generation,
            placeholder: placeholder_id,
            system_prompt: self.mode.system_prompt(),
            user_text: text,
            images,
            preferences: self.mode.preferences(),
        })
    }

    /// Second half of a submit.
    ///
    /// On success the placeholder receives the text and the session is
    /// snapshotted into history. On failure the placeholder is removed.
    /// Returns `Ok(None)` if the session was reset while the turn was in flight.
    ///
    /// # Errors
    /// Returns a notice classified from the gateway error.
    pub fn finish_submit(
        &mut self,
        turn: PendingTurn,
        result: CoCreateResult<String>,
    ) -> Result<Option<Message>, Notice> {
        if turn.generation != self.generation {
            debug!("discarding completion for a reset session");
            return Ok(None);
        }
        self.phase = SessionPhase::Idle;
        self.refresh_phase();

        let Some(index) = self.messages.iter().position(|m| m.id == turn.placeholder) else {
            return Ok(None);
        };

        match result {
            Ok(text) => {
                self.messages[index].content = text;
                let answered = self.messages[index].clone();
                if let Some(conversation) = Conversation::snapshot(self.mode, &self.messages) {
                    info!(id = %conversation.id, mode = %self.mode, "saving conversation to history");
                    self.history.append(conversation);
                }
                Ok(Some(answered))
            }
            Err(err) => {
                warn!("completion failed: {err}");
                self.messages.remove(index);
                Err(Notice::from_error(&err))
            }
        }
    }

    /// Submit the draft and wait for the assistant.
    ///
    /// # Errors
    /// See [`Self::begin_submit`] and [`Self::finish_submit`].
    pub async fn submit(&mut self) -> Result<Option<Message>, Notice> {
        let turn = self.begin_submit()?;
        let result = self.call_completer(&turn).await;
        self.finish_submit(turn, result)
    }

    /// Submit, then reveal the answer word by word with `delay` between steps.
    ///
    /// # Errors
    /// See [`Self::begin_submit`] and [`Self::finish_submit`].
    pub async fn submit_revealing<F>(
        &mut self,
        delay: Duration,
        mut on_partial: F,
    ) -> Result<Option<Message>, Notice>
    where
        F: FnMut(&str) + Send,
    {
        let turn = self.begin_submit()?;
        let result = self.call_completer(&turn).await;

        if let Ok(text) = &result {
            for partial in WordReveal::new(text) {
                if let Some(message) = self.messages.iter_mut().find(|m| m.id == turn.placeholder) {
                    message.content = partial.to_string();
                }
                on_partial(partial);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        self.finish_submit(turn, result)
    }

    /// Drop a user message and everything after it, and put its text back in
    /// the draft. Persisted history is not touched.
    ///
    /// # Errors
    /// Returns a notice while awaiting or if `id` is not a user message.
    pub fn edit_message(&mut self, id: MessageId) -> Result<(), Notice> {
        self.ensure_not_awaiting()?;
        let index = self
            .messages
            .iter()
            .position(|m| m.id == id && m.role == Role::User)
            .ok_or_else(|| Notice::not_found("This message"))?;

        let removed: Vec<Message> = self.messages.drain(index..).collect();
        let stale: Vec<String> = removed
            .iter()
            .flat_map(|m| m.attachments.iter().map(|a| a.url.clone()))
            .collect();
        self.release_sent(&stale);

        self.draft = removed
            .into_iter()
            .next()
            .map(|m| m.content)
            .unwrap_or_default();
        self.refresh_phase();
        Ok(())
    }

    /// Replace the draft with a refined prompt.
    ///
    /// # Errors
    /// Returns a notice while awaiting or when the draft is empty.
    pub async fn refine_draft(
        &mut self,
        refiner: &PromptRefiner,
        credentials: &RefineCredentials,
    ) -> Result<&str, Notice> {
        self.ensure_not_awaiting()?;
        if self.draft.trim().is_empty() {
            return Err(Notice::input_required());
        }
        self.draft = refiner.refine(&self.draft, credentials).await;
        self.refresh_phase();
        Ok(&self.draft)
    }

    /// Export the in-memory transcript.
    #[must_use]
    pub fn export_transcript(&self) -> Transcript {
        transcript::export(self.mode, &self.messages)
    }

    /// Persisted conversations, newest first.
    #[must_use]
    pub fn history(&self) -> HistoryLog {
        self.history.load()
    }

    /// Delete one persisted conversation.
    pub fn delete_history(&self, id: ConversationId) -> HistoryLog {
        self.history.remove(id)
    }

    /// Delete all persisted conversations.
    pub fn clear_history(&self) {
        self.history.clear();
    }

    async fn call_completer(&self, turn: &PendingTurn) -> CoCreateResult<String> {
        self.completer
            .complete(
                turn.system_prompt,
                &turn.user_text,
                &turn.images,
                turn.preferences,
            )
            .await
    }

    fn ensure_not_awaiting(&self) -> Result<(), Notice> {
        if self.is_awaiting() {
            Err(Notice::busy())
        } else {
            Ok(())
        }
    }

    fn refresh_phase(&mut self) {
        if self.phase == SessionPhase::Awaiting {
            return;
        }
        self.phase = if self.draft.trim().is_empty() && self.attachments.is_empty() {
            SessionPhase::Idle
        } else {
            SessionPhase::Composing
        };
    }

    fn release_sent(&mut self, urls: &[String]) {
        for url in urls {
            self.previews.revoke(url);
        }
        self.sent_previews.retain(|u| !urls.contains(u));
    }

    /// Clear messages, draft and attachments, release every preview URL and
    /// invalidate in-flight turns.
    fn reset_session(&mut self) {
        for attachment in self.attachments.drain(..) {
            self.previews.revoke(&attachment.preview_url);
        }
        for url in self.sent_previews.drain(..) {
            self.previews.revoke(&url);
        }
        self.messages.clear();
        self.draft.clear();
        self.phase = SessionPhase::Idle;
        self.generation += 1;
    }
}

impl Drop for ConversationController {
    fn drop(&mut self) {
        for attachment in &self.attachments {
            self.previews.revoke(&attachment.preview_url);
        }
        for url in &self.sent_previews {
            self.previews.revoke(url);
        }
    }
}
