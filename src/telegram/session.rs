//! Per-chat conversation state.
//!
//! Instead of loose "waiting for" string flags, each chat carries at most one
//! explicit [`AwaitingInput`] value describing what the bot expects next.
//! State lives in memory only and is dropped on restart.

use dashmap::DashMap;

use crate::services::image_ops::TargetFormat;

/// Image operation selected from the tools menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageAction {
    Convert(TargetFormat),
    Compress,
    Resize { width: u32, height: u32 },
    Info,
}

/// What the bot is waiting for from a given chat.
#[derive(Debug, Clone)]
pub enum AwaitingInput {
    /// Next text message is an AI image prompt.
    AiImagePrompt,
    /// Next text message is rendered into a PDF.
    PdfText,
    /// Next text message is a referral code.
    ReferralCode,
    /// Next photo/document is processed with the chosen action.
    ImageUpload(ImageAction),
    /// Collecting PDF documents until the user confirms the merge.
    MergePdfs(Vec<Vec<u8>>),
}

/// In-memory session store keyed by chat id.
#[derive(Debug, Default)]
pub struct SessionStore {
    states: DashMap<i64, AwaitingInput>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the pending state for a chat.
    pub fn set(&self, chat_id: i64, state: AwaitingInput) {
        self.states.insert(chat_id, state);
    }

    /// Removes and returns the pending state, if any.
    pub fn take(&self, chat_id: i64) -> Option<AwaitingInput> {
        self.states.remove(&chat_id).map(|(_, state)| state)
    }

    /// Drops the pending state without returning it.
    pub fn clear(&self, chat_id: i64) {
        self.states.remove(&chat_id);
    }

    /// Appends a document to an in-progress merge, starting one if needed.
    /// Returns how many documents are collected so far.
    pub fn push_merge_document(&self, chat_id: i64, document: Vec<u8>) -> usize {
        let mut entry = self
            .states
            .entry(chat_id)
            .or_insert_with(|| AwaitingInput::MergePdfs(Vec::new()));

        match entry.value_mut() {
            AwaitingInput::MergePdfs(docs) => {
                docs.push(document);
                docs.len()
            }
            other => {
                *other = AwaitingInput::MergePdfs(vec![document]);
                1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_consumes_state() {
        let store = SessionStore::new();
        store.set(1, AwaitingInput::AiImagePrompt);
        assert!(matches!(store.take(1), Some(AwaitingInput::AiImagePrompt)));
        assert!(store.take(1).is_none());
    }

    #[test]
    fn set_replaces_previous_state() {
        let store = SessionStore::new();
        store.set(7, AwaitingInput::PdfText);
        store.set(7, AwaitingInput::ReferralCode);
        assert!(matches!(store.take(7), Some(AwaitingInput::ReferralCode)));
    }

    #[test]
    fn merge_documents_accumulate() {
        let store = SessionStore::new();
        assert_eq!(store.push_merge_document(3, vec![1]), 1);
        assert_eq!(store.push_merge_document(3, vec![2]), 2);
        match store.take(3) {
            Some(AwaitingInput::MergePdfs(docs)) => assert_eq!(docs.len(), 2),
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[test]
    fn push_merge_overrides_other_state() {
        let store = SessionStore::new();
        store.set(5, AwaitingInput::AiImagePrompt);
        assert_eq!(store.push_merge_document(5, vec![0]), 1);
    }
}
