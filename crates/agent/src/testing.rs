//! Deterministic model and guard doubles for exercising the graph without
//! network access.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use safepath_core::domain::message::Message;
use safepath_core::domain::safety::SafetyAssessment;

use crate::guardrails::{GuardRole, SafetyGuard};
use crate::llm::{ChatModel, ChatRequest, LlmError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Replays queued replies in order and records every request.
/// Fails with `EmptyChoices` once the script runs out.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<Message, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn with_replies(replies: Vec<Message>) -> Self {
        let model = Self::default();
        for reply in replies {
            model.push_reply(reply);
        }
        model
    }

    pub fn push_reply(&self, reply: Message) {
        lock(&self.replies).push_back(Ok(reply));
    }

    pub fn push_error(&self, error: LlmError) {
        lock(&self.replies).push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat(&self, request: ChatRequest) -> Result<Message, LlmError> {
        lock(&self.requests).push(request);
        lock(&self.replies).pop_front().unwrap_or(Err(LlmError::EmptyChoices))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Returns queued assessments first, then the fallback.
pub struct StaticGuard {
    queued: Mutex<VecDeque<SafetyAssessment>>,
    fallback: SafetyAssessment,
    calls: AtomicUsize,
}

impl StaticGuard {
    pub fn always(assessment: SafetyAssessment) -> Self {
        Self { queued: Mutex::new(VecDeque::new()), fallback: assessment, calls: AtomicUsize::new(0) }
    }

    pub fn safe() -> Self {
        Self::always(SafetyAssessment::safe())
    }

    pub fn then(self, assessment: SafetyAssessment) -> Self {
        lock(&self.queued).push_back(assessment);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SafetyGuard for StaticGuard {
    async fn assess(
        &self,
        _role: GuardRole,
        _messages: &[Message],
    ) -> Result<SafetyAssessment, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.queued).pop_front().unwrap_or_else(|| self.fallback.clone()))
    }
}
