use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HarnessError;

pub mod scripted;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickReply {
    pub title: String,
    pub action: String,
}

impl QuickReply {
    pub fn new(title: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            action: action.into(),
        }
    }
}

/// Everything the bot produced for one turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnRecord {
    pub texts: Vec<String>,
    pub quick_replies: Vec<QuickReply>,
    /// Action paths passed while handling the turn, in order.
    pub actions: Vec<String>,
    pub pass_thread: Option<String>,
    pub intent: Option<String>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitedAction {
    pub action: String,
    pub untracked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub lang: Option<String>,
}

/// Drives one conversation against an agent replica.
#[async_trait]
pub trait SessionHarness: Send {
    async fn postback(&mut self, action: &str) -> Result<(), HarnessError>;

    async fn quick_reply(&mut self, action: &str) -> Result<(), HarnessError>;

    async fn quick_reply_by_text(&mut self, title: &str) -> Result<(), HarnessError>;

    async fn text(&mut self, text: &str) -> Result<(), HarnessError>;

    fn set_state(&mut self, state: SessionState);

    fn last_turn(&self) -> Option<&TurnRecord>;

    fn action_history(&self) -> &[VisitedAction];

    async fn teardown(&mut self) {}
}

#[async_trait]
pub trait AgentReplica: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn SessionHarness>, HarnessError>;
}

/// Which bot definition revision a factory should build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SnapshotRevision {
    #[default]
    Latest,
    At(u64),
    /// Ignore revision limits; used when rebuilding for tests.
    Unlimited,
}

#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn create(&self, revision: SnapshotRevision) -> Result<Arc<dyn AgentReplica>, HarnessError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntentMatch {
    pub name: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteMeta {
    pub target_app_id: Option<String>,
    pub target_action: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedResult {
    pub score: f64,
    pub above_confidence: bool,
    pub intent: Option<IntentMatch>,
    pub meta: Option<RouteMeta>,
    pub action: Option<String>,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Ranked candidate actions for a free text, best first.
    async fn ai_actions_for_text(
        &self,
        text: &str,
        lang: Option<&str>,
        full_detail: bool,
    ) -> Result<Vec<RankedResult>, HarnessError>;
}
