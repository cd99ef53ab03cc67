use std::{fs, path::Path, sync::Arc};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{BotTestError, HarnessError},
    harness::{
        AgentFactory, AgentReplica, Classifier, IntentMatch, QuickReply, RankedResult, RouteMeta,
        SessionHarness, SessionState, SnapshotRevision, TurnRecord, VisitedAction,
    },
    matching::{normalize_path, tokenize},
};

fn default_confidence() -> f64 {
    0.8
}

fn default_fallback() -> RouteDefinition {
    RouteDefinition {
        path: "/fallback".to_string(),
        replies: Vec::new(),
        quick_replies: Vec::new(),
        pass_thread: None,
        untracked: false,
    }
}

/// A declarative bot: fixed routes, quick replies and intents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BotDefinition {
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub routes: Vec<RouteDefinition>,
    #[serde(default)]
    pub intents: Vec<IntentDefinition>,
    #[serde(default = "default_fallback")]
    pub fallback: RouteDefinition,
}

impl BotDefinition {
    pub fn new() -> Self {
        Self {
            confidence: default_confidence(),
            routes: Vec::new(),
            intents: Vec::new(),
            fallback: default_fallback(),
        }
    }

    pub fn from_yaml_str(input: &str) -> Result<Self, BotTestError> {
        Ok(serde_yaml::from_str(input)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, BotTestError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|s| s.to_str()) {
            Some("json") => Ok(serde_json::from_str(&content)?),
            _ => Self::from_yaml_str(&content),
        }
    }

    pub fn with_route(mut self, route: RouteDefinition) -> Self {
        self.routes.push(route);
        self
    }

    pub fn with_intent(mut self, intent: IntentDefinition) -> Self {
        self.intents.push(intent);
        self
    }

    pub fn with_fallback(mut self, fallback: RouteDefinition) -> Self {
        self.fallback = fallback;
        self
    }

    fn route(&self, path: &str) -> &RouteDefinition {
        let path = normalize_path(path);
        self.routes
            .iter()
            .find(|route| normalize_path(&route.path) == path)
            .unwrap_or(&self.fallback)
    }

    fn rank(&self, text: &str) -> Vec<RankedResult> {
        let wanted = tokenize(text);
        let mut ranked: Vec<RankedResult> = self
            .intents
            .iter()
            .filter_map(|intent| {
                let score = intent
                    .utterances
                    .iter()
                    .map(|utterance| strsim::normalized_levenshtein(&wanted, &tokenize(utterance)))
                    .fold(0.0_f64, f64::max);
                if score <= 0.0 {
                    return None;
                }
                let meta = (intent.target_app_id.is_some() || intent.target_action.is_some())
                    .then(|| RouteMeta {
                        target_app_id: intent.target_app_id.clone(),
                        target_action: intent.target_action.clone(),
                    });
                Some(RankedResult {
                    score,
                    above_confidence: score >= self.confidence,
                    intent: Some(IntentMatch {
                        name: intent.name.clone(),
                        score,
                    }),
                    meta,
                    action: intent.action.clone(),
                })
            })
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked
    }
}

impl Default for BotDefinition {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RouteDefinition {
    pub path: String,
    #[serde(default)]
    pub replies: Vec<String>,
    #[serde(default)]
    pub quick_replies: Vec<QuickReplyDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_thread: Option<String>,
    /// Hidden from the action trail shown in failure reports.
    #[serde(default)]
    pub untracked: bool,
}

impl RouteDefinition {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            replies: Vec::new(),
            quick_replies: Vec::new(),
            pass_thread: None,
            untracked: false,
        }
    }

    pub fn reply(mut self, text: impl Into<String>) -> Self {
        self.replies.push(text.into());
        self
    }

    pub fn quick_reply(mut self, title: impl Into<String>, action: impl Into<String>) -> Self {
        self.quick_replies.push(QuickReplyDefinition {
            title: title.into(),
            action: action.into(),
        });
        self
    }

    pub fn pass_thread(mut self, app_id: impl Into<String>) -> Self {
        self.pass_thread = Some(app_id.into());
        self
    }

    pub fn untracked(mut self) -> Self {
        self.untracked = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuickReplyDefinition {
    pub title: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IntentDefinition {
    pub name: String,
    #[serde(default)]
    pub utterances: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_action: Option<String>,
}

impl IntentDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            utterances: Vec::new(),
            action: None,
            target_app_id: None,
            target_action: None,
        }
    }

    pub fn utterance(mut self, text: impl Into<String>) -> Self {
        self.utterances.push(text.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn target(mut self, app_id: impl Into<String>, action: Option<String>) -> Self {
        self.target_app_id = Some(app_id.into());
        self.target_action = action;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ScriptedBot {
    definition: Arc<BotDefinition>,
}

impl ScriptedBot {
    pub fn new(definition: BotDefinition) -> Self {
        Self {
            definition: Arc::new(definition),
        }
    }

    pub fn definition(&self) -> &BotDefinition {
        &self.definition
    }
}

#[async_trait]
impl AgentReplica for ScriptedBot {
    async fn open_session(&self) -> Result<Box<dyn SessionHarness>, HarnessError> {
        Ok(Box::new(ScriptedSession {
            definition: Arc::clone(&self.definition),
            state: SessionState::default(),
            last_turn: None,
            history: Vec::new(),
        }))
    }
}

#[async_trait]
impl Classifier for ScriptedBot {
    async fn ai_actions_for_text(
        &self,
        text: &str,
        _lang: Option<&str>,
        _full_detail: bool,
    ) -> Result<Vec<RankedResult>, HarnessError> {
        Ok(self.definition.rank(text))
    }
}

/// Builds a fresh [`ScriptedBot`] from the same definition on every call.
#[derive(Debug, Clone)]
pub struct ScriptedBotFactory {
    definition: Arc<BotDefinition>,
}

impl ScriptedBotFactory {
    pub fn new(definition: BotDefinition) -> Self {
        Self {
            definition: Arc::new(definition),
        }
    }
}

#[async_trait]
impl AgentFactory for ScriptedBotFactory {
    async fn create(&self, revision: SnapshotRevision) -> Result<Arc<dyn AgentReplica>, HarnessError> {
        debug!(?revision, "building scripted bot");
        Ok(Arc::new(ScriptedBot {
            definition: Arc::clone(&self.definition),
        }))
    }
}

pub struct ScriptedSession {
    definition: Arc<BotDefinition>,
    state: SessionState,
    last_turn: Option<TurnRecord>,
    history: Vec<VisitedAction>,
}

impl ScriptedSession {
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    fn offered(&self) -> &[QuickReply] {
        self.last_turn
            .as_ref()
            .map(|turn| turn.quick_replies.as_slice())
            .unwrap_or_default()
    }

    fn offered_by_title(&self, title: &str) -> Option<QuickReply> {
        let wanted = tokenize(title);
        self.offered()
            .iter()
            .find(|reply| tokenize(&reply.title) == wanted)
            .cloned()
    }

    fn run_route(&mut self, path: &str, intent: Option<IntentMatch>) {
        let route = self.definition.route(path).clone();
        let action = normalize_path(&route.path);

        self.history.push(VisitedAction {
            action: action.clone(),
            untracked: route.untracked,
        });
        self.last_turn = Some(TurnRecord {
            texts: route.replies.clone(),
            quick_replies: route
                .quick_replies
                .iter()
                .map(|reply| QuickReply::new(reply.title.clone(), normalize_path(&reply.action)))
                .collect(),
            actions: vec![action],
            pass_thread: route.pass_thread.clone(),
            score: intent.as_ref().map(|i| i.score),
            intent: intent.map(|i| i.name),
        });
    }
}

#[async_trait]
impl SessionHarness for ScriptedSession {
    async fn postback(&mut self, action: &str) -> Result<(), HarnessError> {
        self.run_route(action, None);
        Ok(())
    }

    async fn quick_reply(&mut self, action: &str) -> Result<(), HarnessError> {
        let wanted = normalize_path(action);
        let reply = self
            .offered()
            .iter()
            .find(|reply| reply.action == wanted)
            .cloned()
            .ok_or_else(|| HarnessError::QuickReplyNotFound(action.to_string()))?;
        self.run_route(&reply.action, None);
        Ok(())
    }

    async fn quick_reply_by_text(&mut self, title: &str) -> Result<(), HarnessError> {
        let reply = self
            .offered_by_title(title)
            .ok_or_else(|| HarnessError::QuickReplyNotFound(title.to_string()))?;
        self.run_route(&reply.action, None);
        Ok(())
    }

    async fn text(&mut self, text: &str) -> Result<(), HarnessError> {
        if let Some(reply) = self.offered_by_title(text) {
            self.run_route(&reply.action, None);
            return Ok(());
        }

        let top = self.definition.rank(text).into_iter().next();
        match top {
            Some(result) if result.above_confidence => {
                let path = result
                    .action
                    .clone()
                    .unwrap_or_else(|| self.definition.fallback.path.clone());
                self.run_route(&path, result.intent);
            }
            Some(result) => {
                let path = self.definition.fallback.path.clone();
                self.run_route(&path, result.intent);
            }
            None => {
                let path = self.definition.fallback.path.clone();
                self.run_route(&path, None);
            }
        }
        Ok(())
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    fn last_turn(&self) -> Option<&TurnRecord> {
        self.last_turn.as_ref()
    }

    fn action_history(&self) -> &[VisitedAction] {
        &self.history
    }

    async fn teardown(&mut self) {
        self.last_turn = None;
        self.history.clear();
    }
}
