pub mod error;
pub mod types;
pub mod config;
pub mod matching;
pub mod assertions;
pub mod harness;
pub mod source;
pub mod grouper;
pub mod steps;
pub mod texts;
pub mod report;
pub mod orchestrator;

pub use error::{AssertionError, BotTestError, GroupError, HarnessError};
pub use types::{
    CaseResult, Cases, Group, ListKind, ListTally, NamedProbe, RunReport, StepCase, TestCaseRecord,
    TestList, TestStep, TextProbe,
};
pub use config::{StepAssertions, TestOptions, TextMode};
pub use harness::{
    AgentFactory,
    AgentReplica,
    Classifier,
    IntentMatch,
    QuickReply,
    RankedResult,
    RouteMeta,
    SessionHarness,
    SessionState,
    SnapshotRevision,
    TurnRecord,
    VisitedAction,
};
pub use harness::scripted::{
    BotDefinition,
    IntentDefinition,
    RouteDefinition,
    ScriptedBot,
    ScriptedBotFactory,
};
pub use source::{load_records, FileSource, SourceRegistry, StaticSource, TestCaseSource};
pub use grouper::{build_groups, Grouping, ListCursor};
pub use steps::{run_step_case, run_step_group};
pub use texts::{run_text_group, ProbeOutcome, TextRunContext};
pub use orchestrator::{BotTester, ReplicaCache};
pub use schemars::JsonSchema;
