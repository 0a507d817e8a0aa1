//! Scripted in-process sessions
//!
//! `ScriptedRenderer` and `RecordingSink` stand in for a real form renderer
//! and chat log. `run_simulation` wires a requestor and a set of scripted
//! responders to one `BroadcastHub` and runs a single query end to end: the
//! requestor asks for a number and rolls that many d6 for each responder,
//! acknowledging the rolls back to them.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use eyre::{Context, Result, bail, eyre};
use rand::Rng;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Config;
use crate::dialog::{Prompt, PromptRenderer, PromptReply};
use crate::directory::{Directory, Participant, Roster, UserId};
use crate::notice::{Notice, NotificationSink};
use crate::peer::{Peer, PeerHandle, PeerMetrics};
use crate::protocol::{InputField, QueryId, QueryRequest};
use crate::query::{Acknowledgement, QueryOptions, Responses, UserStatus};
use crate::status::StatusSnapshot;
use crate::transport::BroadcastHub;
use crate::util::to_id;

/// Participant id of the simulated requestor
pub const OWNER: &str = "gm";

/// Query id used when the plan does not name one
pub const DEFAULT_QUERY_ID: &str = "test-data-request";

/// Upper bound on dice rolled for a single answer
const MAX_DICE: u64 = 100;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// How a scripted participant reacts to every prompt
#[derive(Debug, Clone, PartialEq)]
pub enum Script {
    /// Submit these raw field values immediately
    Answer(Map<String, Value>),
    /// Close the prompt without answering
    Close,
    /// Keep the prompt open until replied to or dismissed
    Hold,
}

impl Script {
    /// Answer with an object's fields, or a bare value under `value`
    pub fn answer(value: Value) -> Self {
        match value {
            Value::Object(map) => Script::Answer(map),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                Script::Answer(map)
            }
        }
    }
}

#[derive(Default)]
struct RendererState {
    presented: Vec<Prompt>,
    fronted: Vec<QueryId>,
    dismissed: Vec<QueryId>,
    held: HashMap<QueryId, oneshot::Sender<PromptReply>>,
}

/// Renderer that follows a fixed script and records what it was asked to do
pub struct ScriptedRenderer {
    script: Script,
    state: Mutex<RendererState>,
}

impl ScriptedRenderer {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            state: Mutex::new(RendererState::default()),
        }
    }

    pub fn presented(&self) -> Vec<Prompt> {
        self.state.lock().map(|s| s.presented.clone()).unwrap_or_default()
    }

    pub fn fronted(&self) -> Vec<QueryId> {
        self.state.lock().map(|s| s.fronted.clone()).unwrap_or_default()
    }

    pub fn dismissed(&self) -> Vec<QueryId> {
        self.state.lock().map(|s| s.dismissed.clone()).unwrap_or_default()
    }

    /// Complete a held prompt; false if none is held for `id`
    pub fn reply(&self, id: &str, reply: PromptReply) -> bool {
        let held = self.state.lock().ok().and_then(|mut s| s.held.remove(id));
        match held {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }
}

impl PromptRenderer for ScriptedRenderer {
    fn present(&self, prompt: Prompt) -> oneshot::Receiver<PromptReply> {
        debug!(id = %prompt.id, inputs = prompt.inputs.len(), "ScriptedRenderer::present: called");
        let (tx, rx) = oneshot::channel();
        let id = prompt.id.clone();

        if let Ok(mut state) = self.state.lock() {
            state.presented.push(prompt);
            match &self.script {
                Script::Answer(answers) => {
                    let _ = tx.send(PromptReply::Submitted(answers.clone()));
                }
                Script::Close => {
                    let _ = tx.send(PromptReply::Closed);
                }
                Script::Hold => {
                    state.held.insert(id, tx);
                }
            }
        }
        rx
    }

    fn bring_to_front(&self, id: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.fronted.push(id.to_string());
        }
    }

    fn dismiss(&self, id: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.dismissed.push(id.to_string());
            // Dropping the sender reports the prompt as closed
            state.held.remove(id);
        }
    }
}

/// Sink that keeps everything it is given
#[derive(Debug, Default)]
pub struct RecordingSink {
    errors: Mutex<Vec<String>>,
    notices: Mutex<Vec<Notice>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

impl NotificationSink for RecordingSink {
    fn error(&self, message: &str) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(message.to_string());
        }
    }

    fn whisper(&self, notice: Notice) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice);
        }
    }
}

/// What to simulate
#[derive(Debug, Clone, Default)]
pub struct SimulationPlan {
    pub query_id: Option<QueryId>,
    pub question: String,
    /// Responders, in target order
    pub users: Vec<UserId>,
    /// Scripted answers; responders without one close the prompt
    pub answers: BTreeMap<UserId, Value>,
    /// Responders that never connect
    pub absent: Vec<UserId>,
    /// Responders that disconnect once the prompt reaches them
    pub drop: Vec<UserId>,
    /// Attach a status view and dismiss it once nobody is waiting
    pub observe: bool,
}

/// Outcome of a simulated session
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub query_id: QueryId,
    pub question: String,
    /// None if the query was cancelled
    pub responses: Option<Responses>,
    pub rolls: BTreeMap<UserId, Vec<u32>>,
    pub notices: Vec<Notice>,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_status: Option<StatusSnapshot>,
    pub metrics: PeerMetrics,
}

struct Responder {
    user_id: UserId,
    handle: PeerHandle,
    task: JoinHandle<()>,
    renderer: Arc<ScriptedRenderer>,
    sink: Arc<RecordingSink>,
}

/// Number of dice an answer asks for
fn dice_count(answers: &Value) -> u64 {
    let count = match answers {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    };
    count.min(MAX_DICE)
}

fn roll_d6(count: u64) -> Vec<u32> {
    let mut rng = rand::rng();
    (0..count).map(|_| rng.random_range(1..=6)).collect()
}

/// Run one query through a full in-process session
pub async fn run_simulation(config: &Config, plan: SimulationPlan) -> Result<SimulationReport> {
    debug!(?plan, "run_simulation: called");
    if plan.users.is_empty() {
        bail!("At least one responder is required");
    }
    if plan.users.iter().any(|u| u == OWNER) {
        bail!("'{}' is reserved for the requestor", OWNER);
    }

    let roster = Roster::new();
    roster.add(Participant::new(OWNER).privileged());
    for user in &plan.users {
        roster.add(Participant::new(user.clone()));
    }
    let hub = BroadcastHub::new(roster.clone(), config.transport.channel_capacity);
    let directory: Arc<dyn Directory> = Arc::new(roster);

    let owner_sink = Arc::new(RecordingSink::new());
    let (owner, owner_task) = Peer::new(
        config,
        hub.connect(OWNER),
        Arc::clone(&directory),
        Arc::new(ScriptedRenderer::new(Script::Close)),
        owner_sink.clone(),
    )
    .spawn();

    let key = to_id(&plan.question);
    let mut responders = Vec::new();
    for user in &plan.users {
        if plan.absent.contains(user) {
            info!(user_id = %user, "Responder stays offline");
            continue;
        }
        let script = if plan.drop.contains(user) {
            Script::Hold
        } else {
            match plan.answers.get(user) {
                Some(value) => {
                    let mut answers = Map::new();
                    answers.insert(key.clone(), value.clone());
                    Script::Answer(answers)
                }
                None => Script::Close,
            }
        };

        let renderer = Arc::new(ScriptedRenderer::new(script));
        let sink = Arc::new(RecordingSink::new());
        let (handle, task) = Peer::new(
            config,
            hub.connect(user),
            Arc::clone(&directory),
            renderer.clone(),
            sink.clone(),
        )
        .spawn();
        responders.push(Responder {
            user_id: user.clone(),
            handle,
            task,
            renderer,
            sink,
        });
    }

    let query_id = plan.query_id.clone().unwrap_or_else(|| DEFAULT_QUERY_ID.to_string());
    let request = QueryRequest::new(plan.question.clone())
        .with_id(query_id.clone())
        .with_description("Number of d6 to roll")
        .with_input(InputField::input("number", plan.question.clone()).with_key(key).with_autofocus());

    let rolls: Arc<Mutex<BTreeMap<UserId, Vec<u32>>>> = Arc::default();
    let hook_rolls = Arc::clone(&rolls);
    let options = QueryOptions::new()
        .with_users(plan.users.clone())
        .with_status(plan.observe)
        .on_submit(move |_, user, answers| {
            let rolled = roll_d6(dice_count(answers));
            let listed: Vec<String> = rolled.iter().map(u32::to_string).collect();
            let content = format!("Rolls: {}", listed.join(", "));
            if let Ok(mut rolls) = hook_rolls.lock() {
                rolls.insert(user.to_string(), rolled);
            }
            Some(Acknowledgement::new(content))
        });

    let mut pending = owner
        .query(request, options)
        .await?
        .into_pending()
        .ok_or_else(|| eyre!("Query {} is already running", query_id))?;
    info!(%query_id, "Simulated query started");

    for responder in responders.iter().filter(|r| plan.drop.contains(&r.user_id)) {
        wait_until(|| !responder.renderer.presented().is_empty())
            .await
            .context(format!("Prompt never reached {}", responder.user_id))?;
        info!(user_id = %responder.user_id, "Dropping responder");
        hub.disconnect(&responder.user_id);
    }

    let final_status = match pending.take_status() {
        Some(mut watch) => {
            let settled = tokio::time::timeout(
                SETTLE_TIMEOUT,
                watch.wait_for(|s| s.closed || s.count(UserStatus::Waiting) == 0),
            )
            .await
            .map_err(|_| eyre!("Timed out waiting for responders"))?;
            let snapshot = settled.unwrap_or_else(|| watch.snapshot());
            if !snapshot.closed {
                watch.dismiss()?;
            }
            Some(snapshot)
        }
        None => None,
    };

    let responses = tokio::time::timeout(SETTLE_TIMEOUT, pending.wait())
        .await
        .map_err(|_| eyre!("Timed out waiting for query {}", query_id))??;

    // Acknowledgements travel after the last submit; give them a moment
    let answered = responses.as_ref().map(|r| r.len()).unwrap_or(0);
    let _ = wait_until(|| responders.iter().map(|r| r.sink.notices().len()).sum::<usize>() >= answered).await;

    let metrics = owner.metrics().await?;

    let mut notices = Vec::new();
    let mut errors = owner_sink.errors();
    for responder in &responders {
        notices.extend(responder.sink.notices());
        errors.extend(responder.sink.errors());
    }
    let rolls = rolls.lock().map(|r| r.clone()).unwrap_or_default();

    owner.shutdown().await?;
    owner_task.await.context("Requestor task failed")?;
    for responder in responders {
        // Dropped responders may already have lost their link
        let _ = responder.handle.shutdown().await;
        responder
            .task
            .await
            .context(format!("Responder task {} failed", responder.user_id))?;
    }

    Ok(SimulationReport {
        query_id,
        question: plan.question,
        responses,
        rolls,
        notices,
        errors,
        final_status,
        metrics,
    })
}

/// Poll `condition` until it holds or the settle timeout passes
async fn wait_until<F>(mut condition: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + SETTLE_TIMEOUT;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            bail!("Timed out after {:?}", SETTLE_TIMEOUT);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan(users: &[&str]) -> SimulationPlan {
        SimulationPlan {
            question: "Stat Base".to_string(),
            users: users.iter().map(|u| u.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_dice_count() {
        assert_eq!(dice_count(&json!(3)), 3);
        assert_eq!(dice_count(&json!(" 2 ")), 2);
        assert_eq!(dice_count(&json!(-1)), 0);
        assert_eq!(dice_count(&json!({"statBase": 4})), 0);
        assert_eq!(dice_count(&json!(10_000)), MAX_DICE);
    }

    #[test]
    fn test_roll_d6_range() {
        let rolled = roll_d6(50);
        assert_eq!(rolled.len(), 50);
        assert!(rolled.iter().all(|r| (1..=6).contains(r)));
    }

    #[test]
    fn test_script_answer_wraps_bare_values() {
        assert_eq!(
            Script::answer(json!(3)),
            Script::Answer(json!({"value": 3}).as_object().cloned().unwrap())
        );
    }

    #[tokio::test]
    async fn test_scripted_renderer_hold_and_reply() {
        let renderer = ScriptedRenderer::new(Script::Hold);
        let rx = renderer.present(Prompt {
            id: "q-1".to_string(),
            title: None,
            description: None,
            inputs: vec![],
        });
        assert!(renderer.reply("q-1", PromptReply::Closed));
        assert!(!renderer.reply("q-1", PromptReply::Closed));
        assert_eq!(rx.await.unwrap(), PromptReply::Closed);
    }

    #[tokio::test]
    async fn test_simulation_collects_answers_and_rolls() {
        let mut plan = plan(&["alice", "bob"]);
        plan.answers.insert("alice".to_string(), json!(3));
        plan.answers.insert("bob".to_string(), json!(1));

        let report = run_simulation(&Config::default(), plan).await.unwrap();
        let responses = report.responses.unwrap();
        assert_eq!(responses["alice"], json!(3));
        assert_eq!(responses["bob"], json!(1));
        assert_eq!(report.rolls["alice"].len(), 3);
        assert_eq!(report.rolls["bob"].len(), 1);
        assert_eq!(report.notices.len(), 2);
        assert!(report.notices.iter().all(|n| n.content.starts_with("Rolls: ")));
        assert_eq!(report.metrics.queries_resolved, 1);
    }

    #[tokio::test]
    async fn test_simulation_with_absent_and_declining_users() {
        let mut plan = plan(&["alice", "bob", "carol"]);
        plan.answers.insert("alice".to_string(), json!(2));
        plan.absent.push("carol".to_string());

        let report = run_simulation(&Config::default(), plan).await.unwrap();
        let responses = report.responses.unwrap();
        assert_eq!(responses.keys().collect::<Vec<_>>(), vec!["alice"]);
    }

    #[tokio::test]
    async fn test_simulation_observed_with_drop() {
        let mut plan = plan(&["alice", "bob"]);
        plan.answers.insert("alice".to_string(), json!(1));
        plan.drop.push("bob".to_string());
        plan.observe = true;

        let report = run_simulation(&Config::default(), plan).await.unwrap();
        let status = report.final_status.unwrap();
        assert_eq!(status.status_of("alice"), Some(UserStatus::Finished));
        assert_eq!(status.status_of("bob"), Some(UserStatus::Disconnected));
        assert_eq!(report.responses.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_simulation_rejects_reserved_owner() {
        let err = run_simulation(&Config::default(), plan(&["gm"])).await.unwrap_err();
        assert!(err.to_string().contains("reserved"));

        assert!(run_simulation(&Config::default(), plan(&[])).await.is_err());
    }
}
