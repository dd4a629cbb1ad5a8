//! In-memory transport and agents for engine tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    switchboard_agents::{
        Agent, AgentEvent, AgentFactory, Error as AgentError, EventCursor, EventLog,
        EventSubscription, ExecutionState, RequestId, SystemLevel,
    },
    switchboard_channels::{ChatTransport, Error as ChannelError, InboundMessage},
    switchboard_common::{ChannelKey, ChatType, MessageId},
    tokio::{sync::watch, time::Instant},
};

pub const BOT_IDENTITY: &str = "switchboard_bot";

pub fn inbound(chat_id: &str, sender_id: &str, text: &str) -> InboundMessage {
    InboundMessage {
        sender_id: sender_id.into(),
        sender_username: None,
        chat_id: chat_id.into(),
        chat_type: if chat_id.starts_with('-') {
            ChatType::Group
        } else {
            ChatType::Dm
        },
        chat_title: None,
        text: text.into(),
        reply_to: None,
        observed_by: BOT_IDENTITY.into(),
    }
}

// ── Transport ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Send {
        chat_id: String,
        text: String,
    },
    Edit {
        chat_id: String,
        message_id: MessageId,
        text: String,
    },
}

#[derive(Default)]
struct MockState {
    calls: Vec<(Instant, Call)>,
    next_id: i64,
    /// Current text of every message, per chat, in send order.
    messages: HashMap<String, Vec<(MessageId, String)>>,
    in_flight: HashMap<String, usize>,
    overlaps: usize,
    attempts: usize,
    fail_next: usize,
    not_modified: bool,
}

/// Records every call and counts calls for one chat that overlap in time.
pub struct MockTransport {
    identity: String,
    latency: Duration,
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            identity: BOT_IDENTITY.into(),
            latency,
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send { text, .. } => Some(text),
                Call::Edit { .. } => None,
            })
            .collect()
    }

    /// Text each message in `chat_id` currently shows, oldest first.
    pub fn messages(&self, chat_id: &str) -> Vec<String> {
        self.lock()
            .messages
            .get(chat_id)
            .map(|m| m.iter().map(|(_, text)| text.clone()).collect())
            .unwrap_or_default()
    }

    /// Everything visible in `chat_id`, concatenated.
    pub fn visible_text(&self, chat_id: &str) -> String {
        self.messages(chat_id).concat()
    }

    pub fn overlaps(&self) -> usize {
        self.lock().overlaps
    }

    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    pub fn fail_next(&self, count: usize) {
        self.lock().fail_next = count;
    }

    pub fn reject_edits_as_not_modified(&self, reject: bool) {
        self.lock().not_modified = reject;
    }

    /// Start times of groups of calls, where a call more than `tolerance`
    /// after the group start begins a new group.
    pub fn cycle_starts(&self, tolerance: Duration) -> Vec<Instant> {
        let mut starts: Vec<Instant> = Vec::new();
        for (at, _) in &self.lock().calls {
            if starts.last().is_none_or(|start| *at - *start > tolerance) {
                starts.push(*at);
            }
        }
        starts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    async fn enter(&self, chat_id: &str) -> Result<(), ChannelError> {
        {
            let mut state = self.lock();
            state.attempts += 1;
            let in_flight = state.in_flight.entry(chat_id.to_string()).or_default();
            *in_flight += 1;
            if *in_flight > 1 {
                state.overlaps += 1;
            }
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut state = self.lock();
        if let Some(in_flight) = state.in_flight.get_mut(chat_id) {
            *in_flight -= 1;
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(ChannelError::unavailable("mock transport failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn send(&self, chat_id: &str, text: &str) -> switchboard_channels::Result<MessageId> {
        self.enter(chat_id).await?;
        let mut state = self.lock();
        state.next_id += 1;
        let id = MessageId(state.next_id);
        state.calls.push((Instant::now(), Call::Send {
            chat_id: chat_id.into(),
            text: text.into(),
        }));
        state
            .messages
            .entry(chat_id.to_string())
            .or_default()
            .push((id, text.to_string()));
        Ok(id)
    }

    async fn edit(
        &self,
        chat_id: &str,
        message_id: MessageId,
        text: &str,
    ) -> switchboard_channels::Result<()> {
        self.enter(chat_id).await?;
        let mut state = self.lock();
        if state.not_modified {
            return Err(ChannelError::MessageNotModified);
        }
        state.calls.push((Instant::now(), Call::Edit {
            chat_id: chat_id.into(),
            message_id,
            text: text.into(),
        }));
        let message = state
            .messages
            .get_mut(chat_id)
            .and_then(|m| m.iter_mut().find(|(id, _)| *id == message_id))
            .ok_or_else(|| ChannelError::invalid_input("message to edit not found"))?;
        message.1 = text.to_string();
        Ok(())
    }
}

// ── Agents ──────────────────────────────────────────────────────────────────

pub enum Step {
    Event(AgentEvent),
    Sleep(Duration),
    /// Never complete the input.
    Hang,
    /// Close the event log.
    CloseLog,
}

impl Step {
    pub fn chat(text: impl Into<String>) -> Self {
        Self::Event(AgentEvent::Chat(text.into()))
    }

    pub fn system(level: SystemLevel, text: impl Into<String>) -> Self {
        Self::Event(AgentEvent::system(level, text))
    }
}

type Script = Arc<dyn Fn(&str) -> Vec<Step> + Send + Sync>;

/// Agent that answers every input by playing back a script.
pub struct ScriptedAgent {
    max_run_time: Duration,
    log: EventLog,
    state: watch::Sender<ExecutionState>,
    script: Script,
    inputs: Mutex<Vec<String>>,
    /// Number of upcoming submits to reject.
    failing_submits: AtomicUsize,
    shutdowns: Arc<AtomicUsize>,
}

impl ScriptedAgent {
    pub fn new(script: impl Fn(&str) -> Vec<Step> + Send + Sync + 'static) -> Self {
        Self::from_script(Arc::new(script), Arc::new(AtomicUsize::new(0)))
    }

    /// Replies with the input text.
    pub fn echo() -> Self {
        Self::new(|input| vec![Step::chat(input)])
    }

    fn from_script(script: Script, shutdowns: Arc<AtomicUsize>) -> Self {
        let (state, _) = watch::channel(ExecutionState::Idle);
        Self {
            max_run_time: Duration::from_secs(300),
            log: EventLog::new(),
            state,
            script,
            inputs: Mutex::new(Vec::new()),
            failing_submits: AtomicUsize::new(0),
            shutdowns,
        }
    }

    pub fn with_max_run_time(mut self, max_run_time: Duration) -> Self {
        self.max_run_time = max_run_time;
        self
    }

    pub fn with_failing_submits(self, count: usize) -> Self {
        self.failing_submits.store(count, Ordering::SeqCst);
        self
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        "scripted"
    }

    fn max_run_time(&self) -> Duration {
        self.max_run_time
    }

    fn state(&self) -> ExecutionState {
        *self.state.borrow()
    }

    async fn wait_idle(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| *s == ExecutionState::Idle).await;
    }

    fn cursor(&self) -> EventCursor {
        self.log.cursor()
    }

    fn subscribe(&self, from: EventCursor) -> EventSubscription {
        self.log.subscribe(from)
    }

    async fn submit(&self, input: &str) -> switchboard_agents::Result<RequestId> {
        if self
            .failing_submits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(AgentError::message("scripted submit failure"));
        }
        let accepted = self.state.send_if_modified(|s| {
            let idle = *s == ExecutionState::Idle;
            if idle {
                *s = ExecutionState::Running;
            }
            idle
        });
        if !accepted {
            return Err(AgentError::Busy {
                request_id: String::new(),
            });
        }
        self.inputs.lock().unwrap().push(input.to_string());

        let request_id = RequestId::new();
        self.log.append(AgentEvent::InputStarted {
            request_id: request_id.clone(),
        });
        let steps = (self.script)(input);
        let log = self.log.clone();
        let state = self.state.clone();
        let id = request_id.clone();
        tokio::spawn(async move {
            for step in steps {
                match step {
                    Step::Event(event) => log.append(event),
                    Step::Sleep(duration) => tokio::time::sleep(duration).await,
                    Step::Hang => return,
                    Step::CloseLog => log.close(),
                }
            }
            log.append(AgentEvent::InputCompleted { request_id: id });
            state.send_replace(ExecutionState::Idle);
        });
        Ok(request_id)
    }

    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.log.close();
    }
}

/// How the factory builds agents for one name.
struct ScriptSpec {
    script: Script,
    max_run_time: Duration,
    failing_submits: usize,
    create_delay: Duration,
}

impl ScriptSpec {
    fn new(script: Script, max_run_time: Duration) -> Self {
        Self {
            script,
            max_run_time,
            failing_submits: 0,
            create_delay: Duration::ZERO,
        }
    }
}

/// Factory handing out [`ScriptedAgent`]s by name. `echo` is always known.
pub struct ScriptedFactory {
    scripts: BTreeMap<String, ScriptSpec>,
    created: Mutex<Vec<(ChannelKey, Arc<ScriptedAgent>)>>,
    shutdowns: Arc<AtomicUsize>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        let mut scripts = BTreeMap::new();
        scripts.insert(
            "echo".to_string(),
            ScriptSpec::new(
                Arc::new(|input: &str| vec![Step::chat(input)]),
                Duration::from_secs(300),
            ),
        );
        Self {
            scripts,
            created: Mutex::new(Vec::new()),
            shutdowns: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_script(
        mut self,
        name: &str,
        max_run_time: Duration,
        script: impl Fn(&str) -> Vec<Step> + Send + Sync + 'static,
    ) -> Self {
        self.scripts
            .insert(name.into(), ScriptSpec::new(Arc::new(script), max_run_time));
        self
    }

    /// Agents built for `name` reject their first `count` submits.
    pub fn with_failing_submits(mut self, name: &str, count: usize) -> Self {
        self.spec_mut(name).failing_submits = count;
        self
    }

    /// Building an agent for `name` takes `delay`.
    pub fn with_create_delay(mut self, name: &str, delay: Duration) -> Self {
        self.spec_mut(name).create_delay = delay;
        self
    }

    pub fn created(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn agent_for(&self, key: &str) -> Option<Arc<ScriptedAgent>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, agent)| Arc::clone(agent))
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    fn spec_mut(&mut self, name: &str) -> &mut ScriptSpec {
        self.scripts
            .get_mut(name)
            .unwrap_or_else(|| panic!("no script named {name}"))
    }
}

#[async_trait]
impl AgentFactory for ScriptedFactory {
    async fn create(
        &self,
        agent: &str,
        channel: &ChannelKey,
    ) -> switchboard_agents::Result<Arc<dyn Agent>> {
        let spec = self
            .scripts
            .get(agent)
            .ok_or_else(|| AgentError::unknown_agent(agent))?;
        if spec.create_delay.is_zero() {
            // yield so concurrent callers get a chance to race
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(spec.create_delay).await;
        }
        let created = Arc::new(
            ScriptedAgent::from_script(Arc::clone(&spec.script), Arc::clone(&self.shutdowns))
                .with_max_run_time(spec.max_run_time)
                .with_failing_submits(spec.failing_submits),
        );
        self.created
            .lock()
            .unwrap()
            .push((channel.clone(), Arc::clone(&created)));
        Ok(created as Arc<dyn Agent>)
    }
}
