use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use {
    switchboard_agents::{Agent, AgentFactory},
    switchboard_common::ChannelKey,
    tokio::{sync::OnceCell, time::Instant},
    tracing::info,
};

use crate::{Error, Result};

/// One long-lived agent bound to a channel.
pub struct Session {
    pub channel_key: ChannelKey,
    pub agent: Arc<dyn Agent>,
    pub created_at: Instant,
    /// Held for the whole of a turn so two inputs never race past the idle
    /// check.
    pub(crate) turn: tokio::sync::Mutex<()>,
}

impl Session {
    pub fn new(channel_key: ChannelKey, agent: Arc<dyn Agent>) -> Self {
        Self {
            channel_key,
            agent,
            created_at: Instant::now(),
            turn: tokio::sync::Mutex::new(()),
        }
    }
}

/// A session that is created at most once, however many callers ask.
type Slot = Arc<OnceCell<Arc<Session>>>;

/// Exactly one session per channel key, created on first use and kept
/// until [`SessionRegistry::destroy_all`].
///
/// The map lock is only held to find or insert a key's slot. Creation runs
/// inside the slot, so a slow factory holds up its own key and nothing else.
pub struct SessionRegistry {
    factory: Arc<dyn AgentFactory>,
    sessions: Mutex<HashMap<ChannelKey, Slot>>,
}

impl SessionRegistry {
    pub fn new(factory: Arc<dyn AgentFactory>) -> Self {
        Self {
            factory,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The session for `key`, creating it with an `agent_type` agent if
    /// there is none yet.
    pub async fn get_or_create(&self, key: &ChannelKey, agent_type: &str) -> Result<Arc<Session>> {
        let slot = Arc::clone(self.lock().entry(key.clone()).or_default());
        let created = slot
            .get_or_try_init(|| async {
                let agent = self.factory.create(agent_type, key).await?;
                info!(channel = %key, agent = agent_type, "session created");
                Ok::<_, Error>(Arc::new(Session::new(key.clone(), agent)))
            })
            .await;
        match created {
            Ok(session) => Ok(Arc::clone(session)),
            Err(e) => {
                let mut sessions = self.lock();
                if let Some(current) = sessions.get(key)
                    && Arc::ptr_eq(current, &slot)
                    && !current.initialized()
                {
                    sessions.remove(key);
                }
                Err(e)
            },
        }
    }

    pub fn get(&self, key: &ChannelKey) -> Option<Arc<Session>> {
        self.lock().get(key).and_then(|slot| slot.get().cloned())
    }

    /// Number of sessions that finished creation.
    pub fn len(&self) -> usize {
        self.lock().values().filter(|slot| slot.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shut down every agent and clear the registry.
    pub async fn destroy_all(&self) {
        let sessions: Vec<Arc<Session>> = self
            .lock()
            .drain()
            .filter_map(|(_, slot)| slot.get().cloned())
            .collect();
        let count = sessions.len();
        futures::future::join_all(sessions.iter().map(|session| session.agent.shutdown())).await;
        info!(count, "all sessions destroyed");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ChannelKey, Slot>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}
