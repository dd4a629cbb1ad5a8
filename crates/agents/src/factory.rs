use std::{collections::BTreeMap, sync::Arc};

use {
    async_trait::async_trait,
    switchboard_common::ChannelKey,
    switchboard_config::{AgentConfig, AgentKind},
    tracing::info,
};

use crate::{Agent, AgentFactory, Error, ProcessAgent, Result};

/// Builds agents from the `[agents]` section of the config.
pub struct ConfiguredAgents {
    agents: BTreeMap<String, AgentConfig>,
}

impl ConfiguredAgents {
    pub fn new(agents: BTreeMap<String, AgentConfig>) -> Self {
        Self { agents }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }
}

#[async_trait]
impl AgentFactory for ConfiguredAgents {
    async fn create(&self, agent: &str, channel: &ChannelKey) -> Result<Arc<dyn Agent>> {
        let config = self
            .agents
            .get(agent)
            .ok_or_else(|| Error::unknown_agent(agent))?;
        info!(agent, channel = %channel, kind = ?config.kind, "creating agent");
        match config.kind {
            AgentKind::Process => Ok(Arc::new(ProcessAgent::new(agent, config.clone()))),
        }
    }
}
