//! Agent Lifecycle Management
//!
//! Ordered startup and shutdown of the desk agents with per-agent state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::agents::Agent;
use crate::error::{DeskError, Result};

/// Lifecycle state of one agent as seen by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl ComponentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ComponentState::Stopped | ComponentState::Failed)
    }
}

impl std::fmt::Display for ComponentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentState::Stopped => write!(f, "stopped"),
            ComponentState::Starting => write!(f, "starting"),
            ComponentState::Running => write!(f, "running"),
            ComponentState::Stopping => write!(f, "stopping"),
            ComponentState::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentInfo {
    pub state: ComponentState,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl ComponentInfo {
    fn new() -> Self {
        Self {
            state: ComponentState::Stopped,
            started_at: None,
            stopped_at: None,
            last_error: None,
        }
    }
}

/// Starts agents in registration order and stops them in reverse
pub struct AgentLifecycle {
    agents: Vec<Arc<dyn Agent>>,
    states: RwLock<BTreeMap<String, ComponentInfo>>,
    timeout: Duration,
}

impl AgentLifecycle {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agents: Vec::new(),
            states: RwLock::new(BTreeMap::new()),
            timeout,
        }
    }

    /// Append an agent to the startup order
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        debug!("Registered agent {} at position {}", agent.name(), self.agents.len());
        self.states
            .get_mut()
            .insert(agent.name().to_string(), ComponentInfo::new());
        self.agents.push(agent);
    }

    pub fn startup_order(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name().to_string()).collect()
    }

    pub async fn get_all_states(&self) -> BTreeMap<String, ComponentInfo> {
        self.states.read().await.clone()
    }

    async fn set_state(&self, name: &str, state: ComponentState, error: Option<String>) {
        let mut states = self.states.write().await;
        let info = states.entry(name.to_string()).or_insert_with(ComponentInfo::new);
        let from = info.state;
        info.state = state;
        match state {
            ComponentState::Running => info.started_at = Some(Utc::now()),
            ComponentState::Stopped => info.stopped_at = Some(Utc::now()),
            _ => {}
        }
        if error.is_some() {
            info.last_error = error;
        }
        debug!("Agent {} state: {} -> {}", name, from, state);
    }

    /// Start every agent in order. On the first failure the agents already
    /// started are stopped again and the error is returned.
    pub async fn start_all(&self) -> Result<()> {
        let started = std::time::Instant::now();
        info!("Starting {} agents in order: {:?}", self.agents.len(), self.startup_order());

        for (index, agent) in self.agents.iter().enumerate() {
            let name = agent.name().to_string();
            self.set_state(&name, ComponentState::Starting, None).await;

            let failure = match tokio::time::timeout(self.timeout, agent.start()).await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(_) => Some(DeskError::ComponentFailure {
                    component: name.clone(),
                    reason: format!("startup timeout after {}ms", self.timeout.as_millis()),
                }),
            };

            match failure {
                None => self.set_state(&name, ComponentState::Running, None).await,
                Some(e) => {
                    error!("Agent {} failed to start: {}", name, e);
                    self.set_state(&name, ComponentState::Failed, Some(e.to_string()))
                        .await;
                    for agent in self.agents[..index].iter().rev() {
                        self.stop_one(agent, "startup rollback").await;
                    }
                    return Err(e);
                }
            }
        }

        info!("All agents started in {}ms", started.elapsed().as_millis());
        Ok(())
    }

    /// Stop every running agent in reverse order. Never fails; errors and
    /// timeouts are logged and the agent is marked stopped.
    pub async fn stop_all(&self, reason: &str) {
        info!("Stopping agents (reason: {})", reason);
        for agent in self.agents.iter().rev() {
            self.stop_one(agent, reason).await;
        }
    }

    async fn stop_one(&self, agent: &Arc<dyn Agent>, reason: &str) {
        let name = agent.name().to_string();
        let current = self
            .states
            .read()
            .await
            .get(&name)
            .map(|i| i.state)
            .unwrap_or(ComponentState::Stopped);
        if current.is_terminal() {
            return;
        }

        self.set_state(&name, ComponentState::Stopping, None).await;
        let error = match tokio::time::timeout(self.timeout, agent.stop()).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => {
                warn!("Agent {} stop failed ({}): {}", name, reason, e);
                Some(e.to_string())
            }
            Err(_) => {
                warn!("Agent {} shutdown timeout after {}ms", name, self.timeout.as_millis());
                Some("shutdown timeout".to_string())
            }
        };
        self.set_state(&name, ComponentState::Stopped, error).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct Probe {
        name: String,
        fail_start: bool,
        running: AtomicBool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Probe {
        fn new(name: &str, fail_start: bool, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                fail_start,
                running: AtomicBool::new(false),
                log: Arc::clone(log),
            })
        }
    }

    #[async_trait]
    impl Agent for Probe {
        fn name(&self) -> &str {
            &self.name
        }

        fn status(&self) -> AgentStatus {
            AgentStatus::from_running(self.running.load(Ordering::SeqCst))
        }

        async fn start(&self) -> Result<()> {
            if self.fail_start {
                return Err(DeskError::Internal(format!("{} refused", self.name)));
            }
            self.running.store(true, Ordering::SeqCst);
            self.log.lock().unwrap().push(format!("start {}", self.name));
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.running.store(false, Ordering::SeqCst);
            self.log.lock().unwrap().push(format!("stop {}", self.name));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_start_and_stop_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut lifecycle = AgentLifecycle::new(Duration::from_secs(1));
        lifecycle.register(Probe::new("collector", false, &log));
        lifecycle.register(Probe::new("analyst", false, &log));
        lifecycle.register(Probe::new("cio", false, &log));

        lifecycle.start_all().await.unwrap();
        lifecycle.stop_all("test").await;

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "start collector",
                "start analyst",
                "start cio",
                "stop cio",
                "stop analyst",
                "stop collector"
            ]
        );
        let states = lifecycle.get_all_states().await;
        assert!(states.values().all(|i| i.state == ComponentState::Stopped));
    }

    #[tokio::test]
    async fn test_failed_start_rolls_back() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut lifecycle = AgentLifecycle::new(Duration::from_secs(1));
        lifecycle.register(Probe::new("collector", false, &log));
        lifecycle.register(Probe::new("analyst", true, &log));
        lifecycle.register(Probe::new("cio", false, &log));

        assert!(lifecycle.start_all().await.is_err());
        assert_eq!(*log.lock().unwrap(), vec!["start collector", "stop collector"]);

        let states = lifecycle.get_all_states().await;
        assert_eq!(states["analyst"].state, ComponentState::Failed);
        assert_eq!(states["cio"].state, ComponentState::Stopped);
        assert!(states["analyst"].last_error.as_deref().unwrap().contains("refused"));
    }
}
