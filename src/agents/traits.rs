//! Agent seams used by the coordinator

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{
    AnalysisReport, FillOutcome, InvestmentThesis, OrderProposal, Portfolio, TradeSignal,
};
use crate::error::Result;

/// Agent lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Stopped,
    Running,
}

impl AgentStatus {
    pub fn from_running(running: bool) -> Self {
        if running {
            AgentStatus::Running
        } else {
            AgentStatus::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, AgentStatus::Running)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Stopped => write!(f, "stopped"),
            AgentStatus::Running => write!(f, "running"),
        }
    }
}

/// A component booted and torn down by the coordinator.
///
/// Agents are shared behind `Arc`, so lifecycle methods take `&self`.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn status(&self) -> AgentStatus;

    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;
}

/// Produces a best-effort report for one symbol.
///
/// Transient data failures must not surface as errors: the report is returned
/// with the affected sub-scores absent.
#[async_trait]
pub trait Analyzer: Agent {
    async fn analyze(&self, symbol: &str) -> Option<AnalysisReport>;

    /// `analyze`, stamping every event it publishes with `correlation_id`
    async fn analyze_correlated(&self, symbol: &str, correlation_id: Option<Uuid>) -> Option<AnalysisReport>;

    /// Subscribe to the bus topics that feed the analyzer
    async fn register(&self) {}

    fn into_agent(self: Arc<Self>) -> Arc<dyn Agent>;
}

/// Pure signal function over a report and the current thesis
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// `None` means no actionable signal
    fn generate(&self, report: &AnalysisReport, thesis: Option<&InvestmentThesis>) -> Option<TradeSignal>;
}

/// Owns the portfolio: turns signals into sized proposals and applies fills
#[async_trait]
pub trait PortfolioSizer: Agent {
    async fn generate_order_proposals(
        &self,
        signals: &[TradeSignal],
        available_cash: Decimal,
    ) -> Result<Vec<OrderProposal>>;

    async fn execute_order(&self, proposal: &OrderProposal) -> Result<FillOutcome>;

    async fn rebalance(&self) -> Result<Vec<OrderProposal>>;

    async fn portfolio(&self) -> Portfolio;

    fn into_agent(self: Arc<Self>) -> Arc<dyn Agent>;
}
