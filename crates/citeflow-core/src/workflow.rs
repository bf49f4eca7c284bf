use crate::CiteflowError;
use crate::config::Config;
use crate::providers::{CompletionProvider, GeminiClient, SearchProvider, TavilyClient};
use crate::retry::{Sleeper, TokioSleeper};
use crate::state::WorkflowState;
use crate::tasks::{DraftTask, ResearchTask, STAGE_KEY, STATE_KEY, TRACE_KEY};
use crate::trace::RunTrace;
use graph_flow::{
    ExecutionStatus, FlowRunner, GraphBuilder, InMemorySessionStorage, Session, SessionStorage,
    Task,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Upper bound on runner invocations per run; the graph has two tasks.
const MAX_RUNNER_STEPS: usize = 4;

/// Position of a run in the `Researching -> Drafting -> Done` sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    Researching,
    Drafting,
    Done,
}

impl WorkflowStage {
    pub const RESEARCH_TASK_ID: &'static str = "researcher";
    pub const DRAFT_TASK_ID: &'static str = "drafter";
}

/// Result of [`ResearchWorkflow::run_with_report`].
#[derive(Debug, Clone)]
pub struct RunReport {
    pub session_id: String,
    pub state: WorkflowState,
    pub trace: RunTrace,
    pub elapsed: Duration,
}

/// Runs the research stage followed by the drafting stage for one query.
///
/// Holds no per-run data: every call to [`run`](Self::run) builds a fresh
/// state, session and session store, so one instance can serve concurrent
/// queries.
pub struct ResearchWorkflow {
    config: Config,
    search: Arc<dyn SearchProvider>,
    model: Arc<dyn CompletionProvider>,
    sleeper: Arc<dyn Sleeper>,
}

impl ResearchWorkflow {
    pub fn new(
        config: Config,
        search: Arc<dyn SearchProvider>,
        model: Arc<dyn CompletionProvider>,
    ) -> Self {
        Self {
            config,
            search,
            model,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Build the Tavily and Gemini adapters from configuration. API keys are
    /// read from the environment variables the config names.
    pub fn from_config(config: Config) -> Result<Self, CiteflowError> {
        let mut search = TavilyClient::new(config.search_api_key()?)
            .with_timeout(Duration::from_secs(config.search.timeout_secs));
        if let Some(url) = &config.search.base_url {
            search = search.with_base_url(url.clone());
        }

        let mut model = GeminiClient::with_timeout(
            config.model_api_key()?,
            Duration::from_secs(config.model.timeout_secs),
        )
        .map_err(|err| CiteflowError::InvalidConfiguration(err.to_string()))?;
        if let Some(url) = &config.model.base_url {
            model = model.with_base_url(url.clone());
        }

        Ok(Self::new(config, Arc::new(search), Arc::new(model)))
    }

    /// Replace the wait used between drafting retries.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn model(&self) -> Arc<dyn CompletionProvider> {
        self.model.clone()
    }

    fn build_graph(&self) -> Arc<graph_flow::Graph> {
        let research = Arc::new(ResearchTask::new(self.search.clone(), &self.config));
        let draft = Arc::new(DraftTask::new(
            self.model.clone(),
            &self.config,
            self.sleeper.clone(),
        ));

        let graph = GraphBuilder::new("citeflow_workflow")
            .add_task(research.clone())
            .add_task(draft.clone())
            .add_edge(research.id(), draft.id())
            .set_start_task(research.id())
            .build();

        Arc::new(graph)
    }

    /// Answer `query`. External service failures yield a degraded but
    /// complete state; only internal defects are returned as `Err`.
    pub async fn run(&self, query: &str) -> Result<WorkflowState, CiteflowError> {
        Ok(self.run_with_report(query).await?.state)
    }

    /// Like [`run`](Self::run), additionally returning the session id, the
    /// per-stage trace and the elapsed time.
    #[instrument(name = "workflow.run", skip(self))]
    pub async fn run_with_report(&self, query: &str) -> Result<RunReport, CiteflowError> {
        if query.trim().is_empty() {
            return Err(CiteflowError::EmptyQuery);
        }

        let started = Instant::now();
        let graph = self.build_graph();
        let storage = Arc::new(InMemorySessionStorage::new());
        let runner = FlowRunner::new(graph, storage.clone());

        let session_id = format!("run-{}", Uuid::new_v4());
        let session = Session::new_from_task(session_id.clone(), WorkflowStage::RESEARCH_TASK_ID);
        session.context.set(STATE_KEY, WorkflowState::new(query)).await;
        session
            .context
            .set(STAGE_KEY, WorkflowStage::Researching)
            .await;

        storage
            .save(session)
            .await
            .map_err(|err| CiteflowError::Workflow(format!("failed to persist session: {err}")))?;

        info!(%session_id, "workflow started");

        let mut completed = false;
        for step in 1..=MAX_RUNNER_STEPS {
            let result = runner
                .run(&session_id)
                .await
                .map_err(|err| CiteflowError::Workflow(format!("graph execution failure: {err}")))?;

            debug!(step, response = ?result.response, "runner step finished");

            match result.status {
                ExecutionStatus::Completed => {
                    completed = true;
                    break;
                }
                ExecutionStatus::Error(message) => return Err(CiteflowError::Workflow(message)),
                _ => continue,
            }
        }
        if !completed {
            return Err(CiteflowError::Workflow(format!(
                "workflow did not complete within {MAX_RUNNER_STEPS} steps"
            )));
        }

        let session = storage
            .get(&session_id)
            .await
            .map_err(|err| CiteflowError::Workflow(format!("failed to reload session: {err}")))?
            .ok_or_else(|| CiteflowError::Workflow("session missing after execution".into()))?;

        let stage: Option<WorkflowStage> = session.context.get(STAGE_KEY).await;
        if stage != Some(WorkflowStage::Done) {
            return Err(CiteflowError::StateViolation(format!(
                "workflow finished in stage {stage:?}"
            )));
        }

        let state: WorkflowState = session
            .context
            .get(STATE_KEY)
            .await
            .ok_or_else(|| CiteflowError::StateViolation("final state missing".into()))?;
        if state.drafted_answer().is_none() {
            return Err(CiteflowError::StateViolation(
                "workflow completed without a drafted answer".into(),
            ));
        }

        let trace: RunTrace = session.context.get(TRACE_KEY).await.unwrap_or_default();
        let elapsed = started.elapsed();

        info!(
            %session_id,
            research_items = state.research_data().len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "workflow completed"
        );

        Ok(RunReport {
            session_id,
            state,
            trace,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_serializes_in_snake_case() {
        let value = serde_json::to_value(WorkflowStage::Researching).unwrap();
        assert_eq!(value, serde_json::json!("researching"));
    }
}
