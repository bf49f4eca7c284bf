use std::sync::Arc;

use async_trait::async_trait;
use graph_flow::{Context, GraphError, NextAction, Task, TaskResult};
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::prompt::drafting_prompt;
use crate::providers::{
    CompletionProvider, CompletionRequest, SearchDepth, SearchProvider, SearchRequest,
};
use crate::retry::{RetryPolicy, Sleeper, retry_with_backoff};
use crate::state::{ResearchItem, WorkflowState};
use crate::trace::RunTrace;
use crate::workflow::WorkflowStage;
use crate::{CiteflowError, ProviderError};

pub(crate) const STATE_KEY: &str = "workflow.state";
pub(crate) const STAGE_KEY: &str = "workflow.stage";
pub(crate) const TRACE_KEY: &str = "trace.events";

/// Answer used when the search produced nothing to draft from.
pub const NO_RESEARCH_FALLBACK: &str = "No relevant information was found for this query. \
Try rephrasing it or using broader search terms.";

/// Answer used when the language model could not produce a draft.
pub const DRAFT_ERROR_FALLBACK: &str = "The answer could not be generated because the \
language model service returned an error. Please try again later.";

/// Research stage: one search request, normalised into the state.
pub struct ResearchTask {
    search: Arc<dyn SearchProvider>,
    depth: SearchDepth,
    max_results: u32,
    truncation_length: usize,
}

impl ResearchTask {
    pub fn new(search: Arc<dyn SearchProvider>, config: &Config) -> Self {
        Self {
            search,
            depth: config.search.depth,
            max_results: config.search.max_results,
            truncation_length: config.research.content_truncation_length,
        }
    }

    /// Search failures are absorbed: the state receives an empty result set
    /// and an error line instead.
    pub async fn execute(&self, state: &mut WorkflowState) -> Result<(), CiteflowError> {
        let request = SearchRequest {
            query: state.query().to_string(),
            depth: self.depth,
            max_results: self.max_results,
        };

        match self.search.search(&request).await {
            Ok(results) => {
                let items: Vec<ResearchItem> = results
                    .into_iter()
                    .take(self.max_results as usize)
                    .map(|raw| ResearchItem::from_raw(raw, self.truncation_length))
                    .collect();

                info!(
                    provider = self.search.name(),
                    items = items.len(),
                    "research collected results"
                );

                let message = format!("Collected {} research items.", items.len());
                state.record_research(items, message)
            }
            Err(err) => {
                warn!(provider = self.search.name(), error = %err, "search failed");
                state.record_research(Vec::new(), format!("Error in research: {err}"))
            }
        }
    }
}

#[async_trait]
impl Task for ResearchTask {
    fn id(&self) -> &str {
        WorkflowStage::RESEARCH_TASK_ID
    }

    #[instrument(name = "task.research", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let mut state = load_state(&context).await?;
        self.execute(&mut state).await.map_err(task_failure)?;

        let summary = finish_stage(&context, self.id(), state, WorkflowStage::Drafting).await;

        Ok(TaskResult::new(
            Some(summary),
            NextAction::ContinueAndExecute,
        ))
    }
}

/// Drafting stage: prompt the model over the research data, with retries.
pub struct DraftTask {
    model: Arc<dyn CompletionProvider>,
    model_name: String,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl DraftTask {
    pub fn new(
        model: Arc<dyn CompletionProvider>,
        config: &Config,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            model,
            model_name: config.model.name.clone(),
            policy: config.retry_policy(),
            sleeper,
        }
    }

    /// Always leaves a drafted answer in the state: the model output, or one
    /// of the two fallback texts.
    pub async fn execute(&self, state: &mut WorkflowState) -> Result<(), CiteflowError> {
        if state.research_data().is_empty() {
            info!("no research data; skipping model call");
            return state.record_draft(
                NO_RESEARCH_FALLBACK,
                "No research data available; skipped drafting.",
            );
        }

        let request = CompletionRequest {
            model: self.model_name.clone(),
            prompt: drafting_prompt(state.query(), state.research_data()),
        };
        let request = &request;

        let outcome = retry_with_backoff(&self.policy, self.sleeper.as_ref(), |attempt| async move {
            debug!(attempt, provider = self.model.name(), "requesting draft");
            let text = self.model.complete(request).await?;
            if text.trim().is_empty() {
                return Err(ProviderError::EmptyCompletion);
            }
            Ok(text)
        })
        .await;

        match outcome {
            Ok(answer) => {
                info!(answer_chars = answer.len(), "draft completed");
                state.record_draft(answer, "Drafted answer completed.")
            }
            Err(failure) => {
                warn!(attempts = failure.attempts, error = %failure.error, "drafting failed");
                state.record_draft(DRAFT_ERROR_FALLBACK, format!("Error in drafting: {failure}"))
            }
        }
    }
}

#[async_trait]
impl Task for DraftTask {
    fn id(&self) -> &str {
        WorkflowStage::DRAFT_TASK_ID
    }

    #[instrument(name = "task.draft", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let mut state = load_state(&context).await?;
        self.execute(&mut state).await.map_err(task_failure)?;

        let summary = finish_stage(&context, self.id(), state, WorkflowStage::Done).await;

        Ok(TaskResult::new(Some(summary), NextAction::End))
    }
}

async fn load_state(context: &Context) -> graph_flow::Result<WorkflowState> {
    context
        .get::<WorkflowState>(STATE_KEY)
        .await
        .ok_or_else(|| {
            GraphError::TaskExecutionFailed("workflow state missing from session context".into())
        })
}

/// Persist the state, advance the stage marker and trace the summary line.
async fn finish_stage(
    context: &Context,
    task_id: &str,
    state: WorkflowState,
    next: WorkflowStage,
) -> String {
    let summary = state.messages().last().cloned().unwrap_or_default();

    let mut trace: RunTrace = context.get(TRACE_KEY).await.unwrap_or_default();
    trace.record(task_id, summary.clone());

    context.set(STATE_KEY, state).await;
    context.set(STAGE_KEY, next).await;
    context.set(TRACE_KEY, trace).await;

    summary
}

fn task_failure(err: CiteflowError) -> GraphError {
    GraphError::TaskExecutionFailed(err.to_string())
}
