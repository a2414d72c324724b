//! Top-level entry point: `Run(ctx, inputs) -> Result` (spec §4.1).
//!
//! Grounded on the teacher's `swarm_orchestrator::run` dual use of
//! `tracing` spans and `AuditLogService` events side by side at each phase
//! transition.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::domain::error::{VigilError, VigilResult};
use crate::domain::models::checkpoint::StepType;
use crate::domain::models::event::EventType;
use crate::domain::models::ids::StepId;
use crate::domain::models::result::RunResult;
use crate::domain::models::variables::{interpolate, VariableMap};
use crate::domain::models::workflow::{ConvergenceLimit, StepKind, Workflow};
use crate::domain::ports::human_input::HumanInputChannel;
use crate::domain::ports::model_provider::ProviderFactory;
use crate::domain::ports::security::AgentContext;
use crate::services::checkpoint_store::CheckpointStore;
use crate::services::context_builder::{CompletedGoal, PromptContext};
use crate::services::event_logger::SessionEventLogger;
use crate::services::goal_executor::{GoalExecutor, PhaseRequest};
use crate::services::sub_agent_spawner::{AgentTask, SpawnAgentTool, SubAgentSpawner};
use crate::services::tool_dispatcher::ToolDispatcher;

/// One goal invocation's result: its text output, whether its last EXECUTE
/// iteration made a tool call (LOOP's convergence signal, spec §4.1), and
/// the iteration count a converge goal reached if it exhausted its limit
/// without converging (spec §4.3).
struct GoalRunOutcome {
    output: String,
    tool_call_made: bool,
    failed_to_converge: Option<u32>,
}

pub struct WorkflowRunner {
    provider_factory: Arc<dyn ProviderFactory>,
    dispatcher: Arc<ToolDispatcher>,
    checkpoints: Arc<CheckpointStore>,
    events: Arc<SessionEventLogger>,
    human_input: Option<Arc<dyn HumanInputChannel>>,
    default_convergence_limit: i64,
}

impl WorkflowRunner {
    pub fn new(
        provider_factory: Arc<dyn ProviderFactory>,
        dispatcher: Arc<ToolDispatcher>,
        checkpoints: Arc<CheckpointStore>,
        events: Arc<SessionEventLogger>,
        human_input: Option<Arc<dyn HumanInputChannel>>,
    ) -> Self {
        Self {
            provider_factory,
            dispatcher,
            checkpoints,
            events,
            human_input,
            default_convergence_limit: 10,
        }
    }

    pub fn with_default_convergence_limit(mut self, limit: i64) -> Self {
        self.default_convergence_limit = limit;
        self
    }

    pub async fn run(&self, workflow: &Workflow, provided_inputs: BTreeMap<String, String>, cancel: CancellationToken) -> RunResult {
        match self.run_inner(workflow, provided_inputs, cancel).await {
            Ok(result) => result,
            Err(e) => RunResult::failed(e.to_string()),
        }
    }

    async fn run_inner(
        &self,
        workflow: &Workflow,
        provided_inputs: BTreeMap<String, String>,
        cancel: CancellationToken,
    ) -> VigilResult<RunResult> {
        self.preflight(workflow)?;
        let inputs = self.bind_inputs(workflow, provided_inputs)?;
        let mut outputs = VariableMap::new();
        let mut iteration_counts = BTreeMap::new();
        let mut failed_to_converge = BTreeMap::new();
        let mut completed_goals: Vec<CompletedGoal> = Vec::new();

        for step in &workflow.steps {
            match step.kind {
                StepKind::Run => {
                    for goal_name in &step.goals {
                        let outcome = self
                            .run_goal_once(workflow, goal_name, &inputs, &outputs, &completed_goals, None, &[], cancel.clone())
                            .await?;
                        iteration_counts.insert(goal_name.clone(), 1);
                        if let Some(reached) = outcome.failed_to_converge {
                            failed_to_converge.insert(goal_name.clone(), reached);
                        }
                        outputs.insert(goal_name.clone(), outcome.output.clone());
                        completed_goals.push(CompletedGoal { id: goal_name.clone(), output: outcome.output });
                    }
                }
                StepKind::Loop => {
                    let limit = step.loop_limit();
                    for goal_name in &step.goals {
                        let mut previous: Option<String> = None;
                        let mut iterations = 0u32;
                        let mut loop_history: Vec<(u32, String)> = Vec::new();
                        for i in 1..=limit {
                            iterations = i;
                            let outcome = self
                                .run_goal_once(workflow, goal_name, &inputs, &outputs, &completed_goals, Some(i), &loop_history, cancel.clone())
                                .await?;
                            if let Some(reached) = outcome.failed_to_converge {
                                failed_to_converge.insert(goal_name.clone(), reached);
                            }
                            let converged_by_text = previous.as_deref() == Some(outcome.output.trim());
                            let converged_by_silence = !outcome.tool_call_made;
                            outputs.insert(goal_name.clone(), outcome.output.clone());
                            previous = Some(outcome.output.trim().to_string());
                            loop_history.push((i, outcome.output));
                            if converged_by_text || converged_by_silence {
                                break;
                            }
                        }
                        iteration_counts.insert(goal_name.clone(), iterations);
                        let final_output = outputs.get(goal_name).unwrap_or_default().to_string();
                        completed_goals.push(CompletedGoal { id: goal_name.clone(), output: final_output });
                    }
                }
            }
        }

        let mut result = RunResult::complete(outputs, iteration_counts);
        result.failed_to_converge = failed_to_converge;
        info!(workflow = %workflow.name, "workflow run complete");
        Ok(result)
    }

    fn preflight(&self, workflow: &Workflow) -> VigilResult<()> {
        if self.human_input.is_none() {
            let human_required_goals: Vec<&str> =
                workflow.goals.iter().filter(|g| g.human_required).map(|g| g.name.as_str()).collect();
            if !human_required_goals.is_empty() {
                return Err(VigilError::Configuration(format!(
                    "goals require human input but no human-input channel is configured: {}",
                    human_required_goals.join(", ")
                )));
            }
        }
        Ok(())
    }

    fn bind_inputs(&self, workflow: &Workflow, provided: BTreeMap<String, String>) -> VigilResult<VariableMap> {
        let mut inputs = VariableMap::new();
        for decl in &workflow.inputs {
            if let Some(value) = provided.get(&decl.name) {
                inputs.insert(decl.name.clone(), value.clone());
            } else if let Some(default) = &decl.default {
                inputs.insert(decl.name.clone(), default.clone());
            } else {
                return Err(VigilError::Configuration(format!("missing required input `{}`", decl.name)));
            }
        }
        Ok(inputs)
    }

    fn resolve_convergence_limit(&self, workflow_inputs: &VariableMap, outputs: &VariableMap, limit: &Option<ConvergenceLimit>) -> VigilResult<u32> {
        let resolved = match limit {
            None => self.default_convergence_limit,
            Some(ConvergenceLimit::Literal(n)) => *n,
            Some(ConvergenceLimit::Variable(name)) => {
                let text = workflow_inputs
                    .get(name)
                    .or_else(|| outputs.get(name))
                    .ok_or_else(|| VigilError::Configuration(format!("convergence limit variable `{name}` is unbound")))?;
                text.parse::<i64>()
                    .map_err(|_| VigilError::Configuration(format!("convergence limit variable `{name}` is not an integer")))?
            }
        };
        if resolved <= 0 {
            return Err(VigilError::Configuration(format!("convergence limit must be positive, got {resolved}")));
        }
        Ok(resolved as u32)
    }

    /// Run one goal once: static `usingAgent` entries (if any) replace
    /// direct execution; otherwise the goal runs the four-phase machine
    /// directly, with a dynamic `spawn_agent` tool available to the model
    /// (spec §4.1, §4.5).
    async fn run_goal_once(
        &self,
        workflow: &Workflow,
        goal_name: &str,
        inputs: &VariableMap,
        outputs: &VariableMap,
        completed_goals: &[CompletedGoal],
        loop_iteration: Option<u32>,
        loop_history: &[(u32, String)],
        cancel: CancellationToken,
    ) -> VigilResult<GoalRunOutcome> {
        let goal = workflow
            .goal(goal_name)
            .ok_or_else(|| VigilError::Configuration(format!("unknown goal `{goal_name}`")))?;

        self.events
            .log(EventType::GoalStart, Some(goal_name.to_string()), None, None, None, None, None, serde_json::Value::Null)
            .await;

        let description = interpolate(&goal.outcome_template, inputs, outputs, |degradation| {
            tracing::warn!(goal = goal_name, %degradation, "unresolved variable in outcome template");
        });

        let agent_ctx = AgentContext { goal: goal_name.to_string(), agent_role: None };

        let outcome = if !goal.using_agent.is_empty() {
            let agents: Vec<_> = goal.using_agent.iter().filter_map(|name| workflow.agent(name).cloned()).collect();
            let spawner = Arc::new(SubAgentSpawner::new(
                self.provider_factory.clone(),
                self.dispatcher.clone(),
                self.checkpoints.clone(),
                self.events.clone(),
            ));
            let task = AgentTask {
                parent_goal: goal_name.to_string(),
                task: description,
                context: completed_goals.to_vec(),
                correction: None,
                supervised: goal.is_supervised(),
            };
            let output = spawner.run_agents(&agents, task, cancel).await?;
            GoalRunOutcome { output, tool_call_made: true, failed_to_converge: None }
        } else {
            let provider = self.provider_factory.get_provider(None);
            let mut registry = self.dispatcher.registry().clone();
            let spawner = Arc::new(SubAgentSpawner::new(
                self.provider_factory.clone(),
                self.dispatcher.clone(),
                self.checkpoints.clone(),
                self.events.clone(),
            ));
            registry.register(Arc::new(SpawnAgentTool::new(
                spawner,
                workflow.agents.clone(),
                goal_name.to_string(),
                completed_goals.to_vec(),
                goal.is_supervised(),
            )));
            let dispatcher_with_spawn = Arc::new(self.dispatcher.with_registry(registry));

            let prompt_ctx = PromptContext {
                workflow_name: workflow.name.clone(),
                completed_goals: completed_goals.to_vec(),
                loop_iterations: loop_history.to_vec(),
                current_goal_id: goal_name.to_string(),
                current_goal_loop: loop_iteration.map(|_| goal_name.to_string()),
                current_goal_iteration: loop_iteration,
                current_goal_description: description.clone(),
                ..Default::default()
            };

            let converge_limit = if goal.converge {
                Some(self.resolve_convergence_limit(inputs, outputs, &goal.convergence_limit)?)
            } else {
                None
            };

            let executor = GoalExecutor::new(
                provider,
                dispatcher_with_spawn.clone(),
                self.checkpoints.clone(),
                self.events.clone(),
                self.human_input.clone(),
            );
            let request = PhaseRequest {
                step_id: StepId::from_name(&format!("goal-{goal_name}")),
                step_type: StepType::Goal,
                instruction: description,
                system_prompt: None,
                tools: dispatcher_with_spawn.registry(),
                prompt_ctx,
                agent_ctx,
                supervised: goal.is_supervised(),
                human_required: goal.human_required,
                converge: converge_limit,
                subagent_name: None,
                structured_output_fields: goal.structured_output_fields.clone(),
            };
            let goal_outcome = executor.run(request, cancel).await?;
            GoalRunOutcome {
                output: goal_outcome.output,
                tool_call_made: goal_outcome.tool_call_made,
                failed_to_converge: goal_outcome.failed_to_converge,
            }
        };

        self.events
            .log(EventType::GoalEnd, Some(goal_name.to_string()), None, None, None, None, None, serde_json::Value::Null)
            .await;

        Ok(outcome)
    }
}
