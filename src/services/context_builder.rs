//! Renders the prompt as a structured, injection-escaped XML document
//! (spec §4.6).
//!
//! Every dynamic string is HTML-entity escaped before interpolation, using
//! the `html-escape` crate (grounded on the pack's `langchain-rust`
//! dependency on the same crate) rather than a hand-rolled replace chain,
//! so untrusted content cannot close a tag and inject a sibling element.

fn esc(s: &str) -> String {
    html_escape::encode_text(s).into_owned()
}

fn esc_attr(s: &str) -> String {
    html_escape::encode_double_quoted_attribute(s).into_owned()
}

/// One already-completed goal's output, rendered under `<context>`.
#[derive(Debug, Clone)]
pub struct CompletedGoal {
    pub id: String,
    pub output: String,
}

/// Everything needed to render the `<workflow>` prompt document for one
/// EXECUTE call (spec §4.6).
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub workflow_name: String,
    /// Completed goals shown under `<context>`, insertion order.
    pub completed_goals: Vec<CompletedGoal>,
    /// Prior LOOP iteration outputs shown directly under `<context>`.
    pub loop_iterations: Vec<(u32, String)>,
    /// Prior iteration outputs of the *current* converge loop.
    pub convergence_history: Vec<(u32, String)>,
    pub current_goal_id: String,
    pub current_goal_loop: Option<String>,
    pub current_goal_iteration: Option<u32>,
    pub current_goal_description: String,
    pub convergence_instruction: Option<String>,
    /// Supervisor correction text, present only on a REORIENT re-execution.
    pub correction: Option<String>,
}

/// Instruction appended when a converge goal's EXECUTE iteration begins
/// (spec §4.3).
pub const CONVERGENCE_INSTRUCTION: &str =
    "When further refinement would not meaningfully improve the result, output only the word CONVERGED.";

impl PromptContext {
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("<workflow name=\"{}\">\n", esc_attr(&self.workflow_name)));

        let has_context = !self.completed_goals.is_empty()
            || !self.loop_iterations.is_empty()
            || !self.convergence_history.is_empty();
        if has_context {
            out.push_str("  <context>\n");
            for goal in &self.completed_goals {
                out.push_str(&format!(
                    "    <goal id=\"{}\">{}</goal>\n",
                    esc_attr(&goal.id),
                    esc(&goal.output)
                ));
            }
            for (n, output) in &self.loop_iterations {
                out.push_str(&format!("    <iteration n=\"{n}\">{}</iteration>\n", esc(output)));
            }
            if !self.convergence_history.is_empty() {
                out.push_str("    <convergence-history>\n");
                for (n, output) in &self.convergence_history {
                    out.push_str(&format!(
                        "      <iteration n=\"{n}\">{}</iteration>\n",
                        esc(output)
                    ));
                }
                out.push_str("    </convergence-history>\n");
            }
            out.push_str("  </context>\n");
        }

        out.push_str("  <current-goal");
        out.push_str(&format!(" id=\"{}\"", esc_attr(&self.current_goal_id)));
        if let Some(loop_name) = &self.current_goal_loop {
            out.push_str(&format!(" loop=\"{}\"", esc_attr(loop_name)));
        }
        if let Some(iteration) = self.current_goal_iteration {
            out.push_str(&format!(" iteration=\"{iteration}\""));
        }
        out.push('>');
        out.push_str(&esc(&self.current_goal_description));
        out.push_str("</current-goal>\n");

        if let Some(instruction) = &self.convergence_instruction {
            out.push_str(&format!(
                "  <convergence-instruction>{}</convergence-instruction>\n",
                esc(instruction)
            ));
        }

        if let Some(correction) = &self.correction {
            out.push_str(&format!(
                "  <correction source=\"supervisor\">{}</correction>\n",
                esc(correction)
            ));
        }

        out.push_str("</workflow>");
        out
    }
}

/// The sub-agent envelope `<task role=… parent-goal=…>…</task>` with
/// optional nested `<context>` and `<correction>` (spec §4.6).
#[derive(Debug, Clone, Default)]
pub struct SubAgentEnvelope {
    pub role: String,
    pub parent_goal: String,
    pub task: String,
    pub context: Vec<CompletedGoal>,
    pub correction: Option<String>,
}

impl SubAgentEnvelope {
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "<task role=\"{}\" parent-goal=\"{}\">",
            esc_attr(&self.role),
            esc_attr(&self.parent_goal)
        ));
        out.push_str(&esc(&self.task));
        if !self.context.is_empty() {
            out.push_str("<context>");
            for goal in &self.context {
                out.push_str(&format!(
                    "<goal id=\"{}\">{}</goal>",
                    esc_attr(&goal.id),
                    esc(&goal.output)
                ));
            }
            out.push_str("</context>");
        }
        if let Some(correction) = &self.correction {
            out.push_str(&format!(
                "<correction source=\"supervisor\">{}</correction>",
                esc(correction)
            ));
        }
        out.push_str("</task>");
        out
    }
}
