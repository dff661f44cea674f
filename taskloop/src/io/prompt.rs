//! Prompt rendering for the loop agents and the code assistant.
//!
//! Templates mark each section with `<!-- section:KEY required|droppable -->`.
//! After rendering, sections are re-assembled within a byte budget: droppable
//! sections go first, then the last section is truncated.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::core::types::{Message, Role, Step};

const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const EXECUTOR_TEMPLATE: &str = include_str!("prompts/executor.md");
const REVIEWER_TEMPLATE: &str = include_str!("prompts/reviewer.md");
const ANALYZE_TEMPLATE: &str = include_str!("prompts/analyze.md");
const GENERATE_TEMPLATE: &str = include_str!("prompts/generate.md");
const TESTS_TEMPLATE: &str = include_str!("prompts/tests.md");
const REFACTOR_TEMPLATE: &str = include_str!("prompts/refactor.md");

/// Heading that identifies a planner request.
pub const PLANNER_CONTRACT: &str = "### Planner Contract";
/// Heading that identifies an executor request.
pub const EXECUTOR_CONTRACT: &str = "### Executor Contract";
/// Heading that identifies a reviewer request.
pub const REVIEWER_CONTRACT: &str = "### Reviewer Contract";
pub const ANALYSIS_CONTRACT: &str = "### Code Analysis Contract";
pub const GENERATION_CONTRACT: &str = "### Code Generation Contract";
pub const TEST_GENERATION_CONTRACT: &str = "### Test Generation Contract";
pub const REFACTORING_CONTRACT: &str = "### Refactoring Contract";

/// Drop order when a rendered prompt exceeds its budget.
const DROP_ORDER: [&str; 4] = ["history", "context", "constraints", "existing_code"];

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
        .expect("section marker regex should be valid")
});

/// Which agent a model request comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptRole {
    Planner,
    Executor,
    Reviewer,
    Analyst,
    Generator,
    TestWriter,
    Refactorer,
}

impl PromptRole {
    pub const ALL: [PromptRole; 7] = [
        PromptRole::Planner,
        PromptRole::Executor,
        PromptRole::Reviewer,
        PromptRole::Analyst,
        PromptRole::Generator,
        PromptRole::TestWriter,
        PromptRole::Refactorer,
    ];

    /// Identify the role from the contract heading of the first system message.
    pub fn detect(messages: &[Message]) -> Option<Self> {
        let system = messages
            .iter()
            .find(|m| m.role == Role::System)?;
        Self::ALL
            .into_iter()
            .find(|role| system.content.contains(role.contract()))
    }

    /// Heading that opens every prompt of this role.
    pub fn contract(self) -> &'static str {
        match self {
            PromptRole::Planner => PLANNER_CONTRACT,
            PromptRole::Executor => EXECUTOR_CONTRACT,
            PromptRole::Reviewer => REVIEWER_CONTRACT,
            PromptRole::Analyst => ANALYSIS_CONTRACT,
            PromptRole::Generator => GENERATION_CONTRACT,
            PromptRole::TestWriter => TEST_GENERATION_CONTRACT,
            PromptRole::Refactorer => REFACTORING_CONTRACT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PromptRole::Planner => "planner",
            PromptRole::Executor => "executor",
            PromptRole::Reviewer => "reviewer",
            PromptRole::Analyst => "analyst",
            PromptRole::Generator => "generator",
            PromptRole::TestWriter => "test_writer",
            PromptRole::Refactorer => "refactorer",
        }
    }
}

/// Name and description of a registered tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
}

/// Output of one tool call made for a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolRun {
    pub tool: String,
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct PlannerInput<'a> {
    pub task: &'a str,
    pub context: &'a BTreeMap<String, Value>,
    pub constraints: &'a [String],
    pub tools: Vec<ToolSummary>,
}

#[derive(Debug, Clone)]
pub struct ExecutorInput<'a> {
    pub task: &'a str,
    pub step: &'a Step,
    pub total: usize,
    /// Transcript so far, oldest first.
    pub history: &'a [Message],
    pub tool_runs: &'a [ToolRun],
}

#[derive(Debug, Clone)]
pub struct ReviewerInput<'a> {
    pub task: &'a str,
    pub step: &'a Step,
    pub total: usize,
    /// Trailing transcript window shown to the reviewer.
    pub recent: &'a [Message],
}

#[derive(Debug, Clone)]
pub struct AnalysisInput<'a> {
    pub language: &'a str,
    pub code: &'a str,
    pub context: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct GenerationInput<'a> {
    pub language: &'a str,
    pub description: &'a str,
    pub context: Option<&'a str>,
    pub existing_code: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct TestGenerationInput<'a> {
    pub language: &'a str,
    pub code: &'a str,
    pub framework: &'a str,
}

#[derive(Debug, Clone)]
pub struct RefactorInput<'a> {
    pub language: &'a str,
    pub code: &'a str,
    pub refactoring_type: &'a str,
}

/// Renders agent prompts within a byte budget.
#[derive(Debug)]
pub struct PromptBuilder {
    env: Environment<'static>,
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        let mut env = Environment::new();
        env.add_template("planner", PLANNER_TEMPLATE)
            .expect("planner template should be valid");
        env.add_template("executor", EXECUTOR_TEMPLATE)
            .expect("executor template should be valid");
        env.add_template("reviewer", REVIEWER_TEMPLATE)
            .expect("reviewer template should be valid");
        env.add_template("analyze", ANALYZE_TEMPLATE)
            .expect("analyze template should be valid");
        env.add_template("generate", GENERATE_TEMPLATE)
            .expect("generate template should be valid");
        env.add_template("tests", TESTS_TEMPLATE)
            .expect("tests template should be valid");
        env.add_template("refactor", REFACTOR_TEMPLATE)
            .expect("refactor template should be valid");
        Self { env, budget_bytes }
    }

    pub fn build_planner(&self, input: &PlannerInput<'_>) -> Result<String> {
        let context_json = if input.context.is_empty() {
            None
        } else {
            Some(serde_json::to_string_pretty(input.context).context("serialize task context")?)
        };
        let rendered = self
            .env
            .get_template("planner")?
            .render(context! {
                task => input.task.trim(),
                tools => &input.tools,
                context => context_json,
                constraints => input.constraints,
            })
            .context("render planner prompt")?;
        Ok(self.fit(&rendered))
    }

    pub fn build_executor(&self, input: &ExecutorInput<'_>) -> Result<String> {
        let rendered = self
            .env
            .get_template("executor")?
            .render(context! {
                task => input.task.trim(),
                step => input.step,
                total => input.total,
                history => input.history,
                tool_runs => input.tool_runs,
            })
            .context("render executor prompt")?;
        Ok(self.fit(&rendered))
    }

    pub fn build_reviewer(&self, input: &ReviewerInput<'_>) -> Result<String> {
        let rendered = self
            .env
            .get_template("reviewer")?
            .render(context! {
                task => input.task.trim(),
                step => input.step,
                total => input.total,
                recent => input.recent,
            })
            .context("render reviewer prompt")?;
        Ok(self.fit(&rendered))
    }

    pub fn build_analysis(&self, input: &AnalysisInput<'_>) -> Result<String> {
        let rendered = self
            .env
            .get_template("analyze")?
            .render(context! {
                language => input.language.trim(),
                code => input.code.trim_end(),
                context => non_blank(input.context),
            })
            .context("render analysis prompt")?;
        Ok(self.fit(&rendered))
    }

    pub fn build_generation(&self, input: &GenerationInput<'_>) -> Result<String> {
        let rendered = self
            .env
            .get_template("generate")?
            .render(context! {
                language => input.language.trim(),
                description => input.description.trim(),
                context => non_blank(input.context),
                existing_code => non_blank(input.existing_code),
            })
            .context("render generation prompt")?;
        Ok(self.fit(&rendered))
    }

    pub fn build_test_generation(&self, input: &TestGenerationInput<'_>) -> Result<String> {
        let rendered = self
            .env
            .get_template("tests")?
            .render(context! {
                language => input.language.trim(),
                code => input.code.trim_end(),
                framework => input.framework.trim(),
            })
            .context("render test generation prompt")?;
        Ok(self.fit(&rendered))
    }

    pub fn build_refactor(&self, input: &RefactorInput<'_>) -> Result<String> {
        let rendered = self
            .env
            .get_template("refactor")?
            .render(context! {
                language => input.language.trim(),
                code => input.code.trim_end(),
                refactoring_type => input.refactoring_type.trim(),
            })
            .context("render refactoring prompt")?;
        Ok(self.fit(&rendered))
    }

    fn fit(&self, rendered: &str) -> String {
        let mut sections = parse_sections(rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        render_sections(&sections)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim_end).filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    /// Section text including its heading, without the marker.
    content: String,
}

fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::with_capacity(markers.len());

    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let required = kind.as_str() == "required";
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |m| m.start());
        let content = rendered[whole.end()..end].trim().to_string();
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }

    sections
}

/// Joins sections in the rendered prompt.
const SECTION_SEPARATOR: &str = "\n\n";

/// Byte length of `render_sections(secs)`.
fn rendered_len(secs: &[ParsedSection]) -> usize {
    let content: usize = secs.iter().map(|s| s.content.len()).sum();
    content + SECTION_SEPARATOR.len() * secs.len().saturating_sub(1)
}

fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {

    for key in DROP_ORDER {
        if rendered_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    if rendered_len(sections) <= budget {
        return;
    }
    let Some((_, others)) = sections.split_last() else {
        return;
    };
    let other_len = if others.is_empty() {
        0
    } else {
        rendered_len(others) + SECTION_SEPARATOR.len()
    };
    let allowed = budget.saturating_sub(other_len);
    if let Some(last) = sections.last_mut()
        && last.content.len() > allowed
    {
        let before_len = last.content.len();
        let marker = "\n[truncated]";
        let keep = if allowed > marker.len() {
            allowed - marker.len()
        } else {
            allowed
        };
        let mut cut = keep;
        while !last.content.is_char_boundary(cut) {
            cut -= 1;
        }
        last.content.truncate(cut);
        if allowed > marker.len() {
            last.content.push_str(marker);
        }
        debug!(
            section = last.key,
            before_len,
            after_len = last.content.len(),
            "truncated section for budget"
        );
    }
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step() -> Step {
        Step {
            step_number: 2,
            objective: "Read the README".to_string(),
            action: "Use read_file_tool".to_string(),
            tools_needed: vec!["read_file_tool".to_string()],
            expected_outcome: "README contents".to_string(),
            tool_inputs: Default::default(),
        }
    }

    fn tools() -> Vec<ToolSummary> {
        vec![ToolSummary {
            name: "read_file_tool".to_string(),
            description: "Read a file.".to_string(),
        }]
    }

    #[test]
    fn planner_prompt_has_sections_in_order() {
        let mut ctx = BTreeMap::new();
        ctx.insert("repo".to_string(), Value::String("demo".to_string()));
        let constraints = vec!["no network".to_string()];
        let prompt = PromptBuilder::new(10_000)
            .build_planner(&PlannerInput {
                task: "summarize the README",
                context: &ctx,
                constraints: &constraints,
                tools: tools(),
            })
            .expect("render");

        let contract = prompt.find(PLANNER_CONTRACT).expect("contract");
        let tools_pos = prompt.find("- read_file_tool: Read a file.").expect("tools");
        let task = prompt.find("<task>\nsummarize the README\n</task>").expect("task");
        let context_pos = prompt.find("\"repo\": \"demo\"").expect("context");
        let constraint = prompt.find("- no network").expect("constraints");
        assert!(contract < tools_pos && tools_pos < task);
        assert!(task < context_pos && context_pos < constraint);
        assert!(!prompt.contains("<!--"));
    }

    #[test]
    fn planner_prompt_omits_empty_optional_sections() {
        let prompt = PromptBuilder::new(10_000)
            .build_planner(&PlannerInput {
                task: "t",
                context: &BTreeMap::new(),
                constraints: &[],
                tools: tools(),
            })
            .expect("render");
        assert!(!prompt.contains("### Context"));
        assert!(!prompt.contains("### Constraints"));
    }

    #[test]
    fn executor_prompt_lists_tool_outputs() {
        let runs = vec![ToolRun {
            tool: "read_file_tool".to_string(),
            output: "# Demo".to_string(),
        }];
        let history = vec![Message::user("Execute step 2")];
        let prompt = PromptBuilder::new(10_000)
            .build_executor(&ExecutorInput {
                task: "t",
                step: &step(),
                total: 3,
                history: &history,
                tool_runs: &runs,
            })
            .expect("render");
        assert!(prompt.contains(EXECUTOR_CONTRACT));
        assert!(prompt.contains("Step 2 of 3"));
        assert!(prompt.contains("[user] Execute step 2"));
        assert!(prompt.contains("--- read_file_tool ---\n# Demo"));
    }

    #[test]
    fn executor_prompt_without_tools_says_so() {
        let prompt = PromptBuilder::new(10_000)
            .build_executor(&ExecutorInput {
                task: "t",
                step: &step(),
                total: 3,
                history: &[],
                tool_runs: &[],
            })
            .expect("render");
        assert!(prompt.contains("No tools ran for this step."));
        assert!(!prompt.contains("### Transcript"));
    }

    #[test]
    fn budget_drops_history_before_truncating_outputs() {
        let history = vec![Message::assistant("h".repeat(2_000))];
        let runs = vec![ToolRun {
            tool: "read_file_tool".to_string(),
            output: "x".repeat(400),
        }];
        let prompt = PromptBuilder::new(1_600)
            .build_executor(&ExecutorInput {
                task: "t",
                step: &step(),
                total: 3,
                history: &history,
                tool_runs: &runs,
            })
            .expect("render");
        assert!(!prompt.contains("### Transcript"));
        assert!(prompt.contains(EXECUTOR_CONTRACT));
        assert!(prompt.contains("--- read_file_tool ---"));
    }

    #[test]
    fn tight_budget_truncates_last_section() {
        let recent = vec![Message::assistant("y".repeat(5_000))];
        let prompt = PromptBuilder::new(1_500)
            .build_reviewer(&ReviewerInput {
                task: "t",
                step: &step(),
                total: 3,
                recent: &recent,
            })
            .expect("render");
        assert!(prompt.ends_with("[truncated]"));
        assert!(prompt.contains(REVIEWER_CONTRACT));
        assert!(prompt.len() <= 1_500, "{} bytes", prompt.len());
    }

    #[test]
    fn budget_counts_section_separators() {
        let section = |key: &str, len: usize| ParsedSection {
            key: key.to_string(),
            required: true,
            content: "a".repeat(len),
        };
        let mut sections = vec![section("contract", 10), section("task", 10), section("recent", 10)];

        // 30 content bytes plus two separators do not fit in 32.
        apply_budget_to_sections(&mut sections, 32);
        let rendered = render_sections(&sections);

        assert!(rendered.len() <= 32, "{} bytes", rendered.len());
        assert_eq!(rendered_len(&sections), rendered.len());
        assert_eq!(sections[2].content.len(), 8);
    }

    #[test]
    fn analysis_prompt_puts_code_last_and_drops_blank_context() {
        let prompt = PromptBuilder::new(10_000)
            .build_analysis(&AnalysisInput {
                language: "python",
                code: "def f():\n    return 1\n",
                context: Some("  "),
            })
            .expect("render");
        assert!(prompt.starts_with(ANALYSIS_CONTRACT));
        assert!(!prompt.contains("### Context"));
        assert!(prompt.ends_with("<code>\ndef f():\n    return 1\n</code>"), "{prompt}");
    }

    #[test]
    fn generation_prompt_drops_existing_code_over_budget() {
        let existing = "x = 1\n".repeat(400);
        let input = GenerationInput {
            language: "python",
            description: "a calculator",
            context: Some("used in a CLI"),
            existing_code: Some(&existing),
        };
        let full = PromptBuilder::new(10_000).build_generation(&input).expect("render");
        assert!(full.contains("<existing_code>"));
        assert!(full.contains("used in a CLI"));

        let fitted = PromptBuilder::new(1_000).build_generation(&input).expect("render");
        assert!(!fitted.contains("<existing_code>"));
        assert!(!fitted.contains("used in a CLI"));
        assert!(fitted.contains("<description>\na calculator\n</description>"));
    }

    #[test]
    fn test_and_refactor_prompts_name_their_goal() {
        let builder = PromptBuilder::new(10_000);
        let tests = builder
            .build_test_generation(&TestGenerationInput {
                language: "javascript",
                code: "export const add = (a, b) => a + b;",
                framework: "jest",
            })
            .expect("render");
        assert!(tests.contains("<framework>jest</framework>"));
        let refactor = builder
            .build_refactor(&RefactorInput {
                language: "go",
                code: "func f() {}",
                refactoring_type: "clean",
            })
            .expect("render");
        assert!(refactor.contains("<refactoring_type>clean</refactoring_type>"));
        for (prompt, role) in [(tests, PromptRole::TestWriter), (refactor, PromptRole::Refactorer)] {
            assert_eq!(PromptRole::detect(&[Message::system(prompt)]), Some(role));
        }
    }

    #[test]
    fn detect_role_from_system_message() {
        let prompt = PromptBuilder::new(10_000)
            .build_reviewer(&ReviewerInput {
                task: "t",
                step: &step(),
                total: 1,
                recent: &[],
            })
            .expect("render");
        let messages = vec![Message::system(prompt), Message::user("decide")];
        assert_eq!(PromptRole::detect(&messages), Some(PromptRole::Reviewer));
        assert_eq!(PromptRole::detect(&[Message::user("hi")]), None);
    }
}
