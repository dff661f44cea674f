//! Single-shot code assistance: analysis, generation, tests and refactoring.
//!
//! Each operation is one model call outside the task loop. Failures come back
//! as an unsuccessful `AssistResponse`, never as an `Err`.

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::core::parse::extract_json_object;
use crate::core::types::{
    CodeAnalysisRequest, CodeGenerationRequest, RefactoringRequest, TestGenerationRequest,
};
use crate::io::model::LanguageModel;
use crate::io::prompt::{
    AnalysisInput, GenerationInput, PromptBuilder, RefactorInput, TestGenerationInput,
};
use crate::response::AssistResponse;

use super::prompt_messages;

#[derive(Debug, Clone)]
pub struct AssistantAgent {
    prompt_budget_bytes: usize,
}

impl AssistantAgent {
    pub fn new(prompt_budget_bytes: usize) -> Self {
        Self {
            prompt_budget_bytes,
        }
    }

    #[instrument(skip_all, fields(language = %request.language, code_len = request.code.len()))]
    pub fn analyze_code<M: LanguageModel + ?Sized>(
        &self,
        model: &M,
        request: &CodeAnalysisRequest,
    ) -> AssistResponse {
        let reply = self.prompts().build_analysis(&AnalysisInput {
            language: &request.language,
            code: &request.code,
            context: request.context.as_deref(),
        });
        match reply.and_then(|prompt| ask(model, prompt, "Analyze this code thoroughly.")) {
            Ok(reply) => {
                info!("code analysis completed");
                AssistResponse::ok(
                    "Code analysis completed",
                    json!({"analysis": analysis_value(&reply)}),
                )
            }
            Err(err) => failure("Failed to analyze code", &err),
        }
    }

    #[instrument(skip_all, fields(language = %request.language))]
    pub fn generate_code<M: LanguageModel + ?Sized>(
        &self,
        model: &M,
        request: &CodeGenerationRequest,
    ) -> AssistResponse {
        let reply = self.prompts().build_generation(&GenerationInput {
            language: &request.language,
            description: &request.description,
            context: request.context.as_deref(),
            existing_code: request.existing_code.as_deref(),
        });
        match reply.and_then(|prompt| ask(model, prompt, "Generate the requested code.")) {
            Ok(code) => AssistResponse::ok(
                "Code generated successfully",
                json!({"generated_code": code}),
            ),
            Err(err) => failure("Failed to generate code", &err),
        }
    }

    #[instrument(skip_all, fields(language = %request.language))]
    pub fn generate_tests<M: LanguageModel + ?Sized>(
        &self,
        model: &M,
        request: &TestGenerationRequest,
    ) -> AssistResponse {
        let framework = request
            .test_framework
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| default_test_framework(&request.language));
        let reply = self.prompts().build_test_generation(&TestGenerationInput {
            language: &request.language,
            code: &request.code,
            framework,
        });
        match reply.and_then(|prompt| ask(model, prompt, "Generate comprehensive unit tests.")) {
            Ok(tests) => AssistResponse::ok(
                "Tests generated successfully",
                json!({"test_code": tests, "test_framework": framework}),
            ),
            Err(err) => failure("Failed to generate tests", &err),
        }
    }

    #[instrument(skip_all, fields(language = %request.language, goal = %request.refactoring_type))]
    pub fn refactor_code<M: LanguageModel + ?Sized>(
        &self,
        model: &M,
        request: &RefactoringRequest,
    ) -> AssistResponse {
        let reply = self.prompts().build_refactor(&RefactorInput {
            language: &request.language,
            code: &request.code,
            refactoring_type: &request.refactoring_type,
        });
        let directive = "Refactor this code according to the requested goal.";
        match reply.and_then(|prompt| ask(model, prompt, directive)) {
            Ok(code) => AssistResponse::ok(
                "Code refactored successfully",
                json!({"refactored_code": code, "refactoring_type": request.refactoring_type}),
            ),
            Err(err) => failure("Failed to refactor code", &err),
        }
    }

    fn prompts(&self) -> PromptBuilder {
        PromptBuilder::new(self.prompt_budget_bytes)
    }
}

/// Conventional unit-test framework for `language`; pytest when unknown.
pub fn default_test_framework(language: &str) -> &'static str {
    match language.trim().to_lowercase().as_str() {
        "javascript" | "typescript" => "jest",
        "java" => "junit",
        "csharp" | "c#" => "nunit",
        "go" => "testing",
        "rust" => "cargo test",
        _ => "pytest",
    }
}

fn ask<M: LanguageModel + ?Sized>(model: &M, prompt: String, directive: &str) -> Result<String> {
    let reply = model
        .invoke(&prompt_messages(prompt, directive))
        .context("assistant model call")?;
    Ok(reply.trim().to_string())
}

/// The reply's JSON object when it has one, the raw text otherwise.
fn analysis_value(reply: &str) -> Value {
    extract_json_object(reply)
        .and_then(|json| serde_json::from_str::<Value>(json).ok())
        .unwrap_or_else(|| Value::String(reply.to_string()))
}

fn failure(message: &str, err: &anyhow::Error) -> AssistResponse {
    warn!(err = %format!("{err:#}"), "{message}");
    AssistResponse::failed(message, format!("{err:#}"))
}
