//! The orchestration loop: ask the model which tool to run next, run it,
//! feed the result back, until the model signals completion or the
//! iteration ceiling is hit.

use serde_json::Value;
use tracing::{debug, info, warn};
use webpilot_core::{ChatMessage, Error, LLMResponse, Result};
use webpilot_providers::Provider;
use webpilot_tools::{ToolContext, ToolRegistry};

use crate::prompts::system_prompt;
use crate::scrubber::scrub;
use crate::transcript;

/// How a run ended.
#[derive(Debug)]
pub struct RunOutcome {
    /// Final answer: the task_complete summary, or the model's last message.
    pub summary: String,
    /// Provider rounds consumed.
    pub iterations: u32,
    /// False when the loop stopped at the iteration ceiling instead of an
    /// explicit completion. Not an error either way.
    pub completed: bool,
}

/// Owns one run: a provider, a tool catalog, and the shared tool context
/// (browser handle, config, completion signals).
pub struct AgentRunner {
    provider: Box<dyn Provider>,
    registry: ToolRegistry,
    ctx: ToolContext,
    use_mcp: bool,
}

impl AgentRunner {
    pub fn new(
        provider: Box<dyn Provider>,
        registry: ToolRegistry,
        ctx: ToolContext,
        use_mcp: bool,
    ) -> Self {
        Self {
            provider,
            registry,
            ctx,
            use_mcp,
        }
    }

    /// Drive the instruction to completion. Recoverable tool failures are
    /// reported into the transcript and the loop continues; only fatal
    /// errors (dead backend, exhausted provider retries) return `Err`.
    pub async fn run(&self, instruction: &str) -> Result<RunOutcome> {
        let agent = &self.ctx.config.agent;
        let max_iterations = agent.max_iterations;
        let tool_schemas = self.registry.get_tool_schemas();

        let mut messages = vec![
            ChatMessage::system(system_prompt(self.use_mcp)),
            ChatMessage::user(instruction),
        ];
        let mut last_content: Option<String> = None;

        info!(
            max_iterations,
            tools = self.registry.tool_names().len(),
            "Starting run"
        );

        for iteration in 0..max_iterations {
            transcript::trim(&mut messages, agent.max_history);

            let response = self.chat_with_retry(&messages, &tool_schemas).await?;
            debug!(
                iteration,
                tool_calls = response.tool_calls.len(),
                finish_reason = %response.finish_reason,
                "Model responded"
            );

            if let Some(content) = response.content.as_deref() {
                if !content.trim().is_empty() {
                    last_content = Some(content.to_string());
                }
            }

            messages.push(assistant_message(&response));

            if response.tool_calls.is_empty() {
                // A plain reply with nothing to execute is the answer.
                return Ok(RunOutcome {
                    summary: last_content
                        .unwrap_or_else(|| "The model ended the run without an answer.".into()),
                    iterations: iteration + 1,
                    completed: true,
                });
            }

            for call in &response.tool_calls {
                info!(tool = %call.name, "Executing tool");
                let text = match self
                    .registry
                    .execute(&call.name, self.ctx.clone(), call.arguments.clone())
                    .await
                {
                    Ok(result) => stringify_result(&result),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "Tool failed");
                        format!("Error: {}", e)
                    }
                };
                messages.push(ChatMessage::tool_result(&call.id, &scrub(&text)));
            }

            if self.ctx.signals.is_complete() {
                let summary = self
                    .ctx
                    .signals
                    .summary()
                    .or(last_content)
                    .unwrap_or_else(|| "Task complete.".into());
                info!(iterations = iteration + 1, "Run complete");
                return Ok(RunOutcome {
                    summary,
                    iterations: iteration + 1,
                    completed: true,
                });
            }
        }

        // Hitting the ceiling is a graceful stop, not a failure.
        info!(max_iterations, "Iteration limit reached");
        Ok(RunOutcome {
            summary: last_content.unwrap_or_else(|| {
                "Reached the iteration limit before the task was confirmed complete.".into()
            }),
            iterations: max_iterations,
            completed: false,
        })
    }

    /// Provider call with bounded retry on transient provider errors.
    async fn chat_with_retry(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> Result<LLMResponse> {
        let max_retries = self.ctx.config.agent.llm_max_retries;
        let mut delay =
            std::time::Duration::from_millis(self.ctx.config.agent.llm_retry_delay_ms);

        let mut attempt = 0;
        loop {
            match self.provider.chat(messages, tools).await {
                Ok(response) => return Ok(response),
                Err(Error::Provider(msg)) if attempt < max_retries => {
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries,
                        error = %msg,
                        "Provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn assistant_message(response: &LLMResponse) -> ChatMessage {
    let mut message = ChatMessage::assistant(response.content.as_deref().unwrap_or(""));
    if !response.tool_calls.is_empty() {
        message.tool_calls = Some(response.tool_calls.clone());
    }
    message
}

fn stringify_result(result: &Value) -> String {
    match result {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use webpilot_core::{Config, ToolCallRequest};
    use webpilot_tools::{Tool, ToolSchema};

    /// Replays a fixed sequence of responses; repeats the last one forever.
    struct ScriptedProvider {
        responses: Mutex<Vec<LLMResponse>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<LLMResponse>) -> Self {
            let mut reversed = responses;
            reversed.reverse();
            Self {
                responses: Mutex::new(reversed),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn chat(&self, _messages: &[ChatMessage], _tools: &[Value]) -> Result<LLMResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                Ok(responses.pop().unwrap())
            } else {
                Ok(responses.last().cloned().unwrap_or_default())
            }
        }
    }

    /// Always fails with a provider error.
    struct FailingProvider;

    #[async_trait]
    impl Provider for FailingProvider {
        async fn chat(&self, _messages: &[ChatMessage], _tools: &[Value]) -> Result<LLMResponse> {
            Err(Error::Provider("connection refused".into()))
        }
    }

    struct CountingTool {
        executions: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "probe",
                description: "counts executions",
                parameters: json!({"type": "object", "properties": {}}),
            }
        }

        fn validate(&self, _params: &Value) -> Result<()> {
            Ok(())
        }

        async fn execute(&self, _ctx: ToolContext, _params: Value) -> Result<Value> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"ok": true}))
        }
    }

    struct FlakyTool;

    #[async_trait]
    impl Tool for FlakyTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "flaky",
                description: "always fails recoverably",
                parameters: json!({"type": "object", "properties": {}}),
            }
        }

        fn validate(&self, _params: &Value) -> Result<()> {
            Ok(())
        }

        async fn execute(&self, _ctx: ToolContext, _params: Value) -> Result<Value> {
            Err(Error::NotFound("no such element".into()))
        }
    }

    fn call(name: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: format!("call_{}", name),
            name: name.to_string(),
            arguments: json!({}),
        }
    }

    fn tool_call_response(name: &str) -> LLMResponse {
        LLMResponse {
            tool_calls: vec![call(name)],
            finish_reason: "tool_calls".into(),
            ..Default::default()
        }
    }

    fn text_response(content: &str) -> LLMResponse {
        LLMResponse {
            content: Some(content.to_string()),
            finish_reason: "stop".into(),
            ..Default::default()
        }
    }

    fn test_config(max_iterations: u32) -> Config {
        let mut config = Config::default();
        config.agent.max_iterations = max_iterations;
        config.agent.llm_max_retries = 0;
        config.agent.llm_retry_delay_ms = 1;
        config
    }

    fn runner_with(
        provider: Box<dyn Provider>,
        registry: ToolRegistry,
        max_iterations: u32,
    ) -> AgentRunner {
        let ctx = ToolContext::new(PathBuf::from("/tmp"), test_config(max_iterations));
        AgentRunner::new(provider, registry, ctx, false)
    }

    #[tokio::test]
    async fn test_plain_reply_ends_run_with_zero_tool_executions() {
        let executions = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CountingTool {
            executions: executions.clone(),
        }));

        let provider = Box::new(ScriptedProvider::new(vec![text_response("the answer is 42")]));
        let runner = runner_with(provider, registry, 15);

        let outcome = runner.run("what is the answer").await.unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.summary, "the answer is 42");
        assert_eq!(outcome.iterations, 1);
        assert_eq!(executions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ceiling_bounds_provider_rounds() {
        let executions = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CountingTool {
            executions: executions.clone(),
        }));

        // Model never stops calling tools
        let provider = Box::new(ScriptedProvider::new(vec![tool_call_response("probe")]));
        let runner = runner_with(provider, registry, 5);

        let outcome = runner.run("loop forever").await.unwrap();
        assert!(!outcome.completed);
        assert_eq!(outcome.iterations, 5);
        assert_eq!(executions.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_recoverable_tool_error_continues_run() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FlakyTool));

        let provider = Box::new(ScriptedProvider::new(vec![
            tool_call_response("flaky"),
            text_response("gave up gracefully"),
        ]));
        let runner = runner_with(provider, registry, 15);

        let outcome = runner.run("click the thing").await.unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.summary, "gave up gracefully");
        assert_eq!(outcome.iterations, 2);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_not_fatal() {
        let registry = ToolRegistry::new();
        let provider = Box::new(ScriptedProvider::new(vec![
            tool_call_response("teleport"),
            text_response("no such tool, stopping"),
        ]));
        let runner = runner_with(provider, registry, 15);

        let outcome = runner.run("teleport home").await.unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.iterations, 2);
    }

    #[tokio::test]
    async fn test_task_complete_stops_loop_with_summary() {
        use webpilot_tools::control::TaskCompleteTool;

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(TaskCompleteTool));

        let mut response = LLMResponse::default();
        response.tool_calls = vec![ToolCallRequest {
            id: "call_done".into(),
            name: "task_complete".into(),
            arguments: json!({"summary": "booked the flight"}),
        }];
        let provider = Box::new(ScriptedProvider::new(vec![response]));
        let runner = runner_with(provider, registry, 15);

        let outcome = runner.run("book a flight").await.unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.summary, "booked the flight");
        assert_eq!(outcome.iterations, 1);
    }

    #[tokio::test]
    async fn test_provider_errors_surface_after_retries() {
        let runner = runner_with(Box::new(FailingProvider), ToolRegistry::new(), 15);
        let err = runner.run("anything").await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }
}
