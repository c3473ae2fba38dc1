//! Turn loop relaying model tool calls to the scoreboard.

use super::completion::CompletionApi;
use super::tool_client::ToolTransport;
use super::transcript::{ToolCall, Transcript};
use crate::error::BridgeError;
use crate::mcp::FunctionTool;
use serde_json::{Map, Value, json};
use tracing::{debug, error, info, warn};

pub const SYSTEM_PROMPT: &str = "You are a helpful, friendly assistant. You can look up user \
information through the tools available to you; use them whenever the user asks for data they \
provide. Answer clearly and concisely, and explain what you found.";

/// Where the bridge is within a user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    AwaitingModel,
    ExecutingTools,
    AwaitingFinalModel,
}

pub struct ChatBridge<C, T> {
    completion: C,
    transport: T,
    transcript: Transcript,
    tools: Vec<FunctionTool>,
    phase: TurnPhase,
}

impl<C: CompletionApi, T: ToolTransport> ChatBridge<C, T> {
    pub fn new(completion: C, transport: T) -> Self {
        Self {
            completion,
            transport,
            transcript: Transcript::new(SYSTEM_PROMPT),
            tools: Vec::new(),
            phase: TurnPhase::Idle,
        }
    }

    /// Handshake and load the tool list. Returns the number of tools offered
    /// to the model; failures leave the session running without tools.
    pub async fn start(&mut self) -> usize {
        if let Err(e) = self.transport.initialize().await {
            warn!(error = %e, "Tool server handshake failed");
        }
        match self.transport.list_tools().await {
            Ok(tools) => {
                info!(count = tools.len(), "Loaded tools");
                self.tools = tools;
            }
            Err(e) => {
                warn!(error = %e, "Could not load tools, continuing without them");
                self.tools.clear();
            }
        }
        self.tools.len()
    }

    pub fn tools(&self) -> &[FunctionTool] {
        &self.tools
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn clear(&mut self) {
        self.transcript.clear();
    }

    /// Run one user turn and return the text to show. Never fails; model
    /// errors come back as a readable message and the session goes on.
    pub async fn turn(&mut self, input: &str) -> String {
        let outcome = self.run_turn(input).await;
        self.phase = TurnPhase::Idle;
        debug_assert!(self.transcript.is_well_paired());
        match outcome {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "Turn failed");
                format!("Error communicating with the model: {e}")
            }
        }
    }

    async fn run_turn(&mut self, input: &str) -> Result<String, BridgeError> {
        self.transcript.apply_user_turn(input);

        self.phase = TurnPhase::AwaitingModel;
        let reply = self
            .completion
            .complete(self.transcript.messages(), &self.tools)
            .await?;

        if reply.tool_calls.is_empty() {
            let text = reply.content.unwrap_or_default();
            self.transcript.apply_assistant_reply(text.clone());
            return Ok(text);
        }

        self.phase = TurnPhase::ExecutingTools;
        for call in reply.tool_calls {
            self.execute(call).await;
        }

        self.phase = TurnPhase::AwaitingFinalModel;
        let reply = self
            .completion
            .complete(self.transcript.messages(), &[])
            .await?;
        let text = reply.content.unwrap_or_default();
        self.transcript.apply_assistant_reply(text.clone());
        Ok(text)
    }

    async fn execute(&mut self, call: ToolCall) {
        let name = call.function.name.clone();
        info!(tool = %name, id = %call.id, "Model requested tool");

        let outcome = match parse_arguments(&call) {
            Ok(arguments) => {
                debug!(tool = %name, ?arguments, "Calling tool");
                self.transport.call_tool(&name, arguments).await
            }
            Err(e) => Err(e),
        };
        let content = match outcome {
            Ok(result) => result.to_string(),
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool call failed");
                error_payload(&e).to_string()
            }
        };
        self.transcript.apply_tool_result(call, content);
    }
}

/// Decode a call's argument string. Empty or `null` means no arguments.
fn parse_arguments(call: &ToolCall) -> Result<Map<String, Value>, BridgeError> {
    let raw = call.function.arguments.trim();
    if raw.is_empty() {
        return Ok(Map::new());
    }
    let malformed = |reason: String| BridgeError::MalformedToolArguments {
        tool: call.function.name.clone(),
        reason,
    };
    match serde_json::from_str::<Value>(raw).map_err(|e| malformed(e.to_string()))? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(malformed(format!("expected an object, got {other}"))),
    }
}

/// Tool-result payload reporting a failure. Server-side tool errors read the
/// same whichever surface produced them.
fn error_payload(err: &BridgeError) -> Value {
    let message = match err {
        BridgeError::Rpc(rpc) => rpc.message.clone(),
        BridgeError::ToolFailed(message) => message.clone(),
        other => other.to_string(),
    };
    json!({ "error": message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::completion::AssistantReply;
    use crate::chat::transcript::{Message, Role};
    use crate::mcp::{InitializeResult, RpcError};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Scripted {
        replies: Mutex<VecDeque<Result<AssistantReply, BridgeError>>>,
        seen: Mutex<Vec<(Vec<Message>, usize)>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<AssistantReply, BridgeError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::default(),
            }
        }
    }

    #[async_trait]
    impl CompletionApi for Scripted {
        async fn complete(
            &self,
            messages: &[Message],
            tools: &[FunctionTool],
        ) -> Result<AssistantReply, BridgeError> {
            self.seen
                .lock()
                .unwrap()
                .push((messages.to_vec(), tools.len()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(AssistantReply::text("(no script)")))
        }
    }

    /// Echoes arguments back; the tool named `broken` fails.
    #[derive(Default)]
    struct EchoTools {
        calls: Mutex<Vec<String>>,
        fail_listing: bool,
    }

    #[async_trait]
    impl ToolTransport for EchoTools {
        async fn initialize(&self) -> Result<Option<InitializeResult>, BridgeError> {
            Ok(None)
        }

        async fn list_tools(&self) -> Result<Vec<FunctionTool>, BridgeError> {
            if self.fail_listing {
                return Err(BridgeError::ToolFailed("down".into()));
            }
            let tool = crate::mcp::Tool {
                name: "echo".into(),
                description: "Echo".into(),
                input_schema: json!({"type": "object"}),
            };
            Ok(vec![FunctionTool::from(&tool)])
        }

        async fn call_tool(
            &self,
            name: &str,
            arguments: Map<String, Value>,
        ) -> Result<Value, BridgeError> {
            self.calls.lock().unwrap().push(name.to_string());
            if name == "broken" {
                return Err(BridgeError::Rpc(RpcError::invalid_params("Unknown tool: broken")));
            }
            Ok(json!({"echo": arguments}))
        }
    }

    fn call(id: &str, name: &str, args: &str) -> ToolCall {
        ToolCall::function(id, name, args)
    }

    #[tokio::test]
    async fn plain_reply_is_appended_and_returned() {
        let mut bridge = ChatBridge::new(
            Scripted::new(vec![Ok(AssistantReply::text("hello"))]),
            EchoTools::default(),
        );
        assert_eq!(bridge.start().await, 1);
        assert_eq!(bridge.turn("hi").await, "hello");

        let roles: Vec<_> = bridge.transcript().messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(bridge.phase(), TurnPhase::Idle);

        let seen = bridge.completion.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, 1);
    }

    #[tokio::test]
    async fn tool_calls_run_in_order_and_stay_paired() {
        let mut bridge = ChatBridge::new(
            Scripted::new(vec![
                Ok(AssistantReply::tool_calls(vec![
                    call("a", "echo", r#"{"n":1}"#),
                    call("b", "echo", r#"{"n":2}"#),
                ])),
                Ok(AssistantReply::text("done")),
            ]),
            EchoTools::default(),
        );
        bridge.start().await;
        assert_eq!(bridge.turn("go").await, "done");

        let msgs = bridge.transcript().messages();
        assert_eq!(msgs.len(), 7);
        assert_eq!(msgs[2].tool_calls.as_ref().unwrap()[0].id, "a");
        assert_eq!(msgs[3].tool_call_id.as_deref(), Some("a"));
        assert_eq!(msgs[3].content.as_deref(), Some(r#"{"echo":{"n":1}}"#));
        assert_eq!(msgs[4].tool_calls.as_ref().unwrap()[0].id, "b");
        assert_eq!(msgs[5].tool_call_id.as_deref(), Some("b"));
        assert_eq!(msgs[6].content.as_deref(), Some("done"));
        assert!(bridge.transcript().is_well_paired());

        let seen = bridge.completion.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].1, 0, "follow-up completion is sent without tools");
        assert_eq!(seen[1].0.len(), 6);
    }

    #[tokio::test]
    async fn malformed_arguments_become_error_payload() {
        let mut bridge = ChatBridge::new(
            Scripted::new(vec![
                Ok(AssistantReply::tool_calls(vec![call("a", "echo", "{not json")])),
                Ok(AssistantReply::text("sorry")),
            ]),
            EchoTools::default(),
        );
        assert_eq!(bridge.turn("go").await, "sorry");

        let tool_msg = &bridge.transcript().messages()[3];
        let payload: Value = serde_json::from_str(tool_msg.content.as_deref().unwrap()).unwrap();
        assert!(payload["error"].as_str().unwrap().contains("malformed arguments"));
        assert!(bridge.transport.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn tool_errors_keep_pairing() {
        let mut bridge = ChatBridge::new(
            Scripted::new(vec![
                Ok(AssistantReply::tool_calls(vec![
                    call("a", "broken", "{}"),
                    call("b", "echo", ""),
                ])),
                Ok(AssistantReply::text("partial")),
            ]),
            EchoTools::default(),
        );
        bridge.turn("go").await;

        let msgs = bridge.transcript().messages();
        assert_eq!(
            msgs[3].content.as_deref(),
            Some(r#"{"error":"Unknown tool: broken"}"#)
        );
        assert_eq!(msgs[5].content.as_deref(), Some(r#"{"echo":{}}"#));
        assert!(bridge.transcript().is_well_paired());
    }

    #[tokio::test]
    async fn completion_failure_is_reported_and_session_continues() {
        let mut bridge = ChatBridge::new(
            Scripted::new(vec![
                Err(BridgeError::EmptyCompletion),
                Ok(AssistantReply::text("back")),
            ]),
            EchoTools::default(),
        );
        let text = bridge.turn("one").await;
        assert!(text.starts_with("Error communicating with the model"));
        assert_eq!(bridge.phase(), TurnPhase::Idle);
        assert_eq!(bridge.turn("two").await, "back");
    }

    #[tokio::test]
    async fn tool_listing_failure_leaves_no_tools() {
        let mut bridge = ChatBridge::new(
            Scripted::new(vec![Ok(AssistantReply::text("ok"))]),
            EchoTools {
                fail_listing: true,
                ..Default::default()
            },
        );
        assert_eq!(bridge.start().await, 0);
        bridge.turn("hi").await;
        assert_eq!(bridge.completion.seen.lock().unwrap()[0].1, 0);
    }

    #[test]
    fn null_arguments_mean_empty() {
        assert!(parse_arguments(&call("a", "echo", "null")).unwrap().is_empty());
        assert!(parse_arguments(&call("a", "echo", "[1]")).is_err());
    }
}
