//! Conversation transcript in the chat-completion message format.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, exactly as the model produced them.
    #[serde(default)]
    pub arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// Ordered, append-only message history for one chat session.
///
/// Every `tool` message directly follows the `assistant` message that issued
/// its call id; [`Transcript::apply_tool_result`] is the only way to add one.
#[derive(Debug, Clone)]
pub struct Transcript {
    system_prompt: String,
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        let system_prompt = system_prompt.into();
        Self {
            messages: vec![Message::text(Role::System, system_prompt.clone())],
            system_prompt,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn apply_user_turn(&mut self, text: impl Into<String>) {
        self.messages.push(Message::text(Role::User, text));
    }

    pub fn apply_assistant_reply(&mut self, text: impl Into<String>) {
        self.messages.push(Message::text(Role::Assistant, text));
    }

    /// Record one invocation and its result as an adjacent assistant/tool pair.
    pub fn apply_tool_result(&mut self, call: ToolCall, result: impl Into<String>) {
        let call_id = call.id.clone();
        self.messages.push(Message {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(vec![call]),
            tool_call_id: None,
        });
        self.messages.push(Message {
            role: Role::Tool,
            content: Some(result.into()),
            tool_calls: None,
            tool_call_id: Some(call_id),
        });
    }

    /// Drop everything except a fresh system message.
    pub fn clear(&mut self) {
        self.messages = vec![Message::text(Role::System, self.system_prompt.clone())];
    }

    /// Whether each tool message answers a call made by the message before it.
    pub fn is_well_paired(&self) -> bool {
        self.messages.iter().enumerate().all(|(i, msg)| {
            if msg.role != Role::Tool {
                return true;
            }
            let Some(prev) = i.checked_sub(1).map(|p| &self.messages[p]) else {
                return false;
            };
            prev.role == Role::Assistant
                && prev
                    .tool_calls
                    .iter()
                    .flatten()
                    .any(|c| Some(&c.id) == msg.tool_call_id.as_ref())
        })
    }
}
