//! Tool registry - the fixed set of tools served over MCP.

use crate::error::ToolError;
use crate::mcp::{CallToolResult, Tool};
use serde_json::{Map, Value, json};

/// An executable tool. Handlers are read-only after startup.
pub trait ToolHandler: Send + Sync {
    fn descriptor(&self) -> Tool;

    /// Run the tool and return its structured data.
    fn call(&self, arguments: &Map<String, Value>) -> Result<Value, ToolError>;
}

struct Entry {
    tool: Tool,
    handler: Box<dyn ToolHandler>,
}

/// Ordered tool registry. Names are unique; registration order is list order.
#[derive(Default)]
pub struct Registry {
    entries: Vec<Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry served by `scoreboard serve`.
    pub fn builtin() -> Self {
        Self::new().with(GetUserDemo)
    }

    pub fn with(mut self, handler: impl ToolHandler + 'static) -> Self {
        self.register(handler);
        self
    }

    /// Register a handler. Returns true if it replaced one with the same name,
    /// keeping the original position.
    pub fn register(&mut self, handler: impl ToolHandler + 'static) -> bool {
        let tool = handler.descriptor();
        let entry = Entry {
            tool,
            handler: Box::new(handler),
        };
        match self.entries.iter_mut().find(|e| e.tool.name == entry.tool.name) {
            Some(existing) => {
                *existing = entry;
                true
            }
            None => {
                self.entries.push(entry);
                false
            }
        }
    }

    /// Tool descriptors in registration order
    pub fn list(&self) -> Vec<Tool> {
        self.entries.iter().map(|e| e.tool.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run a tool and wrap its data as a single JSON text block.
    pub fn call(
        &self,
        name: &str,
        arguments: Option<&Map<String, Value>>,
    ) -> Result<CallToolResult, ToolError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.tool.name == name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let empty = Map::new();
        let data = entry.handler.call(arguments.unwrap_or(&empty))?;
        let text = serde_json::to_string_pretty(&data).map_err(|e| ToolError::Failed {
            tool: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(CallToolResult::text(text))
    }
}

/// `get_user_demo`: canned profile data for exercising tool calls end to end.
pub struct GetUserDemo;

impl GetUserDemo {
    pub const NAME: &'static str = "get_user_demo";

    fn profile() -> Map<String, Value> {
        let mut profile = Map::new();
        profile.insert("id".into(), json!(1));
        profile.insert("username".into(), json!("demo_user"));
        profile.insert("name".into(), json!("Demo User"));
        profile.insert("email".into(), json!("demo.user@example.com"));
        profile.insert("status".into(), json!("active"));
        profile
    }

    fn details() -> Map<String, Value> {
        let mut details = Map::new();
        details.insert("createdAt".into(), json!("2024-01-15T10:30:00Z"));
        details.insert("lastLogin".into(), json!("2025-01-20T08:45:00Z"));
        details.insert("role".into(), json!("player"));
        details.insert(
            "preferences".into(),
            json!({"language": "es", "theme": "dark", "notifications": true}),
        );
        details.insert(
            "stats".into(),
            json!({"gamesPlayed": 42, "bestScore": 1250, "totalPlayTimeMinutes": 315}),
        );
        details
    }
}

impl ToolHandler for GetUserDemo {
    fn descriptor(&self) -> Tool {
        Tool {
            name: Self::NAME.to_string(),
            description: "Get demo user information. Returns a sample user profile, \
                          optionally with account details, preferences and game statistics."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "includeDetails": {
                        "type": "boolean",
                        "description": "Include timestamps, role, preferences and stats",
                        "default": true
                    }
                },
                "required": []
            }),
        }
    }

    fn call(&self, arguments: &Map<String, Value>) -> Result<Value, ToolError> {
        let include_details = match arguments.get("includeDetails") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                return Err(ToolError::InvalidArguments {
                    tool: Self::NAME.to_string(),
                    reason: format!("includeDetails must be a boolean, got {other}"),
                });
            }
        };

        let mut data = Self::profile();
        if include_details {
            data.extend(Self::details());
        }
        Ok(Value::Object(data))
    }
}
