//! Console chat client that lets a chat-completion model use the scoreboard's tools.

pub mod bridge;
pub mod completion;
pub mod console;
pub mod tool_client;
pub mod transcript;

pub use bridge::{ChatBridge, TurnPhase};
pub use completion::{AssistantReply, AzureCompletionClient, CompletionApi};
pub use console::run_console;
pub use tool_client::{BridgeMode, HttpToolClient, ToolTransport};
pub use transcript::{Message, Role, ToolCall, Transcript};
