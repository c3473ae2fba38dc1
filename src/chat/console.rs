//! Line-oriented console driving a [`ChatBridge`].

use super::bridge::ChatBridge;
use super::completion::CompletionApi;
use super::tool_client::ToolTransport;
use super::transcript::{Role, Transcript};
use crate::mcp::FunctionTool;
use std::fmt::Write as _;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Exit,
    Clear,
    History,
    Help,
}

fn parse_command(line: &str) -> Option<Command> {
    match line {
        "/exit" | "/quit" => Some(Command::Exit),
        "/clear" => Some(Command::Clear),
        "/history" => Some(Command::History),
        "/help" => Some(Command::Help),
        _ => None,
    }
}

/// Read lines from `input` until EOF or `/exit`, writing replies to `output`.
pub async fn run_console<C, T, R, W>(
    bridge: &mut ChatBridge<C, T>,
    mut input: R,
    mut output: W,
) -> std::io::Result<()>
where
    C: CompletionApi,
    T: ToolTransport,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output
        .write_all(render_welcome(bridge.tools()).as_bytes())
        .await?;

    let mut line = String::new();
    loop {
        output.write_all(b"\nyou> ").await?;
        output.flush().await?;

        line.clear();
        if input.read_line(&mut line).await? == 0 {
            break;
        }
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        let reply = match parse_command(text) {
            Some(Command::Exit) => {
                output.write_all(b"Goodbye!\n").await?;
                break;
            }
            Some(Command::Clear) => {
                bridge.clear();
                "History cleared.\n".to_string()
            }
            Some(Command::History) => render_history(bridge.transcript()),
            Some(Command::Help) => render_help(bridge.tools()),
            None => format!("assistant> {}\n", bridge.turn(text).await),
        };
        output.write_all(reply.as_bytes()).await?;
    }
    output.flush().await
}

fn render_welcome(tools: &[FunctionTool]) -> String {
    format!(
        "Scoreboard chat ({} tools available). Type /help for commands.\n",
        tools.len()
    )
}

pub fn render_help(tools: &[FunctionTool]) -> String {
    let mut out = String::from(
        "Commands:\n  /exit, /quit  leave the chat\n  /clear        reset the conversation\n  \
         /history      show the conversation\n  /help         show this help\n",
    );
    if tools.is_empty() {
        out.push_str("No tools available.\n");
    } else {
        out.push_str("Tools:\n");
        for tool in tools {
            let _ = writeln!(out, "  {}: {}", tool.function.name, tool.function.description);
        }
    }
    out
}

/// Every message except the system prompt, numbered from 1.
pub fn render_history(transcript: &Transcript) -> String {
    let mut out = String::new();
    let visible = transcript
        .messages()
        .iter()
        .filter(|m| m.role != Role::System);
    for (i, msg) in visible.enumerate() {
        let n = i + 1;
        let content = msg.content.as_deref().unwrap_or_default();
        let _ = match msg.role {
            Role::User => writeln!(out, "{n}. you: {content}"),
            Role::Assistant => match msg.tool_calls.as_deref() {
                Some([call, ..]) => writeln!(out, "{n}. [tool call: {}]", call.function.name),
                _ => writeln!(out, "{n}. assistant: {content}"),
            },
            Role::Tool => writeln!(out, "{n}. [tool result] {content}"),
            Role::System => Ok(()),
        };
    }
    if out.is_empty() {
        out.push_str("(empty)\n");
    }
    out
}
