//! `cadence chat` — Interactive copilot session.
//!
//! REPL-style interface over the streaming chat session: each prompt is
//! reduced to completion, then the assistant message and tool activity are
//! printed.

use std::io::{self, BufRead, Write};

use cadence_core::models::chat::ToolCallStatus;
use cadence_core::state::EngineState;
use cadence_core::stream::ChatSession;

pub async fn run(state: &EngineState, organization_id: &str, persist: bool) -> Result<(), String> {
    let mut session = ChatSession::new(
        state.skill_client.clone(),
        state.message_store.clone(),
        organization_id,
        persist,
    );

    println!("Cadence Copilot");
    println!("══════════════════════════════════════");
    println!("Organization: {}", organization_id);
    println!("Conversation: {}", session.conversation_id());
    println!("Persistence : {}", if persist { "on" } else { "off" });
    println!("══════════════════════════════════════");
    println!();
    println!("Type your message and press Enter. Commands: /clear, /quit");
    println!();

    let stdin = io::stdin();
    print!("> ");
    io::stdout().flush().ok();

    for line in stdin.lock().lines() {
        let line = line.map_err(|e| format!("Failed to read input: {}", e))?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            print!("> ");
            io::stdout().flush().ok();
            continue;
        }

        match trimmed {
            "/quit" | "/exit" | "/q" => {
                println!("Goodbye!");
                break;
            }
            "/clear" => {
                session.clear_messages();
                println!("Conversation cleared.");
            }
            prompt => {
                let summary = session.send_message(prompt, serde_json::json!({})).await;

                if let Some(assistant) = session.state().current_message() {
                    for call in &assistant.tool_calls {
                        let marker = match call.status {
                            ToolCallStatus::Completed => "ok",
                            ToolCallStatus::Error => "error",
                            ToolCallStatus::Running => "…",
                        };
                        println!("  [tool] {} — {}", call.name, marker);
                    }
                    println!();
                    println!("{}", assistant.content);
                }

                if summary.aborted {
                    println!("(stopped)");
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}
