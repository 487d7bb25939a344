//! Conversation command handlers.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::Tabled;

use relaydesk_core::{ChatMessage, MessageId, SessionController, TopicId};

use crate::cli::{ChatArgs, ChatCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

// ── Views ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct MessageView {
    id: String,
    sender_id: String,
    sender_name: String,
    text: String,
    sent_at: Option<DateTime<Utc>>,
    is_campaign: bool,
}

impl From<&Arc<ChatMessage>> for MessageView {
    fn from(m: &Arc<ChatMessage>) -> Self {
        Self {
            id: m.id.to_string(),
            sender_id: m.sender_id.to_string(),
            sender_name: m.sender_name.clone(),
            text: m.text.clone(),
            sent_at: m.sent_at.timestamp(),
            is_campaign: m.is_campaign,
        }
    }
}

#[derive(Tabled)]
struct MessageRow {
    #[tabled(rename = "Sent")]
    sent: String,
    #[tabled(rename = "From")]
    from: String,
    #[tabled(rename = "Text")]
    text: String,
}

impl From<&MessageView> for MessageRow {
    fn from(m: &MessageView) -> Self {
        Self {
            sent: sent_label(m.sent_at),
            from: m.sender_name.clone(),
            text: if m.is_campaign {
                format!("[campaign] {}", m.text)
            } else {
                m.text.clone()
            },
        }
    }
}

fn sent_label(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(
        || "pending".into(),
        |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

/// One line per message for `--follow`.
fn follow_line(format: &OutputFormat, m: &MessageView) -> Result<String, CliError> {
    match format {
        OutputFormat::Json | OutputFormat::JsonCompact => {
            serde_json::to_string(m).map_err(|e| CliError::Render(e.to_string()))
        }
        OutputFormat::Plain => Ok(m.id.clone()),
        OutputFormat::Table | OutputFormat::Yaml => Ok(format!(
            "{}  {}: {}",
            sent_label(m.sent_at),
            m.sender_name,
            m.text
        )),
    }
}

/// The last `limit` messages, or all of them.
fn tail_of(snap: &[Arc<ChatMessage>], limit: Option<usize>) -> &[Arc<ChatMessage>] {
    match limit {
        Some(n) if n < snap.len() => &snap[snap.len() - n..],
        _ => snap,
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    session: &SessionController,
    args: ChatArgs,
    global: &GlobalOpts,
    timeout: Duration,
) -> Result<(), CliError> {
    match args.command {
        ChatCommand::Tail {
            topic,
            limit,
            follow,
        } => {
            let topic = TopicId::from(topic.as_str());
            let mut feed = session.messages(&topic).await?;
            let sync = session
                .message_sync(&topic)
                .ok_or_else(|| super::listener_ended(session, "messages"))?;
            let snap = super::within(timeout, "the conversation", sync.loaded())
                .await?
                .ok_or_else(|| super::listener_ended(session, "messages"))?;

            let views: Vec<MessageView> = tail_of(&snap, limit).iter().map(MessageView::from).collect();
            let out = output::render_list(
                &global.output,
                &views,
                |m| MessageRow::from(m),
                |m| m.id.clone(),
            )?;
            output::print_output(&out, global.quiet);

            if follow {
                let mut seen: HashSet<MessageId> = snap
                    .iter()
                    .filter(|m| !m.sent_at.is_pending())
                    .map(|m| m.id.clone())
                    .collect();
                loop {
                    let next = tokio::select! {
                        next = feed.changed() => next,
                        _ = tokio::signal::ctrl_c() => None,
                    };
                    let Some(snap) = next else { break };
                    for m in snap.iter().filter(|m| !m.sent_at.is_pending()) {
                        if seen.insert(m.id.clone()) {
                            let line = follow_line(&global.output, &MessageView::from(m))?;
                            output::print_output(&line, global.quiet);
                        }
                    }
                }
            }
            session.close_messages(&topic).await;
            Ok(())
        }

        ChatCommand::Send { topic, text } => {
            let topic = TopicId::from(topic.as_str());
            let Some(outcome) = session.send_message(&topic, &text).await? else {
                if !global.quiet {
                    eprintln!("Nothing to send");
                }
                return Ok(());
            };
            if !outcome.summary_updated {
                eprintln!("Message stored, but the conversation summary was not updated");
            }
            if matches!(global.output, OutputFormat::Plain) {
                output::print_output(outcome.message_id.as_str(), global.quiet);
            } else if !global.quiet {
                eprintln!("Sent message {}", outcome.message_id);
            }
            Ok(())
        }
    }
}
