//! Client command handlers.

use std::sync::Arc;
use std::time::Duration;

use tabled::Tabled;

use relaydesk_core::{ClientId, CustomerRecord, SessionController, project};

use crate::cli::{ClientsArgs, ClientsCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct ClientRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Email")]
    email: String,
    #[tabled(rename = "Tags")]
    tags: String,
    #[tabled(rename = "Score")]
    score: i64,
    #[tabled(rename = "Note")]
    note: String,
}

impl From<&Arc<CustomerRecord>> for ClientRow {
    fn from(c: &Arc<CustomerRecord>) -> Self {
        Self {
            id: c.id.to_string(),
            name: c.name.clone(),
            email: c.email.clone(),
            tags: join(&c.tags),
            score: c.score,
            note: truncate(&c.quick_note, 32),
        }
    }
}

fn join<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
    items.into_iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn detail(c: &Arc<CustomerRecord>) -> String {
    let mut lines = vec![
        format!("ID:        {}", c.id),
        format!("Name:      {}", c.name),
        format!("Email:     {}", if c.email.is_empty() { "-" } else { c.email.as_str() }),
        format!("Tags:      {}", join(&c.tags)),
        format!("Score:     {}", c.score),
    ];
    if !c.status_tags.is_empty() {
        lines.push(format!("Status:    {}", join(&c.status_tags)));
    }
    lines.push(format!(
        "Note:      {}",
        if c.quick_note.is_empty() { "-" } else { c.quick_note.as_str() }
    ));
    lines.join("\n")
}

fn not_found(identifier: String) -> CliError {
    CliError::NotFound {
        resource_type: "client".into(),
        identifier,
        list_command: "clients list".into(),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    session: &SessionController,
    args: ClientsArgs,
    global: &GlobalOpts,
    timeout: Duration,
) -> Result<(), CliError> {
    match args.command {
        ClientsCommand::List { filter } => {
            super::require_operator(session, "clients list")?;
            let snap = super::within(timeout, "the client list", session.client_sync().loaded())
                .await?
                .ok_or_else(|| super::listener_ended(session, "clients"))?;

            let shown = project(&snap, filter.as_deref().unwrap_or_default());
            let out = output::render_list(
                &global.output,
                &shown,
                |c| ClientRow::from(c),
                |c| c.id.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ClientsCommand::Show { client } => {
            let id = ClientId::from(client.as_str());
            if session.client_sync().is_active().await {
                super::within(timeout, "the client list", session.client_sync().loaded()).await?;
            }
            let record = session
                .select_client(&id)
                .await?
                .ok_or_else(|| not_found(client))?;
            let out = output::render_single(&global.output, &record, detail, |c| c.id.to_string())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ClientsCommand::Note { client, note } => {
            let id = ClientId::from(client.as_str());
            if session.select_client(&id).await?.is_none() {
                return Err(not_found(client));
            }
            session.mutations().save_quick_note(&id, &note).await?;
            if !global.quiet {
                if note.is_empty() {
                    eprintln!("Cleared note on {client}");
                } else {
                    eprintln!("Saved note on {client}");
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_notes_are_truncated_on_a_char_boundary() {
        assert_eq!(truncate("short", 32), "short");
        assert_eq!(truncate("ééééé", 3), "éé…");
    }
}
