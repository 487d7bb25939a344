//! Campaign command handler.

use std::time::Duration;

use relaydesk_core::SessionController;

use crate::cli::{CampaignArgs, CampaignCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

pub async fn handle(
    session: &SessionController,
    args: CampaignArgs,
    global: &GlobalOpts,
    timeout: Duration,
) -> Result<(), CliError> {
    match args.command {
        CampaignCommand::Send {
            segment,
            title,
            body,
        } => {
            super::require_operator(session, "campaign send")?;
            super::within(timeout, "the client list", session.client_sync().loaded())
                .await?
                .ok_or_else(|| super::listener_ended(session, "clients"))?;

            let receipt = session
                .mutations()
                .send_campaign(&segment, &title, &body)
                .await?;

            if matches!(global.output, OutputFormat::Plain) {
                output::print_output(&receipt.campaign_id.to_string(), global.quiet);
            } else if !global.quiet {
                eprintln!(
                    "Campaign {} accepted for {} client(s) tagged '{segment}'",
                    receipt.campaign_id, receipt.recipients
                );
            }
            Ok(())
        }
    }
}
