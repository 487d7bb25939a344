//! Login and whoami handlers.

use relaydesk_core::{Profile, SessionController};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

fn signed_in(session: &SessionController) -> Result<Profile, CliError> {
    session.profile().ok_or_else(|| CliError::AuthFailed {
        message: "no profile after sign-in".into(),
    })
}

pub fn login(session: &SessionController, global: &GlobalOpts) -> Result<(), CliError> {
    let profile = signed_in(session)?;
    if !global.quiet {
        let role = output::role_label(profile.role, output::should_color(&global.color));
        eprintln!("Signed in as {} ({role})", profile.email);
    }
    Ok(())
}

pub fn whoami(session: &SessionController, global: &GlobalOpts) -> Result<(), CliError> {
    let profile = signed_in(session)?;
    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &profile,
        |p| {
            [
                format!("ID:        {}", p.id),
                format!("Email:     {}", p.email),
                format!("Name:      {}", p.display_name()),
                format!("Role:      {}", output::role_label(p.role, color)),
                format!(
                    "Push:      {}",
                    if p.push_token.is_some() { "registered" } else { "-" }
                ),
            ]
            .join("\n")
        },
        |p| p.id.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
