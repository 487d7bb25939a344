//! CLI configuration: thin wrapper around `relaydesk_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--endpoint, --email, --password, --insecure, --timeout).

use std::io::IsTerminal;
use std::time::Duration;

use secrecy::SecretString;

use relaydesk_core::{ConnectionConfig, Credentials, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use relaydesk_config::{
    Config, config_path, load_config, profile_to_connection_config, save_config, store_password,
};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build the connection for this invocation: profile values first, then
/// CLI flag overrides. Without a profile, `--endpoint` is required.
pub fn resolve_connection(global: &GlobalOpts) -> Result<ConnectionConfig, CliError> {
    let cfg = load_config()?;
    let profile_name = active_profile_name(global, &cfg);

    let mut conn = match (cfg.profiles.get(&profile_name), global.endpoint.as_deref()) {
        (Some(profile), _) => profile_to_connection_config(profile, &profile_name, &cfg.defaults)?,
        (None, Some(endpoint)) => {
            let url = endpoint.parse::<url::Url>().map_err(|_| CliError::Validation {
                field: "endpoint".into(),
                reason: format!("invalid URL: {endpoint}"),
            })?;
            ConnectionConfig::new(url)
        }
        (None, None) if global.profile.is_some() => {
            let mut available: Vec<_> = cfg.profiles.keys().cloned().collect();
            available.sort();
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available.join(", "),
            });
        }
        (None, None) => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };

    if let Some(ref endpoint) = global.endpoint {
        conn.url = endpoint.parse::<url::Url>().map_err(|_| CliError::Validation {
            field: "endpoint".into(),
            reason: format!("invalid URL: {endpoint}"),
        })?;
    }
    if global.insecure {
        conn.tls = TlsVerification::DangerAcceptInvalid;
    }
    conn.timeout = Duration::from_secs(global.timeout);
    conn.credentials = Some(resolve_credentials(global, conn.credentials.take(), &profile_name)?);
    Ok(conn)
}

/// Flags override the profile; a missing password is prompted for when
/// stdin is a terminal.
fn resolve_credentials(
    global: &GlobalOpts,
    from_profile: Option<Credentials>,
    profile_name: &str,
) -> Result<Credentials, CliError> {
    let email = global
        .email
        .clone()
        .or_else(|| from_profile.as_ref().map(|c| c.email.clone()))
        .ok_or_else(|| CliError::NoCredentials {
            profile: profile_name.into(),
        })?;

    if let Some(ref pw) = global.password {
        return Ok(Credentials {
            email,
            password: SecretString::from(pw.clone()),
        });
    }
    if let Some(creds) = from_profile {
        return Ok(Credentials {
            email,
            password: creds.password,
        });
    }
    if std::io::stdin().is_terminal() {
        let pw = rpassword::prompt_password(format!("Password for {email}: "))?;
        return Ok(Credentials {
            email,
            password: SecretString::from(pw),
        });
    }
    Err(CliError::NoCredentials {
        profile: profile_name.into(),
    })
}
