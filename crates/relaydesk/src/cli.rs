//! Clap derive structures for the `relaydesk` CLI.
//!
//! Global flags, the command tree, and the output/color enums. Also
//! compiled by `build.rs` for man pages, so it only uses clap and clap_complete.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// relaydesk -- operator and customer messaging desk
#[derive(Debug, Parser)]
#[command(
    name = "relaydesk",
    version,
    about = "Work the relaydesk customer inbox from the command line",
    long_about = "Sign in to a relaydesk document store, browse and annotate clients,\n\
        follow and answer conversations, and hand campaigns to the fan-out service.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Store profile to use
    #[arg(long, short = 'p', env = "RELAYDESK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Store URL (overrides profile)
    #[arg(long, short = 'e', env = "RELAYDESK_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// Sign-in email (overrides profile)
    #[arg(long, env = "RELAYDESK_EMAIL", global = true)]
    pub email: Option<String>,

    /// Sign-in password
    #[arg(long, env = "RELAYDESK_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "RELAYDESK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Colorize output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Print errors only
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip TLS certificate verification
    #[arg(long, short = 'k', env = "RELAYDESK_INSECURE", global = true)]
    pub insecure: bool,

    /// Per-request timeout, in seconds
    #[arg(long, env = "RELAYDESK_TIMEOUT", default_value = "30", global = true)]
    pub timeout: u64,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Rounded table (default)
    Table,
    /// Pretty-printed JSON
    Json,
    /// JSON on one line
    JsonCompact,
    /// YAML
    Yaml,
    /// Ids only, one per line
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Color when stdout is a terminal and NO_COLOR is unset
    Auto,
    /// Always color
    Always,
    /// Never color
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in and report the resolved role
    Login,

    /// Show the signed-in profile
    Whoami,

    /// Browse and annotate clients (operators)
    #[command(alias = "cl")]
    Clients(ClientsArgs),

    /// Read and send conversation messages
    Chat(ChatArgs),

    /// Hand a campaign to the fan-out service (operators)
    Campaign(CampaignArgs),

    /// Inspect and edit profiles
    Config(ConfigArgs),

    /// Print a shell completion script
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CLIENTS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ClientsArgs {
    #[command(subcommand)]
    pub command: ClientsCommand,
}

#[derive(Debug, Subcommand)]
pub enum ClientsCommand {
    /// List clients
    #[command(alias = "ls")]
    List {
        /// Case-insensitive match on name or tag
        #[arg(long, short = 'f')]
        filter: Option<String>,
    },

    /// Show one client's details
    Show {
        /// Client ID
        client: String,
    },

    /// Replace a client's quick note
    Note {
        /// Client ID
        client: String,

        /// New note text (empty clears it)
        note: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CHAT
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ChatArgs {
    #[command(subcommand)]
    pub command: ChatCommand,
}

#[derive(Debug, Subcommand)]
pub enum ChatCommand {
    /// Print a conversation, oldest first
    Tail {
        /// Conversation (topic) ID
        topic: String,

        /// Only the last N messages
        #[arg(long, short = 'n')]
        limit: Option<usize>,

        /// Keep printing new messages until interrupted
        #[arg(long, short = 'f')]
        follow: bool,
    },

    /// Send a message as the signed-in user
    Send {
        /// Conversation (topic) ID
        topic: String,

        /// Message text
        text: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CAMPAIGN
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CampaignArgs {
    #[command(subcommand)]
    pub command: CampaignCommand,
}

#[derive(Debug, Subcommand)]
pub enum CampaignCommand {
    /// Send a campaign to every client carrying a tag
    Send {
        /// Segment tag (exact match)
        segment: String,

        /// Notification title
        #[arg(long, short = 't')]
        title: String,

        /// Message body
        #[arg(long, short = 'b')]
        body: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the configuration with passwords masked
    Show,

    /// Print the config file location
    Path,

    /// List profiles, marking the default
    Profiles,

    /// Make a profile the default
    Use {
        /// Profile name
        name: String,
    },

    /// Store the active profile's password in the system keyring
    SetPassword,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}
