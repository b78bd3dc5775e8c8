use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::SyncConfig;
use crate::puzzle::Difficulty;
use crate::telemetry::logging::{LogConfig, LogLevel};
use crate::wallet::WalletType;

#[derive(Parser, Debug)]
#[command(
    name = "battle",
    about = "Play a sudoku battle against a Calimero node",
    author,
    version
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "BATTLE_NODE_URL",
        help = "Node base URL (defaults to the stored one)"
    )]
    pub node_url: Option<String>,

    #[arg(
        long,
        global = true,
        env = "BATTLE_ACCESS_TOKEN",
        hide_env_values = true,
        help = "Bearer token for the node's JSON-RPC and event endpoints"
    )]
    pub access_token: Option<String>,

    #[arg(
        long,
        global = true,
        env = "BATTLE_GAME_SERVICE",
        default_value = "http://127.0.0.1:8080/api/v1",
        help = "Game service base URL including its API prefix"
    )]
    pub game_service: String,

    #[arg(
        long = "store",
        global = true,
        env = "BATTLE_STORE",
        value_name = "PATH",
        help = "Session file (defaults to ~/.sudoku-battle/session)"
    )]
    pub store: Option<PathBuf>,

    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        env = "BATTLE_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        env = "BATTLE_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    #[arg(
        long = "poll-interval-ms",
        env = "BATTLE_POLL_INTERVAL_MS",
        default_value_t = 1000,
        help = "Interval between log polls"
    )]
    pub poll_interval_ms: u64,

    #[arg(
        long = "retry-attempts",
        env = "BATTLE_RETRY_ATTEMPTS",
        default_value_t = 5,
        help = "Attempts per poll before giving up until the next tick"
    )]
    pub retry_attempts: usize,

    #[arg(
        long = "retry-spacing-ms",
        env = "BATTLE_RETRY_SPACING_MS",
        default_value_t = 500,
        help = "Delay between poll attempts"
    )]
    pub retry_spacing_ms: u64,

    #[arg(
        long = "vote-wait-secs",
        env = "BATTLE_VOTE_WAIT_SECS",
        default_value_t = 30,
        help = "How long the creator waits for every visibility vote before submitting"
    )]
    pub vote_wait_secs: u64,
}

impl SyncArgs {
    pub fn to_config(&self) -> SyncConfig {
        SyncConfig::from_millis(
            self.poll_interval_ms,
            self.retry_attempts,
            self.retry_spacing_ms,
            self.vote_wait_secs,
        )
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Join (or resume) a battle and play it from this terminal
    Play(PlayArgs),
    /// Inspect or clear the stored battle
    #[command(subcommand)]
    Context(ContextCommand),
}

#[derive(Subcommand, Debug)]
pub enum ContextCommand {
    /// Print the stored battle and node
    Show,
    /// Forget the stored battle
    Clear,
}

#[derive(Args, Debug, Clone)]
pub struct PlayArgs {
    #[arg(
        long = "battle",
        env = "BATTLE_ID",
        value_name = "ID",
        help = "Battle to join; omit to resume the stored one"
    )]
    pub battle_id: Option<u64>,

    #[arg(long, env = "BATTLE_CONTEXT_ID", help = "Node context backing the battle")]
    pub context_id: Option<String>,

    #[arg(
        long,
        env = "BATTLE_CONTEXT_IDENTITY",
        help = "Executor public key of this player in the context"
    )]
    pub context_identity: Option<String>,

    #[arg(
        long,
        env = "BATTLE_CREATOR",
        help = "Principal of the battle creator (defaults to the game service's record)"
    )]
    pub creator: Option<String>,

    #[arg(long, env = "BATTLE_PRINCIPAL", help = "Wallet principal of this player")]
    pub principal: Option<String>,

    #[arg(long = "name", env = "BATTLE_PLAYER_NAME", help = "Display name sent with edits")]
    pub display_name: Option<String>,

    #[arg(
        long,
        env = "BATTLE_WALLET",
        default_value = "icp",
        help = "Wallet network: icp[:canister], eth[:chain], near[:network], starknet[:wallet]"
    )]
    pub wallet: WalletType,

    #[arg(
        long,
        value_enum,
        default_value_t = Difficulty::Medium,
        help = "Difficulty of the generated puzzle (creator only)"
    )]
    pub difficulty: Difficulty,

    #[arg(
        long,
        value_name = "CELLS",
        help = "Use this 81-cell puzzle instead of generating one (creator only, '.' or '0' for empty)"
    )]
    pub puzzle: Option<String>,

    #[arg(
        long = "public",
        action = clap::ArgAction::SetTrue,
        help = "Publish the solution when not every player voted in time"
    )]
    pub public: bool,

    #[arg(
        long = "no-events",
        action = clap::ArgAction::SetTrue,
        help = "Skip the event stream and rely on polling only"
    )]
    pub no_events: bool,

    #[command(flatten)]
    pub sync: SyncArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn play_args_parse() {
        let cli = Cli::try_parse_from([
            "battle",
            "--node-url",
            "localhost:2428",
            "play",
            "--battle",
            "7",
            "--wallet",
            "eth:5",
            "--difficulty",
            "hard",
            "--poll-interval-ms",
            "250",
        ])
        .unwrap();
        let Command::Play(args) = cli.command else {
            panic!("expected play");
        };
        assert_eq!(args.battle_id, Some(7));
        assert_eq!(args.wallet, WalletType::eth(Some(5)));
        assert_eq!(args.difficulty, Difficulty::Hard);
        assert_eq!(
            args.sync.to_config().poll_interval,
            std::time::Duration::from_millis(250)
        );
        assert_eq!(cli.node_url.as_deref(), Some("localhost:2428"));
    }
}
