use std::sync::Arc;

use node_client::{AccessToken, EventStreamClient, JsonRpcClient, NodeConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::board::{Board, Cell, Digit, Position};
use crate::service::{GameService, HttpGameService};
use crate::session::{BattleContext, BattleSession, PlayerIdentity, PuzzleSource, SessionContext};
use crate::store::{BattleStore, StoredSession};
use crate::telemetry::logging;
use crate::terminal::cli::{Cli, Command, ContextCommand, PlayArgs};
use crate::terminal::error::CliError;
use crate::terminal::render;

pub async fn run(cli: Cli) -> Result<(), CliError> {
    let log_config = cli.logging.to_config();
    logging::init(&log_config).map_err(|err| CliError::Logging(err.to_string()))?;
    debug!(target: "battle::cli", log_level = ?log_config.level, log_file = ?log_config.file, "logging configured");

    let store = match &cli.store {
        Some(path) => BattleStore::at(path),
        None => BattleStore::open_default()?,
    };

    match &cli.command {
        Command::Context(ContextCommand::Show) => show_context(&store),
        Command::Context(ContextCommand::Clear) => {
            let mut stored = store.load()?;
            match stored.leave_battle() {
                Some(battle) => {
                    store.save(&stored)?;
                    println!("forgot battle {}", battle.battle_id);
                }
                None => println!("no stored battle"),
            }
            Ok(())
        }
        Command::Play(args) => play(&cli, args, &store).await,
    }
}

fn show_context(store: &BattleStore) -> Result<(), CliError> {
    let stored = store.load()?;
    println!("store:    {}", store.path().display());
    println!("node:     {}", stored.node_url.as_deref().unwrap_or("-"));
    println!("player:   {}", stored.principal.as_deref().unwrap_or("-"));
    if let Some(wallet) = &stored.wallet {
        println!("wallet:   {wallet}");
    }
    match &stored.battle {
        Some(battle) => {
            println!("battle:   {}", battle.battle_id);
            println!("context:  {}", battle.context_id);
            println!("identity: {}", battle.context_identity);
            println!("creator:  {}", battle.creator_identity);
        }
        None => println!("battle:   -"),
    }
    Ok(())
}

async fn play(cli: &Cli, args: &PlayArgs, store: &BattleStore) -> Result<(), CliError> {
    let mut stored = store.load()?;
    let service = Arc::new(HttpGameService::new(&cli.game_service)?);

    let node_url = cli
        .node_url
        .clone()
        .or_else(|| stored.node_url.clone())
        .ok_or(CliError::MissingNodeUrl)?;
    let token = cli
        .access_token
        .as_deref()
        .map(AccessToken::new)
        .or_else(|| stored.access_token());
    let node_config = NodeConfig::new(&node_url)?.with_access_token(token.clone());

    let battle = resolve_battle(args, &stored, service.as_ref()).await?;
    let principal = args.principal.clone().or_else(|| stored.principal.clone());
    let identity = principal.as_ref().map(|principal| {
        let identity = PlayerIdentity::new(principal, args.wallet.clone());
        match &args.display_name {
            Some(name) => identity.with_display_name(name),
            None => identity,
        }
    });
    if identity.is_none() {
        println!("no wallet principal; watching only (pass --principal to play)");
    }

    stored.node_url = Some(node_config.base_url().to_string());
    if let Some(token) = &token {
        stored.set_access_token(token);
    }
    stored.principal = principal;
    stored.wallet = Some(args.wallet.clone());
    stored.join_battle(battle.clone());
    store.save(&stored)?;

    let rpc = Arc::new(JsonRpcClient::new(node_config.clone())?);
    let events = if args.no_events {
        None
    } else {
        Some(Arc::new(EventStreamClient::new(node_config.ws_endpoint()?)))
    };
    let context = SessionContext::new(battle, identity);
    let mut session = BattleSession::new(context, args.sync.to_config(), rpc, events, service)
        .with_default_visibility(args.public);

    let source = match &args.puzzle {
        Some(text) => PuzzleSource::Given(text.parse::<Board>()?),
        None => PuzzleSource::Generate(args.difficulty),
    };
    session.prepare(source).await?;
    session.start_sync().await?;

    let notices = tokio::spawn(print_notices(session.game().subscribe()));
    let outcome = command_loop(&session).await;
    session.shutdown().await;
    notices.abort();
    outcome
}

async fn resolve_battle(
    args: &PlayArgs,
    stored: &StoredSession,
    service: &dyn GameService,
) -> Result<BattleContext, CliError> {
    let Some(battle_id) = args.battle_id else {
        return stored.battle.clone().ok_or(CliError::MissingBattle);
    };
    let previous = stored
        .battle
        .as_ref()
        .filter(|battle| battle.battle_id == battle_id);
    let context_id = args
        .context_id
        .clone()
        .or_else(|| previous.map(|battle| battle.context_id.clone()))
        .ok_or(CliError::MissingBattle)?;
    let context_identity = args
        .context_identity
        .clone()
        .or_else(|| previous.map(|battle| battle.context_identity.clone()))
        .ok_or(CliError::MissingBattle)?;
    let creator_identity = match &args.creator {
        Some(creator) => creator.clone(),
        None => service.battle_info(battle_id).await?.creator,
    };
    Ok(BattleContext {
        battle_id,
        context_id,
        context_identity,
        creator_identity,
    })
}

async fn print_notices(mut events: broadcast::Receiver<crate::game::GameEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(line) = render::notice(&event) {
                    println!("~ {line}");
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayCommand {
    Set(Position, Cell),
    Undo,
    Vote(bool),
    Hint,
    Submit(bool),
    Show,
    Help,
    Quit,
}

const HELP: &str = "commands: set <pos> <digit> | clear <pos> | undo | vote public|private | hint | submit public|private | show | quit\n<pos> is 0-80 or r<row>c<col> (1-based)";

/// Parses one input line. Positions are either a 0-80 index or `r3c7`.
pub fn parse_command(line: &str) -> Result<PlayCommand, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        ["set", pos, digit] => {
            let position = parse_position(pos)?;
            let digit = digit
                .parse::<u32>()
                .map_err(|_| format!("'{digit}' is not a digit"))
                .and_then(|value| Digit::new(value).map_err(|err| err.to_string()))?;
            Ok(PlayCommand::Set(position, Some(digit)))
        }
        ["clear", pos] => Ok(PlayCommand::Set(parse_position(pos)?, None)),
        ["undo"] => Ok(PlayCommand::Undo),
        ["vote", choice] => parse_visibility(choice).map(PlayCommand::Vote),
        ["submit", choice] => parse_visibility(choice).map(PlayCommand::Submit),
        ["hint"] => Ok(PlayCommand::Hint),
        ["show"] | [] => Ok(PlayCommand::Show),
        ["help"] | ["?"] => Ok(PlayCommand::Help),
        ["quit"] | ["exit"] => Ok(PlayCommand::Quit),
        _ => Err(format!("unknown command '{}'", line.trim())),
    }
}

fn parse_visibility(choice: &str) -> Result<bool, String> {
    match choice {
        "public" => Ok(true),
        "private" => Ok(false),
        other => Err(format!("expected public or private, got '{other}'")),
    }
}

fn parse_position(text: &str) -> Result<Position, String> {
    let index = match text.strip_prefix('r').and_then(|rest| rest.split_once('c')) {
        Some((row, col)) => {
            let row: u32 = row.parse().map_err(|_| format!("bad row in '{text}'"))?;
            let col: u32 = col.parse().map_err(|_| format!("bad column in '{text}'"))?;
            if !(1..=9).contains(&row) || !(1..=9).contains(&col) {
                return Err(format!("'{text}' is outside r1c1..r9c9"));
            }
            (row - 1) * 9 + (col - 1)
        }
        None => text
            .parse::<u32>()
            .map_err(|_| format!("'{text}' is not a position"))?,
    };
    Position::new(index).map_err(|err| err.to_string())
}

async fn command_loop(session: &BattleSession) -> Result<(), CliError> {
    println!("{}", session.game().read(render::board));
    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("! {message}");
                continue;
            }
        };
        match command {
            PlayCommand::Set(position, value) => match session.edit(position, value).await {
                Ok(result) => println!("{}", render::edit_result(&result)),
                Err(err) => println!("! {err}"),
            },
            PlayCommand::Undo => match session.undo() {
                Ok(true) => println!("{}", session.game().read(render::board)),
                Ok(false) => println!("nothing to undo"),
                Err(err) => println!("! {err}"),
            },
            PlayCommand::Vote(public) => match session.vote(public).await {
                Ok(()) => println!("vote recorded"),
                Err(err) => println!("! {err}"),
            },
            PlayCommand::Hint => match session.hint() {
                Some((position, digit)) => println!(
                    "try {digit} at r{}c{} ({})",
                    position.row() + 1,
                    position.col() + 1,
                    position.index()
                ),
                None => println!("no hint available"),
            },
            PlayCommand::Submit(public) => match session.submit_solution(public).await {
                Ok(tx_hash) => println!("submitted: {tx_hash}"),
                Err(err) => println!("! {err}"),
            },
            PlayCommand::Show => println!("{}", session.game().read(render::board)),
            PlayCommand::Help => println!("{HELP}"),
            PlayCommand::Quit => break,
        }
    }
    info!(target: "battle::cli", "leaving battle");
    Ok(())
}
