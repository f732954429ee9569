//! Command-line surface: argument definitions and command handlers.

use std::io::{self, Write};

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::{ConnectionOverrides, ProfileStore};
use crate::error::{ClientError, Result};
use crate::pager::{ScanOptions, DEFAULT_COUNT, DEFAULT_PATTERN};
use crate::render;
use crate::reply::Reply;
use crate::scan::{ScanRequest, ScanTarget, Scanner, Traversal};
use crate::session::{Connector, RedisConnector, Session};
use crate::transport::Transport;

/// Redis CLI with saved connection profiles and SCAN traversal
#[derive(Parser, Debug)]
#[command(name = "mzrds")]
#[command(version, about)]
#[command(disable_help_flag = true)]
pub struct Cli {
    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,

    /// Saved profile to connect with (defaults to the current profile)
    #[arg(short = 'U', long = "use", value_name = "PROFILE")]
    pub use_profile: Option<String>,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Log debug output to stderr
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Connection flags. Anything given here overrides the selected profile.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Server host
    #[arg(short = 'h', long)]
    pub host: Option<String>,

    /// Server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Password
    #[arg(short = 'a', long)]
    pub password: Option<String>,

    /// ACL username
    #[arg(long = "user")]
    pub username: Option<String>,

    /// Database index
    #[arg(short = 'n', long)]
    pub db: Option<u32>,

    /// Connection URI (takes precedence over host and port)
    #[arg(short = 'u', long)]
    pub uri: Option<String>,

    /// Connect over TLS
    #[arg(long, overrides_with = "no_tls")]
    pub tls: bool,

    #[arg(long, overrides_with = "tls", hide = true)]
    pub no_tls: bool,

    /// CA certificate file
    #[arg(long, value_name = "PATH")]
    pub cacert: Option<String>,

    /// Client certificate file
    #[arg(long, value_name = "PATH")]
    pub cert: Option<String>,

    /// Client private key file
    #[arg(long, value_name = "PATH")]
    pub key: Option<String>,

    /// Connect in cluster mode
    #[arg(long, overrides_with = "no_cluster")]
    pub cluster: bool,

    #[arg(long, overrides_with = "cluster", hide = true)]
    pub no_cluster: bool,
}

impl ConnectionArgs {
    pub fn overrides(&self) -> ConnectionOverrides {
        ConnectionOverrides {
            host: self.host.clone(),
            port: self.port,
            password: self.password.clone(),
            username: self.username.clone(),
            db: self.db,
            uri: self.uri.clone(),
            tls: switch(self.tls, self.no_tls),
            cacert: self.cacert.clone(),
            cert: self.cert.clone(),
            key: self.key.clone(),
            cluster: switch(self.cluster, self.no_cluster),
        }
    }
}

fn switch(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run any Redis command
    Exec(ExecArgs),
    /// Iterate over keys
    Scan(ScanArgs),
    /// Iterate over the fields of a hash
    Hscan(KeyScanArgs),
    /// Iterate over the members of a set
    Sscan(KeyScanArgs),
    /// Iterate over the members of a sorted set
    Zscan(ZscanArgs),
    /// Manage saved connection profiles
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Command name and arguments
    #[arg(
        value_name = "COMMAND",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// Glob pattern applied by the server
    #[arg(short, long, default_value = DEFAULT_PATTERN)]
    pub pattern: String,

    /// Page size hint
    #[arg(
        short,
        long,
        default_value_t = DEFAULT_COUNT as u64,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub count: u64,

    /// Cursor to fetch (ignored with --auto)
    #[arg(long, default_value_t = 0)]
    pub cursor: u64,

    /// Follow the cursor until the iteration is complete
    #[arg(long)]
    pub auto: bool,
}

impl ScanArgs {
    pub fn request(&self) -> ScanRequest {
        let count = usize::try_from(self.count).unwrap_or(usize::MAX);
        ScanRequest {
            options: ScanOptions::new(self.pattern.clone(), count),
            cursor: self.cursor,
            auto: self.auto,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct KeyScanArgs {
    /// Key to iterate over
    pub key: String,

    #[command(flatten)]
    pub scan: ScanArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ZscanArgs {
    /// Sorted set key
    pub key: String,

    #[command(flatten)]
    pub scan: ScanArgs,

    /// Show scores (default)
    #[arg(long, overrides_with = "no_scores")]
    pub scores: bool,

    /// Show members only
    #[arg(long, overrides_with = "scores")]
    pub no_scores: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// List saved profiles (* marks the current one)
    List,
    /// Save the connection flags of this invocation as a profile
    Save { name: String },
    /// Make a profile the default
    Use { name: String },
    /// Delete a profile
    Delete {
        name: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Show a profile (defaults to the current one)
    Show { name: Option<String> },
}

/// Yes/no questions put to the user.
pub trait Prompt {
    fn confirm(&mut self, message: &str) -> Result<bool>;
}

/// Asks on the terminal through `dialoguer`; the default answer is no.
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn confirm(&mut self, message: &str) -> Result<bool> {
        dialoguer::Confirm::new()
            .with_prompt(message)
            .default(false)
            .interact()
            .map_err(|e| ClientError::Io(io::Error::new(io::ErrorKind::Other, e)))
    }
}

/// Open a session against the default profile store and run one command
/// with output on stdout.
pub fn run(command: Command, use_profile: Option<&str>, connection: &ConnectionArgs) -> Result<()> {
    let store = ProfileStore::at_default_location()?;
    let mut session = Session::open(store, use_profile, &connection.overrides(), RedisConnector)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    dispatch(&mut session, command, &mut out, &mut TerminalPrompt)
}

pub fn dispatch<C, W, P>(
    session: &mut Session<C>,
    command: Command,
    out: &mut W,
    prompt: &mut P,
) -> Result<()>
where
    C: Connector,
    W: Write,
    P: Prompt + ?Sized,
{
    let (target, args) = match command {
        Command::Exec(args) => return exec(session, &args.command, out),
        Command::Config(cmd) => return config(session, cmd, out, prompt),
        Command::Scan(args) => (ScanTarget::Keyspace, args),
        Command::Hscan(args) => (ScanTarget::Hash(args.key), args.scan),
        Command::Sscan(args) => (ScanTarget::Set(args.key), args.scan),
        Command::Zscan(args) => {
            let target = ScanTarget::SortedSet {
                key: args.key,
                with_scores: !args.no_scores,
            };
            (target, args.scan)
        }
    };
    scan(session, target, args.request(), out)
}

/// Send `parts[0]` with the rest as arguments.
pub fn execute_raw<T: Transport + ?Sized>(transport: &mut T, parts: &[String]) -> Result<Reply> {
    let (name, args) = parts
        .split_first()
        .ok_or_else(|| ClientError::usage("exec needs at least one command word"))?;
    transport.send_command(name, args)
}

fn exec<C: Connector, W: Write>(
    session: &mut Session<C>,
    parts: &[String],
    out: &mut W,
) -> Result<()> {
    if parts.is_empty() {
        return Err(ClientError::usage("exec needs at least one command word"));
    }
    let reply = execute_raw(session.transport()?, parts)?;
    render::write_reply(out, &reply)?;
    Ok(())
}

fn scan<C: Connector, W: Write>(
    session: &mut Session<C>,
    target: ScanTarget,
    request: ScanRequest,
    out: &mut W,
) -> Result<()> {
    if target.key().is_some_and(str::is_empty) {
        return Err(ClientError::usage(format!("{} requires a key", target.label())));
    }
    let label = target.label();
    let scanner = Scanner::new(session.transport()?, target)?;
    match scanner.run(request)? {
        Traversal::Page(page) => render::write_page(out, label, &page.decode())?,
        Traversal::Stream(items) => {
            let written = render::write_stream(out, items)?;
            tracing::debug!(items = written, "traversal complete");
        }
    }
    Ok(())
}

fn config<C, W, P>(
    session: &Session<C>,
    command: ConfigCommand,
    out: &mut W,
    prompt: &mut P,
) -> Result<()>
where
    C: Connector,
    W: Write,
    P: Prompt + ?Sized,
{
    let store = session.store();
    match command {
        ConfigCommand::List => {
            let profiles = store.list()?;
            if profiles.is_empty() {
                writeln!(out, "No saved profiles.")?;
                return Ok(());
            }
            let current = store.current()?;
            for (name, options) in profiles {
                let is_current = current.as_deref() == Some(name.as_str());
                let marker = if is_current { "*" } else { " " };
                writeln!(
                    out,
                    "{} {} -> {}:{} (db={})",
                    marker, name, options.host, options.port, options.db
                )?;
            }
        }
        ConfigCommand::Save { name } => {
            store.save(&name, session.options())?;
            writeln!(out, "Profile {} saved.", name)?;
        }
        ConfigCommand::Use { name } => {
            store.set_current(&name)?;
            writeln!(out, "Switched to profile {}.", name)?;
        }
        ConfigCommand::Delete { name, force } => {
            if !store.exists(&name)? {
                return Err(ClientError::ProfileNotFound(name));
            }
            if !force && !prompt.confirm(&format!("Delete profile {}?", name))? {
                writeln!(out, "Cancelled.")?;
                return Ok(());
            }
            store.delete(&name)?;
            writeln!(out, "Profile {} deleted.", name)?;
        }
        ConfigCommand::Show { name } => {
            let target = match name {
                Some(name) => name,
                None => store.current()?.ok_or_else(no_current_profile)?,
            };
            let profile = store
                .get(&target)?
                .ok_or_else(|| ClientError::ProfileNotFound(target.clone()))?;
            writeln!(out, "[{}]", target)?;
            for (field, value) in profile.display_fields()? {
                writeln!(out, "{} = {}", field, value)?;
            }
        }
    }
    Ok(())
}

fn no_current_profile() -> ClientError {
    ClientError::usage(
        "no profile given and no current profile; run `config use <name>` first",
    )
}
