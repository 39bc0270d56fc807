use std::env;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use config::{Config, Environment, File, FileFormat};
use log::{LevelFilter, debug, info};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};

use newsbot::{
    ApiClient, ChatController, ClientConfig, ConnectionMonitor, SocketTransport, Transport,
};

mod repl;

use repl::{Input, View};

const APP_NAME: &str = "newsbot";

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn async_chat(ctx: RuntimeContext, cmd: ChatCommand) -> Result<()> {
    handle_chat(&ctx, cmd).await
}

#[tokio::main]
async fn async_sessions(ctx: RuntimeContext, cmd: SessionsCommand) -> Result<()> {
    handle_sessions(&ctx, cmd).await
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging()?;
    debug!("config file: {}", ctx.config_file.display());

    match cli.command {
        Command::Chat(cmd) => async_chat(ctx, cmd),
        Command::Sessions(cmd) => async_sessions(ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Newsbot - terminal client for the RAG news chat backend.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Override the backend host (e.g. http://localhost:5000)
    #[arg(long, value_name = "URL", env = "NEWSBOT_BACKEND", global = true)]
    backend: Option<String>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Output machine readable JSON
    #[arg(long, global = true)]
    json: bool,
    /// Disable ANSI colors in output
    #[arg(long = "no-color", global = true, conflicts_with = "color")]
    no_color: bool,
    /// Control color output (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    color: ColorOption,
    /// Do not change anything on disk
    #[arg(long = "dry-run", global = true)]
    dry_run: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorOption {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Open an interactive chat session
    Chat(ChatCommand),
    /// List sessions known to the backend
    Sessions(SessionsCommand),
    /// Inspect and manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct ChatCommand {
    /// Resume an existing session instead of starting a fresh one
    #[arg(long, value_name = "ID")]
    session: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct SessionsCommand {
    /// Maximum number of sessions to list
    #[arg(short, long)]
    limit: Option<u32>,
    /// Number of sessions to skip
    #[arg(long, default_value = "0")]
    offset: u32,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Output the effective configuration
    Show,
    /// Print the resolved config file path
    Path,
    /// Regenerate the default configuration file
    Reset,
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    config_file: PathBuf,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let config_file = discover_config_file(common.config.clone())?;
        let mut config = load_or_init_config(&config_file, &common)?;
        if let Some(ref backend) = common.backend {
            config.client.backend_host = backend.clone();
        }
        Ok(Self {
            common,
            config_file,
            config,
        })
    }

    fn init_logging(&self) -> Result<()> {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        if self.common.quiet {
            log::set_max_level(LevelFilter::Off);
            return Ok(());
        }

        let level = match self.effective_log_level() {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        };

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("newsbot={level}")));

        // Logs go to stderr; stdout belongs to the conversation.
        if self.common.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
                .try_init()
                .ok();
        } else {
            let force_color = matches!(self.common.color, ColorOption::Always)
                || env::var_os("FORCE_COLOR").is_some();
            let disable_color = self.common.no_color
                || matches!(self.common.color, ColorOption::Never)
                || env::var_os("NO_COLOR").is_some()
                || (!force_color && !io::stderr().is_terminal());

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_ansi(!disable_color)
                        .with_target(false),
                )
                .try_init()
                .ok();
        }
        log::set_max_level(self.effective_log_level());

        Ok(())
    }

    fn effective_log_level(&self) -> LevelFilter {
        if self.common.trace {
            LevelFilter::Trace
        } else if self.common.debug {
            LevelFilter::Debug
        } else {
            match self.common.verbose {
                0 => self
                    .config
                    .logging
                    .level
                    .parse()
                    .unwrap_or(LevelFilter::Info),
                1 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }

    fn api_client(&self) -> Result<ApiClient> {
        let client = &self.config.client;
        ApiClient::new(
            client.api_base_url(),
            Duration::from_secs(client.http.timeout_secs),
        )
        .context("creating REST client")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct AppConfig {
    logging: LoggingConfig,
    #[serde(flatten)]
    client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct LoggingConfig {
    level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

async fn handle_chat(ctx: &RuntimeContext, cmd: ChatCommand) -> Result<()> {
    let config = &ctx.config.client;
    let transport: Arc<dyn Transport> = Arc::new(SocketTransport::new(config.reconnect.clone()));
    let api = Arc::new(ctx.api_client()?);

    let mut controller = ChatController::new(Arc::clone(&transport), api, config.chat.clone());
    let mut monitor = ConnectionMonitor::start(Arc::clone(&transport), config.socket_url());
    let mut connection = monitor.subscribe();

    if let Some(ref session) = cmd.session {
        controller.select_chat(session);
    }
    controller.refresh_sessions();

    info!("chatting with {}", config.backend_host);
    println!("{}", repl::HELP);

    let mut view = View::default();
    view.render(&controller).context("writing to terminal")?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                match Input::parse(&line) {
                    Input::Send(text) => {
                        if !controller.send(&text) {
                            println!("(still waiting for the previous answer)");
                        }
                    }
                    Input::New => controller.new_chat(),
                    Input::Switch(id) => {
                        controller.select_chat(&id);
                    }
                    Input::Delete(id) => controller.delete_chat(&id),
                    Input::Clear => controller.clear_session(),
                    Input::Sessions => repl::print_sessions(&controller),
                    Input::Topics => repl::print_topics(),
                    Input::Topic(n) => {
                        if let Some(query) = repl::topic_query(n) {
                            println!("> {query}");
                            if !controller.send(query) {
                                println!("(still waiting for the previous answer)");
                            }
                        }
                    }
                    Input::Refresh => controller.refresh_sessions(),
                    Input::Backup => controller.backup_session(),
                    Input::Reconnect => monitor.reconnect(),
                    Input::Status => {
                        println!(
                            "connection: {}\nsession: {}\nloading: {}",
                            repl::describe_connection(&monitor.state()),
                            controller.active_session(),
                            controller.is_loading()
                        );
                    }
                    Input::Help => println!("{}", repl::HELP),
                    Input::Quit => break,
                    Input::Empty => {}
                    Input::Invalid(text) => println!("unknown command: {text} (try /help)"),
                }
            }
            Some(update) = controller.next_update() => controller.apply(update),
            changed = connection.changed() => {
                if changed.is_ok() {
                    let state = connection.borrow_and_update().clone();
                    println!("-- {}", repl::describe_connection(&state));
                }
            }
        }
        view.render(&controller).context("writing to terminal")?;
    }

    drop(controller);
    monitor.close();
    Ok(())
}

async fn handle_sessions(ctx: &RuntimeContext, cmd: SessionsCommand) -> Result<()> {
    let api = ctx.api_client()?;
    let limit = cmd
        .limit
        .unwrap_or(ctx.config.client.chat.session_page_size);
    let response = api
        .list_sessions(limit, cmd.offset)
        .await
        .context("listing sessions")?;

    if ctx.common.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&response).context("serializing sessions to JSON")?
        );
        return Ok(());
    }
    for session in &response.sessions {
        println!(
            "{}  {}  ({} messages)",
            session.session_id,
            session.title.as_deref().unwrap_or(newsbot::chat::PLACEHOLDER_TITLE),
            session.message_count
        );
    }
    if let Some(total) = response.total {
        println!("{} of {} sessions", response.sessions.len(), total);
    }
    Ok(())
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            if ctx.common.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&ctx.config)
                        .context("serializing config to JSON")?
                );
            } else {
                println!(
                    "{}",
                    toml::to_string_pretty(&ctx.config).context("serializing config to TOML")?
                );
            }
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.config_file.display());
            Ok(())
        }
        ConfigCommand::Reset => {
            if ctx.common.dry_run {
                info!("dry-run: would reset config at {}", ctx.config_file.display());
                return Ok(());
            }
            write_default_config(&ctx.config_file)
        }
    }
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
    Ok(())
}

fn discover_config_file(override_path: Option<PathBuf>) -> Result<PathBuf> {
    let config_file = match override_path {
        Some(path) => {
            let expanded = expand_path(path)?;
            if expanded.is_dir() {
                expanded.join("config.toml")
            } else {
                expanded
            }
        }
        None => default_config_dir()?.join("config.toml"),
    };

    if config_file.parent().is_none() {
        return Err(anyhow!("invalid config file path: {config_file:?}"));
    }
    Ok(config_file)
}

fn load_or_init_config(config_file: &Path, common: &CommonOpts) -> Result<AppConfig> {
    if !config_file.exists() {
        if common.dry_run {
            info!(
                "dry-run: would create default config at {}",
                config_file.display()
            );
        } else {
            write_default_config(config_file)?;
        }
    }

    let defaults = ClientConfig::default();
    let built = Config::builder()
        .set_default("logging.level", "info")?
        .set_default("backend_host", defaults.backend_host)?
        .add_source(
            File::from(config_file)
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(
            Environment::with_prefix(env_prefix().as_str())
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    built
        .try_deserialize()
        .context("parsing configuration")
}

fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let config = AppConfig::default();
    let toml = toml::to_string_pretty(&config).context("serializing default config to TOML")?;
    let mut body = default_config_header(path);
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

fn default_config_header(path: &Path) -> String {
    let mut buffer = String::new();
    buffer.push_str("# Configuration for ");
    buffer.push_str(APP_NAME);
    buffer.push('\n');
    buffer.push_str("# File: ");
    buffer.push_str(&path.display().to_string());
    buffer.push('\n');
    buffer.push('\n');
    buffer
}

fn expand_path(path: PathBuf) -> Result<PathBuf> {
    if let Some(text) = path.to_str() {
        let expanded = shellexpand::full(text).context("expanding path")?;
        Ok(PathBuf::from(expanded.to_string()))
    } else {
        Ok(path)
    }
}

fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

fn env_prefix() -> String {
    APP_NAME.to_ascii_uppercase()
}
