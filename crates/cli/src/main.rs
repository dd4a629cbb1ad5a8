mod check_commands;

use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    anyhow::{Context, bail},
    clap::{Parser, Subcommand},
    switchboard_agents::ConfiguredAgents,
    switchboard_bridge::Switchboard,
    switchboard_channels::ChatTransport,
    switchboard_config::{SwitchboardConfig, validate::Severity},
    switchboard_telegram::{TelegramAccountConfig, TelegramBot},
    tokio::{sync::mpsc, task::JoinHandle},
    tracing::{error, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

/// Capacity of the queue between the poller and the dispatcher.
const INBOUND_QUEUE: usize = 256;

#[derive(Parser)]
#[command(name = "switchboard", about = "Switchboard: chat front door for long-running agents")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery in ./ and ~/.config/switchboard/).
    #[arg(long, short, global = true, env = "SWITCHBOARD_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect the bot and serve every configured channel (default).
    Run,
    /// Validate the config file and report agent readiness.
    Check,
    /// Send a question to a channel and print the first reply to it.
    ///
    /// Only replies to the question are handled; other messages are
    /// dropped. Polls with the same bot token as `run`, so never run both
    /// at once.
    Ask {
        /// Configured channel name; must have a `chat_id`.
        channel: String,
        question: String,
        /// Give up after this many seconds.
        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "switchboard starting");

    match cli.command {
        None | Some(Commands::Run) => {
            let config = load(cli.config)?;
            serve(config).await
        },
        Some(Commands::Check) => {
            let path = config_path(cli.config)?;
            check_commands::handle_check(&path)
        },
        Some(Commands::Ask {
            channel,
            question,
            timeout_secs,
        }) => {
            let config = load(cli.config)?;
            ask(config, &channel, &question, Duration::from_secs(timeout_secs)).await
        },
    }
}

fn config_path(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    explicit
        .or_else(switchboard_config::find_config_file)
        .context("no config file found (looked for ./switchboard.toml and the user config dir)")
}

/// Load and validate the config; any error-level diagnostic aborts.
fn load(explicit: Option<PathBuf>) -> anyhow::Result<SwitchboardConfig> {
    let path = config_path(explicit)?;
    let config = switchboard_config::load_config(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;

    let result = switchboard_config::validate::validate(&config);
    for d in &result.diagnostics {
        match d.severity {
            Severity::Error => error!(path = %d.path, category = d.category, "{}", d.message),
            Severity::Warning => warn!(path = %d.path, category = d.category, "{}", d.message),
            Severity::Info => info!(path = %d.path, category = d.category, "{}", d.message),
        }
    }
    if result.has_errors() {
        bail!(
            "{} has {} error(s); run `switchboard check` for details",
            path.display(),
            result.count(Severity::Error)
        );
    }
    info!(path = %path.display(), "config loaded");
    Ok(config)
}

/// What the dispatcher does with inbound messages.
#[derive(Clone, Copy)]
enum Mode {
    /// Run every message as a turn on its channel's session.
    Serve,
    /// Deliver replies to tracked messages and drop the rest.
    RepliesOnly,
}

struct Running {
    switchboard: Arc<Switchboard>,
    poller: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

async fn start(config: &SwitchboardConfig, mode: Mode) -> anyhow::Result<Running> {
    let account = TelegramAccountConfig::from_value(&config.telegram)?;
    let bot = TelegramBot::connect(account)
        .await
        .context("failed to connect telegram bot")?;

    let transport: Arc<dyn ChatTransport> = Arc::new(bot.transport());
    let factory = Arc::new(ConfiguredAgents::new(config.agents.clone()));
    let switchboard = Arc::new(Switchboard::new(config, transport, factory));

    let (inbound, rx) = mpsc::channel(INBOUND_QUEUE);
    // a polling conflict cancels this token and so stops the whole service
    let poller = bot.start_polling(inbound, switchboard.cancel_token().clone());
    let dispatcher = match mode {
        Mode::Serve => tokio::spawn(Arc::clone(&switchboard).run(rx)),
        Mode::RepliesOnly => tokio::spawn(Arc::clone(&switchboard).deliver_replies(rx)),
    };

    Ok(Running {
        switchboard,
        poller,
        dispatcher,
    })
}

impl Running {
    async fn stop(self) -> anyhow::Result<()> {
        self.switchboard.shutdown().await;
        self.poller.await?;
        self.dispatcher.await?;
        info!("switchboard stopped");
        Ok(())
    }
}

async fn serve(config: SwitchboardConfig) -> anyhow::Result<()> {
    let running = start(&config, Mode::Serve).await?;
    running.switchboard.announce().await;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("interrupt received");
        },
        () = running.switchboard.cancel_token().cancelled() => {
            warn!("service cancelled");
        },
    }

    running.stop().await
}

async fn ask(
    config: SwitchboardConfig,
    channel: &str,
    question: &str,
    timeout: Duration,
) -> anyhow::Result<()> {
    let running = start(&config, Mode::RepliesOnly).await?;
    let result = async {
        let channel = running.switchboard.open_channel(channel)?;
        channel.send(question).await?;
        let reply = tokio::select! {
            reply = channel.recv() => reply,
            () = tokio::time::sleep(timeout) => None,
            () = running.switchboard.cancel_token().cancelled() => {
                bail!("service cancelled before a reply arrived");
            },
            result = tokio::signal::ctrl_c() => {
                result?;
                None
            },
        };
        channel.close();
        anyhow::Ok(reply)
    }
    .await;

    running.stop().await?;
    match result? {
        Some(reply) => {
            println!("{reply}");
            Ok(())
        },
        None => bail!("no reply within {}s", timeout.as_secs()),
    }
}
