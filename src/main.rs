use alarm_notify::config::CONFIG_ENV_VAR;
use alarm_notify::daemon::{wait_for_shutdown_signal, Daemon};
use alarm_notify::indicator::{DesktopSession, EngineFactory, LogIndicator};
use alarm_notify::notify::{CommandAlert, NotifySendPresenter, RelayController, SerialRelay};
use alarm_notify::{build_info, Config, EngineSettings, EscalationEngine, Role};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "alarm-notify")]
#[command(author, version, about = "Alarm notifications for the detector control system", long_about = None)]
struct Cli {
    /// Log in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (defaults to $ALARMNOTIFICATIONSCONFIG, ~/.alarmnotifications.yaml, /etc/alarmnotifications.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server daemon (flashlight, e-mail and desktop notifications)
    Daemon,

    /// Run desktop notifications for the current user session
    Desktop {
        /// Play the configured alert command while alarms are pending
        #[arg(long)]
        alert: bool,
    },

    /// Switch the laboratory flashlight manually
    Relay {
        #[arg(value_enum)]
        state: RelayState,
    },

    /// Validate the configuration and print a summary
    Check,
}

#[derive(Clone, Copy, ValueEnum)]
enum RelayState {
    On,
    Off,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json);

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("alarm_notify=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Daemon => run_daemon(config).await,
        Commands::Desktop { alert } => run_desktop(config, alert).await,
        Commands::Relay { state } => switch_relay(&config, state),
        Commands::Check => {
            print_summary(&config);
            Ok(())
        }
    }
}

/// Explicitly named files must exist; the default locations fall back to
/// built-in defaults.
fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = Config::resolve_path(explicit);
    let named = explicit.is_some() || std::env::var_os(CONFIG_ENV_VAR).is_some();

    if !named && !path.is_file() {
        warn!("No configuration file found, using defaults");
        return Ok(Config::default());
    }

    info!("Loading configuration from {}", path.display());
    Config::from_file(&path).with_context(|| format!("Invalid configuration {}", path.display()))
}

fn log_startup(mode: &str) {
    info!(
        "alarm-notify v{} starting in {} mode (build {}, commit {})",
        alarm_notify::VERSION,
        mode,
        build_info::BUILD_TIMESTAMP.unwrap_or("unknown"),
        build_info::GIT_HASH.unwrap_or("unknown")
    );
}

async fn run_daemon(config: Config) -> Result<()> {
    log_startup("server");

    let settings = EngineSettings::from_config(&config, Role::Server);
    let mut builder = EscalationEngine::builder(settings)
        .desktop(Arc::new(NotifySendPresenter::new(config.desktop.command.clone())));

    if config.notifications.laboratory_timeout_secs > 0 {
        builder = builder.relay(Arc::new(SerialRelay::new(&config.flashlight.device_node)));
    }

    #[cfg(feature = "email")]
    if config.notifications.email_timeout_secs > 0 {
        builder = builder.mail(Arc::new(alarm_notify::notify::SmtpMailSender::new(config.email.clone())));
    }
    #[cfg(not(feature = "email"))]
    if config.notifications.email_timeout_secs > 0 {
        warn!("E-mail notifications configured but the email feature is disabled");
    }

    let engine = Arc::new(builder.build().context("Cannot create escalation engine")?);
    let daemon = Daemon::new(Arc::clone(&engine), Duration::from_secs(config.daemon.heartbeat_secs));
    let bus = spawn_bus_client(&config, engine, daemon.running_flag());

    let result = daemon.run().await;
    if let Some(bus) = bus {
        bus.abort();
    }
    result.context("Escalation engine failed")?;

    info!("Daemon stopped normally");
    Ok(())
}

async fn run_desktop(config: Config, alert: bool) -> Result<()> {
    log_startup("desktop");

    if alert && config.desktop.alert_command.is_empty() {
        bail!("--alert requires desktop.alert_command in the configuration");
    }

    let factory_config = config.clone();
    let factory: EngineFactory = Box::new(move || {
        let settings = EngineSettings::from_config(&factory_config, Role::Desktop);
        let mut builder = EscalationEngine::builder(settings)
            .desktop(Arc::new(NotifySendPresenter::new(factory_config.desktop.command.clone())));
        if alert {
            builder = builder.alert(Arc::new(CommandAlert::new(&factory_config.desktop.alert_command)?));
        }
        builder.build()
    });

    let session = Arc::new(DesktopSession::new(factory, Arc::new(LogIndicator)));
    session.enable().context("Cannot enable desktop notifications")?;

    let running = Arc::new(AtomicBool::new(true));
    let bus = spawn_bus_client(&config, session.clone(), Arc::clone(&running));

    let observer = {
        let session = Arc::clone(&session);
        let running = Arc::clone(&running);
        tokio::spawn(async move { session.observe(running).await })
    };

    let signal = wait_for_shutdown_signal().await.context("Cannot listen for shutdown signals")?;
    info!("Received {}, shutting down", signal);

    running.store(false, Ordering::SeqCst);
    if let Some(bus) = bus {
        bus.abort();
    }
    if let Err(e) = observer.await {
        warn!("Status observer failed: {}", e);
    }
    session.disable().await.context("Cannot stop desktop notifications")?;
    Ok(())
}

#[cfg(feature = "mqtt")]
fn spawn_bus_client(
    config: &Config,
    sink: Arc<dyn alarm_notify::AlarmSink>,
    running: Arc<AtomicBool>,
) -> Option<tokio::task::JoinHandle<()>> {
    use alarm_notify::bus::MqttBusClient;
    use alarm_notify::SystemClock;

    let client = MqttBusClient::new(config.bus.clone(), sink, Arc::new(SystemClock), running);
    Some(tokio::spawn(async move {
        if let Err(e) = client.run().await {
            error!("Alarm server bus client failed: {}", e);
        }
    }))
}

#[cfg(not(feature = "mqtt"))]
fn spawn_bus_client(
    _config: &Config,
    _sink: Arc<dyn alarm_notify::AlarmSink>,
    _running: Arc<AtomicBool>,
) -> Option<tokio::task::JoinHandle<()>> {
    warn!("Built without the mqtt feature, no alarms will be received");
    None
}

fn switch_relay(config: &Config, state: RelayState) -> Result<()> {
    if config.flashlight.device_node.is_empty() {
        bail!("flashlight.device_node is not configured");
    }
    let relay = SerialRelay::new(&config.flashlight.device_node);
    match state {
        RelayState::On => relay.switch_on(),
        RelayState::Off => relay.switch_off(),
    }
    .with_context(|| format!("Cannot switch relay at {}", config.flashlight.device_node))
}

fn print_summary(config: &Config) {
    let n = &config.notifications;
    let describe = |secs: u32| {
        if secs == 0 {
            "disabled".to_string()
        } else {
            format!("after {}s", secs)
        }
    };

    println!("Configuration OK");
    println!("  Laboratory notification: {}", describe(n.laboratory_timeout_secs));
    println!("  Desktop notification:    {}", describe(n.desktop_timeout_secs));
    println!("  E-mail notification:     {}", describe(n.email_timeout_secs));
    println!("  Poll interval:           {}ms", n.poll_interval_ms);
    println!(
        "  Alarm bus:               {}:{} topic {}",
        config.bus.broker_host, config.bus.broker_port, config.bus.topic
    );
    if n.laboratory_timeout_secs > 0 {
        println!("  Flashlight device:       {}", config.flashlight.device_node);
    }
    if n.email_timeout_secs > 0 {
        println!("  E-mail recipient:        {} via {}", config.email.to, config.email.server_name);
    }
}
