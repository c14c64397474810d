use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use env_logger::{Target, WriteStyle};
use tokio::time;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use rest_reminder::{
    appsettings::AppSettings,
    audio::CommandSoundPlayer,
    notification::DesktopNotifier,
    reminder::ReminderSchedule,
    scheduling::{Clock, ReminderScheduler, SoundPlayer, SystemClock, next_trigger},
};

const COMMIT: &str = match option_env!("RTR_GIT_COMMIT") {
    Some(commit) => commit,
    None => "unknown",
};
const BUILD_DATE: &str = match option_env!("RTR_BUILD_DATE") {
    Some(date) => date,
    None => "unknown",
};

#[derive(Parser, Debug)]
#[command(
    name = "rest-reminder",
    version,
    about = "Reminds you to take regular breaks by playing a sound on a schedule"
)]
struct Cli {
    /// Settings file. Defaults to `appsettings.*` in the working directory.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Reminder interval, e.g. `30m` or `1h`.
    #[arg(short, long, global = true)]
    interval: Option<String>,

    /// Sound file handed to the configured sound command.
    #[arg(short, long, global = true)]
    sound: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run in the foreground until interrupted (default).
    Run,
    /// Validate the settings and show the effective schedule.
    Check,
    /// Print version information.
    Version,
}

impl Cli {
    fn settings(&self) -> anyhow::Result<AppSettings> {
        let mut settings =
            AppSettings::load(self.config.as_deref()).context("Failed to load settings")?;

        if let Some(interval) = &self.interval {
            settings.reminder.interval = interval.clone();
        }
        if let Some(sound) = &self.sound {
            settings.sound.file = Some(sound.clone());
        }

        Ok(settings)
    }

    fn log_filter(&self, settings: &AppSettings) -> String {
        if self.verbose {
            "debug".to_owned()
        } else {
            settings.logging.level.clone()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Run);

    if command == Command::Version {
        println!("{}", version_text());
        return Ok(());
    }

    let settings = cli.settings()?;
    init_logging(&cli.log_filter(&settings), settings.logging.file.as_deref())?;

    match command {
        Command::Check => check(&settings),
        _ => run(settings).await,
    }
}

/// Commit and build date are stamped in through `RTR_GIT_COMMIT` and
/// `RTR_BUILD_DATE` at compile time.
fn version_text() -> String {
    format!(
        "rest-reminder {}\n  Commit: {COMMIT}\n  Built: {BUILD_DATE}",
        env!("CARGO_PKG_VERSION")
    )
}

fn init_logging(default_filter: &str, file: Option<&Path>) -> anyhow::Result<()> {
    let mut builder = pretty_env_logger::formatted_timed_builder();
    match std::env::var("RUST_LOG") {
        Ok(filter) => builder.parse_filters(&filter),
        Err(_) => builder.parse_filters(default_filter),
    };

    if let Some(path) = file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        builder
            .write_style(WriteStyle::Never)
            .target(Target::Pipe(Box::new(file)));
    }

    builder.try_init().context("Failed to initialise logging")
}

async fn run(settings: AppSettings) -> anyhow::Result<()> {
    let clock = Arc::new(SystemClock::new(settings.reminder.timezone()?));
    let config = settings.reminder.reminder_config();

    log::info!(
        "Starting rest reminder. [version = {}, interval = {}, trigger_minutes = {:?}]",
        env!("CARGO_PKG_VERSION"),
        config.interval,
        config.trigger_minutes
    );
    if let Ok(schedule) = ReminderSchedule::from_config(&config)
        && let Some(next) = next_trigger(clock.now(), None, &schedule)
    {
        log::info!("Next reminder scheduled. [at = {next}]");
    }

    let player = Arc::new(CommandSoundPlayer::new(settings.sound.clone()));
    let notifier = Arc::new(DesktopNotifier::new(settings.notification.clone()));
    let scheduler = ReminderScheduler::new(config, player.clone(), notifier).with_clock(clock);

    let cancellation_token = CancellationToken::new();
    spawn_shutdown_listener(cancellation_token.clone());

    scheduler
        .run(cancellation_token)
        .await
        .context("Scheduler failed")?;

    drain(scheduler.dispatches(), settings.shutdown.grace_period()).await;
    player.stop();

    log::info!("Rest reminder stopped.");
    Ok(())
}

fn check(settings: &AppSettings) -> anyhow::Result<()> {
    let schedule = ReminderSchedule::from_config(&settings.reminder.reminder_config())?;
    let clock = SystemClock::new(settings.reminder.timezone()?);

    println!("Schedule: {schedule}");
    if let Some(next) = next_trigger(clock.now(), None, &schedule) {
        println!("Next reminder: {next}");
    }

    let sound = match (settings.sound.enabled, &settings.sound.command) {
        (false, _) => "disabled".to_owned(),
        (true, _) if settings.sound.volume <= 0.0 => "muted".to_owned(),
        (true, Some(command)) => format!(
            "via {command} at {}% volume",
            (settings.sound.volume.clamp(0.0, 1.0) * 100.0).round()
        ),
        (true, None) => "terminal bell".to_owned(),
    };
    println!("Sound: {sound}");
    println!(
        "Desktop notification: {}",
        if settings.notification.desktop { "enabled" } else { "disabled" }
    );

    Ok(())
}

/// Waits up to `grace_period` for reminders that are still playing.
async fn drain(dispatches: &TaskTracker, grace_period: Duration) {
    if grace_period.is_zero() || dispatches.is_empty() {
        return;
    }

    if time::timeout(grace_period, dispatches.wait()).await.is_err() {
        log::warn!(
            "Reminders still running after grace period. [in_flight = {}, grace_period = {:?}]",
            dispatches.len(),
            grace_period
        );
    }
}

fn spawn_shutdown_listener(cancellation_token: CancellationToken) {
    tokio::spawn(async move {
        let signal = shutdown_signal().await;
        log::info!("Received shutdown signal. [signal = {signal}]");
        cancellation_token.cancel();
    });
}

#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(error) => {
            log::warn!("Could not listen for SIGTERM. [error = {error}]");
            return ctrl_c().await;
        }
    };

    tokio::select! {
        signal = ctrl_c() => signal,
        _ = terminate.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    if let Err(error) = tokio::signal::ctrl_c().await {
        log::error!("Could not listen for Ctrl-C. [error = {error}]");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_run() {
        let cli = Cli::parse_from(["rest-reminder", "--interval", "45m"]);

        assert_eq!(cli.command, None);
        assert_eq!(cli.interval.as_deref(), Some("45m"));
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let cli = Cli::parse_from(["rest-reminder", "check", "-v", "-s", "bell.wav"]);

        assert_eq!(cli.command, Some(Command::Check));
        assert!(cli.verbose);
        assert_eq!(cli.sound, Some(PathBuf::from("bell.wav")));
    }

    #[test]
    fn version_includes_build_details() {
        let text = version_text();

        assert!(text.starts_with(&format!("rest-reminder {}", env!("CARGO_PKG_VERSION"))));
        assert!(text.contains("Commit: "));
        assert!(text.contains("Built: "));
    }

    #[test]
    fn verbose_raises_log_level() {
        let settings = AppSettings::default();
        let quiet = Cli::parse_from(["rest-reminder"]);
        let verbose = Cli::parse_from(["rest-reminder", "--verbose"]);

        assert_eq!(quiet.log_filter(&settings), "info");
        assert_eq!(verbose.log_filter(&settings), "debug");
    }
}
