//! CLI entrypoint and subcommand orchestration.

mod app;
mod config;
mod delayed;
mod prompt;
#[cfg(test)]
mod test_support;

use anyhow::Context;
use clap::{Parser, Subcommand};
use proto::{
    CalibrationReport, ConfigSource, ConnectivityState, Identity, PowerActor, PowerDynamicsReport,
    PowerLink, RiskAssessment, ScanRecord,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

#[cfg(not(test))]
use crate::app::App;
#[cfg(not(test))]
use crate::delayed::DelayedTask;
#[cfg(not(test))]
use backend::{SavedTo, SignInRequest};
#[cfg(not(test))]
use config::Config;
#[cfg(not(test))]
use std::time::Duration;
#[cfg(not(test))]
use tracing::{info, warn};
#[cfg(not(test))]
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Delay before asking for a new inference key after a failed probe.
#[cfg(not(test))]
const KEY_REPROMPT_DELAY: Duration = Duration::from_secs(1);

/// Top-level command-line arguments for the polaris application.
#[derive(Parser)]
#[command(name = "polaris")]
#[command(about = "Strategic risk console: backend config, diagnostics, and scans", version = "0.1.0")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Enable debug logging to ~/.polaris/logs/debug.log
    #[arg(long, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// CLI subcommands available in the application.
#[derive(Subcommand)]
enum Commands {
    /// Show or change the backend connection
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Probe the backend and the inference API
    Diagnose {
        /// Do not ask for a new inference key when the current one is rejected
        #[arg(long, default_value_t = false)]
        no_prompt: bool,
    },
    /// Session and inference key management
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Score a scenario on the three risk axes
    Scan {
        /// Free-text scenario
        scenario: String,

        /// Save the result to history
        #[arg(long, default_value_t = false)]
        save: bool,
    },
    /// List saved scans
    History {
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: u32,
    },
    /// Third-order ripple deduction for a global event
    Resonance {
        /// Event description
        event: String,

        /// Print the raw analysis as JSON (usable as a calibration prediction)
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Compare a ripple prediction with what actually happened
    Calibrate {
        /// Observed outcome
        #[arg(long)]
        reality: String,

        /// Event to predict afresh before calibrating
        #[arg(long, required_unless_present = "prediction", conflicts_with = "prediction")]
        event: Option<String>,

        /// Saved prediction from `resonance --json`
        #[arg(long)]
        prediction: Option<PathBuf>,
    },
    /// Instability and leverage points in an actor/relationship map
    Power {
        /// JSON file with `actors` and `relationships`
        map: PathBuf,
    },
}

/// Actor map read by `polaris power`.
#[derive(Debug, Deserialize)]
struct PowerMap {
    actors: Vec<PowerActor>,
    #[serde(default)]
    relationships: Vec<PowerLink>,
}

/// `config` sub-subcommands.
#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective backend configuration and where it came from
    Show,
    /// Save a backend endpoint and key, then probe it
    Set {
        /// Backend endpoint URL (https://...)
        #[arg(long)]
        url: Option<String>,

        /// Backend anon key
        #[arg(long)]
        key: Option<String>,
    },
    /// Remove the cached backend configuration
    Clear,
}

/// `auth` sub-subcommands.
#[derive(Subcommand)]
enum AuthCommands {
    /// Show who is signed in
    Status,
    /// Sign in with the backend (email/password) or the mocked identity provider
    Login {
        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        password: Option<String>,

        /// Use the mocked identity provider instead of the backend
        #[arg(long, default_value_t = false)]
        mock: bool,
    },
    /// Sign out. Always ends as guest.
    Logout,
    /// Continue without an account
    Guest,
    /// Save an inference API key, then probe it
    SetKey {
        /// API key (prompted when omitted)
        key: Option<String>,
    },
}

#[cfg(not(test))]
#[tokio::main]
/// Program entrypoint.
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    // WorkerGuard must outlive main() so buffered file writes are flushed on exit.
    let _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>;

    let debug_writer = if cli.debug {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let log_dir = std::path::PathBuf::from(home).join(".polaris").join("logs");
        std::fs::create_dir_all(&log_dir).ok();
        let appender = tracing_appender::rolling::daily(&log_dir, "debug.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        _file_guard = Some(guard);
        Some(writer)
    } else {
        _file_guard = None;
        None
    };

    match debug_writer {
        Some(writer) => {
            let console = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(console_filter);
            let file = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .with_filter(EnvFilter::new("debug,hyper_util=info,rustls=info,reqwest=info"));
            tracing_subscriber::registry()
                .with(console)
                .with(file)
                .init();
        }
        None => {
            fmt()
                .with_env_filter(console_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
    }

    if cli.debug {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            command = command_label(&cli.command),
            log_level = %cli.log_level,
            "========== polaris session start =========="
        );
    }

    let config = Config::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Failed to load config ({e}), using defaults");
        Config::default()
    });
    let app = App::open(config);

    match cli.command {
        Commands::Config { command } => match command {
            ConfigCommands::Show => cmd_config_show(&app),
            ConfigCommands::Set { url, key } => cmd_config_set(&app, url, key).await,
            ConfigCommands::Clear => cmd_config_clear(&app),
        },
        Commands::Diagnose { no_prompt } => cmd_diagnose(&app, no_prompt).await,
        Commands::Auth { command } => match command {
            AuthCommands::Status => cmd_auth_status(&app).await,
            AuthCommands::Login {
                email,
                password,
                mock,
            } => cmd_auth_login(&app, email, password, mock).await,
            AuthCommands::Logout => cmd_auth_logout(&app).await,
            AuthCommands::Guest => cmd_auth_guest(&app).await,
            AuthCommands::SetKey { key } => cmd_auth_set_key(&app, key).await,
        },
        Commands::Scan { scenario, save } => cmd_scan(&app, scenario, save).await,
        Commands::History { limit } => cmd_history(&app, limit).await,
        Commands::Resonance { event, json } => cmd_resonance(&app, event, json).await,
        Commands::Calibrate {
            reality,
            event,
            prediction,
        } => cmd_calibrate(&app, reality, event, prediction).await,
        Commands::Power { map } => cmd_power(&app, &map).await,
    }
}

#[cfg(not(test))]
fn command_label(command: &Commands) -> &'static str {
    match command {
        Commands::Config { .. } => "config",
        Commands::Diagnose { .. } => "diagnose",
        Commands::Auth { .. } => "auth",
        Commands::Scan { .. } => "scan",
        Commands::History { .. } => "history",
        Commands::Resonance { .. } => "resonance",
        Commands::Calibrate { .. } => "calibrate",
        Commands::Power { .. } => "power",
    }
}

/// `polaris config show`
#[cfg(not(test))]
fn cmd_config_show(app: &App) -> anyhow::Result<()> {
    let resolved = app.resolver().resolve();
    let key = app.inference_key();
    println!("Backend Configuration");
    println!("=====================");
    println!();
    println!("  Source     : {}", resolved.source.as_str());
    println!(
        "  Endpoint   : {}",
        if resolved.pair.endpoint_url.is_empty() {
            "(not set)"
        } else {
            resolved.pair.endpoint_url.as_str()
        }
    );
    println!("  Key        : {}", resolved.pair.masked_key());
    println!(
        "  Configured : {}",
        if resolved.is_configured() { "Yes" } else { "No" }
    );
    println!();
    println!(
        "  Inference key : {} ({})",
        proto::mask_secret(&key.key),
        key.source.as_str()
    );
    println!(
        "  Storage       : {} ({})",
        app.config().storage.effective_path().display(),
        app.resolver().codec().name()
    );
    Ok(())
}

/// `polaris config set`
#[cfg(not(test))]
async fn cmd_config_set(app: &App, url: Option<String>, key: Option<String>) -> anyhow::Result<()> {
    let url = prompt::value_or_prompt(url, "Backend endpoint URL").await?;
    let key = prompt::value_or_prompt(key, "Backend anon key").await?;
    let pair = app.hub().update_config(&url, &key)?;
    println!("Saved backend configuration for {}", pair.endpoint_url);

    let state = app.hub().probe_state().await;
    println!("{}", format_connectivity("Backend", &state));
    Ok(())
}

/// `polaris config clear`
#[cfg(not(test))]
fn cmd_config_clear(app: &App) -> anyhow::Result<()> {
    app.hub().clear_config()?;
    let resolved = app.resolver().resolve();
    println!("Cached backend configuration removed.");
    if resolved.is_configured() {
        println!(
            "Still configured from {}: {}",
            resolved.source.as_str(),
            resolved.pair.endpoint_url
        );
    }
    Ok(())
}

/// `polaris diagnose`
#[cfg(not(test))]
async fn cmd_diagnose(app: &App, no_prompt: bool) -> anyhow::Result<()> {
    let diagnosis = app.diagnose().await;
    println!("{}", format_connectivity("Backend", &diagnosis.backend));
    println!(
        "{}",
        format_connectivity("Inference", &ConnectivityState::from(&diagnosis.inference))
    );

    let source = app.inference_key().source;
    if !app.apply_inference_reset(&diagnosis.inference)? {
        return Ok(());
    }
    println!("{}", reset_notice(source));
    if no_prompt {
        println!("Run `polaris auth set-key` to choose a new key.");
        return Ok(());
    }

    let task = DelayedTask::schedule(KEY_REPROMPT_DELAY, prompt::read_line("New inference API key"));
    match task.wait().await {
        Some(Ok(key)) if !key.is_empty() => save_and_probe_key(app, &key).await,
        Some(Err(e)) => Err(e),
        _ => {
            println!("No key entered.");
            Ok(())
        }
    }
}

/// `polaris auth status`
#[cfg(not(test))]
async fn cmd_auth_status(app: &App) -> anyhow::Result<()> {
    let identity = app.identity().await;
    println!("{}", format_identity(&identity));
    if !app.hub().is_configured() {
        println!("  (backend not configured; running locally)");
    }
    Ok(())
}

/// `polaris auth login`
#[cfg(not(test))]
async fn cmd_auth_login(
    app: &App,
    email: Option<String>,
    password: Option<String>,
    mock: bool,
) -> anyhow::Result<()> {
    let use_identity_provider = mock || !app.hub().is_configured();
    let request = if use_identity_provider {
        println!("Signing in with the identity provider...");
        SignInRequest::IdentityToken(identity_token())
    } else {
        SignInRequest::Password {
            email: prompt::value_or_prompt(email, "Email").await?,
            password: prompt::value_or_prompt(password, "Password").await?,
        }
    };
    let identity = app.sign_in(&request, use_identity_provider).await?;
    println!("{}", format_identity(&identity));
    Ok(())
}

#[cfg(not(test))]
fn identity_token() -> String {
    format!("cli-{}", chrono::Utc::now().timestamp_millis())
}

/// `polaris auth logout`
#[cfg(not(test))]
async fn cmd_auth_logout(app: &App) -> anyhow::Result<()> {
    app.sign_out().await;
    println!("Signed out.");
    println!("{}", format_identity(&Identity::Guest));
    Ok(())
}

/// `polaris auth guest`
#[cfg(not(test))]
async fn cmd_auth_guest(app: &App) -> anyhow::Result<()> {
    app.continue_as_guest()?;
    println!("{}", format_identity(&Identity::Guest));
    Ok(())
}

/// `polaris auth set-key`
#[cfg(not(test))]
async fn cmd_auth_set_key(app: &App, key: Option<String>) -> anyhow::Result<()> {
    let key = prompt::value_or_prompt(key, "Inference API key").await?;
    save_and_probe_key(app, &key).await
}

#[cfg(not(test))]
async fn save_and_probe_key(app: &App, key: &str) -> anyhow::Result<()> {
    app.resolver().set_inference_key(key)?;
    println!("Inference key saved ({}).", proto::mask_secret(key));
    let report = app.probe_inference().await;
    println!(
        "{}",
        format_connectivity("Inference", &ConnectivityState::from(&report))
    );
    if app.apply_inference_reset(&report)? {
        println!("The key was rejected and has been cleared.");
    }
    Ok(())
}

/// `polaris scan`
#[cfg(not(test))]
async fn cmd_scan(app: &App, scenario: String, save: bool) -> anyhow::Result<()> {
    let assessment = app.analyst().analyze_risk(&scenario).await?;
    println!("{}", format_assessment(&assessment));
    if save {
        let identity = app.identity().await;
        let record = ScanRecord::from_assessment(
            identity.user_id().unwrap_or_default(),
            scenario,
            assessment,
        );
        match app.history().save(&identity, record).await? {
            SavedTo::Backend => println!("Saved to backend history."),
            SavedTo::Local => println!("Saved to local history."),
        }
    }
    Ok(())
}

/// `polaris history`
#[cfg(not(test))]
async fn cmd_history(app: &App, limit: u32) -> anyhow::Result<()> {
    let identity = app.identity().await;
    let scans = app.history().list(&identity, limit).await?;
    if scans.is_empty() {
        println!("No saved scans.");
        return Ok(());
    }
    for scan in &scans {
        println!("{}", format_history_row(scan));
    }
    Ok(())
}

/// `polaris resonance`
#[cfg(not(test))]
async fn cmd_resonance(app: &App, event: String, json: bool) -> anyhow::Result<()> {
    let analysis = app.analyst().analyze_global_resonance(&event).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }
    println!("Entropy score: {:.2}", analysis.entropy_score);
    println!();
    for ripple in &analysis.ripples {
        println!(
            "  [{}] {} (p={:.2})",
            ripple.order, ripple.impact, ripple.probability
        );
    }
    if !analysis.reasoning_path.is_empty() {
        println!();
        println!("Reasoning:");
        for (i, step) in analysis.reasoning_path.iter().enumerate() {
            println!("  {}. {step}", i + 1);
        }
    }
    if !analysis.protocol_updates.is_empty() {
        println!();
        println!("Protocol updates:");
        for update in &analysis.protocol_updates {
            println!("  - {update}");
        }
    }
    Ok(())
}

/// `polaris calibrate`
#[cfg(not(test))]
async fn cmd_calibrate(
    app: &App,
    reality: String,
    event: Option<String>,
    prediction: Option<PathBuf>,
) -> anyhow::Result<()> {
    let analyst = app.analyst();
    let prediction = match (prediction, event) {
        (Some(path), _) => read_json(&path)?,
        (None, Some(event)) => {
            println!("Predicting ripples for the event...");
            analyst.analyze_global_resonance(&event).await?
        }
        (None, None) => anyhow::bail!("either --event or --prediction is required"),
    };
    let report = analyst.calibrate_protocol(&prediction, &reality).await?;
    println!("{}", format_calibration(&report));
    Ok(())
}

/// `polaris power`
#[cfg(not(test))]
async fn cmd_power(app: &App, map: &Path) -> anyhow::Result<()> {
    let map: PowerMap = read_json(map)?;
    if map.actors.is_empty() {
        anyhow::bail!("the map has no actors");
    }
    let report = app
        .analyst()
        .analyze_power_dynamics(&map.actors, &map.relationships)
        .await?;
    println!("{}", format_power_report(&report));
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid JSON in {}", path.display()))
}

/// What a key reset after `diagnose` actually did.
fn reset_notice(source: ConfigSource) -> &'static str {
    match source {
        ConfigSource::Cached => "The cached inference key was cleared.",
        ConfigSource::Environment => {
            "The inference key from the environment was rejected. Update or unset it, or save a new key."
        }
        ConfigSource::Fallback => "No inference key is configured.",
    }
}

fn format_calibration(report: &CalibrationReport) -> String {
    let mut out = format!(
        "Calibration delta: {:.2}\n\nGap: {}\n\nNew rule: {}\n  Weight adjustment: {}",
        report.calibration_delta,
        report.gap_analysis,
        report.cognitive_crystal.rule,
        report.cognitive_crystal.weight_adjustment
    );
    if !report.bias_warning.is_empty() {
        out.push_str(&format!("\n\nBias warning: {}", report.bias_warning));
    }
    if !report.thinking_trace.is_empty() {
        out.push_str("\n\nTrace:");
        for (i, step) in report.thinking_trace.iter().enumerate() {
            out.push_str(&format!("\n  {}. {step}", i + 1));
        }
    }
    out
}

fn format_power_report(report: &PowerDynamicsReport) -> String {
    let mut out = String::from("Instability points:");
    for point in &report.instability_points {
        out.push_str(&format!("\n  - {point}"));
    }
    out.push_str("\n\nLeverage points:");
    for point in &report.leverage_points {
        out.push_str(&format!("\n  - {point}"));
    }
    out.push_str(&format!("\n\n{}", report.strategic_advice));
    out
}

fn format_connectivity(label: &str, state: &ConnectivityState) -> String {
    let mut line = format!("{label:<10}: {}", state.status.as_str());
    if let Some(diagnostic) = &state.diagnostic {
        line.push_str(&format!(" ({diagnostic})"));
    }
    if state.should_reset_credential {
        line.push_str(" [new key required]");
    }
    line
}

fn format_identity(identity: &Identity) -> String {
    let profile = identity.profile();
    let mut line = format!("{} [{}]", profile.display_name, profile.role);
    if !profile.email.is_empty() {
        line.push_str(&format!(" <{}>", profile.email));
    }
    if identity.is_guest() {
        line.push_str(" (guest)");
    }
    line
}

fn format_assessment(assessment: &RiskAssessment) -> String {
    let mut out = format!(
        "Risk level: {}\n  Chronic degradation     : {:.0}\n  Irreversible inflection : {:.0}\n  Judgment sovereignty    : {:.0}\n\n{}",
        assessment.risk_level.as_str(),
        assessment.axes.chronic_degradation,
        assessment.axes.irreversible_inflection,
        assessment.axes.judgment_sovereignty,
        assessment.summary
    );
    for rec in &assessment.recommendations {
        out.push_str(&format!("\n  - {rec}"));
    }
    out
}

fn format_history_row(scan: &ScanRecord) -> String {
    let scenario: String = scan.scenario.chars().take(60).collect();
    format!(
        "{}  {:<6}  {}",
        scan.timestamp.format("%Y-%m-%d %H:%M"),
        scan.risk_level.as_str(),
        scenario
    )
}
