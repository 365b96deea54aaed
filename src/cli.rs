use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    time::MissedTickBehavior,
};

use crate::{
    bus::{CaptureReply, PushMessage, Request, SurfaceKind},
    capture::{default_capturer, FileCapturer, ScreenCapturer},
    notify::LogNotifier,
    overlay::{OverlayRenderer, ResultCard, TerminalSink},
    settings::SettingsPatch,
    status::{describe_latest, StatusView, UpdateSource},
    utils::{paths::AppPaths, time::format_relative},
    AppState,
};

/// Capture the screen, have it analyzed remotely, and show the answer
#[derive(Parser)]
#[command(name = "screenmind", version = env!("CARGO_PKG_VERSION"), long_about = None)]
pub struct Cli {
    /// Directory holding settings.json and the local database
    #[arg(global = true, long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Verbose logging (same as SCREENMIND_DEBUG=1)
    #[arg(global = true, long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture once, analyze unless autoAnalyze is off, and print the outcome
    Capture {
        #[command(flatten)]
        source: CaptureSource,
    },

    /// Print the most recent result or error
    Last {
        /// Print the raw record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Check whether the analysis server answers
    Health,

    /// List past analyses, newest first
    History {
        #[arg(long, short = 'n', default_value_t = 20)]
        limit: u32,

        /// Delete every stored entry
        #[arg(long)]
        clear: bool,
    },

    /// Stay running: Enter captures, the result card and status update live
    Daemon {
        #[command(flatten)]
        source: CaptureSource,
    },
}

#[derive(clap::Args)]
pub struct CaptureSource {
    /// Use this image file as the screen instead of grabbing the display
    #[arg(long)]
    pub image: Option<PathBuf>,

    /// Capture the window whose title contains this text
    #[arg(long, default_value = "")]
    pub window: String,
}

impl CaptureSource {
    fn capturer(&self) -> Arc<dyn ScreenCapturer> {
        match &self.image {
            Some(path) => Arc::new(FileCapturer::new(path.clone())),
            None => Arc::from(default_capturer()),
        }
    }
}

#[derive(Subcommand)]
pub enum SettingsAction {
    Show,
    Set {
        #[arg(long)]
        server_url: Option<String>,
        #[arg(long)]
        auto_analyze: Option<bool>,
        #[arg(long)]
        notifications: Option<bool>,
        #[arg(long)]
        save_history: Option<bool>,
        /// Analysis timeout in seconds (10-120)
        #[arg(long)]
        timeout: Option<u32>,
        /// History entries to keep (10-1000)
        #[arg(long)]
        max_history: Option<u32>,
    },
    /// Restore every setting to its default
    Reset,
}

pub async fn execute(cli: Cli) -> Result<()> {
    let paths = AppPaths::resolve(cli.data_dir)?;

    match cli.command {
        Commands::Capture { source } => capture_once(paths, source).await,
        Commands::Last { json } => print_last(paths, json).await,
        Commands::Settings { action } => settings(paths, action),
        Commands::Health => health(paths).await,
        Commands::History { limit, clear } => history(paths, limit, clear).await,
        Commands::Daemon { source } => daemon(paths, source).await,
    }
}

fn app(paths: AppPaths, capturer: Arc<dyn ScreenCapturer>) -> Result<AppState> {
    AppState::init(paths, capturer, Arc::new(LogNotifier))
}

/// For commands that only read or write the stores.
fn no_capture() -> Arc<dyn ScreenCapturer> {
    Arc::new(crate::capture::NoCaptureBackend)
}

async fn capture_once(paths: AppPaths, source: CaptureSource) -> Result<()> {
    let mut state = app(paths, source.capturer())?;
    state.serve();
    let mut page = state.bus.attach_surface(SurfaceKind::Page, source.window.clone());

    let reply = state
        .bus
        .request(Request::CaptureScreen)
        .await?
        .into_capture()
        .unwrap_or_else(|| CaptureReply::failed("unexpected reply to capture request"));

    if !reply.success {
        bail!("capture failed: {}", reply.error.unwrap_or_default());
    }

    match page.try_recv() {
        Some(PushMessage::AnalysisComplete(result)) => {
            println!("{}", ResultCard::from(&result).render())
        }
        _ => {
            let last = state.orchestrator.get_last_outcome().await?;
            println!("{}", describe_latest(last.latest(), Utc::now()).join("\n"));
        }
    }
    Ok(())
}

async fn print_last(paths: AppPaths, json: bool) -> Result<()> {
    let state = app(paths, no_capture())?;
    let last = state.orchestrator.get_last_outcome().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&last)?);
    } else {
        println!("{}", describe_latest(last.latest(), Utc::now()).join("\n"));
    }
    Ok(())
}

fn settings(paths: AppPaths, action: SettingsAction) -> Result<()> {
    let state = app(paths, no_capture())?;
    match action {
        SettingsAction::Show => {}
        SettingsAction::Set {
            server_url,
            auto_analyze,
            notifications,
            save_history,
            timeout,
            max_history,
        } => {
            let patch = SettingsPatch {
                server_url,
                auto_analyze,
                show_notifications: notifications,
                save_history,
                analysis_timeout_seconds: timeout,
                max_history_items: max_history,
            };
            if patch.is_empty() {
                bail!("nothing to change; pass at least one setting");
            }
            state.settings.write(&patch)?;
        }
        SettingsAction::Reset => state.settings.reset()?,
    }

    println!("{}", serde_json::to_string_pretty(&state.settings.read())?);
    Ok(())
}

async fn health(paths: AppPaths) -> Result<()> {
    let state = app(paths, no_capture())?;
    let server_url = state.settings.read().server_url;
    let status = state.client.check_health(&server_url).await;
    println!("{server_url}: {}", serde_json::to_string(&status)?.trim_matches('"'));
    Ok(())
}

async fn history(paths: AppPaths, limit: u32, clear: bool) -> Result<()> {
    let state = app(paths, no_capture())?;
    if clear {
        let removed = state.db.clear_history().await?;
        println!("Removed {removed} entries");
        return Ok(());
    }

    let entries = state.db.list_history(limit).await?;
    if entries.is_empty() {
        println!("No history yet");
    }
    let now = Utc::now();
    for entry in entries {
        println!("[{}] {}", format_relative(entry.created_at, now), entry.analysis);
        if let Some(answer) = entry.answer {
            println!("    Answer: {answer}");
        }
    }
    Ok(())
}

/// How often the daemon looks for settings written by another process.
const SETTINGS_POLL_INTERVAL: Duration = Duration::from_secs(2);

const DAEMON_HELP: &str =
    "Enter/c = capture, d = dismiss result, a = toggle auto-analyze, n = toggle notifications, s = status, h = health, q = quit";

async fn daemon(paths: AppPaths, source: CaptureSource) -> Result<()> {
    let mut state = app(paths, source.capturer())?;
    state.serve();

    let page = state.bus.attach_surface(SurfaceKind::Page, source.window.clone());
    let overlay = OverlayRenderer::new(Arc::new(TerminalSink));
    let overlay_task = {
        let overlay = overlay.clone();
        tokio::spawn(async move { overlay.run(page).await })
    };

    let mut status =
        StatusView::open(state.bus.clone(), state.settings.clone(), state.client.clone()).await?;
    println!("{}\n\n{DAEMON_HELP}", status.render(Utc::now()));

    let mut settings_poll = tokio::time::interval(SETTINGS_POLL_INTERVAL);
    settings_poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "" | "c" => match state.orchestrator.trigger_capture().await {
                        Ok(ticket) => log::debug!("Run {} accepted", ticket.run_id()),
                        Err(busy) => println!("{busy}"),
                    },
                    "a" => {
                        let on = status.toggle_auto_analyze()?;
                        println!("Auto-analyze {}", if on { "on" } else { "off" });
                    }
                    "n" => {
                        let on = status.toggle_notifications()?;
                        println!("Notifications {}", if on { "on" } else { "off" });
                    }
                    "s" => println!("{}", status.render(Utc::now())),
                    "h" => {
                        status.check_health().await;
                        println!("{}", status.render(Utc::now()));
                    }
                    "d" => {
                        overlay.dismiss();
                    }
                    "q" => break,
                    other => println!("Unknown command '{other}'. {DAEMON_HELP}"),
                }
            }
            update = status.wait_for_update() => match update? {
                Some(UpdateSource::PopupPush) => println!("{}", status.render(Utc::now())),
                Some(UpdateSource::StoreChange) => {}
                None => break,
            },
            _ = settings_poll.tick() => {
                if let Err(err) = state.settings.reload() {
                    log::debug!("Settings poll skipped: {err:#}");
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    overlay_task.abort();
    Ok(())
}
