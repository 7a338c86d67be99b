use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{info, warn};

use grinder_core::capture::{self, FrameSlot};
use grinder_core::clock::SystemClock;
use grinder_core::context::Context;
use grinder_core::orchestrator::{self, GrindingOrchestrator, SessionStatus};
use grinder_core::platform::{create_platform, hotkey};
use grinder_core::position::HintEstimator;
use grinder_core::profile::{self, Profile};
use grinder_core::settings::Settings;
use grinder_core::template::TemplateStore;
use grinder_core::logger;
use grinder_core::types::Command;

struct Args {
    force_stub: bool,
    profile: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args { force_stub: false, profile: None };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--stub" => args.force_stub = true,
            "--profile" => {
                args.profile = Some(it.next().context("--profile needs a name")?);
            }
            other => bail!("unknown argument: {}", other),
        }
    }
    Ok(args)
}

/// `--profile`, else the one used last time, else the first on disk.
fn pick_profile(profiles_dir: &Path, requested: Option<String>, settings: &Settings) -> Result<String> {
    if let Some(name) = requested.or_else(|| settings.profile.clone()) {
        return Ok(name);
    }
    profile::find_profiles(profiles_dir)
        .first()
        .and_then(|p| p.parent())
        .and_then(|d| d.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("no profiles under {}", profiles_dir.display()))
}

fn main() -> Result<()> {
    let args = parse_args()?;
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let profiles_dir = cwd.join("profiles");
    let settings_path = cwd.join("settings.json");

    let _log_guard = logger::init(&cwd.join("logs"))?;
    logger::register_prefix("orchestrator", logger::COLOR_GREEN);
    logger::register_prefix("combat", logger::COLOR_GREEN);

    let mut settings = Settings::load(&settings_path);
    let name = pick_profile(&profiles_dir, args.profile, &settings)?;
    let profile = Profile::load_named(&profiles_dir, &name)?;
    settings.profile = Some(profile.name.clone());
    settings.save(&settings_path);
    info!("profile {} loaded, zone {}", profile.name, profile.zone);

    let platform = create_platform(args.force_stub);
    let windows = platform.get_instances(&profile.window_pattern);
    if windows.is_empty() {
        warn!("no window matches \"{}\"", profile.window_pattern);
    }

    // Capture producer
    let frames = FrameSlot::new();
    let quit = Arc::new(AtomicBool::new(false));
    let producer = capture::spawn_producer(
        platform.create_capture(&profile.window_pattern),
        frames.clone(),
        Arc::clone(&quit),
        Duration::from_millis(settings.capture_interval_ms),
    )?;

    // Perception
    let templates = TemplateStore::new(cwd.join("assets").join(&profile.name)).load();
    let detector = profile.build_detector(&templates);
    let estimator = Box::new(HintEstimator::default());

    let ctx = Context::new(
        platform.create_input(&profile.window_pattern),
        Arc::new(SystemClock),
        frames,
        Arc::new(AtomicBool::new(false)),
        StdRng::from_entropy(),
    );
    let grinder = GrindingOrchestrator::new(ctx, &profile, templates, detector, estimator);
    let run_flag = grinder.run_flag();

    let status = Arc::new(Mutex::new(grinder.status()));
    let (log_tx, log_rx) = mpsc::channel::<String>();
    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
    logger::set_tui_sender(log_tx);

    let orch_status: Arc<Mutex<SessionStatus>> = Arc::clone(&status);
    let orch = thread::Builder::new()
        .name("orchestrator".into())
        .spawn(move || orchestrator::orchestrate(orch_status, grinder, cmd_rx))?;

    let hotkey_flag = Arc::new(AtomicBool::new(false));
    hotkey::spawn_stop_hotkey(Arc::clone(&hotkey_flag));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let mut app = grinder_tui::App::new(status, run_flag, log_rx, cmd_tx);
    let result = grinder_tui::event::run(&mut terminal, &mut app, hotkey_flag);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    // Dropping the app closes the command channel if the TUI bailed early
    drop(app);
    if orch.join().is_err() {
        warn!("orchestrator thread panicked");
    }
    quit.store(true, Ordering::Release);
    producer.join().ok();

    result
}
