//! emusession - Session controller for a browser-hosted classic Mac emulator
//!
//! Resolves a run configuration from the page URL, drives one emulator
//! session through its lifecycle and feeds dropped files into it. The binary
//! runs the controller against a scripted backend, which is handy for
//! checking how a URL resolves and how a session reacts to drops.
//!
//! # Quick Start
//!
//! ```text
//! emusession                                   # Default URL from config.toml
//! emusession --url https://macos8.app/         # Mac OS 8.1 on a Quadra 650
//! emusession --url https://lan.system7.app/    # System 7.5.3, zone "lan"
//! emusession --drop Games.dsk --restart        # Attach an image and reboot
//! emusession --machine "Mac Plus" --disk "System 6.0.8"   # Custom run
//! ```
//!
//! # Query parameters
//!
//! | Parameter | Effect |
//! |-----------|--------|
//! | domain | Disk lookup key instead of the host |
//! | ethernet | Enable ethernet (broadcast unless ethernet_zone is set) |
//! | ethernet_zone | Zone to join |
//! | use_shared_memory=false | Disable shared memory |
//! | debug_audio=true | Audio debugging |
//! | cdrom_url | Mount a CD-ROM image from a URL |

mod catalog;
mod config;
mod core;
mod custom;
mod display;
mod ingest;
mod net;
mod resolver;
mod settings;

use std::env;
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::catalog::DiskCatalog;
use crate::config::Config as HostConfig;
use crate::core::controller::SessionController;
use crate::core::emulator::DroppedFile;
use crate::core::scripted::ScriptedEmulatorFactory;
use crate::core::session::{SessionState, SessionUpdate};
use crate::custom::{location_with_cdrom_url, validate_cdrom_url, RunDef};
use crate::display::ScreenSize;
use crate::net::peers::now_ms;
use crate::resolver::{resolve, Location, PlatformCapabilities};
use crate::settings::{FileSettingsStore, MemorySettingsStore, SettingsStore};

/// How long to wait for the session to finish loading
const LOAD_WAIT: Duration = Duration::from_secs(30);

/// Pump interval while waiting
const PUMP_INTERVAL: Duration = Duration::from_millis(10);

/// Command line options
#[derive(Default)]
struct Args {
    /// Page URL, overrides `default_url`
    url: Option<String>,
    /// Viewport overrides
    width: Option<u32>,
    height: Option<u32>,
    /// Force shared memory off
    no_shared_memory: bool,
    /// CD-ROM image URL to mount
    cdrom_url: Option<String>,
    /// Files to drop onto the screen once running
    drops: Vec<PathBuf>,
    /// Restart after drops if a disk image is waiting
    restart: bool,
    /// Enter fullscreen once running
    fullscreen: bool,
    /// Flip the Control/Command swap setting
    toggle_swap_keys: bool,
    /// Custom run: machine name
    machine: Option<String>,
    /// Custom run: system disk names, in order
    disks: Vec<String>,
    /// Custom run: CD-ROM image URLs
    cdrom_urls: Vec<String>,
    /// Custom run: leave out the library disk
    no_library: bool,
    debug_fallback: bool,
    debug_audio: bool,
}

impl Args {
    /// Any of the custom run options was given
    fn custom_requested(&self) -> bool {
        self.machine.is_some()
            || !self.disks.is_empty()
            || !self.cdrom_urls.is_empty()
            || self.no_library
            || self.debug_fallback
            || self.debug_audio
    }
}

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_version() {
    eprintln!("emusession {}", VERSION);
}

fn print_help() {
    eprintln!("emusession {} - Session controller for a browser-hosted Mac emulator", VERSION);
    eprintln!();
    eprintln!("Usage: emusession [OPTIONS]");
    eprintln!();
    eprintln!("Session options:");
    eprintln!("  --url <URL>           Page URL to resolve (default: from config.toml)");
    eprintln!("  --cdrom <URL>         Mount a CD-ROM image (archive.org, macintoshgarden.org)");
    eprintln!("  --no-shared-memory    Run as if shared memory were unavailable");
    eprintln!();
    eprintln!("Custom run (switched to once the URL's session is running):");
    eprintln!("  --machine <NAME>      Mac Plus, Quadra 650 or Power Macintosh 9500");
    eprintln!("  --disk <NAME>         System disk by name (repeatable)");
    eprintln!("  --cdrom-url <URL>     CD-ROM image URL (repeatable)");
    eprintln!("  --no-library          Leave out the Infinite HD library disk");
    eprintln!("  --debug-fallback      Force the fallback emulator mode");
    eprintln!("  --debug-audio         Audio debugging");
    eprintln!();
    eprintln!("Viewport options:");
    eprintln!("  --width <PX>          Viewport width");
    eprintln!("  --height <PX>         Viewport height");
    eprintln!("  --fullscreen          Enter fullscreen once running");
    eprintln!();
    eprintln!("Once running:");
    eprintln!("  -d, --drop <FILE>     Drop a file onto the screen (repeatable)");
    eprintln!("  -r, --restart         Restart if a dropped disk image needs it");
    eprintln!("  --swap-keys           Toggle swapping Control and Command");
    eprintln!();
    eprintln!("Other options:");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  emusession --url https://macos9.app/");
    eprintln!("  emusession --url \"https://system7.app/?ethernet=true&ethernet_zone=lan\"");
    eprintln!("  emusession --drop Games.dsk --restart");
    eprintln!("  emusession --machine \"Mac Plus\" --disk \"System 6.0.8\" --no-library");
    eprintln!();
    eprintln!("Configuration: ~/.emusession/config.toml");
    eprintln!("Settings:      ~/.emusession/emulator-settings.toml");
    eprintln!("Log:           ~/.emusession/emusession.log");
}

fn parse_number(args: &[String], i: usize, flag: &str) -> Result<u32, String> {
    let value = args.get(i).ok_or_else(|| format!("Missing {} argument", flag))?;
    value
        .parse()
        .map_err(|_| format!("Invalid {} value: {}", flag, value))
}

fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = env::args().collect();
    let mut parsed = Args::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "--url" => {
                i += 1;
                let url = args.get(i).ok_or("Missing --url argument")?;
                parsed.url = Some(url.clone());
            }
            "--cdrom" => {
                i += 1;
                let url = args.get(i).ok_or("Missing --cdrom argument")?;
                parsed.cdrom_url = Some(url.clone());
            }
            "--width" => {
                i += 1;
                parsed.width = Some(parse_number(&args, i, "--width")?);
            }
            "--height" => {
                i += 1;
                parsed.height = Some(parse_number(&args, i, "--height")?);
            }
            "--no-shared-memory" => {
                parsed.no_shared_memory = true;
            }
            "--fullscreen" => {
                parsed.fullscreen = true;
            }
            "-d" | "--drop" => {
                i += 1;
                let path = args.get(i).ok_or("Missing --drop argument")?;
                parsed.drops.push(PathBuf::from(path));
            }
            "-r" | "--restart" => {
                parsed.restart = true;
            }
            "--swap-keys" => {
                parsed.toggle_swap_keys = true;
            }
            "--machine" => {
                i += 1;
                let name = args.get(i).ok_or("Missing --machine argument")?;
                parsed.machine = Some(name.clone());
            }
            "--disk" => {
                i += 1;
                let name = args.get(i).ok_or("Missing --disk argument")?;
                parsed.disks.push(name.clone());
            }
            "--cdrom-url" => {
                i += 1;
                let url = args.get(i).ok_or("Missing --cdrom-url argument")?;
                parsed.cdrom_urls.push(url.clone());
            }
            "--no-library" => {
                parsed.no_library = true;
            }
            "--debug-fallback" => {
                parsed.debug_fallback = true;
            }
            "--debug-audio" => {
                parsed.debug_audio = true;
            }
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    Ok(parsed)
}

fn init_logging(host_config: &HostConfig) {
    let log_path = config::app_dir()
        .map(|dir| dir.join("emusession.log"))
        .unwrap_or_else(|| PathBuf::from("emusession.log"));

    // Open log file (append mode)
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    let builder = FmtSubscriber::builder().with_max_level(host_config.level());
    let result = match log_file {
        Some(file) => tracing::subscriber::set_global_default(
            builder.with_writer(std::sync::Mutex::new(file)).with_ansi(false).finish(),
        ),
        None => tracing::subscriber::set_global_default(builder.with_writer(std::io::stderr).finish()),
    };
    if result.is_err() {
        eprintln!("Logging already initialized");
    }
}

fn main() -> anyhow::Result<()> {
    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    let host_config = HostConfig::load();
    init_logging(&host_config);
    info!("emusession {} starting...", VERSION);

    if let Some(path) = HostConfig::path() {
        match host_config.save_if_missing(&path) {
            Ok(true) => info!("Wrote default configuration to {}", path.display()),
            Ok(false) => {}
            Err(e) => warn!("{}", e),
        }
    }

    let raw_url = args.url.clone().unwrap_or_else(|| host_config.default_url.clone());
    let mut location = Location::parse(&raw_url).with_context(|| format!("Invalid URL: {}", raw_url))?;

    if let Some(cdrom_url) = &args.cdrom_url {
        let image = validate_cdrom_url(cdrom_url)?;
        let reload = location_with_cdrom_url(&location.pathname, &image.src_url);
        println!("CD-ROM: {} (reload at {})", image.name, reload);
        location.search = reload
            .split_once('?')
            .map(|(_, query)| query.to_string())
            .unwrap_or_default();
    }

    let configured = host_config.viewport_size();
    let viewport = ScreenSize::new(
        args.width.unwrap_or(configured.width),
        args.height.unwrap_or(configured.height),
    );
    if !viewport.is_valid() {
        bail!("Viewport must not be empty ({})", viewport);
    }
    let platform = PlatformCapabilities {
        shared_memory: host_config.platform.shared_memory && !args.no_shared_memory,
        viewport,
    };

    let catalog = DiskCatalog::builtin();
    let run_config = resolve(&location, &platform, &catalog);
    println!(
        "{} on {} ({}), screen {}, shared memory: {}",
        run_config.boot_disk_name().unwrap_or("no disk"),
        run_config.machine.name,
        run_config.machine.emulator.name(),
        run_config.screen_size,
        run_config.use_shared_memory
    );
    for cdrom in &run_config.cdroms {
        println!("CD-ROM: {}", cdrom.src_url);
    }

    // Checked up front so bad names fail before anything boots
    let custom = if args.custom_requested() {
        let mut def = RunDef::from_names(&catalog, args.machine.as_deref(), &args.disks, &args.cdrom_urls)?;
        def.include_library_disk = !args.no_library;
        def.debug_fallback = args.debug_fallback;
        def.debug_audio = args.debug_audio;
        let custom = def.to_run_configuration(&platform, run_config.ethernet.clone())?;
        println!(
            "Custom run: {} on {}, {:?} appearance",
            custom.boot_disk_name().unwrap_or("no disk"),
            custom.machine.name,
            def.appearance()
        );
        Some(custom)
    } else {
        None
    };

    let store: Box<dyn SettingsStore> = match FileSettingsStore::in_app_dir() {
        Some(store) => Box::new(store),
        None => {
            warn!("No home directory, settings will not be saved");
            Box::new(MemorySettingsStore::new())
        }
    };
    let factory = ScriptedEmulatorFactory::new(Duration::from_millis(host_config.backend.chunk_delay_ms));
    let mut controller = SessionController::new(Box::new(factory), store);
    println!(
        "Swap Control and Command: {}",
        controller.settings().swap_control_and_command
    );

    if args.toggle_swap_keys {
        controller.toggle_swap_control_and_command()?;
    }

    controller.start(run_config)?;
    wait_for_running(&mut controller)?;
    print_session(&controller, viewport);

    if let Some(custom) = custom {
        controller.reconfigure(custom)?;
        wait_for_running(&mut controller)?;
        print_session(&controller, viewport);
    }

    if args.fullscreen {
        controller.enter_fullscreen(host_config.available_display_size());
        if let Some(geometry) = controller.session().map(|s| s.geometry()) {
            match geometry.scale {
                Some(scale) if geometry.fullscreen => println!("Fullscreen at {:.2}x", scale),
                _ => println!("Fullscreen at natural size"),
            }
        }
    }

    if !args.drops.is_empty() {
        controller.drag_enter();
        let mut files = Vec::with_capacity(args.drops.len());
        for path in &args.drops {
            let contents = match fs::read(path) {
                Ok(contents) => contents,
                Err(e) => {
                    controller.drag_leave();
                    return Err(e).with_context(|| format!("Failed to read {}", path.display()));
                }
            };
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            files.push(DroppedFile::new(name, contents));
        }
        if controller.drop_overlay_visible() {
            println!("Dropping {} file(s)", files.len());
        }

        let outcome = controller.drop_files(files);
        if outcome.ignored {
            println!("No session to receive the drop");
        } else {
            println!(
                "Dropped {} file(s) and {} disk image(s)",
                outcome.files, outcome.disk_images
            );
        }
        let pending = controller.session().is_some_and(|s| s.has_pending_restart());
        if pending && args.restart {
            controller.restart()?;
        }
    }

    print_updates(&mut controller);
    if let Some(session) = controller.session() {
        let now = now_ms();
        if let Some(status) = session.ethernet_status(now) {
            println!("{}", status);
            if session.config().ethernet_status_expanded {
                for line in session.ethernet_details(now).unwrap_or_default() {
                    println!("  {}", line);
                }
            }
        }
    }

    if args.fullscreen {
        controller.exit_fullscreen();
    }
    controller.stop();
    print_updates(&mut controller);
    info!("emusession exiting");
    Ok(())
}

/// Pump the session until it is running
fn wait_for_running(controller: &mut SessionController) -> anyhow::Result<()> {
    let deadline = Instant::now() + LOAD_WAIT;
    loop {
        controller.pump(Instant::now());
        print_updates(controller);
        match controller.state() {
            SessionState::Running => return Ok(()),
            SessionState::Stopped => bail!("Session stopped while loading"),
            _ => {}
        }
        if Instant::now() >= deadline {
            let progress = controller.session().and_then(|s| s.loading_text()).unwrap_or_default();
            bail!("Session did not finish loading within {}s {}", LOAD_WAIT.as_secs(), progress);
        }
        thread::sleep(PUMP_INTERVAL);
    }
}

/// Summary of the running session
fn print_session(controller: &SessionController, viewport: ScreenSize) {
    let Some(session) = controller.session() else {
        return;
    };
    let geometry = session.geometry();
    let bezel = session.geometry_manager().bezel_size(viewport.width);
    let style = session
        .config()
        .disks
        .first()
        .map(|d| format!("{:?}", d.bezel_style))
        .unwrap_or_default();
    println!(
        "Session {} running after {} chunk(s): screen {}, {:?} {} bezel{}",
        session.id(),
        session.progress().total_chunks,
        geometry.size(),
        bezel,
        style,
        if session.loading_indicator() { ", disk busy" } else { "" }
    );
}

fn print_updates(controller: &mut SessionController) {
    for update in controller.take_updates() {
        match update {
            SessionUpdate::StateChanged(state) => println!("State: {:?}", state),
            SessionUpdate::LoadingProgress(progress) => println!(
                "Loading data files… ({}/{})",
                progress.loaded_chunks(),
                progress.total_chunks
            ),
            SessionUpdate::ScreenResized(size) => println!("Screen: {}", size),
            SessionUpdate::FullscreenChanged { fullscreen, scale } => match scale {
                Some(scale) => println!("Fullscreen: {} ({:.2}x)", fullscreen, scale),
                None => println!("Fullscreen: {}", fullscreen),
            },
            SessionUpdate::PeersChanged(count) => println!("Ethernet peers: {}", count),
            SessionUpdate::PendingRestartChanged(true) => {
                println!("Disk images were added; restart to use them")
            }
            SessionUpdate::PendingRestartChanged(false) => {}
            SessionUpdate::SettingsChanged(settings) => println!(
                "Swap Control and Command: {}",
                settings.swap_control_and_command
            ),
            // Busy changes are too frequent to print
            SessionUpdate::ChunkBusyChanged(_) => {}
        }
    }
}
