//! Headless shell for the farmhand agent.
//!
//! Wires the real adapters (xcap window capture, serial HID driver,
//! filesystem templates) into the core crate and runs the cycle
//! orchestrator until the process is killed.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use farmhand::charged::ChargedCheck;
use farmhand::cycle::{CycleOrchestrator, CyclePorts};
use farmhand::input::SerialInput;
use farmhand::ports::{Destination, Extras, TemplateResolver};
use farmhand::restart::RestartManager;
use farmhand::sched::RunLoop;
use farmhand::templates::FsTemplates;
use farmhand::vision::XcapWindow;
use farmhand::watcher::{HpPalette, PlayerState, StateListener, StateWatcher};
use farmhand::{AbortFlag, AgentConfig, FlowRunner, GameWindow, Lang, TracingStatus, Zone};

#[derive(Parser)]
#[command(name = "farmhand", version, about = "Screen-driven game client automation agent")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LangArg {
    En,
    Ru,
}

impl From<LangArg> for Lang {
    fn from(l: LangArg) -> Self {
        match l {
            LangArg::En => Lang::En,
            LangArg::Ru => Lang::Ru,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run the full agent loop against a live window and serial device.
    Run(RunArgs),
    /// List the post-teleport rows available at a destination.
    Rows {
        #[arg(long)]
        village: String,
        #[arg(long)]
        location: String,
        #[arg(long)]
        json: bool,
    },
    /// List the registered flows.
    Flows,
    /// Open the serial device and verify the ping/pong handshake.
    Ping {
        /// Serial device path (e.g. /dev/ttyUSB0 or \\.\COM3).
        #[arg(long)]
        port: PathBuf,
    },
    /// Locate the game window and report its geometry and focus.
    Check {
        #[arg(long, default_value = "Lineage")]
        window_title: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Substring of the game window title.
    #[arg(long, default_value = "Lineage")]
    window_title: String,

    /// Serial device path for the HID microcontroller.
    #[arg(long)]
    port: PathBuf,

    /// Skip the ping/pong handshake when opening the device.
    #[arg(long)]
    no_handshake: bool,

    /// Root directory of the template images.
    #[arg(long, default_value = "templates")]
    templates: PathBuf,

    #[arg(long, default_value = "asterios")]
    server: String,

    #[arg(long, value_enum, default_value_t = LangArg::En)]
    lang: LangArg,

    /// Buffer profile key, interpolated into dashboard templates.
    #[arg(long, default_value = "buffer_mode_mage")]
    mode: String,

    #[arg(long, env = "FARMHAND_LOGIN")]
    login: String,

    #[arg(long, env = "FARMHAND_PASSWORD")]
    password: String,

    #[arg(long, env = "FARMHAND_PIN", default_value = "")]
    pin: String,

    /// Re-apply buffs when the charged icon is dark.
    #[arg(long)]
    buff: bool,

    /// Start the hotbar macros after buffing.
    #[arg(long)]
    macros: bool,

    /// Start the macros even when buffing did not succeed.
    #[arg(long)]
    macros_always: bool,

    /// Teleport to the selected destination once charged.
    #[arg(long)]
    teleport: bool,

    #[arg(long, requires = "location")]
    village: Option<String>,

    #[arg(long, requires = "village")]
    location: Option<String>,

    /// Post-teleport movement row to run.
    #[arg(long, requires = "village")]
    row: Option<String>,

    /// Press "to village" automatically after death.
    #[arg(long)]
    raise_dead: bool,
}

/// CLI arguments frozen into the orchestrator's port trait.
struct CliPorts {
    server: String,
    lang: Lang,
    extras: Extras,
    destination: Option<Destination>,
    buff: bool,
    macros: bool,
    macros_always: bool,
    teleport: bool,
    raise_dead: bool,
}

impl CyclePorts for CliPorts {
    fn server(&self) -> String {
        self.server.clone()
    }

    fn lang(&self) -> Lang {
        self.lang
    }

    fn extras(&self) -> Extras {
        self.extras.clone()
    }

    fn destination(&self) -> Option<Destination> {
        self.destination.clone()
    }

    fn buff_enabled(&self) -> bool {
        self.buff
    }

    fn macros_enabled(&self) -> bool {
        self.macros
    }

    fn macros_run_always(&self) -> bool {
        self.macros_always
    }

    fn tp_enabled(&self) -> bool {
        self.teleport
    }

    fn raise_dead_enabled(&self) -> bool {
        self.raise_dead
    }

    fn respawn_ui_enabled(&self) -> bool {
        // The headless shell has no external respawn dialog.
        false
    }
}

/// Watcher listener whose target is bound after construction; breaks the
/// watcher -> restart manager -> orchestrator -> watcher wiring cycle.
#[derive(Default)]
struct LateListener {
    target: Mutex<Option<Arc<CycleOrchestrator>>>,
}

impl LateListener {
    fn bind(&self, orch: Arc<CycleOrchestrator>) {
        *self.target.lock().unwrap() = Some(orch);
    }
}

impl StateListener for LateListener {
    fn on_state(&self, state: PlayerState) {
        if let Some(t) = self.target.lock().unwrap().as_ref() {
            t.on_state(state);
        }
    }

    fn on_dead(&self) {
        if let Some(t) = self.target.lock().unwrap().as_ref() {
            t.on_dead();
        }
    }

    fn on_alive(&self) {
        if let Some(t) = self.target.lock().unwrap().as_ref() {
            t.on_alive();
        }
    }
}

/// HP-bar colors of the stock client skin.
fn default_palette() -> HpPalette {
    HpPalette {
        alive: vec![[214, 60, 48], [184, 38, 28]],
        dead: vec![[64, 62, 62], [30, 30, 30]],
        tolerance: 28,
    }
}

fn hp_bar_zone() -> Zone {
    Zone::Anchored {
        left: Some(8),
        top: Some(8),
        right: None,
        bottom: None,
        width: 260,
        height: 36,
    }
}

fn buff_bar_zone() -> Zone {
    Zone::Anchored {
        left: Some(0),
        top: Some(0),
        right: None,
        bottom: None,
        width: 640,
        height: 90,
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args),
        Command::Rows {
            village,
            location,
            json,
        } => rows(&village, &location, json),
        Command::Flows => flows(),
        Command::Ping { port } => ping(&port),
        Command::Check { window_title, json } => check(&window_title, json),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

fn run(args: RunArgs) -> Result<()> {
    let config = AgentConfig::from_env();
    let lang: Lang = args.lang.into();

    let window: Arc<XcapWindow> = Arc::new(XcapWindow::new(&args.window_title));
    let transport = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&args.port)
        .with_context(|| format!("opening serial device {}", args.port.display()))?;
    let input = if args.no_handshake {
        Arc::new(SerialInput::connect_unchecked(transport))
    } else {
        Arc::new(SerialInput::connect(transport).context("serial handshake")?)
    };
    let resolver = Arc::new(FsTemplates::new(&args.templates));
    let status = Arc::new(TracingStatus);

    let charged_template = resolver
        .resolve(&args.server, lang, &["buffs", "charged"])
        .context("charged-icon template")?;

    let mut extras: Extras = Extras::new();
    extras.insert("account_login".into(), args.login);
    extras.insert("account_password".into(), args.password);
    extras.insert("account_pin".into(), args.pin);
    extras.insert("mode_key".into(), args.mode);

    let destination = match (&args.village, &args.location) {
        (Some(village), Some(location)) => Some(Destination {
            village: village.clone(),
            location: location.clone(),
            row: args.row.clone(),
        }),
        _ => None,
    };

    let ports = Arc::new(CliPorts {
        server: args.server,
        lang,
        extras,
        destination,
        buff: args.buff,
        macros: args.macros,
        macros_always: args.macros_always,
        teleport: args.teleport,
        raise_dead: args.raise_dead,
    });

    let runner = Arc::new(FlowRunner::new(
        window.clone(),
        input,
        resolver,
        status.clone(),
        config.flow,
    ));
    let listener = Arc::new(LateListener::default());
    let watcher = Arc::new(StateWatcher::new(
        window.clone(),
        listener.clone(),
        default_palette(),
        hp_bar_zone(),
        config.watcher.clone(),
    ));
    let charged = Arc::new(ChargedCheck::new(
        window,
        buff_bar_zone(),
        charged_template,
        config.flow.threshold,
        config.charged,
    ));
    let restart = Arc::new(RestartManager::new(
        runner.clone(),
        watcher.clone(),
        status.clone(),
        config.restart,
    ));
    let run_loop = RunLoop::start();

    let orch = CycleOrchestrator::new(
        ports,
        runner,
        charged,
        restart,
        run_loop.clone(),
        status,
        AbortFlag::new(),
        config.orchestrator,
    );
    listener.bind(orch);

    watcher.start();
    info!("agent running; kill the process to stop");
    loop {
        std::thread::sleep(Duration::from_secs(3600));
    }
}

fn rows(village: &str, location: &str, json: bool) -> Result<()> {
    let rows = farmhand::registry::list_rows(village, location);
    if json {
        let out: Vec<_> = rows
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.id,
                    "title_rus": r.title_rus,
                    "title_eng": r.title_eng,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if rows.is_empty() {
        println!("no rows registered for {village}/{location}");
    } else {
        for row in rows {
            println!("{:<16} {} / {}", row.id, row.title_eng, row.title_rus);
        }
    }
    Ok(())
}

fn flows() -> Result<()> {
    for (server, flow_id) in farmhand::registry::list_flows() {
        println!("{server}/{flow_id}");
    }
    Ok(())
}

fn ping(port: &PathBuf) -> Result<()> {
    let transport = OpenOptions::new()
        .read(true)
        .write(true)
        .open(port)
        .with_context(|| format!("opening serial device {}", port.display()))?;
    SerialInput::connect(transport).context("serial handshake")?;
    println!("pong");
    Ok(())
}

fn check(window_title: &str, json: bool) -> Result<()> {
    let window = XcapWindow::new(window_title);
    let size = window.client_size().context("window size")?;
    let origin = window.origin().context("window origin")?;
    let focused = window.is_focused();
    if json {
        println!(
            "{}",
            serde_json::json!({
                "width": size.width,
                "height": size.height,
                "x": origin.x,
                "y": origin.y,
                "focused": focused,
            })
        );
    } else {
        println!(
            "{}x{} at ({}, {}), focused: {focused}",
            size.width, size.height, origin.x, origin.y
        );
    }
    Ok(())
}
