use std::cell::Cell;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sensorview_bus::{Category, EventBus};
use sensorview_common::{MessageLevel, MessageLog, ScreenSize};
use sensorview_render::{HeadlessEvents, HeadlessPresenter, RenderLoop, Scene, SceneManifest};
use sensorview_resource::HeadlessContext;
use sensorview_scheduler::{SchedulerConfig, TaskScheduler};

#[derive(Parser)]
#[command(name = "sensorview-cli", about = "Headless sensor view tools")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions and the draw order
    Info,
    /// List draw categories in dispatch order
    Categories,
    /// Load a scene manifest through the render loop without a window
    Load {
        /// Scene manifest (JSON)
        manifest: PathBuf,
        /// Give up after this many seconds
        #[arg(short, long, default_value = "30")]
        timeout: u64,
        /// Override the manifest's concurrent load limit
        #[arg(long)]
        max_running: Option<usize>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("sensorview-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", sensorview_common::crate_info());
            println!("scheduler: {}", sensorview_scheduler::crate_info());
            println!("resource: {}", sensorview_resource::crate_info());
            println!("bus: {}", sensorview_bus::crate_info());
            println!("render: {}", sensorview_render::crate_info());
            let order: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
            println!("draw order: camera-changed, screen-resized, {}", order.join(", "));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Categories => {
            for category in Category::ALL {
                println!("{:>2}  {category}", category.index());
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Load {
            manifest,
            timeout,
            max_running,
            json,
        } => load(manifest, Duration::from_secs(timeout), max_running, json),
    }
}

fn load(
    path: PathBuf,
    timeout: Duration,
    max_running: Option<usize>,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let manifest = SceneManifest::from_file(&path)
        .with_context(|| format!("loading manifest {}", path.display()))?;
    let config = match max_running {
        Some(limit) => SchedulerConfig::bounded(limit),
        None => manifest.scheduler_config(),
    };

    let scheduler = Rc::new(TaskScheduler::new(config));
    let bus = Rc::new(EventBus::new());
    let gpu = Rc::new(HeadlessContext::new());
    let log = Rc::new(MessageLog::new());

    let scene = Scene::load(&manifest, &scheduler, gpu.clone(), log.clone());

    let draws = Rc::new(Cell::new(0u64));
    let counter = Rc::clone(&draws);
    let _models = bus.connect(Category::Models, move || counter.set(counter.get() + 1));

    let mut render_loop = RenderLoop::new(
        manifest.loop_config(),
        Rc::clone(&scheduler),
        Rc::clone(&bus),
        ScreenSize::default(),
    );
    let mut events = HeadlessEvents::sleeping();
    let mut presenter = HeadlessPresenter::default();

    let started = Instant::now();
    render_loop.run_until(&mut events, &mut presenter, |_| {
        scene.is_settled() || started.elapsed() >= timeout
    });
    let elapsed = started.elapsed();

    let report = scene.report();
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in &report {
            match &line.error {
                Some(error) => println!("{:<8} {:<20} {:<9} {error}", line.kind, line.name, line.state),
                None => println!("{:<8} {:<20} {}", line.kind, line.name, line.state),
            }
        }
        let stats = render_loop.stats();
        println!(
            "{} resources in {:.1?}: {} frames, {} presented, {} model draws, {} gpu uploads, {} errors",
            report.len(),
            elapsed,
            stats.frames(),
            stats.presented(),
            draws.get(),
            gpu.upload_count(),
            log.count(MessageLevel::Error),
        );
    }

    if !scene.is_settled() {
        tracing::error!(timeout = ?timeout, pending = scheduler.pending(), "scene did not settle");
        return Ok(ExitCode::from(2));
    }
    if scene.failed() > 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
