//! page-inspector - Defect inspection for scanned book pages
//!
//! CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use page_inspector::{
    cut_folder, exit_codes, inspect_folder, list_raw_scans, BookArgs, Cli, CommonArgs, Commands,
    Config, LiveArgs, LivePipeline, OutputMode, PipelineError, PipelineSession, ProgressCallback,
    ProgressTracker, ScanReport, SilentProgress, TracingTelemetry,
};

fn main() {
    let cli = Cli::parse();
    page_inspector::logging::init_tracing(cli.verbose);

    let result = match &cli.command {
        Commands::Live(args) => run_live(&cli, args),
        Commands::Cut(args) => run_books(&cli, args, BookStep::Cut),
        Commands::Inspect(args) => run_books(&cli, args, BookStep::Inspect),
        Commands::Run(args) => run_books(&cli, args, BookStep::Both),
        Commands::Info => run_info(&cli),
    };

    std::process::exit(match result {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_code_for(&e)
        }
    });
}

fn exit_code_for(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<PipelineError>() {
        Some(e) if e.is_artifact_failure() => exit_codes::MODEL_LOAD_ERROR,
        Some(PipelineError::FolderNotFound(_)) => exit_codes::INPUT_NOT_FOUND,
        _ if error.downcast_ref::<page_inspector::ConfigError>().is_some() => {
            exit_codes::INVALID_ARGS
        }
        _ => exit_codes::GENERAL_ERROR,
    }
}

// ============ Configuration ============

fn load_config(cli: &Cli, common: &CommonArgs) -> Result<Config> {
    // Load config file if specified, otherwise search the default locations
    let file_config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load().unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config file: {}", e);
            Config::default()
        }),
    };

    // CLI takes precedence
    let config = file_config.merge_with_cli(&common.overrides());
    config.validate()?;
    Ok(config)
}

fn session(cli: &Cli, common: &CommonArgs) -> Result<Arc<PipelineSession>> {
    let config = load_config(cli, common)?;
    Ok(PipelineSession::shared(config, TracingTelemetry::shared()))
}

// ============ Progress Callback Implementation ============

/// Progress bar for interactive terminals
struct BarProgress {
    bar: Mutex<Option<ProgressBar>>,
    verbose_level: u8,
}

impl BarProgress {
    fn new(verbose_level: u8) -> Self {
        Self {
            bar: Mutex::new(None),
            verbose_level,
        }
    }

    fn with_bar(&self, f: impl FnOnce(&mut Option<ProgressBar>)) {
        let mut bar = self.bar.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut bar);
    }
}

impl ProgressCallback for BarProgress {
    fn on_step_start(&self, step: &str) {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "  {msg:<24} [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
        bar.set_style(style);
        bar.set_message(step.to_string());
        self.with_bar(|slot| *slot = Some(bar));
    }

    fn on_step_progress(&self, current: usize, total: usize) {
        self.with_bar(|slot| {
            if let Some(bar) = slot {
                bar.set_length(total as u64);
                bar.set_position(current as u64);
            }
        });
    }

    fn on_step_complete(&self, step: &str, message: &str) {
        self.with_bar(|slot| {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
        });
        println!("  {}: {}", step, message);
    }

    fn on_debug(&self, message: &str) {
        if self.verbose_level > 1 {
            self.with_bar(|slot| match slot {
                Some(bar) => bar.println(format!("    [DEBUG] {}", message)),
                None => println!("    [DEBUG] {}", message),
            });
        }
    }
}

fn progress_for(cli: &Cli) -> Box<dyn ProgressCallback> {
    if cli.quiet {
        Box::new(SilentProgress)
    } else if std::io::stderr().is_terminal() {
        Box::new(BarProgress::new(cli.verbose))
    } else {
        Box::new(ProgressTracker::new(OutputMode::from_verbosity(cli.verbose)))
    }
}

// ============ Batch Commands ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BookStep {
    Cut,
    Inspect,
    Both,
}

fn run_books(cli: &Cli, args: &BookArgs, step: BookStep) -> Result<()> {
    let start_time = Instant::now();
    let session = session(cli, &args.common)?;
    let progress = progress_for(cli);

    let mut ok_count = 0usize;
    let mut error_count = 0usize;
    let mut last_error = None;

    for (idx, folder) in args.folders.iter().enumerate() {
        if !cli.quiet {
            println!("[{}/{}] {}", idx + 1, args.folders.len(), folder.display());
        }
        match run_book(&session, folder, step, progress.as_ref()) {
            Ok(()) => ok_count += 1,
            Err(e) => {
                eprintln!("Error processing {}: {}", folder.display(), e);
                error_count += 1;
                // Preset and model failures affect every book
                let fatal = e.is_artifact_failure();
                last_error = Some(e);
                if fatal {
                    break;
                }
            }
        }
    }

    if !cli.quiet {
        ProgressTracker::print_summary(args.folders.len(), ok_count, error_count);
        let stats = session.stats();
        if stats.has_failures() {
            println!(
                "Warnings: {} scans dropped, {} items failed (see log)",
                stats.dropped_scans, stats.failed_items
            );
        }
        println!("Total time: {:.2}s", start_time.elapsed().as_secs_f64());
    }

    match last_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn run_book(
    session: &PipelineSession,
    folder: &Path,
    step: BookStep,
    progress: &dyn ProgressCallback,
) -> std::result::Result<(), PipelineError> {
    if step != BookStep::Inspect {
        let report = cut_folder(session, folder, progress)?;
        tracing::info!(
            "Cut {}: {} pages, coordinate map {}",
            report.barcode,
            report.pages,
            report.coord_map.display()
        );
    }
    if step != BookStep::Cut {
        let report = inspect_folder(session, folder, progress)?;
        for (class, confirmed) in &report.finish.confirmed {
            let candidates = report.finish.candidates.get(class).copied().unwrap_or(0);
            println!("  {}: {} of {} candidates confirmed", class, confirmed, candidates);
        }
        if let Some(map) = &report.finish.defect_map {
            println!("  Defect map: {}", map.display());
        }
        if report.failed_pages > 0 {
            println!("  {} pages could not be inspected", report.failed_pages);
        }
        if report.finish.total_lost() > 0 {
            println!(
                "  {} spilled patches could not be reloaded",
                report.finish.total_lost()
            );
        }
    }
    Ok(())
}

// ============ Live Command ============

fn print_report(report: &ScanReport) {
    println!(
        "Scan {}: {} ({} defects)",
        report.scan_id,
        report.severity(),
        report.defects.len()
    );
}

fn run_live(cli: &Cli, args: &LiveArgs) -> Result<()> {
    let folder: PathBuf = args.folder.clone();
    let barcode = folder
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .context("Scan folder has no name to use as barcode")?;
    let session = session(cli, &args.common)?;

    let mut pipeline = LivePipeline::start(Arc::clone(&session), &barcode)?;
    pipeline.watch(&folder)?;
    if args.include_existing {
        for scan in list_raw_scans(&folder, &session.config().raw_extension)? {
            pipeline.add_scan(&scan)?;
        }
    }

    println!("Watching {} for new scans, press Enter to stop", folder.display());

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        std::thread::Builder::new()
            .name("stdin".into())
            .spawn(move || {
                let mut line = String::new();
                let _ = std::io::stdin().read_line(&mut line);
                running.store(false, Ordering::Release);
            })
            .context("Failed to start input thread")?;
    }

    let mut sink = |report: ScanReport| print_report(&report);
    let delivered = pipeline.supervise(&mut sink, || running.load(Ordering::Acquire));
    let stats = pipeline.stop();

    println!(
        "Stopped: {} scans reported, {} dropped, {} failed",
        delivered, stats.dropped_scans, stats.failed_items
    );
    Ok(())
}

// ============ Info Command ============

fn run_info(cli: &Cli) -> Result<()> {
    println!("page-inspector v{}", env!("CARGO_PKG_VERSION"));
    println!();

    // System Information
    println!("System Information:");
    println!("  Platform: {}", std::env::consts::OS);
    println!("  Arch: {}", std::env::consts::ARCH);
    println!("  CPUs: {}", num_cpus::get());

    // Config File Locations
    println!();
    println!("Config File Locations:");
    if let Some(path) = &cli.config {
        println!("  Explicit: {}", path.display());
    }
    for path in Config::search_paths() {
        let marker = if path.exists() { "found" } else { "not found" };
        println!("  {} ({})", path.display(), marker);
    }

    let config = load_config(cli, &CommonArgs::default())?;
    println!();
    println!("Effective Paths:");
    println!("  Root:    {}", config.root_dir.display());
    println!("  Presets: {}", config.presets_dir().display());
    match config.preset_path(None) {
        Some(preset) => println!("  Preset:  {}", preset.display()),
        None => println!("  Preset:  (none configured)"),
    }
    println!("  Model:   {}", config.confirm_model_path().display());
    println!("  Workers: {}", config.worker_count());

    Ok(())
}
