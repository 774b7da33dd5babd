//! # trd_raw_cli
//!
//! Part of the trd_raw crate family.
//!
//! This is the command line application to decode (and optionally re-encode) TRD CRU raw
//! files.
//!
//! ## Install
//!
//! Use `cargo install --path ./trd_raw_cli`
//!
//! ## Use
//!
//! Make a template configuration with
//!
//! ```bash
//! trd_raw_cli new -p config.yml
//! ```
//!
//! Edit it, then run
//!
//! ```bash
//! trd_raw_cli -p config.yml
//! ```
//!
//! Progress is shown with one bar per worker. Everything logged is also written to
//! `trd_raw.log` in the current directory.
use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use libtrd_raw::config::Config;
use libtrd_raw::process::{create_subsets, process_subset};
use libtrd_raw::worker_status::{BarColor, WorkerStatus};

const LOG_FILE: &str = "trd_raw.log";

fn make_template_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config)?;
    let mut file = File::create(path)?;
    file.write_all(yaml_str.as_bytes())?;
    Ok(())
}

fn bar_style(color: &BarColor) -> ProgressStyle {
    let template = match color {
        BarColor::CYAN => "{prefix} [{bar:40.cyan/blue}] {pos}% {msg}",
        BarColor::MAGENTA => "{prefix} [{bar:40.magenta/blue}] {pos}% {msg}",
        BarColor::RED => "{prefix} [{bar:40.red/blue}] {pos}% {msg}",
    };
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

fn update_bar(bar: &ProgressBar, status: &WorkerStatus) {
    let task = match status.color {
        BarColor::CYAN => "Decoding",
        BarColor::MAGENTA => "Encoding",
        BarColor::RED => "Failed",
    };
    bar.set_style(bar_style(&status.color));
    bar.set_message(format!("{task} file {}", status.file_index));
    bar.set_position((status.progress.clamp(0.0, 1.0) * 100.0) as u64);
}

fn main() {
    // Create a cli
    let matches = Command::new("trd_raw_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .global(true)
                .help("Path to the configuration file"),
        )
        .get_matches();

    // Initialize feedback
    let mut loggers: Vec<Box<dyn simplelog::SharedLogger>> = vec![simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )];
    if let Ok(file) = File::create(LOG_FILE) {
        loggers.push(simplelog::WriteLogger::new(
            simplelog::LevelFilter::Info,
            simplelog::Config::default(),
            file,
        ));
    }
    let logger = simplelog::CombinedLogger::new(loggers);

    let pb_manager = MultiProgress::new();

    LogWrapper::new(pb_manager.clone(), logger)
        .try_init()
        .expect("Could not create logging/progress!");

    // Parse the cli
    let config_path = match matches.get_one::<String>("path") {
        Some(path) => PathBuf::from(path),
        None => {
            log::error!("A configuration path is required (-p/--path)");
            return;
        }
    };

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        match make_template_config(&config_path) {
            Ok(()) => log::info!("Done."),
            Err(e) => log::error!("Could not write template config: {e}"),
        }
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!("Raw Path: {}", config.raw_path.to_string_lossy());
    log::info!("Output Path: {}", config.output_path.to_string_lossy());
    log::info!("Format: {}", config.format);
    log::info!(
        "Max half-CRU size: {} Page size: {}",
        config.max_half_cru_bytes,
        config.page_size
    );
    log::info!(
        "Keep compressed digits: {} Re-encode: {} Skip empty half-CRUs: {}",
        config.keep_compressed_digits,
        config.reencode,
        config.skip_empty_half_crus
    );
    log::info!("Number of workers: {}", config.n_threads);

    if !config.is_n_threads_valid() {
        log::error!("Number of workers must be at least 1!");
        return;
    }

    let files = match config.get_raw_files() {
        Ok(files) => files,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Found {} raw files.", files.len());

    // Spawn the workers! Only subsets with work get a thread
    let (tx, rx) = mpsc::channel::<WorkerStatus>();
    let mut workers = Vec::new();
    let mut bars = Vec::new();
    for (idx, subset) in create_subsets(&config, &files).into_iter().enumerate() {
        if subset.is_empty() {
            continue;
        }
        let bar = pb_manager.add(ProgressBar::new(100));
        bar.set_prefix(format!("Worker {idx}"));
        bar.set_style(bar_style(&BarColor::CYAN));
        bars.push((idx, bar));

        let conf = config.clone();
        let tx = tx.clone();
        workers.push(std::thread::spawn(move || {
            process_subset(conf, tx, idx, subset)
        }));
    }
    drop(tx);

    loop {
        // No UI event loop here, so poll the workers on a timer
        while let Ok(status) = rx.try_recv() {
            if let Some((_, bar)) = bars.iter().find(|(idx, _)| *idx == status.worker_id) {
                update_bar(bar, &status);
            }
        }
        if workers.iter().all(|worker| worker.is_finished()) {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(250));
    }
    while let Ok(status) = rx.try_recv() {
        if let Some((_, bar)) = bars.iter().find(|(idx, _)| *idx == status.worker_id) {
            update_bar(bar, &status);
        }
    }

    let mut failed = false;
    for worker in workers {
        match worker.join() {
            Ok(result) => match result {
                Ok(_) => (),
                Err(e) => {
                    failed = true;
                    log::error!("Processing failed with error: {e}");
                }
            },
            Err(_) => {
                failed = true;
                log::error!("An error occured joining one of the workers!");
            }
        }
    }
    for (_, bar) in bars {
        bar.finish();
    }

    if failed {
        log::warn!("Some files could not be processed, check {LOG_FILE} for details.");
    } else {
        log::info!("Successfully processed all raw files!");
    }
    log::info!("Done.");
}
