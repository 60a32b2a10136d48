//! Sweetener CLI - batch watermarking and social-media exports
//!
//! Watermarks every image of a directory and writes one subdirectory of
//! platform-ready variants per enabled platform.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info};

use image_sweetener::{
    init_with_config, AspectRatio, Config, CornerPosition, ErrorPolicy, Pipeline, PipelineReport, Platform,
    PlatformRule, ProgressUpdate,
};

/// Sweetener - watermark a folder of images and export it for social media
#[derive(Parser)]
#[command(
    name = "sweetener",
    version,
    about = "Batch watermarking and social-media export for image directories",
    long_about = "Sweetener stamps an optional watermark on every image of a directory and then \
                  derives per-platform variants (Facebook, Instagram, Twitter, TikTok, Threads, \
                  Bluesky), each sized, letterboxed and encoded the way that platform expects. \
                  Settings come from a configuration file and can be overridden on the command line."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Directory holding the source images
    #[arg(value_name = "TARGET_DIR")]
    target_dir: Option<PathBuf>,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Watermark image; enables the watermark pass
    #[arg(short, long, value_name = "PATH")]
    watermark: Option<PathBuf>,

    /// Pin the watermark to a corner (repeatable)
    #[arg(long = "corner", value_name = "POS", value_parser = parse_corner)]
    corners: Vec<CornerPosition>,

    /// Corner watermark width as a percentage of the image width (10-100)
    #[arg(long, value_name = "PERCENT")]
    corner_scale: Option<u32>,

    /// Corner watermark opacity (0-100)
    #[arg(long, value_name = "PERCENT")]
    corner_transparency: Option<u32>,

    /// Also draw the watermark in the center
    #[arg(long)]
    center: bool,

    /// Center watermark width as a percentage of the image width (10-100)
    #[arg(long, value_name = "PERCENT")]
    center_scale: Option<u32>,

    /// Center watermark opacity (0-100)
    #[arg(long, value_name = "PERCENT")]
    center_transparency: Option<u32>,

    /// Counter-clockwise rotation of the center watermark (0-359)
    #[arg(long, value_name = "DEGREES")]
    center_rotation: Option<u32>,

    /// Export for a platform (repeatable); replaces the platforms in the config file
    #[arg(short, long = "platform", value_name = "NAME", value_parser = parse_platform, conflicts_with = "all_platforms")]
    platforms: Vec<Platform>,

    /// Export for every platform
    #[arg(long)]
    all_platforms: bool,

    /// Instagram target aspect ratio, e.g. 4:5 or 1.91:1
    #[arg(long, value_name = "W:H")]
    instagram_ratio: Option<String>,

    /// Number of worker threads (default: auto-detect)
    #[arg(short, long, value_name = "COUNT")]
    threads: Option<usize>,

    /// Skip unreadable files instead of aborting the pass
    #[arg(long)]
    skip_errors: bool,

    /// Write the effective settings back to the --config file
    #[arg(long, requires = "config")]
    save_config: bool,

    /// Show what would be written without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short = 'Q', long, conflicts_with = "verbose")]
    quiet: bool,
}

/// Available subcommands
#[derive(Subcommand)]
enum Commands {
    /// List the export rule of every platform
    Platforms,
    /// Validate a configuration file
    Config {
        /// Configuration file to validate
        file: PathBuf,
    },
    /// Generate an example configuration file
    ExampleConfig {
        /// Output file path
        #[arg(short, long, default_value = "sweetener.toml")]
        output: PathBuf,
        /// Use YAML format instead of TOML
        #[arg(long)]
        yaml: bool,
    },
}

/// Parse a corner name such as `bottom-right` or `top left`
fn parse_corner(s: &str) -> Result<CornerPosition, String> {
    let normalized = s.trim().to_lowercase().replace([' ', '_'], "-");
    CornerPosition::ALL
        .into_iter()
        .find(|corner| corner.to_string() == normalized)
        .ok_or_else(|| format!("Unknown corner '{s}'. Use top-left, top-right, bottom-left or bottom-right"))
}

fn parse_platform(s: &str) -> Result<Platform, String> {
    s.parse::<Platform>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() {
    let mut cli = Cli::parse();

    if let Some(command) = cli.command.take() {
        if let Err(e) = handle_subcommand(command) {
            eprintln!("{}: {:#}", style("Error").red().bold(), e);
            process::exit(1);
        }
        return;
    }

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {:#}", style("Error").red().bold(), e);
            process::exit(1);
        }
    };

    if let Err(e) = init_with_config(&config) {
        eprintln!("{}: Failed to initialize logging: {}", style("Error").red().bold(), e);
        process::exit(1);
    }

    if let Err(e) = run(&cli, config).await {
        eprintln!("{}: {:#}", style("Error").red().bold(), e);
        process::exit(1);
    }
}

/// Handle subcommands
fn handle_subcommand(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Platforms => show_platforms(),
        Commands::Config { file } => validate_config_file(&file)?,
        Commands::ExampleConfig { output, yaml } => generate_example_config(&output, yaml)?,
    }
    Ok(())
}

/// Settings from the config file (if any) with command-line overrides applied
fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) if path.exists() => {
            Config::from_file(path).with_context(|| format!("Failed to load configuration {}", path.display()))?
        }
        // First run with --save-config: the file is created afterwards
        Some(_) if cli.save_config => Config::default(),
        Some(path) => bail!("Configuration file {} does not exist", path.display()),
        None => Config::default(),
    };

    if let Some(target_dir) = &cli.target_dir {
        config.target_dir = Some(target_dir.clone());
    }

    let watermark = &mut config.watermark;
    if let Some(path) = &cli.watermark {
        watermark.path = Some(path.clone());
    }
    if !cli.corners.is_empty() {
        watermark.corner_positions = cli.corners.clone();
    }
    if let Some(scale) = cli.corner_scale {
        watermark.corner_scale = scale;
    }
    if let Some(transparency) = cli.corner_transparency {
        watermark.corner_transparency = transparency;
    }
    if cli.center {
        watermark.center_enabled = true;
    }
    if let Some(scale) = cli.center_scale {
        watermark.center_scale = scale;
    }
    if let Some(transparency) = cli.center_transparency {
        watermark.center_transparency = transparency;
    }
    if let Some(rotation) = cli.center_rotation {
        watermark.center_rotation = rotation;
    }

    if cli.all_platforms || !cli.platforms.is_empty() {
        for platform in Platform::ALL {
            config
                .platforms
                .set(platform, cli.all_platforms || cli.platforms.contains(&platform));
        }
    }

    if let Some(ratio) = &cli.instagram_ratio {
        config.instagram_aspect_ratio = ratio.clone();
    }
    if cli.threads.is_some() {
        config.processing.threads = cli.threads;
    }
    if cli.skip_errors {
        config.processing.error_policy = ErrorPolicy::Skip;
    }

    if cli.quiet {
        config.logging.level = "error".to_string();
    } else if cli.verbose {
        config.logging.level = "debug".to_string();
    }

    config.validate()?;
    Ok(config)
}

/// Run (or preview) the pipeline described by `config`
async fn run(cli: &Cli, config: Config) -> anyhow::Result<()> {
    let request = config.to_request()?;
    let pipeline = Pipeline::from_config(&config.processing)?;

    if config.enabled_platforms().is_empty() && request.watermark.is_none() {
        bail!("Nothing to do: enable a platform (--platform, --all-platforms) or set a watermark");
    }

    if cli.dry_run {
        for (pass, outputs) in pipeline.dry_run(&request)? {
            println!("{} ({} files):", style(&pass).cyan().bold(), outputs.len());
            for output in outputs {
                println!("  {}", output.display());
            }
        }
        return Ok(());
    }

    info!("Target directory: {:?}", request.target_dir);
    info!(
        "Platforms: {}",
        request.platforms.iter().map(|p| p.dir_name()).collect::<Vec<_>>().join(", ")
    );

    let progress = if cli.json || cli.quiet {
        None
    } else {
        Some(tokio::spawn(show_progress(pipeline.subscribe())))
    };

    // The pipeline (and with it the progress sender) is dropped when the
    // blocking task ends, which closes the progress stream.
    let report = tokio::task::spawn_blocking(move || pipeline.run(&request))
        .await
        .context("Pipeline task panicked")??;

    if let Some(handle) = progress {
        let _ = handle.await;
    }

    if cli.save_config {
        if let Some(path) = &cli.config {
            config
                .to_file(path)
                .with_context(|| format!("Failed to save configuration {}", path.display()))?;
            info!("Saved settings to {:?}", path);
        }
    }

    print_summary(&report, cli.json)?;

    if report.total_failed() > 0 && !cli.json {
        println!(
            "{}: {} files were skipped, see the log for details",
            style("Warning").yellow().bold(),
            report.total_failed()
        );
    }

    Ok(())
}

/// One progress bar per pass, driven by the pipeline's progress events
async fn show_progress(mut updates: broadcast::Receiver<ProgressUpdate>) {
    let multi = MultiProgress::new();
    let bar_style = ProgressStyle::with_template(
        "{prefix:>12.cyan.bold} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-");
    let mut bars: HashMap<String, ProgressBar> = HashMap::new();

    loop {
        match updates.recv().await {
            Ok(ProgressUpdate::PassStarted { pass, total_files }) => {
                let bar = multi.add(ProgressBar::new(total_files));
                bar.set_style(bar_style.clone());
                bar.set_prefix(pass.clone());
                bars.insert(pass, bar);
            }
            Ok(ProgressUpdate::FileCompleted { pass, filename, success, .. }) => {
                if let Some(bar) = bars.get(&pass) {
                    if !success {
                        bar.println(format!("{} {}: {}", style("!").red().bold(), pass, filename));
                    }
                    bar.set_message(filename);
                    bar.inc(1);
                }
            }
            Ok(ProgressUpdate::PassCompleted { final_state }) => {
                if let Some(bar) = bars.get(&final_state.pass) {
                    if final_state.failed_files > 0 {
                        bar.abandon_with_message(final_state.status_text());
                    } else {
                        bar.finish_with_message(final_state.speed_text());
                    }
                }
            }
            Err(RecvError::Lagged(skipped)) => debug!("Progress display skipped {} events", skipped),
            Err(RecvError::Closed) => break,
        }
    }

    for bar in bars.values().filter(|bar| !bar.is_finished()) {
        bar.abandon();
    }
}

/// Print the export rule table
fn show_platforms() {
    println!("{}", style("Platform export rules:").bold());
    println!();

    let ratio = AspectRatio::default();
    for platform in Platform::ALL {
        let rule = PlatformRule::for_platform(platform, ratio);
        println!(
            "  {:<10} {:<10} {}",
            style(platform.display_name()).cyan().bold(),
            format!("{}/", platform.dir_name()),
            rule.describe()
        );
    }

    println!();
    println!(
        "Instagram's ratio is set with {} (default {})",
        style("--instagram-ratio").dim(),
        ratio
    );
}

/// Validate configuration file
fn validate_config_file(file_path: &Path) -> anyhow::Result<()> {
    let config = Config::from_file(file_path)?;
    config.validate()?;

    println!("{}: Configuration file is valid", style("Success").green().bold());
    match &config.target_dir {
        Some(dir) => println!("Target directory: {}", dir.display()),
        None => println!("Target directory: (not set)"),
    }
    println!(
        "Watermark: {}",
        config
            .watermark
            .path
            .as_ref()
            .map_or_else(|| "(disabled)".to_string(), |p| p.display().to_string())
    );
    let platforms: Vec<_> = config.enabled_platforms().iter().map(|p| p.dir_name()).collect();
    println!(
        "Platforms: {}",
        if platforms.is_empty() { "(none)".to_string() } else { platforms.join(", ") }
    );

    Ok(())
}

/// Generate example configuration file
fn generate_example_config(output_path: &Path, use_yaml: bool) -> anyhow::Result<()> {
    let output_path = match output_path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => output_path.to_path_buf(),
        _ if use_yaml => output_path.with_extension("yaml"),
        _ => output_path.to_path_buf(),
    };

    let mut config = Config::default();
    config.platforms.set(Platform::Instagram, true);
    config.to_file(&output_path)?;

    let format = if use_yaml { "YAML" } else { "TOML" };
    println!(
        "{}: Generated example {} configuration: {}",
        style("Success").green().bold(),
        format,
        output_path.display()
    );

    Ok(())
}

/// Print the run summary, or the whole report as JSON
fn print_summary(report: &PipelineReport, json_output: bool) -> anyhow::Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!();
    println!("{}", style("Summary:").bold());
    for pass in report.passes() {
        println!(
            "  {:<11} {:>4} written{}  {:.2}MB  ratio {:.2}:1 ({:.1}% smaller)  {:.1} files/sec  ({})",
            style(&pass.name).cyan(),
            pass.successful(),
            if pass.failed() > 0 {
                format!(", {} {}", pass.failed(), style("failed").red())
            } else {
                String::new()
            },
            pass.total_output_size as f64 / 1024.0 / 1024.0,
            pass.compression_ratio(),
            pass.size_reduction(),
            pass.files_per_second(),
            pass.output_dir.display()
        );
    }
    println!("  {}: {}", style("Written").green(), report.total_successful());
    if report.total_failed() > 0 {
        println!("  {}: {}", style("Failed").red(), report.total_failed());
    }
    println!(
        "  {}: {:.2}MB",
        style("Output size").blue(),
        report.total_output_size() as f64 / 1024.0 / 1024.0
    );
    println!("  {}: {:.2}s", style("Duration").blue(), report.processing_time.as_secs_f64());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_corner_accepts_common_spellings() {
        assert_eq!(parse_corner("bottom-right").unwrap(), CornerPosition::BottomRight);
        assert_eq!(parse_corner("Top Left").unwrap(), CornerPosition::TopLeft);
        assert_eq!(parse_corner("bottom_left").unwrap(), CornerPosition::BottomLeft);
        assert!(parse_corner("middle").is_err());
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "sweetener",
            "/photos",
            "--platform",
            "tiktok",
            "--platform",
            "bluesky",
            "--watermark",
            "logo.png",
            "--corner",
            "top-right",
            "--center",
            "--center-rotation",
            "30",
            "--skip-errors",
        ]);

        let config = build_config(&cli).unwrap();
        assert_eq!(config.target_dir, Some(PathBuf::from("/photos")));
        assert_eq!(
            config.enabled_platforms().into_iter().collect::<Vec<_>>(),
            vec![Platform::TikTok, Platform::Bluesky]
        );
        assert_eq!(config.watermark.corner_positions, vec![CornerPosition::TopRight]);
        assert!(config.watermark.center_enabled);
        assert_eq!(config.watermark.center_rotation, 30);
        assert_eq!(config.processing.error_policy, ErrorPolicy::Skip);
    }

    #[test]
    fn test_all_platforms_flag() {
        let cli = Cli::parse_from(["sweetener", "/photos", "--all-platforms"]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.enabled_platforms().len(), Platform::ALL.len());
    }

    #[test]
    fn test_invalid_override_rejected() {
        let cli = Cli::parse_from(["sweetener", "/photos", "--watermark", "logo.png", "--corner-scale", "5"]);
        assert!(build_config(&cli).is_err());

        let cli = Cli::parse_from(["sweetener", "/photos", "--instagram-ratio", "wide"]);
        assert!(build_config(&cli).is_err());
    }
}
