//! spiflasher CLI - Command-line tool for uploading application firmware
//! through a SPI bootloader.
//!
//! ## Features
//!
//! - Reset the target into its bootloader and upload a framed image
//! - Offline frame layout check (`--check`, with `--json` output)
//! - Environment variable and config file support

use anyhow::{Context, Result};
use clap::Parser;
use clap::error::ErrorKind;
use console::style;
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use spiflasher::transport::linux::{DEFAULT_GPIO_CHIP, DEFAULT_SPI_DEVICE};
use spiflasher::upgrade::{DEFAULT_READY_LINE, DEFAULT_RESET_LINE};
use spiflasher::{
    ImageLayout, LinuxGpioChip, LinuxSpiConfig, MAX_FRAME_SIZE, PollConfig, RC_ERROR, RC_OK,
    UpgradeConfig, Upgrader,
};
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(std::sync::atomic::Ordering::Relaxed) && console::colors_enabled_stderr()
}

mod config;

use config::Config;

/// spiflasher - Upload application firmware through a SPI bootloader.
///
/// Environment variables:
///   SPIFLASHER_SPI_DEVICE       - spidev node (default: /dev/spidev1.0)
///   SPIFLASHER_SPI_SPEED        - SPI clock in Hz (default: 1000000)
///   SPIFLASHER_GPIO_CHIP        - GPIO chip (default: /dev/gpiochip0)
#[derive(Parser, Debug)]
#[command(name = "spiflasher")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Firmware image to upload.
    #[arg(value_name = "FIRMWARE")]
    firmware: PathBuf,

    /// SPI device node [default: /dev/spidev1.0].
    #[arg(long, env = "SPIFLASHER_SPI_DEVICE", value_name = "PATH")]
    spi_device: Option<String>,

    /// SPI clock rate in Hz [default: 1000000].
    #[arg(long, env = "SPIFLASHER_SPI_SPEED", value_name = "HZ")]
    spi_speed: Option<u32>,

    /// SPI mode [default: 1].
    #[arg(
        long,
        env = "SPIFLASHER_SPI_MODE",
        value_name = "MODE",
        value_parser = clap::value_parser!(u8).range(0..=3)
    )]
    spi_mode: Option<u8>,

    /// GPIO character device [default: /dev/gpiochip0].
    #[arg(long, env = "SPIFLASHER_GPIO_CHIP", value_name = "PATH")]
    gpio_chip: Option<String>,

    /// GPIO line driving the target's reset [default: 35].
    #[arg(long, env = "SPIFLASHER_RESET_LINE", value_name = "LINE")]
    reset_line: Option<u32>,

    /// GPIO line the target pulls low when ready [default: 47].
    #[arg(long, env = "SPIFLASHER_READY_LINE", value_name = "LINE")]
    ready_line: Option<u32>,

    /// Ready-line poll interval in microseconds [default: 100].
    #[arg(long, env = "SPIFLASHER_POLL_INTERVAL_US", value_name = "US")]
    poll_interval_us: Option<u64>,

    /// Give up waiting for the ready line after this many milliseconds
    /// [default: wait forever].
    #[arg(long, env = "SPIFLASHER_MAX_WAIT_MS", value_name = "MS")]
    max_wait_ms: Option<u64>,

    /// Check the image's frame layout without touching hardware.
    #[arg(long)]
    check: bool,

    /// Print the --check summary as JSON on stdout.
    #[arg(long, requires = "check")]
    json: bool,

    /// Path to a configuration file.
    #[arg(long = "config", value_name = "PATH")]
    config_path: Option<PathBuf>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long)]
    quiet: bool,
}

/// Hardware settings after merging flags, environment and config files.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Settings {
    spi: LinuxSpiConfig,
    gpio_chip: String,
    upgrade: UpgradeConfig,
}

impl Settings {
    /// Resolve every setting: flag or environment first, then config file,
    /// then the built-in default.
    fn resolve(cli: &Cli, config: &Config) -> Self {
        let spi_device = cli
            .spi_device
            .clone()
            .or_else(|| config.spi.device.clone())
            .unwrap_or_else(|| DEFAULT_SPI_DEVICE.to_string());
        let mut spi = LinuxSpiConfig::new(spi_device);
        if let Some(speed) = cli.spi_speed.or(config.spi.speed_hz) {
            spi = spi.with_speed(speed);
        }
        if let Some(mode) = cli.spi_mode.or(config.spi.mode) {
            spi = spi.with_mode(mode);
        }

        let gpio_chip = cli
            .gpio_chip
            .clone()
            .or_else(|| config.gpio.chip.clone())
            .unwrap_or_else(|| DEFAULT_GPIO_CHIP.to_string());

        let mut poll = PollConfig::default();
        if let Some(us) = cli.poll_interval_us.or(config.polling.interval_us) {
            poll = poll.with_interval(Duration::from_micros(us));
        }
        poll = poll.with_max_wait(
            cli.max_wait_ms
                .or(config.polling.max_wait_ms)
                .map(Duration::from_millis),
        );

        let upgrade = UpgradeConfig::default()
            .with_reset_line(
                cli.reset_line
                    .or(config.gpio.reset_line)
                    .unwrap_or(DEFAULT_RESET_LINE),
            )
            .with_ready_line(
                cli.ready_line
                    .or(config.gpio.ready_line)
                    .unwrap_or(DEFAULT_READY_LINE),
            )
            .with_poll(poll);

        Self {
            spi,
            gpio_chip,
            upgrade,
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version go to stdout, usage errors to stderr.
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::from(RC_OK),
                _ => ExitCode::from(RC_ERROR),
            };
        },
    };

    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, std::sync::atomic::Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        // Disable all color output
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    init_logging(&cli);

    match run(&cli) {
        Ok(()) => ExitCode::from(RC_OK),
        Err(e) => {
            eprintln!("{} {e:#}", style("Error:").red().bold());
            ExitCode::from(RC_ERROR)
        },
    }
}

/// Setup logging based on verbosity.
fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "spiflasher v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );
}

fn run(cli: &Cli) -> Result<()> {
    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    if cli.check {
        return cmd_check(&cli.firmware, cli.json, cli.quiet);
    }

    let settings = Settings::resolve(cli, &config);
    debug!("Resolved settings: {settings:?}");
    cmd_upgrade(cli, &settings)
}

/// Upgrade command implementation.
fn cmd_upgrade(cli: &Cli, settings: &Settings) -> Result<()> {
    let firmware = &cli.firmware;

    if !cli.quiet {
        eprintln!(
            "{} Firmware image: {}",
            style("📦").cyan(),
            firmware.display()
        );
        eprintln!(
            "{} Using {} at {} Hz (mode {}), GPIO {} (reset {}, ready {})",
            style("🔌").cyan(),
            settings.spi.device,
            settings.spi.speed_hz,
            settings.spi.mode,
            settings.gpio_chip,
            settings.upgrade.reset_line,
            settings.upgrade.ready_line
        );
    }

    let mut upgrader = Upgrader::open(
        &settings.spi,
        LinuxGpioChip::new(settings.gpio_chip.clone()),
        settings.upgrade,
    )
    .context("Failed to set up SPI/GPIO transport")?;

    // Create progress bar
    let pb = if cli.quiet || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(100);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb.set_message("Uploading");
        pb
    };

    let result = upgrader.run(firmware, |current, total| {
        if total > 0 {
            pb.set_position((current * 100 / total) as u64);
        }
    });

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            pb.abandon();
            return Err(e).with_context(|| format!("Upgrade of {} failed", firmware.display()));
        },
    };
    pb.finish_with_message("Complete");

    if !cli.quiet {
        eprintln!(
            "\n{} Application updated: {} bytes in {} frames",
            style("🎉").green().bold(),
            report.bytes_transmitted,
            report.frames
        );
    }

    Ok(())
}

/// Check command implementation.
fn cmd_check(firmware: &Path, json: bool, quiet: bool) -> Result<()> {
    let layout = ImageLayout::from_file(firmware)
        .with_context(|| format!("Invalid firmware image {}", firmware.display()))?;

    if json {
        println!("{}", layout_json(&layout));
    } else if !quiet {
        eprintln!("\n{}", style("Firmware Image").bold().underlined());
        eprintln!("  Path: {}", firmware.display());
        eprintln!("  Size: {} bytes", layout.file_size);
        eprintln!("  Frames: {}", layout.frame_count());
        if let Some(largest) = layout.largest_frame() {
            eprintln!("  Largest frame: {largest} bytes (limit {MAX_FRAME_SIZE})");
        }
        if layout.is_frame_aligned() {
            eprintln!("  {} Frame layout valid", style("✓").green());
        } else {
            eprintln!(
                "  {} {} trailing bytes do not form a complete frame",
                style("✗").red(),
                layout.trailing
            );
        }
    }

    layout
        .validate()
        .with_context(|| format!("Invalid firmware image {}", firmware.display()))?;
    Ok(())
}

/// `--check --json` output.
fn layout_json(layout: &ImageLayout) -> String {
    let frames: Vec<serde_json::Value> = layout
        .frames
        .iter()
        .map(|frame| {
            serde_json::json!({
                "offset": frame.offset,
                "size": frame.size,
                "payload_len": frame.payload_len(),
            })
        })
        .collect();

    let info = serde_json::json!({
        "file_size": layout.file_size,
        "frame_count": layout.frame_count(),
        "framed_bytes": layout.framed_bytes(),
        "largest_frame": layout.largest_frame(),
        "max_frame_size": MAX_FRAME_SIZE,
        "trailing_bytes": layout.trailing,
        "valid": layout.is_frame_aligned(),
        "frames": frames,
    });

    serde_json::to_string_pretty(&info).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    // ---- Argument parsing ----

    #[test]
    fn test_cli_parse_firmware_only() {
        let cli = parse(&["spiflasher", "app.bin"]);
        assert_eq!(cli.firmware, PathBuf::from("app.bin"));
        assert!(!cli.check);
        assert!(!cli.json);
        assert_eq!(cli.verbose, 0);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_cli_requires_firmware() {
        let err = Cli::try_parse_from(["spiflasher"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_rejects_extra_positional() {
        assert!(Cli::try_parse_from(["spiflasher", "a.bin", "b.bin"]).is_err());
    }

    #[test]
    fn test_cli_json_requires_check() {
        assert!(Cli::try_parse_from(["spiflasher", "--json", "app.bin"]).is_err());
        let cli = parse(&["spiflasher", "--check", "--json", "app.bin"]);
        assert!(cli.check && cli.json);
    }

    #[test]
    fn test_cli_spi_mode_range() {
        assert!(Cli::try_parse_from(["spiflasher", "--spi-mode", "4", "app.bin"]).is_err());
        let cli = parse(&["spiflasher", "--spi-mode", "3", "app.bin"]);
        assert_eq!(cli.spi_mode, Some(3));
    }

    #[test]
    fn test_cli_verbose_count() {
        let cli = parse(&["spiflasher", "-vv", "app.bin"]);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_help_and_version_kinds() {
        let err = Cli::try_parse_from(["spiflasher", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        let err = Cli::try_parse_from(["spiflasher", "--version"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayVersion);
    }

    // ---- Settings resolution ----

    #[test]
    fn test_settings_defaults() {
        let cli = parse(&["spiflasher", "app.bin"]);
        let settings = Settings::resolve(&cli, &Config::default());

        assert_eq!(settings.spi, LinuxSpiConfig::default());
        assert_eq!(settings.spi.device, "/dev/spidev1.0");
        assert_eq!(settings.spi.speed_hz, 1_000_000);
        assert_eq!(settings.spi.mode, 1);
        assert_eq!(settings.gpio_chip, "/dev/gpiochip0");
        assert_eq!(settings.upgrade, UpgradeConfig::default());
        assert_eq!(settings.upgrade.poll.interval, Duration::from_micros(100));
        assert!(settings.upgrade.poll.max_wait.is_none());
    }

    #[test]
    fn test_settings_from_config() {
        let cli = parse(&["spiflasher", "app.bin"]);
        let mut config = Config::default();
        config.spi.device = Some("/dev/spidev0.1".to_string());
        config.spi.speed_hz = Some(500_000);
        config.gpio.reset_line = Some(12);
        config.polling.max_wait_ms = Some(2000);

        let settings = Settings::resolve(&cli, &config);
        assert_eq!(settings.spi.device, "/dev/spidev0.1");
        assert_eq!(settings.spi.speed_hz, 500_000);
        assert_eq!(settings.upgrade.reset_line, 12);
        assert_eq!(settings.upgrade.ready_line, 47);
        assert_eq!(
            settings.upgrade.poll.max_wait,
            Some(Duration::from_millis(2000))
        );
    }

    #[test]
    fn test_settings_flags_override_config() {
        let cli = parse(&[
            "spiflasher",
            "--spi-device",
            "/dev/spidev3.0",
            "--ready-line",
            "8",
            "--poll-interval-us",
            "500",
            "app.bin",
        ]);
        let mut config = Config::default();
        config.spi.device = Some("/dev/spidev0.1".to_string());
        config.gpio.ready_line = Some(20);
        config.polling.interval_us = Some(50);

        let settings = Settings::resolve(&cli, &config);
        assert_eq!(settings.spi.device, "/dev/spidev3.0");
        assert_eq!(settings.upgrade.ready_line, 8);
        assert_eq!(settings.upgrade.poll.interval, Duration::from_micros(500));
    }

    // ---- JSON output ----

    #[test]
    fn test_layout_json() {
        let image = [0x00, 0x02, 0xAB, 0xCD, 0x00, 0x00, 0x00];
        let layout = ImageLayout::scan(&image[..]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&layout_json(&layout)).unwrap();

        assert_eq!(value["file_size"], 7);
        assert_eq!(value["frame_count"], 2);
        assert_eq!(value["framed_bytes"], 6);
        assert_eq!(value["largest_frame"], 4);
        assert_eq!(value["max_frame_size"], 532);
        assert_eq!(value["trailing_bytes"], 1);
        assert_eq!(value["valid"], false);
        assert_eq!(value["frames"][1]["offset"], 4);
        assert_eq!(value["frames"][1]["payload_len"], 0);
    }
}
