//! Console and JSON presentation.
//!
//! The library only hands out structured values; everything that reaches
//! the terminal goes through here.

use crate::engine::TestConfig;
use crate::errors::ScannerError;
use crate::network::NetworkInfo;
use crate::progress::{ProgressSink, TestPhase};
use crate::results::{format_bytes, ConnectionQuality, TestResult};
use chrono::Local;
use colored::{Color, Colorize};
use serde::Serialize;

/// How command output is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Colored text with progress lines on stderr
    Console,
    /// Final results only, no progress
    Silent,
    /// Structured output only
    Json,
}

impl DisplayMode {
    /// `--json` wins; otherwise progress is shown only on a terminal.
    pub fn detect(json_flag: bool, is_tty: bool) -> Self {
        if json_flag {
            DisplayMode::Json
        } else if is_tty {
            DisplayMode::Console
        } else {
            DisplayMode::Silent
        }
    }

    pub fn shows_progress(&self) -> bool {
        *self == DisplayMode::Console
    }
}

/// Color for a speed value by its quality band.
pub fn speed_color(speed_mbps: f64) -> Color {
    match ConnectionQuality::from_mbps(speed_mbps) {
        ConnectionQuality::Poor => Color::Red,
        ConnectionQuality::Fair => Color::Yellow,
        ConnectionQuality::Good => Color::Green,
        ConnectionQuality::Excellent => Color::BrightGreen,
    }
}

pub fn format_speed(speed_mbps: f64) -> String {
    format!("{:.2} Mbps", speed_mbps)
}

pub fn format_latency(latency_ms: f64) -> String {
    format!("{:.0} ms", latency_ms)
}

/// One history entry as `↓ x Mbps / ↑ y Mbps`, ping and local time.
pub fn history_line(result: &TestResult) -> String {
    format!(
        "↓ {:.1} Mbps / ↑ {:.1} Mbps  {} ms  {}",
        result.download(),
        result.upload(),
        result.ping(),
        result.timestamp().with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
    )
}

/// What a run is about to measure, e.g.
/// `5 latency samples, download 97.66 KB + 488.28 KB, upload 97.66 KB`.
pub fn test_plan(config: &TestConfig) -> String {
    let mut sizes = config.download_sizes.clone();
    sizes.sort_unstable();
    let downloads: Vec<String> = sizes.into_iter().map(format_bytes).collect();

    format!(
        "{} latency samples, download {}, upload {}",
        config.latency_samples,
        downloads.join(" + "),
        format_bytes(config.upload_payload_bytes)
    )
}

pub fn print_test_plan(config: &TestConfig) {
    eprintln!("{}", test_plan(config).dimmed());
}

fn unknown(value: Option<&str>) -> String {
    value.unwrap_or("Unknown").to_string()
}

pub fn print_result(result: &TestResult) {
    let quality = result.download_quality();

    println!(
        "{} {}",
        "Download:".bold().white(),
        format_speed(result.download()).color(speed_color(result.download()))
    );
    println!(
        "{} {}",
        "Upload:".bold().white(),
        format_speed(result.upload()).color(speed_color(result.upload()))
    );
    println!("{} {}", "Ping:".bold().white(), format_latency(result.ping()));
    println!("{} {}", "Jitter:".bold().white(), format_latency(result.jitter()));
    println!(
        "{} {}",
        "Quality:".bold().white(),
        quality.description().color(speed_color(result.download()))
    );
}

pub fn print_network_info(info: &NetworkInfo) {
    let status = if info.online { "Online".green() } else { "Offline".red() };
    println!("{} {}", "Status:".bold().white(), status);

    let public = &info.public;
    println!(
        "{} {}",
        "Public IP:".bold().white(),
        unknown(public.ip.as_deref()).bright_blue()
    );
    println!(
        "{} {}",
        "Local IP:".bold().white(),
        info.local_ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "Not available".to_string())
            .bright_blue()
    );
    println!("{} {}", "ISP:".bold().white(), unknown(public.isp.as_deref()));
    println!(
        "{} {} ({})",
        "Country:".bold().white(),
        unknown(public.country.as_deref()),
        public.country_code.as_deref().unwrap_or("??")
    );
    println!("{} {}", "Region:".bold().white(), unknown(public.region.as_deref()));
    println!("{} {}", "City:".bold().white(), unknown(public.city.as_deref()));
    println!(
        "{} {}",
        "Timezone:".bold().white(),
        unknown(public.timezone.as_deref())
    );
    if let Some((latitude, longitude)) = public.coordinates {
        println!(
            "{} {:.4}, {:.4}",
            "Coordinates:".bold().white(),
            latitude,
            longitude
        );
    }

    println!(
        "{} {}",
        "IPv6:".bold().white(),
        supported(info.ipv6_supported, "Supported", "Not supported")
    );
    println!(
        "{} {}",
        "DNS over HTTPS:".bold().white(),
        supported(info.dns_over_https, "Available", "Unknown")
    );
    println!(
        "{} {}",
        "DNS lookup:".bold().white(),
        info.dns_resolution_ms
            .map(format_latency)
            .unwrap_or_else(|| "Unable to measure".to_string())
    );
    println!(
        "{} {}",
        "RTT:".bold().white(),
        info.rtt_ms
            .map(format_latency)
            .unwrap_or_else(|| "Unable to measure".to_string())
    );

    if let Some(effective_type) = info.connection.effective_type {
        println!("{} {}", "Connection:".bold().white(), effective_type);
    }
    if let Some(downlink) = info.connection.downlink_mbps {
        println!("{} {}", "Downlink:".bold().white(), format_speed(downlink));
    }

    let host = &info.host;
    println!(
        "{} {}",
        "Hostname:".bold().white(),
        unknown(host.hostname.as_deref())
    );
    println!(
        "{} {} ({}, {})",
        "Platform:".bold().white(),
        host.os,
        host.arch,
        host.family
    );
}

fn supported(flag: bool, yes: &str, no: &str) -> colored::ColoredString {
    if flag {
        format!("✓ {}", yes).green()
    } else {
        format!("✗ {}", no).yellow()
    }
}

pub fn print_history(history: &[TestResult]) {
    if history.is_empty() {
        println!("{}", "No test history yet".dimmed());
        return;
    }

    for (i, result) in history.iter().enumerate() {
        println!(
            "{} {}",
            format!("{:>2}.", i + 1).bold().white(),
            history_line(result)
        );
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), ScannerError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| ScannerError::config("failed to serialize output").with_source(e))?;
    println!("{}", json);
    Ok(())
}

/// Writes one status line per phase to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn on_phase(&self, phase: TestPhase, percent: u8) {
        eprintln!("{} {}", format!("[{:>3}%]", percent).dimmed(), phase.status());
    }
}
