//! Command-line interface definitions for the `capacity-hunter` binary.
//!
//! This module centralises the clap parser so both the main binary and the
//! build script can reuse it when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `capacity-hunter` binary.
#[derive(Debug, Parser)]
#[command(
    name = "capacity-hunter",
    version,
    about = "Retry Oracle Cloud free-tier ARM instance creation until capacity frees up",
    long_about = "Walks the Always Free A1.Flex profiles (4/24, 2/12, 1/6 OCPU/GB) in \
                  order, retrying every interval until one launches or the time budget \
                  is spent. Provisioning settings come from capacity-hunter.toml or \
                  CAPACITY_HUNTER_* environment variables."
)]
pub(crate) struct Cli {
    /// Maximum time to keep retrying, in hours.
    #[arg(long, value_name = "HOURS", default_value_t = 2.0, value_parser = parse_hours)]
    pub(crate) hours: f64,
    /// Seconds to wait between passes over the profile list.
    #[arg(
        long,
        value_name = "SECONDS",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub(crate) interval: u64,
}

fn parse_hours(raw: &str) -> Result<f64, String> {
    let hours: f64 = raw
        .parse()
        .map_err(|err| format!("`{raw}` is not a number: {err}"))?;
    if !hours.is_finite() || hours <= 0.0 {
        return Err(format!("`{raw}` must be a positive number of hours"));
    }
    Ok(hours)
}
