//! `patchpipe check` - non-mutating update check.

use console::style;

use super::{build_patcher, CommonArgs};
use crate::error::CliError;
use patchpipe::PipelineConfig;

pub async fn run(args: &CommonArgs) -> Result<(), CliError> {
    let patcher = build_patcher(args, PipelineConfig::default())?;
    let summary = patcher.check_only().await?;

    if args.json {
        println!("{}", serde_json::to_string(&summary)?);
        return Ok(());
    }

    if summary.needs_update {
        println!(
            "{} {} patch file(s) required, {} to download",
            style("●").yellow(),
            summary.required_count,
            format_bytes(summary.total_bytes),
        );
    } else {
        println!("{} client is up to date", style("✓").green());
    }
    Ok(())
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
