//! Saved-result inspection command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use quad_curves::composite::CompositeResult;

pub fn run(result_path: PathBuf, percent: f64, verbose: bool) -> Result<()> {
    if verbose {
        eprintln!("Loading result from: {}", result_path.display());
    }
    let result = CompositeResult::load_json(&result_path)
        .with_context(|| format!("Failed to load result: {}", result_path.display()))?;

    let profile = result.density_profile(percent);
    println!(
        "Density profile at {:.1}% (sample {}), target delta {:.5}",
        profile.input_percent, profile.index, profile.density_delta
    );
    println!("{:<8} {:>10} {:>10} {:>12}", "Channel", "Share", "Weight", "Cumulative");
    println!("{:-<44}", "");
    for (channel, density) in &profile.channels {
        println!(
            "{:<8} {:>10.4} {:>10.4} {:>12.5}",
            channel, density.share, density.constant, density.cumulative
        );
    }

    println!();
    println!("Coverage:");
    println!("{:<8} {:>8} {:>10} {:>10} {:>8}", "Channel", "Limit", "Buffered", "Peak", "Clamps");
    println!("{:-<48}", "");
    for cov in &result.coverage.channels {
        println!(
            "{:<8} {:>8.4} {:>10.4} {:>10.4} {:>8}",
            cov.channel, cov.limit, cov.buffered_limit, cov.max_normalized, cov.clamp_count
        );
        if verbose {
            for event in &cov.clamped_samples {
                println!(
                    "    sample {:>3}: {:.5} clamped{}",
                    event.index,
                    event.overflow,
                    if event.truncated_by_end { " (end)" } else { "" }
                );
            }
        }
    }

    Ok(())
}
