//! Curve synthesis command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::job::Job;

pub fn run(job_path: PathBuf, output: Option<PathBuf>, verbose: bool) -> Result<()> {
    if verbose {
        eprintln!("Loading job from: {}", job_path.display());
    }
    let job = Job::load(&job_path)?;

    let synth = job.synthesizer();
    let curves = synth.synthesize_all(&job.channel_specs(), job.apply_linearization);

    println!("{:<8} {:>8} {:>8} {:>8} {:>8}  Rolloff", "Channel", "End", "25%", "50%", "Peak");
    println!("{:-<60}", "");
    for curve in &curves {
        let rolloff = match (&curve.rolloff.toe, &curve.rolloff.shoulder) {
            (None, None) => "-",
            (Some(_), None) => "toe",
            (None, Some(_)) => "shoulder",
            (Some(_), Some(_)) => "toe+shoulder",
        };
        let peak = curve.values.iter().copied().max().unwrap_or(0);
        println!(
            "{:<8} {:>8} {:>8} {:>8} {:>8}  {}",
            curve.channel, curve.end_value, curve.values[64], curve.values[128], peak, rolloff
        );
    }

    if let Some(output_path) = output {
        let json = serde_json::to_string_pretty(&curves).context("Failed to serialize curves")?;
        std::fs::write(&output_path, json)
            .with_context(|| format!("Failed to write output file: {}", output_path.display()))?;
        println!();
        println!("Wrote {} curves to: {}", curves.len(), output_path.display());
    }

    Ok(())
}
