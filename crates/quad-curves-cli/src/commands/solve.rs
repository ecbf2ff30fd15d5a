//! Composite redistribution command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use quad_curves::composite::{CompositeEngine, CompositeResult};
use quad_curves::import::TargetCsv;
use quad_curves::target::TargetSamples;

use crate::job::Job;

pub fn run(
    job_path: PathBuf,
    target_csv: Option<PathBuf>,
    measurement_csv: Option<PathBuf>,
    output: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    if verbose {
        eprintln!("Loading job from: {}", job_path.display());
    }
    let job = Job::load(&job_path)?;
    for (channel, density) in job.manual_densities() {
        log::info!("manual density {channel} = {density}");
    }

    let target = target_csv.as_deref().map(load_series).transpose()?;
    let measurement = measurement_csv.as_deref().map(load_series).transpose()?;

    let mut engine = CompositeEngine::new(job.composite.clone()).context("Invalid composite configuration")?;
    let request = job.request(target, measurement);
    let result = engine
        .run_synthesized(request, &job.synthesizer(), job.apply_linearization)
        .context("Composite run failed")?;

    print_summary(result);

    if let Some(output_path) = output {
        result
            .save_json(&output_path)
            .with_context(|| format!("Failed to write output file: {}", output_path.display()))?;
        println!();
        println!("Wrote result to: {}", output_path.display());
    }

    Ok(())
}

fn load_series(path: &std::path::Path) -> Result<TargetSamples> {
    let samples = TargetCsv::auto_detect()
        .import(path)
        .with_context(|| format!("Failed to import CSV: {}", path.display()))?;
    log::info!("{}: {} samples", path.display(), samples.samples.len());
    Ok(samples)
}

fn print_summary(result: &CompositeResult) {
    println!("Weighting: {}", result.weighting_mode.name());
    println!("Ladder (light to dark): {}", result.ladder.join(" < "));
    println!();

    println!("{:<8} {:>10} {:>10} {:>10} {:>8}", "Channel", "Weight", "Source", "Peak %", "Clamps");
    println!("{:-<52}", "");
    for dw in &result.density_weights {
        let coverage = result.coverage.channel(&dw.channel);
        let peak = coverage.map_or(0.0, |c| c.max_normalized * 100.0);
        let clamps = coverage.map_or(0, |c| c.clamp_count);
        println!(
            "{:<8} {:>10.4} {:>10} {:>10.2} {:>8}",
            dw.channel,
            dw.weight,
            format!("{:?}", dw.source).to_lowercase(),
            peak,
            clamps
        );
    }

    println!();
    println!(
        "Residual: mean {:.5}, max {:.5} at sample {}",
        result.residual.mean_abs, result.residual.max_abs, result.residual.max_index
    );
    if !result.smoothing_windows.is_empty() {
        println!("Smoothing windows:");
        for w in &result.smoothing_windows {
            println!("  {} -> {} [{}..={}]", w.outgoing, w.incoming.join(", "), w.start, w.end);
        }
    }

    if !result.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &result.warnings {
            println!("  - {warning}");
        }
    }
}
