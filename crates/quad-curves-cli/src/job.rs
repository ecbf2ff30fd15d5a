//! Job files shared by `synth` and `solve`.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use quad_curves::composite::{ChannelSpec, CompositeConfig, CompositeRequest, WeightingMode};
use quad_curves::curve::{CurveSource, CurveSynthesizer, LinearizationEntry, SynthesisOptions};
use quad_curves::interpolation::InterpolationKind;
use quad_curves::target::{TargetEntry, TargetSamples};
use serde::Deserialize;

/// One channel of a job.
#[derive(Debug, Clone, Deserialize)]
pub struct JobChannel {
    /// Channel name.
    pub name: String,
    /// Ink ceiling.
    pub end_value: u32,
    /// Base curve source (ramp when absent).
    #[serde(default)]
    pub source: CurveSource,
    /// Per-channel linearization.
    #[serde(default)]
    pub linearization: Option<LinearizationEntry>,
    /// Global linearization is already baked into the source.
    #[serde(default)]
    pub baked_global: bool,
    /// Manual density weight.
    #[serde(default)]
    pub density: Option<f64>,
}

/// A complete job: channels, synthesis options and composite settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub channels: Vec<JobChannel>,
    #[serde(default)]
    pub global_linearization: Option<LinearizationEntry>,
    #[serde(default)]
    pub synthesis: SynthesisOptions,
    #[serde(default = "default_true")]
    pub apply_linearization: bool,
    /// Target density samples (identity when absent).
    #[serde(default)]
    pub target: Option<TargetSamples>,
    #[serde(default)]
    pub measurement: Option<TargetSamples>,
    #[serde(default)]
    pub weighting: WeightingMode,
    #[serde(default)]
    pub interpolation: InterpolationKind,
    #[serde(default)]
    pub smoothing_percent: f64,
    #[serde(default)]
    pub composite: CompositeConfig,
}

fn default_true() -> bool {
    true
}

impl Job {
    /// Load a job from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid job file {}", path.display()))
    }

    /// Parse a job from JSON text.
    pub fn parse(text: &str) -> Result<Self> {
        let job: Self = serde_json::from_str(text)?;
        anyhow::ensure!(!job.channels.is_empty(), "job has no channels");
        Ok(job)
    }

    /// Synthesizer holding every channel's source and LUTs.
    pub fn synthesizer(&self) -> CurveSynthesizer {
        let mut synth = CurveSynthesizer::new(self.synthesis.clone());
        synth.set_global(self.global_linearization.clone());
        for ch in &self.channels {
            synth.set_source(ch.name.clone(), ch.source.clone());
            synth.set_linearization(ch.name.clone(), ch.linearization.clone());
            synth.set_baked_global(ch.name.clone(), ch.baked_global);
        }
        synth
    }

    /// `(name, end_value)` pairs in job order.
    pub fn channel_specs(&self) -> Vec<(String, u32)> {
        self.channels.iter().map(|c| (c.name.clone(), c.end_value)).collect()
    }

    /// Composite request, with optional target and measurement overrides.
    pub fn request(&self, target: Option<TargetSamples>, measurement: Option<TargetSamples>) -> CompositeRequest {
        let specs = self
            .channels
            .iter()
            .map(|c| ChannelSpec::new(c.name.clone(), c.end_value))
            .collect();
        let target = match target.or_else(|| self.target.clone()) {
            Some(samples) => TargetEntry::Samples(samples),
            None => TargetEntry::identity(),
        };
        let mut request = CompositeRequest::new(specs, target)
            .with_weighting(self.weighting)
            .with_interpolation(self.interpolation, self.smoothing_percent);
        if let Some(m) = measurement.or_else(|| self.measurement.clone()) {
            request = request.with_measurement(m);
        }
        for ch in &self.channels {
            if let Some(d) = ch.density {
                request = request.with_manual_density(ch.name.clone(), d);
            }
        }
        request
    }

    /// Manual densities keyed by channel.
    pub fn manual_densities(&self) -> BTreeMap<&str, f64> {
        self.channels
            .iter()
            .filter_map(|c| c.density.map(|d| (c.name.as_str(), d)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB: &str = r#"{
        "channels": [
            { "name": "K", "end_value": 60000, "density": 0.5 },
            { "name": "LK", "end_value": 20000,
              "source": { "kind": "smart", "points": [
                  { "input": 0, "output": 0 }, { "input": 100, "output": 100 } ] } }
        ],
        "weighting": "isolated"
    }"#;

    #[test]
    fn test_parse_defaults() {
        let job = Job::parse(JOB).unwrap();
        assert_eq!(job.channels.len(), 2);
        assert!(job.apply_linearization);
        assert_eq!(job.weighting, WeightingMode::Isolated);
        assert_eq!(job.channels[0].source, CurveSource::Ramp);
        assert!(job.channels[1].source.is_smart());
        assert_eq!(job.manual_densities().get("K"), Some(&0.5));
        assert_eq!(job.composite, CompositeConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, JOB.as_bytes()).unwrap();
        let job = Job::load(file.path()).unwrap();
        assert_eq!(job.channel_specs(), vec![("K".to_string(), 60000), ("LK".to_string(), 20000)]);

        let request = job.request(None, None);
        assert_eq!(request.weighting, WeightingMode::Isolated);
        assert_eq!(request.manual_densities.get("K"), Some(&0.5));
        assert!(request.measurement.is_none());

        let missing = file.path().with_extension("missing");
        assert!(Job::load(&missing).is_err());
    }

    #[test]
    fn test_empty_job_rejected() {
        assert!(Job::parse(r#"{ "channels": [] }"#).is_err());
        assert!(Job::parse("not json").is_err());
    }

    #[test]
    fn test_synthesizer_covers_channels() {
        let job = Job::parse(JOB).unwrap();
        let synth = job.synthesizer();
        let curves = synth.synthesize_all(&job.channel_specs(), job.apply_linearization);
        assert_eq!(curves.len(), 2);
        assert_eq!(curves[0].values[255], 60000);
        assert_eq!(curves[1].values[255], 20000);
    }
}
