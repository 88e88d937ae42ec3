//! Run reports and their JSON export.

use serde::{Deserialize, Serialize};
use skytrust_core::{CollectorSnapshot, FinalMetrics};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;

/// Everything one simulation run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Algorithm name from the configuration
    pub algorithm: String,

    /// Results directory tag from the configuration
    pub results_dir: String,

    pub seed: u64,

    /// Simulated time of the last processed event (seconds)
    pub final_time: f64,

    /// Events handled by the kernel loop
    pub events_processed: u64,

    /// Raw counters from the collector
    pub counters: CollectorSnapshot,

    /// Recorded trust interactions per outcome
    pub interactions: BTreeMap<String, u64>,

    pub metrics: FinalMetrics,
}

/// One batch of runs, as written by `--export`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunExport {
    pub runs: Vec<RunReport>,

    /// Mean metrics per algorithm, for batches of more than one seed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub means: Vec<FinalMetrics>,
}

impl RunExport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_run(&mut self, report: RunReport) {
        self.runs.push(report);
    }

    pub fn add_mean(&mut self, mean: FinalMetrics) {
        self.means.push(mean);
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(seed: u64) -> RunReport {
        RunReport {
            algorithm: "Base BTMSD".into(),
            results_dir: "default".into(),
            seed,
            final_time: 120.0,
            events_processed: 10,
            counters: CollectorSnapshot::default(),
            interactions: BTreeMap::from([("success".to_string(), 3)]),
            metrics: FinalMetrics {
                algorithm: "Base BTMSD".into(),
                pdr: 0.5,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_export_json_shape() {
        let mut export = RunExport::new();
        export.add_run(report(1));

        let value = serde_json::to_value(&export).unwrap();
        assert_eq!(value["runs"][0]["seed"], 1);
        assert_eq!(value["runs"][0]["metrics"]["pdr"], 0.5);
        assert_eq!(value["runs"][0]["interactions"]["success"], 3);
        // No mean row for a single run
        assert!(value.get("means").is_none());
    }

    #[test]
    fn test_write_to_file() {
        let mut export = RunExport::new();
        export.add_run(report(1));
        export.add_run(report(2));
        export.add_mean(report(1).metrics);

        let path = std::env::temp_dir().join(format!("skytrust-export-{}.json", std::process::id()));
        let path = path.to_string_lossy().to_string();
        export.write_to_file(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: RunExport = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.runs.len(), 2);
        assert_eq!(parsed.means.len(), 1);
        std::fs::remove_file(&path).unwrap();
    }
}
