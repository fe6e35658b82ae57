use std::fs::OpenOptions;
use std::io::Write;
use tracing::error;

use crate::config::Config;

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub costs: usize,
    pub time_ms: usize,
    pub od_popped_nodes: usize,
    pub od_generated_nodes: usize,
    pub id_merges: usize,
    pub id_avoidances: usize,
    pub matchings_tried: usize,
}

impl Stats {
    pub fn print(&self, config: &Config) {
        let Some(output_path) = &config.output_path else {
            return;
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(output_path);
        let mut file = match file {
            Ok(file) => file,
            Err(e) => {
                error!("Failed to open '{}': {}", output_path, e);
                return;
            }
        };

        let file_content = format!(
            "{},{},{:?},{},{},{},{},{},{},{},{},{},{}\n",
            config.map_path,
            config.scen_path.as_deref().unwrap_or("random"),
            config.heuristic_mode,
            config.seed,
            self.costs,
            self.time_ms,
            self.od_popped_nodes,
            self.od_generated_nodes,
            self.id_merges,
            self.id_avoidances,
            self.matchings_tried,
            config.enable_matching_id,
            config.enable_sorting,
        );

        if let Err(e) = file.write_all(file_content.as_bytes()) {
            error!("Failed to write to file '{}': {}", output_path, e);
        }
    }
}
