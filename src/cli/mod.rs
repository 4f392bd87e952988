pub mod context;
pub mod recent;
pub mod record;
pub mod search;
pub mod show;
pub mod stats;

use crate::config::MemoryConfig;
use crate::engine::MemoryEngine;

/// Build an engine for the configured instance, honoring a `--instance`
/// override from the command line.
pub async fn build_engine(config: &MemoryConfig, instance: Option<&str>) -> MemoryEngine {
    let base = config.resolved_base_dir();
    let instance = instance.unwrap_or(&config.storage.instance);
    MemoryEngine::initialize(&base, instance, config.engine_options()).await
}
