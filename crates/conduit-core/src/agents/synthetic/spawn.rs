//! Synthetic agent spawn configuration.

use crate::spawn::SpawnConfig;

/// Runs any program that writes synthetic records to stdout.
///
/// The daemon ships a built-in emitter (`conduit-daemon synthetic-agent`);
/// tests point this at `/bin/sh -c` scripts.
#[derive(Debug, Clone, Default)]
pub struct SyntheticConfig {
    pub binary_path: String,
    pub args: Vec<String>,
    pub working_dir: String,
    /// Appended as the last argument when non-empty.
    pub prompt: String,
}

impl SyntheticConfig {
    pub fn build(self) -> SpawnConfig {
        let mut args = self.args;
        if !self.prompt.is_empty() {
            args.push(self.prompt);
        }
        SpawnConfig::new(&self.binary_path, args).working_dir(&self.working_dir)
    }
}
