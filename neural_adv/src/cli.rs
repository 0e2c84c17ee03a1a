//! Command-line entry point definition.

use clap::Parser;

use crate::config::Options;

/// Adversarial NeRF training driver.
#[derive(Parser, Debug)]
#[command(name = "nerf-adv", version, about, long_about = None)]
pub struct Cli {
    /// Every option group, flattened into one flag namespace.
    #[command(flatten)]
    pub options: Options,
}

impl Cli {
    /// Consume the parsed command line.
    pub fn into_options(self) -> Options {
        self.options
    }
}
