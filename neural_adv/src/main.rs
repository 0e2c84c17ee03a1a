//! `nerf-adv` command-line entry point.

use std::process::ExitCode;

use clap::Parser;

use neural_adv::cli::Cli;
use neural_adv::pipeline;
use neural_adv::NeuralAdvError;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let options = Cli::parse().into_options();
    match pipeline::run(options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            if matches!(err, NeuralAdvError::InvalidTargetLabel { .. }) {
                log::error!("usage: nerf-adv <PATH> --target_label <random|0..=999>");
            }
            ExitCode::from(err.exit_code())
        }
    }
}
