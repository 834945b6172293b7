use std::process::ExitCode;

use anyhow::Context;
use iss_globe::{Settings, app, logging};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("iss-globe: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading settings")?;
    logging::init_logging(settings.log_level()).context("initializing logging")?;

    let stop = app::install_stop_handler().context("installing signal handler")?;
    app::run(&settings, &stop)?;
    Ok(())
}
