mod check;
mod cli;
mod run;
mod settings;
mod watch;

use std::process::ExitCode;

use anyhow::Result;

use crate::settings::Settings;

fn main() -> Result<ExitCode> {
    let args = cli::parse();
    run::initialise_tracing();
    let settings = Settings::resolve(&args)?;

    if args.print_composed {
        return check::run_print_composed(&settings);
    }
    if args.check {
        return check::run_check(&settings, args.json);
    }
    run::run(settings)?;
    Ok(ExitCode::SUCCESS)
}
