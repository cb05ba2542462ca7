use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use racecheck::cli::Cli;
use racecheck::config::Property;
use racecheck::driver::Driver;
use racecheck::ir::text;
use racecheck::report;
use racecheck::solver::ReferenceSolver;

/// Exit codes (§6): 0 the property holds on every explored prefix, 1 the
/// property is violated, 2 inconclusive (killed/deadlocked/timeout), 3
/// reserved for infrastructure errors ("other nonzero reserved for internal
/// errors" — kept distinct from 2 so a caller can tell "we looked and found
/// nothing wrong to report" apart from "we couldn't finish looking").
const EXIT_OK: u8 = 0;
const EXIT_VIOLATION: u8 = 1;
const EXIT_INCONCLUSIVE: u8 = 2;
const EXIT_INTERNAL_ERROR: u8 = 3;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("racecheck: {err:#}");
            let _ = report::write_inconclusive(&cli.out_dir, &format!("{err:#}"));
            ExitCode::from(EXIT_INTERNAL_ERROR)
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<u8> {
    let config = cli.to_config();

    let source = std::fs::read_to_string(&config.input)
        .with_context(|| format!("failed to read input IR file {}", config.input.display()))?;
    let program = text::parse(&source).with_context(|| format!("failed to parse IR from {}", config.input.display()))?;

    let mut driver = Driver::new(config.clone(), Box::new(ReferenceSolver::new()));
    let verdict = driver.run(&program).context("exploration failed")?;

    report::write_verdict(&config.out_dir, &verdict).context("failed to write output.log")?;

    if let Some(reason) = &verdict.inconclusive_reason {
        tracing::warn!(%reason, "exploration ended inconclusively");
        return Ok(EXIT_INCONCLUSIVE);
    }

    let violated = match config.check {
        Property::NoDataRace => verdict.data_race_found,
        Property::Assert => verdict.assertion_violation,
    };
    Ok(if violated { EXIT_VIOLATION } else { EXIT_OK })
}
