use clap::Parser;
use pcmix_play::{Cli, play};
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // a missing operand is a usage error, exiting with code 2
    let cli = Cli::parse();

    match play(&cli.file, &cli.socket) {
        Ok(report) => {
            log::info!(
                "finished playing {} ({} bytes in {} messages)",
                cli.file.display(),
                report.bytes,
                report.messages,
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("play: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
