use clap::Parser;

mod cli;
mod commands;
mod exit_codes;
mod output;

use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let exit_code = match cli.command {
        cli::Command::Outlets(args) => commands::outlets::execute(args),
        cli::Command::Schema(args) => commands::schema::execute(args),
        cli::Command::Extract(args) => commands::extract::execute(args),
        cli::Command::Prefs(args) => commands::prefs::execute(args),
        cli::Command::Record(args) => commands::record::execute(args).await,
        cli::Command::Discover(args) => commands::discover::execute(args).await,
        cli::Command::Relay(args) => commands::relay::execute(args),
    };

    std::process::exit(exit_code);
}
