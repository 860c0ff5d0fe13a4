#![allow(clippy::multiple_crate_versions)]

mod commands;

use clap::{Arg, Command};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("FILE")
        .help("Bot configuration file")
        .default_value("botkit.toml")
}

#[tokio::main]
async fn main() {
    let matches = Command::new("botkit")
        .version(VERSION)
        .about("botkit - multi-platform chat bot runner")
        .subcommand(
            Command::new("run")
                .about("Boot the bot and bridge stdin to the loopback network")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("check")
                .about("Validate a configuration file")
                .arg(config_arg()),
        )
        .get_matches();

    let result = match matches.subcommand() {
        Some(("run", sub_matches)) => commands::run::run(sub_matches).await,
        Some(("check", sub_matches)) => commands::check::run(sub_matches),
        _ => {
            println!("botkit v{}", VERSION);
            println!("Use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("✗ {:#}", e);
        std::process::exit(1);
    }
}
