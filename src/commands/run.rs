use anyhow::Context;
use botkit_core::{
    builtin_commands, Bootable, Bot, DispatchOutcome, LoopbackClient, LoopbackNetwork,
    PlatformClient,
};
use clap::ArgMatches;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

pub async fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let config = super::load_config(matches)?;
    super::init_tracing(&config.logging);

    let network = LoopbackNetwork::new();
    let bot = Bot::new(config.clone());
    for platform in &config.platforms {
        match platform.kind.as_str() {
            "loopback" => {
                bot.register_platform_client(LoopbackClient::factory(
                    platform.id.as_str(),
                    network.clone(),
                ));
            }
            other => {
                tracing::warn!(platform = %platform.id, kind = %other, "Unsupported platform kind, skipping");
            }
        }
    }
    for command in builtin_commands() {
        bot.register_command(command);
    }

    bot.boot().await.context("booting bot")?;
    let booted = bot.booted_platform_clients();
    println!("🤖 {} running with {} platform client(s)", bot.name(), booted.len());
    for client in &booted {
        let channels: Vec<String> = client
            .joined_channels()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        println!("  • {} [{}]", client.platform_name(), channels.join(", "));
    }
    println!("Type lines as <sender>@<channel>: <text>, Ctrl-D to quit");

    let mut outbound = network.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match outbound.recv().await {
                Ok(line) => println!("> {}", line),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Outbound printer lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                for outcome in network.inject(line).await {
                    if let DispatchOutcome::Failed { command, error } = outcome {
                        eprintln!("✗ {}: {}", command, error);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    let result = bot.teardown().await;
    // Let the printer drain the teardown lines.
    tokio::task::yield_now().await;
    printer.abort();
    result.context("tearing down bot")?;
    println!("✓ {} stopped", bot.name());
    Ok(())
}
