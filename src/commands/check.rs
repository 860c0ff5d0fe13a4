use clap::ArgMatches;

pub fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let config = super::load_config(matches)?;

    println!("✓ {} is valid", super::config_path(matches).display());
    println!("  name: {}", config.name);
    println!(
        "  logging: {} ({:?})",
        config.logging.level, config.logging.format
    );

    let mut unresolved = Vec::new();
    for platform in &config.platforms {
        let credentials = match platform.credentials() {
            Ok(_) => "credentials ok".to_string(),
            Err(e) => {
                unresolved.push(platform.id.clone());
                e.to_string()
            }
        };
        println!(
            "  • {} [{}] autoboot={} channels={} ({})",
            platform.id,
            platform.kind,
            platform.autoboot,
            platform.channels.len(),
            credentials
        );
        for channel in &platform.channels {
            println!("      #{} {}", channel.name, channel.commands.join(" "));
        }
    }

    if unresolved.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("unresolved credentials for: {}", unresolved.join(", "))
    }
}
