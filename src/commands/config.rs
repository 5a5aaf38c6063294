use crate::cli::{ConfigArgs, ConfigCommands};
use crate::config::{generate_sample_config, redact_database_url, Config};
use anyhow::Result;
use console::style;
use std::fs;
use std::path::Path;

pub fn run(args: ConfigArgs, config_path: Option<&Path>) -> Result<()> {
    match args.command {
        ConfigCommands::Init { output } => init_config(&output),
        ConfigCommands::Show => show_config(config_path),
    }
}

fn init_config(output: &Path) -> Result<()> {
    if output.exists() {
        println!(
            "{} Config file already exists: {}",
            style("⚠️").yellow(),
            output.display()
        );
        return Ok(());
    }

    let sample = generate_sample_config();
    fs::write(output, sample)?;

    println!(
        "{} Created config file: {}",
        style("✓").green(),
        output.display()
    );
    println!("\nEdit the file to set the source URL and the columns to mask.");

    Ok(())
}

fn show_config(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path)?;

    println!("\n{} Current Configuration", style("⚙️").bold());
    println!("{:-<50}", "");

    println!("\nConnection:");
    match &config.connection.url {
        Some(url) => println!("  url: {}", redact_database_url(url)),
        None => println!("  url: (not set)"),
    }

    println!("\nDump:");
    println!("  Batch size: {}", config.dump.batch_size);
    println!("  Lock source tables: {}", config.dump.lock_source_tables);
    println!("  Session checks:");
    for check in &config.dump.session_checks {
        println!("    - {}", check.variable());
    }

    println!("\nDefinitions:");
    if config.definitions.is_empty() {
        println!("  No definitions configured");
        println!("\n  Run 'maskdump config init' to create a config file");
    }
    for (name, definition) in &config.definitions {
        println!("  [{}]", name);
        println!("    all_tables: {}", definition.all_tables);
        if !definition.exclude.is_empty() {
            println!("    exclude: {}", definition.exclude.join(", "));
        }
        for table in &definition.tables {
            println!(
                "    {} {} ({}, {} masked columns)",
                style("•").cyan(),
                table.name,
                table.mode,
                table.columns.len()
            );
        }
    }

    Ok(())
}
