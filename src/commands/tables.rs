use crate::cli::TablesArgs;
use crate::config::Config;
use crate::db::{DumpDefinitionSet, DumpMode, MysqlSource};
use anyhow::Result;
use console::style;
use std::path::Path;

pub async fn run(args: TablesArgs, config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path)?;
    let definition = config.get_definition(&args.definition)?;
    let url = config.database_url(args.database_url.as_deref())?;

    let mut source = MysqlSource::connect(&url).await?;
    let definitions = definition.resolve(&mut source).await;
    source.close().await?;
    let definitions = definitions?;

    println!(
        "\n{} Dump definition '{}' ({} tables)",
        style("📋").bold(),
        args.definition,
        definitions.len()
    );
    println!("{:-<50}", "");
    for line in plan_lines(&definitions) {
        println!("{}", line);
    }

    Ok(())
}

fn plan_lines(definitions: &DumpDefinitionSet) -> Vec<String> {
    if definitions.is_empty() {
        return vec![format!("  {}", style("No tables selected").dim())];
    }

    let mut lines = Vec::new();
    for (i, table) in definitions.tables().iter().enumerate() {
        let mode = match table.mode() {
            DumpMode::Full => style(table.mode().to_string()).green(),
            DumpMode::SchemaOnly => style(table.mode().to_string()).yellow(),
            DumpMode::Partial => style(table.mode().to_string()).cyan(),
        };
        lines.push(format!("  {:>3}. {} ({})", i + 1, table.name(), mode));

        let mut columns: Vec<_> = table.column_policies().collect();
        columns.sort_by(|a, b| a.column().cmp(b.column()));
        for column in columns {
            lines.push(format!(
                "       {} {}: {}",
                style("•").cyan(),
                column.column(),
                column.transform()
            ));
        }
    }
    lines
}
