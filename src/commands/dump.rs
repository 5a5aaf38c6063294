use crate::cli::DumpArgs;
use crate::config::{redact_database_url, Config};
use crate::db::{DumpObserver, DumpOrchestrator, DumpRun, DumpSource, MysqlSource};
use crate::error::MaskdumpError;
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use console::style;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::TryStreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run(args: DumpArgs, config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path)?;
    let definition = config.get_definition(&args.definition)?;

    let mut options = config.dump_options();
    if let Some(batch_size) = args.batch_size {
        if batch_size == 0 {
            anyhow::bail!("--batch-size must be greater than zero");
        }
        options.batch_size = batch_size;
    }

    let output = output_path(&args.output, args.gzip);
    if output.exists() && !args.force {
        return Err(MaskdumpError::OutputExists(output.display().to_string()).into());
    }

    let url = config.database_url(args.database_url.as_deref())?;

    println!("\n{} Dump Plan", style("📋").bold());
    println!("  Source: {}", redact_database_url(&url));
    println!("  Definition: {}", args.definition);
    println!("  Output: {}", output.display());
    println!("  Batch size: {}", options.batch_size);
    println!("  Compress: {}", args.gzip);

    let mut source = MysqlSource::connect(&url).await?;
    let definitions = definition.resolve(&mut source).await?;
    println!("  Tables: {}", definitions.len());
    if definitions.is_empty() {
        warn!(
            "Definition '{}' resolves to no tables; the dump holds only session statements",
            args.definition
        );
    }

    println!("\n{} Dumping database...", style("🗄️").bold());

    let progress = Arc::new(ProgressObserver::new(definitions.len())?);
    let mut writer = DumpWriter::create(&output, args.gzip)?;

    let header = dump_header(source.database(), Utc::now());
    let written = {
        let mut run = DumpOrchestrator::new(&definitions)
            .with_options(options)
            .with_observer(progress.clone())
            .run(&mut source);
        match writer.write_all(header.as_bytes()) {
            Ok(()) => write_statements(&mut run, &mut writer).await,
            Err(err) => {
                run.abort().await;
                Err(err.into())
            }
        }
    };

    let result = written.and_then(|count| {
        writer.finish()?;
        Ok(count)
    });

    if let Err(err) = source.close().await {
        warn!("Failed to close source connection: {}", err);
    }

    let statements = match result {
        Ok(count) => count,
        Err(err) => {
            progress.abandon();
            if let Err(remove_err) = fs::remove_file(&output) {
                warn!(
                    "Failed to remove incomplete dump {}: {}",
                    output.display(),
                    remove_err
                );
            }
            return Err(err);
        }
    };

    info!("Dump saved to: {}", output.display());
    println!(
        "\n{} Dump complete: {} tables, {} statements",
        style("✓").green(),
        definitions.len(),
        statements
    );
    println!("  Location: {}", output.display());

    Ok(())
}

/// The path actually written, with `.gz` appended for compressed output.
fn output_path(output: &Path, gzip: bool) -> PathBuf {
    if gzip && output.extension().map_or(true, |ext| ext != "gz") {
        let mut name = output.as_os_str().to_os_string();
        name.push(".gz");
        PathBuf::from(name)
    } else {
        output.to_path_buf()
    }
}

/// Leading SQL comment naming the source schema and the UTC time of the dump.
fn dump_header(database: &str, at: DateTime<Utc>) -> String {
    format!(
        "-- maskdump dump of `{}` at {}\n",
        database,
        at.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Drain `run` into `writer`, aborting the run if a write fails.
async fn write_statements<S: DumpSource>(
    run: &mut DumpRun<'_, S>,
    writer: &mut impl Write,
) -> Result<usize> {
    let mut count = 0;
    let failure = {
        let mut statements = run.statements();
        loop {
            let Some(statement) = statements.try_next().await? else {
                break None;
            };
            if let Err(err) = writer.write_all(statement.as_bytes()) {
                break Some(err);
            }
            count += 1;
        }
    };
    if let Some(err) = failure {
        run.abort().await;
        return Err(err.into());
    }
    Ok(count)
}

enum DumpWriter {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl DumpWriter {
    fn create(path: &Path, gzip: bool) -> std::io::Result<Self> {
        let file = BufWriter::new(File::create(path)?);
        Ok(if gzip {
            DumpWriter::Gzip(GzEncoder::new(file, Compression::best()))
        } else {
            DumpWriter::Plain(file)
        })
    }

    fn finish(&mut self) -> std::io::Result<()> {
        match self {
            DumpWriter::Plain(w) => w.flush(),
            DumpWriter::Gzip(w) => {
                w.try_finish()?;
                w.get_mut().flush()
            }
        }
    }
}

impl Write for DumpWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            DumpWriter::Plain(w) => w.write(buf),
            DumpWriter::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            DumpWriter::Plain(w) => w.flush(),
            DumpWriter::Gzip(w) => w.flush(),
        }
    }
}

/// Renders table progress as a single bar.
struct ProgressObserver {
    pb: ProgressBar,
}

impl ProgressObserver {
    fn new(total: usize) -> Result<Self> {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        Ok(Self { pb })
    }

    fn abandon(&self) {
        self.pb.abandon_with_message("Failed");
    }
}

impl DumpObserver for ProgressObserver {
    fn table_started(&self, table: &str, _index: usize, _total: usize) {
        self.pb.set_message(format!("Exporting table {}", table));
    }

    fn table_finished(&self, _table: &str, index: usize, _total: usize) {
        self.pb.set_position(index as u64);
    }

    fn finished(&self, _total: usize) {
        self.pb.finish_with_message("Done");
    }
}
