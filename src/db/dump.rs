//! The dump engine: walks a [`DumpDefinitionSet`] and yields SQL statements on demand.
//!
//! A run is pull-based. Nothing is read from the source until the consumer asks for the
//! next statement, and at most one chunk of rows is held in memory at a time.

use crate::db::dialect::{Dialect, MysqlDialect, SessionCheck};
use crate::db::policy::{DumpDefinitionSet, RowQuery, TableDumpPolicy};
use crate::db::serialize::RowSerializer;
use crate::db::source::{ChunkRequest, DataSource, SchemaCatalog, Value};
use crate::error::{MaskdumpError, Result};
use futures::stream::{self, LocalBoxStream, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Everything a run needs from the source database.
pub trait DumpSource: SchemaCatalog + DataSource {}

impl<T: SchemaCatalog + DataSource> DumpSource for T {}

#[derive(Debug, Clone)]
pub struct DumpOptions {
    /// Rows per INSERT statement.
    pub batch_size: usize,
    /// Checks disabled by the prologue; foreign key checks are always included.
    pub session_checks: Vec<SessionCheck>,
    /// Hold a read lock on the source table while its rows are streamed.
    pub lock_source_tables: bool,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            session_checks: SessionCheck::ALL.to_vec(),
            lock_source_tables: false,
        }
    }
}

impl DumpOptions {
    fn checks(&self) -> Vec<SessionCheck> {
        let mut checks = self.session_checks.clone();
        if !checks.contains(&SessionCheck::ForeignKeyChecks) {
            checks.push(SessionCheck::ForeignKeyChecks);
        }
        checks
    }
}

/// Receives per-table progress. Advisory only.
pub trait DumpObserver: Send + Sync {
    fn table_started(&self, _table: &str, _index: usize, _total: usize) {}

    fn table_finished(&self, _table: &str, _index: usize, _total: usize) {}

    fn finished(&self, _total: usize) {}
}

#[derive(Debug, Default)]
pub struct NoopObserver;

impl DumpObserver for NoopObserver {}

fn terminated(sql: &str) -> String {
    format!("{};\n", sql)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableState {
    Idle,
    Recreated,
    Locked,
    Streaming,
    Unlocked,
    Done,
}

/// Statement production for a single table.
struct TableDumper<'a> {
    policy: &'a TableDumpPolicy,
    state: TableState,
    query: RowQuery,
    cursor: Vec<String>,
    last_key: Option<Vec<Value>>,
    remaining: Option<usize>,
    chunk: usize,
    source_locked: bool,
}

impl<'a> TableDumper<'a> {
    fn new(policy: &'a TableDumpPolicy) -> Self {
        let query = policy.row_query();
        let remaining = query.limit;
        Self {
            policy,
            state: TableState::Idle,
            query,
            cursor: Vec::new(),
            last_key: None,
            remaining,
            chunk: 0,
            source_locked: false,
        }
    }

    fn is_done(&self) -> bool {
        self.state == TableState::Done
    }

    /// Advance one state, appending any statements produced to `out`.
    async fn step<S: DumpSource + ?Sized>(
        &mut self,
        source: &mut S,
        dialect: &dyn Dialect,
        options: &DumpOptions,
        out: &mut VecDeque<String>,
    ) -> Result<()> {
        let table = self.policy.name();
        let mode = self.policy.mode();

        match self.state {
            TableState::Idle => {
                if mode.recreates_table() {
                    let create = source.create_table_sql(table).await?;
                    out.push_back(terminated(&dialect.drop_table(table)));
                    out.push_back(terminated(create.trim_end().trim_end_matches(';')));
                }
                self.state = TableState::Recreated;
            }
            TableState::Recreated => {
                if mode.dumps_data() {
                    self.cursor = self.resolve_cursor(source).await?;
                    out.extend(dialect.lock_table(table).iter().map(|s| terminated(s)));
                    self.state = TableState::Locked;
                } else {
                    self.state = TableState::Done;
                }
            }
            TableState::Locked => {
                let extra = self.policy.extra_dump_sql();
                if !extra.trim().is_empty() {
                    out.push_back(if extra.ends_with('\n') {
                        extra
                    } else {
                        format!("{}\n", extra)
                    });
                }
                if options.lock_source_tables {
                    source.lock_for_read(table).await?;
                    self.source_locked = true;
                }
                self.state = TableState::Streaming;
            }
            TableState::Streaming => {
                let finished = match self.next_chunk(source, dialect, options, out).await {
                    Ok(finished) => finished,
                    Err(err) => {
                        self.release(source).await;
                        return Err(err);
                    }
                };
                if finished {
                    self.release(source).await;
                    out.extend(dialect.unlock_table(table).iter().map(|s| terminated(s)));
                    self.state = TableState::Unlocked;
                }
            }
            TableState::Unlocked => {
                self.state = TableState::Done;
            }
            TableState::Done => {}
        }

        Ok(())
    }

    /// The columns rows are ordered and paginated by. An override is matched against the
    /// table's columns ignoring case, and the primary key is appended to it so equal
    /// override values never straddle a chunk boundary.
    async fn resolve_cursor<S: DumpSource + ?Sized>(&self, source: &mut S) -> Result<Vec<String>> {
        let table = self.policy.name();
        let primary_key = source.primary_key(table).await?;

        let requested = match &self.query.cursor {
            Some(columns) if !columns.is_empty() => columns,
            _ if primary_key.is_empty() => {
                return Err(MaskdumpError::MissingCursor(table.to_string()));
            }
            _ => return Ok(primary_key),
        };

        let columns = source.table_columns(table).await?;
        let mut cursor: Vec<String> = Vec::with_capacity(requested.len() + primary_key.len());
        for name in requested {
            let column = columns
                .iter()
                .find(|c| c.eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    MaskdumpError::catalog(table, format!("cursor column {} not found", name))
                })?;
            if !cursor.contains(column) {
                cursor.push(column.clone());
            }
        }
        for column in primary_key {
            if !cursor.iter().any(|c| c.eq_ignore_ascii_case(&column)) {
                cursor.push(column);
            }
        }
        Ok(cursor)
    }

    /// Fetch and render one chunk. Returns true once the table has no more rows.
    async fn next_chunk<S: DumpSource + ?Sized>(
        &mut self,
        source: &mut S,
        dialect: &dyn Dialect,
        options: &DumpOptions,
        out: &mut VecDeque<String>,
    ) -> Result<bool> {
        let table = self.policy.name();
        let batch_size = options.batch_size.max(1);
        let limit = match self.remaining {
            Some(remaining) => remaining.min(batch_size),
            None => batch_size,
        };
        if limit == 0 {
            return Ok(true);
        }

        self.chunk += 1;
        let request = ChunkRequest {
            table,
            cursor: &self.cursor,
            after: self.last_key.as_deref(),
            filters: &self.query.filters,
            limit,
        };
        let rows = match source.fetch_chunk(request).await {
            Ok(rows) => rows,
            Err(err @ MaskdumpError::ChunkFetch { .. }) => return Err(err),
            Err(err) => return Err(MaskdumpError::chunk_fetch(table, self.chunk, err)),
        };
        debug!("Fetched {} rows from {} (chunk {})", rows.len(), table, self.chunk);

        let Some(last) = rows.last() else {
            return Ok(true);
        };
        let mut key = Vec::with_capacity(self.cursor.len());
        for column in &self.cursor {
            let value = last.get(column).cloned().ok_or_else(|| {
                MaskdumpError::chunk_fetch(
                    table,
                    self.chunk,
                    format!("cursor column {} missing from fetched rows", column),
                )
            })?;
            key.push(value);
        }

        let fetched = rows.len();
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= fetched.min(*remaining);
        }
        let finished = fetched < limit || self.remaining == Some(0);

        // `col > NULL` matches nothing, so a NULL boundary would end the table early.
        if !finished {
            if let Some(pos) = key.iter().position(Value::is_null) {
                return Err(MaskdumpError::chunk_fetch(
                    table,
                    self.chunk,
                    format!(
                        "cursor column {} is NULL at a chunk boundary; cursor columns must be non-null",
                        self.cursor[pos]
                    ),
                ));
            }
        }

        let serializer = RowSerializer::new(dialect);
        if let Some(insert) = serializer.insert_statement(self.policy, rows)? {
            out.push_back(terminated(&insert));
        }

        self.last_key = Some(key);
        Ok(finished)
    }

    /// Drop a source-side lock if this table holds one.
    async fn release<S: DumpSource + ?Sized>(&mut self, source: &mut S) {
        if !self.source_locked {
            return;
        }
        self.source_locked = false;
        if let Err(e) = source.unlock_all().await {
            warn!("Failed to release source lock on {}: {}", self.policy.name(), e);
        }
    }
}

/// Builds [`DumpRun`]s from a definition set.
pub struct DumpOrchestrator<'a> {
    definitions: &'a DumpDefinitionSet,
    dialect: Box<dyn Dialect>,
    options: DumpOptions,
    observer: Arc<dyn DumpObserver>,
}

impl<'a> DumpOrchestrator<'a> {
    pub fn new(definitions: &'a DumpDefinitionSet) -> Self {
        Self {
            definitions,
            dialect: Box::new(MysqlDialect::new()),
            options: DumpOptions::default(),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_options(mut self, options: DumpOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn DumpObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Start a single-pass run against `source`.
    pub fn run<S: DumpSource>(self, source: &'a mut S) -> DumpRun<'a, S> {
        DumpRun {
            definitions: self.definitions,
            dialect: self.dialect,
            options: self.options,
            observer: self.observer,
            source,
            state: RunState::Prologue,
            index: 0,
            current: None,
            pending: VecDeque::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Prologue,
    Tables,
    Epilogue,
    Finished,
}

/// A lazy, finite sequence of dump statements.
pub struct DumpRun<'a, S: DumpSource> {
    definitions: &'a DumpDefinitionSet,
    dialect: Box<dyn Dialect>,
    options: DumpOptions,
    observer: Arc<dyn DumpObserver>,
    source: &'a mut S,
    state: RunState,
    index: usize,
    current: Option<TableDumper<'a>>,
    pending: VecDeque<String>,
}

impl<'a, S: DumpSource> DumpRun<'a, S> {
    /// Pull the next statement. `Ok(None)` once the run is complete or has failed.
    pub async fn next_statement(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(statement) = self.pending.pop_front() {
                return Ok(Some(statement));
            }

            match self.state {
                RunState::Prologue => {
                    let checks = self
                        .options
                        .checks()
                        .into_iter()
                        .map(|check| self.dialect.set_check(check, false));
                    let block: String = self
                        .dialect
                        .begin_session()
                        .into_iter()
                        .chain(checks)
                        .map(|sql| terminated(&sql))
                        .collect();
                    self.pending.push_back(block);
                    self.state = RunState::Tables;
                }
                RunState::Tables => {
                    if let Err(err) = self.advance_table().await {
                        self.state = RunState::Finished;
                        self.current = None;
                        self.pending.clear();
                        return Err(err);
                    }
                }
                RunState::Epilogue => {
                    let block: String = self
                        .options
                        .checks()
                        .into_iter()
                        .rev()
                        .map(|check| self.dialect.set_check(check, true))
                        .chain(self.dialect.end_session())
                        .map(|sql| terminated(&sql))
                        .collect();
                    self.pending.push_back(block);
                    self.observer.finished(self.definitions.len());
                    self.state = RunState::Finished;
                }
                RunState::Finished => return Ok(None),
            }
        }
    }

    async fn advance_table(&mut self) -> Result<()> {
        let total = self.definitions.len();
        if self.current.is_none() {
            let definitions = self.definitions;
            let Some(policy) = definitions.tables().get(self.index) else {
                self.state = RunState::Epilogue;
                return Ok(());
            };
            info!(
                "Dumping table {} ({}) [{}/{}]",
                policy.name(),
                policy.mode(),
                self.index + 1,
                total
            );
            self.observer.table_started(policy.name(), self.index + 1, total);
            self.current = Some(TableDumper::new(policy));
        }

        if let Some(dumper) = self.current.as_mut() {
            dumper
                .step(
                    &mut *self.source,
                    self.dialect.as_ref(),
                    &self.options,
                    &mut self.pending,
                )
                .await?;
            if dumper.is_done() {
                let policy = dumper.policy;
                let name = policy.name();
                debug!("Finished table {}", name);
                self.observer.table_finished(name, self.index + 1, total);
                self.current = None;
                self.index += 1;
            }
        }
        Ok(())
    }

    /// Stop the run early, releasing any source-side lock still held.
    pub async fn abort(&mut self) {
        if let Some(dumper) = self.current.as_mut() {
            dumper.release(&mut *self.source).await;
        }
        self.current = None;
        self.pending.clear();
        self.state = RunState::Finished;
    }

    /// The remaining statements as a stream. The run stays usable once the stream is
    /// dropped, so a consumer can still [`DumpRun::abort`] it.
    pub fn statements(&mut self) -> LocalBoxStream<'_, Result<String>> {
        stream::try_unfold(self, |run| async move {
            let next = run.next_statement().await?;
            Ok::<_, MaskdumpError>(next.map(|statement| (statement, run)))
        })
        .boxed_local()
    }
}
