use thiserror::Error;

#[derive(Error, Debug)]
pub enum MaskdumpError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dump definition not found: {0}")]
    DefinitionNotFound(String),

    #[error("Table not found in source database: {0}")]
    UnknownTable(String),

    #[error("Table defined more than once: {0}")]
    DuplicateTable(String),

    #[error("Table {0} has no primary key; set `cursor` in its definition to dump its rows")]
    MissingCursor(String),

    #[error("Failed reading chunk {chunk} of table {table}: {message}")]
    ChunkFetch {
        table: String,
        chunk: usize,
        message: String,
    },

    #[error("Schema catalog error for {table}: {message}")]
    Catalog { table: String, message: String },

    #[error("Database connection failed: {0}")]
    Connection(String),

    #[error("Output file already exists: {0}")]
    OutputExists(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl MaskdumpError {
    pub fn catalog(table: &str, err: impl std::fmt::Display) -> Self {
        Self::Catalog {
            table: table.to_string(),
            message: err.to_string(),
        }
    }

    pub fn chunk_fetch(table: &str, chunk: usize, err: impl std::fmt::Display) -> Self {
        Self::ChunkFetch {
            table: table.to_string(),
            chunk,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MaskdumpError>;
