/// Errors surfaced by store operations.
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Pool(r2d2::Error),
    /// No candle collection exists for this symbol.
    UnknownSymbol(String),
    /// Symbol contains characters that cannot name a collection.
    InvalidSymbol(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(e) => write!(f, "sqlite: {e}"),
            Self::Pool(e) => write!(f, "pool: {e}"),
            Self::UnknownSymbol(s) => write!(f, "unknown symbol: {s}"),
            Self::InvalidSymbol(s) => write!(f, "invalid symbol: {s}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(e: r2d2::Error) -> Self {
        Self::Pool(e)
    }
}
