#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Pcap error: {0}")]
    Pcap(#[from] pcap::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("model fit failed: {0}")]
    Model(String),
    #[error("need at least {needed} samples, got {got}")]
    NotEnoughData { needed: usize, got: usize },
    #[error("invalid MAC address: {0:?}")]
    InvalidMac(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
