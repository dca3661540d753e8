use bitcoin::Txid;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] bitbreadcrumb_coins_db::Error),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Coins database not found at {}", .0.display())]
    MissingDatabase(std::path::PathBuf),

    #[error("No unspent outputs of {0}")]
    NotFound(Txid),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
