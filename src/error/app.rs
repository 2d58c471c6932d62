#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Cache(#[from] super::CacheError),

    #[error(transparent)]
    Download(#[from] super::DownloadError),

    #[error("{0}")]
    Other(String),
}
