use thiserror::Error;

#[derive(Debug, Error)]
pub enum IpdbError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type IpdbResult<T> = Result<T, IpdbError>;
