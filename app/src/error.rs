use derive_more::{Display, From};

#[derive(Debug, Display, From)]
pub enum Error {
    #[from]
    #[display("{_0}")]
    Config(crate::config::ConfigError),

    #[from]
    #[display("{_0}")]
    Catalog(crate::models::CatalogError),

    #[from]
    #[display("{_0}")]
    Transport(modeldock_transport::TransportError),

    #[from]
    #[display("{_0}")]
    Manager(crate::models::ManagerError),

    #[from]
    #[display("{_0}")]
    Io(std::io::Error),
}

impl std::error::Error for Error {}
