/// Erros do backend de documentos.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Erros de decodificação do journal.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("registro incompleto")]
    Incomplete,
    #[error("tag de operação inválida: {0:#x}")]
    InvalidOpTag(u8),
    #[error("tag de filtro inválida: {0:#x}")]
    InvalidFilterTag(u8),
    #[error("campo excede tamanho máximo ({0} bytes)")]
    FieldTooLarge(usize),
    #[error("encoding inválido: {0}")]
    InvalidEncoding(String),
}

/// Erros da camada de cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("expiração com resolução de milissegundos não é suportada")]
    MillisExpiry,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type alias.
pub type CacheResult<T> = Result<T, CacheError>;
