use async_trait::async_trait;
use bytes::Bytes;

use squall_common::StoreError;

use crate::Record;

/// Filtro de seleção de documentos.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Documento com a chave exata.
    Key(String),
    /// Documentos cuja chave pertence ao conjunto.
    KeyIn(Vec<String>),
    /// Documentos com expiração presente e <= ao instante dado.
    ExpiredBefore(f64),
    /// Todos os documentos.
    All,
}

impl Filter {
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::Key(k) => record.key == *k,
            Filter::KeyIn(keys) => keys.iter().any(|k| *k == record.key),
            Filter::ExpiredBefore(now) => record.is_expired_at(*now),
            Filter::All => true,
        }
    }
}

/// Alteração parcial de um documento. Campos `None` ficam intactos.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    pub value: Option<Bytes>,
    pub expires_at: Option<f64>,
}

/// Resultado de um insert sob constraint de unicidade. Chave duplicada é
/// um resultado normal, nunca um erro.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Created,
    DuplicateKey,
}

/// Contrato da collection de documentos. Cada operação é atômica no nível
/// de documento; não há transações multi-chave.
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    /// Garante os índices da collection (unicidade de `key` + expiração).
    /// Chamado uma vez na inicialização.
    async fn ensure_indexes(&self) -> Result<(), StoreError>;

    async fn find_one(&self, filter: &Filter) -> Result<Option<Record>, StoreError>;

    /// Aplica o patch nos documentos selecionados. Com `upsert`, cria o
    /// documento quando nada casa (só suportado com `Filter::Key`).
    /// Retorna o número de documentos alterados ou criados.
    async fn update(
        &self,
        filter: &Filter,
        patch: Patch,
        upsert: bool,
    ) -> Result<u64, StoreError>;

    async fn insert_unique(&self, record: Record) -> Result<InsertOutcome, StoreError>;

    /// Remove os documentos selecionados, retornando quantos saíram.
    async fn remove_where(&self, filter: &Filter) -> Result<u64, StoreError>;
}
