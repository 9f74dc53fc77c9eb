use std::time::Duration;

use squall_common::CacheError;

/// Duração relativa até a expiração.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Segundos até expirar.
    Secs(u64),
    /// Milissegundos — resolução explicitamente não suportada; converter
    /// falha em vez de truncar silenciosamente.
    Millis(u64),
}

impl Expiry {
    /// Duração em segundos fracionários, rejeitando milissegundos.
    pub fn as_secs(self) -> Result<f64, CacheError> {
        match self {
            Expiry::Secs(s) => Ok(s as f64),
            Expiry::Millis(_) => Err(CacheError::MillisExpiry),
        }
    }
}

impl From<u64> for Expiry {
    fn from(secs: u64) -> Self {
        Expiry::Secs(secs)
    }
}

impl From<Duration> for Expiry {
    fn from(d: Duration) -> Self {
        if d.subsec_nanos() == 0 {
            Expiry::Secs(d.as_secs())
        } else {
            Expiry::Millis(d.as_millis() as u64)
        }
    }
}

/// Condição para SET. `Option<SetCondition>` torna a combinação
/// create-only + update-only irrepresentável.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetCondition {
    /// Só seta se a chave não existir.
    CreateOnly,
    /// Só seta se a chave já existir.
    UpdateOnly,
}

/// Opções do SET.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SetOptions {
    pub expiry: Option<Expiry>,
    pub condition: Option<SetCondition>,
}
