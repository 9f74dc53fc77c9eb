use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use squall_common::{CacheError, TTL_NONE, epoch_secs};
use squall_store::{DocumentCollection, Filter, InsertOutcome, Patch, Record};

use crate::options::{Expiry, SetCondition, SetOptions};
use crate::pruner::prune_expired;

/// Fachada key-value sobre uma collection de documentos. Cada operação
/// emite exatamente uma chamada à collection; a expiração lógica é
/// avaliada de forma lazy na leitura e nunca dispara remoção.
#[derive(Clone)]
pub struct Cache {
    col: Arc<dyn DocumentCollection>,
}

impl Cache {
    /// Constrói a fachada: garante índices e faz uma varredura inicial de
    /// expirados. Falha aqui impede o uso da fachada.
    pub async fn open(col: Arc<dyn DocumentCollection>) -> Result<Self, CacheError> {
        col.ensure_indexes().await?;
        let removed = prune_expired(col.as_ref()).await?;
        if removed > 0 {
            debug!("varredura inicial removeu {removed} documentos expirados");
        }
        Ok(Self { col })
    }

    /// Valor armazenado em `key`, ou `None` se a chave não existe ou já
    /// expirou logicamente (mesmo que ainda não tenha sido varrida).
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let record = self.col.find_one(&Filter::Key(key.to_string())).await?;
        match record {
            Some(rec) if rec.is_expired_at(epoch_secs()) => Ok(None),
            Some(rec) => Ok(Some(rec.value)),
            None => Ok(None),
        }
    }

    /// Seta `key` para `value`. Retorna `Ok(true)` quando exatamente um
    /// documento foi criado ou alterado; `Ok(false)` quando a condição
    /// (create-only/update-only) não foi satisfeita — sem mutação.
    pub async fn set(
        &self,
        key: &str,
        value: Bytes,
        options: &SetOptions,
    ) -> Result<bool, CacheError> {
        let expires_at = match options.expiry {
            Some(expiry) => Some(epoch_secs() + expiry.as_secs()?),
            None => None,
        };

        match options.condition {
            Some(SetCondition::CreateOnly) => {
                let record = Record::new(key.to_string(), value, expires_at);
                match self.col.insert_unique(record).await? {
                    InsertOutcome::Created => Ok(true),
                    InsertOutcome::DuplicateKey => Ok(false),
                }
            }
            Some(SetCondition::UpdateOnly) => {
                let patch = Patch {
                    value: Some(value),
                    expires_at,
                };
                let n = self
                    .col
                    .update(&Filter::Key(key.to_string()), patch, false)
                    .await?;
                Ok(n == 1)
            }
            None => {
                // Upsert; sem duração o patch deixa a expiração existente intacta
                let patch = Patch {
                    value: Some(value),
                    expires_at,
                };
                let n = self
                    .col
                    .update(&Filter::Key(key.to_string()), patch, true)
                    .await?;
                Ok(n == 1)
            }
        }
    }

    /// Remove as chaves dadas, expiradas ou não. Retorna quantas saíram.
    pub async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        let n = self.col.remove_where(&Filter::KeyIn(keys.to_vec())).await?;
        Ok(n)
    }

    /// Seta `expires_at = now + ttl` na chave. `Ok(true)` sse a chave
    /// existia. Não cria a chave.
    pub async fn expire(
        &self,
        key: &str,
        ttl: impl Into<Expiry>,
    ) -> Result<bool, CacheError> {
        let expires_at = epoch_secs() + ttl.into().as_secs()?;
        let patch = Patch {
            value: None,
            expires_at: Some(expires_at),
        };
        let n = self
            .col
            .update(&Filter::Key(key.to_string()), patch, false)
            .await?;
        Ok(n == 1)
    }

    /// Segundos fracionários restantes até a expiração da chave, ou o
    /// sentinela `-1` quando a chave não existe, não tem expiração ou já
    /// expirou.
    pub async fn ttl(&self, key: &str) -> Result<f64, CacheError> {
        let now = epoch_secs();
        let record = self.col.find_one(&Filter::Key(key.to_string())).await?;
        let expires_at = match record.and_then(|r| r.expires_at) {
            Some(exp) => exp,
            None => return Ok(TTL_NONE),
        };

        let remaining = expires_at - now;
        if remaining <= 0.0 {
            Ok(TTL_NONE)
        } else {
            Ok(remaining)
        }
    }

    /// Remove incondicionalmente todos os documentos. Sempre sucede e é
    /// idempotente.
    pub async fn flush_db(&self) -> Result<(), CacheError> {
        self.col.remove_where(&Filter::All).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squall_store::MemoryCollection;

    async fn open_cache() -> (Cache, Arc<MemoryCollection>) {
        let col = Arc::new(MemoryCollection::new());
        let cache = Cache::open(col.clone()).await.unwrap();
        (cache, col)
    }

    /// Insere direto na collection um documento já expirado, sem passar
    /// pela fachada.
    async fn seed_expired(col: &MemoryCollection, key: &str, value: &str) {
        col.insert_unique(Record::new(
            key.into(),
            Bytes::from(value.to_string()),
            Some(epoch_secs() - 1.0),
        ))
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn get_missing_key() {
        let (cache, _) = open_cache().await;
        assert_eq!(cache.get("nada").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_get_roundtrip() {
        let (cache, _) = open_cache().await;
        let opts = SetOptions::default();
        assert!(cache.set("a", Bytes::from("b"), &opts).await.unwrap());
        assert_eq!(cache.get("a").await.unwrap(), Some(Bytes::from("b")));
    }

    #[tokio::test]
    async fn get_expired_is_lazy_and_nondestructive() {
        let (cache, col) = open_cache().await;
        seed_expired(&col, "velha", "x").await;

        // Logicamente expirada: leitura reporta ausente...
        assert_eq!(cache.get("velha").await.unwrap(), None);
        // ...mas não remove o documento — isso é papel do pruner
        assert_eq!(col.len(), 1);
    }

    #[tokio::test]
    async fn set_create_only() {
        let (cache, _) = open_cache().await;
        let opts = SetOptions::default();
        cache.set("a", Bytes::from("b"), &opts).await.unwrap();

        let nx = SetOptions {
            expiry: None,
            condition: Some(SetCondition::CreateOnly),
        };
        // Chave existe: não seta, sem mutação
        assert!(!cache.set("a", Bytes::from("c"), &nx).await.unwrap());
        assert_eq!(cache.get("a").await.unwrap(), Some(Bytes::from("b")));

        // Chave nova: cria
        assert!(cache.set("e", Bytes::from("f"), &nx).await.unwrap());
        assert_eq!(cache.get("e").await.unwrap(), Some(Bytes::from("f")));
    }

    #[tokio::test]
    async fn set_update_only() {
        let (cache, _) = open_cache().await;
        let xx = SetOptions {
            expiry: None,
            condition: Some(SetCondition::UpdateOnly),
        };
        // Chave ausente: não seta
        assert!(!cache.set("e", Bytes::from("f"), &xx).await.unwrap());
        assert_eq!(cache.get("e").await.unwrap(), None);

        let opts = SetOptions::default();
        cache.set("a", Bytes::from("b"), &opts).await.unwrap();
        assert!(cache.set("a", Bytes::from("c"), &xx).await.unwrap());
        assert_eq!(cache.get("a").await.unwrap(), Some(Bytes::from("c")));
    }

    #[tokio::test]
    async fn overwrite_without_duration_keeps_expiration() {
        let (cache, col) = open_cache().await;
        let with_ttl = SetOptions {
            expiry: Some(Expiry::Secs(300)),
            condition: None,
        };
        cache.set("a", Bytes::from("1"), &with_ttl).await.unwrap();

        let before = col
            .find_one(&Filter::Key("a".into()))
            .await
            .unwrap()
            .unwrap()
            .expires_at;
        assert!(before.is_some());

        // Overwrite sem duração: expiração fica como estava
        let opts = SetOptions::default();
        cache.set("a", Bytes::from("2"), &opts).await.unwrap();

        let after = col
            .find_one(&Filter::Key("a".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.value, Bytes::from("2"));
        assert_eq!(after.expires_at, before);
    }

    #[tokio::test]
    async fn overwrite_with_duration_replaces_expiration() {
        let (cache, col) = open_cache().await;
        let opts = SetOptions::default();
        cache.set("a", Bytes::from("1"), &opts).await.unwrap();

        let with_ttl = SetOptions {
            expiry: Some(Expiry::Secs(60)),
            condition: None,
        };
        cache.set("a", Bytes::from("2"), &with_ttl).await.unwrap();

        let rec = col
            .find_one(&Filter::Key("a".into()))
            .await
            .unwrap()
            .unwrap();
        assert!(rec.expires_at.is_some());
    }

    #[tokio::test]
    async fn millis_expiry_fails_without_touching_store() {
        let (cache, col) = open_cache().await;
        let opts = SetOptions {
            expiry: Some(Expiry::Millis(1500)),
            condition: None,
        };
        let err = cache.set("a", Bytes::from("b"), &opts).await.unwrap_err();
        assert!(matches!(err, CacheError::MillisExpiry));
        assert!(col.is_empty());

        let err = cache
            .expire("a", std::time::Duration::from_millis(250))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::MillisExpiry));
    }

    #[tokio::test]
    async fn delete_counts_only_matches() {
        let (cache, _) = open_cache().await;
        let opts = SetOptions::default();
        cache.set("a", Bytes::from("1"), &opts).await.unwrap();

        let n = cache
            .delete(&["a".into(), "chave-sumida".into()])
            .await
            .unwrap();
        assert_eq!(n, 1);

        let n = cache.delete(&["chave-sumida".into()]).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn expire_existing_and_missing() {
        let (cache, _) = open_cache().await;
        let opts = SetOptions::default();
        cache.set("a", Bytes::from("1"), &opts).await.unwrap();

        assert!(cache.expire("a", 15u64).await.unwrap());
        let ttl = cache.ttl("a").await.unwrap();
        assert!(ttl > 14.0 && ttl <= 15.0, "ttl fora da janela: {ttl}");

        // Não cria chave ausente
        assert!(!cache.expire("nada", 15u64).await.unwrap());
        assert_eq!(cache.get("nada").await.unwrap(), None);
    }

    #[tokio::test]
    async fn ttl_sentinel_cases() {
        let (cache, col) = open_cache().await;

        // Chave inexistente
        assert_eq!(cache.ttl("nada").await.unwrap(), TTL_NONE);

        // Sem expiração
        let opts = SetOptions::default();
        cache.set("fixa", Bytes::from("1"), &opts).await.unwrap();
        assert_eq!(cache.ttl("fixa").await.unwrap(), TTL_NONE);

        // Já expirada (ainda não varrida)
        seed_expired(&col, "velha", "x").await;
        assert_eq!(cache.ttl("velha").await.unwrap(), TTL_NONE);
    }

    #[tokio::test]
    async fn flush_db_removes_everything_and_is_idempotent() {
        let (cache, _) = open_cache().await;
        let opts = SetOptions::default();
        cache.set("a", Bytes::from("1"), &opts).await.unwrap();
        cache.set("b", Bytes::from("2"), &opts).await.unwrap();

        cache.flush_db().await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.get("b").await.unwrap(), None);

        // Segunda chamada também sucede
        cache.flush_db().await.unwrap();
    }

    #[tokio::test]
    async fn open_prunes_preexisting_expired_docs() {
        let col = Arc::new(MemoryCollection::new());
        seed_expired(&col, "velha", "x").await;
        col.insert_unique(Record::new("viva".into(), Bytes::from("1"), None))
            .await
            .unwrap();

        let cache = Cache::open(col.clone()).await.unwrap();
        assert_eq!(col.len(), 1);
        assert_eq!(cache.get("viva").await.unwrap(), Some(Bytes::from("1")));
    }

    #[tokio::test]
    async fn create_only_blocked_by_unpruned_expired_doc() {
        // Existência física governa o conditional write: documento expirado
        // mas não varrido ainda viola a constraint de unicidade
        let (cache, col) = open_cache().await;
        seed_expired(&col, "a", "velho").await;

        let nx = SetOptions {
            expiry: None,
            condition: Some(SetCondition::CreateOnly),
        };
        assert!(!cache.set("a", Bytes::from("novo"), &nx).await.unwrap());
    }
}
