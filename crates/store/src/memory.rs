use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use squall_common::StoreError;

use crate::collection::{DocumentCollection, Filter, InsertOutcome, Patch};
use crate::record::Record;

/// Collection in-memory sobre DashMap. A unicidade de `key` é estrutural:
/// a chave do mapa é o próprio campo único do documento.
#[derive(Debug, Default)]
pub struct MemoryCollection {
    data: DashMap<String, Record>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Número de documentos fisicamente presentes (expirados inclusos).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn apply_patch(record: &mut Record, patch: &Patch) {
    if let Some(ref value) = patch.value {
        record.value = value.clone();
    }
    if let Some(exp) = patch.expires_at {
        record.expires_at = Some(exp);
    }
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        // Índice único em `key` e lookup por expiração vêm da estrutura do mapa.
        debug!("índices garantidos pela estrutura do mapa");
        Ok(())
    }

    async fn find_one(&self, filter: &Filter) -> Result<Option<Record>, StoreError> {
        match filter {
            Filter::Key(k) => Ok(self.data.get(k).map(|r| r.value().clone())),
            _ => Ok(self
                .data
                .iter()
                .find(|r| filter.matches(r.value()))
                .map(|r| r.value().clone())),
        }
    }

    async fn update(
        &self,
        filter: &Filter,
        patch: Patch,
        upsert: bool,
    ) -> Result<u64, StoreError> {
        match filter {
            // Entry API do DashMap para atomicidade do caso chave única
            Filter::Key(k) => match self.data.entry(k.clone()) {
                Entry::Occupied(mut occ) => {
                    apply_patch(occ.get_mut(), &patch);
                    Ok(1)
                }
                Entry::Vacant(vac) => {
                    if upsert {
                        vac.insert(Record::new(
                            k.clone(),
                            patch.value.unwrap_or_default(),
                            patch.expires_at,
                        ));
                        Ok(1)
                    } else {
                        Ok(0)
                    }
                }
            },
            // Patch em lote; upsert não se aplica sem chave concreta
            _ => {
                let mut count = 0;
                for mut entry in self.data.iter_mut() {
                    if filter.matches(entry.value()) {
                        apply_patch(entry.value_mut(), &patch);
                        count += 1;
                    }
                }
                Ok(count)
            }
        }
    }

    async fn insert_unique(&self, record: Record) -> Result<InsertOutcome, StoreError> {
        match self.data.entry(record.key.clone()) {
            Entry::Occupied(_) => Ok(InsertOutcome::DuplicateKey),
            Entry::Vacant(vac) => {
                vac.insert(record);
                Ok(InsertOutcome::Created)
            }
        }
    }

    async fn remove_where(&self, filter: &Filter) -> Result<u64, StoreError> {
        match filter {
            Filter::Key(k) => Ok(self.data.remove(k).map_or(0, |_| 1)),
            Filter::KeyIn(keys) => {
                let mut count = 0;
                for k in keys {
                    if self.data.remove(k).is_some() {
                        count += 1;
                    }
                }
                Ok(count)
            }
            _ => {
                let mut count = 0;
                self.data.retain(|_, record| {
                    if filter.matches(record) {
                        count += 1;
                        false
                    } else {
                        true
                    }
                });
                Ok(count)
            }
        }
    }
}
