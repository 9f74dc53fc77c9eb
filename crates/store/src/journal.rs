use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};
use tracing::{error, info, warn};

use squall_common::{JournalError, MAX_DOCUMENT_SIZE, StoreError};

use crate::collection::{DocumentCollection, Filter, InsertOutcome, Patch};
use crate::memory::MemoryCollection;
use crate::record::Record;

const CHANNEL_CAPACITY: usize = 10_000;

const OP_INSERT: u8 = 0x01;
const OP_UPDATE: u8 = 0x02;
const OP_REMOVE: u8 = 0x03;

const FILTER_KEY: u8 = 0x01;
const FILTER_KEY_IN: u8 = 0x02;
const FILTER_EXPIRED_BEFORE: u8 = 0x03;
const FILTER_ALL: u8 = 0x04;

/// Política de fsync.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub enum FsyncPolicy {
    /// Fsync após cada operação.
    Always,
    /// Fsync a cada segundo.
    #[default]
    EverySec,
    /// Sem fsync explícito (deixa pro OS).
    No,
}

/// Mutação lógica da collection, como gravada no journal.
#[derive(Debug, Clone, PartialEq)]
enum Op {
    Insert(Record),
    Update {
        filter: Filter,
        patch: Patch,
        upsert: bool,
    },
    Remove(Filter),
}

// --- Codec: framing binário com campos prefixados por tamanho ---

fn put_blob(data: &[u8], dst: &mut BytesMut) {
    dst.put_u32(data.len() as u32);
    dst.put_slice(data);
}

fn put_opt_f64(value: Option<f64>, dst: &mut BytesMut) {
    match value {
        Some(v) => {
            dst.put_u8(1);
            dst.put_f64(v);
        }
        None => dst.put_u8(0),
    }
}

fn put_filter(filter: &Filter, dst: &mut BytesMut) {
    match filter {
        Filter::Key(k) => {
            dst.put_u8(FILTER_KEY);
            put_blob(k.as_bytes(), dst);
        }
        Filter::KeyIn(keys) => {
            dst.put_u8(FILTER_KEY_IN);
            dst.put_u32(keys.len() as u32);
            for k in keys {
                put_blob(k.as_bytes(), dst);
            }
        }
        Filter::ExpiredBefore(now) => {
            dst.put_u8(FILTER_EXPIRED_BEFORE);
            dst.put_f64(*now);
        }
        Filter::All => dst.put_u8(FILTER_ALL),
    }
}

fn encode_op(op: &Op, dst: &mut BytesMut) {
    match op {
        Op::Insert(record) => {
            dst.put_u8(OP_INSERT);
            put_blob(record.key.as_bytes(), dst);
            put_blob(&record.value, dst);
            put_opt_f64(record.expires_at, dst);
        }
        Op::Update {
            filter,
            patch,
            upsert,
        } => {
            dst.put_u8(OP_UPDATE);
            put_filter(filter, dst);
            match &patch.value {
                Some(v) => {
                    dst.put_u8(1);
                    put_blob(v, dst);
                }
                None => dst.put_u8(0),
            }
            put_opt_f64(patch.expires_at, dst);
            dst.put_u8(*upsert as u8);
        }
        Op::Remove(filter) => {
            dst.put_u8(OP_REMOVE);
            put_filter(filter, dst);
        }
    }
}

fn get_u8(src: &mut Cursor<&[u8]>) -> Result<u8, JournalError> {
    if !src.has_remaining() {
        return Err(JournalError::Incomplete);
    }
    Ok(src.get_u8())
}

fn get_f64(src: &mut Cursor<&[u8]>) -> Result<f64, JournalError> {
    if src.remaining() < 8 {
        return Err(JournalError::Incomplete);
    }
    Ok(src.get_f64())
}

fn get_blob(src: &mut Cursor<&[u8]>) -> Result<Bytes, JournalError> {
    if src.remaining() < 4 {
        return Err(JournalError::Incomplete);
    }
    let len = src.get_u32() as usize;
    if len > MAX_DOCUMENT_SIZE {
        return Err(JournalError::FieldTooLarge(len));
    }
    if src.remaining() < len {
        return Err(JournalError::Incomplete);
    }
    let pos = src.position() as usize;
    let data = Bytes::copy_from_slice(&src.get_ref()[pos..pos + len]);
    src.advance(len);
    Ok(data)
}

fn get_string(src: &mut Cursor<&[u8]>) -> Result<String, JournalError> {
    let blob = get_blob(src)?;
    String::from_utf8(blob.to_vec()).map_err(|e| JournalError::InvalidEncoding(e.to_string()))
}

fn get_opt_f64(src: &mut Cursor<&[u8]>) -> Result<Option<f64>, JournalError> {
    match get_u8(src)? {
        0 => Ok(None),
        1 => Ok(Some(get_f64(src)?)),
        flag => Err(JournalError::InvalidEncoding(format!(
            "flag de opção inválida: {flag:#x}"
        ))),
    }
}

fn get_filter(src: &mut Cursor<&[u8]>) -> Result<Filter, JournalError> {
    match get_u8(src)? {
        FILTER_KEY => Ok(Filter::Key(get_string(src)?)),
        FILTER_KEY_IN => {
            if src.remaining() < 4 {
                return Err(JournalError::Incomplete);
            }
            let count = src.get_u32() as usize;
            let mut keys = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                keys.push(get_string(src)?);
            }
            Ok(Filter::KeyIn(keys))
        }
        FILTER_EXPIRED_BEFORE => Ok(Filter::ExpiredBefore(get_f64(src)?)),
        FILTER_ALL => Ok(Filter::All),
        tag => Err(JournalError::InvalidFilterTag(tag)),
    }
}

fn decode_op(src: &mut Cursor<&[u8]>) -> Result<Op, JournalError> {
    match get_u8(src)? {
        OP_INSERT => {
            let key = get_string(src)?;
            let value = get_blob(src)?;
            let expires_at = get_opt_f64(src)?;
            Ok(Op::Insert(Record::new(key, value, expires_at)))
        }
        OP_UPDATE => {
            let filter = get_filter(src)?;
            let value = match get_u8(src)? {
                0 => None,
                1 => Some(get_blob(src)?),
                flag => {
                    return Err(JournalError::InvalidEncoding(format!(
                        "flag de opção inválida: {flag:#x}"
                    )));
                }
            };
            let expires_at = get_opt_f64(src)?;
            let upsert = get_u8(src)? != 0;
            Ok(Op::Update {
                filter,
                patch: Patch { value, expires_at },
                upsert,
            })
        }
        OP_REMOVE => Ok(Op::Remove(get_filter(src)?)),
        tag => Err(JournalError::InvalidOpTag(tag)),
    }
}

// --- Writer ---

/// Recebe operações via channel e faz append no arquivo de journal.
struct JournalWriter {
    rx: mpsc::Receiver<Op>,
    path: PathBuf,
    policy: FsyncPolicy,
}

impl JournalWriter {
    /// Loop principal: recebe operações e escreve no arquivo.
    async fn run(mut self) -> std::io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        let mut writer = BufWriter::new(file);
        let mut tick = interval(Duration::from_secs(1));

        info!("journal writer iniciado: {:?}", self.path);

        loop {
            tokio::select! {
                op = self.rx.recv() => {
                    match op {
                        Some(op) => {
                            let mut buf = BytesMut::new();
                            encode_op(&op, &mut buf);
                            writer.write_all(&buf).await?;

                            if self.policy == FsyncPolicy::Always {
                                writer.flush().await?;
                                writer.get_ref().sync_data().await?;
                            }
                        }
                        None => {
                            // Channel fechado — flush final
                            writer.flush().await?;
                            writer.get_ref().sync_data().await?;
                            info!("journal writer encerrado");
                            return Ok(());
                        }
                    }
                }
                _ = tick.tick(), if self.policy == FsyncPolicy::EverySec => {
                    writer.flush().await?;
                    writer.get_ref().sync_data().await?;
                }
            }
        }
    }
}

/// Lê o journal e re-aplica as operações para reconstruir o estado.
async fn replay_journal(path: &Path, mem: &MemoryCollection) -> Result<usize, StoreError> {
    if !path.exists() {
        info!("journal não encontrado, iniciando vazio");
        return Ok(0);
    }

    let mut file = File::open(path).await?;
    let mut data = Vec::new();
    file.read_to_end(&mut data).await?;

    let mut cursor = Cursor::new(&data[..]);
    let mut count = 0;

    while (cursor.position() as usize) < data.len() {
        match decode_op(&mut cursor) {
            Ok(op) => {
                apply_op(&op, mem).await;
                count += 1;
            }
            Err(JournalError::Incomplete) => {
                warn!("journal: registro incompleto no final do arquivo, parando replay");
                break;
            }
            Err(e) => {
                warn!("journal: registro inválido, parando replay: {e}");
                break;
            }
        }
    }

    info!("journal replay completo: {count} operações restauradas");
    Ok(count)
}

/// Re-aplica uma operação na collection in-memory. Memória não falha.
async fn apply_op(op: &Op, mem: &MemoryCollection) {
    match op {
        Op::Insert(record) => {
            let _ = mem.insert_unique(record.clone()).await;
        }
        Op::Update {
            filter,
            patch,
            upsert,
        } => {
            let _ = mem.update(filter, patch.clone(), *upsert).await;
        }
        Op::Remove(filter) => {
            let _ = mem.remove_where(filter).await;
        }
    }
}

/// Collection com journal append-only: estado vive em memória e cada
/// mutação efetiva é gravada de forma assíncrona para replay no próximo
/// open. Operações que não alteraram nada não entram no journal, então
/// varreduras ociosas do pruner não crescem o arquivo.
pub struct JournaledCollection {
    mem: MemoryCollection,
    tx: mpsc::Sender<Op>,
    writer: JoinHandle<()>,
}

impl JournaledCollection {
    /// Abre (ou cria) o journal em `path`, re-aplicando o conteúdo
    /// existente antes de aceitar operações novas.
    pub async fn open(path: impl Into<PathBuf>, policy: FsyncPolicy) -> Result<Self, StoreError> {
        let path = path.into();
        let mem = MemoryCollection::new();
        replay_journal(&path, &mem).await?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let writer = JournalWriter { rx, path, policy };
        let writer = tokio::spawn(async move {
            if let Err(e) = writer.run().await {
                error!("journal writer erro: {e}");
            }
        });

        Ok(Self { mem, tx, writer })
    }

    /// Fecha o channel e aguarda o flush final do writer.
    pub async fn close(self) {
        drop(self.tx);
        let _ = self.writer.await;
    }

    async fn append(&self, op: Op) {
        if self.tx.send(op).await.is_err() {
            warn!("journal writer fechado, mutação não persistida");
        }
    }
}

#[async_trait]
impl DocumentCollection for JournaledCollection {
    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        self.mem.ensure_indexes().await
    }

    async fn find_one(&self, filter: &Filter) -> Result<Option<Record>, StoreError> {
        self.mem.find_one(filter).await
    }

    async fn update(
        &self,
        filter: &Filter,
        patch: Patch,
        upsert: bool,
    ) -> Result<u64, StoreError> {
        let count = self.mem.update(filter, patch.clone(), upsert).await?;
        if count > 0 {
            self.append(Op::Update {
                filter: filter.clone(),
                patch,
                upsert,
            })
            .await;
        }
        Ok(count)
    }

    async fn insert_unique(&self, record: Record) -> Result<InsertOutcome, StoreError> {
        let outcome = self.mem.insert_unique(record.clone()).await?;
        if outcome == InsertOutcome::Created {
            self.append(Op::Insert(record)).await;
        }
        Ok(outcome)
    }

    async fn remove_where(&self, filter: &Filter) -> Result<u64, StoreError> {
        let count = self.mem.remove_where(filter).await?;
        if count > 0 {
            self.append(Op::Remove(filter.clone())).await;
        }
        Ok(count)
    }
}
