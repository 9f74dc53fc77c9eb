use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};
use tracing::{debug, warn};

use squall_common::{DEFAULT_PRUNE_INTERVAL_MS, StoreError, epoch_secs};
use squall_store::{DocumentCollection, Filter};

/// Uma varredura: remove da collection todo documento já expirado.
/// Usa o mesmo predicado de expiração do caminho de leitura, então nunca
/// remove documento vivo.
pub async fn prune_expired(col: &dyn DocumentCollection) -> Result<u64, StoreError> {
    col.remove_where(&Filter::ExpiredBefore(epoch_secs())).await
}

struct RunningSweep {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Task de fundo que varre documentos expirados em intervalo fixo,
/// independente de qualquer leitura. Start duplicado é rejeitado; stop é
/// determinístico — quando retorna, nenhuma varredura futura ocorre.
pub struct Pruner {
    col: Arc<dyn DocumentCollection>,
    every: Duration,
    running: Mutex<Option<RunningSweep>>,
}

impl Pruner {
    pub fn new(col: Arc<dyn DocumentCollection>) -> Self {
        Self::with_interval(col, Duration::from_millis(DEFAULT_PRUNE_INTERVAL_MS))
    }

    pub fn with_interval(col: Arc<dyn DocumentCollection>, every: Duration) -> Self {
        Self {
            col,
            every,
            running: Mutex::new(None),
        }
    }

    /// Inicia o loop de varredura. Retorna `false` (sem efeito) se já
    /// está rodando.
    pub async fn start(&self) -> bool {
        let mut slot = self.running.lock().await;
        if slot.is_some() {
            return false;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(sweep_loop(self.col.clone(), self.every, shutdown_rx));
        *slot = Some(RunningSweep { shutdown_tx, task });
        true
    }

    /// Sinaliza o shutdown e aguarda o loop encerrar. Quando retorna
    /// `true`, nenhuma varredura adicional vai ocorrer. Chamar sem estar
    /// rodando é um no-op que retorna `false`.
    pub async fn stop(&self) -> bool {
        let sweep = self.running.lock().await.take();
        match sweep {
            None => false,
            Some(sweep) => {
                let _ = sweep.shutdown_tx.send(true);
                let _ = sweep.task.await;
                true
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}

impl Drop for Pruner {
    fn drop(&mut self) {
        // Sinalização best-effort; stop() é o caminho determinístico
        if let Ok(mut slot) = self.running.try_lock()
            && let Some(sweep) = slot.take()
        {
            let _ = sweep.shutdown_tx.send(true);
        }
    }
}

async fn sweep_loop(
    col: Arc<dyn DocumentCollection>,
    every: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    // Primeiro tick é imediato: varre já na largada
    let mut ticker = interval(every);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match prune_expired(col.as_ref()).await {
                    Ok(0) => {}
                    Ok(n) => debug!("varredura removeu {n} documentos expirados"),
                    Err(e) => warn!("varredura de expirados falhou: {e}"),
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return;
                }
            }
        }
    }
}
