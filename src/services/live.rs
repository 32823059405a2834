// src/services/live.rs

use std::{future::Future, sync::Arc};

use tokio::{sync::watch, task::JoinSet};

use crate::db::store::{DataStore, Relation, RowFilter, StoreError};

/// Uma view que se recarrega inteira a cada notificação de mudança.
///
/// Cada notificação dispara uma nova busca completa, sem debounce. Todas
/// publicam no mesmo canal `watch`, então vale a última busca a terminar.
/// Ao cancelar (ou descartar) a view, os listeners são abortados e as
/// assinaturas do store liberadas.
pub struct LiveView<T> {
    rx: watch::Receiver<T>,
    listeners: JoinSet<()>,
}

impl<T> LiveView<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub async fn start<F, Fut>(
        store: &dyn DataStore,
        sources: Vec<(Relation, Option<RowFilter>)>,
        fetch: F,
    ) -> Result<Self, StoreError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        // Assina antes da carga inicial para não perder mudanças no meio do caminho
        let mut subscriptions = Vec::with_capacity(sources.len());
        for (relation, filter) in sources {
            subscriptions.push(store.subscribe(relation, filter).await?);
        }

        let (tx, rx) = watch::channel(fetch().await);
        let tx = Arc::new(tx);
        let fetch = Arc::new(fetch);

        let mut listeners = JoinSet::new();
        for mut subscription in subscriptions {
            let tx = tx.clone();
            let fetch = fetch.clone();
            listeners.spawn(async move {
                while let Some(event) = subscription.recv().await {
                    tracing::debug!("Mudança em {} ({:?}), recarregando", event.relation, event.kind);
                    let tx = tx.clone();
                    let refetch = fetch();
                    tokio::spawn(async move {
                        tx.send_replace(refetch.await);
                    });
                }
                subscription.unsubscribe();
            });
        }

        Ok(Self { rx, listeners })
    }

    pub fn current(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Espera a próxima recarga. `None` quando a view foi encerrada.
    pub async fn changed(&mut self) -> Option<T> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    pub fn receiver(&self) -> watch::Receiver<T> {
        self.rx.clone()
    }

    pub fn cancel(mut self) {
        self.listeners.abort_all();
    }
}
