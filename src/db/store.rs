// src/db/store.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use utoipa::ToSchema;
use uuid::Uuid;

// ---
// Relações conhecidas pelo store
// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum Relation {
    Medications,
    Inventory,
    Prescriptions,
    PrescriptionItems,
    Suppliers,
    PurchaseOrders,
    PurchaseOrderItems,
    Users,
}

impl Relation {
    pub const ALL: [Relation; 8] = [
        Relation::Medications,
        Relation::Inventory,
        Relation::Prescriptions,
        Relation::PrescriptionItems,
        Relation::Suppliers,
        Relation::PurchaseOrders,
        Relation::PurchaseOrderItems,
        Relation::Users,
    ];

    /// Nome da tabela no banco. Também é a chave usada quando a relação
    /// aparece embutida em outra linha (ex: `"Medications": {...}`).
    pub const fn table_name(self) -> &'static str {
        match self {
            Relation::Medications => "Medications",
            Relation::Inventory => "Inventory",
            Relation::Prescriptions => "Prescriptions",
            Relation::PrescriptionItems => "PrescriptionItems",
            Relation::Suppliers => "Suppliers",
            Relation::PurchaseOrders => "PurchaseOrders",
            Relation::PurchaseOrderItems => "PurchaseOrderItem",
            Relation::Users => "users",
        }
    }

    pub const fn primary_key(self) -> &'static str {
        match self {
            Relation::Medications => "medication_id",
            Relation::Inventory => "inventory_id",
            Relation::Prescriptions => "prescription_id",
            Relation::PrescriptionItems => "prescription_item_id",
            Relation::Suppliers => "supplier_id",
            Relation::PurchaseOrders => "purchase_order_id",
            Relation::PurchaseOrderItems => "purchase_order_item_id",
            Relation::Users => "id",
        }
    }

    /// Coluna de `self` que referencia `target` (muitos-para-um).
    pub fn foreign_key_to(self, target: Relation) -> Option<&'static str> {
        use Relation::*;
        match (self, target) {
            (Inventory, Medications) => Some("medication_id"),
            (PrescriptionItems, Prescriptions) => Some("prescription_id"),
            (PrescriptionItems, Medications) => Some("medication_id"),
            (PurchaseOrders, Suppliers) => Some("supplier_id"),
            (PurchaseOrderItems, PurchaseOrders) => Some("purchase_order_id"),
            (PurchaseOrderItems, Medications) => Some("medication_id"),
            _ => None,
        }
    }

    pub fn from_table_name(name: &str) -> Option<Relation> {
        Relation::ALL.into_iter().find(|r| r.table_name() == name)
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table_name())
    }
}

// ---
// Consulta
// ---

#[derive(Debug, Clone, PartialEq)]
pub enum Columns {
    All,
    Only(Vec<&'static str>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Embed {
    pub relation: Relation,
    pub columns: Columns,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Int(i64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq(FilterValue),
    In(Vec<i64>),
    Gte(FilterValue),
    Lt(FilterValue),
}

/// Filtro sobre uma coluna da relação principal ou, com `embed`, de uma
/// relação embutida. Neste último caso a linha pai só entra no resultado se
/// a linha embutida satisfizer o filtro.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub embed: Option<Relation>,
    pub column: &'static str,
    pub op: FilterOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: &'static str,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub relation: Relation,
    pub columns: Columns,
    pub embeds: Vec<Embed>,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    /// Equivalente a `SELECT *` sem filtros.
    pub fn from(relation: Relation) -> Self {
        Self {
            relation,
            columns: Columns::All,
            embeds: Vec::new(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn columns(mut self, columns: &[&'static str]) -> Self {
        self.columns = Columns::Only(columns.to_vec());
        self
    }

    pub fn embed(mut self, relation: Relation, columns: &[&'static str]) -> Self {
        let columns = if columns.is_empty() {
            Columns::All
        } else {
            Columns::Only(columns.to_vec())
        };
        self.embeds.push(Embed { relation, columns });
        self
    }

    pub fn eq(mut self, column: &'static str, value: FilterValue) -> Self {
        self.filters.push(Filter { embed: None, column, op: FilterOp::Eq(value) });
        self
    }

    pub fn in_list(mut self, column: &'static str, values: &[i64]) -> Self {
        self.filters.push(Filter { embed: None, column, op: FilterOp::In(values.to_vec()) });
        self
    }

    pub fn gte_on(mut self, embed: Relation, column: &'static str, value: FilterValue) -> Self {
        self.filters.push(Filter { embed: Some(embed), column, op: FilterOp::Gte(value) });
        self
    }

    pub fn lt_on(mut self, embed: Relation, column: &'static str, value: FilterValue) -> Self {
        self.filters.push(Filter { embed: Some(embed), column, op: FilterOp::Lt(value) });
        self
    }

    pub fn order_by(mut self, column: &'static str, direction: Direction) -> Self {
        self.order = Some(Order { column, direction });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

// ---
// Notificações de mudança
// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub relation: Relation,
    pub kind: ChangeKind,
    pub row_id: Option<Value>,
}

/// Restringe uma assinatura a algumas linhas pela chave primária.
#[derive(Debug, Clone, PartialEq)]
pub enum RowFilter {
    Eq(i64),
    In(Vec<i64>),
}

impl RowFilter {
    pub fn matches(&self, row_id: Option<&Value>) -> bool {
        let Some(id) = row_id.and_then(Value::as_i64) else {
            return false;
        };
        match self {
            RowFilter::Eq(expected) => id == *expected,
            RowFilter::In(ids) => ids.contains(&id),
        }
    }
}

pub(crate) fn accepts(
    relation: Relation,
    filter: Option<&RowFilter>,
    event: &ChangeEvent,
) -> bool {
    event.relation == relation
        && filter.is_none_or(|f| f.matches(event.row_id.as_ref()))
}

const SUBSCRIPTION_BUFFER: usize = 64;

/// Assinatura viva de uma relação. Soltar o handle (ou chamar
/// `unsubscribe`) encerra o listener no store.
pub struct Subscription {
    relation: Relation,
    receiver: mpsc::Receiver<ChangeEvent>,
    listener: JoinHandle<()>,
}

impl Subscription {
    /// Filtra o feed de mudanças compartilhado do store para uma relação.
    /// O receiver do broadcast já deve existir: nada publicado depois se perde.
    pub(crate) fn from_feed(
        relation: Relation,
        filter: Option<RowFilter>,
        mut changes: broadcast::Receiver<ChangeEvent>,
    ) -> Self {
        let (tx, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);

        let listener = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(event) => {
                        if accepts(relation, filter.as_ref(), &event) && tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Assinatura de {} perdeu {} notificações", relation, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        tracing::debug!("Assinatura aberta para {}", relation);
        Self { relation, receiver, listener }
    }

    /// Espera a próxima notificação. `None` quando o listener terminou.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.recv().await
    }

    pub fn unsubscribe(self) {
        self.listener.abort();
        tracing::debug!("Assinatura de {} encerrada", self.relation);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

// ---
// Erros e o trait do store
// ---

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Erro de banco de dados: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Linha em formato inesperado: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Identificador inválido: {0}")]
    InvalidIdentifier(String),

    #[error("Relação {0} não tem ligação com {1}")]
    UnknownJoin(Relation, Relation),

    #[error("Linha inválida para {0}: {1}")]
    InvalidRow(Relation, String),

    #[error("Registro duplicado em {0}: {1}")]
    Conflict(Relation, String),

    #[error("Store indisponível: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// O cliente do store: leitura com joins, contagem, escrita pontual
/// (usada apenas para `users`) e assinatura de mudanças.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Cada linha vem como um objeto JSON; relações embutidas aparecem sob o
    /// nome da tabela e valem `null` quando o join não encontra nada.
    async fn select(&self, query: &Query) -> StoreResult<Vec<Value>>;

    /// Contagem sem materializar linhas. `None` quando o store não informa.
    async fn count(&self, relation: Relation) -> StoreResult<Option<i64>>;

    /// Insere um objeto e devolve as linhas criadas.
    async fn insert(&self, relation: Relation, row: Value) -> StoreResult<Vec<Value>>;

    /// Aplica `patch` às linhas que satisfazem `filters` e devolve as linhas alteradas.
    async fn update(&self, relation: Relation, filters: &[Filter], patch: Value) -> StoreResult<Vec<Value>>;

    async fn subscribe(&self, relation: Relation, filter: Option<RowFilter>) -> StoreResult<Subscription>;
}
