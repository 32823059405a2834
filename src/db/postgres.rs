// src/db/postgres.rs

use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use sqlx::{
    postgres::{PgListener, PgPool},
    Postgres, QueryBuilder,
};
use tokio::{sync::broadcast, task::JoinHandle};

use crate::db::store::{
    ChangeEvent, ChangeKind, Columns, DataStore, Direction, Filter, FilterOp,
    FilterValue, Query, Relation, RowFilter, StoreError, StoreResult, Subscription,
};

/// Canal do NOTIFY emitido pelo trigger `notify_pharmacy_change` (ver migrations).
pub const CHANGE_CHANNEL: &str = "pharmacy_changes";

const CHANGE_BUFFER: usize = 256;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

// O store sobre o Postgres. Cada linha é montada como JSONB no próprio banco,
// com as relações embutidas sob o nome da tabela.
//
// Todas as assinaturas compartilham um único `PgListener` (uma conexão do pool),
// aberto na primeira assinatura e repassado por um canal broadcast.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    changes: broadcast::Sender<ChangeEvent>,
    listener: Arc<OnceLock<JoinHandle<()>>>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            pool,
            changes,
            listener: Arc::new(OnceLock::new()),
        }
    }

    fn ensure_listener(&self) {
        self.listener.get_or_init(|| {
            tokio::spawn(forward_notifications(self.pool.clone(), self.changes.clone()))
        });
    }
}

#[async_trait]
impl DataStore for PgStore {
    async fn select(&self, query: &Query) -> StoreResult<Vec<Value>> {
        let mut builder = build_select(query)?;
        let rows = builder
            .build_query_scalar::<Value>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn count(&self, relation: Relation) -> StoreResult<Option<i64>> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(relation.table_name())?);
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.pool)
            .await?;
        Ok(Some(count))
    }

    async fn insert(&self, relation: Relation, row: Value) -> StoreResult<Vec<Value>> {
        let mut builder = build_insert(relation, row)?;
        let rows = builder
            .build_query_scalar::<Value>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| unique_violation_as_conflict(relation, e))?;
        Ok(rows)
    }

    async fn update(&self, relation: Relation, filters: &[Filter], patch: Value) -> StoreResult<Vec<Value>> {
        let mut builder = build_update(relation, filters, patch)?;
        let rows = builder
            .build_query_scalar::<Value>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn subscribe(&self, relation: Relation, filter: Option<RowFilter>) -> StoreResult<Subscription> {
        // Receiver criado antes de o listener existir: a primeira notificação já chega
        let changes = self.changes.subscribe();
        self.ensure_listener();
        Ok(Subscription::from_feed(relation, filter, changes))
    }
}

// Mantém o LISTEN aberto e publica cada notificação no broadcast do store.
async fn forward_notifications(pool: PgPool, changes: broadcast::Sender<ChangeEvent>) {
    let mut listener = loop {
        match connect_listener(&pool).await {
            Ok(listener) => break listener,
            Err(e) => {
                tracing::error!("🔥 Falha ao abrir o listener de {}: {:?}", CHANGE_CHANNEL, e);
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    };
    tracing::info!("✅ Escutando notificações em {}", CHANGE_CHANNEL);

    loop {
        match listener.recv().await {
            Ok(notification) => {
                let Some(event) = parse_notification(notification.payload()) else {
                    tracing::warn!("Notificação ignorada: {}", notification.payload());
                    continue;
                };
                // Sem assinantes o envio falha, e tudo bem
                let _ = changes.send(event);
            }
            Err(e) => {
                // O PgListener reconecta sozinho na próxima chamada
                tracing::error!("🔥 Listener de {} perdeu a conexão: {:?}", CHANGE_CHANNEL, e);
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

async fn connect_listener(pool: &PgPool) -> Result<PgListener, sqlx::Error> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(CHANGE_CHANNEL).await?;
    Ok(listener)
}

// Violação de UNIQUE vira `Conflict`; o resto segue como erro de banco
fn unique_violation_as_conflict(relation: Relation, error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(relation, db.message().to_string())
        }
        _ => StoreError::Database(error),
    }
}

// ---
// Montagem do SQL
// ---

fn quote_ident(name: &str) -> StoreResult<String> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(StoreError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{name}\""))
}

fn projection(alias: &str, columns: &Columns) -> StoreResult<String> {
    match columns {
        Columns::All => Ok(format!("to_jsonb({alias})")),
        Columns::Only(names) => {
            let pairs = names
                .iter()
                .map(|name| Ok(format!("'{name}', {alias}.{}", quote_ident(name)?)))
                .collect::<StoreResult<Vec<_>>>()?;
            Ok(format!("jsonb_build_object({})", pairs.join(", ")))
        }
    }
}

fn push_value(builder: &mut QueryBuilder<'static, Postgres>, value: &FilterValue) {
    match value {
        FilterValue::Int(n) => builder.push_bind(*n),
        FilterValue::Text(s) => builder.push_bind(s.clone()),
        FilterValue::Uuid(id) => builder.push_bind(*id),
        FilterValue::Timestamp(ts) => builder.push_bind(*ts),
    };
}

fn push_filter(builder: &mut QueryBuilder<'static, Postgres>, alias: &str, filter: &Filter) -> StoreResult<()> {
    builder.push(format!("{alias}.{}", quote_ident(filter.column)?));
    match &filter.op {
        FilterOp::Eq(value) => {
            builder.push(" = ");
            push_value(builder, value);
        }
        FilterOp::In(ids) => {
            builder.push(" = ANY(");
            builder.push_bind(ids.clone());
            builder.push(")");
        }
        FilterOp::Gte(value) => {
            builder.push(" >= ");
            push_value(builder, value);
        }
        FilterOp::Lt(value) => {
            builder.push(" < ");
            push_value(builder, value);
        }
    }
    Ok(())
}

pub(crate) fn build_select(query: &Query) -> StoreResult<QueryBuilder<'static, Postgres>> {
    // Relações que precisam de JOIN: as embutidas (na ordem) e as usadas só em filtros
    let mut joined: Vec<Relation> = query.embeds.iter().map(|e| e.relation).collect();
    for filter in &query.filters {
        if let Some(relation) = filter.embed {
            if !joined.contains(&relation) {
                joined.push(relation);
            }
        }
    }

    let mut joins = String::new();
    for (i, relation) in joined.iter().enumerate() {
        let fk = query
            .relation
            .foreign_key_to(*relation)
            .ok_or(StoreError::UnknownJoin(query.relation, *relation))?;
        joins.push_str(&format!(
            " LEFT JOIN {table} AS e{i} ON e{i}.{pk} = t.{fk}",
            table = quote_ident(relation.table_name())?,
            pk = quote_ident(relation.primary_key())?,
            fk = quote_ident(fk)?,
        ));
    }

    let mut select = projection("t", &query.columns)?;
    for (i, embed) in query.embeds.iter().enumerate() {
        let alias = format!("e{i}");
        select.push_str(&format!(
            " || jsonb_build_object('{key}', CASE WHEN {alias}.{pk} IS NULL THEN NULL ELSE {inner} END)",
            key = embed.relation.table_name(),
            pk = quote_ident(embed.relation.primary_key())?,
            inner = projection(&alias, &embed.columns)?,
        ));
    }

    let mut builder = QueryBuilder::new(format!(
        "SELECT {select} FROM {} AS t{joins}",
        quote_ident(query.relation.table_name())?
    ));

    for (i, filter) in query.filters.iter().enumerate() {
        builder.push(if i == 0 { " WHERE " } else { " AND " });
        let alias = match filter.embed {
            None => "t".to_string(),
            Some(relation) => {
                // Sempre presente: todas as relações dos filtros entraram em `joined`
                let position = joined.iter().position(|r| *r == relation).unwrap_or_default();
                format!("e{position}")
            }
        };
        push_filter(&mut builder, &alias, filter)?;
    }

    if let Some(order) = &query.order {
        let direction = match order.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        builder.push(format!(" ORDER BY t.{} {direction}", quote_ident(order.column)?));
    }

    if let Some(limit) = query.limit {
        builder.push(" LIMIT ");
        builder.push_bind(limit as i64);
    }

    Ok(builder)
}

pub(crate) fn build_insert(relation: Relation, row: Value) -> StoreResult<QueryBuilder<'static, Postgres>> {
    let Value::Object(object) = &row else {
        return Err(StoreError::InvalidRow(relation, "esperado um objeto JSON".into()));
    };
    let table = quote_ident(relation.table_name())?;

    if object.is_empty() {
        return Ok(QueryBuilder::new(format!(
            "INSERT INTO {table} AS t DEFAULT VALUES RETURNING to_jsonb(t)"
        )));
    }

    let columns = object
        .keys()
        .map(|k| quote_ident(k))
        .collect::<StoreResult<Vec<_>>>()?;
    let values = columns
        .iter()
        .map(|c| format!("r.{c}"))
        .collect::<Vec<_>>()
        .join(", ");

    // jsonb_populate_record converte cada campo para o tipo da coluna
    let mut builder = QueryBuilder::new(format!(
        "INSERT INTO {table} AS t ({}) SELECT {values} FROM jsonb_populate_record(NULL::{table}, ",
        columns.join(", ")
    ));
    builder.push_bind(sqlx::types::Json(row));
    builder.push(") AS r RETURNING to_jsonb(t)");
    Ok(builder)
}

pub(crate) fn build_update(
    relation: Relation,
    filters: &[Filter],
    patch: Value,
) -> StoreResult<QueryBuilder<'static, Postgres>> {
    let Value::Object(object) = &patch else {
        return Err(StoreError::InvalidRow(relation, "esperado um objeto JSON".into()));
    };
    if object.is_empty() {
        return Err(StoreError::InvalidRow(relation, "nada para atualizar".into()));
    }
    if filters.iter().any(|f| f.embed.is_some()) {
        return Err(StoreError::InvalidRow(relation, "update não aceita filtros em joins".into()));
    }
    let table = quote_ident(relation.table_name())?;

    let assignments = object
        .keys()
        .map(|k| quote_ident(k).map(|c| format!("{c} = r.{c}")))
        .collect::<StoreResult<Vec<_>>>()?
        .join(", ");

    let mut builder = QueryBuilder::new(format!(
        "UPDATE {table} AS t SET {assignments} FROM jsonb_populate_record(NULL::{table}, "
    ));
    builder.push_bind(sqlx::types::Json(patch));
    builder.push(") AS r");

    for (i, filter) in filters.iter().enumerate() {
        builder.push(if i == 0 { " WHERE " } else { " AND " });
        push_filter(&mut builder, "t", filter)?;
    }
    builder.push(" RETURNING to_jsonb(t)");
    Ok(builder)
}

// ---
// Notificações
// ---

#[derive(Deserialize)]
struct NotificationPayload {
    table: String,
    op: ChangeKind,
    id: Option<Value>,
}

fn parse_notification(payload: &str) -> Option<ChangeEvent> {
    let payload: NotificationPayload = serde_json::from_str(payload).ok()?;
    Some(ChangeEvent {
        relation: Relation::from_table_name(&payload.table)?,
        kind: payload.op,
        row_id: payload.id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::postgres::PgPoolOptions;

    #[test]
    fn select_with_embed_filter_and_order() {
        let query = Query::from(Relation::Inventory)
            .embed(Relation::Medications, &["medication_name", "generic_name"])
            .in_list("inventory_id", &[1, 2, 3, 4, 5, 6])
            .order_by("inventory_id", Direction::Asc);

        let builder = build_select(&query).unwrap();
        let sql = builder.sql();

        assert!(sql.starts_with("SELECT to_jsonb(t) || jsonb_build_object('Medications', CASE WHEN e0.\"medication_id\" IS NULL THEN NULL ELSE jsonb_build_object('medication_name', e0.\"medication_name\", 'generic_name', e0.\"generic_name\") END)"));
        assert!(sql.contains("FROM \"Inventory\" AS t LEFT JOIN \"Medications\" AS e0 ON e0.\"medication_id\" = t.\"medication_id\""));
        assert!(sql.contains(" WHERE t.\"inventory_id\" = ANY($1)"));
        assert!(sql.ends_with(" ORDER BY t.\"inventory_id\" ASC"));
    }

    #[test]
    fn filters_on_joined_relation_use_its_alias() {
        let day = chrono::Utc::now();
        let query = Query::from(Relation::PrescriptionItems)
            .columns(&["medication_id"])
            .embed(Relation::Medications, &["medication_name"])
            .gte_on(Relation::Prescriptions, "date_prescribed", FilterValue::Timestamp(day))
            .lt_on(Relation::Prescriptions, "date_prescribed", FilterValue::Timestamp(day))
            .limit(10);

        let builder = build_select(&query).unwrap();
        let sql = builder.sql();

        assert!(sql.starts_with("SELECT jsonb_build_object('medication_id', t.\"medication_id\")"));
        assert!(sql.contains("LEFT JOIN \"Prescriptions\" AS e1 ON e1.\"prescription_id\" = t.\"prescription_id\""));
        assert!(sql.contains(" WHERE e1.\"date_prescribed\" >= $1 AND e1.\"date_prescribed\" < $2"));
        assert!(sql.ends_with(" LIMIT $3"));
    }

    #[test]
    fn unknown_join_and_bad_identifiers_are_rejected() {
        let query = Query::from(Relation::Suppliers).embed(Relation::Medications, &[]);
        assert!(matches!(build_select(&query), Err(StoreError::UnknownJoin(_, _))));

        let query = Query::from(Relation::Suppliers).columns(&["name\"; DROP TABLE users; --"]);
        assert!(matches!(build_select(&query), Err(StoreError::InvalidIdentifier(_))));
    }

    #[test]
    fn insert_lists_only_given_columns() {
        let builder = build_insert(
            Relation::Users,
            json!({"email": "a@x.com", "hashed_password": "h"}),
        )
        .unwrap();

        assert_eq!(
            builder.sql(),
            "INSERT INTO \"users\" AS t (\"email\", \"hashed_password\") SELECT r.\"email\", r.\"hashed_password\" FROM jsonb_populate_record(NULL::\"users\", $1) AS r RETURNING to_jsonb(t)"
        );
    }

    #[test]
    fn update_filters_on_main_table() {
        let filter = Filter {
            embed: None,
            column: "id",
            op: FilterOp::Eq(FilterValue::Uuid(uuid::Uuid::nil())),
        };
        let builder = build_update(Relation::Users, &[filter], json!({"updated_at": "2025-09-01T00:00:00Z"})).unwrap();

        assert_eq!(
            builder.sql(),
            "UPDATE \"users\" AS t SET \"updated_at\" = r.\"updated_at\" FROM jsonb_populate_record(NULL::\"users\", $1) AS r WHERE t.\"id\" = $2 RETURNING to_jsonb(t)"
        );
        assert!(build_update(Relation::Users, &[], json!({})).is_err());
    }

    // Pool apontando para uma porta fechada: nenhuma conexão chega a abrir
    fn unreachable_pool() -> PgPool {
        PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://postgres@127.0.0.1:1/pharmacy")
            .unwrap()
    }

    #[tokio::test]
    async fn subscriptions_share_a_single_listener_connection() {
        let pool = unreachable_pool();
        let store = PgStore::new(pool.clone());

        let mut subscriptions = Vec::new();
        for _ in 0..2 {
            for relation in Relation::ALL {
                let subscription = tokio::time::timeout(Duration::from_secs(1), store.subscribe(relation, None))
                    .await
                    .unwrap()
                    .unwrap();
                subscriptions.push(subscription);
            }
        }

        assert_eq!(subscriptions.len(), 16);
        assert!(store.listener.get().is_some());
        assert!(pool.size() <= 1);
    }

    #[tokio::test]
    async fn notifications_fan_out_to_matching_subscriptions() {
        let store = PgStore::new(unreachable_pool());
        let mut inventory = store
            .subscribe(Relation::Inventory, Some(RowFilter::In(vec![1, 2, 3])))
            .await
            .unwrap();
        let mut suppliers = store.subscribe(Relation::Suppliers, None).await.unwrap();

        for payload in [
            r#"{"table":"Inventory","op":"UPDATE","id":9}"#,
            r#"{"table":"Inventory","op":"UPDATE","id":2}"#,
            r#"{"table":"Suppliers","op":"INSERT","id":4}"#,
        ] {
            store.changes.send(parse_notification(payload).unwrap()).unwrap();
        }

        let event = tokio::time::timeout(Duration::from_secs(1), inventory.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.row_id, Some(json!(2)));
        assert!(tokio::time::timeout(Duration::from_millis(50), inventory.recv()).await.is_err());

        let event = tokio::time::timeout(Duration::from_secs(1), suppliers.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);
    }

    #[test]
    fn notification_payload_is_parsed() {
        let event = parse_notification(r#"{"table":"Inventory","op":"UPDATE","id":3}"#).unwrap();
        assert_eq!(event.relation, Relation::Inventory);
        assert_eq!(event.kind, ChangeKind::Update);
        assert_eq!(event.row_id, Some(json!(3)));

        assert!(parse_notification(r#"{"table":"orders","op":"INSERT","id":1}"#).is_none());
        assert!(parse_notification("não é json").is_none());
    }
}
