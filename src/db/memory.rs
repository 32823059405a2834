// src/db/memory.rs

use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::db::store::{
    ChangeEvent, ChangeKind, Columns, DataStore, Direction, Filter, FilterOp,
    FilterValue, Query, Relation, RowFilter, StoreError, StoreResult, Subscription,
};

const CHANGE_BUFFER: usize = 256;

/// Store em memória com a mesma semântica do `PgStore`: joins muitos-para-um,
/// filtros, ordenação, limite e notificações de mudança.
/// Usado nos testes e como substituto do banco.
#[derive(Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<HashMap<Relation, Vec<Value>>>>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            tables: Arc::new(RwLock::new(HashMap::new())),
            changes,
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Carrega linhas sem disparar notificações.
    pub async fn seed(&self, relation: Relation, rows: Vec<Value>) {
        self.tables.write().await.entry(relation).or_default().extend(rows);
    }

    pub async fn rows(&self, relation: Relation) -> Vec<Value> {
        self.tables.read().await.get(&relation).cloned().unwrap_or_default()
    }

    fn publish(&self, relation: Relation, kind: ChangeKind, row: &Value) {
        let event = ChangeEvent {
            relation,
            kind,
            row_id: row.get(relation.primary_key()).cloned(),
        };
        // Sem assinantes o envio falha, e tudo bem
        let _ = self.changes.send(event);
    }
}

#[async_trait]
impl DataStore for InMemoryStore {
    async fn select(&self, query: &Query) -> StoreResult<Vec<Value>> {
        let tables = self.tables.read().await;
        let base = tables.get(&query.relation).map(Vec::as_slice).unwrap_or_default();

        let mut matched = Vec::new();
        for row in base {
            let mut joined = Vec::with_capacity(query.embeds.len());
            for embed in &query.embeds {
                joined.push(join(&tables, query.relation, embed.relation, row)?);
            }

            let mut keep = true;
            for filter in &query.filters {
                let target = match filter.embed {
                    None => Some(row.clone()),
                    Some(embed) => match query.embeds.iter().position(|e| e.relation == embed) {
                        Some(i) => joined[i].clone(),
                        None => join(&tables, query.relation, embed, row)?,
                    },
                };
                if !filter_matches(filter, target.as_ref()) {
                    keep = false;
                    break;
                }
            }

            if keep {
                matched.push((row, joined));
            }
        }

        if let Some(order) = &query.order {
            matched.sort_by(|(a, _), (b, _)| {
                let ordering = compare_values(a.get(order.column), b.get(order.column));
                match order.direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }

        Ok(matched
            .into_iter()
            .map(|(row, joined)| {
                let mut object = project(row, &query.columns);
                for (embed, target) in query.embeds.iter().zip(joined) {
                    let value = target
                        .map(|t| Value::Object(project(&t, &embed.columns)))
                        .unwrap_or(Value::Null);
                    object.insert(embed.relation.table_name().to_string(), value);
                }
                Value::Object(object)
            })
            .collect())
    }

    async fn count(&self, relation: Relation) -> StoreResult<Option<i64>> {
        let tables = self.tables.read().await;
        let count = tables.get(&relation).map(Vec::len).unwrap_or(0);
        Ok(Some(count as i64))
    }

    async fn insert(&self, relation: Relation, row: Value) -> StoreResult<Vec<Value>> {
        let Value::Object(mut object) = row else {
            return Err(StoreError::InvalidRow(relation, "esperado um objeto JSON".into()));
        };

        let mut tables = self.tables.write().await;
        let rows = tables.entry(relation).or_default();

        let pk = relation.primary_key();
        if object.get(pk).is_none_or(Value::is_null) {
            let id = match relation {
                Relation::Users => Value::String(Uuid::new_v4().to_string()),
                _ => {
                    let next = rows
                        .iter()
                        .filter_map(|r| r.get(pk).and_then(Value::as_i64))
                        .max()
                        .unwrap_or(0)
                        + 1;
                    Value::from(next)
                }
            };
            object.insert(pk.to_string(), id);
        }

        let row = Value::Object(object);
        rows.push(row.clone());
        drop(tables);

        self.publish(relation, ChangeKind::Insert, &row);
        Ok(vec![row])
    }

    async fn update(&self, relation: Relation, filters: &[Filter], patch: Value) -> StoreResult<Vec<Value>> {
        let Value::Object(patch) = patch else {
            return Err(StoreError::InvalidRow(relation, "esperado um objeto JSON".into()));
        };
        if filters.iter().any(|f| f.embed.is_some()) {
            return Err(StoreError::InvalidRow(relation, "update não aceita filtros em joins".into()));
        }

        let mut tables = self.tables.write().await;
        let mut updated = Vec::new();
        for row in tables.entry(relation).or_default().iter_mut() {
            if !filters.iter().all(|f| filter_matches(f, Some(&*row))) {
                continue;
            }
            if let Value::Object(object) = row {
                for (key, value) in &patch {
                    object.insert(key.clone(), value.clone());
                }
            }
            updated.push(row.clone());
        }
        drop(tables);

        for row in &updated {
            self.publish(relation, ChangeKind::Update, row);
        }
        Ok(updated)
    }

    async fn subscribe(&self, relation: Relation, filter: Option<RowFilter>) -> StoreResult<Subscription> {
        Ok(Subscription::from_feed(relation, filter, self.changes.subscribe()))
    }
}

// ---
// Helpers
// ---

fn join(
    tables: &HashMap<Relation, Vec<Value>>,
    from: Relation,
    to: Relation,
    row: &Value,
) -> StoreResult<Option<Value>> {
    let fk = from.foreign_key_to(to).ok_or(StoreError::UnknownJoin(from, to))?;
    let Some(key) = row.get(fk).filter(|k| !k.is_null()) else {
        return Ok(None);
    };
    let pk = to.primary_key();
    Ok(tables
        .get(&to)
        .and_then(|rows| rows.iter().find(|r| r.get(pk) == Some(key)))
        .cloned())
}

fn project(row: &Value, columns: &Columns) -> Map<String, Value> {
    let Value::Object(object) = row else {
        return Map::new();
    };
    match columns {
        Columns::All => object.clone(),
        Columns::Only(names) => names
            .iter()
            .filter_map(|name| object.get(*name).map(|v| (name.to_string(), v.clone())))
            .collect(),
    }
}

fn filter_matches(filter: &Filter, target: Option<&Value>) -> bool {
    let Some(value) = target.and_then(|t| t.get(filter.column)) else {
        return false;
    };
    match &filter.op {
        FilterOp::Eq(expected) => compare_to_filter(value, expected) == Some(Ordering::Equal),
        FilterOp::In(ids) => value.as_i64().is_some_and(|id| ids.contains(&id)),
        FilterOp::Gte(bound) => {
            matches!(compare_to_filter(value, bound), Some(Ordering::Greater | Ordering::Equal))
        }
        FilterOp::Lt(bound) => compare_to_filter(value, bound) == Some(Ordering::Less),
    }
}

fn compare_to_filter(value: &Value, expected: &FilterValue) -> Option<Ordering> {
    match expected {
        FilterValue::Int(n) => value.as_f64()?.partial_cmp(&(*n as f64)),
        FilterValue::Text(s) => Some(value.as_str()?.cmp(s.as_str())),
        FilterValue::Uuid(id) => {
            let parsed = Uuid::parse_str(value.as_str()?).ok()?;
            Some(parsed.cmp(id))
        }
        FilterValue::Timestamp(ts) => Some(parse_timestamp(value)?.cmp(ts)),
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.as_str()?)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Ordem do Postgres: NULL (ou ausente) é maior que qualquer valor.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Value::String(x), Value::String(y)) => match (parse_timestamp(a), parse_timestamp(b)) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => x.cmp(y),
            },
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => Ordering::Equal,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    async fn store_with_inventory() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .seed(
                Relation::Medications,
                vec![
                    json!({"medication_id": 1, "medication_name": "Amoxicilina", "generic_name": "amoxicillin"}),
                    json!({"medication_id": 2, "medication_name": "Dipirona", "generic_name": "metamizole"}),
                ],
            )
            .await;
        store
            .seed(
                Relation::Inventory,
                vec![
                    json!({"inventory_id": 1, "medication_id": 1, "quantity_in_stock": 5, "reorder_level": 10, "last_updated": "2025-09-01T10:00:00Z"}),
                    json!({"inventory_id": 2, "medication_id": 2, "quantity_in_stock": 50, "reorder_level": 10, "last_updated": "2025-09-03T10:00:00Z"}),
                    json!({"inventory_id": 7, "medication_id": 99, "quantity_in_stock": 1, "reorder_level": 2, "last_updated": "2025-09-02T10:00:00Z"}),
                ],
            )
            .await;
        store
    }

    #[tokio::test]
    async fn select_embeds_parent_and_projects_columns() {
        let store = store_with_inventory().await;
        let query = Query::from(Relation::Inventory)
            .embed(Relation::Medications, &["medication_name"])
            .order_by("inventory_id", Direction::Asc);

        let rows = store.select(&query).await.unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["Medications"], json!({"medication_name": "Amoxicilina"}));
        // Join sem correspondência vira null
        assert_eq!(rows[2]["Medications"], Value::Null);
        assert_eq!(rows[0]["quantity_in_stock"], json!(5));
    }

    #[tokio::test]
    async fn select_orders_timestamps_and_applies_limit() {
        let store = store_with_inventory().await;
        let query = Query::from(Relation::Inventory)
            .columns(&["inventory_id"])
            .order_by("last_updated", Direction::Desc)
            .limit(2);

        let rows = store.select(&query).await.unwrap();

        assert_eq!(rows, vec![json!({"inventory_id": 2}), json!({"inventory_id": 7})]);
    }

    #[tokio::test]
    async fn in_filter_restricts_by_id() {
        let store = store_with_inventory().await;
        let query = Query::from(Relation::Inventory).in_list("inventory_id", &[1, 2, 3, 4, 5, 6]);

        let rows = store.select(&query).await.unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r["inventory_id"].as_i64().unwrap() <= 6));
    }

    #[tokio::test]
    async fn filter_on_embedded_relation_excludes_parent_rows() {
        let store = InMemoryStore::new();
        store
            .seed(
                Relation::Prescriptions,
                vec![
                    json!({"prescription_id": 1, "date_prescribed": "2025-09-10T08:00:00Z"}),
                    json!({"prescription_id": 2, "date_prescribed": "2025-09-11T08:00:00Z"}),
                ],
            )
            .await;
        store
            .seed(
                Relation::PrescriptionItems,
                vec![
                    json!({"prescription_item_id": 1, "prescription_id": 1, "medication_id": 1}),
                    json!({"prescription_item_id": 2, "prescription_id": 2, "medication_id": 1}),
                ],
            )
            .await;

        let day = "2025-09-11T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let query = Query::from(Relation::PrescriptionItems)
            .columns(&["prescription_item_id"])
            .gte_on(Relation::Prescriptions, "date_prescribed", FilterValue::Timestamp(day))
            .lt_on(
                Relation::Prescriptions,
                "date_prescribed",
                FilterValue::Timestamp(day + chrono::Duration::days(1)),
            );

        let rows = store.select(&query).await.unwrap();

        assert_eq!(rows, vec![json!({"prescription_item_id": 2})]);
    }

    #[tokio::test]
    async fn unknown_join_is_an_error() {
        let store = store_with_inventory().await;
        let query = Query::from(Relation::Medications).embed(Relation::Inventory, &[]);

        let result = store.select(&query).await;

        assert!(matches!(result, Err(StoreError::UnknownJoin(Relation::Medications, Relation::Inventory))));
    }

    #[tokio::test]
    async fn insert_assigns_keys_and_count_follows() {
        let store = store_with_inventory().await;

        let created = store
            .insert(Relation::Users, json!({"email": "a@x.com", "hashed_password": "h"}))
            .await
            .unwrap();
        let inventory = store
            .insert(Relation::Inventory, json!({"medication_id": 1, "quantity_in_stock": 3, "reorder_level": 1}))
            .await
            .unwrap();

        assert!(Uuid::parse_str(created[0]["id"].as_str().unwrap()).is_ok());
        assert_eq!(inventory[0]["inventory_id"], json!(8));
        assert_eq!(store.count(Relation::Users).await.unwrap(), Some(1));
        assert_eq!(store.count(Relation::Suppliers).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn update_patches_matching_rows_only() {
        let store = store_with_inventory().await;
        let filter = Filter { embed: None, column: "inventory_id", op: FilterOp::Eq(FilterValue::Int(2)) };

        let updated = store
            .update(Relation::Inventory, &[filter], json!({"quantity_in_stock": 4}))
            .await
            .unwrap();

        assert_eq!(updated.len(), 1);
        let rows = store.rows(Relation::Inventory).await;
        assert_eq!(rows[1]["quantity_in_stock"], json!(4));
        assert_eq!(rows[0]["quantity_in_stock"], json!(5));
    }

    #[tokio::test]
    async fn subscription_receives_only_filtered_changes() {
        let store = store_with_inventory().await;
        let mut subscription = store
            .subscribe(Relation::Inventory, Some(RowFilter::In(vec![1, 2, 3, 4, 5, 6])))
            .await
            .unwrap();

        let outside = Filter { embed: None, column: "inventory_id", op: FilterOp::Eq(FilterValue::Int(7)) };
        let inside = Filter { embed: None, column: "inventory_id", op: FilterOp::Eq(FilterValue::Int(1)) };
        store.update(Relation::Inventory, &[outside], json!({"quantity_in_stock": 0})).await.unwrap();
        store.update(Relation::Inventory, &[inside], json!({"quantity_in_stock": 0})).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), subscription.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, ChangeKind::Update);
        assert_eq!(event.row_id, Some(json!(1)));
        assert!(tokio::time::timeout(Duration::from_millis(50), subscription.recv()).await.is_err());
    }
}
