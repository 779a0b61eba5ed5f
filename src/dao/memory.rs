use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use tokio::sync::{Mutex, MutexGuard};
use tracing::instrument;

use crate::model::{
    apperror::{ApplicationError, ErrorType},
    models::Row,
    schema::{self, EntityDef, FieldDef},
    value::Value,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    rows: HashMap<&'static str, BTreeMap<i64, Row>>,
    sequences: HashMap<&'static str, i64>,
}

/**
 * In process store enforcing the same constraints as the database schema.
 */
pub struct MemoryDao {
    tables: Mutex<Tables>,
}

impl MemoryDao {
    pub fn new() -> Self {
        MemoryDao { tables: Mutex::new(Tables::default()) }
    }

    /**
     * Starts a unit of work. The store stays locked until the unit of work is committed or dropped.
     */
    pub async fn begin(&self) -> MemoryTransaction<'_> {
        let guard = self.tables.lock().await;
        let working = guard.clone();
        MemoryTransaction { guard, working }
    }
}

/**
 * Unit of work on the memory store. Changes go to a working copy that replaces the store on commit.
 */
pub struct MemoryTransaction<'a> {
    guard: MutexGuard<'a, Tables>,
    working: Tables,
}

impl MemoryTransaction<'_> {
    pub fn commit(mut self) {
        *self.guard = self.working;
    }

    #[instrument(skip(self, entity, values), fields(table = entity.table))]
    pub fn insert(&mut self, entity: &'static EntityDef, values: &BTreeMap<String, Value>) -> Result<i64, ApplicationError> {
        let mut row = Row::new(0);
        for field in entity.fields {
            row.set(field.name, values.get(field.name).cloned().unwrap_or_default());
        }
        self.check_row(entity, &row)?;
        let sequence = self.working.sequences.entry(entity.table).or_insert(0);
        *sequence += 1;
        row.id = *sequence;
        self.working.rows.entry(entity.table).or_default().insert(row.id, row.clone());
        Ok(row.id)
    }

    #[instrument(skip(self, entity, values), fields(table = entity.table))]
    pub fn update(&mut self, entity: &'static EntityDef, id: i64, values: &BTreeMap<String, Value>) -> Result<(), ApplicationError> {
        let mut row = self.fetch(entity, id)?;
        for field in entity.fields {
            if let Some(value) = values.get(field.name) {
                row.set(field.name, value.clone());
            }
        }
        self.check_row(entity, &row)?;
        self.working.rows.entry(entity.table).or_default().insert(id, row);
        Ok(())
    }

    #[instrument(skip(self, entity), fields(table = entity.table))]
    pub fn delete(&mut self, entity: &'static EntityDef, id: i64) -> Result<(), ApplicationError> {
        if !self.table(entity).contains_key(&id) {
            tracing::debug!("{} with id {} not found for deletion", entity.name, id);
            return Err(ApplicationError::new(ErrorType::NotFound, format!("{} not found", entity.name)));
        }
        for (referencing, field) in schema::referencing_fields(entity.table) {
            let referenced = self.table(referencing).values().any(|row| row.get(field.name).reference_id() == Some(id));
            if referenced {
                tracing::debug!("{} with id {} is referenced by {}", entity.name, id, referencing.name);
                return Err(ApplicationError::new(ErrorType::ConstraintViolation, "Foreign key violation".to_string()));
            }
        }
        self.working.rows.entry(entity.table).or_default().remove(&id);
        Ok(())
    }

    pub fn fetch(&self, entity: &EntityDef, id: i64) -> Result<Row, ApplicationError> {
        self.table(entity).get(&id).cloned().ok_or_else(|| ApplicationError::new(ErrorType::NotFound, format!("{} not found", entity.name)))
    }

    pub fn fetch_all(&self, entity: &EntityDef, condition: Option<(&FieldDef, &Value)>) -> Vec<Row> {
        self.table(entity)
            .values()
            .filter(|row| condition.is_none_or(|(field, value)| !value.is_null() && row.get(field.name).compare(value) == Ordering::Equal))
            .cloned()
            .collect()
    }

    fn table(&self, entity: &EntityDef) -> &BTreeMap<i64, Row> {
        static EMPTY: BTreeMap<i64, Row> = BTreeMap::new();
        self.working.rows.get(entity.table).unwrap_or(&EMPTY)
    }

    /**
     * Checks not null, length, uniqueness and foreign key constraints of a row about to be stored.
     */
    fn check_row(&self, entity: &EntityDef, row: &Row) -> Result<(), ApplicationError> {
        for field in entity.fields {
            let value = row.get(field.name);
            if value.is_null() {
                if !field.nullable {
                    return Err(ApplicationError::new(ErrorType::Validation, "Missing required value".to_string()));
                }
                continue;
            }
            if let (Some(max_length), Some(text)) = (field.max_length(), value.as_text())
                && text.chars().count() > max_length
            {
                return Err(ApplicationError::new(ErrorType::Validation, "Value too long".to_string()));
            }
            if field.unique {
                let duplicate = self.table(entity).values().any(|other| other.id != row.id && other.get(field.name).compare(value) == Ordering::Equal);
                if duplicate {
                    return Err(ApplicationError::new(ErrorType::ConstraintViolation, "Already exists".to_string()));
                }
            }
            if let Some(target) = field.reference_target() {
                let target = schema::entity(target)?;
                let exists = value.reference_id().is_some_and(|id| self.table(target).contains_key(&id));
                if !exists {
                    return Err(ApplicationError::new(ErrorType::ConstraintViolation, "Foreign key violation".to_string()));
                }
            }
        }
        Ok(())
    }
}
