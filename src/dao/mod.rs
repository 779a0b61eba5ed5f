pub mod memory;
pub mod postgres;

use std::collections::BTreeMap;
use std::sync::Arc;

use sqlx::{Pool, Postgres, Transaction};

use crate::dao::{
    memory::{MemoryDao, MemoryTransaction},
    postgres::PostgresDao,
};
use crate::model::{
    apperror::{ApplicationError, ErrorType},
    models::Row,
    schema::{ENTITIES, EntityDef, FieldDef},
    value::Value,
};

/**
 * Storage backend holding the rows of all entities.
 */
pub enum Store {
    Postgres { connection_pool: Arc<Pool<Postgres>>, dao: PostgresDao },
    Memory(MemoryDao),
}

impl Store {
    /**
     * Creates a store backed by a `PostgreSQL` connection pool.
     */
    pub fn postgres(connection_pool: Arc<Pool<Postgres>>) -> Self {
        Store::Postgres { connection_pool, dao: PostgresDao::new() }
    }

    /**
     * Creates an empty in process store.
     */
    pub fn memory() -> Self {
        Store::Memory(MemoryDao::new())
    }

    /**
     * Creates the tables of all entities. Existing tables are kept.
     *
     * # Returns
     * A result indicating success or failure of the operation.
     */
    pub async fn create_schema(&self) -> Result<(), ApplicationError> {
        let Store::Postgres { connection_pool, dao } = self else {
            return Ok(());
        };
        let mut connection = connection_pool.acquire().await.map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to acquire connection: {err}")))?;
        for entity in ENTITIES {
            dao.create_table(&mut connection, entity).await?;
        }
        Ok(())
    }

    /**
     * Starts a unit of work. Reads and writes done through it are committed or rolled back together.
     *
     * # Returns
     * The unit of work or an error if the database could not start a transaction.
     */
    pub async fn begin(&self) -> Result<UnitOfWork<'_>, ApplicationError> {
        match self {
            Store::Postgres { connection_pool, dao } => {
                let transaction = connection_pool.begin().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to begin transaction: {err}")))?;
                Ok(UnitOfWork::Postgres { transaction, dao })
            }
            Store::Memory(dao) => Ok(UnitOfWork::Memory(dao.begin().await)),
        }
    }
}

/**
 * Open transaction on a `Store`.
 */
pub enum UnitOfWork<'a> {
    Postgres { transaction: Transaction<'static, Postgres>, dao: &'a PostgresDao },
    Memory(MemoryTransaction<'a>),
}

impl UnitOfWork<'_> {
    pub async fn insert(&mut self, entity: &'static EntityDef, values: &BTreeMap<String, Value>) -> Result<i64, ApplicationError> {
        match self {
            UnitOfWork::Postgres { transaction, dao } => dao.insert(transaction, entity, values).await,
            UnitOfWork::Memory(transaction) => transaction.insert(entity, values),
        }
    }

    pub async fn update(&mut self, entity: &'static EntityDef, id: i64, values: &BTreeMap<String, Value>) -> Result<(), ApplicationError> {
        match self {
            UnitOfWork::Postgres { transaction, dao } => dao.update(transaction, entity, id, values).await,
            UnitOfWork::Memory(transaction) => transaction.update(entity, id, values),
        }
    }

    pub async fn delete(&mut self, entity: &'static EntityDef, id: i64) -> Result<(), ApplicationError> {
        match self {
            UnitOfWork::Postgres { transaction, dao } => dao.delete(transaction, entity, id).await,
            UnitOfWork::Memory(transaction) => transaction.delete(entity, id),
        }
    }

    pub async fn fetch(&mut self, entity: &'static EntityDef, id: i64) -> Result<Row, ApplicationError> {
        match self {
            UnitOfWork::Postgres { transaction, dao } => dao.fetch(transaction, entity, id).await,
            UnitOfWork::Memory(transaction) => transaction.fetch(entity, id),
        }
    }

    /**
     * Retrieves all rows of an entity in id order, optionally only those where the field equals the value.
     */
    pub async fn fetch_all(&mut self, entity: &'static EntityDef, condition: Option<(&FieldDef, &Value)>) -> Result<Vec<Row>, ApplicationError> {
        match self {
            UnitOfWork::Postgres { transaction, dao } => dao.fetch_all(transaction, entity, condition).await,
            UnitOfWork::Memory(transaction) => Ok(transaction.fetch_all(entity, condition)),
        }
    }

    pub async fn commit(self) -> Result<(), ApplicationError> {
        match self {
            UnitOfWork::Postgres { transaction, .. } => transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}"))),
            UnitOfWork::Memory(transaction) => {
                transaction.commit();
                Ok(())
            }
        }
    }

    pub async fn rollback(self) -> Result<(), ApplicationError> {
        match self {
            UnitOfWork::Postgres { transaction, .. } => transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}"))),
            UnitOfWork::Memory(transaction) => {
                drop(transaction);
                Ok(())
            }
        }
    }

    /**
     * Commits when the operation succeeded, rolls back otherwise, and hands the operation result back.
     */
    pub async fn finish<T>(self, result: Result<T, ApplicationError>) -> Result<T, ApplicationError> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                self.rollback().await?;
                Err(err)
            }
        }
    }
}
