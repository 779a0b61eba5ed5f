use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgConnection, Postgres, Row as _};
use tracing::{Instrument, instrument};

use crate::model::{
    apperror::{ApplicationError, ErrorType},
    models::Row,
    schema::{EntityDef, FieldDef, FieldType},
    value::Value,
};

/**
 * DAO generating and running SQL for entities described by an `EntityDef`.
 */
pub struct PostgresDao {}

impl PostgresDao {
    /**
     * Creates a new instance of `PostgresDao`.
     *
     * # Returns
     * A new instance of `PostgresDao`.
     */
    pub fn new() -> Self {
        PostgresDao {}
    }

    /**
     * Creates the table of an entity if it does not exist.
     *
     * # Arguments
     * `connection`: The database connection.
     * `entity`: The entity to create the table for.
     *
     * # Returns
     * A result indicating success or failure of the operation.
     */
    #[instrument(skip(self, connection, entity), fields(table = entity.table))]
    pub async fn create_table(&self, connection: &mut PgConnection, entity: &EntityDef) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        sqlx::query(&create_table_statement(entity))
            .execute(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to create table {}: {err}", entity.table)))?;
        Ok(())
    }

    /**
     * Inserts a row.
     *
     * # Arguments
     * `transaction`: The database transaction to execute the query within.
     * `entity`: The entity of the row.
     * `values`: Column values. Columns left out are stored as null.
     *
     * # Returns
     * The id of the new row.
     */
    #[instrument(skip(self, transaction, entity, values), fields(table = entity.table))]
    pub async fn insert(&self, transaction: &mut PgConnection, entity: &EntityDef, values: &BTreeMap<String, Value>) -> Result<i64, ApplicationError> {
        let span = tracing::Span::current();
        let statement = insert_statement(entity);
        let mut query = sqlx::query(&statement);
        for field in entity.fields {
            query = bind_value(query, field, values.get(field.name).unwrap_or(&Value::Null));
        }
        let row = query.fetch_one(transaction).instrument(span).await.map_err(|err| Self::handle_database_error(err.as_database_error()))?;
        row.try_get::<i64, _>("id").map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to read inserted id: {err}")))
    }

    /**
     * Updates the given columns of a row.
     *
     * # Arguments
     * `transaction`: The database transaction to execute the query within.
     * `entity`: The entity of the row.
     * `id`: The id of the row.
     * `values`: The columns to update.
     *
     * # Returns
     * A result indicating success or failure of the operation.
     */
    #[instrument(skip(self, transaction, entity, values), fields(table = entity.table))]
    pub async fn update(&self, transaction: &mut PgConnection, entity: &EntityDef, id: i64, values: &BTreeMap<String, Value>) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        let fields: Vec<&FieldDef> = entity.fields.iter().filter(|field| values.contains_key(field.name)).collect();
        if fields.is_empty() {
            return Ok(());
        }
        let statement = update_statement(entity, &fields);
        let mut query = sqlx::query(&statement);
        for field in &fields {
            query = bind_value(query, field, values.get(field.name).unwrap_or(&Value::Null));
        }
        let result = query.bind(id).execute(transaction).instrument(span).await.map_err(|err| Self::handle_database_error(err.as_database_error()))?;
        if result.rows_affected() == 0 {
            tracing::debug!("{} with id {} not found for update", entity.name, id);
            return Err(ApplicationError::new(ErrorType::NotFound, format!("{} not found", entity.name)));
        }
        if result.rows_affected() > 1 {
            tracing::warn!("Multiple {} rows attempted updated. Rolled back", entity.name);
            return Err(ApplicationError::new(ErrorType::Application, format!("Multiple {} rows attempted updated. Rolled back", entity.name)));
        }
        Ok(())
    }

    /**
     * Deletes a row by its id.
     *
     * # Arguments
     * `transaction`: The database transaction to execute the query within.
     * `entity`: The entity of the row.
     * `id`: The id of the row.
     *
     * # Returns
     * A result indicating success or failure of the operation.
     */
    #[instrument(skip(self, transaction, entity), fields(table = entity.table))]
    pub async fn delete(&self, transaction: &mut PgConnection, entity: &EntityDef, id: i64) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        let result = sqlx::query(&format!("DELETE FROM \"{}\" WHERE id = $1", entity.table))
            .bind(id)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| Self::handle_database_error(err.as_database_error()))?;
        if result.rows_affected() == 0 {
            tracing::debug!("{} with id {} not found for deletion", entity.name, id);
            return Err(ApplicationError::new(ErrorType::NotFound, format!("{} not found", entity.name)));
        }
        if result.rows_affected() > 1 {
            tracing::warn!("Multiple {} rows attempted deleted. Rolled back", entity.name);
            return Err(ApplicationError::new(ErrorType::Application, format!("Multiple {} rows attempted deleted. Rolled back", entity.name)));
        }
        Ok(())
    }

    /**
     * Retrieves a row by its id.
     *
     * # Arguments
     * `connection`: The database connection.
     * `entity`: The entity of the row.
     * `id`: The id of the row.
     *
     * # Returns
     * The row or a `NotFound` error.
     */
    #[instrument(skip(self, connection, entity), fields(table = entity.table))]
    pub async fn fetch(&self, connection: &mut PgConnection, entity: &EntityDef, id: i64) -> Result<Row, ApplicationError> {
        let span = tracing::Span::current();
        let result = sqlx::query(&format!("{} WHERE id = $1", select_statement(entity)))
            .bind(id)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get {}: {err}", entity.name)))?;
        let Some(result) = result else {
            return Err(ApplicationError::new(ErrorType::NotFound, format!("{} not found", entity.name)));
        };
        read_row(entity, &result)
    }

    /**
     * Retrieves all rows of an entity ordered by id, optionally only those where `column` equals `value`.
     *
     * # Arguments
     * `connection`: The database connection.
     * `entity`: The entity to read.
     * `condition`: Optional column and value to filter on.
     *
     * # Returns
     * The rows of the entity.
     */
    #[instrument(skip(self, connection, entity, condition), fields(table = entity.table))]
    pub async fn fetch_all(&self, connection: &mut PgConnection, entity: &EntityDef, condition: Option<(&FieldDef, &Value)>) -> Result<Vec<Row>, ApplicationError> {
        let span = tracing::Span::current();
        let results: Vec<PgRow> = match condition {
            Some((field, value)) => {
                let statement = format!("{} WHERE \"{}\" = $1 ORDER BY id", select_statement(entity), field.name);
                bind_value(sqlx::query(&statement), field, value).fetch_all(connection).instrument(span).await
            }
            None => sqlx::query(&format!("{} ORDER BY id", select_statement(entity))).fetch_all(connection).instrument(span).await,
        }
        .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to list {}: {err}", entity.name)))?;
        results.iter().map(|result| read_row(entity, result)).collect()
    }

    /**
     * Handles database errors and maps them to application errors.
     *
     * # Arguments
     * `error`: The database error to handle.
     *
     * # Returns
     * An `ApplicationError` corresponding to the database error.
     */
    fn handle_database_error(error: Option<&dyn sqlx::error::DatabaseError>) -> ApplicationError {
        if let Some(db_error) = error {
            tracing::debug!("Database error: {}", db_error);
            tracing::info!("Add/Update error: {:?}", db_error.code());
            if db_error.code() == Some(Cow::Borrowed("23505")) {
                // Unique violation
                return ApplicationError::new(ErrorType::ConstraintViolation, "Already exists".to_string());
            } else if db_error.code() == Some(Cow::Borrowed("23503")) {
                // Foreign key violation
                return ApplicationError::new(ErrorType::ConstraintViolation, "Foreign key violation".to_string());
            } else if db_error.code() == Some(Cow::Borrowed("22001")) {
                // Value too long
                return ApplicationError::new(ErrorType::Validation, "Value too long".to_string());
            } else if db_error.code() == Some(Cow::Borrowed("23502")) {
                // Not null violation
                return ApplicationError::new(ErrorType::Validation, "Missing required value".to_string());
            }
            tracing::error!("Unhandled database error: {}", db_error);
            return ApplicationError::new(ErrorType::DatabaseError, "Unhandled database error".to_string());
        }
        ApplicationError::new(ErrorType::DatabaseError, "Failed to execute database operation".to_string())
    }
}

/**
 * Binds a value as the SQL type of the field, so nulls are typed too.
 */
fn bind_value<'q>(query: Query<'q, Postgres, PgArguments>, field: &FieldDef, value: &Value) -> Query<'q, Postgres, PgArguments> {
    match field.field_type {
        FieldType::Text(_) | FieldType::LongText(_) | FieldType::Image => query.bind(value.as_text().map(str::to_string)),
        FieldType::Integer => query.bind(value.as_integer()),
        FieldType::Reference(_) => query.bind(value.reference_id()),
        FieldType::Float => query.bind(value.as_float()),
        FieldType::Decimal => query.bind(value.as_decimal()),
        FieldType::Date => query.bind(value.as_date()),
    }
}

/**
 * Maps a result row into a `Row` using the field types of the entity.
 */
fn read_row(entity: &EntityDef, result: &PgRow) -> Result<Row, ApplicationError> {
    let read_error = |err: sqlx::Error| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to read {} row: {err}", entity.name));
    let mut row = Row::new(result.try_get::<i64, _>("id").map_err(read_error)?);
    for field in entity.fields {
        let value = match field.field_type {
            FieldType::Text(_) | FieldType::LongText(_) | FieldType::Image => result.try_get::<Option<String>, _>(field.name).map_err(read_error)?.map_or(Value::Null, Value::Text),
            FieldType::Integer | FieldType::Reference(_) => result.try_get::<Option<i64>, _>(field.name).map_err(read_error)?.map_or(Value::Null, Value::Integer),
            FieldType::Float => result.try_get::<Option<f64>, _>(field.name).map_err(read_error)?.map_or(Value::Null, Value::Float),
            FieldType::Decimal => result.try_get::<Option<Decimal>, _>(field.name).map_err(read_error)?.map_or(Value::Null, Value::Decimal),
            FieldType::Date => result.try_get::<Option<NaiveDate>, _>(field.name).map_err(read_error)?.map_or(Value::Null, Value::Date),
        };
        row.set(field.name, value);
    }
    Ok(row)
}

fn column_type(field: &FieldDef) -> String {
    match field.field_type {
        FieldType::Text(max_length) | FieldType::LongText(Some(max_length)) => format!("VARCHAR({max_length})"),
        FieldType::LongText(None) | FieldType::Image => "TEXT".to_string(),
        FieldType::Integer => "BIGINT".to_string(),
        FieldType::Float => "DOUBLE PRECISION".to_string(),
        FieldType::Decimal => "NUMERIC".to_string(),
        FieldType::Date => "DATE".to_string(),
        FieldType::Reference(target) => format!("BIGINT REFERENCES \"{target}\" (id)"),
    }
}

fn create_table_statement(entity: &EntityDef) -> String {
    let mut columns = vec!["id BIGSERIAL PRIMARY KEY".to_string()];
    for field in entity.fields {
        let mut column = format!("\"{}\" {}", field.name, column_type(field));
        if !field.nullable {
            column.push_str(" NOT NULL");
        }
        if field.unique {
            column.push_str(" UNIQUE");
        }
        columns.push(column);
    }
    format!("CREATE TABLE IF NOT EXISTS \"{}\" ({})", entity.table, columns.join(", "))
}

fn insert_statement(entity: &EntityDef) -> String {
    let columns: Vec<String> = entity.fields.iter().map(|field| format!("\"{}\"", field.name)).collect();
    let parameters: Vec<String> = (1..=entity.fields.len()).map(|index| format!("${index}")).collect();
    format!("INSERT INTO \"{}\" ({}) VALUES ({}) RETURNING id", entity.table, columns.join(", "), parameters.join(", "))
}

fn update_statement(entity: &EntityDef, fields: &[&FieldDef]) -> String {
    let assignments: Vec<String> = fields.iter().enumerate().map(|(index, field)| format!("\"{}\" = ${}", field.name, index + 1)).collect();
    format!("UPDATE \"{}\" SET {} WHERE id = ${}", entity.table, assignments.join(", "), fields.len() + 1)
}

fn select_statement(entity: &EntityDef) -> String {
    let columns: Vec<String> = entity.fields.iter().map(|field| format!("\"{}\"", field.name)).collect();
    format!("SELECT id, {} FROM \"{}\"", columns.join(", "), entity.table)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::schema::{COUNTRY, COUNTRY_STATS, PRODUCT};

    #[test]
    fn test_create_table_statement() {
        assert_eq!(create_table_statement(&COUNTRY), "CREATE TABLE IF NOT EXISTS \"country\" (id BIGSERIAL PRIMARY KEY, \"name\" VARCHAR(50) NOT NULL UNIQUE)");
        assert_eq!(
            create_table_statement(&COUNTRY_STATS),
            "CREATE TABLE IF NOT EXISTS \"country_stats\" (id BIGSERIAL PRIMARY KEY, \"stat_date\" DATE, \"population\" DOUBLE PRECISION, \"unemployed\" DOUBLE PRECISION, \"college\" DOUBLE PRECISION, \"country\" BIGINT REFERENCES \"country\" (id) NOT NULL, \"political_type\" BIGINT REFERENCES \"political_type\" (id) NOT NULL)"
        );
    }

    #[test]
    fn test_insert_statement() {
        assert_eq!(insert_statement(&PRODUCT), "INSERT INTO \"product\" (\"name\", \"price\", \"photo\", \"description\", \"product_type\") VALUES ($1, $2, $3, $4, $5) RETURNING id");
    }

    #[test]
    fn test_update_statement() {
        let fields = vec![PRODUCT.field("price").unwrap(), PRODUCT.field("description").unwrap()];
        assert_eq!(update_statement(&PRODUCT, &fields), "UPDATE \"product\" SET \"price\" = $1, \"description\" = $2 WHERE id = $3");
    }

    #[test]
    fn test_select_statement() {
        assert_eq!(select_statement(&COUNTRY), "SELECT id, \"name\" FROM \"country\"");
    }
}
