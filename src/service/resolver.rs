use std::collections::{BTreeMap, HashMap};

use crate::{
    dao::UnitOfWork,
    model::{
        apperror::ApplicationError,
        derived::ProjectionContext,
        models::Row,
        schema::{self, EntityDef},
        value::{Related, Value},
    },
};

/**
 * Label shown for a row: its display field, or `<Entity> <id>` for entities without one.
 */
pub fn row_label(entity: &EntityDef, row: &Row) -> String {
    match entity.display_field {
        Some(field) => row.get(field).display(),
        None => format!("{} {}", entity.name, row.id),
    }
}

/**
 * Rows referenced by an entity, loaded once so a page of rows can be projected without further queries.
 */
pub struct RowResolver {
    entity: &'static EntityDef,
    targets: HashMap<&'static str, BTreeMap<i64, Row>>,
    associations: HashMap<&'static str, Vec<Row>>,
}

impl RowResolver {
    /**
     * Loads the rows referenced by the reference fields and many-to-many relations of an entity.
     *
     * # Arguments
     * `unit_of_work`: The unit of work to read within.
     * `entity`: The entity whose rows will be resolved.
     *
     * # Returns
     * A resolver for rows of the entity.
     */
    pub async fn load(unit_of_work: &mut UnitOfWork<'_>, entity: &'static EntityDef) -> Result<Self, ApplicationError> {
        let mut targets: HashMap<&'static str, BTreeMap<i64, Row>> = HashMap::new();
        let mut associations: HashMap<&'static str, Vec<Row>> = HashMap::new();
        let target_tables = entity.fields.iter().filter_map(|field| field.reference_target()).chain(entity.many_to_many.iter().map(|relation| relation.target));
        for table in target_tables {
            if targets.contains_key(table) {
                continue;
            }
            let target = schema::entity(table)?;
            let rows = unit_of_work.fetch_all(target, None).await?;
            targets.insert(table, rows.into_iter().map(|row| (row.id, row)).collect());
        }
        for relation in entity.many_to_many {
            let association = schema::entity(relation.association)?;
            associations.insert(relation.association, unit_of_work.fetch_all(association, None).await?);
        }
        Ok(RowResolver { entity, targets, associations })
    }

    /**
     * Replaces reference ids by the referenced rows' labels. Dangling ids are left as they are.
     */
    pub fn resolve(&self, row: &Row) -> Row {
        let mut resolved = row.clone();
        for field in self.entity.fields {
            let Some(target) = field.reference_target() else {
                continue;
            };
            if let Some(related) = row.get(field.name).reference_id().and_then(|id| self.related(target, id)) {
                resolved.set(field.name, Value::Related(related));
            }
        }
        resolved
    }

    /**
     * Value of a column of a resolved row: a field, a dotted path through a reference, a many-to-many
     * collection or a derived projection.
     */
    pub fn column(&self, row: &Row, column: &str, context: &ProjectionContext) -> Value {
        if let Some((reference, remote)) = column.split_once('.') {
            let target = self.entity.field(reference).and_then(|field| field.reference_target());
            return match (target, row.get(reference).reference_id()) {
                (Some(target), Some(id)) => self.targets.get(target).and_then(|rows| rows.get(&id)).map_or(Value::Null, |remote_row| remote_row.get(remote).clone()),
                _ => Value::Null,
            };
        }
        if let Some(derived) = self.entity.derived(column) {
            return derived.function.evaluate(row, context);
        }
        if let Some(relation) = self.entity.many_to_many(column) {
            let related = self
                .associations
                .get(relation.association)
                .into_iter()
                .flatten()
                .filter(|association| association.get(relation.local_column).reference_id() == Some(row.id))
                .filter_map(|association| association.get(relation.remote_column).reference_id())
                .filter_map(|id| self.related(relation.target, id))
                .collect();
            return Value::Collection(related);
        }
        row.get(column).clone()
    }

    /**
     * Resolves a row and keeps only the requested columns.
     */
    pub fn project(&self, row: &Row, columns: &[&str], context: &ProjectionContext) -> Row {
        let resolved = self.resolve(row);
        let mut projected = Row::new(row.id);
        for column in columns {
            projected.set(column, self.column(&resolved, column, context));
        }
        projected
    }

    fn related(&self, table: &str, id: i64) -> Option<Related> {
        let target = schema::entity(table).ok()?;
        let row = self.targets.get(table)?.get(&id)?;
        Some(Related::new(id, row_label(target, row)))
    }
}
