use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use serde_json::Map;
use tracing::instrument;

use crate::{
    dao::{Store, UnitOfWork},
    model::{
        apperror::{ApplicationError, ErrorType, FieldError},
        derived::ProjectionContext,
        models::{ActionFailure, ActionOutcome, Filter, FilterOperation, ListInputType, ListOutputType, PaginationInput, PaginationOutput, Row, SortDirection},
        schema::{self, EntityDef, FieldDefault, HistoryDef, ManyToManyDef},
        value::Value,
        views::{self, ActionKind, Permission, ViewConfig},
    },
    service::resolver::RowResolver,
};

/**
 * Parsed add or edit form.
 */
#[derive(Debug, Default)]
struct FormInput {
    values: BTreeMap<String, Value>,
    relations: Vec<(&'static ManyToManyDef, Vec<i64>)>,
}

/**
 * Filter checked against the view and parsed into a stored value.
 */
struct ParsedFilter {
    column: String,
    operation: FilterOperation,
    target: Value,
}

/**
 * Generic list/show/add/edit/delete operations over the registered views.
 */
pub struct EntityService {
    store: Arc<Store>,
    context: ProjectionContext,
}

impl EntityService {
    /**
     * Creates a new instance of `EntityService`.
     *
     * # Arguments
     * `store`: The store holding the rows.
     * `context`: Settings for derived projections.
     *
     * # Returns
     * A new instance of `EntityService`.
     */
    pub fn new(store: Arc<Store>, context: ProjectionContext) -> Self {
        EntityService { store, context }
    }

    /**
     * Looks up the configuration of a view.
     */
    pub fn describe(&self, view_name: &str) -> Result<&'static ViewConfig, ApplicationError> {
        views::view(view_name)
    }

    /**
     * Lists a page of rows of a view.
     *
     * # Arguments
     * `view_name`: Name of the view.
     * `input`: Filters and ordering. Without an order the view's base order applies.
     * `pagination`: The page to return.
     *
     * # Returns
     * The page of rows projected on the view's list columns.
     */
    #[instrument(skip(self, input))]
    pub async fn list(&self, view_name: &str, input: ListInputType, pagination: PaginationInput) -> Result<ListOutputType, ApplicationError> {
        let view = views::view(view_name)?;
        view.require(Permission::List)?;
        let pagination = pagination.validate()?;
        let filters = parse_filters(view, &input.filters)?;
        let mut unit_of_work = self.store.begin().await?;
        let loaded = load(&mut unit_of_work, view.entity, None).await;
        let (resolver, rows) = unit_of_work.finish(loaded).await?;
        self.select(view, &resolver, rows, &filters, input.order, pagination)
    }

    /**
     * Lists the rows of a related view that reference a row of the parent view.
     *
     * # Arguments
     * `view_name`: Name of the parent view.
     * `id`: Id of the parent row.
     * `related_name`: Name of a related view of the parent.
     * `input`: Filters and ordering.
     * `pagination`: The page to return.
     *
     * # Returns
     * The page of child rows projected on the related view's list columns.
     */
    #[instrument(skip(self, input))]
    pub async fn related(&self, view_name: &str, id: i64, related_name: &str, input: ListInputType, pagination: PaginationInput) -> Result<ListOutputType, ApplicationError> {
        let view = views::view(view_name)?;
        view.require(Permission::Show)?;
        if !view.related_views.contains(&related_name) {
            return Err(ApplicationError::new(ErrorType::NotFound, format!("View {view_name} has no related view {related_name}")));
        }
        let related = views::view(related_name)?;
        related.require(Permission::List)?;
        let Some(field) = related.entity.reference_to(view.entity.table) else {
            return Err(ApplicationError::new(ErrorType::Application, format!("{} does not reference {}", related.entity.name, view.entity.name)));
        };
        let pagination = pagination.validate()?;
        let filters = parse_filters(related, &input.filters)?;
        let mut unit_of_work = self.store.begin().await?;
        let parent = unit_of_work.fetch(view.entity, id).await;
        let loaded = match parent {
            Ok(_) => load(&mut unit_of_work, related.entity, Some((field.name, Value::Integer(id)))).await,
            Err(err) => Err(err),
        };
        let (resolver, rows) = unit_of_work.finish(loaded).await?;
        self.select(related, &resolver, rows, &filters, input.order, pagination)
    }

    /**
     * Retrieves a row projected on the view's show columns.
     */
    #[instrument(skip(self))]
    pub async fn show(&self, view_name: &str, id: i64) -> Result<Row, ApplicationError> {
        let view = views::view(view_name)?;
        view.require(Permission::Show)?;
        let mut unit_of_work = self.store.begin().await?;
        let loaded = fetch_resolved(&mut unit_of_work, view.entity, id).await;
        let (resolver, row) = unit_of_work.finish(loaded).await?;
        Ok(resolver.project(&row, &view.show_columns(), &self.context))
    }

    /**
     * Adds a row from form input.
     *
     * # Arguments
     * `view_name`: Name of the view.
     * `input`: Column values keyed by column name. Only the view's add columns are accepted.
     *
     * # Returns
     * The id of the new row.
     */
    #[instrument(skip(self, input))]
    pub async fn add(&self, view_name: &str, input: &Map<String, serde_json::Value>) -> Result<i64, ApplicationError> {
        let view = views::view(view_name)?;
        view.require(Permission::Add)?;
        let form = parse_form(view.entity, &view.add_columns(), input, true)?;
        let mut unit_of_work = self.store.begin().await?;
        let result = insert_row(&mut unit_of_work, view.entity, &form).await;
        let id = unit_of_work.finish(result).await?;
        tracing::info!("Added {} with id {}", view.entity.name, id);
        Ok(id)
    }

    /**
     * Updates a row from form input.
     *
     * # Arguments
     * `view_name`: Name of the view.
     * `id`: Id of the row.
     * `input`: Column values keyed by column name. Only the view's edit columns are accepted.
     *
     * # Returns
     * A result indicating success or failure of the operation.
     */
    #[instrument(skip(self, input))]
    pub async fn edit(&self, view_name: &str, id: i64, input: &Map<String, serde_json::Value>) -> Result<(), ApplicationError> {
        let view = views::view(view_name)?;
        view.require(Permission::Edit)?;
        let form = parse_form(view.entity, &view.edit_columns(), input, false)?;
        let mut unit_of_work = self.store.begin().await?;
        let result = update_row(&mut unit_of_work, view.entity, id, &form).await;
        unit_of_work.finish(result).await
    }

    /**
     * Deletes a row together with its declared cascades.
     */
    #[instrument(skip(self))]
    pub async fn delete(&self, view_name: &str, id: i64) -> Result<(), ApplicationError> {
        let view = views::view(view_name)?;
        view.require(Permission::Delete)?;
        let mut unit_of_work = self.store.begin().await?;
        let result = delete_row(&mut unit_of_work, view.entity, id).await;
        unit_of_work.finish(result).await
    }

    /**
     * Runs an action on the selected rows. Every row is processed in its own unit of work,
     * so a failing row does not undo the others.
     *
     * # Arguments
     * `view_name`: Name of the view.
     * `action_name`: Name of the action.
     * `ids`: The selected rows. An empty selection succeeds without doing anything.
     *
     * # Returns
     * The number of processed rows and the rows that failed.
     */
    #[instrument(skip(self))]
    pub async fn run_action(&self, view_name: &str, action_name: &str, ids: &[i64]) -> Result<ActionOutcome, ApplicationError> {
        let view = views::view(view_name)?;
        let action = view.action(action_name)?;
        if ids.len() > 1 && !action.multiple {
            return Err(ApplicationError::new(ErrorType::Validation, format!("Action {action_name} applies to a single record")));
        }
        if ids.len() == 1 && !action.single {
            return Err(ApplicationError::new(ErrorType::Validation, format!("Action {action_name} applies to a multiple selection")));
        }
        match action.kind {
            ActionKind::Delete => view.require(Permission::Delete)?,
            ActionKind::SetText { .. } => view.require(Permission::Edit)?,
        }
        let mut outcome = ActionOutcome::default();
        for id in ids {
            let mut unit_of_work = self.store.begin().await?;
            let result = match action.kind {
                ActionKind::Delete => delete_row(&mut unit_of_work, view.entity, *id).await,
                ActionKind::SetText { column, value } => {
                    let mut values = BTreeMap::new();
                    values.insert(column.to_string(), Value::Text(value.to_string()));
                    unit_of_work.update(view.entity, *id, &values).await
                }
            };
            match unit_of_work.finish(result).await {
                Ok(()) => outcome.processed += 1,
                Err(err) => {
                    tracing::info!("Action {} failed on {} {}: {}", action_name, view.entity.name, id, err);
                    outcome.failures.push(ActionFailure { id: *id, message: err.message });
                }
            }
        }
        Ok(outcome)
    }

    /**
     * Adds rows with the given names unless they exist. Failures are logged and otherwise ignored.
     *
     * # Arguments
     * `entity`: An entity with a `name` field.
     * `names`: The names to add.
     */
    #[instrument(skip(self, entity), fields(table = entity.table))]
    pub async fn seed_names(&self, entity: &'static EntityDef, names: &[&str]) {
        for name in names {
            let mut values = BTreeMap::new();
            values.insert("name".to_string(), Value::Text((*name).to_string()));
            let result = match self.store.begin().await {
                Ok(mut unit_of_work) => {
                    let result = unit_of_work.insert(entity, &values).await;
                    unit_of_work.finish(result).await
                }
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                tracing::debug!("Skipped seeding {} {}: {}", entity.name, name, err);
            }
        }
    }

    /**
     * Filters, orders, pages and projects loaded rows of a view.
     */
    fn select(&self, view: &ViewConfig, resolver: &RowResolver, rows: Vec<Row>, filters: &[ParsedFilter], order: Option<(String, SortDirection)>, pagination: PaginationInput) -> Result<ListOutputType, ApplicationError> {
        let order = match order {
            Some((column, direction)) => {
                if !view.entity.has_column(&column) {
                    return Err(ApplicationError::new(ErrorType::Validation, format!("Cannot order by unknown column {column}")));
                }
                Some((column, direction))
            }
            None => view.base_order.map(|(column, direction)| (column.to_string(), direction)),
        };
        let by_label = filters.iter().any(|filter| filter.operation.is_text());
        let rows = rows.into_iter().filter(|row| {
            let resolved = by_label.then(|| resolver.resolve(row));
            filters.iter().all(|filter| {
                let value = match &resolved {
                    Some(resolved) if filter.operation.is_text() => resolved.get(&filter.column),
                    _ => row.get(&filter.column),
                };
                filter.operation.matches(value, &filter.target)
            })
        });
        let mut keyed: Vec<(Value, Row)> = match &order {
            Some((column, _)) => rows.map(|row| (resolver.column(&resolver.resolve(&row), column, &self.context), row)).collect(),
            None => rows.map(|row| (Value::Null, row)).collect(),
        };
        if let Some((_, direction)) = order {
            keyed.sort_by(|(left, _), (right, _)| if direction == SortDirection::Desc { right.compare(left) } else { left.compare(right) });
        }
        let count = keyed.len();
        let start = usize::try_from(pagination.start_index).map_err(|err| ApplicationError::new(ErrorType::Validation, format!("Invalid start index: {err}")))?;
        let page_size = usize::try_from(pagination.page_size).map_err(|err| ApplicationError::new(ErrorType::Validation, format!("Invalid page size: {err}")))?;
        let columns = view.list_columns();
        let page: Vec<Row> = keyed.iter().skip(start).take(page_size).map(|(_, row)| resolver.project(row, &columns, &self.context)).collect();
        let has_more = start.saturating_add(page_size) < count;
        Ok(ListOutputType::new(page, count, PaginationOutput::new(pagination.start_index, pagination.page_size, has_more)))
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/**
 * Checks that filters only use searchable columns of the view and parses their values.
 */
fn parse_filters(view: &ViewConfig, filters: &[Filter]) -> Result<Vec<ParsedFilter>, ApplicationError> {
    let searchable = view.search_columns();
    let mut errors = vec![];
    let mut parsed = vec![];
    for filter in filters {
        let field = view.entity.field(&filter.column).filter(|field| searchable.contains(&field.name));
        let Some(field) = field else {
            errors.push(FieldError::new(&filter.column, "Column is not searchable"));
            continue;
        };
        let target = match filter.operation {
            FilterOperation::Contains | FilterOperation::StartsWith => Ok(filter.value.as_str().map_or_else(|| Value::Text(filter.value.to_string()), |text| Value::Text(text.to_string()))),
            _ => field.parse(&filter.value),
        };
        match target {
            Ok(target) => parsed.push(ParsedFilter { column: filter.column.clone(), operation: filter.operation, target }),
            Err(message) => errors.push(FieldError::new(&filter.column, &message)),
        }
    }
    if !errors.is_empty() {
        return Err(ApplicationError::with_fields(errors));
    }
    Ok(parsed)
}

/**
 * Parses form input against the columns a form accepts.
 *
 * # Arguments
 * `entity`: The entity of the form.
 * `columns`: The columns of the add or edit form.
 * `input`: Submitted values.
 * `adding`: Whether required fields must be present and defaults applied.
 *
 * # Returns
 * The parsed form or a validation error listing every offending field.
 */
fn parse_form(entity: &'static EntityDef, columns: &[&str], input: &Map<String, serde_json::Value>, adding: bool) -> Result<FormInput, ApplicationError> {
    let mut errors = vec![];
    let mut form = FormInput::default();
    for (column, raw) in input {
        if !columns.contains(&column.as_str()) {
            errors.push(FieldError::new(column, "Field is not editable"));
        } else if let Some(field) = entity.field(column) {
            match field.parse(raw) {
                Ok(value) if value.is_null() && !field.nullable => errors.push(FieldError::new(column, "Missing required value")),
                Ok(value) => {
                    form.values.insert(column.clone(), value);
                }
                Err(message) => errors.push(FieldError::new(column, &message)),
            }
        } else if let Some(relation) = entity.many_to_many(column) {
            match parse_ids(raw) {
                Some(ids) => form.relations.push((relation, ids)),
                None => errors.push(FieldError::new(column, "Expected list of ids")),
            }
        } else {
            errors.push(FieldError::new(column, "Field is read only"));
        }
    }
    if adding {
        for field in entity.fields {
            if form.values.contains_key(field.name) || errors.iter().any(|error| error.field == field.name) {
                continue;
            }
            if field.default == Some(FieldDefault::Today) {
                form.values.insert(field.name.to_string(), Value::Date(today()));
            } else if !field.nullable {
                errors.push(FieldError::new(field.name, "Missing required value"));
            }
        }
    }
    if !errors.is_empty() {
        tracing::debug!("Invalid {} form: {:?}", entity.name, errors);
        return Err(ApplicationError::with_fields(errors));
    }
    Ok(form)
}

fn parse_ids(raw: &serde_json::Value) -> Option<Vec<i64>> {
    if raw.is_null() {
        return Some(vec![]);
    }
    raw.as_array()?.iter().map(serde_json::Value::as_i64).collect()
}

async fn load(unit_of_work: &mut UnitOfWork<'_>, entity: &'static EntityDef, condition: Option<(&str, Value)>) -> Result<(RowResolver, Vec<Row>), ApplicationError> {
    let rows = match condition {
        Some((column, value)) => {
            let field = entity.field(column).ok_or_else(|| ApplicationError::new(ErrorType::Application, format!("{} has no field {column}", entity.name)))?;
            unit_of_work.fetch_all(entity, Some((field, &value))).await?
        }
        None => unit_of_work.fetch_all(entity, None).await?,
    };
    let resolver = RowResolver::load(unit_of_work, entity).await?;
    Ok((resolver, rows))
}

async fn fetch_resolved(unit_of_work: &mut UnitOfWork<'_>, entity: &'static EntityDef, id: i64) -> Result<(RowResolver, Row), ApplicationError> {
    let row = unit_of_work.fetch(entity, id).await?;
    let resolver = RowResolver::load(unit_of_work, entity).await?;
    Ok((resolver, row))
}

async fn insert_row(unit_of_work: &mut UnitOfWork<'_>, entity: &'static EntityDef, form: &FormInput) -> Result<i64, ApplicationError> {
    let id = unit_of_work.insert(entity, &form.values).await?;
    for (relation, ids) in &form.relations {
        replace_relation(unit_of_work, relation, id, ids).await?;
    }
    if let Some(history) = &entity.history {
        open_history(unit_of_work, history, id, form.values.get(history.tracked).cloned().unwrap_or_default()).await?;
    }
    Ok(id)
}

async fn update_row(unit_of_work: &mut UnitOfWork<'_>, entity: &'static EntityDef, id: i64, form: &FormInput) -> Result<(), ApplicationError> {
    let existing = unit_of_work.fetch(entity, id).await?;
    unit_of_work.update(entity, id, &form.values).await?;
    for (relation, ids) in &form.relations {
        replace_relation(unit_of_work, relation, id, ids).await?;
    }
    if let Some(history) = &entity.history
        && let Some(tracked) = form.values.get(history.tracked)
        && existing.get(history.tracked).compare(tracked).is_ne()
    {
        close_history(unit_of_work, history, id).await?;
        open_history(unit_of_work, history, id, tracked.clone()).await?;
    }
    Ok(())
}

/**
 * Deletes the rows declared as cascades of the row, then the row itself.
 */
async fn delete_row(unit_of_work: &mut UnitOfWork<'_>, entity: &'static EntityDef, id: i64) -> Result<(), ApplicationError> {
    for cascade in entity.cascades {
        let child = schema::entity(cascade.table)?;
        let field = child.field(cascade.column).ok_or_else(|| ApplicationError::new(ErrorType::Application, format!("{} has no field {}", child.name, cascade.column)))?;
        for row in unit_of_work.fetch_all(child, Some((field, &Value::Integer(id)))).await? {
            unit_of_work.delete(child, row.id).await?;
        }
    }
    unit_of_work.delete(entity, id).await
}

/**
 * Replaces the association rows of a many-to-many relation.
 */
async fn replace_relation(unit_of_work: &mut UnitOfWork<'_>, relation: &ManyToManyDef, id: i64, ids: &[i64]) -> Result<(), ApplicationError> {
    let association = schema::entity(relation.association)?;
    let local = association.field(relation.local_column).ok_or_else(|| ApplicationError::new(ErrorType::Application, format!("{} has no field {}", association.name, relation.local_column)))?;
    for row in unit_of_work.fetch_all(association, Some((local, &Value::Integer(id)))).await? {
        unit_of_work.delete(association, row.id).await?;
    }
    for remote_id in ids {
        let mut values = BTreeMap::new();
        values.insert(relation.local_column.to_string(), Value::Integer(id));
        values.insert(relation.remote_column.to_string(), Value::Integer(*remote_id));
        unit_of_work.insert(association, &values).await?;
    }
    Ok(())
}

async fn open_history(unit_of_work: &mut UnitOfWork<'_>, history: &HistoryDef, owner_id: i64, tracked: Value) -> Result<(), ApplicationError> {
    let history_entity = schema::entity(history.table)?;
    let mut values = BTreeMap::new();
    values.insert(history.owner.to_string(), Value::Integer(owner_id));
    values.insert(history.tracked.to_string(), tracked);
    values.insert(history.begin.to_string(), Value::Date(today()));
    unit_of_work.insert(history_entity, &values).await?;
    Ok(())
}

/**
 * Ends every open history entry of the owning row today.
 */
async fn close_history(unit_of_work: &mut UnitOfWork<'_>, history: &HistoryDef, owner_id: i64) -> Result<(), ApplicationError> {
    let history_entity = schema::entity(history.table)?;
    let owner = history_entity.field(history.owner).ok_or_else(|| ApplicationError::new(ErrorType::Application, format!("{} has no field {}", history_entity.name, history.owner)))?;
    let mut values = BTreeMap::new();
    values.insert(history.end.to_string(), Value::Date(today()));
    for entry in unit_of_work.fetch_all(history_entity, Some((owner, &Value::Integer(owner_id)))).await? {
        if entry.get(history.end).is_null() {
            unit_of_work.update(history_entity, entry.id, &values).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::model::{
        schema::{BENEFITS_EMPLOYEE, EMPLOYEE_HISTORY, MODEL_OM_CHILD},
        value::Related,
    };

    fn service() -> EntityService {
        EntityService::new(Arc::new(Store::memory()), ProjectionContext { image_upload_url: "/static/uploads/".to_string() })
    }

    fn form(value: serde_json::Value) -> Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap()
    }

    async fn add_name(service: &EntityService, view: &str, name: &str) -> i64 {
        service.add(view, &form(json!({ "name": name }))).await.unwrap()
    }

    async fn count(service: &EntityService, entity: &'static EntityDef) -> usize {
        let mut unit_of_work = service.store.begin().await.unwrap();
        let rows = unit_of_work.fetch_all(entity, None).await.unwrap();
        unit_of_work.commit().await.unwrap();
        rows.len()
    }

    async fn add_employee(service: &EntityService, department: i64, function: i64, benefits: &[i64]) -> i64 {
        let input = json!({
            "full_name": "Ann Smith",
            "address": "Main street 1",
            "fiscal_number": 123,
            "employee_number": 7,
            "department": department,
            "function": function,
            "benefits": benefits,
        });
        service.add("employees", &form(input)).await.unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_country_is_rejected() {
        let service = service();
        add_name(&service, "countries", "Portugal").await;
        let error = service.add("countries", &form(json!({ "name": "Portugal" }))).await.unwrap_err();
        assert_eq!(error.error_type, ErrorType::ConstraintViolation);
        let list = service.list("countries", ListInputType::default(), PaginationInput::default()).await.unwrap();
        assert_eq!(list.count, 1);
        assert_eq!(list.rows[0].get("name"), &Value::Text("Portugal".to_string()));
    }

    #[tokio::test]
    async fn test_add_validation_reports_fields() {
        let service = service();
        let error = service.add("countries", &form(json!({ "name": "x".repeat(51), "population": 3 }))).await.unwrap_err();
        assert_eq!(error.error_type, ErrorType::Validation);
        let fields: Vec<&str> = error.fields.iter().map(|field| field.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "population"]);
        let error = service.add("countries", &Map::new()).await.unwrap_err();
        assert_eq!(error.fields[0].message, "Missing required value");
    }

    #[tokio::test]
    async fn test_list_filters_order_and_pages() {
        let service = service();
        for name in ["Spain", "Portugal", "France", "Poland"] {
            add_name(&service, "countries", name).await;
        }
        let input = ListInputType {
            filters: vec![Filter { column: "name".to_string(), operation: FilterOperation::StartsWith, value: json!("p") }],
            order: Some(("name".to_string(), SortDirection::Desc)),
        };
        let list = service.list("countries", input, PaginationInput { start_index: 0, page_size: 1 }).await.unwrap();
        assert_eq!(list.count, 2);
        assert!(list.pagination.has_more);
        assert_eq!(list.rows[0].get("name"), &Value::Text("Portugal".to_string()));

        let input = ListInputType { filters: vec![Filter { column: "population".to_string(), operation: FilterOperation::Equal, value: json!(1) }], order: None };
        assert_eq!(service.list("countries", input, PaginationInput::default()).await.unwrap_err().error_type, ErrorType::Validation);
    }

    #[tokio::test]
    async fn test_text_filter_on_reference_uses_label() {
        let service = service();
        let furniture = add_name(&service, "product_types", "Furniture").await;
        let lamps = add_name(&service, "product_types", "Lamps").await;
        service.add("products", &form(json!({ "name": "Chair", "price": "10.50", "product_type": furniture }))).await.unwrap();
        service.add("products", &form(json!({ "name": "Desk lamp", "price": 25, "product_type": lamps }))).await.unwrap();

        let input = ListInputType { filters: vec![Filter { column: "product_type".to_string(), operation: FilterOperation::Contains, value: json!("furn") }], order: None };
        let list = service.list("products_public", input, PaginationInput::default()).await.unwrap();
        assert_eq!(list.count, 1);
        assert_eq!(list.rows[0].get("name"), &Value::Text("Chair".to_string()));

        let input = ListInputType { filters: vec![Filter { column: "product_type".to_string(), operation: FilterOperation::StartsWith, value: json!("1") }], order: None };
        assert_eq!(service.list("products_public", input, PaginationInput::default()).await.unwrap().count, 0);

        let input = ListInputType { filters: vec![Filter { column: "product_type".to_string(), operation: FilterOperation::Equal, value: json!(lamps) }], order: None };
        let list = service.list("products_public", input, PaginationInput::default()).await.unwrap();
        assert_eq!(list.count, 1);
        assert_eq!(list.rows[0].get("name"), &Value::Text("Desk lamp".to_string()));
    }

    #[tokio::test]
    async fn test_base_order_and_resolved_references() {
        let service = service();
        let friends = add_name(&service, "contact_groups", "Friends").await;
        service.seed_names(&schema::GENDER, &["Male", "Female"]).await;
        service.seed_names(&schema::GENDER, &["Male"]).await;
        for name in ["Zed", "Amy"] {
            service.add("contacts", &form(json!({ "name": name, "contact_group": friends, "gender": 1 }))).await.unwrap();
        }
        let list = service.list("contacts", ListInputType::default(), PaginationInput::default()).await.unwrap();
        let names: Vec<String> = list.rows.iter().map(|row| row.get("name").display()).collect();
        assert_eq!(names, vec!["Amy", "Zed"]);
        assert_eq!(list.rows[0].get("contact_group"), &Value::Related(Related::new(friends, "Friends".to_string())));
        assert_eq!(count(&service, &schema::GENDER).await, 2);
    }

    #[tokio::test]
    async fn test_show_and_not_found() {
        let service = service();
        let id = add_name(&service, "countries", "Portugal").await;
        let row = service.show("countries", id).await.unwrap();
        assert_eq!(row.id, id);
        assert_eq!(row.get("name"), &Value::Text("Portugal".to_string()));
        assert_eq!(service.show("countries", 99).await.unwrap_err().error_type, ErrorType::NotFound);
        assert_eq!(service.show("missing", 1).await.unwrap_err().error_type, ErrorType::NotFound);
    }

    #[tokio::test]
    async fn test_permissions_are_enforced() {
        let service = service();
        let error = service.add("products_public", &form(json!({ "name": "Chair" }))).await.unwrap_err();
        assert_eq!(error.error_type, ErrorType::NotPermitted);
        assert_eq!(service.delete("contact_groups_master", 1).await.unwrap_err().error_type, ErrorType::NotPermitted);
    }

    #[tokio::test]
    async fn test_employee_history_and_benefits() {
        let service = service();
        let sales = add_name(&service, "departments", "Sales").await;
        let support = add_name(&service, "departments", "Support").await;
        let manager = add_name(&service, "functions", "Manager").await;
        let car = add_name(&service, "benefits", "Car").await;
        let employee = add_employee(&service, sales, manager, &[car]).await;

        let row = service.show("employees", employee).await.unwrap();
        assert_eq!(row.get("benefits"), &Value::Collection(vec![Related::new(car, "Car".to_string())]));
        assert_eq!(row.get("begin_date"), &Value::Date(today()));

        service.edit("employees", employee, &form(json!({ "department": support, "benefits": [] }))).await.unwrap();
        assert_eq!(count(&service, &BENEFITS_EMPLOYEE).await, 0);
        let history = service.related("employees", employee, "employee_history", ListInputType::default(), PaginationInput::default()).await.unwrap();
        assert_eq!(history.count, 2);
        assert_eq!(history.rows[0].get("department"), &Value::Related(Related::new(sales, "Sales".to_string())));
        assert_eq!(history.rows[0].get("end_date"), &Value::Date(today()));
        assert!(history.rows[1].get("end_date").is_null());

        let error = service.edit("employee_history", history.rows[0].id, &form(json!({ "department": support }))).await.unwrap_err();
        assert_eq!(error.error_type, ErrorType::Validation);
        service.edit("employees", employee, &form(json!({ "full_name": "Ann Jones" }))).await.unwrap();
        assert_eq!(count(&service, &EMPLOYEE_HISTORY).await, 2);
    }

    #[tokio::test]
    async fn test_delete_employee_removes_history_and_benefits() {
        let service = service();
        let sales = add_name(&service, "departments", "Sales").await;
        let manager = add_name(&service, "functions", "Manager").await;
        let car = add_name(&service, "benefits", "Car").await;
        let employee = add_employee(&service, sales, manager, &[car]).await;
        assert_eq!(count(&service, &EMPLOYEE_HISTORY).await, 1);

        service.delete("employees", employee).await.unwrap();
        assert_eq!(count(&service, &EMPLOYEE_HISTORY).await, 0);
        assert_eq!(count(&service, &BENEFITS_EMPLOYEE).await, 0);
        assert_eq!(count(&service, &schema::DEPARTMENT).await, 1);
        assert_eq!(service.show("employees", employee).await.unwrap_err().error_type, ErrorType::NotFound);
    }

    #[tokio::test]
    async fn test_employee_history_is_append_only() {
        let service = service();
        let sales = add_name(&service, "departments", "Sales").await;
        let manager = add_name(&service, "functions", "Manager").await;
        let employee = add_employee(&service, sales, manager, &[]).await;
        let history = service.related("employees", employee, "employee_history", ListInputType::default(), PaginationInput::default()).await.unwrap();
        let entry = history.rows[0].id;

        assert_eq!(service.delete("employee_history", entry).await.unwrap_err().error_type, ErrorType::NotPermitted);
        let error = service.add("employee_history", &form(json!({ "department": sales, "employee": employee }))).await.unwrap_err();
        assert_eq!(error.error_type, ErrorType::NotPermitted);
        service.edit("employee_history", entry, &form(json!({ "end_date": "2020-01-31" }))).await.unwrap();
        assert_eq!(count(&service, &EMPLOYEE_HISTORY).await, 1);
    }

    #[tokio::test]
    async fn test_delete_cascades_to_children() {
        let service = service();
        let parent = service.add("om_parents", &form(json!({ "field_string": "parent" }))).await.unwrap();
        for child in ["first", "second"] {
            service.add("om_children", &form(json!({ "field_string": child, "parent": parent }))).await.unwrap();
        }
        let children = service.related("om_parents", parent, "om_children", ListInputType::default(), PaginationInput::default()).await.unwrap();
        assert_eq!(children.count, 2);
        service.delete("om_parents", parent).await.unwrap();
        assert_eq!(count(&service, &MODEL_OM_CHILD).await, 0);
        assert_eq!(service.delete("om_parents", parent).await.unwrap_err().error_type, ErrorType::NotFound);
    }

    #[tokio::test]
    async fn test_restricted_delete_keeps_row() {
        let service = service();
        let friends = add_name(&service, "contact_groups", "Friends").await;
        service.seed_names(&schema::GENDER, &["Male"]).await;
        service.add("contacts", &form(json!({ "name": "Amy", "contact_group": friends, "gender": 1 }))).await.unwrap();
        assert_eq!(service.delete("contact_groups", friends).await.unwrap_err().error_type, ErrorType::ConstraintViolation);
        assert_eq!(count(&service, &schema::CONTACT_GROUP).await, 1);
    }

    #[tokio::test]
    async fn test_bulk_delete_action() {
        let service = service();
        let outcome = service.run_action("om_parents", "muldelete", &[]).await.unwrap();
        assert_eq!(outcome, ActionOutcome::default());
        let first = service.add("om_parents", &form(json!({ "field_string": "a" }))).await.unwrap();
        let second = service.add("om_parents", &form(json!({ "field_string": "b" }))).await.unwrap();
        service.add("om_children", &form(json!({ "field_string": "c", "parent": first }))).await.unwrap();
        let outcome = service.run_action("om_parents", "muldelete", &[first, second, 42]).await.unwrap();
        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.failures, vec![ActionFailure { id: 42, message: "ModelOMParent not found".to_string() }]);
        assert_eq!(count(&service, &MODEL_OM_CHILD).await, 0);
    }

    #[tokio::test]
    async fn test_change_name_action_is_single() {
        let service = service();
        let first = add_name(&service, "contact_groups", "Friends").await;
        let second = add_name(&service, "contact_groups", "Family").await;
        let error = service.run_action("contact_groups", "myaction", &[first, second]).await.unwrap_err();
        assert_eq!(error.error_type, ErrorType::Validation);
        let outcome = service.run_action("contact_groups", "myaction", &[first]).await.unwrap();
        assert_eq!(outcome.processed, 1);
        assert_eq!(service.show("contact_groups", first).await.unwrap().get("name"), &Value::Text("Club Member".to_string()));
        assert_eq!(service.run_action("contact_groups", "unknown", &[first]).await.unwrap_err().error_type, ErrorType::NotFound);
    }
}
