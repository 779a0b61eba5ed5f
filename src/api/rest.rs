use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::{Deserialize, Serialize};

use crate::model::{
    apperror::{ApplicationError, ErrorType, FieldError},
    charts::{ChartOutput, ChartPoint, Dataset},
    models::{ActionFailure, ActionOutcome, DEFAULT_PAGE_SIZE, Filter, FilterOperation, ListInputType, ListOutputType, PaginationInput, PaginationOutput, Row, SortDirection},
    value::Value,
    views::{ActionDef, Fieldset, ViewConfig, Widget},
};

/***************** Views:list models *********************/

/**
 * Request structure for listing rows of a view.
 */
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequest {
    #[serde(default)]
    pub filters: Vec<FilterRequest>,
    pub order: Option<OrderRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRequest {
    pub column: String,
    pub operation: FilterOperation,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub column: String,
    pub direction: SortDirection,
}

impl From<ListRequest> for ListInputType {
    fn from(request: ListRequest) -> Self {
        ListInputType {
            filters: request.filters.into_iter().map(|filter| Filter { column: filter.column, operation: filter.operation, value: filter.value }).collect(),
            order: request.order.map(|order| (order.column, order.direction)),
        }
    }
}

/**
 * Response structure for listing rows of a view.
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    /**
     * Rows of the page, projected on the list columns of the view.
     */
    rows: Vec<Row>,
    /**
     * Number of rows matching the filters.
     */
    count: usize,
    /**
     * Pagination information for the response.
     */
    pagination: PaginationResponse,
}

impl From<ListOutputType> for ListResponse {
    fn from(output: ListOutputType) -> Self {
        ListResponse { rows: output.rows, count: output.count, pagination: PaginationResponse::from(output.pagination) }
    }
}

/***************** Views:add models *********************/

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddResponse {
    pub id: i64,
}

/***************** Views:actions models *********************/

/**
 * Selection an action runs on.
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    #[serde(default)]
    pub ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    processed: usize,
    failures: Vec<ActionFailure>,
}

impl From<ActionOutcome> for ActionResponse {
    fn from(outcome: ActionOutcome) -> Self {
        ActionResponse { processed: outcome.processed, failures: outcome.failures }
    }
}

/***************** Views:describe models *********************/

/**
 * View configuration handed to a generic rendering collaborator.
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewDescriptionResponse {
    name: &'static str,
    entity: &'static str,
    permissions: Vec<&'static str>,
    list_columns: Vec<ColumnResponse>,
    show_columns: Vec<ColumnResponse>,
    add_columns: Vec<ColumnResponse>,
    edit_columns: Vec<ColumnResponse>,
    show_fieldsets: Vec<FieldsetResponse>,
    add_fieldsets: Vec<FieldsetResponse>,
    edit_fieldsets: Vec<FieldsetResponse>,
    search_columns: Vec<&'static str>,
    base_order: Option<OrderResponse>,
    actions: Vec<ActionDescriptionResponse>,
    related_views: Vec<&'static str>,
    list_widget: &'static str,
    show_widget: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnResponse {
    name: &'static str,
    label: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldsetResponse {
    name: &'static str,
    fields: Vec<&'static str>,
    expanded: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    column: &'static str,
    direction: SortDirection,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDescriptionResponse {
    name: &'static str,
    text: &'static str,
    confirmation: &'static str,
    icon: &'static str,
    multiple: bool,
    single: bool,
}

impl From<&ActionDef> for ActionDescriptionResponse {
    fn from(action: &ActionDef) -> Self {
        ActionDescriptionResponse { name: action.name, text: action.text, confirmation: action.confirmation, icon: action.icon, multiple: action.multiple, single: action.single }
    }
}

impl From<&Fieldset> for FieldsetResponse {
    fn from(fieldset: &Fieldset) -> Self {
        FieldsetResponse { name: fieldset.name, fields: fieldset.fields.to_vec(), expanded: fieldset.expanded }
    }
}

fn widget_name(widget: Widget) -> &'static str {
    match widget {
        Widget::Table => "table",
        Widget::Block => "block",
    }
}

impl From<&ViewConfig> for ViewDescriptionResponse {
    fn from(view: &ViewConfig) -> Self {
        let columns = |names: Vec<&'static str>| names.into_iter().map(|name| ColumnResponse { name, label: view.label(name) }).collect::<Vec<ColumnResponse>>();
        let fieldsets = |fieldsets: &[Fieldset]| fieldsets.iter().map(FieldsetResponse::from).collect::<Vec<FieldsetResponse>>();
        ViewDescriptionResponse {
            name: view.name,
            entity: view.entity.name,
            permissions: view.permissions.iter().map(|permission| permission.name()).collect(),
            list_columns: columns(view.list_columns()),
            show_columns: columns(view.show_columns()),
            add_columns: columns(view.add_columns()),
            edit_columns: columns(view.edit_columns()),
            show_fieldsets: fieldsets(view.show_fieldsets),
            add_fieldsets: fieldsets(view.add_fieldsets),
            edit_fieldsets: fieldsets(view.edit_fieldsets),
            search_columns: view.search_columns(),
            base_order: view.base_order.map(|(column, direction)| OrderResponse { column, direction }),
            actions: view.actions.iter().map(ActionDescriptionResponse::from).collect(),
            related_views: view.related_views.to_vec(),
            list_widget: widget_name(view.list_widget),
            show_widget: widget_name(view.show_widget),
        }
    }
}

/***************** Charts models *********************/

/**
 * Query parameters of a chart request.
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartQuery {
    /**
     * Column to group by, among the group-by columns of the chart.
     */
    pub group_by: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartResponse {
    name: &'static str,
    title: &'static str,
    chart_type: &'static str,
    datasets: Vec<DatasetResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetResponse {
    label: Option<String>,
    columns: Vec<String>,
    rows: Vec<ChartRowResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartRowResponse {
    key: Value,
    label: String,
    values: Vec<Option<f64>>,
}

impl From<ChartPoint> for ChartRowResponse {
    fn from(point: ChartPoint) -> Self {
        ChartRowResponse { key: point.key, label: point.label, values: point.values }
    }
}

impl From<Dataset> for DatasetResponse {
    fn from(dataset: Dataset) -> Self {
        DatasetResponse { label: dataset.label, columns: dataset.columns, rows: dataset.points.into_iter().map(ChartRowResponse::from).collect() }
    }
}

impl From<ChartOutput> for ChartResponse {
    fn from(output: ChartOutput) -> Self {
        ChartResponse { name: output.name, title: output.title, chart_type: output.chart_type.name(), datasets: output.datasets.into_iter().map(DatasetResponse::from).collect() }
    }
}

/***************** Error models *********************/

/**
 * Custom error response for the application.
 */
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /**
     * The error code associated with the error type.
     */
    pub code: u16,
    /**
     * A human-readable message describing the error.
     */
    pub message: String,
    /**
     * Per field validation problems.
     */
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

impl ResponseError for ApplicationError {
    fn status_code(&self) -> StatusCode {
        get_statuscode(&self.error_type)
    }

    /**
     * Generates an error response for the application error.
     */
    fn error_response(&self) -> HttpResponse {
        let error_response = ErrorResponse { code: get_error_code(&self.error_type), message: self.message.clone(), fields: self.fields.clone() };
        HttpResponse::build(get_statuscode(&self.error_type)).json(&error_response)
    }
}

/**
* Maps application errors to HTTP status codes.
*
* # Arguments
* `application_error`: The type of error that occurred.
*
* # Returns
* The corresponding HTTP status code.
*/
fn get_statuscode(application_error: &ErrorType) -> StatusCode {
    match application_error {
        ErrorType::Initialization | ErrorType::DatabaseError | ErrorType::Application => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorType::ConstraintViolation => StatusCode::CONFLICT,
        ErrorType::NotFound => StatusCode::NOT_FOUND,
        ErrorType::Validation => StatusCode::BAD_REQUEST,
        ErrorType::NotPermitted => StatusCode::METHOD_NOT_ALLOWED,
    }
}

/**
 * Maps application errors to error codes.
 *
 * # Arguments
 * `application_error`: The type of error that occurred.
 *
 * # Returns
 * The corresponding error code.
 */
fn get_error_code(application_error: &ErrorType) -> u16 {
    match application_error {
        ErrorType::Initialization => 1001,
        ErrorType::DatabaseError => 1003,
        ErrorType::ConstraintViolation => 1004,
        ErrorType::NotFound => 1005,
        ErrorType::Validation => 1006,
        ErrorType::NotPermitted => 1007,
        ErrorType::Application => 1008,
    }
}

/***************** Common models *********************/

/**
 * Pagination query parameters for API requests.
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationQuery {
    /**
     * The index of the first item to return.
     */
    pub start_index: Option<i64>,
    /**
     * The size of the page to return.
     */
    pub page_size: Option<i64>,
}

impl From<PaginationQuery> for PaginationInput {
    fn from(query: PaginationQuery) -> Self {
        PaginationInput { start_index: query.start_index.unwrap_or(0), page_size: query.page_size.unwrap_or(DEFAULT_PAGE_SIZE) }
    }
}

/**
 * Pagination response structure.
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationResponse {
    /**
     * The starting index of the returned items.
     */
    pub start_index: Option<i64>,
    /**
     * The size of the page.
     */
    pub page_size: Option<i64>,
    /**
     * Indicates if there are more items available.
     */
    pub has_more_elements: bool,
}

impl From<PaginationOutput> for PaginationResponse {
    fn from(pagination_output: PaginationOutput) -> Self {
        PaginationResponse { start_index: Some(pagination_output.start_index), page_size: Some(pagination_output.page_size), has_more_elements: pagination_output.has_more }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(get_statuscode(&ErrorType::ConstraintViolation), StatusCode::CONFLICT);
        assert_eq!(get_statuscode(&ErrorType::NotPermitted), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(ApplicationError::with_fields(vec![]).status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_list_request_defaults() {
        let request: ListRequest = serde_json::from_str("{}").unwrap();
        let input = ListInputType::from(request);
        assert!(input.filters.is_empty());
        assert!(input.order.is_none());
        let request: ListRequest = serde_json::from_str(r#"{"filters":[{"column":"name","operation":"startsWith","value":"Po"}],"order":{"column":"name","direction":"desc"}}"#).unwrap();
        let input = ListInputType::from(request);
        assert_eq!(input.filters[0].operation, FilterOperation::StartsWith);
        assert_eq!(input.order, Some(("name".to_string(), SortDirection::Desc)));
    }

    #[test]
    fn test_describe_contacts() {
        let description = serde_json::to_value(ViewDescriptionResponse::from(&crate::model::views::CONTACT_VIEW)).unwrap();
        assert_eq!(description["baseOrder"]["direction"], "asc");
        assert_eq!(description["listColumns"][2]["label"], "Contacts Group");
        assert_eq!(description["showFieldsets"][1]["name"], "Personal Info");
        assert_eq!(description["permissions"][0], "can_list");
    }
}
