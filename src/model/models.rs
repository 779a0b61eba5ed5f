use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{
    apperror::{ApplicationError, ErrorType},
    value::Value,
};

/**
 * Largest page a list request may ask for.
 */
pub const MAX_PAGE_SIZE: i64 = 1000;

/**
 * Default page size when the request does not specify one.
 */
pub const DEFAULT_PAGE_SIZE: i64 = 100;

static NULL: Value = Value::Null;

/**
 * A row of an entity: the surrogate id and the column values keyed by column name.
 */
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Row {
    pub id: i64,
    #[serde(flatten)]
    pub values: BTreeMap<String, Value>,
}

impl Row {
    pub fn new(id: i64) -> Self {
        Row { id, values: BTreeMap::new() }
    }

    /**
     * Builder style setter, mostly handy in tests.
     */
    pub fn with(mut self, column: &str, value: Value) -> Self {
        self.set(column, value);
        self
    }

    /**
     * Value of a column. Columns that are not present read as null.
     */
    pub fn get(&self, column: &str) -> &Value {
        self.values.get(column).unwrap_or(&NULL)
    }

    pub fn set(&mut self, column: &str, value: Value) {
        self.values.insert(column.to_string(), value);
    }
}

/**
 * Sort direction of a list.
 */
#[derive(Debug, Clone, Copy, PartialEq, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/**
 * Pagination parameters of a list request.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaginationInput {
    pub start_index: i64,
    pub page_size: i64,
}

impl PaginationInput {
    /**
     * Validates the pagination input.
     *
     * # Returns
     * The input itself or a validation error if the values are out of range.
     */
    pub fn validate(self) -> Result<Self, ApplicationError> {
        if self.start_index < 0 {
            return Err(ApplicationError::new(ErrorType::Validation, "Start index cannot be negative".to_string()));
        }
        if self.page_size < 1 || self.page_size > MAX_PAGE_SIZE {
            return Err(ApplicationError::new(ErrorType::Validation, format!("Page size must be between 1 and {MAX_PAGE_SIZE}")));
        }
        Ok(self)
    }
}

impl Default for PaginationInput {
    fn default() -> Self {
        PaginationInput { start_index: 0, page_size: DEFAULT_PAGE_SIZE }
    }
}

/**
 * Pagination information returned with a list.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaginationOutput {
    pub start_index: i64,
    pub page_size: i64,
    pub has_more: bool,
}

impl PaginationOutput {
    pub fn new(start_index: i64, page_size: i64, has_more: bool) -> Self {
        PaginationOutput { start_index, page_size, has_more }
    }
}

/**
 * Comparison applied by a search filter.
 */
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperation {
    Equal,
    NotEqual,
    Contains,
    StartsWith,
    Greater,
    Smaller,
}

impl FilterOperation {
    /**
     * Whether a stored value passes the filter. Text comparisons ignore case, nulls only match `NotEqual`.
     *
     * # Arguments
     * `value`: The stored value of the row.
     * `target`: The value given in the filter.
     */
    pub fn matches(&self, value: &Value, target: &Value) -> bool {
        if value.is_null() {
            return *self == FilterOperation::NotEqual && !target.is_null();
        }
        match self {
            FilterOperation::Equal => value.compare(target).is_eq(),
            FilterOperation::NotEqual => value.compare(target).is_ne(),
            FilterOperation::Contains => value.display().to_lowercase().contains(&target.display().to_lowercase()),
            FilterOperation::StartsWith => value.display().to_lowercase().starts_with(&target.display().to_lowercase()),
            FilterOperation::Greater => !target.is_null() && value.compare(target).is_gt(),
            FilterOperation::Smaller => !target.is_null() && value.compare(target).is_lt(),
        }
    }

    /**
     * Whether the filter matches on the displayed text, references included.
     */
    pub fn is_text(&self) -> bool {
        matches!(self, FilterOperation::Contains | FilterOperation::StartsWith)
    }
}

/**
 * Search filter on a single column.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub operation: FilterOperation,
    pub value: serde_json::Value,
}

/**
 * Filters and ordering of a list request.
 */
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListInputType {
    pub filters: Vec<Filter>,
    pub order: Option<(String, SortDirection)>,
}

/**
 * One page of rows.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct ListOutputType {
    pub rows: Vec<Row>,
    pub count: usize,
    pub pagination: PaginationOutput,
}

impl ListOutputType {
    pub fn new(rows: Vec<Row>, count: usize, pagination: PaginationOutput) -> Self {
        ListOutputType { rows, count, pagination }
    }
}

/**
 * Record that an action could not process.
 */
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionFailure {
    pub id: i64,
    pub message: String,
}

/**
 * Result of running an action over a selection of records.
 */
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ActionOutcome {
    pub processed: usize,
    pub failures: Vec<ActionFailure>,
}
