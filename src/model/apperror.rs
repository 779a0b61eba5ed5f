use std::fmt;

use serde::Serialize;

/**
 * Represents the type of error that can occur within the application.
 */
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorType {
    Initialization,
    DatabaseError,
    ConstraintViolation,
    NotFound,
    Validation,
    NotPermitted,
    Application,
}

/**
 * Validation problem tied to a single input field.
 */
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    /**
     * Name of the field that failed validation.
     */
    pub field: String,
    /**
     * Description of the problem.
     */
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: &str) -> Self {
        FieldError { field: field.to_string(), message: message.to_string() }
    }
}

/**
 * Represents an error that occurs within the application.
 */
#[derive(Debug, Clone)]
pub struct ApplicationError {
    /**
     * Error type.
     */
    pub error_type: ErrorType,
    /**
     * Error message describing problem.
     */
    pub message: String,
    /**
     * Per field problems. Only filled for validation errors on form input.
     */
    pub fields: Vec<FieldError>,
}

impl ApplicationError {
    /**
     * Creates a new ApplicationError.
     *
     * #Arguments
     * `error_type`: The type of error.
     * `message`: A description of the error.
     */
    pub fn new(error_type: ErrorType, message: String) -> Self {
        ApplicationError { error_type, message, fields: vec![] }
    }

    /**
     * Creates a validation error carrying the offending fields.
     *
     * #Arguments
     * `fields`: The fields that failed validation.
     */
    pub fn with_fields(fields: Vec<FieldError>) -> Self {
        ApplicationError { error_type: ErrorType::Validation, message: "Invalid input".to_string(), fields }
    }
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
