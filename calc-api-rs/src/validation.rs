//! Calculation API Input Validation
//!
//! Request bodies are checked against a per-endpoint [`Schema`]: an ordered
//! list of field constraints evaluated in a single fail-fast pass. Only the
//! first violation is reported, as a short message naming the field.

use axum::http::{header::CONTENT_TYPE, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Maximum accepted request body (100 KiB)
pub const MAX_PAYLOAD_SIZE: usize = 100 * 1024;

/// Largest `n` accepted by the expression endpoint
pub const MAX_EXPRESSION_N: f64 = 1_000_000.0;

/// Schema for `/calculate-triangle`
pub static TRIANGLE_SCHEMA: Lazy<Schema> = Lazy::new(|| {
    Schema::new()
        .field("sideA", FieldSchema::number().required().positive().build())
        .field("sideB", FieldSchema::number().required().positive().build())
        .field(
            "angle",
            FieldSchema::number().required().positive().maximum(180.0).build(),
        )
});

/// Schema for `/calculate-expression`
pub static EXPRESSION_SCHEMA: Lazy<Schema> = Lazy::new(|| {
    Schema::new()
        .field("a", FieldSchema::number().required().build())
        .field(
            "n",
            FieldSchema::number()
                .required()
                .integer()
                .positive()
                .maximum(MAX_EXPRESSION_N)
                .build(),
        )
});

/// A single constraint violation. The display form is the client-facing message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldViolation {
    #[error("\"value\" must be of type object")]
    NotAnObject,

    #[error("\"{0}\" is required")]
    Missing(String),

    #[error("\"{0}\" must be a number")]
    NotANumber(String),

    #[error("\"{0}\" must be an integer")]
    NotAnInteger(String),

    #[error("\"{0}\" must be a positive number")]
    NotPositive(String),

    #[error("\"{field}\" must be less than or equal to {max}")]
    AboveMaximum { field: String, max: f64 },

    #[error("\"{0}\" is not allowed")]
    NotAllowed(String),
}

/// Error response body for rejected requests
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ValidationErrorResponse {
    pub error: String,
}

/// Validation error for API requests
#[derive(Debug, thiserror::Error)]
pub enum ApiValidationError {
    #[error("Invalid request format: {0}")]
    InvalidFormat(String),

    #[error("Request payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    Schema(#[from] FieldViolation),
}

impl ApiValidationError {
    /// Convert to HTTP status code and error response
    pub fn to_response(&self) -> (StatusCode, Json<ValidationErrorResponse>) {
        let status = match self {
            Self::InvalidFormat(_) | Self::Schema(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        };

        (status, Json(ValidationErrorResponse { error: self.to_string() }))
    }
}

impl IntoResponse for ApiValidationError {
    fn into_response(self) -> Response {
        self.to_response().into_response()
    }
}

/// Supported field types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldType {
    Number,
}

/// Constraints for a single field
#[derive(Debug, Clone)]
pub struct FieldSchema {
    field_type: FieldType,
    required: bool,
    integer: bool,
    positive: bool,
    maximum: Option<f64>,
}

impl FieldSchema {
    /// Start a numeric field definition
    pub fn number() -> FieldSchemaBuilder {
        FieldSchemaBuilder::new(FieldType::Number)
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Check a present value. Rule order: type, integer, positive, maximum.
    pub fn validate(&self, name: &str, value: &Value) -> Result<(), FieldViolation> {
        let num = match (self.field_type, value) {
            (FieldType::Number, Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| FieldViolation::NotANumber(name.to_string()))?,
            (FieldType::Number, _) => return Err(FieldViolation::NotANumber(name.to_string())),
        };

        if self.integer && num.fract() != 0.0 {
            return Err(FieldViolation::NotAnInteger(name.to_string()));
        }

        if self.positive && num <= 0.0 {
            return Err(FieldViolation::NotPositive(name.to_string()));
        }

        if let Some(max) = self.maximum {
            if num > max {
                return Err(FieldViolation::AboveMaximum {
                    field: name.to_string(),
                    max,
                });
            }
        }

        Ok(())
    }
}

/// Builder for [`FieldSchema`]
#[derive(Debug)]
pub struct FieldSchemaBuilder {
    schema: FieldSchema,
}

impl FieldSchemaBuilder {
    fn new(field_type: FieldType) -> Self {
        Self {
            schema: FieldSchema {
                field_type,
                required: false,
                integer: false,
                positive: false,
                maximum: None,
            },
        }
    }

    pub fn required(mut self) -> Self {
        self.schema.required = true;
        self
    }

    pub fn integer(mut self) -> Self {
        self.schema.integer = true;
        self
    }

    /// Strictly greater than zero
    pub fn positive(mut self) -> Self {
        self.schema.positive = true;
        self
    }

    /// Inclusive upper bound
    pub fn maximum(mut self, max: f64) -> Self {
        self.schema.maximum = Some(max);
        self
    }

    pub fn build(self) -> FieldSchema {
        self.schema
    }
}

/// Object schema: declared fields in evaluation order
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<(String, FieldSchema)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field; fields are checked in the order they are added
    pub fn field(mut self, name: &str, schema: FieldSchema) -> Self {
        self.fields.push((name.to_string(), schema));
        self
    }

    /// Validate `value`, stopping at the first violation.
    ///
    /// Declared fields are checked first, in order; keys the schema does not
    /// declare are rejected afterwards.
    pub fn validate(&self, value: &Value) -> Result<(), FieldViolation> {
        let obj = match value {
            Value::Object(obj) => obj,
            _ => return Err(FieldViolation::NotAnObject),
        };

        for (name, field) in &self.fields {
            match obj.get(name) {
                Some(v) => field.validate(name, v)?,
                None if field.is_required() => {
                    return Err(FieldViolation::Missing(name.clone()));
                }
                None => {}
            }
        }

        if let Some(unknown) = obj
            .keys()
            .find(|key| !self.fields.iter().any(|(name, _)| name == *key))
        {
            return Err(FieldViolation::NotAllowed(unknown.clone()));
        }

        Ok(())
    }
}

/// A request body that has passed its endpoint schema
#[derive(Debug, Clone)]
pub struct ValidatedBody(pub Value);

impl ValidatedBody {
    /// Convert into the endpoint's typed input
    pub fn into_input<T: DeserializeOwned>(self) -> Result<T, ApiValidationError> {
        serde_json::from_value(self.0)
            .map_err(|e| ApiValidationError::InvalidFormat(format!("Invalid body: {}", e)))
    }
}

/// Whether the request declares a JSON body (`application/json` or `application/*+json`)
pub fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| ct.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json"
                || (mime.starts_with("application/") && mime.ends_with("+json"))
        })
        .unwrap_or(false)
}

/// Decode a request body into JSON.
///
/// Non-JSON content types and empty bodies decode to an empty object, so the
/// schema reports the first missing field rather than a format error.
pub fn parse_request_body(headers: &HeaderMap, body: &[u8]) -> Result<Value, ApiValidationError> {
    if !is_json_content_type(headers) || body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }

    serde_json::from_slice::<Value>(body)
        .map_err(|e| ApiValidationError::InvalidFormat(format!("Invalid JSON: {}", e)))
}
