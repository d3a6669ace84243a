//! Configuration validation utilities.
//!
//! Implementation parameters (service config tables and strategy
//! `{type, ...params}` entries alike) arrive as raw TOML values. Each
//! implementation describes what it accepts with a [`Schema`] and exposes it
//! through [`ConfigSchema`], so malformed parameters are rejected before any
//! network call is made.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
	/// Error that occurs when a required field is missing.
	#[error("Missing required field: {0}")]
	MissingField(String),
	/// Error that occurs when a field has an invalid value.
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	/// Error that occurs when field type is incorrect.
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
	/// Error that occurs when a field is not part of the schema.
	#[error("Unknown field: {0}")]
	UnknownField(String),
}

/// Represents the type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	/// A string value.
	String,
	/// A 20-byte hex address string with `0x` prefix.
	Address,
	/// An integer value with optional inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	/// A boolean value.
	Boolean,
	/// An array of values, all of the same type.
	Array(Box<FieldType>),
	/// A nested table with its own schema.
	Table(Schema),
}

/// Custom validator run after the type check passes.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A named field in a configuration schema.
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	/// Creates a new field with the given name and type.
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	/// Adds a custom validator to this field.
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}
}

/// Defines a validation schema for a TOML table.
///
/// Schemas can be nested through [`FieldType::Table`]. A strict schema also
/// rejects keys that are neither required nor optional, which catches typos in
/// strategy documents (`treshold`) that would otherwise be silently ignored.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
	pub strict: bool,
}

impl Schema {
	/// Creates a new schema with required and optional fields.
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self {
			required,
			optional,
			strict: false,
		}
	}

	/// Makes the schema reject unknown keys.
	pub fn strict(mut self) -> Self {
		self.strict = true;
		self
	}

	/// Validates a TOML value against this schema.
	///
	/// # Errors
	///
	/// Returns an error if:
	/// - The value is not a table
	/// - A required field is missing
	/// - A field has the wrong type or fails its custom validator
	/// - The schema is strict and an unknown key is present
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table".to_string(),
				actual: config.type_str().to_string(),
			})?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			validate_field(field, value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				validate_field(field, value)?;
			}
		}

		if self.strict {
			for key in table.keys() {
				let known = self
					.required
					.iter()
					.chain(self.optional.iter())
					.any(|f| &f.name == key);
				if !known {
					return Err(ValidationError::UnknownField(key.clone()));
				}
			}
		}

		Ok(())
	}
}

fn validate_field(field: &Field, value: &toml::Value) -> Result<(), ValidationError> {
	validate_field_type(&field.name, value, &field.field_type)?;

	if let Some(validator) = &field.validator {
		validator(value).map_err(|msg| ValidationError::InvalidValue {
			field: field.name.clone(),
			message: msg,
		})?;
	}

	Ok(())
}

fn type_mismatch(field_name: &str, expected: &str, value: &toml::Value) -> ValidationError {
	ValidationError::TypeMismatch {
		field: field_name.to_string(),
		expected: expected.to_string(),
		actual: value.type_str().to_string(),
	}
}

/// Checks a value against the expected type, recursing into arrays and tables.
fn validate_field_type(
	field_name: &str,
	value: &toml::Value,
	expected_type: &FieldType,
) -> Result<(), ValidationError> {
	match expected_type {
		FieldType::String => {
			if !value.is_str() {
				return Err(type_mismatch(field_name, "string", value));
			}
		},
		FieldType::Address => {
			let s = value
				.as_str()
				.ok_or_else(|| type_mismatch(field_name, "address", value))?;
			if !is_hex_address(s) {
				return Err(ValidationError::InvalidValue {
					field: field_name.to_string(),
					message: format!("'{}' is not a 0x-prefixed 20-byte hex address", s),
				});
			}
		},
		FieldType::Integer { min, max } => {
			let int_val = value
				.as_integer()
				.ok_or_else(|| type_mismatch(field_name, "integer", value))?;

			if let Some(min_val) = min {
				if int_val < *min_val {
					return Err(ValidationError::InvalidValue {
						field: field_name.to_string(),
						message: format!("Value {} is less than minimum {}", int_val, min_val),
					});
				}
			}

			if let Some(max_val) = max {
				if int_val > *max_val {
					return Err(ValidationError::InvalidValue {
						field: field_name.to_string(),
						message: format!("Value {} is greater than maximum {}", int_val, max_val),
					});
				}
			}
		},
		FieldType::Boolean => {
			if !value.is_bool() {
				return Err(type_mismatch(field_name, "boolean", value));
			}
		},
		FieldType::Array(inner_type) => {
			let array = value
				.as_array()
				.ok_or_else(|| type_mismatch(field_name, "array", value))?;

			for (i, item) in array.iter().enumerate() {
				validate_field_type(&format!("{}[{}]", field_name, i), item, inner_type)?;
			}
		},
		FieldType::Table(schema) => {
			schema.validate(value).map_err(|e| match e {
				ValidationError::MissingField(f) => {
					ValidationError::MissingField(format!("{}.{}", field_name, f))
				},
				ValidationError::InvalidValue { field, message } => ValidationError::InvalidValue {
					field: format!("{}.{}", field_name, field),
					message,
				},
				ValidationError::TypeMismatch {
					field,
					expected,
					actual,
				} => ValidationError::TypeMismatch {
					field: format!("{}.{}", field_name, field),
					expected,
					actual,
				},
				ValidationError::UnknownField(f) => {
					ValidationError::UnknownField(format!("{}.{}", field_name, f))
				},
			})?;
		},
	}

	Ok(())
}

fn is_hex_address(s: &str) -> bool {
	s.len() == 42
		&& (s.starts_with("0x") || s.starts_with("0X"))
		&& s[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// A configuration schema that can validate TOML values.
///
/// Implemented by every pluggable implementation so its parameters can be
/// checked before construction.
pub trait ConfigSchema: Send + Sync {
	/// Validates a TOML configuration value against this schema.
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn params(s: &str) -> toml::Value {
		toml::Value::Table(s.parse::<toml::Table>().unwrap())
	}

	fn multisig_schema() -> Schema {
		Schema::new(
			vec![Field::new("safe", FieldType::Address)],
			vec![Field::new(
				"threshold",
				FieldType::Integer {
					min: Some(1),
					max: Some(256),
				},
			)],
		)
		.strict()
	}

	#[test]
	fn test_accepts_valid_params() {
		let config = params(
			r#"
safe = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
threshold = 2
"#,
		);
		assert!(multisig_schema().validate(&config).is_ok());
	}

	#[test]
	fn test_rejects_missing_and_malformed_fields() {
		let missing = params("threshold = 2");
		assert!(matches!(
			multisig_schema().validate(&missing),
			Err(ValidationError::MissingField(f)) if f == "safe"
		));

		let bad_address = params(r#"safe = "0x1234""#);
		assert!(matches!(
			multisig_schema().validate(&bad_address),
			Err(ValidationError::InvalidValue { field, .. }) if field == "safe"
		));

		let below_min = params(
			r#"
safe = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
threshold = 0
"#,
		);
		assert!(multisig_schema().validate(&below_min).is_err());
	}

	#[test]
	fn test_strict_schema_rejects_unknown_keys() {
		let typo = params(
			r#"
safe = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
treshold = 2
"#,
		);
		assert!(matches!(
			multisig_schema().validate(&typo),
			Err(ValidationError::UnknownField(f)) if f == "treshold"
		));

		let lenient = Schema::new(vec![], vec![]);
		assert!(lenient.validate(&typo).is_ok());
	}

	#[test]
	fn test_nested_table_errors_are_qualified() {
		let schema = Schema::new(
			vec![Field::new(
				"retry",
				FieldType::Table(Schema::new(
					vec![Field::new("max_retries", FieldType::Integer { min: None, max: None })],
					vec![],
				)),
			)],
			vec![],
		);

		let config = params("[retry]\n");
		assert!(matches!(
			schema.validate(&config),
			Err(ValidationError::MissingField(f)) if f == "retry.max_retries"
		));
	}
}
