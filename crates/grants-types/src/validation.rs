//! Configuration validation for pluggable implementations.
//!
//! Account implementations receive their settings as raw TOML tables. Each one
//! declares a [`Schema`] describing required and optional fields so that a
//! misconfigured table is rejected with a precise message before any key
//! material or network client is created.

use alloy_primitives::Address;
use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
	/// A required field is missing.
	#[error("Missing required field: {0}")]
	MissingField(String),
	/// A field has an invalid value.
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	/// A field has the wrong TOML type.
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
}

/// The type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	/// A string value.
	String,
	/// A string holding a 20-byte hex address.
	Address,
	/// A string holding an http(s) URL.
	Url,
	/// An integer value with optional inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
}

/// Custom validator run after the type check succeeds.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A single field in a configuration schema.
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

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		validate_field_type(&self.name, value, &self.field_type)?;
		if let Some(validator) = &self.validator {
			validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			})?;
		}
		Ok(())
	}
}

/// A validation schema for a TOML table.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	/// Creates a new schema with required and optional fields.
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a TOML value against this schema.
	///
	/// Required fields must be present; optional fields are only checked when
	/// present.
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
			field.check(value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}

		Ok(())
	}
}

fn mismatch(field_name: &str, expected: &str, value: &toml::Value) -> ValidationError {
	ValidationError::TypeMismatch {
		field: field_name.to_string(),
		expected: expected.to_string(),
		actual: value.type_str().to_string(),
	}
}

fn validate_field_type(
	field_name: &str,
	value: &toml::Value,
	expected_type: &FieldType,
) -> Result<(), ValidationError> {
	match expected_type {
		FieldType::String => {
			value
				.as_str()
				.ok_or_else(|| mismatch(field_name, "string", value))?;
		},
		FieldType::Address => {
			let raw = value
				.as_str()
				.ok_or_else(|| mismatch(field_name, "address string", value))?;
			raw.parse::<Address>()
				.map_err(|e| ValidationError::InvalidValue {
					field: field_name.to_string(),
					message: format!("'{}' is not an address: {}", raw, e),
				})?;
		},
		FieldType::Url => {
			let raw = value
				.as_str()
				.ok_or_else(|| mismatch(field_name, "url string", value))?;
			let parsed = url::Url::parse(raw).map_err(|e| ValidationError::InvalidValue {
				field: field_name.to_string(),
				message: format!("invalid url: {}", e),
			})?;
			if !matches!(parsed.scheme(), "http" | "https") {
				return Err(ValidationError::InvalidValue {
					field: field_name.to_string(),
					message: format!("unsupported url scheme '{}'", parsed.scheme()),
				});
			}
		},
		FieldType::Integer { min, max } => {
			let int_val = value
				.as_integer()
				.ok_or_else(|| mismatch(field_name, "integer", value))?;

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
	}

	Ok(())
}

/// A configuration schema that can validate TOML values.
///
/// Implemented by every pluggable implementation so that its configuration
/// can be checked before the implementation is constructed.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn wallet_schema() -> Schema {
		Schema::new(
			vec![
				Field::new("url", FieldType::Url),
				Field::new("address", FieldType::Address),
			],
			vec![Field::new(
				"timeout_seconds",
				FieldType::Integer {
					min: Some(1),
					max: Some(300),
				},
			)],
		)
	}

	#[test]
	fn test_valid_table_passes() {
		let config: toml::Value = toml::from_str(
			r#"
url = "http://127.0.0.1:1248"
address = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
timeout_seconds = 30
"#,
		)
		.unwrap();
		assert!(wallet_schema().validate(&config).is_ok());
	}

	#[test]
	fn test_missing_required_field() {
		let config: toml::Value = toml::from_str(r#"url = "http://127.0.0.1:1248""#).unwrap();
		let err = wallet_schema().validate(&config).unwrap_err();
		assert!(matches!(err, ValidationError::MissingField(ref f) if f == "address"));
	}

	#[test]
	fn test_bad_address_and_scheme() {
		let config: toml::Value = toml::from_str(
			r#"
url = "http://127.0.0.1:1248"
address = "not-an-address"
"#,
		)
		.unwrap();
		let err = wallet_schema().validate(&config).unwrap_err();
		assert!(err.to_string().contains("not-an-address"));

		let config: toml::Value = toml::from_str(
			r#"
url = "ftp://example.com"
address = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
"#,
		)
		.unwrap();
		let err = wallet_schema().validate(&config).unwrap_err();
		assert!(err.to_string().contains("ftp"));
	}

	#[test]
	fn test_integer_bounds() {
		let config: toml::Value = toml::from_str(
			r#"
url = "http://127.0.0.1:1248"
address = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
timeout_seconds = 900
"#,
		)
		.unwrap();
		match wallet_schema().validate(&config).unwrap_err() {
			ValidationError::InvalidValue { field, message } => {
				assert_eq!(field, "timeout_seconds");
				assert!(message.contains("maximum 300"));
			},
			other => panic!("unexpected error: {other}"),
		}

		let config: toml::Value = toml::from_str(
			r#"
url = "http://127.0.0.1:1248"
address = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
timeout_seconds = "30"
"#,
		)
		.unwrap();
		assert!(matches!(
			wallet_schema().validate(&config),
			Err(ValidationError::TypeMismatch { .. })
		));
	}
}
