use crate::utils::error::{ConfigError, Result};

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_path(field_name: &str, path: &str) -> std::result::Result<(), ConfigError> {
    if path.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(ConfigError::InvalidValue {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(
    field_name: &str,
    value: u64,
    min_value: u64,
) -> std::result::Result<(), ConfigError> {
    if value < min_value {
        return Err(ConfigError::InvalidValue {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> std::result::Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> std::result::Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::InvalidValue {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

pub fn validate_one_of<T: PartialEq + std::fmt::Display>(
    field_name: &str,
    value: T,
    allowed: &[T],
) -> std::result::Result<(), ConfigError> {
    if !allowed.contains(&value) {
        let allowed: Vec<String> = allowed.iter().map(|a| a.to_string()).collect();
        return Err(ConfigError::InvalidValue {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Valid values: {}", allowed.join(", ")),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path() {
        assert!(validate_path("logging.csv_path", "logs/readings.csv").is_ok());
        assert!(validate_path("logging.csv_path", "").is_err());
        assert!(validate_path("logging.csv_path", "bad\0path").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("serial.baud_rate", 9600, 1).is_ok());
        assert!(validate_positive_number("serial.baud_rate", 0, 1).is_err());
    }

    #[test]
    fn test_validate_range_and_one_of() {
        assert!(validate_range("classification.precision", 3u32, 0, 9).is_ok());
        assert!(validate_range("classification.precision", 12u32, 0, 9).is_err());

        assert!(validate_one_of("serial.data_bits", 8u8, &[5, 6, 7, 8]).is_ok());
        let err = validate_one_of("serial.stop_bits", 3u8, &[1, 2]).unwrap_err();
        assert!(err.to_string().contains("Valid values: 1, 2"));
    }
}
