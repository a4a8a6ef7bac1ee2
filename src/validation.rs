use crate::error::{DenoiseError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Validates that a patch store file exists
pub fn validate_store_path(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Err(DenoiseError::StoreNotFound(path.to_path_buf()));
    }

    if !path.is_file() {
        return Err(DenoiseError::InvalidParameter(format!(
            "{} is not a patch store file",
            path.display()
        )));
    }

    Ok(path.to_path_buf())
}

/// Validates that a file exists and is readable
pub fn validate_input_file(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Err(DenoiseError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", path.display()),
        )));
    }

    if !path.is_file() {
        return Err(DenoiseError::InvalidParameter(format!(
            "{} is not a file",
            path.display()
        )));
    }

    fs::metadata(path)?;

    Ok(path.to_path_buf())
}

/// Creates an output directory if needed
pub fn ensure_output_dir(path: &Path) -> Result<PathBuf> {
    if path.exists() && !path.is_dir() {
        return Err(DenoiseError::InvalidParameter(format!(
            "{} exists but is not a directory",
            path.display()
        )));
    }

    fs::create_dir_all(path)?;
    Ok(path.to_path_buf())
}

/// Validates a positive integer parameter
pub fn validate_positive_int(value: &str, param_name: &str) -> Result<usize> {
    let parsed = value
        .parse::<usize>()
        .map_err(|_| DenoiseError::Parse(format!("{} must be a positive integer", param_name)))?;

    if parsed == 0 {
        return Err(DenoiseError::InvalidParameter(format!(
            "{} must be greater than 0",
            param_name
        )));
    }

    Ok(parsed)
}

/// Validates a positive float parameter
pub fn validate_positive_float(value: &str, param_name: &str) -> Result<f64> {
    let parsed = value
        .parse::<f64>()
        .map_err(|_| DenoiseError::Parse(format!("{} must be a valid number", param_name)))?;

    if !(parsed > 0.0 && parsed.is_finite()) {
        return Err(DenoiseError::InvalidParameter(format!(
            "{} must be greater than 0",
            param_name
        )));
    }

    Ok(parsed)
}

/// Validates a non-negative float parameter
pub fn validate_non_negative_float(value: &str, param_name: &str) -> Result<f64> {
    let parsed = value
        .parse::<f64>()
        .map_err(|_| DenoiseError::Parse(format!("{} must be a valid number", param_name)))?;

    if !(parsed >= 0.0 && parsed.is_finite()) {
        return Err(DenoiseError::InvalidParameter(format!(
            "{} must not be negative",
            param_name
        )));
    }

    Ok(parsed)
}

/// Validates an unsigned integer that may be zero
pub fn validate_uint(value: &str, param_name: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|_| DenoiseError::Parse(format!("{} must be a non-negative integer", param_name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_store_path() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("train.dnps");
        assert!(matches!(
            validate_store_path(&missing),
            Err(DenoiseError::StoreNotFound(_))
        ));

        fs::write(&missing, b"").unwrap();
        assert!(validate_store_path(&missing).is_ok());
        assert!(validate_store_path(dir.path()).is_err());
    }

    #[test]
    fn test_ensure_output_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_output_dir(&nested).unwrap();
        assert!(nested.is_dir());

        let file = dir.path().join("file");
        fs::write(&file, b"x").unwrap();
        assert!(ensure_output_dir(&file).is_err());
    }

    #[test]
    fn test_validate_positive_int() {
        assert_eq!(validate_positive_int("10", "test").unwrap(), 10);
        assert!(validate_positive_int("0", "test").is_err());
        assert!(validate_positive_int("-5", "test").is_err());
        assert!(validate_positive_int("abc", "test").is_err());
    }

    #[test]
    fn test_validate_floats() {
        assert_eq!(validate_positive_float("0.01", "lr").unwrap(), 0.01);
        assert!(validate_positive_float("0", "lr").is_err());
        assert!(validate_positive_float("inf", "lr").is_err());
        assert_eq!(validate_non_negative_float("0", "noise").unwrap(), 0.0);
        assert!(validate_non_negative_float("-1", "noise").is_err());
    }

    #[test]
    fn test_validate_uint() {
        assert_eq!(validate_uint("0", "seed").unwrap(), 0);
        assert!(matches!(validate_uint("x", "seed"), Err(DenoiseError::Parse(_))));
    }
}
