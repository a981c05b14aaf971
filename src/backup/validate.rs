//! Validation functions for configuration values.
//!
//! Provides custom validation functions for database identifiers,
//! directories and cron expressions.

use chrono::Local;
use sanitize_filename::{is_sanitized, sanitize};
use validator::ValidationError;

use std::path::Path;

/// A database identifier ends up both on the dump command line and in the
/// artifact file name, so it must be a plain file name and must not look
/// like a command-line option.
pub fn validate_database_identifier<S: AsRef<str>>(name: S) -> Result<(), ValidationError> {
    let name = name.as_ref();
    if name.is_empty() {
        return Err(ValidationError::new("InvalidDatabaseIdentifier")
            .with_message("database identifier must not be empty".into()));
    }

    if name.starts_with('-') {
        return Err(ValidationError::new("InvalidDatabaseIdentifier")
            .with_message(format!("database identifier {name:?} must not start with '-'").into()));
    }

    if !is_sanitized(name) {
        return Err(ValidationError::new("InvalidDatabaseIdentifier").with_message(
            format!(
                "Invalid database identifier {:?}, try sanitizing like {:?}",
                name,
                sanitize(name)
            )
            .into(),
        ));
    }

    Ok(())
}

pub fn validate_dir_exist_or_created<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ValidationError::new("InvalidDirectory")
                .with_message(format!("{:?} is not a directory", dir).into()));
        }
    } else {
        return std::fs::create_dir_all(dir).map_err(|e| {
            ValidationError::new("InvalidDirectory").with_message(
                format!("cannot create or access directory {:?}: {}", dir, e).into(),
            )
        });
    }

    Ok(())
}

pub fn validate_cron_str<S: AsRef<str>>(cron: S) -> Result<(), ValidationError> {
    let cron = cron.as_ref();
    if cron_parser::parse(cron, &Local::now()).is_err() {
        return Err(ValidationError::new("InvalidCron")
            .with_message(format!("Invalid cron string: {cron:?}").into()));
    }

    Ok(())
}
