//! Configuration error types

use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Secret file {path} could not be read: {source}")]
    SecretFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display_includes_context() {
        let err = Error::Config("allowed_origins must not be empty".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: allowed_origins must not be empty"
        );
    }

    #[test]
    fn secret_file_error_names_path_but_not_contents() {
        let err = Error::SecretFile {
            path: "/run/secrets/signstation".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        let display = err.to_string();
        assert!(display.contains("/run/secrets/signstation"), "got: {display}");
        assert!(display.contains("missing"), "got: {display}");
    }

    #[test]
    fn toml_errors_convert() {
        let parse_err = toml::from_str::<toml::Table>("not = = valid").unwrap_err();
        let err: Error = parse_err.into();
        assert!(err.to_string().starts_with("TOML parse error:"), "got: {err}");
    }
}
