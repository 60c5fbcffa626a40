use std::path::{Path, PathBuf};

use lambdashield_types::config::{ConfigError, ProtectionConfig};

#[derive(Debug, thiserror::Error)]
pub enum LoadConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid protection config: {0}")]
    Invalid(#[from] ConfigError),
}

/// Builds the protection config from the defaults, an optional JSON file and
/// an optional weak subjectivity period override, in that order.
pub fn load_protection_config(
    config_file: Option<&Path>,
    weak_subjectivity_period: Option<u64>,
) -> Result<ProtectionConfig, LoadConfigError> {
    let config = match config_file {
        Some(path) => read_config_file(path)?,
        None => ProtectionConfig::default(),
    };
    match weak_subjectivity_period {
        Some(period) => Ok(config.with_weak_subjectivity_period(period)?),
        None => Ok(config),
    }
}

fn read_config_file(path: &Path) -> Result<ProtectionConfig, LoadConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| LoadConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lambdashield_types::config::DEFAULT_WEAK_SUBJECTIVITY_PERIOD;

    #[test]
    fn defaults_without_file_or_override() {
        let config = load_protection_config(None, None).unwrap();
        assert_eq!(config, ProtectionConfig::default());
        assert_eq!(
            config.weak_subjectivity_period(),
            DEFAULT_WEAK_SUBJECTIVITY_PERIOD
        );
    }

    #[test]
    fn override_replaces_period() {
        let config = load_protection_config(None, Some(64)).unwrap();
        assert_eq!(config.weak_subjectivity_period(), 64);
    }

    #[test]
    fn zero_override_is_rejected() {
        let result = load_protection_config(None, Some(0));
        assert!(matches!(
            result,
            Err(LoadConfigError::Invalid(ConfigError::ZeroWeakSubjectivityPeriod))
        ));
    }

    #[test]
    fn missing_file_is_reported() {
        let result = load_protection_config(Some(Path::new("/nonexistent/config.json")), None);
        assert!(matches!(result, Err(LoadConfigError::Io { .. })));
    }
}
