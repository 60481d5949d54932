use crate::config::types::{country_domain, Config, LimitsConfig, Locale, OutputConfig, RotationConfig, TargetConfig};
use crate::config::PageSize;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_target_config(&config.target)?;
    validate_locale(&config.locale)?;
    validate_rotation_config(&config.rotation)?;
    validate_limits_config(&config.limits)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the target site, keywords and paging
fn validate_target_config(config: &TargetConfig) -> Result<(), ConfigError> {
    let site = config.site.trim();
    if site.is_empty() {
        return Err(ConfigError::Validation("site cannot be empty".to_string()));
    }

    // A full URL is optional, but when a scheme is given it must parse
    if site.starts_with("http://") || site.starts_with("https://") {
        Url::parse(site)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid site '{}': {}", site, e)))?;
    }

    if config.keywords.is_empty() {
        return Err(ConfigError::Validation("no keywords defined".to_string()));
    }

    if let Some(pos) = config.keywords.iter().position(|k| k.trim().is_empty()) {
        return Err(ConfigError::Validation(format!(
            "keyword #{} is blank",
            pos + 1
        )));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if PageSize::from_count(config.results_per_page).is_none() {
        return Err(ConfigError::Validation(format!(
            "results_per_page must be 10 or 100, got {}",
            config.results_per_page
        )));
    }

    Ok(())
}

/// Validates country and language codes
fn validate_locale(locale: &Locale) -> Result<(), ConfigError> {
    validate_code("country", &locale.country)?;
    validate_code("language", &locale.language)?;

    match &locale.domain {
        Some(domain) => {
            if domain.trim().is_empty() || domain.contains('/') {
                return Err(ConfigError::Validation(format!(
                    "locale domain must be a bare host, got '{}'",
                    domain
                )));
            }
        }
        None => {
            if country_domain(&locale.country).is_none() {
                return Err(ConfigError::Validation(format!(
                    "unknown country code '{}', set locale.domain to query it",
                    locale.country
                )));
            }
        }
    }

    Ok(())
}

fn validate_code(field: &str, code: &str) -> Result<(), ConfigError> {
    if code.len() < 2 {
        return Err(ConfigError::Validation(format!(
            "{} code must have at least two characters, got '{}'",
            field, code
        )));
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ConfigError::Validation(format!(
            "{} code '{}' contains invalid characters",
            field, code
        )));
    }

    Ok(())
}

/// Validates rotation service credentials
fn validate_rotation_config(config: &RotationConfig) -> Result<(), ConfigError> {
    if config.user_id.trim().is_empty() {
        return Err(ConfigError::Validation("user_id cannot be empty".to_string()));
    }

    if config.password.trim().is_empty() {
        return Err(ConfigError::Validation(
            "password cannot be empty".to_string(),
        ));
    }

    // Credentials go verbatim into the request line
    let unsafe_char = |c: char| c.is_whitespace() || c == '&' || c == '#';
    if config.user_id.contains(unsafe_char) || config.password.contains(unsafe_char) {
        return Err(ConfigError::Validation(
            "credentials cannot contain whitespace, '&' or '#'".to_string(),
        ));
    }

    if config.port == 0 {
        return Err(ConfigError::Validation("port must be > 0".to_string()));
    }

    if config.api_host().trim().is_empty() {
        return Err(ConfigError::Validation(
            "rotation host cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates retry budgets
fn validate_limits_config(config: &LimitsConfig) -> Result<(), ConfigError> {
    if config.keyword_error_budget < 1 {
        return Err(ConfigError::Validation(
            "keyword_error_budget must be >= 1".to_string(),
        ));
    }

    if config.run_error_budget < 1 {
        return Err(ConfigError::Validation(
            "run_error_budget must be >= 1".to_string(),
        ));
    }

    if config.rotation_attempts < 1 {
        return Err(ConfigError::Validation(
            "rotation_attempts must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.working_dir.trim().is_empty() {
        return Err(ConfigError::Validation(
            "working_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> TargetConfig {
        TargetConfig {
            site: "http://www.example.com".to_string(),
            keywords: vec!["shoes".to_string()],
            max_pages: 3,
            results_per_page: 10,
            filter: true,
            stop_when_found: false,
        }
    }

    #[test]
    fn test_validate_target() {
        assert!(validate_target_config(&target()).is_ok());

        let mut bare = target();
        bare.site = "example.com".to_string();
        assert!(validate_target_config(&bare).is_ok());

        let mut no_keywords = target();
        no_keywords.keywords.clear();
        assert!(validate_target_config(&no_keywords).is_err());

        let mut blank = target();
        blank.keywords.push("  ".to_string());
        assert!(validate_target_config(&blank).is_err());

        let mut zero_pages = target();
        zero_pages.max_pages = 0;
        assert!(validate_target_config(&zero_pages).is_err());

        let mut odd_size = target();
        odd_size.results_per_page = 50;
        assert!(validate_target_config(&odd_size).is_err());
    }

    #[test]
    fn test_validate_locale() {
        assert!(validate_locale(&Locale::new("global", "en")).is_ok());
        assert!(validate_locale(&Locale::new("de", "de")).is_ok());
        assert!(validate_locale(&Locale::new("d", "de")).is_err());
        assert!(validate_locale(&Locale::new("de", "d e")).is_err());
    }

    #[test]
    fn test_unknown_country_is_rejected() {
        assert!(validate_locale(&Locale::new("jp", "ja")).is_ok());
        assert!(matches!(
            validate_locale(&Locale::new("zz", "en")),
            Err(ConfigError::Validation(_))
        ));

        // An explicit host makes any well-formed code usable
        let mut custom = Locale::new("zz", "en");
        custom.domain = Some("search.example".to_string());
        assert!(validate_locale(&custom).is_ok());
    }

    #[test]
    fn test_validate_credentials() {
        let mut rotation = RotationConfig {
            portal: "int".to_string(),
            host: None,
            port: 80,
            user_id: "42".to_string(),
            password: "secret".to_string(),
        };
        assert!(validate_rotation_config(&rotation).is_ok());

        rotation.password = "a&cmd=rotate".to_string();
        assert!(validate_rotation_config(&rotation).is_err());

        rotation.password = String::new();
        assert!(validate_rotation_config(&rotation).is_err());
    }
}
