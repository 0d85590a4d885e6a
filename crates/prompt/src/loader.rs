//! Prompt profile loader.

use crate::builder::render_template;
use crate::types::{PromptProfile, NOT_FOUND_SENTINEL};
use std::collections::HashMap;
use std::path::Path;
use tutor_core::{AppError, AppResult};

/// Load a prompt profile from a YAML file.
///
/// Sections missing from the file keep their built-in text. The merged
/// profile is validated before it is returned.
///
/// # Example
/// ```no_run
/// use tutor_prompt::load_profile;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let profile = load_profile(Path::new(".tutor/profile.yml"))?;
/// println!("Loaded profile: {}", profile.title);
/// # Ok(())
/// # }
/// ```
pub fn load_profile(path: &Path) -> AppResult<PromptProfile> {
    tracing::debug!("Loading prompt profile from: {:?}", path);

    if !path.exists() {
        return Err(AppError::Prompt(format!(
            "Prompt profile not found: {:?}",
            path
        )));
    }

    let contents = std::fs::read_to_string(path).map_err(|e| {
        AppError::Prompt(format!("Failed to read prompt profile {:?}: {}", path, e))
    })?;

    let profile: PromptProfile = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!("Failed to parse prompt profile {:?}: {}", path, e))
    })?;

    validate_profile(&profile)?;

    tracing::info!("Loaded prompt profile: {} ({})", profile.id, profile.title);

    Ok(profile)
}

/// Load the configured profile, or the built-in one when none is configured.
pub fn load_profile_or_default(path: Option<&Path>) -> AppResult<PromptProfile> {
    match path {
        Some(path) => load_profile(path),
        None => Ok(PromptProfile::default()),
    }
}

/// Validate a prompt profile.
pub fn validate_profile(profile: &PromptProfile) -> AppResult<()> {
    if profile.id.trim().is_empty() {
        return Err(AppError::Prompt("Profile id cannot be empty".to_string()));
    }

    if profile.title.trim().is_empty() {
        return Err(AppError::Prompt("Profile title cannot be empty".to_string()));
    }

    if !profile.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            profile.api_version
        )));
    }

    if profile.output.trim().is_empty() {
        return Err(AppError::Prompt(
            "Profile output rules cannot be empty".to_string(),
        ));
    }

    // The normalizer matches this exact token
    if !profile.not_found.contains(NOT_FOUND_SENTINEL) {
        return Err(AppError::Prompt(format!(
            "Profile notFound section must mention {}",
            NOT_FOUND_SENTINEL
        )));
    }

    if !profile.user_template.contains("{{question}}") {
        return Err(AppError::Prompt(
            "Profile userTemplate must reference {{question}}".to_string(),
        ));
    }

    // Surface template syntax errors at load time
    render_template(&profile.user_template, &HashMap::new())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_profile(dir: &Path, content: &str) -> std::path::PathBuf {
        let path = dir.join("profile.yml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_partial_profile() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_profile(
            temp_dir.path(),
            r#"
id: logic.course
title: "Logic course"
apiVersion: "1.1"
persona: "You are a teaching assistant for an introductory logic course."
"#,
        );

        let profile = load_profile(&path).unwrap();
        assert_eq!(profile.id, "logic.course");
        assert!(profile.persona.contains("logic"));
        assert_eq!(profile.not_found, PromptProfile::default().not_found);
    }

    #[test]
    fn test_load_missing_profile() {
        let temp_dir = TempDir::new().unwrap();
        let result = load_profile(&temp_dir.path().join("missing.yml"));
        assert!(matches!(result, Err(AppError::Prompt(_))));
    }

    #[test]
    fn test_load_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_profile(temp_dir.path(), "invalid: yaml: content:");
        assert!(load_profile(&path).is_err());
    }

    #[test]
    fn test_profile_without_sentinel_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_profile(temp_dir.path(), "notFound: \"Say you don't know.\"\n");

        let err = load_profile(&path).unwrap_err();
        assert!(err.to_string().contains(NOT_FOUND_SENTINEL));
    }

    #[test]
    fn test_template_without_question_is_rejected() {
        let profile = PromptProfile {
            user_template: "{{history}}".to_string(),
            ..PromptProfile::default()
        };
        assert!(validate_profile(&profile).is_err());
    }

    #[test]
    fn test_default_when_unconfigured() {
        let profile = load_profile_or_default(None).unwrap();
        assert_eq!(profile, PromptProfile::default());
        assert!(validate_profile(&profile).is_ok());
    }
}
