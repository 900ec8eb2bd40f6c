use jot_core::{JotError, JotResult};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const EMAIL_VAR: &str = "JOT_EMAIL";
const PASSWORD_VAR: &str = "JOT_PASSWORD";
const ENV_FILE_VAR: &str = "JOT_ENV_FILE";

#[derive(Debug, Clone)]
pub struct EnvCredentials {
    pub email: String,
    pub password: String,
}

/// Looks up sign-in credentials in the process environment, then in the
/// nearest `.env` file (`JOT_ENV_FILE`, the current directory upwards, the
/// workspace root upwards).
pub fn resolve_env_credentials(workspace_root: &Path) -> JotResult<Option<EnvCredentials>> {
    let from_process = credentials_from(
        std::env::var(EMAIL_VAR).ok(),
        std::env::var(PASSWORD_VAR).ok(),
    );
    if from_process.is_some() {
        return Ok(from_process);
    }

    let Some(path) = resolve_env_file(workspace_root) else {
        return Ok(None);
    };

    let mut values = load_env_file(&path)?;
    Ok(credentials_from(
        values.remove(EMAIL_VAR),
        values.remove(PASSWORD_VAR),
    ))
}

fn credentials_from(email: Option<String>, password: Option<String>) -> Option<EnvCredentials> {
    let email = email?.trim().to_string();
    let password = password?;
    if email.is_empty() || password.is_empty() {
        return None;
    }

    Some(EnvCredentials { email, password })
}

fn resolve_env_file(workspace_root: &Path) -> Option<PathBuf> {
    if let Ok(path) = std::env::var(ENV_FILE_VAR) {
        let candidate = PathBuf::from(path);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    if let Ok(cwd) = std::env::current_dir()
        && let Some(found) = search_upwards_for(&cwd, ".env")
    {
        return Some(found);
    }

    search_upwards_for(workspace_root, ".env")
}

fn search_upwards_for(start: &Path, file_name: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(file_name))
        .find(|candidate| candidate.is_file())
}

fn load_env_file(path: &Path) -> JotResult<BTreeMap<String, String>> {
    let raw = fs::read_to_string(path).map_err(|err| {
        JotError::io(format!(
            "failed to read env file '{}': {}",
            path.display(),
            err
        ))
    })?;

    Ok(parse_env(&raw))
}

fn parse_env(raw: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value)) = trimmed.split_once('=') else {
            continue;
        };

        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        let value = value.trim();
        let unquoted = value
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|rest| rest.strip_suffix('\''))
            })
            .unwrap_or(value);

        vars.insert(key.to_string(), unquoted.to_string());
    }

    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parser_handles_quotes_comments_and_export() {
        let vars = parse_env(
            "# comment\nexport JOT_EMAIL=\"user@example.com\"\nJOT_PASSWORD='p@ss=word'\n=ignored\nnoise\n",
        );
        assert_eq!(
            vars.get("JOT_EMAIL").map(String::as_str),
            Some("user@example.com")
        );
        assert_eq!(
            vars.get("JOT_PASSWORD").map(String::as_str),
            Some("p@ss=word")
        );
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn blank_values_do_not_count_as_credentials() {
        assert!(credentials_from(Some("  ".to_string()), Some("x".to_string())).is_none());
        assert!(credentials_from(Some("a@b.c".to_string()), Some(String::new())).is_none());
        assert!(credentials_from(Some("a@b.c".to_string()), None).is_none());
    }
}
