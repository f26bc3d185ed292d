use crate::config::ServerConfig;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use toklens_core::{ToklensError, ToklensResult};
use tracing::debug;

/// Load a dotenv-style file.
///
/// See [`parse_env`] for the accepted format.
pub fn load_env_file(path: &Path) -> ToklensResult<HashMap<String, String>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ToklensError::EnvFile(format!("failed to open env file '{}': {e}", path.display()))
    })?;
    parse_env(&content)
}

/// Parse `KEY=VALUE` lines.
///
/// Blank lines and lines starting with `#` are skipped. Each remaining line is
/// split at the first `=`, both sides are trimmed, and one pair of matching
/// surrounding quotes (`"` or `'`) is stripped from the value. A line with no
/// `=` or with an empty key is an error naming its 1-based line number.
pub fn parse_env(content: &str) -> ToklensResult<HashMap<String, String>> {
    let mut vars = HashMap::new();

    for (idx, raw) in content.lines().enumerate() {
        let line_num = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| {
            ToklensError::EnvFile(format!("line {line_num}: invalid format (missing '=')"))
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(ToklensError::EnvFile(format!("line {line_num}: empty key")));
        }

        vars.insert(key.to_string(), strip_quotes(value.trim()).to_string());
    }

    Ok(vars)
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Build the environment overlay for one server.
///
/// Entries from `env_file` are loaded first and the inline `env` map overrides
/// them key by key. A relative `env_file` is resolved against `config_dir` and
/// must stay inside it; an absolute `env_file` is taken as-is.
pub fn merge_server_env(
    srv: &ServerConfig,
    config_dir: &Path,
) -> ToklensResult<HashMap<String, String>> {
    let mut merged = HashMap::new();

    if !srv.env_file.is_empty() {
        let env_path = resolve_env_path(&srv.env_file, config_dir)?;
        debug!(server = %srv.name, path = %env_path.display(), "loading envFile");

        let from_file = load_env_file(&env_path).map_err(|e| match e {
            ToklensError::EnvFile(msg) => ToklensError::EnvFile(format!(
                "failed to load envFile {:?}: {msg}",
                srv.env_file
            )),
            other => other,
        })?;
        merged.extend(from_file);
    }

    merged.extend(srv.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(merged)
}

fn resolve_env_path(env_file: &str, config_dir: &Path) -> ToklensResult<PathBuf> {
    let path = Path::new(env_file);
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let confinement_error = || ToklensError::PathConfinement {
        path: env_file.to_string(),
    };
    let resolved = confine(config_dir, path).ok_or_else(confinement_error)?;

    // A symlink inside the config directory can still lead outside it.
    let base = if config_dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        config_dir
    };
    if let (Ok(real_base), Ok(real_path)) = (base.canonicalize(), resolved.canonicalize()) {
        if !real_path.starts_with(&real_base) {
            return Err(confinement_error());
        }
    }

    Ok(resolved)
}

/// Join `relative` onto `base` lexically, returning `None` if any `..`
/// would climb above `base`.
fn confine(base: &Path, relative: &Path) -> Option<PathBuf> {
    let mut resolved = base.to_path_buf();
    let mut depth = 0usize;

    for component in relative.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::ParentDir => {
                depth = depth.checked_sub(1)?;
                resolved.pop();
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    Some(resolved)
}
