//! On-disk token cache, a per-user singleton keyed by home directory
//! (spec.md §4.1, grounded on `original_source/agent/lm_agent/backend_utils.py`).

use std::io::Write as _;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// Tokens are treated as expired this many seconds before their real `exp` — the
/// negative-leeway quirk spec.md §9 flags as worth re-validating; kept as-is here since
/// it's the behavior the original agent relies on.
const EXPIRY_LEEWAY_SECONDS: i64 = 10;

pub fn cache_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cache")
        .join("license-manager")
}

pub fn token_path() -> PathBuf {
    cache_dir().join("access_token")
}

/// Returns the cached token if the file exists, is readable, and its `exp` claim lies
/// more than [`EXPIRY_LEEWAY_SECONDS`] in the future. No signature verification is
/// performed — the token is opaque to us.
pub fn load_cached_token() -> Option<String> {
    load_cached_token_at(&token_path())
}

pub fn load_cached_token_at(path: &Path) -> Option<String> {
    let token = std::fs::read_to_string(path).ok()?;
    let token = token.trim().to_string();
    if token.is_empty() {
        return None;
    }
    let exp = decode_exp(&token)?;
    let now = now_unix();
    if exp - EXPIRY_LEEWAY_SECONDS > now {
        Some(token)
    } else {
        None
    }
}

/// Writes the token to the cache file, mode 0600, creating parent directories as needed.
/// Uses a write-then-rename so concurrent readers never observe a partial file.
pub fn write_cached_token(token: &str) -> std::io::Result<()> {
    write_cached_token_at(&token_path(), token)
}

pub fn write_cached_token_at(path: &Path, token: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(token.as_bytes())?;
    }
    set_owner_only_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Decodes the `exp` claim of a JWT without verifying its signature.
fn decode_exp(token: &str) -> Option<i64> {
    let mut parts = token.split('.');
    let _header = parts.next()?;
    let payload_b64 = parts.next()?;
    let payload_bytes = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
    let payload: serde_json::Value = serde_json::from_slice(&payload_bytes).ok()?;
    payload.get("exp")?.as_i64()
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn make_jwt(exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(b"{\"alg\":\"none\"}");
        let payload = URL_SAFE_NO_PAD.encode(format!("{{\"exp\":{exp}}}"));
        format!("{header}.{payload}.sig")
    }

    fn unix_now() -> i64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64
    }

    #[test]
    fn write_then_load_round_trips_when_not_expired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access_token");
        let token = make_jwt(unix_now() + 3600);

        write_cached_token_at(&path, &token).unwrap();
        let loaded = load_cached_token_at(&path);
        assert_eq!(loaded.as_deref(), Some(token.as_str()));
    }

    #[test]
    fn load_returns_none_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist");
        assert_eq!(load_cached_token_at(&path), None);
    }

    #[test]
    fn load_returns_none_when_expired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access_token");
        let token = make_jwt(unix_now() - 5);
        write_cached_token_at(&path, &token).unwrap();
        assert_eq!(load_cached_token_at(&path), None);
    }

    #[test]
    fn load_returns_none_within_leeway_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access_token");
        // Expires in 5 seconds: inside the 10s leeway, so treated as already expired.
        let token = make_jwt(unix_now() + 5);
        write_cached_token_at(&path, &token).unwrap();
        assert_eq!(load_cached_token_at(&path), None);
    }

    #[cfg(unix)]
    #[test]
    fn written_token_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access_token");
        write_cached_token_at(&path, &make_jwt(unix_now() + 60)).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
