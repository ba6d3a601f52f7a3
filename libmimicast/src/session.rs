//! Session persistence
//!
//! A [`Session`] is the ordered set of cookie records that lets the transport
//! resume an authenticated identity without logging in again. [`SessionStore`]
//! owns its on-disk representation: a single JSON array of records.
//!
//! # Example
//!
//! ```no_run
//! use libmimicast::session::{Session, SessionStore};
//!
//! # fn example() -> libmimicast::Result<()> {
//! let store = SessionStore::new("/var/lib/mimicast/session.json");
//! if store.exists() {
//!     let session = store.load()?;
//!     println!("{}", session.cookie_header());
//! }
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, SessionError};

/// Cookie `SameSite` policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SameSite {
    #[serde(alias = "strict", alias = "STRICT")]
    Strict,
    #[default]
    #[serde(alias = "lax", alias = "LAX")]
    Lax,
    #[serde(alias = "none", alias = "NONE")]
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SameSite::Strict => write!(f, "Strict"),
            SameSite::Lax => write!(f, "Lax"),
            SameSite::None => write!(f, "None"),
        }
    }
}

/// One persisted credential record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieRecord {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub same_site: SameSite,
    /// Every other field, carried through untouched
    ///
    /// This includes `hostOnly` and `expires`, which other tools write as
    /// strings, numbers or `null`; see [`CookieRecord::host_only`] and
    /// [`CookieRecord::expires`].
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_path() -> String {
    "/".to_string()
}

impl CookieRecord {
    pub fn new(key: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            domain: domain.into(),
            path: default_path(),
            secure: false,
            http_only: false,
            same_site: SameSite::Lax,
            extra: serde_json::Map::new(),
        }
    }

    pub fn host_only(&self) -> Option<bool> {
        self.extra.get("hostOnly").and_then(serde_json::Value::as_bool)
    }

    pub fn set_host_only(&mut self, host_only: bool) {
        self.extra.insert("hostOnly".to_string(), host_only.into());
    }

    /// Expiry as stored: an RFC 3339 string or Unix seconds
    pub fn expires(&self) -> Option<&serde_json::Value> {
        self.extra.get("expires").filter(|v| !v.is_null())
    }

    pub fn set_expires(&mut self, expires: impl Into<serde_json::Value>) {
        self.extra.insert("expires".to_string(), expires.into());
    }

    fn expires_attribute(&self) -> Option<String> {
        match self.expires()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => n
                .as_f64()
                .and_then(|secs| chrono::DateTime::from_timestamp(secs.trunc() as i64, 0))
                .map(|t| t.to_rfc2822()),
            _ => None,
        }
    }

    /// Render the record as a `Set-Cookie` style string
    ///
    /// Empty attributes and false flags are omitted.
    pub fn to_set_cookie(&self) -> String {
        let mut parts = vec![format!("{}={}", self.key, self.value)];

        if !self.domain.is_empty() {
            parts.push(format!("Domain={}", self.domain));
        }
        if !self.path.is_empty() {
            parts.push(format!("Path={}", self.path));
        }
        if let Some(expires) = self.expires_attribute() {
            parts.push(format!("Expires={}", expires));
        }
        if self.secure {
            parts.push("Secure".to_string());
        }
        if self.http_only {
            parts.push("HttpOnly".to_string());
        }
        parts.push(format!("SameSite={}", self.same_site));

        parts.join("; ")
    }
}

/// The authenticated session: cookie records in the order they were issued
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Session {
    cookies: Vec<CookieRecord>,
}

impl Session {
    pub fn new(cookies: Vec<CookieRecord>) -> Self {
        Self { cookies }
    }

    pub fn cookies(&self) -> &[CookieRecord] {
        &self.cookies
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Value of the first cookie named `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|c| c.key == key)
            .map(|c| c.value.as_str())
    }

    /// Insert a cookie, replacing any record with the same key, domain and path
    ///
    /// Replacements keep their original position.
    pub fn upsert(&mut self, record: CookieRecord) {
        match self
            .cookies
            .iter_mut()
            .find(|c| c.key == record.key && c.domain == record.domain && c.path == record.path)
        {
            Some(existing) => *existing = record,
            None => self.cookies.push(record),
        }
    }

    /// Render the request `Cookie` header (`k1=v1; k2=v2`)
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|c| format!("{}={}", c.key, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Render every record as a `Set-Cookie` style string
    pub fn to_set_cookies(&self) -> Vec<String> {
        self.cookies.iter().map(CookieRecord::to_set_cookie).collect()
    }
}

/// File-backed session storage
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True iff a session file is present and readable
    pub fn exists(&self) -> bool {
        std::fs::File::open(&self.path)
            .and_then(|f| f.metadata())
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Load the persisted session
    ///
    /// # Errors
    ///
    /// - `SessionError::Persistence` if the file cannot be read
    /// - `SessionError::Corrupt` if it is not a cookie-record array
    pub fn load(&self) -> Result<Session> {
        let content = std::fs::read_to_string(&self.path).map_err(SessionError::Persistence)?;
        let session: Session = serde_json::from_str(&content)
            .map_err(|e| SessionError::Corrupt(format!("{}: {}", self.path.display(), e)))?;

        tracing::debug!(
            "Loaded {} cookie(s) from {}",
            session.cookies.len(),
            self.path.display()
        );
        Ok(session)
    }

    /// Persist the session, replacing any previous one
    ///
    /// Writes a sibling temporary file and renames it over the target so a
    /// reader never observes a partial file. The file is owner-only on Unix.
    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(SessionError::Persistence)?;
            }
        }

        let json = serde_json::to_vec_pretty(session)
            .map_err(|e| SessionError::Persistence(std::io::Error::other(e)))?;

        let tmp_path = self.tmp_path();
        let write_result = (|| -> std::io::Result<()> {
            let mut options = std::fs::OpenOptions::new();
            options.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }

            let mut file = options.open(&tmp_path)?;
            // A leftover tmp file from an older run keeps its old mode
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
            }
            file.write_all(&json)?;
            file.sync_all()?;

            std::fs::rename(&tmp_path, &self.path)
        })();

        if let Err(e) = write_result {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(SessionError::Persistence(e).into());
        }

        tracing::debug!(
            "Saved {} cookie(s) to {}",
            session.cookies.len(),
            self.path.display()
        );
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "session.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MimicastError;
    use tempfile::TempDir;

    fn sample_session() -> Session {
        let mut auth = CookieRecord::new("auth_token", "abc123", ".x.com");
        auth.secure = true;
        auth.http_only = true;
        auth.same_site = SameSite::None;
        auth.set_host_only(false);
        auth.set_expires("2027-01-01T00:00:00.000Z");

        let mut csrf = CookieRecord::new("ct0", "csrf-token", ".x.com");
        csrf.secure = true;
        csrf.same_site = SameSite::Strict;

        let mut guest = CookieRecord::new("guest_id", "v1%3A1700", "x.com");
        guest.path = "/i".to_string();
        guest
            .extra
            .insert("creation".to_string(), serde_json::json!("2024-05-01T10:00:00Z"));

        Session::new(vec![auth, csrf, guest])
    }

    #[test]
    fn test_round_trip_preserves_every_field_and_order() {
        let temp_dir = TempDir::new().unwrap();
        let store = SessionStore::new(temp_dir.path().join("session.json"));
        let session = sample_session();

        store.save(&session).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, session);
        let keys: Vec<&str> = loaded.cookies().iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["auth_token", "ct0", "guest_id"]);
    }

    #[test]
    fn test_save_is_stable() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");
        let store = SessionStore::new(&path);

        store.save(&sample_session()).unwrap();
        let first = std::fs::read(&path).unwrap();
        store.save(&store.load().unwrap()).unwrap();
        let second = std::fs::read(&path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_exists() {
        let temp_dir = TempDir::new().unwrap();
        let store = SessionStore::new(temp_dir.path().join("session.json"));
        assert!(!store.exists());

        store.save(&Session::default()).unwrap();
        assert!(store.exists());
    }

    #[test]
    fn test_directory_is_not_a_session() {
        let temp_dir = TempDir::new().unwrap();
        let store = SessionStore::new(temp_dir.path());
        assert!(!store.exists());
    }

    #[test]
    fn test_save_creates_parent_dirs_and_leaves_no_tmp() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("session.json");
        let store = SessionStore::new(&path);

        store.save(&sample_session()).unwrap();

        assert!(path.exists());
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_load_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = SessionStore::new(&path).load();
        assert!(matches!(
            result,
            Err(MimicastError::Session(SessionError::Corrupt(_)))
        ));
    }

    #[test]
    fn test_load_wrong_shape_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");
        std::fs::write(&path, r#"{"key": "a", "value": "b"}"#).unwrap();

        let result = SessionStore::new(&path).load();
        assert!(matches!(
            result,
            Err(MimicastError::Session(SessionError::Corrupt(_)))
        ));
    }

    #[test]
    fn test_load_missing_file_is_persistence_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = SessionStore::new(temp_dir.path().join("absent.json")).load();
        assert!(matches!(
            result,
            Err(MimicastError::Session(SessionError::Persistence(_)))
        ));
    }

    #[test]
    fn test_parses_lowercase_same_site_and_defaults() {
        let json = r#"[
            {"key": "a", "value": "1", "domain": "x.com", "path": "/", "secure": true,
             "httpOnly": true, "sameSite": "strict", "hostOnly": true},
            {"key": "b", "value": "2"}
        ]"#;
        let session: Session = serde_json::from_str(json).unwrap();

        assert_eq!(session.cookies()[0].same_site, SameSite::Strict);
        assert_eq!(session.cookies()[0].host_only(), Some(true));
        assert_eq!(session.cookies()[1].same_site, SameSite::Lax);
        assert_eq!(session.cookies()[1].path, "/");
        assert!(!session.cookies()[1].secure);
    }

    #[test]
    fn test_numeric_expires_and_null_host_only_survive_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");
        let json = r#"[{"key": "auth_token", "value": "abc", "domain": ".x.com",
            "secure": true, "httpOnly": true, "sameSite": "None",
            "hostOnly": null, "expires": 1735689600}]"#;
        std::fs::write(&path, json).unwrap();

        let store = SessionStore::new(&path);
        let session = store.load().unwrap();
        let cookie = &session.cookies()[0];

        assert_eq!(cookie.expires(), Some(&serde_json::json!(1735689600)));
        assert_eq!(cookie.host_only(), None);
        let set_cookie = cookie.to_set_cookie();
        assert!(set_cookie.contains("Expires=Wed, "));
        assert!(set_cookie.contains("Jan 2025 00:00:00 +0000"));

        store.save(&session).unwrap();
        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved[0]["expires"], 1735689600);
        assert!(saved[0].as_object().unwrap().contains_key("hostOnly"));
        assert!(saved[0]["hostOnly"].is_null());
        assert_eq!(store.load().unwrap(), session);
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");
        // A stale world-readable tmp file must not leak its mode into the save
        let tmp = temp_dir.path().join("session.json.tmp");
        std::fs::write(&tmp, "stale").unwrap();
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o644)).unwrap();

        SessionStore::new(&path).save(&sample_session()).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(sample_session()).unwrap();
        let first = &json[0];

        assert_eq!(first["key"], "auth_token");
        assert_eq!(first["httpOnly"], true);
        assert_eq!(first["sameSite"], "None");
        assert_eq!(first["hostOnly"], false);
        assert_eq!(json[2]["creation"], "2024-05-01T10:00:00Z");
    }

    #[test]
    fn test_to_set_cookie() {
        let session = sample_session();
        assert_eq!(
            session.cookies()[0].to_set_cookie(),
            "auth_token=abc123; Domain=.x.com; Path=/; Expires=2027-01-01T00:00:00.000Z; Secure; HttpOnly; SameSite=None"
        );
        assert_eq!(
            session.cookies()[1].to_set_cookie(),
            "ct0=csrf-token; Domain=.x.com; Path=/; Secure; SameSite=Strict"
        );
    }

    #[test]
    fn test_cookie_header_and_lookup() {
        let session = sample_session();
        assert_eq!(
            session.cookie_header(),
            "auth_token=abc123; ct0=csrf-token; guest_id=v1%3A1700"
        );
        assert_eq!(session.get("ct0"), Some("csrf-token"));
        assert_eq!(session.get("missing"), None);
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut session = sample_session();
        session.upsert(CookieRecord::new("ct0", "rotated", ".x.com"));
        session.upsert(CookieRecord::new("lang", "en", "x.com"));

        assert_eq!(session.cookies().len(), 4);
        assert_eq!(session.cookies()[1].value, "rotated");
        assert_eq!(session.cookies()[3].key, "lang");
    }
}
