//! Persisted client-side session: the auth token and the logged-in user.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

pub const TOKEN_KEY: &str = "authToken";

/// Every key the user object has ever been stored under. Login writes all of
/// them, logout clears all of them, reads take the first one present.
pub const USER_KEYS: [&str; 3] = ["maiconsoft_user", "userData", "usuarioLogado"];

/// String key-value storage that survives page reloads.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> std::io::Result<()>;
    fn remove(&self, key: &str) -> std::io::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> std::io::Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}

/// JSON file holding the whole key-value map, rewritten on every change.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => HashMap::new(),
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, String>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, json)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
        let mut entries = self.lock();
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> std::io::Result<()> {
        let mut entries = self.lock();
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}

/// The logged-in user as far as routing is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredUser")]
pub struct User {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "nome", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "codigoAcesso", skip_serializing_if = "Option::is_none")]
    pub access_code: Option<String>,
    #[serde(rename = "roleName")]
    pub role: String,
}

impl User {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            id: None,
            name: None,
            email: None,
            access_code: None,
            role: role.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Wire shape of a stored user. Older sessions carry the role as
/// `tipoUsuario` or `perfil` and the id as `idUser`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredUser {
    id: Option<i64>,
    id_user: Option<i64>,
    nome: Option<String>,
    name: Option<String>,
    email: Option<String>,
    codigo_acesso: Option<String>,
    role_name: Option<String>,
    tipo_usuario: Option<String>,
    perfil: Option<String>,
}

impl From<StoredUser> for User {
    fn from(raw: StoredUser) -> Self {
        Self {
            id: raw.id.or(raw.id_user),
            name: raw.nome.or(raw.name),
            email: raw.email,
            access_code: raw.codigo_acesso,
            role: raw
                .role_name
                .or(raw.tipo_usuario)
                .or(raw.perfil)
                .unwrap_or_default(),
        }
    }
}

/// Authentication state the router consults.
pub trait AuthProvider {
    fn is_authenticated(&self) -> bool;
    fn current_user(&self) -> Option<User>;
    fn logout(&self) -> std::io::Result<()>;
}

/// [`AuthProvider`] backed by a [`SessionStore`].
#[derive(Clone)]
pub struct SessionAuth {
    store: Arc<dyn SessionStore>,
}

impl SessionAuth {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn token(&self) -> Option<String> {
        self.store.get(TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn login(&self, token: &str, user: &User) -> std::io::Result<()> {
        let json = serde_json::to_string(user)?;
        self.store.set(TOKEN_KEY, token)?;
        for key in USER_KEYS {
            self.store.set(key, &json)?;
        }
        tracing::info!(role = %user.role, "Session stored");
        Ok(())
    }
}

impl AuthProvider for SessionAuth {
    fn is_authenticated(&self) -> bool {
        self.token().is_some() && self.current_user().is_some()
    }

    fn current_user(&self) -> Option<User> {
        let raw = USER_KEYS.iter().find_map(|key| self.store.get(key))?;
        match serde_json::from_str::<User>(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!(error = %e, "Stored user session is unreadable");
                None
            }
        }
    }

    fn logout(&self) -> std::io::Result<()> {
        self.store.remove(TOKEN_KEY)?;
        for key in USER_KEYS {
            self.store.remove(key)?;
        }
        tracing::info!("Session cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn auth() -> SessionAuth {
        SessionAuth::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_login_writes_every_user_key() {
        let auth = auth();
        let user = User::new("DIRETOR").with_name("Diretor Geral");
        auth.login("tok", &user).unwrap();

        assert_eq!(auth.store().get(TOKEN_KEY).as_deref(), Some("tok"));
        for key in USER_KEYS {
            assert!(auth.store().get(key).is_some(), "missing {key}");
        }
        assert!(auth.is_authenticated());
        assert_eq!(auth.current_user(), Some(user));
    }

    #[test]
    fn test_logout_clears_every_key() {
        let auth = auth();
        auth.login("tok", &User::new("ADMIN")).unwrap();
        auth.logout().unwrap();

        assert!(auth.store().get(TOKEN_KEY).is_none());
        for key in USER_KEYS {
            assert!(auth.store().get(key).is_none());
        }
        assert!(!auth.is_authenticated());
        assert!(auth.current_user().is_none());
    }

    #[test]
    fn test_legacy_key_and_role_fields_are_read() {
        let auth = auth();
        auth.store()
            .set("usuarioLogado", r#"{"idUser": 4, "nome": "Ana", "tipoUsuario": "funcionario"}"#)
            .unwrap();
        let user = auth.current_user().unwrap();
        assert_eq!(user.id, Some(4));
        assert_eq!(user.name.as_deref(), Some("Ana"));
        assert_eq!(user.role, "funcionario");

        // no token yet, so not authenticated
        assert!(!auth.is_authenticated());
    }

    #[test]
    fn test_role_name_wins_over_legacy_fields() {
        let user: User =
            serde_json::from_str(r#"{"roleName": "VENDEDOR", "tipoUsuario": "x", "perfil": "y"}"#)
                .unwrap();
        assert_eq!(user.role, "VENDEDOR");

        let user: User = serde_json::from_str(r#"{"perfil": "admin"}"#).unwrap();
        assert_eq!(user.role, "admin");
    }

    #[test]
    fn test_unreadable_user_is_treated_as_absent() {
        let auth = auth();
        auth.store().set(TOKEN_KEY, "tok").unwrap();
        auth.store().set("userData", "not json").unwrap();
        assert!(auth.current_user().is_none());
        assert!(!auth.is_authenticated());
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("nested").join("session.json");

        {
            let store = FileStore::open(&path).unwrap();
            store.set(TOKEN_KEY, "persisted").unwrap();
            store.set("userData", "{}").unwrap();
            store.remove("userData").unwrap();
        }

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get(TOKEN_KEY).as_deref(), Some("persisted"));
        assert!(reopened.get("userData").is_none());
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = FileStore::open(temp_dir.path().join("absent.json")).unwrap();
        assert!(store.get(TOKEN_KEY).is_none());
    }
}
