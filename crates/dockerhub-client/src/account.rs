//! Monitored Docker Hub accounts
//!
//! Accounts come from a secrets directory: every regular file is one account,
//! the file name is the Docker Hub username and the file content (trailing
//! whitespace removed) is the password or access token. An empty set is never
//! handed to callers; it collapses to a single anonymous account, whose quota
//! Docker Hub tracks per source IP.

use std::path::Path;

use common::Secret;
use tracing::{debug, info, warn};

use crate::constants::ANONYMOUS_DISPLAY_NAME;
use crate::error::{Error, Result};

/// Name shown in logs and metric labels for an account identifier.
pub fn display_name(id: &str) -> &str {
    if id.is_empty() {
        ANONYMOUS_DISPLAY_NAME
    } else {
        id
    }
}

/// A credential pair. An empty identifier is the anonymous caller.
#[derive(Debug, Clone)]
pub struct Account {
    id: String,
    password: Secret<String>,
}

impl Account {
    pub fn new(id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            password: Secret::new(password.into()),
        }
    }

    /// The unauthenticated account (empty identifier and password).
    pub fn anonymous() -> Self {
        Self::new("", "")
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn password(&self) -> &Secret<String> {
        &self.password
    }

    pub fn is_anonymous(&self) -> bool {
        self.id.is_empty()
    }

    pub fn display_name(&self) -> &str {
        display_name(&self.id)
    }
}

/// Ordered, never-empty set of accounts fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct AccountSet {
    accounts: Vec<Account>,
}

impl AccountSet {
    /// Build a set from the given accounts, falling back to the anonymous
    /// account when the list is empty.
    pub fn new(accounts: Vec<Account>) -> Self {
        if accounts.is_empty() {
            return Self::anonymous();
        }
        Self { accounts }
    }

    pub fn anonymous() -> Self {
        Self {
            accounts: vec![Account::anonymous()],
        }
    }

    /// Build a set from an explicitly supplied username/password pair.
    ///
    /// Returns `Ok(None)` when neither value is supplied (empty strings count
    /// as absent), so the caller can fall back to the secrets directory.
    /// Supplying only one half of the pair is rejected.
    pub fn from_pair(username: Option<&str>, password: Option<&str>) -> Result<Option<Self>> {
        let username = username.filter(|u| !u.is_empty());
        let password = password.filter(|p| !p.is_empty());
        match (username, password) {
            (None, None) => Ok(None),
            (Some(u), Some(p)) => Ok(Some(Self {
                accounts: vec![Account::new(u, p)],
            })),
            (Some(u), None) => Err(Error::InvalidCredentials(format!(
                "username {u} was given without a password"
            ))),
            (None, Some(_)) => Err(Error::InvalidCredentials(
                "password was given without a username".into(),
            )),
        }
    }

    /// Load accounts from a secrets directory, degrading to the anonymous
    /// account if the directory cannot be listed or holds no credentials.
    pub async fn load_dir(path: &Path) -> Self {
        match read_dir(path).await {
            Ok(accounts) if accounts.is_empty() => {
                info!(
                    path = %path.display(),
                    "no credential files found, checking limits for the anonymous source IP"
                );
                Self::anonymous()
            }
            Ok(accounts) => {
                info!(path = %path.display(), accounts = accounts.len(), "loaded credentials");
                Self { accounts }
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "could not read credentials directory, falling back to anonymous"
                );
                Self::anonymous()
            }
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Account> {
        self.accounts.iter()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Always false; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl<'a> IntoIterator for &'a AccountSet {
    type Item = &'a Account;
    type IntoIter = std::slice::Iter<'a, Account>;

    fn into_iter(self) -> Self::IntoIter {
        self.accounts.iter()
    }
}

/// Read every credential file in `path`, ordered by file name.
///
/// Hidden entries (such as the `..data` links of a Kubernetes secret mount)
/// and anything that is not a regular file are skipped. A file that cannot
/// be read is skipped with a warning; failing to list the directory is an
/// error.
pub async fn read_dir(path: &Path) -> Result<Vec<Account>> {
    let mut entries = tokio::fs::read_dir(path)
        .await
        .map_err(|e| Error::Io(format!("listing {}: {e}", path.display())))?;

    let mut accounts = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::Io(format!("listing {}: {e}", path.display())))?
    {
        let file_name = entry.file_name();
        let Some(username) = file_name.to_str() else {
            warn!(file = ?file_name, "skipping credential file with non UTF-8 name");
            continue;
        };
        if username.starts_with('.') {
            continue;
        }

        let file_path = entry.path();
        // metadata() follows symlinks, which secret mounts rely on
        match tokio::fs::metadata(&file_path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => continue,
            Err(e) => {
                warn!(path = %file_path.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        }

        debug!(path = %file_path.display(), "reading credential file");
        match tokio::fs::read_to_string(&file_path).await {
            Ok(contents) => accounts.push(Account::new(username, contents.trim_end())),
            Err(e) => {
                warn!(path = %file_path.display(), error = %e, "skipping unreadable credential file");
            }
        }
    }

    accounts.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(accounts)
}
