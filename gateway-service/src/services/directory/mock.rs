use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{BindOutcome, DirectoryConnector, DirectoryError};

/// In-memory directory for tests.
///
/// A search matches a user when the filter contains `={username})`, which
/// holds for the usual single-attribute templates.
pub struct MockDirectory {
    users: Mutex<HashMap<String, MockUser>>,
    failure: Mutex<Option<DirectoryError>>,
    search_calls: AtomicUsize,
    bind_calls: AtomicUsize,
}

struct MockUser {
    dn: String,
    password: String,
}

impl Default for MockDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDirectory {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            failure: Mutex::new(None),
            search_calls: AtomicUsize::new(0),
            bind_calls: AtomicUsize::new(0),
        }
    }

    pub fn add_user(&self, username: &str, dn: &str, password: &str) {
        self.users
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                username.to_string(),
                MockUser {
                    dn: dn.to_string(),
                    password: password.to_string(),
                },
            );
    }

    /// Makes every following call fail with `error` until reset with `None`.
    pub fn fail_with(&self, error: Option<DirectoryError>) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = error;
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn bind_calls(&self) -> usize {
        self.bind_calls.load(Ordering::SeqCst)
    }

    fn injected_failure(&self) -> Option<DirectoryError> {
        self.failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl DirectoryConnector for MockDirectory {
    async fn search_dns(&self, _base_dn: &str, filter: &str) -> Result<Vec<String>, DirectoryError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.injected_failure() {
            return Err(err);
        }

        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        Ok(users
            .iter()
            .filter(|(username, _)| filter.contains(&format!("={})", username)))
            .map(|(_, user)| user.dn.clone())
            .collect())
    }

    async fn bind(&self, dn: &str, password: &SecretString) -> Result<BindOutcome, DirectoryError> {
        self.bind_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.injected_failure() {
            return Err(err);
        }

        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let accepted = users
            .values()
            .any(|u| u.dn == dn && u.password == *password.expose_secret());

        Ok(if accepted {
            BindOutcome::Accepted
        } else {
            BindOutcome::Rejected
        })
    }
}
