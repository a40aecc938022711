//! Connection state shared with every surface that displays it.
//!
//! Observers call [`AppState::subscribe`] and receive a fresh
//! [`ConnectionSnapshot`] whenever an operation changes what they would show.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::watch;

use super::error::VaultError;
use super::types::{Account, FileRecord};

/// Everything an observer can see about the current connection
#[derive(Clone, Debug, Default)]
pub struct ConnectionSnapshot {
    pub active_account: Option<Account>,
    pub active_network: Option<String>,
    pub is_loading: bool,
    /// Most recent error recorded by an orchestration operation
    pub last_error: Option<VaultError>,
    pub files: Vec<FileRecord>,
}

pub struct AppState {
    tx: watch::Sender<ConnectionSnapshot>,
    in_flight: AtomicUsize,
}

impl AppState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionSnapshot::default());
        Self {
            tx,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Receive every future state change
    pub fn subscribe(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.tx.borrow().clone()
    }

    fn update(&self, apply: impl FnOnce(&mut ConnectionSnapshot)) {
        self.tx.send_modify(apply);
    }

    pub fn active_account(&self) -> Option<Account> {
        self.tx.borrow().active_account.clone()
    }

    pub fn set_account(&self, account: Option<Account>) {
        self.update(|s| s.active_account = account);
    }

    pub fn set_network(&self, network: Option<String>) {
        self.update(|s| s.active_network = network);
    }

    pub fn record_error(&self, error: &VaultError) {
        let error = error.clone();
        self.update(|s| s.last_error = Some(error));
    }

    pub fn clear_error(&self) {
        self.update(|s| s.last_error = None);
    }

    pub fn files(&self) -> Vec<FileRecord> {
        self.tx.borrow().files.clone()
    }

    pub fn push_file(&self, record: FileRecord) {
        self.update(|s| s.files.push(record));
    }

    pub fn replace_files(&self, files: Vec<FileRecord>) {
        self.update(|s| s.files = files);
    }

    /// Forget everything tied to the connected wallet
    pub fn clear_session(&self) {
        self.update(|s| {
            s.active_account = None;
            s.active_network = None;
            s.files.clear();
        });
    }

    /// Mark an operation as running until the guard is dropped
    ///
    /// Nested operations share the flag; it only clears when the outermost
    /// guard goes away.
    pub fn begin_operation(&self) -> LoadingGuard<'_> {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) == 0 {
            self.update(|s| s.is_loading = true);
        }
        LoadingGuard { state: self }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct LoadingGuard<'a> {
    state: &'a AppState,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.state.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.update(|s| s.is_loading = false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_operations_keep_loading() {
        let state = AppState::new();
        let outer = state.begin_operation();
        {
            let _inner = state.begin_operation();
            assert!(state.snapshot().is_loading);
        }
        assert!(state.snapshot().is_loading);
        drop(outer);
        assert!(!state.snapshot().is_loading);
    }

    #[tokio::test]
    async fn test_subscribers_see_recorded_errors() {
        let state = AppState::new();
        let mut rx = state.subscribe();
        state.record_error(&VaultError::ApiNotReady);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().last_error, Some(VaultError::ApiNotReady));
    }

    #[test]
    fn test_clear_session_keeps_last_error() {
        let state = AppState::new();
        state.set_account(Some(Account::new("0xab", "test")));
        state.record_error(&VaultError::SignerUnavailable);
        state.clear_session();
        let snapshot = state.snapshot();
        assert!(snapshot.active_account.is_none());
        assert_eq!(snapshot.last_error, Some(VaultError::SignerUnavailable));
    }
}
