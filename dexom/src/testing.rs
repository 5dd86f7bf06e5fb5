//! Harness for tests that run against the in-memory datastore.

use std::sync::Arc;

use crate::{client::Client, datastore::LocalDatastore, registry::Registry};

/// A fresh [`LocalDatastore`] and [`Client`] per test.
///
/// The emulator is strongly consistent, so a query issued right after a save sees it.
/// Dropping the helper clears the datastore.
pub struct LocalTestHelper {
    datastore: LocalDatastore,
    client: Client<LocalDatastore>,
}

impl LocalTestHelper {
    pub fn set_up() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let datastore = LocalDatastore::new();
        let client = Client::with_registry(datastore.clone(), Arc::new(Registry::new()));
        Self { datastore, client }
    }

    pub fn client(&mut self) -> &mut Client<LocalDatastore> {
        &mut self.client
    }

    /// Shares state with the client's datastore.
    pub fn datastore(&self) -> &LocalDatastore {
        &self.datastore
    }

    pub fn tear_down(&mut self) {
        self.datastore.clear();
    }
}

impl Drop for LocalTestHelper {
    fn drop(&mut self) {
        self.tear_down();
    }
}
