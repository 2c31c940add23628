//! Optional process-wide client
//!
//! Nothing is created at load time. An application that wants a shared
//! client installs one explicitly at startup and tears it down at exit;
//! everything else should pass a [`Client`] around.
//!
//! ```rust,no_run
//! use wirebus_client::{global, Client};
//!
//! # async fn example() -> wirebus_core::Result<()> {
//! global::install(Client::new("ws://localhost:8080/bus")?);
//!
//! if let Some(client) = global::client() {
//!     client.connect()?;
//! }
//!
//! global::teardown().await;
//! # Ok(())
//! # }
//! ```

use crate::client::Client;
use std::sync::RwLock;

static DEFAULT: RwLock<Option<Client>> = RwLock::new(None);

/// Install `client` as the process-wide default, returning the previous one
pub fn install(client: Client) -> Option<Client> {
    let mut slot = DEFAULT.write().unwrap_or_else(|p| p.into_inner());
    slot.replace(client)
}

/// The installed default, if any
pub fn client() -> Option<Client> {
    DEFAULT.read().unwrap_or_else(|p| p.into_inner()).clone()
}

/// Remove the default and disconnect it
pub async fn teardown() {
    let previous = DEFAULT.write().unwrap_or_else(|p| p.into_inner()).take();
    if let Some(client) = previous {
        client.disconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_install_and_teardown() {
        assert!(client().is_none());

        let first = Client::new("ws://127.0.0.1:9").unwrap();
        assert!(install(first).is_none());
        assert!(client().is_some());

        let second = Client::new("ws://127.0.0.1:10").unwrap();
        assert!(install(second).is_some());

        teardown().await;
        assert!(client().is_none());
    }
}
