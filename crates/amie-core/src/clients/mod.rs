// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP implementations of the collaborator traits.

pub mod amie;
pub mod connect;
pub mod freshdesk;
pub mod gracc;

pub use self::amie::AmieClient;
pub use self::connect::ConnectClient;
pub use self::freshdesk::FreshdeskClient;
pub use self::gracc::GraccClient;

use std::time::Duration;

/// Build the shared HTTP client. Every request is bounded by `timeout`.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("amie-core/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Join a base URL and a path without doubling slashes.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://h/v0.1/", "/packets/OSG"), "http://h/v0.1/packets/OSG");
        assert_eq!(join_url("http://h", "packets/OSG"), "http://h/packets/OSG");
    }
}
