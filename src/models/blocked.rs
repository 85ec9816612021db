use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use super::TimestampMs;

/// An entry of the blocked-client roster
///
/// The identifier is whatever the backend keys its blocks on: a bare
/// address, an address range (`10.0.0.0/24`) or an `address:api_key`
/// composite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedClient {
    pub identifier: String,
    pub reason: String,
    pub blocked_at_ms: TimestampMs,
    pub expires_at_ms: TimestampMs,
}

impl BlockedClient {
    /// Whether the block is still in force at `now_ms`
    pub fn is_active(&self, now_ms: TimestampMs) -> bool {
        now_ms < self.expires_at_ms
    }

    /// Address part of the identifier
    ///
    /// `10.0.0.1:manual` yields `10.0.0.1`. Identifiers that already parse
    /// as an address (IPv6 included) or contain a range are returned whole.
    pub fn address(&self) -> &str {
        address_of(&self.identifier)
    }
}

/// Address part of a roster identifier, see [`BlockedClient::address`]
pub fn address_of(identifier: &str) -> &str {
    if identifier.parse::<IpAddr>().is_ok() || identifier.contains('/') {
        return identifier;
    }
    match identifier.rsplit_once(':') {
        Some((addr, _key)) if !addr.is_empty() => addr,
        _ => identifier,
    }
}
