//! The unit of work moved from network tasks to logic threads.

use std::fmt;

use packetforge_protocol::Payload;
use packetforge_transport::ConnectionId;
use serde::{Deserialize, Serialize};

/// Status code of a successful database request.
pub const DBRESULT_STATE_SUCCESS: i32 = 0;

/// Status code of a database request that failed for an unknown reason.
pub const DBRESULT_ERROR_UNKNOWN: i32 = -999;

/// Everything a logic thread can be asked to handle.
///
/// Each variant carries only what its category needs. Disposal after
/// handling is decided by the variant (see [`crate::dispose`]):
///
/// | Variant          | Origin                   | After handling            |
/// |------------------|--------------------------|---------------------------|
/// | `Data`           | a connection's adapter   | payload back to its pool  |
/// | `Connect`        | accept loop              | freed                     |
/// | `Disconnect`     | connection task          | freed                     |
/// | `Timer`          | timer service            | freed                     |
/// | `Shouter`        | server-wide broadcast    | freed                     |
/// | `DbResult`       | database proxy           | forwarded to completion   |
/// | `ServerShutdown` | [`DispatchQueue::shutdown`](crate::DispatchQueue::shutdown) | worker stops |
#[derive(Debug)]
pub enum Packet {
    /// A decoded application packet from a connection.
    Data {
        owner: ConnectionId,
        payload: Payload,
    },
    /// A connection was accepted.
    Connect { owner: ConnectionId },
    /// A connection went away.
    Disconnect { owner: ConnectionId },
    /// A registered timer fired.
    Timer { timer_id: u32 },
    /// A server-wide announcement.
    Shouter { packet_id: u16, data: Vec<u8> },
    /// A database request completed.
    DbResult(DbResult),
    /// Stop sentinel. Always the last packet a worker sees.
    ServerShutdown,
}

impl Packet {
    pub fn category(&self) -> Category {
        match self {
            Self::Data { .. } => Category::Data,
            Self::Connect { .. } => Category::Connect,
            Self::Disconnect { .. } => Category::Disconnect,
            Self::Timer { .. } => Category::Timer,
            Self::Shouter { .. } => Category::Shouter,
            Self::DbResult(_) => Category::DbResult,
            Self::ServerShutdown => Category::ServerShutdown,
        }
    }

    /// The connection this packet belongs to, if any.
    pub fn owner(&self) -> Option<ConnectionId> {
        match self {
            Self::Data { owner, .. } | Self::Connect { owner } | Self::Disconnect { owner } => {
                Some(*owner)
            }
            Self::DbResult(result) => result.owner,
            Self::Timer { .. } | Self::Shouter { .. } | Self::ServerShutdown => None,
        }
    }

    /// The application packet id, for `Data` and `Shouter` packets.
    pub fn packet_id(&self) -> Option<u16> {
        match self {
            Self::Data { payload, .. } => Some(payload.packet_id()),
            Self::Shouter { packet_id, .. } => Some(*packet_id),
            _ => None,
        }
    }
}

/// Field-less tag of a [`Packet`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Data,
    Connect,
    Disconnect,
    Timer,
    Shouter,
    DbResult,
    ServerShutdown,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Data,
        Category::Connect,
        Category::Disconnect,
        Category::Timer,
        Category::Shouter,
        Category::DbResult,
        Category::ServerShutdown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Timer => "timer",
            Self::Shouter => "shouter",
            Self::DbResult => "db_result",
            Self::ServerShutdown => "server_shutdown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Database results
// ---------------------------------------------------------------------------

/// Outcome of a database request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DbStatus {
    Success,
    Error(i32),
}

impl DbStatus {
    /// Maps a raw status code; `0` is success.
    pub fn from_code(code: i32) -> Self {
        if code == DBRESULT_STATE_SUCCESS {
            Self::Success
        } else {
            Self::Error(code)
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Success => DBRESULT_STATE_SUCCESS,
            Self::Error(code) => code,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// A completed database request, re-injected into the dispatch queue so
/// it is processed in order with network traffic.
#[derive(Debug, Clone, PartialEq)]
pub struct DbResult {
    /// Correlates the result with the request that produced it.
    pub request_id: u64,
    /// The connection the request was made on behalf of, if any.
    pub owner: Option<ConnectionId>,
    pub status: DbStatus,
    /// Result rows, as returned by the proxy.
    pub rows: serde_json::Value,
}

impl DbResult {
    pub fn success(request_id: u64, owner: Option<ConnectionId>, rows: serde_json::Value) -> Self {
        Self {
            request_id,
            owner,
            status: DbStatus::Success,
            rows,
        }
    }

    pub fn failure(request_id: u64, owner: Option<ConnectionId>, code: i32) -> Self {
        Self {
            request_id,
            owner,
            status: DbStatus::from_code(code),
            rows: serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packetforge_protocol::Payload;

    #[test]
    fn test_category_and_owner_per_variant() {
        let conn = ConnectionId::new(3);
        let data = Packet::Data {
            owner: conn,
            payload: Payload::binary(1000, &b"x"[..]),
        };
        assert_eq!(data.category(), Category::Data);
        assert_eq!(data.owner(), Some(conn));
        assert_eq!(data.packet_id(), Some(1000));

        assert_eq!(Packet::Timer { timer_id: 4 }.owner(), None);
        assert_eq!(Packet::ServerShutdown.category(), Category::ServerShutdown);

        let db = Packet::DbResult(DbResult::success(1, Some(conn), serde_json::json!([])));
        assert_eq!(db.owner(), Some(conn));
        assert_eq!(db.category().to_string(), "db_result");
    }

    #[test]
    fn test_db_status_codes() {
        assert_eq!(DbStatus::from_code(0), DbStatus::Success);
        assert_eq!(DbStatus::from_code(DBRESULT_ERROR_UNKNOWN).code(), -999);
        assert!(!DbResult::failure(2, None, -999).status.is_success());
    }

    #[test]
    fn test_every_category_has_a_distinct_name() {
        let mut names: Vec<_> = Category::ALL.iter().map(|c| c.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Category::ALL.len());
    }
}
