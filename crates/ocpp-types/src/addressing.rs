//! # Addressing Model
//!
//! Where a message has been ([`NetworkPath`]) and where the next message in
//! the opposite direction must go ([`SourceRouting`]).
//!
//! ```text
//!   CS01 ──▶ LC1 ──▶ LC2 ──▶ CSMS
//!   inbound path at CSMS:   [CS01, LC1, LC2]
//!   reply destination:      [LC2, LC1, CS01]    (next hop LC2, final CS01)
//!   reply network path:     [CSMS]
//! ```
//!
//! Everything here is pure: no I/O, no interior mutability. The only failure
//! is a structurally empty path on a relayed message.

use crate::errors::AddressingError;
use crate::identifiers::NetworkingNodeId;
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// =============================================================================
// NETWORK PATH
// =============================================================================

/// Ordered list of hops a message has traversed, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkPath(Vec<NetworkingNodeId>);

impl NetworkPath {
    /// A path with no hops.
    #[must_use]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// A single-hop path starting at `node`.
    #[must_use]
    pub fn from(node: NetworkingNodeId) -> Self {
        Self(vec![node])
    }

    /// Build a path from hops in traversal order.
    #[must_use]
    pub fn from_hops(hops: Vec<NetworkingNodeId>) -> Self {
        Self(hops)
    }

    /// A new path extended with `node` as the newest hop.
    #[must_use]
    pub fn append(&self, node: NetworkingNodeId) -> Self {
        let mut hops = self.0.clone();
        hops.push(node);
        Self(hops)
    }

    /// The originating node.
    #[must_use]
    pub fn source(&self) -> Option<&NetworkingNodeId> {
        self.0.first()
    }

    /// The most recent hop.
    #[must_use]
    pub fn last(&self) -> Option<&NetworkingNodeId> {
        self.0.last()
    }

    /// All hops in traversal order.
    #[must_use]
    pub fn hops(&self) -> &[NetworkingNodeId] {
        &self.0
    }

    /// Number of hops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no hop has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if `node` already appears on the path.
    #[must_use]
    pub fn contains(&self, node: &NetworkingNodeId) -> bool {
        self.0.contains(node)
    }
}

impl fmt::Display for NetworkPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.0.iter().map(NetworkingNodeId::as_str).collect();
        write!(f, "[{}]", joined.join(" -> "))
    }
}

// =============================================================================
// SOURCE ROUTING
// =============================================================================

/// Hops a message still has to visit, next hop first.
///
/// The final element is the addressee.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SourceRouting(Vec<NetworkingNodeId>);

impl SourceRouting {
    /// Direct addressing: `node` is both the next hop and the final destination.
    #[must_use]
    pub fn to(node: NetworkingNodeId) -> Self {
        Self(vec![node])
    }

    /// Explicit hop list.
    pub fn from_hops(hops: Vec<NetworkingNodeId>) -> Result<Self, AddressingError> {
        if hops.is_empty() {
            return Err(AddressingError::EmptyNetworkPath);
        }
        Ok(Self(hops))
    }

    /// Route back along `path`: newest hop first, path source last.
    pub fn reverse_of(path: &NetworkPath) -> Result<Self, AddressingError> {
        if path.is_empty() {
            return Err(AddressingError::EmptyNetworkPath);
        }
        Ok(Self(path.hops().iter().rev().cloned().collect()))
    }

    /// The hops that remain once `node` has handled the message.
    ///
    /// Returns `None` if `node` is the final destination or not on the route.
    #[must_use]
    pub fn after(&self, node: &NetworkingNodeId) -> Option<Self> {
        let position = self.0.iter().position(|hop| hop == node)?;
        let rest = &self.0[position + 1..];
        if rest.is_empty() {
            None
        } else {
            Some(Self(rest.to_vec()))
        }
    }

    /// The neighbour the message should be handed to.
    #[must_use]
    pub fn next_hop(&self) -> &NetworkingNodeId {
        // Invariant: never empty.
        &self.0[0]
    }

    /// The addressee.
    #[must_use]
    pub fn final_destination(&self) -> &NetworkingNodeId {
        &self.0[self.0.len() - 1]
    }

    /// Returns true if `node` is the addressee.
    #[must_use]
    pub fn is_addressed_to(&self, node: &NetworkingNodeId) -> bool {
        self.final_destination() == node
    }

    /// All hops, next hop first.
    #[must_use]
    pub fn hops(&self) -> &[NetworkingNodeId] {
        &self.0
    }
}

impl fmt::Display for SourceRouting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.0.iter().map(NetworkingNodeId::as_str).collect();
        write!(f, "{}", joined.join(" -> "))
    }
}

impl<'de> Deserialize<'de> for SourceRouting {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RoutingVisitor;

        impl<'de> Visitor<'de> for RoutingVisitor {
            type Value = SourceRouting;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a node id or a non-empty array of node ids")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<SourceRouting, E> {
                let node = NetworkingNodeId::parse(value).map_err(E::custom)?;
                Ok(SourceRouting::to(node))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<SourceRouting, A::Error> {
                let mut hops = Vec::new();
                while let Some(hop) = seq.next_element::<NetworkingNodeId>()? {
                    hops.push(hop);
                }
                SourceRouting::from_hops(hops).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_any(RoutingVisitor)
    }
}

// =============================================================================
// REPLY ROUTE
// =============================================================================

/// Addressing for a reply to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRoute {
    /// Reverse of the inbound path; the final destination is the original sender.
    pub destination: SourceRouting,
    /// Fresh path starting at the replying node.
    pub network_path: NetworkPath,
}

/// Compute the reply route for a message that arrived along `inbound` at `local`.
pub fn reply_route(
    inbound: &NetworkPath,
    local: &NetworkingNodeId,
) -> Result<ReplyRoute, AddressingError> {
    Ok(ReplyRoute {
        destination: SourceRouting::reverse_of(inbound)?,
        network_path: NetworkPath::from(local.clone()),
    })
}
