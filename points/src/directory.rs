//! # Agent Directory & Reputation Seams
//!
//! The ledger core does not decide who is allowed to transact — deployments
//! do. These traits are the seams where a registry lookup or a reputation
//! score plugs in; the defaults admit everyone, which is the right behavior
//! for a single-tenant facilitator.

use serde::{Deserialize, Serialize};

/// A registry entry for a known agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub did: String,
    pub display_name: Option<String>,
    /// Facts URL or registry endpoint, when the agent published one.
    pub endpoint: Option<String>,
}

/// Resolves agent identifiers to registry entries.
pub trait AgentDirectory: Send + Sync {
    /// Looks up an agent by DID. `None` means unknown, not ineligible —
    /// eligibility is the oracle's call.
    fn resolve(&self, did: &str) -> Option<AgentRecord>;
}

/// Decides whether an agent may participate in a payment.
pub trait ReputationOracle: Send + Sync {
    fn is_eligible(&self, did: &str) -> bool;
}

/// Directory that knows nothing and resolves nothing.
#[derive(Debug, Default)]
pub struct OpenDirectory;

impl AgentDirectory for OpenDirectory {
    fn resolve(&self, _did: &str) -> Option<AgentRecord> {
        None
    }
}

/// Oracle that admits every agent.
#[derive(Debug, Default)]
pub struct AlwaysEligible;

impl ReputationOracle for AlwaysEligible {
    fn is_eligible(&self, _did: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_admit_everyone() {
        let directory = OpenDirectory;
        let oracle = AlwaysEligible;
        assert!(directory.resolve("did:nanda:anyone").is_none());
        assert!(oracle.is_eligible("did:nanda:anyone"));
    }
}
