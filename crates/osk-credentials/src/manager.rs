//! Credential lifecycle: issue, list, revoke and wipe.
//!
//! Metadata lives in a [`BlobStore`] as one JSON array and is cached in memory.
//! Readers share the cache. Writers serialize on a barrier, write the new array
//! to the store first and only then swap the cache, so a failed or cancelled
//! write leaves both unchanged. Unlocking the master key can block on a user
//! prompt, so it happens before the barrier is taken.

use crate::error::CredentialError;
use crate::metadata::{CredentialMetadata, ExpirationPolicy, GeneratedCredential, token_prefix};
use crate::revocation_store::RevocationStore;
use crate::storage::{BlobStore, CounterStore};
use chrono::Utc;
use osk_core::AgentConfig;
use osk_token::address::normalize;
use osk_token::{
    AccessContext, AgentInfo, KeyDerivation, RevocationSnapshot, TokenBuilder, TokenParams,
    generate_nonce,
};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

pub struct CredentialLifecycleManager {
    keys: Arc<KeyDerivation>,
    counter: Arc<dyn CounterStore>,
    blobs: Arc<dyn BlobStore>,
    revocations: Arc<dyn RevocationStore>,
    agents: Vec<AgentConfig>,
    cache: RwLock<Vec<CredentialMetadata>>,
    write_barrier: Mutex<()>,
}

impl CredentialLifecycleManager {
    /// Create a manager and load the persisted metadata.
    pub async fn open(
        keys: Arc<KeyDerivation>,
        counter: Arc<dyn CounterStore>,
        blobs: Arc<dyn BlobStore>,
        revocations: Arc<dyn RevocationStore>,
    ) -> Result<Self, CredentialError> {
        let entries = load_entries(blobs.as_ref()).await?;
        tracing::debug!(count = entries.len(), "Loaded credential metadata");

        Ok(Self {
            keys,
            counter,
            blobs,
            revocations,
            agents: Vec::new(),
            cache: RwLock::new(entries),
            write_barrier: Mutex::new(()),
        })
    }

    /// Agents presented by [`list_agents`](Self::list_agents).
    pub fn with_agents(mut self, agents: Vec<AgentConfig>) -> Self {
        self.agents = agents;
        self
    }

    /// Issue a new credential signed by the master key, or by the agent at
    /// `agent_index` (which is then both issuer and audience).
    ///
    /// The returned token is not stored anywhere.
    pub async fn generate(
        &self,
        label: &str,
        expiration: ExpirationPolicy,
        agent_index: Option<u32>,
    ) -> Result<GeneratedCredential, CredentialError> {
        let master = self
            .keys
            .master_key(&AccessContext::new(format!("Create API key \"{label}\"")))
            .await?;
        let signer = match agent_index {
            Some(index) => KeyDerivation::derive_agent(&master, index)?,
            None => master,
        };
        let address = signer.address().clone();

        let _barrier = self.write_barrier.lock().await;

        let cnt = self.counter.next().await?;
        let created_at = Utc::now();
        let expires_at = expiration.expires_at(created_at);
        let nonce = generate_nonce();
        let label = label.trim().to_string();

        let token = TokenBuilder::new(signer).build(
            TokenParams::new(address.clone(), address.clone(), cnt)
                .nonce(nonce.clone())
                .issued_at(created_at.timestamp())
                .expires_at(expires_at.map(|t| t.timestamp()))
                .label((!label.is_empty()).then(|| label.clone())),
        )?;

        let metadata = CredentialMetadata {
            id: Uuid::new_v4().to_string(),
            label,
            prefix: token_prefix(&token),
            nonce,
            counter: cnt,
            issuer: address.to_string(),
            audience: address.to_string(),
            created_at,
            expiration,
            expires_at,
            revoked: false,
            agent_index,
        };

        let mut entries = self.cache.read().await.clone();
        entries.push(metadata.clone());
        self.commit(entries).await?;

        tracing::info!(
            id = %metadata.id,
            label = %metadata.label,
            issuer = %metadata.issuer,
            counter = cnt,
            prefix = %metadata.prefix,
            expiration = %expiration,
            "Generated credential"
        );

        Ok(GeneratedCredential { token, metadata })
    }

    /// Revoke one credential by id. Revoking twice is a no-op.
    pub async fn revoke(&self, id: &str) -> Result<CredentialMetadata, CredentialError> {
        let _barrier = self.write_barrier.lock().await;

        let mut entries = self.cache.read().await.clone();
        let entry = entries
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| CredentialError::NotFound { id: id.to_string() })?;
        if entry.revoked {
            return Ok(entry.clone());
        }

        self.revocations.revoke(&entry.issuer, &entry.nonce).await?;
        entry.revoked = true;
        let revoked = entry.clone();
        self.commit(entries).await?;

        tracing::info!(id = %revoked.id, issuer = %revoked.issuer, prefix = %revoked.prefix, "Revoked credential");
        Ok(revoked)
    }

    /// Revoke everything `address` has issued so far.
    ///
    /// Records the current device counter as the address's threshold and
    /// flags every matching local entry. Returns the number of entries flagged.
    pub async fn revoke_all(&self, address: &str) -> Result<usize, CredentialError> {
        let _barrier = self.write_barrier.lock().await;

        let threshold = self.counter.current().await?;
        self.revocations.revoke_all(address, threshold).await?;

        let issuer = normalize(address);
        let mut entries = self.cache.read().await.clone();
        let mut flagged = 0;
        for entry in entries
            .iter_mut()
            .filter(|m| !m.revoked && normalize(&m.issuer) == issuer)
        {
            entry.revoked = true;
            flagged += 1;
        }
        if flagged > 0 {
            self.commit(entries).await?;
        }

        tracing::info!(address = %issuer, threshold, flagged, "Revoked all credentials");
        Ok(flagged)
    }

    /// All known credentials, oldest first.
    pub async fn list_keys(&self) -> Vec<CredentialMetadata> {
        self.cache.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<CredentialMetadata> {
        self.cache.read().await.iter().find(|m| m.id == id).cloned()
    }

    /// Forget every credential. Revocation records are kept.
    pub async fn delete_all(&self) -> Result<usize, CredentialError> {
        let _barrier = self.write_barrier.lock().await;
        let removed = self.cache.read().await.len();
        self.commit(Vec::new()).await?;
        tracing::info!(removed, "Deleted all credential metadata");
        Ok(removed)
    }

    /// Drop the cache and re-read the store.
    pub async fn reload(&self) -> Result<usize, CredentialError> {
        let _barrier = self.write_barrier.lock().await;
        let entries = load_entries(self.blobs.as_ref()).await?;
        let count = entries.len();
        *self.cache.write().await = entries;
        tracing::debug!(count, "Reloaded credential metadata");
        Ok(count)
    }

    /// Configured agents with their derived addresses.
    pub async fn list_agents(&self) -> Result<Vec<AgentInfo>, CredentialError> {
        if self.agents.is_empty() {
            return Ok(Vec::new());
        }
        let master = self
            .keys
            .master_key(&AccessContext::new("List agent identities"))
            .await?;
        self.agents
            .iter()
            .map(|agent| {
                let key = KeyDerivation::derive_agent(&master, agent.index)?;
                Ok(AgentInfo {
                    index: agent.index,
                    address: key.address().clone(),
                    label: agent.label.clone(),
                })
            })
            .collect()
    }

    /// Current revocation state, for validation.
    pub async fn revocation_snapshot(&self) -> Result<RevocationSnapshot, CredentialError> {
        self.revocations.snapshot().await
    }

    /// Persist `entries`, then make them the cache. Caller holds the barrier.
    async fn commit(&self, entries: Vec<CredentialMetadata>) -> Result<(), CredentialError> {
        let bytes = serde_json::to_vec(&entries)?;
        self.blobs.save(&bytes).await?;
        *self.cache.write().await = entries;
        Ok(())
    }
}

async fn load_entries(blobs: &dyn BlobStore) -> Result<Vec<CredentialMetadata>, CredentialError> {
    match blobs.load().await? {
        Some(bytes) if !bytes.is_empty() => Ok(serde_json::from_slice(&bytes)?),
        _ => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revocation_store::MemoryRevocationStore;
    use crate::storage::{MemoryBlobStore, MemoryCounterStore};
    use osk_token::{KeyPair, MemoryKeyStore, TrustConfig, ValidationOutcome, validate};

    struct Harness {
        manager: CredentialLifecycleManager,
        master: KeyPair,
        store: Arc<MemoryKeyStore>,
        blobs: Arc<MemoryBlobStore>,
        counter: Arc<MemoryCounterStore>,
    }

    async fn harness() -> Harness {
        let master = KeyPair::generate().unwrap();
        let store = Arc::new(MemoryKeyStore::with_key(master.clone()));
        let blobs = Arc::new(MemoryBlobStore::new());
        let counter = Arc::new(MemoryCounterStore::new());
        let manager = CredentialLifecycleManager::open(
            Arc::new(KeyDerivation::new(store.clone())),
            counter.clone(),
            blobs.clone(),
            Arc::new(MemoryRevocationStore::new()),
        )
        .await
        .unwrap();
        Harness {
            manager,
            master,
            store,
            blobs,
            counter,
        }
    }

    async fn trust(h: &Harness, agent: Option<u32>) -> TrustConfig {
        let agent = agent.map(|i| h.master.derive_agent(i).unwrap().address().clone());
        TrustConfig::new(h.master.address().clone(), agent)
            .with_revocations(Arc::new(h.manager.revocation_snapshot().await.unwrap()))
    }

    #[tokio::test]
    async fn test_generate_master_credential() {
        let h = harness().await;
        let generated = h
            .manager
            .generate("laptop", ExpirationPolicy::ThirtyDays, None)
            .await
            .unwrap();

        let m = &generated.metadata;
        assert_eq!(m.label, "laptop");
        assert_eq!(m.counter, 1);
        assert_eq!(m.issuer, h.master.address().to_string());
        assert_eq!(m.audience, m.issuer);
        assert!(!m.revoked);
        assert!(generated.token.starts_with(&m.prefix[..m.prefix.len() - '…'.len_utf8()]));
        assert_eq!(
            m.expires_at.unwrap() - m.created_at,
            chrono::Duration::days(30)
        );

        let outcome = validate(&generated.token, &trust(&h, None).await);
        assert_eq!(
            outcome,
            ValidationOutcome::Valid {
                issuer: h.master.address().clone()
            }
        );
    }

    #[tokio::test]
    async fn test_metadata_never_contains_token() {
        let h = harness().await;
        let generated = h
            .manager
            .generate("ci", ExpirationPolicy::Never, None)
            .await
            .unwrap();

        let blob = h.blobs.load().await.unwrap().unwrap();
        let blob = String::from_utf8(blob).unwrap();
        let signature = generated.token.rsplit('.').next().unwrap();
        assert!(!blob.contains(&generated.token));
        assert!(!blob.contains(signature));
        assert!(!blob.contains(&h.master.private_key_hex()));
        assert!(blob.contains(&generated.metadata.id));
    }

    #[tokio::test]
    async fn test_agent_credential_is_scoped_to_agent() {
        let h = harness().await;
        let generated = h
            .manager
            .generate("agent", ExpirationPolicy::NinetyDays, Some(2))
            .await
            .unwrap();

        let agent = h.master.derive_agent(2).unwrap();
        assert_eq!(generated.metadata.issuer, agent.address().to_string());
        assert_eq!(generated.metadata.audience, agent.address().to_string());
        assert_eq!(generated.metadata.agent_index, Some(2));

        assert!(!validate(&generated.token, &trust(&h, None).await).is_valid());
        assert!(validate(&generated.token, &trust(&h, Some(2)).await).is_valid());
    }

    #[tokio::test]
    async fn test_counter_advances_per_credential() {
        let h = harness().await;
        for expected in 1..=3 {
            let g = h
                .manager
                .generate("k", ExpirationPolicy::Never, None)
                .await
                .unwrap();
            assert_eq!(g.metadata.counter, expected);
        }
        assert_eq!(h.counter.current().await.unwrap(), 3);
        assert_eq!(h.manager.list_keys().await.len(), 3);
    }

    #[tokio::test]
    async fn test_revoke_one() {
        let h = harness().await;
        let a = h.manager.generate("a", ExpirationPolicy::Never, None).await.unwrap();
        let b = h.manager.generate("b", ExpirationPolicy::Never, None).await.unwrap();

        let revoked = h.manager.revoke(&a.metadata.id).await.unwrap();
        assert!(revoked.revoked);
        assert!(h.manager.get(&a.metadata.id).await.unwrap().revoked);
        assert!(!h.manager.get(&b.metadata.id).await.unwrap().revoked);

        let trust = trust(&h, None).await;
        assert_eq!(validate(&a.token, &trust), ValidationOutcome::Revoked);
        assert!(validate(&b.token, &trust).is_valid());

        // idempotent
        assert!(h.manager.revoke(&a.metadata.id).await.unwrap().revoked);
    }

    #[tokio::test]
    async fn test_revoke_unknown_id() {
        let h = harness().await;
        assert!(matches!(
            h.manager.revoke("missing").await,
            Err(CredentialError::NotFound { id }) if id == "missing"
        ));
    }

    #[tokio::test]
    async fn test_revoke_all_uses_current_counter() {
        let h = harness().await;
        let a = h.manager.generate("a", ExpirationPolicy::Never, None).await.unwrap();
        let b = h.manager.generate("b", ExpirationPolicy::Never, None).await.unwrap();
        let agent = h.manager.generate("c", ExpirationPolicy::Never, Some(0)).await.unwrap();

        let upper = h.master.address().as_str().to_ascii_uppercase().replacen("0X", "0x", 1);
        let flagged = h.manager.revoke_all(&upper).await.unwrap();
        assert_eq!(flagged, 2);
        assert!(!h.manager.get(&agent.metadata.id).await.unwrap().revoked);

        let later = h.manager.generate("d", ExpirationPolicy::Never, None).await.unwrap();

        let trust = trust(&h, Some(0)).await;
        assert_eq!(validate(&a.token, &trust), ValidationOutcome::Revoked);
        assert_eq!(validate(&b.token, &trust), ValidationOutcome::Revoked);
        assert!(validate(&agent.token, &trust).is_valid());
        assert!(validate(&later.token, &trust).is_valid());
    }

    #[tokio::test]
    async fn test_denied_unlock_leaves_no_trace() {
        let h = harness().await;
        h.store.set_deny(true);

        let err = h
            .manager
            .generate("nope", ExpirationPolicy::Never, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CredentialError::Token(osk_token::TokenError::AuthenticationDenied)
        ));
        assert!(h.manager.list_keys().await.is_empty());
        assert_eq!(h.blobs.load().await.unwrap(), None);
        assert_eq!(h.counter.current().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_all_and_reload() {
        let h = harness().await;
        h.manager.generate("a", ExpirationPolicy::Never, None).await.unwrap();
        h.manager.generate("b", ExpirationPolicy::Never, None).await.unwrap();

        assert_eq!(h.manager.delete_all().await.unwrap(), 2);
        assert!(h.manager.list_keys().await.is_empty());

        // Another process writes to the store behind our back.
        let other = CredentialMetadata {
            id: "external".into(),
            label: "x".into(),
            prefix: "osk-v1.…".into(),
            nonce: "n".into(),
            counter: 9,
            issuer: h.master.address().to_string(),
            audience: h.master.address().to_string(),
            created_at: Utc::now(),
            expiration: ExpirationPolicy::Never,
            expires_at: None,
            revoked: false,
            agent_index: None,
        };
        h.blobs
            .save(&serde_json::to_vec(&vec![other]).unwrap())
            .await
            .unwrap();
        assert!(h.manager.get("external").await.is_none());

        assert_eq!(h.manager.reload().await.unwrap(), 1);
        assert!(h.manager.get("external").await.is_some());
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_an_error() {
        let blobs = Arc::new(MemoryBlobStore::new());
        blobs.save(b"{broken").await.unwrap();

        let result = CredentialLifecycleManager::open(
            Arc::new(KeyDerivation::new(Arc::new(MemoryKeyStore::new()))),
            Arc::new(MemoryCounterStore::new()),
            blobs,
            Arc::new(MemoryRevocationStore::new()),
        )
        .await;
        assert!(matches!(result, Err(CredentialError::SerializationError(_))));
    }

    #[tokio::test]
    async fn test_concurrent_generation() {
        let h = Arc::new(harness().await);
        let mut handles = Vec::new();
        for i in 0..8 {
            let h = h.clone();
            handles.push(tokio::spawn(async move {
                h.manager
                    .generate(&format!("k{i}"), ExpirationPolicy::Never, None)
                    .await
                    .unwrap()
            }));
        }
        let mut counters = Vec::new();
        for handle in handles {
            counters.push(handle.await.unwrap().metadata.counter);
        }
        counters.sort_unstable();
        assert_eq!(counters, (1..=8).collect::<Vec<_>>());
        assert_eq!(h.manager.list_keys().await.len(), 8);

        h.manager.reload().await.unwrap();
        assert_eq!(h.manager.list_keys().await.len(), 8);
    }

    #[tokio::test]
    async fn test_list_agents() {
        let h = harness().await;
        assert!(h.manager.list_agents().await.unwrap().is_empty());

        let manager = h.manager.with_agents(vec![
            AgentConfig {
                index: 0,
                label: "researcher".into(),
            },
            AgentConfig {
                index: 3,
                label: "builder".into(),
            },
        ]);
        let agents = manager.list_agents().await.unwrap();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[1].index, 3);
        assert_eq!(agents[1].label, "builder");
        assert_eq!(&agents[1].address, h.master.derive_agent(3).unwrap().address());
    }
}
