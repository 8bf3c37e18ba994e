//! End-to-end trust-on-first-use flows through the public API.

use std::sync::{Arc, Mutex as StdMutex};

use futures::future::BoxFuture;
use tokio::sync::Mutex;

use gangway::trust::{JsonFileBackend, MemoryBackend};
use gangway::verify::{self, HostKeyPrompt, VerifyBridge, VerifyDecision};
use gangway::{TrustStore, fingerprint};

/// Fake ed25519 wire blob: length-prefixed algorithm name plus key material
fn wire_key(seed: u8) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(11u32).to_be_bytes());
    out.extend_from_slice(b"ssh-ed25519");
    out.extend_from_slice(&[seed; 32]);
    out
}

struct ScriptedBridge {
    decisions: StdMutex<Vec<VerifyDecision>>,
    prompts: Arc<StdMutex<Vec<HostKeyPrompt>>>,
}

impl ScriptedBridge {
    fn new(decisions: Vec<VerifyDecision>) -> Self {
        Self {
            decisions: StdMutex::new(decisions),
            prompts: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    fn prompts(&self) -> Vec<HostKeyPrompt> {
        self.prompts.lock().unwrap().clone()
    }
}

impl VerifyBridge for ScriptedBridge {
    fn confirm(&self, prompt: HostKeyPrompt) -> BoxFuture<'static, VerifyDecision> {
        self.prompts.lock().unwrap().push(prompt);
        let decision = self
            .decisions
            .lock()
            .unwrap()
            .pop()
            .unwrap_or(VerifyDecision::Reject);
        Box::pin(async move { decision })
    }
}

fn memory_trust() -> Mutex<TrustStore> {
    Mutex::new(TrustStore::load(Box::new(MemoryBackend::new())).expect("load"))
}

#[tokio::test]
async fn first_contact_then_silent_reconnect() {
    let trust = memory_trust();
    let key = wire_key(1);

    // First contact prompts and the accept is remembered
    let bridge = ScriptedBridge::new(vec![VerifyDecision::Accept]);
    assert!(
        verify::verify_host_key(&trust, Some(&bridge), "alpha.example", 22, &key)
            .await
            .expect("first contact")
    );
    assert_eq!(bridge.prompts().len(), 1);

    // Reconnect with the same key: no prompt at all
    let reconnect_bridge = ScriptedBridge::new(vec![]);
    assert!(
        verify::verify_host_key(&trust, Some(&reconnect_bridge), "alpha.example", 22, &key)
            .await
            .expect("reconnect")
    );
    assert!(reconnect_bridge.prompts().is_empty());
}

#[tokio::test]
async fn changed_key_round_trip() {
    let trust = memory_trust();
    let old_key = wire_key(1);
    let new_key = wire_key(2);

    let seed = ScriptedBridge::new(vec![VerifyDecision::Accept]);
    verify::verify_host_key(&trust, Some(&seed), "beta.example", 22, &old_key)
        .await
        .expect("seed");

    // Reject the change first; the old record must survive
    let reject = ScriptedBridge::new(vec![VerifyDecision::Reject]);
    assert!(
        !verify::verify_host_key(&trust, Some(&reject), "beta.example", 22, &new_key)
            .await
            .expect("reject changed")
    );
    let prompt = &reject.prompts()[0];
    assert!(prompt.is_changed);
    assert_eq!(
        prompt.old_fingerprint.as_deref(),
        Some(fingerprint::sha256_fingerprint(&old_key).as_str())
    );
    assert_eq!(
        trust.lock().await.get("beta.example", 22).unwrap().fingerprint,
        fingerprint::sha256_fingerprint(&old_key)
    );

    // Explicitly confirm the change; the record is replaced, not duplicated
    let confirm = ScriptedBridge::new(vec![VerifyDecision::AcceptChanged]);
    assert!(
        verify::verify_host_key(&trust, Some(&confirm), "beta.example", 22, &new_key)
            .await
            .expect("accept changed")
    );
    let store = trust.lock().await;
    assert_eq!(store.len(), 1);
    assert_eq!(
        store.get("beta.example", 22).unwrap().fingerprint,
        fingerprint::sha256_fingerprint(&new_key)
    );
}

#[tokio::test]
async fn same_host_different_ports_are_distinct() {
    let trust = memory_trust();
    let key_a = wire_key(1);
    let key_b = wire_key(2);

    let bridge = ScriptedBridge::new(vec![VerifyDecision::Accept, VerifyDecision::Accept]);
    assert!(
        verify::verify_host_key(&trust, Some(&bridge), "gamma.example", 22, &key_a)
            .await
            .expect("port 22")
    );
    assert!(
        verify::verify_host_key(&trust, Some(&bridge), "gamma.example", 2222, &key_b)
            .await
            .expect("port 2222")
    );

    // Each port keeps its own key without one being flagged as changed
    assert_eq!(trust.lock().await.len(), 2);
    assert!(bridge.prompts().iter().all(|p| !p.is_changed));
}

#[tokio::test]
async fn trust_survives_a_reload_from_disk() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("trusted_hosts.json");
    let key = wire_key(7);

    {
        let trust = Mutex::new(
            TrustStore::load(Box::new(JsonFileBackend::new(path.clone()))).expect("open"),
        );
        let bridge = ScriptedBridge::new(vec![VerifyDecision::Accept]);
        assert!(
            verify::verify_host_key(&trust, Some(&bridge), "delta.example", 22, &key)
                .await
                .expect("first contact")
        );
    }

    // Fresh store from the same file: the host is already trusted
    let reloaded = Mutex::new(
        TrustStore::load(Box::new(JsonFileBackend::new(path))).expect("reopen"),
    );
    let accepted = verify::verify_host_key(&reloaded, None, "delta.example", 22, &key)
        .await
        .expect("reload verify");
    assert!(accepted, "persisted trust must survive a process restart");
}

#[tokio::test]
async fn corrupt_store_fails_closed_on_open() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("trusted_hosts.json");
    std::fs::write(&path, "{not valid json").expect("write");

    let result = TrustStore::load(Box::new(JsonFileBackend::new(path)));
    assert!(result.is_err(), "corrupt trust data must not open silently");
}
