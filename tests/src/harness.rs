//! # Test Harness
//!
//! Builds dispatchers wired over [`ChannelTransport`]s and raw peers that
//! speak hand-written frames, for driving a node from the outside.

use async_trait::async_trait;
use ocpp_bus::{DispatchEvent, Subscription};
use ocpp_crypto::{CryptoError, NoSignatures, SignaturePolicy, SignaturePolicyError};
use ocpp_dispatch::channel::{self, DEFAULT_INBOX_CAPACITY};
use ocpp_dispatch::{
    ChannelTransport, Dispatcher, DispatcherConfig, ForwardingPolicy, HandlerContext,
    HandlerSelection, Inbox, OutboundFrame, SigningFailurePolicy, Transport,
};
use ocpp_types::messages::{
    CertificateHashData, GenericStatus, GetCrlRequest, GetCrlResponse, HashAlgorithm,
};
use ocpp_types::{
    ConnectionId, MessageDirection, NetworkingMode, NetworkingNodeId, OcppFrame, Request,
    Signature, DEFAULT_MAX_FRAME_SIZE,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// How long helpers wait for something that should happen.
pub const PATIENCE: Duration = Duration::from_secs(2);

// =============================================================================
// IDENTIFIERS AND PAYLOADS
// =============================================================================

pub fn nid(id: &str) -> NetworkingNodeId {
    NetworkingNodeId::parse(id).expect("valid node id")
}

/// A GetCRL request for a fixed test certificate.
pub fn get_crl(request_id: i64) -> GetCrlRequest {
    GetCrlRequest {
        request_id,
        certificate_hash_data: CertificateHashData {
            hash_algorithm: HashAlgorithm::SHA256,
            issuer_name_hash: "7a9f0e4c1c2b".to_string(),
            issuer_key_hash: "3f5d8e2a7b61".to_string(),
            serial_number: "01AF44".to_string(),
        },
    }
}

pub fn crl_response(status: GenericStatus) -> GetCrlResponse {
    GetCrlResponse {
        status,
        status_info: None,
    }
}

/// Register a GetCRL handler that answers `status` and counts its calls.
pub fn answer_get_crl(dispatcher: &Dispatcher, status: GenericStatus) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    dispatcher
        .on::<GetCrlRequest>(
            move |_ctx: HandlerContext, _request: Arc<Request<GetCrlRequest>>| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    anyhow::Ok(Some(crl_response(status)))
                }
            },
        )
        .expect("GetCRL registers");
    calls
}

// =============================================================================
// NODES
// =============================================================================

/// A dispatcher serving its channel inbox.
pub struct TestNode {
    pub dispatcher: Dispatcher,
    pub transport: Arc<ChannelTransport>,
    serve: JoinHandle<()>,
}

impl TestNode {
    pub fn id(&self) -> &NetworkingNodeId {
        self.dispatcher.node_id()
    }

    /// Connect two nodes directly.
    pub fn link(&self, other: &TestNode) -> ConnectionId {
        ChannelTransport::link(&self.transport, &other.transport)
    }

    pub fn link_raw(&self, peer: &RawPeer) -> ConnectionId {
        ChannelTransport::link(&self.transport, &peer.transport)
    }

    pub fn subscribe_all(&self) -> Subscription {
        self.dispatcher
            .events()
            .subscribe(ocpp_bus::EventFilter::all())
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.dispatcher.shutdown();
        self.serve.abort();
    }
}

/// Builder for a [`TestNode`].
pub struct NodeBuilder {
    config: DispatcherConfig,
    mode: NetworkingMode,
    policy: Option<Arc<dyn SignaturePolicy>>,
    forwarding: Option<Arc<dyn ForwardingPolicy>>,
}

/// Start building a node called `id`, standard mode, no signatures.
pub fn node(id: &str) -> NodeBuilder {
    let mut config = DispatcherConfig::for_node(id);
    config.default_request_timeout_ms = 2_000;
    NodeBuilder {
        config,
        mode: NetworkingMode::Standard,
        policy: None,
        forwarding: None,
    }
}

impl NodeBuilder {
    /// Speak overlay-network frames on every connection.
    pub fn overlay(mut self) -> Self {
        self.mode = NetworkingMode::OverlayNetwork;
        self.config.default_networking_mode = NetworkingMode::OverlayNetwork;
        self
    }

    pub fn relay(mut self) -> Self {
        self.config.relay_enabled = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.default_request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn selection(mut self, selection: HandlerSelection) -> Self {
        self.config.handler_selection = selection;
        self
    }

    pub fn signing_failure(mut self, policy: SigningFailurePolicy) -> Self {
        self.config.signing_failure = policy;
        self
    }

    pub fn policy(mut self, policy: impl SignaturePolicy + 'static) -> Self {
        self.policy = Some(Arc::new(policy));
        self
    }

    pub fn forwarding(mut self, policy: impl ForwardingPolicy + 'static) -> Self {
        self.forwarding = Some(Arc::new(policy));
        self
    }

    /// Build the dispatcher and start serving its inbox. Needs a runtime.
    pub fn spawn(self) -> TestNode {
        let node_id = nid(&self.config.node_id);
        let (transport, inbox) = ChannelTransport::new(node_id, DEFAULT_INBOX_CAPACITY);

        let mut builder = Dispatcher::builder(self.config).transport(transport.clone());
        if let Some(policy) = self.policy {
            builder = builder.signature_policy(policy);
        }
        if let Some(forwarding) = self.forwarding {
            builder = builder.forwarding_policy(forwarding);
        }
        let dispatcher = builder.build().expect("dispatcher builds");
        let serve = channel::serve(inbox, dispatcher.clone(), self.mode);

        TestNode {
            dispatcher,
            transport,
            serve,
        }
    }
}

// =============================================================================
// RAW PEERS
// =============================================================================

/// A node without a dispatcher: sends and reads frames by hand.
pub struct RawPeer {
    pub transport: Arc<ChannelTransport>,
    inbox: Inbox,
    mode: NetworkingMode,
}

impl RawPeer {
    pub fn new(id: &str, mode: NetworkingMode) -> Self {
        let (transport, inbox) = ChannelTransport::new(nid(id), DEFAULT_INBOX_CAPACITY);
        Self {
            transport,
            inbox,
            mode,
        }
    }

    pub async fn send(&self, to: &NetworkingNodeId, frame: OcppFrame) {
        self.transport
            .send(OutboundFrame {
                connection: None,
                next_hop: to.clone(),
                frame,
            })
            .await
            .expect("raw peer send");
    }

    /// Next frame delivered to this peer, parsed.
    pub async fn next_frame(&mut self) -> OcppFrame {
        let message = tokio::time::timeout(PATIENCE, self.inbox.recv())
            .await
            .expect("frame within patience")
            .expect("inbox open");
        OcppFrame::parse(&message.text, self.mode, DEFAULT_MAX_FRAME_SIZE)
            .expect("peer sent a well-formed frame")
    }

    /// Next frame as raw text.
    pub async fn next_text(&mut self) -> String {
        tokio::time::timeout(PATIENCE, self.inbox.recv())
            .await
            .expect("frame within patience")
            .expect("inbox open")
            .text
    }

    /// True when nothing arrives for `window`.
    pub async fn stays_silent(&mut self, window: Duration) -> bool {
        tokio::time::timeout(window, self.inbox.recv()).await.is_err()
    }
}

// =============================================================================
// POLICIES
// =============================================================================

/// Wraps a policy and counts verifications.
pub struct CountingPolicy {
    inner: Arc<dyn SignaturePolicy>,
    pub verifications: Arc<AtomicUsize>,
}

impl CountingPolicy {
    pub fn new(inner: impl SignaturePolicy + 'static) -> Self {
        Self {
            inner: Arc::new(inner),
            verifications: tally(),
        }
    }

    pub fn permissive() -> Self {
        Self::new(NoSignatures)
    }
}

#[async_trait]
impl SignaturePolicy for CountingPolicy {
    async fn verify(
        &self,
        direction: MessageDirection,
        action: &str,
        canonical: &[u8],
        signatures: &[Signature],
    ) -> Result<(), SignaturePolicyError> {
        self.verifications.fetch_add(1, Ordering::SeqCst);
        self.inner
            .verify(direction, action, canonical, signatures)
            .await
    }

    async fn sign(
        &self,
        direction: MessageDirection,
        action: &str,
        canonical: &[u8],
    ) -> Result<Vec<Signature>, SignaturePolicyError> {
        self.inner.sign(direction, action, canonical).await
    }
}

/// Accepts everything but cannot sign messages going in `direction`.
pub struct BrokenSigner {
    pub direction: MessageDirection,
}

#[async_trait]
impl SignaturePolicy for BrokenSigner {
    async fn verify(
        &self,
        _direction: MessageDirection,
        _action: &str,
        _canonical: &[u8],
        _signatures: &[Signature],
    ) -> Result<(), SignaturePolicyError> {
        Ok(())
    }

    async fn sign(
        &self,
        direction: MessageDirection,
        action: &str,
        _canonical: &[u8],
    ) -> Result<Vec<Signature>, SignaturePolicyError> {
        if direction != self.direction {
            return Ok(Vec::new());
        }
        Err(SignaturePolicyError::SigningFailed {
            action: action.to_string(),
            direction,
            key_id: "hsm-slot-1".to_string(),
            reason: CryptoError::InvalidPublicKey,
        })
    }
}

// =============================================================================
// POLLING
// =============================================================================

/// Poll `condition` until it holds or [`PATIENCE`] runs out.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + PATIENCE;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Count an observer's invocations.
pub fn tally() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

pub fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

/// Everything already published on a subscription.
pub fn drain(subscription: &mut Subscription) -> Vec<DispatchEvent> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = subscription.try_recv() {
        events.push(event);
    }
    events
}
