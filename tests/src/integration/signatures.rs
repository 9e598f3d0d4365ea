//! # Signed Exchanges
//!
//! Request and response signatures checked end to end, and what each
//! signing failure policy puts on the wire.

#[cfg(test)]
mod tests {
    use crate::harness::*;
    use ocpp_bus::{DispatchEvent, EventFilter, EventTopic};
    use ocpp_crypto::{
        Ed25519KeyPair, InMemoryKeyStore, MessageDirection, PolicyEntry, RuleBasedPolicy,
        SigningKey, VerificationRule,
    };
    use ocpp_dispatch::{HandlerContext, RequestReceivedEvent, SigningFailurePolicy};
    use ocpp_types::messages::{GenericStatus, GetCrlRequest};
    use ocpp_types::{
        NetworkingMode, OcppFrame, Request, ResultCode, Signature, SigningMethod, SourceRouting,
    };
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    const CSMS_KEY_ID: &str = "csms-2026";

    fn csms_key() -> SigningKey {
        SigningKey::ed25519_named(CSMS_KEY_ID, Ed25519KeyPair::from_seed([7u8; 32]))
    }

    fn shared_key(secret: &[u8]) -> SigningKey {
        SigningKey::hmac("station-shared", secret.to_vec())
    }

    /// CSMS side: signs GetCRL requests.
    fn signing_csms() -> RuleBasedPolicy {
        RuleBasedPolicy::new(Arc::new(InMemoryKeyStore::new())).with_entry(
            PolicyEntry::action(MessageDirection::Request, "GetCRL").with_signer(csms_key()),
        )
    }

    /// Station side: GetCRL requests must carry a valid CSMS signature.
    fn verifying_station() -> RuleBasedPolicy {
        let keys = InMemoryKeyStore::new();
        keys.trust(&csms_key());
        RuleBasedPolicy::new(Arc::new(keys)).with_entry(
            PolicyEntry::action(MessageDirection::Request, "GetCRL")
                .with_rule(VerificationRule::RequireOne),
        )
    }

    fn to_station() -> SourceRouting {
        SourceRouting::to(nid("CS01"))
    }

    fn count_received(station: &TestNode) -> Arc<std::sync::atomic::AtomicUsize> {
        let received = tally();
        let counter = Arc::clone(&received);
        station
            .dispatcher
            .register::<GetCrlRequest>()
            .unwrap()
            .request_received
            .subscribe(move |_event: Arc<RequestReceivedEvent<GetCrlRequest>>| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    anyhow::Ok(())
                }
            });
        received
    }

    // =========================================================================
    // REQUEST SIGNATURES
    // =========================================================================

    #[tokio::test]
    async fn test_signed_request_is_verified_and_handled() {
        let csms = node("CSMS").policy(signing_csms()).spawn();
        let station = node("CS01").policy(verifying_station()).spawn();
        csms.link(&station);

        let signers = tally();
        let counter = Arc::clone(&signers);
        station
            .dispatcher
            .on::<GetCrlRequest>(
                move |_ctx: HandlerContext, request: Arc<Request<GetCrlRequest>>| {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(request.signatures.len(), Ordering::SeqCst);
                        anyhow::Ok(Some(crl_response(GenericStatus::Accepted)))
                    }
                },
            )
            .unwrap();

        let response = csms
            .dispatcher
            .send_request(csms.dispatcher.new_request(to_station(), get_crl(1)))
            .await;

        assert_eq!(response.result.code, ResultCode::Ok);
        assert_eq!(response.payload.status, GenericStatus::Accepted);
        assert_eq!(count(&signers), 1);
    }

    #[tokio::test]
    async fn test_forged_signature_is_rejected_before_handlers() {
        let csms = node("CSMS").spawn();
        let station = node("CS01").policy(verifying_station()).spawn();
        csms.link(&station);
        let handled = answer_get_crl(&station.dispatcher, GenericStatus::Accepted);
        let received = count_received(&station);
        let mut security = station
            .dispatcher
            .events()
            .subscribe(EventFilter::topics(vec![EventTopic::Security]));

        let forged = Signature::new(CSMS_KEY_ID, "00".repeat(64), SigningMethod::Ed25519);
        let request = csms
            .dispatcher
            .new_request(to_station(), get_crl(2))
            .with_signatures(vec![forged]);
        let response = csms.dispatcher.send_request(request).await;

        assert_eq!(response.payload.status, GenericStatus::Rejected);
        assert_eq!(
            response.payload.status_info.map(|info| info.reason_code),
            Some("signature_error".to_string())
        );
        assert_eq!(count(&handled), 0);
        assert_eq!(count(&received), 0);
        assert!(drain(&mut security).iter().any(|event| matches!(
            event,
            DispatchEvent::SignatureRejected {
                direction: MessageDirection::Request,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_unsigned_request_fails_require_one() {
        let csms = node("CSMS").spawn();
        let station = node("CS01").policy(verifying_station()).spawn();
        csms.link(&station);
        let handled = answer_get_crl(&station.dispatcher, GenericStatus::Accepted);

        let response = csms
            .dispatcher
            .send_request(csms.dispatcher.new_request(to_station(), get_crl(3)))
            .await;

        assert_eq!(response.payload.status, GenericStatus::Rejected);
        assert_eq!(count(&handled), 0);
    }

    #[tokio::test]
    async fn test_rules_are_per_action() {
        // Heartbeat matches no entry, so it is neither signed nor checked.
        let csms = node("CSMS").spawn();
        let station = node("CS01").policy(verifying_station()).spawn();
        csms.link(&station);
        station
            .dispatcher
            .on::<ocpp_types::messages::HeartbeatRequest>(
                |_ctx: HandlerContext,
                 _request: Arc<Request<ocpp_types::messages::HeartbeatRequest>>| async move {
                    anyhow::Ok(Some(ocpp_types::messages::HeartbeatResponse {
                        current_time: chrono::Utc::now(),
                    }))
                },
            )
            .unwrap();

        let response = csms
            .dispatcher
            .send_request(
                csms.dispatcher
                    .new_request(to_station(), ocpp_types::messages::HeartbeatRequest {}),
            )
            .await;

        assert_eq!(response.result.code, ResultCode::Ok);
    }

    // =========================================================================
    // RESPONSE SIGNATURES
    // =========================================================================

    fn response_signing_station(secret: &[u8]) -> RuleBasedPolicy {
        RuleBasedPolicy::new(Arc::new(InMemoryKeyStore::new())).with_entry(
            PolicyEntry::action(MessageDirection::Response, "GetCRL")
                .with_signer(shared_key(secret)),
        )
    }

    fn response_verifying_csms(secret: &[u8]) -> RuleBasedPolicy {
        let keys = InMemoryKeyStore::new();
        keys.trust(&shared_key(secret));
        RuleBasedPolicy::new(Arc::new(keys)).with_entry(
            PolicyEntry::action(MessageDirection::Response, "GetCRL")
                .with_rule(VerificationRule::RequireAll),
        )
    }

    #[tokio::test]
    async fn test_signed_response_verifies_at_requester() {
        let csms = node("CSMS")
            .policy(response_verifying_csms(b"station-secret"))
            .spawn();
        let station = node("CS01")
            .policy(response_signing_station(b"station-secret"))
            .spawn();
        csms.link(&station);
        answer_get_crl(&station.dispatcher, GenericStatus::Accepted);

        let response = csms
            .dispatcher
            .send_request(csms.dispatcher.new_request(to_station(), get_crl(4)))
            .await;

        assert_eq!(response.result.code, ResultCode::Ok);
        assert_eq!(response.signatures.len(), 1);
        assert_eq!(response.signatures[0].signing_method, SigningMethod::HmacSha256);
    }

    #[tokio::test]
    async fn test_response_signed_with_wrong_secret_is_signature_error() {
        let csms = node("CSMS")
            .policy(response_verifying_csms(b"expected-secret"))
            .spawn();
        let station = node("CS01")
            .policy(response_signing_station(b"other-secret"))
            .spawn();
        csms.link(&station);
        answer_get_crl(&station.dispatcher, GenericStatus::Accepted);
        let mut security = csms
            .dispatcher
            .events()
            .subscribe(EventFilter::topics(vec![EventTopic::Security]));

        let response = csms
            .dispatcher
            .send_request(csms.dispatcher.new_request(to_station(), get_crl(5)))
            .await;

        assert_eq!(response.result.code, ResultCode::SignatureError);
        assert_eq!(response.payload.status, GenericStatus::Rejected);
        assert!(drain(&mut security).iter().any(|event| matches!(
            event,
            DispatchEvent::SignatureRejected {
                direction: MessageDirection::Response,
                ..
            }
        )));
    }

    // =========================================================================
    // SIGNING FAILURES
    // =========================================================================

    async fn exchange_with_broken_station(policy: SigningFailurePolicy) -> ResultsSeen {
        let csms = node("CSMS").timeout(Duration::from_millis(150)).spawn();
        let station = node("CS01")
            .policy(BrokenSigner {
                direction: MessageDirection::Response,
            })
            .signing_failure(policy)
            .spawn();
        csms.link(&station);
        let handled = answer_get_crl(&station.dispatcher, GenericStatus::Accepted);
        let mut security = station
            .dispatcher
            .events()
            .subscribe(EventFilter::topics(vec![EventTopic::Security]));

        let response = csms
            .dispatcher
            .send_request(csms.dispatcher.new_request(to_station(), get_crl(6)))
            .await;
        let signing_failures = drain(&mut security)
            .iter()
            .filter(|event| matches!(event, DispatchEvent::SigningFailed { .. }))
            .count();

        ResultsSeen {
            code: response.result.code,
            status: response.payload.status,
            handled: count(&handled),
            signing_failures,
        }
    }

    struct ResultsSeen {
        code: ResultCode,
        status: GenericStatus,
        handled: usize,
        signing_failures: usize,
    }

    #[tokio::test]
    async fn test_response_signing_failure_substitutes_signature_error() {
        let seen = exchange_with_broken_station(SigningFailurePolicy::SubstituteSignatureError).await;
        assert_eq!(seen.code, ResultCode::Ok);
        assert_eq!(seen.status, GenericStatus::Rejected);
        assert_eq!(seen.handled, 1);
        assert_eq!(seen.signing_failures, 1);
    }

    #[tokio::test]
    async fn test_response_signing_failure_can_emit_unsigned() {
        let seen = exchange_with_broken_station(SigningFailurePolicy::EmitUnsigned).await;
        assert_eq!(seen.code, ResultCode::Ok);
        assert_eq!(seen.status, GenericStatus::Accepted);
        assert_eq!(seen.signing_failures, 1);
    }

    #[tokio::test]
    async fn test_response_signing_failure_can_abort() {
        let seen = exchange_with_broken_station(SigningFailurePolicy::Abort).await;
        assert_eq!(seen.code, ResultCode::Timeout);
        assert_eq!(seen.handled, 1);
        assert_eq!(seen.signing_failures, 1);
    }

    #[tokio::test]
    async fn test_request_signing_failure_sends_nothing() {
        for policy in [
            SigningFailurePolicy::SubstituteSignatureError,
            SigningFailurePolicy::Abort,
        ] {
            let csms = node("CSMS")
                .policy(BrokenSigner {
                    direction: MessageDirection::Request,
                })
                .signing_failure(policy)
                .spawn();
            let mut station = RawPeer::new("CS01", NetworkingMode::Standard);
            csms.link_raw(&station);

            let response = csms
                .dispatcher
                .send_request(csms.dispatcher.new_request(to_station(), get_crl(7)))
                .await;

            assert_eq!(response.result.code, ResultCode::SignatureError);
            assert_eq!(csms.dispatcher.pending_count(), 0);
            assert!(station.stays_silent(Duration::from_millis(50)).await);
        }
    }

    #[tokio::test]
    async fn test_request_signing_failure_can_send_unsigned() {
        let csms = node("CSMS")
            .policy(BrokenSigner {
                direction: MessageDirection::Request,
            })
            .signing_failure(SigningFailurePolicy::EmitUnsigned)
            .timeout(Duration::from_millis(100))
            .spawn();
        let mut station = RawPeer::new("CS01", NetworkingMode::Standard);
        csms.link_raw(&station);

        let dispatcher = csms.dispatcher.clone();
        let outcome = tokio::spawn(async move {
            let request = dispatcher.new_request(SourceRouting::to(nid("CS01")), get_crl(8));
            dispatcher.send_request(request).await
        });

        match station.next_frame().await {
            OcppFrame::Call(call) => {
                assert_eq!(call.action, "GetCRL");
                assert!(call.payload.get("signatures").is_none());
            }
            other => panic!("expected a CALL, got {other:?}"),
        }
        assert_eq!(outcome.await.unwrap().result.code, ResultCode::Timeout);
    }
}
