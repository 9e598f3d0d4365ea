//! # Error Envelopes
//!
//! CALLERROR and CALLRESULTERROR handling, malformed frames and responses,
//! and requests nobody answers. A raw peer plays the other side so the
//! frames can be anything.

#[cfg(test)]
mod tests {
    use crate::harness::*;
    use ocpp_bus::DispatchEvent;
    use ocpp_dispatch::{
        InboundFrame, RequestErrorReceivedEvent, ResponseErrorReceivedEvent,
    };
    use ocpp_types::messages::{GenericStatus, GetCrlRequest, GetCrlResponse};
    use ocpp_types::{
        CallFrame, CallResultFrame, ErrorCode, NetworkingMode, OcppErrorMessage, OcppFrame,
        RequestId, ResultCode, SourceRouting,
    };
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    const STANDARD: NetworkingMode = NetworkingMode::Standard;

    fn get_crl_call(request_id: &str) -> OcppFrame {
        OcppFrame::Call(CallFrame {
            routing: None,
            request_id: RequestId::parse(request_id).unwrap(),
            action: "GetCRL".to_string(),
            payload: serde_json::to_value(get_crl(11)).unwrap(),
        })
    }

    async fn expect_call(peer: &mut RawPeer) -> CallFrame {
        match peer.next_frame().await {
            OcppFrame::Call(call) => call,
            other => panic!("expected a CALL, got {other:?}"),
        }
    }

    async fn expect_error(peer: &mut RawPeer) -> OcppErrorMessage {
        match peer.next_frame().await {
            OcppFrame::CallError(error) => error,
            other => panic!("expected a CALLERROR, got {other:?}"),
        }
    }

    // =========================================================================
    // CALLERROR
    // =========================================================================

    #[tokio::test]
    async fn test_callerror_becomes_request_error_response() {
        let csms = node("CSMS").spawn();
        let mut station = RawPeer::new("CS01", STANDARD);
        csms.link_raw(&station);

        let errors = tally();
        let counter = Arc::clone(&errors);
        csms.dispatcher
            .register::<GetCrlRequest>()
            .unwrap()
            .request_error_received
            .subscribe(
                move |event: Arc<RequestErrorReceivedEvent<GetCrlRequest>>| {
                    let counter = Arc::clone(&counter);
                    async move {
                        assert_eq!(event.error.error_code, ErrorCode::NotSupported);
                        counter.fetch_add(1, Ordering::SeqCst);
                        anyhow::Ok(())
                    }
                },
            );

        let dispatcher = csms.dispatcher.clone();
        let outcome = tokio::spawn(async move {
            let request = dispatcher.new_request(SourceRouting::to(nid("CS01")), get_crl(1));
            dispatcher.send_request(request).await
        });

        let call = expect_call(&mut station).await;
        assert_eq!(call.action, "GetCRL");
        station
            .send(
                &nid("CSMS"),
                OcppFrame::CallError(OcppErrorMessage::new(
                    call.request_id.clone(),
                    ErrorCode::NotSupported,
                    "CRL lookups are not supported",
                )),
            )
            .await;

        let response = outcome.await.unwrap();
        assert_eq!(response.request_id, call.request_id);
        assert_eq!(response.result.code, ResultCode::RequestError);
        assert_eq!(response.result.error_code, Some(ErrorCode::NotSupported));
        assert_eq!(
            response.result.description.as_deref(),
            Some("CRL lookups are not supported")
        );
        assert_eq!(response.payload.status, GenericStatus::Rejected);
        assert_eq!(count(&errors), 1);
    }

    #[tokio::test]
    async fn test_unknown_action_is_not_implemented() {
        let csms = node("CSMS").spawn();
        let station = node("CS01").spawn();
        csms.link(&station);

        let response = csms
            .dispatcher
            .send_request(
                csms.dispatcher
                    .new_request(SourceRouting::to(nid("CS01")), get_crl(2)),
            )
            .await;

        assert_eq!(response.result.code, ResultCode::RequestError);
        assert_eq!(response.result.error_code, Some(ErrorCode::NotImplemented));
    }

    // =========================================================================
    // MALFORMED RESPONSES
    // =========================================================================

    #[tokio::test]
    async fn test_malformed_response_is_formation_violation() {
        let csms = node("CSMS").spawn();
        let mut station = RawPeer::new("CS01", STANDARD);
        csms.link_raw(&station);

        let dispatcher = csms.dispatcher.clone();
        let outcome = tokio::spawn(async move {
            let request = dispatcher.new_request(SourceRouting::to(nid("CS01")), get_crl(3));
            dispatcher.send_request(request).await
        });

        let call = expect_call(&mut station).await;
        station
            .send(
                &nid("CSMS"),
                OcppFrame::CallResult(CallResultFrame {
                    routing: None,
                    request_id: call.request_id.clone(),
                    payload: json!({ "status": "Maybe" }),
                }),
            )
            .await;

        let response = outcome.await.unwrap();
        assert_eq!(response.result.code, ResultCode::FormationViolation);
        assert_eq!(response.result.details, Some(json!({ "status": "Maybe" })));

        // The peer is told its response was unusable.
        match station.next_frame().await {
            OcppFrame::CallResultError(error) => {
                assert_eq!(error.request_id, call.request_id);
                assert_eq!(error.error_code, ErrorCode::FormationViolation);
            }
            other => panic!("expected a CALLRESULTERROR, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unparseable_text_gets_format_violation() {
        let station = node("CS01").spawn();
        let handled = answer_get_crl(&station.dispatcher, GenericStatus::Accepted);
        let mut csms = RawPeer::new("CSMS", STANDARD);
        let connection = station.link_raw(&csms);

        station
            .dispatcher
            .receive(InboundFrame::new(
                connection,
                nid("CSMS"),
                STANDARD,
                "[2, \"R1\", \"GetCRL\", {",
            ))
            .await;

        let error = expect_error(&mut csms).await;
        assert_eq!(error.error_code, ErrorCode::FormatViolation);
        assert_eq!(error.request_id, RequestId::unknown());
        assert_eq!(count(&handled), 0);
    }

    #[tokio::test]
    async fn test_bad_payload_never_reaches_verification_or_handlers() {
        let policy = CountingPolicy::permissive();
        let verifications = Arc::clone(&policy.verifications);
        let station = node("CS01").policy(policy).spawn();
        let handled = answer_get_crl(&station.dispatcher, GenericStatus::Accepted);
        let mut csms = RawPeer::new("CSMS", STANDARD);
        station.link_raw(&csms);

        csms.send(
            &nid("CS01"),
            OcppFrame::Call(CallFrame {
                routing: None,
                request_id: RequestId::parse("R5").unwrap(),
                action: "GetCRL".to_string(),
                payload: json!({ "requestId": "not-a-number" }),
            }),
        )
        .await;

        let error = expect_error(&mut csms).await;
        assert_eq!(error.request_id.as_str(), "R5");
        assert_eq!(error.error_code, ErrorCode::FormationViolation);
        assert_eq!(count(&handled), 0);
        assert_eq!(count(&verifications), 0);
    }

    #[tokio::test]
    async fn test_errors_are_never_answered() {
        let station = node("CS01").spawn();
        let mut csms = RawPeer::new("CSMS", STANDARD);
        let connection = station.link_raw(&csms);

        station
            .dispatcher
            .receive(InboundFrame::new(
                connection,
                nid("CSMS"),
                STANDARD,
                "[4, \"R1\", \"GenericError\"]",
            ))
            .await;

        assert!(csms.stays_silent(Duration::from_millis(100)).await);
    }

    // =========================================================================
    // CALLRESULTERROR
    // =========================================================================

    #[tokio::test]
    async fn test_callresulterror_correlates_with_sent_response() {
        let station = node("CS01").spawn();
        answer_get_crl(&station.dispatcher, GenericStatus::Accepted);
        let mut csms = RawPeer::new("CSMS", STANDARD);
        station.link_raw(&csms);
        let mut events = station.subscribe_all();

        let observed = tally();
        let counter = Arc::clone(&observed);
        station
            .dispatcher
            .register::<GetCrlRequest>()
            .unwrap()
            .response_error_received
            .subscribe(move |event: Arc<ResponseErrorReceivedEvent>| {
                let counter = Arc::clone(&counter);
                async move {
                    assert_eq!(event.error.error_code, ErrorCode::PropertyConstraintViolation);
                    let original = event.original_response.clone().expect("still cached");
                    let parsed: GetCrlResponse = serde_json::from_value(original)?;
                    assert_eq!(parsed.status, GenericStatus::Accepted);
                    assert!(event.runtime.is_some());
                    counter.fetch_add(1, Ordering::SeqCst);
                    anyhow::Ok(())
                }
            });

        csms.send(&nid("CS01"), get_crl_call("R9")).await;
        match csms.next_frame().await {
            OcppFrame::CallResult(result) => assert_eq!(result.request_id.as_str(), "R9"),
            other => panic!("expected a CALLRESULT, got {other:?}"),
        }
        assert!(eventually(|| station.dispatcher.sent_response_count() == 1).await);

        let rejection = || {
            OcppFrame::CallResultError(OcppErrorMessage::new(
                RequestId::parse("R9").unwrap(),
                ErrorCode::PropertyConstraintViolation,
                "status not allowed here",
            ))
        };
        csms.send(&nid("CS01"), rejection()).await;
        assert!(eventually(|| count(&observed) == 1).await);
        assert_eq!(station.dispatcher.sent_response_count(), 0);

        // A second rejection finds nothing cached.
        csms.send(&nid("CS01"), rejection()).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let errors: Vec<_> = drain(&mut events)
            .into_iter()
            .filter_map(|event| match event {
                DispatchEvent::ResponseErrorReceived {
                    action, runtime_ms, ..
                } => Some((action, runtime_ms.is_some())),
                _ => None,
            })
            .collect();
        assert_eq!(
            errors,
            vec![(Some("GetCRL".to_string()), true), (None, false)]
        );
        assert_eq!(count(&observed), 1);
        assert!(csms.stays_silent(Duration::from_millis(50)).await);
    }

    // =========================================================================
    // TIMEOUTS AND STRAY REPLIES
    // =========================================================================

    #[tokio::test]
    async fn test_unanswered_request_times_out() {
        let csms = node("CSMS").timeout(Duration::from_millis(100)).spawn();
        let mut station = RawPeer::new("CS01", STANDARD);
        csms.link_raw(&station);
        let mut events = csms.subscribe_all();

        let dispatcher = csms.dispatcher.clone();
        let outcome = tokio::spawn(async move {
            let request = dispatcher.new_request(SourceRouting::to(nid("CS01")), get_crl(4));
            dispatcher.send_request(request).await
        });
        let call = expect_call(&mut station).await;

        let response = outcome.await.unwrap();
        assert_eq!(response.result.code, ResultCode::Timeout);
        assert_eq!(csms.dispatcher.pending_count(), 0);

        // A late answer is unmatched and dropped without a reply.
        station
            .send(
                &nid("CSMS"),
                OcppFrame::CallResult(CallResultFrame {
                    routing: None,
                    request_id: call.request_id.clone(),
                    payload: json!({ "status": "Accepted" }),
                }),
            )
            .await;
        assert!(station.stays_silent(Duration::from_millis(100)).await);
        assert!(drain(&mut events).iter().any(|event| matches!(
            event,
            DispatchEvent::FrameRejected {
                error_code: ErrorCode::GenericError,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_unreachable_destination_is_exception() {
        let csms = node("CSMS").spawn();

        let response = csms
            .dispatcher
            .send_request(
                csms.dispatcher
                    .new_request(SourceRouting::to(nid("CS99")), get_crl(5)),
            )
            .await;

        assert_eq!(response.result.code, ResultCode::ExceptionOccurred);
        assert_eq!(csms.dispatcher.pending_count(), 0);
    }
}
