//! # Overlay Relay
//!
//! Station CS01 reaches the CSMS through local controller LC1:
//!
//! ```text
//! CS01 ──── LC1 ──── CSMS
//! ```
//!
//! Frames carry explicit routing; LC1 forwards what is not addressed to it.

#[cfg(test)]
mod tests {
    use crate::harness::*;
    use ocpp_bus::{DispatchEvent, EventFilter, EventTopic};
    use ocpp_dispatch::{ForwardDecision, HandlerContext};
    use ocpp_types::messages::{GenericStatus, GetCrlRequest, ResetRequest, ResetType};
    use ocpp_types::{
        reply_route, ErrorCode, FrameRouting, MessageTypeId, NetworkPath, NetworkingNodeId,
        OcppFrame, Request, ResultCode, SourceRouting,
    };
    use rand::seq::SliceRandom;
    use rand::Rng;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    struct Line {
        station: TestNode,
        controller: TestNode,
        csms: TestNode,
    }

    fn line(controller: TestNode) -> Line {
        let station = node("CS01").overlay().spawn();
        let csms = node("CSMS").overlay().spawn();
        station.link(&controller);
        controller.link(&csms);
        Line {
            station,
            controller,
            csms,
        }
    }

    fn via_controller(to: &str) -> SourceRouting {
        SourceRouting::from_hops(vec![nid("LC1"), nid(to)]).unwrap()
    }

    fn hops(path: &NetworkPath) -> Vec<&str> {
        path.hops().iter().map(NetworkingNodeId::as_str).collect()
    }

    // =========================================================================
    // FORWARDING
    // =========================================================================

    #[tokio::test]
    async fn test_request_and_reply_cross_the_controller() {
        let net = line(node("LC1").overlay().relay().spawn());
        let mut relayed = net
            .controller
            .dispatcher
            .events()
            .subscribe(EventFilter::topics(vec![EventTopic::Relay]));

        let seen = tally();
        let counter = Arc::clone(&seen);
        net.csms
            .dispatcher
            .on::<GetCrlRequest>(
                move |ctx: HandlerContext, request: Arc<Request<GetCrlRequest>>| {
                    let counter = Arc::clone(&counter);
                    async move {
                        assert_eq!(ctx.sender.as_ref().map(|s| s.as_str()), Some("CS01"));
                        assert_eq!(
                            request.network_path.hops(),
                            &[nid("CS01"), nid("LC1")][..]
                        );
                        counter.fetch_add(1, Ordering::SeqCst);
                        anyhow::Ok(Some(crl_response(GenericStatus::Accepted)))
                    }
                },
            )
            .unwrap();

        let request = net
            .station
            .dispatcher
            .new_request(via_controller("CSMS"), get_crl(1));
        let response = net.station.dispatcher.send_request(request).await;

        assert_eq!(response.result.code, ResultCode::Ok);
        assert_eq!(response.payload.status, GenericStatus::Accepted);
        assert_eq!(hops(&response.network_path), vec!["CSMS", "LC1"]);
        assert_eq!(count(&seen), 1);

        let forwarded: Vec<_> = drain(&mut relayed)
            .into_iter()
            .filter_map(|event| match event {
                DispatchEvent::Forwarded {
                    message_type,
                    final_destination,
                    ..
                } => Some((message_type, final_destination.as_str().to_string())),
                _ => None,
            })
            .collect();
        assert_eq!(
            forwarded,
            vec![
                (MessageTypeId::Call, "CSMS".to_string()),
                (MessageTypeId::CallResult, "CS01".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_controller_without_relay_refuses_with_security_error() {
        let net = line(node("LC1").overlay().spawn());
        let handled = answer_get_crl(&net.csms.dispatcher, GenericStatus::Accepted);

        let request = net
            .station
            .dispatcher
            .new_request(via_controller("CSMS"), get_crl(2));
        let response = net.station.dispatcher.send_request(request).await;

        assert_eq!(response.result.code, ResultCode::RequestError);
        assert_eq!(response.result.error_code, Some(ErrorCode::SecurityError));
        assert_eq!(count(&handled), 0);
    }

    #[tokio::test]
    async fn test_forwarding_policy_can_refuse_an_action() {
        let controller = node("LC1")
            .overlay()
            .relay()
            .forwarding(
                |frame: &OcppFrame, _routing: &FrameRouting, _from: &NetworkingNodeId| match frame
                {
                    OcppFrame::Call(call) if call.action == "Reset" => {
                        ForwardDecision::Reject("Reset is not relayed".to_string())
                    }
                    _ => ForwardDecision::Forward,
                },
            )
            .spawn();
        let net = line(controller);
        answer_get_crl(&net.station.dispatcher, GenericStatus::Accepted);
        let mut relayed = net
            .controller
            .dispatcher
            .events()
            .subscribe(EventFilter::topics(vec![EventTopic::Relay]));

        let reset = net.csms.dispatcher.new_request(
            via_controller("CS01"),
            ResetRequest {
                reset_type: ResetType::Immediate,
                evse_id: None,
            },
        );
        let response = net.csms.dispatcher.send_request(reset).await;
        assert_eq!(response.result.code, ResultCode::RequestError);
        assert_eq!(response.result.error_code, Some(ErrorCode::SecurityError));
        assert_eq!(
            response.result.description.as_deref(),
            Some("Reset is not relayed")
        );

        let crl = net
            .csms
            .dispatcher
            .new_request(via_controller("CS01"), get_crl(3));
        assert!(net.csms.dispatcher.send_request(crl).await.is_ok());

        assert!(drain(&mut relayed).iter().any(|event| matches!(
            event,
            DispatchEvent::ForwardRejected {
                message_type: MessageTypeId::Call,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_dropped_frame_leaves_requester_to_time_out() {
        let controller = node("LC1")
            .overlay()
            .relay()
            .forwarding(
                |_frame: &OcppFrame, _routing: &FrameRouting, _from: &NetworkingNodeId| {
                    ForwardDecision::Drop
                },
            )
            .spawn();
        let net = line(controller);
        let handled = answer_get_crl(&net.csms.dispatcher, GenericStatus::Accepted);

        let request = net
            .station
            .dispatcher
            .new_request(via_controller("CSMS"), get_crl(4))
            .with_timeout(Duration::from_millis(100));
        let response = net.station.dispatcher.send_request(request).await;

        assert_eq!(response.result.code, ResultCode::Timeout);
        assert_eq!(count(&handled), 0);
    }

    #[tokio::test]
    async fn test_missing_onward_link_is_reported_to_sender() {
        // LC1 relays but has no connection to CSMS2.
        let net = line(node("LC1").overlay().relay().spawn());

        let request = net
            .station
            .dispatcher
            .new_request(via_controller("CSMS2"), get_crl(5));
        let response = net.station.dispatcher.send_request(request).await;

        assert_eq!(response.result.code, ResultCode::RequestError);
        assert_eq!(response.result.error_code, Some(ErrorCode::GenericError));
    }

    // =========================================================================
    // REPLY ROUTES
    // =========================================================================

    fn random_path(rng: &mut impl Rng) -> Vec<NetworkingNodeId> {
        let mut names: Vec<String> = (0..8).map(|i| format!("N{i}")).collect();
        names.shuffle(rng);
        let len = rng.gen_range(1..=6);
        names.into_iter().take(len).map(|n| nid(&n)).collect()
    }

    /// Walk a frame along `route`, each relay appending itself to the path.
    fn deliver(route: &SourceRouting, path: NetworkPath) -> NetworkPath {
        let relays = &route.hops()[..route.hops().len() - 1];
        relays
            .iter()
            .fold(path, |path, relay| path.append(relay.clone()))
    }

    #[test]
    fn test_reply_of_a_reply_returns_to_the_replier() {
        let mut rng = rand::thread_rng();
        let local = nid("LOCAL");

        for _ in 0..200 {
            let inbound = NetworkPath::from_hops(random_path(&mut rng));
            let sender = inbound.source().unwrap().clone();

            let reply = reply_route(&inbound, &local).unwrap();
            assert_eq!(reply.destination.final_destination(), &sender);
            assert_eq!(reply.destination.hops().len(), inbound.len());

            let arrived = deliver(&reply.destination, reply.network_path.clone());
            assert_eq!(arrived.source(), Some(&local));

            let answer = reply_route(&arrived, &sender).unwrap();
            assert_eq!(answer.destination.final_destination(), &local);
        }
    }
}
