//! # Metrics From Live Traffic
//!
//! The metrics recorder attached to a node's event bus while real
//! exchanges run through it.

#[cfg(test)]
mod tests {
    use crate::harness::*;
    use ocpp_telemetry::{encode_metrics, spawn_metrics_recorder, DispatchMetrics};
    use ocpp_types::messages::GenericStatus;
    use ocpp_types::{NetworkingMode, SourceRouting};
    use prometheus::Registry;
    use std::time::Duration;

    #[tokio::test]
    async fn test_recorder_counts_a_served_request() {
        let csms = node("CSMS").spawn();
        let station = node("CS01").spawn();
        csms.link(&station);
        answer_get_crl(&station.dispatcher, GenericStatus::Accepted);

        let registry = Registry::new();
        let metrics = DispatchMetrics::register(&registry).unwrap();
        let recorder = spawn_metrics_recorder(
            station.dispatcher.events(),
            metrics.clone(),
            station.dispatcher.shutdown_token(),
        );

        for id in 0..3 {
            let request = csms
                .dispatcher
                .new_request(SourceRouting::to(nid("CS01")), get_crl(id));
            assert!(csms.dispatcher.send_request(request).await.is_ok());
        }

        assert!(
            eventually(|| {
                metrics
                    .responses_sent
                    .with_label_values(&["GetCRL", "ok"])
                    .get()
                    == 3.0
            })
            .await
        );
        assert_eq!(
            metrics.requests_received.with_label_values(&["GetCRL"]).get(),
            3.0
        );
        assert_eq!(
            metrics
                .request_runtime
                .with_label_values(&["GetCRL", "responder"])
                .get_sample_count(),
            3
        );

        let text = encode_metrics(&registry).unwrap();
        assert!(text.contains("ocpp_requests_received_total"));
        assert!(text.contains("action=\"GetCRL\""));

        station.dispatcher.shutdown();
        tokio::time::timeout(PATIENCE, recorder)
            .await
            .expect("recorder stops on shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn test_recorder_counts_timeouts() {
        let csms = node("CSMS").timeout(Duration::from_millis(50)).spawn();
        let mut station = RawPeer::new("CS01", NetworkingMode::Standard);
        csms.link_raw(&station);

        let metrics = DispatchMetrics::register(&Registry::new()).unwrap();
        let _recorder = spawn_metrics_recorder(
            csms.dispatcher.events(),
            metrics.clone(),
            csms.dispatcher.shutdown_token(),
        );

        let request = csms
            .dispatcher
            .new_request(SourceRouting::to(nid("CS01")), get_crl(1));
        let response = csms.dispatcher.send_request(request).await;
        assert_eq!(response.result.code, ocpp_types::ResultCode::Timeout);

        assert!(
            eventually(|| {
                metrics
                    .responses_received
                    .with_label_values(&["GetCRL", "timeout"])
                    .get()
                    == 1.0
            })
            .await
        );
        // The CALL did go out.
        let _ = station.next_frame().await;
    }
}
