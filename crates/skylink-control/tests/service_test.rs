//! End-to-end tests for the control-plane pipeline.

use tokio::test;

use skylink_core::config::{AdrConfig, PendingCommandPolicy, StrategyKind};
use skylink_core::event::SkylinkEvent;
use skylink_core::types::{DevAddr, GatewayId, SimTime};
use skylink_network::aggregator::UplinkFrame;
use skylink_network::model::{AdrPhase, NetworkError};
use skylink_network::region;

use skylink_control::NetworkService;

const DEVICE: DevAddr = DevAddr(0x00a1_b2c3);

/// Drive one transmission through the pipeline: count it, then deliver
/// the gateway report.
async fn send_and_receive(
    service: &NetworkService,
    gateway: GatewayId,
    sequence: u32,
    spreading_factor: u8,
    rx_power_dbm: f64,
    at: SimTime,
) -> Option<skylink_network::model::RateDecision> {
    service.record_transmission(DEVICE, at).await.unwrap();
    let frame = UplinkFrame::single(
        DEVICE,
        sequence,
        spreading_factor,
        868_100_000,
        gateway,
        rx_power_dbm,
        at,
    )
    .with_adaptation_requested();
    service.handle_uplink(&frame).await.unwrap()
}

#[test]
async fn test_twenty_clean_packets_drive_a_rate_increase() {
    let config = AdrConfig::default();
    let range = config.history_range;
    let service = NetworkService::new(config);
    service.register_device(DEVICE).await.unwrap();
    let gateway = service.register_gateway("north").await;

    let mut decision = None;
    for seq in 0..range as u32 {
        let at = SimTime::from_secs(seq as f64 * 60.0);
        let result = send_and_receive(&service, gateway, seq, 12, -100.0, at).await;
        if seq + 1 < range as u32 {
            // Insufficient history is a silent skip, never a failure.
            assert!(result.is_none());
        } else {
            decision = result;
        }
    }

    // Zero losses.
    let rates = service.error_rates(DEVICE).await.unwrap();
    assert_eq!(rates.end_to_end, 0.0);
    assert_eq!(rates.device_to_gateway, 0.0);

    // 17 dB of SNR over a -20 dB threshold is a large margin: the data
    // rate must go up.
    let decision = decision.expect("full history and healthy SNR must adjust the rate");
    assert!(decision.data_rate > 0);

    let record = service.devices().record(DEVICE).await.unwrap();
    let record = record.read().await;
    assert_eq!(record.sent, range as u64);
    assert_eq!(record.received_by_server, range as u64);
    assert_eq!(record.adjustment_count, 1);
    assert_eq!(record.phase, AdrPhase::CommandPending);
}

#[test]
async fn test_total_loss_saturates_error_rate() {
    let service = NetworkService::new(AdrConfig::default());
    service.register_device(DEVICE).await.unwrap();
    let gateway = service.register_gateway("north").await;

    // The device transmits but nothing is ever received.
    for i in 0..30u32 {
        service
            .record_transmission(DEVICE, SimTime::from_secs(i as f64 * 60.0))
            .await
            .unwrap();
    }
    let rates = service.error_rates(DEVICE).await.unwrap();
    assert_eq!(rates.end_to_end, 1.0);

    // A lone straggler with the adaptation flag takes the
    // insufficient-history path instead of evaluating.
    let frame = UplinkFrame::single(
        DEVICE,
        30,
        12,
        868_100_000,
        gateway,
        -100.0,
        SimTime::from_secs(1900.0),
    )
    .with_adaptation_requested();
    service.record_transmission(DEVICE, SimTime::from_secs(1900.0)).await.unwrap();
    let result = service.handle_uplink(&frame).await.unwrap();
    assert!(result.is_none());
}

#[test]
async fn test_unknown_device_does_not_disturb_neighbors() {
    let service = NetworkService::new(AdrConfig::default());
    service.register_device(DEVICE).await.unwrap();
    let gateway = service.register_gateway("north").await;

    let stray = UplinkFrame::single(
        DevAddr(0xdead_beef),
        1,
        12,
        868_100_000,
        gateway,
        -90.0,
        SimTime::from_secs(1.0),
    );
    let err = service.handle_uplink(&stray).await.unwrap_err();
    assert!(matches!(err, NetworkError::UnknownDevice(_)));

    // The registered device is unaffected.
    assert!(
        send_and_receive(&service, gateway, 1, 12, -100.0, SimTime::from_secs(2.0))
            .await
            .is_none()
    );
    let record = service.devices().record(DEVICE).await.unwrap();
    assert_eq!(record.read().await.history.len(), 1);
}

#[test]
async fn test_optimizer_pipeline_clears_history_and_stages_command() {
    let mut config = AdrConfig::default();
    config.strategy = StrategyKind::SearchOptimizing;
    let range = config.history_range;
    let noise_floor = config.noise_floor_dbm;
    let service = NetworkService::new(config);
    service.register_device(DEVICE).await.unwrap();
    let gateway = service.register_gateway("north").await;

    // Mean SNR of 10 dB across the whole window.
    let mut decision = None;
    for seq in 0..range as u32 {
        let at = SimTime::from_secs(seq as f64 * 60.0);
        decision =
            send_and_receive(&service, gateway, seq, 12, 10.0 + noise_floor, at).await;
    }

    let decision = decision.expect("optimizer must accept a faster configuration");
    assert_eq!(decision.data_rate, 5);
    assert_eq!(decision.tx_power_dbm, region::MIN_TX_POWER_DBM);
    assert_eq!(decision.nb_trans, 1);

    let record = service.devices().record(DEVICE).await.unwrap();
    {
        let record = record.read().await;
        // Fresh statistics are learned under the new configuration.
        assert!(record.history.is_empty());
        assert_eq!(record.params, decision.params());
        assert_eq!(record.phase, AdrPhase::CommandPending);
        assert!(record.pending_command.is_some());
    }

    // The staged payload is what the downlink scheduler collects.
    let command = service.take_downlink(DEVICE).await.unwrap();
    assert_eq!(command.payload.data_rate, 5);
    assert_eq!(command.payload.tx_power_index, 6);
    assert_eq!(command.payload.nb_trans, 1);
    assert!(service.take_downlink(DEVICE).await.is_none());
    assert!(record.read().await.pending_command.is_none());
}

#[test]
async fn test_retained_history_when_clearing_disabled() {
    let mut config = AdrConfig::default();
    config.strategy = StrategyKind::SearchOptimizing;
    config.clear_history_on_adjust = false;
    let range = config.history_range;
    let noise_floor = config.noise_floor_dbm;
    let service = NetworkService::new(config);
    service.register_device(DEVICE).await.unwrap();
    let gateway = service.register_gateway("north").await;

    for seq in 0..range as u32 {
        let at = SimTime::from_secs(seq as f64 * 60.0);
        send_and_receive(&service, gateway, seq, 12, 10.0 + noise_floor, at).await;
    }

    let record = service.devices().record(DEVICE).await.unwrap();
    let record = record.read().await;
    assert_eq!(record.adjustment_count, 1);
    // Diversity statistics survive the adjustment.
    assert_eq!(record.history.len(), range);
}

#[test]
async fn test_next_uplink_restarts_the_cycle() {
    let mut config = AdrConfig::default();
    config.strategy = StrategyKind::SearchOptimizing;
    let range = config.history_range;
    let noise_floor = config.noise_floor_dbm;
    let service = NetworkService::new(config);
    service.register_device(DEVICE).await.unwrap();
    let gateway = service.register_gateway("north").await;

    for seq in 0..range as u32 {
        let at = SimTime::from_secs(seq as f64 * 60.0);
        send_and_receive(&service, gateway, seq, 12, 10.0 + noise_floor, at).await;
    }

    // Device comes back under the new parameters.
    let at = SimTime::from_secs(range as f64 * 60.0);
    let result = send_and_receive(&service, gateway, range as u32, 7, 10.0 + noise_floor, at).await;
    assert!(result.is_none());

    let record = service.devices().record(DEVICE).await.unwrap();
    let record = record.read().await;
    assert_eq!(record.phase, AdrPhase::Collecting);
    assert_eq!(record.history.len(), 1);
}

#[test]
async fn test_pending_command_expires_under_policy() {
    let mut config = AdrConfig::default();
    config.pending_policy = PendingCommandPolicy::ExpireAfter { ms: 60_000.0 };
    let range = config.history_range;
    let service = NetworkService::new(config);
    service.register_device(DEVICE).await.unwrap();
    let gateway = service.register_gateway("north").await;

    for seq in 0..range as u32 {
        let at = SimTime::from_secs(seq as f64 * 60.0);
        send_and_receive(&service, gateway, seq, 12, -100.0, at).await;
    }
    assert!(service.pending_downlink(DEVICE).is_some());

    // Well past the expiry horizon, the sweep reclaims the slot.
    let expired = service
        .sweep(SimTime::from_secs(range as f64 * 60.0 + 120.0))
        .await;
    assert_eq!(expired, 1);
    assert!(service.pending_downlink(DEVICE).is_none());

    let record = service.devices().record(DEVICE).await.unwrap();
    let record = record.read().await;
    assert_eq!(record.phase, AdrPhase::Collecting);
    assert!(record.pending_command.is_none());
}

#[test]
async fn test_adjustment_telemetry_is_published() {
    let config = AdrConfig::default();
    let range = config.history_range;
    let service = NetworkService::new(config);
    let mut adr_events = service.bus().filter().adr_events();
    service.register_device(DEVICE).await.unwrap();
    let gateway = service.register_gateway("north").await;

    for seq in 0..range as u32 {
        let at = SimTime::from_secs(seq as f64 * 60.0);
        send_and_receive(&service, gateway, seq, 12, -100.0, at).await;
    }

    let (event, meta) = adr_events.recv().await.unwrap();
    match event {
        SkylinkEvent::AdrAdjustment {
            device, data_rate, ..
        } => {
            assert_eq!(device, DEVICE);
            assert!(data_rate > 0);
        }
        other => panic!("expected AdrAdjustment, got {other:?}"),
    }
    assert_eq!(meta.source, "control");
}
