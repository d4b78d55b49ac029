//! ADR Control-Plane Demo
//!
//! Replays a synthetic uplink trace through the pipeline:
//! 1. Register gateways and devices (one per strategy)
//! 2. Feed uplink reports with different link qualities
//! 3. Watch the controllers converge and commands get staged

use skylink_control::NetworkService;
use skylink_core::config::{AdrConfig, StrategyKind};
use skylink_core::types::{DevAddr, SimTime};
use skylink_network::aggregator::UplinkFrame;
use skylink_network::model::TxParams;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    skylink_core::logging::init();
    println!("=== Skylink ADR Demo ===\n");

    let config = AdrConfig::default();
    let history_range = config.history_range;
    let noise_floor = config.noise_floor_dbm;
    let service = NetworkService::new(config);

    let north = service.register_gateway("north").await;
    let south = service.register_gateway("south").await;

    let stepwise_dev = DevAddr(0x0000_0001);
    let optimizing_dev = DevAddr(0x0000_0002);
    service
        .register_device_with(stepwise_dev, TxParams::default(), StrategyKind::StepwiseMargin)
        .await?;
    service
        .register_device_with(
            optimizing_dev,
            TxParams::default(),
            StrategyKind::SearchOptimizing,
        )
        .await?;

    println!("--- Replaying {history_range} uplinks per device ---");
    for seq in 0..history_range as u32 {
        let at = SimTime::from_secs(seq as f64 * 60.0);

        // Strong link heard by both gateways.
        service.record_transmission(stepwise_dev, at).await?;
        let frame = UplinkFrame::single(
            stepwise_dev,
            seq,
            12,
            868_100_000,
            north,
            12.0 + noise_floor,
            at,
        )
        .with_gateway(south, 7.0 + noise_floor)
        .with_adaptation_requested();
        if let Some(decision) = service.handle_uplink(&frame).await? {
            println!("stepwise device adjusted: {decision}");
        }

        // Weaker single-gateway link for the optimizer.
        service.record_transmission(optimizing_dev, at).await?;
        let frame = UplinkFrame::single(
            optimizing_dev,
            seq,
            12,
            868_300_000,
            south,
            4.0 + noise_floor,
            at,
        )
        .with_adaptation_requested();
        if let Some(decision) = service.handle_uplink(&frame).await? {
            println!("optimizing device adjusted: {decision}");
        }
    }

    println!("\n--- Staged downlink commands ---");
    for device in [stepwise_dev, optimizing_dev] {
        match service.take_downlink(device).await {
            Some(command) => println!(
                "{device}: DR{} power-index {} x{} (staged at {})",
                command.payload.data_rate,
                command.payload.tx_power_index,
                command.payload.nb_trans,
                command.staged_at,
            ),
            None => println!("{device}: no command pending"),
        }
    }

    for device in [stepwise_dev, optimizing_dev] {
        let rates = service.error_rates(device).await?;
        println!(
            "{device}: end-to-end error rate {:.3}, gateway error rate {:.3}",
            rates.end_to_end, rates.device_to_gateway
        );
    }

    Ok(())
}
