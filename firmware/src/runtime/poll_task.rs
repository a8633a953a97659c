use bridge_core::config::BridgeConfig;
use bridge_core::scheduler::PollTimer;
use embassy_time::{Duration, Ticker};

use super::{Bridge, POLL_SCHEDULER};
use crate::hw::FirmwareInstant;
use crate::telemetry::TelemetryDrain;

/// Embassy ticker as the poll period source.
struct TickerTimer {
    ticker: Ticker,
}

impl PollTimer for TickerTimer {
    type Instant = FirmwareInstant;

    async fn wait_next(&mut self) -> FirmwareInstant {
        self.ticker.next().await;
        FirmwareInstant::now()
    }
}

#[embassy_executor::task]
pub async fn run(bridge: &'static Bridge, config: BridgeConfig) -> ! {
    let period = u64::try_from(config.poll_period.as_micros()).unwrap_or(u64::MAX);
    let mut timer = TickerTimer {
        ticker: Ticker::every(Duration::from_micros(period)),
    };
    let mut drain = TelemetryDrain::new();

    POLL_SCHEDULER
        .run(&mut timer, |now| {
            bridge.poll(now);
            bridge.lock(|controller| drain.drain(controller.telemetry()));
        })
        .await;

    defmt::warn!("bridge: poll scheduler stopped");
    loop {
        core::future::pending::<()>().await;
    }
}
