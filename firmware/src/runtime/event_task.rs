use super::{Bridge, FORMAT_EVENTS};
use crate::telemetry::log_format_event;

#[embassy_executor::task]
pub async fn run(bridge: &'static Bridge) -> ! {
    let Ok(mut subscriber) = FORMAT_EVENTS.subscribe() else {
        defmt::error!("format: no subscriber slot left");
        loop {
            core::future::pending::<()>().await;
        }
    };

    loop {
        let event = subscriber.next_message_pure().await;
        log_format_event(event, bridge.detected_timing());
    }
}
