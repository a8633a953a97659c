use embassy_stm32::exti::ExtiInput;

use super::Bridge;
use crate::hw::FirmwareInstant;

/// Services the bridge interrupt line. Only power detect is handled here;
/// every other cause waits for the next poll tick.
#[embassy_executor::task]
pub async fn run(bridge: &'static Bridge, mut irq: ExtiInput<'static>) -> ! {
    loop {
        irq.wait_for_falling_edge().await;
        let status = bridge.on_interrupt(FirmwareInstant::now());
        if status.power_detect {
            let present = bridge.signal_status().present;
            defmt::info!("bridge: 5V detect present={}", present);
        }
    }
}
