use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::Pull;
use embassy_stm32::i2c::{self, I2c};
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use static_cell::StaticCell;

use bridge_core::config::BridgeConfig;
use bridge_core::events::{ChannelEventSink, FormatEvents};
use bridge_core::probe::tc358840::{Tc358840, Tc358840Config};
use bridge_core::scheduler::{PollScheduler, SharedBridge};

use crate::hw::FirmwareInstant;
use crate::hw::i2c::{EmbassyDelay, I2cTransport};

mod event_task;
mod irq_task;
mod poll_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

type BridgeMutex = ThreadModeRawMutex;

pub(super) type Chip = Tc358840<I2cTransport, EmbassyDelay>;

pub(super) type Bridge =
    SharedBridge<BridgeMutex, Chip, ChannelEventSink<'static, BridgeMutex>, FirmwareInstant>;

pub(super) static FORMAT_EVENTS: FormatEvents<BridgeMutex> = FormatEvents::new();
pub(super) static POLL_SCHEDULER: PollScheduler<BridgeMutex> = PollScheduler::new();
static BRIDGE: StaticCell<Bridge> = StaticCell::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        I2C1,
        PB8,
        PB9,
        PB5,
        EXTI5,
        ..
    } = hal::init(config);

    let bus = I2c::new_blocking(I2C1, PB8, PB9, i2c::Config::default());
    let mut chip = Tc358840::new(
        I2cTransport::new(bus),
        EmbassyDelay,
        Tc358840Config::default(),
    );
    chip.unmask_power_interrupt();

    let bridge_config = BridgeConfig::new().with_auto_stream(true);
    let bridge: &'static Bridge = BRIDGE.init(SharedBridge::new(
        chip,
        FORMAT_EVENTS.sink(),
        bridge_config,
    ));
    defmt::info!(
        "bridge: polling every {}ms",
        bridge_config.poll_period.as_millis()
    );

    let irq = ExtiInput::new(PB5, EXTI5, Pull::Up);

    spawner
        .spawn(event_task::run(bridge))
        .expect("failed to spawn format event task");
    spawner
        .spawn(irq_task::run(bridge, irq))
        .expect("failed to spawn bridge interrupt task");
    spawner
        .spawn(poll_task::run(bridge, bridge_config))
        .expect("failed to spawn bridge poll task");

    core::future::pending::<()>().await;
}
