//! keynode-hw-interface
//!
//! Firmware for one keyboard module on an STM32L432KC. Wires the three
//! library crates into a running node:
//!
//! 1. The scan task reads the key matrix every 20 ms, feeds the volume
//!    knob, queues a CAN message for every key edge and publishes the
//!    snapshot and step size to the shared store.
//! 2. The transmit task drains the outbound queue into the three CAN
//!    mailboxes; the CAN TX interrupt hands mailboxes back.
//! 3. The receive task moves frames from the CAN peripheral into the
//!    inbound queue; the decode task turns them into step size updates.
//! 4. The TIM7 update interrupt fires at exactly 22 kHz, above every
//!    executor, and writes one sawtooth sample to the DAC per period.
//! 5. The OLED task shows the key bitmap, note, volume and last frame.

#![no_std]
#![no_main]

mod board;

use core::cell::RefCell;

use defmt::*;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_stm32::bind_interrupts;
use embassy_stm32::can::filter::Mask32;
use embassy_stm32::can::{self, Can, CanRx, CanTx, Fifo, Frame};
use embassy_stm32::dac::{DacCh1, Value};
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_stm32::i2c::{self, I2c};
use embassy_stm32::interrupt::{self, InterruptExt, Priority};
use embassy_stm32::mode::{Async, Blocking};
use embassy_stm32::peripherals::{self, CAN1, DAC1, I2C1};
use embassy_stm32::time::Hertz;
use embassy_stm32::timer::low_level::Timer as SampleTimer;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_can::{Id, StandardId};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use keynode::config::REFERENCE_OCTAVE;
use keynode::scanner::scan_keys_task;
use keynode::{
    decode_task, InputSnapshot, KeyPolarity, KeyScanner, KnobDecoder, KnobRotation,
    MessageDecoder, NodeConfig, OctavePolicy, RawFrame, Role, StateStore, Synthesizer,
    SAMPLE_RATE_HZ,
};
use keynode_can_bus::{
    transmit_task, BusTransmit, RxOutcome, RxPath, TxPath, DEFAULT_BUS_ID, MAILBOX_COUNT,
    RX_QUEUE_LEN, TX_QUEUE_LEN,
};
use keynode_oled_display_rs::{display_update_task, DisplayConfig, OledDriver};

use crate::board::Board;

// ---------------------------------------------------------------------------
// Node configuration
// ---------------------------------------------------------------------------

const NODE_CONFIG: NodeConfig = NodeConfig {
    role: Role::Sender,
    octave: REFERENCE_OCTAVE,
    octave_policy: OctavePolicy::Shift,
    polarity: KeyPolarity::ActiveLow,
    initial_volume: 0,
};

/// Hear our own frames. Lets a single module exercise the receive path; a
/// sender's decoder only caches them for the display.
const CAN_LOOPBACK: bool = true;

const CAN_BITRATE: u32 = 125_000;

/// System and timer clock. Must divide into whole sample periods, since the
/// step size table assumes exactly `SAMPLE_RATE_HZ`.
const SYSCLK_HZ: u32 = 66_000_000;
const _: () = assert!(SYSCLK_HZ % SAMPLE_RATE_HZ == 0);

const OLED_ADDRESS: u8 = 0x3C;

// ---------------------------------------------------------------------------
// Interrupt binding
// ---------------------------------------------------------------------------

/// Counts finished mailboxes on CAN1_TX. Bound ahead of Embassy's own
/// handler, which clears the completion flags.
struct TxCompleteHandler;

impl interrupt::typelevel::Handler<interrupt::typelevel::CAN1_TX> for TxCompleteHandler {
    unsafe fn on_interrupt() {
        let tsr = embassy_stm32::pac::CAN1.tsr().read();
        let completed = (0..MAILBOX_COUNT).filter(|&mailbox| tsr.rqcp(mailbox)).count();
        TX_PATH.on_transmit_complete(completed);
    }
}

bind_interrupts!(struct Irqs {
    CAN1_TX => TxCompleteHandler, can::TxInterruptHandler<CAN1>;
    CAN1_RX0 => can::Rx0InterruptHandler<CAN1>;
    CAN1_RX1 => can::Rx1InterruptHandler<CAN1>;
    CAN1_SCE => can::SceInterruptHandler<CAN1>;
    I2C1_EV => i2c::EventInterruptHandler<I2C1>;
    I2C1_ER => i2c::ErrorInterruptHandler<I2C1>;
});

// ---------------------------------------------------------------------------
// Executors
// ---------------------------------------------------------------------------

/// CAN receive, so the hardware FIFO is emptied first.
static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();

/// CAN transmit and decode.
static EXECUTOR_MED: InterruptExecutor = InterruptExecutor::new();

#[embassy_stm32::interrupt]
unsafe fn SPI1() {
    EXECUTOR_HIGH.on_interrupt();
}

#[embassy_stm32::interrupt]
unsafe fn SPI3() {
    EXECUTOR_MED.on_interrupt();
}

// ---------------------------------------------------------------------------
// Static storage
// ---------------------------------------------------------------------------

/// Shared key snapshot, step size and last received frame.
static STORE: StateStore<CriticalSectionRawMutex> =
    StateStore::new(InputSnapshot::all_released(NODE_CONFIG.polarity));

/// Volume knob position, written by the scan task, read by audio and OLED.
static KNOB: KnobRotation = KnobRotation::new(NODE_CONFIG.initial_volume);

static TX_PATH: TxPath<CriticalSectionRawMutex, TX_QUEUE_LEN> = TxPath::new(MAILBOX_COUNT);
static RX_PATH: RxPath<CriticalSectionRawMutex, RX_QUEUE_LEN> = RxPath::new(DEFAULT_BUS_ID);

/// The CAN peripheral must outlive its split halves.
static CAN: StaticCell<Can<'static>> = StaticCell::new();

/// Everything the sample interrupt touches. Filled once in `main`.
static AUDIO: Mutex<CriticalSectionRawMutex, RefCell<Option<AudioOut>>> =
    Mutex::new(RefCell::new(None));

// ---------------------------------------------------------------------------
// CAN transmit driver
// ---------------------------------------------------------------------------

#[derive(Debug, Format)]
enum CanTxError {
    /// Identifier outside the standard range.
    BadFrame,
    /// No free hardware mailbox despite holding a permit.
    MailboxFull,
}

struct CanMailboxes(CanTx<'static>);

impl BusTransmit for CanMailboxes {
    type Error = CanTxError;

    async fn transmit(&mut self, id: u16, frame: &RawFrame) -> Result<(), CanTxError> {
        let frame = Frame::new_standard(id, frame).map_err(|_| CanTxError::BadFrame)?;
        self.0
            .try_write(&frame)
            .map(|_| ())
            .map_err(|_| CanTxError::MailboxFull)
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

struct AudioOut {
    timer: SampleTimer<'static, peripherals::TIM7>,
    dac: DacCh1<'static, DAC1, Blocking>,
    synth: Synthesizer<'static>,
}

/// Sample period: one phase accumulator step and one DAC write.
#[embassy_stm32::interrupt]
unsafe fn TIM7() {
    AUDIO.lock(|audio| {
        if let Some(out) = audio.borrow_mut().as_mut() {
            out.timer.clear_update_interrupt();
            out.dac.set(Value::Bit8(out.synth.next_sample()));
        }
    });
}

#[embassy_executor::task]
async fn can_transmit_task(tx: CanTx<'static>) -> ! {
    transmit_task(&TX_PATH, CanMailboxes(tx), DEFAULT_BUS_ID).await
}

/// Moves frames from the peripheral's FIFO into the inbound queue.
#[embassy_executor::task]
async fn can_receive_task(mut rx: CanRx<'static>) -> ! {
    info!("CAN receive task started");
    loop {
        match rx.read().await {
            Ok(envelope) => {
                // Extended frames never match the standard bus id.
                let id = match envelope.frame.id() {
                    Id::Standard(id) => id.as_raw(),
                    Id::Extended(_) => u16::MAX,
                };
                if RX_PATH.on_frame_received(id, envelope.frame.data()) == RxOutcome::Dropped {
                    trace!("Inbound queue full");
                }
            }
            Err(e) => warn!("CAN receive error: {}", Debug2Format(&e)),
        }
    }
}

#[embassy_executor::task]
async fn message_decode_task(store: &'static StateStore<CriticalSectionRawMutex>) -> ! {
    decode_task(MessageDecoder::for_config(&NODE_CONFIG), &RX_PATH, store).await
}

#[embassy_executor::task]
async fn key_scan_task(board: Board, store: &'static StateStore<CriticalSectionRawMutex>) -> ! {
    let scanner = unwrap!(KeyScanner::new(KnobDecoder::new(&KNOB), NODE_CONFIG));
    scan_keys_task(scanner, board, &TX_PATH, store).await
}

/// Thin wrapper that monomorphises the generic `display_update_task` so it can
/// be spawned as a concrete Embassy task.
#[embassy_executor::task]
async fn oled_task(
    driver: OledDriver<I2c<'static, Async>>,
    store: &'static StateStore<CriticalSectionRawMutex>,
    volume: &'static KnobRotation,
    config: DisplayConfig,
) {
    display_update_task(driver, store, volume, config).await;
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let mut config = embassy_stm32::Config::default();
    {
        use embassy_stm32::rcc::*;
        // 16 MHz HSI / 2 × 33 / 4 = SYSCLK_HZ, 3000 timer ticks per sample.
        config.rcc.hsi = true;
        config.rcc.pll = Some(Pll {
            source: PllSource::HSI,
            prediv: PllPreDiv::DIV2,
            mul: PllMul::MUL33,
            divp: None,
            divq: None,
            divr: Some(PllRDiv::DIV4),
        });
        config.rcc.sys = Sysclk::PLL1_R;
    }
    let p = embassy_stm32::init(config);
    info!("keynode-hw-interface starting");

    // —— Pin assignments ————————————————————————————————————————————————————
    // RA0..RA2 → PB0, PB1, PB4   row / mux address
    // REN      → PA6             row / mux enable
    // OUT      → PB5             mux data
    // C0..C3   → PA3, PA8, PA7, PA9
    // DAC      → PA4             audio out
    // CAN      → PA11 (RX), PA12 (TX)
    // I2C1     → PB6 (SCL), PB7 (SDA)
    // ———————————————————————————————————————————————————————————————————————

    let mut board = Board::new(
        [
            Output::new(p.PB0, Level::Low, Speed::Low),
            Output::new(p.PB1, Level::Low, Speed::Low),
            Output::new(p.PB4, Level::Low, Speed::Low),
        ],
        Output::new(p.PA6, Level::Low, Speed::Low),
        Output::new(p.PB5, Level::Low, Speed::Low),
        [
            Input::new(p.PA3, Pull::None),
            Input::new(p.PA8, Pull::None),
            Input::new(p.PA7, Pull::None),
            Input::new(p.PA9, Pull::None),
        ],
    );
    board.power_up_display();

    // —— CAN ——————————————————————————————————————————————————————————————————
    let can = CAN.init(Can::new(p.CAN1, p.PA11, p.PA12, Irqs));
    can.modify_filters().enable_bank(
        0,
        Fifo::Fifo0,
        Mask32::frames_with_std_id(unwrap!(StandardId::new(DEFAULT_BUS_ID)), StandardId::MAX),
    );
    can.modify_config()
        .set_loopback(CAN_LOOPBACK)
        .set_silent(false)
        .set_bitrate(CAN_BITRATE);
    can.enable().await;
    let (can_tx, can_rx) = can.split();
    info!("CAN up: id {=u16:#X}, loopback={}", DEFAULT_BUS_ID, CAN_LOOPBACK);

    // —— Audio and display ————————————————————————————————————————————————————
    let dac = DacCh1::new_blocking(p.DAC1, p.PA4);
    let synth = Synthesizer::new(STORE.step_cell(), &KNOB);
    let timer = SampleTimer::new(p.TIM7);
    let timer_clock = timer.get_clock_frequency().0;
    if timer_clock != SYSCLK_HZ {
        warn!("TIM7 clock {} Hz does not give an exact {} Hz sample rate", timer_clock, SAMPLE_RATE_HZ);
    }
    timer.set_frequency(Hertz(SAMPLE_RATE_HZ));
    timer.enable_update_interrupt(true);
    timer.start();
    AUDIO.lock(|audio| audio.replace(Some(AudioOut { timer, dac, synth })));
    interrupt::TIM7.set_priority(Priority::P0);
    unsafe { interrupt::TIM7.enable() };
    info!("Audio running at {} Hz", SAMPLE_RATE_HZ);

    let mut i2c_config = i2c::Config::default();
    i2c_config.frequency = Hertz(400_000);
    let i2c = I2c::new(p.I2C1, p.PB6, p.PB7, Irqs, p.DMA1_CH6, p.DMA1_CH7, i2c_config);
    let oled_driver = OledDriver::new(i2c, OLED_ADDRESS);

    // —— Spawn tasks ————————————————————————————————————————————————————————

    interrupt::SPI1.set_priority(Priority::P6);
    let spawner_high = EXECUTOR_HIGH.start(interrupt::SPI1);
    interrupt::SPI3.set_priority(Priority::P7);
    let spawner_med = EXECUTOR_MED.start(interrupt::SPI3);

    spawner_high.spawn(unwrap!(can_receive_task(can_rx)));

    spawner_med.spawn(unwrap!(can_transmit_task(can_tx)));
    spawner_med.spawn(unwrap!(message_decode_task(&STORE)));

    spawner.spawn(unwrap!(key_scan_task(board, &STORE)));
    spawner.spawn(unwrap!(oled_task(oled_driver, &STORE, &KNOB, DisplayConfig::default())));

    info!("All tasks spawned");
}
