//! Periodic display update task.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embedded_hal_async::i2c::I2c;
use keynode::{KnobRotation, StateStore};

use crate::driver::OledDriver;
use crate::layout::{render_display, DisplayChanges, DisplayConfig, DisplayState};

// ── Display update task ──────────────────────────────────────────────────

/// Periodic display update loop.
///
/// This is a regular `async fn`, **not** an Embassy `#[task]`. Callers
/// wrap it in a thin, concrete task since Embassy tasks cannot be generic:
///
/// ```ignore
/// #[embassy_executor::task]
/// async fn oled_task(
///     driver: OledDriver<MyConcreteI2cType>,
///     store: &'static StateStore<CriticalSectionRawMutex>,
///     volume: &'static KnobRotation,
///     config: DisplayConfig,
/// ) {
///     display_update_task(driver, store, volume, config).await;
/// }
/// ```
///
/// # Control flow
///
/// 1. Initialise the display hardware.
/// 2. Loop every `config.update_period_ms()`:
///    - **Step 1**: Lock the store just long enough to copy the shared
///      record. Read the knob rotation (atomic, no lock).
///    - **Step 2**: Build a [`DisplayState`] from the copies.
///    - **Step 3**: Skip if no line changed since the last frame.
///    - **Step 4**: Clear buffer and render (no I2C, no lock).
///    - **Step 5**: Flush the frame buffer to the panel.
///
/// # Errors
///
/// * Initialisation failure: logs the error and **returns** (task exits).
/// * Render / flush failure: logs the error and retries on the next cycle.
pub async fn display_update_task<I2C>(
    mut driver: OledDriver<I2C>,
    store: &'static StateStore<CriticalSectionRawMutex>,
    volume: &'static KnobRotation,
    config: DisplayConfig,
) where
    I2C: I2c,
{
    // ── Initialisation ───────────────────────────────────────────────
    if let Err(_e) = driver.init().await {
        #[cfg(feature = "defmt")]
        defmt::error!("OLED init failed: {}", _e);
        return;
    }

    #[cfg(feature = "defmt")]
    defmt::info!("OLED initialised");

    let period = embassy_time::Duration::from_millis(config.update_period_ms());
    let mut last_state: Option<DisplayState> = None;

    // ── Main loop ────────────────────────────────────────────────────
    loop {
        embassy_time::Timer::after(period).await;

        // ── Step 1: copy shared state (lock held for one copy) ───────
        let shared = store.snapshot().await;
        let rotation = volume.load();

        // ── Step 2: build new display state ──────────────────────────
        let new_state = DisplayState::from_shared(&shared, rotation, config.key_polarity);

        // ── Step 3: skip if nothing changed ──────────────────────────
        let changes = match &last_state {
            Some(old) => DisplayChanges::detect(old, &new_state),
            None => DisplayChanges::all(),
        };
        if !changes.any_changed() {
            continue;
        }

        // ── Step 4: render to frame buffer ───────────────────────────
        driver.clear_buffer();
        let Some(display) = driver.display_mut() else {
            continue;
        };
        if render_display(display, &new_state, &config).is_err() {
            #[cfg(feature = "defmt")]
            defmt::error!("Render failed");
            continue;
        }

        // ── Step 5: flush to hardware (no lock held) ─────────────────
        if let Err(_e) = driver.flush().await {
            #[cfg(feature = "defmt")]
            defmt::error!("Flush failed: {}", _e);
            continue;
        }

        last_state = Some(new_state);
    }
}
