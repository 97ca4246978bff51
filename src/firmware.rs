use crate::config::Config;
use clock::{Clock, Ds323x};
use esp_idf_svc::hal::gpio::{
    Gpio15, Gpio16, Gpio17, Gpio38, Gpio39, Input, InputPin, InterruptType, Output, OutputPin,
    PinDriver, Pull,
};
use esp_idf_svc::hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::prelude::*;
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs};
use esp_idf_svc::timer::EspTaskTimerService;
use log::*;
use motion::{
    on_limit_edge, DriveCell, GpsFix, HBridge, LimitInputs, MotorController, MotorDrive,
    SharedState, SolarTracker,
};
use std::thread;
use std::time::Duration;

const HEADING_KEY: &str = "heading";

// Limit / e-stop port, read raw from interrupt context
const ESTOP_GPIO: i32 = 12;
const LIMIT_B_GPIO: i32 = 13;
const LIMIT_A_GPIO: i32 = 14;

type MountDrive = MotorDrive<
    'static,
    PinDriver<'static, Gpio15, Output>, // Tilt A
    PinDriver<'static, Gpio16, Output>, // Tilt B
    PinDriver<'static, Gpio38, Output>, // Turn A
    PinDriver<'static, Gpio39, Output>, // Turn B
    PinDriver<'static, Gpio17, Output>, // Motor relay
>;

static MOUNT: SharedState = SharedState::new();
static DRIVE: DriveCell<MountDrive> = DriveCell::new();

/// One snapshot of the three input lines in port layout
fn read_port() -> u8 {
    // gpio_get_level only reads the input register, safe from an ISR
    let level = |gpio| unsafe { esp_idf_svc::sys::gpio_get_level(gpio) } as u8 & 1;
    level(ESTOP_GPIO) | level(LIMIT_A_GPIO) << 3 | level(LIMIT_B_GPIO) << 4
}

fn on_port_edge() {
    on_limit_edge(&MOUNT, &DRIVE, LimitInputs::from_port(read_port()));
}

fn limit_input<T>(pin: T) -> anyhow::Result<PinDriver<'static, T, Input>>
where
    T: InputPin + OutputPin + 'static,
{
    let mut input = PinDriver::input(pin)?;
    input.set_pull(Pull::Up)?;
    input.set_interrupt_type(InterruptType::AnyEdge)?;
    // SAFETY: the handler touches only atomics and the critical-section guarded drive
    unsafe { input.subscribe(on_port_edge)? };
    input.enable_interrupt()?;
    Ok(input)
}

pub fn run(config: Config) -> anyhow::Result<()> {
    // Initialize peripherals and nvs
    let peripherals = Peripherals::take()?;
    let nvs_default = EspDefaultNvsPartition::take()?;
    let mut nvs = EspNvs::new(nvs_default, "storage", true)?;
    info!("Got namespace {:?} from default partition", "storage");

    info!(
        "Station id: {}, Lat: {}, Lon: {}, Alt: {}",
        config.get_station_id(),
        config.get_latitude(),
        config.get_longitude(),
        config.get_altitude()
    );

    // RTC on I2C, holding local standard time
    let i2c_config = I2cConfig::new().baudrate(100_u32.kHz().into());
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio8,
        peripherals.pins.gpio9,
        &i2c_config,
    )?;
    let mut clock = Clock::new(Ds323x::new_ds3231(i2c), config.get_timezone_offset());
    match clock.get_date_time() {
        Ok(now) => info!("RTC local time {}", now.format("%d/%m/%Y %H:%M:%S")),
        Err(e) => error!("RTC not readable at boot: {:?}", e),
    }

    // ======== Motor outputs ========
    DRIVE.install(MotorDrive::new(
        &MOUNT,
        HBridge::new(
            PinDriver::output(peripherals.pins.gpio15)?,
            PinDriver::output(peripherals.pins.gpio16)?,
        ),
        HBridge::new(
            PinDriver::output(peripherals.pins.gpio38)?,
            PinDriver::output(peripherals.pins.gpio39)?,
        ),
        PinDriver::output(peripherals.pins.gpio17)?,
    ));
    if let Some(Err(e)) = DRIVE.with(|drive| drive.halt()) {
        error!("Failed to park motor outputs: {}", e);
    }

    // ======== Limit switches and e-stop ========
    let mut limit_a = limit_input(peripherals.pins.gpio14)?;
    let mut limit_b = limit_input(peripherals.pins.gpio13)?;
    let mut estop = limit_input(peripherals.pins.gpio12)?;

    let mut maintenance = PinDriver::input(peripherals.pins.gpio5)?;
    maintenance.set_pull(Pull::Up)?;

    // ======== Controller tick ========
    let mut controller = MotorController::new(&MOUNT, config.motor.clone());
    let timer_service = EspTaskTimerService::new()?;
    let tick_timer = timer_service.timer(move || {
        let inputs = LimitInputs {
            limit_a: limit_a.is_low(),
            limit_b: limit_b.is_low(),
            emergency_stop: estop.is_low(),
        };
        // Backstop for an e-stop edge the interrupt did not see
        if inputs.emergency_stop && !MOUNT.is_emergency_stopped() {
            on_limit_edge(&MOUNT, &DRIVE, inputs);
        }
        // Logged only after the critical section is left
        match DRIVE.with(|drive| controller.tick(drive, inputs.limits())) {
            Some(Ok(report)) => report.log(),
            Some(Err(e)) => error!("Motor tick failed: {}", e),
            None => {}
        }
        // The GPIO driver disarms an interrupt once it has fired
        for rearm in [
            limit_a.enable_interrupt(),
            limit_b.enable_interrupt(),
            estop.enable_interrupt(),
        ] {
            if let Err(e) = rearm {
                error!("Failed to re-arm limit interrupt: {:?}", e);
            }
        }
    })?;
    tick_timer.every(Duration::from_millis(config.motor.tick_ms))?;

    // ======== Tracking ========
    let mut tracker = SolarTracker::new(&MOUNT, config.tracking.clone());
    let mut gps = GpsFix::fixed(
        config.get_latitude(),
        config.get_longitude(),
        config.get_altitude() as i32,
    );

    // Turn axis has no switch; start from the stored heading
    let heading = match nvs.get_i16(HEADING_KEY) {
        Ok(Some(heading)) => {
            info!("{:?} = {:?}", HEADING_KEY, heading);
            heading
        }
        Ok(None) => {
            info!("{:?} not found", HEADING_KEY);
            config.location.heading
        }
        Err(e) => {
            warn!("Failed to read heading from NVS: {:?}", e);
            config.location.heading
        }
    };
    let mut stored_heading = heading;
    tracker.seed_turn_reference(heading);

    // Enables the drive so homing can run
    tracker.tracking_cmd(true);
    let mut autostart_pending = config.tracking.autostart;

    let wakeup_interval = config.tracking.wakeup_interval_s.max(1);
    let mut elapsed = 0;

    loop {
        thread::sleep(Duration::from_secs(1));
        elapsed += 1;

        if autostart_pending && !MOUNT.is_homing_active() {
            autostart_pending = false;
            tracker.tracking_cmd(true);
            elapsed = wakeup_interval;
        }

        // Maintenance button clears a latched e-stop once the button is out
        if MOUNT.is_emergency_stopped()
            && maintenance.is_low()
            && !LimitInputs::from_port(read_port()).emergency_stop
        {
            tracker.clear_emergency_stop();
            elapsed = wakeup_interval;
        }

        tracker.task_1s();

        if elapsed >= wakeup_interval {
            elapsed = 0;
            let outcome = tracker.task_wakeup(&mut clock, &mut gps);
            info!(
                "Wakeup {:?}, setpoint {:?}, mount {:?}",
                outcome,
                tracker.setpoint(),
                MOUNT.status()
            );
        }

        // Persist the heading once the mount has come to rest
        let turn_angle = MOUNT.turn_angle();
        if !MOUNT.is_enabled() && turn_angle != stored_heading {
            match nvs.set_i16(HEADING_KEY, turn_angle) {
                Ok(_) => {
                    stored_heading = turn_angle;
                    info!("Stored stable heading in NVS: {}", turn_angle);
                }
                Err(e) => warn!("Failed to store heading in NVS: {:?}", e),
            }
        }
    }
}
