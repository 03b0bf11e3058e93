//! roomtag: BLE room-level indoor positioning asset tag
//!
//! Listens to fixed gateways that each announce the room they sit in,
//! samples their signal strength, and broadcasts the room of the nearest
//! one. Room reports and status go out as NDJSON over serial and BLE GATT
//! notifications. Holding the mode button at boot enters configuration
//! mode, where a host sets the network id and reporting interval.

#![no_std]
#![no_main]

extern crate alloc;

use esp_backtrace as _;

esp_bootloader_esp_idf::esp_app_desc!();

#[cfg(not(any(feature = "board-xiao", feature = "board-m5stickc")))]
compile_error!("firmware needs a board: build with `--features xiao` or `--features m5stickc`");

#[cfg(all(feature = "board-xiao", feature = "board-m5stickc"))]
compile_error!("select exactly one board feature");

use roomtag::{board, comm, defaults, protocol};

use core::cell::Cell;
use core::sync::atomic::{AtomicU8, Ordering};
use critical_section::Mutex;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use esp_hal::gpio::{Input, InputConfig, Pull};
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::timer::timg::TimerGroup;
use static_cell::StaticCell;

use trouble_host::prelude::*;

use comm::LineReader;
use roomtag::config::AssetConfig;
use roomtag::display::Screen;
use roomtag::engine::{self, Localizer, Outcome, Reply};
use roomtag::protocol::{DeviceMessage, HostCommand, MsgBuffer, MAX_MSG_LEN, VERSION};
use roomtag::scanner::{fixed_str, DeviceName, ScanReport};
use roomtag::selector::RoomResult;
use roomtag::signal::{SignalSet, TimerSignal};

// ── BLE GATT server definition ──────────────────────────────────────
//
// The UUID constants in comm::ble_uuids are the canonical source;
// proc macros require string literals.

#[gatt_service(uuid = "7e2a0001-5c1b-4f7e-9d3a-1b6c2e8f4a10")]
struct ConfigGattService {
    /// TX: replies and room reports, notify-only.
    /// Messages are chunked into BLE_MAX_NOTIFY-sized pieces.
    /// The host accumulates until it sees '\n' (NDJSON delimiter).
    #[characteristic(uuid = "7e2a0002-5c1b-4f7e-9d3a-1b6c2e8f4a10", notify)]
    tx: [u8; 20],

    /// RX: host commands, write-only, accumulated via LineReader.
    #[characteristic(uuid = "7e2a0003-5c1b-4f7e-9d3a-1b6c2e8f4a10", write)]
    rx: [u8; 20],
}

#[gatt_server]
struct RoomtagServer {
    config_service: ConfigGattService,
}

// ── Events and channels ───────────────────────────────────────────────

/// Everything the engine task reacts to.
enum EngineEvent {
    /// Radio stack is up; the button was sampled
    Boot { button_pressed: bool },
    Scan(ScanReport),
    Command(HostCommand),
    /// A timer raised a signal
    Wake,
}

/// Advertising work for the peripheral role.
enum AdvertRequest {
    Config,
    Room { network_id: u32, room: RoomResult },
}

type EngineChannel = Channel<CriticalSectionRawMutex, EngineEvent, 16>;
type AdvertChannel = Channel<CriticalSectionRawMutex, AdvertRequest, 2>;
type OutputChannel = Channel<CriticalSectionRawMutex, MsgBuffer, 8>;
type BleOutputChannel = Channel<CriticalSectionRawMutex, MsgBuffer, 4>;

/// `Some(ms)` (re)starts the periodic trigger, `None` stops it.
type PeriodicControl = Signal<CriticalSectionRawMutex, Option<u64>>;
/// (Re)starts a one-shot timer with the given timeout in ms.
type OneShotControl = Signal<CriticalSectionRawMutex, u64>;

// ── Static channels and shared state ─────────────────────────────────

static ENGINE_CHANNEL: EngineChannel = Channel::new();
static ADVERT_CHANNEL: AdvertChannel = Channel::new();

/// Serialized NDJSON output
static OUTPUT_CHANNEL: OutputChannel = Channel::new();

/// BLE output: serial task clones messages here for GATT notifications.
static BLE_OUTPUT_CHANNEL: BleOutputChannel = Channel::new();

/// Pending timer signals, drained by the engine task.
static SIGNALS: SignalSet = SignalSet::new();

static PERIODIC_CTRL: PeriodicControl = Signal::new();
static FINDER_CTRL: OneShotControl = Signal::new();
static CONFIG_TIMEOUT_CTRL: OneShotControl = Signal::new();

/// Desired scanner state, set by the engine.
static SCAN_CTRL: Signal<CriticalSectionRawMutex, bool> = Signal::new();

/// Asset configuration snapshot: written by the engine task after every
/// host command, read by everyone else.
static ASSET_CONFIG: Mutex<Cell<AssetConfig>> = Mutex::new(Cell::new(AssetConfig::new()));

/// Number of connected BLE clients
static BLE_CLIENTS: AtomicU8 = AtomicU8::new(0);

fn get_asset_config() -> AssetConfig {
    critical_section::with(|cs| ASSET_CONFIG.borrow(cs).get())
}

fn set_asset_config(config: AssetConfig) {
    critical_section::with(|cs| ASSET_CONFIG.borrow(cs).set(config));
}

/// Raise a timer signal and wake the engine. Never touches engine state.
fn raise(signal: TimerSignal) {
    SIGNALS.raise(signal);
    // A full queue still wakes the engine, which drains signals on every event.
    let _ = ENGINE_CHANNEL.try_send(EngineEvent::Wake);
}

fn uptime_ms() -> u32 {
    (Instant::now().as_millis() & 0xFFFF_FFFF) as u32
}

// ── Engine collaborators ─────────────────────────────────────────────

struct FirmwareRadio;

impl engine::Radio for FirmwareRadio {
    fn start_scan(&mut self) {
        SCAN_CTRL.signal(true);
    }

    fn stop_scan(&mut self) {
        SCAN_CTRL.signal(false);
    }

    fn advertise_config(&mut self, _device_name: &str) {
        if ADVERT_CHANNEL.try_send(AdvertRequest::Config).is_err() {
            log::warn!("Advert queue full, config advertising dropped");
        }
    }

    fn advertise_room(&mut self, network_id: u32, room: &RoomResult) {
        let req = AdvertRequest::Room {
            network_id,
            room: *room,
        };
        if ADVERT_CHANNEL.try_send(req).is_err() {
            log::warn!("Advert queue full, position advert dropped");
        }
    }
}

struct FirmwareTimers;

impl engine::Timers for FirmwareTimers {
    fn start_periodic(&mut self, interval_ms: u64) {
        PERIODIC_CTRL.signal(Some(interval_ms));
    }

    fn stop_periodic(&mut self) {
        PERIODIC_CTRL.signal(None);
    }

    fn start_gateway_finder(&mut self, timeout_ms: u64) {
        FINDER_CTRL.signal(timeout_ms);
    }

    fn start_config_timeout(&mut self, timeout_ms: u64) {
        CONFIG_TIMEOUT_CTRL.signal(timeout_ms);
    }
}

/// No panel is driven; screens go to the serial log.
struct LogDisplay;

impl engine::Display for LogDisplay {
    fn show(&mut self, screen: &Screen<'_>) {
        for line in screen.lines() {
            log::info!("[display] {}", line);
        }
    }
}

type Engine = Localizer<FirmwareRadio, FirmwareTimers, LogDisplay>;

// ── BLE scan event handler ───────────────────────────────────────────

/// EventHandler for BLE advertisement reports from trouble-host.
///
/// Called synchronously from the runner: must not block.
struct ScanEventHandler;

impl EventHandler for ScanEventHandler {
    fn on_adv_reports(&self, mut it: LeAdvReportsIter<'_>) {
        while let Some(Ok(report)) = it.next() {
            if let Some(scan) = ScanReport::new(report.rssi, report.data) {
                let _ = ENGINE_CHANNEL.try_send(EngineEvent::Scan(scan));
            }
        }
    }
}

// ── Entry point ──────────────────────────────────────────────────────

#[esp_rtos::main]
async fn main(spawner: embassy_executor::Spawner) {
    esp_println::logger::init_logger_from_env();

    let peripherals = esp_hal::init(esp_hal::Config::default());

    esp_alloc::heap_allocator!(size: 64 * 1024);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_int = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);

    log::info!("roomtag v{} starting on {}", VERSION, board::BOARD_NAME);

    // Hold power on (M5StickC Plus2 needs GPIO4 HIGH to stay powered)
    #[cfg(feature = "board-m5stickc")]
    let _power_hold = esp_hal::gpio::Output::new(
        peripherals.GPIO4,
        esp_hal::gpio::Level::High,
        esp_hal::gpio::OutputConfig::default(),
    );

    #[cfg(feature = "board-xiao")]
    let mode_button = Input::new(peripherals.GPIO0, InputConfig::default().with_pull(Pull::Up));
    #[cfg(feature = "board-m5stickc")]
    let mode_button = Input::new(peripherals.GPIO37, InputConfig::default().with_pull(Pull::Up));

    // Static random address from the factory MAC; top two bits set.
    let mut addr = esp_hal::efuse::Efuse::mac_address();
    addr.reverse();
    addr[5] |= 0xC0;

    let mut config = AssetConfig::new();
    config.set_identity_address(&addr);
    set_asset_config(config);
    log::info!(
        "Device {} on network {}",
        config.device_name(),
        config.network_id()
    );

    spawner.spawn(engine_task()).unwrap();
    spawner.spawn(periodic_timer_task()).unwrap();
    spawner
        .spawn(oneshot_timer_task(&FINDER_CTRL, TimerSignal::GatewayFinderTimeout))
        .unwrap();
    spawner
        .spawn(oneshot_timer_task(&CONFIG_TIMEOUT_CTRL, TimerSignal::ConfigModeTimeout))
        .unwrap();
    spawner.spawn(output_serial_task()).unwrap();
    spawner.spawn(status_task()).unwrap();

    // ── BLE radio initialization ───────────────────────────────────────

    let connector =
        esp_radio::ble::controller::BleConnector::new(peripherals.BT, Default::default())
            .expect("BLE connector init failed");
    let controller: ExternalController<_, 20> = ExternalController::new(connector);

    static HOST_RESOURCES: StaticCell<HostResources<DefaultPacketPool, 1, 2>> = StaticCell::new();
    let resources = HOST_RESOURCES.init(HostResources::new());

    let stack = trouble_host::new(controller, resources).set_random_address(Address::random(addr));
    let Host {
        mut peripheral,
        central,
        mut runner,
        ..
    } = stack.build();

    log::info!("BLE radio initialized");

    // The mode button is sampled only once the radio stack is ready.
    let button_pressed = if board::BUTTON_ACTIVE_LOW {
        mode_button.is_low()
    } else {
        mode_button.is_high()
    };
    let _ = ENGINE_CHANNEL.try_send(EngineEvent::Boot { button_pressed });

    static DEVICE_NAME: StaticCell<DeviceName> = StaticCell::new();
    let device_name: &'static str = fixed_str(DEVICE_NAME.init(*config.device_name_bytes()));

    let server = RoomtagServer::new_with_config(GapConfig::Peripheral(PeripheralConfig {
        name: device_name,
        appearance: &appearance::UNKNOWN,
    }))
    .expect("GATT server init failed");

    let scan_handler = ScanEventHandler;

    // ── BLE orchestration ──────────────────────────────────────────────
    //
    // Three concurrent futures via join3:
    //   1. BLE stack runner (drives HCI, delivers scan reports to handler)
    //   2. BLE scanner (starts/stops scan sessions on engine request)
    //   3. Advertiser (connectable position bursts, or config advertising),
    //      serving the GATT command service to whoever connects

    let _ = embassy_futures::join::join3(
        async {
            loop {
                if let Err(e) = runner.run_with_handler(&scan_handler).await {
                    log::error!("BLE runner error: {:?}", e);
                    Timer::after(Duration::from_secs(1)).await;
                }
            }
        },
        async {
            let mut scanner = trouble_host::scan::Scanner::new(central);
            let scan_config = ScanConfig::default();

            loop {
                while !SCAN_CTRL.wait().await {}

                let _session = match scanner.scan(&scan_config).await {
                    Ok(session) => session,
                    Err(e) => {
                        log::error!("BLE scan failed to start: {:?}", e);
                        Timer::after(Duration::from_secs(1)).await;
                        continue;
                    }
                };
                log::info!("BLE scan started");

                // Reports flow through ScanEventHandler until stopped.
                while SCAN_CTRL.wait().await {}
                log::info!("BLE scan stopped");
            }
        },
        async {
            loop {
                match ADVERT_CHANNEL.receive().await {
                    AdvertRequest::Room { network_id, room } => {
                        advertise_room(&mut peripheral, &server, device_name, network_id, &room).await;
                    }
                    AdvertRequest::Config => {
                        // Configuration mode only ends with a reset.
                        loop {
                            serve_config(&mut peripheral, &server, device_name).await;
                        }
                    }
                }
            }
        },
    )
    .await;
}

/// Broadcast one position advertisement burst.
///
/// The burst is connectable so a host can reach the command service in
/// normal mode; a client that connects is served until it disconnects.
async fn advertise_room<'a, C: Controller>(
    peripheral: &mut Peripheral<'a, C, DefaultPacketPool>,
    server: &RoomtagServer<'_>,
    device_name: &str,
    network_id: u32,
    room: &RoomResult,
) {
    let payload = protocol::position_payload(network_id, room);

    let mut adv_data = [0u8; 31];
    let adv_len = match AdStructure::encode_slice(
        &[
            AdStructure::Flags(LE_GENERAL_DISCOVERABLE | BR_EDR_NOT_SUPPORTED),
            AdStructure::ManufacturerSpecificData {
                company_identifier: defaults::COMPANY_ID,
                payload: &payload,
            },
        ],
        &mut adv_data[..],
    ) {
        Ok(len) => len,
        Err(e) => {
            log::error!("Ad encode error: {:?}", e);
            return;
        }
    };

    let mut scan_data = [0u8; 31];
    let scan_len = match AdStructure::encode_slice(
        &[AdStructure::CompleteLocalName(device_name.as_bytes())],
        &mut scan_data[..],
    ) {
        Ok(len) => len,
        Err(e) => {
            log::error!("Scan response encode error: {:?}", e);
            return;
        }
    };

    let advertiser = match peripheral
        .advertise(
            &Default::default(),
            Advertisement::ConnectableScannableUndirected {
                adv_data: &adv_data[..adv_len],
                scan_data: &scan_data[..scan_len],
            },
        )
        .await
    {
        Ok(adv) => adv,
        Err(e) => {
            log::error!("BLE advertise error: {:?}", e);
            return;
        }
    };

    log::info!("Advertising room {} for {} ms", room.name(), defaults::ADVERTISER_TIMEOUT_MS);
    let burst = Timer::after(Duration::from_millis(defaults::ADVERTISER_TIMEOUT_MS));
    match select(advertiser.accept(), burst).await {
        Either::First(Ok(conn)) => serve_client(conn, server).await,
        Either::First(Err(e)) => log::error!("BLE accept error: {:?}", e),
        Either::Second(()) => {}
    }
}

/// Advertise connectable, accept one configuration client and serve it
/// until it disconnects.
async fn serve_config<'a, C: Controller>(
    peripheral: &mut Peripheral<'a, C, DefaultPacketPool>,
    server: &RoomtagServer<'_>,
    device_name: &str,
) {
    let mut adv_data = [0u8; 31];
    let adv_len = match AdStructure::encode_slice(
        &[
            AdStructure::Flags(LE_GENERAL_DISCOVERABLE | BR_EDR_NOT_SUPPORTED),
            AdStructure::CompleteLocalName(device_name.as_bytes()),
        ],
        &mut adv_data[..],
    ) {
        Ok(len) => len,
        Err(e) => {
            log::error!("Ad encode error: {:?}", e);
            Timer::after(Duration::from_secs(5)).await;
            return;
        }
    };

    let advertiser = match peripheral
        .advertise(
            &Default::default(),
            Advertisement::ConnectableScannableUndirected {
                adv_data: &adv_data[..adv_len],
                scan_data: &[],
            },
        )
        .await
    {
        Ok(adv) => adv,
        Err(e) => {
            log::error!("BLE advertise error: {:?}", e);
            Timer::after(Duration::from_secs(5)).await;
            return;
        }
    };

    log::info!("BLE advertising for configuration as '{}'", device_name);

    match advertiser.accept().await {
        Ok(conn) => serve_client(conn, server).await,
        Err(e) => log::error!("BLE accept error: {:?}", e),
    }
}

/// Attach the command service to an accepted connection and serve it.
async fn serve_client(conn: Connection<'_, DefaultPacketPool>, server: &RoomtagServer<'_>) {
    let gatt_conn = match conn.with_attribute_server(server) {
        Ok(gc) => gc,
        Err(e) => {
            log::error!("GATT setup error: {:?}", e);
            return;
        }
    };

    log::info!("BLE client connected");
    BLE_CLIENTS.fetch_add(1, Ordering::Relaxed);

    handle_gatt_connection(&gatt_conn, server).await;

    BLE_CLIENTS.fetch_sub(1, Ordering::Relaxed);
    log::info!("BLE client disconnected");
}

/// Handle a GATT connection: forward output messages as notifications
/// and process incoming writes as host commands.
async fn handle_gatt_connection<'s, P: PacketPool>(
    conn: &GattConnection<'_, 's, P>,
    server: &'s RoomtagServer<'_>,
) {
    let ble_rx = BLE_OUTPUT_CHANNEL.receiver();
    let mut line_reader = LineReader::new();

    loop {
        match select(ble_rx.receive(), conn.next()).await {
            Either::First(msg) => {
                // Pad with newlines so the host NDJSON parser sees
                // harmless empty lines instead of null bytes.
                for chunk in msg.chunks(comm::BLE_MAX_NOTIFY) {
                    let mut padded = [b'\n'; comm::BLE_MAX_NOTIFY];
                    padded[..chunk.len()].copy_from_slice(chunk);
                    if server
                        .config_service
                        .tx
                        .notify(conn, &padded)
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
            Either::Second(event) => match event {
                GattConnectionEvent::Disconnected { .. } => return,
                GattConnectionEvent::Gatt { event } => {
                    if let GattEvent::Write(ref write_event) = event {
                        if write_event.handle() == server.config_service.rx.handle {
                            for &byte in write_event.data() {
                                if let Some(line) = line_reader.feed(byte) {
                                    match comm::parse_command(line) {
                                        Some(cmd) => {
                                            let _ = ENGINE_CHANNEL.try_send(EngineEvent::Command(cmd));
                                        }
                                        None => log::warn!("Unrecognized host command"),
                                    }
                                }
                            }
                        }
                    }
                    // Must accept/reply to all GATT events
                    if let Ok(reply) = event.accept() {
                        reply.send().await;
                    }
                }
                _ => {}
            },
        }
    }
}

// ── Tasks ────────────────────────────────────────────────────────────

/// Engine task: the only place engine state is touched.
#[embassy_executor::task]
async fn engine_task() {
    log::info!("Engine task started");

    let mut engine: Engine = Localizer::new(get_asset_config(), FirmwareRadio, FirmwareTimers, LogDisplay);
    let rx = ENGINE_CHANNEL.receiver();

    loop {
        let outcome = match rx.receive().await {
            EngineEvent::Boot { button_pressed } => {
                engine.select_mode(button_pressed);
                None
            }
            EngineEvent::Scan(report) => engine.on_scan_report(&report),
            EngineEvent::Command(cmd) => {
                if let Some(reply) = engine.on_command(&cmd) {
                    send_reply(&engine, reply);
                }
                set_asset_config(*engine.config());
                None
            }
            EngineEvent::Wake => None,
        };
        if let Some(outcome) = outcome {
            publish(&engine, outcome);
        }

        let signals = SIGNALS.drain();
        if !signals.is_empty() {
            if let Some(outcome) = engine.handle_signals(signals) {
                publish(&engine, outcome);
            }
        }
    }
}

/// Periodic positioning trigger. Idle until started.
#[embassy_executor::task]
async fn periodic_timer_task() {
    let mut period: Option<Duration> = None;
    loop {
        match period {
            None => period = PERIODIC_CTRL.wait().await.map(Duration::from_millis),
            Some(p) => match select(Timer::after(p), PERIODIC_CTRL.wait()).await {
                Either::First(()) => raise(TimerSignal::PositioningTrigger),
                Either::Second(ctrl) => period = ctrl.map(Duration::from_millis),
            },
        }
    }
}

/// One-shot timer; a new control value restarts it.
#[embassy_executor::task(pool_size = 2)]
async fn oneshot_timer_task(ctrl: &'static OneShotControl, signal: TimerSignal) {
    loop {
        let mut timeout_ms = ctrl.wait().await;
        loop {
            match select(Timer::after(Duration::from_millis(timeout_ms)), ctrl.wait()).await {
                Either::First(()) => {
                    raise(signal);
                    break;
                }
                Either::Second(restart) => timeout_ms = restart,
            }
        }
    }
}

/// Serial output task: reads from output channel, logs to serial,
/// and forwards a clone to the BLE output channel.
#[embassy_executor::task]
async fn output_serial_task() {
    log::info!("Serial output task started");

    let output_rx = OUTPUT_CHANNEL.receiver();

    loop {
        let msg = output_rx.receive().await;

        // Forward to BLE output channel (non-blocking, drops if full or no client)
        if BLE_CLIENTS.load(Ordering::Relaxed) > 0 {
            let _ = BLE_OUTPUT_CHANNEL.try_send(msg.clone());
        }

        if let Ok(s) = core::str::from_utf8(&msg) {
            log::info!("{}", s.trim_end());
        }
    }
}

/// Periodic status reporting task
#[embassy_executor::task]
async fn status_task() {
    loop {
        Timer::after(Duration::from_secs(30)).await;
        let _ = ENGINE_CHANNEL.try_send(EngineEvent::Command(HostCommand::GetStatus));
    }
}

fn publish(engine: &Engine, outcome: Outcome) {
    match outcome {
        Outcome::Reported(room) => emit(&DeviceMessage::Room {
            room_id: room.room_id,
            room: room.name(),
            rssi: room.rssi as i16,
            gateways: engine.session().gateways as u8,
            ts: uptime_ms(),
        }),
        Outcome::Unavailable => emit(&DeviceMessage::Unavailable { ts: uptime_ms() }),
        Outcome::ConfigExpired => {
            log::info!("Configuration window closed, restarting");
            esp_hal::system::software_reset();
        }
    }
}

fn send_reply(engine: &Engine, reply: Reply) {
    match reply {
        Reply::Status => {
            let session = engine.session();
            emit(&DeviceMessage::Status {
                mode: session.state.mode_str(),
                phase: session.state.phase_str(),
                gateways: session.gateways as u8,
                room: session.last_room.as_ref().map(|r| r.name()),
                service: session.service_enabled,
                uptime: uptime_ms() / 1000,
                heap_free: esp_alloc::HEAP.free() as u32,
                board: board::BOARD_NAME,
                version: VERSION,
            });
        }
        Reply::Config => {
            let config = engine.config();
            emit(&DeviceMessage::Config {
                name: config.device_name(),
                network_id: config.network_id(),
                interval: config.reporting_interval_s(),
            });
        }
    }
}

fn emit(msg: &DeviceMessage) {
    let mut buf = MsgBuffer::new();
    buf.resize_default(MAX_MSG_LEN).ok();
    if let Some(len) = comm::serialize_message(msg, &mut buf) {
        buf.truncate(len);
        let _ = OUTPUT_CHANNEL.try_send(buf);
    }
}
