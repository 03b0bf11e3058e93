/// Localization state machine.
///
/// Owns the gateway registry and the configuration and drives one
/// localization cycle at a time:
///
/// ```text
/// Unselected ──button──▶ ConfigMode ──timeout──▶ reset
///      │
///      └──────────────▶ Normal(Idle)
///                          │ trigger
///                          ▼
///        GatewayFinding ──finder timeout──▶ Sampling ──all ready──▶ Calculating
///              │ none found                                           │
///              ▼                                                      ▼
///        ServiceUnavailable                                     Reporting ─▶ Idle
/// ```
///
/// All side effects go through the [`Radio`], [`Timers`] and [`Display`]
/// seams. Timer expiry arrives as drained [`Signals`]; nothing here runs in
/// timer context.
use crate::collector::{self, Ingest};
use crate::comm;
use crate::config::AssetConfig;
use crate::defaults::{CONFIG_MODE_TIMEOUT_MS, GATEWAY_FINDER_TIMEOUT_MS};
use crate::display::Screen;
use crate::filter;
use crate::protocol::HostCommand;
use crate::registry::GatewayRegistry;
use crate::scanner::{self, ScanReport};
use crate::selector::{self, RoomResult};
use crate::signal::{Signals, TimerSignal};

/// BLE radio operations the engine needs.
pub trait Radio {
    fn start_scan(&mut self);
    fn stop_scan(&mut self);
    /// Connectable advertising under `device_name` for configuration.
    fn advertise_config(&mut self, device_name: &str);
    /// Broadcast the resolved room.
    fn advertise_room(&mut self, network_id: u32, room: &RoomResult);
}

/// Timer control. Expiry is reported back as [`TimerSignal`]s.
///
/// Starting a timer that is already running restarts it.
pub trait Timers {
    fn start_periodic(&mut self, interval_ms: u64);
    fn stop_periodic(&mut self);
    fn start_gateway_finder(&mut self, timeout_ms: u64);
    fn start_config_timeout(&mut self, timeout_ms: u64);
}

/// Status display sink.
pub trait Display {
    fn show(&mut self, screen: &Screen<'_>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the next periodic trigger
    Idle,
    GatewayFinding,
    Sampling,
    Calculating,
    Reporting,
    /// Last discovery found no gateways
    ServiceUnavailable,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::GatewayFinding => "finding",
            Phase::Sampling => "sampling",
            Phase::Calculating => "calculating",
            Phase::Reporting => "reporting",
            Phase::ServiceUnavailable => "unavailable",
        }
    }

    /// A cycle is in flight and would be abandoned by a new trigger.
    fn in_cycle(self) -> bool {
        matches!(
            self,
            Phase::GatewayFinding | Phase::Sampling | Phase::Calculating | Phase::Reporting
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unselected,
    ConfigMode,
    Normal(Phase),
}

impl State {
    pub fn mode_str(self) -> &'static str {
        match self {
            State::Unselected => "unselected",
            State::ConfigMode => "config",
            State::Normal(_) => "normal",
        }
    }

    pub fn phase_str(self) -> &'static str {
        match self {
            State::Normal(phase) => phase.as_str(),
            _ => "-",
        }
    }
}

/// Snapshot of the engine for status queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Session {
    pub state: State,
    /// Gateways found by the last discovery phase
    pub gateways: usize,
    pub last_room: Option<RoomResult>,
    pub service_enabled: bool,
    /// Network the in-flight cycle qualifies gateways against
    pub cycle_network_id: u32,
}

/// Something the platform should publish or act on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// A cycle resolved to a room
    Reported(RoomResult),
    /// Discovery found no gateways
    Unavailable,
    /// Configuration mode timed out; the platform should reset
    ConfigExpired,
}

/// What a host command wants sent back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Status,
    Config,
}

pub struct Localizer<R, T, D> {
    config: AssetConfig,
    registry: GatewayRegistry,
    session: Session,
    radio: R,
    timers: T,
    display: D,
}

impl<R: Radio, T: Timers, D: Display> Localizer<R, T, D> {
    pub fn new(config: AssetConfig, radio: R, timers: T, display: D) -> Self {
        Self {
            config,
            registry: GatewayRegistry::new(),
            session: Session {
                state: State::Unselected,
                gateways: 0,
                last_room: None,
                service_enabled: true,
                cycle_network_id: config.network_id(),
            },
            radio,
            timers,
            display,
        }
    }

    pub fn state(&self) -> State {
        self.session.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &AssetConfig {
        &self.config
    }

    pub fn registry(&self) -> &GatewayRegistry {
        &self.registry
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn timers(&self) -> &T {
        &self.timers
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    /// Pick the operating mode from the boot button sample.
    ///
    /// Only the first call has an effect; the mode cannot change until reset.
    pub fn select_mode(&mut self, button_pressed: bool) -> State {
        if self.session.state != State::Unselected {
            log::warn!("Mode already selected, ignoring");
            return self.session.state;
        }
        if button_pressed {
            self.enter_config_mode();
        } else {
            self.enter_normal_mode();
        }
        self.session.state
    }

    fn enter_config_mode(&mut self) {
        log::info!("Entering configuration mode as {}", self.config.device_name());
        self.session.state = State::ConfigMode;
        self.radio.advertise_config(self.config.device_name());
        self.timers.start_config_timeout(CONFIG_MODE_TIMEOUT_MS);
        self.show_config();
    }

    fn enter_normal_mode(&mut self) {
        log::info!(
            "Entering normal mode on network {} every {}s",
            self.config.network_id(),
            self.config.reporting_interval_s()
        );
        self.session.state = State::Normal(Phase::Idle);
        self.display.show(&Screen::Waiting {
            device_name: self.config.device_name(),
        });
        if self.session.service_enabled {
            self.timers.start_periodic(self.config.reporting_interval_ms());
        }
    }

    /// Act on drained timer signals.
    ///
    /// A finder timeout is handled before a trigger from the same batch, so
    /// the trigger always starts a fresh discovery window.
    pub fn handle_signals(&mut self, signals: Signals) -> Option<Outcome> {
        let mut outcome = None;

        if signals.contains(TimerSignal::ConfigModeTimeout) {
            if self.session.state == State::ConfigMode {
                log::info!("Configuration mode timed out");
                outcome = Some(Outcome::ConfigExpired);
            } else {
                log::debug!("Stale config timeout ignored");
            }
        }

        if signals.contains(TimerSignal::GatewayFinderTimeout) {
            if let Some(o) = self.finish_discovery() {
                outcome = Some(o);
            }
        }

        if signals.contains(TimerSignal::PositioningTrigger) {
            self.begin_discovery();
        }

        outcome
    }

    /// Feed one advertisement report from the scanner.
    pub fn on_scan_report(&mut self, report: &ScanReport) -> Option<Outcome> {
        let State::Normal(phase) = self.session.state else {
            return None;
        };
        let adv = scanner::qualify(report, self.session.cycle_network_id)?;

        match phase {
            Phase::GatewayFinding => {
                self.registry.register_or_ignore(&adv);
                None
            }
            Phase::Sampling => match collector::ingest(&mut self.registry, &adv.device_name, report.rssi) {
                Ingest::BecameReady(_) if collector::all_ready(&self.registry) => self.calculate(),
                _ => None,
            },
            _ => None,
        }
    }

    /// Apply a host command. Returns the reply the host expects, if any.
    pub fn on_command(&mut self, cmd: &HostCommand) -> Option<Reply> {
        match *cmd {
            HostCommand::Start => {
                self.enable_service();
                Some(Reply::Status)
            }
            HostCommand::Stop => {
                self.disable_service();
                Some(Reply::Status)
            }
            HostCommand::GetStatus => Some(Reply::Status),
            HostCommand::GetConfig => Some(Reply::Config),
            HostCommand::SetNetwork { .. } | HostCommand::SetInterval { .. } => {
                let changed = comm::apply_config_command(cmd, &mut self.config);
                match self.session.state {
                    State::ConfigMode => {
                        self.timers.start_config_timeout(CONFIG_MODE_TIMEOUT_MS);
                        self.show_config();
                    }
                    State::Normal(_) if changed && self.session.service_enabled => {
                        if matches!(cmd, HostCommand::SetInterval { .. }) {
                            self.timers.start_periodic(self.config.reporting_interval_ms());
                        }
                    }
                    _ => {}
                }
                Some(Reply::Config)
            }
        }
    }

    pub fn enable_service(&mut self) {
        if self.session.service_enabled {
            return;
        }
        self.session.service_enabled = true;
        log::info!("Localization service enabled");
        if let State::Normal(_) = self.session.state {
            self.timers.start_periodic(self.config.reporting_interval_ms());
        }
    }

    pub fn disable_service(&mut self) {
        if !self.session.service_enabled {
            return;
        }
        self.session.service_enabled = false;
        log::info!("Localization service disabled");
        if let State::Normal(phase) = self.session.state {
            self.timers.stop_periodic();
            if phase.in_cycle() {
                log::warn!("Abandoning {} cycle", phase.as_str());
                self.radio.stop_scan();
                self.registry.clear_all();
            }
            self.session.state = State::Normal(Phase::Idle);
        }
    }

    fn begin_discovery(&mut self) {
        let State::Normal(phase) = self.session.state else {
            log::debug!("Trigger outside normal mode ignored");
            return;
        };
        if !self.session.service_enabled {
            return;
        }
        if phase.in_cycle() {
            log::warn!("Abandoning {} cycle for new trigger", phase.as_str());
            self.radio.stop_scan();
        }

        log::info!("Searching for gateways");
        self.registry.clear_all();
        self.session.gateways = 0;
        self.session.cycle_network_id = self.config.network_id();
        self.session.state = State::Normal(Phase::GatewayFinding);
        self.radio.start_scan();
        self.timers.start_gateway_finder(GATEWAY_FINDER_TIMEOUT_MS);
    }

    fn finish_discovery(&mut self) -> Option<Outcome> {
        if self.session.state != State::Normal(Phase::GatewayFinding) {
            log::debug!("Stale gateway finder timeout ignored");
            return None;
        }
        self.session.gateways = self.registry.len();
        if self.registry.is_empty() {
            self.mark_unavailable();
            return Some(Outcome::Unavailable);
        }

        log::info!("Found {} gateways, sampling", self.registry.len());
        self.registry.reset_all();
        self.session.state = State::Normal(Phase::Sampling);
        None
    }

    fn mark_unavailable(&mut self) {
        log::info!("No gateways found");
        self.radio.stop_scan();
        self.registry.clear_all();
        self.session.state = State::Normal(Phase::ServiceUnavailable);
        self.display.show(&Screen::Unavailable {
            device_name: self.config.device_name(),
        });
    }

    fn calculate(&mut self) -> Option<Outcome> {
        self.session.state = State::Normal(Phase::Calculating);
        self.radio.stop_scan();
        filter::apply(&mut self.registry);

        match selector::select_room(self.registry.records()) {
            Some(room) => Some(self.report(room)),
            None => {
                self.mark_unavailable();
                Some(Outcome::Unavailable)
            }
        }
    }

    fn report(&mut self, room: RoomResult) -> Outcome {
        self.session.state = State::Normal(Phase::Reporting);
        log::info!("Located in room {} ({}) at {} dBm", room.name(), room.room_id, room.rssi);
        self.session.last_room = Some(room);
        self.radio.advertise_room(self.session.cycle_network_id, &room);
        self.display.show(&Screen::Room {
            device_name: self.config.device_name(),
            room_name: room.name(),
        });
        self.session.state = State::Normal(Phase::Idle);
        Outcome::Reported(room)
    }

    fn show_config(&mut self) {
        self.display.show(&Screen::Config {
            device_name: self.config.device_name(),
            network_id: self.config.network_id(),
            reporting_interval_s: self.config.reporting_interval_s(),
        });
    }
}
