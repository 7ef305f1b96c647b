use chrono::{Local, Timelike};
use pricestat_lib::{
    Band, Command, Fault, FetchApplied, FetchOutcome, PriceCeiling, PriceGate, Snapshot,
    ThermalController,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::board::Board;
use crate::err::PricestatError;
use crate::price::PriceSource;
use crate::status::{publish, SWatchSender};

pub const DEFAULT_TICK: Duration = Duration::from_secs(30);

/// How long the last hour read from the board clock stands in for a missing
/// one before the host clock takes over.
const BOARD_CLOCK_HOLD: Duration = Duration::from_secs(5 * 60);

type FetchResult = (u8, FetchOutcome);

fn local_hour() -> u8 {
    u8::try_from(Local::now().hour()).unwrap_or_default()
}

/// Owns the price gate and the thermal state machine and reconciles them
/// with the board once per tick.
pub struct Controller {
    board: Box<dyn Board>,
    prices: Arc<dyn PriceSource>,
    gate: PriceGate,
    thermal: ThermalController,
    results_tx: async_channel::Sender<FetchResult>,
    results_rx: async_channel::Receiver<FetchResult>,
    pub_status: SWatchSender,
    tick_duration: Duration,
    board_clock: Option<(u8, Instant)>,
}

impl Controller {
    pub fn new(
        board: Box<dyn Board>,
        prices: Arc<dyn PriceSource>,
        ceiling: PriceCeiling,
        band: Band,
        pub_status: SWatchSender,
    ) -> Self {
        let (results_tx, results_rx) = async_channel::unbounded();
        Self {
            board,
            prices,
            gate: PriceGate::new(ceiling),
            thermal: ThermalController::new(band),
            results_tx,
            results_rx,
            pub_status,
            tick_duration: DEFAULT_TICK,
            board_clock: None,
        }
    }

    #[must_use]
    pub fn with_tick(mut self, tick_duration: Duration) -> Self {
        self.tick_duration = tick_duration;
        self
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.gate, &self.thermal)
    }

    pub async fn run(mut self, cancellation: CancellationToken) {
        let mut interval = tokio::time::interval(self.tick_duration);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    break;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }

        tracing::info!("shutting down, switching relay off");
        self.thermal.apply(Command::Stop);
        self.drive(Command::Stop).await;
        publish(&self.pub_status, self.snapshot());
    }

    /// One reconciliation round. Never fails: any error ends up as a stop.
    pub async fn tick(&mut self) -> Command {
        let command = match self.step().await {
            Ok(command) => command,
            Err(e) => {
                tracing::error!("tick failed, stopping heating: {}", e);
                self.thermal.apply(Command::Stop);
                self.drive(Command::Stop).await;
                Command::Stop
            }
        };

        let snapshot = self.snapshot();
        tracing::debug!(?snapshot, ?command, "tick done");
        publish(&self.pub_status, snapshot);
        command
    }

    async fn step(&mut self) -> Result<Command, PricestatError> {
        let status = self.board.status().await?;

        let hour = self.current_hour(status.hour);
        if self.gate.observe_hour(hour) {
            tracing::info!("hour is now {}, price verdict reset", hour);
        }
        self.apply_fetch_results();
        self.maybe_fetch(hour);

        if self.thermal.reconcile_relay(status.relay) == Command::Stop {
            tracing::warn!("{}, stopping heating", Fault::Actuator);
            self.drive(Command::Stop).await;
            return Ok(Command::Stop);
        }

        let temperature = match status.temperature {
            Ok(t) => Some(t),
            Err(e) => {
                tracing::warn!("{}", Fault::Sensor(e));
                None
            }
        };

        let verdict = self.gate.verdict();
        let command = self.thermal.evaluate(verdict, temperature);
        tracing::info!(
            "temperature: {:?} / {}..{} price: {:?} => {:?}",
            temperature,
            self.thermal.band().min(),
            self.thermal.band().max(),
            verdict,
            command
        );
        self.drive(command).await;
        Ok(command)
    }

    /// Prefer the board clock. A board that stops reporting the time for a
    /// tick or two keeps its last hour, so switching between clocks in
    /// different time zones does not look like a rollover.
    fn current_hour(&mut self, reported: Option<u8>) -> u8 {
        let now = Instant::now();
        if let Some(hour) = reported {
            self.board_clock = Some((hour, now));
            return hour;
        }
        match self.board_clock {
            Some((hour, seen)) if now.duration_since(seen) < BOARD_CLOCK_HOLD => {
                tracing::debug!("board clock missing, keeping hour {}", hour);
                hour
            }
            Some(_) => {
                tracing::warn!("board clock gone, using host clock");
                self.board_clock = None;
                local_hour()
            }
            None => local_hour(),
        }
    }

    /// Results of fetches started on earlier ticks.
    fn apply_fetch_results(&mut self) {
        while let Ok((hour, outcome)) = self.results_rx.try_recv() {
            match self.gate.on_fetch_result(hour, outcome) {
                FetchApplied::Cached(verdict) => {
                    tracing::info!("price for hour {} is {:?}", hour, verdict);
                }
                FetchApplied::Failed {
                    fault,
                    transient: true,
                } => tracing::warn!("{}, retrying next tick", fault),
                FetchApplied::Failed {
                    fault,
                    transient: false,
                } => tracing::error!("{}, treating price as too high", fault),
                FetchApplied::Stale => {
                    tracing::debug!("dropping price answer for past hour {}", hour);
                }
            }
        }
    }

    fn maybe_fetch(&mut self, hour: u8) {
        if !self.gate.should_fetch(hour) {
            return;
        }
        let request = self.gate.begin_fetch(hour);
        let prices = Arc::clone(&self.prices);
        let results = self.results_tx.clone();
        tokio::spawn(async move {
            let outcome = prices.fetch(request).await;
            if results.send((request.hour, outcome)).await.is_err() {
                tracing::debug!("controller gone, dropping price answer");
            }
        });
    }

    async fn drive(&mut self, command: Command) {
        let on = match command {
            Command::Start => true,
            Command::Stop => false,
            Command::NoOp => return,
        };
        tracing::info!("Relay {}", if on { "ON" } else { "OFF" });
        if let Err(e) = self.board.set_relay(on).await {
            tracing::warn!("relay command failed, will reconcile next tick: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::BoardStatus;
    use async_trait::async_trait;
    use pricestat_lib::{SensorErr, Verdict};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Device {
        relay: Option<bool>,
        temperature: Result<f64, SensorErr>,
        hour: Option<u8>,
        unreachable: bool,
        commands: Vec<bool>,
    }

    #[derive(Clone)]
    struct FakeBoard(Arc<Mutex<Device>>);

    #[async_trait]
    impl Board for FakeBoard {
        async fn status(&mut self) -> Result<BoardStatus, PricestatError> {
            let d = self.0.lock().unwrap();
            if d.unreachable {
                return Err(PricestatError::Closed);
            }
            Ok(BoardStatus {
                relay: d.relay,
                temperature: d.temperature,
                hour: d.hour,
            })
        }

        async fn set_relay(&mut self, on: bool) -> Result<(), PricestatError> {
            let mut d = self.0.lock().unwrap();
            d.commands.push(on);
            d.relay = Some(on);
            Ok(())
        }
    }

    struct FakePrices {
        outcome: Mutex<FetchOutcome>,
        hang: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PriceSource for FakePrices {
        async fn fetch(&self, _request: pricestat_lib::PriceRequest) -> FetchOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            *self.outcome.lock().unwrap()
        }
    }

    struct Rig {
        controller: Controller,
        device: Arc<Mutex<Device>>,
        prices: Arc<FakePrices>,
    }

    impl Rig {
        fn new(outcome: FetchOutcome) -> Self {
            Self::build(outcome, false)
        }

        fn build(outcome: FetchOutcome, hang: bool) -> Self {
            let device = Arc::new(Mutex::new(Device {
                relay: Some(false),
                temperature: Ok(21.9),
                hour: Some(21),
                unreachable: false,
                commands: vec![],
            }));
            let prices = Arc::new(FakePrices {
                outcome: Mutex::new(outcome),
                hang,
                calls: AtomicUsize::new(0),
            });
            let (tx, _rx) = crate::status::channel();
            let controller = Controller::new(
                Box::new(FakeBoard(device.clone())),
                prices.clone(),
                PriceCeiling::new(9.0).unwrap(),
                Band::new(22.1, 22.5).unwrap(),
                tx,
            );
            Self {
                controller,
                device,
                prices,
            }
        }

        /// Tick, then let spawned fetches deliver their answers.
        async fn tick(&mut self) -> Command {
            let command = self.controller.tick().await;
            for _ in 0..10 {
                tokio::task::yield_now().await;
            }
            command
        }

        fn calls(&self) -> usize {
            self.prices.calls.load(Ordering::SeqCst)
        }

        fn device(&self) -> std::sync::MutexGuard<'_, Device> {
            self.device.lock().unwrap()
        }
    }

    const CHEAP: FetchOutcome = FetchOutcome::Success { cheap: true };
    const EXPENSIVE: FetchOutcome = FetchOutcome::Success { cheap: false };

    #[tokio::test]
    async fn price_answer_lands_on_the_next_tick() {
        let mut rig = Rig::new(CHEAP);

        assert_eq!(rig.tick().await, Command::NoOp);
        assert_eq!(rig.calls(), 1);
        assert_eq!(rig.controller.snapshot().price_verdict, Verdict::Unknown);

        assert_eq!(rig.tick().await, Command::Start);
        assert_eq!(rig.device().relay, Some(true));
        assert!(rig.controller.snapshot().rising);
    }

    #[tokio::test]
    async fn one_fetch_per_hour() {
        let mut rig = Rig::new(CHEAP);
        for _ in 0..20 {
            rig.tick().await;
        }
        assert_eq!(rig.calls(), 1);
        assert_eq!(rig.controller.snapshot().cached_hour, Some(21));
        assert!(rig.controller.snapshot().price_fetched);

        rig.device().hour = Some(22);
        assert_eq!(rig.tick().await, Command::Stop, "verdict unknown after rollover");
        assert_eq!(rig.calls(), 2);
        assert_eq!(rig.tick().await, Command::Start);
        assert_eq!(rig.calls(), 2);
    }

    #[tokio::test]
    async fn failing_price_service_is_retried_every_tick() {
        let mut rig = Rig::new(FetchOutcome::Transient(Fault::PriceService(500)));
        for _ in 0..3 {
            assert_ne!(rig.tick().await, Command::Start);
        }
        assert_eq!(rig.calls(), 3);
        assert_eq!(rig.controller.snapshot().price_verdict, Verdict::Expensive);
        assert_eq!(rig.controller.snapshot().cached_hour, None);
        assert!(rig.device().commands.is_empty());
    }

    #[tokio::test]
    async fn outstanding_fetch_is_not_duplicated() {
        let mut rig = Rig::build(CHEAP, true);
        for _ in 0..5 {
            assert_eq!(rig.tick().await, Command::NoOp);
        }
        assert_eq!(rig.calls(), 1);
    }

    #[tokio::test]
    async fn expensive_price_stops_heating() {
        let mut rig = Rig::new(CHEAP);
        rig.tick().await;
        assert_eq!(rig.tick().await, Command::Start);

        *rig.prices.outcome.lock().unwrap() = EXPENSIVE;
        rig.device().hour = Some(22);
        rig.tick().await;
        assert_eq!(rig.device().relay, Some(false));
        assert_eq!(rig.tick().await, Command::NoOp);
        assert_eq!(rig.controller.snapshot().price_verdict, Verdict::Expensive);
    }

    #[tokio::test]
    async fn sensor_fault_stops_heating() {
        let mut rig = Rig::new(CHEAP);
        rig.tick().await;
        rig.tick().await;
        assert_eq!(rig.device().relay, Some(true));

        rig.device().temperature = Err(SensorErr::NonNumeric);
        assert_eq!(rig.tick().await, Command::Stop);
        assert_eq!(rig.device().relay, Some(false));
        assert_eq!(rig.controller.snapshot().last_temp, None);
    }

    #[tokio::test]
    async fn missing_relay_report_stops_without_evaluating() {
        let mut rig = Rig::new(CHEAP);
        rig.tick().await;
        rig.device().relay = None;
        assert_eq!(rig.tick().await, Command::Stop);
        assert_eq!(rig.device().commands, vec![false]);
        assert!(!rig.controller.snapshot().relay_on);
    }

    #[tokio::test]
    async fn unreachable_board_stops_and_keeps_ticking() {
        let mut rig = Rig::new(CHEAP);
        rig.tick().await;
        rig.tick().await;
        rig.device().unreachable = true;
        assert_eq!(rig.tick().await, Command::Stop);
        assert_eq!(rig.tick().await, Command::Stop);

        rig.device().unreachable = false;
        assert_eq!(rig.tick().await, Command::Start);
    }

    #[tokio::test]
    async fn relay_switched_off_externally_is_picked_up() {
        let mut rig = Rig::new(CHEAP);
        rig.tick().await;
        rig.tick().await;
        rig.device().relay = Some(false);
        rig.device().temperature = Ok(22.3);
        assert_eq!(rig.tick().await, Command::NoOp);
        assert!(!rig.controller.snapshot().rising);
    }

    #[tokio::test(start_paused = true)]
    async fn board_clock_gap_is_not_a_rollover() {
        let mut rig = Rig::new(CHEAP);
        rig.tick().await;
        assert_eq!(rig.tick().await, Command::Start);

        rig.device().hour = None;
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(rig.tick().await, Command::NoOp);
        assert_eq!(rig.calls(), 1);
        assert_eq!(rig.controller.snapshot().price_verdict, Verdict::Cheap);
        assert_eq!(rig.device().relay, Some(true));

        rig.device().hour = Some(21);
        assert_eq!(rig.tick().await, Command::NoOp);
        assert_eq!(rig.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn long_board_clock_outage_falls_back_to_host_clock() {
        let mut rig = Rig::new(CHEAP);
        rig.tick().await;
        rig.device().hour = None;
        tokio::time::advance(BOARD_CLOCK_HOLD + Duration::from_secs(1)).await;
        rig.tick().await;
        assert_eq!(rig.controller.board_clock, None);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_switches_relay_off() {
        let rig = Rig::new(CHEAP);
        let device = rig.device.clone();
        let cancellation = CancellationToken::new();
        let task = tokio::spawn(
            rig.controller
                .with_tick(Duration::from_secs(10))
                .run(cancellation.clone()),
        );

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(device.lock().unwrap().relay, Some(true));

        cancellation.cancel();
        task.await.unwrap();
        assert_eq!(device.lock().unwrap().relay, Some(false));
    }
}
