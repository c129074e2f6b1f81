// src/controller.rs
use crate::config::SensorConfig;
use crate::error::SensorError;
use crate::link::{Connector, Link};
use crate::sampler::Sampler;
use crate::session::SessionStore;
use crate::types::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// Owns everything a run needs: the Run Flag, the sampler thread, the parked
/// link, the session samples and the serial-monitor log.
///
/// All methods are called from the UI thread. The sampler only talks back
/// through `rx`, drained by [`Controller::pump`].
pub struct Controller {
    config: SensorConfig,
    connector: Box<dyn Connector>,
    running: Arc<AtomicBool>,
    link_state: LinkState,
    tx: Sender<SensorMessage>,
    rx: Receiver<SensorMessage>,
    worker: Option<JoinHandle<Box<dyn Link>>>,
    // Stop leaves the link open; it is closed at the next Start or on drop.
    parked_link: Option<Box<dyn Link>>,
    store: SessionStore,
    log_entries: Vec<LogEntry>,
    readout: Option<f64>,
    chart_generation: u64,
    alert: Option<String>,
    notify: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Controller {
    pub fn new(config: SensorConfig, connector: Box<dyn Connector>) -> Self {
        let (tx, rx) = channel();
        Self {
            config,
            connector,
            running: Arc::new(AtomicBool::new(false)),
            link_state: LinkState::Disconnected,
            tx,
            rx,
            worker: None,
            parked_link: None,
            store: SessionStore::default(),
            log_entries: Vec::new(),
            readout: None,
            chart_generation: 0,
            alert: None,
            notify: None,
        }
    }

    /// Called by the sampler after every message, e.g. to request a repaint.
    pub fn with_notify(mut self, notify: Arc<dyn Fn() + Send + Sync>) -> Self {
        self.notify = Some(notify);
        self
    }

    pub fn dispatch(&mut self, cmd: GuiCommand) {
        match cmd {
            GuiCommand::Start => {
                // Failures are already logged and raised as an alert.
                self.start().ok();
            }
            GuiCommand::Stop => self.stop(),
            GuiCommand::Clear => self.clear(),
        }
    }

    /// Connects and launches the sampler. No-op while running.
    pub fn start(&mut self) -> Result<(), SensorError> {
        if self.is_running() {
            return Ok(());
        }
        self.release_link();

        log::info!("Connecting to {} @ {} baud", self.config.address, self.config.baud_rate);
        let link = match self.connector.connect(&self.config) {
            Ok(link) => link,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };

        self.running.store(true, Ordering::Release);
        let mut sampler = Sampler::new(
            link,
            self.running.clone(),
            self.tx.clone(),
            self.config.idle_interval,
            self.config.read_timeout,
        );
        if let Some(notify) = &self.notify {
            let notify = notify.clone();
            sampler = sampler.with_notify(Box::new(move || notify()));
        }
        match sampler.spawn() {
            Ok(handle) => self.worker = Some(handle),
            Err(e) => {
                self.running.store(false, Ordering::Release);
                self.fail(&e);
                return Err(e);
            }
        }

        self.link_state = LinkState::Connected;
        self.push_log(
            LogKind::Info,
            format!("Started reading from {}...", self.config.address),
        );
        Ok(())
    }

    /// Clears the Run Flag. The sampler notices within one idle interval.
    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }
        self.running.store(false, Ordering::Release);
        self.link_state = LinkState::Disconnected;
        log::info!("Stop requested");
        self.push_log(LogKind::Info, "Stopped reading.".to_owned());
    }

    /// Empties the session and resets the chart, whatever the run state.
    pub fn clear(&mut self) {
        let rebase = self.is_running().then(Instant::now);
        self.store.clear(rebase);
        self.chart_generation += 1;
        log::info!("Session cleared");
        self.push_log(LogKind::Info, "Graph cleared.".to_owned());
    }

    /// Applies every queued sampler message. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(msg) = self.rx.try_recv() {
            handled += 1;
            match msg {
                SensorMessage::Reading {
                    value,
                    raw,
                    captured_at,
                } => {
                    self.store.append(value, captured_at);
                    self.readout = Some(value);
                    self.push_log(LogKind::Data, raw);
                }
                SensorMessage::Rejected { raw, error } => {
                    log::debug!("Dropped non-numeric line {raw:?}");
                    self.push_log(LogKind::Error, format!("Error: {error}"));
                }
                SensorMessage::Ready(at) => self.store.begin(at),
                SensorMessage::ReadFailed { error, link_lost } => {
                    self.push_log(LogKind::Error, format!("Error: {error}"));
                    // Polling continues; there is no automatic reconnect.
                    if link_lost && self.link_state == LinkState::Connected {
                        log::warn!("Link to {} lost", self.config.address);
                        self.link_state = LinkState::Disconnected;
                    }
                }
                SensorMessage::Stopped => log::debug!("Sampler reported stop"),
            }
        }
        if !self.is_running() {
            self.park_finished_worker();
        }
        handled
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn link_state(&self) -> LinkState {
        self.link_state
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    pub fn samples(&self) -> &[Sample] {
        self.store.snapshot()
    }

    pub fn sample_count(&self) -> usize {
        self.store.len()
    }

    pub fn log_entries(&self) -> &[LogEntry] {
        &self.log_entries
    }

    pub fn readout(&self) -> Option<f64> {
        self.readout
    }

    /// Bumped on every Clear; the chart resets its view when this changes.
    pub fn chart_generation(&self) -> u64 {
        self.chart_generation
    }

    pub fn alert(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    pub fn dismiss_alert(&mut self) {
        self.alert = None;
    }

    fn fail(&mut self, err: &SensorError) {
        log::error!("Start failed: {err}");
        self.push_log(LogKind::Error, format!("Error: {err}"));
        self.alert = Some(match err {
            SensorError::Connection { source, .. } => {
                format!("Could not connect to {}: {}", self.config.address, source)
            }
            other => other.to_string(),
        });
    }

    fn push_log(&mut self, kind: LogKind, text: String) {
        self.log_entries.push(LogEntry { kind, text });
    }

    fn park_finished_worker(&mut self) {
        if self.worker.as_ref().is_some_and(|h| h.is_finished()) {
            if let Some(handle) = self.worker.take() {
                self.park(handle);
            }
        }
    }

    fn park(&mut self, handle: JoinHandle<Box<dyn Link>>) {
        match handle.join() {
            Ok(link) => self.parked_link = Some(link),
            Err(_) => log::error!("Sampler thread panicked"),
        }
    }

    /// Closes whatever link is still open. Waits at most one poll for a
    /// sampler that has not noticed Stop yet.
    fn release_link(&mut self) {
        if let Some(handle) = self.worker.take() {
            self.park(handle);
        }
        if let Some(link) = self.parked_link.take() {
            link.close();
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.release_link();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    struct TestLink {
        lines: VecDeque<String>,
        closed: Arc<AtomicUsize>,
        settle: Duration,
        fail_with: Option<io::ErrorKind>,
    }

    impl Link for TestLink {
        fn read_line(&mut self, _timeout: Duration) -> Result<Option<String>, SensorError> {
            if let Some(kind) = self.fail_with {
                return Err(SensorError::Io(io::Error::new(kind, "device read failed")));
            }
            Ok(self.lines.pop_front())
        }

        fn settle_delay(&self) -> Duration {
            self.settle
        }

        fn describe(&self) -> String {
            "test".to_owned()
        }

        fn close(self: Box<Self>) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Hands out one scripted link per connect; fails once the script runs out.
    #[derive(Clone, Default)]
    struct TestConnector {
        runs: Arc<Mutex<VecDeque<Vec<&'static str>>>>,
        connects: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
        settle: Duration,
        fail_with: Option<io::ErrorKind>,
    }

    impl TestConnector {
        fn with_runs(runs: Vec<Vec<&'static str>>) -> Self {
            let connector = Self::default();
            *connector.runs.lock().unwrap() = runs.into();
            connector
        }
    }

    impl Connector for TestConnector {
        fn connect(&self, config: &SensorConfig) -> Result<Box<dyn Link>, SensorError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            match self.runs.lock().unwrap().pop_front() {
                Some(lines) => Ok(Box::new(TestLink {
                    lines: lines.into_iter().map(str::to_owned).collect(),
                    closed: self.closed.clone(),
                    settle: self.settle,
                    fail_with: self.fail_with,
                })),
                None => Err(SensorError::connection(
                    &config.address,
                    serialport::Error::new(serialport::ErrorKind::NoDevice, "port not found"),
                )),
            }
        }
    }

    fn test_config() -> SensorConfig {
        SensorConfig {
            address: "TEST0".to_owned(),
            read_timeout: Duration::from_millis(1),
            settle_delay: Duration::ZERO,
            idle_interval: Duration::from_millis(1),
            ..SensorConfig::default()
        }
    }

    fn controller(connector: &TestConnector) -> Controller {
        Controller::new(test_config(), Box::new(connector.clone()))
    }

    fn pump_until(ctl: &mut Controller, done: impl Fn(&Controller) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(ctl) {
            assert!(Instant::now() < deadline, "timed out waiting for sampler");
            ctl.pump();
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn count(ctl: &Controller, kind: LogKind) -> usize {
        ctl.log_entries().iter().filter(|e| e.kind == kind).count()
    }

    #[test]
    fn mixed_lines_record_only_numbers() {
        let connector = TestConnector::with_runs(vec![vec!["12.50", "13.00", "oops", "14.25"]]);
        let mut ctl = controller(&connector);

        ctl.start().unwrap();
        assert!(ctl.is_running());
        assert_eq!(ctl.link_state(), LinkState::Connected);
        pump_until(&mut ctl, |c| count(c, LogKind::Data) + count(c, LogKind::Error) == 4);

        let values: Vec<f64> = ctl.samples().iter().map(|s| s.value).collect();
        assert_eq!(values, vec![12.50, 13.00, 14.25]);
        assert!(ctl.samples().windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(count(&ctl, LogKind::Error), 1);
        assert_eq!(ctl.readout(), Some(14.25));

        let errors: Vec<&str> = ctl
            .log_entries()
            .iter()
            .filter(|e| e.kind == LogKind::Error)
            .map(|e| e.text.as_str())
            .collect();
        assert!(errors[0].contains("oops"));
    }

    #[test]
    fn failed_connect_leaves_state_unchanged() {
        let connector = TestConnector::default();
        let mut ctl = controller(&connector);

        let err = ctl.start().unwrap_err();
        assert!(matches!(err, SensorError::Connection { .. }));
        assert!(!ctl.is_running());
        assert_eq!(ctl.link_state(), LinkState::Disconnected);
        assert!(ctl.samples().is_empty());
        assert!(ctl.alert().is_some_and(|a| a.contains("TEST0")));
        assert_eq!(count(&ctl, LogKind::Error), 1);

        ctl.dismiss_alert();
        assert!(ctl.alert().is_none());
    }

    #[test]
    fn start_while_running_does_not_reconnect() {
        let connector = TestConnector::with_runs(vec![vec![], vec![]]);
        let mut ctl = controller(&connector);

        ctl.dispatch(GuiCommand::Start);
        ctl.dispatch(GuiCommand::Start);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert_eq!(count(&ctl, LogKind::Info), 1);
    }

    #[test]
    fn stop_when_idle_is_a_no_op() {
        let connector = TestConnector::default();
        let mut ctl = controller(&connector);
        ctl.dispatch(GuiCommand::Stop);
        assert!(ctl.log_entries().is_empty());
        assert!(!ctl.is_running());
    }

    #[test]
    fn stop_then_start_resumes_the_same_session() {
        let connector = TestConnector::with_runs(vec![vec!["1", "2"], vec!["3"]]);
        let mut ctl = controller(&connector);

        ctl.start().unwrap();
        pump_until(&mut ctl, |c| c.samples().len() == 2);

        ctl.stop();
        assert!(!ctl.is_running());
        assert_eq!(ctl.link_state(), LinkState::Disconnected);
        pump_until(&mut ctl, |c| c.worker.is_none());
        // Stop does not close the link.
        assert_eq!(connector.closed.load(Ordering::SeqCst), 0);

        ctl.start().unwrap();
        assert_eq!(connector.closed.load(Ordering::SeqCst), 1);
        pump_until(&mut ctl, |c| c.samples().len() == 3);

        let values: Vec<f64> = ctl.samples().iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
        assert!(ctl.samples().windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clear_empties_session_in_any_state() {
        let connector = TestConnector::with_runs(vec![vec!["5.0", "6.0"]]);
        let mut ctl = controller(&connector);

        ctl.clear();
        assert!(ctl.samples().is_empty());
        assert_eq!(ctl.chart_generation(), 1);

        ctl.start().unwrap();
        pump_until(&mut ctl, |c| c.samples().len() == 2);
        ctl.clear();
        assert!(ctl.samples().is_empty());
        assert!(ctl.is_running());

        ctl.stop();
        ctl.clear();
        ctl.clear();
        assert!(ctl.samples().is_empty());
        assert_eq!(ctl.chart_generation(), 4);
    }

    #[test]
    fn drop_closes_the_link() {
        let connector = TestConnector::with_runs(vec![vec![]]);
        let mut ctl = controller(&connector);
        ctl.start().unwrap();
        drop(ctl);
        assert_eq!(connector.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn notify_fires_for_each_message() {
        let connector = TestConnector::with_runs(vec![vec!["1", "2"]]);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let mut ctl = controller(&connector).with_notify(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        ctl.start().unwrap();
        pump_until(&mut ctl, |c| c.samples().len() == 2);
        assert!(hits.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn unplugged_device_marks_link_disconnected_but_keeps_polling() {
        let mut connector = TestConnector::with_runs(vec![vec![]]);
        connector.fail_with = Some(io::ErrorKind::BrokenPipe);
        let mut ctl = controller(&connector);

        ctl.start().unwrap();
        assert_eq!(ctl.link_state(), LinkState::Connected);
        pump_until(&mut ctl, |c| count(c, LogKind::Error) >= 3);

        assert_eq!(ctl.link_state(), LinkState::Disconnected);
        assert!(ctl.is_running());
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn transient_read_errors_keep_link_connected() {
        let mut connector = TestConnector::with_runs(vec![vec![]]);
        connector.fail_with = Some(io::ErrorKind::Interrupted);
        let mut ctl = controller(&connector);

        ctl.start().unwrap();
        pump_until(&mut ctl, |c| count(c, LogKind::Error) >= 2);
        assert_eq!(ctl.link_state(), LinkState::Connected);
    }

    #[test]
    fn session_time_starts_after_settle_delay() {
        let mut connector = TestConnector::with_runs(vec![vec!["10.0"]]);
        connector.settle = Duration::from_millis(300);
        let mut ctl = controller(&connector);

        ctl.start().unwrap();
        pump_until(&mut ctl, |c| c.samples().len() == 1);

        let first = ctl.samples()[0];
        assert_eq!(first.value, 10.0);
        assert!(first.timestamp < 0.1, "first timestamp {}", first.timestamp);
    }

    #[test]
    fn connection_alert_puts_address_and_cause_on_one_line() {
        let connector = TestConnector::default();
        let mut ctl = controller(&connector);
        ctl.dispatch(GuiCommand::Start);
        assert_eq!(ctl.alert(), Some("Could not connect to TEST0: port not found"));
    }
}
