use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// What a key press asks the app to do. Its meaning depends on the screen:
/// `Press` starts a test, reacts to a stimulus or cuts a rest short.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Press,
    Resume,
    RetryRound,
    Save,
    NewTest,
    Quit,
}

impl Action {
    /// Key table shared by every screen; unbound keys give `None`.
    pub fn from_key(key: KeyEvent) -> Option<Self> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return (key.code == KeyCode::Char('c')).then_some(Action::Quit);
        }
        match key.code {
            KeyCode::Char(' ') | KeyCode::Enter => Some(Action::Press),
            KeyCode::Char('c') => Some(Action::Resume),
            KeyCode::Char('r') => Some(Action::RetryRound),
            KeyCode::Char('s') => Some(Action::Save),
            KeyCode::Char('n') => Some(Action::NewTest),
            KeyCode::Esc => Some(Action::Quit),
            _ => None,
        }
    }
}

/// Unified event type consumed by the app runner
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppEvent {
    Input(Action),
    Resize,
    Tick,
}

/// Source of terminal events (keyboard, resize, etc.)
pub trait EventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError>;
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    rx: Receiver<AppEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || loop {
            let event = match event::read() {
                // key releases would count as a second click on some terminals
                Ok(CtEvent::Key(key)) if key.kind != KeyEventKind::Press => continue,
                Ok(CtEvent::Key(key)) => match Action::from_key(key) {
                    Some(action) => AppEvent::Input(action),
                    None => continue,
                },
                Ok(CtEvent::Resize(_, _)) => AppEvent::Resize,
                Ok(_) => continue,
                Err(_) => break,
            };
            if tx.send(event).is_err() {
                break;
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Channel-fed event source for tests and headless runs
pub struct TestEventSource {
    rx: Receiver<AppEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<AppEvent>) -> Self {
        Self { rx }
    }
}

impl EventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// The side of the app the runner drives
pub trait Host {
    /// Fire whatever timers are due by now.
    fn tick(&mut self);
    fn act(&mut self, action: Action);
}

pub struct Runner<E: EventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: EventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Blocks up to tick interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> AppEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => AppEvent::Tick,
        }
    }

    /// Take one event and apply it to `host`. Due timers always fire before
    /// the input is handled, so a press that arrives after the exposure
    /// ended is not credited to the hidden stimulus. Returns `false` on quit.
    pub fn dispatch<H: Host>(&self, host: &mut H) -> bool {
        let event = self.step();
        host.tick();
        match event {
            AppEvent::Input(Action::Quit) => false,
            AppEvent::Input(action) => {
                host.act(action);
                true
            }
            AppEvent::Resize | AppEvent::Tick => true,
        }
    }
}
