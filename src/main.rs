mod ui;

use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand, ValueEnum};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use reflex::{
    app_dirs::AppDirs,
    config::{Config, ConfigStore, FileConfigStore},
    engine::{Engine, EngineEvent},
    export, logging, normative,
    records::{RecordStore, SqliteRecordStore, TestRecord},
    runtime::{Action, CrosstermEventSource, FixedTicker, Host, Runner},
    Clock, FinalResult, InputVerdict, NormativeResult, RoundSummary, Sex, SystemClock,
};
use std::{
    error::Error,
    io::{self, stdin},
    path::PathBuf,
    sync::mpsc::Receiver,
    time::Duration,
};
use tracing::{info, warn};

use crate::ui::ui;

const TICK_RATE_MS: u64 = 16;

/// visual reaction-time test with round statistics and normative biological age
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A terminal reaction-time test: react to randomly timed stimuli over several rounds, then see your round averages and a normative biological-age estimate."
)]
pub struct Cli {
    #[clap(subcommand)]
    command: Option<Command>,

    /// number of rounds in the test
    #[clap(short = 'r', long)]
    rounds: Option<u32>,

    /// number of stimuli per round
    #[clap(short = 'n', long)]
    stimuli: Option<u32>,

    /// milliseconds each stimulus stays visible
    #[clap(long)]
    exposure: Option<u64>,

    /// shortest wait before a stimulus, in milliseconds
    #[clap(long)]
    min_delay: Option<u64>,

    /// longest wait before a stimulus, in milliseconds
    #[clap(long)]
    max_delay: Option<u64>,

    /// reactions faster than this many milliseconds are ignored
    #[clap(long)]
    min_reaction: Option<u64>,

    /// presses allowed per stimulus before the round is paused
    #[clap(long)]
    max_clicks: Option<u32>,

    /// seconds of rest between rounds (0 to continue immediately)
    #[clap(long)]
    rest: Option<u64>,

    /// age of the test-taker, enables the biological-age estimate
    #[clap(short = 'a', long)]
    age: Option<i32>,

    /// sex used to pick the normative table
    #[clap(short = 's', long, value_enum)]
    sex: Option<Sex>,

    /// seed for reproducible stimulus timing
    #[clap(long)]
    seed: Option<u64>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// list saved tests, newest first
    History,
    /// write all saved tests to a file
    Export {
        #[clap(short = 'f', long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
        #[clap(short = 'o', long)]
        output: PathBuf,
    },
    /// delete a saved test by id
    Delete { id: i64 },
}

#[derive(Debug, Copy, Clone, ValueEnum, strum_macros::Display)]
enum ExportFormat {
    Json,
    Csv,
}

impl Cli {
    /// Overlay command line flags on stored settings
    fn apply(&self, mut cfg: Config) -> Config {
        let t = &mut cfg.test;
        if let Some(v) = self.rounds {
            t.round_count = v;
        }
        if let Some(v) = self.stimuli {
            t.stimuli_per_round = v;
        }
        if let Some(v) = self.exposure {
            t.exposure_duration_ms = v;
        }
        if let Some(v) = self.min_delay {
            t.min_delay_ms = v;
        }
        if let Some(v) = self.max_delay {
            t.max_delay_ms = v;
        }
        if let Some(v) = self.min_reaction {
            t.min_valid_reaction_time_ms = v;
        }
        if let Some(v) = self.max_clicks {
            t.max_allowed_clicks_per_stimulus = v;
        }
        if let Some(v) = self.rest {
            cfg.rest_secs = v;
        }
        if self.age.is_some() {
            cfg.age = self.age;
        }
        if let Some(sex) = self.sex {
            cfg.sex = sex;
        }
        cfg
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppState {
    Ready,
    Testing,
    Rest,
    Paused,
    Results,
}

#[derive(Debug)]
pub struct App<C: Clock = SystemClock> {
    pub engine: Engine<C>,
    events: Receiver<EngineEvent>,
    pub settings: Config,
    pub state: AppState,
    /// (1-based index, total) of the stimulus on screen
    pub stimulus: Option<(u32, u32)>,
    pub last_verdict: Option<InputVerdict>,
    pub rest_ends_at: Option<u64>,
    pub last_summary: Option<RoundSummary>,
    pub final_result: Option<FinalResult>,
    pub normative: Option<NormativeResult>,
    pub status: Option<String>,
    pub saved_as: Option<i64>,
}

impl<C: Clock> App<C> {
    pub fn with_engine(mut engine: Engine<C>, settings: Config) -> Self {
        let events = engine.subscribe();
        Self {
            engine,
            events,
            settings,
            state: AppState::Ready,
            stimulus: None,
            last_verdict: None,
            rest_ends_at: None,
            last_summary: None,
            final_result: None,
            normative: None,
            status: None,
            saved_as: None,
        }
    }

    pub fn start(&mut self) {
        self.clear_session();
        self.engine.start_test();
        self.state = AppState::Testing;
    }

    pub fn new_test(&mut self) {
        self.engine.reset_full_test();
        self.clear_session();
        self.state = AppState::Ready;
    }

    fn clear_session(&mut self) {
        self.stimulus = None;
        self.last_verdict = None;
        self.rest_ends_at = None;
        self.last_summary = None;
        self.final_result = None;
        self.normative = None;
        self.status = None;
        self.saved_as = None;
        self.drain_events();
    }

    /// Fire due timers and react to whatever the engine reported.
    pub fn on_tick(&mut self) {
        self.engine.poll();
        self.drain_events();
        if self.state == AppState::Rest {
            if let Some(end) = self.rest_ends_at {
                if self.engine.clock().now() >= end {
                    self.end_rest();
                }
            }
        }
    }

    pub fn press(&mut self) -> InputVerdict {
        let verdict = self.engine.register_input_verdict();
        self.last_verdict = Some(verdict);
        self.drain_events();
        verdict
    }

    pub fn resume(&mut self) {
        if self.engine.resume_after_abuse() {
            self.last_verdict = None;
            self.state = AppState::Testing;
        }
    }

    pub fn retry_round(&mut self) {
        if self.engine.retry_current_round() {
            self.stimulus = None;
            self.last_verdict = None;
            self.state = AppState::Testing;
        }
    }

    pub fn end_rest(&mut self) {
        self.rest_ends_at = None;
        if self.engine.start_next_round() {
            self.last_verdict = None;
            self.state = AppState::Testing;
        }
    }

    pub fn rest_secs_remaining(&self) -> Option<u64> {
        let end = self.rest_ends_at?;
        let left_ms = end.saturating_sub(self.engine.clock().now());
        Some(left_ms.div_ceil(1000))
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.on_engine_event(event);
        }
    }

    fn on_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::StimulusShown { index, total } => {
                self.stimulus = Some((index, total));
                self.last_verdict = None;
            }
            EngineEvent::StimulusHidden => self.stimulus = None,
            EngineEvent::AbuseDetected => self.state = AppState::Paused,
            EngineEvent::RoundComplete {
                summary,
                is_final_round,
            } => {
                self.last_summary = Some(summary);
                if is_final_round {
                    self.finish();
                } else {
                    self.begin_rest();
                }
            }
        }
    }

    fn begin_rest(&mut self) {
        if self.settings.rest_secs == 0 {
            self.end_rest();
            return;
        }
        let rest_ms = self.settings.rest_secs.saturating_mul(1000);
        self.rest_ends_at = Some(self.engine.clock().now().saturating_add(rest_ms));
        self.state = AppState::Rest;
    }

    fn finish(&mut self) {
        self.final_result = self.engine.final_result();
        self.normative = match (&self.final_result, self.settings.age) {
            (Some(result), Some(age)) => {
                normative::estimate(result.grand_average_ms as f64, age, self.settings.sex)
            }
            _ => None,
        };
        if let Some(result) = &self.final_result {
            info!(grand_average_ms = result.grand_average_ms, "test finished");
        }
        self.state = AppState::Results;
    }

    pub fn record(&self) -> Option<TestRecord> {
        let result = self.final_result.clone()?;
        Some(TestRecord::new(
            *self.engine.config(),
            result,
            self.settings.age,
            self.settings.sex,
        ))
    }

    /// Persist the finished test. Failures end up in the status line.
    pub fn save_to(&mut self, store: Option<&mut dyn RecordStore>) {
        if let Some(id) = self.saved_as {
            self.status = Some(format!("already saved as #{id}"));
            return;
        }
        let Some(record) = self.record() else {
            self.status = Some("nothing to save yet".to_string());
            return;
        };
        let Some(store) = store else {
            self.status = Some("record store unavailable, see log".to_string());
            return;
        };
        match store.save(&record) {
            Ok(id) => {
                self.saved_as = Some(id);
                self.status = Some(format!("saved as #{id}"));
            }
            Err(e) => {
                warn!(error = %e, "saving record failed");
                self.status = Some(format!("could not save: {e}"));
            }
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if let Some(path) = AppDirs::log_path() {
        // a missing log file must not keep the test from running
        if let Err(e) = logging::init(&path) {
            eprintln!("reflex: logging to {} disabled: {e}", path.display());
        }
    }

    if let Some(command) = &cli.command {
        return run_command(command);
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let config_store = FileConfigStore::new();
    let settings = cli.apply(config_store.load());
    if let Err(e) = settings.test.validate() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::InvalidValue, e.to_string()).exit();
    }
    if let Err(e) = config_store.save(&settings) {
        warn!(error = %e, "could not persist settings");
    }

    let engine = match cli.seed {
        Some(seed) => Engine::with_seed(settings.test, SystemClock::new(), seed)?,
        None => Engine::new(settings.test, SystemClock::new())?,
    };
    let mut app = App::with_engine(engine, settings);
    let mut store = open_store();

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let outcome = start_tui(&mut terminal, &mut app, &mut store);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen,)?;
    terminal.show_cursor()?;

    outcome
}

fn open_store() -> Option<SqliteRecordStore> {
    let path = AppDirs::db_path()?;
    match SqliteRecordStore::open(&path) {
        Ok(store) => Some(store),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "record store unavailable");
            None
        }
    }
}

fn open_store_or_err() -> Result<SqliteRecordStore, Box<dyn Error>> {
    let path = AppDirs::db_path().ok_or("could not resolve a state directory")?;
    Ok(SqliteRecordStore::open(path)?)
}

fn run_command(command: &Command) -> Result<(), Box<dyn Error>> {
    let mut store = open_store_or_err()?;
    match command {
        Command::History => {
            let records = store.get_all()?;
            if records.is_empty() {
                println!("no saved tests");
            }
            for record in &records {
                println!("{}", history_line(record));
            }
        }
        Command::Export { format, output } => {
            let records = store.get_all()?;
            match format {
                ExportFormat::Json => export::write_json(&records, output)?,
                ExportFormat::Csv => export::write_csv(&records, output)?,
            }
            println!(
                "exported {} records as {} to {}",
                records.len(),
                format.to_string().to_lowercase(),
                output.display()
            );
        }
        Command::Delete { id } => {
            store.delete(*id)?;
            println!("deleted #{id}");
        }
    }
    Ok(())
}

fn history_line(record: &TestRecord) -> String {
    let id = record.id.map_or("-".to_string(), |id| format!("#{id}"));
    let age = record.age.map_or("-".to_string(), |a| a.to_string());
    let estimate = record.normative.map_or(String::new(), |n| {
        format!("  bio age {:.2} ({})", n.biological_age, n.verdict)
    });
    format!(
        "{:>5}  {}  age {:>3} {:<11}  avg {:>4}ms over {} rounds{}",
        id,
        record.taken_at.format("%Y-%m-%d %H:%M"),
        age,
        record.sex,
        record.result.grand_average_ms,
        record.result.rounds.len(),
        estimate
    )
}

fn start_tui<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    store: &mut Option<SqliteRecordStore>,
) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );
    let mut session = Session { app, store };

    terminal.draw(|f| ui(&*session.app, f))?;
    while runner.dispatch(&mut session) {
        terminal.draw(|f| ui(&*session.app, f))?;
    }

    Ok(())
}

/// The app plus the store it saves into, as driven by the runner
struct Session<'a, C: Clock> {
    app: &'a mut App<C>,
    store: &'a mut Option<SqliteRecordStore>,
}

impl<C: Clock> Host for Session<'_, C> {
    fn tick(&mut self) {
        self.app.on_tick();
    }

    fn act(&mut self, action: Action) {
        let store = self.store.as_mut().map(|s| s as &mut dyn RecordStore);
        handle_action(self.app, action, store);
    }
}

fn handle_action<C: Clock>(app: &mut App<C>, action: Action, store: Option<&mut dyn RecordStore>) {
    match (app.state, action) {
        (AppState::Ready, Action::Press) => app.start(),
        (AppState::Testing, Action::Press) => {
            app.press();
        }
        (AppState::Testing | AppState::Paused, Action::RetryRound) => app.retry_round(),
        (AppState::Paused, Action::Resume) => app.resume(),
        (AppState::Rest, Action::Press) => app.end_rest(),
        (AppState::Results, Action::Save) => app.save_to(store),
        (AppState::Results, Action::NewTest) => app.new_test(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use ratatui::backend::TestBackend;
    use reflex::{Phase, TestConfig, Verdict, VirtualClock};

    fn settings(rest_secs: u64) -> Config {
        Config {
            test: TestConfig {
                round_count: 2,
                stimuli_per_round: 1,
                exposure_duration_ms: 500,
                min_delay_ms: 1000,
                max_delay_ms: 1000,
                min_valid_reaction_time_ms: 100,
                max_allowed_clicks_per_stimulus: 2,
            },
            age: Some(12),
            sex: Sex::Male,
            rest_secs,
        }
    }

    fn test_app(rest_secs: u64) -> App<VirtualClock> {
        let cfg = settings(rest_secs);
        let engine = Engine::with_seed(cfg.test, VirtualClock::new(), 1).unwrap();
        App::with_engine(engine, cfg)
    }

    fn react(app: &mut App<VirtualClock>, ms: u64) {
        app.engine.advance(1000);
        app.on_tick();
        app.engine.advance(ms);
        assert_matches!(app.press(), InputVerdict::Accepted(_));
        app.engine.advance(500 - ms);
        app.on_tick();
    }

    fn bare_cli() -> Cli {
        Cli::parse_from(["reflex"])
    }

    fn render(app: &App<VirtualClock>) -> String {
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|f| ui(app, f)).unwrap();
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    #[test]
    fn test_cli_overrides_stored_settings() {
        let cli = Cli::parse_from([
            "reflex", "-r", "5", "-n", "4", "--exposure", "600", "--min-delay", "500",
            "--max-delay", "900", "--rest", "0", "-a", "10", "-s", "female",
        ]);
        let cfg = cli.apply(Config::default());
        assert_eq!(cfg.test.round_count, 5);
        assert_eq!(cfg.test.stimuli_per_round, 4);
        assert_eq!(cfg.test.exposure_duration_ms, 600);
        assert_eq!(cfg.test.min_delay_ms, 500);
        assert_eq!(cfg.test.max_delay_ms, 900);
        assert_eq!(cfg.rest_secs, 0);
        assert_eq!(cfg.age, Some(10));
        assert_eq!(cfg.sex, Sex::Female);
    }

    #[test]
    fn test_cli_without_flags_keeps_settings() {
        let stored = settings(7);
        assert_eq!(bare_cli().apply(stored.clone()), stored);
    }

    #[test]
    fn test_cli_subcommands() {
        let cli = Cli::parse_from(["reflex", "export", "-f", "csv", "-o", "out.csv"]);
        assert_matches!(
            cli.command,
            Some(Command::Export { format: ExportFormat::Csv, ref output }) if output == &PathBuf::from("out.csv")
        );
        let cli = Cli::parse_from(["reflex", "delete", "3"]);
        assert_matches!(cli.command, Some(Command::Delete { id: 3 }));
    }

    #[test]
    fn test_full_session_with_rest() {
        let mut app = test_app(3);
        assert_eq!(app.state, AppState::Ready);
        app.start();
        assert_eq!(app.state, AppState::Testing);

        react(&mut app, 262);
        assert_eq!(app.state, AppState::Rest);
        assert_eq!(app.rest_secs_remaining(), Some(3));
        assert_eq!(app.last_summary.as_ref().map(|s| s.average_ms), Some(262));

        app.engine.advance(2500);
        app.on_tick();
        assert_eq!(app.rest_secs_remaining(), Some(1));
        app.engine.advance(500);
        app.on_tick();
        assert_eq!(app.state, AppState::Testing);
        assert_eq!(app.engine.current_round(), 2);

        react(&mut app, 262);
        assert_eq!(app.state, AppState::Results);
        let result = app.final_result.as_ref().unwrap();
        assert_eq!(result.grand_average_ms, 262);
        let estimate = app.normative.unwrap();
        assert_eq!(estimate.verdict, Verdict::Normal);
        assert_eq!(estimate.chronological_age, 12);
    }

    #[test]
    fn test_zero_rest_continues_immediately() {
        let mut app = test_app(0);
        app.start();
        react(&mut app, 300);
        assert_eq!(app.state, AppState::Testing);
        assert_eq!(app.engine.current_round(), 2);
        assert_eq!(app.engine.phase(), Phase::AwaitingStimulus);
    }

    #[test]
    fn test_runner_drives_session() {
        use reflex::runtime::{AppEvent, TestEventSource};
        use std::sync::mpsc;

        let mut app = test_app(0);
        let mut store = Some(SqliteRecordStore::open_in_memory().unwrap());
        let (tx, rx) = mpsc::channel();
        let runner = Runner::new(
            TestEventSource::new(rx),
            FixedTicker::new(Duration::from_millis(1)),
        );

        tx.send(AppEvent::Input(Action::Press)).unwrap();
        tx.send(AppEvent::Input(Action::Quit)).unwrap();
        let mut session = Session {
            app: &mut app,
            store: &mut store,
        };
        assert!(runner.dispatch(&mut session));
        assert!(!runner.dispatch(&mut session));
        assert_eq!(app.state, AppState::Testing);
        assert_eq!(app.engine.phase(), Phase::AwaitingStimulus);
    }

    #[test]
    fn test_huge_rest_saturates() {
        let mut app = test_app(u64::MAX);
        app.start();
        react(&mut app, 300);
        assert_eq!(app.state, AppState::Rest);
        assert_eq!(app.rest_ends_at, Some(u64::MAX));
        app.engine.advance(60_000);
        app.on_tick();
        assert_eq!(app.state, AppState::Rest);
    }

    #[test]
    fn test_space_skips_rest() {
        let mut app = test_app(60);
        app.start();
        react(&mut app, 300);
        handle_action(&mut app, Action::Press, None);
        assert_eq!(app.state, AppState::Testing);
        assert_eq!(app.rest_ends_at, None);
    }

    #[test]
    fn test_abuse_pauses_and_resumes() {
        let mut app = test_app(0);
        app.start();
        app.engine.advance(1000);
        app.on_tick();
        app.engine.advance(200);
        for _ in 0..3 {
            handle_action(&mut app, Action::Press, None);
        }
        assert_eq!(app.state, AppState::Paused);
        assert_eq!(app.stimulus, None);

        handle_action(&mut app, Action::Resume, None);
        assert_eq!(app.state, AppState::Testing);
        assert_eq!(app.engine.phase(), Phase::AwaitingStimulus);
    }

    #[test]
    fn test_without_age_has_no_estimate() {
        let mut cfg = settings(0);
        cfg.age = None;
        let engine = Engine::with_seed(cfg.test, VirtualClock::new(), 1).unwrap();
        let mut app = App::with_engine(engine, cfg);
        app.start();
        react(&mut app, 250);
        react(&mut app, 250);
        assert_eq!(app.state, AppState::Results);
        assert!(app.final_result.is_some());
        assert_eq!(app.normative, None);
    }

    #[test]
    fn test_save_to_store() {
        let mut app = test_app(0);
        let mut store = SqliteRecordStore::open_in_memory().unwrap();

        app.save_to(Some(&mut store));
        assert_eq!(app.status.as_deref(), Some("nothing to save yet"));

        app.start();
        react(&mut app, 280);
        react(&mut app, 300);
        app.save_to(None);
        assert_eq!(app.status.as_deref(), Some("record store unavailable, see log"));

        handle_action(&mut app, Action::Save, Some(&mut store));
        assert_eq!(app.saved_as, Some(1));
        app.save_to(Some(&mut store));
        assert_eq!(app.status.as_deref(), Some("already saved as #1"));

        let records = store.get_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].result.round_averages, vec![280, 300]);
    }

    #[test]
    fn test_new_test_returns_to_ready() {
        let mut app = test_app(0);
        app.start();
        react(&mut app, 280);
        react(&mut app, 300);
        handle_action(&mut app, Action::NewTest, None);
        assert_eq!(app.state, AppState::Ready);
        assert_eq!(app.engine.phase(), Phase::Idle);
        assert!(app.final_result.is_none());
    }

    #[test]
    fn test_history_line() {
        let result = reflex::stats::summarize_test(&[reflex::stats::summarize_round(1, &[262])]).unwrap();
        let mut record = TestRecord::new(TestConfig::default(), result, Some(12), Sex::Male);
        record.id = Some(4);
        let line = history_line(&record);
        assert!(line.contains("#4"));
        assert!(line.contains("avg  262ms over 1 rounds"));
        assert!(line.contains("(normal)"));
    }

    #[test]
    fn test_every_screen_renders() {
        let mut app = test_app(5);
        assert!(render(&app).contains("space"));

        app.start();
        app.engine.advance(1000);
        app.on_tick();
        assert!(render(&app).contains("1/1"));

        app.engine.advance(300);
        app.press();
        app.engine.advance(200);
        app.on_tick();
        assert_eq!(app.state, AppState::Rest);
        let rest = render(&app);
        assert!(rest.contains("00:05"));
        assert!(rest.contains("fastest 300 ms, slowest 300 ms"));

        app.end_rest();
        react(&mut app, 300);
        assert_eq!(app.state, AppState::Results);
        assert!(render(&app).contains("300"));

        app.state = AppState::Paused;
        assert!(render(&app).contains("resume"));
    }
}
