use ratatui::Frame;
use reflex::Clock;

use crate::{ui, App, AppState};

/// A UI Screen boundary: one per app state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Screen {
    Ready,
    Testing,
    Rest,
    Paused,
    Results,
}

impl Screen {
    pub fn for_state(state: AppState) -> Self {
        match state {
            AppState::Ready => Screen::Ready,
            AppState::Testing => Screen::Testing,
            AppState::Rest => Screen::Rest,
            AppState::Paused => Screen::Paused,
            AppState::Results => Screen::Results,
        }
    }

    pub fn render<C: Clock>(&self, app: &App<C>, f: &mut Frame) {
        let area = f.area();
        let buf = f.buffer_mut();
        match self {
            Screen::Ready => ui::render_ready(app, area, buf),
            Screen::Testing => ui::render_testing(app, area, buf),
            Screen::Rest => ui::render_rest(app, area, buf),
            Screen::Paused => ui::render_paused(app, area, buf),
            Screen::Results => ui::render_results(app, area, buf),
        }
    }
}
