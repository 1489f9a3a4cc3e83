use std::{io::stdout, ops::ControlFlow, sync::mpsc, thread::spawn, time::Duration};

use crate::gui::error::GuiError;

use crossterm::{
    event::{self, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use log::warn;
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};

enum ThreadMessage {
    Stop,
}

/// Generates a gui that runs a function until the user provides input, or
/// until the function says it is done.
///
/// The function can be thought of as a recursive fold. `init` contains the
/// inital state of the loop, then `f` is called on the inital state to produce
/// a new state, and then `f` is called on that new state, and so on. `f`
/// returning [`ControlFlow::Break`] ends the loop early. After every step
/// `status` renders the state as the lines shown on screen.
pub fn fold_until_stop<F, S, T>(title: &str, init: T, f: F, status: S) -> Result<T, GuiError>
where
    F: Fn(T) -> ControlFlow<T, T> + Send + 'static,
    S: Fn(&T) -> Vec<String> + Send + 'static,
    T: Send + 'static,
{
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let (stop_tx, stop_rx) = mpsc::channel();
    let (status_tx, status_rx) = mpsc::channel();
    let (res_tx, res_rx) = mpsc::channel();

    let th = spawn(move || {
        let mut val = init;

        loop {
            let (next, done) = match f(val) {
                ControlFlow::Continue(next) => (next, false),
                ControlFlow::Break(last) => (last, true),
            };
            val = next;
            // the screen may already be gone, the result still matters
            let _ = status_tx.send(status(&val));
            if done || matches!(stop_rx.try_recv(), Ok(ThreadMessage::Stop)) {
                if res_tx.send(val).is_err() {
                    warn!("nobody is waiting for the final state");
                }
                break;
            }
        }
    });

    let title = format!(" {title} ");
    let mut lines: Vec<String> = Vec::new();
    let res = loop {
        if let Some(latest) = status_rx.try_iter().last() {
            lines = latest;
        }

        let heading = Title::from(title.as_str().green().bold());
        let instructions = Title::from(Line::from(vec![
            " Stop ".into(),
            "<any key> ".green().bold(),
        ]));
        let text = Paragraph::new(
            lines
                .iter()
                .map(|l| Line::from(l.as_str()))
                .collect::<Vec<_>>(),
        );
        let block = Block::default()
            .title(heading.alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL);
        terminal.draw(|frame| {
            let area = frame.size();
            frame.render_widget(text.block(block), area);
        })?;

        if let Ok(val) = res_rx.try_recv() {
            break val;
        }
        if event::poll(Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    // the fold may have finished on its own in the meantime
                    let _ = stop_tx.send(ThreadMessage::Stop);
                    break res_rx.recv()?;
                }
            }
        }
    };

    th.join().map_err(|_| GuiError::JoinError)?;
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(res)
}
