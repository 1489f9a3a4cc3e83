use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    style::{Color, Style},
    symbols,
    text::Span,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType},
    Frame, Terminal,
};
use std::{
    error::Error,
    io,
    time::{Duration, Instant},
};

/// East/north offsets in metres.
pub type Xy = (f64, f64);

pub type PointGenerator = Box<dyn FnMut() -> Vec<Xy>>;

/// Margin around the tour, in metres.
const MARGIN: f64 = 60.0;

struct App {
    title: String,
    points: Vec<Xy>,
    target_generator: PointGenerator,
    walker_generator: PointGenerator,
    target: Vec<Xy>,
    walker: Vec<Xy>,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
}

impl App {
    fn new(
        title: String,
        points: Vec<Xy>,
        target_generator: PointGenerator,
        walker_generator: PointGenerator,
    ) -> App {
        let (x_bounds, y_bounds) = bounds(&points);
        App {
            title,
            points,
            target_generator,
            walker_generator,
            target: vec![],
            walker: vec![],
            x_bounds,
            y_bounds,
        }
    }

    fn on_tick(&mut self) {
        self.target = (self.target_generator)();
        self.walker = (self.walker_generator)();
    }
}

/// Square bounds around `points`, so distances look the same on both axes.
fn bounds(points: &[Xy]) -> ([f64; 2], [f64; 2]) {
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
    for &(x, y) in points {
        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }
    let half = ((max_x - min_x).max(max_y - min_y) / 2.0) + MARGIN;
    let (cx, cy) = ((min_x + max_x) / 2.0, (min_y + max_y) / 2.0);
    ([cx - half, cx + half], [cy - half, cy + half])
}

fn labels(bounds: [f64; 2]) -> Vec<Span<'static>> {
    let mid = (bounds[0] + bounds[1]) / 2.0;
    [bounds[0], mid, bounds[1]]
        .iter()
        .map(|v| Span::from(format!("{v:.0}m")))
        .collect()
}

pub fn engage_gui(
    title: String,
    points: Vec<Xy>,
    target_generator: PointGenerator,
    walker_generator: PointGenerator,
) -> Result<(), Box<dyn Error>> {
    // setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // create app and run it
    let tick_rate = Duration::from_millis(250);
    let app = App::new(title, points, target_generator, walker_generator);
    let res = run_app(&mut terminal, app, tick_rate);

    // restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res?;
    Ok(())
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    tick_rate: Duration,
) -> io::Result<()> {
    let mut last_tick = Instant::now();
    loop {
        terminal.draw(|f| ui(f, &app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));
        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if let KeyCode::Char('q') = key.code {
                    return Ok(());
                }
            }
        }
        if last_tick.elapsed() >= tick_rate {
            app.on_tick();
            last_tick = Instant::now();
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let chart = Chart::new(vec![
        Dataset::default()
            .name("Points")
            .marker(symbols::Marker::Block)
            .graph_type(GraphType::Scatter)
            .style(Style::default().fg(Color::Cyan))
            .data(&app.points),
        Dataset::default()
            .name("Target")
            .marker(symbols::Marker::Block)
            .graph_type(GraphType::Scatter)
            .style(Style::default().fg(Color::Yellow))
            .data(&app.target),
        Dataset::default()
            .name("Walker")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Red))
            .data(&app.walker),
    ])
    .block(
        Block::default()
            .title(format!(" {} (q to quit) ", app.title))
            .borders(Borders::ALL),
    )
    .x_axis(
        Axis::default()
            .title(Span::styled("East", Style::default().fg(Color::Red)))
            .style(Style::default().fg(Color::White))
            .bounds(app.x_bounds)
            .labels(labels(app.x_bounds)),
    )
    .y_axis(
        Axis::default()
            .title(Span::styled("North", Style::default().fg(Color::Red)))
            .style(Style::default().fg(Color::White))
            .bounds(app.y_bounds)
            .labels(labels(app.y_bounds)),
    );

    f.render_widget(chart, f.size());
}
