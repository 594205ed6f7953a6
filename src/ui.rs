use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use roommate_map::{
    filter_and_sort, CitySource, FetchKind, Highlight, MapController, MemorySurface, ReferenceData,
    SortColumn, SortState, UserRecord,
};
use std::io;

const PAGE_JUMP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Directory,
    Cities,
    Map,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Directory => Page::Cities,
            Page::Cities => Page::Map,
            Page::Map => Page::Directory,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Directory => Page::Map,
            Page::Cities => Page::Directory,
            Page::Map => Page::Cities,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Directory => "Directory",
            Page::Cities => "Cities",
            Page::Map => "Map",
        }
    }
}

pub struct App {
    pub users: Vec<UserRecord>,
    pub filtered_users: Vec<UserRecord>,
    pub state: TableState,
    pub cities: Vec<(String, usize)>,
    pub cities_state: TableState,
    pub map_state: TableState,
    pub current_page: Page,
    pub show_detail: bool,
    pub search: String,
    pub editing_search: bool,
    pub sort: SortState,
    pub map: MapController<MemorySurface>,
}

impl App {
    pub fn new(users: Vec<UserRecord>, reference: ReferenceData) -> Self {
        // The terminal draws the points itself, so the surface is always ready
        let mut map = MapController::new();
        map.mount(|| Ok(MemorySurface::loaded()));
        let ticket = map.begin_fetch(FetchKind::Reference);
        map.complete_reference(ticket, Ok(reference));
        let ticket = map.begin_fetch(FetchKind::Users);
        map.complete_users(ticket, Ok(users.clone()));

        let cities = map
            .cities(CitySource::Users)
            .into_iter()
            .map(|city| {
                let count = users.iter().filter(|u| u.city.trim() == city).count();
                (city, count)
            })
            .collect();

        let mut app = Self {
            users,
            filtered_users: Vec::new(),
            state: TableState::default(),
            cities,
            cities_state: TableState::default(),
            map_state: TableState::default(),
            current_page: Page::Directory,
            show_detail: false,
            search: String::new(),
            editing_search: false,
            sort: SortState::default(),
            map,
        };
        app.refilter();
        if !app.cities.is_empty() {
            app.cities_state.select(Some(0));
        }
        if !app.map.points().is_empty() {
            app.map_state.select(Some(0));
        }
        app
    }

    fn refilter(&mut self) {
        self.filtered_users = filter_and_sort(&self.users, &self.search, self.sort)
            .into_iter()
            .cloned()
            .collect();

        // Reset selection to first item
        if !self.filtered_users.is_empty() {
            self.state.select(Some(0));
        } else {
            self.state.select(None);
        }
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_user(&self) -> Option<&UserRecord> {
        self.state.selected().and_then(|i| self.filtered_users.get(i))
    }

    pub fn sort_by(&mut self, column: SortColumn) {
        self.sort.toggle(column);
        self.refilter();
    }

    pub fn push_search(&mut self, c: char) {
        self.search.push(c);
        self.refilter();
    }

    pub fn pop_search(&mut self) {
        self.search.pop();
        self.refilter();
    }

    pub fn clear_search(&mut self) {
        self.search.clear();
        self.refilter();
    }

    /// Filter the map to the city under the cursor on the Cities page
    pub fn select_city(&mut self) {
        let city = self
            .cities_state
            .selected()
            .and_then(|i| self.cities.get(i))
            .map(|(city, _)| city.clone());
        self.map.set_city(city);
        self.current_page = Page::Map;
    }

    pub fn clear_city(&mut self) {
        self.map.set_city(None);
    }

    /// Emphasize the map point under the cursor
    pub fn highlight_selected_point(&mut self) {
        let id = self
            .map_state
            .selected()
            .and_then(|i| self.map.points().get(i))
            .map(|p| p.user_id.clone());
        self.map.set_highlighted(id.map(Highlight::User));
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    fn active_table(&mut self) -> (&mut TableState, usize) {
        match self.current_page {
            Page::Directory => (&mut self.state, self.filtered_users.len()),
            Page::Cities => (&mut self.cities_state, self.cities.len()),
            Page::Map => (&mut self.map_state, self.map.points().len()),
        }
    }

    pub fn next(&mut self) {
        let (state, len) = self.active_table();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let (state, len) = self.active_table();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let (state, len) = self.active_table();
        if len == 0 {
            return;
        }
        let i = state.selected().map_or(0, |i| (i + PAGE_JUMP).min(len - 1));
        state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        let (state, len) = self.active_table();
        if len == 0 {
            return;
        }
        let i = state.selected().map_or(0, |i| i.saturating_sub(PAGE_JUMP));
        state.select(Some(i));
    }

    pub fn home(&mut self) {
        let (state, len) = self.active_table();
        if len > 0 {
            state.select(Some(0));
        }
    }

    pub fn end(&mut self) {
        let (state, len) = self.active_table();
        if len > 0 {
            state.select(Some(len - 1));
        }
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        let Event::Key(key) = event::read()? else {
            continue;
        };

        if app.editing_search {
            match key.code {
                KeyCode::Enter | KeyCode::Esc => app.editing_search = false,
                KeyCode::Backspace => app.pop_search(),
                KeyCode::Char(c) => app.push_search(c),
                _ => {}
            }
            continue;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                app.map.unmount();
                return Ok(());
            }
            KeyCode::Tab => {
                if key.modifiers.contains(KeyModifiers::SHIFT) {
                    app.previous_page();
                } else {
                    app.next_page();
                }
            }
            KeyCode::BackTab => app.previous_page(),
            KeyCode::Enter => match app.current_page {
                Page::Directory => app.toggle_detail(),
                Page::Cities => app.select_city(),
                Page::Map => app.highlight_selected_point(),
            },
            KeyCode::Char('/') if app.current_page == Page::Directory => {
                app.editing_search = true;
            }
            KeyCode::Char('c') => match app.current_page {
                Page::Directory => app.clear_search(),
                _ => app.clear_city(),
            },
            KeyCode::Char(d @ '1'..='6') if app.current_page == Page::Directory => {
                let idx = d as usize - '1' as usize;
                app.sort_by(SortColumn::ALL[idx]);
            }
            KeyCode::Down | KeyCode::Char('j') => app.next(),
            KeyCode::Up | KeyCode::Char('k') => app.previous(),
            KeyCode::PageDown => app.page_down(),
            KeyCode::PageUp => app.page_up(),
            KeyCode::Home => app.home(),
            KeyCode::End => app.end(),
            _ => {}
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail && app.current_page == Page::Directory {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        render_directory(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        match app.current_page {
            Page::Directory => render_directory(f, chunks[1], app),
            Page::Cities => render_cities(f, chunks[1], app),
            Page::Map => render_map(f, chunks[1], app),
        }
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, page) in [Page::Directory, Page::Cities, Page::Map].iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Users: {}", app.users.len()),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("On map: {}", app.map.points().len()),
        Style::default().fg(Color::Green),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("Unmapped: {}", app.map.unmapped_count()),
        Style::default().fg(Color::Red),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn header_row<'a>(titles: impl IntoIterator<Item = String>) -> Row<'a> {
    let cells = titles.into_iter().map(|h| {
        Cell::from(h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });

    Row::new(cells).style(Style::default().bg(Color::DarkGray)).height(1)
}

fn render_directory(f: &mut Frame, area: Rect, app: &mut App) {
    let titles = SortColumn::ALL.iter().enumerate().map(|(i, col)| {
        if *col == app.sort.column {
            format!("{} {} {}", i + 1, col.title(), app.sort.direction.arrow())
        } else {
            format!("{} {}", i + 1, col.title())
        }
    });

    let rows = app.filtered_users.iter().map(|user| {
        let neighborhood = user.primary_neighborhood().unwrap_or("—");
        let cells = vec![
            Cell::from(truncate(&user.display_name(), 24)),
            Cell::from(truncate(&user.email, 28)),
            Cell::from(user.country.clone()),
            Cell::from(user.state.clone().unwrap_or_default()),
            Cell::from(user.city.clone()).style(Style::default().fg(Color::Cyan)),
            Cell::from(truncate(neighborhood, 22)),
        ];

        Row::new(cells).height(1)
    });

    let title = if app.search.is_empty() {
        " Users ".to_string()
    } else {
        format!(" Users matching \"{}\" ", app.search)
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(26),
            Constraint::Length(30),
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Length(18),
            Constraint::Length(24),
        ],
    )
    .header(header_row(titles))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(title),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_cities(f: &mut Frame, area: Rect, app: &mut App) {
    let selected_city = app.map.selection().city().map(str::to_string);

    let rows = app.cities.iter().map(|(city, count)| {
        let style = if selected_city.as_deref() == Some(city.as_str()) {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        Row::new(vec![Cell::from(city.clone()), Cell::from(count.to_string())])
            .style(style)
            .height(1)
    });

    let table = Table::new(rows, [Constraint::Length(30), Constraint::Length(10)])
        .header(header_row(["City".to_string(), "Users".to_string()]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(" Cities - Enter filters the map "),
        )
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.cities_state);
}

fn render_map(f: &mut Frame, area: Rect, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(0)])
        .split(area);

    let city = app.map.selection().city().unwrap_or("All cities").to_string();
    let viewport = app
        .map
        .layer()
        .surface()
        .and_then(|s| s.viewport())
        .and_then(|v| Some((v.bounds.south_west()?, v.bounds.north_east()?, v.max_zoom)));

    let viewport_line = match viewport {
        Some((sw, ne, zoom)) => format!(
            "  Viewport: ({:.4}, {:.4}) → ({:.4}, {:.4})  max zoom {}",
            sw.lat, sw.lng, ne.lat, ne.lng, zoom
        ),
        None => "  Viewport: unchanged".to_string(),
    };

    let summary = Paragraph::new(vec![
        Line::from(vec![
            Span::styled("  Filter: ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            Span::styled(city, Style::default().fg(Color::Green)),
        ]),
        Line::from(viewport_line),
    ])
    .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::White)));
    f.render_widget(summary, chunks[0]);

    let highlighted = match app.map.selection().highlighted() {
        Some(Highlight::User(id)) => Some(id.clone()),
        _ => None,
    };

    let rows = app.map.points().iter().map(|p| {
        let style = if highlighted.as_deref() == Some(p.user_id.as_str()) {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        Row::new(vec![
            Cell::from(truncate(&p.display_name, 24)),
            Cell::from(format!("{:.4}", p.lat)),
            Cell::from(format!("{:.4}", p.lng)),
            Cell::from(p.profile_url.clone()),
        ])
        .style(style)
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(26),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Min(20),
        ],
    )
    .header(header_row(["Name", "Lat", "Lng", "Profile"].map(String::from)))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Points "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, chunks[1], &mut app.map_state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let (selected, total) = match app.current_page {
        Page::Directory => (app.state.selected(), app.filtered_users.len()),
        Page::Cities => (app.cities_state.selected(), app.cities.len()),
        Page::Map => (app.map_state.selected(), app.map.points().len()),
    };

    let mut status_spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected.map(|i| i + 1).unwrap_or(0), total),
        Style::default().fg(Color::Cyan),
    )];

    if app.editing_search {
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled(
            format!("Search: {}▏", app.search),
            Style::default().fg(Color::Green),
        ));
        status_spans.push(Span::raw(" (Enter done)"));
    } else {
        let keys: &[(&str, &str)] = match app.current_page {
            Page::Directory => &[("/", "Search"), ("1-6", "Sort"), ("Enter", "Details"), ("c", "Clear")],
            Page::Cities => &[("Enter", "Filter map"), ("c", "All cities")],
            Page::Map => &[("Enter", "Highlight"), ("c", "All cities")],
        };
        for (key, label) in keys.iter().chain(&[("Tab", "Page"), ("↑/↓", "Nav")]) {
            status_spans.push(Span::raw(" | "));
            status_spans.push(Span::styled(*key, Style::default().fg(Color::Yellow)));
            status_spans.push(Span::raw(format!(" {label}")));
        }
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
        status_spans.push(Span::raw(" Quit"));
    }

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let Some(user) = app.selected_user() else {
        return;
    };

    let field = |label: &str, value: String| {
        Line::from(vec![
            Span::styled(format!("  {label}: "), Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            Span::styled(value, Style::default().fg(Color::Green)),
        ])
    };

    let mut content = vec![
        Line::from(""),
        Line::from(Span::styled(
            format!("  {}", user.display_name()),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        )),
        Line::from(""),
        field("Email", user.email.clone()),
        field("Profile", user.profile_url()),
        field("Country", user.country.clone()),
        field("State", user.state.clone().unwrap_or_else(|| "—".to_string())),
        field("City", user.city.clone()),
        Line::from(""),
        Line::from(Span::styled(
            "  NEIGHBORHOODS",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        )),
        Line::from(""),
    ];

    if user.neighborhoods.is_empty() {
        content.push(Line::from(Span::styled(
            "  none listed",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }
    for (i, name) in user.neighborhoods.iter().enumerate() {
        // first pick is the one on the map
        let marker = if i == 0 { "📍" } else { "  " };
        content.push(Line::from(format!("  {marker} {name}")));
    }

    content.push(Line::from(""));
    content.push(Line::from(Span::styled(
        "  Press Enter to close",
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    )));

    let detail_panel = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" User Details "),
    );

    f.render_widget(detail_panel, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roommate_map::NeighborhoodRecord;

    fn app() -> App {
        let users: Vec<UserRecord> = serde_json::from_str(
            r#"[
                {"_id":"1","first_name":"Ada","last_name":"L","email":"ada@caltech.edu","city":"Boston","neighborhoods":["Back Bay"]},
                {"_id":"2","first_name":"Bob","last_name":"M","email":"bob@caltech.edu","city":"Boston","neighborhoods":["Back Bay"]},
                {"_id":"3","first_name":"Cy","last_name":"N","email":"cy@caltech.edu","city":"Austin","neighborhoods":["Zilker"]}
            ]"#,
        )
        .unwrap();
        let reference = ReferenceData::new(
            vec![NeighborhoodRecord {
                name: "Back Bay".to_string(),
                city_name: "Boston".to_string(),
                state_name: "Massachusetts".to_string(),
                lat: 42.3503,
                lng: -71.0810,
                zip: None,
            }],
            vec![],
        );
        App::new(users, reference)
    }

    #[test]
    fn test_app_wires_map_pipeline() {
        let app = app();
        assert_eq!(app.map.points().len(), 2);
        assert_eq!(app.map.unmapped_count(), 1);
        assert_eq!(app.cities, vec![("Austin".to_string(), 1), ("Boston".to_string(), 2)]);
    }

    #[test]
    fn test_search_resets_selection() {
        let mut app = app();
        app.next();
        app.push_search('c');
        app.push_search('y');
        assert_eq!(app.filtered_users.len(), 1);
        assert_eq!(app.state.selected(), Some(0));

        app.push_search('z');
        assert_eq!(app.state.selected(), None);
        app.clear_search();
        assert_eq!(app.filtered_users.len(), 3);
    }

    #[test]
    fn test_navigation_wraps() {
        let mut app = app();
        app.previous();
        assert_eq!(app.state.selected(), Some(2));
        app.next();
        assert_eq!(app.state.selected(), Some(0));
        app.page_down();
        assert_eq!(app.state.selected(), Some(2));
    }

    #[test]
    fn test_select_city_filters_map() {
        let mut app = app();
        app.current_page = Page::Cities;
        app.next();
        app.select_city();

        assert_eq!(app.current_page, Page::Map);
        assert_eq!(app.map.selection().city(), Some("Boston"));
        let viewport = app.map.layer().surface().and_then(|s| s.viewport()).unwrap();
        assert_eq!(viewport.max_zoom, 14.0);
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("Zoë Ångström-Lovelace", 8), "Zoë Å...");
        assert_eq!(truncate("short", 8), "short");
    }
}
