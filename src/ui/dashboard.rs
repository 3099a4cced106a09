// ============================================================================
// Dashboard - Rendu de l'interface
// ============================================================================
// Écran principal :
//   header   : titre, devise, indicateur de fetch, message de statut
//   gauge    : progression vers le prochain rafraîchissement ("ETA 12m")
//   liste    : une ligne par coin (+ détail H/D/W/M si déplié)
//   footer   : raccourcis, question y / n, ou ligne de saisie
//
// Les écrans AddCoin et Settings s'affichent en popup par-dessus.
// ============================================================================

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, Paragraph},
    Frame,
};

use crate::app::{App, Screen};
use crate::models::{format_change, Trend, WatchEntry};

/// Pastille qui représente l'icône d'un coin
const ICON_GLYPH: &str = "●";

/// Dessine l'interface complète
pub fn render(frame: &mut Frame, app: &App) {
    let size = frame.size();
    let chunks = create_layout(size);

    render_header(frame, app, chunks[0]);
    render_gauge(frame, app, chunks[1]);
    render_watchlist(frame, app, chunks[2]);

    match &app.current_screen {
        Screen::Dashboard => render_footer(frame, chunks[3]),
        Screen::Confirm(action) => render_confirm_footer(frame, &action.prompt(), chunks[3]),
        Screen::AddCoin => {
            render_input_footer(frame, app, chunks[3]);
            render_suggestions(frame, app, chunks[2]);
        }
        Screen::Settings => {
            render_footer(frame, chunks[3]);
            render_settings(frame, app, size);
        }
    }
}

/// header, gauge, liste, footer
fn create_layout(area: Rect) -> Vec<Rect> {
    Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(4),
        ])
        .split(area)
        .to_vec()
}

/// Zone centrée de (percent_x % de large, height lignes)
fn centered_rect(percent_x: u16, height: u16, area: Rect) -> Rect {
    let height = height.min(area.height);
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(height),
            Constraint::Min(0),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

fn key_style(color: Color) -> Style {
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

// ============================================================================
// Header et gauge
// ============================================================================

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" CoinWatcher ")
        .title_alignment(Alignment::Center);

    let mut spans = vec![
        Span::raw("Currency: "),
        Span::styled(app.currency.clone(), key_style(Color::Yellow)),
    ];

    if app.progress.fetching {
        spans.push(Span::styled("   ⟳ fetching", key_style(Color::Cyan)));
    }
    if let Some(busy) = &app.busy {
        spans.push(Span::styled(format!("   {}", busy), Style::default().fg(Color::Cyan)));
    }
    if let Some(status) = &app.status {
        spans.push(Span::styled(format!("   {}", status), Style::default().fg(Color::Gray)));
    }

    let paragraph = Paragraph::new(Line::from(spans))
        .block(block)
        .alignment(Alignment::Center);
    frame.render_widget(paragraph, area);
}

/// Pourcentage de la gauge (0..=100)
pub fn gauge_percent(percent: f64) -> u16 {
    percent.clamp(0.0, 100.0).floor() as u16
}

fn render_gauge(frame: &mut Frame, app: &App, area: Rect) {
    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(Color::Cyan).bg(Color::Black))
        .percent(gauge_percent(app.progress.percent))
        .label(app.progress.eta_label());
    frame.render_widget(gauge, area);
}

// ============================================================================
// Watchlist
// ============================================================================

/// Couleur d'une variation : vert > 0, rouge < 0, neutre sinon
pub fn change_style(change: f64) -> Style {
    match Trend::of(change) {
        Trend::Up => Style::default().fg(Color::Green),
        Trend::Down => Style::default().fg(Color::Red),
        Trend::Flat => Style::default(),
    }
}

/// Pastille colorée avec la couleur moyenne de l'icône
pub fn icon_span(color: Option<(u8, u8, u8)>) -> Span<'static> {
    let color = match color {
        Some((r, g, b)) => Color::Rgb(r, g, b),
        None => Color::DarkGray,
    };
    Span::styled(ICON_GLYPH, Style::default().fg(color))
}

/// Lignes d'une entrée : la ligne principale, puis le détail si déplié
pub fn entry_lines(entry: &WatchEntry, icon: Option<(u8, u8, u8)>, expanded: bool) -> Vec<Line<'static>> {
    let mut main = vec![icon_span(icon), Span::raw(" ")];

    match entry.change_1h() {
        Some(change) => {
            main.push(Span::raw(entry.display()));
            main.push(Span::raw("  "));
            main.push(Span::styled(format_change("H", change), change_style(change)));
        }
        None => main.push(Span::styled(entry.display(), Style::default().fg(Color::Gray))),
    }

    let mut lines = vec![Line::from(main)];

    if expanded && entry.has_quote() {
        let mut detail = vec![Span::raw("    ")];
        for (label, change) in entry.changes() {
            detail.push(Span::styled(format_change(label, change), change_style(change)));
            detail.push(Span::raw("   "));
        }
        lines.push(Line::from(detail));
    }

    lines
}

fn render_watchlist(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Watchlist ");

    if app.entries.is_empty() {
        let text = vec![
            Line::from(""),
            Line::from(Span::styled(
                "Watchlist is empty, press [a] to add a coin",
                Style::default().fg(Color::Gray),
            )),
        ];
        let paragraph = Paragraph::new(text).block(block).alignment(Alignment::Center);
        frame.render_widget(paragraph, area);
        return;
    }

    let items: Vec<ListItem> = app
        .entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let lines = entry_lines(
                entry,
                app.icon_color(entry.ticker()),
                app.is_expanded(entry.ticker()),
            );
            let item = ListItem::new(lines);
            if index == app.selected_index {
                item.style(Style::default().add_modifier(Modifier::BOLD | Modifier::REVERSED))
            } else {
                item
            }
        })
        .collect();

    frame.render_widget(List::new(items).block(block), area);
}

// ============================================================================
// Footers
// ============================================================================

fn render_footer(frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let navigation = Line::from(vec![
        Span::styled("[↑↓ / j k]", key_style(Color::Yellow)),
        Span::raw(" Navigate  "),
        Span::styled("[Space]", key_style(Color::Yellow)),
        Span::raw(" Details  "),
        Span::styled("[a]", key_style(Color::Green)),
        Span::raw(" Add  "),
        Span::styled("[d]", key_style(Color::Red)),
        Span::raw(" Delete  "),
        Span::styled("[q]", key_style(Color::Yellow)),
        Span::raw(" Quit"),
    ]);
    let actions = Line::from(vec![
        Span::styled("[r]", key_style(Color::Yellow)),
        Span::raw(" Refresh  "),
        Span::styled("[c]", key_style(Color::Yellow)),
        Span::raw(" Currency  "),
        Span::styled("[s]", key_style(Color::Yellow)),
        Span::raw(" Save  "),
        Span::styled("[l]", key_style(Color::Yellow)),
        Span::raw(" Reload  "),
        Span::styled("[p]", key_style(Color::Yellow)),
        Span::raw(" Settings"),
    ]);

    let paragraph = Paragraph::new(vec![navigation, actions])
        .block(block)
        .alignment(Alignment::Center);
    frame.render_widget(paragraph, area);
}

fn render_confirm_footer(frame: &mut Frame, prompt: &str, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let question = Line::from(Span::styled(
        format!("⚠  {}", prompt),
        key_style(Color::Yellow),
    ));
    let answers = Line::from(vec![
        Span::styled("[y]", key_style(Color::Green).add_modifier(Modifier::SLOW_BLINK)),
        Span::raw(" Yes  "),
        Span::styled("[n / ESC]", key_style(Color::Red)),
        Span::raw(" No"),
    ]);

    let paragraph = Paragraph::new(vec![question, answers])
        .block(block)
        .alignment(Alignment::Center);
    frame.render_widget(paragraph, area);
}

fn render_input_footer(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let input_line = Line::from(vec![
        Span::styled("Add coin: ", key_style(Color::Cyan)),
        Span::styled(app.input_buffer.clone(), Style::default().fg(Color::White)),
        Span::styled("█", Style::default().fg(Color::White).add_modifier(Modifier::SLOW_BLINK)),
    ]);
    let help_line = Line::from(vec![
        Span::styled("[Enter]", key_style(Color::Green)),
        Span::raw(" Add  "),
        Span::styled("[Tab]", key_style(Color::Yellow)),
        Span::raw(" Complete  "),
        Span::styled("[ESC]", key_style(Color::Red)),
        Span::raw(" Cancel"),
    ]);

    let paragraph = Paragraph::new(vec![input_line, help_line])
        .block(block)
        .alignment(Alignment::Left);
    frame.render_widget(paragraph, area);
}

// ============================================================================
// Popups
// ============================================================================

fn render_suggestions(frame: &mut Frame, app: &App, area: Rect) {
    let lines: Vec<Line> = match &app.suggestions {
        None => vec![Line::from(Span::styled("Loading catalog...", Style::default().fg(Color::Gray)))],
        Some(_) => {
            let matches = app.filtered_suggestions();
            if matches.is_empty() {
                vec![Line::from(Span::styled("No matching coin", Style::default().fg(Color::Gray)))]
            } else {
                matches
                    .iter()
                    .enumerate()
                    .map(|(i, symbol)| {
                        let style = if i == 0 {
                            key_style(Color::Green)
                        } else {
                            Style::default()
                        };
                        Line::from(Span::styled(symbol.label(), style))
                    })
                    .collect()
            }
        }
    };

    let popup = centered_rect(50, lines.len() as u16 + 2, area);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green))
        .title(" Suggestions ");

    frame.render_widget(Clear, popup);
    frame.render_widget(Paragraph::new(lines).block(block), popup);
}

fn render_settings(frame: &mut Frame, app: &App, area: Rect) {
    let form = &app.settings_form;

    let lines = vec![
        Line::from(vec![
            Span::styled("CoinMarketCap API key: ", key_style(Color::Cyan)),
            Span::raw(form.api_key.clone()),
            Span::styled("█", Style::default().add_modifier(Modifier::SLOW_BLINK)),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled("Refresh interval:      ", key_style(Color::Cyan)),
            Span::styled(format!("◀ {} ▶", form.interval_label()), key_style(Color::Yellow)),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled("[←→]", key_style(Color::Yellow)),
            Span::raw(" Interval  "),
            Span::styled("[Enter]", key_style(Color::Green)),
            Span::raw(" Save  "),
            Span::styled("[ESC]", key_style(Color::Red)),
            Span::raw(" Cancel"),
        ]),
    ];

    let popup = centered_rect(70, lines.len() as u16 + 2, area);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Settings ");

    frame.render_widget(Clear, popup);
    frame.render_widget(Paragraph::new(lines).block(block), popup);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use ratatui::{backend::TestBackend, Terminal};

    use super::*;
    use crate::app::PendingAction;
    use crate::models::{Quote, Symbol};
    use crate::persistence::Settings;

    fn quoted(ticker: &str, change_1h: f64) -> WatchEntry {
        let mut quote = Quote::new(Symbol::new(1, ticker, "Some coin"), 1_234.5);
        quote.percent_change_1h = change_1h;
        quote.percent_change_24h = -2.0;
        WatchEntry::Quoted(quote)
    }

    fn line_text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_change_style() {
        assert_eq!(change_style(1.5).fg, Some(Color::Green));
        assert_eq!(change_style(-0.1).fg, Some(Color::Red));
        assert_eq!(change_style(0.0).fg, None);
    }

    #[test]
    fn test_icon_span_colour() {
        assert_eq!(icon_span(Some((247, 147, 26))).style.fg, Some(Color::Rgb(247, 147, 26)));
        assert_eq!(icon_span(None).style.fg, Some(Color::DarkGray));
    }

    #[test]
    fn test_entry_lines() {
        let entry = quoted("BTC", 1.3);
        let lines = entry_lines(&entry, None, false);
        assert_eq!(lines.len(), 1);
        assert!(line_text(&lines[0]).contains("H: 1.3"));

        let lines = entry_lines(&entry, None, true);
        assert_eq!(lines.len(), 2);
        let detail = line_text(&lines[1]);
        assert!(detail.contains("D: -2.0"));
        assert!(detail.contains("M: 0.0"));

        // Sans cotation : "Loading..." et pas de détail
        let pending: WatchEntry = Symbol::bare("DOT", "Polkadot").into();
        let lines = entry_lines(&pending, None, true);
        assert_eq!(lines.len(), 1);
        assert!(line_text(&lines[0]).contains("Loading..."));
    }

    #[test]
    fn test_gauge_percent() {
        assert_eq!(gauge_percent(-3.0), 0);
        assert_eq!(gauge_percent(42.9), 42);
        assert_eq!(gauge_percent(250.0), 100);
    }

    #[test]
    fn test_render_every_screen() {
        let settings = Settings::defaults("key".to_string(), &[]);
        let mut app = App::new(&settings);
        app.set_entries(vec![quoted("BTC", 0.5), Symbol::bare("ETH", "Ethereum").into()]);
        app.toggle_detail();

        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| render(f, &app)).unwrap();

        app.start_add();
        terminal.draw(|f| render(f, &app)).unwrap();
        app.set_suggestions(vec![Symbol::new(5426, "SOL", "Solana")]);
        terminal.draw(|f| render(f, &app)).unwrap();

        app.start_settings(&settings);
        terminal.draw(|f| render(f, &app)).unwrap();

        app.request(PendingAction::Quit);
        terminal.draw(|f| render(f, &app)).unwrap();

        // Terminal minuscule : pas de panic
        let mut tiny = Terminal::new(TestBackend::new(10, 4)).unwrap();
        tiny.draw(|f| render(f, &app)).unwrap();
    }
}
