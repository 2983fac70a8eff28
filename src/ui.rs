use crate::{
    app::{
        AppView,
        Lifecycle,
    },
    events::UserNotification,
    wallet::ConnectionPhase,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        self,
        Event,
        KeyCode,
        KeyEventKind,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::{
    collections::VecDeque,
    io::stdout,
};
use tokio::sync::mpsc;

pub type InputEventReceiver = mpsc::UnboundedReceiver<std::io::Result<Event>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserEvent {
    Quit,
    Connect,
    SubmitPassword(String),
    Refresh,
    EnterLottery,
    Redraw,
}

#[derive(Default)]
pub struct UiState {
    mode: Mode,
    notifications: VecDeque<UserNotification>,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Normal,
    PasswordPrompt(String),
}

impl UiState {
    pub fn push_notification(&mut self, notification: UserNotification) {
        self.notifications.push_back(notification);
    }

    pub fn open_password_prompt(&mut self) {
        self.mode = Mode::PasswordPrompt(String::new());
    }

    pub fn active_notification(&self) -> Option<&UserNotification> {
        self.notifications.front()
    }
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

/// Blocking terminal reads happen on their own thread.
pub fn input_event_stream() -> InputEventReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            let ev = event::read();
            let failed = ev.is_err();
            if tx.send(ev).is_err() || failed {
                break;
            }
        }
    });
    rx
}

pub async fn next_raw_event(rx: &mut InputEventReceiver) -> Result<Event> {
    match rx.recv().await {
        Some(ev) => Ok(ev?),
        None => Err(eyre!("terminal input closed")),
    }
}

pub fn draw(state: &mut UiState, view: &AppView) -> Result<()> {
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| render(f, state, view))?;
        state.terminal = Some(term);
    }
    Ok(())
}

pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    let k = match event {
        Event::Key(k) if k.kind == KeyEventKind::Press => k,
        Event::Resize(_, _) => return Some(UserEvent::Redraw),
        _ => return None,
    };
    if k.modifiers.contains(KeyModifiers::CONTROL) && k.code == KeyCode::Char('c') {
        return Some(UserEvent::Quit);
    }
    // the winner notice swallows everything until acknowledged
    if !state.notifications.is_empty() {
        return match k.code {
            KeyCode::Enter => {
                state.notifications.pop_front();
                Some(UserEvent::Redraw)
            }
            _ => None,
        };
    }
    if let Mode::PasswordPrompt(buffer) = &mut state.mode {
        return match k.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Enter => {
                let password = std::mem::take(buffer);
                state.mode = Mode::Normal;
                Some(UserEvent::SubmitPassword(password))
            }
            KeyCode::Backspace => {
                buffer.pop();
                Some(UserEvent::Redraw)
            }
            KeyCode::Char(c) => {
                buffer.push(c);
                Some(UserEvent::Redraw)
            }
            _ => None,
        };
    }
    match k.code {
        KeyCode::Char('q') | KeyCode::Esc => Some(UserEvent::Quit),
        KeyCode::Char('c') => Some(UserEvent::Connect),
        KeyCode::Char('r') => Some(UserEvent::Refresh),
        KeyCode::Char('e') => Some(UserEvent::EnterLottery),
        _ => None,
    }
}

fn render(f: &mut Frame, state: &UiState, view: &AppView) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // status
            Constraint::Length(7), // lottery
            Constraint::Min(5),    // activity log
            Constraint::Length(3), // contract address + keys
        ])
        .split(f.area());

    draw_status(f, chunks[0], view);
    draw_lottery_panel(f, chunks[1], view);
    draw_log_panel(f, chunks[2], view);
    draw_footer(f, chunks[3], view);
    draw_modals(f, state);
}

fn draw_status(f: &mut Frame, area: Rect, view: &AppView) {
    let color = match (view.lifecycle, view.connection.phase) {
        (Lifecycle::Unavailable, _) => Color::Red,
        (_, ConnectionPhase::Connected) => Color::Green,
        (_, _) if view.connection.error.is_some() => Color::Red,
        _ => Color::Yellow,
    };
    let mut text = view.status.clone();
    if view.pending_entries > 0 {
        text.push_str(&format!(" | Pending entries: {}", view.pending_entries));
    }
    let widget = Paragraph::new(text)
        .style(Style::default().fg(color))
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(widget, area);
}

fn draw_lottery_panel(f: &mut Frame, area: Rect, view: &AppView) {
    let lines: Vec<Line> = match &view.snapshot {
        Some(snapshot) => vec![
            Line::from(format!("Lottery State: {}", snapshot.phase)),
            Line::from(format!("Prize Pool: {} ETH", snapshot.prize_pool_ether())),
            Line::from(format!("Entry Fee: {} ETH", snapshot.entry_fee_ether())),
            Line::from(format!("Number of Players: {}", snapshot.player_count)),
            Line::from(format!("Recent Winner: {}", snapshot.recent_winner)),
        ],
        None if view.connection.is_connected() => vec![Line::from("Loading...")],
        None => vec![Line::from("Connect your wallet to see the lottery.")],
    };
    let widget = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Lottery"));
    f.render_widget(widget, area);
}

fn draw_log_panel(f: &mut Frame, area: Rect, view: &AppView) {
    let visible = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = view
        .log_lines
        .iter()
        .take(visible)
        .map(|line| {
            let style = if line.contains("Error") {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };
            Line::styled(line.clone(), style)
        })
        .collect();
    let widget = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Activity Log"));
    f.render_widget(widget, area);
}

fn draw_footer(f: &mut Frame, area: Rect, view: &AppView) {
    let address = match &view.contract_address {
        Some(address) => format!("Contract Address: {address}"),
        None => "Contract Address: unknown".to_owned(),
    };
    let keys = match view.lifecycle {
        Lifecycle::Unavailable => "q/Esc quit",
        Lifecycle::DirectoryResolved => "c connect wallet | q/Esc quit",
        _ => "r refresh | e enter lottery | q/Esc quit",
    };
    let widget = Paragraph::new(format!("{address} | {keys}"))
        .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(widget, area);
}

fn draw_modals(f: &mut Frame, state: &UiState) {
    if let Some(notification) = state.notifications.front() {
        let area = centered_rect(60, 25, f.area());
        let block = Block::default()
            .borders(Borders::ALL)
            .title("Winner Picked")
            .style(Style::default().fg(Color::Yellow));
        let p = Paragraph::new(format!("{notification}\n\nEnter=dismiss"))
            .wrap(Wrap { trim: false });
        f.render_widget(Clear, area);
        f.render_widget(block.clone(), area);
        f.render_widget(p, block.inner(area));
        return;
    }
    if let Mode::PasswordPrompt(buffer) = &state.mode {
        let area = centered_rect(50, 20, f.area());
        let block = Block::default().borders(Borders::ALL).title("Unlock Wallet");
        let masked = "*".repeat(buffer.chars().count());
        let p = Paragraph::new(format!(
            "Password: {masked}\nEnter=unlock Esc=cancel"
        ));
        f.render_widget(Clear, area);
        f.render_widget(block.clone(), area);
        f.render_widget(p, block.inner(area));
    }
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        snapshot::{
            LotteryPhase,
            LotterySnapshot,
            RecentWinner,
        },
        wallet::ConnectionState,
    };
    use alloy::primitives::{
        Address,
        U256,
        address,
    };
    use crossterm::event::KeyEvent;
    use ratatui::backend::TestBackend;
    use std::sync::Arc;

    const WINNER: Address = address!("0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC");

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn active_view() -> AppView {
        AppView {
            lifecycle: Lifecycle::Active,
            status: "Connected: 0xf39F...2266".to_owned(),
            connection: ConnectionState {
                phase: ConnectionPhase::Connected,
                account: Some(Address::repeat_byte(1)),
                error: None,
            },
            snapshot: Some(Arc::new(LotterySnapshot {
                phase: LotteryPhase::Open,
                prize_pool_wei: U256::from(5_000_000_000_000_000_000u128),
                entry_fee_wei: U256::from(10_000_000_000_000_000u64),
                player_count: U256::from(3),
                recent_winner: RecentWinner::None,
            })),
            log_lines: vec!["[12:00:00] Lottery info updated successfully.".to_owned()],
            contract_address: Some("0x5FbDB2315678afecb367f032d93F642f64180aa3".to_owned()),
            pending_entries: 0,
        }
    }

    fn rendered(state: &UiState, view: &AppView) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| render(f, state, view)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn interpret_event__normal_mode__maps_action_keys() {
        let mut state = UiState::default();

        assert_eq!(
            interpret_event(&mut state, key(KeyCode::Char('c'))),
            Some(UserEvent::Connect)
        );
        assert_eq!(
            interpret_event(&mut state, key(KeyCode::Char('r'))),
            Some(UserEvent::Refresh)
        );
        assert_eq!(
            interpret_event(&mut state, key(KeyCode::Char('e'))),
            Some(UserEvent::EnterLottery)
        );
        assert_eq!(
            interpret_event(&mut state, key(KeyCode::Esc)),
            Some(UserEvent::Quit)
        );
        assert_eq!(interpret_event(&mut state, key(KeyCode::Char('x'))), None);
    }

    #[test]
    fn interpret_event__password_prompt__collects_and_submits() {
        // given
        let mut state = UiState::default();
        state.open_password_prompt();

        // when
        for c in "hunter22".chars() {
            interpret_event(&mut state, key(KeyCode::Char(c)));
        }
        interpret_event(&mut state, key(KeyCode::Backspace));
        let submitted = interpret_event(&mut state, key(KeyCode::Enter));

        // then
        assert_eq!(
            submitted,
            Some(UserEvent::SubmitPassword("hunter2".to_owned()))
        );
        assert_eq!(state.mode, Mode::Normal);
    }

    #[test]
    fn interpret_event__winner_notice__blocks_until_enter() {
        // given
        let mut state = UiState::default();
        state.push_notification(UserNotification::WinnerPicked { winner: WINNER });
        state.push_notification(UserNotification::WinnerPicked {
            winner: Address::repeat_byte(2),
        });

        // when
        let quit = interpret_event(&mut state, key(KeyCode::Char('q')));
        let dismissed = interpret_event(&mut state, key(KeyCode::Enter));

        // then
        assert_eq!(quit, None);
        assert_eq!(dismissed, Some(UserEvent::Redraw));
        assert_eq!(
            state.active_notification(),
            Some(&UserNotification::WinnerPicked {
                winner: Address::repeat_byte(2)
            })
        );
    }

    #[test]
    fn render__active_view__shows_lottery_and_footer() {
        let state = UiState::default();

        let screen = rendered(&state, &active_view());

        assert!(screen.contains("Lottery State: OPEN"));
        assert!(screen.contains("Number of Players: 3"));
        assert!(screen.contains("Recent Winner: No winner yet"));
        assert!(screen.contains("Contract Address: 0x5FbDB2315678afecb367f032d93F642f64180aa3"));
        assert!(screen.contains("Lottery info updated successfully."));
    }

    #[test]
    fn render__password_prompt__masks_input() {
        let mut state = UiState::default();
        state.open_password_prompt();
        for c in "secret".chars() {
            interpret_event(&mut state, key(KeyCode::Char(c)));
        }

        let screen = rendered(&state, &active_view());

        assert!(screen.contains("Password: ******"));
        assert!(!screen.contains("secret"));
    }
}
