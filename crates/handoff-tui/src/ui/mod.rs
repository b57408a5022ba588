use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;

use handoff_core::domain::{Author, DeliveryStatus, SessionStatus};

use crate::app::{App, Composer, ConfirmState, ContextMenu, KnowledgeForm, Mode};
use crate::util::{format_activity, format_message_time, preview, status_label, wrap};

pub fn draw(frame: &mut Frame<'_>, app: &App) {
    let size = frame.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(4),
        ])
        .split(size);

    render_header(frame, chunks[0], app);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(38), Constraint::Percentage(62)])
        .split(chunks[1]);
    render_sessions(frame, body[0], app);
    render_conversation(frame, body[1], app);

    render_footer(frame, chunks[2], app);

    if app.show_help {
        render_help(frame, size);
    }

    match &app.mode {
        Mode::Menu(menu) => render_menu(frame, size, menu),
        Mode::Confirm(state) => render_confirm(frame, size, state),
        Mode::Knowledge(form) => render_knowledge_form(frame, size, form),
        _ => {}
    }
}

fn render_header(frame: &mut Frame<'_>, area: Rect, app: &App) {
    let current = app.dashboard.view();
    let mut spans = Vec::new();
    for (index, (view, count)) in app.dashboard.view_counts().into_iter().enumerate() {
        let label = format!(" {} {} ({}) ", index + 1, view.title(), count);
        let style = if view == current {
            Style::default()
                .fg(Color::Black)
                .bg(Color::LightGreen)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        spans.push(Span::styled(label, style));
        spans.push(Span::raw(" "));
    }

    let (live_label, live_style) = if app.live {
        ("● live", Style::default().fg(Color::Green))
    } else {
        ("○ polling", Style::default().fg(Color::Yellow))
    };
    spans.push(Span::raw("  "));
    spans.push(Span::styled(live_label, live_style));
    if app.reloading {
        spans.push(Span::styled("  loading…", Style::default().fg(Color::DarkGray)));
    }
    if app.in_flight() > 0 {
        spans.push(Span::styled(
            format!("  {} pending", app.in_flight()),
            Style::default().fg(Color::DarkGray),
        ));
    }

    let title = format!("handoff  {}", app.agent_name);
    let block = Block::default().borders(Borders::ALL).title(title);
    frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn render_footer(frame: &mut Frame<'_>, area: Rect, app: &App) {
    let hint = match app.mode {
        Mode::List => "j/k move  enter open  tab view  t take  b bot  p pin  a archive  x block  u unread  m menu  r reload  ? help",
        Mode::Chat => "esc back  j/k message  i reply  s save answer  t take  b bot  p pin  a archive  x block  u unread  m menu  ? help",
        Mode::Compose(_) => "enter send  alt+enter newline  ctrl+u clear  ctrl+w delete word  esc cancel",
        Mode::Menu(_) => "j/k move  enter choose  esc close",
        Mode::Confirm(_) => "y confirm  n cancel",
        Mode::Knowledge(_) => "tab next  shift+tab prev  enter select  esc cancel",
    };

    let mut lines = vec![Line::from(Span::styled(
        hint,
        Style::default().fg(Color::DarkGray),
    ))];

    if let Some(status) = &app.status {
        lines.push(Line::from(Span::styled(
            status.clone(),
            Style::default().fg(Color::Green),
        )));
    }
    if let Some(err) = &app.error {
        lines.push(Line::from(Span::styled(
            err.clone(),
            Style::default().fg(Color::Red),
        )));
    }

    let paragraph = Paragraph::new(lines).block(Block::default().borders(Borders::ALL));
    frame.render_widget(paragraph, area);
}

fn render_sessions(frame: &mut Frame<'_>, area: Rect, app: &App) {
    let title = app.dashboard.view().title();
    if app.sessions.is_empty() {
        let paragraph = Paragraph::new(app.empty_hint())
            .block(Block::default().borders(Borders::ALL).title(title))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
        return;
    }

    let preview_width = area.width.saturating_sub(6) as usize;
    let open = app.dashboard.selected();
    let items: Vec<ListItem> = app
        .sessions
        .iter()
        .map(|item| {
            let name_style = if item.unread > 0 {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let mut header = Vec::new();
            if item.is_pinned {
                header.push(Span::styled("▲ ", Style::default().fg(Color::Yellow)));
            }
            if open == Some(&item.session_id) {
                header.push(Span::styled("● ", Style::default().fg(Color::Cyan)));
            }
            header.push(Span::styled(item.title().to_string(), name_style));
            header.push(Span::raw(" "));
            let (label, style) = status_badge(item.status);
            header.push(Span::styled(format!("[{label}]"), style));
            if item.unread > 0 {
                header.push(Span::raw(" "));
                header.push(Span::styled(
                    format!("({})", item.unread),
                    Style::default().fg(Color::Black).bg(Color::LightRed),
                ));
            }
            header.push(Span::raw("  "));
            header.push(Span::styled(
                format_activity(item.last_activity),
                Style::default().fg(Color::DarkGray),
            ));

            let last = item
                .last_message
                .as_ref()
                .map(|message| format!("{}: {}", message.author.label(), message.content))
                .unwrap_or_default();
            let detail = Line::from(Span::styled(
                preview(&last, preview_width),
                Style::default().fg(Color::DarkGray),
            ));
            ListItem::new(vec![Line::from(header), detail])
        })
        .collect();

    let mut state = ListState::default();
    state.select(Some(app.selected));

    let focused = matches!(app.mode, Mode::List);
    let list = List::new(items)
        .block(pane_block(title, focused))
        .highlight_style(
            Style::default()
                .fg(Color::Black)
                .bg(Color::LightGreen)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("➤ ");

    frame.render_stateful_widget(list, area, &mut state);
}

fn render_conversation(frame: &mut Frame<'_>, area: Rect, app: &App) {
    let Some(conversation) = app
        .dashboard
        .selected()
        .and_then(|id| app.dashboard.conversation(id))
    else {
        let paragraph = Paragraph::new("Open a conversation with enter.")
            .block(Block::default().borders(Borders::ALL).title("Conversation"))
            .alignment(Alignment::Center);
        frame.render_widget(paragraph, area);
        return;
    };

    let composing = match &app.mode {
        Mode::Compose(composer) => Some(composer),
        _ => None,
    };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(if composing.is_some() { 5 } else { 0 }),
        ])
        .split(area);

    let state = conversation.state.as_ref();
    let status = state.map(|state| state.status);
    let (label, badge_style) = status_badge(status);
    let mut info = vec![
        Span::styled(
            conversation.session_id.to_string(),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw("  "),
        Span::styled(format!("[{label}]"), badge_style),
    ];
    if let Some(agent) = state.and_then(|state| state.agent_id.as_ref()) {
        let owner = if agent == app.dashboard.agent() {
            "you".to_string()
        } else {
            agent.to_string()
        };
        info.push(Span::raw(format!("  agent: {owner}")));
    }
    if state.is_some_and(|state| state.pinned_in_view()) {
        info.push(Span::styled("  pinned", Style::default().fg(Color::Yellow)));
    }
    let title = conversation
        .display_name
        .clone()
        .unwrap_or_else(|| conversation.session_id.to_string());
    frame.render_widget(
        Paragraph::new(Line::from(info)).block(Block::default().borders(Borders::ALL).title(title)),
        chunks[0],
    );

    let width = chunks[1].width.saturating_sub(6) as usize;
    let items: Vec<ListItem> = conversation
        .messages
        .iter()
        .map(|message| {
            let author = message.author();
            let mut header = vec![
                Span::styled(
                    format_message_time(message.time),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw(" "),
                Span::styled(
                    author.label(),
                    author_style(author).add_modifier(Modifier::BOLD),
                ),
            ];
            if let Some(delivery) = &message.status {
                header.push(Span::raw(" "));
                header.push(Span::styled(
                    format!("({})", delivery.as_str()),
                    delivery_style(delivery),
                ));
            }
            if app.is_saved(message.id) {
                header.push(Span::styled(" [kb]", Style::default().fg(Color::Cyan)));
            }
            let mut lines = vec![Line::from(header)];
            lines.extend(
                wrap(&message.content, width)
                    .into_iter()
                    .map(|line| Line::from(Span::styled(line, author_style(author)))),
            );
            ListItem::new(lines)
        })
        .collect();

    let chatting = matches!(app.mode, Mode::Chat);
    let mut list_state = ListState::default();
    if !conversation.messages.is_empty() {
        list_state.select(Some(app.message_cursor));
    }
    let highlight = if chatting {
        Style::default().bg(Color::Rgb(40, 40, 60))
    } else {
        Style::default()
    };
    let list = List::new(items)
        .block(pane_block("Messages", chatting))
        .highlight_style(highlight)
        .highlight_symbol(if chatting { "➤ " } else { "  " });
    frame.render_stateful_widget(list, chunks[1], &mut list_state);

    if let Some(composer) = composing {
        render_composer(frame, chunks[2], composer);
    }
}

fn render_composer(frame: &mut Frame<'_>, area: Rect, composer: &Composer) {
    let mut lines: Vec<Line> = composer
        .text
        .split('\n')
        .map(|line| Line::from(line.to_string()))
        .collect();
    if let Some(last) = lines.last_mut() {
        last.push_span(Span::styled("▏", Style::default().fg(Color::Yellow)));
    }
    let paragraph = Paragraph::new(lines)
        .block(pane_block("Reply", true))
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn render_menu(frame: &mut Frame<'_>, area: Rect, menu: &ContextMenu) {
    let modal = centered_rect(40, 40, area);
    frame.render_widget(Clear, modal);

    let items: Vec<ListItem> = menu
        .items
        .iter()
        .map(|item| ListItem::new(Line::from(item.label())))
        .collect();
    let mut state = ListState::default();
    if !menu.items.is_empty() {
        state.select(Some(menu.selected));
    }
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(menu.title.clone()))
        .highlight_style(
            Style::default()
                .fg(Color::Black)
                .bg(Color::LightGreen)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("➤ ");
    frame.render_stateful_widget(list, modal, &mut state);
}

fn render_confirm(frame: &mut Frame<'_>, area: Rect, state: &ConfirmState) {
    let modal = centered_rect(50, 30, area);
    frame.render_widget(Clear, modal);
    let paragraph = Paragraph::new(state.message.clone())
        .block(Block::default().borders(Borders::ALL).title("Confirm"))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, modal);
}

fn render_knowledge_form(frame: &mut Frame<'_>, area: Rect, form: &KnowledgeForm) {
    let modal = centered_rect(70, 60, area);
    frame.render_widget(Clear, modal);

    let block = Block::default()
        .borders(Borders::ALL)
        .title("Save to knowledge base");
    let mut lines = vec![
        field_line("Question", &form.question, form.focus == 0),
        Line::from(""),
        field_line("Answer", &form.answer, form.focus == 1),
        Line::from(""),
    ];

    let save_style = if form.is_save_focus() {
        Style::default().fg(Color::Black).bg(Color::LightGreen)
    } else {
        Style::default().fg(Color::Green)
    };
    let cancel_style = if form.is_cancel_focus() {
        Style::default().fg(Color::Black).bg(Color::LightRed)
    } else {
        Style::default().fg(Color::Red)
    };

    lines.push(Line::from(vec![
        Span::styled("[Save]", save_style),
        Span::raw("  "),
        Span::styled("[Cancel]", cancel_style),
    ]));

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, modal);
}

fn render_help(frame: &mut Frame<'_>, area: Rect) {
    let modal = centered_rect(70, 80, area);
    frame.render_widget(Clear, modal);

    let text = vec![
        Line::from("Global: q quit, Ctrl+C quit, ? help"),
        Line::from("Views: tab/shift+tab or ]/[ cycle, 1 active, 2 needs agent, 3 archived, 4 blocked"),
        Line::from("List: j/k move, enter open, u toggle unread, m actions menu, r reload"),
        Line::from("Chat: esc back, j/k pick message, i reply, s save the picked agent answer to the knowledge base"),
        Line::from("Actions: t take over, b return to bot, p pin/unpin, a archive/unarchive, x block/unblock"),
        Line::from("Reply: enter send, alt+enter newline, esc cancel"),
        Line::from(""),
        Line::from("Replying to a chat that needs an agent takes it over. Archive and block ask for confirmation."),
        Line::from("Unread counts are kept on this device only."),
    ];

    let paragraph = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("Help"))
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, modal);
}

fn pane_block(title: &str, focused: bool) -> Block<'_> {
    let border = if focused {
        Style::default().fg(Color::LightGreen)
    } else {
        Style::default()
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(border)
        .title(title)
}

fn field_line(label: &str, value: &str, focused: bool) -> Line<'static> {
    let style = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    Line::from(vec![
        Span::styled(
            format!("{}: ", label),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::styled(value.to_string(), style),
    ])
}

fn status_badge(status: Option<SessionStatus>) -> (&'static str, Style) {
    let style = match status {
        Some(SessionStatus::NeedsAgent) => Style::default()
            .fg(Color::Red)
            .add_modifier(Modifier::BOLD),
        Some(SessionStatus::AgentActive) => Style::default().fg(Color::Green),
        Some(SessionStatus::BotActive) | None => Style::default().fg(Color::Blue),
        Some(SessionStatus::Archived) | Some(SessionStatus::Blocked) => {
            Style::default().fg(Color::DarkGray)
        }
    };
    (status_label(status), style)
}

fn author_style(author: Author) -> Style {
    match author {
        Author::Customer => Style::default(),
        Author::Bot => Style::default().fg(Color::Blue),
        Author::Agent => Style::default().fg(Color::Green),
    }
}

fn delivery_style(status: &DeliveryStatus) -> Style {
    match status {
        DeliveryStatus::Failed => Style::default().fg(Color::Red),
        DeliveryStatus::Read => Style::default().fg(Color::Cyan),
        _ => Style::default().fg(Color::DarkGray),
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, rect: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(rect);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
