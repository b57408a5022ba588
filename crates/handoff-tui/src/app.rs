use std::collections::{HashMap, HashSet, VecDeque};

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use handoff_core::domain::{
    knowledge_entry_for, AgentAction, KnowledgeEntryNew, Message, MessageId, SessionId,
    SessionState, SessionStatus,
};
use handoff_core::{
    Dashboard, Notification, NotificationLevel, PendingAction, SessionListItemDto, ViewFilter,
};

use crate::actions::Action;

#[derive(Debug)]
pub enum Mode {
    List,
    Chat,
    Compose(Composer),
    Menu(ContextMenu),
    Confirm(ConfirmState),
    Knowledge(KnowledgeForm),
}

pub struct App {
    pub mode: Mode,
    pub dashboard: Dashboard,
    pub agent_name: String,
    pub sessions: Vec<SessionListItemDto>,
    pub selected: usize,
    pub message_cursor: usize,
    pub show_help: bool,
    pub should_quit: bool,
    pub status: Option<String>,
    pub error: Option<String>,
    pub live: bool,
    pub reloading: bool,
    pub loaded: bool,
    actions: VecDeque<Action>,
    in_flight: HashMap<u64, PendingAction>,
    next_ticket: u64,
    saved_answers: HashSet<MessageId>,
}

impl App {
    pub fn new(dashboard: Dashboard, agent_name: impl Into<String>) -> Self {
        Self {
            mode: Mode::List,
            dashboard,
            agent_name: agent_name.into(),
            sessions: Vec::new(),
            selected: 0,
            message_cursor: 0,
            show_help: false,
            should_quit: false,
            status: None,
            error: None,
            live: false,
            reloading: false,
            loaded: false,
            actions: VecDeque::new(),
            in_flight: HashMap::new(),
            next_ticket: 1,
            saved_answers: HashSet::new(),
        }
    }

    pub fn mark_saved(&mut self, answer: MessageId) {
        self.saved_answers.insert(answer);
    }

    pub fn is_saved(&self, answer: MessageId) -> bool {
        self.saved_answers.contains(&answer)
    }

    pub fn enqueue(&mut self, action: Action) {
        self.actions.push_back(action);
    }

    pub fn next_action(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some(message.into());
    }

    pub fn notify(&mut self, notification: Notification) {
        match notification.level {
            NotificationLevel::Info => {
                self.clear_error();
                self.set_status(notification.message);
            }
            NotificationLevel::Warning | NotificationLevel::Error => {
                self.set_error(notification.message)
            }
        }
    }

    /// Holds an optimistic write until its completion arrives.
    pub fn track(&mut self, pending: PendingAction) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.in_flight.insert(ticket, pending);
        ticket
    }

    pub fn settle(&mut self, ticket: u64) -> Option<PendingAction> {
        self.in_flight.remove(&ticket)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Rebuilds the visible list, keeping the cursor on the same session when it is still shown.
    pub fn refresh_list(&mut self) {
        let current = self.highlighted().map(|item| item.session_id.clone());
        self.sessions = self.dashboard.list_items();
        let last = self.sessions.len().saturating_sub(1);
        self.selected = current
            .and_then(|id| self.sessions.iter().position(|item| item.session_id == id))
            .unwrap_or(self.selected.min(last));

        if self.dashboard.selected().is_none()
            && matches!(self.mode, Mode::Chat | Mode::Compose(_) | Mode::Knowledge(_))
        {
            self.mode = Mode::List;
        }
        let len = self.open_messages().len();
        self.message_cursor = self.message_cursor.min(len.saturating_sub(1));
    }

    pub fn highlighted(&self) -> Option<&SessionListItemDto> {
        self.sessions.get(self.selected)
    }

    pub fn open_messages(&self) -> &[Message] {
        match self.dashboard.selected() {
            Some(id) => self.dashboard.grouped().messages(id),
            None => &[],
        }
    }

    pub fn cursor_to_latest(&mut self) {
        self.message_cursor = self.open_messages().len().saturating_sub(1);
    }

    pub fn title_for(&self, session_id: &SessionId) -> String {
        self.dashboard
            .contacts()
            .display_name(session_id)
            .map(str::to_string)
            .unwrap_or_else(|| session_id.to_string())
    }

    pub fn empty_hint(&self) -> String {
        if !self.loaded {
            return "Loading conversations...".to_string();
        }
        format!(
            "No conversations in {}. Tab switches views, r reloads.",
            self.dashboard.view().title()
        )
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press && key.kind != KeyEventKind::Repeat {
            return;
        }

        if self.show_help {
            if matches!(key.code, KeyCode::Char('?') | KeyCode::Esc) {
                self.show_help = false;
            }
            return;
        }

        if matches!(
            key,
            KeyEvent {
                code: KeyCode::Char('c'),
                modifiers: KeyModifiers::CONTROL,
                ..
            }
        ) {
            self.should_quit = true;
            return;
        }

        if matches!(self.mode, Mode::List | Mode::Chat) {
            match key.code {
                KeyCode::Char('q') => {
                    self.should_quit = true;
                    return;
                }
                KeyCode::Char('?') => {
                    self.show_help = true;
                    return;
                }
                _ => {}
            }
        }

        let mut mode = std::mem::replace(&mut self.mode, Mode::List);
        match &mut mode {
            Mode::List => {
                if let Some(next) = self.handle_list_key(key) {
                    mode = next;
                }
            }
            Mode::Chat => {
                if let Some(next) = self.handle_chat_key(key) {
                    mode = next;
                }
            }
            Mode::Compose(composer) => {
                if let Some(next) = self.handle_compose_key(composer, key) {
                    mode = next;
                }
            }
            Mode::Menu(menu) => {
                if let Some(next) = self.handle_menu_key(menu, key) {
                    mode = next;
                }
            }
            Mode::Confirm(state) => {
                if let Some(next) = self.handle_confirm_key(state, key) {
                    mode = next;
                }
            }
            Mode::Knowledge(form) => {
                if let Some(next) = self.handle_knowledge_key(form, key) {
                    mode = next;
                }
            }
        }
        self.mode = mode;
    }

    fn handle_list_key(&mut self, key: KeyEvent) -> Option<Mode> {
        let highlighted = self.highlighted().map(|item| item.session_id.clone());
        match key.code {
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
            KeyCode::PageDown => self.move_selection(5),
            KeyCode::PageUp => self.move_selection(-5),
            KeyCode::Home | KeyCode::Char('g') => self.selected = 0,
            KeyCode::End | KeyCode::Char('G') => {
                self.selected = self.sessions.len().saturating_sub(1);
            }
            KeyCode::Enter | KeyCode::Right | KeyCode::Char('l') => {
                if let Some(id) = highlighted {
                    self.enqueue(Action::Open(id));
                }
            }
            KeyCode::Tab | KeyCode::Char(']') => {
                self.enqueue(Action::SetView(self.dashboard.view().next()));
            }
            KeyCode::BackTab | KeyCode::Char('[') => {
                self.enqueue(Action::SetView(self.dashboard.view().prev()));
            }
            KeyCode::Char(digit @ '1'..='4') => {
                let index = digit as usize - '1' as usize;
                self.enqueue(Action::SetView(ViewFilter::ALL[index]));
            }
            KeyCode::Char('r') => self.enqueue(Action::Reload),
            KeyCode::Char('u') => {
                if let Some(id) = highlighted {
                    if self.dashboard.unread().is_unread(&id) {
                        self.enqueue(Action::MarkRead(id));
                    } else {
                        self.enqueue(Action::MarkUnread(id));
                    }
                }
            }
            KeyCode::Char('m') | KeyCode::Char(' ') => {
                if let Some(id) = highlighted {
                    return Some(Mode::Menu(self.menu_for(id, ReturnTo::List)));
                }
            }
            KeyCode::Char(ch) => {
                if let Some(id) = highlighted {
                    return self.quick_action(id, ch, ReturnTo::List);
                }
            }
            _ => {}
        }
        None
    }

    fn handle_chat_key(&mut self, key: KeyEvent) -> Option<Mode> {
        let Some(id) = self.dashboard.selected().cloned() else {
            return Some(Mode::List);
        };
        match key.code {
            KeyCode::Esc | KeyCode::Left | KeyCode::Backspace | KeyCode::Char('h') => {
                self.dashboard.deselect();
                return Some(Mode::List);
            }
            KeyCode::Down | KeyCode::Char('j') => self.move_cursor(1),
            KeyCode::Up | KeyCode::Char('k') => self.move_cursor(-1),
            KeyCode::PageDown => self.move_cursor(10),
            KeyCode::PageUp => self.move_cursor(-10),
            KeyCode::Home | KeyCode::Char('g') => self.message_cursor = 0,
            KeyCode::End | KeyCode::Char('G') => self.cursor_to_latest(),
            KeyCode::Enter | KeyCode::Char('i') => {
                if self.dashboard.can_compose(&id) {
                    return Some(Mode::Compose(Composer::new(id)));
                }
                self.set_error("Take the chat (t) before replying.");
            }
            KeyCode::Char('s') => {
                let entry = knowledge_entry_for(
                    self.open_messages(),
                    self.message_cursor,
                    self.dashboard.states().status_of(&id),
                    self.dashboard.agent(),
                );
                match entry {
                    Ok(entry)
                        if entry
                            .source_message_id
                            .is_some_and(|answer| self.is_saved(answer)) =>
                    {
                        self.set_error("This answer is already in the knowledge base.");
                    }
                    Ok(entry) => return Some(Mode::Knowledge(KnowledgeForm::new(entry))),
                    Err(err) => self.set_error(err.to_string()),
                }
            }
            KeyCode::Char('u') => self.enqueue(Action::MarkUnread(id)),
            KeyCode::Char('m') => return Some(Mode::Menu(self.menu_for(id, ReturnTo::Chat))),
            KeyCode::Char('r') => self.enqueue(Action::Reload),
            KeyCode::Char(ch) => return self.quick_action(id, ch, ReturnTo::Chat),
            _ => {}
        }
        None
    }

    fn handle_compose_key(&mut self, composer: &mut Composer, key: KeyEvent) -> Option<Mode> {
        match key.code {
            KeyCode::Esc => return Some(Mode::Chat),
            KeyCode::Enter if key.modifiers.contains(KeyModifiers::ALT) => {
                composer.text.push('\n');
            }
            KeyCode::Enter => {
                if composer.text.trim().is_empty() {
                    self.set_error("Message cannot be empty.");
                    return None;
                }
                let text = std::mem::take(&mut composer.text);
                self.enqueue(Action::Send(composer.session_id.clone(), text));
                return Some(Mode::Chat);
            }
            _ => apply_text_input(&mut composer.text, key),
        }
        None
    }

    fn handle_menu_key(&mut self, menu: &mut ContextMenu, key: KeyEvent) -> Option<Mode> {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => return Some(menu.return_to.into_mode()),
            KeyCode::Down | KeyCode::Char('j') => menu.move_selection(1),
            KeyCode::Up | KeyCode::Char('k') => menu.move_selection(-1),
            KeyCode::Enter => {
                let Some(item) = menu.selected_item() else {
                    return Some(menu.return_to.into_mode());
                };
                let session_id = menu.session_id.clone();
                match item {
                    MenuItem::Agent(action) => {
                        if let Some(next) = self.request_action(session_id, action, menu.return_to)
                        {
                            return Some(next);
                        }
                    }
                    MenuItem::MarkRead => self.enqueue(Action::MarkRead(session_id)),
                    MenuItem::MarkUnread => self.enqueue(Action::MarkUnread(session_id)),
                }
                return Some(menu.return_to.into_mode());
            }
            _ => {}
        }
        None
    }

    fn handle_confirm_key(&mut self, state: &mut ConfirmState, key: KeyEvent) -> Option<Mode> {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                self.enqueue(state.action.clone());
                Some(state.return_to.into_mode())
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                Some(state.return_to.into_mode())
            }
            _ => None,
        }
    }

    fn handle_knowledge_key(&mut self, form: &mut KnowledgeForm, key: KeyEvent) -> Option<Mode> {
        match key.code {
            KeyCode::Esc => return Some(Mode::Chat),
            KeyCode::Tab => form.focus_next(),
            KeyCode::BackTab => form.focus_prev(),
            KeyCode::Enter => {
                if form.is_cancel_focus() {
                    return Some(Mode::Chat);
                }
                if form.is_save_focus() {
                    match form.to_action() {
                        Ok(action) => {
                            self.enqueue(action);
                            return Some(Mode::Chat);
                        }
                        Err(err) => self.set_error(err),
                    }
                } else {
                    form.focus_next();
                }
            }
            _ => {
                if let Some(field) = form.active_field_mut() {
                    apply_text_input(field, key);
                }
            }
        }
        None
    }

    fn menu_for(&self, session_id: SessionId, return_to: ReturnTo) -> ContextMenu {
        let state = self
            .dashboard
            .state_of(&session_id)
            .cloned()
            .unwrap_or_default();
        let unread = self.dashboard.unread().is_unread(&session_id);
        let title = self.title_for(&session_id);
        ContextMenu::new(session_id, title, &state, unread, return_to)
    }

    fn quick_action(&mut self, session_id: SessionId, key: char, return_to: ReturnTo) -> Option<Mode> {
        let state = self
            .dashboard
            .state_of(&session_id)
            .cloned()
            .unwrap_or_default();
        let action = match key {
            't' => AgentAction::TakeChat,
            'b' => AgentAction::ReturnToBot,
            'p' if state.is_pinned => AgentAction::Unpin,
            'p' => AgentAction::Pin,
            'a' if state.status == SessionStatus::Archived => AgentAction::Unarchive,
            'a' => AgentAction::Archive,
            'x' if state.status == SessionStatus::Blocked => AgentAction::Unblock,
            'x' => AgentAction::Block,
            _ => return None,
        };
        self.request_action(session_id, action, return_to)
    }

    /// Archive and block ask first; everything else is queued right away.
    fn request_action(
        &mut self,
        session_id: SessionId,
        action: AgentAction,
        return_to: ReturnTo,
    ) -> Option<Mode> {
        let state = self
            .dashboard
            .state_of(&session_id)
            .cloned()
            .unwrap_or_default();
        if let Err(err) = action.check(&state) {
            self.set_error(err.to_string());
            return None;
        }
        if matches!(action, AgentAction::Archive | AgentAction::Block) {
            let message = format!(
                "{} chat with {}? (y/n)",
                capitalize(action.verb()),
                self.title_for(&session_id)
            );
            return Some(Mode::Confirm(ConfirmState {
                message,
                action: Action::Agent(session_id, action),
                return_to,
            }));
        }
        self.enqueue(Action::Agent(session_id, action));
        None
    }

    fn move_selection(&mut self, delta: i32) {
        if self.sessions.is_empty() {
            self.selected = 0;
            return;
        }
        let max = self.sessions.len() as i32 - 1;
        self.selected = (self.selected as i32 + delta).clamp(0, max) as usize;
    }

    fn move_cursor(&mut self, delta: i32) {
        let len = self.open_messages().len();
        if len == 0 {
            self.message_cursor = 0;
            return;
        }
        let max = len as i32 - 1;
        self.message_cursor = (self.message_cursor as i32 + delta).clamp(0, max) as usize;
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn apply_text_input(target: &mut String, key: KeyEvent) {
    match key.code {
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            target.clear();
        }
        KeyCode::Char('w') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            delete_last_word(target);
        }
        KeyCode::Char(ch) => target.push(ch),
        KeyCode::Backspace => {
            target.pop();
        }
        _ => {}
    }
}

fn delete_last_word(value: &mut String) {
    let trimmed_len = value.trim_end().len();
    value.truncate(trimmed_len);
    match value.rfind(char::is_whitespace) {
        Some(index) => value.truncate(index + 1),
        None => value.clear(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnTo {
    List,
    Chat,
}

impl ReturnTo {
    pub fn into_mode(self) -> Mode {
        match self {
            ReturnTo::List => Mode::List,
            ReturnTo::Chat => Mode::Chat,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Composer {
    pub session_id: SessionId,
    pub text: String,
}

impl Composer {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            text: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    Agent(AgentAction),
    MarkRead,
    MarkUnread,
}

impl MenuItem {
    pub fn label(self) -> String {
        match self {
            MenuItem::Agent(AgentAction::TakeChat) => "Take chat".to_string(),
            MenuItem::Agent(AgentAction::ReturnToBot) => "Return to bot".to_string(),
            MenuItem::Agent(action) => capitalize(action.verb()),
            MenuItem::MarkRead => "Mark as read".to_string(),
            MenuItem::MarkUnread => "Mark as unread".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContextMenu {
    pub session_id: SessionId,
    pub title: String,
    pub items: Vec<MenuItem>,
    pub selected: usize,
    pub return_to: ReturnTo,
}

impl ContextMenu {
    /// Offers only the transitions the session's current status allows.
    pub fn new(
        session_id: SessionId,
        title: String,
        state: &SessionState,
        unread: bool,
        return_to: ReturnTo,
    ) -> Self {
        let status = state.status;
        let candidates = [
            (AgentAction::TakeChat, status != SessionStatus::AgentActive),
            (AgentAction::ReturnToBot, status != SessionStatus::BotActive),
            (AgentAction::Pin, !state.is_pinned),
            (AgentAction::Unpin, state.is_pinned),
            (AgentAction::Archive, true),
            (AgentAction::Unarchive, true),
            (AgentAction::Block, true),
            (AgentAction::Unblock, true),
        ];
        let mut items: Vec<MenuItem> = candidates
            .into_iter()
            .filter(|(action, wanted)| *wanted && action.check(state).is_ok())
            .map(|(action, _)| MenuItem::Agent(action))
            .collect();
        if unread {
            items.push(MenuItem::MarkRead);
        } else if status != SessionStatus::Archived {
            items.push(MenuItem::MarkUnread);
        }
        Self {
            session_id,
            title,
            items,
            selected: 0,
            return_to,
        }
    }

    pub fn selected_item(&self) -> Option<MenuItem> {
        self.items.get(self.selected).copied()
    }

    pub fn move_selection(&mut self, delta: i32) {
        if self.items.is_empty() {
            self.selected = 0;
            return;
        }
        let max = self.items.len() as i32 - 1;
        self.selected = (self.selected as i32 + delta).clamp(0, max) as usize;
    }
}

#[derive(Debug, Clone)]
pub struct ConfirmState {
    pub message: String,
    pub action: Action,
    pub return_to: ReturnTo,
}

/// Question and answer edited before they go to the knowledge base.
#[derive(Debug, Clone)]
pub struct KnowledgeForm {
    pub entry: KnowledgeEntryNew,
    pub question: String,
    pub answer: String,
    pub focus: usize,
}

impl KnowledgeForm {
    const FIELD_COUNT: usize = 2;
    const BUTTON_COUNT: usize = 2;

    pub fn new(entry: KnowledgeEntryNew) -> Self {
        Self {
            question: entry.question.clone(),
            answer: entry.answer.clone(),
            entry,
            focus: 0,
        }
    }

    pub fn focus_next(&mut self) {
        let total = Self::FIELD_COUNT + Self::BUTTON_COUNT;
        self.focus = (self.focus + 1) % total;
    }

    pub fn focus_prev(&mut self) {
        let total = Self::FIELD_COUNT + Self::BUTTON_COUNT;
        self.focus = (self.focus + total - 1) % total;
    }

    pub fn is_save_focus(&self) -> bool {
        self.focus == Self::FIELD_COUNT
    }

    pub fn is_cancel_focus(&self) -> bool {
        self.focus == Self::FIELD_COUNT + 1
    }

    pub fn active_field_mut(&mut self) -> Option<&mut String> {
        match self.focus {
            0 => Some(&mut self.question),
            1 => Some(&mut self.answer),
            _ => None,
        }
    }

    pub fn to_action(&self) -> Result<Action, String> {
        let entry = KnowledgeEntryNew {
            question: self.question.trim().to_string(),
            answer: self.answer.trim().to_string(),
            ..self.entry.clone()
        };
        entry.validate().map_err(|_| {
            "question and answer must both be filled in".to_string()
        })?;
        Ok(Action::SaveKnowledge(entry))
    }
}
