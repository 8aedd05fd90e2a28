use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use textwrap::{wrap, Options as WrapOptions};
use unicode_width::UnicodeWidthStr;

use crate::feed::{CommentSection, CommentState, Feed, PostListState};
use crate::model::PostId;
use crate::pagination::PageWindow;
use crate::render::{Action, PostCard};
use crate::submit::{Composer, SubmitStatus};

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_PANEL_FOCUSED_BG: Color = Color::Rgb(49, 50, 68);
const COLOR_PANEL_SELECTED_BG: Color = Color::Rgb(69, 71, 90);
const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
const COLOR_BORDER_FOCUSED: Color = Color::Rgb(137, 180, 250);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_SUCCESS: Color = Color::Rgb(166, 227, 161);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

pub struct Options {
    pub feed: Feed,
    /// Where posts come from, shown in the status line.
    pub source: String,
    pub config_path: String,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Focus {
    Posts,
    Comments,
}

#[derive(Clone, PartialEq, Eq, Debug)]
enum InputMode {
    Post,
    Comment(PostId),
}

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

pub struct Model {
    feed: Feed,
    source: String,
    config_path: String,
    focus: Focus,
    input: Option<InputMode>,
    selected: usize,
    comment_cursor: usize,
    list_state: ListState,
    spinner: Spinner,
    needs_redraw: bool,
}

impl Model {
    pub fn new(options: Options) -> Self {
        Self {
            feed: options.feed,
            source: options.source,
            config_path: options.config_path,
            focus: Focus::Posts,
            input: None,
            selected: 0,
            comment_cursor: 0,
            list_state: ListState::default(),
            spinner: Spinner::new(),
            needs_redraw: true,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(120);

        loop {
            if self.feed.poll() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        if self.handle_key(key.code) {
                            break;
                        }
                        self.mark_dirty();
                    }
                    Event::Resize(..) => self.mark_dirty(),
                    _ => {}
                }
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                if self.feed.is_busy() {
                    if self.spinner.advance() {
                        self.mark_dirty();
                    }
                } else {
                    self.spinner.reset();
                }
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    /// Returns true when the user asked to quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        if let Some(notice) = self.feed.notice() {
            if notice.is_blocking() {
                if matches!(code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
                    self.feed.dismiss_notice();
                }
                return false;
            }
            self.feed.dismiss_notice();
        }

        if let Some(mode) = self.input.clone() {
            self.handle_input_key(mode, code);
            return false;
        }

        match self.focus {
            Focus::Posts => self.handle_posts_key(code),
            Focus::Comments => {
                self.handle_comments_key(code);
                false
            }
        }
    }

    fn handle_input_key(&mut self, mode: InputMode, code: KeyCode) {
        match code {
            KeyCode::Esc => self.input = None,
            KeyCode::Enter => {
                let submitted = match &mode {
                    InputMode::Post => self.feed.submit_post(),
                    InputMode::Comment(post_id) => self.feed.submit_comment(post_id),
                };
                if matches!(submitted, Ok(SubmitStatus::Started { .. })) {
                    self.input = None;
                }
            }
            KeyCode::Backspace => {
                self.composer_mut(&mode).text.pop();
            }
            KeyCode::Char(ch) => self.composer_mut(&mode).text.push(ch),
            _ => {}
        }
    }

    fn composer_mut(&mut self, mode: &InputMode) -> &mut Composer {
        match mode {
            InputMode::Post => self.feed.post_composer_mut(),
            InputMode::Comment(post_id) => self.feed.comment_composer_mut(post_id),
        }
    }

    fn handle_posts_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('j') | KeyCode::Down => self.move_selection(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_selection(-1),
            KeyCode::Enter | KeyCode::Char('c') => {
                if let Some(card) = self.selected_card() {
                    let action = card.comment_toggle.action.clone();
                    self.feed.dispatch(action);
                }
            }
            KeyCode::Char('e') => {
                let toggle = self
                    .selected_card()
                    .and_then(|card| card.collapsible.as_ref())
                    .map(|collapsible| collapsible.toggle.clone());
                if let Some(action) = toggle {
                    self.feed.dispatch(action);
                }
            }
            KeyCode::Char('i') => self.input = Some(InputMode::Post),
            KeyCode::Char('a') => {
                if let Some(post_id) = self.selected_post_id() {
                    if !self.section_visible(&post_id) {
                        self.feed.dispatch(Action::ToggleComments(post_id.clone()));
                    }
                    self.input = Some(InputMode::Comment(post_id));
                }
            }
            KeyCode::Tab => {
                if self.selected_comment_count() > 0 {
                    self.focus = Focus::Comments;
                    self.comment_cursor = 0;
                }
            }
            KeyCode::Char('n') | KeyCode::Right => self.page_action(|window| window.next.action()),
            KeyCode::Char('p') | KeyCode::Left => {
                self.page_action(|window| window.previous.action())
            }
            KeyCode::Char('r') => self.refresh(),
            KeyCode::Char('R') => self.feed.dispatch(Action::ReloadPosts),
            _ => {}
        }
        false
    }

    fn handle_comments_key(&mut self, code: KeyCode) {
        let count = self.selected_comment_count();
        if count == 0 {
            self.focus = Focus::Posts;
            return;
        }
        match code {
            KeyCode::Tab | KeyCode::Esc => self.focus = Focus::Posts,
            KeyCode::Char('j') | KeyCode::Down => {
                self.comment_cursor = (self.comment_cursor + 1).min(count - 1);
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.comment_cursor = self.comment_cursor.saturating_sub(1);
            }
            KeyCode::Char('l') | KeyCode::Char(' ') => {
                let action = self.selected_section().and_then(|section| match &section.state {
                    CommentState::Loaded(view) => view
                        .rows
                        .get(self.comment_cursor)
                        .map(|row| row.like.action.clone()),
                    _ => None,
                });
                if let Some(action) = action {
                    self.feed.dispatch(action);
                }
            }
            KeyCode::Char('a') => {
                if let Some(post_id) = self.selected_post_id() {
                    self.input = Some(InputMode::Comment(post_id));
                }
            }
            KeyCode::Char('r') => self.refresh(),
            _ => {}
        }
    }

    fn refresh(&mut self) {
        if let PostListState::Failed(panel) = self.feed.posts() {
            let retry = panel.retry.clone();
            self.feed.dispatch(retry);
            return;
        }
        let Some(post_id) = self.selected_post_id() else {
            self.feed.dispatch(Action::ReloadPosts);
            return;
        };
        let action = match self.feed.section(&post_id) {
            Some(CommentSection {
                visible: true,
                state: CommentState::Failed(panel),
                ..
            }) => panel.retry.clone(),
            Some(section) if section.visible => Action::RefreshComments(post_id),
            _ => Action::ReloadPosts,
        };
        self.feed.dispatch(action);
    }

    fn page_action<F>(&mut self, pick: F)
    where
        F: FnOnce(&PageWindow) -> Option<Action>,
    {
        let action = self.feed.pagination().window().and_then(|window| pick(&window));
        if let Some(action) = action {
            self.selected = 0;
            self.focus = Focus::Posts;
            self.feed.dispatch(action);
        }
    }

    fn move_selection(&mut self, delta: isize) {
        let len = self.card_count();
        if len == 0 {
            self.selected = 0;
            return;
        }
        let next = self.selected as isize + delta;
        self.selected = next.clamp(0, len as isize - 1) as usize;
    }

    fn card_count(&self) -> usize {
        match self.feed.posts() {
            PostListState::Loaded(view) => view.cards.len(),
            _ => 0,
        }
    }

    fn selected_card(&self) -> Option<&PostCard> {
        match self.feed.posts() {
            PostListState::Loaded(view) => view.cards.get(self.selected),
            _ => None,
        }
    }

    fn selected_post_id(&self) -> Option<PostId> {
        self.selected_card().map(|card| card.post_id.clone())
    }

    fn selected_section(&self) -> Option<&CommentSection> {
        let card = self.selected_card()?;
        self.feed.section(&card.post_id)
    }

    fn section_visible(&self, post_id: &PostId) -> bool {
        self.feed
            .section(post_id)
            .map(|section| section.visible)
            .unwrap_or(false)
    }

    fn selected_comment_count(&self) -> usize {
        match self.selected_section() {
            Some(CommentSection {
                visible: true,
                state: CommentState::Loaded(view),
                ..
            }) => view.rows.len(),
            _ => 0,
        }
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), full);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(full);

        let status_text = if self.feed.is_busy() {
            format!("{} {}", self.spinner.frame(), self.status_text())
        } else {
            self.status_text()
        };
        let status_line = Paragraph::new(status_text).style(
            Style::default()
                .fg(COLOR_TEXT_PRIMARY)
                .bg(COLOR_PANEL_FOCUSED_BG)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_widget(status_line, layout[0]);

        self.draw_post_composer(frame, layout[1]);
        self.draw_posts(frame, layout[2]);

        let pagination = Paragraph::new(pagination_line(self.feed.pagination().window()))
            .alignment(Alignment::Center)
            .style(Style::default().bg(COLOR_PANEL_BG));
        frame.render_widget(pagination, layout[3]);

        let footer = Paragraph::new(self.footer_text())
            .style(
                Style::default()
                    .fg(COLOR_TEXT_SECONDARY)
                    .bg(COLOR_PANEL_BG)
                    .add_modifier(Modifier::ITALIC),
            )
            .alignment(Alignment::Center);
        frame.render_widget(footer, layout[4]);

        if let Some(notice) = self.feed.notice() {
            if notice.is_blocking() {
                let popup_area = centered_rect(60, 30, full);
                frame.render_widget(Clear, popup_area);
                let popup = Paragraph::new(format!("{}\n\nEnter 关闭", notice.message))
                    .wrap(Wrap { trim: true })
                    .alignment(Alignment::Center)
                    .style(Style::default().fg(COLOR_TEXT_PRIMARY).bg(COLOR_PANEL_BG))
                    .block(
                        Block::default()
                            .borders(Borders::ALL)
                            .border_style(Style::default().fg(COLOR_ERROR))
                            .title("出错了"),
                    );
                frame.render_widget(popup, popup_area);
            }
        }
    }

    fn status_text(&self) -> String {
        if let Some(notice) = self.feed.notice() {
            if !notice.is_blocking() {
                return notice.message.clone();
            }
        }
        let pagination = self.feed.pagination();
        format!(
            "树洞 · 第 {}/{} 页 · {}",
            pagination.current(),
            pagination.total_pages(),
            self.source
        )
    }

    fn footer_text(&self) -> String {
        match (&self.input, self.focus) {
            (Some(_), _) => "输入中: Enter 发送 · Esc 返回".to_string(),
            (None, Focus::Comments) => {
                "评论: j/k 选择 · l 点赞 · a 回复 · r 刷新 · Tab 返回帖子".to_string()
            }
            (None, Focus::Posts) => format!(
                "j/k 选择 · Enter 评论 · e 展开 · i 发帖 · a 回复 · n/p 翻页 · r 刷新 · q 退出 · 配置 {}",
                self.config_path
            ),
        }
    }

    fn draw_post_composer(&self, frame: &mut Frame<'_>, area: Rect) {
        let composer = self.feed.post_composer();
        let active = self.input == Some(InputMode::Post);
        let border = if active {
            COLOR_BORDER_FOCUSED
        } else {
            COLOR_BORDER_IDLE
        };
        let placeholder = composer.text.is_empty() && !active;
        let body = if placeholder {
            Span::styled("按 i 说点什么...", Style::default().fg(COLOR_TEXT_SECONDARY))
        } else {
            Span::styled(composer.text.clone(), Style::default().fg(COLOR_TEXT_PRIMARY))
        };
        let widget = Paragraph::new(Line::from(body)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border))
                .title(format!("发帖 [{}]", composer.control.label())),
        );
        frame.render_widget(widget, area);
        if active {
            let x = area.x + 1 + composer.text.width() as u16;
            frame.set_cursor(x.min(area.right().saturating_sub(2)), area.y + 1);
        }
    }

    fn draw_posts(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(if self.focus == Focus::Posts {
                COLOR_BORDER_FOCUSED
            } else {
                COLOR_BORDER_IDLE
            }))
            .title("帖子")
            .style(Style::default().bg(COLOR_PANEL_BG));
        let width = area.width.saturating_sub(4).max(10) as usize;

        let view = match self.feed.posts() {
            PostListState::Loading => {
                frame.render_widget(
                    Paragraph::new("加载中...")
                        .style(Style::default().fg(COLOR_TEXT_SECONDARY))
                        .block(block),
                    area,
                );
                return;
            }
            PostListState::Failed(panel) => {
                let text = Text::from(vec![
                    Line::from(Span::styled(
                        panel.message.clone(),
                        Style::default().fg(COLOR_ERROR),
                    )),
                    Line::from(Span::styled(
                        "按 r 重试",
                        Style::default().fg(COLOR_ACCENT),
                    )),
                ]);
                frame.render_widget(
                    Paragraph::new(text).wrap(Wrap { trim: true }).block(block),
                    area,
                );
                return;
            }
            PostListState::Loaded(view) => view,
        };

        if let Some(message) = view.empty_message {
            frame.render_widget(
                Paragraph::new(message)
                    .alignment(Alignment::Center)
                    .style(Style::default().fg(COLOR_TEXT_SECONDARY))
                    .block(block),
                area,
            );
            return;
        }

        if self.selected >= view.cards.len() {
            self.selected = view.cards.len().saturating_sub(1);
        }
        let items: Vec<ListItem> = view
            .cards
            .iter()
            .enumerate()
            .map(|(index, card)| {
                let selected = index == self.selected;
                let section = self.feed.section(&card.post_id);
                let status = self.feed.comment_status(&card.post_id);
                let cursor = (selected && self.focus == Focus::Comments).then_some(self.comment_cursor);
                let composing = matches!(&self.input, Some(InputMode::Comment(id)) if id == &card.post_id);
                ListItem::new(card_text(card, section, status, cursor, composing, width))
            })
            .collect();

        self.list_state.select(Some(self.selected));
        let list = List::new(items)
            .block(block)
            .highlight_style(Style::default().bg(COLOR_PANEL_SELECTED_BG));
        frame.render_stateful_widget(list, area, &mut self.list_state);
    }
}

fn card_text(
    card: &PostCard,
    section: Option<&CommentSection>,
    status: Option<String>,
    comment_cursor: Option<usize>,
    composing: bool,
    width: usize,
) -> Text<'static> {
    let secondary = Style::default().fg(COLOR_TEXT_SECONDARY);
    let accent = Style::default().fg(COLOR_ACCENT);
    let mut lines: Vec<Line<'static>> = Vec::new();

    lines.push(Line::from(Span::styled(
        format!("{} · {}", card.time.relative, card.time.exact),
        secondary,
    )));
    for line in wrap_text(card.visible_text(), width) {
        lines.push(Line::from(Span::styled(
            line,
            Style::default().fg(COLOR_TEXT_PRIMARY),
        )));
    }
    let mut controls = vec![Span::styled(
        format!("[{}]", card.comment_toggle.label()),
        accent,
    )];
    if let Some(collapsible) = &card.collapsible {
        controls.push(Span::raw("  "));
        controls.push(Span::styled(format!("[{}]", collapsible.label()), accent));
    }
    lines.push(Line::from(controls));

    if let Some(section) = section.filter(|section| section.visible) {
        lines.extend(section_lines(section, status, comment_cursor, composing, width));
    }
    lines.push(Line::from(""));
    Text::from(lines)
}

fn section_lines(
    section: &CommentSection,
    status: Option<String>,
    comment_cursor: Option<usize>,
    composing: bool,
    width: usize,
) -> Vec<Line<'static>> {
    let indent = "    ";
    let inner_width = width.saturating_sub(indent.len()).max(10);
    let secondary = Style::default().fg(COLOR_TEXT_SECONDARY);
    let mut lines = Vec::new();

    if let Some(status) = status {
        lines.push(Line::from(Span::styled(format!("{indent}{status}"), secondary)));
    }
    match &section.state {
        CommentState::Idle | CommentState::Loading => {
            lines.push(Line::from(Span::styled(format!("{indent}加载中..."), secondary)));
        }
        CommentState::Failed(panel) => {
            let hint = if panel.timed_out { " (超时)" } else { "" };
            lines.push(Line::from(Span::styled(
                format!("{indent}{}{hint}", panel.message),
                Style::default().fg(COLOR_ERROR),
            )));
            lines.push(Line::from(Span::styled(
                format!("{indent}[r 重试]"),
                Style::default().fg(COLOR_ACCENT),
            )));
        }
        CommentState::Loaded(view) => {
            if let Some(message) = view.empty_message {
                lines.push(Line::from(Span::styled(format!("{indent}{message}"), secondary)));
            }
            for (index, row) in view.rows.iter().enumerate() {
                let marker = if comment_cursor == Some(index) { "› " } else { "  " };
                let like_style = if row.like.liked {
                    Style::default().fg(COLOR_SUCCESS)
                } else {
                    secondary
                };
                lines.push(Line::from(vec![
                    Span::styled(format!("{indent}{marker}"), Style::default().fg(COLOR_ACCENT)),
                    Span::styled(row.like.label(), like_style),
                    Span::styled(format!("  {}", row.time.relative), secondary),
                ]));
                for line in wrap_text(&row.content, inner_width) {
                    lines.push(Line::from(Span::styled(
                        format!("{indent}  {line}"),
                        Style::default().fg(COLOR_TEXT_PRIMARY),
                    )));
                }
            }
        }
    }

    let composer = &section.composer;
    let prompt = if composer.text.is_empty() && !composing {
        "按 a 回复".to_string()
    } else if composing {
        format!("{}▏", composer.text)
    } else {
        composer.text.clone()
    };
    lines.push(Line::from(vec![
        Span::styled(format!("{indent}回复: "), secondary),
        Span::styled(prompt, Style::default().fg(COLOR_TEXT_PRIMARY)),
        Span::styled(
            format!("  [{}]", composer.control.label()),
            Style::default().fg(COLOR_ACCENT),
        ),
    ]));
    lines
}

fn pagination_line(window: Option<PageWindow>) -> Line<'static> {
    let Some(window) = window else {
        return Line::default();
    };
    let enabled = Style::default().fg(COLOR_ACCENT);
    let disabled = Style::default().fg(COLOR_BORDER_IDLE);
    let mut spans = vec![Span::styled(
        "‹ 上一页 ",
        if window.previous.is_enabled() {
            enabled
        } else {
            disabled
        },
    )];
    for link in &window.pages {
        let style = if link.current {
            Style::default()
                .fg(COLOR_BG)
                .bg(COLOR_ACCENT)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(COLOR_TEXT_PRIMARY)
        };
        spans.push(Span::styled(format!(" {} ", link.number), style));
    }
    spans.push(Span::styled(
        " 下一页 ›",
        if window.next.is_enabled() {
            enabled
        } else {
            disabled
        },
    ));
    Line::from(spans)
}

fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let options = WrapOptions::new(width.max(1)).break_words(true);
    text.lines()
        .flat_map(|line| {
            if line.is_empty() {
                vec![String::new()]
            } else {
                wrap(line, &options)
                    .into_iter()
                    .map(|piece| piece.into_owned())
                    .collect()
            }
        })
        .collect()
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let percent_x = percent_x.min(100);
    let percent_y = percent_y.min(100);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage(100 - percent_x - (100 - percent_x) / 2),
        ])
        .split(area);
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage(100 - percent_y - (100 - percent_y) / 2),
        ])
        .split(horizontal[1]);
    vertical[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FetchError;
    use crate::likes::LikeStore;
    use crate::pagination::Pagination;
    use crate::testing::{wait_until, StubBoard};
    use std::sync::Arc;

    fn model_with(board: StubBoard) -> (Arc<StubBoard>, Model) {
        let board = Arc::new(board);
        let mut feed = Feed::new(board.clone(), board.clone(), LikeStore::in_memory().unwrap());
        feed.reload_posts();
        let mut model = Model::new(Options {
            feed,
            source: "test".into(),
            config_path: "~/.config/treehole/config.yaml".into(),
        });
        settle(&mut model);
        (board, model)
    }

    fn settle(model: &mut Model) {
        wait_until(|| {
            model.feed.poll();
            !model.feed.is_busy()
        });
    }

    fn type_text(model: &mut Model, text: &str) {
        for ch in text.chars() {
            model.handle_key(KeyCode::Char(ch));
        }
    }

    #[test]
    fn compose_and_submit_post() {
        let (board, mut model) = model_with(StubBoard::new());
        model.handle_key(KeyCode::Char('i'));
        type_text(&mut model, "hey!");
        model.handle_key(KeyCode::Backspace);
        assert_eq!(model.feed.post_composer().text, "hey");
        model.handle_key(KeyCode::Enter);
        assert!(model.input.is_none());
        settle(&mut model);
        assert_eq!(board.post_creates(), 1);
        assert_eq!(model.card_count(), 1);
    }

    #[test]
    fn blank_submit_stays_in_compose_mode() {
        let (board, mut model) = model_with(StubBoard::new());
        model.handle_key(KeyCode::Char('i'));
        model.handle_key(KeyCode::Enter);
        assert_eq!(model.input, Some(InputMode::Post));
        assert_eq!(board.post_creates(), 0);
        assert!(model.status_text().contains("请输入帖子内容"));
    }

    #[test]
    fn enter_opens_comments_for_selected_card() {
        let (board, mut model) = model_with(
            StubBoard::new()
                .with_post("p1", "first", 0)
                .with_post("p2", "second", 1)
                .with_comment("p2", "c1", "reply"),
        );
        model.handle_key(KeyCode::Char('j'));
        model.handle_key(KeyCode::Enter);
        settle(&mut model);
        assert_eq!(model.selected_comment_count(), 1);
        assert_eq!(board.comment_fetches(), 1);

        model.handle_key(KeyCode::Tab);
        assert_eq!(model.focus, Focus::Comments);
        model.handle_key(KeyCode::Char('l'));
        match &model.selected_section().unwrap().state {
            CommentState::Loaded(view) => assert_eq!(view.rows[0].like.count, 1),
            other => panic!("expected comments, got {other:?}"),
        }
    }

    #[test]
    fn blocking_notice_swallows_keys_until_dismissed() {
        let (board, mut model) = model_with(StubBoard::new().with_post("p1", "first", 0));
        board.fail_next_create(FetchError::Network("offline".into()));
        model.handle_key(KeyCode::Char('i'));
        type_text(&mut model, "x");
        model.handle_key(KeyCode::Enter);
        settle(&mut model);
        assert!(model.feed.notice().unwrap().is_blocking());

        assert!(!model.handle_key(KeyCode::Char('q')));
        model.handle_key(KeyCode::Enter);
        assert!(model.feed.notice().is_none());
        assert_eq!(model.feed.post_composer().text, "x");
        assert!(model.handle_key(KeyCode::Char('q')));
    }

    #[test]
    fn pagination_line_marks_current_page() {
        let mut pagination = Pagination::new();
        pagination.update(2, 30, 10);
        let line = pagination_line(pagination.window());
        let text: String = line.spans.iter().map(|span| span.content.as_ref()).collect();
        assert!(text.contains(" 1  2  3 "));
        assert!(pagination_line(None).spans.is_empty());
    }

    #[test]
    fn wrap_respects_width() {
        let lines = wrap_text("树洞树洞树洞", 4);
        assert_eq!(lines, vec!["树洞", "树洞", "树洞"]);
    }
}
