//! 界面渲染
//!
//! 布局：左侧主智能体聊天面板，中间三个 Worker 面板（标题显示名字与状态，
//! 边框颜色随状态变化），右侧工作目录文件树；底部状态行 + 输入框。
//! 渲染只消费 AppView 与 UiState 快照，不持有任何编排状态。

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::core::{UiState, SLOT_COUNT};

/// 单条聊天记录在 UI 中显示的最大字符数，超出折叠避免刷屏
const MAX_DISPLAY_CHARS: usize = 600;

/// 聊天面板里一行记录的类别（决定前缀与颜色）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatLineKind {
    User,
    Assistant,
    Tool,
    Error,
    Info,
}

#[derive(Debug, Clone)]
pub struct ChatLine {
    pub kind: ChatLineKind,
    pub text: String,
}

/// Worker 面板状态（决定标题与边框颜色）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Idle,
    Working,
    Done,
    Error,
}

impl WorkerStatus {
    fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Working => "working",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    fn color(self) -> Color {
        match self {
            Self::Idle => Color::DarkGray,
            Self::Working => Color::Yellow,
            Self::Done => Color::Green,
            Self::Error => Color::Red,
        }
    }
}

/// 单个 Worker 面板的展示缓冲
#[derive(Debug, Clone)]
pub struct WorkerPanelView {
    pub name: String,
    pub status: WorkerStatus,
    pub text: String,
}

impl WorkerPanelView {
    fn new(name: String) -> Self {
        Self {
            name,
            status: WorkerStatus::Idle,
            text: String::new(),
        }
    }
}

/// UI 持有的全部展示缓冲：聊天记录、流式暂存、Worker 面板与文件树
#[derive(Debug)]
pub struct AppView {
    pub chat: Vec<ChatLine>,
    /// 主智能体当前轮尚未定稿的流式文本
    pub chat_stream: String,
    pub workers: [WorkerPanelView; SLOT_COUNT],
    pub files: Vec<String>,
}

impl Default for AppView {
    fn default() -> Self {
        Self {
            chat: Vec::new(),
            chat_stream: String::new(),
            workers: [
                WorkerPanelView::new("Worker-1".to_string()),
                WorkerPanelView::new("Worker-2".to_string()),
                WorkerPanelView::new("Worker-3".to_string()),
            ],
            files: Vec::new(),
        }
    }
}

impl AppView {
    /// 把流式暂存定稿为一条 assistant 记录
    pub fn flush_stream(&mut self) {
        if !self.chat_stream.is_empty() {
            let text = std::mem::take(&mut self.chat_stream);
            self.chat.push(ChatLine {
                kind: ChatLineKind::Assistant,
                text,
            });
        }
    }
}

/// 对过长内容做折叠：保留前 N 字 + 省略提示
fn truncate_for_display(content: &str) -> String {
    let chars: Vec<char> = content.chars().collect();
    if chars.len() <= MAX_DISPLAY_CHARS {
        return content.to_string();
    }
    let head: String = chars.iter().take(MAX_DISPLAY_CHARS).collect();
    format!("{}\n... [{} chars total]", head, chars.len())
}

/// 将内容按宽度换行（按字符数，避免在 UTF-8 中间截断）
fn wrap_text(s: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![s.to_string()];
    }
    let mut lines = Vec::new();
    for para in s.split('\n') {
        let mut line = String::new();
        for ch in para.chars() {
            if line.chars().count() >= width {
                lines.push(std::mem::take(&mut line));
            }
            line.push(ch);
        }
        lines.push(line);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// 绘制一帧
pub fn draw(f: &mut Frame, state: &UiState, view: &AppView, input_buffer: &str) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),
            Constraint::Length(1),
            Constraint::Length(3),
        ])
        .split(f.area());

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(45),
            Constraint::Percentage(33),
            Constraint::Percentage(22),
        ])
        .split(rows[0]);

    draw_chat(f, state, view, columns[0]);
    draw_workers(f, view, columns[1]);
    draw_files(f, view, columns[2]);
    draw_status(f, state, rows[1]);
    draw_input(f, state, input_buffer, rows[2]);
}

fn draw_chat(f: &mut Frame, state: &UiState, view: &AppView, area: Rect) {
    let block = Block::default()
        .title(format!(" Hive │ {} ", state.model))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let content_width = area.width.saturating_sub(2).max(20) as usize;
    let mut text_lines: Vec<Line> = Vec::new();
    for (idx, line) in view.chat.iter().enumerate() {
        if idx > 0 {
            text_lines.push(Line::from(Span::raw("")));
        }
        let (prefix, color) = match line.kind {
            ChatLineKind::User => ("You  ", Color::Cyan),
            ChatLineKind::Assistant => ("Hive ", Color::Green),
            ChatLineKind::Tool => ("Tool ", Color::Yellow),
            ChatLineKind::Error => ("Err  ", Color::Red),
            ChatLineKind::Info => ("Info ", Color::Gray),
        };
        let display = truncate_for_display(&line.text);
        for (i, wrapped) in wrap_text(&display, content_width.saturating_sub(5)).into_iter().enumerate() {
            let pref = if i == 0 { prefix } else { "     " };
            text_lines.push(Line::from(vec![
                Span::styled(pref, Style::default().fg(color).add_modifier(Modifier::BOLD)),
                Span::raw(wrapped),
            ]));
        }
    }
    if !view.chat_stream.is_empty() {
        if !text_lines.is_empty() {
            text_lines.push(Line::from(Span::raw("")));
        }
        for (i, wrapped) in wrap_text(&view.chat_stream, content_width.saturating_sub(5))
            .into_iter()
            .enumerate()
        {
            let pref = if i == 0 { "Hive " } else { "     " };
            text_lines.push(Line::from(vec![
                Span::styled(pref, Style::default().fg(Color::Green)),
                Span::raw(wrapped),
            ]));
        }
    }

    // 自动贴底：视口装不下时只显示尾部
    let viewport = area.height.saturating_sub(2) as usize;
    let scroll = text_lines.len().saturating_sub(viewport) as u16;
    let paragraph = Paragraph::new(Text::from(text_lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    f.render_widget(paragraph, area);
}

fn draw_workers(f: &mut Frame, view: &AppView, area: Rect) {
    let slots = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(34),
            Constraint::Percentage(33),
            Constraint::Percentage(33),
        ])
        .split(area);

    for (idx, panel) in view.workers.iter().enumerate() {
        let color = panel.status.color();
        let block = Block::default()
            .title(format!(" {} ─ {} ", panel.name, panel.status.label()))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color));

        let width = slots[idx].width.saturating_sub(2).max(10) as usize;
        let wrapped = wrap_text(&panel.text, width);
        let viewport = slots[idx].height.saturating_sub(2) as usize;
        let scroll = wrapped.len().saturating_sub(viewport) as u16;

        let paragraph = Paragraph::new(panel.text.as_str())
            .block(block)
            .wrap(Wrap { trim: false })
            .scroll((scroll, 0));
        f.render_widget(paragraph, slots[idx]);
    }
}

fn draw_files(f: &mut Frame, view: &AppView, area: Rect) {
    let items: Vec<ListItem> = view
        .files
        .iter()
        .map(|name| ListItem::new(name.as_str()))
        .collect();
    let list = List::new(items).block(
        Block::default()
            .title(" Files ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue)),
    );
    f.render_widget(list, area);
}

fn draw_status(f: &mut Frame, state: &UiState, area: Rect) {
    let status = Line::from(vec![
        Span::styled(
            format!(" {} ", state.model),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw("│ "),
        Span::styled(
            state.status.clone(),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(" │ ~{} tok", state.tokens)),
    ]);
    f.render_widget(Paragraph::new(status), area);
}

fn draw_input(f: &mut Frame, state: &UiState, input_buffer: &str, area: Rect) {
    let title = if state.input_locked {
        " 等待 Worker 回报… "
    } else {
        " 输入 "
    };
    let hint = " Enter 发送 │ Esc 取消 │ Ctrl+L 清屏 │ F1 帮助 │ Ctrl+Q 退出 ";
    let block = Block::default()
        .title(title)
        .title_bottom(Line::from(Span::styled(
            hint,
            Style::default().fg(Color::DarkGray),
        )))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));

    let input = Paragraph::new(input_buffer)
        .block(block)
        .wrap(Wrap { trim: false })
        .style(if state.input_locked {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        });
    f.render_widget(input, area);
}
