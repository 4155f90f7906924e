//! TUI 应用主循环
//!
//! 进入全屏/原始模式，轮询键盘事件与编排器的状态/事件通道：
//! 用户输入转为 Command 发给编排器，流式事件写入各面板缓冲，每帧渲染一次。

use std::io::{self, Stdout};
use std::path::Path;

use crossterm::event::KeyCode;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use crate::core::{OrchestratorHandles, UiEvent};
use crate::ui::render::{draw, AppView, ChatLine, ChatLineKind, WorkerStatus};

/// 运行 TUI：启用原始模式与全屏，循环 poll 事件 + 渲染，退出时恢复终端
pub async fn run_app(mut handles: OrchestratorHandles) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let event_handler = super::event::EventHandler::new(handles.cmd_tx.clone());
    let mut view = AppView::default();
    let mut input_buffer = String::new();

    view.files = list_workspace(&handles.workspace);
    if handles.state_rx.borrow().model == "mock" {
        view.chat.push(ChatLine {
            kind: ChatLineKind::Error,
            text: "No API key found. Set OPENAI_API_KEY or DEEPSEEK_API_KEY - responses come \
                   from the mock backend."
                .to_string(),
        });
    }

    loop {
        let state = handles.state_rx.borrow().clone();

        if let Ok(Some(ev)) = event_handler.poll() {
            match ev {
                super::event::AppEvent::Command(cmd) => {
                    if matches!(cmd, crate::core::Command::Quit) {
                        event_handler.send_quit();
                        break;
                    }
                    if matches!(cmd, crate::core::Command::Clear) && !state.input_locked {
                        view.chat.clear();
                        view.chat_stream.clear();
                    }
                }
                super::event::AppEvent::Help => {
                    view.chat.push(ChatLine {
                        kind: ChatLineKind::Info,
                        text: "F1=Help  Enter=Send  Esc=Cancel  Ctrl+L=Clear  Ctrl+Q/F10=Quit"
                            .to_string(),
                    });
                }
                super::event::AppEvent::Key(key) if !state.input_locked => match key.code {
                    KeyCode::Enter => {
                        let input = input_buffer.trim().to_string();
                        input_buffer.clear();
                        if !input.is_empty() {
                            if matches!(input.as_str(), "/exit" | "/quit") {
                                event_handler.send_quit();
                                break;
                            }
                            view.flush_stream();
                            view.chat.push(ChatLine {
                                kind: ChatLineKind::User,
                                text: input.clone(),
                            });
                            event_handler.send_submit(input);
                        }
                    }
                    KeyCode::Backspace => {
                        input_buffer.pop();
                    }
                    KeyCode::Char(c) => {
                        input_buffer.push(c);
                    }
                    _ => {}
                },
                super::event::AppEvent::Key(_) => {}
            }
        }

        while let Ok(ev) = handles.ui_rx.try_recv() {
            apply_ui_event(&mut view, ev, &handles.workspace);
        }

        terminal.draw(|f| draw(f, &state, &view, &input_buffer))?;
        tokio::task::yield_now().await;
    }

    restore_terminal(&mut terminal)?;
    Ok(())
}

/// 将编排器事件写入对应面板缓冲
fn apply_ui_event(view: &mut AppView, event: UiEvent, workspace: &Path) {
    match event {
        UiEvent::ChatToken(text) => view.chat_stream.push_str(&text),
        UiEvent::ChatError(message) => {
            view.flush_stream();
            view.chat.push(ChatLine {
                kind: ChatLineKind::Error,
                text: message,
            });
        }
        UiEvent::ChatFinished => view.flush_stream(),
        UiEvent::ToolNotice { name, summary } => {
            view.flush_stream();
            view.chat.push(ChatLine {
                kind: ChatLineKind::Tool,
                text: format!("[tool] {name}: {summary}"),
            });
        }
        UiEvent::WorkerStarted { slot, name } => {
            let panel = &mut view.workers[slot.0];
            panel.name = name;
            panel.status = WorkerStatus::Working;
            panel.text.clear();
        }
        UiEvent::WorkerToken { slot, text } => {
            view.workers[slot.0].text.push_str(&text);
        }
        UiEvent::WorkerError { slot, message } => {
            let panel = &mut view.workers[slot.0];
            panel.text.push_str(&format!("\nERROR: {message}"));
        }
        UiEvent::WorkerFinished { slot, name, errored } => {
            let panel = &mut view.workers[slot.0];
            panel.name = name;
            panel.status = if errored {
                WorkerStatus::Error
            } else {
                WorkerStatus::Done
            };
        }
        UiEvent::FileTreeRefresh => {
            view.files = list_workspace(workspace);
        }
    }
}

/// 列出工作目录（跳过隐藏项，目录加 / 后缀，排序）
fn list_workspace(workspace: &Path) -> Vec<String> {
    let mut entries = Vec::new();
    let Ok(dir) = std::fs::read_dir(workspace) else {
        return entries;
    };
    for e in dir.flatten() {
        let name = e.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        let suffix = if e.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            "/"
        } else {
            ""
        };
        entries.push(format!("{name}{suffix}"));
    }
    entries.sort();
    entries
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> anyhow::Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}
