//! 编排器：join/continuation 状态机与主控循环
//!
//! 单一编排器任务独占主智能体、槽位池与委派轮状态（单写者，无锁）。
//! 主智能体的流与用户命令、Worker 事件在同一个 select 循环里推进：
//! Idle -> 主智能体流式 -> 工具路由（立即工具先于一切委派执行）->
//! 等待 Worker 集合齐全 -> 恢复主智能体 -> 可能再次产生工具调用（循环，
//! 迭代推进，轮数不增加调用栈）-> Ready。

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::agents::{AccumulatedToolCall, Agent, StreamChunk, Turn};
use crate::config::{load_config, AppConfig};
use crate::core::{
    AgentError, AgentPhase, SlotId, UiEvent, UiState, WorkerEvent, WorkerSlotPool,
};
use crate::llm::{create_deepseek_provider, MockProvider, OpenAiProvider, Provider};
use crate::tools::{tool_summary, FileTools, ToolKind};

/// 从 UI 发往编排器的用户命令
#[derive(Debug, Clone)]
pub enum Command {
    /// 提交用户输入；主智能体流式期间提交会先取消当前轮
    Submit(String),
    /// 取消当前主智能体生成（已派发的 Worker 不受影响）
    Cancel,
    /// 清空对话（仅空闲时生效）
    Clear,
    /// 退出应用
    Quit,
}

/// 编排器对外的三通道句柄：UI -> Core 命令；Core -> UI 状态快照与流式事件
pub struct OrchestratorHandles {
    pub cmd_tx: mpsc::UnboundedSender<Command>,
    pub state_rx: watch::Receiver<UiState>,
    pub ui_rx: mpsc::UnboundedReceiver<UiEvent>,
    pub workspace: PathBuf,
}

/// 一个委派轮：期望的 call id 集合与已收集的结果。
/// 谓词满足后整轮被一次性清除，之后的检查都是 no-op。
#[derive(Debug)]
struct DelegationRound {
    expected: HashSet<String>,
    collected: HashMap<String, String>,
}

impl DelegationRound {
    fn new(expected: impl IntoIterator<Item = String>) -> Self {
        Self {
            expected: expected.into_iter().collect(),
            collected: HashMap::new(),
        }
    }

    fn expects(&self, tool_call_id: &str) -> bool {
        self.expected.contains(tool_call_id)
    }

    fn record(&mut self, tool_call_id: String, result: String) {
        self.collected.insert(tool_call_id, result);
    }

    /// 完成只看集合包含关系，与 Worker 的完成顺序无关
    fn is_satisfied(&self) -> bool {
        !self.expected.is_empty()
            && self.expected.iter().all(|id| self.collected.contains_key(id))
    }
}

enum LoopEvent {
    Cmd(Option<Command>),
    Worker(WorkerEvent),
    PrimaryChunk(Option<StreamChunk>),
}

struct Orchestrator {
    main_agent: Agent,
    provider: Arc<dyn Provider>,
    slots: WorkerSlotPool,
    round: Option<DelegationRound>,
    active_turn: Option<Turn>,
    file_tools: FileTools,
    worker_tx: mpsc::UnboundedSender<WorkerEvent>,
    ui_tx: mpsc::UnboundedSender<UiEvent>,
    state_tx: watch::Sender<UiState>,
    state: UiState,
    /// 当前主智能体轮已输出的字符数（token 估算用）
    turn_chars: u64,
}

impl Orchestrator {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut worker_rx: mpsc::UnboundedReceiver<WorkerEvent>,
    ) {
        loop {
            let event = match self.active_turn.as_mut() {
                Some(turn) => tokio::select! {
                    biased;
                    cmd = cmd_rx.recv() => LoopEvent::Cmd(cmd),
                    Some(ev) = worker_rx.recv() => LoopEvent::Worker(ev),
                    chunk = turn.next() => LoopEvent::PrimaryChunk(chunk),
                },
                None => tokio::select! {
                    biased;
                    cmd = cmd_rx.recv() => LoopEvent::Cmd(cmd),
                    Some(ev) = worker_rx.recv() => LoopEvent::Worker(ev),
                },
            };

            match event {
                LoopEvent::Cmd(None) | LoopEvent::Cmd(Some(Command::Quit)) => break,
                LoopEvent::Cmd(Some(cmd)) => self.handle_command(cmd),
                LoopEvent::Worker(ev) => self.on_worker_event(ev),
                LoopEvent::PrimaryChunk(Some(chunk)) => self.on_primary_chunk(chunk),
                LoopEvent::PrimaryChunk(None) => self.on_primary_finished(),
            }
        }
        tracing::info!("orchestrator loop exited");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Submit(input) => {
                if self.round.is_some() {
                    // 委派轮进行中不可重入：历史里还欠着工具结果
                    self.ui_send(UiEvent::ChatError(
                        "Workers are still running - wait for the current round to finish."
                            .to_string(),
                    ));
                    return;
                }
                if self.active_turn.take().is_some() {
                    // 单主任务不变量：丢弃在途流即取消，再开新轮
                    tracing::info!("primary turn cancelled by new submission");
                    self.ui_send(UiEvent::ChatFinished);
                }
                self.start_primary_turn(&input);
            }
            Command::Cancel => {
                if self.active_turn.take().is_some() {
                    tracing::info!("primary turn cancelled");
                    self.ui_send(UiEvent::ChatError("Cancelled.".to_string()));
                    self.ui_send(UiEvent::ChatFinished);
                    if self.round.is_none() {
                        self.set_idle();
                    }
                }
            }
            Command::Clear => {
                if self.round.is_none() && self.active_turn.is_none() {
                    self.main_agent = Agent::main(Arc::clone(&self.provider));
                    self.set_idle();
                }
            }
            // Quit 在 run 循环里先行匹配
            Command::Quit => {}
        }
    }

    fn start_primary_turn(&mut self, input: &str) {
        self.turn_chars = 0;
        self.set_phase(AgentPhase::Thinking, "Thinking...", false);
        self.active_turn = Some(self.main_agent.send(input, None));
    }

    fn on_primary_chunk(&mut self, chunk: StreamChunk) {
        match chunk {
            StreamChunk::Text { content } => {
                self.turn_chars += content.chars().count() as u64;
                self.ui_send(UiEvent::ChatToken(content));
            }
            StreamChunk::Error { message } => {
                self.ui_send(UiEvent::ChatError(message));
            }
            // 工具调用分片已在 Turn 内部累积
            StreamChunk::ToolCallFragment { .. } => {}
        }
    }

    fn on_primary_finished(&mut self) {
        let Some(turn) = self.active_turn.take() else {
            return;
        };
        self.main_agent.finish_turn(turn);
        self.ui_send(UiEvent::ChatFinished);
        self.state.tokens = self.turn_chars / 4;
        self.push_state();

        if self.main_agent.pending_tool_calls().is_empty() {
            self.set_idle();
            return;
        }
        self.process_pending_tools();
    }

    /// 路由本轮工具调用：立即工具（文件 / 未知名）全部先执行，
    /// 之后才考虑 delegate 派发。
    fn process_pending_tools(&mut self) {
        let calls = self.main_agent.pending_tool_calls().to_vec();

        let mut immediate: Vec<(ToolKind, AccumulatedToolCall)> = Vec::new();
        let mut delegates: Vec<AccumulatedToolCall> = Vec::new();
        for call in calls {
            let kind = ToolKind::from_name(&call.name);
            if kind.is_immediate() {
                immediate.push((kind, call));
            } else {
                delegates.push(call);
            }
        }

        let mut wrote_file = false;
        for (kind, call) in &immediate {
            let result = self.execute_immediate(*kind, call);
            self.main_agent.add_tool_result(&call.id, &result);
            self.ui_send(UiEvent::ToolNotice {
                name: call.name.clone(),
                summary: tool_summary(call),
            });
            if *kind == ToolKind::WriteFile && result.starts_with("Wrote ") {
                wrote_file = true;
            }
        }
        if wrote_file {
            self.ui_send(UiEvent::FileTreeRefresh);
        }

        if delegates.is_empty() {
            self.start_continuation();
        } else {
            self.dispatch_workers(delegates);
        }
    }

    fn execute_immediate(&self, kind: ToolKind, call: &AccumulatedToolCall) -> String {
        match kind {
            ToolKind::WriteFile => self.file_tools.write_file(&call.arguments),
            ToolKind::ReadFile => self.file_tools.read_file(&call.arguments),
            ToolKind::Unknown => {
                tracing::warn!(tool = %call.name, "model requested unknown tool");
                AgentError::UnknownTool(call.name.clone()).to_string()
            }
            ToolKind::DelegateTask => {
                "Error: delegate_task is dispatched to a worker, not executed inline".to_string()
            }
        }
    }

    /// 为每个 delegate 调用认领槽位并派发 Worker 任务。
    /// 槽位耗尽的调用当场合成容量错误结果——不派发、不悬挂，
    /// 轮的期望集合在派发前就已固定，完成谓词因此不会提前触发。
    fn dispatch_workers(&mut self, delegates: Vec<AccumulatedToolCall>) {
        self.set_phase(
            AgentPhase::Delegating,
            &format!("Delegating {} task(s)...", delegates.len()),
            true,
        );
        self.round = Some(DelegationRound::new(
            delegates.iter().map(|c| c.id.clone()),
        ));

        for call in delegates {
            let task = call.str_arg("task", "").to_string();
            let name = call.str_arg("worker_name", "Worker").to_string();
            let agent_id = worker_agent_id();

            match self.slots.claim(&agent_id, &name) {
                None => {
                    tracing::warn!(tool_call = %call.id, "worker capacity exceeded");
                    let result = format!("Error: {}", AgentError::CapacityExceeded);
                    self.main_agent.add_tool_result(&call.id, &result);
                    if let Some(round) = self.round.as_mut() {
                        round.record(call.id.clone(), result);
                    }
                    self.check_round_complete();
                }
                Some(slot) => {
                    tracing::info!(agent = %agent_id, %slot, worker = %name, "worker dispatched");
                    self.ui_send(UiEvent::WorkerStarted {
                        slot,
                        name: name.clone(),
                    });
                    tokio::spawn(run_worker(
                        Arc::clone(&self.provider),
                        agent_id,
                        name,
                        task,
                        call.id,
                        slot,
                        self.worker_tx.clone(),
                    ));
                }
            }
        }
    }

    fn on_worker_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Token { slot, text } => {
                self.ui_send(UiEvent::WorkerToken { slot, text });
            }
            WorkerEvent::Error { slot, message } => {
                self.ui_send(UiEvent::WorkerError { slot, message });
            }
            WorkerEvent::Completed {
                agent_id,
                slot,
                name,
                tool_call_id,
                result,
                errored,
            } => {
                self.slots.release(&agent_id);
                self.ui_send(UiEvent::WorkerFinished { slot, name, errored });

                let Some(round) = self.round.as_mut() else {
                    tracing::warn!(%tool_call_id, "worker completed after round was cleared");
                    return;
                };
                if !round.expects(&tool_call_id) {
                    tracing::warn!(%tool_call_id, "worker completion for unexpected tool call");
                    return;
                }
                self.main_agent.add_tool_result(&tool_call_id, &result);
                round.record(tool_call_id, result);
                self.check_round_complete();
            }
        }
    }

    /// 期望集合 ⊆ 已收集集合时恢复主智能体；轮状态恰好清除一次，
    /// 清除后的再次检查是 no-op。
    fn check_round_complete(&mut self) {
        if self.round.as_ref().is_some_and(DelegationRound::is_satisfied) {
            self.round = None;
            self.start_continuation();
        }
    }

    fn start_continuation(&mut self) {
        self.turn_chars = 0;
        self.set_phase(AgentPhase::Synthesizing, "Synthesizing...", false);
        self.active_turn = Some(self.main_agent.continue_after_tools(None));
    }

    fn set_idle(&mut self) {
        self.set_phase(AgentPhase::Idle, "Ready", false);
    }

    fn set_phase(&mut self, phase: AgentPhase, status: &str, input_locked: bool) {
        self.state.phase = phase;
        self.state.status = status.to_string();
        self.state.input_locked = input_locked;
        self.push_state();
    }

    fn push_state(&self) {
        let _ = self.state_tx.send(self.state.clone());
    }

    fn ui_send(&self, event: UiEvent) {
        let _ = self.ui_tx.send(event);
    }
}

fn worker_agent_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("worker-{}", &hex[..8])
}

/// 单个 Worker 的整轮流式上限；超时的 Worker 以错误结果完成，轮不被悬挂
const WORKER_TURN_TIMEOUT_SECS: u64 = 300;

/// 独立 Worker 任务：跑完一次 send，逐 token 转发到面板，结束时**无论成败**
/// 恰好发出一条 Completed——join 不变量依赖于此。流内错误已被 Provider 折叠
/// 为 Error chunk；卡死的流由整轮超时兜底。
async fn run_worker(
    provider: Arc<dyn Provider>,
    agent_id: String,
    display_name: String,
    task: String,
    tool_call_id: String,
    slot: SlotId,
    tx: mpsc::UnboundedSender<WorkerEvent>,
) {
    let mut agent = Agent::worker(
        Arc::clone(&provider),
        agent_id.clone(),
        display_name.clone(),
        task.clone(),
    );
    let mut turn = agent.send(&task, None);
    let mut full = String::new();
    let mut errored = false;

    let outcome = tokio::time::timeout(
        std::time::Duration::from_secs(WORKER_TURN_TIMEOUT_SECS),
        async {
            while let Some(chunk) = turn.next().await {
                match chunk {
                    StreamChunk::Text { content } => {
                        full.push_str(&content);
                        let _ = tx.send(WorkerEvent::Token {
                            slot,
                            text: content,
                        });
                    }
                    StreamChunk::Error { message } => {
                        errored = true;
                        let _ = tx.send(WorkerEvent::Error {
                            slot,
                            message: message.clone(),
                        });
                        full.push_str(&format!("\nERROR: {message}"));
                    }
                    StreamChunk::ToolCallFragment { .. } => {}
                }
            }
        },
    )
    .await;

    match outcome {
        Ok(()) => agent.finish_turn(turn),
        Err(_) => {
            errored = true;
            let message = format!("worker timed out after {WORKER_TURN_TIMEOUT_SECS}s");
            tracing::warn!(agent = %agent_id, %slot, "{message}");
            let _ = tx.send(WorkerEvent::Error {
                slot,
                message: message.clone(),
            });
            full.push_str(&format!("\nERROR: {message}"));
        }
    }

    let result = if full.is_empty() {
        "(no output)".to_string()
    } else {
        full
    };
    tracing::info!(agent = %agent_id, %slot, errored, "worker completed");
    let _ = tx.send(WorkerEvent::Completed {
        agent_id,
        slot,
        name: display_name,
        tool_call_id,
        result,
        errored,
    });
}

/// 根据配置与环境变量选择 Provider（DeepSeek / OpenAI 兼容 / Mock），
/// 返回 Provider 与展示用的模型名
pub fn create_provider_from_config(cfg: &AppConfig) -> (Arc<dyn Provider>, String) {
    let provider = cfg.llm.provider.to_lowercase();
    // 有 DeepSeek Key，或配置为 deepseek 且仅有 OpenAI Key 时也走 DeepSeek 兼容端点
    let use_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok()
        || (provider == "deepseek" && std::env::var("OPENAI_API_KEY").is_ok());
    let use_openai = std::env::var("OPENAI_API_KEY").is_ok() && provider != "deepseek";

    if use_deepseek {
        let model = cfg
            .llm
            .deepseek
            .model
            .clone()
            .unwrap_or_else(|| cfg.llm.model.clone());
        tracing::info!("Using DeepSeek backend ({})", model);
        (Arc::new(create_deepseek_provider(Some(&model))), model)
    } else if use_openai {
        let model = cfg
            .llm
            .openai
            .model
            .clone()
            .unwrap_or_else(|| cfg.llm.model.clone());
        let base = cfg.llm.base_url.as_deref();
        tracing::info!("Using OpenAI-compatible backend ({})", model);
        (
            Arc::new(OpenAiProvider::new(
                base,
                &model,
                std::env::var("OPENAI_API_KEY").ok().as_deref(),
            )),
            model,
        )
    } else {
        tracing::warn!("No API key set, using mock backend");
        (Arc::new(MockProvider), "mock".to_string())
    }
}

/// 以给定 Provider 启动编排器任务，返回三通道句柄（测试从这里注入脚本 Provider）
pub fn spawn_orchestrator(
    provider: Arc<dyn Provider>,
    model: impl Into<String>,
    workspace: PathBuf,
) -> OrchestratorHandles {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
    let (ui_tx, ui_rx) = mpsc::unbounded_channel::<UiEvent>();
    let (worker_tx, worker_rx) = mpsc::unbounded_channel::<WorkerEvent>();

    let state = UiState {
        model: model.into(),
        ..UiState::default()
    };
    let (state_tx, state_rx) = watch::channel(state.clone());

    let orchestrator = Orchestrator {
        main_agent: Agent::main(Arc::clone(&provider)),
        provider,
        slots: WorkerSlotPool::new(),
        round: None,
        active_turn: None,
        file_tools: FileTools::new(&workspace),
        worker_tx,
        ui_tx,
        state_tx,
        state,
        turn_chars: 0,
    };
    tokio::spawn(orchestrator.run(cmd_rx, worker_rx));

    OrchestratorHandles {
        cmd_tx,
        state_rx,
        ui_rx,
        workspace,
    }
}

/// 创建编排器运行时：加载配置、准备工作目录、选择 Provider 并启动主控循环
pub fn create_orchestrator(config_path: Option<PathBuf>) -> anyhow::Result<OrchestratorHandles> {
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    // 工作目录：配置 > 当前目录下的 workspace
    let workspace = cfg
        .app
        .workspace_root
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default().join("workspace"));
    std::fs::create_dir_all(&workspace)?;
    let workspace = workspace.canonicalize().unwrap_or(workspace);

    let (provider, model) = create_provider_from_config(&cfg);
    Ok(spawn_orchestrator(provider, model, workspace))
}
