//! 编排集成测试：委派轮的 join/continuation 行为
//!
//! 用 ScriptedProvider 精确控制主智能体与各 Worker 的流内容与完成时序，
//! 通过 UI 事件通道观察编排器的对外行为。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use hive::agents::StreamChunk;
use hive::core::{spawn_orchestrator, AgentPhase, Command, OrchestratorHandles, UiEvent};
use hive::llm::{Provider, ScriptedProvider, ScriptedTurn};

fn fragment(name: Option<&str>, args: Option<&str>, id: Option<&str>, index: u32) -> StreamChunk {
    StreamChunk::ToolCallFragment {
        name: name.map(String::from),
        args_fragment: args.map(String::from),
        call_id: id.map(String::from),
        index: Some(index),
    }
}

/// 一个 delegate_task 调用，参数故意拆成两个分片
fn delegate_fragments(id: &str, index: u32, task: &str, worker: &str) -> Vec<StreamChunk> {
    vec![
        fragment(
            Some("delegate_task"),
            Some(&format!("{{\"task\":\"{task}\",")),
            Some(id),
            index,
        ),
        fragment(None, Some(&format!("\"worker_name\":\"{worker}\"}}")), None, index),
    ]
}

fn start(provider: ScriptedProvider, workspace: &std::path::Path) -> OrchestratorHandles {
    spawn_orchestrator(
        Arc::new(provider) as Arc<dyn Provider>,
        "test-model",
        workspace.to_path_buf(),
    )
}

/// 收集 UI 事件直到出现第 n 条 ChatFinished（即主智能体完成了 n 轮流式输出）
async fn collect_until_chat_finished(
    ui_rx: &mut mpsc::UnboundedReceiver<UiEvent>,
    n: usize,
) -> Vec<UiEvent> {
    let mut events = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), async {
        let mut finished = 0;
        while finished < n {
            let Some(ev) = ui_rx.recv().await else { break };
            if matches!(ev, UiEvent::ChatFinished) {
                finished += 1;
            }
            events.push(ev);
        }
    })
    .await
    .expect("round did not complete in time");
    events
}

fn chat_text(events: &[UiEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            UiEvent::ChatToken(t) => Some(t.as_str()),
            _ => None,
        })
        .collect()
}

fn position(events: &[UiEvent], pred: impl Fn(&UiEvent) -> bool) -> Option<usize> {
    events.iter().position(pred)
}

async fn wait_for_ready(handles: &mut OrchestratorHandles) {
    tokio::time::timeout(
        Duration::from_secs(2),
        handles
            .state_rx
            .wait_for(|s| s.phase == AgentPhase::Idle && s.status == "Ready"),
    )
    .await
    .expect("state did not return to Ready")
    .expect("state channel closed");
}

#[tokio::test]
async fn test_two_delegates_join_once_in_reverse_completion_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut turn = Vec::new();
    turn.extend(delegate_fragments("call_1", 0, "task-1", "Alpha"));
    turn.extend(delegate_fragments("call_2", 1, "task-2", "Beta"));

    let provider = ScriptedProvider::new()
        .script("spawn 2 tasks", ScriptedTurn::new(turn))
        .script(
            "spawn 2 tasks",
            ScriptedTurn::new(vec![StreamChunk::text("combined: done-1 done-2")]),
        )
        // Alpha 先派发却最后完成：join 只看集合，不看顺序
        .script("task-1", ScriptedTurn::with_delay(200, vec![StreamChunk::text("done-1")]))
        .script("task-2", ScriptedTurn::with_delay(50, vec![StreamChunk::text("done-2")]));

    let mut handles = start(provider, dir.path());
    handles
        .cmd_tx
        .send(Command::Submit("spawn 2 tasks".to_string()))
        .unwrap();

    let events = collect_until_chat_finished(&mut handles.ui_rx, 2).await;

    let started: Vec<&UiEvent> = events
        .iter()
        .filter(|e| matches!(e, UiEvent::WorkerStarted { .. }))
        .collect();
    assert_eq!(started.len(), 2);

    let finished_names: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            UiEvent::WorkerFinished { name, .. } => Some(name.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(finished_names, ["Beta", "Alpha"]);

    // 继续轮恰好一次，且全部输出在最后一个 Worker 完成之后
    assert_eq!(chat_text(&events), "combined: done-1 done-2");
    let last_finished = events
        .iter()
        .rposition(|e| matches!(e, UiEvent::WorkerFinished { .. }))
        .unwrap();
    let first_token = position(&events, |e| matches!(e, UiEvent::ChatToken(_))).unwrap();
    assert!(first_token > last_finished);

    wait_for_ready(&mut handles).await;
}

#[tokio::test]
async fn test_immediate_write_runs_before_any_delegate_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    // 批次里 delegate 排在 write_file 前面，立即工具仍须先执行
    let mut turn = Vec::new();
    turn.extend(delegate_fragments("call_d", 0, "task-3", "Gamma"));
    turn.push(fragment(
        Some("write_file"),
        Some("{\"path\":\"notes.txt\",\"content\":\"hello\"}"),
        Some("call_w"),
        1,
    ));

    let provider = ScriptedProvider::new()
        .script("write and delegate", ScriptedTurn::new(turn))
        .script(
            "write and delegate",
            ScriptedTurn::new(vec![StreamChunk::text("saved")]),
        )
        .script("task-3", ScriptedTurn::new(vec![StreamChunk::text("done-3")]));

    let mut handles = start(provider, dir.path());
    handles
        .cmd_tx
        .send(Command::Submit("write and delegate".to_string()))
        .unwrap();

    let events = collect_until_chat_finished(&mut handles.ui_rx, 2).await;

    let notice = position(&events, |e| {
        matches!(e, UiEvent::ToolNotice { name, .. } if name == "write_file")
    })
    .expect("write_file notice missing");
    let refresh = position(&events, |e| matches!(e, UiEvent::FileTreeRefresh))
        .expect("file tree refresh missing");
    let dispatch = position(&events, |e| matches!(e, UiEvent::WorkerStarted { .. }))
        .expect("worker never dispatched");
    assert!(notice < refresh);
    assert!(refresh < dispatch);

    let written = std::fs::read_to_string(dir.path().join("notes.txt")).unwrap();
    assert_eq!(written, "hello");

    assert_eq!(chat_text(&events), "saved");
    wait_for_ready(&mut handles).await;
}

#[tokio::test]
async fn test_fourth_delegate_gets_capacity_error_and_round_completes() {
    let dir = tempfile::tempdir().unwrap();
    let mut turn = Vec::new();
    for (i, (id, task, worker)) in [
        ("call_1", "t-1", "W1"),
        ("call_2", "t-2", "W2"),
        ("call_3", "t-3", "W3"),
        ("call_4", "t-4", "W4"),
    ]
    .iter()
    .enumerate()
    {
        turn.extend(delegate_fragments(id, i as u32, task, worker));
    }

    let provider = ScriptedProvider::new()
        .script("spawn 4 tasks", ScriptedTurn::new(turn))
        .script(
            "spawn 4 tasks",
            ScriptedTurn::new(vec![StreamChunk::text("all done")]),
        )
        .script("t-1", ScriptedTurn::with_delay(100, vec![StreamChunk::text("r1")]))
        .script("t-2", ScriptedTurn::with_delay(100, vec![StreamChunk::text("r2")]))
        .script("t-3", ScriptedTurn::with_delay(100, vec![StreamChunk::text("r3")]));

    let mut handles = start(provider, dir.path());
    handles
        .cmd_tx
        .send(Command::Submit("spawn 4 tasks".to_string()))
        .unwrap();

    let events = collect_until_chat_finished(&mut handles.ui_rx, 2).await;

    // 恰好 3 个 Worker 被派发，第 4 个调用拿到合成的容量错误；轮照常完成
    let started = events
        .iter()
        .filter(|e| matches!(e, UiEvent::WorkerStarted { .. }))
        .count();
    assert_eq!(started, 3);
    assert_eq!(chat_text(&events), "all done");
    wait_for_ready(&mut handles).await;
}

#[tokio::test]
async fn test_unknown_tool_gets_result_and_round_proceeds() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new()
        .script(
            "do something odd",
            ScriptedTurn::new(vec![fragment(
                Some("fetch_url"),
                Some("{\"url\":\"http://x\"}"),
                Some("call_u"),
                0,
            )]),
        )
        .script(
            "do something odd",
            ScriptedTurn::new(vec![StreamChunk::text("recovered")]),
        );

    let mut handles = start(provider, dir.path());
    handles
        .cmd_tx
        .send(Command::Submit("do something odd".to_string()))
        .unwrap();

    let events = collect_until_chat_finished(&mut handles.ui_rx, 2).await;
    assert!(position(&events, |e| {
        matches!(e, UiEvent::ToolNotice { name, .. } if name == "fetch_url")
    })
    .is_some());
    assert_eq!(chat_text(&events), "recovered");
    wait_for_ready(&mut handles).await;
}

#[tokio::test]
async fn test_worker_stream_error_still_completes_round() {
    let dir = tempfile::tempdir().unwrap();
    let mut turn = Vec::new();
    turn.extend(delegate_fragments("call_1", 0, "doomed task", "Unlucky"));

    let provider = ScriptedProvider::new()
        .script("delegate doomed", ScriptedTurn::new(turn))
        .script(
            "delegate doomed",
            ScriptedTurn::new(vec![StreamChunk::text("noted")]),
        )
        .script(
            "doomed task",
            ScriptedTurn::new(vec![
                StreamChunk::text("partial"),
                StreamChunk::error("connection reset"),
            ]),
        );

    let mut handles = start(provider, dir.path());
    handles
        .cmd_tx
        .send(Command::Submit("delegate doomed".to_string()))
        .unwrap();

    let events = collect_until_chat_finished(&mut handles.ui_rx, 2).await;

    assert!(position(&events, |e| matches!(e, UiEvent::WorkerError { .. })).is_some());
    assert!(position(&events, |e| {
        matches!(e, UiEvent::WorkerFinished { errored: true, .. })
    })
    .is_some());
    // Worker 失败不悬挂：继续轮照常发生
    assert_eq!(chat_text(&events), "noted");
    wait_for_ready(&mut handles).await;
}

#[tokio::test]
async fn test_chained_delegation_rounds() {
    let dir = tempfile::tempdir().unwrap();
    let mut first = Vec::new();
    first.extend(delegate_fragments("call_a", 0, "task-a", "A"));
    let mut second = Vec::new();
    second.extend(delegate_fragments("call_b", 0, "task-b", "B"));

    // 继续轮再次产生 delegate 调用：第二个委派轮之后才收尾
    let provider = ScriptedProvider::new()
        .script("chain", ScriptedTurn::new(first))
        .script("chain", ScriptedTurn::new(second))
        .script("chain", ScriptedTurn::new(vec![StreamChunk::text("final")]))
        .script("task-a", ScriptedTurn::new(vec![StreamChunk::text("ra")]))
        .script("task-b", ScriptedTurn::new(vec![StreamChunk::text("rb")]));

    let mut handles = start(provider, dir.path());
    handles
        .cmd_tx
        .send(Command::Submit("chain".to_string()))
        .unwrap();

    let events = collect_until_chat_finished(&mut handles.ui_rx, 3).await;
    let started = events
        .iter()
        .filter(|e| matches!(e, UiEvent::WorkerStarted { .. }))
        .count();
    assert_eq!(started, 2);
    assert_eq!(chat_text(&events), "final");
    wait_for_ready(&mut handles).await;
}

#[tokio::test]
async fn test_new_submission_cancels_inflight_primary_turn() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new()
        .script(
            "slow question",
            ScriptedTurn::with_delay(5_000, vec![StreamChunk::text("late")]),
        )
        .script(
            "quick question",
            ScriptedTurn::new(vec![StreamChunk::text("fast")]),
        );

    let mut handles = start(provider, dir.path());
    handles
        .cmd_tx
        .send(Command::Submit("slow question".to_string()))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    handles
        .cmd_tx
        .send(Command::Submit("quick question".to_string()))
        .unwrap();

    // 第 1 条 ChatFinished 来自被取消轮的冲刷，第 2 条来自新轮
    let events = collect_until_chat_finished(&mut handles.ui_rx, 2).await;
    assert_eq!(chat_text(&events), "fast");
    wait_for_ready(&mut handles).await;
}
