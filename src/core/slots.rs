//! Worker 槽位池
//!
//! 恰好 3 个固定槽位，绑定 worker 身份与面板位置。claim 对同一 agent_id 幂等；
//! 池满返回 None，调用方据此合成容量错误，绝不 panic。仅编排器任务触碰本结构，
//! 无需加锁。

/// 并发 Worker 上限
pub const SLOT_COUNT: usize = 3;

/// 槽位编号（0..SLOT_COUNT），同时决定 Worker 面板位置
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SlotId(pub usize);

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker-{}", self.0 + 1)
    }
}

#[derive(Debug, Clone)]
struct SlotBinding {
    agent_id: String,
    name: String,
}

/// 槽位池：idle → claimed → idle（release 时）
#[derive(Debug, Default)]
pub struct WorkerSlotPool {
    slots: [Option<SlotBinding>; SLOT_COUNT],
}

impl WorkerSlotPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为 agent 认领一个空闲槽位。已持有槽位的 agent 再次 claim 返回原槽位；
    /// 全部被其他 agent 占用时返回 None（容量耗尽，由调用方处理）。
    pub fn claim(&mut self, agent_id: &str, name: &str) -> Option<SlotId> {
        if let Some(existing) = self.get(agent_id) {
            return Some(existing);
        }
        let idx = self.slots.iter().position(Option::is_none)?;
        self.slots[idx] = Some(SlotBinding {
            agent_id: agent_id.to_string(),
            name: name.to_string(),
        });
        Some(SlotId(idx))
    }

    /// 释放 agent 的槽位；未持有时为 no-op
    pub fn release(&mut self, agent_id: &str) {
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|b| b.agent_id == agent_id) {
                *slot = None;
            }
        }
    }

    pub fn get(&self, agent_id: &str) -> Option<SlotId> {
        self.slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|b| b.agent_id == agent_id))
            .map(SlotId)
    }

    pub fn name_of(&self, slot: SlotId) -> Option<&str> {
        self.slots
            .get(slot.0)
            .and_then(|s| s.as_ref())
            .map(|b| b.name.as_str())
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}
