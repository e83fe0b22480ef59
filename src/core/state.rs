//! 编排轮次状态
//!
//! IDLE → FANNED_OUT → ALL_SETTLED → FLUSHING → COMPLETE | FLUSH_FAILED；
//! 轮次之间只会停在 Idle、Complete 或 FlushFailed。

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RoundPhase {
    Idle,
    /// 所有层已启动
    FannedOut,
    /// 所有层都已给出结果或隔离后的错误
    AllSettled,
    Flushing,
    Complete,
    FlushFailed,
}

impl RoundPhase {
    /// 是否处于两轮之间
    pub fn is_between_rounds(&self) -> bool {
        matches!(self, Self::Idle | Self::Complete | Self::FlushFailed)
    }
}

/// 单层在一轮中的状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LayerState {
    Running,
    Done,
    Failed,
}
