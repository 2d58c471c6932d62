use std::collections::VecDeque;

/// 队列为空时提供后续曲目的来源
///
/// 只产出种子（搜索词），由队列交给 [`TrackResolver`](super::TrackResolver) 解析。
pub trait RadioSession: Send {
    /// 返回下一首的种子；耗尽时返回 None
    fn next_seed(&mut self) -> Option<String>;
}

/// 固定种子列表，按顺序产出
#[derive(Debug, Default, Clone)]
pub struct SeedList {
    seeds: VecDeque<String>,
}

impl SeedList {
    pub fn new<I, S>(seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            seeds: seeds.into_iter().map(Into::into).collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.seeds.len()
    }
}

impl RadioSession for SeedList {
    fn next_seed(&mut self) -> Option<String> {
        self.seeds.pop_front()
    }
}
