//! 统计聚合：自底向上计数 + 级联失效
//!
//! 文本节点的统计是单叶分类；分组类节点的统计是子节点缓存统计之和。
//! 重新计算后与旧缓存比较，只有真正变化时才沿祖先链清除缓存。

use std::ops::AddAssign;

use crate::model::error::TreeError;
use crate::model::guard::NodeId;
use crate::model::node::{AttentionMode, CpInfo, PrjInfo, Translatable};
use crate::model::tree::Project;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsMode {
    /// 有缓存则用缓存
    Cached,
    /// 自身重新计算，子节点用缓存；之后按缓存对待
    SemiCached,
    /// 自身强制重新计算（仅一层），子节点用缓存
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeDropCache {
    No,
    Yes,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextStats {
    pub n_background: usize,
    pub n_calm: usize,
    pub n_user_attention: usize,
    pub n_auto_problem: usize,
    pub n_translated: usize,
    pub n_untranslated: usize,
}

impl TextStats {
    pub fn n_total(&self) -> usize {
        self.n_translated + self.n_untranslated
    }

    pub fn n_total_attention(&self) -> usize {
        self.n_user_attention + self.n_auto_problem
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// 非文本后代数量，不含自身
    pub n_groups: usize,
    pub text: TextStats,
    /// 自身是否计入父节点的分组数
    pub is_group: bool,
}

impl AddAssign<&Stats> for Stats {
    fn add_assign(&mut self, x: &Stats) {
        self.n_groups += x.n_groups + usize::from(x.is_group);
        self.text.n_background += x.text.n_background;
        self.text.n_calm += x.text.n_calm;
        self.text.n_user_attention += x.text.n_user_attention;
        self.text.n_auto_problem += x.text.n_auto_problem;
        self.text.n_translated += x.text.n_translated;
        self.text.n_untranslated += x.text.n_untranslated;
    }
}

impl Stats {
    /// 单个文本的分类
    pub fn of_text(tr: &Translatable, info: &PrjInfo) -> Self {
        let mut r = Stats::default();
        match tr.attention_mode(info) {
            AttentionMode::Background => r.text.n_background = 1,
            AttentionMode::Calm => r.text.n_calm = 1,
            AttentionMode::UserAttention => r.text.n_user_attention = 1,
            AttentionMode::AutoProblem => r.text.n_auto_problem = 1,
        }
        if tr.translation.is_some() {
            r.text.n_translated = 1;
        } else {
            r.text.n_untranslated = 1;
        }
        r
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LittleBigStats {
    pub n_strings: usize,
    pub n_cps_orig: usize,
    pub n_cps_transl: usize,
}

impl LittleBigStats {
    fn add(&mut self, info: CpInfo) {
        self.n_strings += 1;
        self.n_cps_orig += info.n_cps_orig;
        self.n_cps_transl += info.n_cps_transl;
    }
}

/// 字符串与码位数量统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BigStats {
    pub all: LittleBigStats,
    pub transl: LittleBigStats,
    pub untransl: LittleBigStats,
    /// 需要复查（原文已变）
    pub dubious: LittleBigStats,
}

impl Project {
    /// 获取统计，按 `mode` 决定是否使用缓存
    pub fn stats(
        &mut self,
        id: NodeId,
        mode: StatsMode,
        cascade: CascadeDropCache,
    ) -> Result<Stats, TreeError> {
        let node = self.node(id)?;
        if mode == StatsMode::Cached {
            if let Some(s) = node.cache.stats {
                return Ok(s);
            }
        }
        let r = self.compute_stats(id)?;
        self.reset_cache_if(id, r, cascade)
    }

    /// 读取缓存，不触发计算
    pub fn cached_stats(&self, id: NodeId) -> Result<Option<Stats>, TreeError> {
        Ok(self.node(id)?.cache.stats)
    }

    fn compute_stats(&mut self, id: NodeId) -> Result<Stats, TreeError> {
        let node = self.node(id)?;
        if let Some(tr) = node.translatable() {
            return Ok(Stats::of_text(tr, &self.info));
        }
        let is_group = node.kind().is_group_like();
        let children = node.children().to_vec();
        let mut r = Stats {
            is_group,
            ..Stats::default()
        };
        for ch in children {
            let s = self.stats(ch, StatsMode::Cached, CascadeDropCache::No)?;
            r += &s;
        }
        Ok(r)
    }

    fn reset_cache_if(
        &mut self,
        id: NodeId,
        r: Stats,
        cascade: CascadeDropCache,
    ) -> Result<Stats, TreeError> {
        if cascade == CascadeDropCache::Yes {
            let old = self.node(id)?.cache.stats;
            if old != Some(r) {
                self.cascade_drop_stats(id)?;
            }
        }
        self.node_mut(id)?.cache.stats = Some(r);
        Ok(r)
    }

    /// 清除自身及全部祖先的统计缓存
    pub(crate) fn cascade_drop_stats(&mut self, id: NodeId) -> Result<(), TreeError> {
        self.node_mut(id)?.cache.stats = None;
        let mut q = self.attached_parent(id);
        while let Some(p) = q {
            self.node_mut(p)?.cache.stats = None;
            q = self.attached_parent(p);
        }
        Ok(())
    }

    /// 整棵子树的统计缓存全部清除（例如项目类型改变后）
    pub(crate) fn drop_stats_recursive(&mut self, id: NodeId) -> Result<(), TreeError> {
        let node = self.node_mut(id)?;
        node.cache.stats = None;
        let children = node.children().to_vec();
        for ch in children {
            self.drop_stats_recursive(ch)?;
        }
        Ok(())
    }

    pub fn big_stats(&self, id: NodeId) -> Result<BigStats, TreeError> {
        let mut r = BigStats::default();
        for t in self.texts_under(id)? {
            let Some(tr) = self.node(t)?.translatable() else {
                continue;
            };
            let info = tr.cp_info(&self.info);
            r.all.add(info);
            if tr.translation.is_some() {
                r.transl.add(info);
            } else {
                r.untransl.add(info);
            }
            if tr.base_attention_mode(&self.info) == AttentionMode::AutoProblem
                && tr.known_original.is_some()
            {
                r.dubious.add(info);
            }
        }
        Ok(r)
    }
}
