//! 更新/合并引擎
//!
//! 导入器先在竞技场中构建一棵游离的候选子树（`CandidateBuilder`），
//! 然后 `update_from` 把候选子树嫁接到活动分组：
//! 整体交换子节点序列，按 (类型, ID) 配对，把手工数据从旧节点搬到新节点，
//! 最后修复父句柄与位置缓存、清除统计缓存。

use std::collections::{HashMap, VecDeque};
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::model::error::TreeError;
use crate::model::guard::NodeId;
use crate::model::node::{Children, Mch, Node, ObjType, SyncInfo};
use crate::model::stats::{CascadeDropCache, StatsMode};
use crate::model::tree::{Project, TrashLine};
use crate::model::walker::{Importer, Loader, PathFrom};

/// 原文归属策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OwnershipPolicy {
    /// 活动树的原文为准，丢弃候选原文
    Steal,
    /// 接受候选原文，不保留旧原文
    Keep,
    /// 接受候选原文；已翻译的文本保留旧原文以便复查
    #[default]
    KeepWarn,
}

impl OwnershipPolicy {
    pub const ALL: [OwnershipPolicy; 3] = [
        OwnershipPolicy::Steal,
        OwnershipPolicy::Keep,
        OwnershipPolicy::KeepWarn,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            OwnershipPolicy::Steal => "steal",
            OwnershipPolicy::Keep => "keep",
            OwnershipPolicy::KeepWarn => "keep-warn",
        }
    }

    pub fn from_tag(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.tag() == s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByState {
    pub n_translated: usize,
    pub n_untranslated: usize,
}

impl ByState {
    pub fn n_total(&self) -> usize {
        self.n_translated + self.n_untranslated
    }

    fn count(&mut self, translated: bool) {
        if translated {
            self.n_translated += 1;
        } else {
            self.n_untranslated += 1;
        }
    }
}

impl AddAssign<&ByState> for ByState {
    fn add_assign(&mut self, x: &ByState) {
        self.n_translated += x.n_translated;
        self.n_untranslated += x.n_untranslated;
    }
}

/// 一次合并的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateInfo {
    pub added: usize,
    pub deleted: ByState,
    pub changed: ByState,
}

impl UpdateInfo {
    pub const ZERO: UpdateInfo = UpdateInfo {
        added: 0,
        deleted: ByState {
            n_translated: 0,
            n_untranslated: 0,
        },
        changed: ByState {
            n_translated: 0,
            n_untranslated: 0,
        },
    };

    pub fn has_smth(&self) -> bool {
        *self != Self::ZERO
    }
}

impl AddAssign<&UpdateInfo> for UpdateInfo {
    fn add_assign(&mut self, x: &UpdateInfo) {
        self.added += x.added;
        self.deleted += &x.deleted;
        self.changed += &x.changed;
    }
}

/// 在竞技场中构建游离候选子树的 `Loader`
///
/// 重复的文本ID以最后一次为准；已有的分组直接进入。
pub struct CandidateBuilder<'a> {
    prj: &'a mut Project,
    root: NodeId,
    current: NodeId,
}

impl<'a> CandidateBuilder<'a> {
    pub fn new(prj: &'a mut Project, root: NodeId) -> Self {
        Self {
            prj,
            root,
            current: root,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// 找到或创建子分组
    fn child_group(&mut self, parent: NodeId, id: &str) -> Result<NodeId, TreeError> {
        if let Some(ch) = self.prj.find_child(parent, id)? {
            return match self.prj.kind(ch)? {
                ObjType::Group => Ok(ch),
                _ => Err(TreeError::MalformedSource(format!(
                    "ID {} 既是文本又是分组",
                    id
                ))),
            };
        }
        self.prj.push_child(parent, Node::new_group(id.to_string()))
    }

    fn walk(&mut self, from: NodeId, ids: &[&str]) -> Result<NodeId, TreeError> {
        let mut cur = from;
        for id in ids {
            cur = self.child_group(cur, id)?;
        }
        Ok(cur)
    }
}

impl Loader for CandidateBuilder<'_> {
    fn add_text_at(&mut self, ids: &[&str], original: &str, comment: &str) -> Result<(), TreeError> {
        let Some((&last, path)) = ids.split_last() else {
            return Err(TreeError::MalformedSource("文本ID路径为空".into()));
        };
        let parent = self.walk(self.current, path)?;
        let existing = if last.is_empty() {
            None
        } else {
            self.prj.find_child(parent, last)?
        };
        let text = match existing {
            Some(ch) if self.prj.kind(ch)? == ObjType::Text => ch,
            Some(_) => {
                return Err(TreeError::MalformedSource(format!(
                    "ID {} 既是分组又是文本",
                    last
                )))
            }
            None => self
                .prj
                .push_child(parent, Node::new_text(last.to_string(), String::new()))?,
        };
        let node = self.prj.node_mut(text)?;
        if let Some(tr) = node.translatable.as_mut() {
            tr.original = original.to_string();
        }
        node.comments.importers = comment.to_string();
        Ok(())
    }

    fn go_to_group(&mut self, ids: &[&str], from: PathFrom) -> Result<(), TreeError> {
        let start = match from {
            PathFrom::Current => self.current,
            PathFrom::Root => self.root,
        };
        self.current = self.walk(start, ids)?;
        Ok(())
    }

    fn go_up(&mut self) {
        if self.current != self.root {
            if let Some(p) = self.prj.attached_parent(self.current) {
                self.current = p;
            }
        }
    }
}

fn kind_mismatch(new: NodeId, old: NodeId) -> TreeError {
    TreeError::InvariantViolation(format!("配对节点 {} 与 {} 类型不同", new, old))
}

impl Project {
    /// 在竞技场中创建一个空的游离候选根
    pub fn new_candidate(&mut self) -> NodeId {
        self.nodes.insert(Node::new_group(String::new()))
    }

    /// 用 `fill` 构建候选子树并合并到 `live`；构建失败时活动树不变
    pub fn update_with<F>(
        &mut self,
        live: NodeId,
        policy: OwnershipPolicy,
        fill: F,
    ) -> Result<UpdateInfo, TreeError>
    where
        F: FnOnce(&mut dyn Loader) -> Result<(), TreeError>,
    {
        self.check_live(live)?;
        let cand = self.new_candidate();
        let built = {
            let mut builder = CandidateBuilder::new(self, cand);
            fill(&mut builder)
        };
        if let Err(e) = built {
            tracing::warn!("候选子树构建失败: {}", e);
            self.free_subtree(cand)?;
            return Err(e);
        }
        self.update_from(live, cand, policy)
    }

    /// 按分组的同步源重新导入
    pub fn sync_group(&mut self, live: NodeId, importer: &dyn Importer) -> Result<UpdateInfo, TreeError> {
        let sync: SyncInfo = self
            .node(live)?
            .sync()
            .cloned()
            .ok_or_else(|| TreeError::StructuralViolation(format!("节点 {} 没有同步源", live)))?;
        tracing::info!("同步 {} <- {}", live, sync.path.display());
        self.update_with(live, sync.policy, |loader| importer.do_import(&sync, loader))
    }

    /// 更新整个项目中所有带同步源的分组（只处理最上层的）
    ///
    /// 出错时立即停止，已经合并的分组保持合并后的状态。
    pub fn update_all(&mut self, importer: &dyn Importer) -> Result<UpdateInfo, TreeError> {
        let mut targets = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(x) = stack.pop() {
            let node = self.node(x)?;
            if node.sync().is_some() {
                targets.push(x);
            } else {
                stack.extend(node.children().iter().rev());
            }
        }
        let mut r = UpdateInfo::default();
        for g in targets {
            let info = self.sync_group(g, importer)?;
            r += &info;
        }
        tracing::info!(
            "项目更新完成: 新增 {}, 删除 {}, 修改 {}",
            r.added,
            r.deleted.n_total(),
            r.changed.n_total()
        );
        Ok(r)
    }

    fn check_live(&self, live: NodeId) -> Result<(), TreeError> {
        if !self.kind(live)?.is_group_like() {
            return Err(TreeError::StructuralViolation(format!(
                "节点 {} 不是文件或分组",
                live
            )));
        }
        Ok(())
    }

    /// 把游离的候选子树合并到活动分组，候选根随后释放
    ///
    /// 修改前先校验所有句柄。
    pub fn update_from(
        &mut self,
        live: NodeId,
        candidate: NodeId,
        policy: OwnershipPolicy,
    ) -> Result<UpdateInfo, TreeError> {
        self.check_live(live)?;
        if !self.kind(candidate)?.is_group_like() {
            return Err(TreeError::StructuralViolation("候选根必须是分组".into()));
        }
        if candidate == live || self.attached_parent(candidate).is_some() {
            return Err(TreeError::StructuralViolation("候选子树必须是游离的".into()));
        }

        let grafted = self.node_mut(candidate)?.children.take().unwrap_or_default();
        let new_children = grafted.as_slice().to_vec();
        let old_children = self.take_children(live)?;
        self.node_mut(live)?.children = Some(grafted);
        let mut prefix = self.id_chain(live)?;
        let info = self.merge_children(&new_children, old_children, policy, &mut prefix)?;
        self.free_subtree(candidate)?;

        // 整体移动的子树必须修复父句柄
        self.recursive_recache(live)?;
        self.drop_stats_recursive(live)?;
        self.cascade_drop_stats(live)?;
        if info.has_smth() {
            self.do_modify(live, Mch::Orig)?;
        }
        tracing::info!(
            "合并 {}: 新增 {}, 删除 {}/{}, 修改 {}/{}",
            live,
            info.added,
            info.deleted.n_translated,
            info.deleted.n_untranslated,
            info.changed.n_translated,
            info.changed.n_untranslated
        );
        Ok(info)
    }

    fn take_children(&mut self, id: NodeId) -> Result<Vec<NodeId>, TreeError> {
        Ok(self
            .node_mut(id)?
            .children
            .take()
            .map(Children::into_vec)
            .unwrap_or_default())
    }

    /// `new` 已经挂在新父节点下；`old` 是被替换下来的旧序列
    fn merge_children(
        &mut self,
        new: &[NodeId],
        old: Vec<NodeId>,
        policy: OwnershipPolicy,
        prefix: &mut Vec<String>,
    ) -> Result<UpdateInfo, TreeError> {
        let mut r = UpdateInfo::default();
        let mut by_key: HashMap<(ObjType, String), VecDeque<usize>> = HashMap::new();
        for (i, &o) in old.iter().enumerate() {
            let node = self.node(o)?;
            by_key
                .entry((node.kind(), node.id().to_string()))
                .or_default()
                .push_back(i);
        }
        let mut staying = vec![false; old.len()];

        for &n in new {
            let node = self.node(n)?;
            let key = (node.kind(), node.id().to_string());
            match by_key.get_mut(&key).and_then(VecDeque::pop_front) {
                Some(i) => {
                    staying[i] = true;
                    let info = self.pull_data(n, old[i], policy, prefix)?;
                    r += &info;
                    self.free_subtree(old[i])?;
                }
                None => r.added += self.mark_added(n)?,
            }
        }

        for (i, o) in old.into_iter().enumerate() {
            if staying[i] {
                continue;
            }
            // 直接统计，不级联：节点正在离开树
            let s = self.stats(o, StatsMode::Direct, CascadeDropCache::No)?;
            r.deleted.n_translated += s.text.n_translated;
            r.deleted.n_untranslated += s.text.n_untranslated;
            self.trash_subtree(o, prefix)?;
            self.free_subtree(o)?;
        }
        Ok(r)
    }

    /// 把旧节点的手工数据搬到配对的新节点
    fn pull_data(
        &mut self,
        new: NodeId,
        old: NodeId,
        policy: OwnershipPolicy,
        prefix: &mut Vec<String>,
    ) -> Result<UpdateInfo, TreeError> {
        let old_node = self.node_mut(old)?;
        let old_comments = std::mem::take(&mut old_node.comments);
        let old_tr = old_node.translatable.take();
        let old_sync = old_node.sync.take();
        let old_expand = old_node.cache.expand;
        let old_children = old_node.children.take();

        let node = self.node_mut(new)?;
        node.comments.authors = old_comments.authors;
        node.comments.translators = old_comments.translators;
        node.cache.expand = old_expand;
        if node.sync.is_none() {
            node.sync = old_sync;
        }

        let mut r = UpdateInfo::default();
        if let Some(old_tr) = old_tr {
            let tr = node
                .translatable
                .as_mut()
                .ok_or_else(|| kind_mismatch(new, old))?;
            tr.translation = old_tr.translation;
            tr.reference = old_tr.reference;
            tr.force_attention = old_tr.force_attention;
            tr.was_changed_today = old_tr.was_changed_today;
            let translated = tr.translation.is_some();
            let changed = tr.original != old_tr.original;
            match policy {
                OwnershipPolicy::Steal => {
                    tr.original = old_tr.original;
                    tr.known_original = old_tr.known_original;
                }
                OwnershipPolicy::Keep => {
                    tr.known_original = old_tr.known_original.filter(|k| *k != tr.original);
                }
                OwnershipPolicy::KeepWarn => {
                    tr.known_original = match old_tr.known_original {
                        Some(k) => (k != tr.original).then_some(k),
                        None if changed && translated => Some(old_tr.original),
                        None => None,
                    };
                }
            }
            if changed && policy != OwnershipPolicy::Steal {
                tr.was_changed_today = true;
                r.changed.count(translated);
                node.cache.modif.set(Mch::Orig);
            }
            return Ok(r);
        }
        if node.translatable.is_some() {
            return Err(kind_mismatch(new, old));
        }

        let new_children = node.children().to_vec();
        prefix.push(node.id().to_string());
        let info = self.merge_children(
            &new_children,
            old_children.map(Children::into_vec).unwrap_or_default(),
            policy,
            prefix,
        )?;
        prefix.pop();
        r += &info;
        Ok(r)
    }

    /// 新增的子树：返回文本数量，并标记为今天修改过
    fn mark_added(&mut self, id: NodeId) -> Result<usize, TreeError> {
        let texts = self.texts_under(id)?;
        for &t in &texts {
            let node = self.node_mut(t)?;
            if let Some(tr) = node.translatable.as_mut() {
                tr.was_changed_today = true;
            }
            node.cache.modif.set(Mch::Id);
        }
        Ok(texts.len())
    }

    /// 带译文的已删除文本放入回收站
    fn trash_subtree(&mut self, id: NodeId, prefix: &mut Vec<String>) -> Result<(), TreeError> {
        let node = self.node(id)?;
        prefix.push(node.id().to_string());
        let line = node
            .translatable()
            .filter(|tr| tr.translation.is_some())
            .cloned();
        let children = node.children().to_vec();
        if let Some(tr) = line {
            self.trash.push(TrashLine {
                id_chain: prefix.clone(),
                tr,
            });
        }
        for ch in children {
            self.trash_subtree(ch, prefix)?;
        }
        prefix.pop();
        Ok(())
    }
}
