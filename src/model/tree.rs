//! Project：节点竞技场 + 树结构操作
//!
//! 父节点独占子节点（子节点序列保存句柄），子节点只保存指向直接父节点的非拥有句柄。
//! 所有结构变更后都会 recache，使缓存的位置与真实位置一致。

use std::path::PathBuf;

use crate::model::error::TreeError;
use crate::model::guard::{Arena, NodeId};
use crate::model::modifiable::{ModState, Modifiable};
use crate::model::node::{
    Children, Mch, Modify, Node, ObjType, PrjInfo, ProjectType, SyncInfo, Translatable,
};
use crate::model::stats::{CascadeDropCache, StatsMode};
use crate::model::walker::TraverseListener;

/// 回收站中的一行：被合并删除但带有译文的文本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrashLine {
    pub id_chain: Vec<String>,
    pub tr: Translatable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterMe {
    No,
    Yes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forced {
    No,
    Yes,
}

#[derive(Debug)]
pub struct Project {
    pub info: PrjInfo,
    pub fname: Option<PathBuf>,
    pub trash: Vec<TrashLine>,
    pub(crate) nodes: Arena<Node>,
    root: NodeId,
    modif: Modifiable,
}

impl Default for Project {
    fn default() -> Self {
        Self::with_info(PrjInfo::default())
    }
}

impl Project {
    pub fn new(ty: ProjectType) -> Self {
        Self::with_info(PrjInfo {
            ty,
            ..PrjInfo::default()
        })
    }

    pub fn with_info(info: PrjInfo) -> Self {
        let mut nodes = Arena::default();
        let root = nodes.insert(Node::new_project());
        Self {
            info,
            fname: None,
            trash: Vec::new(),
            nodes,
            root,
            modif: Modifiable::default(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn files(&self) -> &[NodeId] {
        self.nodes
            .get(self.root)
            .map(|n| n.children())
            .unwrap_or(&[])
    }

    /// 存活节点数量（含根节点与摘下的节点）
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, TreeError> {
        self.nodes.get(id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, TreeError> {
        self.nodes.get_mut(id)
    }

    pub fn kind(&self, id: NodeId) -> Result<ObjType, TreeError> {
        Ok(self.node(id)?.kind)
    }

    pub fn children(&self, id: NodeId) -> Result<&[NodeId], TreeError> {
        Ok(self.node(id)?.children())
    }

    pub fn translatable(&self, id: NodeId) -> Result<Option<&Translatable>, TreeError> {
        Ok(self.node(id)?.translatable())
    }

    /// 父节点，仅当节点确实挂在该父节点下时返回
    pub fn attached_parent(&self, id: NodeId) -> Option<NodeId> {
        let node = self.nodes.get(id).ok()?;
        let p = node.parent?;
        let pn = self.nodes.get(p).ok()?;
        let ch = pn.children();
        if ch.get(node.cache.index) == Some(&id) || ch.contains(&id) {
            Some(p)
        } else {
            None
        }
    }

    /// 最近的文件祖先（含自身）
    pub fn file_of(&self, id: NodeId) -> Option<NodeId> {
        let mut q = Some(id);
        while let Some(x) = q {
            if self.nodes.get(x).ok()?.kind == ObjType::File {
                return Some(x);
            }
            q = self.attached_parent(x);
        }
        None
    }

    /// 从文件到节点的ID链
    pub fn id_chain(&self, id: NodeId) -> Result<Vec<String>, TreeError> {
        let mut r = Vec::new();
        let mut q = Some(id);
        while let Some(x) = q {
            let node = self.node(x)?;
            if node.kind == ObjType::Project {
                break;
            }
            r.push(node.id.clone());
            q = self.attached_parent(x);
        }
        r.reverse();
        Ok(r)
    }

    pub fn find_child(&self, parent: NodeId, id: &str) -> Result<Option<NodeId>, TreeError> {
        let Some(children) = self.node(parent)?.children.as_ref() else {
            return Ok(None);
        };
        if !id.is_empty() {
            return Ok(children.lookup(id));
        }
        // 空ID可以重复，不进索引
        for &ch in children.as_slice() {
            if self.node(ch)?.id.is_empty() {
                return Ok(Some(ch));
            }
        }
        Ok(None)
    }

    /// 按ID链（文件名开头）查找
    pub fn find_by_chain<S: AsRef<str>>(&self, chain: &[S]) -> Result<Option<NodeId>, TreeError> {
        let mut cur = self.root;
        for id in chain {
            match self.find_child(cur, id.as_ref())? {
                Some(ch) => cur = ch,
                None => return Ok(None),
            }
        }
        Ok(Some(cur))
    }

    /// 子树中所有文本，先序
    pub fn texts_under(&self, id: NodeId) -> Result<Vec<NodeId>, TreeError> {
        let mut r = Vec::new();
        let mut stack = vec![id];
        while let Some(x) = stack.pop() {
            let node = self.node(x)?;
            if node.is_text() {
                r.push(x);
            }
            stack.extend(node.children().iter().rev());
        }
        Ok(r)
    }

    ///// 结构操作 /////

    pub(crate) fn check_unique(
        &self,
        parent: NodeId,
        id: &str,
        except: Option<NodeId>,
    ) -> Result<(), TreeError> {
        if id.is_empty() {
            return Ok(());
        }
        if let Some(existing) = self.find_child(parent, id)? {
            if Some(existing) != except {
                return Err(TreeError::StructuralViolation(format!(
                    "同级节点中已存在ID: {}",
                    id
                )));
            }
        }
        Ok(())
    }

    /// 挂接新节点到末尾，不做唯一性检查
    pub(crate) fn push_child(&mut self, parent: NodeId, node: Node) -> Result<NodeId, TreeError> {
        let pk = self.node(parent)?.kind;
        if !pk.can_hold(node.kind) {
            return Err(TreeError::StructuralViolation(format!(
                "{:?} 不能包含 {:?}",
                pk, node.kind
            )));
        }
        let id = self.nodes.insert(node);
        self.insert_at(parent, id, None)?;
        Ok(id)
    }

    /// 放入子节点序列并修正父句柄与位置缓存
    pub(crate) fn insert_at(&mut self, parent: NodeId, id: NodeId, index: Option<usize>) -> Result<(), TreeError> {
        let name = self.node(id)?.id.clone();
        let p = self.node_mut(parent)?;
        let children = p.children.as_mut().ok_or_else(|| {
            TreeError::StructuralViolation("该节点不能包含子节点".into())
        })?;
        let index = index.unwrap_or(children.len()).min(children.len());
        children.insert(index, id, &name);
        // 追加时只触及新节点本身
        self.recache_from(parent, index)?;
        self.cascade_drop_stats(parent)
    }

    pub fn add_file(&mut self, name: &str, want_modify: Modify) -> Result<NodeId, TreeError> {
        let root = self.root;
        self.check_unique(root, name, None)?;
        let r = self.push_child(root, Node::new_file(name.to_string()))?;
        if want_modify == Modify::Yes {
            self.do_modify(r, Mch::Id)?;
        }
        Ok(r)
    }

    pub fn add_group(
        &mut self,
        parent: NodeId,
        id: &str,
        want_modify: Modify,
    ) -> Result<NodeId, TreeError> {
        self.check_unique(parent, id, None)?;
        let r = self.push_child(parent, Node::new_group(id.to_string()))?;
        if want_modify == Modify::Yes {
            self.do_modify(r, Mch::Id)?;
        }
        Ok(r)
    }

    pub fn add_text(
        &mut self,
        parent: NodeId,
        id: &str,
        original: &str,
        want_modify: Modify,
    ) -> Result<NodeId, TreeError> {
        self.check_unique(parent, id, None)?;
        let r = self.push_child(parent, Node::new_text(id.to_string(), original.to_string()))?;
        if want_modify == Modify::Yes {
            self.do_modify(r, Mch::Id)?;
        }
        Ok(r)
    }

    /// 修正子节点的位置缓存与父句柄
    pub fn recache(&mut self, parent: NodeId) -> Result<(), TreeError> {
        self.recache_from(parent, 0)
    }

    /// 只修正 `start` 及其后的子节点
    pub(crate) fn recache_from(&mut self, parent: NodeId, start: usize) -> Result<(), TreeError> {
        let children = self.node(parent)?.children();
        let tail = children.get(start..).unwrap_or(&[]).to_vec();
        for (i, ch) in tail.into_iter().enumerate() {
            let n = self.node_mut(ch)?;
            n.cache.index = start + i;
            n.parent = Some(parent);
        }
        Ok(())
    }

    /// 整棵子树的修复遍历
    pub fn recursive_recache(&mut self, parent: NodeId) -> Result<(), TreeError> {
        self.recache(parent)?;
        let children = self.node(parent)?.children().to_vec();
        for ch in children {
            self.recursive_recache(ch)?;
        }
        Ok(())
    }

    /// 从父节点摘下，所有权交回调用方；节点保留旧的父句柄
    pub fn extract(&mut self, id: NodeId, want_modify: Modify) -> Result<NodeId, TreeError> {
        let node = self.node(id)?;
        let index = node.cache.index;
        let name = node.id.clone();
        let parent = node.parent.ok_or_else(|| {
            TreeError::StructuralViolation("没有父节点的对象不能摘下".into())
        })?;
        if self.attached_parent(id).is_none() {
            return Err(TreeError::StructuralViolation(format!("节点 {} 已经摘下", id)));
        }
        let p = self.node_mut(parent)?;
        let children = p.children.as_mut().ok_or_else(|| {
            TreeError::InvariantViolation(format!("父节点 {} 没有子节点序列", parent))
        })?;
        if children.get(index) != Some(id) {
            return Err(TreeError::InvariantViolation(format!(
                "节点 {} 的缓存位置 {} 与实际位置不符",
                id, index
            )));
        }
        children.remove(index, &name);
        self.recache_from(parent, index)?;
        self.cascade_drop_stats(parent)?;
        if want_modify == Modify::Yes {
            self.do_modify(parent, Mch::Meta)?;
        }
        tracing::debug!("摘下节点 {} (父节点 {})", id, parent);
        Ok(id)
    }

    /// 把摘下的节点挂接到新父节点
    pub fn attach(
        &mut self,
        id: NodeId,
        parent: NodeId,
        index: Option<usize>,
        want_modify: Modify,
    ) -> Result<(), TreeError> {
        if self.attached_parent(id).is_some() {
            return Err(TreeError::StructuralViolation(format!("节点 {} 仍挂在树上", id)));
        }
        let kind = self.node(id)?.kind;
        let pk = self.node(parent)?.kind;
        if !pk.can_hold(kind) {
            return Err(TreeError::StructuralViolation(format!(
                "{:?} 不能包含 {:?}",
                pk, kind
            )));
        }
        if self.is_in_subtree(parent, id)? {
            return Err(TreeError::StructuralViolation("不能挂接到自身的子树中".into()));
        }
        let name = self.node(id)?.id.clone();
        self.check_unique(parent, &name, None)?;
        self.insert_at(parent, id, index)?;
        if want_modify == Modify::Yes {
            self.do_modify(id, Mch::Meta)?;
        }
        Ok(())
    }

    /// `x` 是否位于以 `root` 为根的子树中（含 root 本身）
    pub fn is_in_subtree(&self, x: NodeId, root: NodeId) -> Result<bool, TreeError> {
        self.nodes.check(x)?;
        self.nodes.check(root)?;
        let mut q = Some(x);
        while let Some(n) = q {
            if n == root {
                return Ok(true);
            }
            q = self.attached_parent(n);
        }
        Ok(false)
    }

    /// 移动到新位置：摘下后挂接
    pub fn move_to(
        &mut self,
        id: NodeId,
        parent: NodeId,
        index: Option<usize>,
        want_modify: Modify,
    ) -> Result<(), TreeError> {
        let kind = self.node(id)?.kind;
        let pk = self.node(parent)?.kind;
        if !pk.can_hold(kind) || self.is_in_subtree(parent, id)? {
            return Err(TreeError::StructuralViolation("无效的移动目标".into()));
        }
        let name = self.node(id)?.id.clone();
        self.check_unique(parent, &name, Some(id))?;
        self.extract(id, Modify::No)?;
        self.attach(id, parent, index, want_modify)
    }

    /// 摘下并释放整棵子树
    pub fn remove(&mut self, id: NodeId, want_modify: Modify) -> Result<(), TreeError> {
        if self.attached_parent(id).is_some() {
            self.extract(id, want_modify)?;
        }
        self.free_subtree(id)
    }

    /// 释放子树的所有槽位，旧句柄随后校验失败
    pub(crate) fn free_subtree(&mut self, id: NodeId) -> Result<(), TreeError> {
        if id == self.root {
            return Err(TreeError::StructuralViolation("不能释放项目根节点".into()));
        }
        let node = self.nodes.remove(id)?;
        for ch in node.children.map(Children::into_vec).unwrap_or_default() {
            self.free_subtree(ch)?;
        }
        Ok(())
    }

    pub fn can_move_up(&self, id: NodeId) -> bool {
        self.attached_parent(id).is_some()
            && self.nodes.get(id).map(|n| n.cache.index > 0).unwrap_or(false)
    }

    pub fn can_move_down(&self, id: NodeId) -> bool {
        match self.attached_parent(id) {
            Some(p) => match (self.nodes.get(id), self.nodes.get(p)) {
                (Ok(n), Ok(pn)) => n.cache.index + 1 < pn.n_children(),
                _ => false,
            },
            None => false,
        }
    }

    pub fn move_up(&mut self, id: NodeId, want_modify: Modify) -> Result<bool, TreeError> {
        self.nodes.check(id)?;
        if !self.can_move_up(id) {
            return Ok(false);
        }
        let index = self.node(id)?.cache.index;
        self.swap_with_next(id, index - 1, want_modify)?;
        Ok(true)
    }

    pub fn move_down(&mut self, id: NodeId, want_modify: Modify) -> Result<bool, TreeError> {
        self.nodes.check(id)?;
        if !self.can_move_down(id) {
            return Ok(false);
        }
        let index = self.node(id)?.cache.index;
        self.swap_with_next(id, index, want_modify)?;
        Ok(true)
    }

    /// 交换 child[index] 与 child[index + 1]
    fn swap_with_next(&mut self, id: NodeId, index: usize, want_modify: Modify) -> Result<(), TreeError> {
        let parent = self
            .attached_parent(id)
            .ok_or_else(|| TreeError::StructuralViolation("节点不在树上".into()))?;
        if let Some(children) = self.node_mut(parent)?.children.as_mut() {
            children.swap(index, index + 1);
        }
        self.recache_from(parent, index)?;
        if want_modify == Modify::Yes {
            self.do_modify(id, Mch::Meta)?;
        }
        Ok(())
    }

    ///// 修改状态 /////

    /// 标记修改通道并通知跟踪器
    pub fn do_modify(&mut self, id: NodeId, ch: Mch) -> Result<(), TreeError> {
        self.node_mut(id)?.cache.modif.set(ch);
        self.modify();
        Ok(())
    }

    pub fn mod_state(&self) -> ModState {
        self.modif.state()
    }

    pub fn is_modified(&self) -> bool {
        self.modif.is_modified()
    }

    pub fn modifiable(&mut self) -> &mut Modifiable {
        &mut self.modif
    }

    pub fn modify(&mut self) -> bool {
        self.modif.modify()
    }

    pub fn temp_modify(&mut self) -> bool {
        self.modif.temp_modify()
    }

    pub fn temp_revert(&mut self) -> bool {
        self.modif.temp_revert()
    }

    /// 保存成功后调用：复位状态并清除所有节点的修改通道
    pub fn unmodify(&mut self, forced: Forced) -> bool {
        let r = self.modif.unmodify();
        if r || forced == Forced::Yes {
            for node in self.nodes.values_mut() {
                node.cache.modif.clear();
            }
        }
        r
    }

    pub fn set_project_type(&mut self, ty: ProjectType) {
        if self.info.ty != ty {
            self.info.ty = ty;
            for node in self.nodes.values_mut() {
                node.cache.stats = None;
            }
            self.modify();
        }
    }

    ///// 字段设置，返回值表示确实发生了变化 /////

    fn translatable_mut(&mut self, id: NodeId) -> Result<Option<&mut Translatable>, TreeError> {
        Ok(self.node_mut(id)?.translatable.as_mut())
    }

    fn after_change(&mut self, id: NodeId, ch: Mch, want_modify: Modify, restat: bool) -> Result<(), TreeError> {
        if restat {
            self.stats(id, StatsMode::Direct, CascadeDropCache::Yes)?;
        }
        if want_modify == Modify::Yes {
            self.do_modify(id, ch)?;
        }
        Ok(())
    }

    pub fn set_id(&mut self, id: NodeId, x: &str, want_modify: Modify) -> Result<bool, TreeError> {
        let node = self.node(id)?;
        if node.kind == ObjType::Project || node.id == x {
            return Ok(false);
        }
        let parent = self.attached_parent(id);
        if let Some(p) = parent {
            self.check_unique(p, x, Some(id))?;
        }
        let old = std::mem::replace(&mut self.node_mut(id)?.id, x.to_string());
        if let Some(p) = parent {
            if let Some(children) = self.node_mut(p)?.children.as_mut() {
                children.rename(id, &old, x);
            }
        }
        self.after_change(id, Mch::Id, want_modify, false)?;
        Ok(true)
    }

    pub fn set_original(&mut self, id: NodeId, x: &str, want_modify: Modify) -> Result<bool, TreeError> {
        match self.translatable_mut(id)? {
            Some(t) if t.original != x => t.original = x.to_string(),
            _ => return Ok(false),
        }
        self.after_change(id, Mch::Orig, want_modify, true)?;
        Ok(true)
    }

    pub fn set_translation(
        &mut self,
        id: NodeId,
        x: Option<&str>,
        want_modify: Modify,
    ) -> Result<bool, TreeError> {
        match self.translatable_mut(id)? {
            Some(t) if t.translation.as_deref() != x => t.translation = x.map(str::to_string),
            _ => return Ok(false),
        }
        self.after_change(id, Mch::Transl, want_modify, true)?;
        Ok(true)
    }

    /// 接受原文变更：清除已知原文
    pub fn remove_known_original(&mut self, id: NodeId, want_modify: Modify) -> Result<bool, TreeError> {
        match self.translatable_mut(id)? {
            Some(t) if t.known_original.is_some() => t.known_original = None,
            _ => return Ok(false),
        }
        self.after_change(id, Mch::Orig, want_modify, true)?;
        Ok(true)
    }

    pub fn set_force_attention(&mut self, id: NodeId, x: bool, want_modify: Modify) -> Result<bool, TreeError> {
        match self.translatable_mut(id)? {
            Some(t) if t.force_attention != x => t.force_attention = x,
            _ => return Ok(false),
        }
        self.after_change(id, Mch::Transl, want_modify, true)?;
        Ok(true)
    }

    pub fn set_authors_comment(&mut self, id: NodeId, x: &str, want_modify: Modify) -> Result<bool, TreeError> {
        let node = self.node_mut(id)?;
        if node.kind == ObjType::Project || node.comments.authors == x {
            return Ok(false);
        }
        node.comments.authors = x.to_string();
        self.after_change(id, Mch::Comment, want_modify, false)?;
        Ok(true)
    }

    pub fn set_translators_comment(&mut self, id: NodeId, x: &str, want_modify: Modify) -> Result<bool, TreeError> {
        let node = self.node_mut(id)?;
        if node.kind == ObjType::Project || node.comments.translators == x {
            return Ok(false);
        }
        node.comments.translators = x.to_string();
        self.after_change(id, Mch::Comment, want_modify, false)?;
        Ok(true)
    }

    pub fn set_importers_comment(&mut self, id: NodeId, x: &str, want_modify: Modify) -> Result<bool, TreeError> {
        let node = self.node_mut(id)?;
        if node.kind == ObjType::Project || node.comments.importers == x {
            return Ok(false);
        }
        node.comments.importers = x.to_string();
        self.after_change(id, Mch::Comment, want_modify, false)?;
        Ok(true)
    }

    pub fn set_idless(&mut self, id: NodeId, x: bool, want_modify: Modify) -> Result<bool, TreeError> {
        match self.node_mut(id)?.file_info.as_mut() {
            Some(fi) if fi.idless != x => fi.idless = x,
            _ => return Ok(false),
        }
        self.after_change(id, Mch::Orig, want_modify, false)?;
        Ok(true)
    }

    pub fn set_sync(&mut self, id: NodeId, x: Option<SyncInfo>, want_modify: Modify) -> Result<bool, TreeError> {
        let node = self.node_mut(id)?;
        if !node.kind.is_group_like() || node.sync == x {
            return Ok(false);
        }
        node.sync = x;
        self.after_change(id, Mch::Meta, want_modify, false)?;
        Ok(true)
    }

    pub fn set_format(
        &mut self,
        id: NodeId,
        x: Option<crate::model::node::FormatDescriptor>,
        want_modify: Modify,
    ) -> Result<bool, TreeError> {
        match self.node_mut(id)?.file_info.as_mut() {
            Some(fi) if fi.format != x => fi.format = x,
            _ => return Ok(false),
        }
        self.after_change(id, Mch::Meta, want_modify, false)?;
        Ok(true)
    }

    /// 设置展开状态（界面簿记，不算修改）
    pub fn set_expand_state(&mut self, id: NodeId, x: crate::model::node::ExpandState) -> Result<(), TreeError> {
        self.node_mut(id)?.cache.expand = x;
        Ok(())
    }

    ///// 遍历 /////

    /// 先收集事件再逐个派发，监听器可以修改树
    pub fn traverse(
        &mut self,
        start: NodeId,
        listener: &mut dyn TraverseListener,
        enter_me: EnterMe,
    ) -> Result<(), TreeError> {
        let mut events = Vec::new();
        self.collect_events(start, enter_me, &mut events)?;
        for ev in events {
            match ev {
                Event::Text(t) => listener.on_text(self, t),
                Event::Enter(g) => listener.on_enter_group(self, g),
                Event::Leave(g) => listener.on_leave_group(self, g),
            }
        }
        Ok(())
    }

    fn collect_events(&self, id: NodeId, enter_me: EnterMe, out: &mut Vec<Event>) -> Result<(), TreeError> {
        let node = self.node(id)?;
        if node.is_text() {
            out.push(Event::Text(id));
            return Ok(());
        }
        let is_group = node.kind.is_group_like() && enter_me == EnterMe::Yes;
        if is_group {
            out.push(Event::Enter(id));
        }
        for &ch in node.children() {
            self.collect_events(ch, EnterMe::Yes, out)?;
        }
        if is_group {
            out.push(Event::Leave(id));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Event {
    Text(NodeId),
    Enter(NodeId),
    Leave(NodeId),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Project, NodeId, NodeId) {
        let mut prj = Project::new(ProjectType::Original);
        let file = prj.add_file("vowel.txt", Modify::No).unwrap();
        for (id, orig) in [("A", "Alpha"), ("E", "Echo"), ("I", "India"), ("O", "Oscar")] {
            prj.add_text(file, id, orig, Modify::No).unwrap();
        }
        let group = prj.add_group(file, "Specials", Modify::No).unwrap();
        prj.add_text(group, "Y", "Yankee", Modify::No).unwrap();
        (prj, file, group)
    }

    /// 每个子节点的缓存位置与父句柄都与真实情况一致
    fn assert_index_invariant(prj: &Project, id: NodeId) {
        for (i, &ch) in prj.children(id).unwrap().iter().enumerate() {
            let n = prj.node(ch).unwrap();
            assert_eq!(n.cache().index, i, "节点 {} 的缓存位置错误", n.id());
            assert_eq!(n.parent(), Some(id), "节点 {} 的父句柄错误", n.id());
            assert_index_invariant(prj, ch);
        }
    }

    #[test]
    fn test_add_sets_index_and_parent() {
        let (prj, file, group) = sample();
        assert_index_invariant(&prj, prj.root());
        assert_eq!(prj.children(file).unwrap().len(), 5);
        assert_eq!(prj.node(group).unwrap().cache().index, 4);
        assert_eq!(prj.files(), &[file]);
    }

    #[test]
    fn test_duplicate_sibling_id_rejected() {
        let (mut prj, file, _) = sample();
        let r = prj.add_text(file, "A", "again", Modify::No);
        assert!(matches!(r, Err(TreeError::StructuralViolation(_))));
        assert!(prj.add_file("vowel.txt", Modify::No).is_err());
        // 不同父节点下可以重名
        let g = prj.find_child(file, "Specials").unwrap().unwrap();
        assert!(prj.add_text(g, "A", "Alpha again", Modify::No).is_ok());
    }

    #[test]
    fn test_wrong_parent_kind_rejected() {
        let (mut prj, file, _) = sample();
        let a = prj.find_child(file, "A").unwrap().unwrap();
        assert!(prj.add_text(a, "x", "x", Modify::No).is_err(), "文本不能有子节点");
        let root = prj.root();
        assert!(prj.add_group(root, "g", Modify::No).is_err(), "项目只能包含文件");
    }

    #[test]
    fn test_extract_and_attach_keep_invariant() {
        let (mut prj, file, group) = sample();
        let e = prj.find_child(file, "E").unwrap().unwrap();
        prj.extract(e, Modify::Yes).unwrap();
        assert_index_invariant(&prj, prj.root());
        assert_eq!(prj.children(file).unwrap().len(), 4);
        assert_eq!(prj.attached_parent(e), None, "摘下后不再挂接");
        assert_eq!(prj.node(e).unwrap().parent(), Some(file), "摘下的节点保留旧的父句柄");

        prj.attach(e, group, Some(0), Modify::Yes).unwrap();
        assert_index_invariant(&prj, prj.root());
        assert_eq!(prj.id_chain(e).unwrap(), vec!["vowel.txt", "Specials", "E"]);
        assert!(prj.is_modified());
    }

    #[test]
    fn test_extract_twice_is_structural() {
        let (mut prj, file, _) = sample();
        let e = prj.find_child(file, "E").unwrap().unwrap();
        prj.extract(e, Modify::No).unwrap();
        assert!(matches!(
            prj.extract(e, Modify::No),
            Err(TreeError::StructuralViolation(_))
        ));
        assert_eq!(prj.children(file).unwrap().len(), 4);
    }

    #[test]
    fn test_wide_group_lookup_follows_edits() {
        let mut prj = Project::new(ProjectType::Original);
        let file = prj.add_file("wide.txt", Modify::No).unwrap();
        let n = 20_000;
        for i in 0..n {
            prj.add_text(file, &format!("t{}", i), "x", Modify::No).unwrap();
        }
        let last = prj.find_child(file, &format!("t{}", n - 1)).unwrap().unwrap();
        assert_eq!(prj.node(last).unwrap().cache().index, n - 1);
        assert_index_invariant(&prj, file);

        let mid = prj.find_child(file, "t500").unwrap().unwrap();
        prj.set_id(mid, "renamed", Modify::No).unwrap();
        assert_eq!(prj.find_child(file, "t500").unwrap(), None);
        assert_eq!(prj.find_child(file, "renamed").unwrap(), Some(mid));
        assert!(prj.add_text(file, "t500", "again", Modify::No).is_ok(), "旧ID已释放");

        prj.extract(mid, Modify::No).unwrap();
        assert_eq!(prj.find_child(file, "renamed").unwrap(), None);
        assert_eq!(prj.node(last).unwrap().cache().index, n - 2);
        assert_index_invariant(&prj, file);

        // 空ID可以重复
        let a = prj.add_text(file, "", "a", Modify::No).unwrap();
        prj.add_text(file, "", "b", Modify::No).unwrap();
        assert_eq!(prj.find_child(file, "").unwrap(), Some(a));
    }

    #[test]
    fn test_attach_into_own_subtree_rejected() {
        let (mut prj, file, group) = sample();
        let inner = prj.add_group(group, "Inner", Modify::No).unwrap();
        prj.extract(group, Modify::No).unwrap();
        // 摘下后 inner 仍在 group 子树中
        let r = prj.attach(group, inner, None, Modify::No);
        assert!(r.is_err());
        prj.attach(group, file, None, Modify::No).unwrap();
        assert_index_invariant(&prj, prj.root());
    }

    #[test]
    fn test_move_up_down() {
        let (mut prj, file, _) = sample();
        let i = prj.find_child(file, "I").unwrap().unwrap();
        assert!(prj.move_up(i, Modify::Yes).unwrap());
        assert_eq!(prj.node(i).unwrap().cache().index, 1);
        assert!(prj.move_down(i, Modify::Yes).unwrap());
        assert!(prj.move_down(i, Modify::Yes).unwrap());
        assert_eq!(prj.node(i).unwrap().cache().index, 3);
        assert_index_invariant(&prj, prj.root());

        let a = prj.find_child(file, "A").unwrap().unwrap();
        assert!(!prj.move_up(a, Modify::Yes).unwrap(), "第一个节点不能上移");
        assert!(prj.node(i).unwrap().cache().modif.has(Mch::Meta));
    }

    #[test]
    fn test_move_to_other_group() {
        let (mut prj, file, group) = sample();
        let o = prj.find_child(file, "O").unwrap().unwrap();
        prj.move_to(o, group, None, Modify::Yes).unwrap();
        assert_eq!(prj.id_chain(o).unwrap(), vec!["vowel.txt", "Specials", "O"]);
        assert_index_invariant(&prj, prj.root());
        assert!(prj.move_to(group, group, None, Modify::Yes).is_err());
    }

    #[test]
    fn test_removed_node_handle_is_dangling() {
        let (mut prj, file, group) = sample();
        let y = prj.find_child(group, "Y").unwrap().unwrap();
        prj.remove(group, Modify::Yes).unwrap();
        assert!(matches!(prj.node(group), Err(TreeError::DanglingReference(_))));
        assert!(matches!(prj.node(y), Err(TreeError::DanglingReference(_))), "子节点同时释放");
        assert!(matches!(
            prj.set_original(y, "Yak", Modify::Yes),
            Err(TreeError::DanglingReference(_))
        ));
        // 新节点复用槽位后旧句柄仍然失效
        let z = prj.add_text(file, "Z", "Zulu", Modify::No).unwrap();
        assert!(prj.node(z).is_ok());
        assert!(prj.node(y).is_err());
    }

    #[test]
    fn test_setters_report_actual_change() {
        let (mut prj, file, _) = sample();
        let a = prj.find_child(file, "A").unwrap().unwrap();
        assert!(!prj.set_original(a, "Alpha", Modify::Yes).unwrap(), "相同值不算修改");
        assert!(!prj.is_modified());
        assert!(prj.set_original(a, "Alfa", Modify::Yes).unwrap());
        assert!(prj.is_modified());
        assert!(prj.node(a).unwrap().cache().modif.has(Mch::Orig));
        assert!(!prj.set_translation(file, Some("x"), Modify::Yes).unwrap(), "文件没有可翻译值");
        assert!(prj.set_id(a, "AA", Modify::Yes).unwrap());
        assert!(prj.set_id(a, "E", Modify::Yes).is_err(), "重名应失败");
    }

    #[test]
    fn test_unmodify_clears_flags() {
        let (mut prj, file, _) = sample();
        let a = prj.find_child(file, "A").unwrap().unwrap();
        prj.set_translators_comment(a, "note", Modify::Yes).unwrap();
        assert!(prj.node(a).unwrap().cache().modif.has(Mch::Comment));
        assert!(prj.unmodify(Forced::No));
        assert!(prj.node(a).unwrap().cache().modif.is_empty());
        assert_eq!(prj.mod_state(), ModState::Unmodified);
    }

    #[test]
    fn test_forced_unmodify_clears_flags_set_without_notification() {
        let (mut prj, file, _) = sample();
        let a = prj.find_child(file, "A").unwrap().unwrap();
        prj.node_mut(a).unwrap().cache.modif.set(Mch::Id);
        assert!(!prj.unmodify(Forced::No), "状态未变化");
        assert!(prj.node(a).unwrap().cache().modif.has(Mch::Id));
        assert!(!prj.unmodify(Forced::Yes));
        assert!(prj.node(a).unwrap().cache().modif.is_empty(), "强制时仍清除通道");
    }

    #[test]
    fn test_find_by_chain() {
        let (prj, _, group) = sample();
        let y = prj.find_by_chain(&["vowel.txt", "Specials", "Y"]).unwrap().unwrap();
        assert_eq!(prj.attached_parent(y), Some(group));
        assert_eq!(prj.find_by_chain(&["vowel.txt", "nope"]).unwrap(), None);
        assert_eq!(prj.file_of(y), prj.files().first().copied());
    }

    #[test]
    fn test_texts_under_is_preorder() {
        let (prj, file, _) = sample();
        let ids: Vec<String> = prj
            .texts_under(file)
            .unwrap()
            .into_iter()
            .map(|t| prj.node(t).unwrap().id().to_string())
            .collect();
        assert_eq!(ids, vec!["A", "E", "I", "O", "Y"]);
    }

    struct Recorder(Vec<String>);

    impl TraverseListener for Recorder {
        fn on_text(&mut self, prj: &mut Project, text: NodeId) {
            self.0.push(prj.node(text).unwrap().id().to_string());
        }

        fn on_enter_group(&mut self, prj: &mut Project, group: NodeId) {
            self.0.push(format!("<{}", prj.node(group).unwrap().id()));
        }

        fn on_leave_group(&mut self, prj: &mut Project, group: NodeId) {
            self.0.push(format!("{}>", prj.node(group).unwrap().id()));
        }
    }

    #[test]
    fn test_traverse_order() {
        let (mut prj, file, _) = sample();
        let mut rec = Recorder(Vec::new());
        prj.traverse(file, &mut rec, EnterMe::No).unwrap();
        assert_eq!(rec.0, vec!["A", "E", "I", "O", "<Specials", "Y", "Specials>"]);

        let mut rec = Recorder(Vec::new());
        let root = prj.root();
        prj.traverse(root, &mut rec, EnterMe::No).unwrap();
        assert_eq!(rec.0.first().map(String::as_str), Some("<vowel.txt"));
        assert_eq!(rec.0.last().map(String::as_str), Some("vowel.txt>"));
    }
}
