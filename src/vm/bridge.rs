//! VM桥接层：视图状态锁
//!
//! 整体重建树（合并、重新加载）会替换节点，界面持有的句柄随之失效。
//! `ViewLock` 在创建时按ID链记下展开状态与当前节点，释放时按ID链找回新节点并恢复。

use std::ops::{Deref, DerefMut};

use crate::model::error::TreeError;
use crate::model::guard::NodeId;
use crate::model::node::ExpandState;
use crate::model::tree::Project;

pub struct ViewLock<'a> {
    prj: &'a mut Project,
    expand: Vec<(Vec<String>, ExpandState)>,
    current: Option<Vec<String>>,
    restored: bool,
}

impl<'a> ViewLock<'a> {
    pub fn new(prj: &'a mut Project, current: Option<NodeId>) -> Result<Self, TreeError> {
        let mut expand = Vec::new();
        let mut stack: Vec<NodeId> = prj.files().iter().rev().copied().collect();
        while let Some(x) = stack.pop() {
            let node = prj.node(x)?;
            if node.is_text() {
                continue;
            }
            let st = node.cache().expand;
            if st != ExpandState::Unknown {
                expand.push((prj.id_chain(x)?, st));
            }
            stack.extend(node.children().iter().rev());
        }
        let current = current.map(|c| prj.id_chain(c)).transpose()?;
        tracing::debug!("视图状态锁: {} 个展开状态", expand.len());
        Ok(Self {
            prj,
            expand,
            current,
            restored: false,
        })
    }

    /// 恢复视图状态，返回当前节点的新句柄（已不存在时为 None）
    pub fn finish(mut self) -> Option<NodeId> {
        self.restore()
    }

    fn restore(&mut self) -> Option<NodeId> {
        self.restored = true;
        for (chain, st) in std::mem::take(&mut self.expand) {
            if let Ok(Some(x)) = self.prj.find_by_chain(&chain) {
                let r = self.prj.set_expand_state(x, st);
                debug_assert!(r.is_ok(), "按ID链找到的节点应当存活");
            }
        }
        let chain = self.current.take()?;
        self.prj.find_by_chain(&chain).ok().flatten()
    }
}

impl Deref for ViewLock<'_> {
    type Target = Project;

    fn deref(&self) -> &Project {
        &*self.prj
    }
}

impl DerefMut for ViewLock<'_> {
    fn deref_mut(&mut self) -> &mut Project {
        &mut *self.prj
    }
}

impl Drop for ViewLock<'_> {
    fn drop(&mut self) {
        if !self.restored {
            self.restore();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::{Modify, ProjectType};

    fn sample() -> (Project, NodeId, NodeId, NodeId) {
        let mut prj = Project::new(ProjectType::Original);
        let f = prj.add_file("a.txt", Modify::No).unwrap();
        let g = prj.add_group(f, "g", Modify::No).unwrap();
        let t = prj.add_text(g, "t", "Text", Modify::No).unwrap();
        prj.set_expand_state(f, ExpandState::Expanded).unwrap();
        prj.set_expand_state(g, ExpandState::AllCollapsed).unwrap();
        (prj, f, g, t)
    }

    /// 模拟整体重建：删除分组再按相同ID重新创建
    fn rebuild(prj: &mut Project, f: NodeId, g: NodeId) -> NodeId {
        prj.remove(g, Modify::No).unwrap();
        let g2 = prj.add_group(f, "g", Modify::No).unwrap();
        prj.add_text(g2, "t", "Text", Modify::No).unwrap();
        g2
    }

    #[test]
    fn test_restore_on_drop() {
        let (mut prj, f, g, t) = sample();
        let g2 = {
            let mut lock = ViewLock::new(&mut prj, Some(t)).unwrap();
            let g2 = rebuild(&mut lock, f, g);
            assert_eq!(lock.node(g2).unwrap().cache().expand, ExpandState::Unknown);
            g2
        };
        assert_eq!(prj.node(g2).unwrap().cache().expand, ExpandState::AllCollapsed);
        assert_eq!(prj.node(f).unwrap().cache().expand, ExpandState::Expanded);
    }

    #[test]
    fn test_finish_returns_new_current() {
        let (mut prj, f, g, t) = sample();
        let mut lock = ViewLock::new(&mut prj, Some(t)).unwrap();
        let g2 = rebuild(&mut lock, f, g);
        let cur = lock.finish().expect("当前节点应能找回");
        assert_ne!(cur, t);
        assert_eq!(prj.attached_parent(cur), Some(g2));
        assert!(prj.node(t).is_err(), "旧句柄已失效");
    }

    #[test]
    fn test_vanished_current() {
        let (mut prj, _, g, t) = sample();
        let mut lock = ViewLock::new(&mut prj, Some(t)).unwrap();
        lock.remove(g, Modify::No).unwrap();
        assert_eq!(lock.finish(), None);
    }
}
