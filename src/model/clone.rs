//! 两阶段克隆
//!
//! `start_cloning` 只做检查，不修改任何东西；调用方确定目标后再 `commit`。
//! 放弃 `PendingClone` 不会留下任何痕迹。

use crate::model::error::{CloneError, TreeError};
use crate::model::guard::NodeId;
use crate::model::ids::IdLib;
use crate::model::node::{Mch, Modify, ObjType};
use crate::model::tree::Project;

/// 已通过检查、等待提交的克隆
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct PendingClone {
    src: NodeId,
    parent: NodeId,
}

impl PendingClone {
    pub fn src(&self) -> NodeId {
        self.src
    }

    pub fn parent(&self) -> NodeId {
        self.parent
    }

    /// 生成ID、深拷贝并挂接到父节点末尾
    ///
    /// `idlib` 为空时原样复制源ID；若与目标父节点下的同级重名则拒绝提交。
    pub fn commit(
        self,
        prj: &mut Project,
        idlib: Option<&IdLib>,
        want_modify: Modify,
    ) -> Result<NodeId, CloneError> {
        // 提交前再次校验：检查与提交之间树可能已被修改
        let kind = check_pair(prj, self.src, self.parent)?;
        let new_id = match idlib {
            Some(lib) => prj.make_id_for(self.parent, kind, lib)?,
            None => prj.node(self.src)?.id().to_string(),
        };
        prj.check_unique(self.parent, &new_id, None)?;
        let copy = copy_subtree(prj, self.src)?;
        prj.node_mut(copy)?.id = new_id;
        prj.insert_at(self.parent, copy, None)?;
        if want_modify == Modify::Yes {
            prj.do_modify(copy, Mch::Meta)?;
        }
        tracing::info!(
            "克隆 {} -> {} (ID: {})",
            self.src,
            copy,
            prj.node(copy)?.id()
        );
        Ok(copy)
    }
}

fn check_pair(prj: &Project, src: NodeId, parent: NodeId) -> Result<ObjType, CloneError> {
    let kind = prj.kind(src)?;
    let pk = prj.kind(parent)?;
    match kind {
        ObjType::File | ObjType::Project => return Err(CloneError::Uncloneable),
        ObjType::Group | ObjType::Text => {}
    }
    if !pk.can_hold(kind) {
        return Err(CloneError::BadParent);
    }
    Ok(kind)
}

/// 深拷贝整棵子树，返回未挂接的新根
fn copy_subtree(prj: &mut Project, src: NodeId) -> Result<NodeId, TreeError> {
    let node = prj.node(src)?;
    let value = node.value_copy();
    let children = node.children().to_vec();
    let copy = prj.nodes.insert(value);
    for ch in children {
        let ch_copy = copy_subtree(prj, ch)?;
        let name = prj.node(ch_copy)?.id().to_string();
        if let Some(v) = prj.node_mut(copy)?.children.as_mut() {
            v.push(ch_copy, &name);
        }
        prj.node_mut(ch_copy)?.parent = Some(copy);
    }
    prj.recache(copy)?;
    Ok(copy)
}

impl Project {
    /// 克隆的第一阶段：检查源对象与目标父节点
    pub fn start_cloning(
        &self,
        src: Option<NodeId>,
        parent: NodeId,
    ) -> Result<PendingClone, CloneError> {
        let src = src.ok_or(CloneError::BadObject)?;
        check_pair(self, src, parent)?;
        Ok(PendingClone { src, parent })
    }

    /// 在原父节点下克隆
    pub fn start_cloning_beside(&self, src: Option<NodeId>) -> Result<PendingClone, CloneError> {
        let src = src.ok_or(CloneError::BadObject)?;
        let parent = self.attached_parent(src).ok_or(CloneError::BadParent)?;
        self.start_cloning(Some(src), parent)
    }
}
