//! 影子树（Shadow Tree）：把项目树压平成只读的行列表，供列表式界面导航

use crate::model::error::TreeError;
use crate::model::guard::NodeId;
use crate::model::node::{AttentionMode, ExpandState, ObjType};
use crate::model::tree::Project;

#[derive(Debug, Clone)]
pub struct TreeRow {
    pub node: NodeId,
    pub kind: ObjType,
    /// 节点ID（文件为文件名）
    pub name: String,
    /// 以 '/' 连接的ID链，用于按路径寻址
    pub path: String,
    /// 子节点数量
    pub children: u32,
    /// 轻量预览：文本为截断的原文，分组为子节点数
    pub preview: String,
    /// 节点深度（文件为0）
    pub depth: u32,
    pub expanded: bool,
    pub visible: bool,
    /// 仅文本有
    pub attention: Option<AttentionMode>,
}

const PREVIEW_CHARS: usize = 32;

fn preview_of(s: &str) -> String {
    let s = s.trim();
    let line = s.lines().next().unwrap_or("");
    if line.chars().count() > PREVIEW_CHARS || line.len() < s.len() {
        let truncated: String = line.chars().take(PREVIEW_CHARS).collect();
        format!("\"{}...\"", truncated)
    } else {
        format!("\"{}\"", line)
    }
}

/// 按先序构建全部行；可见性按展开状态计算
pub fn build_shadow_tree(prj: &Project) -> Result<Vec<TreeRow>, TreeError> {
    fn walk(
        prj: &Project,
        out: &mut Vec<TreeRow>,
        id: NodeId,
        path: &str,
        depth: u32,
    ) -> Result<(), TreeError> {
        let node = prj.node(id)?;
        let path = if path.is_empty() {
            node.id().to_string()
        } else {
            format!("{}/{}", path, node.id())
        };
        let (preview, attention) = match node.translatable() {
            Some(tr) => (preview_of(&tr.original), Some(tr.attention_mode(&prj.info))),
            None => (format!("({} items)", node.n_children()), None),
        };
        out.push(TreeRow {
            node: id,
            kind: node.kind(),
            name: node.id().to_string(),
            path: path.clone(),
            children: node.n_children() as u32,
            preview,
            depth,
            expanded: node.cache().expand == ExpandState::Expanded,
            visible: true,
            attention,
        });
        for &ch in node.children() {
            walk(prj, out, ch, &path, depth + 1)?;
        }
        Ok(())
    }

    let mut out = Vec::with_capacity(prj.n_nodes());
    for &f in prj.files() {
        walk(prj, &mut out, f, "", 0)?;
    }
    update_visibility_by_expansion(&mut out);
    Ok(out)
}

/// 文件总是可见；其余行仅当所有祖先都展开时可见
pub fn update_visibility_by_expansion(rows: &mut [TreeRow]) {
    // open[d]：深度 d 的最近祖先是否可见且展开
    let mut open: Vec<bool> = Vec::new();
    for row in rows.iter_mut() {
        let d = row.depth as usize;
        open.truncate(d);
        row.visible = d == 0 || open.get(d - 1).copied().unwrap_or(false);
        open.push(row.visible && row.expanded);
    }
}

/// 只显示命中的行及其祖先；`hits` 为空时恢复按展开状态的可见性
pub fn show_only(rows: &mut [TreeRow], hits: &[NodeId]) {
    if hits.is_empty() {
        update_visibility_by_expansion(rows);
        return;
    }
    let mut keep = vec![false; rows.len()];
    // ancestors[d]：当前行在深度 d 的祖先行号
    let mut ancestors: Vec<usize> = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        ancestors.truncate(row.depth as usize);
        if hits.contains(&row.node) {
            keep[i] = true;
            for &a in &ancestors {
                keep[a] = true;
            }
        }
        ancestors.push(i);
    }
    for (row, k) in rows.iter_mut().zip(keep) {
        row.visible = k;
    }
}
