//! 与导入/导出编解码器之间的接口
//!
//! - `Loader`：导入器向其逐条推送文本，用于构建候选子树
//! - `Importer`：具体格式（核心之外）把同步源喂给 `Loader`
//! - `Walker`：导出器逐条拉取文本，靠层级差重建分组结构
//! - `TraverseListener`：遍历活动树

use std::fs;

use crate::model::error::TreeError;
use crate::model::guard::NodeId;
use crate::model::node::SyncInfo;
use crate::model::tree::Project;

/// 分组路径的起点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathFrom {
    /// 当前分组
    Current,
    /// 候选子树的根
    Root,
}

pub trait Loader {
    /// 在相对当前分组的路径上添加文本，中间分组按需创建，不进入新分组
    fn add_text_at(&mut self, ids: &[&str], original: &str, comment: &str) -> Result<(), TreeError>;

    /// 进入分组，不存在则创建
    fn go_to_group(&mut self, ids: &[&str], from: PathFrom) -> Result<(), TreeError>;

    /// 回到上一层；已在根部时什么也不做
    fn go_up(&mut self);

    fn add_text(&mut self, id: &str, original: &str, comment: &str) -> Result<(), TreeError> {
        self.add_text_at(&[id], original, comment)
    }

    /// 添加分组并进入
    fn add_group(&mut self, id: &str) -> Result<(), TreeError> {
        self.go_to_group(&[id], PathFrom::Current)
    }
}

/// 读取同步源并驱动 `Loader`
pub trait Importer {
    fn do_import(&self, sync: &SyncInfo, loader: &mut dyn Loader) -> Result<(), TreeError>;
}

/// 最简单的格式：每个非空行是一条文本，ID为行号
#[derive(Debug, Clone, Copy, Default)]
pub struct EnumTextImporter;

impl EnumTextImporter {
    pub const PROTO: &'static str = "enum-text";

    pub fn load_str(text: &str, loader: &mut dyn Loader) -> Result<(), TreeError> {
        for (i, line) in text.lines().enumerate() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let id = (i + 1).to_string();
            loader.add_text(&id, line, "")?;
        }
        Ok(())
    }
}

impl Importer for EnumTextImporter {
    fn do_import(&self, sync: &SyncInfo, loader: &mut dyn Loader) -> Result<(), TreeError> {
        if sync.format.proto != Self::PROTO {
            return Err(TreeError::MalformedSource(format!(
                "不支持的格式: {}",
                sync.format.proto
            )));
        }
        let text = fs::read_to_string(&sync.path).map_err(|e| {
            TreeError::MalformedSource(format!("无法读取 {}: {}", sync.path.display(), e))
        })?;
        Self::load_str(&text, loader)
    }
}

/// 导出时的一条文本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextInfo {
    /// 从起点开始的ID链，最后一项是文本自身的ID
    pub ids: Vec<String>,
    /// 与上一条文本共有的分组层数
    pub common_depth: usize,
    pub original: String,
    /// 没有译文时为原文
    pub translation: String,
}

impl TextInfo {
    /// 所在分组的层数
    pub fn depth(&self) -> usize {
        self.ids.len().saturating_sub(1)
    }

    pub fn id(&self) -> &str {
        self.ids.last().map(String::as_str).unwrap_or("")
    }

    pub fn id_chain(&self, separator: char) -> String {
        self.ids.join(separator.to_string().as_str())
    }
}

/// 惰性、有限、只进不退的文本序列
pub trait Walker {
    fn next_text(&mut self) -> Result<Option<TextInfo>, TreeError>;
}

/// 活动树上的 `Walker`
pub struct TreeWalker<'a> {
    prj: &'a Project,
    /// (分组, 下一个子节点位置)
    stack: Vec<(NodeId, usize)>,
    prev_groups: Vec<String>,
}

impl<'a> TreeWalker<'a> {
    pub fn new(prj: &'a Project, start: NodeId) -> Result<Self, TreeError> {
        prj.node(start)?;
        Ok(Self {
            prj,
            stack: vec![(start, 0)],
            prev_groups: Vec::new(),
        })
    }

    fn group_chain(&self) -> Result<Vec<String>, TreeError> {
        let mut r = Vec::with_capacity(self.stack.len());
        for &(g, _) in self.stack.iter().skip(1) {
            r.push(self.prj.node(g)?.id().to_string());
        }
        Ok(r)
    }
}

impl Walker for TreeWalker<'_> {
    fn next_text(&mut self) -> Result<Option<TextInfo>, TreeError> {
        let prj = self.prj;
        loop {
            let Some(top) = self.stack.last_mut() else {
                return Ok(None);
            };
            let children = prj.children(top.0)?;
            let Some(&ch) = children.get(top.1) else {
                self.stack.pop();
                continue;
            };
            top.1 += 1;
            let node = prj.node(ch)?;
            let Some(tr) = node.translatable() else {
                self.stack.push((ch, 0));
                continue;
            };
            let groups = self.group_chain()?;
            let common_depth = groups
                .iter()
                .zip(&self.prev_groups)
                .take_while(|(a, b)| a == b)
                .count();
            let mut ids = groups.clone();
            ids.push(node.id().to_string());
            self.prev_groups = groups;
            return Ok(Some(TextInfo {
                ids,
                common_depth,
                original: tr.original.clone(),
                translation: tr.translation.clone().unwrap_or_else(|| tr.original.clone()),
            }));
        }
    }
}

/// 遍历活动树的监听器，可以在回调中修改树
pub trait TraverseListener {
    fn on_text(&mut self, prj: &mut Project, text: NodeId);

    fn on_enter_group(&mut self, _prj: &mut Project, _group: NodeId) {}

    fn on_leave_group(&mut self, _prj: &mut Project, _group: NodeId) {}
}
