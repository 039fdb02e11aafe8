//! 节点：项目 / 文件 / 分组 / 文本
//!
//! 不使用继承层次，所有节点是同一个结构体，由可选组件组合而成：
//! 子节点序列（项目、文件、分组）、可翻译值（文本）、文件信息（文件）、同步源（文件、分组）。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::guard::NodeId;
use crate::model::stats::Stats;
use crate::model::sync::OwnershipPolicy;

/// 节点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjType {
    Project,
    File,
    Group,
    Text,
}

impl ObjType {
    /// 文件或分组（可容纳文本与分组）
    pub fn is_group_like(self) -> bool {
        matches!(self, ObjType::File | ObjType::Group)
    }

    /// 该类型的节点能否作为 `child` 类型节点的父节点
    pub fn can_hold(self, child: ObjType) -> bool {
        match self {
            ObjType::Project => child == ObjType::File,
            ObjType::File | ObjType::Group => matches!(child, ObjType::Group | ObjType::Text),
            ObjType::Text => false,
        }
    }
}

/// 修改通道，仅用于界面高亮
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mch {
    Meta = 1,
    Id = 2,
    Orig = 4,
    Transl = 8,
    Comment = 16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModFlags(u8);

impl ModFlags {
    pub fn clear(&mut self) {
        self.0 = 0;
    }

    pub fn set(&mut self, ch: Mch) {
        self.0 |= ch as u8;
    }

    pub fn has(self, ch: Mch) -> bool {
        self.0 & ch as u8 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// 树视图中的展开状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExpandState {
    /// 自身及所有层级子节点均折叠
    AllCollapsed,
    Collapsed,
    #[default]
    Unknown,
    Expanded,
}

#[derive(Debug, Clone, Default)]
pub struct Cache {
    /// 在父节点中的位置，结构变更后由 recache 修正
    pub index: usize,
    pub modif: ModFlags,
    /// `None` 表示需要重新计算
    pub stats: Option<Stats>,
    pub expand: ExpandState,
}

/// 是否通知修改状态跟踪器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modify {
    No,
    Yes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comments {
    /// 导入器提供，只读
    pub importers: String,
    /// 原文侧可编辑
    pub authors: String,
    /// 译文侧可编辑
    pub translators: String,
}

impl Comments {
    /// 作者注释优先，否则为导入器注释
    pub fn importers_or_authors(&self) -> &str {
        if self.authors.is_empty() {
            &self.importers
        } else {
            &self.authors
        }
    }

    /// 仅当没有作者注释时导入器注释才可见
    pub fn importers_if_visible(&self) -> &str {
        if self.authors.is_empty() {
            &self.importers
        } else {
            ""
        }
    }

    pub fn remove_transl_channel(&mut self) {
        self.translators.clear();
    }
}

/// 关注级别，全序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttentionMode {
    /// 补丁翻译中未触及的文本
    Background,
    Calm,
    /// 用户手动标记
    UserAttention,
    /// 未翻译或原文已改变
    AutoProblem,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ProjectType {
    #[default]
    Original,
    FullTranslation,
    PatchTranslation,
}

impl ProjectType {
    pub const ALL: [ProjectType; 3] = [
        ProjectType::Original,
        ProjectType::FullTranslation,
        ProjectType::PatchTranslation,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            ProjectType::Original => "original",
            ProjectType::FullTranslation => "full-transl",
            ProjectType::PatchTranslation => "patch-transl",
        }
    }

    pub fn from_tag(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.tag() == s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LangInfo {
    pub lang: String,
    pub path: Option<PathBuf>,
}

/// 项目级信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrjInfo {
    pub ty: ProjectType,
    pub orig: LangInfo,
    pub transl: LangInfo,
    pub reference: LangInfo,
}

impl PrjInfo {
    pub fn is_translation(&self) -> bool {
        self.ty != ProjectType::Original
    }

    pub fn is_full_translation(&self) -> bool {
        self.ty == ProjectType::FullTranslation
    }

    pub fn can_edit_original(&self) -> bool {
        !self.is_translation()
    }

    pub fn can_have_reference(&self) -> bool {
        self.is_translation() && !self.reference.lang.is_empty()
    }
}

/// 可翻译值：原文、已知原文、参考译文、译文
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Translatable {
    pub original: String,
    /// 翻译时的旧原文，仅由合并引擎设置；从不等于 original
    pub known_original: Option<String>,
    pub reference: Option<String>,
    pub translation: Option<String>,
    pub force_attention: bool,
    pub was_changed_today: bool,
}

/// 码位统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpInfo {
    pub n_cps_orig: usize,
    pub n_cps_transl: usize,
}

impl Translatable {
    pub fn new(original: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            ..Self::default()
        }
    }

    pub fn translation_str(&self) -> &str {
        self.translation.as_deref().unwrap_or("")
    }

    /// 不考虑用户标记的关注级别
    pub fn base_attention_mode(&self, info: &PrjInfo) -> AttentionMode {
        if !info.is_translation() {
            return AttentionMode::Calm;
        }
        if self.known_original.is_some() {
            return AttentionMode::AutoProblem;
        }
        if self.translation.is_none() {
            return if info.is_full_translation() {
                AttentionMode::AutoProblem
            } else {
                AttentionMode::Background
            };
        }
        AttentionMode::Calm
    }

    pub fn attention_mode(&self, info: &PrjInfo) -> AttentionMode {
        let r = self.base_attention_mode(info);
        if self.force_attention {
            r.max(AttentionMode::UserAttention)
        } else {
            r
        }
    }

    pub fn cp_info(&self, info: &PrjInfo) -> CpInfo {
        CpInfo {
            n_cps_orig: self.original.chars().count(),
            n_cps_transl: match &self.translation {
                Some(t) if info.is_translation() => t.chars().count(),
                _ => 0,
            },
        }
    }

    pub fn remove_transl_channel(&mut self) {
        self.known_original = None;
        self.translation = None;
    }
}

/// 文件格式描述，对核心不透明
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub proto: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl FormatDescriptor {
    pub fn new(proto: impl Into<String>) -> Self {
        Self {
            proto: proto.into(),
            params: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileInfo {
    pub format: Option<FormatDescriptor>,
    /// 格式不需要ID时，文本不生成ID
    pub idless: bool,
}

/// 同步源：外部文件定期重新提供原文
#[derive(Debug, Clone, PartialEq)]
pub struct SyncInfo {
    pub format: FormatDescriptor,
    pub path: PathBuf,
    pub policy: OwnershipPolicy,
}

/// 子节点序列，附带非空ID到子节点的索引
///
/// 同级的非空ID唯一，所以索引与序列一一对应；空ID只在序列中。
#[derive(Debug, Clone, Default)]
pub(crate) struct Children {
    seq: Vec<NodeId>,
    by_id: HashMap<String, NodeId>,
}

impl Children {
    pub(crate) fn as_slice(&self) -> &[NodeId] {
        &self.seq
    }

    pub(crate) fn len(&self) -> usize {
        self.seq.len()
    }

    pub(crate) fn get(&self, index: usize) -> Option<NodeId> {
        self.seq.get(index).copied()
    }

    pub(crate) fn lookup(&self, id: &str) -> Option<NodeId> {
        self.by_id.get(id).copied()
    }

    pub(crate) fn insert(&mut self, index: usize, child: NodeId, id: &str) {
        self.seq.insert(index, child);
        if !id.is_empty() {
            self.by_id.entry(id.to_string()).or_insert(child);
        }
    }

    pub(crate) fn push(&mut self, child: NodeId, id: &str) {
        self.insert(self.seq.len(), child, id);
    }

    pub(crate) fn remove(&mut self, index: usize, id: &str) -> NodeId {
        let child = self.seq.remove(index);
        if self.by_id.get(id) == Some(&child) {
            self.by_id.remove(id);
        }
        child
    }

    pub(crate) fn rename(&mut self, child: NodeId, old: &str, new: &str) {
        if self.by_id.get(old) == Some(&child) {
            self.by_id.remove(old);
        }
        if !new.is_empty() {
            self.by_id.entry(new.to_string()).or_insert(child);
        }
    }

    pub(crate) fn swap(&mut self, a: usize, b: usize) {
        self.seq.swap(a, b);
    }

    pub(crate) fn into_vec(self) -> Vec<NodeId> {
        self.seq
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) kind: ObjType,
    pub(crate) id: String,
    pub(crate) comments: Comments,
    pub(crate) translatable: Option<Translatable>,
    pub(crate) children: Option<Children>,
    pub(crate) file_info: Option<FileInfo>,
    pub(crate) sync: Option<SyncInfo>,
    /// 非拥有的父节点引用；摘下的节点保留旧值，直到重新挂接或释放
    pub(crate) parent: Option<NodeId>,
    pub(crate) cache: Cache,
}

impl Node {
    fn bare(kind: ObjType, id: String) -> Self {
        Self {
            kind,
            id,
            comments: Comments::default(),
            translatable: None,
            children: None,
            file_info: None,
            sync: None,
            parent: None,
            cache: Cache::default(),
        }
    }

    pub(crate) fn new_project() -> Self {
        Self {
            children: Some(Children::default()),
            ..Self::bare(ObjType::Project, String::new())
        }
    }

    pub(crate) fn new_file(name: String) -> Self {
        Self {
            children: Some(Children::default()),
            file_info: Some(FileInfo::default()),
            ..Self::bare(ObjType::File, name)
        }
    }

    pub(crate) fn new_group(id: String) -> Self {
        Self {
            children: Some(Children::default()),
            ..Self::bare(ObjType::Group, id)
        }
    }

    pub(crate) fn new_text(id: String, original: String) -> Self {
        Self {
            translatable: Some(Translatable::new(original)),
            ..Self::bare(ObjType::Text, id)
        }
    }

    /// 深拷贝值组件，不复制子节点、父节点与缓存
    pub(crate) fn value_copy(&self) -> Self {
        Self {
            comments: self.comments.clone(),
            translatable: self.translatable.clone(),
            children: self.children.as_ref().map(|_| Children::default()),
            file_info: self.file_info.clone(),
            sync: self.sync.clone(),
            ..Self::bare(self.kind, self.id.clone())
        }
    }

    pub fn kind(&self) -> ObjType {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// 项目节点没有注释
    pub fn comments(&self) -> Option<&Comments> {
        (self.kind != ObjType::Project).then_some(&self.comments)
    }

    pub fn translatable(&self) -> Option<&Translatable> {
        self.translatable.as_ref()
    }

    pub fn children(&self) -> &[NodeId] {
        self.children.as_ref().map(Children::as_slice).unwrap_or(&[])
    }

    pub fn n_children(&self) -> usize {
        self.children().len()
    }

    pub fn file_info(&self) -> Option<&FileInfo> {
        self.file_info.as_ref()
    }

    pub fn sync(&self) -> Option<&SyncInfo> {
        self.sync.as_ref()
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn is_text(&self) -> bool {
        self.kind == ObjType::Text
    }
}
