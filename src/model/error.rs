//! 错误分类：树结构错误、克隆错误、应用层错误

use thiserror::Error;

use crate::model::guard::NodeId;

/// 树操作错误
///
/// `DanglingReference` 与 `InvariantViolation` 属于不可恢复的错误，
/// 出现时当前操作中止，树保持最后一次一致的状态。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("悬空引用: 节点 {0} 已被销毁")]
    DanglingReference(NodeId),
    #[error("结构错误: {0}")]
    StructuralViolation(String),
    #[error("源数据错误: {0}")]
    MalformedSource(String),
    #[error("内部一致性错误: {0}")]
    InvariantViolation(String),
}

/// 两阶段克隆的失败原因，调用方应将其作为正常结果处理（禁用菜单项、提示等）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloneError {
    #[error("该对象不可克隆")]
    Uncloneable,
    #[error("目标父节点不能容纳该对象")]
    BadParent,
    #[error("未选择对象")]
    BadObject,
    #[error(transparent)]
    Tree(#[from] TreeError),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON解析失败: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("XML错误: {0}")]
    Xml(String),
    #[error("项目文件格式错误: {0}")]
    Format(String),
    #[error("状态错误: {0}")]
    State(String),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Clone(#[from] CloneError),
}
