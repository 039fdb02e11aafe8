//! 翻译项目树库
//!
//! 项目 / 文件 / 分组 / 文本 四层树，带统计缓存、两阶段克隆、
//! 按同步源重新导入原文的合并引擎，以及修改状态跟踪

pub mod model;
pub mod utils;
pub mod vm;

// 重新导出主要类型
pub use model::data_core::{AppState, EditorConfig};
pub use model::error::{AppError, CloneError, TreeError};
pub use model::guard::NodeId;
pub use model::sync::{OwnershipPolicy, UpdateInfo};
pub use model::tree::Project;
