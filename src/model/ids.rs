//! 新ID生成：前缀 + 数字 + 后缀

use serde::{Deserialize, Serialize};

use crate::model::error::TreeError;
use crate::model::guard::NodeId;
use crate::model::node::ObjType;
use crate::model::tree::Project;

/// 各类节点的ID前后缀，由配置提供
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdLib {
    pub file_prefix: String,
    pub file_suffix: String,
    pub group_prefix: String,
    pub text_prefix: String,
}

impl Default for IdLib {
    fn default() -> Self {
        Self {
            file_prefix: "file".into(),
            file_suffix: ".txt".into(),
            group_prefix: "group".into(),
            text_prefix: "text".into(),
        }
    }
}

/// 解析 `prefix + 数字 + suffix`，数字部分必须非空且全为十进制数字
fn parse_number(id: &str, prefix: &str, suffix: &str) -> Option<u64> {
    let digits = id.strip_prefix(prefix)?.strip_suffix(suffix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// 在给定兄弟ID集合中生成新ID：最大编号 + 1，没有可解析的兄弟时为 0
pub fn fresh_id<'a>(siblings: impl IntoIterator<Item = &'a str>, prefix: &str, suffix: &str) -> String {
    let next = siblings
        .into_iter()
        .filter_map(|id| parse_number(id, prefix, suffix))
        .max()
        .map_or(0, |n| n.saturating_add(1));
    format!("{}{}{}", prefix, next, suffix)
}

impl Project {
    /// 为 `parent` 的新子节点生成ID
    pub fn make_id(&self, parent: NodeId, prefix: &str, suffix: &str) -> Result<String, TreeError> {
        let mut siblings = Vec::new();
        for &ch in self.children(parent)? {
            siblings.push(self.node(ch)?.id());
        }
        Ok(fresh_id(siblings, prefix, suffix))
    }

    /// 无ID文件中的文本得到空ID
    pub fn make_text_id(&self, parent: NodeId, idlib: &IdLib) -> Result<String, TreeError> {
        self.nodes.check(parent)?;
        let idless = self
            .file_of(parent)
            .and_then(|f| self.node(f).ok())
            .and_then(|f| f.file_info())
            .is_some_and(|fi| fi.idless);
        if idless {
            Ok(String::new())
        } else {
            self.make_id(parent, &idlib.text_prefix, "")
        }
    }

    /// 按节点类型选择前后缀
    pub fn make_id_for(&self, parent: NodeId, kind: ObjType, idlib: &IdLib) -> Result<String, TreeError> {
        match kind {
            ObjType::File => self.make_id(parent, &idlib.file_prefix, &idlib.file_suffix),
            ObjType::Group => self.make_id(parent, &idlib.group_prefix, ""),
            ObjType::Text => self.make_text_id(parent, idlib),
            ObjType::Project => Err(TreeError::StructuralViolation("项目节点没有ID".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::{Modify, ProjectType};

    #[test]
    fn test_fresh_id_takes_max_plus_one() {
        let ids = ["text1", "text7", "text3", "other", "text", "text2x"];
        assert_eq!(fresh_id(ids, "text", ""), "text8");
    }

    #[test]
    fn test_fresh_id_without_parsable_siblings() {
        assert_eq!(fresh_id([], "group", ""), "group0");
        assert_eq!(fresh_id(["alpha", "beta"], "group", ""), "group0");
    }

    #[test]
    fn test_fresh_id_with_suffix() {
        let ids = ["file0.txt", "file4.txt", "file9.ini"];
        assert_eq!(fresh_id(ids, "file", ".txt"), "file5.txt");
    }

    #[test]
    fn test_make_id_on_project() {
        let mut prj = Project::new(ProjectType::Original);
        let lib = IdLib::default();
        let root = prj.root();
        let name = prj.make_id_for(root, ObjType::File, &lib).unwrap();
        assert_eq!(name, "file0.txt");
        let f = prj.add_file(&name, Modify::No).unwrap();
        assert_eq!(prj.make_id_for(root, ObjType::File, &lib).unwrap(), "file1.txt");

        prj.add_text(f, "text5", "five", Modify::No).unwrap();
        assert_eq!(prj.make_id_for(f, ObjType::Text, &lib).unwrap(), "text6");
        assert_eq!(prj.make_id_for(f, ObjType::Group, &lib).unwrap(), "group0");
    }

    #[test]
    fn test_idless_file_gives_empty_text_id() {
        let mut prj = Project::new(ProjectType::Original);
        let lib = IdLib::default();
        let f = prj.add_file("strings.txt", Modify::No).unwrap();
        let g = prj.add_group(f, "g", Modify::No).unwrap();
        prj.set_idless(f, true, Modify::No).unwrap();
        assert_eq!(prj.make_id_for(g, ObjType::Text, &lib).unwrap(), "");
        assert_eq!(prj.make_id_for(g, ObjType::Group, &lib).unwrap(), "group0", "分组仍有ID");
    }
}
