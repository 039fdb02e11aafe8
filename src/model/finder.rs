//! 搜索：按条件在活动树中查找文本与分组

use crate::model::error::TreeError;
use crate::model::guard::NodeId;
use crate::model::node::{AttentionMode, Node, PrjInfo};
use crate::model::tree::{EnterMe, Project};
use crate::model::walker::TraverseListener;

/// 子串搜索的通道
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindChannels {
    pub id: bool,
    pub original: bool,
    pub authors_comment: bool,
    pub translation: bool,
    pub translators_comment: bool,
}

impl FindChannels {
    pub fn all() -> Self {
        Self {
            id: true,
            original: true,
            authors_comment: true,
            translation: true,
            translators_comment: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindCriterion {
    Substring {
        needle: String,
        channels: FindChannels,
        match_case: bool,
    },
    /// 基础关注级别不低于 UserAttention
    Warning,
    /// 原文与译文行数不同
    MismatchLines,
    ChangedOrUntranslated,
    /// 已翻译但原文已改变
    ChangedOnly,
    Untranslated,
    ForcedAttention,
    /// 今天改过且需要关注
    ChangedToday,
    CommentedByAuthor,
    CommentedByTranslator,
}

fn n_lines(s: &str) -> usize {
    s.matches('\n').count()
}

fn contains(hay: &str, needle: &str, match_case: bool) -> bool {
    if match_case {
        hay.contains(needle)
    } else {
        hay.to_lowercase().contains(&needle.to_lowercase())
    }
}

impl FindCriterion {
    pub fn substring(needle: impl Into<String>) -> Self {
        FindCriterion::Substring {
            needle: needle.into(),
            channels: FindChannels::all(),
            match_case: false,
        }
    }

    fn match_substring(node: &Node, needle: &str, ch: &FindChannels, match_case: bool) -> bool {
        if needle.is_empty() {
            return false;
        }
        let hit = |s: &str| contains(s, needle, match_case);
        if ch.id && hit(node.id()) {
            return true;
        }
        if let Some(c) = node.comments() {
            if ch.authors_comment && hit(c.importers_or_authors()) {
                return true;
            }
            if ch.translators_comment && hit(&c.translators) {
                return true;
            }
        }
        if let Some(tr) = node.translatable() {
            if ch.original && hit(&tr.original) {
                return true;
            }
            if ch.translation && tr.translation.as_deref().is_some_and(hit) {
                return true;
            }
        }
        false
    }

    pub fn match_text(&self, node: &Node, info: &PrjInfo) -> bool {
        let Some(tr) = node.translatable() else {
            return false;
        };
        let base = tr.base_attention_mode(info);
        match self {
            FindCriterion::Substring {
                needle,
                channels,
                match_case,
            } => Self::match_substring(node, needle, channels, *match_case),
            FindCriterion::Warning => base >= AttentionMode::UserAttention,
            FindCriterion::MismatchLines => tr
                .translation
                .as_deref()
                .is_some_and(|t| n_lines(&tr.original) != n_lines(t)),
            FindCriterion::ChangedOrUntranslated => base == AttentionMode::AutoProblem,
            FindCriterion::ChangedOnly => {
                tr.translation.is_some() && base == AttentionMode::AutoProblem
            }
            FindCriterion::Untranslated => tr.translation.is_none(),
            FindCriterion::ForcedAttention => tr.force_attention,
            FindCriterion::ChangedToday => {
                tr.was_changed_today && base == AttentionMode::AutoProblem
            }
            FindCriterion::CommentedByAuthor => !node.comments.authors.is_empty(),
            FindCriterion::CommentedByTranslator => !node.comments.translators.is_empty(),
        }
    }

    pub fn match_group(&self, node: &Node) -> bool {
        match self {
            FindCriterion::Substring {
                needle,
                channels,
                match_case,
            } => Self::match_substring(node, needle, channels, *match_case),
            FindCriterion::CommentedByAuthor => !node.comments.authors.is_empty(),
            FindCriterion::CommentedByTranslator => !node.comments.translators.is_empty(),
            _ => false,
        }
    }
}

/// 搜索监听器，按遍历顺序收集结果
pub struct Finder<'a> {
    crit: &'a FindCriterion,
    results: Vec<NodeId>,
}

impl<'a> Finder<'a> {
    pub fn new(crit: &'a FindCriterion) -> Self {
        Self {
            crit,
            results: Vec::new(),
        }
    }

    pub fn into_results(self) -> Vec<NodeId> {
        self.results
    }
}

impl TraverseListener for Finder<'_> {
    fn on_text(&mut self, prj: &mut Project, text: NodeId) {
        if let Ok(node) = prj.node(text) {
            if self.crit.match_text(node, &prj.info) {
                self.results.push(text);
            }
        }
    }

    fn on_enter_group(&mut self, prj: &mut Project, group: NodeId) {
        if let Ok(node) = prj.node(group) {
            if self.crit.match_group(node) {
                self.results.push(group);
            }
        }
    }
}

impl Project {
    /// 在整个项目中搜索
    pub fn find_all(&mut self, crit: &FindCriterion) -> Result<Vec<NodeId>, TreeError> {
        let mut finder = Finder::new(crit);
        let root = self.root();
        self.traverse(root, &mut finder, EnterMe::No)?;
        let r = finder.into_results();
        tracing::debug!("搜索 {:?}: {} 个结果", crit, r.len());
        Ok(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::{Modify, ProjectType};

    fn sample() -> (Project, Vec<NodeId>) {
        let mut prj = Project::new(ProjectType::FullTranslation);
        let f = prj.add_file("f.txt", Modify::No).unwrap();
        let g = prj.add_group(f, "Dialogs", Modify::No).unwrap();
        prj.set_authors_comment(g, "modal windows", Modify::No).unwrap();
        let a = prj.add_text(g, "open", "Open file", Modify::No).unwrap();
        prj.set_translation(a, Some("Открыть файл"), Modify::No).unwrap();
        let b = prj.add_text(g, "multi", "Line one\nLine two", Modify::No).unwrap();
        prj.set_translation(b, Some("Строка"), Modify::No).unwrap();
        prj.set_force_attention(b, true, Modify::No).unwrap();
        let c = prj.add_text(f, "close", "Close FILE", Modify::No).unwrap();
        prj.set_translators_comment(c, "imperative", Modify::No).unwrap();
        (prj, vec![g, a, b, c])
    }

    #[test]
    fn test_substring_case() {
        let (mut prj, ids) = sample();
        let r = prj.find_all(&FindCriterion::substring("file")).unwrap();
        assert_eq!(r, vec![ids[1], ids[3]]);
        let exact = FindCriterion::Substring {
            needle: "file".into(),
            channels: FindChannels::all(),
            match_case: true,
        };
        assert_eq!(prj.find_all(&exact).unwrap(), vec![ids[1]]);
    }

    #[test]
    fn test_substring_channels() {
        let (mut prj, ids) = sample();
        let crit = FindCriterion::Substring {
            needle: "файл".into(),
            channels: FindChannels {
                original: true,
                ..FindChannels::default()
            },
            match_case: false,
        };
        assert!(prj.find_all(&crit).unwrap().is_empty(), "译文通道未选");
        let r = prj.find_all(&FindCriterion::substring("modal")).unwrap();
        assert_eq!(r, vec![ids[0]], "分组按注释命中");
    }

    #[test]
    fn test_status_criteria() {
        let (mut prj, ids) = sample();
        assert_eq!(prj.find_all(&FindCriterion::Untranslated).unwrap(), vec![ids[3]]);
        assert_eq!(prj.find_all(&FindCriterion::MismatchLines).unwrap(), vec![ids[2]]);
        assert_eq!(prj.find_all(&FindCriterion::ForcedAttention).unwrap(), vec![ids[2]]);
        assert_eq!(
            prj.find_all(&FindCriterion::ChangedOrUntranslated).unwrap(),
            vec![ids[3]]
        );
        assert_eq!(
            prj.find_all(&FindCriterion::Warning).unwrap(),
            vec![ids[3]],
            "基础级别不考虑手动标记"
        );
        assert!(prj.find_all(&FindCriterion::ChangedOnly).unwrap().is_empty());
        assert_eq!(
            prj.find_all(&FindCriterion::CommentedByTranslator).unwrap(),
            vec![ids[3]]
        );
        assert_eq!(prj.find_all(&FindCriterion::CommentedByAuthor).unwrap(), vec![ids[0]]);
    }

    #[test]
    fn test_changed_today_after_merge() {
        let (mut prj, ids) = sample();
        let g = ids[0];
        prj.update_with(g, crate::model::sync::OwnershipPolicy::KeepWarn, |l| {
            l.add_text("open", "Open a file", "")?;
            l.add_text("multi", "Line one\nLine two", "")
        })
        .unwrap();
        let r = prj.find_all(&FindCriterion::ChangedToday).unwrap();
        assert_eq!(r.len(), 1);
        assert_eq!(prj.id_chain(r[0]).unwrap(), vec!["f.txt", "Dialogs", "open"]);
        assert_eq!(prj.find_all(&FindCriterion::ChangedOnly).unwrap(), r);
    }
}
