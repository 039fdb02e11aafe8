//! 整个项目范围的变换：提取原文、交换原文与译文、重置已知原文

use crate::model::error::TreeError;
use crate::model::guard::NodeId;
use crate::model::node::{Comments, LangInfo, Mch, Modify, ProjectType};
use crate::model::tree::{EnterMe, Project};
use crate::model::walker::TraverseListener;

/// 提取原文时新原文的来源
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextSource {
    #[default]
    Original,
    /// 有译文时用译文，否则保留原文
    TranslationOrOriginal,
}

/// 原文侧注释的来源
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommentMode {
    #[default]
    Author,
    /// 作者注释为空时取译者注释
    AuthorElseTranslator,
    Translator,
    /// 译者注释非空时取译者注释
    TranslatorElseAuthor,
}

impl CommentMode {
    fn apply(self, c: &mut Comments) {
        match self {
            CommentMode::Author => {}
            CommentMode::AuthorElseTranslator => {
                if c.authors.is_empty() {
                    c.authors = std::mem::take(&mut c.translators);
                }
            }
            CommentMode::Translator => std::mem::swap(&mut c.authors, &mut c.translators),
            CommentMode::TranslatorElseAuthor => {
                if !c.translators.is_empty() {
                    std::mem::swap(&mut c.authors, &mut c.translators);
                }
            }
        }
    }
}

struct Extractor {
    source: TextSource,
    comments: CommentMode,
}

impl Extractor {
    fn process_comments(&self, prj: &mut Project, id: NodeId) {
        if let Ok(node) = prj.node_mut(id) {
            self.comments.apply(&mut node.comments);
            node.comments.remove_transl_channel();
        }
    }
}

impl TraverseListener for Extractor {
    fn on_text(&mut self, prj: &mut Project, text: NodeId) {
        if let Ok(node) = prj.node_mut(text) {
            if let Some(tr) = node.translatable.as_mut() {
                if self.source == TextSource::TranslationOrOriginal {
                    if let Some(t) = tr.translation.take() {
                        tr.original = t;
                    }
                }
                tr.remove_transl_channel();
                tr.reference = None;
                tr.was_changed_today = false;
            }
            node.cache.modif.set(Mch::Orig);
        }
        self.process_comments(prj, text);
    }

    fn on_enter_group(&mut self, prj: &mut Project, group: NodeId) {
        self.process_comments(prj, group);
    }
}

struct Switcher {
    comments: CommentMode,
}

impl TraverseListener for Switcher {
    fn on_text(&mut self, prj: &mut Project, text: NodeId) {
        if let Ok(node) = prj.node_mut(text) {
            if let Some(tr) = node.translatable.as_mut() {
                tr.known_original = None;
                tr.reference = None;
                let t = tr.translation.take().unwrap_or_default();
                tr.translation = Some(std::mem::replace(&mut tr.original, t));
            }
            self.comments.apply(&mut node.comments);
            node.comments.remove_transl_channel();
            node.cache.modif.set(Mch::Orig);
            node.cache.modif.set(Mch::Transl);
        }
    }

    fn on_enter_group(&mut self, prj: &mut Project, group: NodeId) {
        if let Ok(node) = prj.node_mut(group) {
            self.comments.apply(&mut node.comments);
            node.comments.remove_transl_channel();
        }
    }
}

impl Project {
    /// 把翻译项目变成原文项目
    ///
    /// 返回 false 表示本来就是原文项目，什么也没做。
    pub fn extract_original(&mut self, source: TextSource, comments: CommentMode) -> Result<bool, TreeError> {
        if !self.info.is_translation() {
            return Ok(false);
        }
        let root = self.root();
        self.traverse(root, &mut Extractor { source, comments }, EnterMe::No)?;
        if source == TextSource::TranslationOrOriginal {
            self.info.orig = std::mem::take(&mut self.info.transl);
        }
        self.info.transl = LangInfo::default();
        self.info.reference = LangInfo::default();
        self.trash.clear();
        self.fname = None;
        self.set_project_type(ProjectType::Original);
        self.drop_stats_recursive(root)?;
        self.modify();
        tracing::info!("已提取原文 ({:?}, {:?})", source, comments);
        Ok(true)
    }

    /// 原文与译文互换，没有译文的文本换过去后译文为空串
    pub fn switch_original_and_translation(&mut self, comments: CommentMode) -> Result<bool, TreeError> {
        if !self.info.is_translation() {
            return Ok(false);
        }
        let root = self.root();
        self.traverse(root, &mut Switcher { comments }, EnterMe::No)?;
        std::mem::swap(&mut self.info.orig, &mut self.info.transl);
        self.info.reference = LangInfo::default();
        self.trash.clear();
        self.fname = None;
        self.drop_stats_recursive(root)?;
        self.modify();
        tracing::info!("已交换原文与译文");
        Ok(true)
    }

    /// 清除所有已知原文，返回清除的数量
    pub fn reset_known_original(&mut self, want_modify: Modify) -> Result<usize, TreeError> {
        let mut n = 0;
        for t in self.texts_under(self.root())? {
            if self.remove_known_original(t, want_modify)? {
                n += 1;
            }
        }
        tracing::debug!("重置了 {} 个已知原文", n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::stats::{CascadeDropCache, StatsMode};
    use crate::model::sync::OwnershipPolicy;

    fn sample() -> (Project, NodeId, NodeId, NodeId) {
        let mut prj = Project::new(ProjectType::FullTranslation);
        prj.info.orig.lang = "en".into();
        prj.info.transl.lang = "ru".into();
        prj.fname = Some("demo.ut".into());
        let f = prj.add_file("f.txt", Modify::No).unwrap();
        prj.set_authors_comment(f, "file note", Modify::No).unwrap();
        prj.set_translators_comment(f, "заметка", Modify::No).unwrap();
        let a = prj.add_text(f, "a", "Apple", Modify::No).unwrap();
        prj.set_translation(a, Some("Яблоко"), Modify::No).unwrap();
        prj.set_translators_comment(a, "фрукт", Modify::No).unwrap();
        let b = prj.add_text(f, "b", "Banana", Modify::No).unwrap();
        prj.set_authors_comment(b, "yellow", Modify::No).unwrap();
        (prj, f, a, b)
    }

    fn tr(prj: &Project, id: NodeId) -> crate::model::node::Translatable {
        prj.node(id).unwrap().translatable().unwrap().clone()
    }

    #[test]
    fn test_extract_original_keeps_originals() {
        let (mut prj, f, a, b) = sample();
        assert!(prj.extract_original(TextSource::Original, CommentMode::Author).unwrap());
        assert_eq!(prj.info.ty, ProjectType::Original);
        assert_eq!(prj.info.orig.lang, "en");
        assert!(prj.info.transl.lang.is_empty());
        assert!(prj.fname.is_none());
        assert!(prj.is_modified());
        assert_eq!(tr(&prj, a).original, "Apple");
        assert!(tr(&prj, a).translation.is_none());
        let c = prj.node(f).unwrap().comments().unwrap().clone();
        assert_eq!(c.authors, "file note");
        assert!(c.translators.is_empty());
        assert_eq!(prj.node(b).unwrap().comments().unwrap().authors, "yellow");

        assert!(
            !prj.extract_original(TextSource::Original, CommentMode::Author).unwrap(),
            "原文项目不再提取"
        );
    }

    #[test]
    fn test_extract_translation_as_original() {
        let (mut prj, f, a, b) = sample();
        prj.extract_original(TextSource::TranslationOrOriginal, CommentMode::TranslatorElseAuthor)
            .unwrap();
        assert_eq!(prj.info.orig.lang, "ru");
        assert_eq!(tr(&prj, a).original, "Яблоко");
        assert_eq!(tr(&prj, b).original, "Banana", "没有译文时保留原文");
        assert_eq!(prj.node(a).unwrap().comments().unwrap().authors, "фрукт");
        assert_eq!(prj.node(b).unwrap().comments().unwrap().authors, "yellow");
        assert_eq!(prj.node(f).unwrap().comments().unwrap().authors, "заметка");
        let st = prj.stats(prj.root(), StatsMode::Direct, CascadeDropCache::No).unwrap();
        assert_eq!(st.text.n_total(), 2);
        assert_eq!(st.text.n_calm, 2, "原文项目中没有需要关注的文本");
    }

    #[test]
    fn test_comment_modes() {
        let base = Comments {
            importers: String::new(),
            authors: String::new(),
            translators: "tr".into(),
        };
        let mut c = base.clone();
        CommentMode::AuthorElseTranslator.apply(&mut c);
        assert_eq!((c.authors.as_str(), c.translators.as_str()), ("tr", ""));

        let mut c = Comments {
            authors: "au".into(),
            ..base.clone()
        };
        CommentMode::Translator.apply(&mut c);
        assert_eq!((c.authors.as_str(), c.translators.as_str()), ("tr", "au"));

        let mut c = Comments {
            authors: "au".into(),
            translators: String::new(),
            ..base
        };
        CommentMode::TranslatorElseAuthor.apply(&mut c);
        assert_eq!(c.authors, "au", "译者注释为空时保留作者注释");
    }

    #[test]
    fn test_switch_original_and_translation() {
        let (mut prj, _, a, b) = sample();
        assert!(prj.switch_original_and_translation(CommentMode::Author).unwrap());
        assert_eq!(prj.info.ty, ProjectType::FullTranslation);
        assert_eq!((prj.info.orig.lang.as_str(), prj.info.transl.lang.as_str()), ("ru", "en"));
        let ta = tr(&prj, a);
        assert_eq!(ta.original, "Яблоко");
        assert_eq!(ta.translation.as_deref(), Some("Apple"));
        let tb = tr(&prj, b);
        assert_eq!(tb.original, "");
        assert_eq!(tb.translation.as_deref(), Some("Banana"));
        assert!(prj.node(a).unwrap().comments().unwrap().translators.is_empty());
        assert!(prj.fname.is_none());
    }

    #[test]
    fn test_reset_known_original() {
        let (mut prj, f, a, _) = sample();
        prj.update_with(f, OwnershipPolicy::KeepWarn, |l| {
            l.add_text("a", "Green apple", "")?;
            l.add_text("b", "Banana", "")
        })
        .unwrap();
        let a = prj.find_child(f, "a").unwrap().unwrap_or(a);
        assert_eq!(tr(&prj, a).known_original.as_deref(), Some("Apple"));
        prj.unmodify(crate::model::tree::Forced::Yes);

        assert_eq!(prj.reset_known_original(Modify::Yes).unwrap(), 1);
        assert!(tr(&prj, a).known_original.is_none());
        assert!(prj.is_modified());
        assert_eq!(prj.reset_known_original(Modify::Yes).unwrap(), 0);
    }
}
