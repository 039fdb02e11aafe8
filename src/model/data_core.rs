//! AppState：应用核心状态，组织加载、保存、搜索与编辑操作

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::error::{AppError, CloneError};
use crate::model::finder::FindCriterion;
use crate::model::guard::NodeId;
use crate::model::ids::IdLib;
use crate::model::node::{ExpandState, FormatDescriptor, Modify, SyncInfo};
use crate::model::shadow_tree::{build_shadow_tree, show_only, update_visibility_by_expansion, TreeRow};
use crate::model::stats::{BigStats, CascadeDropCache, Stats, StatsMode};
use crate::model::sync::{OwnershipPolicy, UpdateInfo};
use crate::model::tree::{Forced, Project};
use crate::model::walker::{EnumTextImporter, Importer, TreeWalker, Walker};
use crate::utils::fs::{read_project_file, write_project_file};
use crate::vm::bridge::ViewLock;

/// 编辑器配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub id_lib: IdLib,
    /// 新建同步源时的默认原文归属策略
    pub default_policy: OwnershipPolicy,
}

#[derive(Debug, Default)]
pub struct AppState {
    pub config: EditorConfig,
    pub source_path: Option<PathBuf>,
    pub project: Option<Project>,
    pub tree_flat: Vec<TreeRow>,
}

impl AppState {
    pub fn with_config(config: EditorConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn project(&self) -> Result<&Project, AppError> {
        self.project
            .as_ref()
            .ok_or_else(|| AppError::State("项目尚未加载".into()))
    }

    pub fn project_mut(&mut self) -> Result<&mut Project, AppError> {
        self.project
            .as_mut()
            .ok_or_else(|| AppError::State("项目尚未加载".into()))
    }

    /// 加载项目文件并构建影子树
    pub fn load_file(&mut self, p: &Path) -> Result<(), AppError> {
        let prj = read_project_file(p)?;
        self.tree_flat = build_shadow_tree(&prj)?;
        tracing::info!("已加载 {} ({} 个节点)", p.display(), prj.n_nodes());
        self.source_path = Some(p.to_path_buf());
        self.project = Some(prj);
        Ok(())
    }

    /// 保存到指定路径，成功后复位修改状态
    pub fn save_to_file(&mut self, path: &Path) -> Result<(), AppError> {
        let prj = self.project_mut()?;
        write_project_file(path, prj)?;
        prj.fname = Some(path.to_path_buf());
        prj.unmodify(Forced::No);
        tracing::info!("项目已保存到: {}", path.display());
        Ok(())
    }

    /// 保存到项目自己的文件名
    pub fn save_to_original_file(&mut self) -> Result<(), AppError> {
        let path = self
            .project()?
            .fname
            .clone()
            .or_else(|| self.source_path.clone())
            .ok_or_else(|| AppError::State("项目文件路径未设置".into()))?;
        self.save_to_file(&path)
    }

    pub fn rebuild_rows(&mut self) -> Result<(), AppError> {
        let rows = build_shadow_tree(self.project()?)?;
        self.tree_flat = rows;
        Ok(())
    }

    /// 整个项目的统计
    pub fn stats(&mut self) -> Result<(Stats, BigStats), AppError> {
        let prj = self.project_mut()?;
        let root = prj.root();
        let st = prj.stats(root, StatsMode::Cached, CascadeDropCache::No)?;
        let big = prj.big_stats(root)?;
        Ok((st, big))
    }

    /// 搜索并只显示命中的行，返回命中的ID链
    pub fn search(&mut self, crit: &FindCriterion) -> Result<Vec<Vec<String>>, AppError> {
        let prj = self.project_mut()?;
        let hits = prj.find_all(crit)?;
        let chains = hits
            .iter()
            .map(|&h| prj.id_chain(h))
            .collect::<Result<Vec<_>, _>>()?;
        show_only(&mut self.tree_flat, &hits);
        tracing::info!("找到 {} 个匹配节点", hits.len());
        Ok(chains)
    }

    /// 按子串快速过滤；空串清除过滤
    pub fn apply_search_filter(&mut self, filter: &str) -> Result<usize, AppError> {
        if filter.trim().is_empty() {
            update_visibility_by_expansion(&mut self.tree_flat);
            return Ok(0);
        }
        Ok(self.search(&FindCriterion::substring(filter.trim()))?.len())
    }

    /// 切换行的展开状态
    pub fn toggle_node_expanded(&mut self, path: &str) -> Result<(), AppError> {
        let Some(row) = self.tree_flat.iter_mut().find(|r| r.path == path) else {
            return Err(AppError::State(format!("没有这一行: {}", path)));
        };
        row.expanded = !row.expanded;
        let (node, expanded) = (row.node, row.expanded);
        let st = if expanded {
            ExpandState::Expanded
        } else {
            ExpandState::Collapsed
        };
        self.project_mut()?.set_expand_state(node, st)?;
        update_visibility_by_expansion(&mut self.tree_flat);
        Ok(())
    }

    /// 按 '/' 分隔的ID链查找节点
    pub fn resolve(&self, chain: &str) -> Result<NodeId, AppError> {
        let ids: Vec<&str> = chain.split('/').filter(|s| !s.is_empty()).collect();
        self.project()?
            .find_by_chain(&ids)?
            .ok_or_else(|| AppError::State(format!("找不到节点: {}", chain)))
    }

    /// 接受所有原文变更
    pub fn accept_all_changes(&mut self) -> Result<usize, AppError> {
        let n = self.project_mut()?.reset_known_original(Modify::Yes)?;
        self.rebuild_rows()?;
        Ok(n)
    }

    /// 在原父节点下克隆，返回新节点的ID链
    pub fn clone_beside(&mut self, chain: &str) -> Result<Vec<String>, AppError> {
        let src = self.resolve(chain).ok();
        let Some(prj) = self.project.as_mut() else {
            return Err(CloneError::BadObject.into());
        };
        let pending = prj.start_cloning_beside(src)?;
        let copy = pending.commit(prj, Some(&self.config.id_lib), Modify::Yes)?;
        let r = prj.id_chain(copy)?;
        self.rebuild_rows()?;
        Ok(r)
    }

    /// 给文件或分组设置纯文本同步源；未指定策略时用配置中的默认策略
    pub fn attach_source(
        &mut self,
        chain: &str,
        path: &Path,
        policy: Option<OwnershipPolicy>,
    ) -> Result<bool, AppError> {
        let target = self.resolve(chain)?;
        let sync = SyncInfo {
            format: FormatDescriptor::new(EnumTextImporter::PROTO),
            path: path.to_path_buf(),
            policy: policy.unwrap_or(self.config.default_policy),
        };
        let prj = self.project_mut()?;
        if !prj.kind(target)?.is_group_like() {
            return Err(AppError::State(format!("{} 不是文件或分组", chain)));
        }
        Ok(prj.set_sync(target, Some(sync), Modify::Yes)?)
    }

    /// 更新所有同步源，保留界面的展开状态
    pub fn sync_all(&mut self, importer: &dyn Importer) -> Result<UpdateInfo, AppError> {
        let prj = self.project_mut()?;
        let info = {
            let mut lock = ViewLock::new(prj, None)?;
            lock.update_all(importer)?
        };
        self.rebuild_rows()?;
        Ok(info)
    }

    /// 按导出顺序列出 `ID链 \t 译文`
    pub fn dump_texts(&self, separator: char) -> Result<Vec<String>, AppError> {
        let prj = self.project()?;
        let mut w = TreeWalker::new(prj, prj.root())?;
        let mut r = Vec::new();
        while let Some(t) = w.next_text()? {
            r.push(format!("{}\t{}", t.id_chain(separator), t.translation));
        }
        Ok(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::ProjectType;
    use tempfile::TempDir;

    /// 在临时目录中保存一个小项目
    fn create_test_project(dir: &TempDir) -> PathBuf {
        let mut prj = Project::new(ProjectType::FullTranslation);
        let f = prj.add_file("menu.txt", Modify::No).unwrap();
        let g = prj.add_group(f, "File", Modify::No).unwrap();
        let t = prj.add_text(g, "text0", "Open", Modify::No).unwrap();
        prj.set_translation(t, Some("Открыть"), Modify::No).unwrap();
        prj.add_text(g, "text1", "Save", Modify::No).unwrap();
        let path = dir.path().join("menu.ut");
        write_project_file(&path, &prj).expect("保存失败");
        path
    }

    fn loaded() -> (TempDir, AppState) {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let path = create_test_project(&dir);
        let mut app = AppState::default();
        app.load_file(&path).expect("加载失败");
        (dir, app)
    }

    #[test]
    fn test_load_builds_rows() {
        let (_dir, app) = loaded();
        assert!(app.project.is_some(), "项目应该被加载");
        assert_eq!(app.tree_flat.len(), 4, "文件、分组、两个文本");
        assert!(app.source_path.is_some());
    }

    #[test]
    fn test_not_loaded_is_state_error() {
        let mut app = AppState::default();
        assert!(matches!(app.stats(), Err(AppError::State(_))));
        assert!(matches!(app.dump_texts('/'), Err(AppError::State(_))));
        assert!(matches!(app.clone_beside("a/b"), Err(AppError::Clone(CloneError::BadObject))));
    }

    #[test]
    fn test_stats_and_search() {
        let (_dir, mut app) = loaded();
        let (st, big) = app.stats().unwrap();
        assert_eq!(st.text.n_translated, 1);
        assert_eq!(st.text.n_untranslated, 1);
        assert_eq!(big.all.n_cps_orig, 8);

        let hits = app.search(&FindCriterion::Untranslated).unwrap();
        assert_eq!(hits, vec![vec!["menu.txt", "File", "text1"]]);
        let visible: Vec<&str> = app
            .tree_flat
            .iter()
            .filter(|r| r.visible)
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(visible, vec!["menu.txt", "File", "text1"]);

        assert_eq!(app.apply_search_filter("open").unwrap(), 1);
        assert_eq!(app.apply_search_filter("  ").unwrap(), 0);
    }

    #[test]
    fn test_toggle_expanded() {
        let (_dir, mut app) = loaded();
        app.toggle_node_expanded("menu.txt").unwrap();
        assert!(app.tree_flat[1].visible);
        assert!(!app.tree_flat[2].visible);
        app.toggle_node_expanded("menu.txt/File").unwrap();
        assert!(app.tree_flat[2].visible);
        assert!(app.toggle_node_expanded("nope").is_err());
    }

    #[test]
    fn test_clone_and_save() {
        let (dir, mut app) = loaded();
        let chain = app.clone_beside("menu.txt/File/text0").unwrap();
        assert_eq!(chain, vec!["menu.txt", "File", "text2"]);
        assert!(app.project().unwrap().is_modified());
        assert!(matches!(
            app.clone_beside("menu.txt"),
            Err(AppError::Clone(CloneError::Uncloneable))
        ));

        let out = dir.path().join("copy.ut");
        app.save_to_file(&out).unwrap();
        assert!(!app.project().unwrap().is_modified(), "保存后复位");
        let mut again = AppState::default();
        again.load_file(&out).unwrap();
        assert_eq!(again.tree_flat.len(), 5);
    }

    #[test]
    fn test_dump_uses_translation_or_original() {
        let (_dir, app) = loaded();
        let lines = app.dump_texts('/').unwrap();
        assert_eq!(lines, vec!["menu.txt/File/text0\tОткрыть", "menu.txt/File/text1\tSave"]);
    }

    #[test]
    fn test_sync_all_and_accept() {
        let (dir, mut app) = loaded();
        let src = dir.path().join("menu.src");
        std::fs::write(&src, "Open...\nSave\n").unwrap();
        let file = app.resolve("menu.txt").unwrap();
        app.project_mut()
            .unwrap()
            .set_expand_state(file, ExpandState::Expanded)
            .unwrap();
        assert!(app.attach_source("menu.txt", &src, None).unwrap());
        assert!(app.attach_source("menu.txt/File/text0", &src, None).is_err(), "文本不能有同步源");
        let sync = app.project().unwrap().node(file).unwrap().sync().cloned().unwrap();
        assert_eq!(sync.policy, OwnershipPolicy::KeepWarn, "默认策略来自配置");

        let info = app.sync_all(&EnumTextImporter).unwrap();
        assert_eq!(info.added, 2, "行号ID是新文本");
        assert_eq!(info.deleted.n_translated, 1);
        assert_eq!(info.deleted.n_untranslated, 1);
        let trash = &app.project().unwrap().trash;
        assert_eq!(trash.len(), 1, "带译文的文本进入回收站");
        assert_eq!(trash[0].id_chain, vec!["menu.txt", "File", "text0"]);
        assert!(app.tree_flat[0].expanded, "展开状态保留");
        let dump = app.dump_texts('/').unwrap();
        assert_eq!(dump, vec!["menu.txt/1\tOpen...", "menu.txt/2\tSave"]);
        assert_eq!(app.accept_all_changes().unwrap(), 0);
    }
}
