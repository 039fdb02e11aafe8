//! 性能基准测试模块
//!
//! 生成大型项目，测量统计、保存/读取、影子树构建、合并与克隆的耗时

use std::time::Instant;

use crate::model::error::TreeError;
use crate::model::guard::NodeId;
use crate::model::ids::IdLib;
use crate::model::node::{Modify, ProjectType};
use crate::model::persist::{read_project, write_project};
use crate::model::shadow_tree::build_shadow_tree;
use crate::model::stats::{CascadeDropCache, StatsMode};
use crate::model::sync::OwnershipPolicy;
use crate::model::tree::Project;

/// 性能测试结果
#[derive(Debug)]
pub struct PerformanceResult {
    pub operation: String,
    pub duration_ms: u128,
    pub success: bool,
    pub details: String,
}

impl PerformanceResult {
    pub fn new(operation: &str, duration_ms: u128, success: bool, details: &str) -> Self {
        Self {
            operation: operation.to_string(),
            duration_ms,
            success,
            details: details.to_string(),
        }
    }
}

fn fill_group(prj: &mut Project, parent: NodeId, depth: usize, width: usize, seq: &mut usize) -> Result<(), TreeError> {
    for i in 0..width {
        *seq += 1;
        let id = format!("text{}", i);
        let t = prj.add_text(parent, &id, &format!("原文 {} 第{}条", seq, i), Modify::No)?;
        // 三分之二已翻译
        if *seq % 3 != 0 {
            prj.set_translation(t, Some(&format!("译文 {}", seq)), Modify::No)?;
        }
    }
    if depth == 0 {
        return Ok(());
    }
    for i in 0..width / 2 {
        let g = prj.add_group(parent, &format!("group{}", i), Modify::No)?;
        fill_group(prj, g, depth - 1, width, seq)?;
    }
    Ok(())
}

/// 生成大型测试项目：`n_files` 个文件，每层 `width` 条文本、`width / 2` 个子分组
pub fn generate_large_project(n_files: usize, depth: usize, width: usize) -> Project {
    let mut prj = Project::new(ProjectType::FullTranslation);
    prj.info.orig.lang = "en".into();
    prj.info.transl.lang = "zh".into();
    let mut seq = 0;
    for n in 0..n_files {
        let r = prj
            .add_file(&format!("file{}.txt", n), Modify::No)
            .and_then(|f| fill_group(&mut prj, f, depth, width, &mut seq));
        if let Err(e) = r {
            tracing::warn!("生成文件 {} 失败: {}", n, e);
        }
    }
    prj
}

fn timed<T>(f: impl FnOnce() -> T) -> (T, u128) {
    let start = Instant::now();
    let r = f();
    (r, start.elapsed().as_millis())
}

/// 冷缓存下统计整个项目
pub fn benchmark_stats(prj: &mut Project) -> PerformanceResult {
    let root = prj.root();
    let (r, ms) = timed(|| prj.stats(root, StatsMode::Cached, CascadeDropCache::No));
    match r {
        Ok(st) => PerformanceResult::new(
            "统计",
            ms,
            true,
            &format!("{} 条文本, {} 个分组", st.text.n_total(), st.n_groups),
        ),
        Err(e) => PerformanceResult::new("统计", ms, false, &format!("统计失败: {}", e)),
    }
}

/// 保存并重新读取
pub fn benchmark_persist(prj: &Project) -> Vec<PerformanceResult> {
    let mut results = Vec::new();
    let (xml, ms) = timed(|| write_project(prj));
    let xml = match xml {
        Ok(xml) => {
            results.push(PerformanceResult::new("XML保存", ms, true, &format!("{} 字节", xml.len())));
            xml
        }
        Err(e) => {
            results.push(PerformanceResult::new("XML保存", ms, false, &e.to_string()));
            return results;
        }
    };
    let (back, ms) = timed(|| read_project(&xml));
    results.push(match back {
        Ok(p) => PerformanceResult::new("XML读取", ms, true, &format!("{} 个节点", p.n_nodes())),
        Err(e) => PerformanceResult::new("XML读取", ms, false, &e.to_string()),
    });
    results
}

pub fn benchmark_shadow_tree_build(prj: &Project) -> PerformanceResult {
    let (rows, ms) = timed(|| build_shadow_tree(prj));
    match rows {
        Ok(rows) => PerformanceResult::new("影子树构建", ms, !rows.is_empty(), &format!("构建了 {} 行", rows.len())),
        Err(e) => PerformanceResult::new("影子树构建", ms, false, &e.to_string()),
    }
}

/// 用修改过一半原文的内容重新合并第一个文件
pub fn benchmark_merge(prj: &mut Project) -> PerformanceResult {
    let Some(&file) = prj.files().first() else {
        return PerformanceResult::new("合并", 0, false, "项目为空");
    };
    let texts: Vec<(Vec<String>, String)> = prj
        .texts_under(file)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|t| {
            let chain = prj.id_chain(t).ok()?;
            let orig = prj.node(t).ok()?.translatable()?.original.clone();
            Some((chain[1..].to_vec(), orig))
        })
        .collect();
    let (r, ms) = timed(|| {
        prj.update_with(file, OwnershipPolicy::KeepWarn, |l| {
            for (i, (chain, orig)) in texts.iter().enumerate() {
                let ids: Vec<&str> = chain.iter().map(String::as_str).collect();
                if i % 2 == 0 {
                    l.add_text_at(&ids, &format!("{} (新)", orig), "")?;
                } else {
                    l.add_text_at(&ids, orig, "")?;
                }
            }
            Ok(())
        })
    });
    match r {
        Ok(info) => PerformanceResult::new(
            "合并",
            ms,
            true,
            &format!("修改 {} 条, 新增 {} 条", info.changed.n_total(), info.added),
        ),
        Err(e) => PerformanceResult::new("合并", ms, false, &e.to_string()),
    }
}

/// 克隆第一个文件中的第一个分组
pub fn benchmark_clone(prj: &mut Project) -> PerformanceResult {
    let group = prj
        .files()
        .first()
        .and_then(|&f| prj.find_child(f, "group0").ok().flatten());
    let lib = IdLib::default();
    let (r, ms) = timed(|| {
        let pending = prj.start_cloning_beside(group)?;
        pending.commit(prj, Some(&lib), Modify::Yes)
    });
    match r {
        Ok(c) => PerformanceResult::new(
            "克隆",
            ms,
            true,
            &format!("复制了 {} 条文本", prj.texts_under(c).map(|v| v.len()).unwrap_or(0)),
        ),
        Err(e) => PerformanceResult::new("克隆", ms, false, &e.to_string()),
    }
}

/// 在同一个文件下连续追加 `n` 条文本，再整体读取一次
pub fn benchmark_wide_group(n: usize) -> PerformanceResult {
    let (r, ms) = timed(|| -> Result<Project, crate::model::error::AppError> {
        let mut prj = Project::new(ProjectType::Original);
        let f = prj.add_file("wide.txt", Modify::No)?;
        for i in 0..n {
            prj.add_text(f, &format!("text{}", i), "x", Modify::No)?;
        }
        read_project(&write_project(&prj)?)
    });
    let op = format!("宽分组({})", n);
    match r {
        Ok(prj) => PerformanceResult::new(&op, ms, prj.n_nodes() == n + 2, &format!("{} 个节点", prj.n_nodes())),
        Err(e) => PerformanceResult::new(&op, ms, false, &e.to_string()),
    }
}

/// 运行综合性能测试
pub fn run_performance_suite() -> Vec<PerformanceResult> {
    let mut results = Vec::new();

    // (文件数, 深度, 宽度)
    let test_cases = [(2, 2, 10), (5, 3, 20), (10, 3, 40)];

    for (n_files, depth, width) in test_cases {
        tracing::info!("测试规模：{}个文件，深度{}，宽度{}", n_files, depth, width);

        let (mut prj, ms) = timed(|| generate_large_project(n_files, depth, width));
        results.push(PerformanceResult::new(
            &format!("数据生成({}x{}x{})", n_files, depth, width),
            ms,
            true,
            &format!("{} 个节点", prj.n_nodes()),
        ));
        results.push(benchmark_stats(&mut prj));
        results.extend(benchmark_persist(&prj));
        results.push(benchmark_shadow_tree_build(&prj));
        results.push(benchmark_merge(&mut prj));
        results.push(benchmark_clone(&mut prj));
    }
    results.push(benchmark_wide_group(20_000));

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_large_project() {
        let mut prj = generate_large_project(2, 1, 4);
        assert_eq!(prj.files().len(), 2);
        // 每个文件：4条文本 + 2个分组 × 4条文本
        let root = prj.root();
        let st = prj.stats(root, StatsMode::Cached, CascadeDropCache::No).unwrap();
        assert_eq!(st.text.n_total(), 24);
        assert_eq!(st.n_groups, 6, "两个文件与四个分组");
        assert!(st.text.n_untranslated > 0);
    }

    #[test]
    fn test_performance_benchmarks() {
        let mut prj = generate_large_project(2, 2, 6);

        let r = benchmark_stats(&mut prj);
        assert!(r.success);
        assert!(benchmark_persist(&prj).iter().all(|r| r.success));
        assert!(benchmark_shadow_tree_build(&prj).success);

        let r = benchmark_merge(&mut prj);
        assert!(r.success, "{}", r.details);
        assert!(r.details.contains("新增 0 条"), "{}", r.details);

        let r = benchmark_clone(&mut prj);
        assert!(r.success, "{}", r.details);
        assert!(prj.is_modified());
        assert!(r.duration_ms < 1000); // 应该在1秒内完成
    }

    #[test]
    fn test_wide_group_is_linear() {
        let small = benchmark_wide_group(5_000);
        let large = benchmark_wide_group(20_000);
        assert!(small.success && large.success, "{} / {}", small.details, large.details);
        // 规模翻四倍，耗时不应到十几倍
        assert!(
            large.duration_ms <= small.duration_ms * 8 + 200,
            "{}ms vs {}ms",
            small.duration_ms,
            large.duration_ms
        );
    }
}
