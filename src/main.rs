//! 程序入口：初始化日志、读取配置，按子命令操作项目文件

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::fmt::SubscriberBuilder;

use fanyi_tree::model::finder::FindCriterion;
use fanyi_tree::model::performance::run_performance_suite;
use fanyi_tree::model::transforms::{CommentMode, TextSource};
use fanyi_tree::model::walker::EnumTextImporter;
use fanyi_tree::utils::fs::read_config;
use fanyi_tree::{AppState, EditorConfig, OwnershipPolicy};

#[derive(Parser, Debug)]
#[clap(name = "fanyi_tree")]
#[clap(about = "翻译项目树工具：统计、浏览、合并与克隆")]
struct Args {
    /// JSON配置文件（ID前后缀与默认原文归属策略）
    #[clap(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// 输出调试日志
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 显示统计
    Stats { project: PathBuf },
    /// 以缩进形式列出整棵树
    Tree { project: PathBuf },
    /// 按导出顺序列出所有文本
    Dump {
        project: PathBuf,
        #[clap(long, default_value = "/")]
        separator: char,
    },
    /// 搜索文本与分组
    Find {
        project: PathBuf,
        #[clap(value_enum)]
        criterion: Criterion,
        /// 子串搜索的内容
        needle: Option<String>,
        #[clap(long)]
        match_case: bool,
    },
    /// 接受所有原文变更并保存
    Accept {
        project: PathBuf,
        #[clap(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// 在原位置克隆一个分组或文本（ID链以 '/' 分隔）
    Clone {
        project: PathBuf,
        chain: String,
        #[clap(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// 给文件或分组设置纯文本同步源
    AttachSource {
        project: PathBuf,
        chain: String,
        source: PathBuf,
        /// 原文归属策略，缺省时用配置中的默认值
        #[clap(long, value_parser = parse_policy)]
        policy: Option<OwnershipPolicy>,
        #[clap(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// 按同步源重新导入所有原文
    Sync {
        project: PathBuf,
        #[clap(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// 从翻译项目提取原文项目
    Extract {
        project: PathBuf,
        #[clap(short, long, value_name = "FILE")]
        output: PathBuf,
        /// 有译文时以译文为新原文
        #[clap(long)]
        use_translation: bool,
    },
    /// 运行性能测试
    Bench,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Criterion {
    Text,
    Warning,
    MismatchLines,
    ChangedOrUntranslated,
    ChangedOnly,
    Untranslated,
    Attention,
    ChangedToday,
}

impl Criterion {
    fn build(self, needle: Option<String>, match_case: bool) -> Result<FindCriterion> {
        Ok(match self {
            Criterion::Text => {
                let Some(needle) = needle else {
                    bail!("子串搜索需要搜索内容");
                };
                FindCriterion::Substring {
                    needle,
                    channels: fanyi_tree::model::finder::FindChannels::all(),
                    match_case,
                }
            }
            Criterion::Warning => FindCriterion::Warning,
            Criterion::MismatchLines => FindCriterion::MismatchLines,
            Criterion::ChangedOrUntranslated => FindCriterion::ChangedOrUntranslated,
            Criterion::ChangedOnly => FindCriterion::ChangedOnly,
            Criterion::Untranslated => FindCriterion::Untranslated,
            Criterion::Attention => FindCriterion::ForcedAttention,
            Criterion::ChangedToday => FindCriterion::ChangedToday,
        })
    }
}

fn parse_policy(s: &str) -> Result<OwnershipPolicy, String> {
    OwnershipPolicy::from_tag(s).ok_or_else(|| {
        let tags: Vec<&str> = OwnershipPolicy::ALL.iter().map(|p| p.tag()).collect();
        format!("可选值: {}", tags.join(", "))
    })
}

fn load(config: &EditorConfig, p: &Path) -> Result<AppState> {
    let mut app = AppState::with_config(config.clone());
    app.load_file(p)
        .with_context(|| format!("无法加载项目 {}", p.display()))?;
    Ok(app)
}

fn save(app: &mut AppState, output: Option<&Path>) -> Result<()> {
    match output {
        Some(p) => app.save_to_file(p)?,
        None => app.save_to_original_file()?,
    }
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(p) => read_config(p).with_context(|| format!("无法读取配置 {}", p.display()))?,
        None => EditorConfig::default(),
    };

    match args.command {
        Command::Stats { project } => {
            let mut app = load(&config, &project)?;
            let (st, big) = app.stats()?;
            let t = &st.text;
            println!("分组: {}", st.n_groups);
            println!("文本: {} (已翻译 {}, 未翻译 {})", t.n_total(), t.n_translated, t.n_untranslated);
            println!(
                "关注: 背景 {}, 正常 {}, 手动标记 {}, 待处理 {}",
                t.n_background, t.n_calm, t.n_user_attention, t.n_auto_problem
            );
            println!(
                "码位: 原文 {}, 译文 {}, 待复查 {} 条",
                big.all.n_cps_orig, big.all.n_cps_transl, big.dubious.n_strings
            );
        }
        Command::Tree { project } => {
            let app = load(&config, &project)?;
            for row in &app.tree_flat {
                println!("{}{} {}", "  ".repeat(row.depth as usize), row.name, row.preview);
            }
        }
        Command::Dump { project, separator } => {
            let app = load(&config, &project)?;
            for line in app.dump_texts(separator)? {
                println!("{}", line);
            }
        }
        Command::Find {
            project,
            criterion,
            needle,
            match_case,
        } => {
            let crit = criterion.build(needle, match_case)?;
            let mut app = load(&config, &project)?;
            for chain in app.search(&crit)? {
                println!("{}", chain.join("/"));
            }
        }
        Command::Accept { project, output } => {
            let mut app = load(&config, &project)?;
            let n = app.accept_all_changes()?;
            println!("接受了 {} 处原文变更", n);
            save(&mut app, output.as_deref())?;
        }
        Command::Clone {
            project,
            chain,
            output,
        } => {
            let mut app = load(&config, &project)?;
            let new_chain = app.clone_beside(&chain)?;
            println!("已克隆为 {}", new_chain.join("/"));
            save(&mut app, output.as_deref())?;
        }
        Command::AttachSource {
            project,
            chain,
            source,
            policy,
            output,
        } => {
            let mut app = load(&config, &project)?;
            if app.attach_source(&chain, &source, policy)? {
                save(&mut app, output.as_deref())?;
            }
        }
        Command::Sync { project, output } => {
            let mut app = load(&config, &project)?;
            let info = app.sync_all(&EnumTextImporter)?;
            println!(
                "新增 {}, 删除 {}, 修改 {}",
                info.added,
                info.deleted.n_total(),
                info.changed.n_total()
            );
            if info.has_smth() {
                save(&mut app, output.as_deref())?;
            }
        }
        Command::Extract {
            project,
            output,
            use_translation,
        } => {
            let mut app = load(&config, &project)?;
            let (source, comments) = if use_translation {
                (TextSource::TranslationOrOriginal, CommentMode::TranslatorElseAuthor)
            } else {
                (TextSource::Original, CommentMode::Author)
            };
            if !app.project_mut()?.extract_original(source, comments)? {
                bail!("{} 已经是原文项目", project.display());
            }
            save(&mut app, Some(output.as_path()))?;
        }
        Command::Bench => {
            for r in run_performance_suite() {
                let mark = if r.success { "ok" } else { "FAIL" };
                println!("[{}] {}: {}ms ({})", mark, r.operation, r.duration_ms, r.details);
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 日志输出到 stderr，stdout 留给结果
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let _ = SubscriberBuilder::default()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();

    run(args)
}
