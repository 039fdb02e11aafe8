//! 项目文件读写（XML）
//!
//! 多行文本写成一串 `<p>` 段落，读取时以单个换行拼接。
//! 译文通道（已知原文、参考、译文、译者注释）只在翻译项目中写出。

use std::collections::HashMap;
use std::path::PathBuf;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::model::error::AppError;
use crate::model::guard::NodeId;
use crate::model::node::{FormatDescriptor, LangInfo, Modify, ObjType, ProjectType, SyncInfo};
use crate::model::sync::OwnershipPolicy;
use crate::model::tree::Project;

type XmlWriter = Writer<Vec<u8>>;

fn xml_err(e: impl std::fmt::Display) -> AppError {
    AppError::Xml(e.to_string())
}

fn put(w: &mut XmlWriter, ev: Event<'_>) -> Result<(), AppError> {
    w.write_event(ev).map_err(xml_err)
}

/// 写出带段落的文本元素，空文本也写一个空段落
fn write_paragraphs(w: &mut XmlWriter, tag: &str, text: &str) -> Result<(), AppError> {
    put(w, Event::Start(BytesStart::new(tag)))?;
    for line in text.split('\n') {
        put(w, Event::Start(BytesStart::new("p")))?;
        put(w, Event::Text(BytesText::new(line)))?;
        put(w, Event::End(BytesEnd::new("p")))?;
    }
    put(w, Event::End(BytesEnd::new(tag)))
}

fn write_if(w: &mut XmlWriter, tag: &str, text: &str) -> Result<(), AppError> {
    if text.is_empty() {
        Ok(())
    } else {
        write_paragraphs(w, tag, text)
    }
}

fn write_opt(w: &mut XmlWriter, tag: &str, text: Option<&str>) -> Result<(), AppError> {
    match text {
        Some(t) => write_paragraphs(w, tag, t),
        None => Ok(()),
    }
}

fn write_lang(w: &mut XmlWriter, tag: &str, info: &LangInfo) -> Result<(), AppError> {
    let mut e = BytesStart::new(tag);
    e.push_attribute(("lang", info.lang.as_str()));
    if let Some(p) = &info.path {
        let p = p.to_string_lossy();
        e.push_attribute(("path", p.as_ref()));
    }
    put(w, Event::Empty(e))
}

fn format_attrs(e: &mut BytesStart<'_>, format: &FormatDescriptor) -> Result<(), AppError> {
    e.push_attribute(("proto", format.proto.as_str()));
    if !format.params.is_empty() {
        let params = serde_json::to_string(&format.params)?;
        e.push_attribute(("params", params.as_str()));
    }
    Ok(())
}

struct XmlSaver<'a> {
    prj: &'a Project,
    w: XmlWriter,
}

impl XmlSaver<'_> {
    fn write_comments(&mut self, id: NodeId) -> Result<(), AppError> {
        let prj = self.prj;
        let Some(c) = prj.node(id)?.comments() else {
            return Ok(());
        };
        write_if(&mut self.w, "imp-cmt", &c.importers)?;
        write_if(&mut self.w, "au-cmt", &c.authors)?;
        if prj.info.is_translation() {
            write_if(&mut self.w, "tr-cmt", &c.translators)?;
        }
        Ok(())
    }

    fn write_sync(&mut self, sync: &SyncInfo) -> Result<(), AppError> {
        let mut e = BytesStart::new("sync");
        format_attrs(&mut e, &sync.format)?;
        let path = sync.path.to_string_lossy();
        e.push_attribute(("path", path.as_ref()));
        e.push_attribute(("policy", sync.policy.tag()));
        put(&mut self.w, Event::Empty(e))
    }

    fn write_node(&mut self, id: NodeId) -> Result<(), AppError> {
        let prj = self.prj;
        let node = prj.node(id)?;
        match node.kind() {
            ObjType::Text => return self.write_text(id),
            ObjType::Project => return Err(AppError::State("项目节点不能嵌套".into())),
            ObjType::File | ObjType::Group => {}
        }
        let tag = if node.kind() == ObjType::File { "file" } else { "group" };
        let mut e = BytesStart::new(tag);
        if let Some(fi) = node.file_info() {
            e.push_attribute(("name", node.id()));
            if fi.idless {
                e.push_attribute(("idless", "1"));
            }
        } else {
            e.push_attribute(("id", node.id()));
        }
        put(&mut self.w, Event::Start(e))?;
        if let Some(format) = node.file_info().and_then(|fi| fi.format.as_ref()) {
            let mut e = BytesStart::new("format");
            format_attrs(&mut e, format)?;
            put(&mut self.w, Event::Empty(e))?;
        }
        if let Some(sync) = node.sync() {
            self.write_sync(sync)?;
        }
        self.write_comments(id)?;
        for &ch in node.children() {
            self.write_node(ch)?;
        }
        put(&mut self.w, Event::End(BytesEnd::new(tag)))
    }

    fn write_text(&mut self, id: NodeId) -> Result<(), AppError> {
        let prj = self.prj;
        let node = prj.node(id)?;
        let tr = node
            .translatable()
            .ok_or_else(|| AppError::State(format!("文本 {} 没有可翻译值", id)))?;
        let mut e = BytesStart::new("text");
        e.push_attribute(("id", node.id()));
        if tr.force_attention {
            e.push_attribute(("attention", "1"));
        }
        put(&mut self.w, Event::Start(e))?;
        write_paragraphs(&mut self.w, "orig", &tr.original)?;
        let c = &node.comments;
        write_if(&mut self.w, "imp-cmt", &c.importers)?;
        write_if(&mut self.w, "au-cmt", &c.authors)?;
        if prj.info.is_translation() {
            write_opt(&mut self.w, "known-orig", tr.known_original.as_deref())?;
            write_opt(&mut self.w, "ref", tr.reference.as_deref())?;
            write_opt(&mut self.w, "transl", tr.translation.as_deref())?;
            write_if(&mut self.w, "tr-cmt", &c.translators)?;
        }
        put(&mut self.w, Event::End(BytesEnd::new("text")))
    }
}

/// 序列化整个项目
pub fn write_project(prj: &Project) -> Result<String, AppError> {
    let mut s = XmlSaver {
        prj,
        w: Writer::new_with_indent(Vec::new(), b' ', 1),
    };
    put(&mut s.w, Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    let mut root = BytesStart::new("ut");
    root.push_attribute(("type", prj.info.ty.tag()));
    put(&mut s.w, Event::Start(root))?;
    put(&mut s.w, Event::Start(BytesStart::new("info")))?;
    write_lang(&mut s.w, "orig", &prj.info.orig)?;
    if prj.info.is_translation() {
        write_lang(&mut s.w, "transl", &prj.info.transl)?;
        if !prj.info.reference.lang.is_empty() {
            write_lang(&mut s.w, "ref", &prj.info.reference)?;
        }
    }
    put(&mut s.w, Event::End(BytesEnd::new("info")))?;
    for &f in prj.files() {
        s.write_node(f)?;
    }
    put(&mut s.w, Event::End(BytesEnd::new("ut")))?;
    String::from_utf8(s.w.into_inner()).map_err(xml_err)
}

///// 读取 /////

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Orig,
    KnownOrig,
    Reference,
    Transl,
    ImpCmt,
    AuCmt,
    TrCmt,
}

impl Field {
    fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "orig" => Field::Orig,
            "known-orig" => Field::KnownOrig,
            "ref" => Field::Reference,
            "transl" => Field::Transl,
            "imp-cmt" => Field::ImpCmt,
            "au-cmt" => Field::AuCmt,
            "tr-cmt" => Field::TrCmt,
            _ => return None,
        })
    }

    fn is_comment(self) -> bool {
        matches!(self, Field::ImpCmt | Field::AuCmt | Field::TrCmt)
    }
}

fn attrs(e: &BytesStart<'_>) -> Result<HashMap<String, String>, AppError> {
    let mut r = HashMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(xml_err)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let val = attr.unescape_value().map_err(xml_err)?.to_string();
        r.insert(key, val);
    }
    Ok(r)
}

fn read_format(a: &HashMap<String, String>) -> Result<FormatDescriptor, AppError> {
    let mut f = FormatDescriptor::new(a.get("proto").cloned().unwrap_or_default());
    if let Some(params) = a.get("params") {
        f.params = serde_json::from_str(params)?;
    }
    Ok(f)
}

struct XmlLoader {
    prj: Project,
    saw_root: bool,
    in_info: bool,
    /// 当前的文件/分组
    stack: Vec<NodeId>,
    text: Option<NodeId>,
    field: Option<Field>,
    in_p: bool,
    paragraphs: Vec<String>,
}

impl XmlLoader {
    fn new() -> Self {
        let prj = Project::default();
        let root = prj.root();
        Self {
            prj,
            saw_root: false,
            in_info: false,
            stack: vec![root],
            text: None,
            field: None,
            in_p: false,
            paragraphs: Vec::new(),
        }
    }

    fn top(&self) -> NodeId {
        self.stack.last().copied().unwrap_or_else(|| self.prj.root())
    }

    fn open(&mut self, e: &BytesStart<'_>, empty: bool) -> Result<(), AppError> {
        let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
        if !self.saw_root {
            if name != "ut" {
                return Err(AppError::Format(format!("根元素应为 ut，实际为 {}", name)));
            }
            let a = attrs(e)?;
            let ty = a.get("type").map(String::as_str).unwrap_or("original");
            self.prj.info.ty = ProjectType::from_tag(ty)
                .ok_or_else(|| AppError::Format(format!("未知的项目类型: {}", ty)))?;
            self.saw_root = true;
            return Ok(());
        }
        if self.in_info {
            let a = attrs(e)?;
            let lang = LangInfo {
                lang: a.get("lang").cloned().unwrap_or_default(),
                path: a.get("path").map(PathBuf::from),
            };
            match name.as_str() {
                "orig" => self.prj.info.orig = lang,
                "transl" => self.prj.info.transl = lang,
                "ref" => self.prj.info.reference = lang,
                _ => {}
            }
            return Ok(());
        }
        if self.field.is_some() {
            if name == "p" {
                self.paragraphs.push(String::new());
                self.in_p = !empty;
            }
            return Ok(());
        }
        if let Some(f) = Field::from_tag(&name) {
            self.paragraphs.clear();
            if empty {
                self.finish_field(f)?;
            } else {
                self.field = Some(f);
            }
            return Ok(());
        }
        match name.as_str() {
            "info" => self.in_info = !empty,
            "file" => {
                let a = attrs(e)?;
                let fname = a.get("name").cloned().unwrap_or_default();
                let f = self.prj.add_file(&fname, Modify::No)?;
                if a.get("idless").map(String::as_str) == Some("1") {
                    self.prj.set_idless(f, true, Modify::No)?;
                }
                if !empty {
                    self.stack.push(f);
                }
            }
            "group" => {
                let a = attrs(e)?;
                let id = a.get("id").cloned().unwrap_or_default();
                let top = self.top();
                let g = self.prj.add_group(top, &id, Modify::No)?;
                if !empty {
                    self.stack.push(g);
                }
            }
            "text" => {
                let a = attrs(e)?;
                let id = a.get("id").cloned().unwrap_or_default();
                let top = self.top();
                let t = self.prj.add_text(top, &id, "", Modify::No)?;
                if a.get("attention").map(String::as_str) == Some("1") {
                    self.prj.set_force_attention(t, true, Modify::No)?;
                }
                if !empty {
                    self.text = Some(t);
                }
            }
            "format" => {
                let format = read_format(&attrs(e)?)?;
                let top = self.top();
                self.prj.set_format(top, Some(format), Modify::No)?;
            }
            "sync" => {
                let a = attrs(e)?;
                let policy = match a.get("policy") {
                    Some(p) => OwnershipPolicy::from_tag(p)
                        .ok_or_else(|| AppError::Format(format!("未知的同步策略: {}", p)))?,
                    None => OwnershipPolicy::default(),
                };
                let sync = SyncInfo {
                    format: read_format(&a)?,
                    path: a.get("path").map(PathBuf::from).unwrap_or_default(),
                    policy,
                };
                let top = self.top();
                self.prj.set_sync(top, Some(sync), Modify::No)?;
            }
            // 未知元素忽略
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, e: &BytesText<'_>) -> Result<(), AppError> {
        if self.in_p {
            let s = e.unescape().map_err(xml_err)?;
            if let Some(last) = self.paragraphs.last_mut() {
                last.push_str(&s);
            }
        } else if let Some(f) = self.field {
            // 缩进之外的裸文本按一个段落读取
            let s = e.unescape().map_err(xml_err)?;
            let s = s.trim();
            if !s.is_empty() {
                tracing::warn!("{:?} 中有 <p> 之外的文本，按段落读取", f);
                self.paragraphs.push(s.to_string());
            }
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8]) -> Result<(), AppError> {
        let name = String::from_utf8_lossy(name);
        if let Some(f) = self.field {
            match name.as_ref() {
                "p" => self.in_p = false,
                tag if Field::from_tag(tag) == Some(f) => {
                    self.field = None;
                    self.finish_field(f)?;
                }
                _ => {}
            }
            return Ok(());
        }
        match name.as_ref() {
            "info" => self.in_info = false,
            "text" => self.text = None,
            "file" | "group" => {
                if self.stack.len() > 1 {
                    self.stack.pop();
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish_field(&mut self, f: Field) -> Result<(), AppError> {
        let value = std::mem::take(&mut self.paragraphs).join("\n");
        let target = match (self.text, f.is_comment()) {
            (Some(t), _) => t,
            (None, true) if self.stack.len() > 1 => self.top(),
            _ => {
                return Err(AppError::Format(format!("{:?} 出现在错误的位置", f)));
            }
        };
        let node = self.prj.node_mut(target)?;
        if f.is_comment() {
            let c = &mut node.comments;
            match f {
                Field::ImpCmt => c.importers = value,
                Field::AuCmt => c.authors = value,
                _ => c.translators = value,
            }
            return Ok(());
        }
        let tr = node
            .translatable
            .as_mut()
            .ok_or_else(|| AppError::Format("文本字段出现在文本之外".into()))?;
        match f {
            Field::Orig => tr.original = value,
            Field::KnownOrig => tr.known_original = Some(value),
            Field::Reference => tr.reference = Some(value),
            _ => tr.translation = Some(value),
        }
        Ok(())
    }
}

/// 从XML文本读取项目
pub fn read_project(xml: &str) -> Result<Project, AppError> {
    let mut reader = Reader::from_str(xml);
    let mut loader = XmlLoader::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => loader.open(e, false)?,
            Ok(Event::Empty(ref e)) => loader.open(e, true)?,
            Ok(Event::Text(ref e)) => loader.text(e)?,
            Ok(Event::End(ref e)) => loader.close(e.name().as_ref())?,
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(AppError::Xml(format!(
                    "位置 {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
        buf.clear();
    }
    if !loader.saw_root {
        return Err(AppError::Format("缺少根元素 ut".into()));
    }
    let mut prj = loader.prj;
    let root = prj.root();
    prj.recursive_recache(root)?;
    prj.unmodify(crate::model::tree::Forced::Yes);
    Ok(prj)
}
