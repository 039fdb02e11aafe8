//! IO helper: 项目文件与配置文件的读写

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use crate::model::data_core::EditorConfig;
use crate::model::error::AppError;
use crate::model::persist::{read_project, write_project};
use crate::model::tree::Project;

/// 从文件读取项目，记录文件名
pub fn read_project_file(p: &Path) -> Result<Project, AppError> {
    let xml = fs::read_to_string(p)?;
    let mut prj = read_project(&xml)?;
    prj.fname = Some(p.to_path_buf());
    Ok(prj)
}

/// 将项目保存到文件
pub fn write_project_file(p: &Path, prj: &Project) -> Result<(), AppError> {
    let xml = write_project(prj)?;
    let mut w = BufWriter::new(File::create(p)?);
    w.write_all(xml.as_bytes())?;
    w.flush()?;
    Ok(())
}

/// 读取JSON配置，缺失的字段取默认值
pub fn read_config(p: &Path) -> Result<EditorConfig, AppError> {
    let f = File::open(p)?;
    let rdr = BufReader::new(f);
    let cfg: EditorConfig = serde_json::from_reader(rdr)?;
    Ok(cfg)
}

/// 将配置保存到文件（格式化输出）
pub fn write_config(p: &Path, cfg: &EditorConfig) -> Result<(), AppError> {
    let f = File::create(p)?;
    serde_json::to_writer_pretty(f, cfg)?;
    Ok(())
}
