use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use tracing::{debug, warn};

use crawldeck_core::config::ResultsConfig;
use crawldeck_core::{EngineError, EngineResult, LocateOutcome, ResultArtifact, ResultFormat};

/// 结果文件定位器
///
/// 按配置的路径模板与四种格式扩展名的笛卡尔积探测磁盘，对每个存在且非空的
/// 文件做格式化计数。纯只读探测，没有共享状态；不可读或格式损坏的文件记日志
/// 后跳过，绝不向调用方抛错——没有数据就是 0，不是错误。
pub struct ResultLocator {
    base_dir: PathBuf,
    path_templates: Vec<String>,
    xml_item_tag: String,
}

impl ResultLocator {
    pub fn new(config: &ResultsConfig) -> Self {
        Self {
            base_dir: PathBuf::from(&config.base_dir),
            path_templates: config.path_templates.clone(),
            xml_item_tag: config.xml_item_tag.clone(),
        }
    }

    /// 探测任务的全部候选结果产物，返回最大计数与产物清单
    ///
    /// 取最大值而非求和：多个产物通常是同一次运行的重复导出。
    pub fn locate(&self, task_id: &str, project_id: Option<&str>) -> LocateOutcome {
        let mut artifacts = Vec::new();

        for stem in self.candidate_stems(task_id, project_id) {
            let name = match stem.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            for format in ResultFormat::ALL {
                // 任务 id 可能含点号，不能用 with_extension（会把末段当扩展名截掉）
                let path = stem.with_file_name(format!("{}.{}", name, format.extension()));
                if let Some(artifact) = self.probe_file(task_id, format, &path) {
                    artifacts.push(artifact);
                }
            }
        }

        let max_count = artifacts.iter().map(|a| a.item_count).max().unwrap_or(0);
        LocateOutcome {
            max_count,
            artifacts,
        }
    }

    /// 展开路径模板为无扩展名的候选文件干
    ///
    /// 含 {project} 的模板在项目未知时退化为枚举结果根目录的一级子目录。
    fn candidate_stems(&self, task_id: &str, project_id: Option<&str>) -> Vec<PathBuf> {
        let mut stems = Vec::new();

        for template in &self.path_templates {
            if template.contains("{project}") {
                match project_id {
                    Some(project) => {
                        let rel = template
                            .replace("{project}", project)
                            .replace("{task}", task_id);
                        stems.push(self.base_dir.join(rel));
                    }
                    None => {
                        for project_dir in self.list_project_dirs() {
                            let name = project_dir.file_name().and_then(|n| n.to_str());
                            if let Some(project) = name {
                                let rel = template
                                    .replace("{project}", project)
                                    .replace("{task}", task_id);
                                stems.push(self.base_dir.join(rel));
                            }
                        }
                    }
                }
            } else {
                stems.push(self.base_dir.join(template.replace("{task}", task_id)));
            }
        }

        stems
    }

    fn list_project_dirs(&self) -> Vec<PathBuf> {
        match fs::read_dir(&self.base_dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn probe_file(
        &self,
        task_id: &str,
        format: ResultFormat,
        path: &Path,
    ) -> Option<ResultArtifact> {
        let metadata = fs::metadata(path).ok()?;
        if !metadata.is_file() || metadata.len() == 0 {
            return None;
        }

        let item_count = match self.count_items(format, path) {
            Ok(count) => count,
            Err(e) => {
                warn!("结果文件 {} 解析失败，跳过: {}", path.display(), e);
                return None;
            }
        };

        debug!(
            "探测到结果产物 {} ({:?})，计数 {}",
            path.display(),
            format,
            item_count
        );

        Some(ResultArtifact {
            task_id: task_id.to_string(),
            format,
            path: path.to_path_buf(),
            item_count,
            modified_at: metadata
                .modified()
                .ok()
                .map(DateTime::<Utc>::from),
        })
    }

    fn count_items(&self, format: ResultFormat, path: &Path) -> EngineResult<i64> {
        match format {
            ResultFormat::JsonLines => count_jsonl(path),
            ResultFormat::Json => count_json(path),
            ResultFormat::Csv => count_csv(path),
            ResultFormat::Xml => count_xml(path, &self.xml_item_tag),
        }
    }
}

fn read_error(path: &Path, err: impl std::fmt::Display) -> EngineError {
    EngineError::ResultFile(format!("{}: {}", path.display(), err))
}

/// 行分隔格式：非空行数
fn count_jsonl(path: &Path) -> EngineResult<i64> {
    let content = fs::read_to_string(path).map_err(|e| read_error(path, e))?;
    Ok(content.lines().filter(|l| !l.trim().is_empty()).count() as i64)
}

/// 整文件 JSON：顶层数组取长度，单个对象计 1
fn count_json(path: &Path) -> EngineResult<i64> {
    let content = fs::read_to_string(path).map_err(|e| read_error(path, e))?;
    let value: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| read_error(path, e))?;
    Ok(match value {
        serde_json::Value::Array(items) => items.len() as i64,
        _ => 1,
    })
}

/// CSV：行数减一行表头，下限 0
fn count_csv(path: &Path) -> EngineResult<i64> {
    let content = fs::read_to_string(path).map_err(|e| read_error(path, e))?;
    let lines = content.lines().filter(|l| !l.trim().is_empty()).count() as i64;
    Ok((lines - 1).max(0))
}

/// XML：统计指定重复元素标签的出现次数
fn count_xml(path: &Path, item_tag: &str) -> EngineResult<i64> {
    let mut reader = Reader::from_file(path).map_err(|e| read_error(path, e))?;
    let mut buf = Vec::new();
    let mut count = 0i64;

    loop {
        buf.clear();
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| read_error(path, e))?
        {
            Event::Start(e) | Event::Empty(e)
                if e.local_name().as_ref() == item_tag.as_bytes() =>
            {
                count += 1;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawldeck_core::config::ResultsConfig;
    use std::io::Write;

    fn locator_for(dir: &Path) -> ResultLocator {
        let config = ResultsConfig {
            base_dir: dir.to_string_lossy().into_owned(),
            ..ResultsConfig::default()
        };
        ResultLocator::new(&config)
    }

    fn write_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut f = fs::File::create(path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_count_rules_per_format() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "t1.jsonl", "{\"a\":1}\n\n{\"a\":2}\n{\"a\":3}\n");
        write_file(dir.path(), "t2.json", "[{}, {}, {}, {}]");
        write_file(dir.path(), "t3.json", "{\"only\": \"one\"}");
        write_file(dir.path(), "t4.csv", "a,b\n1,2\n3,4\n");
        write_file(
            dir.path(),
            "t5.xml",
            "<items><item a=\"1\"/><item><x/></item></items>",
        );

        let locator = locator_for(dir.path());
        assert_eq!(locator.locate("t1", None).max_count, 3);
        assert_eq!(locator.locate("t2", None).max_count, 4);
        assert_eq!(locator.locate("t3", None).max_count, 1);
        assert_eq!(locator.locate("t4", None).max_count, 2);
        assert_eq!(locator.locate("t5", None).max_count, 2);
    }

    #[test]
    fn test_csv_header_only_floors_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "t1.csv", "a,b\n");
        let locator = locator_for(dir.path());
        assert_eq!(locator.locate("t1", None).max_count, 0);
    }

    #[test]
    fn test_task_id_with_dots_keeps_full_stem() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "t1.2.jsonl", "{}\n{}\n{}\n{}\n");
        // 截断后的干不得命中别的任务的文件
        write_file(dir.path(), "t1.jsonl", "{}\n");

        let outcome = locator_for(dir.path()).locate("t1.2", None);
        assert_eq!(outcome.max_count, 4);
        assert_eq!(outcome.artifacts.len(), 1);
        assert!(outcome.artifacts[0]
            .path
            .to_string_lossy()
            .ends_with("t1.2.jsonl"));
    }

    #[test]
    fn test_max_across_duplicate_exports_not_sum() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "t1.jsonl", "{}\n{}\n{}\n");
        write_file(dir.path(), "t1.csv", "a\n1\n2\n");
        let outcome = locator_for(dir.path()).locate("t1", None);
        assert_eq!(outcome.max_count, 3);
        assert_eq!(outcome.artifacts.len(), 2);
    }

    #[test]
    fn test_project_scoped_template() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "p9/t1.jsonl", "{}\n{}\n");
        let locator = locator_for(dir.path());
        assert_eq!(locator.locate("t1", Some("p9")).max_count, 2);
        // 项目未知时退化为枚举一级子目录
        assert_eq!(locator.locate("t1", None).max_count, 2);
    }

    #[test]
    fn test_legacy_naming_convention() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "results_t1.jsonl", "{}\n");
        assert_eq!(locator_for(dir.path()).locate("t1", None).max_count, 1);
    }

    #[test]
    fn test_missing_empty_and_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        // 零字节文件跳过
        write_file(dir.path(), "t1.jsonl", "");
        // 损坏的 JSON 跳过，不报错
        write_file(dir.path(), "t2.json", "{not json");

        let locator = locator_for(dir.path());
        assert_eq!(locator.locate("t1", None).max_count, 0);
        assert_eq!(locator.locate("t2", None).max_count, 0);
        assert_eq!(locator.locate("no-such-task", None).max_count, 0);
    }
}
