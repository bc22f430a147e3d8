use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 结果文件格式（封闭集合，每种格式一个计数规则）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ResultFormat {
    JsonLines,
    Json,
    Csv,
    Xml,
}

impl ResultFormat {
    pub const ALL: [ResultFormat; 4] = [
        ResultFormat::JsonLines,
        ResultFormat::Json,
        ResultFormat::Csv,
        ResultFormat::Xml,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            ResultFormat::JsonLines => "jsonl",
            ResultFormat::Json => "json",
            ResultFormat::Csv => "csv",
            ResultFormat::Xml => "xml",
        }
    }
}

/// 单个结果产物的描述（文件路径、格式与解析出的条目数）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultArtifact {
    pub task_id: String,
    pub format: ResultFormat,
    pub path: PathBuf,
    pub item_count: i64,
    pub modified_at: Option<DateTime<Utc>>,
}

/// 结果定位的探测结论
///
/// max_count 取各产物计数的最大值而非总和——多个产物往往是同一次运行的重复导出。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocateOutcome {
    pub max_count: i64,
    pub artifacts: Vec<ResultArtifact>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extensions_cover_all_formats() {
        let exts: Vec<&str> = ResultFormat::ALL.iter().map(|f| f.extension()).collect();
        assert_eq!(exts, vec!["jsonl", "json", "csv", "xml"]);
    }

    #[test]
    fn test_locate_outcome_default_is_zero() {
        let outcome = LocateOutcome::default();
        assert_eq!(outcome.max_count, 0);
        assert!(outcome.artifacts.is_empty());
    }
}
