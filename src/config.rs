//! 翻译与执行配置
//!
//! 可从 JSON 文件加载，缺失的字段使用默认值

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 顶层配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    pub script: ScriptConfig,
    pub engine: EngineConfig,
}

/// 文本脚本输出配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// 顶层遍历的源名称
    pub traversal_source: String,
    /// 嵌套子遍历的匿名源名称
    pub anonymous_source: String,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            traversal_source: "g".to_string(),
            anonymous_source: "__".to_string(),
        }
    }
}

/// 参考执行引擎配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 没有 times/until 约束的 repeat 最多循环次数
    pub max_loops: u32,
    /// 单个步骤允许产生的最大遍历器数量
    pub max_traversers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_loops: 1024,
            max_traversers: 1_000_000,
        }
    }
}

impl TranslatorConfig {
    /// 从 JSON 字符串解析
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// 从 JSON 文件加载
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.script.traversal_source.is_empty() {
            return Err(Error::Config("traversal_source 不能为空".to_string()));
        }
        if self.script.anonymous_source.is_empty() {
            return Err(Error::Config("anonymous_source 不能为空".to_string()));
        }
        if self.engine.max_loops == 0 {
            return Err(Error::Config("max_loops 必须大于 0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = TranslatorConfig::from_json(r#"{"engine": {"max_loops": 8}}"#).unwrap();
        assert_eq!(config.engine.max_loops, 8);
        assert_eq!(config.engine.max_traversers, 1_000_000);
        assert_eq!(config.script.traversal_source, "g");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"script": {{"traversal_source": "social"}}}}"#).unwrap();

        let config = TranslatorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.script.traversal_source, "social");
        assert_eq!(config.script.anonymous_source, "__");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = TranslatorConfig::from_json(r#"{"engine": {"max_loops": 0}}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = TranslatorConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
