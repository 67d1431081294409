use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TraceLogError;

/// 日志严重级别（数值越大越严重）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Severity(u32);

impl Severity {
    pub const NOTSET: Severity = Severity(0);
    pub const TRACE: Severity = Severity(5);
    pub const DEBUG: Severity = Severity(10);
    pub const INFO: Severity = Severity(20);
    pub const WARNING: Severity = Severity(30);
    pub const ERROR: Severity = Severity(40);
    pub const CRITICAL: Severity = Severity(50);

    pub const fn new(value: u32) -> Self {
        Severity(value)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    /// 已知级别返回其名称
    pub fn name(self) -> Option<&'static str> {
        match self {
            Severity::NOTSET => Some("NOTSET"),
            Severity::TRACE => Some("TRACE"),
            Severity::DEBUG => Some("DEBUG"),
            Severity::INFO => Some("INFO"),
            Severity::WARNING => Some("WARNING"),
            Severity::ERROR => Some("ERROR"),
            Severity::CRITICAL => Some("CRITICAL"),
            _ => None,
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::WARNING
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.pad(name),
            None => f.pad(&format!("Level {}", self.0)),
        }
    }
}

impl From<u32> for Severity {
    fn from(value: u32) -> Self {
        Severity(value)
    }
}

impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Severity::TRACE,
            tracing::Level::DEBUG => Severity::DEBUG,
            tracing::Level::INFO => Severity::INFO,
            tracing::Level::WARN => Severity::WARNING,
            tracing::Level::ERROR => Severity::ERROR,
        }
    }
}

impl FromStr for Severity {
    type Err = TraceLogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NOTSET" => Ok(Severity::NOTSET),
            "TRACE" => Ok(Severity::TRACE),
            "DEBUG" => Ok(Severity::DEBUG),
            "INFO" => Ok(Severity::INFO),
            "WARNING" | "WARN" => Ok(Severity::WARNING),
            "ERROR" => Ok(Severity::ERROR),
            "CRITICAL" | "FATAL" => Ok(Severity::CRITICAL),
            _ => Err(TraceLogError::InvalidLevel(s.to_string())),
        }
    }
}

/// 初始化函数接受的级别参数：缺省、数值或名称
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LevelSpec {
    #[default]
    Default,
    Numeric(u32),
    Name(String),
}

impl LevelSpec {
    /// 解析为具体级别，名称不区分大小写
    pub fn resolve(&self) -> Result<Severity, TraceLogError> {
        match self {
            LevelSpec::Default => Ok(Severity::default()),
            LevelSpec::Numeric(value) => Ok(Severity(*value)),
            LevelSpec::Name(name) => name.parse(),
        }
    }
}

impl From<Severity> for LevelSpec {
    fn from(level: Severity) -> Self {
        LevelSpec::Numeric(level.value())
    }
}

impl From<u32> for LevelSpec {
    fn from(value: u32) -> Self {
        LevelSpec::Numeric(value)
    }
}

impl From<&str> for LevelSpec {
    fn from(name: &str) -> Self {
        LevelSpec::Name(name.to_string())
    }
}

impl From<String> for LevelSpec {
    fn from(name: String) -> Self {
        LevelSpec::Name(name)
    }
}

impl<T: Into<LevelSpec>> From<Option<T>> for LevelSpec {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}
