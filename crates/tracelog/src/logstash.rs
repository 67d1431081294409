use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::record::{AttrValue, LogRecord};

/// 事件自身的字段名；同名的扩展属性加上 `extra.` 前缀
const RESERVED_FIELDS: [&str; 15] = [
    "@timestamp",
    "@version",
    "@metadata",
    "host",
    "level",
    "logsource",
    "message",
    "pid",
    "program",
    "type",
    "tags",
    "logger_name",
    "thread_name",
    "error_type",
    "stack_trace",
];

const EXTRA_PREFIX: &str = "extra.";

fn extra_fields(attributes: &BTreeMap<String, AttrValue>) -> BTreeMap<String, AttrValue> {
    attributes
        .iter()
        .map(|(key, value)| {
            if RESERVED_FIELDS.contains(&key.as_str()) {
                (format!("{}{}", EXTRA_PREFIX, key), value.clone())
            } else {
                (key.clone(), value.clone())
            }
        })
        .collect()
}

/// Logstash 元数据
#[derive(Debug, Clone, Serialize)]
pub struct LogstashMetadata {
    /// Elasticsearch 索引名
    pub beat: String,
}

/// 发送给 Logstash 的事件（每行一个 JSON）
#[derive(Debug, Clone, Serialize)]
pub struct LogstashEvent {
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,

    #[serde(rename = "@version")]
    pub version: &'static str,

    pub host: String,
    pub level: String,
    pub logsource: String,
    pub message: String,
    pub pid: u32,
    pub program: String,

    #[serde(rename = "type")]
    pub message_type: String,

    pub tags: Vec<String>,

    #[serde(rename = "@metadata")]
    pub metadata: LogstashMetadata,

    pub logger_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,

    /// 扩展属性，直接展开到顶层
    #[serde(flatten)]
    pub extra: BTreeMap<String, AttrValue>,
}

/// Logstash 格式化器
#[derive(Debug, Clone)]
pub struct LogstashFormatter {
    message_type: String,
    index_name: String,
    host: String,
    program: String,
}

impl LogstashFormatter {
    pub fn new(message_type: impl Into<String>, index_name: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            index_name: index_name.into(),
            host: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string()),
            program: std::env::args()
                .next()
                .as_deref()
                .and_then(|arg0| Path::new(arg0).file_name())
                .and_then(|name| name.to_str())
                .unwrap_or("unknown")
                .to_string(),
        }
    }

    pub fn format(&self, record: &LogRecord) -> LogstashEvent {
        let exception = record.exception.as_ref();

        LogstashEvent {
            timestamp: record.created.into(),
            version: "1",
            host: self.host.clone(),
            level: record.level.to_string(),
            logsource: self.host.clone(),
            message: record.message.clone(),
            pid: std::process::id(),
            program: self.program.clone(),
            message_type: self.message_type.clone(),
            tags: Vec::new(),
            metadata: LogstashMetadata {
                beat: self.index_name.clone(),
            },
            logger_name: record.name.clone(),
            thread_name: record.thread_name.clone(),
            error_type: exception.map(|e| e.type_name.clone()),
            stack_trace: exception.map(|e| e.text.clone().unwrap_or_else(|| e.message.clone())),
            extra: extra_fields(&record.attributes),
        }
    }

    pub fn to_line(&self, record: &LogRecord) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(&self.format(record))?;
        line.push('\n');
        Ok(line)
    }
}
