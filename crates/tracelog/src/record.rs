use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::level::Severity;

/// 记录属性名
pub mod attr {
    pub const NAME: &str = "name";
    pub const MSG: &str = "msg";
    pub const EXC_INFO: &str = "exc_info";
    pub const EXC_TEXT: &str = "exc_text";
    pub const MSECS: &str = "msecs";
    pub const RELATIVE_CREATED: &str = "relative_created";
    pub const LEVELNAME: &str = "levelname";
    pub const LEVELNO: &str = "levelno";
    pub const CREATED: &str = "created";
    pub const THREAD_NAME: &str = "thread_name";
    pub const PROCESS: &str = "process";

    pub const OTEL_SPAN_ID: &str = "otel.span_id";
    pub const OTEL_TRACE_ID: &str = "otel.trace_id";
    pub const OTEL_SERVICE_NAME: &str = "otel.service_name";
}

/// 属性值（标量）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl AttrValue {
    /// 空字符串、0、0.0 与 false 视为“空”值
    pub fn is_falsy(&self) -> bool {
        match self {
            AttrValue::Bool(value) => !value,
            AttrValue::Int(value) => *value == 0,
            AttrValue::Float(value) => *value == 0.0,
            AttrValue::Str(value) => value.is_empty(),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(value) => write!(f, "{}", value),
            AttrValue::Int(value) => write!(f, "{}", value),
            AttrValue::Float(value) => write!(f, "{}", value),
            AttrValue::Str(value) => f.write_str(value),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::Int(value.into())
    }
}

impl From<u32> for AttrValue {
    fn from(value: u32) -> Self {
        AttrValue::Int(value.into())
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<AttrValue> for opentelemetry::Value {
    fn from(value: AttrValue) -> Self {
        match value {
            AttrValue::Bool(value) => value.into(),
            AttrValue::Int(value) => value.into(),
            AttrValue::Float(value) => value.into(),
            AttrValue::Str(value) => value.into(),
        }
    }
}

/// 附加在记录上的异常信息
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionInfo {
    pub type_name: String,
    pub message: String,
    /// 错误链的格式化文本
    pub text: Option<String>,
}

impl ExceptionInfo {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            text: None,
        }
    }

    pub fn from_error<E>(err: &E) -> Self
    where
        E: std::error::Error + 'static,
    {
        let mut info = Self::from_dyn(err);
        info.type_name = std::any::type_name::<E>().to_string();
        info
    }

    /// 类型被擦除的错误（例如来自 tracing 字段）
    pub fn from_dyn(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(format!("Caused by: {}", cause));
            source = cause.source();
        }

        Self {
            type_name: "error".to_string(),
            message: err.to_string(),
            text: if causes.is_empty() {
                None
            } else {
                Some(format!("{}\n{}", err, causes.join("\n")))
            },
        }
    }
}

/// 一条日志记录
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: Severity,
    pub message: String,
    /// 记录器名称（tracing target）
    pub name: String,
    pub created: SystemTime,
    /// 相对于根记录器创建时刻
    pub relative_created: Duration,
    pub thread_name: Option<String>,
    pub exception: Option<ExceptionInfo>,
    pub attributes: BTreeMap<String, AttrValue>,
}

impl LogRecord {
    pub fn new(level: Severity, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            name: "root".to_string(),
            created: SystemTime::now(),
            relative_created: Duration::ZERO,
            thread_name: std::thread::current().name().map(str::to_string),
            exception: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_exception(mut self, exception: ExceptionInfo) -> Self {
        self.exception = Some(exception);
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// 创建时间的毫秒部分
    pub fn msecs(&self) -> u32 {
        self.created
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.subsec_millis())
            .unwrap_or(0)
    }

    /// 创建时间（Unix 秒）
    pub fn created_secs(&self) -> f64 {
        self.created
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or(0.0)
    }

    /// 完整属性视图：内部字段、消息与扩展属性，内部字段优先
    pub fn attribute_view(&self) -> BTreeMap<String, AttrValue> {
        let mut view = self.attributes.clone();

        view.insert(attr::NAME.to_string(), self.name.clone().into());
        view.insert(attr::MSG.to_string(), self.message.clone().into());
        view.insert(attr::LEVELNAME.to_string(), self.level.to_string().into());
        view.insert(attr::LEVELNO.to_string(), self.level.value().into());
        view.insert(attr::CREATED.to_string(), self.created_secs().into());
        view.insert(attr::PROCESS.to_string(), std::process::id().into());
        if let Some(thread_name) = &self.thread_name {
            view.insert(attr::THREAD_NAME.to_string(), thread_name.clone().into());
        }
        view.insert(attr::MSECS.to_string(), self.msecs().into());
        view.insert(
            attr::RELATIVE_CREATED.to_string(),
            (self.relative_created.as_secs_f64() * 1000.0).into(),
        );

        if let Some(exception) = &self.exception {
            view.insert(attr::EXC_INFO.to_string(), exception.type_name.clone().into());
            if let Some(text) = &exception.text {
                view.insert(attr::EXC_TEXT.to_string(), text.clone().into());
            }
        }

        view
    }
}

/// 记录上下文：创建记录时写入每条记录的静态属性
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordContext {
    attributes: BTreeMap<String, AttrValue>,
}

impl RecordContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    pub fn stamp(&self, record: &mut LogRecord) {
        for (key, value) in &self.attributes {
            record.attributes.insert(key.clone(), value.clone());
        }
    }
}

impl<K, V> FromIterator<(K, V)> for RecordContext
where
    K: Into<String>,
    V: Into<AttrValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            attributes: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[derive(Debug, thiserror::Error)]
    #[error("request failed")]
    struct RequestError {
        #[source]
        source: io::Error,
    }

    #[test]
    fn test_falsy_values() {
        assert!(AttrValue::from("").is_falsy());
        assert!(AttrValue::from(0).is_falsy());
        assert!(AttrValue::from(0.0).is_falsy());
        assert!(AttrValue::from(false).is_falsy());
        assert!(!AttrValue::from("x").is_falsy());
        assert!(!AttrValue::from(-1).is_falsy());
    }

    #[test]
    fn test_attribute_view_contains_bookkeeping() {
        let record = LogRecord::new(Severity::INFO, "hello")
            .with_name("app::db")
            .with_attr("user_id", "u-1");

        let view = record.attribute_view();
        assert_eq!(view.get(attr::MSG), Some(&AttrValue::from("hello")));
        assert_eq!(view.get(attr::NAME), Some(&AttrValue::from("app::db")));
        assert_eq!(view.get("user_id"), Some(&AttrValue::from("u-1")));
        assert!(view.contains_key(attr::MSECS));
        assert!(view.contains_key(attr::RELATIVE_CREATED));
        assert!(!view.contains_key(attr::EXC_INFO));
    }

    #[test]
    fn test_attribute_view_contains_level_thread_and_process() {
        let mut record = LogRecord::new(Severity::WARNING, "slow");
        record.thread_name = Some("worker-1".to_string());

        let view = record.attribute_view();
        assert_eq!(view.get(attr::LEVELNAME), Some(&AttrValue::from("WARNING")));
        assert_eq!(view.get(attr::LEVELNO), Some(&AttrValue::Int(30)));
        assert_eq!(view.get(attr::THREAD_NAME), Some(&AttrValue::from("worker-1")));
        assert_eq!(
            view.get(attr::PROCESS),
            Some(&AttrValue::Int(std::process::id().into()))
        );
        assert!(matches!(view.get(attr::CREATED), Some(AttrValue::Float(secs)) if *secs > 0.0));
    }

    #[test]
    fn test_builtin_fields_win_over_extras() {
        let record = LogRecord::new(Severity::INFO, "real").with_attr(attr::MSG, "fake");
        assert_eq!(
            record.attribute_view().get(attr::MSG),
            Some(&AttrValue::from("real"))
        );
    }

    #[test]
    fn test_exception_from_error_chain() {
        let err = RequestError {
            source: io::Error::new(io::ErrorKind::Other, "connection reset"),
        };
        let info = ExceptionInfo::from_error(&err);

        assert!(info.type_name.ends_with("RequestError"));
        assert_eq!(info.message, "request failed");
        assert_eq!(
            info.text.as_deref(),
            Some("request failed\nCaused by: connection reset")
        );
    }

    #[test]
    fn test_record_context_stamp() {
        let context: RecordContext = [("app", "billing"), ("region", "eu")].into_iter().collect();
        let mut record = LogRecord::new(Severity::INFO, "m");
        context.stamp(&mut record);

        assert_eq!(record.attributes.get("app"), Some(&AttrValue::from("billing")));
        assert_eq!(record.attributes.len(), 2);
    }
}
