//! 日志记录到追踪 span 的桥接
//!
//! 每条记录在当前 span 上生成一个事件；ERROR 及以上级别同时把 span 状态置为错误，
//! 带异常的记录生成 `exception` 事件。

use opentelemetry::trace::{SpanRef, Status, TraceContextExt};
use opentelemetry::{Context, KeyValue};
use std::collections::BTreeMap;
use std::time::SystemTime;

use crate::handler::{Handler, HandlerKind};
use crate::level::Severity;
use crate::record::{attr, AttrValue, ExceptionInfo, LogRecord};

pub const ORIGINAL_MESSAGE: &str = "original.message";

/// 不写入 span 事件的内部字段
const DROPPED_ATTRS: [&str; 8] = [
    attr::NAME,
    attr::EXC_INFO,
    attr::EXC_TEXT,
    attr::MSECS,
    attr::RELATIVE_CREATED,
    attr::OTEL_SPAN_ID,
    attr::OTEL_TRACE_ID,
    attr::OTEL_SERVICE_NAME,
];

/// 对 span 的最小操作集
pub trait SpanHandle {
    fn set_error_status(&self, description: String);

    fn add_event(&self, name: String, timestamp: SystemTime, attributes: Vec<KeyValue>);

    fn record_exception(
        &self,
        exception: &ExceptionInfo,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    );
}

/// 当前 span 的查找
pub trait SpanAccessor: Send + Sync {
    /// 只有存在有效的当前 span 时才调用 `f`
    fn with_current_span(&self, f: &mut dyn FnMut(&dyn SpanHandle));
}

/// 从 OpenTelemetry 当前上下文获取 span
#[derive(Debug, Default, Clone, Copy)]
pub struct OtelSpanAccessor;

impl SpanAccessor for OtelSpanAccessor {
    fn with_current_span(&self, f: &mut dyn FnMut(&dyn SpanHandle)) {
        let cx = Context::current();
        let span = cx.span();
        if span.span_context().is_valid() {
            f(&OtelSpan(span));
        }
    }
}

struct OtelSpan<'a>(SpanRef<'a>);

impl SpanHandle for OtelSpan<'_> {
    fn set_error_status(&self, description: String) {
        self.0.set_status(Status::error(description));
    }

    fn add_event(&self, name: String, timestamp: SystemTime, attributes: Vec<KeyValue>) {
        self.0.add_event_with_timestamp(name, timestamp, attributes);
    }

    fn record_exception(
        &self,
        exception: &ExceptionInfo,
        timestamp: SystemTime,
        mut attributes: Vec<KeyValue>,
    ) {
        attributes.push(KeyValue::new("exception.type", exception.type_name.clone()));
        attributes.push(KeyValue::new("exception.message", exception.message.clone()));
        if let Some(text) = &exception.text {
            attributes.push(KeyValue::new("exception.stacktrace", text.clone()));
        }
        self.0.add_event_with_timestamp("exception", timestamp, attributes);
    }
}

/// 计算写入 span 事件的属性
///
/// 去掉空值、内部字段和追踪关联字段。`remove_msg` 为真时去掉消息（消息作为事件名），
/// 否则改名为 `original.message`。
pub fn record_attrs(record: &LogRecord, remove_msg: bool) -> BTreeMap<String, AttrValue> {
    let mut attrs: BTreeMap<String, AttrValue> = record
        .attribute_view()
        .into_iter()
        .filter(|(_, value)| !value.is_falsy())
        .collect();

    for key in DROPPED_ATTRS {
        attrs.remove(key);
    }

    let message = attrs.remove(attr::MSG);
    if !remove_msg {
        if let Some(message) = message {
            attrs.insert(ORIGINAL_MESSAGE.to_string(), message);
        }
    }

    attrs
}

fn to_key_values(attrs: BTreeMap<String, AttrValue>) -> Vec<KeyValue> {
    attrs
        .into_iter()
        .map(|(key, value)| KeyValue::new(key, value))
        .collect()
}

/// 把一条记录写入给定 span
pub fn bridge_record(span: &dyn SpanHandle, record: &LogRecord) {
    if record.level >= Severity::ERROR {
        span.set_error_status(record.message.clone());

        if let Some(exception) = &record.exception {
            let attributes = to_key_values(record_attrs(record, false));
            span.record_exception(exception, record.created, attributes);
            return;
        }
    }

    let attributes = to_key_values(record_attrs(record, true));
    span.add_event(record.message.clone(), record.created, attributes);
}

/// 把日志记录导出到追踪系统的处理器
pub struct SpanBridgeHandler {
    accessor: Box<dyn SpanAccessor>,
}

impl SpanBridgeHandler {
    pub fn new(accessor: impl SpanAccessor + 'static) -> Self {
        Self {
            accessor: Box::new(accessor),
        }
    }
}

impl Default for SpanBridgeHandler {
    fn default() -> Self {
        Self::new(OtelSpanAccessor)
    }
}

impl Handler for SpanBridgeHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::SpanBridge
    }

    fn emit(&self, record: &LogRecord) {
        self.accessor
            .with_current_span(&mut |span| bridge_record(span, record));
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    pub enum SpanCall {
        ErrorStatus(String),
        Event {
            name: String,
            attributes: Vec<KeyValue>,
        },
        Exception {
            type_name: String,
            attributes: Vec<KeyValue>,
        },
    }

    /// 记录所有 span 操作的假 span
    #[derive(Clone, Default)]
    pub struct RecordingAccessor {
        pub active: bool,
        pub calls: Arc<Mutex<Vec<SpanCall>>>,
    }

    impl RecordingAccessor {
        pub fn active() -> Self {
            Self {
                active: true,
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<SpanCall> {
            self.calls.lock().unwrap().clone()
        }

        /// 去掉每条记录都带的级别、线程、进程与时间字段，只留业务属性
        pub fn user_calls(&self) -> Vec<SpanCall> {
            self.calls()
                .into_iter()
                .map(|call| match call {
                    SpanCall::Event { name, attributes } => SpanCall::Event {
                        name,
                        attributes: without_bookkeeping(attributes),
                    },
                    SpanCall::Exception {
                        type_name,
                        attributes,
                    } => SpanCall::Exception {
                        type_name,
                        attributes: without_bookkeeping(attributes),
                    },
                    call => call,
                })
                .collect()
        }
    }

    pub const BOOKKEEPING_ATTRS: [&str; 5] = [
        attr::LEVELNAME,
        attr::LEVELNO,
        attr::CREATED,
        attr::THREAD_NAME,
        attr::PROCESS,
    ];

    fn without_bookkeeping(attributes: Vec<KeyValue>) -> Vec<KeyValue> {
        attributes
            .into_iter()
            .filter(|kv| !BOOKKEEPING_ATTRS.contains(&kv.key.as_str()))
            .collect()
    }

    impl SpanHandle for RecordingAccessor {
        fn set_error_status(&self, description: String) {
            self.calls.lock().unwrap().push(SpanCall::ErrorStatus(description));
        }

        fn add_event(&self, name: String, _timestamp: SystemTime, attributes: Vec<KeyValue>) {
            self.calls
                .lock()
                .unwrap()
                .push(SpanCall::Event { name, attributes });
        }

        fn record_exception(
            &self,
            exception: &ExceptionInfo,
            _timestamp: SystemTime,
            attributes: Vec<KeyValue>,
        ) {
            self.calls.lock().unwrap().push(SpanCall::Exception {
                type_name: exception.type_name.clone(),
                attributes,
            });
        }
    }

    impl SpanAccessor for RecordingAccessor {
        fn with_current_span(&self, f: &mut dyn FnMut(&dyn SpanHandle)) {
            if self.active {
                f(self);
            }
        }
    }
}
