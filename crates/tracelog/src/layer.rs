use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::handler::{HandlerKind, StreamTarget};
use crate::level::Severity;
use crate::record::{AttrValue, ExceptionInfo};
use crate::root::RootLogger;

/// 根记录器接入 tracing 的完整层：记录层，加上 stdout/stderr 两个 fmt 层
pub fn root_layer<S>(root: Arc<RootLogger>) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    RecordLayer::new(root.clone())
        .and_then(stream_layer(root.clone(), HandlerKind::Stdout))
        .and_then(stream_layer(root, HandlerKind::Stderr))
}

// 过滤在格式化之前执行，写入目标在格式化之后再确认一次
fn stream_layer<S>(root: Arc<RootLogger>, kind: HandlerKind) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let routing = StreamTarget::new(root.clone(), kind);
    let routed = filter_fn(move |metadata| {
        !metadata.is_event() || routing.writer_for(Severity::from(*metadata.level())).is_some()
    });

    tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(StreamTarget::new(root, kind))
        .with_filter(routed)
}

const MESSAGE_FIELD: &str = "message";

/// 把 tracing 事件转换为日志记录并交给根记录器
///
/// 本 crate 自身的事件（如发送失败的告警）不会被转发，避免发送器自我循环。
pub struct RecordLayer {
    root: Arc<RootLogger>,
}

impl RecordLayer {
    pub fn new(root: Arc<RootLogger>) -> Self {
        Self { root }
    }
}

fn is_internal(target: &str) -> bool {
    let crate_name = env!("CARGO_CRATE_NAME");
    target == crate_name
        || target
            .strip_prefix(crate_name)
            .map_or(false, |rest| rest.starts_with("::"))
}

impl<S> Layer<S> for RecordLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_internal(metadata.target()) {
            return;
        }

        let level = Severity::from(*metadata.level());
        if !self.root.is_enabled_for(level) {
            return;
        }

        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        let message = visitor
            .message
            .unwrap_or_else(|| metadata.name().to_string());
        let mut record = self
            .root
            .make_record(level, message)
            .with_name(metadata.target());

        if let Some(file) = metadata.file() {
            record.attributes.insert("code.filepath".to_string(), file.into());
        }
        if let Some(line) = metadata.line() {
            record.attributes.insert("code.lineno".to_string(), line.into());
        }
        if let Some(module) = metadata.module_path() {
            record.attributes.insert("code.namespace".to_string(), module.into());
        }

        record.attributes.extend(visitor.fields);
        record.exception = visitor.exception;

        self.root.handle(&record);
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: Option<String>,
    fields: BTreeMap<String, AttrValue>,
    exception: Option<ExceptionInfo>,
}

impl RecordVisitor {
    fn insert(&mut self, field: &Field, value: AttrValue) {
        if field.name() == MESSAGE_FIELD {
            self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for RecordVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, value.into());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        let value = i64::try_from(value)
            .map(AttrValue::Int)
            .unwrap_or(AttrValue::Float(value as f64));
        self.insert(field, value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.into());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.into());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.exception = Some(ExceptionInfo::from_dyn(value));
        self.insert(field, value.to_string().into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, format!("{:?}", value).into());
    }
}
