use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use crate::handler::{Handler, HandlerKind, StreamWriter};
use crate::level::Severity;
use crate::record::{attr, LogRecord, RecordContext};
use crate::tracer::current_trace_ids;

struct RootState {
    level: Severity,
    handlers: Vec<Arc<dyn Handler>>,
    context: RecordContext,
    /// 开启后每条记录附带 trace/span id 与服务名
    correlation: Option<String>,
}

/// 根记录器：级别、处理器集合与记录上下文
///
/// 可在多线程间共享，记录的分发只持有读锁。
pub struct RootLogger {
    state: RwLock<RootState>,
    started: Instant,
}

impl RootLogger {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RootState {
                level: Severity::default(),
                handlers: Vec::new(),
                context: RecordContext::default(),
                correlation: None,
            }),
            started: Instant::now(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RootState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RootState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn level(&self) -> Severity {
        self.read().level
    }

    pub fn set_level(&self, level: Severity) {
        self.write().level = level;
    }

    pub fn is_enabled_for(&self, level: Severity) -> bool {
        level >= self.level()
    }

    pub fn has_handlers(&self) -> bool {
        !self.read().handlers.is_empty()
    }

    pub fn handler_count(&self) -> usize {
        self.read().handlers.len()
    }

    pub fn handler_kinds(&self) -> Vec<HandlerKind> {
        self.read().handlers.iter().map(|h| h.kind()).collect()
    }

    /// 添加处理器；同一个处理器不会重复添加
    pub fn add_handler(&self, handler: Arc<dyn Handler>) {
        let mut state = self.write();
        if !state.handlers.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            state.handlers.push(handler);
        }
    }

    pub fn remove_handler(&self, handler: &Arc<dyn Handler>) {
        self.write().handlers.retain(|h| !Arc::ptr_eq(h, handler));
    }

    /// 首次配置：设置级别并安装完整的处理器集合；已有处理器时不做任何事
    pub(crate) fn configure(&self, level: Severity, handlers: &[Arc<dyn Handler>]) {
        let mut state = self.write();
        if !state.handlers.is_empty() {
            return;
        }
        state.level = level;
        state.handlers = handlers.to_vec();
    }

    /// 给定级别的事件应写入的控制台流；根级别或处理器过滤器拒绝时为 None
    pub(crate) fn stream_writer(&self, kind: HandlerKind, level: Severity) -> Option<StreamWriter> {
        let state = self.read();
        if level < state.level {
            return None;
        }
        state
            .handlers
            .iter()
            .find(|h| h.kind() == kind)
            .filter(|h| h.filter().map_or(true, |filter| filter.accepts(level)))
            .and_then(|h| h.stream_writer())
    }

    pub fn record_context(&self) -> RecordContext {
        self.read().context.clone()
    }

    pub fn set_record_context(&self, context: RecordContext) {
        self.write().context = context;
    }

    pub(crate) fn enable_correlation(&self, service_name: impl Into<String>) {
        self.write().correlation = Some(service_name.into());
    }

    pub fn correlation_enabled(&self) -> bool {
        self.read().correlation.is_some()
    }

    /// 创建记录：写入相对时间、记录上下文与追踪关联字段
    pub fn make_record(&self, level: Severity, message: impl Into<String>) -> LogRecord {
        let mut record = LogRecord::new(level, message);
        record.relative_created = self.started.elapsed();

        let state = self.read();
        state.context.stamp(&mut record);

        if let Some(service_name) = &state.correlation {
            let (trace_id, span_id) =
                current_trace_ids().unwrap_or_else(|| ("0".to_string(), "0".to_string()));
            record.attributes.insert(attr::OTEL_TRACE_ID.to_string(), trace_id.into());
            record.attributes.insert(attr::OTEL_SPAN_ID.to_string(), span_id.into());
            record
                .attributes
                .insert(attr::OTEL_SERVICE_NAME.to_string(), service_name.clone().into());
        }

        record
    }

    /// 分发记录到各处理器（先检查根级别，再检查各处理器的过滤器）
    pub fn handle(&self, record: &LogRecord) {
        let handlers = {
            let state = self.read();
            if record.level < state.level {
                return;
            }
            state.handlers.clone()
        };

        for handler in handlers.iter().filter(|h| h.accepts(record)) {
            handler.emit(record);
        }
    }

    pub fn log(&self, level: Severity, message: impl Into<String>) {
        if self.is_enabled_for(level) {
            self.handle(&self.make_record(level, message));
        }
    }

    pub fn flush(&self) {
        let handlers = self.read().handlers.clone();
        for handler in &handlers {
            handler.flush();
        }
    }
}

impl Default for RootLogger {
    fn default() -> Self {
        Self::new()
    }
}
