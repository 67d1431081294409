use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::Metadata;
use tracing_subscriber::fmt::writer::{MakeWriter, OptionalWriter};

use crate::level::Severity;
use crate::record::LogRecord;
use crate::root::RootLogger;
use crate::router::SeverityFilter;

/// 处理器种类，每种最多安装一个
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Stdout,
    Stderr,
    Remote,
    SpanBridge,
}

/// 日志处理器
pub trait Handler: Send + Sync {
    fn kind(&self) -> HandlerKind;

    fn filter(&self) -> Option<SeverityFilter> {
        None
    }

    fn accepts(&self, record: &LogRecord) -> bool {
        self.filter()
            .map_or(true, |filter| filter.accepts(record.level))
    }

    fn emit(&self, record: &LogRecord);

    fn flush(&self) {}

    /// 控制台处理器的输出目标，由 fmt 层写入
    fn stream_writer(&self) -> Option<StreamWriter> {
        None
    }
}

/// 可共享的输出流
#[derive(Clone)]
pub struct StreamWriter(Arc<Mutex<Box<dyn Write + Send>>>);

impl StreamWriter {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self(Arc::new(Mutex::new(writer)))
    }
}

impl Write for StreamWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        // fmt 层一次写入整行，持锁写完避免行交错
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).flush()
    }
}

/// 控制台（stdout/stderr）处理器
///
/// 只决定记录是否写到这个流以及写到哪里；行格式由 `tracing_subscriber::fmt`
/// 层生成（见 [`StreamTarget`]），所以 `emit` 不做任何事。
pub struct StreamHandler {
    kind: HandlerKind,
    filter: SeverityFilter,
    writer: StreamWriter,
}

impl StreamHandler {
    pub fn new(kind: HandlerKind, filter: SeverityFilter, writer: Box<dyn Write + Send>) -> Self {
        Self {
            kind,
            filter,
            writer: StreamWriter::new(writer),
        }
    }

    /// < ERROR 的记录写入 stdout
    pub fn stdout() -> Self {
        Self::new(HandlerKind::Stdout, SeverityFilter::Low, Box::new(io::stdout()))
    }

    /// >= ERROR 的记录写入 stderr
    pub fn stderr() -> Self {
        Self::new(HandlerKind::Stderr, SeverityFilter::High, Box::new(io::stderr()))
    }
}

impl Handler for StreamHandler {
    fn kind(&self) -> HandlerKind {
        self.kind
    }

    fn filter(&self) -> Option<SeverityFilter> {
        Some(self.filter)
    }

    fn emit(&self, _record: &LogRecord) {}

    fn flush(&self) {
        let _ = self.writer.clone().flush();
    }

    fn stream_writer(&self) -> Option<StreamWriter> {
        Some(self.writer.clone())
    }
}

/// fmt 层的写入目标
///
/// 每个事件按级别向根记录器查询对应种类的流处理器：没有安装、级别被根记录器
/// 或处理器的过滤器拒绝时写入空设备。
pub struct StreamTarget {
    root: Arc<RootLogger>,
    kind: HandlerKind,
}

impl StreamTarget {
    pub fn new(root: Arc<RootLogger>, kind: HandlerKind) -> Self {
        Self { root, kind }
    }

    pub fn writer_for(&self, level: Severity) -> Option<StreamWriter> {
        self.root.stream_writer(self.kind, level)
    }
}

impl<'a> MakeWriter<'a> for StreamTarget {
    type Writer = OptionalWriter<StreamWriter>;

    fn make_writer(&'a self) -> Self::Writer {
        OptionalWriter::none()
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        self.writer_for(Severity::from(*meta.level())).into()
    }
}
