pub mod bridge;
pub mod error;
pub mod handler;
pub mod layer;
pub mod level;
pub mod logstash;
pub mod manager;
pub mod record;
pub mod remote;
pub mod root;
pub mod router;
pub mod settings;
pub mod tracer;

pub use bridge::{
    bridge_record, record_attrs, OtelSpanAccessor, SpanAccessor, SpanBridgeHandler, SpanHandle,
};
pub use error::{Result, TraceLogError};
pub use handler::{Handler, HandlerKind, StreamHandler, StreamTarget, StreamWriter};
pub use layer::{root_layer, RecordLayer};
pub use level::{LevelSpec, Severity};
pub use logstash::{LogstashEvent, LogstashFormatter};
pub use manager::{RemoteLoggerOptions, TraceLog};
pub use record::{AttrValue, ExceptionInfo, LogRecord, RecordContext};
pub use remote::{FlushReport, RemoteHandler, ShipperConfig};
pub use root::RootLogger;
pub use router::{SeverityFilter, ERROR_THRESHOLD};
pub use settings::Settings;
pub use tracer::{current_trace_ids, shutdown_tracer, TracerConfig};
