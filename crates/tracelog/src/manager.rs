use std::sync::Arc;
use tracing::{debug, Subscriber};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::bridge::SpanBridgeHandler;
use crate::error::Result;
use crate::handler::{Handler, HandlerKind, StreamHandler};
use crate::layer;
use crate::level::{LevelSpec, Severity};
use crate::logstash::LogstashFormatter;
use crate::record::{AttrValue, RecordContext};
use crate::remote::{RemoteHandler, ShipperConfig};
use crate::root::RootLogger;
use crate::settings::Settings;
use crate::tracer::{self, TracerConfig};

/// 远程（Logstash）处理器参数
#[derive(Debug, Clone)]
pub struct RemoteLoggerOptions {
    /// 仅在根记录器尚未初始化时生效
    pub level: LevelSpec,
    pub message_type: String,
    /// Elasticsearch 索引名
    pub index_name: String,
}

impl Default for RemoteLoggerOptions {
    fn default() -> Self {
        Self {
            level: LevelSpec::Default,
            message_type: "rust".to_string(),
            index_name: "rust".to_string(),
        }
    }
}

/// 日志与追踪子系统的初始化与重置
///
/// 所有初始化方法都是幂等的，可以任意顺序多次调用。
pub struct TraceLog {
    root: Arc<RootLogger>,
    handlers: Vec<Arc<dyn Handler>>,
    /// 第一次扩展前的记录上下文，reset 时恢复
    saved_context: Option<RecordContext>,
    tracer_installed: bool,
}

impl TraceLog {
    pub fn new() -> Self {
        Self::with_root(Arc::new(RootLogger::new()))
    }

    pub fn with_root(root: Arc<RootLogger>) -> Self {
        Self {
            root,
            handlers: Vec::new(),
            saved_context: None,
            tracer_installed: false,
        }
    }

    pub fn root(&self) -> &Arc<RootLogger> {
        &self.root
    }

    /// 接入 tracing：`tracing_subscriber::registry().with(trace_log.layer())`
    pub fn layer<S>(&self) -> impl Layer<S>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        layer::root_layer(self.root.clone())
    }

    pub fn handler_kinds(&self) -> Vec<HandlerKind> {
        self.handlers.iter().map(|h| h.kind()).collect()
    }

    pub fn has_handler(&self, kind: HandlerKind) -> bool {
        self.handlers.iter().any(|h| h.kind() == kind)
    }

    pub fn saved_context(&self) -> Option<&RecordContext> {
        self.saved_context.as_ref()
    }

    /// 初始化根记录器：< ERROR 写 stdout，>= ERROR 写 stderr
    ///
    /// 根记录器已有任何处理器时不做任何事。
    pub fn init_root_logger(&mut self, level: impl Into<LevelSpec>) -> Result<()> {
        if self.root.has_handlers() {
            return Ok(());
        }

        let level = level.into().resolve()?;

        self.handlers.push(Arc::new(StreamHandler::stdout()));
        self.handlers.push(Arc::new(StreamHandler::stderr()));
        self.root.configure(level, &self.handlers);

        debug!("Root logger initialized at level {}", level);
        Ok(())
    }

    /// 为之后创建的每条记录附加静态属性（最后一次调用生效）
    pub fn extend_log_record<I, K, V>(&mut self, attrs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<AttrValue>,
    {
        let previous = self.root.record_context();
        self.saved_context.get_or_insert(previous);
        self.root.set_record_context(attrs.into_iter().collect());
    }

    /// 按环境变量初始化 Logstash 处理器
    pub fn init_remote_logger(&mut self, options: RemoteLoggerOptions) -> Result<()> {
        if self.has_handler(HandlerKind::Remote) {
            return Ok(());
        }
        let settings = Settings::from_env()?;
        self.init_remote_logger_with(&settings, options)
    }

    pub fn init_remote_logger_with(
        &mut self,
        settings: &Settings,
        options: RemoteLoggerOptions,
    ) -> Result<()> {
        if self.has_handler(HandlerKind::Remote) {
            return Ok(());
        }

        let Some((host, port)) = settings.logstash_endpoint()? else {
            return Ok(());
        };

        let formatter = LogstashFormatter::new(options.message_type, options.index_name);
        let handler = RemoteHandler::new(ShipperConfig::new(host, port), formatter);

        debug!("Remote logger shipping to {}", handler.endpoint());
        self.attach(Arc::new(handler), options.level)
    }

    /// 按环境变量初始化追踪（需在 Tokio 运行时内调用）
    pub fn init_tracer(&mut self, service_name: &str) -> Result<()> {
        if self.tracer_installed {
            return Ok(());
        }
        let settings = Settings::from_env()?;
        self.init_tracer_with(&settings, service_name)
    }

    pub fn init_tracer_with(&mut self, settings: &Settings, service_name: &str) -> Result<()> {
        if self.tracer_installed {
            return Ok(());
        }

        let Some(config) = TracerConfig::from_settings(settings, service_name)? else {
            return Ok(());
        };

        tracer::init_tracer(&config)?;
        self.tracer_installed = true;
        self.root.enable_correlation(service_name);

        debug!("Tracer exporting to Jaeger agent at {}", config.agent_endpoint);
        Ok(())
    }

    /// 添加把记录写入当前 span 的处理器
    pub fn init_span_bridge_logger(&mut self, level: impl Into<LevelSpec>) -> Result<()> {
        self.install_span_bridge(SpanBridgeHandler::default(), level)
    }

    pub fn install_span_bridge(
        &mut self,
        handler: SpanBridgeHandler,
        level: impl Into<LevelSpec>,
    ) -> Result<()> {
        if self.has_handler(HandlerKind::SpanBridge) {
            return Ok(());
        }

        self.attach(Arc::new(handler), level.into())
    }

    /// 根记录器已初始化则直接添加，否则用完整的处理器列表初始化
    ///
    /// 级别只在初始化根记录器时使用，也只在这时解析。
    fn attach(&mut self, handler: Arc<dyn Handler>, level: LevelSpec) -> Result<()> {
        if self.root.has_handlers() {
            self.handlers.push(handler.clone());
            self.root.add_handler(handler);
        } else {
            let level = level.resolve()?;
            self.handlers.push(handler);
            self.root.configure(level, &self.handlers);
        }
        Ok(())
    }

    /// 恢复到未初始化状态
    pub fn reset(&mut self) {
        self.root.set_level(Severity::default());

        if let Some(context) = self.saved_context.take() {
            self.root.set_record_context(context);
        }

        for handler in self.handlers.drain(..) {
            handler.flush();
            self.root.remove_handler(&handler);
        }
    }

    /// reset 后关闭本实例安装的追踪器
    pub fn shutdown(&mut self) {
        self.reset();
        if self.tracer_installed {
            tracer::shutdown_tracer();
            self.tracer_installed = false;
        }
    }
}

impl Default for TraceLog {
    fn default() -> Self {
        Self::new()
    }
}
