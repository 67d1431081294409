use std::env;
use std::sync::Arc;

use tracelog::settings::{
    LOGSTASH_HOST, LOGSTASH_PORT, OTEL_EXPORTER_JAEGER_AGENT_HOST, OTEL_EXPORTER_JAEGER_AGENT_PORT,
};
use tracelog::{HandlerKind, RemoteLoggerOptions, RootLogger, Severity, TraceLog};
use tracing_subscriber::prelude::*;

// 环境变量是进程级的，相关断言集中在一个测试里
#[test]
fn test_env_driven_initialization() {
    env::remove_var(LOGSTASH_HOST);
    env::remove_var(LOGSTASH_PORT);
    env::remove_var(OTEL_EXPORTER_JAEGER_AGENT_HOST);

    let mut trace_log = TraceLog::new();
    trace_log.init_root_logger(Severity::INFO).unwrap();

    // 端口格式错误但 host 未设置：对应子系统视为未启用
    env::set_var(LOGSTASH_PORT, "abc");
    env::set_var(OTEL_EXPORTER_JAEGER_AGENT_PORT, "abc");

    trace_log
        .init_remote_logger(RemoteLoggerOptions::default())
        .unwrap();
    assert_eq!(trace_log.handler_kinds().len(), 2);

    trace_log.init_tracer("lifecycle-tests").unwrap();
    assert!(!trace_log.root().correlation_enabled());

    env::remove_var(LOGSTASH_PORT);
    env::remove_var(OTEL_EXPORTER_JAEGER_AGENT_PORT);

    env::set_var(LOGSTASH_HOST, "localhost");
    trace_log
        .init_remote_logger(RemoteLoggerOptions::default())
        .unwrap();
    assert_eq!(trace_log.handler_kinds().len(), 3);
    assert!(trace_log.has_handler(HandlerKind::Remote));

    trace_log
        .init_remote_logger(RemoteLoggerOptions::default())
        .unwrap();
    assert_eq!(trace_log.handler_kinds().len(), 3);

    trace_log.reset();
    env::remove_var(LOGSTASH_HOST);

    assert!(trace_log.handler_kinds().is_empty());
    assert!(!trace_log.root().has_handlers());
    assert_eq!(trace_log.root().level(), Severity::WARNING);
}

#[test]
fn test_full_lifecycle_any_order() {
    let root = Arc::new(RootLogger::new());
    let mut trace_log = TraceLog::with_root(root.clone());

    trace_log.init_span_bridge_logger("warning").unwrap();
    trace_log.init_root_logger("debug").unwrap();
    trace_log.init_span_bridge_logger("warning").unwrap();
    trace_log.extend_log_record([("app", "lifecycle")]);

    assert_eq!(root.handler_kinds(), vec![HandlerKind::SpanBridge]);
    assert_eq!(root.level(), Severity::WARNING);
    assert!(trace_log.saved_context().is_some());

    trace_log.reset();
    trace_log.reset();

    assert!(!root.has_handlers());
    assert!(root.record_context().is_empty());
    assert!(trace_log.saved_context().is_none());

    trace_log.init_root_logger(Severity::ERROR).unwrap();
    assert_eq!(
        root.handler_kinds(),
        vec![HandlerKind::Stdout, HandlerKind::Stderr]
    );
}

#[test]
fn test_tracing_events_reach_root_without_span() {
    let mut trace_log = TraceLog::new();
    trace_log.init_span_bridge_logger(Severity::DEBUG).unwrap();

    let subscriber = tracing_subscriber::registry().with(trace_log.layer());
    tracing::subscriber::with_default(subscriber, || {
        // 没有活动 span：桥接处理器为空操作
        tracing::error!(order_id = "o-1", "charge failed");
        tracing::info!("charge retried");
    });

    assert_eq!(trace_log.root().handler_count(), 1);
}
