use opentelemetry::sdk::{trace, Resource};
use opentelemetry::trace::TraceContextExt;
use opentelemetry::{global, runtime, Context, KeyValue};

use crate::error::Result;
use crate::settings::Settings;

pub const SERVICE_NAME: &str = "service.name";

/// 追踪配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracerConfig {
    pub service_name: String,
    /// Jaeger agent 地址（host:port）
    pub agent_endpoint: String,
}

impl TracerConfig {
    /// 未配置 Jaeger agent 时返回 None
    pub fn from_settings(
        settings: &Settings,
        service_name: impl Into<String>,
    ) -> Result<Option<Self>> {
        Ok(settings
            .jaeger_agent_endpoint()?
            .map(|agent_endpoint| Self {
                service_name: service_name.into(),
                agent_endpoint,
            }))
    }
}

/// 初始化 OpenTelemetry 追踪器：Jaeger agent 导出器 + 批量处理器，并设为全局 provider
///
/// 批量处理器运行在 Tokio 上，必须在 Tokio 运行时内调用。
pub fn init_tracer(config: &TracerConfig) -> Result<()> {
    let resource = Resource::new(vec![KeyValue::new(
        SERVICE_NAME,
        config.service_name.clone(),
    )]);

    let provider = opentelemetry_jaeger::new_agent_pipeline()
        .with_endpoint(config.agent_endpoint.clone())
        .with_service_name(config.service_name.clone())
        .with_trace_config(trace::config().with_resource(resource))
        .build_batch(runtime::Tokio)?;

    global::set_tracer_provider(provider);
    Ok(())
}

/// 关闭追踪器，发送剩余 span
pub fn shutdown_tracer() {
    global::shutdown_tracer_provider();
}

/// 当前 span 的 trace_id 与 span_id
pub fn current_trace_ids() -> Option<(String, String)> {
    let cx = Context::current();
    let span = cx.span();
    let span_context = span.span_context();

    if span_context.is_valid() {
        Some((
            span_context.trace_id().to_string(),
            span_context.span_id().to_string(),
        ))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::OTEL_EXPORTER_JAEGER_AGENT_HOST;

    #[test]
    fn test_tracer_config_requires_agent_host() {
        let settings = Settings::default();
        assert!(TracerConfig::from_settings(&settings, "billing").unwrap().is_none());
    }

    #[test]
    fn test_tracer_config_from_settings() {
        let settings = Settings::from_vars([(OTEL_EXPORTER_JAEGER_AGENT_HOST, "jaeger")]).unwrap();
        let config = TracerConfig::from_settings(&settings, "billing")
            .unwrap()
            .unwrap();
        assert_eq!(config.service_name, "billing");
        assert_eq!(config.agent_endpoint, "jaeger:6831");
    }

    #[test]
    fn test_no_trace_ids_outside_span() {
        assert!(current_trace_ids().is_none());
    }
}
