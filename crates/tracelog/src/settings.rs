use config::{Config, Environment};
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::{Result, TraceLogError};

pub const LOGSTASH_HOST: &str = "LOGSTASH_HOST";
pub const LOGSTASH_PORT: &str = "LOGSTASH_PORT";
pub const OTEL_EXPORTER_JAEGER_AGENT_HOST: &str = "OTEL_EXPORTER_JAEGER_AGENT_HOST";
pub const OTEL_EXPORTER_JAEGER_AGENT_PORT: &str = "OTEL_EXPORTER_JAEGER_AGENT_PORT";

const DEFAULT_LOGSTASH_PORT: u16 = 5959;
const DEFAULT_JAEGER_AGENT_PORT: u16 = 6831;

/// 环境变量快照，每次初始化调用时重新读取
///
/// 端口保留原始字符串，只有对应的 host 存在时才解析，
/// 未启用的子系统不会因为格式错误的端口而失败。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub logstash_host: Option<String>,

    #[serde(default)]
    pub logstash_port: Option<String>,

    #[serde(default)]
    pub otel_exporter_jaeger_agent_host: Option<String>,

    #[serde(default)]
    pub otel_exporter_jaeger_agent_port: Option<String>,
}

impl Settings {
    /// 从进程环境读取
    pub fn from_env() -> Result<Self> {
        Self::load(Environment::default())
    }

    /// 从给定的变量表读取（键名同环境变量）
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let source: HashMap<String, String> = vars
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self::load(Environment::default().source(Some(source)))
    }

    fn load(environment: Environment) -> Result<Self> {
        let settings: Settings = Config::builder()
            .add_source(environment)
            .build()?
            .try_deserialize()?;
        Ok(settings.normalized())
    }

    // 空字符串等同于未设置
    fn normalized(mut self) -> Self {
        self.logstash_host = non_blank(self.logstash_host);
        self.logstash_port = non_blank(self.logstash_port);
        self.otel_exporter_jaeger_agent_host = non_blank(self.otel_exporter_jaeger_agent_host);
        self.otel_exporter_jaeger_agent_port = non_blank(self.otel_exporter_jaeger_agent_port);
        self
    }

    /// Logstash 地址；未设置 host 时为 None，此时不检查端口
    pub fn logstash_endpoint(&self) -> Result<Option<(&str, u16)>> {
        let Some(host) = self.logstash_host.as_deref() else {
            return Ok(None);
        };
        let port = parse_port(
            LOGSTASH_PORT,
            self.logstash_port.as_deref(),
            DEFAULT_LOGSTASH_PORT,
        )?;
        Ok(Some((host, port)))
    }

    /// Jaeger agent 地址（host:port）；未设置 host 时为 None
    pub fn jaeger_agent_endpoint(&self) -> Result<Option<String>> {
        let Some(host) = self.otel_exporter_jaeger_agent_host.as_deref() else {
            return Ok(None);
        };
        let port = parse_port(
            OTEL_EXPORTER_JAEGER_AGENT_PORT,
            self.otel_exporter_jaeger_agent_port.as_deref(),
            DEFAULT_JAEGER_AGENT_PORT,
        )?;
        Ok(Some(format!("{}:{}", host, port)))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn parse_port(key: &'static str, value: Option<&str>, default: u16) -> Result<u16> {
    match value {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| TraceLogError::InvalidPort {
            key,
            value: value.to_string(),
        }),
    }
}
