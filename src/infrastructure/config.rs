use crate::application::series_transformer::{GapFill, SeriesTransformer};
use crate::application::template::MissingParam;
use crate::domain::chart::ChartKind;
use crate::domain::query::QueryTarget;
use anyhow::Context;
use chrono::FixedOffset;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct ConsoleConfig {
    #[serde(default)]
    pub server: ServerSettings,
    pub backend: BackendSettings,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub charts: Vec<ChartConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_addr")]
    pub addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: default_addr(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        self.addr
            .parse()
            .with_context(|| format!("invalid server.addr: {}", self.addr))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendSettings {
    pub base_url: String,
    #[serde(default = "default_exec_path")]
    pub exec_path: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl BackendSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PipelineSettings {
    #[serde(default)]
    pub gap_fill: GapFill,
    #[serde(default)]
    pub missing_param: MissingParam,
    #[serde(default)]
    pub palette: Vec<String>,
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl PipelineSettings {
    pub fn transformer(&self) -> anyhow::Result<SeriesTransformer> {
        let offset = FixedOffset::east_opt(self.utc_offset_minutes * 60).with_context(|| {
            format!("pipeline.utc_offset_minutes out of range: {}", self.utc_offset_minutes)
        })?;
        Ok(SeriesTransformer::new(self.gap_fill, self.palette.clone(), offset))
    }
}

/// A chart registered at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct ChartConfig {
    pub id: String,
    #[serde(default)]
    pub kind: ChartKind,
    #[serde(default)]
    pub targets: Vec<QueryTarget>,
}

fn default_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_exec_path() -> String {
    "/exec".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// Load `config/console.*` (optional) overlaid with `CONSOLE__SECTION__KEY` variables.
pub fn load_console_config() -> anyhow::Result<ConsoleConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/console").required(false))
        .add_source(config::Environment::with_prefix("CONSOLE").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
fn parse_console_config(toml: &str) -> anyhow::Result<ConsoleConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml))
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::query::QuerySource;

    #[test]
    fn test_defaults() {
        let config = parse_console_config(
            r#"
            [backend]
            base_url = "http://localhost:9000/api"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.addr, "0.0.0.0:8080");
        assert_eq!(config.backend.exec_path, "/exec");
        assert_eq!(config.backend.timeout(), Duration::from_secs(30));
        assert_eq!(config.pipeline.gap_fill, GapFill::Zero);
        assert_eq!(config.pipeline.missing_param, MissingParam::Keep);
        assert!(config.charts.is_empty());
    }

    #[test]
    fn test_pipeline_and_charts() {
        let config = parse_console_config(
            r##"
            [server]
            addr = "127.0.0.1:9090"

            [backend]
            base_url = "http://broker:9000/api/v1"
            timeout_ms = 5000

            [pipeline]
            gap_fill = "null"
            missing_param = "empty"
            palette = ["#111111", "#222222"]
            utc_offset_minutes = 480

            [[charts]]
            id = "cpu"
            kind = "area"

            [[charts.targets]]
            db = "_internal"
            sql = "select used_percent from 'lindb.monitor.system.cpu_stat' group by node"
            watch_keys = ["node"]
            "##,
        )
        .unwrap();

        assert_eq!(config.server.socket_addr().unwrap().port(), 9090);
        assert_eq!(config.backend.timeout(), Duration::from_secs(5));
        assert_eq!(config.pipeline.gap_fill, GapFill::Null);
        assert_eq!(config.pipeline.missing_param, MissingParam::Empty);
        assert_eq!(config.pipeline.palette, vec!["#111111".to_string(), "#222222".to_string()]);
        assert!(config.pipeline.transformer().is_ok());

        let chart = &config.charts[0];
        assert_eq!(chart.kind, ChartKind::Area);
        assert_eq!(chart.targets[0].watch_keys, vec!["node".to_string()]);
        assert!(matches!(chart.targets[0].sql, QuerySource::Raw(_)));
    }

    #[test]
    fn test_invalid_offset_rejected() {
        let settings = PipelineSettings {
            utc_offset_minutes: 48 * 60,
            ..Default::default()
        };
        assert!(settings.transformer().is_err());
    }
}
