//! The exporter: every configured probe, rendered as Prometheus text.

use std::thread;

use prometheus::proto::MetricFamily;
use prometheus::{Encoder, TextEncoder};
use tracing::{error, info};

use crate::collector::ScrapeSupervisor;
use crate::config::{Config, ConfigError};
use crate::sink::build_info_family;

/// Explicit list of supervisors, built once at startup.
pub struct Exporter {
    supervisors: Vec<ScrapeSupervisor>,
}

impl Exporter {
    pub fn new(supervisors: Vec<ScrapeSupervisor>) -> Self {
        Self { supervisors }
    }

    /// Builds one supervisor per configured probe. Any backend that cannot be
    /// constructed aborts startup.
    pub fn from_config(config: &Config, queue_capacity: usize) -> Result<Self, ConfigError> {
        let supervisors = config
            .probes
            .iter()
            .map(|spec| {
                info!(probe = %spec.name, collector = %spec.backend_kind, "registering probe");
                ScrapeSupervisor::from_spec(spec.clone(), queue_capacity)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(supervisors))
    }

    pub fn supervisors(&self) -> &[ScrapeSupervisor] {
        &self.supervisors
    }

    /// Scrapes every probe in parallel and collects the results in
    /// configuration order, followed by the build info.
    pub fn gather(&self) -> Vec<MetricFamily> {
        let mut families = thread::scope(|s| {
            let handles: Vec<_> = self
                .supervisors
                .iter()
                .map(|sup| (sup.name(), s.spawn(move || sup.scrape())))
                .collect();

            let mut families = Vec::new();
            for (name, handle) in handles {
                match handle.join() {
                    Ok(f) => families.extend(f),
                    Err(_) => error!(probe = %name, "scrape thread panicked"),
                }
            }
            families
        });
        families.push(build_info_family());
        families
    }

    /// Content type of [`render`](Self::render).
    pub fn format_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }

    /// Gathers and encodes in the text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let families = self.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
credentials:
  - name: shell_root
    type: bash
metrics:
  - name: Custom_Metric_Shell
    credential: shell_root
    commands: ['printf 1,chicken,128\n2,beef,256\n']
    mapping: [id, animal]
    separator: ","
    value_type: GAUGE
  - name: broken
    credential: shell_root
    commands: ["false"]
"#;

    #[cfg(unix)]
    #[test]
    fn renders_text_exposition() {
        let config = Config::from_yaml(CONFIG).unwrap();
        let exporter = Exporter::from_config(&config, 100).unwrap();
        assert_eq!(exporter.supervisors().len(), 2);

        let text = exporter.render().unwrap();
        assert!(text.contains("# TYPE custom_custom_metric_shell gauge"));
        assert!(text.contains(r#"custom_custom_metric_shell{animal="chicken",id="1"} 128"#));
        assert!(text.contains(r#"custom_custom_metric_shell{animal="beef",id="2"} 256"#));
        assert!(text.contains("custom_custom_metric_shell_scrapes_total 1"));
        assert!(text.contains("custom_custom_metric_shell_last_scrape_error 0"));
        assert!(text.contains("custom_broken_last_scrape_error 1"));
        assert!(text.contains(r#"custom_broken_scrape_errors_total{collector="bash"} 1"#));
        assert!(text.contains("custom_exporter_build_info{revision="));
        assert_eq!(text.matches("custom_exporter_build_info{").count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn probe_without_value_type_renders() {
        let yaml = r#"
credentials:
  - name: shell_root
    type: bash
metrics:
  - name: plain
    credential: shell_root
    commands: ['printf 1,chicken,128\n']
    mapping: [id, animal]
    separator: ","
"#;
        let config = Config::from_yaml(yaml).unwrap();
        let exporter = Exporter::from_config(&config, 10).unwrap();

        let text = exporter.render().unwrap();
        assert!(text.contains("# TYPE custom_plain gauge"));
        assert!(text.contains(r#"custom_plain{animal="chicken",id="1"} 128"#));
        assert!(text.contains("custom_plain_last_scrape_error 0"));
    }

    #[test]
    fn empty_exporter_still_reports_build_info() {
        let exporter = Exporter::new(Vec::new());
        let families = exporter.gather();
        assert_eq!(families.len(), 1);
        assert_eq!(exporter.format_type(), "text/plain; version=0.0.4");
    }

    #[test]
    fn bad_backend_aborts_startup() {
        let yaml = r#"
credentials:
  - name: db
    type: mysql
    dsn: "no-driver-here"
metrics:
  - name: m
    credential: db
    commands: ["SELECT 1"]
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert!(matches!(
            Exporter::from_config(&config, 10).err(),
            Some(ConfigError::InvalidDsn { .. })
        ));
    }
}
