use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use speechgate_core::{CommandConfig, DispatcherConfig, MAX_TEXT_CHARS};

/// Largest accepted request body (16 MiB).
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Service configuration: defaults, then environment, then optional TOML.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    /// Where generated audio lands; served under `/static/audio/`
    pub output_dir: PathBuf,
    /// Working directory of the synthesis program
    pub inference_dir: PathBuf,
    pub program: PathBuf,
    pub script: String,
    pub workers: usize,
    pub invoke_timeout_secs: u64,
    pub deadline_secs: u64,
    pub retention_secs: u64,
    pub max_text_chars: usize,
    pub cancel_on_deadline: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4005,
            debug: false,
            output_dir: PathBuf::from("static/audio"),
            inference_dir: PathBuf::from("Fastspeech2_HS"),
            program: PathBuf::from("python"),
            script: "inference.py".to_string(),
            workers: 2,
            invoke_timeout_secs: 20,
            deadline_secs: 20,
            retention_secs: 3600,
            max_text_chars: MAX_TEXT_CHARS,
            cancel_on_deadline: true,
        }
    }
}

impl ServerConfig {
    /// Defaults overlaid with process environment variables.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each known key.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let get = |key: &str| lookup(key).filter(|s| !s.is_empty());
        let parse = |key: &str| get(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            host: get("HOST").unwrap_or(d.host),
            port: get("PORT")
                .and_then(|v| v.trim().parse::<u16>().ok())
                .unwrap_or(d.port),
            debug: debug_enabled(&lookup),
            output_dir: get("SPEECHGATE_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.output_dir),
            inference_dir: get("SPEECHGATE_INFERENCE_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.inference_dir),
            program: get("SPEECHGATE_PROGRAM")
                .map(PathBuf::from)
                .unwrap_or(d.program),
            script: get("SPEECHGATE_SCRIPT").unwrap_or(d.script),
            workers: parse("SPEECHGATE_WORKERS")
                .map(|v| v as usize)
                .filter(|v| *v > 0)
                .unwrap_or(d.workers),
            invoke_timeout_secs: parse("SPEECHGATE_INVOKE_TIMEOUT_SECS")
                .unwrap_or(d.invoke_timeout_secs),
            deadline_secs: parse("SPEECHGATE_DEADLINE_SECS").unwrap_or(d.deadline_secs),
            retention_secs: parse("SPEECHGATE_RETENTION_SECS").unwrap_or(d.retention_secs),
            max_text_chars: parse("SPEECHGATE_MAX_TEXT_CHARS")
                .map(|v| v as usize)
                .unwrap_or(d.max_text_chars),
            cancel_on_deadline: get("SPEECHGATE_CANCEL_ON_DEADLINE")
                .map(|v| is_truthy(&v))
                .unwrap_or(d.cancel_on_deadline),
        }
    }

    /// Load configuration (env + optional TOML file at SPEECHGATE_CONFIG or
    /// ./speechgate.toml). A missing or broken file leaves env/defaults in place.
    pub fn load() -> Self {
        let base = Self::from_env();
        let path =
            std::env::var("SPEECHGATE_CONFIG").unwrap_or_else(|_| "speechgate.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target: "config", path = %path, "No TOML config found; using defaults/env");
            return base;
        }
        match fs::read_to_string(p) {
            Ok(s) => match base.clone().overlay_toml(&s) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!(target: "config", error = %e, "Failed to parse TOML; using defaults/env");
                    base
                }
            },
            Err(e) => {
                tracing::warn!(target: "config", error = %e, "Failed to read TOML; using defaults/env");
                base
            }
        }
    }

    /// Apply a TOML document on top of this configuration.
    pub fn overlay_toml(self, doc: &str) -> Result<Self, toml::de::Error> {
        let t: ServerToml = toml::from_str(doc)?;
        Ok(t.overlay(self))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    /// Invoker settings with the working directory made absolute.
    pub fn command_config(&self) -> std::io::Result<CommandConfig> {
        Ok(CommandConfig {
            program: self.program.clone(),
            script_args: vec![self.script.clone()],
            working_dir: absolutize(&self.inference_dir)?,
            timeout: Duration::from_secs(self.invoke_timeout_secs),
        })
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            workers: self.workers,
            deadline: self.deadline(),
            cancel_on_deadline: self.cancel_on_deadline,
        }
    }
}

/// `DEBUG` (or the legacy `FLASK_DEBUG`) set to "true"/"1"/"yes".
///
/// Environment only: the binary needs it to pick a log filter before any
/// config file is read.
pub fn debug_enabled(lookup: impl Fn(&str) -> Option<String>) -> bool {
    lookup("DEBUG")
        .or_else(|| lookup("FLASK_DEBUG"))
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

fn is_truthy(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

pub(crate) fn absolutize(p: &Path) -> std::io::Result<PathBuf> {
    if p.is_absolute() {
        Ok(p.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(p))
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct ServerToml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub output_dir: Option<PathBuf>,
    pub synthesis: Option<SynthesisToml>,
    pub limits: Option<LimitsToml>,
}

impl ServerToml {
    fn overlay(self, mut base: ServerConfig) -> ServerConfig {
        if let Some(x) = self.host {
            base.host = x;
        }
        if let Some(x) = self.port {
            base.port = x;
        }
        if let Some(x) = self.output_dir {
            base.output_dir = x;
        }
        if let Some(s) = self.synthesis {
            s.apply(&mut base);
        }
        if let Some(l) = self.limits {
            l.apply(&mut base);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct SynthesisToml {
    pub inference_dir: Option<PathBuf>,
    pub program: Option<PathBuf>,
    pub script: Option<String>,
    pub workers: Option<usize>,
    pub cancel_on_deadline: Option<bool>,
}
impl SynthesisToml {
    fn apply(self, c: &mut ServerConfig) {
        if let Some(x) = self.inference_dir {
            c.inference_dir = x;
        }
        if let Some(x) = self.program {
            c.program = x;
        }
        if let Some(x) = self.script {
            c.script = x;
        }
        if let Some(x) = self.workers {
            c.workers = x.max(1);
        }
        if let Some(x) = self.cancel_on_deadline {
            c.cancel_on_deadline = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct LimitsToml {
    pub invoke_timeout_secs: Option<u64>,
    pub deadline_secs: Option<u64>,
    pub retention_secs: Option<u64>,
    pub max_text_chars: Option<usize>,
}
impl LimitsToml {
    fn apply(self, c: &mut ServerConfig) {
        if let Some(x) = self.invoke_timeout_secs {
            c.invoke_timeout_secs = x;
        }
        if let Some(x) = self.deadline_secs {
            c.deadline_secs = x;
        }
        if let Some(x) = self.retention_secs {
            c.retention_secs = x;
        }
        if let Some(x) = self.max_text_chars {
            c.max_text_chars = x;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let cfg = ServerConfig::from_vars(vars(&[]));
        assert_eq!(cfg.bind_addr(), "0.0.0.0:4005");
        assert!(!cfg.debug);
        assert_eq!(cfg.workers, 2);
        assert_eq!(cfg.deadline(), Duration::from_secs(20));
        assert_eq!(cfg.retention(), Duration::from_secs(3600));
        assert_eq!(cfg.max_text_chars, 300);
        assert!(cfg.cancel_on_deadline);
    }

    #[test]
    fn env_overrides_and_bad_values_fall_back() {
        let cfg = ServerConfig::from_vars(vars(&[
            ("PORT", "8080"),
            ("HOST", "127.0.0.1"),
            ("FLASK_DEBUG", "True"),
            ("SPEECHGATE_WORKERS", "zero"),
            ("SPEECHGATE_DEADLINE_SECS", "25"),
            ("SPEECHGATE_CANCEL_ON_DEADLINE", "false"),
        ]));
        assert_eq!(cfg.bind_addr(), "127.0.0.1:8080");
        assert!(cfg.debug);
        assert_eq!(cfg.workers, 2);
        assert_eq!(cfg.deadline_secs, 25);
        assert!(!cfg.cancel_on_deadline);
    }

    #[test]
    fn debug_prefers_debug_over_flask_debug() {
        assert!(!debug_enabled(vars(&[("DEBUG", "false"), ("FLASK_DEBUG", "true")])));
        assert!(debug_enabled(vars(&[("DEBUG", "1")])));
    }

    #[test]
    fn toml_overlay_applies_nested_sections() {
        let doc = r#"
            port = 9000
            output_dir = "/srv/audio"

            [synthesis]
            program = "/usr/bin/python3"
            workers = 4

            [limits]
            deadline_secs = 15
            max_text_chars = 500
        "#;
        let cfg = ServerConfig::default().overlay_toml(doc).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.output_dir, PathBuf::from("/srv/audio"));
        assert_eq!(cfg.program, PathBuf::from("/usr/bin/python3"));
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.deadline_secs, 15);
        assert_eq!(cfg.max_text_chars, 500);
        assert_eq!(cfg.invoke_timeout_secs, 20);
    }

    #[test]
    fn toml_with_unknown_key_is_rejected() {
        assert!(ServerConfig::default().overlay_toml("prot = 1").is_err());
    }

    #[test]
    fn debug_is_not_a_toml_setting() {
        // The log filter is chosen before the file is read.
        assert!(ServerConfig::default().overlay_toml("debug = true").is_err());
    }

    #[test]
    fn command_config_uses_absolute_working_dir() {
        let cmd = ServerConfig::default().command_config().unwrap();
        assert!(cmd.working_dir.is_absolute());
        assert!(cmd.working_dir.ends_with("Fastspeech2_HS"));
        assert_eq!(cmd.script_args, vec!["inference.py".to_string()]);
        assert_eq!(cmd.timeout, Duration::from_secs(20));
    }
}
