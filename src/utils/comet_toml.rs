//! Load `comet.toml`. `${VAR}` references are expanded from the environment (after `.env`).

use regex::{Captures, Regex};
use std::path::Path;
use std::sync::OnceLock;

use crate::error::CometError;
use crate::utils::settings::CometConfig;

static ENV_REF: OnceLock<Option<Regex>> = OnceLock::new();

/// Replace `${NAME}` with the environment value. Unknown names are left as written.
pub fn resolve_env_vars(input: &str) -> String {
    let Some(re) = ENV_REF
        .get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").ok())
        .as_ref()
    else {
        return input.to_string();
    };
    re.replace_all(input, |caps: &Captures| match std::env::var(&caps[1]) {
        Ok(v) => v,
        Err(_) => {
            log::warn!("Environment variable {} is not set; leaving reference as-is", &caps[1]);
            caps[0].to_string()
        }
    })
    .into_owned()
}

/// Parse config text (already read from disk).
pub fn parse_config(text: &str) -> Result<CometConfig, CometError> {
    let resolved = resolve_env_vars(text);
    toml::from_str(&resolved).map_err(|e| CometError::Config(e.to_string()))
}

/// Load config from `path`. When `required` is false a missing file yields defaults.
pub fn load_config(path: &Path, required: bool) -> Result<CometConfig, CometError> {
    let _ = dotenvy::dotenv();
    match std::fs::read_to_string(path) {
        Ok(text) => parse_config(&text)
            .map_err(|e| CometError::Config(format!("{}: {}", path.display(), e))),
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
            log::warn!("{} not found; using built-in defaults", path.display());
            Ok(CometConfig::default())
        }
        Err(e) => Err(CometError::Config(format!("{}: {}", path.display(), e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::settings::{GeneratorKind, ProcessorKind, ScannerKind};

    #[test]
    fn parses_sections_and_keeps_defaults() {
        let cfg = parse_config(
            r#"
            [comet]
            loop_count = 3
            sources = [{ path = "/data/in", start_trigger = "/data/in/2023" }]

            [scanner]
            kind = "listing"
            listing_file = "/data/list.txt"
            write_last = ["*.done"]

            [processor]
            kind = "echo"

            [generator]
            modules = ["call-record", "file-info"]

            [[generator.destinations]]
            root_path = "https://ns1.t1.hcp.local/rest/in"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.run.loop_count, 3);
        assert_eq!(cfg.run.loop_sleep_secs, 60);
        assert_eq!(cfg.scanner.kind, ScannerKind::Listing);
        assert_eq!(cfg.scanner.max_threads, 5);
        assert_eq!(cfg.processor.kind, ProcessorKind::Echo);
        assert_eq!(
            cfg.generator.modules,
            vec![GeneratorKind::CallRecord, GeneratorKind::FileInfo]
        );
        assert_eq!(cfg.generator.destinations[0].annotation, "default");
        assert_eq!(
            cfg.run.sources[0].start_trigger.as_deref(),
            Some(Path::new("/data/in/2023"))
        );
    }

    #[test]
    fn unknown_env_reference_is_kept() {
        assert_eq!(
            resolve_env_vars("x=${COMET_SURELY_UNSET_VAR_42}"),
            "x=${COMET_SURELY_UNSET_VAR_42}"
        );
    }

    #[test]
    fn bad_toml_is_config_error() {
        assert!(matches!(
            parse_config("[comet]\nloop_count = \"many\""),
            Err(CometError::Config(_))
        ));
    }
}
