use crate::logging::append_run_log;
use crate::runtime::Terminal;
use crate::types::{NonInteractiveReason, Toggle};
use serde_json::json;
use std::collections::BTreeMap;

pub type EnvMap = BTreeMap<String, String>;

pub fn is_non_interactive(env: &EnvMap, terminal: &dyn Terminal) -> Option<NonInteractiveReason> {
    let reason = if env.contains_key("CI") {
        Some(NonInteractiveReason::CiEnv)
    } else if env.get("TERM").is_some_and(|term| term == "dumb") {
        Some(NonInteractiveReason::DumbTerminal)
    } else if !terminal.is_tty() {
        Some(NonInteractiveReason::NonTtyStdout)
    } else {
        None
    };
    if let Some(reason) = reason {
        append_run_log(
            "debug",
            "detection.non_interactive",
            json!({ "reason": format!("{reason:?}") }),
        );
    }
    reason
}

/// Applies the `interactive` setting on top of environment detection.
pub fn resolve_interactive(
    setting: Toggle,
    env: &EnvMap,
    terminal: &dyn Terminal,
) -> Result<(), NonInteractiveReason> {
    match setting {
        Toggle::Always => Ok(()),
        Toggle::Never => Err(NonInteractiveReason::Forced),
        Toggle::Auto => match is_non_interactive(env, terminal) {
            Some(reason) => Err(reason),
            None => Ok(()),
        },
    }
}

pub fn colors_enabled(env: &EnvMap, setting: Toggle, interactive: bool) -> bool {
    match setting {
        Toggle::Always => true,
        Toggle::Never => false,
        Toggle::Auto => interactive && !env.contains_key("NO_COLOR"),
    }
}

pub fn unicode_supported(env: &EnvMap) -> bool {
    ["LC_ALL", "LC_CTYPE", "LANG"]
        .iter()
        .filter_map(|name| env.get(*name))
        .find(|value| !value.is_empty())
        .is_some_and(|value| {
            let value = value.to_ascii_lowercase();
            value.contains("utf-8") || value.contains("utf8")
        })
}
