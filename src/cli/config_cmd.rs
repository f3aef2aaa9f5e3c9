// Copyright 2024-2026 markprof Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, validate.
//!
//! These commands read settings files directly; `show` without a path uses
//! the same discovery as an instrumented process (`MARKPROF_CONFIG`, then
//! `markprof.properties`).

use std::path::Path;

use crate::config::ProfilerSettings;

/// Print effective settings in property format to stdout.
///
/// Returns 0, or 1 if an explicit `path` cannot be loaded.
pub fn run_show(path: Option<&Path>) -> i32 {
    let settings = match path {
        Some(path) => match ProfilerSettings::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                return 1;
            }
        },
        None => ProfilerSettings::discover(),
    };
    print!("{}", settings.to_properties_string());
    0
}

/// Validate a settings file.
///
/// Returns 0 if valid, 1 if any line is invalid or the file is unreadable.
pub fn run_validate(path: &Path) -> i32 {
    let issues = match validate_file(path) {
        Ok(issues) => issues,
        Err(e) => {
            eprintln!("ERROR: {}: {}", path.display(), e);
            return 1;
        }
    };

    if issues.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        for issue in &issues {
            eprintln!("WARNING: {}", issue);
        }
        1
    }
}

/// Collect the problems in a settings file.
///
/// The outer error covers unreadable or unparseable files; the inner list
/// holds per-setting issues that would fall back to defaults at runtime.
pub(crate) fn validate_file(path: &Path) -> Result<Vec<String>, crate::ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let is_toml = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("toml"));

    let issues = if is_toml {
        ProfilerSettings::parse_toml(&text)?.1
    } else {
        ProfilerSettings::parse_properties(&text).1
    };
    Ok(issues.iter().map(ToString::to_string).collect())
}
