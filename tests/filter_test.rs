//! Tests for per-mark policy resolution.

use markprof::config::FilterMode;
use markprof::{ExcludeFilter, MarkPolicy, ProfilerSettings};

fn resolve_all(properties: &str, elements: &[&str]) -> Vec<MarkPolicy> {
    let filter = ExcludeFilter::new(ProfilerSettings::from_properties_str(properties));
    elements.iter().map(|e| filter.resolve(e)).collect()
}

#[test]
fn test_exclude_mode_policies() {
    let policies = resolve_all(
        "mode=exclude\nmark.a=ignoremark\nmark.b=ignoreinvocation\nmark.c=true\n",
        &["a", "b", "c", "unlisted"],
    );
    assert_eq!(
        policies,
        vec![
            MarkPolicy::IgnoreMark,
            MarkPolicy::IgnoreInstance,
            MarkPolicy::IgnoreMark,
            MarkPolicy::Passthrough,
        ]
    );
}

#[test]
fn test_include_mode_policies() {
    let policies = resolve_all(
        "mode=include\nmark.a=ignoremark\nmark.b=ignoreinvocation\nmark.c=true\n",
        &["a", "b", "c", "unlisted"],
    );
    assert_eq!(
        policies,
        vec![
            MarkPolicy::IgnoreMark,
            MarkPolicy::IgnoreInstance,
            MarkPolicy::Passthrough,
            MarkPolicy::IgnoreMark,
        ]
    );
}

#[test]
fn test_default_settings_pass_everything() {
    let filter = ExcludeFilter::new(ProfilerSettings::default());
    assert_eq!(filter.settings().mode, FilterMode::Exclude);
    assert_eq!(filter.resolve("anything"), MarkPolicy::Passthrough);
}

#[test]
fn test_lookup_is_exact_element_name() {
    let policies = resolve_all("mark.db=ignoremark\n", &["db", "db.query", "DB"]);
    assert_eq!(
        policies,
        vec![MarkPolicy::IgnoreMark, MarkPolicy::Passthrough, MarkPolicy::Passthrough]
    );
}
