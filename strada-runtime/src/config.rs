//! Runtime tunables.
//!
//! The base spec documents several bounds as "implementation pragmatics,
//! not contracts" (§9): initial array capacity, initial dict bucket count,
//! exception checkpoint depth, OOP registry bounds, profiler table sizes.
//! This module collects them into one deserializable struct instead of
//! scattering them as module-level constants, so an embedder can override
//! them without rebuilding.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub array_initial_capacity: usize,
    pub dict_initial_buckets: usize,
    pub try_stack_depth: usize,
    pub oop_package_cap: usize,
    pub oop_method_cap: usize,
    pub oop_parent_cap: usize,
    pub oop_visited_cap: usize,
    pub profiler_table_size: usize,
    pub profiler_stack_depth: usize,
    /// Install the SIGQUIT diagnostics dump handler. Default on for debug
    /// builds, per §11.
    pub diagnostics: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            array_initial_capacity: 8,
            dict_initial_buckets: 16,
            try_stack_depth: 64,
            oop_package_cap: 256,
            oop_method_cap: 256,
            oop_parent_cap: 16,
            oop_visited_cap: 64,
            profiler_table_size: 4096,
            profiler_stack_depth: 256,
            diagnostics: cfg!(debug_assertions),
        }
    }
}

impl RuntimeConfig {
    /// Reads `STRADA_*` environment variables, falling back to the spec's
    /// stated defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = RuntimeConfig::default();
        RuntimeConfig {
            array_initial_capacity: env_usize("STRADA_ARRAY_INITIAL_CAPACITY", defaults.array_initial_capacity),
            dict_initial_buckets: env_usize("STRADA_DICT_INITIAL_BUCKETS", defaults.dict_initial_buckets),
            try_stack_depth: env_usize("STRADA_TRY_STACK_DEPTH", defaults.try_stack_depth),
            oop_package_cap: env_usize("STRADA_OOP_PACKAGE_CAP", defaults.oop_package_cap),
            oop_method_cap: env_usize("STRADA_OOP_METHOD_CAP", defaults.oop_method_cap),
            oop_parent_cap: env_usize("STRADA_OOP_PARENT_CAP", defaults.oop_parent_cap),
            oop_visited_cap: env_usize("STRADA_OOP_VISITED_CAP", defaults.oop_visited_cap),
            profiler_table_size: env_usize("STRADA_PROFILER_TABLE_SIZE", defaults.profiler_table_size),
            profiler_stack_depth: env_usize("STRADA_PROFILER_STACK_DEPTH", defaults.profiler_stack_depth),
            diagnostics: std::env::var("STRADA_DIAGNOSTICS")
                .map(|v| v != "0")
                .unwrap_or(defaults.diagnostics),
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_bounds() {
        let c = RuntimeConfig::default();
        assert_eq!(c.array_initial_capacity, 8);
        assert_eq!(c.dict_initial_buckets, 16);
        assert_eq!(c.try_stack_depth, 64);
        assert_eq!(c.oop_package_cap, 256);
        assert_eq!(c.oop_method_cap, 256);
        assert_eq!(c.oop_parent_cap, 16);
        assert_eq!(c.oop_visited_cap, 64);
        assert_eq!(c.profiler_table_size, 4096);
        assert_eq!(c.profiler_stack_depth, 256);
    }

    #[test]
    fn from_toml_str_overrides_defaults() {
        let c = RuntimeConfig::from_toml_str("array_initial_capacity = 32\n").unwrap();
        assert_eq!(c.array_initial_capacity, 32);
        assert_eq!(c.dict_initial_buckets, 16);
    }
}
