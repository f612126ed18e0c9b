//! Environment lookup that tolerates hosting-platform naming conventions.

use std::collections::HashMap;

/// Backend URL variable names, in priority order.
pub const BACKEND_URL_VARS: &[&str] = &[
    "SUPABASE_URL",
    "VITE_SUPABASE_URL",
    "NEXT_PUBLIC_SUPABASE_URL",
    "REACT_APP_SUPABASE_URL",
    "POLARIS_BACKEND_URL",
];

/// Backend key variable names, in priority order.
pub const BACKEND_KEY_VARS: &[&str] = &[
    "SUPABASE_ANON_KEY",
    "SUPABASE_KEY",
    "VITE_SUPABASE_ANON_KEY",
    "NEXT_PUBLIC_SUPABASE_ANON_KEY",
    "REACT_APP_SUPABASE_ANON_KEY",
    "POLARIS_BACKEND_KEY",
];

/// Inference API key variable names, in priority order.
pub const INFERENCE_KEY_VARS: &[&str] = &[
    "API_KEY",
    "GEMINI_API_KEY",
    "GOOGLE_API_KEY",
    "VITE_GEMINI_API_KEY",
    "POLARIS_INFERENCE_KEY",
];

/// Read-only view of environment variables.
pub trait EnvSource: Send + Sync {
    /// Snapshot of all `(name, value)` pairs.
    fn vars(&self) -> Vec<(String, String)>;

    /// First non-blank value among `names`, matched case-insensitively.
    /// Earlier names win. Returns the matched variable name and trimmed value.
    fn lookup_any(&self, names: &[&str]) -> Option<(String, String)> {
        let vars = self.vars();
        names.iter().find_map(|wanted| {
            vars.iter()
                .filter(|(name, _)| name.eq_ignore_ascii_case(wanted))
                .map(|(name, value)| (name.clone(), value.trim().to_string()))
                .find(|(_, value)| !value.is_empty())
        })
    }
}

/// The real process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn vars(&self) -> Vec<(String, String)> {
        // Non-UTF-8 entries cannot match any of our names.
        std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect()
    }
}

/// Fixed set of variables, used in tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.vars.insert(name.to_string(), value.to_string());
        self
    }
}

impl EnvSource for MapEnv {
    fn vars(&self) -> Vec<(String, String)> {
        self.vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
