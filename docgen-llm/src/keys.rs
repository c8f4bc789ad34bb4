//! Scoped environment-variable API keys.
//!
//! Keys are passed through request scope everywhere in this workspace;
//! this guard exists for the rare collaborator that insists on env-based
//! configuration. It restores the prior value on every exit path.

/// Sets an environment variable for the guard's lifetime and restores the
/// previous value (or removes the variable) on drop.
pub struct ScopedApiKey {
    var: String,
    prior: Option<String>,
}

impl ScopedApiKey {
    pub fn set(var: impl Into<String>, value: &str) -> Self {
        let var = var.into();
        let prior = std::env::var(&var).ok();
        // SAFETY: single mutation point for provider env keys; guards are
        // short-lived and scoped to one collaborator call.
        unsafe { std::env::set_var(&var, value) };
        Self { var, prior }
    }

    /// Env var name a provider conventionally reads its key from.
    pub fn var_for_provider(provider: &str) -> Option<&'static str> {
        match provider.to_lowercase().as_str() {
            "gemini" | "google" => Some("GEMINI_API_KEY"),
            "openai" => Some("OPENAI_API_KEY"),
            "anthropic" => Some("ANTHROPIC_API_KEY"),
            _ => None,
        }
    }
}

impl Drop for ScopedApiKey {
    fn drop(&mut self) {
        unsafe {
            match self.prior.take() {
                Some(prior) => std::env::set_var(&self.var, prior),
                None => std::env::remove_var(&self.var),
            }
        }
    }
}
