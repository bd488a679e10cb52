use std::env;

use tether_model::CacheControl;

/// Prompt caching switches, usually read from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptCacheConfig {
    /// Disables caching for every model.
    pub disabled: bool,
    /// Disables caching for models whose name contains `haiku`.
    pub disabled_haiku: bool,
    /// Disables caching for models whose name contains `sonnet`.
    pub disabled_sonnet: bool,
    /// Disables caching for models whose name contains `opus`.
    pub disabled_opus: bool,
    /// Whether markers carry the one hour TTL.
    pub use_ttl: bool,
}

impl Default for PromptCacheConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            disabled_haiku: false,
            disabled_sonnet: false,
            disabled_opus: false,
            use_ttl: true,
        }
    }
}

fn truthy(value: Option<String>) -> bool {
    value.is_some_and(|value| {
        let value = value.trim().to_ascii_lowercase();
        value == "1" || value == "true" || value == "yes"
    })
}

impl PromptCacheConfig {
    /// TTL attached to markers unless disabled.
    pub const TTL: &'static str = "1h";

    /// Reads the configuration from the environment.
    ///
    /// Recognized variables are `DISABLE_PROMPT_CACHING`,
    /// `DISABLE_PROMPT_CACHING_HAIKU`, `DISABLE_PROMPT_CACHING_SONNET`,
    /// `DISABLE_PROMPT_CACHING_OPUS` and `DISABLE_PROMPT_CACHE_TTL`. A
    /// variable is set when it is `1`, `true` or `yes`, case-insensitively.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            disabled: truthy(lookup("DISABLE_PROMPT_CACHING")),
            disabled_haiku: truthy(lookup("DISABLE_PROMPT_CACHING_HAIKU")),
            disabled_sonnet: truthy(lookup("DISABLE_PROMPT_CACHING_SONNET")),
            disabled_opus: truthy(lookup("DISABLE_PROMPT_CACHING_OPUS")),
            use_ttl: !truthy(lookup("DISABLE_PROMPT_CACHE_TTL")),
        }
    }

    /// Returns `true` if caching is enabled for `model`.
    pub fn is_enabled_for(&self, model: &str) -> bool {
        !(self.disabled
            || (self.disabled_haiku && model.contains("haiku"))
            || (self.disabled_sonnet && model.contains("sonnet"))
            || (self.disabled_opus && model.contains("opus")))
    }

    /// Creates a marker honoring the TTL switch.
    pub fn cache_control(&self) -> CacheControl {
        CacheControl {
            ttl: self.use_ttl.then(|| Self::TTL.to_owned()),
            ..CacheControl::ephemeral()
        }
    }

    /// Returns the marker to use for `model`, or `None` if caching is
    /// disabled for it.
    #[inline]
    pub fn marker_for(&self, model: &str) -> Option<CacheControl> {
        self.is_enabled_for(model).then(|| self.cache_control())
    }
}
