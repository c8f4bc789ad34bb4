use axum::http::HeaderMap;
use docgen_core::Provider;

/// Provider API keys extracted from request headers.
///
/// Keys travel in request scope only; nothing here touches process
/// environment.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub gemini: Option<String>,
    pub openai: Option<String>,
    pub anthropic: Option<String>,
    pub image: Option<String>,
    pub google: Option<String>,
    pub user_id: Option<String>,
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string).filter(|v| !v.is_empty())
}

impl ApiKeys {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            gemini: header(headers, "x-gemini-key"),
            openai: header(headers, "x-openai-key"),
            anthropic: header(headers, "x-anthropic-key"),
            image: header(headers, "x-image-key"),
            google: header(headers, "x-google-key"),
            user_id: header(headers, "x-user-id"),
        }
    }

    /// The key for the request's text provider, with env fallback.
    pub fn for_provider(&self, provider: Provider) -> Option<String> {
        let from_header = match provider {
            Provider::Gemini => self.gemini.clone().or_else(|| self.google.clone()),
            Provider::Openai => self.openai.clone(),
            Provider::Anthropic => self.anthropic.clone(),
        };
        from_header.or_else(|| {
            let var = match provider {
                Provider::Gemini => "GEMINI_API_KEY",
                Provider::Openai => "OPENAI_API_KEY",
                Provider::Anthropic => "ANTHROPIC_API_KEY",
            };
            std::env::var(var).ok().filter(|v| !v.is_empty())
        })
    }

    /// Image generation key: dedicated header, then Google, then the
    /// provider key.
    pub fn for_images(&self, provider: Provider) -> Option<String> {
        self.image.clone().or_else(|| self.google.clone()).or_else(|| self.for_provider(provider))
    }

    /// Gemini-only collaborator key (TTS, vision).
    pub fn for_gemini(&self) -> Option<String> {
        self.google.clone().or_else(|| self.gemini.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::HeaderName::try_from(*name).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_provider_key_resolution() {
        let keys = ApiKeys::from_headers(&headers(&[
            ("x-gemini-key", "gk"),
            ("x-openai-key", "ok"),
        ]));
        assert_eq!(keys.for_provider(Provider::Gemini).as_deref(), Some("gk"));
        assert_eq!(keys.for_provider(Provider::Openai).as_deref(), Some("ok"));
    }

    #[test]
    fn test_google_key_backs_gemini() {
        let keys = ApiKeys::from_headers(&headers(&[("x-google-key", "googk")]));
        assert_eq!(keys.for_provider(Provider::Gemini).as_deref(), Some("googk"));
        assert_eq!(keys.for_gemini().as_deref(), Some("googk"));
    }

    #[test]
    fn test_image_key_preference_order() {
        let keys = ApiKeys::from_headers(&headers(&[
            ("x-gemini-key", "gk"),
            ("x-image-key", "ik"),
        ]));
        assert_eq!(keys.for_images(Provider::Gemini).as_deref(), Some("ik"));

        let keys = ApiKeys::from_headers(&headers(&[("x-gemini-key", "gk")]));
        assert_eq!(keys.for_images(Provider::Gemini).as_deref(), Some("gk"));
    }
}
