//! Output-link generation
//!
//! Deterministic rewrite of a backend URL into the link handed to the user:
//! raw (`weibo`), R2 public-domain rewrite (`r2`), or proxy prefix
//! (`baidu`, the default).

use picrelay_core::{OutputFormat, UserConfig};

/// A generated link plus an optional warning for the user (e.g. a fallback
/// because the R2 public domain is missing).
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedLink {
    pub link: String,
    pub warning: Option<String>,
}

impl GeneratedLink {
    fn ok(link: String) -> Self {
        Self { link, warning: None }
    }

    fn fallback(link: String, warning: String) -> Self {
        Self {
            link,
            warning: Some(warning),
        }
    }
}

/// Derive the distributed link from the primary backend's raw URL.
pub fn generate_link(raw_url: &str, file_key: Option<&str>, config: &UserConfig) -> GeneratedLink {
    match config.output_format {
        OutputFormat::Weibo => GeneratedLink::ok(raw_url.to_string()),
        OutputFormat::R2 => r2_link(raw_url, file_key, config),
        OutputFormat::Baidu => {
            let prefix = config.link_prefix.as_deref().unwrap_or("");
            GeneratedLink::ok(format!("{}{}", prefix, raw_url))
        }
    }
}

fn r2_link(raw_url: &str, file_key: Option<&str>, config: &UserConfig) -> GeneratedLink {
    let Some(r2) = &config.r2 else {
        return GeneratedLink::fallback(
            raw_url.to_string(),
            "R2 output format selected but R2 is not configured; using the raw link".to_string(),
        );
    };

    let domain = r2.public_domain.trim().trim_end_matches('/');
    if domain.is_empty() {
        tracing::warn!("R2 public domain missing, falling back to raw backend URL");
        return GeneratedLink::fallback(
            raw_url.to_string(),
            "R2 public domain is not set; using the raw link".to_string(),
        );
    }

    let Some(key) = file_key.filter(|k| !k.is_empty()) else {
        return GeneratedLink::fallback(
            raw_url.to_string(),
            "Backend did not return a storage key; using the raw link".to_string(),
        );
    };

    // Accept a bare host in the setting; the link needs a scheme.
    let domain = if domain.starts_with("http://") || domain.starts_with("https://") {
        domain.to_string()
    } else {
        format!("https://{}", domain)
    };

    let path = r2.path.trim_matches('/');
    let link = if path.is_empty() {
        format!("{}/{}", domain, key.trim_start_matches('/'))
    } else {
        format!("{}/{}/{}", domain, path, key.trim_start_matches('/'))
    };
    GeneratedLink::ok(link)
}
