//! Inbound path → upstream path rewriting.
//!
//! # Rules
//! ```text
//! strip_prefix = /api/v1/anime, add_prefix = /otakudesu
//!
//!   /api/v1/anime            → /otakudesu
//!   /api/v1/anime/           → /otakudesu
//!   /api/v1/anime/home       → /otakudesu/home
//!   /api/v1/anime/genres/    → /otakudesu/genres/
//!   /elsewhere               → /otakudesu/elsewhere   (prefix absent: no-op strip)
//! ```
//!
//! A path that does not start with the strip prefix is not an error; the whole
//! path is treated as the remainder. The registry only dispatches paths under
//! a backend's route prefix, so this only matters when `strip_prefix` is
//! configured differently from `route_prefix`.

use thiserror::Error;
use url::Url;

use crate::config::BackendConfig;

/// Why a rewritten path could not become an upstream URL.
#[derive(Debug, Error)]
pub enum TargetUrlError {
    #[error("{0}")]
    Parse(#[from] url::ParseError),

    /// Dot segments resolved the path outside of `add_prefix`.
    #[error("path escapes upstream prefix '{0}'")]
    EscapesPrefix(String),
}

/// Per-backend rewrite rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRewriter {
    strip_prefix: String,
    add_prefix: String,
}

impl PathRewriter {
    pub fn new(strip_prefix: impl Into<String>, add_prefix: impl Into<String>) -> Self {
        let add_prefix: String = add_prefix.into();
        Self {
            strip_prefix: strip_prefix.into(),
            add_prefix: add_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(config.strip_prefix(), config.add_prefix.clone())
    }

    pub fn add_prefix(&self) -> &str {
        &self.add_prefix
    }

    /// Map an inbound path to the upstream path. Query strings are not handled here.
    pub fn rewrite(&self, path: &str) -> String {
        let remainder = match path.strip_prefix(self.strip_prefix.as_str()) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => path,
        };

        let remainder = remainder.trim_start_matches('/');
        if remainder.is_empty() {
            if self.add_prefix.is_empty() {
                return "/".to_string();
            }
            return self.add_prefix.clone();
        }

        format!("{}/{}", self.add_prefix, remainder)
    }

    /// Build the absolute upstream URL for `path`, copying `query` verbatim.
    pub fn target_url(
        &self,
        base_url: &str,
        path: &str,
        query: Option<&str>,
    ) -> Result<Url, TargetUrlError> {
        let upstream_path = self.rewrite(path);
        let mut url = Url::parse(&format!(
            "{}{}",
            base_url.trim_end_matches('/'),
            upstream_path
        ))?;
        url.set_query(query);

        if !self.contains(url.path()) {
            return Err(TargetUrlError::EscapesPrefix(self.add_prefix.clone()));
        }

        Ok(url)
    }

    fn contains(&self, upstream_path: &str) -> bool {
        if self.add_prefix.is_empty() {
            return true;
        }
        match upstream_path.strip_prefix(self.add_prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anime() -> PathRewriter {
        PathRewriter::new("/api/v1/anime", "/otakudesu")
    }

    #[test]
    fn test_root_collapses_to_add_prefix() {
        let rw = anime();
        assert_eq!(rw.rewrite("/api/v1/anime"), "/otakudesu");
        assert_eq!(rw.rewrite("/api/v1/anime/"), "/otakudesu");
    }

    #[test]
    fn test_single_separator_slash() {
        let rw = anime();
        assert_eq!(rw.rewrite("/api/v1/anime/home"), "/otakudesu/home");
        assert_eq!(rw.rewrite("/api/v1/anime/anime/one-piece"), "/otakudesu/anime/one-piece");

        let trailing = PathRewriter::new("/api/v1/manga", "/api/manga/");
        assert_eq!(trailing.rewrite("/api/v1/manga/list"), "/api/manga/list");
    }

    #[test]
    fn test_trailing_slash_preserved() {
        assert_eq!(anime().rewrite("/api/v1/anime/genres/"), "/otakudesu/genres/");
    }

    #[test]
    fn test_missing_prefix_is_noop() {
        assert_eq!(anime().rewrite("/elsewhere"), "/otakudesu/elsewhere");
        // Not a segment boundary, so nothing is stripped.
        assert_eq!(anime().rewrite("/api/v1/animex"), "/otakudesu/api/v1/animex");
    }

    #[test]
    fn test_empty_add_prefix() {
        let rw = PathRewriter::new("/api/v1/chapter", "");
        assert_eq!(rw.rewrite("/api/v1/chapter"), "/");
        assert_eq!(rw.rewrite("/api/v1/chapter/"), "/");
        assert_eq!(rw.rewrite("/api/v1/chapter/42"), "/42");
    }

    #[test]
    fn test_rewritten_paths_match_prefix_shape() {
        let rewriters = [
            anime(),
            PathRewriter::new("/api/v1/manga", "/api/manga"),
            PathRewriter::new("/api/v1/chapter", ""),
        ];
        let remainders = ["", "/", "/a", "/a/", "//a", "/a/b/c", "/a//b", "/search"];

        for rw in &rewriters {
            for rest in remainders {
                let path = format!("{}{}", rw.strip_prefix, rest);
                let out = rw.rewrite(&path);
                let tail = &out[rw.add_prefix().len()..];
                assert!(out.starts_with(rw.add_prefix()), "{out}");
                assert!(
                    tail.is_empty() || (tail.starts_with('/') && !tail.starts_with("//")),
                    "bad separator in {out} (from {path})"
                );
            }
        }
    }

    #[test]
    fn test_target_url_copies_query() {
        let url = anime()
            .target_url("http://localhost:3001/", "/api/v1/anime/search", Some("q=naruto&page=2"))
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:3001/otakudesu/search?q=naruto&page=2");
    }

    #[test]
    fn test_target_url_rejects_prefix_escape() {
        let err = anime()
            .target_url("http://localhost:3001", "/api/v1/anime/../../admin", None)
            .unwrap_err();
        assert!(matches!(err, TargetUrlError::EscapesPrefix(_)));

        let sibling = anime()
            .target_url("http://localhost:3001", "/api/v1/anime/../otakudesu-admin", None)
            .unwrap_err();
        assert!(matches!(sibling, TargetUrlError::EscapesPrefix(_)));
    }

    #[test]
    fn test_target_url_rejects_malformed_base() {
        let err = anime().target_url("not a url", "/api/v1/anime/home", None).unwrap_err();
        assert!(matches!(err, TargetUrlError::Parse(_)));
    }
}
