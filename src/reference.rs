//! Image references: `namespace/repo:tag`, with the Docker Hub defaulting
//! rules (`library` namespace, `latest` tag) applied the same way the
//! registry's own clients do.

use crate::error::{self, Error};
use crate::Result;
use snafu::ensure;

fn valid_component(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// A resolved `(namespace, repo, tag)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    pub namespace: String,
    pub repo: String,
    pub tag: String,
}

impl ImageReference {
    /// Parse `input` of the form `[namespace/]repo[:tag]`. Missing namespace
    /// defaults to `library`; missing tag defaults to `latest`.
    pub fn parse(input: &str) -> Result<Self> {
        ensure!(
            !input.is_empty(),
            error::InvalidReferenceSnafu {
                reason: "reference is empty".to_string()
            }
        );

        let (repo_part, tag) = match input.rsplit_once(':') {
            // a colon after the last '/' is a tag separator; a colon before
            // it is a registry port, which this reference type doesn't model
            Some((repo, tag)) if !repo.contains('/') || !tag.contains('/') => {
                (repo.to_string(), tag.to_string())
            }
            _ => (input.to_string(), "latest".to_string()),
        };

        let (namespace, repo) = match repo_part.split_once('/') {
            Some((ns, repo)) => (ns.to_string(), repo.to_string()),
            None => ("library".to_string(), repo_part),
        };

        let reference = Self {
            namespace,
            repo,
            tag,
        };
        reference.validate()?;
        Ok(reference)
    }

    fn validate(&self) -> std::result::Result<(), Error> {
        for (field, value) in [
            ("namespace", &self.namespace),
            ("repo", &self.repo),
            ("tag", &self.tag),
        ] {
            ensure!(
                valid_component(value),
                error::InvalidReferenceSnafu {
                    reason: format!("{field} '{value}' does not match [A-Za-z0-9][A-Za-z0-9._-]*")
                }
            );
        }
        Ok(())
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}:{}", self.namespace, self.repo, self.tag)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_namespace_and_tag() {
        let r = ImageReference::parse("alpine").unwrap();
        assert_eq!(r.namespace, "library");
        assert_eq!(r.repo, "alpine");
        assert_eq!(r.tag, "latest");
    }

    #[test]
    fn explicit_namespace_and_tag() {
        let r = ImageReference::parse("grafana/loki:2.9.0").unwrap();
        assert_eq!(r.namespace, "grafana");
        assert_eq!(r.repo, "loki");
        assert_eq!(r.tag, "2.9.0");
    }

    #[test]
    fn tag_only_no_namespace() {
        let r = ImageReference::parse("alpine:3.19").unwrap();
        assert_eq!(r.namespace, "library");
        assert_eq!(r.repo, "alpine");
        assert_eq!(r.tag, "3.19");
    }

    #[test]
    fn rejects_invalid_component() {
        assert!(ImageReference::parse("/bad").is_err());
        assert!(ImageReference::parse("ns/repo:tag with spaces").is_err());
    }

    #[test]
    fn display_roundtrips() {
        let r = ImageReference::parse("library/alpine:latest").unwrap();
        assert_eq!(r.to_string(), "library/alpine:latest");
    }
}
