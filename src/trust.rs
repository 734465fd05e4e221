//! Trust classification of declared install sources.

use crate::models::ProtocolSource;

impl ProtocolSource {
    /// Whether installs from this source may skip the explicit confirmation step.
    pub fn is_trusted(self) -> bool {
        match self {
            ProtocolSource::Official | ProtocolSource::GithubOfficial => true,
            // No allow-list yet; every community listing is accepted.
            ProtocolSource::Community => true,
            ProtocolSource::ThirdParty | ProtocolSource::Developer => false,
        }
    }

    pub fn requires_confirmation(self) -> bool {
        !self.is_trusted()
    }
}

/// Classify a raw source tag. Unknown tags are untrusted.
pub fn is_source_trusted(tag: &str) -> bool {
    match tag.parse::<ProtocolSource>() {
        Ok(source) => source.is_trusted(),
        Err(_) => {
            tracing::debug!(tag, "unknown protocol source, treating as untrusted");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_party_sources_are_trusted() {
        assert!(ProtocolSource::Official.is_trusted());
        assert!(ProtocolSource::GithubOfficial.is_trusted());
        assert!(ProtocolSource::Community.is_trusted());
    }

    #[test]
    fn test_third_party_sources_require_confirmation() {
        assert!(!ProtocolSource::ThirdParty.is_trusted());
        assert!(!ProtocolSource::Developer.is_trusted());
        assert!(ProtocolSource::Developer.requires_confirmation());
    }

    #[test]
    fn test_raw_tags() {
        assert!(is_source_trusted("official"));
        assert!(!is_source_trusted("third_party"));
        assert!(!is_source_trusted("unknown-tag"));
        assert!(!is_source_trusted(""));
    }
}
