//! Utility functions

use serde::{Deserialize, Serialize};

/// Version information for the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Generate a random UUID v4
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Image name for a deployment: `cloudlab-<id>-<8 random hex chars>`
///
/// The random suffix keeps names distinct if a build for the same deployment
/// is ever attempted twice.
pub fn image_ref_for(deployment_id: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("cloudlab-{}-{}", deployment_id, &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_ref_shape() {
        let id = generate_uuid();
        let image = image_ref_for(&id);

        let suffix = image
            .strip_prefix(&format!("cloudlab-{}-", id))
            .expect("prefix");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(image, image.to_lowercase());
    }

    #[test]
    fn test_image_refs_differ_per_attempt() {
        assert_ne!(image_ref_for("abc"), image_ref_for("abc"));
    }
}
