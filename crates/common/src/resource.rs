// Resource URI parsing: splits a versioned resource URI into type, name and version.
//
// Supported shapes:
//   pkg:{type}/{name}@{version}          package URLs
//   {scheme}://{name}@{version}          scheme URIs (git, npm, ...)
//   {registry}/{name}@sha256:{digest}    image references (type "docker")
//   {registry}/{name}:{tag}              image references (type "docker")

use sha2::{Digest, Sha256};
use thiserror::Error;

const DOCKER_TYPE: &str = "docker";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResourceUriError {
    #[error("resource uri is empty")]
    Empty,

    #[error("package url is missing a type: {0}")]
    MissingPackageType(String),

    #[error("resource uri is missing a name: {0}")]
    MissingName(String),
}

/// A resource URI split into its generic resource and its version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceUri {
    pub resource_type: String,
    pub name: String,
    /// The full URI; every distinct URI is a distinct version.
    pub version: String,
}

impl ResourceUri {
    /// Stable identifier of the generic resource this URI is a version of.
    pub fn generic_resource_id(&self) -> String {
        generic_resource_id(&self.resource_type, &self.name)
    }
}

pub fn parse_resource_uri(uri: &str) -> Result<ResourceUri, ResourceUriError> {
    let uri = uri.trim();
    if uri.is_empty() {
        return Err(ResourceUriError::Empty);
    }

    let (resource_type, name) = if let Some(rest) = uri.strip_prefix("pkg:") {
        let (package_type, remainder) = rest
            .split_once('/')
            .filter(|(package_type, _)| !package_type.is_empty())
            .ok_or_else(|| ResourceUriError::MissingPackageType(uri.to_string()))?;
        let remainder = remainder.split(['?', '#']).next().unwrap_or_default();
        (package_type.to_ascii_lowercase(), strip_version(remainder))
    } else if let Some((scheme, rest)) = uri.split_once("://") {
        (scheme.to_ascii_lowercase(), strip_version(rest))
    } else {
        (DOCKER_TYPE.to_string(), strip_image_version(uri))
    };

    if name.is_empty() {
        return Err(ResourceUriError::MissingName(uri.to_string()));
    }

    Ok(ResourceUri { resource_type, name: name.to_string(), version: uri.to_string() })
}

/// Hex SHA-256 of `{type}:{name}`.
pub fn generic_resource_id(resource_type: &str, name: &str) -> String {
    hex_digest(&format!("{resource_type}:{name}"))
}

/// Hex SHA-256 of a full resource URI, used as the version document id.
pub fn resource_version_id(version: &str) -> String {
    hex_digest(version)
}

fn hex_digest(value: &str) -> String {
    format!("{:x}", Sha256::digest(value.as_bytes()))
}

fn strip_version(value: &str) -> &str {
    match value.rsplit_once('@') {
        Some((name, _)) => name,
        None => value,
    }
}

fn strip_image_version(value: &str) -> &str {
    if let Some((name, _)) = value.split_once('@') {
        return name;
    }

    // A ':' before the last '/' is a registry port, not a tag.
    let last_segment_start = value.rfind('/').map(|index| index + 1).unwrap_or(0);
    match value[last_segment_start..].rfind(':') {
        Some(offset) => &value[..last_segment_start + offset],
        None => value,
    }
}
