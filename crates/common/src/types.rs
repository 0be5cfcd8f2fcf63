// Core evidence types, serialized the way the evidence store speaks them (camelCase JSON).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Kind of a note, and of every occurrence that references it.
///
/// Unknown wire values decode as [`NoteKind::Unspecified`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NoteKind {
    #[default]
    Unspecified,
    Vulnerability,
    Build,
    Image,
    Package,
    Deployment,
    Discovery,
    Attestation,
    Intoto,
}

impl NoteKind {
    pub const ALL: [NoteKind; 9] = [
        Self::Unspecified,
        Self::Vulnerability,
        Self::Build,
        Self::Image,
        Self::Package,
        Self::Deployment,
        Self::Discovery,
        Self::Attestation,
        Self::Intoto,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "NOTE_KIND_UNSPECIFIED",
            Self::Vulnerability => "VULNERABILITY",
            Self::Build => "BUILD",
            Self::Image => "IMAGE",
            Self::Package => "PACKAGE",
            Self::Deployment => "DEPLOYMENT",
            Self::Discovery => "DISCOVERY",
            Self::Attestation => "ATTESTATION",
            Self::Intoto => "INTOTO",
        }
    }

    /// Short lowercase token used to derive note identifiers.
    pub const fn token(self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Vulnerability => "vulnerability",
            Self::Build => "build",
            Self::Image => "image",
            Self::Package => "package",
            Self::Deployment => "deployment",
            Self::Discovery => "discovery",
            Self::Attestation => "attestation",
            Self::Intoto => "intoto",
        }
    }

    pub fn from_wire(value: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .unwrap_or(Self::Unspecified)
    }
}

impl fmt::Display for NoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NoteKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NoteKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&value))
    }
}

/// The artifact an occurrence is about.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub uri: String,
}

/// A single evidence record attached to a resource.
///
/// Kind-specific details other than `build` are carried through untouched in `details`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub resource: Resource,
    #[serde(default)]
    pub note_name: String,
    #[serde(default)]
    pub kind: NoteKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub remediation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildDetails>,
    #[serde(flatten)]
    pub details: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<BuildProvenance>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildProvenance {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub built_artifacts: Vec<Artifact>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
}

impl Occurrence {
    /// URIs of every artifact this occurrence's build produced.
    pub fn built_artifact_ids(&self) -> impl Iterator<Item = &str> {
        self.build
            .iter()
            .filter_map(|build| build.provenance.as_ref())
            .flat_map(|provenance| provenance.built_artifacts.iter())
            .map(|artifact| artifact.id.as_str())
            .filter(|id| !id.is_empty())
    }
}

/// A reusable definition referenced by occurrences.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub short_description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub long_description: String,
    #[serde(default)]
    pub kind: NoteKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub details: BTreeMap<String, Value>,
}

/// Evidence-store project that scopes every note and occurrence.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub name: String,
}

/// A resource independent of its version, e.g. an image repository or a package.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenericResource {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
}

/// One concrete version (full resource URI) of a generic resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenericResourceVersion {
    pub resource_id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}
