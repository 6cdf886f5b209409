//! Package manifest (`.nuspec`) parsing
//!
//! Only the fields feedkit reads are extracted. Element lookup matches on
//! local names so manifests from every schema namespace parse the same way.

use super::identity::PackageIdentity;
use super::version::PackageVersion;
use std::path::Path;

/// A dependency declared by a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDependency {
    pub id: String,
    /// Version range text as written, if any
    pub version_range: Option<String>,
}

/// Dependencies declared for one target framework (or for all of them)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGroup {
    pub target_framework: Option<String>,
    pub dependencies: Vec<ManifestDependency>,
}

/// Parsed package manifest
#[derive(Debug, Clone)]
pub struct PackageManifest {
    pub id: String,
    pub version: PackageVersion,
    pub authors: Option<String>,
    pub description: Option<String>,
    pub dependency_groups: Vec<DependencyGroup>,
}

impl PackageManifest {
    /// Parse manifest XML. Errors are plain reasons; callers attach the path.
    pub fn parse(xml: &str) -> Result<Self, String> {
        let doc = roxmltree::Document::parse(xml).map_err(|e| format!("invalid XML: {}", e))?;

        let root = doc.root_element();
        if root.tag_name().name() != "package" {
            return Err(format!(
                "expected root element 'package', found '{}'",
                root.tag_name().name()
            ));
        }

        let metadata = child(root, "metadata").ok_or("missing 'metadata' element")?;

        let id = child_text(metadata, "id").ok_or("missing 'id' element")?;
        let version_text = child_text(metadata, "version").ok_or("missing 'version' element")?;
        let version = PackageVersion::parse(&version_text).map_err(|e| e.to_string())?;

        let dependency_groups = child(metadata, "dependencies")
            .map(parse_dependencies)
            .unwrap_or_default();

        Ok(Self {
            id,
            version,
            authors: child_text(metadata, "authors"),
            description: child_text(metadata, "description"),
            dependency_groups,
        })
    }

    /// Read and parse a manifest file
    pub fn from_file(path: &Path) -> crate::error::FeedResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::FeedError::io(format!("reading {}", path.display()), e))?;
        Self::parse(&content).map_err(|reason| crate::error::FeedError::PackagingFormat {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity::new(self.id.clone(), self.version.clone())
    }
}

fn child<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.has_tag_name(name))
}

fn child_text(node: roxmltree::Node<'_, '_>, name: &str) -> Option<String> {
    child(node, name)
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn parse_dependency(node: roxmltree::Node<'_, '_>) -> Option<ManifestDependency> {
    let id = node.attribute("id")?.trim();
    if id.is_empty() {
        return None;
    }
    Some(ManifestDependency {
        id: id.to_string(),
        version_range: node.attribute("version").map(str::to_string),
    })
}

/// Dependencies are either grouped per framework or listed flat
fn parse_dependencies(deps: roxmltree::Node<'_, '_>) -> Vec<DependencyGroup> {
    let mut groups = Vec::new();
    let mut ungrouped = Vec::new();

    for node in deps.children().filter(|n| n.is_element()) {
        match node.tag_name().name() {
            "group" => groups.push(DependencyGroup {
                target_framework: node.attribute("targetFramework").map(str::to_string),
                dependencies: node
                    .children()
                    .filter(|n| n.is_element() && n.has_tag_name("dependency"))
                    .filter_map(parse_dependency)
                    .collect(),
            }),
            "dependency" => ungrouped.extend(parse_dependency(node)),
            _ => {}
        }
    }

    if !ungrouped.is_empty() {
        groups.insert(
            0,
            DependencyGroup {
                target_framework: None,
                dependencies: ungrouped,
            },
        );
    }

    groups
}
