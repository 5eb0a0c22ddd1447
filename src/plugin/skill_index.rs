use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::model::component::Component;
use crate::model::file_tree;

/// Written at the destination root on every run.
pub const INDEX_FILE_NAME: &str = "SKILLS_INDEX.md";
const SKILL_FILE: &str = "SKILL.md";

#[derive(Debug, Default, Deserialize)]
struct SkillFrontmatter {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillSummary {
    pub name: String,
    pub description: String,
    pub plugin_id: String,
    /// Destination path relative to the destination root.
    pub location: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDocument {
    pub relative_path: PathBuf,
    pub content: String,
}

fn parse_frontmatter(content: &str) -> Result<SkillFrontmatter, String> {
    let Some(rest) = content.strip_prefix("---") else {
        return Err("no YAML front matter".to_string());
    };
    let end = rest
        .find("\n---")
        .ok_or_else(|| "missing closing --- for front matter".to_string())?;

    serde_yaml::from_str(&rest[..end]).map_err(|err| err.to_string())
}

/// Name and description from the skill's `SKILL.md`, falling back to the
/// directory name when the front matter is missing or unreadable.
pub fn summarize(component: &Component, location: &Path) -> SkillSummary {
    let fallback = component
        .relative_identifier
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let frontmatter = fs::read_to_string(component.source_path.join(SKILL_FILE))
        .map_err(|err| err.to_string())
        .and_then(|content| parse_frontmatter(&content))
        .unwrap_or_else(|reason| {
            tracing::debug!("skill {}: {reason}", component.label());
            SkillFrontmatter::default()
        });

    SkillSummary {
        name: frontmatter
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(fallback),
        description: frontmatter
            .description
            .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
            .unwrap_or_default(),
        plugin_id: component.plugin_id.to_string(),
        location: location.to_path_buf(),
    }
}

/// Renders the index. Output depends only on the summaries, so reinstalling
/// the same set rewrites identical bytes.
pub fn render(summaries: &[SkillSummary]) -> IndexDocument {
    let mut sorted: Vec<&SkillSummary> = summaries.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name).then(a.location.cmp(&b.location)));

    let mut lines = vec![
        "# Installed skills".to_string(),
        String::new(),
        "Generated by kitwright. Rewritten on every install; do not edit.".to_string(),
        String::new(),
    ];

    if sorted.is_empty() {
        lines.push("_No skills installed._".to_string());
    }

    for summary in sorted {
        let location = file_tree::to_slash(&summary.location);
        if summary.description.is_empty() {
            lines.push(format!(
                "- **{}** (`{location}`, {})",
                summary.name, summary.plugin_id
            ));
        } else {
            lines.push(format!(
                "- **{}** (`{location}`, {}): {}",
                summary.name, summary.plugin_id, summary.description
            ));
        }
    }

    let mut content = lines.join("\n");
    content.push('\n');

    IndexDocument {
        relative_path: PathBuf::from(INDEX_FILE_NAME),
        content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::component::ComponentKind;
    use crate::plugin::manifest::PluginId;
    use tempfile::TempDir;

    fn skill(dir: &Path, name: &str, skill_md: Option<&str>) -> Component {
        let root = dir.join(name);
        fs::create_dir_all(&root).unwrap();
        if let Some(body) = skill_md {
            fs::write(root.join(SKILL_FILE), body).unwrap();
        }
        Component {
            kind: ComponentKind::Skill,
            plugin_id: PluginId::new("kit"),
            source_path: root,
            relative_identifier: PathBuf::from(name),
            is_directory: true,
        }
    }

    #[test]
    fn reads_name_and_description_from_front_matter() {
        let tmp = TempDir::new().unwrap();
        let component = skill(
            tmp.path(),
            "rag",
            Some("---\nname: rag-pipelines\ndescription: >\n  Build retrieval\n  pipelines\n---\n\nBody\n"),
        );

        let summary = summarize(&component, Path::new("skills/rag"));
        assert_eq!(summary.name, "rag-pipelines");
        assert_eq!(summary.description, "Build retrieval pipelines");
    }

    #[test]
    fn falls_back_to_directory_name() {
        let tmp = TempDir::new().unwrap();
        let component = skill(tmp.path(), "plain", Some("# No front matter\n"));

        let summary = summarize(&component, Path::new("skills/plain"));
        assert_eq!(summary.name, "plain");
        assert!(summary.description.is_empty());
    }

    #[test]
    fn render_is_sorted_and_stable() {
        let summaries = vec![
            SkillSummary {
                name: "zeta".into(),
                description: "last".into(),
                plugin_id: "kit".into(),
                location: PathBuf::from("skills/zeta"),
            },
            SkillSummary {
                name: "alpha".into(),
                description: String::new(),
                plugin_id: "kit".into(),
                location: PathBuf::from("skills/alpha"),
            },
        ];

        let doc = render(&summaries);
        assert_eq!(doc.relative_path, PathBuf::from(INDEX_FILE_NAME));
        let alpha = doc.content.find("**alpha**").unwrap();
        let zeta = doc.content.find("**zeta**").unwrap();
        assert!(alpha < zeta);
        assert!(doc.content.contains("`skills/zeta`, kit): last"));
        assert_eq!(doc, render(&summaries));
    }
}
