//! Assistant-context file maintenance.
//!
//! After an install or update, every rule file of every installed package
//! must appear exactly once as an `@.rulestack/...` reference line in the
//! "Active Rules" section of the context file. The section is treated as a
//! set of reference lines: existing lines are kept, missing ones are added,
//! and lines pointing into package directories that no longer exist are
//! dropped.

use std::collections::BTreeSet;
use std::path::Path;

use walkdir::WalkDir;

use crate::RULESTACK_DIR;
use crate::project::Project;

const ACTIVE_RULES_HEADER: &str = "## Active Rules";

const CONTEXT_TEMPLATE: &str = "\
# Project Assistant Context

Rules installed with rulestack are listed below. The references are
regenerated on every install; edit the rest of this file freely.

## Active Rules

";

/// Create the context file from the built-in template if it is missing.
pub fn ensure_context_file(project: &Project) -> anyhow::Result<()> {
    let path = project.context_file_path();
    if !path.exists() {
        fs_err::write(&path, CONTEXT_TEMPLATE)?;
    }
    Ok(())
}

/// Bring the "Active Rules" section in sync with the packages on disk.
///
/// Idempotent: running it twice without changing `.rulestack/` leaves the
/// file untouched.
pub fn regenerate_context_file(project: &Project) -> anyhow::Result<()> {
    ensure_context_file(project)?;
    let path = project.context_file_path();
    let contents = fs_err::read_to_string(&path)?;

    let expected = reference_lines(project)?;
    let updated = rewrite_section(&contents, &expected, project.root());
    if updated != contents {
        fs_err::write(&path, updated)?;
    }
    Ok(())
}

/// One reference line per rule file of every installed package.
fn reference_lines(project: &Project) -> anyhow::Result<BTreeSet<String>> {
    let mut lines = BTreeSet::new();
    for (name, version) in project.installed_packages()? {
        let package_dir = project.package_dir(&name, &version);
        for entry in WalkDir::new(&package_dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let extension = entry.path().extension().and_then(|e| e.to_str());
            if !matches!(extension, Some("md" | "mdc")) {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&package_dir)
                .expect("walkdir yields paths under its root");
            lines.insert(format!(
                "- @{RULESTACK_DIR}/{name}.{version}/{}",
                relative.display()
            ));
        }
    }
    Ok(lines)
}

fn rewrite_section(contents: &str, expected: &BTreeSet<String>, root: &Path) -> String {
    let mut result: Vec<String> = vec![];
    let mut lines = contents.lines().peekable();
    let mut section_found = false;

    while let Some(line) = lines.next() {
        result.push(line.to_string());
        if line.trim_end() != ACTIVE_RULES_HEADER {
            continue;
        }
        section_found = true;

        // Collect the section body up to the next header.
        let mut kept: Vec<String> = vec![];
        let mut present: BTreeSet<String> = BTreeSet::new();
        while let Some(body_line) = lines.peek() {
            if body_line.starts_with("##") {
                break;
            }
            let body_line = lines.next().expect("peeked");
            if let Some(reference) = parse_reference(body_line) {
                if present.contains(body_line.trim()) {
                    continue;
                }
                // Drop references into package directories that are gone.
                if !root.join(&reference).exists() {
                    continue;
                }
                present.insert(body_line.trim().to_string());
                kept.push(body_line.trim().to_string());
            } else if !body_line.trim().is_empty() {
                kept.push(body_line.to_string());
            }
        }

        result.push(String::new());
        for line in &kept {
            result.push(line.clone());
        }
        for line in expected {
            if !present.contains(line.as_str()) {
                result.push(line.clone());
            }
        }
        result.push(String::new());
    }

    if !section_found {
        result.push(String::new());
        result.push(ACTIVE_RULES_HEADER.to_string());
        result.push(String::new());
        result.extend(expected.iter().cloned());
        result.push(String::new());
    }

    let mut out = result.join("\n");
    out.push('\n');
    out
}

/// `- @.rulestack/<dir>/<file>` → `.rulestack/<dir>/<file>`.
fn parse_reference(line: &str) -> Option<String> {
    let trimmed = line.trim();
    let reference = trimmed.strip_prefix("- @")?;
    reference
        .starts_with(RULESTACK_DIR)
        .then(|| reference.to_string())
}
