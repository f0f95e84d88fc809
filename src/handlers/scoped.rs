//! Scoped style handler.
//!
//! Component stylesheets (`Counter.razor.css`) are rewritten so every
//! selector carries the component's scope attribute, then bundled into
//! `<output>/<project>.styles.css`:
//!
//! ```text
//! h1:hover { color: red }   →   h1[b-3f2a9c01de]:hover { color: red }
//! .a ::deep .b { }          →   .a[b-3f2a9c01de] .b { }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use jwalk::WalkDir;
use lightningcss::rules::{CssRule, CssRuleList};
use lightningcss::selector::{Component, Selector};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::values::ident::Ident;
use tokio_util::sync::CancellationToken;

use super::{BrowserRefresh, ContentHandler, output_dir};
use crate::core::{FileChange, ProjectIdentity};
use crate::utils::hash;
use crate::utils::path::relative_slash;

const SCOPED_SUFFIXES: &[&str] = &[".razor.css", ".cshtml.css"];
const SKIPPED_DIRS: &[&str] = &["bin", "obj", "node_modules"];
const SCOPE_LEN: usize = 10;

const DEEP_MARKER: &str = "deltawatch-deep";

pub struct ScopedCssHandler {
    output: PathBuf,
    refresh: Option<Arc<dyn BrowserRefresh>>,
}

impl ScopedCssHandler {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            refresh: None,
        }
    }

    pub fn with_refresh(mut self, refresh: Arc<dyn BrowserRefresh>) -> Self {
        self.refresh = Some(refresh);
        self
    }
}

#[async_trait]
impl ContentHandler for ScopedCssHandler {
    fn name(&self) -> &'static str {
        "scoped-css"
    }

    async fn try_handle(
        &self,
        project: &ProjectIdentity,
        change: &FileChange,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        if !is_scoped(&change.path) || cancel.is_cancelled() {
            return Ok(false);
        }

        let dir = project.dir().to_path_buf();
        let output = output_dir(project, &self.output);
        let bundle_name = format!("{}.styles.css", project.name());
        let bundle_path = output.join(&bundle_name);

        let skip = output.clone();
        let project_name = project.name().to_string();
        let bundle = tokio::task::spawn_blocking(move || build_bundle(&dir, &skip, &project_name))
            .await
            .context("scoped bundle task failed")??;

        tokio::fs::create_dir_all(&output).await?;
        tokio::fs::write(&bundle_path, bundle)
            .await
            .with_context(|| format!("failed to write {}", bundle_path.display()))?;

        if let Some(refresh) = &self.refresh {
            refresh.refresh_asset(&format!("/{bundle_name}"));
        }
        Ok(true)
    }
}

fn is_scoped(path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    SCOPED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Collect every scoped stylesheet under `dir`, sorted by path.
fn collect_scoped(dir: &Path, skip: &Path) -> Vec<PathBuf> {
    let mut files: Vec<_> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path())
        .filter(|p| !p.starts_with(skip) && is_scoped(p))
        .filter(|p| {
            p.strip_prefix(dir).is_ok_and(|rel| {
                !rel.components()
                    .any(|c| SKIPPED_DIRS.contains(&c.as_os_str().to_str().unwrap_or_default()))
            })
        })
        .collect();
    files.sort();
    files
}

fn build_bundle(dir: &Path, skip: &Path, project: &str) -> Result<String> {
    let mut bundle = String::new();
    for file in collect_scoped(dir, skip) {
        let Some(rel) = relative_slash(&file, dir) else {
            continue;
        };
        let css = std::fs::read_to_string(&file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        let scope = format!("b-{}", hash::short_id(&rel, SCOPE_LEN));

        bundle.push_str(&format!("/* _content/{project}/{rel} */\n"));
        let scoped =
            scope_css(&css, &scope).with_context(|| format!("failed to scope {}", file.display()))?;
        bundle.push_str(scoped.trim_end());
        bundle.push_str("\n\n");
    }
    Ok(bundle)
}

/// Add `[scope]` to every style rule selector in `css`.
///
/// Rules nested in `@media`-like blocks are scoped; other at-rules
/// (`@keyframes`, `@font-face`, `@import`) pass through untouched.
pub fn scope_css(css: &str, scope: &str) -> Result<String> {
    // `::deep` is not valid CSS; it becomes a marker attribute the selector
    // rewrite consumes.
    let source = css.replace("::deep", &format!(" [{DEEP_MARKER}]"));
    let mut stylesheet = StyleSheet::parse(&source, ParserOptions::default())
        .map_err(|e| anyhow!("invalid CSS: {e}"))?;
    scope_rules(&mut stylesheet.rules, scope);
    let printed = stylesheet
        .to_css(PrinterOptions::default())
        .map_err(|e| anyhow!("failed to print CSS: {e}"))?;
    Ok(printed.code)
}

fn scope_rules(rules: &mut CssRuleList<'_>, scope: &str) {
    for rule in rules.0.iter_mut() {
        match rule {
            CssRule::Style(style) => {
                for selector in style.selectors.0.iter_mut() {
                    scope_selector(selector, scope);
                }
            }
            CssRule::Media(media) => scope_rules(&mut media.rules, scope),
            CssRule::Supports(supports) => scope_rules(&mut supports.rules, scope),
            CssRule::Container(container) => scope_rules(&mut container.rules, scope),
            CssRule::LayerBlock(layer) => scope_rules(&mut layer.rules, scope),
            CssRule::MozDocument(document) => scope_rules(&mut document.rules, scope),
            _ => {}
        }
    }
}

/// Put the scope on the compound before `::deep`, or on the last compound.
fn scope_selector<'i>(selector: &mut Selector<'i>, scope: &str) {
    let mut parts: Vec<Component<'i>> = selector.iter_raw_match_order().rev().cloned().collect();
    let attribute = scope_attribute(scope);

    match parts.iter().position(is_deep_marker) {
        Some(marker) if marker > 0 && is_boundary(&parts[marker - 1]) => {
            parts.drain(marker - 1..=marker);
            let at = insert_position(&parts, marker - 1);
            parts.insert(at, attribute);
        }
        Some(marker) => parts[marker] = attribute,
        None => {
            let at = insert_position(&parts, parts.len());
            parts.insert(at, attribute);
        }
    }

    *selector = Selector::from(parts);
}

fn scope_attribute<'i>(scope: &str) -> Component<'i> {
    Component::AttributeInNoNamespaceExists {
        local_name: Ident(scope.to_owned().into()),
        local_name_lower: Ident(scope.to_ascii_lowercase().into()),
    }
}

fn is_deep_marker(part: &Component<'_>) -> bool {
    matches!(
        part,
        Component::AttributeInNoNamespaceExists { local_name, .. } if &*local_name.0 == DEEP_MARKER
    )
}

/// Combinators between compounds. A pseudo-element stays in its compound.
fn is_boundary(part: &Component<'_>) -> bool {
    matches!(part, Component::Combinator(combinator) if !combinator.is_pseudo_element())
}

/// Index in the compound ending at `end` after its type, id, class and
/// attribute selectors, so pseudo-classes and pseudo-elements stay last.
fn insert_position(parts: &[Component<'_>], end: usize) -> usize {
    let start = parts[..end]
        .iter()
        .rposition(is_boundary)
        .map_or(0, |i| i + 1);
    parts[start..end]
        .iter()
        .position(|part| {
            !matches!(
                part,
                Component::LocalName(_)
                    | Component::ExplicitUniversalType
                    | Component::ExplicitAnyNamespace
                    | Component::ExplicitNoNamespace
                    | Component::DefaultNamespace(_)
                    | Component::Namespace(..)
                    | Component::ID(_)
                    | Component::Class(_)
                    | Component::AttributeInNoNamespaceExists { .. }
                    | Component::AttributeInNoNamespace { .. }
                    | Component::AttributeOther(_)
            )
        })
        .map_or(end, |i| start + i)
}
