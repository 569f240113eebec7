//! Artifact tree assembly and static site rendering.
//!
//! Takes the reconciled notebook sources (remote downloads plus local build
//! outputs), joins each page to its metadata sidecar, and renders the final
//! site: an index page, copied static assets, and one post-processed page per
//! notebook.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use scraper::{Html, Selector};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use nbforge_render::Renderer;
use nbforge_shared::{NbforgeError, Result, SiteConfig};

use crate::{MergeContext, NotebookSource};

/// Filename-escaping artifacts normalized in collection, category, and title
/// strings.
const NAME_ISSUES: [(&str, &str); 1] = [("%20", " ")];

/// Static asset extensions copied into the site.
const ASSET_EXTENSIONS: [&str; 6] = ["css", "png", "jpg", "jpeg", "svg", "gif"];

// ---------------------------------------------------------------------------
// Output-side aggregation tree
// ---------------------------------------------------------------------------

/// One published notebook page with its parsed metadata.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactNotebook {
    pub title: String,
    pub metadata: Value,
    pub filepath: PathBuf,
    pub filename: String,
}

/// All notebook pages of one category, title-sorted.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactCategory {
    pub name: String,
    pub notebooks: Vec<ArtifactNotebook>,
}

/// All categories of one collection, name-sorted.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactCollection {
    pub name: String,
    pub categories: Vec<ArtifactCategory>,
}

/// Group sources by collection and category, then join each HTML page to its
/// metadata sidecar by notebook file stem.
///
/// An HTML page without a metadata partner is logged and skipped rather than
/// mispaired. A sidecar with a null `title` degrades to a filename-derived
/// title and description (logged as an error, non-fatal).
pub fn build_artifact_tree(sources: &[NotebookSource]) -> Result<Vec<ArtifactCollection>> {
    let mut grouped: BTreeMap<String, BTreeMap<String, Vec<&NotebookSource>>> = BTreeMap::new();
    for source in sources {
        grouped
            .entry(source.collection.clone())
            .or_default()
            .entry(source.category.clone())
            .or_default()
            .push(source);
    }

    let mut collections = Vec::with_capacity(grouped.len());
    for (collection_name, categories) in grouped {
        let mut artifact_categories = Vec::with_capacity(categories.len());
        for (category_name, category_sources) in categories {
            let notebooks = join_pages_to_metadata(&category_sources)?;
            if notebooks.is_empty() {
                continue;
            }

            artifact_categories.push(ArtifactCategory {
                name: normalize_name(&category_name),
                notebooks,
            });
        }

        if artifact_categories.is_empty() {
            continue;
        }

        collections.push(ArtifactCollection {
            name: normalize_name(&collection_name),
            categories: artifact_categories,
        });
    }

    Ok(collections)
}

fn join_pages_to_metadata(sources: &[&NotebookSource]) -> Result<Vec<ArtifactNotebook>> {
    let mut sidecars: BTreeMap<&str, &NotebookSource> = BTreeMap::new();
    for source in sources.iter().copied().filter(|s| s.is_metadata_file) {
        if let Some(stem) = source.filename.strip_suffix(".metadata.json") {
            sidecars.insert(stem, source);
        }
    }

    let mut notebooks = Vec::new();
    for page in sources.iter().copied().filter(|s| !s.is_metadata_file) {
        let stem = page
            .filename
            .rsplit_once('.')
            .map_or(page.filename.as_str(), |(stem, _)| stem);

        let Some(sidecar) = sidecars.get(stem) else {
            warn!(page = %page.filename, "no metadata sidecar for page, skipping");
            continue;
        };

        let raw = std::fs::read_to_string(&sidecar.filepath)
            .map_err(|e| NbforgeError::io(&sidecar.filepath, e))?;
        let mut metadata: Value = serde_json::from_str(&raw).map_err(|e| {
            NbforgeError::parse(format!(
                "invalid metadata JSON {}: {e}",
                sidecar.filepath.display()
            ))
        })?;

        let title = match metadata.get("title").and_then(Value::as_str) {
            Some(title) => normalize_name(title),
            None => {
                error!(notebook = stem, "unable to extract metadata title, using filename");
                metadata["title"] = Value::String(stem.to_string());
                metadata["description"] = Value::String(stem.to_string());
                stem.to_string()
            }
        };

        notebooks.push(ArtifactNotebook {
            title,
            metadata,
            filepath: page.filepath.clone(),
            filename: page.filename.clone(),
        });
    }

    notebooks.sort_by(|a, b| a.title.cmp(&b.title));
    Ok(notebooks)
}

fn normalize_name(name: &str) -> String {
    let mut normalized = name.to_string();
    for (find, replace) in NAME_ISSUES {
        normalized = normalized.replace(find, replace);
    }
    normalized
}

// ---------------------------------------------------------------------------
// Site rendering
// ---------------------------------------------------------------------------

/// Render the full site: index page, static assets, and per-notebook pages.
pub fn render_site(
    context: &MergeContext,
    collections: &[ArtifactCollection],
    renderer: &Renderer,
    site: &SiteConfig,
) -> Result<()> {
    render_index(context, collections, renderer, site)?;

    if let Some(assets_dir) = &context.assets_dir {
        copy_static_assets(assets_dir, &context.site_dir.join("static"))?;
    }

    for collection in collections {
        for category in &collection.categories {
            for notebook in &category.notebooks {
                publish_notebook_page(context, collection, category, notebook, renderer, site)?;
            }
        }
    }

    info!(
        collections = collections.len(),
        site = %context.site_dir.display(),
        "site rendered"
    );

    Ok(())
}

fn render_index(
    context: &MergeContext,
    collections: &[ArtifactCollection],
    renderer: &Renderer,
    site: &SiteConfig,
) -> Result<()> {
    let page = page_metadata(
        site,
        &site.title,
        &site.description,
        &format!("{}/index.html", site.base_url),
    );

    let html = renderer.render(
        "index.html",
        &serde_json::json!({
            "page": page,
            "static_url": "static/",
            "collections": collections,
        }),
    )?;

    let index_path = context.site_dir.join("index.html");
    std::fs::write(&index_path, html).map_err(|e| NbforgeError::io(&index_path, e))?;
    Ok(())
}

/// Copy a notebook's page into the site tree, keep only its cell-level HTML,
/// and re-render it through the notebook template.
fn publish_notebook_page(
    context: &MergeContext,
    collection: &ArtifactCollection,
    category: &ArtifactCategory,
    notebook: &ArtifactNotebook,
    renderer: &Renderer,
    site: &SiteConfig,
) -> Result<()> {
    let dest_dir = context.site_dir.join(&collection.name).join(&category.name);
    std::fs::create_dir_all(&dest_dir).map_err(|e| NbforgeError::io(&dest_dir, e))?;
    let dest = dest_dir.join(&notebook.filename);

    std::fs::copy(&notebook.filepath, &dest).map_err(|e| NbforgeError::io(&dest, e))?;

    let raw = std::fs::read_to_string(&dest).map_err(|e| NbforgeError::io(&dest, e))?;
    let cells = extract_cells(&raw);

    let description = notebook
        .metadata
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or(notebook.title.as_str());
    let page = page_metadata(
        site,
        &notebook.title,
        description,
        &format!(
            "{}/{}/{}/{}",
            site.base_url, collection.name, category.name, notebook.filename
        ),
    );

    let html = renderer.render(
        "notebook.html",
        &serde_json::json!({
            "page": page,
            "static_url": "../../static/",
            "notebook_content": cells,
        }),
    )?;

    std::fs::write(&dest, html).map_err(|e| NbforgeError::io(&dest, e))?;
    Ok(())
}

fn page_metadata(site: &SiteConfig, title: &str, description: &str, url: &str) -> Value {
    serde_json::json!({
        "title": title,
        "keywords": site.keywords.join(","),
        "description": description,
        "author": site.author,
        "maintainer": site.maintainer,
        "locale": site.locale,
        "url": url,
    })
}

/// Keep only recognized `cell` container elements from a converted page,
/// stripping the surrounding document chrome.
pub fn extract_cells(html: &str) -> String {
    let document = Html::parse_document(html);
    let selector = Selector::parse("div.cell").unwrap();

    document
        .select(&selector)
        .map(|element| element.html())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Recursively copy recognized static assets into the site.
///
/// An unrecognized file type in the assets directory is a validation error —
/// assets directories are curated, not scratch space.
fn copy_static_assets(assets_dir: &Path, target_dir: &Path) -> Result<()> {
    for entry in WalkDir::new(assets_dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let extension = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !ASSET_EXTENSIONS.contains(&extension.as_str()) {
            return Err(NbforgeError::validation(format!(
                "unexpected static asset type: {}",
                entry.path().display()
            )));
        }

        let relative = entry
            .path()
            .strip_prefix(assets_dir)
            .map_err(|e| NbforgeError::validation(format!("asset outside assets dir: {e}")))?;
        let target = target_dir.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| NbforgeError::io(parent, e))?;
        }

        std::fs::copy(entry.path(), &target).map_err(|e| NbforgeError::io(&target, e))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_pair(dir: &Path, stem: &str, title: Option<&str>) -> (NotebookSource, NotebookSource) {
        let html_path = dir.join(format!("{stem}.html"));
        std::fs::write(
            &html_path,
            format!("<html><body><div class=\"cell\">{stem}</div></body></html>"),
        )
        .unwrap();

        let meta_path = dir.join(format!("{stem}.metadata.json"));
        let metadata = match title {
            Some(t) => serde_json::json!({ "title": t, "description": format!("about {t}") }),
            None => serde_json::json!({ "title": null, "description": null }),
        };
        std::fs::write(&meta_path, serde_json::to_string(&metadata).unwrap()).unwrap();

        let html = NotebookSource {
            filename: format!("{stem}.html"),
            filepath: html_path,
            category: "cat".into(),
            collection: "coll".into(),
            source_url: "local-file".into(),
            is_metadata_file: false,
        };
        let meta = NotebookSource {
            filename: format!("{stem}.metadata.json"),
            filepath: meta_path,
            category: "cat".into(),
            collection: "coll".into(),
            source_url: "local-file".into(),
            is_metadata_file: true,
        };
        (html, meta)
    }

    #[test]
    fn tree_joins_pages_to_sidecars_by_stem() {
        let tmp = tempfile::tempdir().unwrap();
        let (h1, m1) = write_pair(tmp.path(), "nb1", Some("Beta"));
        let (h2, m2) = write_pair(tmp.path(), "nb2", Some("Alpha"));

        // Deliberately interleave out of pair order; the stem join must not care.
        let tree = build_artifact_tree(&[h1, h2, m2, m1]).unwrap();

        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].name, "coll");
        let notebooks = &tree[0].categories[0].notebooks;
        assert_eq!(notebooks.len(), 2);
        // Title-sorted.
        assert_eq!(notebooks[0].title, "Alpha");
        assert_eq!(notebooks[1].title, "Beta");
    }

    #[test]
    fn null_title_falls_back_to_filename_stem() {
        let tmp = tempfile::tempdir().unwrap();
        let (html, meta) = write_pair(tmp.path(), "cube_fitting", None);

        let tree = build_artifact_tree(&[html, meta]).unwrap();
        let notebook = &tree[0].categories[0].notebooks[0];
        assert_eq!(notebook.title, "cube_fitting");
        assert_eq!(notebook.metadata["title"], "cube_fitting");
        assert_eq!(notebook.metadata["description"], "cube_fitting");
    }

    #[test]
    fn page_without_sidecar_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let (html, _meta) = write_pair(tmp.path(), "orphan", Some("Orphan"));
        let (h2, m2) = write_pair(tmp.path(), "kept", Some("Kept"));

        let tree = build_artifact_tree(&[html, h2, m2]).unwrap();
        let notebooks = &tree[0].categories[0].notebooks;
        assert_eq!(notebooks.len(), 1);
        assert_eq!(notebooks[0].title, "Kept");
    }

    #[test]
    fn percent_escapes_are_normalized() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut html, mut meta) = write_pair(tmp.path(), "nb", Some("Deep%20Field"));
        html.collection = "hubble%20data".into();
        meta.collection = "hubble%20data".into();
        html.category = "deep%20field".into();
        meta.category = "deep%20field".into();

        let tree = build_artifact_tree(&[html, meta]).unwrap();
        assert_eq!(tree[0].name, "hubble data");
        assert_eq!(tree[0].categories[0].name, "deep field");
        assert_eq!(tree[0].categories[0].notebooks[0].title, "Deep Field");
    }

    #[test]
    fn collections_and_categories_are_name_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        let (h1, m1) = write_pair(tmp.path(), "n1", Some("T1"));
        let (h2, m2) = write_pair(tmp.path(), "n2", Some("T2"));

        let mut sources = vec![h1, m1, h2, m2];
        sources[0].collection = "zeta".into();
        sources[1].collection = "zeta".into();
        sources[2].collection = "alpha".into();
        sources[3].collection = "alpha".into();

        let tree = build_artifact_tree(&sources).unwrap();
        assert_eq!(tree[0].name, "alpha");
        assert_eq!(tree[1].name, "zeta");
    }

    #[test]
    fn extract_cells_keeps_only_cell_containers() {
        let html = r#"<html><head><style>x</style></head><body>
            <nav>chrome</nav>
            <div class="cell"><p>first</p></div>
            <div class="sidebar">ignored</div>
            <div class="cell"><p>second</p></div>
        </body></html>"#;

        let cells = extract_cells(html);
        assert!(cells.contains("first"));
        assert!(cells.contains("second"));
        assert!(!cells.contains("chrome"));
        assert!(!cells.contains("ignored"));
    }

    #[test]
    fn render_site_produces_index_and_notebook_pages() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = tmp.path().join("pages");
        std::fs::create_dir_all(&scratch).unwrap();
        let (html, meta) = write_pair(&scratch, "nb1", Some("My Notebook"));

        let site_dir = tmp.path().join("site");
        std::fs::create_dir_all(&site_dir).unwrap();
        let context = MergeContext {
            artifact_dest_dir: scratch,
            site_dir: site_dir.clone(),
            assets_dir: None,
            local_artifact_dir: tmp.path().join("artifacts"),
        };

        let site = SiteConfig {
            title: "Notebook Collections".into(),
            base_url: "https://notebooks.example.org".into(),
            ..SiteConfig::default()
        };
        let renderer = Renderer::new(None, &site).unwrap();

        let tree = build_artifact_tree(&[html, meta]).unwrap();
        render_site(&context, &tree, &renderer, &site).unwrap();

        let index = std::fs::read_to_string(site_dir.join("index.html")).unwrap();
        assert!(index.contains("My Notebook"));
        assert!(index.contains("coll/cat/nb1.html"));

        let page = std::fs::read_to_string(site_dir.join("coll/cat/nb1.html")).unwrap();
        assert!(page.contains("<div class=\"cell\">nb1</div>"));
        assert!(page.contains("<title>My Notebook</title>"));
        // Document chrome from the converted page is gone.
        assert!(!page.contains("<nav>"));
    }

    #[test]
    fn unexpected_asset_type_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let assets = tmp.path().join("assets");
        std::fs::create_dir_all(&assets).unwrap();
        std::fs::write(assets.join("site.css"), "body {}").unwrap();
        std::fs::write(assets.join("script.js"), "alert(1)").unwrap();

        let err = copy_static_assets(&assets, &tmp.path().join("static")).unwrap_err();
        assert!(matches!(err, NbforgeError::Validation { .. }));
    }

    #[test]
    fn assets_are_copied_recursively() {
        let tmp = tempfile::tempdir().unwrap();
        let assets = tmp.path().join("assets");
        std::fs::create_dir_all(assets.join("img")).unwrap();
        std::fs::write(assets.join("site.css"), "body {}").unwrap();
        std::fs::write(assets.join("img/logo.svg"), "<svg/>").unwrap();

        let target = tmp.path().join("static");
        copy_static_assets(&assets, &target).unwrap();

        assert!(target.join("site.css").exists());
        assert!(target.join("img/logo.svg").exists());
    }
}
